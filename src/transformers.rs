//! # Transformers
//!
//! Named value-coercion functions applied to a resolved reference value.
//!
//! A reference lists transformers by name in `format-transformers`; they run
//! left to right, each stage feeding the next, and the first failure stops the
//! pipeline.
//!
//! | name | input | output |
//! |------|-------|--------|
//! | `ToString` | any | string rendering |
//! | `Base64ToString` | string | decoded string |
//! | `StringToBase64` | string | base64 string |
//! | `StringToInt` | string | integer |
//! | `StringToFloat` | string | float |
//! | `StringToBool` | string | bool |
//! | `ArrayToCSString` | array (or anything) | comma-joined string |
//! | `JsonToObject` | JSON string | decoded value |
//! | `ObjectToJson` | any | JSON string |

use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Errors raised while looking up or running a transformer
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransformError {
    #[error("Wrong transformer name {0:?}")]
    UnknownTransformer(String),

    #[error("{transformer}: the given {value} has type {value_type}, and it is not a string")]
    NotAString {
        transformer: &'static str,
        value: String,
        value_type: &'static str,
    },

    #[error("{transformer}: cannot convert {input:?}: {reason}")]
    Conversion {
        transformer: &'static str,
        input: String,
        reason: String,
    },
}

/// A registered transformer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transformer {
    ToString,
    Base64ToString,
    StringToBase64,
    StringToInt,
    StringToFloat,
    StringToBool,
    ArrayToCSString,
    JsonToObject,
    ObjectToJson,
}

impl Transformer {
    /// Every registered transformer, in registry order
    pub const ALL: [Transformer; 9] = [
        Transformer::ToString,
        Transformer::Base64ToString,
        Transformer::StringToBase64,
        Transformer::StringToInt,
        Transformer::StringToFloat,
        Transformer::StringToBool,
        Transformer::ArrayToCSString,
        Transformer::JsonToObject,
        Transformer::ObjectToJson,
    ];

    /// Name as written in `format-transformers`
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Transformer::ToString => "ToString",
            Transformer::Base64ToString => "Base64ToString",
            Transformer::StringToBase64 => "StringToBase64",
            Transformer::StringToInt => "StringToInt",
            Transformer::StringToFloat => "StringToFloat",
            Transformer::StringToBool => "StringToBool",
            Transformer::ArrayToCSString => "ArrayToCSString",
            Transformer::JsonToObject => "JsonToObject",
            Transformer::ObjectToJson => "ObjectToJson",
        }
    }

    /// Run this transformer over a single value
    pub fn apply(&self, value: Value) -> Result<Value, TransformError> {
        match self {
            Transformer::ToString => Ok(Value::String(render(&value))),
            Transformer::Base64ToString => {
                let input = self.expect_string(value)?;
                // Secrets created from files often carry a trailing newline
                let compact: String = input.chars().filter(|c| *c != '\n' && *c != '\r').collect();
                let bytes = STANDARD
                    .decode(compact.as_bytes())
                    .map_err(|e| self.conversion(&input, e))?;
                let decoded = String::from_utf8(bytes).map_err(|e| self.conversion(&input, e))?;
                Ok(Value::String(decoded))
            }
            Transformer::StringToBase64 => {
                let input = self.expect_string(value)?;
                Ok(Value::String(STANDARD.encode(input.as_bytes())))
            }
            Transformer::StringToInt => {
                let input = self.expect_string(value)?;
                let n: i64 = input.parse().map_err(|e| self.conversion(&input, e))?;
                Ok(Value::from(n))
            }
            Transformer::StringToFloat => {
                let input = self.expect_string(value)?;
                let f: f64 = input.parse().map_err(|e| self.conversion(&input, e))?;
                serde_json::Number::from_f64(f)
                    .map(Value::Number)
                    .ok_or_else(|| self.conversion(&input, "not a finite number"))
            }
            Transformer::StringToBool => {
                let input = self.expect_string(value)?;
                parse_bool(&input)
                    .map(Value::Bool)
                    .ok_or_else(|| self.conversion(&input, "invalid syntax"))
            }
            Transformer::ArrayToCSString => match value {
                Value::Array(items) => Ok(Value::String(
                    items.iter().map(render).collect::<Vec<_>>().join(","),
                )),
                other => Ok(Value::String(render(&other))),
            },
            Transformer::JsonToObject => {
                let input = self.expect_string(value)?;
                serde_json::from_str(&input).map_err(|e| self.conversion(&input, e))
            }
            Transformer::ObjectToJson => serde_json::to_string(&value)
                .map(Value::String)
                .map_err(|e| self.conversion(&render(&value), e)),
        }
    }

    fn expect_string(&self, value: Value) -> Result<String, TransformError> {
        match value {
            Value::String(s) => Ok(s),
            other => Err(TransformError::NotAString {
                transformer: self.name(),
                value: render(&other),
                value_type: json_type_name(&other),
            }),
        }
    }

    fn conversion(&self, input: &str, reason: impl fmt::Display) -> TransformError {
        TransformError::Conversion {
            transformer: self.name(),
            input: input.to_string(),
            reason: reason.to_string(),
        }
    }
}

impl FromStr for Transformer {
    type Err = TransformError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Transformer::ALL
            .into_iter()
            .find(|t| t.name() == s)
            .ok_or_else(|| TransformError::UnknownTransformer(s.to_string()))
    }
}

impl fmt::Display for Transformer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Look up a transformer by its registered name
pub fn lookup(name: &str) -> Result<Transformer, TransformError> {
    name.parse()
}

/// True when `name` is a registered transformer
#[must_use]
pub fn is_registered(name: &str) -> bool {
    lookup(name).is_ok()
}

/// Apply the named transformers to `value`, left to right
///
/// Stops at the first unknown name or failing stage.
pub fn compound_transformer_names<S: AsRef<str>>(
    value: Value,
    names: &[S],
) -> Result<Value, TransformError> {
    names.iter().try_fold(value, |current, name| {
        lookup(name.as_ref())?.apply(current)
    })
}

/// Default string rendering of a JSON value
///
/// Strings are returned verbatim, whole floats print without a fractional
/// part, and arrays/objects render as compact JSON.
#[must_use]
pub fn render(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => match (n.as_i64(), n.as_u64(), n.as_f64()) {
            (Some(i), _, _) => i.to_string(),
            (None, Some(u), _) => u.to_string(),
            (None, None, Some(f)) => render_float(f),
            _ => n.to_string(),
        },
        Value::Bool(b) => b.to_string(),
        Value::Null => "null".to_string(),
        Value::Array(_) | Value::Object(_) => value.to_string(),
    }
}

#[allow(
    clippy::cast_possible_truncation,
    reason = "guarded by the fract and magnitude check"
)]
fn render_float(f: f64) -> String {
    if f.fract() == 0.0 && f.abs() < 1e15 {
        (f as i64).to_string()
    } else {
        f.to_string()
    }
}

/// Boolean parsing with the usual short and long spellings
fn parse_bool(input: &str) -> Option<bool> {
    match input {
        "1" | "t" | "T" | "true" | "TRUE" | "True" => Some(true),
        "0" | "f" | "F" | "false" | "FALSE" | "False" => Some(false),
        _ => None,
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(n) if n.is_f64() => "float",
        Value::Number(_) => "int",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_lookup_known_and_unknown() {
        assert_eq!(lookup("Base64ToString").unwrap(), Transformer::Base64ToString);
        assert!(matches!(
            lookup("base64tostring"),
            Err(TransformError::UnknownTransformer(name)) if name == "base64tostring"
        ));
        assert!(is_registered("ObjectToJson"));
        assert!(!is_registered("ToUpper"));
    }

    #[test]
    fn test_compound_pipelines() {
        let cases = vec![
            (json!(12), vec!["ToString", "StringToInt"], json!(12)),
            (json!("12"), vec!["StringToInt", "ToString"], json!("12")),
            (json!(12.2), vec!["ToString", "StringToFloat"], json!(12.2)),
            (json!("12.2"), vec!["StringToFloat", "ToString"], json!("12.2")),
            (json!(true), vec!["ToString", "StringToBool"], json!(true)),
            (json!("true"), vec!["StringToBool", "ToString"], json!("true")),
            (
                json!(13),
                vec!["ToString", "StringToBase64", "Base64ToString", "StringToInt"],
                json!(13),
            ),
            (
                json!(true),
                vec!["ToString", "StringToBase64", "Base64ToString", "StringToBool"],
                json!(true),
            ),
        ];
        for (input, names, expected) in cases {
            let result = compound_transformer_names(input.clone(), &names).unwrap();
            assert_eq!(result, expected, "pipeline {names:?} over {input}");
        }
    }

    #[test]
    fn test_base64_json_array_pipeline() {
        // ["broker-1:9093","broker-2:9093"] with a trailing newline, base64 encoded
        let encoded = STANDARD.encode("[\"broker-1:9093\",\"broker-2:9093\"]\n");
        let result = compound_transformer_names(
            json!(encoded),
            &["Base64ToString", "JsonToObject", "ArrayToCSString"],
        )
        .unwrap();
        assert_eq!(result, json!("broker-1:9093,broker-2:9093"));
    }

    #[test]
    fn test_array_to_cs_string() {
        let t = Transformer::ArrayToCSString;
        assert_eq!(t.apply(json!(["a", "b", "cd", "efg"])).unwrap(), json!("a,b,cd,efg"));
        assert_eq!(t.apply(json!([1, 2, 34, 567])).unwrap(), json!("1,2,34,567"));
        assert_eq!(
            t.apply(json!([1.1, 2.2, 34.3, 567.0, 123.456])).unwrap(),
            json!("1.1,2.2,34.3,567,123.456")
        );
        assert_eq!(t.apply(json!([true, false, true])).unwrap(), json!("true,false,true"));
        assert_eq!(t.apply(json!("test")).unwrap(), json!("test"));
        assert_eq!(t.apply(json!(12)).unwrap(), json!("12"));
        assert_eq!(t.apply(json!(true)).unwrap(), json!("true"));
    }

    #[test]
    fn test_object_to_json() {
        let planets = json!([{"Name": "Mercury", "YearSpan": 88}, {"Name": "Venus", "YearSpan": 243}]);
        assert_eq!(
            Transformer::ObjectToJson.apply(planets).unwrap(),
            json!(r#"[{"Name":"Mercury","YearSpan":88},{"Name":"Venus","YearSpan":243}]"#)
        );
    }

    #[test]
    fn test_to_string_renders_composites_as_json() {
        assert_eq!(
            Transformer::ToString.apply(json!({"a": [1, 2]})).unwrap(),
            json!(r#"{"a":[1,2]}"#)
        );
        assert_eq!(Transformer::ToString.apply(Value::Null).unwrap(), json!("null"));
    }

    #[test]
    fn test_string_to_bool_spellings() {
        for input in ["1", "t", "T", "true", "TRUE", "True"] {
            assert_eq!(Transformer::StringToBool.apply(json!(input)).unwrap(), json!(true));
        }
        for input in ["0", "f", "F", "false", "FALSE", "False"] {
            assert_eq!(Transformer::StringToBool.apply(json!(input)).unwrap(), json!(false));
        }
        assert!(Transformer::StringToBool.apply(json!("yes")).is_err());
    }

    #[test]
    fn test_conversion_failures() {
        assert!(matches!(
            Transformer::StringToInt.apply(json!("abc")),
            Err(TransformError::Conversion { transformer: "StringToInt", .. })
        ));
        assert!(matches!(
            Transformer::StringToFloat.apply(json!("1.2.3")),
            Err(TransformError::Conversion { .. })
        ));
        assert!(matches!(
            Transformer::Base64ToString.apply(json!("not base64!")),
            Err(TransformError::Conversion { .. })
        ));
        assert!(matches!(
            Transformer::JsonToObject.apply(json!("{broken")),
            Err(TransformError::Conversion { .. })
        ));
    }

    #[test]
    fn test_string_transformers_reject_non_strings() {
        let err = Transformer::Base64ToString.apply(json!(42)).unwrap_err();
        assert_eq!(
            err,
            TransformError::NotAString {
                transformer: "Base64ToString",
                value: "42".to_string(),
                value_type: "int",
            }
        );
        assert!(Transformer::StringToBase64.apply(json!([1])).is_err());
        assert!(Transformer::JsonToObject.apply(json!({})).is_err());
    }

    #[test]
    fn test_pipeline_stops_at_unknown_name() {
        let err = compound_transformer_names(json!("x"), &["ToString", "Nope", "StringToInt"])
            .unwrap_err();
        assert_eq!(err, TransformError::UnknownTransformer("Nope".to_string()));
    }
}
