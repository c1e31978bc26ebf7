//! # Value References
//!
//! Parsed form of a `getValueFrom` directive.

use super::cache::Selector;
use super::error::ResolveError;
use crate::transformers;
use serde_json::{Map, Value};
use std::collections::BTreeMap;

pub const GET_VALUE_FROM: &str = "getValueFrom";
pub const KIND: &str = "kind";
pub const API_VERSION: &str = "apiVersion";
pub const NAME: &str = "name";
pub const LABELS: &str = "labels";
pub const NAMESPACE: &str = "namespace";
pub const PATH: &str = "path";
pub const FORMAT_TRANSFORMERS: &str = "format-transformers";
pub const DEFAULT_VALUE: &str = "defaultValue";

/// A `getValueFrom` directive
#[derive(Debug, Clone, PartialEq)]
pub struct ValueReference {
    pub kind: String,
    pub api_version: Option<String>,
    pub selector: Selector,
    /// Explicit namespace; the Composable's namespace is used when absent
    pub namespace: Option<String>,
    pub path: String,
    pub transformers: Vec<String>,
    /// Present when the directive carries `defaultValue`, even if it is `null`
    pub default_value: Option<Value>,
}

fn ill_formed(reason: &str) -> ResolveError {
    ResolveError::IllFormedReference(format!("GetValueFrom is not well-formed, {reason}"))
}

impl ValueReference {
    /// Parse the body of a `getValueFrom` key
    pub fn parse(value: &Value) -> Result<Self, ResolveError> {
        let Value::Object(fields) = value else {
            return Err(ill_formed(&format!(
                "value type is not an object but {}",
                type_name(value)
            )));
        };

        let kind = string_field(fields, KIND)?
            .filter(|k| !k.is_empty())
            .ok_or_else(|| ill_formed("'kind' is not defined"))?;
        let api_version = string_field(fields, API_VERSION)?.filter(|v| !v.is_empty());
        let namespace = string_field(fields, NAMESPACE)?.filter(|ns| !ns.is_empty());

        let path = string_field(fields, PATH)?.ok_or_else(|| ill_formed("'path' is not defined"))?;
        if !path.starts_with("{.") {
            return Err(ill_formed("'path' is not jsonpath formatted"));
        }

        let selector = match (fields.get(NAME), fields.get(LABELS)) {
            (Some(_), Some(_)) => {
                return Err(ill_formed(
                    "both 'name' and 'labels' cannot be defined at the same time",
                ))
            }
            (None, None) => {
                return Err(ill_formed(
                    "neither 'name' nor 'labels' are defined (one expected)",
                ))
            }
            (Some(Value::String(name)), None) if name.is_empty() => {
                return Err(ill_formed("'name' is empty"))
            }
            (Some(Value::String(name)), None) => Selector::Name(name.clone()),
            (Some(_), None) => return Err(ill_formed("'name' must be a string")),
            (None, Some(Value::Object(labels))) => Selector::Labels(
                labels
                    .iter()
                    .map(|(k, v)| {
                        let value = transformers::render(v);
                        if has_selector_syntax(k) || has_selector_syntax(&value) {
                            return Err(ill_formed(&format!(
                                "label {k}={value} contains ',', '=' or '!'"
                            )));
                        }
                        Ok((k.clone(), value))
                    })
                    .collect::<Result<BTreeMap<_, _>, _>>()?,
            ),
            (None, Some(_)) => return Err(ill_formed("'labels' must be a map")),
        };

        let transformers = match fields.get(FORMAT_TRANSFORMERS) {
            None | Some(Value::Null) => Vec::new(),
            Some(Value::Array(names)) => names
                .iter()
                .map(|name| match name {
                    Value::String(s) if transformers::is_registered(s) => Ok(s.clone()),
                    Value::String(s) => Err(ill_formed(&format!("unknown format-transformer {s:?}"))),
                    other => Err(ill_formed(&format!(
                        "format-transformers entries must be strings, got {other}"
                    ))),
                })
                .collect::<Result<Vec<_>, _>>()?,
            Some(_) => return Err(ill_formed("'format-transformers' must be a list")),
        };

        Ok(Self {
            kind,
            api_version,
            selector,
            namespace,
            path,
            transformers,
            default_value: fields.get(DEFAULT_VALUE).cloned(),
        })
    }
}

/// Characters that would change the meaning of an equality label selector
fn has_selector_syntax(part: &str) -> bool {
    part.contains([',', '=', '!'])
}

fn string_field(fields: &Map<String, Value>, key: &str) -> Result<Option<String>, ResolveError> {
    match fields.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(other) => Err(ill_formed(&format!(
            "'{key}' must be a string, got {}",
            type_name(other)
        ))),
    }
}

pub(crate) fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolver::error::is_ill_formed_reference;
    use serde_json::json;

    #[test]
    fn test_parse_full_reference() {
        let reference = ValueReference::parse(&json!({
            "kind": "Secret",
            "apiVersion": "v1",
            "name": "db",
            "namespace": "other",
            "path": "{.data.password}",
            "format-transformers": ["Base64ToString"],
            "defaultValue": "none"
        }))
        .unwrap();
        assert_eq!(reference.kind, "Secret");
        assert_eq!(reference.api_version.as_deref(), Some("v1"));
        assert_eq!(reference.selector, Selector::Name("db".to_string()));
        assert_eq!(reference.namespace.as_deref(), Some("other"));
        assert_eq!(reference.transformers, vec!["Base64ToString"]);
        assert_eq!(reference.default_value, Some(json!("none")));
    }

    #[test]
    fn test_labels_are_rendered_as_strings() {
        let reference = ValueReference::parse(&json!({
            "kind": "ConfigMap",
            "labels": {"app": "kafka", "replica": 2},
            "path": "{.data.url}"
        }))
        .unwrap();
        assert_eq!(
            reference.selector,
            Selector::Labels(BTreeMap::from([
                ("app".to_string(), "kafka".to_string()),
                ("replica".to_string(), "2".to_string()),
            ]))
        );
        assert_eq!(reference.default_value, None);
    }

    #[test]
    fn test_name_xor_labels() {
        let both = ValueReference::parse(&json!({
            "kind": "Secret", "name": "a", "labels": {"x": "y"}, "path": "{.data}"
        }))
        .unwrap_err();
        assert!(is_ill_formed_reference(&both));
        assert!(both.to_string().contains("'name' and 'labels'"));

        let neither =
            ValueReference::parse(&json!({"kind": "Secret", "path": "{.data}"})).unwrap_err();
        assert!(is_ill_formed_reference(&neither));
        assert!(neither.to_string().contains("'name' nor 'labels'"));
    }

    #[test]
    fn test_required_fields() {
        let no_kind = ValueReference::parse(&json!({"name": "a", "path": "{.data}"})).unwrap_err();
        assert!(no_kind.to_string().contains("'kind' is not defined"));

        let no_path = ValueReference::parse(&json!({"kind": "Secret", "name": "a"})).unwrap_err();
        assert!(no_path.to_string().contains("'path' is not defined"));

        let bad_path =
            ValueReference::parse(&json!({"kind": "Secret", "name": "a", "path": ".data"}))
                .unwrap_err();
        assert!(bad_path.to_string().contains("jsonpath"));

        let not_object = ValueReference::parse(&json!("Secret")).unwrap_err();
        assert!(is_ill_formed_reference(&not_object));
    }

    #[test]
    fn test_unknown_transformer_is_ill_formed() {
        let err = ValueReference::parse(&json!({
            "kind": "Secret", "name": "a", "path": "{.data}",
            "format-transformers": ["Base64ToString", "Rot13"]
        }))
        .unwrap_err();
        assert!(is_ill_formed_reference(&err));
        assert!(err.to_string().contains("Rot13"));
    }

    #[test]
    fn test_null_default_is_kept() {
        let reference = ValueReference::parse(&json!({
            "kind": "Secret", "name": "a", "path": "{.data}", "defaultValue": null
        }))
        .unwrap();
        assert_eq!(reference.default_value, Some(Value::Null));
    }

    #[test]
    fn test_empty_name_is_ill_formed() {
        let err = ValueReference::parse(&json!({"kind": "Secret", "name": "", "path": "{.data}"}))
            .unwrap_err();
        assert!(is_ill_formed_reference(&err));
        assert!(err.to_string().contains("'name' is empty"));
    }

    #[test]
    fn test_labels_with_selector_syntax_are_ill_formed() {
        for labels in [
            json!({"app": "x,tier=db"}),
            json!({"app": "a=b"}),
            json!({"app!": "kafka"}),
            json!({"app,tier": "kafka"}),
        ] {
            let err = ValueReference::parse(&json!({
                "kind": "Service", "labels": labels, "path": "{.spec}"
            }))
            .unwrap_err();
            assert!(is_ill_formed_reference(&err), "{labels}");
        }
    }
}
