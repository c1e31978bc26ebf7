//! # Path Extractor
//!
//! Evaluates the JSONPath subset used by `getValueFrom.path` against a
//! fetched object.
//!
//! Supported forms:
//! - `{.a.b.c}` field access
//! - `{.items[0].name}`, `{.items[-1]}` index access (negative counts from the end)
//! - `{.metadata.labels['app.kubernetes.io/name']}` quoted keys
//! - `{.data.tls\.crt}` escaped dots inside a field name
//! - `{.spec.ports[*].port}` wildcard; the result is an array of every match

use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PathError {
    #[error("invalid path {path:?}: {reason}")]
    Parse { path: String, reason: String },

    #[error("{0} is not found")]
    NotFound(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Field(String),
    Index(i64),
    Wildcard,
}

/// A parsed path expression
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JsonPath {
    raw: String,
    segments: Vec<Segment>,
}

impl JsonPath {
    /// Parse `{.a.b[0]}`-style expressions
    pub fn parse(raw: &str) -> Result<Self, PathError> {
        let parse_err = |reason: &str| PathError::Parse {
            path: raw.to_string(),
            reason: reason.to_string(),
        };

        let inner = raw
            .trim()
            .strip_prefix('{')
            .and_then(|s| s.strip_suffix('}'))
            .ok_or_else(|| parse_err("expected the expression to be wrapped in {}"))?;
        if !inner.starts_with('.') {
            return Err(parse_err("expected the expression to start with '.'"));
        }

        let chars: Vec<char> = inner.chars().collect();
        let mut segments = Vec::new();
        let mut i = 0;
        while i < chars.len() {
            match chars[i] {
                '.' => {
                    i += 1;
                    let mut field = String::new();
                    while i < chars.len() && chars[i] != '.' && chars[i] != '[' {
                        if chars[i] == '\\' && i + 1 < chars.len() {
                            i += 1;
                        }
                        field.push(chars[i]);
                        i += 1;
                    }
                    match field.as_str() {
                        // `{.}` addresses the whole object
                        "" if segments.is_empty() && i == chars.len() => {}
                        "" => return Err(parse_err("empty field name")),
                        "*" => segments.push(Segment::Wildcard),
                        _ => segments.push(Segment::Field(field)),
                    }
                }
                '[' => {
                    let close = chars[i..]
                        .iter()
                        .position(|c| *c == ']')
                        .map(|offset| i + offset)
                        .ok_or_else(|| parse_err("unterminated '['"))?;
                    let body: String = chars[i + 1..close].iter().collect();
                    segments.push(parse_bracket(body.trim()).ok_or_else(|| {
                        parse_err(&format!("unsupported subscript [{body}]"))
                    })?);
                    i = close + 1;
                }
                other => {
                    return Err(parse_err(&format!("unexpected character {other:?}")));
                }
            }
        }

        Ok(Self {
            raw: raw.to_string(),
            segments,
        })
    }

    #[must_use]
    pub fn has_wildcard(&self) -> bool {
        self.segments.contains(&Segment::Wildcard)
    }

    /// Evaluate against `root`
    ///
    /// A path without a wildcard yields the single addressed value. With a
    /// wildcard every match is collected into an array. JSON `null` counts as
    /// missing.
    pub fn find(&self, root: &Value) -> Result<Value, PathError> {
        let mut current: Vec<&Value> = vec![root];
        for segment in &self.segments {
            let mut next = Vec::new();
            for node in current {
                match (segment, node) {
                    (Segment::Field(name), Value::Object(map)) => {
                        if let Some(child) = map.get(name) {
                            next.push(child);
                        } else if !self.has_wildcard() {
                            return Err(PathError::NotFound(name.clone()));
                        }
                    }
                    (Segment::Index(index), Value::Array(items)) => {
                        let resolved = if *index < 0 {
                            i64::try_from(items.len()).ok().map(|len| len + index)
                        } else {
                            Some(*index)
                        };
                        match resolved
                            .and_then(|idx| usize::try_from(idx).ok())
                            .and_then(|idx| items.get(idx))
                        {
                            Some(child) => next.push(child),
                            None if self.has_wildcard() => {}
                            None => {
                                return Err(PathError::NotFound(format!("array index {index}")))
                            }
                        }
                    }
                    (Segment::Wildcard, Value::Array(items)) => next.extend(items.iter()),
                    (Segment::Wildcard, Value::Object(map)) => next.extend(map.values()),
                    (_, _) if self.has_wildcard() => {}
                    (segment, _) => {
                        return Err(PathError::NotFound(describe(segment)));
                    }
                }
            }
            current = next;
        }

        if self.has_wildcard() {
            let values: Vec<Value> = current
                .into_iter()
                .filter(|v| !v.is_null())
                .cloned()
                .collect();
            if values.is_empty() {
                return Err(PathError::NotFound(self.raw.clone()));
            }
            return Ok(Value::Array(values));
        }

        match current.first() {
            Some(value) if !value.is_null() => Ok((*value).clone()),
            _ => Err(PathError::NotFound(self.raw.clone())),
        }
    }
}

fn parse_bracket(body: &str) -> Option<Segment> {
    if body == "*" {
        return Some(Segment::Wildcard);
    }
    let quoted = body
        .strip_prefix('\'')
        .and_then(|s| s.strip_suffix('\''))
        .or_else(|| body.strip_prefix('"').and_then(|s| s.strip_suffix('"')));
    if let Some(key) = quoted {
        return Some(Segment::Field(key.to_string()));
    }
    body.parse::<i64>().ok().map(Segment::Index)
}

fn describe(segment: &Segment) -> String {
    match segment {
        Segment::Field(name) => name.clone(),
        Segment::Index(index) => format!("array index {index}"),
        Segment::Wildcard => "*".to_string(),
    }
}

/// Parse and evaluate in one step
pub fn extract(root: &Value, path: &str) -> Result<Value, PathError> {
    JsonPath::parse(path)?.find(root)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn secret() -> Value {
        json!({
            "apiVersion": "v1",
            "kind": "Secret",
            "metadata": {
                "name": "db",
                "labels": {"app.kubernetes.io/name": "postgres"}
            },
            "data": {"password": "OTM3Ng==", "tls.crt": "Y2VydA=="},
            "spec": {
                "ports": [{"name": "http", "port": 80}, {"name": "https", "port": 443}],
                "empty": null
            }
        })
    }

    #[test]
    fn test_field_access() {
        assert_eq!(extract(&secret(), "{.data.password}").unwrap(), json!("OTM3Ng=="));
        assert_eq!(extract(&secret(), "{.metadata.name}").unwrap(), json!("db"));
        assert_eq!(
            extract(&secret(), "{.spec.ports}").unwrap(),
            json!([{"name": "http", "port": 80}, {"name": "https", "port": 443}])
        );
    }

    #[test]
    fn test_index_access() {
        assert_eq!(extract(&secret(), "{.spec.ports[0].port}").unwrap(), json!(80));
        assert_eq!(extract(&secret(), "{.spec.ports[-1].name}").unwrap(), json!("https"));
        assert!(matches!(
            extract(&secret(), "{.spec.ports[5]}"),
            Err(PathError::NotFound(_))
        ));
    }

    #[test]
    fn test_quoted_and_escaped_keys() {
        assert_eq!(
            extract(&secret(), "{.metadata.labels['app.kubernetes.io/name']}").unwrap(),
            json!("postgres")
        );
        assert_eq!(
            extract(&secret(), r#"{.metadata.labels["app.kubernetes.io/name"]}"#).unwrap(),
            json!("postgres")
        );
        assert_eq!(extract(&secret(), r"{.data.tls\.crt}").unwrap(), json!("Y2VydA=="));
    }

    #[test]
    fn test_wildcard_collects_matches() {
        assert_eq!(extract(&secret(), "{.spec.ports[*].port}").unwrap(), json!([80, 443]));
        assert!(JsonPath::parse("{.spec.ports[*].port}").unwrap().has_wildcard());
        assert!(matches!(
            extract(&secret(), "{.spec.ports[*].missing}"),
            Err(PathError::NotFound(_))
        ));
    }

    #[test]
    fn test_missing_and_null_values() {
        assert_eq!(
            extract(&secret(), "{.data.username}").unwrap_err(),
            PathError::NotFound("username".to_string())
        );
        assert!(matches!(
            extract(&secret(), "{.spec.empty}"),
            Err(PathError::NotFound(_))
        ));
        assert!(matches!(
            extract(&secret(), "{.data.password.inner}"),
            Err(PathError::NotFound(_))
        ));
    }

    #[test]
    fn test_parse_errors() {
        for path in [".data.password", "{data.password}", "{.data[}", "{.data[x]}", "{.a..b}"] {
            assert!(
                matches!(JsonPath::parse(path), Err(PathError::Parse { .. })),
                "{path} should not parse"
            );
        }
    }
}
