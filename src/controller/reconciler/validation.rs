//! # Template Validation
//!
//! Checks a Composable template before any reference is resolved.
//!
//! Only runs when no admission webhook validates Composables (`ADMISSION_CONTROL=false`).
//! Every problem is collected, so the status message lists them all at once.

use crate::crd::Composable;
use crate::resolver::reference::{
    FORMAT_TRANSFORMERS, GET_VALUE_FROM, KIND, LABELS, NAME, PATH,
};
use crate::transformers;
use kube::Resource;
use serde_json::{Map, Value};
use std::fmt;
use thiserror::Error;

const TEMPLATE_ROOT: &str = "spec.template";
const BOTH_NAME_AND_LABELS: &str =
    "cannot specify both \"name\" and \"labels\" (only one of them can be specified)";
const NAME_OR_LABELS: &str = "missing required field \"name\" or \"labels\"";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldErrorType {
    Required,
    Invalid,
}

/// A single problem at a field path
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldError {
    pub field: String,
    pub error_type: FieldErrorType,
    /// Offending value, for `Invalid` errors
    pub value: Option<String>,
    pub detail: String,
}

impl FieldError {
    fn required(field: String, detail: impl Into<String>) -> Self {
        Self {
            field,
            error_type: FieldErrorType::Required,
            value: None,
            detail: detail.into(),
        }
    }

    fn invalid(field: String, value: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            field,
            error_type: FieldErrorType::Invalid,
            value: Some(value.into()),
            detail: detail.into(),
        }
    }
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.error_type, &self.value) {
            (FieldErrorType::Invalid, Some(value)) => {
                write!(f, "{}: Invalid value: {value:?}: {}", self.field, self.detail)
            }
            (FieldErrorType::Invalid, None) => {
                write!(f, "{}: Invalid value: {}", self.field, self.detail)
            }
            (FieldErrorType::Required, _) => {
                write!(f, "{}: Required value: {}", self.field, self.detail)
            }
        }
    }
}

/// All problems found in one Composable template
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub struct ValidationError {
    pub name: String,
    pub errors: Vec<FieldError>,
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{} {:?} is invalid: ",
            Composable::kind(&()),
            Composable::group(&()),
            self.name
        )?;
        match self.errors.as_slice() {
            [single] => write!(f, "{single}"),
            errors => {
                let joined = errors
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join(", ");
                write!(f, "[{joined}]")
            }
        }
    }
}

/// Validate a decoded template for Composable `name`
pub fn validate_template(name: &str, template: &Map<String, Value>) -> Result<(), ValidationError> {
    let mut errors = validate_api_version_kind(template);
    find_get_value_from(TEMPLATE_ROOT, template, &mut errors);

    if errors.is_empty() {
        Ok(())
    } else {
        Err(ValidationError {
            name: name.to_string(),
            errors,
        })
    }
}

fn validate_api_version_kind(template: &Map<String, Value>) -> Vec<FieldError> {
    ["apiVersion", "kind"]
        .into_iter()
        .filter(|field| !is_non_empty_string(template.get(*field)))
        .map(|field| {
            FieldError::required(
                format!("{TEMPLATE_ROOT}.{field}"),
                format!("missing required field {field:?}"),
            )
        })
        .collect()
}

fn find_get_value_from(path: &str, map: &Map<String, Value>, errors: &mut Vec<FieldError>) {
    for (key, value) in map {
        visit(&format!("{path}.{key}"), value, errors);
    }
}

fn visit(path: &str, value: &Value, errors: &mut Vec<FieldError>) {
    match value {
        Value::Object(child) => match child.get(GET_VALUE_FROM) {
            Some(directive) if !directive.is_null() => {
                validate_get_value_from(&format!("{path}.{GET_VALUE_FROM}"), directive, errors);
            }
            _ => find_get_value_from(path, child, errors),
        },
        Value::Array(items) => {
            for (index, item) in items.iter().enumerate() {
                visit(&format!("{path}[{index}]"), item, errors);
            }
        }
        _ => {}
    }
}

fn validate_get_value_from(path: &str, directive: &Value, errors: &mut Vec<FieldError>) {
    let Value::Object(fields) = directive else {
        errors.push(FieldError::invalid(
            path.to_string(),
            transformers::render(directive),
            "getValueFrom must be an object",
        ));
        return;
    };

    let name = fields.get(NAME).and_then(Value::as_str).unwrap_or_default();
    let labels = fields.get(LABELS).and_then(Value::as_object);

    match (name.is_empty(), labels) {
        (true, None) => {
            errors.push(FieldError::required(format!("{path}.{NAME}"), NAME_OR_LABELS));
            errors.push(FieldError::required(format!("{path}.{LABELS}"), NAME_OR_LABELS));
        }
        (false, Some(labels)) => {
            errors.push(FieldError::invalid(
                format!("{path}.{NAME}"),
                name,
                BOTH_NAME_AND_LABELS,
            ));
            errors.push(FieldError::invalid(
                format!("{path}.{LABELS}"),
                render_labels(labels),
                BOTH_NAME_AND_LABELS,
            ));
        }
        _ => {}
    }

    for required in [KIND, PATH] {
        if !is_non_empty_string(fields.get(required)) {
            errors.push(FieldError::required(
                format!("{path}.{required}"),
                format!("missing required field {required:?}"),
            ));
        }
    }

    if let Some(Value::Array(names)) = fields.get(FORMAT_TRANSFORMERS) {
        for entry in names {
            let known = entry.as_str().is_some_and(transformers::is_registered);
            if !known {
                errors.push(FieldError::invalid(
                    format!("{path}.{FORMAT_TRANSFORMERS}"),
                    transformers::render(entry),
                    "unknown format-transformer",
                ));
            }
        }
    }
}

fn is_non_empty_string(value: Option<&Value>) -> bool {
    value.and_then(Value::as_str).is_some_and(|s| !s.is_empty())
}

fn render_labels(labels: &Map<String, Value>) -> String {
    labels
        .iter()
        .map(|(k, v)| format!("{k}:{}", transformers::render(v)))
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn template(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            other => panic!("not an object: {other}"),
        }
    }

    #[test]
    fn test_valid_template_passes() {
        let t = template(json!({
            "apiVersion": "v1",
            "kind": "ConfigMap",
            "metadata": {"name": "cm"},
            "data": {
                "host": {"getValueFrom": {"kind": "Service", "name": "db", "path": "{.spec.clusterIP}"}},
                "ports": [
                    {"getValueFrom": {"kind": "Service", "labels": {"app": "db"}, "path": "{.spec.ports[0].port}",
                        "format-transformers": ["ToString"]}}
                ]
            }
        }));
        assert!(validate_template("comp", &t).is_ok());
    }

    #[test]
    fn test_missing_api_version_and_kind_lists_both() {
        let err = validate_template("comp", &template(json!({"metadata": {}}))).unwrap_err();
        let fields: Vec<_> = err.errors.iter().map(|e| e.field.as_str()).collect();
        assert_eq!(fields, vec!["spec.template.apiVersion", "spec.template.kind"]);
        assert!(err
            .to_string()
            .contains("spec.template.kind: Required value: missing required field \"kind\""));
        assert!(err.to_string().starts_with("Composable.ibmcloud.ibm.com \"comp\" is invalid: ["));
    }

    #[test]
    fn test_neither_name_nor_labels() {
        let t = template(json!({
            "apiVersion": "v1",
            "kind": "ConfigMap",
            "data": {"x": {"getValueFrom": {"kind": "Secret", "path": "{.data.x}"}}}
        }));
        let err = validate_template("comp", &t).unwrap_err();
        assert_eq!(err.errors.len(), 2);
        assert_eq!(err.errors[0].field, "spec.template.data.x.getValueFrom.name");
        assert_eq!(err.errors[1].field, "spec.template.data.x.getValueFrom.labels");
        assert!(err
            .errors
            .iter()
            .all(|e| e.error_type == FieldErrorType::Required));
    }

    #[test]
    fn test_both_name_and_labels_inside_array() {
        let t = template(json!({
            "apiVersion": "v1",
            "kind": "ConfigMap",
            "items": [{}, {"getValueFrom": {
                "kind": "Secret", "name": "s", "labels": {"app": "x"}, "path": "{.data.x}"
            }}]
        }));
        let err = validate_template("comp", &t).unwrap_err();
        assert_eq!(err.errors.len(), 2);
        assert_eq!(err.errors[0].field, "spec.template.items[1].getValueFrom.name");
        assert_eq!(err.errors[0].error_type, FieldErrorType::Invalid);
        assert_eq!(err.errors[1].value.as_deref(), Some("app:x"));
    }

    #[test]
    fn test_missing_kind_path_and_unknown_transformer() {
        let t = template(json!({
            "apiVersion": "v1",
            "kind": "ConfigMap",
            "data": {"x": {"getValueFrom": {"name": "s", "format-transformers": ["ToString", "ToYaml"]}}}
        }));
        let err = validate_template("comp", &t).unwrap_err();
        let rendered: Vec<_> = err.errors.iter().map(ToString::to_string).collect();
        assert_eq!(
            rendered,
            vec![
                "spec.template.data.x.getValueFrom.kind: Required value: missing required field \"kind\"",
                "spec.template.data.x.getValueFrom.path: Required value: missing required field \"path\"",
                "spec.template.data.x.getValueFrom.format-transformers: Invalid value: \"ToYaml\": unknown format-transformer",
            ]
        );
    }
}
