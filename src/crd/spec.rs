//! # Composable Spec
//!
//! Main CRD specification type.

use schemars::{Schema, SchemaGenerator};
use serde::{Deserialize, Serialize};

/// Composable Custom Resource Definition
///
/// A Composable wraps an arbitrary Kubernetes object template. Any value in the
/// template may be replaced by a `getValueFrom` directive that is resolved
/// against live cluster objects on every reconcile.
///
/// # Example
///
/// ```yaml
/// apiVersion: ibmcloud.ibm.com/v1alpha1
/// kind: Composable
/// metadata:
///   name: comp
///   namespace: default
/// spec:
///   template:
///     apiVersion: v1
///     kind: ConfigMap
///     metadata:
///       name: app-settings
///     data:
///       dbPassword:
///         getValueFrom:
///           kind: Secret
///           name: db-credentials
///           path: '{.data.password}'
///           format-transformers:
///             - Base64ToString
/// ```
#[derive(kube::CustomResource, Debug, Clone, Deserialize, Serialize, schemars::JsonSchema)]
#[kube(
    kind = "Composable",
    group = "ibmcloud.ibm.com",
    version = "v1alpha1",
    namespaced,
    status = "crate::crd::ComposableStatus",
    shortname = "comp",
    printcolumn = r#"{"name":"State", "type":"string", "jsonPath":".status.state"}, {"name":"Message", "type":"string", "jsonPath":".status.message"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct ComposableSpec {
    /// Template of the underlying object
    /// Kept as an opaque JSON document; decoded and resolved by the controller
    #[serde(default)]
    #[schemars(schema_with = "template_schema")]
    pub template: Option<serde_json::Value>,
}

fn template_schema(_gen: &mut SchemaGenerator) -> Schema {
    // The template is an arbitrary object manifest, so the schema has to keep unknown fields
    schemars::json_schema!({
        "type": "object",
        "description": "Template of the underlying object. Values may be replaced by getValueFrom references.",
        "x-kubernetes-preserve-unknown-fields": true,
        "x-kubernetes-embedded-resource": false
    })
}
