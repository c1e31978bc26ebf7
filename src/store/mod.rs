//! # Object Store
//!
//! CRUD access to Composables and to arbitrary objects described by an
//! [`ApiResourceDescriptor`].
//!
//! The reconciler and resolver only talk to the cluster through
//! [`ObjectStore`], so the whole pipeline can run against an in-memory store.

mod cluster;

pub use cluster::KubeObjectStore;

use crate::crd::Composable;
use crate::discovery::ApiResourceDescriptor;
use async_trait::async_trait;
use kube::api::DynamicObject;
use std::collections::BTreeMap;
use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum StoreError {
    #[error("{kind} {name:?} not found")]
    NotFound { kind: String, name: String },

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("invalid object: {0}")]
    Invalid(String),

    #[error("API request failed: {0}")]
    Request(String),
}

impl StoreError {
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound { .. })
    }

    #[must_use]
    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::Conflict(_))
    }

    /// Classify a client error by HTTP status code
    #[must_use]
    pub fn from_kube(error: kube::Error, kind: &str, name: &str) -> Self {
        match error {
            kube::Error::Api(api_err) if api_err.code == 404 => StoreError::NotFound {
                kind: kind.to_string(),
                name: name.to_string(),
            },
            kube::Error::Api(api_err) if api_err.code == 409 => {
                StoreError::Conflict(api_err.message)
            }
            kube::Error::Api(api_err) if api_err.code == 422 => {
                StoreError::Invalid(api_err.message)
            }
            other => StoreError::Request(other.to_string()),
        }
    }
}

/// Cluster object access used by the reconciler
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Fetch a Composable; `Ok(None)` when it no longer exists
    async fn get_composable(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<Composable>, StoreError>;

    /// Write the status subresource of a Composable
    ///
    /// The write carries the object's `resourceVersion`, so a concurrent
    /// modification surfaces as [`StoreError::Conflict`].
    async fn update_composable_status(
        &self,
        composable: &Composable,
    ) -> Result<Composable, StoreError>;

    /// Get a single object by name; `namespace` is ignored for cluster-scoped resources
    async fn get(
        &self,
        resource: &ApiResourceDescriptor,
        namespace: Option<&str>,
        name: &str,
    ) -> Result<DynamicObject, StoreError>;

    /// List objects matching every label in `labels`
    async fn list(
        &self,
        resource: &ApiResourceDescriptor,
        namespace: Option<&str>,
        labels: &BTreeMap<String, String>,
    ) -> Result<Vec<DynamicObject>, StoreError>;

    async fn create(
        &self,
        resource: &ApiResourceDescriptor,
        object: &DynamicObject,
    ) -> Result<DynamicObject, StoreError>;

    async fn update(
        &self,
        resource: &ApiResourceDescriptor,
        object: &DynamicObject,
    ) -> Result<DynamicObject, StoreError>;
}

/// Render labels as an equality label selector (`a=1,b=2`)
#[must_use]
pub fn label_selector(labels: &BTreeMap<String, String>) -> String {
    labels
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join(",")
}
