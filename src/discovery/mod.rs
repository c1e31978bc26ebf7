//! # Discovery
//!
//! API resource discovery and the locator that turns a reference's
//! `kind`/`apiVersion` into a fully qualified resource descriptor.
//!
//! ## Module Structure
//!
//! - `cluster.rs` - Process-wide cached discovery backed by the API server
//! - `locator.rs` - Matching and disambiguation of resource names

mod cluster;
pub mod locator;

pub use cluster::KubeDiscovery;
pub use locator::{lookup_api_resource, name_matches_resource, LocatorError};

use async_trait::async_trait;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{APIResource, APIResourceList};
use kube::core::{ApiResource, GroupVersionKind};
use std::fmt;
use thiserror::Error;

/// Errors returned by a discovery backend
#[derive(Debug, Clone, Error)]
pub enum DiscoveryError {
    #[error("the server could not find the requested resource, GroupVersion {0:?} not found")]
    GroupVersionNotFound(String),

    #[error("discovery request failed: {0}")]
    Request(String),
}

impl From<kube::Error> for DiscoveryError {
    fn from(error: kube::Error) -> Self {
        DiscoveryError::Request(error.to_string())
    }
}

/// Server-side resource discovery
///
/// Implementations may cache the preferred resource list; `invalidate` drops
/// that cache so newly installed CRDs become visible.
#[async_trait]
pub trait ResourceDiscovery: Send + Sync {
    /// Preferred version of every resource the server serves
    async fn server_preferred_resources(&self) -> Result<Vec<APIResourceList>, DiscoveryError>;

    /// Resources served under a single group-version (`apps/v1`, `v1`)
    async fn server_resources_for_group_version(
        &self,
        group_version: &str,
    ) -> Result<APIResourceList, DiscoveryError>;

    /// Drop any cached discovery data
    fn invalidate(&self);
}

/// Fully qualified API resource
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ApiResourceDescriptor {
    pub group: String,
    pub version: String,
    pub kind: String,
    /// Plural resource name
    pub name: String,
    pub singular_name: String,
    pub short_names: Vec<String>,
    pub namespaced: bool,
}

impl ApiResourceDescriptor {
    /// Build a descriptor from a discovery entry and the group-version it was listed under
    #[must_use]
    pub fn from_discovery(resource: &APIResource, group: &str, version: &str) -> Self {
        Self {
            group: group.to_string(),
            version: version.to_string(),
            kind: resource.kind.clone(),
            name: resource.name.clone(),
            singular_name: resource.singular_name.clone(),
            short_names: resource.short_names.clone().unwrap_or_default(),
            namespaced: resource.namespaced,
        }
    }

    /// `group/version`, or just `version` for the core group
    #[must_use]
    pub fn api_version(&self) -> String {
        if self.group.is_empty() {
            self.version.clone()
        } else {
            format!("{}/{}", self.group, self.version)
        }
    }

    #[must_use]
    pub fn gvk(&self) -> GroupVersionKind {
        GroupVersionKind::gvk(&self.group, &self.version, &self.kind)
    }

    /// `plural.group`, or the plain plural for the core group
    #[must_use]
    pub fn group_qualified_name(&self) -> String {
        group_qualified_name(&self.name, &self.group)
    }

    /// Dynamic API handle parameters
    #[must_use]
    pub fn to_api_resource(&self) -> ApiResource {
        ApiResource {
            group: self.group.clone(),
            version: self.version.clone(),
            api_version: self.api_version(),
            kind: self.kind.clone(),
            plural: self.name.clone(),
        }
    }
}

impl fmt::Display for ApiResourceDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}, Kind={}", self.api_version(), self.kind)
    }
}

pub(crate) fn group_qualified_name(name: &str, group: &str) -> String {
    if group.is_empty() {
        name.to_string()
    } else {
        format!("{name}.{group}")
    }
}

/// Split `group/version` (or a bare core `version`) into its parts
#[must_use]
pub fn parse_group_version(group_version: &str) -> (String, String) {
    match group_version.split_once('/') {
        Some((group, version)) => (group.to_string(), version.to_string()),
        None => (String::new(), group_version.to_string()),
    }
}
