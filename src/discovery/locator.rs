//! # Locator
//!
//! Resolves a `(kind, apiVersion)` pair from a reference to a single
//! [`ApiResourceDescriptor`].
//!
//! `kind` is matched case-insensitively against a resource's plural, singular,
//! Kind, short names, and `plural.group`. Subresources never match.
//!
//! The `apiVersion` hint may be:
//! - empty: every preferred resource is searched and core-group matches win outright
//! - a group-version (`apps/v1`) or a core version (`v1`): only that group-version is searched
//! - a bare group (`apps`): the preferred list is filtered to that group
//!
//! Without a hint, more than one distinct match is an error. Silently picking
//! one would resolve against the wrong CRD when two groups define the same Kind.

use super::{
    group_qualified_name, parse_group_version, ApiResourceDescriptor, DiscoveryError,
    ResourceDiscovery,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{APIResource, APIResourceList};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Clone, Error)]
pub enum LocatorError {
    #[error("Unable to find api resource named {kind:?}")]
    NotFound { kind: String },

    #[error(
        "Multiple resources are matched by {kind:?}: {}. A group-qualified plural name must be provided",
        .candidates.join(", ")
    )]
    Ambiguous {
        kind: String,
        candidates: Vec<String>,
    },

    #[error(transparent)]
    Discovery(#[from] DiscoveryError),
}

/// How the `apiVersion` of a reference narrows the search
#[derive(Debug, Clone, PartialEq, Eq)]
enum VersionHint {
    None,
    GroupVersion(String),
    Group(String),
}

impl VersionHint {
    fn parse(api_version: Option<&str>) -> Self {
        match api_version.map(str::trim) {
            None | Some("") => VersionHint::None,
            Some(v) if v.contains('/') || is_core_version(v) => {
                VersionHint::GroupVersion(v.to_string())
            }
            Some(group) => VersionHint::Group(group.to_string()),
        }
    }

    fn is_pinned(&self) -> bool {
        !matches!(self, VersionHint::None)
    }
}

/// `v1`, `v2beta1`, ... : a version of the core group rather than a group name
fn is_core_version(value: &str) -> bool {
    let mut chars = value.chars();
    chars.next() == Some('v') && chars.next().is_some_and(|c| c.is_ascii_digit())
}

/// True when `kind` names this resource
///
/// Subresources (`pods/log`) are never matched.
#[must_use]
pub fn name_matches_resource(kind: &str, resource: &APIResource, group: &str) -> bool {
    if resource.name.contains('/') {
        return false;
    }
    let wanted = kind.to_lowercase();
    let name = resource.name.to_lowercase();
    wanted == name
        || wanted == resource.singular_name.to_lowercase()
        || wanted == resource.kind.to_lowercase()
        || (!group.is_empty() && wanted == format!("{name}.{}", group.to_lowercase()))
        || resource
            .short_names
            .iter()
            .flatten()
            .any(|short| short.to_lowercase() == wanted)
}

/// Find the API resource a reference points at
pub async fn lookup_api_resource(
    discovery: &dyn ResourceDiscovery,
    kind: &str,
    api_version: Option<&str>,
) -> Result<ApiResourceDescriptor, LocatorError> {
    let hint = VersionHint::parse(api_version);
    debug!(kind = kind, hint = ?hint, "Looking up API resource");

    let lists = match &hint {
        VersionHint::GroupVersion(gv) => {
            vec![discovery.server_resources_for_group_version(gv).await?]
        }
        VersionHint::Group(group) => discovery
            .server_preferred_resources()
            .await?
            .into_iter()
            .filter(|list| parse_group_version(&list.group_version).0 == *group)
            .collect(),
        VersionHint::None => discovery.server_preferred_resources().await?,
    };

    select(kind, &hint, &lists)
}

fn select(
    kind: &str,
    hint: &VersionHint,
    lists: &[APIResourceList],
) -> Result<ApiResourceDescriptor, LocatorError> {
    let mut target: Option<ApiResourceDescriptor> = None;
    let mut matched: Vec<String> = Vec::new();

    for list in lists {
        let (group, version) = parse_group_version(&list.group_version);
        for resource in &list.resources {
            if !name_matches_resource(kind, resource, &group) {
                continue;
            }
            let descriptor = ApiResourceDescriptor::from_discovery(resource, &group, &version);
            if group.is_empty() && !hint.is_pinned() {
                // Core objects take precedence over any CRD with the same name
                return Ok(descriptor);
            }
            let qualified = group_qualified_name(&resource.name, &group);
            if !matched.contains(&qualified) {
                matched.push(qualified);
            }
            target.get_or_insert(descriptor);
        }
    }

    if !hint.is_pinned() && matched.len() > 1 {
        return Err(LocatorError::Ambiguous {
            kind: kind.to_string(),
            candidates: matched,
        });
    }

    target.ok_or_else(|| LocatorError::NotFound {
        kind: kind.to_string(),
    })
}
