//! # Underlying Objects
//!
//! Creates or updates the object described by a resolved template.
//!
//! The Composable becomes the controller owner of that object, so Kubernetes
//! garbage collection removes it together with the Composable and its changes
//! are routed back to the owning Composable through the dynamic watches.

use crate::controller::reconciler::types::Reconciler;
use crate::controller::watches::WatchError;
use crate::crd::Composable;
use crate::discovery::{lookup_api_resource, ApiResourceDescriptor, LocatorError};
use crate::observability;
use crate::store::StoreError;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::api::DynamicObject;
use kube::Resource;
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::{debug, info};

/// Top-level fields that are never compared or copied onto an existing object
const UNMANAGED_FIELDS: [&str; 4] = ["apiVersion", "kind", "metadata", "status"];

#[derive(Debug, Error)]
pub enum UnderlyingError {
    #[error("Template does not contain {0}")]
    MissingField(&'static str),
    #[error("Resolved template is not a valid object: {0}")]
    Malformed(String),
    #[error("Composable {0:?} has no uid yet")]
    MissingUid(String),
    #[error("Object {kind} {name:?} is already controlled by {owner_kind} {owner:?}")]
    AlreadyOwned {
        kind: String,
        name: String,
        owner_kind: String,
        owner: String,
    },
    #[error("Unable to locate the resource of the template: {0}")]
    Locate(#[from] LocatorError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Watch(#[from] WatchError),
}

/// What happened to the underlying object
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnderlyingOutcome {
    Created,
    Updated,
    Unchanged,
}

/// Identity of the object described by a resolved template
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectIdentity {
    pub name: String,
    pub namespace: String,
    pub api_version: String,
    pub kind: String,
}

impl ObjectIdentity {
    pub fn from_template(template: &Map<String, Value>) -> Result<Self, UnderlyingError> {
        let metadata = template.get("metadata").and_then(Value::as_object);
        let metadata_string = |field: &'static str| {
            metadata
                .and_then(|m| m.get(field))
                .and_then(Value::as_str)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .ok_or(UnderlyingError::MissingField(field))
        };
        let top_level_string = |field: &'static str| {
            template
                .get(field)
                .and_then(Value::as_str)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .ok_or(UnderlyingError::MissingField(field))
        };

        Ok(Self {
            name: metadata_string("name")?,
            namespace: metadata_string("namespace")?,
            api_version: top_level_string("apiVersion")?,
            kind: top_level_string("kind")?,
        })
    }
}

/// Make `composable` the controller owner of `object`
///
/// Fails when another object already controls it. An existing reference to
/// `composable` is refreshed in place.
pub fn set_controller_reference(
    composable: &Composable,
    object: &mut DynamicObject,
) -> Result<(), UnderlyingError> {
    let owner_ref = controller_owner_ref(composable)?;
    let owners = object.metadata.owner_references.get_or_insert_with(Vec::new);

    if let Some(existing) = owners
        .iter()
        .find(|o| o.controller == Some(true) && o.uid != owner_ref.uid)
    {
        return Err(UnderlyingError::AlreadyOwned {
            kind: object
                .types
                .as_ref()
                .map(|t| t.kind.clone())
                .unwrap_or_default(),
            name: object.metadata.name.clone().unwrap_or_default(),
            owner_kind: existing.kind.clone(),
            owner: existing.name.clone(),
        });
    }

    match owners.iter_mut().find(|o| o.uid == owner_ref.uid) {
        Some(existing) => *existing = owner_ref,
        None => owners.push(owner_ref),
    }
    Ok(())
}

fn controller_owner_ref(composable: &Composable) -> Result<OwnerReference, UnderlyingError> {
    composable
        .controller_owner_ref(&())
        .ok_or_else(|| {
            UnderlyingError::MissingUid(composable.metadata.name.clone().unwrap_or_default())
        })
}

/// Whether any managed top-level field of `desired` differs on `existing`
#[must_use]
pub fn differs(desired: &Value, existing: &Value) -> bool {
    let Some(desired) = desired.as_object() else {
        return false;
    };
    desired
        .iter()
        .filter(|(key, _)| !UNMANAGED_FIELDS.contains(&key.as_str()))
        .any(|(key, value)| existing.get(key) != Some(value))
}

fn copy_managed_fields(desired: &Value, existing: &mut Value) {
    let (Some(desired), Some(existing)) = (desired.as_object(), existing.as_object_mut()) else {
        return;
    };
    for (key, value) in desired {
        if !UNMANAGED_FIELDS.contains(&key.as_str()) {
            existing.insert(key.clone(), value.clone());
        }
    }
}

/// Create the object of `resolved`, or bring the existing one in line with it
pub async fn create_or_update(
    ctx: &Reconciler,
    composable: &Composable,
    resolved: Map<String, Value>,
) -> Result<UnderlyingOutcome, UnderlyingError> {
    let identity = ObjectIdentity::from_template(&resolved)?;
    debug!(
        resource.name = identity.name.as_str(),
        resource.namespace = identity.namespace.as_str(),
        kind = identity.kind.as_str(),
        api_version = identity.api_version.as_str(),
        "Underlying object resolved"
    );

    let resource =
        lookup_api_resource(ctx.discovery.as_ref(), &identity.kind, Some(&identity.api_version))
            .await?;

    let mut object: DynamicObject = serde_json::from_value(Value::Object(resolved))
        .map_err(|e| UnderlyingError::Malformed(e.to_string()))?;
    if !resource.namespaced {
        object.metadata.namespace = None;
    }
    set_controller_reference(composable, &mut object)?;

    let namespace = resource.namespaced.then_some(identity.namespace.as_str());
    match ctx.store.get(&resource, namespace, &identity.name).await {
        Ok(mut existing) => {
            ctx.watches.watch(&resource).await?;
            let owners_before = existing.metadata.owner_references.clone();
            set_controller_reference(composable, &mut existing)?;
            let adopted = existing.metadata.owner_references != owners_before;
            if !adopted && !differs(&object.data, &existing.data) {
                return Ok(UnderlyingOutcome::Unchanged);
            }
            copy_managed_fields(&object.data, &mut existing.data);
            ctx.store.update(&resource, &existing).await?;
            info!(
                resource.name = identity.name.as_str(),
                resource.namespace = identity.namespace.as_str(),
                gvk = %resource,
                "Updated underlying object"
            );
            observability::metrics::increment_underlying_objects_updated();
            Ok(UnderlyingOutcome::Updated)
        }
        Err(e) if e.is_not_found() => {
            create(ctx, &resource, &object, &identity).await?;
            Ok(UnderlyingOutcome::Created)
        }
        Err(e) => Err(e.into()),
    }
}

async fn create(
    ctx: &Reconciler,
    resource: &ApiResourceDescriptor,
    object: &DynamicObject,
    identity: &ObjectIdentity,
) -> Result<(), UnderlyingError> {
    info!(
        resource.name = identity.name.as_str(),
        resource.namespace = identity.namespace.as_str(),
        gvk = %resource,
        "Creating new underlying object"
    );
    ctx.store.create(resource, object).await?;
    observability::metrics::increment_underlying_objects_created();
    ctx.watches.watch(resource).await?;
    Ok(())
}
