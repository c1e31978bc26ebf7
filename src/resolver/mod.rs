//! # Reference Resolver
//!
//! Rewrites a template by replacing every `getValueFrom` directive with the
//! value it points at.
//!
//! For each directive the resolver:
//! 1. locates the API resource of `kind` (optionally narrowed by `apiVersion`)
//! 2. fetches the object by `name`, or lists by `labels` and requires exactly one match
//! 3. extracts `path` from the object
//! 4. runs the `format-transformers` pipeline
//!
//! Missing objects and values fall back to `defaultValue` when one is given.
//! Lookups are memoized for the duration of one `resolve` call, failures included.
//!
//! The walk is sequential and depth-first; nothing is written to the cluster.

pub mod cache;
pub mod error;
pub mod path;
pub mod reference;

pub use cache::{cache_key, ResolutionCache, Selector};
pub use error::{
    is_ill_formed_reference, is_kind_not_found, is_object_not_found, is_ref_not_found,
    is_value_not_found, Disposition, ResolveError,
};
pub use reference::ValueReference;

use crate::discovery::{lookup_api_resource, ApiResourceDescriptor, ResourceDiscovery};
use crate::observability;
use crate::store::{ObjectStore, StoreError};
use crate::transformers;
use cache::Cached;
use futures::future::{BoxFuture, FutureExt};
use reference::{GET_VALUE_FROM, NAMESPACE};
use serde_json::{Map, Value};
use tracing::{debug, warn};

const METADATA: &str = "metadata";

/// Resolves templates against the cluster
pub struct Resolver<'a> {
    store: &'a dyn ObjectStore,
    discovery: &'a dyn ResourceDiscovery,
}

impl std::fmt::Debug for Resolver<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Resolver").finish_non_exhaustive()
    }
}

impl<'a> Resolver<'a> {
    #[must_use]
    pub fn new(store: &'a dyn ObjectStore, discovery: &'a dyn ResourceDiscovery) -> Self {
        Self { store, discovery }
    }

    /// Resolve every reference in `template`
    ///
    /// The template must carry a `metadata` map. Its namespace, when set, must
    /// equal `namespace`; when unset, `namespace` is injected.
    pub async fn resolve(
        &self,
        template: &Map<String, Value>,
        namespace: &str,
    ) -> Result<Map<String, Value>, ResolveError> {
        let mut resolved = template.clone();
        normalize_namespace(&mut resolved, namespace)?;

        let mut cache = ResolutionCache::new();
        let mut root = Value::Object(resolved);
        let outcome = self.resolve_fields(&mut root, namespace, &mut cache).await;
        observability::metrics::increment_resolution_cache_hits(cache.hits());
        outcome?;

        match root {
            Value::Object(map) => Ok(map),
            // The root started as a map and only nested nodes are replaced
            other => Err(ResolveError::IllFormedReference(format!(
                "resolved template is not an object: {other}"
            ))),
        }
    }

    fn resolve_fields<'b>(
        &'b self,
        node: &'b mut Value,
        namespace: &'b str,
        cache: &'b mut ResolutionCache,
    ) -> BoxFuture<'b, Result<(), ResolveError>> {
        async move {
            if let Some(directive) = directive_of(node)? {
                *node = self.resolve_value(&directive, namespace, cache).await?;
                return Ok(());
            }
            match node {
                Value::Object(map) => {
                    for child in map.values_mut() {
                        self.resolve_fields(child, namespace, cache).await?;
                    }
                }
                Value::Array(items) => {
                    for item in items.iter_mut() {
                        self.resolve_fields(item, namespace, cache).await?;
                    }
                }
                _ => {}
            }
            Ok(())
        }
        .boxed()
    }

    /// Resolve the body of a single `getValueFrom`
    pub async fn resolve_value(
        &self,
        directive: &Value,
        namespace: &str,
        cache: &mut ResolutionCache,
    ) -> Result<Value, ResolveError> {
        let result = self.resolve_reference(directive, namespace, cache).await;
        match result {
            Ok(value) => {
                observability::metrics::increment_references_resolved();
                Ok(value)
            }
            Err((err, Some(default))) if err.accepts_default() => {
                debug!(error = %err, "Reference not found, using defaultValue");
                observability::metrics::increment_references_resolved();
                Ok(default)
            }
            Err((err, _)) => {
                observability::metrics::increment_reference_errors(err.class());
                Err(err)
            }
        }
    }

    /// Errors come back paired with the reference's default, if it got far enough to parse one
    async fn resolve_reference(
        &self,
        directive: &Value,
        namespace: &str,
        cache: &mut ResolutionCache,
    ) -> Result<Value, (ResolveError, Option<Value>)> {
        let reference = ValueReference::parse(directive).map_err(|e| (e, None))?;
        let with_default = |err: ResolveError| (err, reference.default_value.clone());

        let resource = lookup_api_resource(
            self.discovery,
            &reference.kind,
            reference.api_version.as_deref(),
        )
        .await
        .map_err(|e| with_default(e.into()))?;

        let object = self
            .fetch_object(&reference, &resource, namespace, cache)
            .await
            .map_err(with_default)?;
        let value = path::extract(&object, &reference.path).map_err(|e| with_default(e.into()))?;

        transformers::compound_transformer_names(value, &reference.transformers)
            .map_err(|e| with_default(e.into()))
    }

    async fn fetch_object(
        &self,
        reference: &ValueReference,
        resource: &ApiResourceDescriptor,
        namespace: &str,
        cache: &mut ResolutionCache,
    ) -> Result<Value, ResolveError> {
        let target_namespace = resource
            .namespaced
            .then(|| reference.namespace.as_deref().unwrap_or(namespace));
        let key = cache_key(
            &reference.selector,
            target_namespace.unwrap_or_default(),
            &resource.gvk(),
        );

        match cache.lookup(&key) {
            Cached::Object(object) => {
                debug!(key = key.as_str(), "Resolution cache hit");
                return Ok(object.clone());
            }
            Cached::Tombstone(err) => {
                debug!(key = key.as_str(), "Resolution cache hit (tombstone)");
                return Err(err.clone());
            }
            Cached::Miss => {}
        }

        let result = match &reference.selector {
            Selector::Name(name) => self
                .store
                .get(resource, target_namespace, name)
                .await
                .map_err(|e| classify_store_error(e, resource))
                .and_then(|object| to_value(&object)),
            Selector::Labels(labels) => {
                match self.store.list(resource, target_namespace, labels).await {
                    Ok(items) if items.len() == 1 => to_value(&items[0]),
                    Ok(items) => Err(ResolveError::ObjectNotFound(format!(
                        "list object returned {} items for {} {} in namespace {:?}",
                        items.len(),
                        resource.kind,
                        reference.selector,
                        target_namespace.unwrap_or_default()
                    ))),
                    Err(e) => Err(classify_store_error(e, resource)),
                }
            }
        };

        match &result {
            Ok(object) => cache.insert(key, object.clone()),
            Err(err @ ResolveError::ObjectNotFound(_)) => cache.tombstone(key, err.clone()),
            Err(err) => warn!(key = key.as_str(), error = %err, "Object lookup failed"),
        }
        result
    }
}

/// Body of the `getValueFrom` key when `node` is a directive
///
/// A directive must be the only key of its map.
fn directive_of(node: &Value) -> Result<Option<Value>, ResolveError> {
    let Value::Object(map) = node else {
        return Ok(None);
    };
    match map.get(GET_VALUE_FROM) {
        None => Ok(None),
        Some(_) if map.len() > 1 => Err(ResolveError::IllFormedReference(
            "GetValueFrom must be the only field in a value".to_string(),
        )),
        Some(directive) => Ok(Some(directive.clone())),
    }
}

/// Check or inject the template namespace
fn normalize_namespace(template: &mut Map<String, Value>, namespace: &str) -> Result<(), ResolveError> {
    let metadata = template
        .get_mut(METADATA)
        .and_then(Value::as_object_mut)
        .ok_or_else(|| {
            ResolveError::IllFormedReference(
                "Failed: the template does not contain a metadata section".to_string(),
            )
        })?;

    match metadata.get(NAMESPACE) {
        None | Some(Value::Null) => {
            metadata.insert(NAMESPACE.to_string(), Value::String(namespace.to_string()));
            Ok(())
        }
        Some(Value::String(ns)) if ns == namespace => Ok(()),
        Some(Value::String(ns)) => Err(ResolveError::IllFormedReference(format!(
            "the template namespace {ns:?} does not match the Composable namespace {namespace:?}"
        ))),
        Some(other) => Err(ResolveError::IllFormedReference(format!(
            "metadata.namespace must be a string, got {other}"
        ))),
    }
}

fn classify_store_error(err: StoreError, resource: &ApiResourceDescriptor) -> ResolveError {
    match err {
        StoreError::NotFound { .. } => ResolveError::ObjectNotFound(format!("{err} ({resource})")),
        other => ResolveError::Api(other.to_string()),
    }
}

fn to_value(object: &kube::api::DynamicObject) -> Result<Value, ResolveError> {
    serde_json::to_value(object).map_err(|e| ResolveError::Api(format!("cannot encode object: {e}")))
}
