//! # Cluster Object Store
//!
//! [`ObjectStore`] backed by the Kubernetes API.

use super::{label_selector, ObjectStore, StoreError};
use crate::constants::CONTROLLER_NAME;
use crate::crd::Composable;
use crate::discovery::ApiResourceDescriptor;
use async_trait::async_trait;
use kube::api::{Api, DynamicObject, ListParams, Patch, PatchParams, PostParams};
use kube::Client;
use std::collections::BTreeMap;
use tracing::debug;

#[derive(Clone)]
pub struct KubeObjectStore {
    client: Client,
}

impl std::fmt::Debug for KubeObjectStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KubeObjectStore").finish_non_exhaustive()
    }
}

impl KubeObjectStore {
    #[must_use]
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn dynamic_api(
        &self,
        resource: &ApiResourceDescriptor,
        namespace: Option<&str>,
    ) -> Api<DynamicObject> {
        let api_resource = resource.to_api_resource();
        match namespace {
            Some(ns) if resource.namespaced => {
                Api::namespaced_with(self.client.clone(), ns, &api_resource)
            }
            _ => Api::all_with(self.client.clone(), &api_resource),
        }
    }
}

#[async_trait]
impl ObjectStore for KubeObjectStore {
    async fn get_composable(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<Composable>, StoreError> {
        let api: Api<Composable> = Api::namespaced(self.client.clone(), namespace);
        match api.get(name).await {
            Ok(composable) => Ok(Some(composable)),
            Err(kube::Error::Api(api_err)) if api_err.code == 404 => Ok(None),
            Err(e) => Err(StoreError::from_kube(e, "Composable", name)),
        }
    }

    async fn update_composable_status(
        &self,
        composable: &Composable,
    ) -> Result<Composable, StoreError> {
        let name = composable.metadata.name.as_deref().unwrap_or_default();
        let namespace = composable.metadata.namespace.as_deref().unwrap_or("default");
        let api: Api<Composable> = Api::namespaced(self.client.clone(), namespace);

        // resourceVersion in a merge patch makes the API server reject stale writes with 409
        let patch = serde_json::json!({
            "metadata": { "resourceVersion": composable.metadata.resource_version },
            "status": composable.status,
        });

        debug!(
            resource.name = name,
            resource.namespace = namespace,
            "Patching Composable status"
        );
        api.patch_status(name, &PatchParams::apply(CONTROLLER_NAME), &Patch::Merge(patch))
            .await
            .map_err(|e| StoreError::from_kube(e, "Composable", name))
    }

    async fn get(
        &self,
        resource: &ApiResourceDescriptor,
        namespace: Option<&str>,
        name: &str,
    ) -> Result<DynamicObject, StoreError> {
        self.dynamic_api(resource, namespace)
            .get(name)
            .await
            .map_err(|e| StoreError::from_kube(e, &resource.kind, name))
    }

    async fn list(
        &self,
        resource: &ApiResourceDescriptor,
        namespace: Option<&str>,
        labels: &BTreeMap<String, String>,
    ) -> Result<Vec<DynamicObject>, StoreError> {
        let selector = label_selector(labels);
        let params = ListParams::default().labels(&selector);
        self.dynamic_api(resource, namespace)
            .list(&params)
            .await
            .map(|list| list.items)
            .map_err(|e| StoreError::from_kube(e, &resource.kind, &selector))
    }

    async fn create(
        &self,
        resource: &ApiResourceDescriptor,
        object: &DynamicObject,
    ) -> Result<DynamicObject, StoreError> {
        let name = object.metadata.name.as_deref().unwrap_or_default();
        self.dynamic_api(resource, object.metadata.namespace.as_deref())
            .create(&PostParams::default(), object)
            .await
            .map_err(|e| StoreError::from_kube(e, &resource.kind, name))
    }

    async fn update(
        &self,
        resource: &ApiResourceDescriptor,
        object: &DynamicObject,
    ) -> Result<DynamicObject, StoreError> {
        let name = object.metadata.name.as_deref().unwrap_or_default();
        self.dynamic_api(resource, object.metadata.namespace.as_deref())
            .replace(name, &PostParams::default(), object)
            .await
            .map_err(|e| StoreError::from_kube(e, &resource.kind, name))
    }
}
