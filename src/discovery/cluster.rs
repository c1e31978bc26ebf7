//! # Cluster Discovery
//!
//! `ResourceDiscovery` backed by the API server's discovery endpoints.
//!
//! The preferred resource list is expensive to build (one request per API
//! group), so it is cached process-wide until `invalidate` is called. The
//! reconciler invalidates once at the start of every pass.

use super::{DiscoveryError, ResourceDiscovery};
use async_trait::async_trait;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::APIResourceList;
use kube::Client;
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};

/// Discovery client with a cached preferred-resource list
pub struct KubeDiscovery {
    client: Client,
    preferred: Mutex<Option<Arc<Vec<APIResourceList>>>>,
}

impl std::fmt::Debug for KubeDiscovery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let cached = self.preferred.lock().map(|p| p.is_some()).unwrap_or(false);
        f.debug_struct("KubeDiscovery")
            .field("cached", &cached)
            .finish_non_exhaustive()
    }
}

impl KubeDiscovery {
    #[must_use]
    pub fn new(client: Client) -> Self {
        Self {
            client,
            preferred: Mutex::new(None),
        }
    }

    fn cached(&self) -> Option<Arc<Vec<APIResourceList>>> {
        match self.preferred.lock() {
            Ok(guard) => guard.clone(),
            Err(e) => {
                warn!("Failed to lock discovery cache: {}", e);
                None
            }
        }
    }

    fn store(&self, lists: Arc<Vec<APIResourceList>>) {
        match self.preferred.lock() {
            Ok(mut guard) => *guard = Some(lists),
            Err(e) => warn!("Failed to lock discovery cache: {}", e),
        }
    }

    async fn fetch_preferred(&self) -> Result<Vec<APIResourceList>, DiscoveryError> {
        let mut lists = Vec::new();

        // Core group: the server lists versions in preference order
        let core = self.client.list_core_api_versions().await?;
        if let Some(version) = core.versions.first() {
            let mut list = self.client.list_core_api_resources(version).await?;
            list.group_version.clone_from(version);
            lists.push(list);
        }

        let groups = self.client.list_api_groups().await?;
        for group in groups.groups {
            let Some(group_version) = group
                .preferred_version
                .as_ref()
                .map(|v| v.group_version.clone())
                .or_else(|| group.versions.first().map(|v| v.group_version.clone()))
            else {
                continue;
            };
            match self.client.list_api_group_resources(&group_version).await {
                Ok(list) => lists.push(list),
                // An aggregated API that is down should not hide every other group
                Err(e) => warn!(
                    group_version = group_version.as_str(),
                    error = %e,
                    "Skipping unavailable API group during discovery"
                ),
            }
        }

        debug!(groups = lists.len(), "Fetched preferred API resources");
        Ok(lists)
    }
}

#[async_trait]
impl ResourceDiscovery for KubeDiscovery {
    async fn server_preferred_resources(&self) -> Result<Vec<APIResourceList>, DiscoveryError> {
        if let Some(lists) = self.cached() {
            return Ok(lists.as_ref().clone());
        }
        let lists = Arc::new(self.fetch_preferred().await?);
        self.store(Arc::clone(&lists));
        Ok(lists.as_ref().clone())
    }

    async fn server_resources_for_group_version(
        &self,
        group_version: &str,
    ) -> Result<APIResourceList, DiscoveryError> {
        let result = if group_version.contains('/') {
            self.client.list_api_group_resources(group_version).await
        } else {
            self.client.list_core_api_resources(group_version).await
        };
        match result {
            Ok(mut list) => {
                if list.group_version.is_empty() {
                    list.group_version = group_version.to_string();
                }
                Ok(list)
            }
            Err(kube::Error::Api(resp)) if resp.code == 404 => {
                Err(DiscoveryError::GroupVersionNotFound(group_version.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    fn invalidate(&self) {
        match self.preferred.lock() {
            Ok(mut guard) => *guard = None,
            Err(e) => warn!("Failed to lock discovery cache: {}", e),
        }
    }
}
