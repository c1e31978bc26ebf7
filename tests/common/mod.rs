//! Common test utilities
//!
//! `FakeCluster` is an in-memory stand-in for the API server. It serves
//! discovery, stores objects and Composables, and records every call so tests
//! can assert on what the controller did.

#![allow(dead_code, reason = "each test binary uses a different subset")]

use async_trait::async_trait;
use composable_controller::config::ControllerConfig;
use composable_controller::controller::reconciler::Reconciler;
use composable_controller::controller::watches::{WatchError, WatchRegistry};
use composable_controller::crd::{Composable, ComposableSpec};
use composable_controller::discovery::{
    parse_group_version, ApiResourceDescriptor, DiscoveryError, ResourceDiscovery,
};
use composable_controller::store::{ObjectStore, StoreError};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{APIResource, APIResourceList};
use kube::api::DynamicObject;
use serde_json::Value;
use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// (apiVersion, plural, namespace, name); cluster-scoped objects use an empty namespace
type ObjectKey = (String, String, String, String);

#[derive(Debug, Default)]
pub struct CallCounts {
    pub gets: AtomicUsize,
    pub lists: AtomicUsize,
    pub creates: AtomicUsize,
    pub updates: AtomicUsize,
    pub status_updates: AtomicUsize,
    pub invalidations: AtomicUsize,
}

#[derive(Debug)]
pub struct FakeCluster {
    catalog: Vec<APIResourceList>,
    objects: Mutex<BTreeMap<ObjectKey, DynamicObject>>,
    composables: Mutex<BTreeMap<(String, String), Composable>>,
    watched: Mutex<Vec<String>>,
    /// Status writes still to be rejected with a conflict
    pending_status_conflicts: AtomicUsize,
    /// Errors returned, in order, by the next object reads
    pending_read_failures: Mutex<VecDeque<StoreError>>,
    pub calls: CallCounts,
}

pub fn api_resource(name: &str, singular: &str, kind: &str, namespaced: bool, short: &[&str]) -> APIResource {
    APIResource {
        name: name.to_string(),
        singular_name: singular.to_string(),
        kind: kind.to_string(),
        namespaced,
        short_names: (!short.is_empty()).then(|| short.iter().map(ToString::to_string).collect()),
        verbs: ["create", "get", "list", "update", "watch"]
            .iter()
            .map(ToString::to_string)
            .collect(),
        ..Default::default()
    }
}

pub fn resource_list(group_version: &str, resources: Vec<APIResource>) -> APIResourceList {
    APIResourceList {
        group_version: group_version.to_string(),
        resources,
    }
}

/// Core kinds, Deployments, Composables and two CRDs that both define `Topic`
pub fn default_catalog() -> Vec<APIResourceList> {
    vec![
        resource_list(
            "v1",
            vec![
                api_resource("configmaps", "configmap", "ConfigMap", true, &["cm"]),
                api_resource("secrets", "secret", "Secret", true, &[]),
                api_resource("services", "service", "Service", true, &["svc"]),
                api_resource("namespaces", "namespace", "Namespace", false, &["ns"]),
            ],
        ),
        resource_list(
            "apps/v1",
            vec![api_resource("deployments", "deployment", "Deployment", true, &["deploy"])],
        ),
        resource_list(
            "ibmcloud.ibm.com/v1alpha1",
            vec![api_resource("composables", "composable", "Composable", true, &["comp"])],
        ),
        resource_list(
            "kafka.example.com/v1",
            vec![api_resource("topics", "topic", "Topic", true, &[])],
        ),
        resource_list(
            "messaging.example.com/v1beta1",
            vec![api_resource("topics", "topic", "Topic", true, &[])],
        ),
    ]
}

impl Default for FakeCluster {
    fn default() -> Self {
        Self::with_catalog(default_catalog())
    }
}

impl FakeCluster {
    pub fn with_catalog(catalog: Vec<APIResourceList>) -> Self {
        Self {
            catalog,
            objects: Mutex::new(BTreeMap::new()),
            composables: Mutex::new(BTreeMap::new()),
            watched: Mutex::new(Vec::new()),
            pending_status_conflicts: AtomicUsize::new(0),
            pending_read_failures: Mutex::new(VecDeque::new()),
            calls: CallCounts::default(),
        }
    }

    /// Descriptor of `kind` served under `api_version`
    pub fn descriptor(&self, api_version: &str, kind: &str) -> ApiResourceDescriptor {
        let list = self
            .catalog
            .iter()
            .find(|list| list.group_version == api_version)
            .unwrap_or_else(|| panic!("{api_version} is not in the catalog"));
        let resource = list
            .resources
            .iter()
            .find(|r| r.kind == kind)
            .unwrap_or_else(|| panic!("{kind} is not served by {api_version}"));
        let (group, version) = parse_group_version(api_version);
        ApiResourceDescriptor::from_discovery(resource, &group, &version)
    }

    /// Seed an object; `apiVersion`, `kind` and `metadata.name` are required
    pub fn add_object(&self, manifest: Value) {
        let object: DynamicObject = serde_json::from_value(manifest).unwrap();
        let types = object.types.clone().unwrap();
        let descriptor = self.descriptor(&types.api_version, &types.kind);
        let key = key_of(&descriptor, object.metadata.namespace.as_deref(), &object.metadata.name.clone().unwrap());
        self.objects.lock().unwrap().insert(key, object);
    }

    pub fn object(&self, api_version: &str, kind: &str, namespace: Option<&str>, name: &str) -> Option<DynamicObject> {
        let descriptor = self.descriptor(api_version, kind);
        self.objects
            .lock()
            .unwrap()
            .get(&key_of(&descriptor, namespace, name))
            .cloned()
    }

    pub fn object_count(&self) -> usize {
        self.objects.lock().unwrap().len()
    }

    pub fn add_composable(&self, composable: Composable) {
        let key = (
            composable.metadata.namespace.clone().unwrap(),
            composable.metadata.name.clone().unwrap(),
        );
        self.composables.lock().unwrap().insert(key, composable);
    }

    pub fn composable(&self, namespace: &str, name: &str) -> Option<Composable> {
        self.composables
            .lock()
            .unwrap()
            .get(&(namespace.to_string(), name.to_string()))
            .cloned()
    }

    /// Replace the template of a stored Composable, as a user edit would
    pub fn edit_template(&self, namespace: &str, name: &str, template: Value) {
        let mut composables = self.composables.lock().unwrap();
        let stored = composables
            .get_mut(&(namespace.to_string(), name.to_string()))
            .unwrap();
        stored.spec.template = Some(template);
        bump_resource_version(&mut stored.metadata.resource_version);
    }

    /// Reject the next `count` status writes with a conflict
    pub fn fail_next_status_updates(&self, count: usize) {
        self.pending_status_conflicts.store(count, Ordering::SeqCst);
    }

    /// Fail the next object reads (`get` or `list`) with `errors`, one per call
    pub fn fail_next_reads(&self, errors: impl IntoIterator<Item = StoreError>) {
        self.pending_read_failures.lock().unwrap().extend(errors);
    }

    fn take_read_failure(&self) -> Option<StoreError> {
        self.pending_read_failures.lock().unwrap().pop_front()
    }

    pub fn remove_composable(&self, namespace: &str, name: &str) {
        self.composables
            .lock()
            .unwrap()
            .remove(&(namespace.to_string(), name.to_string()));
    }

    pub fn watched(&self) -> Vec<String> {
        self.watched.lock().unwrap().clone()
    }
}

fn key_of(descriptor: &ApiResourceDescriptor, namespace: Option<&str>, name: &str) -> ObjectKey {
    let namespace = if descriptor.namespaced {
        namespace.unwrap_or_default().to_string()
    } else {
        String::new()
    };
    (
        descriptor.api_version(),
        descriptor.name.clone(),
        namespace,
        name.to_string(),
    )
}

fn bump_resource_version(resource_version: &mut Option<String>) {
    let next = resource_version
        .as_deref()
        .and_then(|rv| rv.parse::<u64>().ok())
        .unwrap_or_default()
        + 1;
    *resource_version = Some(next.to_string());
}

fn labels_match(object: &DynamicObject, wanted: &BTreeMap<String, String>) -> bool {
    let labels = object.metadata.labels.clone().unwrap_or_default();
    wanted.iter().all(|(k, v)| labels.get(k) == Some(v))
}

#[async_trait]
impl ObjectStore for FakeCluster {
    async fn get_composable(&self, namespace: &str, name: &str) -> Result<Option<Composable>, StoreError> {
        Ok(self.composable(namespace, name))
    }

    async fn update_composable_status(&self, composable: &Composable) -> Result<Composable, StoreError> {
        self.calls.status_updates.fetch_add(1, Ordering::SeqCst);
        let key = (
            composable.metadata.namespace.clone().unwrap_or_default(),
            composable.metadata.name.clone().unwrap_or_default(),
        );
        let mut composables = self.composables.lock().unwrap();
        let Some(stored) = composables.get_mut(&key) else {
            return Err(StoreError::NotFound {
                kind: "Composable".to_string(),
                name: key.1,
            });
        };

        let injected = self
            .pending_status_conflicts
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if injected {
            // Somebody else wrote in between
            bump_resource_version(&mut stored.metadata.resource_version);
        }
        if stored.metadata.resource_version != composable.metadata.resource_version {
            return Err(StoreError::Conflict(
                "the object has been modified; please apply your changes to the latest version and try again"
                    .to_string(),
            ));
        }

        stored.status.clone_from(&composable.status);
        bump_resource_version(&mut stored.metadata.resource_version);
        Ok(stored.clone())
    }

    async fn get(
        &self,
        resource: &ApiResourceDescriptor,
        namespace: Option<&str>,
        name: &str,
    ) -> Result<DynamicObject, StoreError> {
        self.calls.gets.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = self.take_read_failure() {
            return Err(err);
        }
        self.objects
            .lock()
            .unwrap()
            .get(&key_of(resource, namespace, name))
            .cloned()
            .ok_or_else(|| StoreError::NotFound {
                kind: resource.group_qualified_name(),
                name: name.to_string(),
            })
    }

    async fn list(
        &self,
        resource: &ApiResourceDescriptor,
        namespace: Option<&str>,
        labels: &BTreeMap<String, String>,
    ) -> Result<Vec<DynamicObject>, StoreError> {
        self.calls.lists.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = self.take_read_failure() {
            return Err(err);
        }
        let api_version = resource.api_version();
        Ok(self
            .objects
            .lock()
            .unwrap()
            .iter()
            .filter(|((av, plural, ns, _), _)| {
                *av == api_version
                    && *plural == resource.name
                    && namespace.map_or(true, |wanted| ns == wanted)
            })
            .map(|(_, object)| object)
            .filter(|object| labels_match(object, labels))
            .cloned()
            .collect())
    }

    async fn create(
        &self,
        resource: &ApiResourceDescriptor,
        object: &DynamicObject,
    ) -> Result<DynamicObject, StoreError> {
        self.calls.creates.fetch_add(1, Ordering::SeqCst);
        let name = object.metadata.name.clone().unwrap_or_default();
        let key = key_of(resource, object.metadata.namespace.as_deref(), &name);
        let mut objects = self.objects.lock().unwrap();
        if objects.contains_key(&key) {
            return Err(StoreError::Conflict(format!("{name} already exists")));
        }
        let mut created = object.clone();
        created.metadata.resource_version = Some("1".to_string());
        created.metadata.uid = Some(format!("uid-{name}"));
        objects.insert(key, created.clone());
        Ok(created)
    }

    async fn update(
        &self,
        resource: &ApiResourceDescriptor,
        object: &DynamicObject,
    ) -> Result<DynamicObject, StoreError> {
        self.calls.updates.fetch_add(1, Ordering::SeqCst);
        let name = object.metadata.name.clone().unwrap_or_default();
        let key = key_of(resource, object.metadata.namespace.as_deref(), &name);
        let mut objects = self.objects.lock().unwrap();
        let Some(stored) = objects.get_mut(&key) else {
            return Err(StoreError::NotFound {
                kind: resource.group_qualified_name(),
                name,
            });
        };
        let mut updated = object.clone();
        bump_resource_version(&mut updated.metadata.resource_version);
        *stored = updated.clone();
        Ok(updated)
    }
}

#[async_trait]
impl ResourceDiscovery for FakeCluster {
    async fn server_preferred_resources(&self) -> Result<Vec<APIResourceList>, DiscoveryError> {
        Ok(self.catalog.clone())
    }

    async fn server_resources_for_group_version(
        &self,
        group_version: &str,
    ) -> Result<APIResourceList, DiscoveryError> {
        self.catalog
            .iter()
            .find(|list| list.group_version == group_version)
            .cloned()
            .ok_or_else(|| DiscoveryError::GroupVersionNotFound(group_version.to_string()))
    }

    fn invalidate(&self) {
        self.calls.invalidations.fetch_add(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl WatchRegistry for FakeCluster {
    async fn watch(&self, resource: &ApiResourceDescriptor) -> Result<(), WatchError> {
        let mut watched = self.watched.lock().unwrap();
        let key = resource.to_string();
        if !watched.contains(&key) {
            watched.push(key);
        }
        Ok(())
    }
}

/// A Composable as the API server would return it: with uid and resourceVersion
pub fn composable(namespace: &str, name: &str, template: Value) -> Composable {
    let mut composable = Composable::new(
        name,
        ComposableSpec {
            template: Some(template),
        },
    );
    composable.metadata.namespace = Some(namespace.to_string());
    composable.metadata.uid = Some(format!("uid-{name}"));
    composable.metadata.resource_version = Some("1".to_string());
    composable
}

pub fn reconciler(cluster: &Arc<FakeCluster>) -> Reconciler {
    reconciler_with_config(cluster, ControllerConfig::default())
}

pub fn reconciler_with_config(cluster: &Arc<FakeCluster>, config: ControllerConfig) -> Reconciler {
    Reconciler::new(
        Arc::clone(cluster) as Arc<dyn ObjectStore>,
        Arc::clone(cluster) as Arc<dyn ResourceDiscovery>,
        Arc::clone(cluster) as Arc<dyn WatchRegistry>,
        Arc::new(config),
    )
}
