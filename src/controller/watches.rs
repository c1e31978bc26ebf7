//! # Dynamic Watches
//!
//! Watches on the kinds of objects created from Composable templates.
//!
//! The set of kinds is only known at runtime, so each new kind gets its own
//! `watcher` task. Every change to an object controlled by a Composable is
//! turned into an `ObjectRef<Composable>` and fed to the controller through
//! `Controller::reconcile_on`.

use crate::crd::Composable;
use crate::discovery::ApiResourceDescriptor;
use crate::observability::metrics;
use async_trait::async_trait;
use futures::channel::mpsc::{unbounded, UnboundedReceiver, UnboundedSender};
use futures::StreamExt;
use kube::api::{Api, DynamicObject};
use kube::{Client, Resource, ResourceExt};
use kube_runtime::reflector::ObjectRef;
use kube_runtime::{watcher, WatchStreamExt};
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Error)]
#[error("failed to watch {resource}: {reason}")]
pub struct WatchError {
    pub resource: String,
    pub reason: String,
}

/// Subscribes the controller to changes of a dynamically discovered kind
#[async_trait]
pub trait WatchRegistry: Send + Sync {
    /// Start watching `resource`; calling it again for the same kind is a no-op
    async fn watch(&self, resource: &ApiResourceDescriptor) -> Result<(), WatchError>;
}

type TriggerSender = Arc<Mutex<Option<UnboundedSender<ObjectRef<Composable>>>>>;

/// Watch registry backed by `kube_runtime::watcher`
pub struct KubeWatchRegistry {
    client: Client,
    sender: TriggerSender,
    watched: Mutex<HashSet<String>>,
}

impl std::fmt::Debug for KubeWatchRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KubeWatchRegistry").finish_non_exhaustive()
    }
}

impl KubeWatchRegistry {
    #[must_use]
    pub fn new(client: Client) -> Self {
        Self {
            client,
            sender: Arc::new(Mutex::new(None)),
            watched: Mutex::new(HashSet::new()),
        }
    }

    /// New trigger stream for a (re)started controller
    ///
    /// Replaces the previous stream; watch tasks already running deliver to the new one.
    pub fn subscribe(&self) -> UnboundedReceiver<ObjectRef<Composable>> {
        let (tx, rx) = unbounded();
        match self.sender.lock() {
            Ok(mut sender) => *sender = Some(tx),
            Err(e) => warn!("Failed to lock watch trigger sender: {}", e),
        }
        rx
    }

    fn spawn_watch(&self, resource: &ApiResourceDescriptor) {
        let api: Api<DynamicObject> =
            Api::all_with(self.client.clone(), &resource.to_api_resource());
        let sender = Arc::clone(&self.sender);
        let gvk = resource.to_string();

        tokio::spawn(async move {
            info!(gvk = gvk.as_str(), "Watching objects owned by Composables");
            watcher(api, watcher::Config::default())
                .default_backoff()
                .touched_objects()
                .for_each(|event| {
                    match event {
                        Ok(object) => {
                            if let Some(owner) = controlling_composable(&object) {
                                debug!(
                                    gvk = gvk.as_str(),
                                    object = object.name_any().as_str(),
                                    owner = %owner,
                                    "Owned object changed"
                                );
                                send_trigger(&sender, owner);
                            }
                        }
                        Err(e) => warn!(gvk = gvk.as_str(), error = %e, "Dynamic watch error"),
                    }
                    futures::future::ready(())
                })
                .await;
            warn!(gvk = gvk.as_str(), "Dynamic watch stream ended");
        });
    }
}

fn send_trigger(sender: &TriggerSender, owner: ObjectRef<Composable>) {
    match sender.lock() {
        Ok(guard) => {
            if let Some(tx) = guard.as_ref() {
                if tx.unbounded_send(owner).is_err() {
                    debug!("Controller trigger stream closed, dropping event");
                }
            }
        }
        Err(e) => warn!("Failed to lock watch trigger sender: {}", e),
    }
}

#[async_trait]
impl WatchRegistry for KubeWatchRegistry {
    async fn watch(&self, resource: &ApiResourceDescriptor) -> Result<(), WatchError> {
        let key = resource.to_string();
        let count = {
            let mut watched = self.watched.lock().map_err(|e| WatchError {
                resource: resource.to_string(),
                reason: e.to_string(),
            })?;
            if !watched.insert(key) {
                return Ok(());
            }
            watched.len()
        };

        self.spawn_watch(resource);
        metrics::set_dynamic_watches(count);
        Ok(())
    }
}

/// The Composable named as controller owner of `object`, if any
#[must_use]
pub fn controlling_composable(object: &DynamicObject) -> Option<ObjectRef<Composable>> {
    let group = Composable::group(&());
    let owner = object
        .owner_references()
        .iter()
        .find(|owner| owner.controller == Some(true))?;
    let owner_group = owner.api_version.split_once('/').map_or("", |(g, _)| g);
    if owner.kind != Composable::kind(&()) || owner_group != group {
        return None;
    }
    let mut reference = ObjectRef::<Composable>::new(&owner.name);
    if let Some(ns) = object.namespace() {
        reference = reference.within(&ns);
    }
    Some(reference)
}
