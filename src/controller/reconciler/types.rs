//! # Types
//!
//! Core types for the reconciler.

use crate::config::SharedControllerConfig;
use crate::controller::backoff::FibonacciBackoff;
use crate::controller::watches::{WatchError, WatchRegistry};
use crate::discovery::ResourceDiscovery;
use crate::resolver::ResolveError;
use crate::store::{ObjectStore, StoreError};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use thiserror::Error;

/// Errors handed back to the controller runtime
///
/// Every variant is retried through `error_policy`. Problems that need a user
/// edit are reported in the status instead and never surface here.
#[derive(Debug, Error)]
pub enum ReconcilerError {
    #[error("Reference not resolved yet: {0}")]
    Unresolved(#[from] ResolveError),
    #[error("Kubernetes API request failed: {0}")]
    Store(#[from] StoreError),
    #[error(transparent)]
    Watch(#[from] WatchError),
}

impl ReconcilerError {
    /// Short label for the requeue metric
    #[must_use]
    pub fn reason(&self) -> &'static str {
        match self {
            ReconcilerError::Unresolved(err) => err.class(),
            ReconcilerError::Store(_) => "api_error",
            ReconcilerError::Watch(_) => "watch_error",
        }
    }
}

/// Backoff state for a specific resource
/// Tracks error count and backoff calculator for progressive retries
#[derive(Debug, Clone)]
pub struct BackoffState {
    pub backoff: FibonacciBackoff,
    pub error_count: u32,
}

impl BackoffState {
    #[must_use]
    pub fn new(min_secs: u64, max_secs: u64) -> Self {
        Self {
            backoff: FibonacciBackoff::new(min_secs, max_secs),
            error_count: 0,
        }
    }

    pub fn increment_error(&mut self) {
        self.error_count = self.error_count.saturating_add(1);
    }

    pub fn reset(&mut self) {
        self.error_count = 0;
        self.backoff.reset();
    }
}

/// Shared context of every reconcile call
#[derive(Clone)]
pub struct Reconciler {
    pub store: Arc<dyn ObjectStore>,
    pub discovery: Arc<dyn ResourceDiscovery>,
    pub watches: Arc<dyn WatchRegistry>,
    pub config: SharedControllerConfig,
    // Backoff state per resource (identified by namespace/name)
    pub backoff_states: Arc<Mutex<HashMap<String, BackoffState>>>,
}

impl std::fmt::Debug for Reconciler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reconciler")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Reconciler {
    #[must_use]
    pub fn new(
        store: Arc<dyn ObjectStore>,
        discovery: Arc<dyn ResourceDiscovery>,
        watches: Arc<dyn WatchRegistry>,
        config: SharedControllerConfig,
    ) -> Self {
        Self {
            store,
            discovery,
            watches,
            config,
            backoff_states: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Forget the backoff of a resource after a successful reconcile
    pub fn reset_backoff(&self, key: &str) {
        match self.backoff_states.lock() {
            Ok(mut states) => {
                if let Some(state) = states.get_mut(key) {
                    state.reset();
                }
            }
            Err(e) => tracing::warn!("Failed to lock backoff_states: {}", e),
        }
    }

    /// Drop the backoff of a resource that no longer exists
    pub fn forget_backoff(&self, key: &str) {
        match self.backoff_states.lock() {
            Ok(mut states) => {
                states.remove(key);
            }
            Err(e) => tracing::warn!("Failed to lock backoff_states: {}", e),
        }
    }

    /// Number of resources with backoff state
    #[must_use]
    pub fn tracked_backoffs(&self) -> usize {
        self.backoff_states.lock().map_or(0, |states| states.len())
    }
}

/// Key used for per-resource state (`namespace/name`)
#[must_use]
pub fn resource_key(namespace: &str, name: &str) -> String {
    format!("{namespace}/{name}")
}
