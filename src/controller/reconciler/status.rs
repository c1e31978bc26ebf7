//! # Status Management
//!
//! Writes Composable status with reconciliation results.

use crate::controller::reconciler::types::Reconciler;
use crate::crd::{Composable, ComposableState, ComposableStatus};
use chrono::Utc;
use kube::ResourceExt;
use tracing::{debug, warn};

/// Message of an `Online` status: the time it was reached
#[must_use]
pub fn online_message() -> String {
    Utc::now().format("%A, %d-%b-%y %H:%M:%S UTC").to_string()
}

/// Whether `desired` has to be written over the current status
///
/// `Online` is written only on the transition into it, so the timestamp in its
/// message keeps the time the Composable first came online.
#[must_use]
pub fn needs_status_update(current: Option<&ComposableStatus>, desired: &ComposableStatus) -> bool {
    let current_state = current.and_then(|s| s.state);
    match desired.state {
        None => false,
        Some(ComposableState::Online) => current_state != Some(ComposableState::Online),
        Some(_) => current != Some(desired),
    }
}

/// Update status state and message
///
/// A conflicting write is retried once against a fresh copy of the resource.
/// Failures are only logged; the reconcile outcome does not depend on them.
///
/// Returns the Composable as stored after a successful write.
pub async fn update_status_phase(
    reconciler: &Reconciler,
    composable: &Composable,
    state: ComposableState,
    message: impl Into<String>,
) -> Option<Composable> {
    let desired = ComposableStatus::new(state, message);
    let name = composable.name_any();
    let namespace = composable.namespace().unwrap_or_default();

    if !needs_status_update(composable.status.as_ref(), &desired) {
        debug!(
            resource.name = name.as_str(),
            resource.namespace = namespace.as_str(),
            "Skipping status update - state and message unchanged: state={}",
            state
        );
        return None;
    }

    let mut updated = composable.clone();
    updated.status = Some(desired.clone());
    match reconciler.store.update_composable_status(&updated).await {
        Ok(written) => {
            debug!(
                resource.name = name.as_str(),
                resource.namespace = namespace.as_str(),
                "Status set to {}",
                state
            );
            Some(written)
        }
        Err(e) if e.is_conflict() => {
            debug!(
                resource.name = name.as_str(),
                resource.namespace = namespace.as_str(),
                "Status update conflicted, retrying on a fresh copy"
            );
            retry_on_fresh_copy(reconciler, &namespace, &name, desired).await
        }
        Err(e) => {
            warn!(
                resource.name = name.as_str(),
                resource.namespace = namespace.as_str(),
                error = %e,
                "Failed to update status"
            );
            None
        }
    }
}

async fn retry_on_fresh_copy(
    reconciler: &Reconciler,
    namespace: &str,
    name: &str,
    desired: ComposableStatus,
) -> Option<Composable> {
    let fresh = match reconciler.store.get_composable(namespace, name).await {
        Ok(Some(fresh)) => fresh,
        Ok(None) => {
            debug!(
                resource.name = name,
                resource.namespace = namespace,
                "Composable deleted before status could be written"
            );
            return None;
        }
        Err(e) => {
            warn!(
                resource.name = name,
                resource.namespace = namespace,
                error = %e,
                "Failed to re-read Composable for status update"
            );
            return None;
        }
    };

    let mut updated = fresh;
    updated.status = Some(desired);
    match reconciler.store.update_composable_status(&updated).await {
        Ok(written) => Some(written),
        Err(e) => {
            warn!(
                resource.name = name,
                resource.namespace = namespace,
                error = %e,
                "Failed to update status after conflict"
            );
            None
        }
    }
}
