//! # Reconciliation Logic
//!
//! Main reconciliation loop for Composable resources.

use crate::constants::{CREATING_RESOURCE_MESSAGE, VALIDATION_FAILED_PREFIX};
use crate::controller::reconciler::status::{online_message, update_status_phase};
use crate::controller::reconciler::types::{resource_key, Reconciler, ReconcilerError};
use crate::controller::reconciler::underlying::{create_or_update, UnderlyingError};
use crate::controller::reconciler::validation::validate_template;
use crate::crd::{Composable, ComposableState, ComposableStatus};
use crate::observability;
use crate::resolver::{Disposition, Resolver};
use crate::resolver::reference::type_name;
use kube::ResourceExt;
use kube_runtime::controller::Action;
use serde_json::Value;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn, Instrument};

/// Entry point used by the kube-runtime `Controller`
///
/// The object handed over by the controller may be stale; the Composable is
/// fetched again by key before anything is decided.
pub async fn reconcile(
    composable: Arc<Composable>,
    ctx: Arc<Reconciler>,
) -> Result<Action, ReconcilerError> {
    let name = composable.name_any();
    let Some(namespace) = composable.namespace() else {
        warn!(resource.name = name.as_str(), "Composable has no namespace, skipping");
        return Ok(Action::await_change());
    };
    reconcile_composable(&ctx, &namespace, &name).await
}

/// Reconcile the Composable `namespace/name`
///
/// Problems that need a user edit end in `Failed` and `Ok`; problems that may
/// go away on their own end in `Pending` (or `Failed` for API errors) and `Err`,
/// so the error policy requeues them.
pub async fn reconcile_composable(
    ctx: &Reconciler,
    namespace: &str,
    name: &str,
) -> Result<Action, ReconcilerError> {
    let start = Instant::now();
    observability::metrics::increment_reconciliations();

    let span = tracing::info_span!(
        "composable.reconcile",
        resource.name = name,
        resource.namespace = namespace,
        resource.kind = "Composable"
    );
    let result = reconcile_internal(ctx, namespace, name)
        .instrument(span)
        .await;

    observability::metrics::observe_reconciliation_duration(start.elapsed().as_secs_f64());
    if result.is_err() {
        observability::metrics::increment_reconciliation_errors();
    }
    result
}

async fn reconcile_internal(
    ctx: &Reconciler,
    namespace: &str,
    name: &str,
) -> Result<Action, ReconcilerError> {
    // CRDs may have been installed or removed since the last pass
    ctx.discovery.invalidate();

    let Some(mut composable) = ctx.store.get_composable(namespace, name).await? else {
        info!("Reconciled object is not found, nothing to do");
        ctx.forget_backoff(&resource_key(namespace, name));
        return Ok(Action::await_change());
    };

    info!("🔄 Reconciling Composable: {}/{}", namespace, name);

    if composable
        .status
        .as_ref()
        .map_or(true, ComposableStatus::is_unset)
    {
        if let Some(written) = update_status_phase(
            ctx,
            &composable,
            ComposableState::Pending,
            CREATING_RESOURCE_MESSAGE,
        )
        .await
        {
            composable = written;
        }
    }

    let template = match composable.spec.template.as_ref() {
        Some(Value::Object(template)) => template.clone(),
        Some(other) => {
            let message = format!("spec.template is not an object but {}", type_name(other));
            return fail(ctx, &composable, message).await;
        }
        None => return fail(ctx, &composable, "Missing spec.template".to_string()).await,
    };

    if !ctx.config.admission_control {
        if let Err(e) = validate_template(name, &template) {
            return fail(ctx, &composable, format!("{VALIDATION_FAILED_PREFIX}{e}")).await;
        }
    }

    let resolver = Resolver::new(ctx.store.as_ref(), ctx.discovery.as_ref());
    let resolved = match resolver.resolve(&template, namespace).await {
        Ok(resolved) => resolved,
        Err(err) => match err.disposition() {
            Disposition::Fail => return fail(ctx, &composable, err.to_string()).await,
            Disposition::Retry => {
                warn!(error = %err, "Reference not resolvable yet, will retry");
                update_status_phase(ctx, &composable, ComposableState::Pending, err.to_string())
                    .await;
                return Err(err.into());
            }
        },
    };

    match create_or_update(ctx, &composable, resolved).await {
        Ok(outcome) => debug!("Underlying object {:?}", outcome),
        Err(UnderlyingError::Store(e)) => {
            error!(error = %e, "Failed to write underlying object");
            update_status_phase(ctx, &composable, ComposableState::Failed, e.to_string()).await;
            return Err(e.into());
        }
        Err(UnderlyingError::Watch(e)) => {
            error!(error = %e, "Failed to watch underlying object");
            update_status_phase(ctx, &composable, ComposableState::Failed, e.to_string()).await;
            return Err(e.into());
        }
        Err(e) => return fail(ctx, &composable, e.to_string()).await,
    }

    update_status_phase(ctx, &composable, ComposableState::Online, online_message()).await;
    ctx.reset_backoff(&resource_key(namespace, name));
    info!("✅ Composable {}/{} is online", namespace, name);

    Ok(Action::await_change())
}

/// Terminal outcome: record `Failed` and wait for the next change of the Composable
async fn fail(
    ctx: &Reconciler,
    composable: &Composable,
    message: String,
) -> Result<Action, ReconcilerError> {
    error!(reason = message.as_str(), "❌ Composable failed");
    update_status_phase(ctx, composable, ComposableState::Failed, message).await;
    Ok(Action::await_change())
}
