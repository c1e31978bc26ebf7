//! # Error Policy
//!
//! Requeue policy for failed reconciles, and recovery from errors on the
//! controller stream itself.

use crate::constants::CONTROLLER_NAME;
use crate::controller::reconciler::{resource_key, BackoffState, Reconciler, ReconcilerError};
use crate::crd::Composable;
use crate::observability;
use kube::ResourceExt;
use kube_runtime::controller::Action;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

/// Handle reconciliation errors with Fibonacci backoff
///
/// Backoff state is tracked per resource, so one failing Composable does not
/// slow down the others. A successful reconcile resets it.
pub fn handle_reconciliation_error(
    obj: Arc<Composable>,
    error: &ReconcilerError,
    ctx: Arc<Reconciler>,
) -> Action {
    let name = obj.name_any();
    let namespace = obj.namespace().unwrap_or_default();

    let error_span = tracing::span!(
        tracing::Level::ERROR,
        "controller.watch.reconciliation_error",
        resource.name = name.as_str(),
        resource.namespace = namespace.as_str(),
        error = %error
    );
    let _error_guard = error_span.enter();

    warn!("Reconciliation error for {}/{}: {}", namespace, name, error);

    let key = resource_key(&namespace, &name);
    let (backoff_seconds, error_count) = next_backoff(&ctx, key);

    let next_trigger_time = chrono::Utc::now()
        + chrono::Duration::seconds(i64::try_from(backoff_seconds).unwrap_or(i64::MAX));

    info!(
        "🔄 Retrying with Fibonacci backoff: {}s (error count: {}, reason: {})",
        backoff_seconds,
        error_count,
        error.reason()
    );
    info!(
        "📅 Next retry scheduled: {} (in {}s)",
        next_trigger_time.to_rfc3339(),
        backoff_seconds
    );

    observability::metrics::increment_requeues_total(error.reason());
    Action::requeue(Duration::from_secs(backoff_seconds))
}

/// Next requeue delay for `key`, and how many errors in a row it has seen
pub fn next_backoff(ctx: &Reconciler, key: String) -> (u64, u32) {
    match ctx.backoff_states.lock() {
        Ok(mut states) => {
            let state = states.entry(key).or_insert_with(|| {
                BackoffState::new(ctx.config.backoff_min_secs, ctx.config.backoff_max_secs)
            });
            state.increment_error();
            (state.backoff.next_backoff_seconds(), state.error_count)
        }
        Err(e) => {
            warn!(
                "Failed to lock backoff_states: {}, using default backoff",
                e
            );
            (ctx.config.backoff_max_secs, 0)
        }
    }
}

/// What went wrong with the controller's watch stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamFailure {
    /// 401: credentials expired or RBAC revoked
    Unauthorized,
    /// 410: the resourceVersion the watch resumed from was compacted away
    Expired,
    /// 429: the API server is throttling or re-initializing its storage
    Throttled,
    /// 404: the CRD, or a watched kind, is gone
    NotFound,
    Other,
}

impl StreamFailure {
    /// Classify a stream error from its debug rendering
    ///
    /// kube surfaces some of these as decode errors of a plain-text body, so the
    /// status code is looked for anywhere in the text. 404 is checked first:
    /// such bodies can mention `Unauthorized` in unrelated fields.
    #[must_use]
    pub fn classify(error: &str) -> Self {
        let mentions = |needles: &[&str]| needles.iter().any(|n| error.contains(n));
        if mentions(&["ObjectNotFound", "404", "not found"]) {
            StreamFailure::NotFound
        } else if mentions(&["401", "Unauthorized"]) {
            StreamFailure::Unauthorized
        } else if mentions(&["410", "too old resource version", "Expired", "Gone"]) {
            StreamFailure::Expired
        } else if mentions(&["429", "TooManyRequests", "storage is (re)initializing"]) {
            StreamFailure::Throttled
        } else {
            StreamFailure::Other
        }
    }
}

/// Handle an error from the controller stream
///
/// Returns `Some(())` to keep consuming the stream, or `None` to drop the
/// event and let the stream run into a restart. Throttling doubles `backoff`
/// up to `max_backoff_ms`.
pub async fn handle_watch_stream_error(
    error_string: &str,
    backoff: &Arc<AtomicU64>,
    max_backoff_ms: u64,
    watch_restart_delay_secs: u64,
) -> Option<()> {
    let failure = StreamFailure::classify(error_string);
    let error_span = tracing::span!(
        tracing::Level::WARN,
        "controller.watch.error",
        failure = ?failure,
        error = %error_string
    );
    let _error_guard = error_span.enter();

    match failure {
        StreamFailure::Unauthorized => {
            error!("❌ Composable watch rejected with 401, service account token expired or RBAC revoked");
            error!(
                "🔍 Check: kubectl auth can-i watch composables.ibmcloud.ibm.com --all-namespaces --as=system:serviceaccount:<namespace>:{}",
                CONTROLLER_NAME
            );
            warn!("⏳ Retrying watch in {}s", watch_restart_delay_secs);
            tokio::time::sleep(Duration::from_secs(watch_restart_delay_secs)).await;
            None
        }
        StreamFailure::Expired => {
            warn!("Watch resourceVersion expired (410), restarting watch from a fresh list");
            None
        }
        StreamFailure::Throttled => {
            let current = backoff.load(Ordering::Relaxed);
            warn!("API server throttling the watch (429), waiting {}ms", current);
            tokio::time::sleep(Duration::from_millis(current)).await;
            backoff.store(current.saturating_mul(2).min(max_backoff_ms), Ordering::Relaxed);
            None
        }
        StreamFailure::NotFound => {
            warn!(
                "Watched resource not found (404), the Composable CRD or an underlying kind may have been removed: {}",
                error_string
            );
            Some(())
        }
        StreamFailure::Other => {
            error!("Controller stream error: {}", error_string);
            tokio::time::sleep(Duration::from_secs(watch_restart_delay_secs)).await;
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification() {
        assert_eq!(
            StreamFailure::classify("Api(ErrorResponse { code: 401, reason: \"Unauthorized\" })"),
            StreamFailure::Unauthorized
        );
        assert_eq!(
            StreamFailure::classify("too old resource version: 12 (40)"),
            StreamFailure::Expired
        );
        assert_eq!(
            StreamFailure::classify("storage is (re)initializing"),
            StreamFailure::Throttled
        );
        assert_eq!(
            StreamFailure::classify("invalid type: integer `404`, expected a string"),
            StreamFailure::NotFound
        );
        assert_eq!(StreamFailure::classify("connection reset"), StreamFailure::Other);
    }

    #[tokio::test]
    async fn test_not_found_errors_continue() {
        let backoff = Arc::new(AtomicU64::new(100));
        let outcome =
            handle_watch_stream_error("ObjectNotFound: composables not found", &backoff, 1000, 0)
                .await;
        assert_eq!(outcome, Some(()));
    }

    #[tokio::test]
    async fn test_too_many_requests_doubles_backoff() {
        let backoff = Arc::new(AtomicU64::new(1));
        let outcome = handle_watch_stream_error("429 TooManyRequests", &backoff, 3, 0).await;
        assert_eq!(outcome, None);
        assert_eq!(backoff.load(Ordering::Relaxed), 2);

        handle_watch_stream_error("429 TooManyRequests", &backoff, 3, 0).await;
        assert_eq!(backoff.load(Ordering::Relaxed), 3);
    }

    #[tokio::test]
    async fn test_expired_resource_version_restarts() {
        let backoff = Arc::new(AtomicU64::new(1));
        let outcome = handle_watch_stream_error("410 Gone", &backoff, 3, 0).await;
        assert_eq!(outcome, None);
        assert_eq!(backoff.load(Ordering::Relaxed), 1);
    }
}
