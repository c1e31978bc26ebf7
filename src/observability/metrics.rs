//! # Metrics
//!
//! Prometheus metrics for monitoring the controller.
//!
//! ## Metrics Exposed
//!
//! - `composable_reconciliations_total` - Total number of reconciliations
//! - `composable_reconciliation_errors_total` - Reconciliations that returned an error (requeued with backoff)
//! - `composable_reconciliation_duration_seconds` - Duration of reconciliation passes
//! - `composable_references_resolved_total` - `getValueFrom` references resolved (including defaults)
//! - `composable_reference_errors_total{kind}` - Failed references by classification
//! - `composable_resolution_cache_hits_total` - Lookups answered by the per-pass cache
//! - `composable_underlying_objects_created_total` - Underlying objects created
//! - `composable_underlying_objects_updated_total` - Underlying objects updated
//! - `composable_dynamic_watches` - Number of object kinds watched on behalf of Composables
//! - `composable_requeues_total{reason}` - Requeues scheduled by the error policy

use anyhow::Result;
use prometheus::{Histogram, IntCounter, IntCounterVec, IntGauge, Registry};
use std::sync::LazyLock;

// Metrics
pub(crate) static REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

static RECONCILIATIONS_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "composable_reconciliations_total",
        "Total number of reconciliations",
    )
    .expect("Failed to create RECONCILIATIONS_TOTAL metric - this should never happen")
});

static RECONCILIATION_ERRORS_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "composable_reconciliation_errors_total",
        "Total number of reconciliation errors",
    )
    .expect("Failed to create RECONCILIATION_ERRORS_TOTAL metric - this should never happen")
});

static RECONCILIATION_DURATION: LazyLock<Histogram> = LazyLock::new(|| {
    Histogram::with_opts(
        prometheus::HistogramOpts::new(
            "composable_reconciliation_duration_seconds",
            "Duration of reconciliation in seconds",
        )
        .buckets(vec![0.01, 0.05, 0.1, 0.5, 1.0, 2.0, 5.0, 10.0]),
    )
    .expect("Failed to create RECONCILIATION_DURATION metric - this should never happen")
});

static REFERENCES_RESOLVED_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "composable_references_resolved_total",
        "Total number of getValueFrom references resolved",
    )
    .expect("Failed to create REFERENCES_RESOLVED_TOTAL metric - this should never happen")
});

static REFERENCE_ERRORS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "composable_reference_errors_total",
            "Total number of getValueFrom references that failed, by error kind",
        ),
        &["kind"],
    )
    .expect("Failed to create REFERENCE_ERRORS_TOTAL metric - this should never happen")
});

static RESOLUTION_CACHE_HITS_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "composable_resolution_cache_hits_total",
        "Total number of object lookups answered by the per-pass resolution cache",
    )
    .expect("Failed to create RESOLUTION_CACHE_HITS_TOTAL metric - this should never happen")
});

static UNDERLYING_OBJECTS_CREATED_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "composable_underlying_objects_created_total",
        "Total number of underlying objects created",
    )
    .expect("Failed to create UNDERLYING_OBJECTS_CREATED_TOTAL metric - this should never happen")
});

static UNDERLYING_OBJECTS_UPDATED_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "composable_underlying_objects_updated_total",
        "Total number of underlying objects updated",
    )
    .expect("Failed to create UNDERLYING_OBJECTS_UPDATED_TOTAL metric - this should never happen")
});

static DYNAMIC_WATCHES: LazyLock<IntGauge> = LazyLock::new(|| {
    IntGauge::new(
        "composable_dynamic_watches",
        "Current number of object kinds watched on behalf of Composables",
    )
    .expect("Failed to create DYNAMIC_WATCHES metric - this should never happen")
});

static REQUEUES_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "composable_requeues_total",
            "Total number of requeues scheduled, by reason",
        ),
        &["reason"],
    )
    .expect("Failed to create REQUEUES_TOTAL metric - this should never happen")
});

#[allow(
    clippy::missing_errors_doc,
    reason = "Error documentation is provided in doc comments"
)]
pub fn register_metrics() -> Result<()> {
    REGISTRY.register(Box::new(RECONCILIATIONS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(RECONCILIATION_ERRORS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(RECONCILIATION_DURATION.clone()))?;
    REGISTRY.register(Box::new(REFERENCES_RESOLVED_TOTAL.clone()))?;
    REGISTRY.register(Box::new(REFERENCE_ERRORS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(RESOLUTION_CACHE_HITS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(UNDERLYING_OBJECTS_CREATED_TOTAL.clone()))?;
    REGISTRY.register(Box::new(UNDERLYING_OBJECTS_UPDATED_TOTAL.clone()))?;
    REGISTRY.register(Box::new(DYNAMIC_WATCHES.clone()))?;
    REGISTRY.register(Box::new(REQUEUES_TOTAL.clone()))?;

    Ok(())
}

pub fn increment_reconciliations() {
    RECONCILIATIONS_TOTAL.inc();
}

pub fn increment_reconciliation_errors() {
    RECONCILIATION_ERRORS_TOTAL.inc();
}

pub fn observe_reconciliation_duration(duration: f64) {
    RECONCILIATION_DURATION.observe(duration);
}

pub fn increment_references_resolved() {
    REFERENCES_RESOLVED_TOTAL.inc();
}

pub fn increment_reference_errors(kind: &str) {
    REFERENCE_ERRORS_TOTAL.with_label_values(&[kind]).inc();
}

pub fn increment_resolution_cache_hits(count: u64) {
    RESOLUTION_CACHE_HITS_TOTAL.inc_by(count);
}

pub fn increment_underlying_objects_created() {
    UNDERLYING_OBJECTS_CREATED_TOTAL.inc();
}

pub fn increment_underlying_objects_updated() {
    UNDERLYING_OBJECTS_UPDATED_TOTAL.inc();
}

pub fn set_dynamic_watches(count: usize) {
    DYNAMIC_WATCHES.set(i64::try_from(count).unwrap_or(i64::MAX));
}

pub fn increment_requeues_total(reason: &str) {
    REQUEUES_TOTAL.with_label_values(&[reason]).inc();
}

/// Text exposition of every registered metric
#[allow(
    clippy::missing_errors_doc,
    reason = "Error documentation is provided in doc comments"
)]
pub fn gather_text() -> Result<String> {
    use prometheus::Encoder;

    let encoder = prometheus::TextEncoder::new();
    let mut buffer = Vec::new();
    encoder.encode(&REGISTRY.gather(), &mut buffer)?;
    Ok(String::from_utf8(buffer)?)
}
