//! Prometheus metrics.
//!
//! - `auth0_operator_reconciliations_total{kind}` - Reconciliations started
//! - `auth0_operator_reconcile_errors_total{kind,class}` - Failed reconciliations by error class
//! - `auth0_operator_remote_operations_total{kind,operation}` - Management API writes
//! - `auth0_operator_reconcile_duration_seconds{kind}` - Reconciliation latency
//! - `auth0_operator_blocked_total{kind}` - Reconciliations blocked on an unready reference

use auth0_client::ResourceKind;
use prometheus::{HistogramTimer, HistogramVec, IntCounterVec, Registry};
use std::sync::LazyLock;

pub(crate) static REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

static RECONCILIATIONS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "auth0_operator_reconciliations_total",
            "Total number of reconciliations by kind",
        ),
        &["kind"],
    )
    .expect("Failed to create RECONCILIATIONS_TOTAL metric - this should never happen")
});

static RECONCILE_ERRORS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "auth0_operator_reconcile_errors_total",
            "Total number of reconciliation errors by kind and class",
        ),
        &["kind", "class"],
    )
    .expect("Failed to create RECONCILE_ERRORS_TOTAL metric - this should never happen")
});

static REMOTE_OPERATIONS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "auth0_operator_remote_operations_total",
            "Total number of Management API writes by kind and operation",
        ),
        &["kind", "operation"],
    )
    .expect("Failed to create REMOTE_OPERATIONS_TOTAL metric - this should never happen")
});

static RECONCILE_DURATION: LazyLock<HistogramVec> = LazyLock::new(|| {
    HistogramVec::new(
        prometheus::HistogramOpts::new(
            "auth0_operator_reconcile_duration_seconds",
            "Duration of reconciliation in seconds by kind",
        )
        .buckets(vec![0.05, 0.1, 0.5, 1.0, 2.0, 5.0, 10.0, 30.0]),
        &["kind"],
    )
    .expect("Failed to create RECONCILE_DURATION metric - this should never happen")
});

static BLOCKED_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "auth0_operator_blocked_total",
            "Total number of reconciliations blocked on an unready reference",
        ),
        &["kind"],
    )
    .expect("Failed to create BLOCKED_TOTAL metric - this should never happen")
});

pub fn register_metrics() -> Result<(), prometheus::Error> {
    REGISTRY.register(Box::new(RECONCILIATIONS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(RECONCILE_ERRORS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(REMOTE_OPERATIONS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(RECONCILE_DURATION.clone()))?;
    REGISTRY.register(Box::new(BLOCKED_TOTAL.clone()))?;
    Ok(())
}

pub fn increment_reconciliations(kind: ResourceKind) {
    RECONCILIATIONS_TOTAL.with_label_values(&[kind.crd_kind()]).inc();
}

pub fn increment_reconcile_errors(kind: ResourceKind, class: &str) {
    RECONCILE_ERRORS_TOTAL
        .with_label_values(&[kind.crd_kind(), class])
        .inc();
}

pub fn increment_remote_operations(kind: ResourceKind, operation: &str) {
    REMOTE_OPERATIONS_TOTAL
        .with_label_values(&[kind.crd_kind(), operation])
        .inc();
}

pub fn increment_blocked(kind: ResourceKind) {
    BLOCKED_TOTAL.with_label_values(&[kind.crd_kind()]).inc();
}

/// Start timing a reconciliation; the duration is recorded when the timer drops
#[must_use]
pub fn start_reconcile_timer(kind: ResourceKind) -> HistogramTimer {
    RECONCILE_DURATION
        .with_label_values(&[kind.crd_kind()])
        .start_timer()
}
