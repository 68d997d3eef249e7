//! # Metrics
//!
//! Prometheus metrics for monitoring the controller.
//!
//! ## Metrics Exposed
//!
//! - `eventing_controller_reconciliations_total` - Total number of reconciliations
//! - `eventing_controller_reconciliation_errors_total` - Total number of failed reconciliations
//! - `eventing_controller_reconcile_duration_seconds` - Duration of reconciliations
//! - `eventing_controller_eventmesh_requests_total` - EventMesh calls by method and status code
//! - `eventing_controller_apirule_operations_total` - APIRule writes by operation
//! - `eventing_controller_subscriptions_ready` - Subscriptions currently ready

use anyhow::Result;
use prometheus::{Histogram, IntCounter, IntCounterVec, IntGauge, Opts, Registry};
use std::sync::LazyLock;

pub(crate) static REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

static RECONCILIATIONS_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "eventing_controller_reconciliations_total",
        "Total number of reconciliations",
    )
    .expect("Failed to create RECONCILIATIONS_TOTAL metric - this should never happen")
});

static RECONCILIATION_ERRORS_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "eventing_controller_reconciliation_errors_total",
        "Total number of reconciliation errors",
    )
    .expect("Failed to create RECONCILIATION_ERRORS_TOTAL metric - this should never happen")
});

static RECONCILE_DURATION: LazyLock<Histogram> = LazyLock::new(|| {
    Histogram::with_opts(
        prometheus::HistogramOpts::new(
            "eventing_controller_reconcile_duration_seconds",
            "Duration of reconciliation in seconds",
        )
        .buckets(vec![0.05, 0.1, 0.5, 1.0, 2.0, 5.0, 10.0]),
    )
    .expect("Failed to create RECONCILE_DURATION metric - this should never happen")
});

static EVENTMESH_REQUESTS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new(
            "eventing_controller_eventmesh_requests_total",
            "Total number of EventMesh requests",
        ),
        &["method", "status"],
    )
    .expect("Failed to create EVENTMESH_REQUESTS_TOTAL metric - this should never happen")
});

static APIRULE_OPERATIONS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new(
            "eventing_controller_apirule_operations_total",
            "Total number of APIRule create, update and delete operations",
        ),
        &["operation"],
    )
    .expect("Failed to create APIRULE_OPERATIONS_TOTAL metric - this should never happen")
});

static SUBSCRIPTIONS_READY: LazyLock<IntGauge> = LazyLock::new(|| {
    IntGauge::new(
        "eventing_controller_subscriptions_ready",
        "Number of Subscriptions currently ready",
    )
    .expect("Failed to create SUBSCRIPTIONS_READY metric - this should never happen")
});

/// Register every metric with the process registry
///
/// # Errors
///
/// Returns an error when a metric is registered twice.
pub fn register_metrics() -> Result<()> {
    REGISTRY.register(Box::new(RECONCILIATIONS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(RECONCILIATION_ERRORS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(RECONCILE_DURATION.clone()))?;
    REGISTRY.register(Box::new(EVENTMESH_REQUESTS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(APIRULE_OPERATIONS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(SUBSCRIPTIONS_READY.clone()))?;
    Ok(())
}

pub fn increment_reconciliations() {
    RECONCILIATIONS_TOTAL.inc();
}

pub fn increment_reconciliation_errors() {
    RECONCILIATION_ERRORS_TOTAL.inc();
}

pub fn observe_reconcile_duration(duration: f64) {
    RECONCILE_DURATION.observe(duration);
}

pub fn increment_eventmesh_requests(method: &str, status: u16) {
    EVENTMESH_REQUESTS_TOTAL
        .with_label_values(&[method, &status.to_string()])
        .inc();
}

pub fn increment_apirule_operations(operation: &str) {
    APIRULE_OPERATIONS_TOTAL
        .with_label_values(&[operation])
        .inc();
}

/// Track a readiness transition of one Subscription
pub fn record_ready_transition(was_ready: bool, is_ready: bool) {
    apply_ready_transition(&SUBSCRIPTIONS_READY, was_ready, is_ready);
}

fn apply_ready_transition(gauge: &IntGauge, was_ready: bool, is_ready: bool) {
    match (was_ready, is_ready) {
        (false, true) => gauge.inc(),
        (true, false) => gauge.dec(),
        _ => {}
    }
}

/// Render the registry in the Prometheus text format
///
/// # Errors
///
/// Returns an error when encoding fails.
pub fn gather() -> Result<String> {
    use prometheus::Encoder;
    let encoder = prometheus::TextEncoder::new();
    let mut buffer = Vec::new();
    encoder.encode(&REGISTRY.gather(), &mut buffer)?;
    Ok(String::from_utf8(buffer)?)
}
