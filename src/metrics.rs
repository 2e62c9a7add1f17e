//! Prometheus metrics for application observability.
//!
//! Metrics are exposed via a dedicated HTTP listener (default: `0.0.0.0:9090`).
//!
//! # Available Metrics
//!
//! ## Counters
//! - `watch_catalog_store_operations_total` - Store calls (labels: operation, outcome)
//! - `watch_catalog_rate_limit_decisions_total` - Limiter decisions (labels: decision)
//! - `watch_catalog_rate_limit_evictions_total` - Client entries removed by the sweep
//! - `watch_catalog_auth_failures_total` - Rejected credentials (labels: reason)
//! - `watch_catalog_panics_recovered_total` - Handler panics turned into 500s
//!
//! ## Histograms
//! - `watch_catalog_store_duration_seconds` - Store call duration (labels: operation)
//!
//! ## Gauges
//! - `watch_catalog_rate_limit_clients` - Client entries currently tracked

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use tracing::{error, info};

/// Metric names as constants for consistency.
pub mod names {
    pub const STORE_OPERATIONS_TOTAL: &str = "watch_catalog_store_operations_total";
    pub const STORE_DURATION_SECONDS: &str = "watch_catalog_store_duration_seconds";
    pub const RATE_LIMIT_DECISIONS_TOTAL: &str = "watch_catalog_rate_limit_decisions_total";
    pub const RATE_LIMIT_EVICTIONS_TOTAL: &str = "watch_catalog_rate_limit_evictions_total";
    pub const RATE_LIMIT_CLIENTS: &str = "watch_catalog_rate_limit_clients";
    pub const AUTH_FAILURES_TOTAL: &str = "watch_catalog_auth_failures_total";
    pub const PANICS_RECOVERED_TOTAL: &str = "watch_catalog_panics_recovered_total";
}

/// Install the Prometheus exporter and describe every metric.
///
/// # Errors
///
/// Returns a message when the exporter cannot be installed (for example the
/// port is taken or a recorder is already set).
pub fn init_metrics(metrics_addr: SocketAddr) -> Result<(), String> {
    PrometheusBuilder::new()
        .with_http_listener(metrics_addr)
        .install()
        .map_err(|e| format!("Failed to install Prometheus exporter: {e}"))?;

    describe_counter!(
        names::STORE_OPERATIONS_TOTAL,
        "Store operations by operation and outcome"
    );
    describe_counter!(
        names::RATE_LIMIT_DECISIONS_TOTAL,
        "Rate limiter decisions (admitted | rejected)"
    );
    describe_counter!(
        names::RATE_LIMIT_EVICTIONS_TOTAL,
        "Idle client entries evicted from the rate limiter"
    );
    describe_counter!(
        names::AUTH_FAILURES_TOTAL,
        "Authentication and authorization failures by reason"
    );
    describe_counter!(
        names::PANICS_RECOVERED_TOTAL,
        "Request handler panics recovered by middleware"
    );

    describe_histogram!(
        names::STORE_DURATION_SECONDS,
        "Store operation duration in seconds"
    );

    describe_gauge!(
        names::RATE_LIMIT_CLIENTS,
        "Client identities tracked by the rate limiter"
    );

    info!(addr = %metrics_addr, "Prometheus metrics endpoint started");
    Ok(())
}

/// Try to initialize metrics, logging any errors but not failing.
pub fn try_init_metrics(metrics_addr: SocketAddr) {
    if let Err(e) = init_metrics(metrics_addr) {
        error!(error = %e, "Failed to initialize metrics, continuing without metrics");
    }
}

/// Record one store call and how long it took.
pub fn record_store_operation(operation: &'static str, outcome: &'static str, duration_secs: f64) {
    counter!(names::STORE_OPERATIONS_TOTAL, "operation" => operation, "outcome" => outcome)
        .increment(1);
    histogram!(names::STORE_DURATION_SECONDS, "operation" => operation).record(duration_secs);
}

pub fn record_rate_limit_decision(admitted: bool) {
    let decision = if admitted { "admitted" } else { "rejected" };
    counter!(names::RATE_LIMIT_DECISIONS_TOTAL, "decision" => decision).increment(1);
}

/// Record a sweep: how many entries went and how many remain.
pub fn record_rate_limit_sweep(evicted: usize, remaining: usize) {
    counter!(names::RATE_LIMIT_EVICTIONS_TOTAL).increment(evicted as u64);
    gauge!(names::RATE_LIMIT_CLIENTS).set(remaining as f64);
}

pub fn record_auth_failure(reason: &'static str) {
    counter!(names::AUTH_FAILURES_TOTAL, "reason" => reason).increment(1);
}

pub fn record_panic_recovered() {
    counter!(names::PANICS_RECOVERED_TOTAL).increment(1);
}
