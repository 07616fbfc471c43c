//! Metrics collection and exposition.
//!
//! # Metrics
//! - `hop_trace_requests_total` (counter): requests by `origin` (internal/external)
//!   and `context` (reused/generated)
//!
//! # Design Decisions
//! - Recorded through the `metrics` facade; a no-op until a recorder is installed
//! - Prometheus exporter runs its own HTTP listener

use std::net::SocketAddr;

use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus recorder with an HTTP scrape listener.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

/// Count one propagation decision.
pub fn record_propagation(internal: bool, reused: bool) {
    let origin = if internal { "internal" } else { "external" };
    let context = if reused { "reused" } else { "generated" };
    metrics::counter!("hop_trace_requests_total", "origin" => origin, "context" => context)
        .increment(1);
}
