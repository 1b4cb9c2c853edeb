//! Metrics collection and exposition.
//!
//! # Metrics
//! - `dispatch_requests_total` (counter): requests by method, status, endpoint
//! - `dispatch_request_duration_seconds` (histogram): dispatch latency
//! - `dispatch_routing_failures_total` (counter): failed resolutions by kind
//! - `dispatch_session_cookies_rejected_total` (counter): cookies that failed
//!   signature checks
//!
//! # Design Decisions
//! - Endpoint labels use the endpoint name, so anonymous handlers share
//!   one label per handler
//! - The Prometheus exporter serves its own listener, separate from the app

use std::net::SocketAddr;
use std::time::Instant;

use metrics::{counter, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

/// Record one dispatched request.
pub fn record_request(method: &str, status: u16, endpoint: &str, start: Instant) {
    let labels = [
        ("method", method.to_string()),
        ("status", status.to_string()),
        ("endpoint", endpoint.to_string()),
    ];
    counter!("dispatch_requests_total", &labels).increment(1);
    histogram!("dispatch_request_duration_seconds", &labels).record(start.elapsed().as_secs_f64());
}

pub fn record_routing_failure(kind: &'static str) {
    counter!("dispatch_routing_failures_total", "kind" => kind).increment(1);
}

pub fn record_rejected_session(reason: &'static str) {
    counter!("dispatch_session_cookies_rejected_total", "reason" => reason).increment(1);
}

/// Install the Prometheus exporter listening on `addr`.
///
/// Must be called from inside a Tokio runtime.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}
