//! Metrics collection and exposition.
//!
//! # Metrics
//! - `relay_requests_total` (counter): relayed requests by kind and outcome
//! - `relay_request_duration_seconds` (histogram): time to outcome by kind
//! - `relay_active_tunnels` (gauge): live WebSocket tunnels

use std::net::SocketAddr;
use std::time::Instant;

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

/// Start the Prometheus scrape endpoint on `addr`.
///
/// Must be called from within a Tokio runtime.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

/// Record one relay outcome. `kind` is "http" or "websocket".
pub fn record_relay(kind: &'static str, outcome: &'static str, start: Instant) {
    counter!("relay_requests_total", "kind" => kind, "outcome" => outcome).increment(1);
    histogram!("relay_request_duration_seconds", "kind" => kind).record(start.elapsed().as_secs_f64());
}

pub fn set_active_tunnels(active: u64) {
    gauge!("relay_active_tunnels").set(active as f64);
}
