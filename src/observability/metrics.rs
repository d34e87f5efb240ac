//! Metrics collection and exposition.
//!
//! # Metrics
//! - `devsync_reload_broadcasts_total` (counter): reload broadcasts sent
//! - `devsync_proxy_requests_total` (counter): proxied requests by method, status
//! - `devsync_proxy_request_duration_seconds` (histogram): proxied request latency
//!
//! Without an installed recorder every call is a no-op.

use std::net::SocketAddr;
use std::time::Instant;

use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus exporter with an HTTP scrape endpoint.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_reload() {
    metrics::counter!("devsync_reload_broadcasts_total").increment(1);
}

pub fn record_proxy_request(method: &str, status: u16, start: Instant) {
    let labels = [
        ("method", method.to_string()),
        ("status", status.to_string()),
    ];
    metrics::counter!("devsync_proxy_requests_total", &labels).increment(1);
    metrics::histogram!("devsync_proxy_request_duration_seconds", &labels)
        .record(start.elapsed().as_secs_f64());
}
