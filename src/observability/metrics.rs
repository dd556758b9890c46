//! Metrics collection and exposition.
//!
//! # Metrics
//! - `trigger_requests_total` (counter): responses by status code
//! - `trigger_playback_dispatched_total` (counter): URLs handed to the sink
//! - `trigger_active_connections` (gauge): sessions currently tracked
//! - `trigger_restarts_total` (counter): configuration restarts
//!
//! Without an installed recorder every call is a no-op.

use std::net::SocketAddr;

use metrics_exporter_prometheus::PrometheusBuilder;

/// Start the Prometheus scrape endpoint on `addr`.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_request(status: u16) {
    metrics::counter!("trigger_requests_total", "status" => status.to_string()).increment(1);
}

pub fn record_playback() {
    metrics::counter!("trigger_playback_dispatched_total").increment(1);
}

pub fn record_restart() {
    metrics::counter!("trigger_restarts_total").increment(1);
}

pub fn connection_opened() {
    metrics::gauge!("trigger_active_connections").increment(1.0);
}

pub fn connection_closed() {
    metrics::gauge!("trigger_active_connections").decrement(1.0);
}
