//! Metrics collection and exposition.
//!
//! # Metrics
//! - `proxy_requests_total` (counter): requests by method, status
//! - `proxy_request_duration_seconds` (histogram): time from parse to response
//! - `proxy_active_connections` (gauge): open connections by role
//! - `proxy_connections_total` (counter): opened connections by role
//! - `proxy_policy_rejections_total` (counter): rejections by reason
//! - `proxy_cache_events_total` (counter): miss / hit / refresh / unreachable / error
//! - `proxy_cache_entries` (gauge): cached targets
//! - `proxy_tunnel_bytes_total` (counter): relayed bytes by direction
//!
//! Without an installed recorder every call is a no-op.

use std::net::SocketAddr;
use std::time::Instant;

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus recorder and its scrape endpoint on `addr`.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_request(method: &str, status: u16, start: Instant) {
    let labels = [("method", method.to_string()), ("status", status.to_string())];
    counter!("proxy_requests_total", &labels).increment(1);
    histogram!("proxy_request_duration_seconds", &labels).record(start.elapsed().as_secs_f64());
}

pub fn record_connection_opened(role: &'static str) {
    counter!("proxy_connections_total", "role" => role).increment(1);
    gauge!("proxy_active_connections", "role" => role).increment(1.0);
}

pub fn record_connection_closed(role: &'static str) {
    gauge!("proxy_active_connections", "role" => role).decrement(1.0);
}

pub fn record_policy_rejection(reason: &'static str) {
    counter!("proxy_policy_rejections_total", "reason" => reason).increment(1);
}

pub fn record_cache_event(event: &'static str) {
    counter!("proxy_cache_events_total", "event" => event).increment(1);
}

pub fn record_cache_size(entries: usize) {
    gauge!("proxy_cache_entries").set(entries as f64);
}

pub fn record_tunnel_bytes(direction: &'static str, bytes: u64) {
    counter!("proxy_tunnel_bytes_total", "direction" => direction).increment(bytes);
}
