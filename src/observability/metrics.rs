//! Metrics collection and exposition.
//!
//! # Responsibilities
//! - Define server metrics (requests, upgrades, relay sessions)
//! - Expose Prometheus-compatible metrics endpoint
//!
//! # Metrics
//! - `ui_http_requests_total` (counter): requests by module and status
//! - `ui_http_request_duration_seconds` (histogram): latency by module
//! - `ui_ws_upgrades_total` (counter): upgrade attempts by module and outcome
//! - `ui_relay_sessions_active` (gauge): paired relay sessions
//! - `ui_relay_sessions_closed_total` (counter): relay endings by reason
//! - `ui_relay_sessions_reaped_total` (counter): unpaired sessions reaped
//!
//! # Design Decisions
//! - Low-overhead metric updates (atomic operations)
//! - Without an installed recorder every call is a no-op

use std::net::SocketAddr;
use std::time::Instant;

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus recorder and its scrape endpoint.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(err) => tracing::error!(error = %err, "Failed to install metrics exporter"),
    }
}

/// Record a completed HTTP request.
pub fn record_request(module: &str, status: u16, start: Instant) {
    counter!(
        "ui_http_requests_total",
        "module" => module.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
    histogram!("ui_http_request_duration_seconds", "module" => module.to_string())
        .record(start.elapsed().as_secs_f64());
}

/// Record the outcome of an upgrade attempt.
pub fn record_upgrade(module: &str, outcome: &'static str) {
    counter!(
        "ui_ws_upgrades_total",
        "module" => module.to_string(),
        "outcome" => outcome
    )
    .increment(1);
}

pub fn relay_session_opened() {
    gauge!("ui_relay_sessions_active").increment(1.0);
}

pub fn relay_session_closed(reason: &'static str) {
    gauge!("ui_relay_sessions_active").decrement(1.0);
    counter!("ui_relay_sessions_closed_total", "reason" => reason).increment(1);
}

pub fn record_sessions_reaped(count: usize) {
    counter!("ui_relay_sessions_reaped_total").increment(count as u64);
}
