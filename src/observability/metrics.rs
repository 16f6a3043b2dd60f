//! Metrics collection and exposition.
//!
//! # Responsibilities
//! - Define gateway metrics (sessions, requests, pools)
//! - Expose a Prometheus-compatible rendering handle
//! - Track per-backend and aggregate counts
//!
//! # Metrics
//! - `toolgate_active_sessions` (gauge): open sessions by backend
//! - `toolgate_sessions_total` (counter): sessions ever opened by backend
//! - `toolgate_requests_total` (counter): HTTP requests by method, status
//! - `toolgate_pools_opened_total` / `toolgate_pools_closed_total` (counters)
//! - `toolgate_messages_total` (counter): messages routed by backend

use std::time::Instant;

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};

/// Install the global Prometheus recorder.
///
/// Must be called once at startup, before any metric is emitted. The
/// returned handle renders the scrape body for the `/metrics` route.
pub fn install_recorder() -> Result<PrometheusHandle, BuildError> {
    PrometheusBuilder::new().install_recorder()
}

/// Record a completed HTTP request.
pub fn record_request(method: &str, status: u16, start_time: Instant) {
    counter!(
        "toolgate_requests_total",
        "method" => method.to_string(),
        "status" => status.to_string(),
    )
    .increment(1);
    histogram!("toolgate_request_duration_seconds")
        .record(start_time.elapsed().as_secs_f64());
}

/// Record a session opening for a backend.
pub fn session_opened(backend: &str) {
    gauge!("toolgate_active_sessions", "backend" => backend.to_string()).increment(1.0);
    counter!("toolgate_sessions_total", "backend" => backend.to_string()).increment(1);
}

/// Record a session closing for a backend.
pub fn session_closed(backend: &str) {
    gauge!("toolgate_active_sessions", "backend" => backend.to_string()).decrement(1.0);
}

/// Record a message routed to a session.
pub fn message_routed(backend: &str) {
    counter!("toolgate_messages_total", "backend" => backend.to_string()).increment(1);
}

/// Record a connection pool being initialized.
pub fn pool_opened(identifier: &str) {
    counter!("toolgate_pools_opened_total", "identifier" => identifier.to_string()).increment(1);
}

/// Record a connection pool being closed.
pub fn pool_closed(identifier: &str) {
    counter!("toolgate_pools_closed_total", "identifier" => identifier.to_string()).increment(1);
}
