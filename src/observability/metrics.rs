//! Metrics collection and exposition.
//!
//! # Metrics
//! - `coachgate_requests_total` (counter): requests by route, status
//! - `coachgate_request_duration_seconds` (histogram): latency by route
//! - `coachgate_rate_limited_total` (counter): denials by policy class
//! - `coachgate_gate_rejections_total` (counter): rejections by error code
//! - `coachgate_content_blocked_total` (counter): screening blocks by signature
//! - `coachgate_audit_entries_total` (counter): audit outcomes
//!
//! # Design Decisions
//! - Low-overhead metric updates (atomic operations)
//! - Labels are bounded: route templates, never raw paths

use std::net::SocketAddr;
use std::time::Instant;

use metrics::{counter, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus exporter with its own HTTP listener.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_request(route: &str, status: u16, start: Instant) {
    counter!(
        "coachgate_requests_total",
        "route" => route.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
    histogram!("coachgate_request_duration_seconds", "route" => route.to_string())
        .record(start.elapsed().as_secs_f64());
}

pub fn record_rate_limited(class: &'static str) {
    counter!("coachgate_rate_limited_total", "class" => class).increment(1);
}

pub fn record_gate_rejection(code: &'static str) {
    counter!("coachgate_gate_rejections_total", "code" => code).increment(1);
}

pub fn record_content_blocked(pattern: &str) {
    counter!("coachgate_content_blocked_total", "pattern" => pattern.to_string()).increment(1);
}

pub fn record_audit(outcome: &'static str) {
    counter!("coachgate_audit_entries_total", "outcome" => outcome).increment(1);
}
