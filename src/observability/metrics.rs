//! Metrics collection and exposition.
//!
//! # Metrics
//! - `dispatch_requests_total` (counter): dispatched requests by service, status
//! - `dispatch_request_duration_seconds` (histogram): dispatch latency by service
//! - `circuit_breaker_transitions_total` (counter): transitions by service, target state
//! - `circuit_breaker_state` (gauge): 0=closed, 1=half-open, 2=open
//! - `circuit_breaker_rejections_total` (counter): fast-failed calls by service
//! - `service_clients_created_total` (counter): clients built by the factory
//!
//! # Design Decisions
//! - Recording goes through the `metrics` facade; without an installed
//!   recorder every call is a no-op
//! - Prometheus exporter is opt-in via config

use std::net::SocketAddr;
use std::time::Instant;

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

use crate::resilience::circuit_breaker::CircuitState;

/// Install the Prometheus recorder and its scrape endpoint.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(error = %e, "Failed to install metrics exporter"),
    }
}

/// Record a completed dispatch.
pub fn record_dispatch(service: &str, status: u16, start: Instant) {
    counter!(
        "dispatch_requests_total",
        "service" => service.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
    histogram!("dispatch_request_duration_seconds", "service" => service.to_string())
        .record(start.elapsed().as_secs_f64());
}

/// Record a breaker phase change.
pub fn record_breaker_transition(service: &str, to: CircuitState) {
    counter!(
        "circuit_breaker_transitions_total",
        "service" => service.to_string(),
        "to" => to.to_string()
    )
    .increment(1);
    record_breaker_state(service, to);
}

pub fn record_breaker_state(service: &str, state: CircuitState) {
    let value = match state {
        CircuitState::Closed => 0.0,
        CircuitState::HalfOpen => 1.0,
        CircuitState::Open => 2.0,
    };
    gauge!("circuit_breaker_state", "service" => service.to_string()).set(value);
}

pub fn record_breaker_rejection(service: &str) {
    counter!("circuit_breaker_rejections_total", "service" => service.to_string()).increment(1);
}

pub fn record_client_created(service: &str) {
    counter!("service_clients_created_total", "service" => service.to_string()).increment(1);
}
