//! Metrics collection and exposition.
//!
//! # Metrics
//! - `gateway_requests_total` (counter): edge events by method, status
//! - `gateway_request_duration_seconds` (histogram): end-to-end latency
//! - `gateway_streaming_rejected_total` (counter): GET requests refused
//! - `gateway_decode_failures_total` (counter): malformed JSON-RPC bodies
//! - `gateway_construction_failures_total` (counter): events that could not
//!   form a request
//! - `transport_requests_total` (counter): outbound calls by scheme, outcome
//!
//! Recording is a no-op until a recorder is installed, so library users who
//! never call `init_metrics` pay nothing.

use std::net::SocketAddr;
use std::time::Instant;

use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus exporter with its own HTTP listener.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_request(method: &str, status: u16, start_time: Instant) {
    let method = method.to_string();
    let status = status.to_string();
    metrics::counter!(
        "gateway_requests_total",
        "method" => method.clone(),
        "status" => status.clone()
    )
    .increment(1);
    metrics::histogram!(
        "gateway_request_duration_seconds",
        "method" => method,
        "status" => status
    )
    .record(start_time.elapsed().as_secs_f64());
}

pub fn record_streaming_rejected() {
    metrics::counter!("gateway_streaming_rejected_total").increment(1);
}

pub fn record_decode_failure() {
    metrics::counter!("gateway_decode_failures_total").increment(1);
}

pub fn record_construction_failure() {
    metrics::counter!("gateway_construction_failures_total").increment(1);
}

pub fn record_transport(scheme: &'static str, outcome: &'static str) {
    metrics::counter!("transport_requests_total", "scheme" => scheme, "outcome" => outcome)
        .increment(1);
}
