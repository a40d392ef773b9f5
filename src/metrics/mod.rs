// src/metrics/mod.rs
// Component K — Prometheus metrics for the aggregation-and-escalation
// engine. Grounded in the teacher's `metrics/mod.rs` (the
// `PrometheusBuilder`/`PrometheusHandle` setup and `/metrics` handler
// pattern), narrowed to the counters SPEC_FULL.md §4.K names.

use axum::{http::StatusCode, response::IntoResponse};
use metrics::counter;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::sync::OnceLock;
use tracing::info;

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

pub fn init_metrics() {
    let handle = PrometheusBuilder::new()
        .install_recorder()
        .expect("failed to install Prometheus recorder");

    PROMETHEUS_HANDLE
        .set(handle)
        .expect("Prometheus handle already initialized");

    info!("Prometheus metrics initialized");
}

/// GET /metrics
pub async fn metrics_handler() -> impl IntoResponse {
    match PROMETHEUS_HANDLE.get() {
        Some(handle) => (StatusCode::OK, handle.render()),
        None => (StatusCode::SERVICE_UNAVAILABLE, "metrics not initialized".to_string()),
    }
}

pub fn record_message_received() {
    counter!("pinokio_messages_received_total").increment(1);
}

pub fn record_series_flushed() {
    counter!("pinokio_series_flushed_total").increment(1);
}

pub fn record_deadline_fired() {
    counter!("pinokio_deadlines_fired_total").increment(1);
}

pub fn record_llm_call(call: &'static str, success: bool) {
    let outcome = if success { "success" } else { "error" };
    counter!("pinokio_llm_calls_total", "call" => call, "outcome" => outcome).increment(1);
}

pub fn record_outbound_send(kind: &'static str, success: bool) {
    let outcome = if success { "success" } else { "error" };
    counter!("pinokio_outbound_sends_total", "kind" => kind, "outcome" => outcome).increment(1);
}
