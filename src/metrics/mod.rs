// src/metrics/mod.rs
// Prometheus metrics for the CommandCenter core

use axum::{http::StatusCode, response::IntoResponse};
use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::sync::OnceLock;
use std::time::Instant;
use tracing::info;

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Install the Prometheus recorder. Call once at startup.
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
        None => (
            StatusCode::SERVICE_UNAVAILABLE,
            "metrics not initialized".to_string(),
        ),
    }
}

/// Record an `ask` RPC (or any inbound request).
pub fn record_request(request_type: &str) {
    counter!("commandcenter_requests_total", "type" => request_type.to_string()).increment(1);
}

pub fn record_request_duration(request_type: &str, duration_seconds: f64) {
    histogram!("commandcenter_request_duration_seconds", "type" => request_type.to_string())
        .record(duration_seconds);
}

/// Record context cache hit/miss (Context Manager §4.1).
pub fn record_cache_result(hit: bool) {
    let result = if hit { "hit" } else { "miss" };
    counter!("commandcenter_context_cache_total", "result" => result).increment(1);
}

/// Record an agent execution: which specialist answered, whether it errored.
pub fn record_agent_execution(agent_role: &str, query_type: &str, error: Option<&str>) {
    let status = error.unwrap_or("ok");
    counter!(
        "commandcenter_agent_executions_total",
        "agent_role" => agent_role.to_string(),
        "query_type" => query_type.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
}

/// Record tool execution (Agent Orchestrator §4.3).
pub fn record_tool_execution(tool_name: &str, success: bool, duration_seconds: f64) {
    let status = if success { "success" } else { "error" };
    counter!("commandcenter_tool_executions_total", "tool" => tool_name.to_string(), "status" => status)
        .increment(1);
    histogram!("commandcenter_tool_execution_duration_seconds", "tool" => tool_name.to_string())
        .record(duration_seconds);
}

/// Record tokens accounted for a single `ask` call.
pub fn record_tokens_in(query_type: &str, tokens: i64) {
    counter!("commandcenter_context_tokens_total", "query_type" => query_type.to_string())
        .increment(tokens.max(0) as u64);
}

/// Poller health gauge: 1 = healthy, 0 = degraded (§4.4).
pub fn set_poller_health(vendor: &str, healthy: bool) {
    gauge!("commandcenter_poller_healthy", "vendor" => vendor.to_string())
        .set(if healthy { 1.0 } else { 0.0 });
}

pub fn record_poller_attempt(vendor: &str, success: bool) {
    let status = if success { "success" } else { "error" };
    counter!("commandcenter_poller_attempts_total", "vendor" => vendor.to_string(), "status" => status)
        .increment(1);
}

/// Record a KB sync run's final counts.
pub fn record_sync_run(status: &str, processed: i64, failed: i64) {
    counter!("commandcenter_kb_sync_runs_total", "status" => status.to_string()).increment(1);
    counter!("commandcenter_kb_sync_documents_total", "outcome" => "processed")
        .increment(processed.max(0) as u64);
    counter!("commandcenter_kb_sync_documents_total", "outcome" => "failed")
        .increment(failed.max(0) as u64);
}

/// Timing helper; records duration on drop so early returns are still counted.
pub struct RequestTimer {
    start: Instant,
    request_type: String,
}

impl RequestTimer {
    pub fn new(request_type: &str) -> Self {
        record_request(request_type);
        Self {
            start: Instant::now(),
            request_type: request_type.to_string(),
        }
    }
}

impl Drop for RequestTimer {
    fn drop(&mut self) {
        record_request_duration(&self.request_type, self.start.elapsed().as_secs_f64());
    }
}
