//! Prometheus metrics

use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

use crate::state::AppState;
use crate::ServerError;

/// Install the global Prometheus recorder. Only one can exist per process.
pub fn init_metrics() -> Result<PrometheusHandle, ServerError> {
    let handle = PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| ServerError::Internal(e.to_string()))?;

    metrics::describe_counter!("chat_requests_total", "Chat requests by outcome");
    metrics::describe_counter!("chat_cache_hits_total", "Cached answers served, by match kind");
    metrics::describe_histogram!("chat_request_duration_ms", "Chat request latency in milliseconds");
    metrics::describe_counter!("rate_limit_rejections_total", "Requests rejected by the rate limiter");
    metrics::describe_counter!("circuit_breaker_transitions_total", "Circuit breaker phase changes");

    Ok(handle)
}

/// GET /metrics
pub async fn metrics_handler(State(state): State<AppState>) -> Response {
    match &state.metrics {
        Some(handle) => (
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            handle.render(),
        )
            .into_response(),
        None => (StatusCode::NOT_FOUND, "metrics disabled").into_response(),
    }
}
