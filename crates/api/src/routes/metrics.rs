//! Metrics export endpoints.

use axum::{extract::State, http::header, response::IntoResponse, Json};
use telemetry::names;

use crate::response::MetricsResponse;
use crate::state::AppState;

/// Clients listed in the structured dump.
const TOP_CLIENTS: usize = 10;

fn refresh_gauges(state: &AppState) -> usize {
    let clients = state.rate_limiter.client_count();
    state
        .metrics
        .set_gauge(names::RATE_LIMITED_CLIENTS, clients as f64);
    state
        .metrics
        .set_gauge(names::QUEUE_DEPTH, state.aggregator.queue_len() as f64);
    clients
}

/// GET /metrics - Flat text export.
pub async fn metrics_text_handler(State(state): State<AppState>) -> impl IntoResponse {
    refresh_gauges(&state);
    (
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        state.metrics.export_text(),
    )
}

/// GET /metrics/json - Structured dump with aggregator stats.
pub async fn metrics_json_handler(State(state): State<AppState>) -> Json<MetricsResponse> {
    let rate_limiter_clients = refresh_gauges(&state);
    let open_connections = state.connections.snapshot();
    Json(MetricsResponse {
        metrics: state.metrics.snapshot(),
        aggregator: state.aggregator.get_stats(),
        batches: state.aggregator.recent_batches(),
        rate_limiter_clients,
        top_clients: state.rate_limiter.top_clients(TOP_CLIENTS),
        connections: open_connections.len(),
        open_connections,
    })
}
