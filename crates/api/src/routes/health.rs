//! Health check endpoints.

use axum::{extract::State, http::StatusCode, Json};

use crate::response::HealthResponse;
use crate::state::AppState;

/// GET /health - Full health check.
pub async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        report: state.metrics.health_status(),
        connections: state.connections.len(),
        queue_depth: state.aggregator.queue_len(),
        aggregator_running: state.aggregator.is_running(),
    })
}

/// GET /health/ready - Readiness check (aggregator is batching).
pub async fn ready_handler(State(state): State<AppState>) -> StatusCode {
    if state.aggregator.is_running() && !state.is_shutting_down() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}

/// GET /health/live - Liveness check (service is running).
pub async fn live_handler() -> StatusCode {
    StatusCode::OK
}
