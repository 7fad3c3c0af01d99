//! API routes.

pub mod health;
pub mod metrics;
pub mod ws;

use axum::{routing::get, Router};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::state::AppState;

/// Creates the gateway router.
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route(&state.config.ws_path, get(ws::ws_handler))
        .route("/health", get(health::health_handler))
        .route("/health/ready", get(health::ready_handler))
        .route("/health/live", get(health::live_handler))
        .route("/metrics", get(metrics::metrics_text_handler))
        .route("/metrics/json", get(metrics::metrics_json_handler))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
