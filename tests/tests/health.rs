//! Health and metrics endpoints of a live gateway.

use api::{router, AppState};
use axum_test::TestServer;
use integration_tests::{
    fixtures,
    setup::{send_json, test_config, TestContext, DELIVERY_TIMEOUT},
};
use reqwest::StatusCode;
use serde_json::Value;
use telemetry::names;

#[tokio::test]
async fn test_health_endpoint_structure() {
    let ctx = TestContext::new().await;
    let client = reqwest::Client::new();

    let response = client.get(ctx.http_url("/health")).send().await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body: Value = response.json().await.unwrap();
    for field in [
        "status",
        "issues",
        "error_rate",
        "invalid_rate",
        "recent_security_events",
        "timestamp",
        "connections",
        "queue_depth",
        "aggregator_running",
    ] {
        assert!(body.get(field).is_some(), "Response should have '{}' field", field);
    }
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["aggregator_running"], true);

    ctx.gateway.stop().await;
}

#[tokio::test]
async fn test_health_counts_open_sessions() {
    let ctx = TestContext::new().await;
    let _socket = ctx.connect().await;
    ctx.wait_for_connections(1).await;

    let body: Value = reqwest::get(ctx.http_url("/health"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["connections"], 1);

    ctx.gateway.stop().await;
}

#[tokio::test]
async fn test_readiness_and_liveness() {
    let ctx = TestContext::new().await;

    let ready = reqwest::get(ctx.http_url("/health/ready")).await.unwrap();
    assert_eq!(ready.status(), StatusCode::OK);

    let live = reqwest::get(ctx.http_url("/health/live")).await.unwrap();
    assert_eq!(live.status(), StatusCode::OK);

    ctx.gateway.stop().await;
}

#[tokio::test]
async fn test_metrics_reflect_ingest() {
    let ctx = TestContext::new().await;
    let mut socket = ctx.connect().await;

    // One session handles frames in order, so the delivery implies both ran
    send_json(&mut socket, &fixtures::unknown_type()).await;
    send_json(&mut socket, &fixtures::heartbeat("g1")).await;
    assert!(ctx.capture.wait_for(1, DELIVERY_TIMEOUT).await);

    let text = reqwest::get(ctx.http_url("/metrics"))
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    assert!(text.contains("gateway_events_received_total 2"), "{}", text);
    assert!(text.contains("gateway_events_processed_total 1"), "{}", text);
    assert!(text.contains("gateway_invalid_events_total 1"), "{}", text);
    assert!(text.contains("gateway_websocket_connections 1"), "{}", text);

    let body: Value = reqwest::get(ctx.http_url("/metrics/json"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["metrics"]["counters"]["events_processed_total"], 1);
    assert!(body["aggregator"]["batch_count"].as_u64().unwrap() >= 1);
    assert_eq!(body["rate_limiter_clients"], 1);
    assert_eq!(body["connections"], 1);

    ctx.gateway.stop().await;
}

/// Readiness follows the aggregator, without a listener.
#[tokio::test]
async fn test_router_readiness_without_listener() {
    let state = AppState::new(test_config()).expect("Invalid test configuration");
    let server = TestServer::new(router(state.clone())).expect("Failed to create test server");

    server
        .get("/health/ready")
        .await
        .assert_status(axum::http::StatusCode::SERVICE_UNAVAILABLE);

    state.aggregator.start();
    server.get("/health/ready").await.assert_status_ok();

    state.metrics.increment_by(names::EVENTS_RECEIVED, 10);
    state.metrics.increment_by(names::INVALID_EVENTS, 2);
    let body: Value = server.get("/health").await.json();
    assert_eq!(body["status"], "degraded");
    assert!(!body["issues"].as_array().unwrap().is_empty());

    state.aggregator.stop().await;
}
