//! Rejection paths of the ingest pipeline.
//!
//! Rejected messages never close the session. With `ack_rejections` on,
//! every message is answered with an accepted/rejected frame.

use futures_util::{SinkExt, StreamExt};
use integration_tests::{
    fixtures,
    setup::{next_json, send_json, test_config, TestContext, DELIVERY_TIMEOUT},
};
use std::time::Duration;
use telemetry::names;
use tokio_tungstenite::tungstenite::Message;

async fn acking_context() -> TestContext {
    let mut config = test_config();
    config.ack_rejections = true;
    TestContext::with_config(config).await
}

#[tokio::test]
async fn test_bad_json_keeps_connection_open() {
    let ctx = acking_context().await;
    let mut socket = ctx.connect().await;

    socket
        .send(Message::Text("{not json".to_string()))
        .await
        .unwrap();
    let ack = next_json(&mut socket).await;
    assert_eq!(ack["status"], "rejected");
    assert_eq!(ack["reason"], "invalid_format");
    assert_eq!(ack["code"], "VALID_001");

    send_json(&mut socket, &fixtures::heartbeat("g1")).await;
    let ack = next_json(&mut socket).await;
    assert_eq!(ack["status"], "accepted");

    assert!(ctx.capture.wait_for(1, DELIVERY_TIMEOUT).await);
    assert_eq!(
        ctx.gateway.state().metrics.counter(names::INVALID_MESSAGES),
        1
    );

    ctx.gateway.stop().await;
}

#[tokio::test]
async fn test_unknown_event_type_is_rejected() {
    let ctx = acking_context().await;
    let mut socket = ctx.connect().await;

    send_json(&mut socket, &fixtures::unknown_type()).await;
    let ack = next_json(&mut socket).await;
    assert_eq!(ack["status"], "rejected");
    assert_eq!(ack["reason"], "schema_violation");
    assert_eq!(ack["code"], "VALID_003");
    assert!(!ack["errors"].as_array().unwrap().is_empty());

    let metrics = &ctx.gateway.state().metrics;
    assert_eq!(metrics.counter(names::INVALID_EVENTS), 1);
    assert_eq!(metrics.security_events().len(), 1);
    assert_eq!(metrics.security_events()[0].event_type, names::SECURITY_INVALID_SCHEMA);

    ctx.gateway.stop().await;
    assert_eq!(ctx.capture.event_count(), 0);
}

#[tokio::test]
async fn test_oversized_event_is_rejected() {
    let ctx = acking_context().await;
    let max = ctx.gateway.state().validator.config().max_event_size_bytes;
    let mut socket = ctx.connect().await;

    send_json(&mut socket, &fixtures::oversized(max)).await;
    let ack = next_json(&mut socket).await;
    assert_eq!(ack["reason"], "event_too_large");
    assert_eq!(ack["code"], "VALID_002");

    send_json(&mut socket, &fixtures::heartbeat("g1")).await;
    assert_eq!(next_json(&mut socket).await["status"], "accepted");

    ctx.gateway.stop().await;
}

#[tokio::test]
async fn test_too_many_cards_is_rejected() {
    let ctx = acking_context().await;
    let mut socket = ctx.connect().await;

    send_json(&mut socket, &fixtures::hand_played("g1", 9)).await;
    let ack = next_json(&mut socket).await;
    assert_eq!(ack["reason"], "schema_violation");
    let errors = ack["errors"].as_array().unwrap();
    assert!(
        errors
            .iter()
            .any(|e| e.as_str().unwrap_or_default().contains("too many cards")),
        "errors: {:?}",
        errors
    );

    send_json(&mut socket, &fixtures::hand_played("g1", 5)).await;
    assert_eq!(next_json(&mut socket).await["status"], "accepted");
    assert!(ctx.capture.wait_for(1, DELIVERY_TIMEOUT).await);

    ctx.gateway.stop().await;
}

#[tokio::test]
async fn test_burst_limit_rejects_excess_messages() {
    let mut config = test_config();
    config.ack_rejections = true;
    config.rate_limit.burst_limit = 3;
    config.rate_limit.burst_window_ms = 60_000;
    let ctx = TestContext::with_config(config).await;
    let mut socket = ctx.connect().await;

    for _ in 0..3 {
        send_json(&mut socket, &fixtures::heartbeat("g1")).await;
        assert_eq!(next_json(&mut socket).await["status"], "accepted");
    }

    send_json(&mut socket, &fixtures::heartbeat("g1")).await;
    let ack = next_json(&mut socket).await;
    assert_eq!(ack["reason"], "rate_limited");
    assert_eq!(ack["code"], "RATE_001");

    let metrics = &ctx.gateway.state().metrics;
    assert_eq!(metrics.counter(names::RATE_LIMITED), 1);
    assert!(metrics
        .security_events()
        .iter()
        .any(|e| e.event_type == names::SECURITY_RATE_LIMIT));

    // A fresh connection is a different client
    let mut other = ctx.connect().await;
    send_json(&mut other, &fixtures::heartbeat("g2")).await;
    assert_eq!(next_json(&mut other).await["status"], "accepted");

    ctx.gateway.stop().await;
}

#[tokio::test]
async fn test_rejections_are_silent_by_default() {
    let ctx = TestContext::new().await;
    let mut socket = ctx.connect().await;

    socket
        .send(Message::Text("[1, 2".to_string()))
        .await
        .unwrap();
    send_json(&mut socket, &fixtures::heartbeat("g1")).await;

    assert!(ctx.capture.wait_for(1, DELIVERY_TIMEOUT).await);
    assert_eq!(
        ctx.gateway.state().metrics.counter(names::INVALID_MESSAGES),
        1
    );

    // Nothing was written back
    let reply = tokio::time::timeout(Duration::from_millis(100), socket.next()).await;
    assert!(reply.is_err(), "Unexpected reply: {:?}", reply);

    ctx.gateway.stop().await;
}
