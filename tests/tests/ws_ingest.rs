//! End-to-end tests for the WebSocket ingest pipeline.
//!
//! Frames travel over a real socket: session → validator → aggregator →
//! capturing delivery handler.

use futures_util::{SinkExt, StreamExt};
use gateway_core::EventKind;
use integration_tests::{
    fixtures,
    setup::{send_json, test_config, TestContext, DELIVERY_TIMEOUT},
};
use std::time::Duration;
use telemetry::names;
use tokio_tungstenite::tungstenite::{protocol::frame::coding::CloseCode, Message};

/// Waits until the gateway has accepted `n` events.
async fn wait_processed(ctx: &TestContext, n: u64) {
    let metrics = &ctx.gateway.state().metrics;
    tokio::time::timeout(DELIVERY_TIMEOUT, async {
        while metrics.counter(names::EVENTS_PROCESSED) < n {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("Events were never processed");
}

#[tokio::test]
async fn test_events_are_batched_and_stamped() {
    let ctx = TestContext::new().await;
    let mut socket = ctx.connect().await;

    for _ in 0..5 {
        send_json(&mut socket, &fixtures::heartbeat("g1")).await;
    }

    assert!(
        ctx.capture.wait_for(5, DELIVERY_TIMEOUT).await,
        "Expected 5 delivered events, got {}",
        ctx.capture.event_count()
    );

    let events = ctx.capture.events();
    assert!(events.iter().all(|e| e.kind == EventKind::Heartbeat));
    assert!(events.iter().all(|e| e.game_id == "g1"));
    assert!(events.iter().all(|e| e.received_at.is_some()));

    let client_id = events[0].client_id.clone().expect("client_id stamped");
    assert!(client_id.starts_with("127.0.0.1:"));
    assert!(events.iter().all(|e| e.client_id.as_deref() == Some(client_id.as_str())));

    let stats = ctx.gateway.state().aggregator.get_stats();
    assert!(stats.batch_count >= 1);

    socket.close(None).await.ok();
    ctx.gateway.stop().await;
}

#[tokio::test]
async fn test_events_from_one_client_keep_order() {
    let ctx = TestContext::new().await;
    let mut socket = ctx.connect().await;

    for seed in 0..20 {
        send_json(&mut socket, &fixtures::game_start("g1", seed)).await;
    }
    assert!(ctx.capture.wait_for(20, DELIVERY_TIMEOUT).await);

    let seeds: Vec<String> = ctx
        .capture
        .events()
        .iter()
        .map(|e| e.data["seed"].as_str().unwrap_or_default().to_string())
        .collect();
    let expected: Vec<String> = (0..20).map(|i| format!("SEED{}", i)).collect();
    assert_eq!(seeds, expected);

    ctx.gateway.stop().await;
}

#[tokio::test]
async fn test_clients_are_tracked_separately() {
    let ctx = TestContext::new().await;
    let mut first = ctx.connect().await;
    let mut second = ctx.connect().await;
    ctx.wait_for_connections(2).await;

    send_json(&mut first, &fixtures::heartbeat("g1")).await;
    send_json(&mut second, &fixtures::heartbeat("g2")).await;
    assert!(ctx.capture.wait_for(2, DELIVERY_TIMEOUT).await);

    let events = ctx.capture.events();
    let g1 = events.iter().find(|e| e.game_id == "g1").unwrap();
    let g2 = events.iter().find(|e| e.game_id == "g2").unwrap();
    assert_ne!(g1.client_id, g2.client_id);

    second.close(None).await.ok();
    ctx.wait_for_connections(1).await;

    ctx.gateway.stop().await;
    drop(first);
}

#[tokio::test]
async fn test_stop_flushes_pending_events_and_closes_sessions() {
    let mut config = test_config();
    // Long enough that only the shutdown flush can deliver
    config.aggregator.batch_window_ms = 30_000;
    let ctx = TestContext::with_config(config).await;
    let mut socket = ctx.connect().await;

    for _ in 0..3 {
        send_json(&mut socket, &fixtures::heartbeat("g1")).await;
    }
    wait_processed(&ctx, 3).await;
    assert_eq!(ctx.capture.event_count(), 0);

    ctx.gateway.stop().await;

    let batches = ctx.capture.batches();
    assert_eq!(batches.len(), 1, "Pending events flush as one final batch");
    assert_eq!(batches[0].len(), 3);
    assert!(ctx.gateway.state().connections.is_empty());
    assert!(!ctx.gateway.state().aggregator.is_running());

    let frame = tokio::time::timeout(DELIVERY_TIMEOUT, socket.next())
        .await
        .expect("Timed out waiting for close frame");
    match frame {
        Some(Ok(Message::Close(Some(close)))) => assert_eq!(close.code, CloseCode::Away),
        other => panic!("Expected close frame, got {:?}", other),
    }
}

#[tokio::test]
async fn test_gateway_restarts_after_stop() {
    let ctx = TestContext::new().await;
    ctx.gateway.stop().await;

    let addr = ctx.gateway.start().await.expect("Restart failed");
    let url = format!("ws://{}{}", addr, ctx.gateway.state().config.ws_path);
    let (mut socket, _) = tokio_tungstenite::connect_async(url)
        .await
        .expect("Failed to reconnect");

    socket
        .send(Message::Text(fixtures::heartbeat("g9").to_string()))
        .await
        .unwrap();
    assert!(ctx.capture.wait_for(1, DELIVERY_TIMEOUT).await);
    assert_eq!(ctx.capture.events()[0].game_id, "g9");

    ctx.gateway.stop().await;
}
