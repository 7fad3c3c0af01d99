//! Common test setup functions.

use api::{Gateway, GatewayConfig};
use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};

use crate::mocks::CapturingHandler;

pub type WsClient = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// How long tests wait for a batch to be delivered.
pub const DELIVERY_TIMEOUT: Duration = Duration::from_secs(5);

/// Configuration tuned for tests: ephemeral port, short windows.
pub fn test_config() -> GatewayConfig {
    let mut config = GatewayConfig {
        port: 0,
        health_log_interval_secs: 0,
        ..GatewayConfig::default()
    };
    config.aggregator.batch_window_ms = 20;
    config
}

/// A running gateway with a capturing delivery handler.
pub struct TestContext {
    pub gateway: Gateway,
    pub capture: Arc<CapturingHandler>,
    pub addr: SocketAddr,
}

impl TestContext {
    /// Starts a gateway with the test defaults.
    pub async fn new() -> Self {
        Self::with_config(test_config()).await
    }

    /// Starts a gateway with a custom configuration.
    pub async fn with_config(config: GatewayConfig) -> Self {
        let gateway = Gateway::new(config).expect("Invalid test configuration");
        let capture = CapturingHandler::new("capture");
        gateway.add_delivery_handler(capture.clone());

        let addr = gateway.start().await.expect("Failed to start gateway");

        Self {
            gateway,
            capture,
            addr,
        }
    }

    pub fn ws_url(&self) -> String {
        format!("ws://{}{}", self.addr, self.gateway.state().config.ws_path)
    }

    pub fn http_url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    /// Opens a WebSocket session.
    pub async fn connect(&self) -> WsClient {
        let (socket, _) = connect_async(self.ws_url())
            .await
            .expect("Failed to connect WebSocket");
        socket
    }

    /// Waits until the registry reports `n` open sessions.
    pub async fn wait_for_connections(&self, n: usize) {
        let connections = &self.gateway.state().connections;
        tokio::time::timeout(DELIVERY_TIMEOUT, async {
            while connections.len() != n {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("Connection count never settled");
    }
}

/// Sends one JSON value as a text frame.
pub async fn send_json(socket: &mut WsClient, value: &Value) {
    socket
        .send(Message::Text(value.to_string()))
        .await
        .expect("Failed to send frame");
}

/// Reads the next text frame as JSON.
pub async fn next_json(socket: &mut WsClient) -> Value {
    loop {
        let message = tokio::time::timeout(DELIVERY_TIMEOUT, socket.next())
            .await
            .expect("Timed out waiting for a frame")
            .expect("Socket closed")
            .expect("Socket error");

        match message {
            Message::Text(text) => {
                return serde_json::from_str(&text).expect("Frame is not JSON");
            }
            Message::Ping(_) | Message::Pong(_) => continue,
            other => panic!("Unexpected frame: {:?}", other),
        }
    }
}
