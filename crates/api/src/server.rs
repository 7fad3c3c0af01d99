//! Gateway lifecycle: listener, aggregator and background tasks.

use aggregator::DeliveryHandler;
use gateway_core::Result;
use parking_lot::Mutex;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::config::GatewayConfig;
use crate::routes::router;
use crate::state::AppState;

/// How long `stop` waits for sessions to close after the close frames.
const CONNECTION_CLOSE_TIMEOUT: Duration = Duration::from_secs(5);

struct Running {
    addr: SocketAddr,
    server: JoinHandle<()>,
    background: Vec<JoinHandle<()>>,
}

/// The WebSocket ingest gateway.
pub struct Gateway {
    state: AppState,
    running: Mutex<Option<Running>>,
}

impl Gateway {
    /// Builds the gateway. Fails on invalid configuration.
    pub fn new(config: GatewayConfig) -> Result<Self> {
        Ok(Self {
            state: AppState::new(config)?,
            running: Mutex::new(None),
        })
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    /// Sets the single batch handler.
    pub fn set_batch_handler(&self, handler: Arc<dyn DeliveryHandler>) {
        self.state.aggregator.set_batch_handler(handler);
    }

    /// Adds a fan-out delivery handler.
    pub fn add_delivery_handler(&self, handler: Arc<dyn DeliveryHandler>) {
        self.state.aggregator.add_delivery_handler(handler);
    }

    /// Address the listener is bound to, while running.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.running.lock().as_ref().map(|r| r.addr)
    }

    /// Starts the aggregator, background tasks and listener.
    ///
    /// Returns the bound address; bind failures are returned to the caller.
    pub async fn start(&self) -> Result<SocketAddr> {
        if let Some(addr) = self.local_addr() {
            warn!(addr = %addr, "Gateway already running");
            return Ok(addr);
        }

        let bind = self.state.config.bind_address();
        let listener = TcpListener::bind(&bind).await.map_err(|e| {
            error!(addr = %bind, error = %e, "Failed to bind");
            e
        })?;
        let addr = listener.local_addr()?;

        self.state.shutdown.send_replace(false);
        self.state.aggregator.start();

        let mut background = vec![self.state.start_rate_limiter_cleanup()];
        background.extend(self.state.start_health_log());

        let app = router(self.state.clone());
        let mut shutdown = self.state.shutdown.subscribe();

        let server = tokio::spawn(async move {
            let result = axum::serve(
                listener,
                app.into_make_service_with_connect_info::<SocketAddr>(),
            )
            .with_graceful_shutdown(async move {
                let _ = shutdown.wait_for(|stop| *stop).await;
            })
            .await;

            if let Err(e) = result {
                error!(error = %e, "Server error");
            }
        });

        info!(
            addr = %addr,
            ws_path = %self.state.config.ws_path,
            "Gateway listening"
        );

        *self.running.lock() = Some(Running {
            addr,
            server,
            background,
        });

        Ok(addr)
    }

    /// Closes sessions, stops the listener and flushes the aggregator.
    ///
    /// Returns once the final batch has been delivered.
    pub async fn stop(&self) {
        let Some(running) = self.running.lock().take() else {
            return;
        };

        info!("Stopping gateway...");
        self.state.shutdown.send_replace(true);

        if !self.state.connections.wait_idle(CONNECTION_CLOSE_TIMEOUT).await {
            warn!(
                remaining = self.state.connections.len(),
                "Connections still open after close timeout"
            );
        }

        if let Err(e) = running.server.await {
            error!(error = %e, "Server task failed");
        }

        self.state.aggregator.stop().await;

        for task in running.background {
            task.abort();
        }

        info!("Gateway stopped");
    }
}
