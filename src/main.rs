//! Game Event Gateway
//!
//! WebSocket ingestion front door for game telemetry:
//! - Per-event schema validation and sanitization
//! - Per-client burst and sustained rate limiting
//! - Windowed batching with fan-out to delivery handlers
//! - Health verdicts and metrics export over HTTP

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::signal;
use tracing::info;

use aggregator::{LogSink, MetricsSink};
use api::{Gateway, GatewayConfig};
use telemetry::init_tracing;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    // Load configuration
    let config = load_config()?;

    // Initialize tracing
    init_tracing(&config.log).context("Failed to initialize tracing")?;

    info!("Starting Game Event Gateway v{}", env!("CARGO_PKG_VERSION"));
    info!(
        host = %config.host,
        port = config.port,
        window_ms = config.aggregator.batch_window_ms,
        max_batch = config.aggregator.max_batch_size,
        max_queue = config.aggregator.max_queue_size,
        burst_limit = config.rate_limit.burst_limit,
        sustained_limit = config.rate_limit.sustained_limit,
        ack_rejections = config.ack_rejections,
        "Loaded configuration"
    );

    let gateway = Gateway::new(config).context("Invalid configuration")?;

    // Downstream consumers
    gateway.set_batch_handler(Arc::new(LogSink));
    gateway.add_delivery_handler(Arc::new(MetricsSink::new(gateway.state().metrics.clone())));

    let addr = gateway.start().await.context("Failed to start gateway")?;
    info!("Listening on ws://{}{}", addr, gateway.state().config.ws_path);

    shutdown_signal().await;

    info!("Shutting down...");
    gateway.stop().await;

    info!("Shutdown complete");
    Ok(())
}

/// Load configuration from files and environment.
fn load_config() -> Result<GatewayConfig> {
    let config = config::Config::builder()
        // Start with defaults
        .add_source(config::Config::try_from(&GatewayConfig::default())?)
        // Load from config file if exists
        .add_source(
            config::File::with_name("config/default")
                .required(false)
                .format(config::FileFormat::Toml),
        )
        // Override with environment variables
        .add_source(
            config::Environment::default()
                .prefix("GATEWAY")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        )
        .build()
        .context("Failed to build configuration")?;

    let config: GatewayConfig = config
        .try_deserialize()
        .context("Failed to deserialize configuration")?;

    config.check().context("Configuration failed validation")?;

    Ok(config)
}

/// Graceful shutdown signal handler.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install terminate handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C signal");
        }
        _ = terminate => {
            info!("Received terminate signal");
        }
    }
}
