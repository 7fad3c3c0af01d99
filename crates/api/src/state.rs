//! Application state shared across handlers.

use aggregator::EventAggregator;
use gateway_core::{EventValidator, Result};
use std::sync::Arc;
use std::time::Duration;
use telemetry::{names, MetricsCollector};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::config::GatewayConfig;
use crate::connections::ConnectionRegistry;
use crate::rate_limit::{ClientRateLimiter, SharedRateLimiter};

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<GatewayConfig>,
    pub validator: Arc<EventValidator>,
    pub rate_limiter: SharedRateLimiter,
    pub aggregator: Arc<EventAggregator>,
    pub metrics: Arc<MetricsCollector>,
    pub connections: Arc<ConnectionRegistry>,
    /// Flipped to true when the gateway stops; open sessions close on it
    pub shutdown: Arc<watch::Sender<bool>>,
}

impl AppState {
    pub fn new(config: GatewayConfig) -> Result<Self> {
        config.check()?;

        let metrics = Arc::new(MetricsCollector::new(config.metrics.clone()));
        let validator = Arc::new(EventValidator::new(config.validation.clone())?);
        let rate_limiter = Arc::new(ClientRateLimiter::new(config.rate_limit.clone())?);
        let aggregator = Arc::new(EventAggregator::new(
            config.aggregator.clone(),
            metrics.clone(),
        ));
        let connections = Arc::new(ConnectionRegistry::new(metrics.clone()));
        let (shutdown, _) = watch::channel(false);

        Ok(Self {
            config: Arc::new(config),
            validator,
            rate_limiter,
            aggregator,
            metrics,
            connections,
            shutdown: Arc::new(shutdown),
        })
    }

    pub fn is_shutting_down(&self) -> bool {
        *self.shutdown.borrow()
    }

    /// Start the rate limiter cleanup background task.
    pub fn start_rate_limiter_cleanup(&self) -> tokio::task::JoinHandle<()> {
        let rate_limiter = self.rate_limiter.clone();
        let metrics = self.metrics.clone();
        let period = Duration::from_secs(self.config.rate_limit.cleanup_interval_secs);

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            loop {
                interval.tick().await;
                let removed = rate_limiter.cleanup_stale();
                let remaining = rate_limiter.client_count();
                metrics.set_gauge(names::RATE_LIMITED_CLIENTS, remaining as f64);
                if removed > 0 {
                    debug!(removed, remaining, "Reaped idle rate limiter clients");
                }
            }
        })
    }

    /// Start the periodic health log, if enabled.
    pub fn start_health_log(&self) -> Option<tokio::task::JoinHandle<()>> {
        if self.config.health_log_interval_secs == 0 {
            return None;
        }

        let metrics = self.metrics.clone();
        let connections = self.connections.clone();
        let aggregator = self.aggregator.clone();
        let period = Duration::from_secs(self.config.health_log_interval_secs);

        Some(tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            // First tick completes immediately
            interval.tick().await;

            loop {
                interval.tick().await;
                let report = metrics.health_status();
                let received = metrics.counter(names::EVENTS_RECEIVED);
                let processed = metrics.counter(names::EVENTS_PROCESSED);
                let dropped = metrics.counter(names::EVENTS_DROPPED);

                if report.status.is_healthy() {
                    info!(
                        status = report.status.as_str(),
                        connections = connections.len(),
                        queue = aggregator.queue_len(),
                        received,
                        processed,
                        dropped,
                        "Health check"
                    );
                } else {
                    warn!(
                        status = report.status.as_str(),
                        issues = ?report.issues,
                        connections = connections.len(),
                        queue = aggregator.queue_len(),
                        received,
                        processed,
                        dropped,
                        "Health check"
                    );
                }
            }
        }))
    }
}
