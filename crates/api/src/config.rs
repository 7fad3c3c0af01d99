//! Gateway configuration.

use aggregator::AggregatorConfig;
use gateway_core::{Error, Result, ValidationConfig};
use serde::{Deserialize, Serialize};
use telemetry::{LogConfig, MetricsConfig};
use validator::Validate;

use crate::rate_limit::RateLimitConfig;

/// Top-level gateway configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct GatewayConfig {
    #[serde(default = "default_host")]
    pub host: String,
    /// 0 binds an ephemeral port
    #[serde(default = "default_port")]
    pub port: u16,
    /// WebSocket upgrade path
    #[serde(default = "default_ws_path")]
    #[validate(length(min = 1, max = 128))]
    pub ws_path: String,
    /// Reply to every message with an accepted/rejected frame
    #[serde(default)]
    pub ack_rejections: bool,
    /// Interval of the periodic health log; 0 disables it
    #[serde(default = "default_health_log_interval_secs")]
    pub health_log_interval_secs: u64,

    #[serde(default)]
    pub log: LogConfig,

    #[serde(default)]
    #[validate(nested)]
    pub validation: ValidationConfig,

    #[serde(default)]
    #[validate(nested)]
    pub rate_limit: RateLimitConfig,

    #[serde(default)]
    #[validate(nested)]
    pub aggregator: AggregatorConfig,

    #[serde(default)]
    #[validate(nested)]
    pub metrics: MetricsConfig,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8765
}

fn default_ws_path() -> String {
    "/ws".to_string()
}

fn default_health_log_interval_secs() -> u64 {
    60
}

/// Paths served by the HTTP routes; the WebSocket path may not shadow them.
const RESERVED_PATHS: [&str; 5] = [
    "/health",
    "/health/ready",
    "/health/live",
    "/metrics",
    "/metrics/json",
];

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            ws_path: default_ws_path(),
            ack_rejections: false,
            health_log_interval_secs: default_health_log_interval_secs(),
            log: LogConfig::default(),
            validation: ValidationConfig::default(),
            rate_limit: RateLimitConfig::default(),
            aggregator: AggregatorConfig::default(),
            metrics: MetricsConfig::default(),
        }
    }
}

impl GatewayConfig {
    /// Bind address as `host:port`.
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Runs every field rule plus the cross-field checks.
    pub fn check(&self) -> Result<()> {
        self.validate()?;

        if !self.ws_path.starts_with('/') {
            return Err(Error::config(format!(
                "ws_path must start with '/': {}",
                self.ws_path
            )));
        }

        if RESERVED_PATHS.contains(&self.ws_path.as_str()) {
            return Err(Error::config(format!(
                "ws_path {} collides with a built-in route",
                self.ws_path
            )));
        }

        if self.rate_limit.burst_window_ms > self.rate_limit.sustained_window_ms {
            return Err(Error::config(
                "rate_limit.burst_window_ms must not exceed sustained_window_ms",
            ));
        }

        // The security verdict counts retained events, so the log must hold more than the threshold
        if self.metrics.security_log_size <= self.metrics.health.security_events {
            return Err(Error::config(format!(
                "metrics.security_log_size ({}) must exceed metrics.health.security_events ({})",
                self.metrics.security_log_size, self.metrics.health.security_events
            )));
        }

        Ok(())
    }
}
