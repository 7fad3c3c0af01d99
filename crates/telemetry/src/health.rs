//! Health verdicts derived from the collected metrics.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::metrics::MetricsCollector;
use crate::names;

/// Overall health status.
///
/// Variants are ordered by severity so the worst verdict can be taken with `max`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
    SecurityAlert,
}

impl HealthStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Healthy => "healthy",
            Self::Degraded => "degraded",
            Self::Unhealthy => "unhealthy",
            Self::SecurityAlert => "security_alert",
        }
    }

    pub fn is_healthy(&self) -> bool {
        matches!(self, Self::Healthy)
    }

    /// Whether the gateway should keep taking traffic.
    pub fn is_serving(&self) -> bool {
        matches!(self, Self::Healthy | Self::Degraded)
    }
}

/// Thresholds for the health verdict.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct HealthThresholds {
    /// Failure share above which the gateway is unhealthy, applied to both
    /// event processing and handler deliveries
    #[validate(range(min = 0.0, max = 1.0))]
    pub error_rate: f64,
    /// Invalid messages per received message above which the gateway is degraded
    #[validate(range(min = 0.0, max = 1.0))]
    pub invalid_rate: f64,
    /// Lookback for the error and invalid rates
    #[validate(range(min = 1, max = 86400))]
    pub rate_window_secs: u64,
    /// Security events within the window above which an alert is raised
    pub security_events: usize,
    /// Lookback for security events
    #[validate(range(min = 1, max = 86400))]
    pub security_window_secs: u64,
}

impl Default for HealthThresholds {
    fn default() -> Self {
        Self {
            error_rate: 0.10,
            invalid_rate: 0.10,
            rate_window_secs: 300,
            security_events: 50,
            security_window_secs: 300,
        }
    }
}

/// Health verdict plus the inputs it was derived from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthReport {
    pub status: HealthStatus,
    pub issues: Vec<String>,
    /// Worse of the processing and delivery error rates
    pub error_rate: f64,
    pub delivery_error_rate: f64,
    pub invalid_rate: f64,
    pub recent_security_events: usize,
    pub timestamp: DateTime<Utc>,
}

fn ratio(numerator: u64, denominator: u64) -> f64 {
    if denominator == 0 {
        0.0
    } else {
        numerator as f64 / denominator as f64
    }
}

impl MetricsCollector {
    /// Derives the current health verdict.
    pub fn health_status(&self) -> HealthReport {
        self.health_status_at(Utc::now())
    }

    /// Derives the health verdict as of `now`.
    ///
    /// Rates cover the last `rate_window_secs`. Each threshold is evaluated
    /// independently; the most severe wins.
    pub fn health_status_at(&self, now: DateTime<Utc>) -> HealthReport {
        let thresholds = &self.config().health;
        let mut status = HealthStatus::Healthy;
        let mut issues = Vec::new();

        let since = now - Duration::seconds(thresholds.rate_window_secs as i64);
        let windowed = |name: &str| self.windowed_count(name, since);

        let received = windowed(names::EVENTS_RECEIVED);
        let processed = windowed(names::EVENTS_PROCESSED);
        let invalid = windowed(names::INVALID_MESSAGES) + windowed(names::INVALID_EVENTS);
        let processing_error_rate = ratio(windowed(names::PROCESSING_ERRORS), processed);
        let delivery_error_rate =
            ratio(windowed(names::DELIVERY_ERRORS), windowed(names::DELIVERIES));
        let error_rate = processing_error_rate.max(delivery_error_rate);
        let invalid_rate = ratio(invalid, received);

        if processing_error_rate > thresholds.error_rate {
            status = status.max(HealthStatus::Unhealthy);
            issues.push(format!(
                "High error rate: {:.1}%",
                processing_error_rate * 100.0
            ));
        }

        if delivery_error_rate > thresholds.error_rate {
            status = status.max(HealthStatus::Unhealthy);
            issues.push(format!(
                "High delivery error rate: {:.1}%",
                delivery_error_rate * 100.0
            ));
        }

        if invalid_rate > thresholds.invalid_rate {
            status = status.max(HealthStatus::Degraded);
            issues.push(format!(
                "High invalid message rate: {:.1}%",
                invalid_rate * 100.0
            ));
        }

        let window = Duration::seconds(thresholds.security_window_secs as i64);
        let recent_security_events = self.security_events_since(now - window);
        if recent_security_events > thresholds.security_events {
            status = status.max(HealthStatus::SecurityAlert);
            issues.push(format!(
                "High security event rate: {} in last {}s",
                recent_security_events, thresholds.security_window_secs
            ));
        }

        HealthReport {
            status,
            issues,
            error_rate,
            delivery_error_rate,
            invalid_rate,
            recent_security_events,
            timestamp: now,
        }
    }
}
