//! Response bodies and acknowledgement frames.

use aggregator::{AggregatorStats, BatchStats};
use serde::{Deserialize, Serialize};
use telemetry::{HealthReport, MetricsSnapshot};

use crate::connections::ConnectionInfo;
use crate::ingest::MessageOutcome;
use crate::rate_limit::ClientReport;

/// Per-message acknowledgement, sent only when `ack_rejections` is on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum AckFrame {
    Accepted,
    Rejected {
        reason: String,
        code: String,
        errors: Vec<String>,
    },
}

impl From<&MessageOutcome> for AckFrame {
    fn from(outcome: &MessageOutcome) -> Self {
        match outcome {
            MessageOutcome::Accepted => Self::Accepted,
            MessageOutcome::Rejected { code, errors } => Self::Rejected {
                reason: code.reason().to_string(),
                code: code.code().to_string(),
                errors: errors.clone(),
            },
        }
    }
}

/// Health check response.
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    #[serde(flatten)]
    pub report: HealthReport,
    pub connections: usize,
    pub queue_depth: usize,
    pub aggregator_running: bool,
}

/// Structured metrics dump.
#[derive(Debug, Serialize, Deserialize)]
pub struct MetricsResponse {
    pub metrics: MetricsSnapshot,
    pub aggregator: AggregatorStats,
    /// Retained per-batch stats, oldest first
    pub batches: Vec<BatchStats>,
    pub rate_limiter_clients: usize,
    /// Busiest clients by sustained-window usage
    pub top_clients: Vec<ClientReport>,
    pub connections: usize,
    pub open_connections: Vec<ConnectionInfo>,
}
