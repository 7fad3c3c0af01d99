//! Aggregator configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use validator::Validate;

/// Batching and intake configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct AggregatorConfig {
    /// Batch window in milliseconds
    #[serde(default = "default_batch_window_ms")]
    #[validate(range(min = 1, max = 60000))]
    pub batch_window_ms: u64,
    /// Maximum events per batch before the window closes early
    #[serde(default = "default_max_batch_size")]
    #[validate(range(min = 1, max = 100000))]
    pub max_batch_size: usize,
    /// Capacity of the intake queue
    #[serde(default = "default_max_queue_size")]
    #[validate(range(min = 1, max = 1000000))]
    pub max_queue_size: usize,
    /// Completed batches retained for stats
    #[serde(default = "default_stats_history")]
    #[validate(range(min = 1, max = 10000))]
    pub stats_history: usize,
    /// Cycle time, as a multiple of the window, that logs a slow-batch warning
    #[serde(default = "default_slow_batch_factor")]
    #[validate(range(min = 1.0, max = 100.0))]
    pub slow_batch_factor: f64,
    /// How long `stop` waits for in-flight deliveries
    #[serde(default = "default_drain_timeout_ms")]
    #[validate(range(min = 1, max = 600000))]
    pub drain_timeout_ms: u64,
}

fn default_batch_window_ms() -> u64 {
    100
}

fn default_max_batch_size() -> usize {
    1000
}

fn default_max_queue_size() -> usize {
    10000
}

fn default_stats_history() -> usize {
    100
}

fn default_slow_batch_factor() -> f64 {
    1.5
}

fn default_drain_timeout_ms() -> u64 {
    10000
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            batch_window_ms: default_batch_window_ms(),
            max_batch_size: default_max_batch_size(),
            max_queue_size: default_max_queue_size(),
            stats_history: default_stats_history(),
            slow_batch_factor: default_slow_batch_factor(),
            drain_timeout_ms: default_drain_timeout_ms(),
        }
    }
}

impl AggregatorConfig {
    pub fn batch_window(&self) -> Duration {
        Duration::from_millis(self.batch_window_ms)
    }

    pub fn drain_timeout(&self) -> Duration {
        Duration::from_millis(self.drain_timeout_ms)
    }

    /// Cycle time above which a batch is reported as slow.
    pub fn slow_batch_threshold_ms(&self) -> f64 {
        self.batch_window_ms as f64 * self.slow_batch_factor
    }
}
