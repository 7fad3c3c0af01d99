//! Per-batch statistics.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Statistics for one completed aggregation cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchStats {
    pub batch_id: String,
    pub event_count: usize,
    /// Window open to dispatch scheduled
    pub processing_time_ms: f64,
    pub queue_size_at_start: usize,
    pub timestamp: DateTime<Utc>,
}

/// Summary over the retained batch stats.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AggregatorStats {
    pub running: bool,
    pub batch_count: u64,
    pub avg_batch_size: f64,
    pub avg_processing_time_ms: f64,
    pub max_processing_time_ms: f64,
    pub current_queue_size: usize,
    pub recent_batches: usize,
}

/// Bounded ring of the most recent batch stats.
#[derive(Debug)]
pub struct StatsRing {
    capacity: usize,
    batches: VecDeque<BatchStats>,
    batch_count: u64,
}

impl StatsRing {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            batches: VecDeque::new(),
            batch_count: 0,
        }
    }

    /// Allocates the next batch id.
    pub fn next_batch_id(&mut self) -> String {
        self.batch_count += 1;
        format!("batch_{}", self.batch_count)
    }

    pub fn record(&mut self, stats: BatchStats) {
        if self.batches.len() == self.capacity {
            self.batches.pop_front();
        }
        self.batches.push_back(stats);
    }

    pub fn recent(&self) -> Vec<BatchStats> {
        self.batches.iter().cloned().collect()
    }

    pub fn summary(&self, current_queue_size: usize, running: bool) -> AggregatorStats {
        let recent = self.batches.len();
        if recent == 0 {
            return AggregatorStats {
                running,
                current_queue_size,
                ..Default::default()
            };
        }

        let total_events: usize = self.batches.iter().map(|s| s.event_count).sum();
        let total_time: f64 = self.batches.iter().map(|s| s.processing_time_ms).sum();
        let max_time = self
            .batches
            .iter()
            .map(|s| s.processing_time_ms)
            .fold(0.0, f64::max);

        AggregatorStats {
            running,
            batch_count: self.batch_count,
            avg_batch_size: total_events as f64 / recent as f64,
            avg_processing_time_ms: total_time / recent as f64,
            max_processing_time_ms: max_time,
            current_queue_size,
            recent_batches: recent,
        }
    }
}
