//! Built-in delivery handlers.

use async_trait::async_trait;
use gateway_core::{Event, EventKind};
use std::collections::BTreeMap;
use std::sync::Arc;
use telemetry::{names, MetricsCollector};
use tracing::info;

use crate::handler::{DeliveryError, DeliveryHandler};

fn count_by_kind(batch: &[Event]) -> BTreeMap<EventKind, usize> {
    let mut counts = BTreeMap::new();
    for event in batch {
        *counts.entry(event.kind).or_insert(0) += 1;
    }
    counts
}

/// Logs one summary line per batch.
#[derive(Debug, Default)]
pub struct LogSink;

#[async_trait]
impl DeliveryHandler for LogSink {
    fn name(&self) -> &str {
        "log"
    }

    async fn deliver(&self, batch: Arc<[Event]>) -> Result<(), DeliveryError> {
        let kinds: Vec<String> = count_by_kind(&batch)
            .into_iter()
            .map(|(kind, n)| format!("{}={}", kind, n))
            .collect();

        let games = batch
            .iter()
            .map(|e| e.game_id.as_str())
            .collect::<std::collections::BTreeSet<_>>()
            .len();

        info!(
            events = batch.len(),
            games,
            kinds = %kinds.join(","),
            "Batch received"
        );
        Ok(())
    }
}

/// Counts batched events per kind as `batched_events_total{type}`.
#[derive(Debug)]
pub struct MetricsSink {
    metrics: Arc<MetricsCollector>,
}

impl MetricsSink {
    pub fn new(metrics: Arc<MetricsCollector>) -> Self {
        Self { metrics }
    }
}

#[async_trait]
impl DeliveryHandler for MetricsSink {
    fn name(&self) -> &str {
        "metrics"
    }

    async fn deliver(&self, batch: Arc<[Event]>) -> Result<(), DeliveryError> {
        for (kind, n) in count_by_kind(&batch) {
            self.metrics
                .increment_with(names::BATCHED_EVENTS, &[("type", kind.as_str())], n as u64);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Map;

    fn batch(kinds: &[EventKind]) -> Arc<[Event]> {
        kinds
            .iter()
            .map(|kind| Event::new(*kind, "g1", Map::new()))
            .collect::<Vec<_>>()
            .into()
    }

    #[tokio::test]
    async fn test_metrics_sink_counts_per_kind() {
        let metrics = Arc::new(MetricsCollector::default());
        let sink = MetricsSink::new(metrics.clone());

        sink.deliver(batch(&[
            EventKind::HandPlayed,
            EventKind::HandPlayed,
            EventKind::Heartbeat,
        ]))
        .await
        .unwrap();

        assert_eq!(
            metrics.counter_with(names::BATCHED_EVENTS, &[("type", "hand_played")]),
            2
        );
        assert_eq!(
            metrics.counter_with(names::BATCHED_EVENTS, &[("type", "heartbeat")]),
            1
        );
        assert_eq!(metrics.counter_total(names::BATCHED_EVENTS), 3);
    }

    #[tokio::test]
    async fn test_log_sink_accepts_any_batch() {
        assert!(LogSink.deliver(batch(&[])).await.is_ok());
        assert!(LogSink.deliver(batch(&[EventKind::GameOver])).await.is_ok());
    }
}
