//! Windowed batching and fan-out delivery of accepted events.

pub mod aggregator;
pub mod batch;
pub mod config;
pub mod handler;
pub mod sinks;

pub use aggregator::EventAggregator;
pub use batch::{AggregatorStats, BatchStats};
pub use config::AggregatorConfig;
pub use handler::{DeliveryError, DeliveryHandler};
pub use sinks::{LogSink, MetricsSink};
