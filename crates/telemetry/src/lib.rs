//! Internal telemetry for the game event gateway.
//!
//! Metrics live in an explicitly constructed [`MetricsCollector`] that is
//! shared by handle with every component that records into it.

pub mod health;
pub mod metrics;
pub mod names;
pub mod tracing_setup;
pub mod window;

pub use health::*;
pub use metrics::*;
pub use tracing_setup::*;
