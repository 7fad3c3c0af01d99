//! Downstream batch consumers.

use async_trait::async_trait;
use gateway_core::Event;
use std::sync::Arc;
use thiserror::Error;

/// Error returned by a delivery handler.
#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("delivery failed: {0}")]
    Failed(String),
}

impl DeliveryError {
    pub fn failed(msg: impl Into<String>) -> Self {
        Self::Failed(msg.into())
    }
}

/// A consumer of completed batches.
///
/// Used both for the single batch handler and for fan-out delivery
/// handlers. Each invocation receives the whole batch in arrival order and
/// runs in its own task, so an error or panic stays local to the handler.
#[async_trait]
pub trait DeliveryHandler: Send + Sync + 'static {
    /// Name used in logs and the `handler` metric label.
    fn name(&self) -> &str;

    async fn deliver(&self, batch: Arc<[Event]>) -> Result<(), DeliveryError>;
}
