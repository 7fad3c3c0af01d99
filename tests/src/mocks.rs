//! Mock delivery handlers.

use aggregator::{DeliveryError, DeliveryHandler};
use async_trait::async_trait;
use gateway_core::Event;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;

/// Delivery handler that captures every event in memory.
pub struct CapturingHandler {
    name: String,
    batches: Mutex<Vec<Vec<Event>>>,
    notify: Notify,
}

impl CapturingHandler {
    pub fn new(name: &str) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            batches: Mutex::new(Vec::new()),
            notify: Notify::new(),
        })
    }

    /// All captured events, in delivery order.
    pub fn events(&self) -> Vec<Event> {
        self.batches.lock().iter().flatten().cloned().collect()
    }

    /// Captured batches.
    pub fn batches(&self) -> Vec<Vec<Event>> {
        self.batches.lock().clone()
    }

    pub fn event_count(&self) -> usize {
        self.batches.lock().iter().map(Vec::len).sum()
    }

    /// Waits until at least `n` events were delivered.
    ///
    /// Returns false on timeout.
    pub async fn wait_for(&self, n: usize, timeout: Duration) -> bool {
        tokio::time::timeout(timeout, async {
            loop {
                let notified = self.notify.notified();
                if self.event_count() >= n {
                    return;
                }
                notified.await;
            }
        })
        .await
        .is_ok()
    }
}

#[async_trait]
impl DeliveryHandler for CapturingHandler {
    fn name(&self) -> &str {
        &self.name
    }

    async fn deliver(&self, batch: Arc<[Event]>) -> Result<(), DeliveryError> {
        self.batches.lock().push(batch.to_vec());
        self.notify.notify_waiters();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gateway_core::EventKind;
    use serde_json::Map;

    #[tokio::test]
    async fn test_wait_for_sees_delivery() {
        let handler = CapturingHandler::new("capture");
        let batch: Arc<[Event]> = vec![Event::new(EventKind::Heartbeat, "g1", Map::new())].into();

        let waiter = {
            let handler = handler.clone();
            tokio::spawn(async move { handler.wait_for(1, Duration::from_secs(1)).await })
        };
        tokio::task::yield_now().await;
        handler.deliver(batch).await.unwrap();

        assert!(waiter.await.unwrap());
        assert!(!handler.wait_for(2, Duration::from_millis(20)).await);
    }
}
