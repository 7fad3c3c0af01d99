//! Live connection set.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use telemetry::{names, MetricsCollector};
use tokio::sync::watch;
use uuid::Uuid;

/// One open WebSocket session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionInfo {
    pub id: Uuid,
    pub client_id: String,
    pub connected_at: DateTime<Utc>,
}

/// Tracks open sessions for the connection gauge and for shutdown.
pub struct ConnectionRegistry {
    live: Mutex<HashMap<Uuid, ConnectionInfo>>,
    count: watch::Sender<usize>,
    metrics: Arc<MetricsCollector>,
}

impl ConnectionRegistry {
    pub fn new(metrics: Arc<MetricsCollector>) -> Self {
        let (count, _) = watch::channel(0);
        Self {
            live: Mutex::new(HashMap::new()),
            count,
            metrics,
        }
    }

    /// Registers a session; it is removed when the guard drops.
    pub fn register(self: &Arc<Self>, client_id: &str) -> ConnectionGuard {
        let info = ConnectionInfo {
            id: Uuid::new_v4(),
            client_id: client_id.to_string(),
            connected_at: Utc::now(),
        };
        let id = info.id;

        let len = {
            let mut live = self.live.lock();
            live.insert(id, info);
            live.len()
        };
        self.publish(len);
        self.metrics.increment(names::CONNECTIONS_OPENED);

        ConnectionGuard {
            registry: self.clone(),
            id,
        }
    }

    fn unregister(&self, id: Uuid) {
        let len = {
            let mut live = self.live.lock();
            live.remove(&id);
            live.len()
        };
        self.publish(len);
    }

    fn publish(&self, len: usize) {
        self.metrics
            .set_gauge(names::WEBSOCKET_CONNECTIONS, len as f64);
        self.count.send_replace(len);
    }

    pub fn len(&self) -> usize {
        self.live.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Open sessions, oldest first.
    pub fn snapshot(&self) -> Vec<ConnectionInfo> {
        let mut sessions: Vec<ConnectionInfo> = self.live.lock().values().cloned().collect();
        sessions.sort_by_key(|info| info.connected_at);
        sessions
    }

    /// Waits until every session has closed. Returns false on timeout.
    pub async fn wait_idle(&self, timeout: Duration) -> bool {
        let mut count = self.count.subscribe();
        tokio::time::timeout(timeout, count.wait_for(|n| *n == 0))
            .await
            .map(|result| result.is_ok())
            .unwrap_or(false)
    }
}

/// Removes its session from the registry on drop.
pub struct ConnectionGuard {
    registry: Arc<ConnectionRegistry>,
    id: Uuid,
}

impl ConnectionGuard {
    pub fn id(&self) -> Uuid {
        self.id
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.registry.unregister(self.id);
    }
}
