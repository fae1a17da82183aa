//! WebSocket broadcaster
//!
//! Updates are serialized once and fanned out over a broadcast channel; each
//! subscriber drains its own receiver, so a slow subscriber lags (and is
//! eventually dropped) without touching anyone else.

use tokio::sync::broadcast;

use super::types::UpdateMessage;

#[derive(Debug, Clone)]
pub struct Broadcaster {
    tx: broadcast::Sender<String>,
}

impl Broadcaster {
    /// Create a new broadcaster with the given channel capacity
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Subscribe to receive broadcast messages
    pub fn subscribe(&self) -> broadcast::Receiver<String> {
        self.tx.subscribe()
    }

    /// Broadcast one incremental update to all connected subscribers
    pub fn broadcast_update(&self, update: &UpdateMessage) {
        if let Ok(json) = serde_json::to_string(update) {
            // Ignore send errors (no receivers is fine)
            let _ = self.tx.send(json);
        }
    }

    /// Number of live subscribers
    pub fn receiver_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for Broadcaster {
    fn default() -> Self {
        Self::new(256)
    }
}
