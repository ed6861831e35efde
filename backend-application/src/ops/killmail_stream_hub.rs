use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use backend_domain::ports::KillmailBroadcaster;
use serde_json::Value;
use tokio::sync::{broadcast, RwLock};

pub const DEFAULT_CHANNEL_BUFFER: usize = 64;
pub const ALL_TOPIC: &str = "all";

pub fn location_topic(location_id: i64) -> String {
    format!("location:{}", location_id)
}

/// Fan-out of persisted killmail payloads to live subscribers, one
/// broadcast channel per topic.
pub struct KillmailStreamHub {
    buffer: usize,
    channels: RwLock<HashMap<String, broadcast::Sender<Arc<Value>>>>,
}

impl Default for KillmailStreamHub {
    fn default() -> Self {
        Self::new(DEFAULT_CHANNEL_BUFFER)
    }
}

impl KillmailStreamHub {
    pub fn new(buffer: usize) -> Self {
        Self {
            buffer: buffer.max(1),
            channels: RwLock::new(HashMap::new()),
        }
    }

    pub async fn subscribe(&self, topic: &str) -> broadcast::Receiver<Arc<Value>> {
        let mut channels = self.channels.write().await;
        channels.retain(|_, tx| tx.receiver_count() > 0);
        channels
            .entry(topic.trim().to_lowercase())
            .or_insert_with(|| {
                let (tx, _rx) = broadcast::channel(self.buffer);
                tx
            })
            .subscribe()
    }

    /// Drops topics whose last subscriber has gone away.
    pub async fn prune(&self) {
        self.channels
            .write()
            .await
            .retain(|_, tx| tx.receiver_count() > 0);
    }

    /// Topics with at least one live subscriber.
    pub async fn topic_count(&self) -> usize {
        self.channels
            .read()
            .await
            .values()
            .filter(|tx| tx.receiver_count() > 0)
            .count()
    }
}

#[async_trait]
impl KillmailBroadcaster for KillmailStreamHub {
    async fn publish(&self, location_id: i64, payload: &Value) -> usize {
        let channels = self.channels.read().await;
        let payload = Arc::new(payload.clone());
        [ALL_TOPIC.to_string(), location_topic(location_id)]
            .iter()
            .filter_map(|topic| channels.get(topic))
            .map(|tx| tx.send(payload.clone()).unwrap_or(0))
            .sum()
    }
}
