use std::sync::Arc;

use backend_domain::ports::{KillmailBroadcaster, WatchEvaluator};
use serde_json::Value;
use tracing::{debug, warn};

use crate::Metrics;

/// Best-effort fan-out after a batch is durable. Broadcast and watch
/// evaluation run on their own tasks; neither can fail or stall the batch.
#[derive(Clone)]
pub struct FanoutNotifier {
    broadcaster: Arc<dyn KillmailBroadcaster>,
    watch_evaluator: Arc<dyn WatchEvaluator>,
    metrics: Arc<Metrics>,
}

/// Location plus original payload of one newly persisted killmail.
#[derive(Debug, Clone)]
pub struct Notification {
    pub location_id: i64,
    pub payload: Value,
}

impl FanoutNotifier {
    pub fn new(
        broadcaster: Arc<dyn KillmailBroadcaster>,
        watch_evaluator: Arc<dyn WatchEvaluator>,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            broadcaster,
            watch_evaluator,
            metrics,
        }
    }

    pub fn notify(&self, notifications: Vec<Notification>) {
        if notifications.is_empty() {
            return;
        }
        let notifications = Arc::new(notifications);

        let broadcaster = self.broadcaster.clone();
        let metrics = self.metrics.clone();
        let items = notifications.clone();
        tokio::spawn(async move {
            let mut delivered = 0;
            for item in items.iter() {
                delivered += broadcaster.publish(item.location_id, &item.payload).await;
            }
            metrics.record_broadcast(delivered);
            debug!(items = items.len(), delivered, "broadcast persisted killmails");
        });

        let watch_evaluator = self.watch_evaluator.clone();
        let metrics = self.metrics.clone();
        tokio::spawn(async move {
            for item in notifications.iter() {
                if let Err(err) = watch_evaluator.evaluate(&item.payload).await {
                    metrics.record_watch_failure();
                    warn!(
                        location_id = item.location_id,
                        error = %err,
                        "watch evaluation failed"
                    );
                }
            }
        });
    }
}
