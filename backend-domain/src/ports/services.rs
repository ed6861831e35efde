use async_trait::async_trait;
use serde_json::Value;

use crate::entities::BackfillRequest;

/// Live publish/subscribe channel for persisted killmails.
#[async_trait]
pub trait KillmailBroadcaster: Send + Sync {
    /// Returns how many subscribers received the payload.
    async fn publish(&self, location_id: i64, payload: &Value) -> usize;
}

/// Evaluates a persisted killmail against user-defined watch criteria.
#[async_trait]
pub trait WatchEvaluator: Send + Sync {
    async fn evaluate(&self, payload: &Value) -> anyhow::Result<()>;
}

/// Starts a bounded historical preload for one subject.
#[async_trait]
pub trait BackfillService: Send + Sync {
    async fn start_backfill(&self, request: BackfillRequest) -> anyhow::Result<()>;
}
