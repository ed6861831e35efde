use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{bail, Result};
use async_trait::async_trait;
use tokio::sync::RwLock;

use backend_domain::{
    EventKey, KillmailRepository, ParticipantKey, ParticipantRecord, RawEventRecord, UpsertOutcome,
};

use super::write_plan::{plan_events, plan_participants};

/// Process-local killmail store for development and tests. Same
/// first-write-wins and row validation rules as the ClickHouse adapter.
#[derive(Default)]
pub struct InMemoryKillmailRepo {
    events: RwLock<HashMap<EventKey, RawEventRecord>>,
    participants: RwLock<HashMap<ParticipantKey, ParticipantRecord>>,
    unavailable: AtomicBool,
}

impl InMemoryKillmailRepo {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every call fail as if the store were unreachable.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::Relaxed);
    }

    pub async fn event(&self, key: &EventKey) -> Option<RawEventRecord> {
        self.events.read().await.get(key).cloned()
    }

    pub async fn event_count(&self) -> usize {
        self.events.read().await.len()
    }

    pub async fn participant_count(&self) -> usize {
        self.participants.read().await.len()
    }

    fn check_available(&self) -> Result<()> {
        if self.unavailable.load(Ordering::Relaxed) {
            bail!("in-memory store marked unavailable");
        }
        Ok(())
    }
}

#[async_trait]
impl KillmailRepository for InMemoryKillmailRepo {
    async fn ensure_schema(&self) -> Result<()> {
        self.check_available()
    }

    async fn upsert_events(&self, events: &[RawEventRecord]) -> Result<UpsertOutcome<EventKey>> {
        self.check_available()?;
        let mut stored = self.events.write().await;
        let existing = events
            .iter()
            .map(RawEventRecord::key)
            .filter(|key| stored.contains_key(key))
            .collect::<HashSet<_>>();
        let (rows, outcome) = plan_events(events, &existing);
        for event in rows {
            stored.insert(event.key(), event.clone());
        }
        Ok(outcome)
    }

    async fn upsert_participants(
        &self,
        participants: &[ParticipantRecord],
    ) -> Result<UpsertOutcome<ParticipantKey>> {
        self.check_available()?;
        let mut stored = self.participants.write().await;
        let existing = participants
            .iter()
            .map(ParticipantRecord::key)
            .filter(|key| stored.contains_key(key))
            .collect::<HashSet<_>>();
        let (rows, outcome) = plan_participants(participants, &existing);
        for participant in rows {
            stored.insert(participant.key(), participant.clone());
        }
        Ok(outcome)
    }

    async fn ping(&self) -> Result<()> {
        self.check_available()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use super::*;
    use backend_application::commands::ingest_commands::{persist_batch, BatchContext};
    use backend_application::ops::KillmailStreamHub;
    use backend_application::pipeline::{spawn_pipeline, FanoutNotifier, PipelineContext};
    use backend_application::{AppError, Metrics};
    use backend_domain::{dedup_batch, transform_killmail, PipelineConfig, TransformedKillmail};
    use serde_json::{json, Value};

    use crate::services::NoopWatchEvaluator;

    fn payload(event_id: i64) -> Value {
        json!({
            "killmail_id": event_id,
            "killmail_time": "2024-03-01T12:00:00Z",
            "solar_system_id": 30000142,
            "victim": {"character_id": 100 + event_id, "ship_type_id": 587, "damage_taken": 900},
            "attackers": [
                {"character_id": 200 + event_id, "ship_type_id": 621, "damage_done": 900, "final_blow": true}
            ]
        })
    }

    fn killmail(event_id: i64) -> TransformedKillmail {
        transform_killmail(&payload(event_id), "stream").expect("transform")
    }

    fn batch_context(repo: Arc<InMemoryKillmailRepo>) -> BatchContext {
        let metrics = Arc::new(Metrics::default());
        BatchContext {
            killmail_repo: repo,
            notifier: FanoutNotifier::new(
                Arc::new(KillmailStreamHub::default()),
                Arc::new(NoopWatchEvaluator),
                metrics.clone(),
            ),
            metrics,
        }
    }

    #[tokio::test]
    async fn second_write_of_same_key_is_skipped() {
        let repo = InMemoryKillmailRepo::new();
        let batch = dedup_batch(vec![killmail(1), killmail(2)]);

        let first = repo.bulk_upsert(&batch).await.expect("first write");
        assert_eq!(first.events.inserted.len(), 2);
        assert_eq!(first.participants.inserted.len(), 4);

        let mut changed = killmail(1);
        changed.event.content_hash = "replaced".to_string();
        let second = repo
            .bulk_upsert(&dedup_batch(vec![changed.clone(), killmail(2)]))
            .await
            .expect("second write");
        assert!(second.events.inserted.is_empty());
        assert_eq!(second.events.skipped, 2);
        assert_eq!(second.participants.skipped, 4);

        let stored = repo.event(&changed.event.key()).await.expect("stored");
        assert_ne!(stored.content_hash, "replaced");
        assert_eq!(repo.event_count().await, 2);
        assert_eq!(repo.participant_count().await, 4);
    }

    #[tokio::test]
    async fn invalid_rows_are_reported_and_their_participants_orphaned() {
        let repo = Arc::new(InMemoryKillmailRepo::new());
        let context = batch_context(repo.clone());
        let mut items = (1..=10).map(killmail).collect::<Vec<_>>();
        items[3].event.content_hash.clear();
        items[7].event.location_id = -1;

        let report = persist_batch(&context, items)
            .await
            .expect("batch processed");
        assert_eq!(report.events.inserted.len(), 8);
        assert_eq!(report.events.failed.len(), 2);
        assert_eq!(report.orphaned_participants, 4);
        assert_eq!(
            report.events.failed[0].key,
            killmail(4).event.key().to_string()
        );
        assert_eq!(repo.event_count().await, 8);
        assert_eq!(repo.participant_count().await, 16);
        assert_eq!(context.metrics.batches_persisted(), 1);
        assert_eq!(context.metrics.batches_failed(), 0);
    }

    #[tokio::test]
    async fn unavailable_store_fails_the_whole_batch() {
        let repo = Arc::new(InMemoryKillmailRepo::new());
        repo.set_unavailable(true);
        let context = batch_context(repo.clone());

        let err = persist_batch(&context, vec![killmail(1)])
            .await
            .expect_err("store down");
        assert!(matches!(err, AppError::StorageUnavailable(_)));
        assert_eq!(context.metrics.batches_failed(), 1);
        assert!(repo.ping().await.is_err());

        repo.set_unavailable(false);
        assert!(repo.ping().await.is_ok());
        assert_eq!(repo.event_count().await, 0);
    }

    #[tokio::test]
    async fn pipeline_persists_and_broadcasts_new_killmails() {
        let repo = Arc::new(InMemoryKillmailRepo::new());
        let hub = Arc::new(KillmailStreamHub::new(16));
        let mut all = hub.subscribe("all").await;
        let metrics = Arc::new(Metrics::default());

        let (input, handle) = spawn_pipeline(PipelineContext {
            config: PipelineConfig {
                batch_size: 3,
                batch_timeout_ms: 50,
                ..PipelineConfig::default()
            },
            source_tag: "stream".to_string(),
            killmail_repo: repo.clone(),
            notifier: FanoutNotifier::new(
                hub.clone(),
                Arc::new(NoopWatchEvaluator),
                metrics.clone(),
            ),
            metrics: metrics.clone(),
        });

        for event_id in [1, 2, 2, 3, 4] {
            input.send(payload(event_id)).await.expect("pipeline open");
        }
        input
            .send(json!({"no_id": true}))
            .await
            .expect("pipeline open");
        drop(input);

        let summary = tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("pipeline drains")
            .expect("pipeline task");
        assert_eq!(summary.transformed, 5);
        assert_eq!(summary.rejected, 1);
        assert_eq!(summary.batches_failed, 0);
        assert_eq!(repo.event_count().await, 4);

        let first = tokio::time::timeout(Duration::from_secs(1), all.recv())
            .await
            .expect("broadcast arrives")
            .expect("open channel");
        assert!(first.get("killmail_id").is_some());
    }
}
