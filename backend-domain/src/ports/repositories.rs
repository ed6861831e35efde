use std::collections::HashSet;

use async_trait::async_trait;

use crate::entities::{
    BatchUpsertReport, KillmailBatch, ParticipantRecord, RawEventRecord, UpsertOutcome,
};
use crate::services::validate_event_row;
use crate::value_objects::{EventKey, ParticipantKey};

/// Durable killmail storage. Upserts are first-write-wins: a row whose
/// natural key already exists is left untouched. Individual rejected rows
/// are reported in the outcome; `Err` means the store itself failed.
#[async_trait]
pub trait KillmailRepository: Send + Sync {
    async fn ensure_schema(&self) -> anyhow::Result<()>;
    async fn upsert_events(
        &self,
        events: &[RawEventRecord],
    ) -> anyhow::Result<UpsertOutcome<EventKey>>;
    async fn upsert_participants(
        &self,
        participants: &[ParticipantRecord],
    ) -> anyhow::Result<UpsertOutcome<ParticipantKey>>;
    async fn ping(&self) -> anyhow::Result<()>;

    /// Writes a whole batch. Participants go first so a stored killmail row
    /// always has its participants; a killmail whose row was not written is
    /// inserted, and therefore notified, when it is delivered again.
    /// Participants of killmail rows that fail row validation are not written.
    async fn bulk_upsert(&self, batch: &KillmailBatch) -> anyhow::Result<BatchUpsertReport> {
        let rejected_events = batch
            .events
            .iter()
            .filter(|event| validate_event_row(event).is_err())
            .map(RawEventRecord::key)
            .collect::<HashSet<_>>();
        let participants = batch
            .participants
            .iter()
            .filter(|participant| !rejected_events.contains(&participant.event_key()))
            .cloned()
            .collect::<Vec<_>>();
        let orphaned_participants = batch.participants.len() - participants.len();

        let participants = self.upsert_participants(&participants).await?;
        let events = self.upsert_events(&batch.events).await?;
        Ok(BatchUpsertReport {
            events,
            participants,
            orphaned_participants,
        })
    }
}
