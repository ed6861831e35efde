// Persistence outcome entities

use serde::Serialize;

use crate::value_objects::{EventKey, ParticipantKey};

/// A row the storage layer refused, with enough detail to investigate later.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RejectedRow {
    pub key: String,
    pub reason: String,
}

/// Result of one bulk upsert call. Rejected rows are reported, not raised.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpsertOutcome<K> {
    /// Keys written by this call.
    pub inserted: Vec<K>,
    /// Rows whose natural key was already stored (first write wins).
    pub skipped: usize,
    pub failed: Vec<RejectedRow>,
}

impl<K> Default for UpsertOutcome<K> {
    fn default() -> Self {
        Self {
            inserted: Vec::new(),
            skipped: 0,
            failed: Vec::new(),
        }
    }
}

impl<K> UpsertOutcome<K> {
    pub fn succeeded(&self) -> usize {
        self.inserted.len() + self.skipped
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchUpsertReport {
    pub events: UpsertOutcome<EventKey>,
    pub participants: UpsertOutcome<ParticipantKey>,
    /// Participants not sent to storage because their killmail row was rejected.
    pub orphaned_participants: usize,
}

impl BatchUpsertReport {
    pub fn succeeded(&self) -> usize {
        self.events.succeeded() + self.participants.succeeded()
    }

    pub fn failed(&self) -> impl Iterator<Item = &RejectedRow> {
        self.events.failed.iter().chain(self.participants.failed.iter())
    }

    pub fn failed_count(&self) -> usize {
        self.events.failed.len() + self.participants.failed.len()
    }
}
