// Killmail entities
// Storage-ready records derived from one decoded stream payload

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::value_objects::{EventKey, ParticipantKey};

/// One combat event as received. Immutable once built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawEventRecord {
    pub event_id: i64,
    /// Unix milliseconds.
    pub event_time: i64,
    pub content_hash: String,
    pub location_id: i64,
    pub primary_subject_id: Option<i64>,
    pub primary_corp_id: Option<i64>,
    pub primary_alliance_id: Option<i64>,
    pub primary_object_type_id: Option<i64>,
    pub participant_count: u32,
    /// The decoded payload, preserved verbatim.
    pub raw_payload: Value,
    pub source_tag: String,
}

impl RawEventRecord {
    pub fn key(&self) -> EventKey {
        EventKey {
            event_id: self.event_id,
            event_time: self.event_time,
        }
    }
}

/// One actor in a killmail: an attacker or the primary subject.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParticipantRecord {
    pub event_id: i64,
    pub event_time: i64,
    /// Absent for non-player actors.
    pub actor_id: Option<i64>,
    pub corp_id: Option<i64>,
    pub alliance_id: Option<i64>,
    pub object_type_id: i64,
    pub damage_value: i64,
    pub is_primary_subject: bool,
    pub is_decisive_actor: bool,
    pub location_id: i64,
}

impl ParticipantRecord {
    pub fn key(&self) -> ParticipantKey {
        ParticipantKey {
            event_id: self.event_id,
            event_time: self.event_time,
            actor_id: self.actor_id,
            object_type_id: self.object_type_id,
        }
    }

    pub fn event_key(&self) -> EventKey {
        EventKey {
            event_id: self.event_id,
            event_time: self.event_time,
        }
    }
}

/// Output of the record transformer for a single payload.
#[derive(Debug, Clone, PartialEq)]
pub struct TransformedKillmail {
    pub event: RawEventRecord,
    pub participants: Vec<ParticipantRecord>,
    /// Actors excluded for lacking a usable `object_type_id`.
    pub dropped_participants: usize,
}

/// A deduplicated batch handed to the persistence port.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct KillmailBatch {
    pub events: Vec<RawEventRecord>,
    pub participants: Vec<ParticipantRecord>,
    /// Records collapsed into an earlier copy with the same natural key.
    pub duplicates_collapsed: usize,
}

impl KillmailBatch {
    pub fn is_empty(&self) -> bool {
        self.events.is_empty() && self.participants.is_empty()
    }

    pub fn len(&self) -> usize {
        self.events.len() + self.participants.len()
    }
}
