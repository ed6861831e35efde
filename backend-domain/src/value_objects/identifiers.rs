// Natural keys used for dedup and upsert

use std::fmt;

use serde::{Deserialize, Serialize};

/// Identity of one killmail: unique by (`event_id`, `event_time`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EventKey {
    pub event_id: i64,
    /// Unix milliseconds.
    pub event_time: i64,
}

/// Identity of one participant row within a killmail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ParticipantKey {
    pub event_id: i64,
    pub event_time: i64,
    pub actor_id: Option<i64>,
    pub object_type_id: i64,
}

impl ParticipantKey {
    pub fn event_key(&self) -> EventKey {
        EventKey {
            event_id: self.event_id,
            event_time: self.event_time,
        }
    }
}

impl fmt::Display for EventKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "event_id={} event_time={}", self.event_id, self.event_time)
    }
}

impl fmt::Display for ParticipantKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.actor_id {
            Some(actor_id) => write!(
                f,
                "event_id={} event_time={} actor_id={} object_type_id={}",
                self.event_id, self.event_time, actor_id, self.object_type_id
            ),
            None => write!(
                f,
                "event_id={} event_time={} actor_id=none object_type_id={}",
                self.event_id, self.event_time, self.object_type_id
            ),
        }
    }
}
