// Stream entities
// Framed wire events and the stream client's observable state

use serde::{Deserialize, Serialize};

use crate::value_objects::{ConnectionStatus, EventKind};

/// One complete block from the event-stream wire format.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StreamEvent {
    pub event_type: Option<String>,
    pub payload: String,
    pub id: Option<String>,
    /// Informational only.
    pub retry_hint: Option<u64>,
}

impl StreamEvent {
    pub fn kind(&self) -> EventKind {
        EventKind::from(self.event_type.as_deref())
    }
}

/// Snapshot of the stream client's process-local state.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StreamState {
    pub status: ConnectionStatus,
    /// Bytes held by the framer waiting for a block boundary.
    pub partial_frame_bytes: usize,
    /// Decoded items waiting for downstream credit.
    pub buffered_items: usize,
    pub retry_delay_ms: u64,
    pub consecutive_failures: u32,
    pub events_this_period: u64,
    pub connected_since: Option<i64>,
    pub last_error: Option<String>,
}

/// Per-subject historical preload request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackfillRequest {
    pub subject_id: i64,
    pub days: u32,
}
