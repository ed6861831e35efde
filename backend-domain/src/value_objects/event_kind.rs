// Event kind value object

use serde::{Deserialize, Serialize};

/// Closed set of `event-type` discriminators the stream is known to send.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventKind {
    DataItem,
    DataBatch,
    Connected,
    Heartbeat,
    Error,
    /// A block without an `event-type` field.
    Message,
    Unknown(String),
}

impl EventKind {
    pub fn as_str(&self) -> &str {
        match self {
            EventKind::DataItem => "data-item",
            EventKind::DataBatch => "data-batch",
            EventKind::Connected => "connected",
            EventKind::Heartbeat => "heartbeat",
            EventKind::Error => "error",
            EventKind::Message => "message",
            EventKind::Unknown(raw) => raw.as_str(),
        }
    }
}

impl From<Option<&str>> for EventKind {
    fn from(value: Option<&str>) -> Self {
        match value {
            Some(raw) => EventKind::from(raw),
            None => EventKind::Message,
        }
    }
}

impl From<&str> for EventKind {
    fn from(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "data-item" => EventKind::DataItem,
            "data-batch" => EventKind::DataBatch,
            "connected" => EventKind::Connected,
            "heartbeat" => EventKind::Heartbeat,
            "error" => EventKind::Error,
            "" | "message" => EventKind::Message,
            other => EventKind::Unknown(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_kinds_are_case_insensitive() {
        assert_eq!(EventKind::from("Data-Item"), EventKind::DataItem);
        assert_eq!(EventKind::from(" heartbeat "), EventKind::Heartbeat);
    }

    #[test]
    fn absent_type_defaults_to_message() {
        assert_eq!(EventKind::from(None), EventKind::Message);
        assert_eq!(EventKind::from(Some("")), EventKind::Message);
    }

    #[test]
    fn unknown_kind_keeps_raw_name() {
        let kind = EventKind::from("killmail-v3");
        assert_eq!(kind, EventKind::Unknown("killmail-v3".to_string()));
        assert_eq!(kind.as_str(), "killmail-v3");
    }
}
