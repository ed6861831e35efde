// Event-type dispatch: decides what a framed event yields downstream

use serde_json::Value;

use crate::entities::StreamEvent;
use crate::error::DecodeError;
use crate::value_objects::EventKind;

#[derive(Debug)]
pub enum Dispatch {
    /// Decoded payloads ready for the transformer. `rejected` counts
    /// elements of a batch that were dropped individually.
    Deliver { items: Vec<Value>, rejected: usize },
    /// `connected` or `heartbeat`: log only.
    Notice(EventKind),
    /// Stream-level warning sent by the server.
    ServerError(String),
    /// Kind this client does not handle.
    Ignored(EventKind),
    DecodeFailed(DecodeError),
}

pub fn dispatch_event(event: &StreamEvent) -> Dispatch {
    match event.kind() {
        EventKind::DataItem => match decode_item(&event.payload) {
            Ok(item) => Dispatch::Deliver {
                items: vec![item],
                rejected: 0,
            },
            Err(err) => Dispatch::DecodeFailed(err),
        },
        EventKind::DataBatch => match decode_batch(&event.payload) {
            Ok((items, rejected)) => Dispatch::Deliver { items, rejected },
            Err(err) => Dispatch::DecodeFailed(err),
        },
        kind @ (EventKind::Connected | EventKind::Heartbeat) => Dispatch::Notice(kind),
        EventKind::Error => Dispatch::ServerError(event.payload.clone()),
        kind @ (EventKind::Message | EventKind::Unknown(_)) => Dispatch::Ignored(kind),
    }
}

fn decode_item(payload: &str) -> Result<Value, DecodeError> {
    let value: Value = serde_json::from_str(payload)?;
    if !value.is_object() {
        return Err(DecodeError::NotAnObject);
    }
    Ok(value)
}

fn decode_batch(payload: &str) -> Result<(Vec<Value>, usize), DecodeError> {
    let value: Value = serde_json::from_str(payload)?;
    let Value::Array(elements) = value else {
        return Err(DecodeError::NotAnArray);
    };
    let total = elements.len();
    let items = elements
        .into_iter()
        .filter(Value::is_object)
        .collect::<Vec<_>>();
    let rejected = total - items.len();
    Ok((items, rejected))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(kind: Option<&str>, payload: &str) -> StreamEvent {
        StreamEvent {
            event_type: kind.map(ToString::to_string),
            payload: payload.to_string(),
            ..StreamEvent::default()
        }
    }

    #[test]
    fn data_item_yields_one_deliverable() {
        match dispatch_event(&event(Some("data-item"), r#"{"event_id":1}"#)) {
            Dispatch::Deliver { items, rejected } => {
                assert_eq!(items.len(), 1);
                assert_eq!(items[0]["event_id"], 1);
                assert_eq!(rejected, 0);
            }
            other => panic!("unexpected dispatch: {other:?}"),
        }
    }

    #[test]
    fn data_batch_drops_only_non_object_elements() {
        match dispatch_event(&event(Some("data-batch"), r#"[{"event_id":1},7,{"event_id":2}]"#)) {
            Dispatch::Deliver { items, rejected } => {
                assert_eq!(items.len(), 2);
                assert_eq!(rejected, 1);
            }
            other => panic!("unexpected dispatch: {other:?}"),
        }
    }

    #[test]
    fn invalid_json_is_a_decode_failure() {
        assert!(matches!(
            dispatch_event(&event(Some("data-item"), "{not json")),
            Dispatch::DecodeFailed(DecodeError::Json(_))
        ));
        assert!(matches!(
            dispatch_event(&event(Some("data-batch"), r#"{"event_id":1}"#)),
            Dispatch::DecodeFailed(DecodeError::NotAnArray)
        ));
    }

    #[test]
    fn control_kinds_yield_no_deliverable() {
        assert!(matches!(
            dispatch_event(&event(Some("heartbeat"), "ping")),
            Dispatch::Notice(EventKind::Heartbeat)
        ));
        assert!(matches!(
            dispatch_event(&event(Some("error"), "rate limited")),
            Dispatch::ServerError(message) if message == "rate limited"
        ));
        assert!(matches!(
            dispatch_event(&event(Some("killmail-v3"), "{}")),
            Dispatch::Ignored(EventKind::Unknown(_))
        ));
        assert!(matches!(
            dispatch_event(&event(None, "{}")),
            Dispatch::Ignored(EventKind::Message)
        ));
    }
}
