// Within-batch deduplication by natural key

use std::collections::HashSet;

use crate::entities::{KillmailBatch, TransformedKillmail};

/// Flattens transformer outputs into one batch, keeping the first copy of
/// every killmail key and every participant key.
pub fn dedup_batch(items: Vec<TransformedKillmail>) -> KillmailBatch {
    let mut batch = KillmailBatch::default();
    let mut seen_events = HashSet::new();
    let mut seen_participants = HashSet::new();

    for item in items {
        if seen_events.insert(item.event.key()) {
            batch.events.push(item.event);
        } else {
            batch.duplicates_collapsed += 1;
        }
        for participant in item.participants {
            if seen_participants.insert(participant.key()) {
                batch.participants.push(participant);
            } else {
                batch.duplicates_collapsed += 1;
            }
        }
    }

    batch
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::transform_killmail;
    use serde_json::json;

    #[test]
    fn identical_keys_collapse_to_one_record() {
        let first = json!({
            "event_id": 1,
            "event_time": "2024-03-01T12:00:00Z",
            "victim": {"character_id": 5, "ship_type_id": 587},
            "attackers": [{"character_id": 6, "ship_type_id": 621}]
        });
        let mut second = first.clone();
        second["note"] = json!("second copy");

        let batch = dedup_batch(vec![
            transform_killmail(&first, "stream").expect("transform"),
            transform_killmail(&second, "stream").expect("transform"),
        ]);
        assert_eq!(batch.events.len(), 1);
        assert_eq!(batch.events[0].raw_payload, first);
        assert_eq!(batch.participants.len(), 2);
        assert_eq!(batch.duplicates_collapsed, 3);
    }

    #[test]
    fn same_event_id_at_different_times_is_kept() {
        let batch = dedup_batch(vec![
            transform_killmail(&json!({"event_id": 1, "event_time": 1000}), "stream")
                .expect("transform"),
            transform_killmail(&json!({"event_id": 1, "event_time": 2000}), "stream")
                .expect("transform"),
        ]);
        assert_eq!(batch.events.len(), 2);
        assert_eq!(batch.duplicates_collapsed, 0);
    }
}
