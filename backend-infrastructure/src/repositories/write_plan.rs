// First-write-wins planning shared by the storage adapters

use std::collections::HashSet;

use backend_domain::{
    validate_event_row, validate_participant_row, EventKey, ParticipantKey, ParticipantRecord,
    RawEventRecord, RejectedRow, UpsertOutcome,
};

/// Splits `events` into rows to write and an outcome already holding the
/// skipped and rejected counts. Keys in `stored` and repeats inside the
/// slice are skipped.
pub(crate) fn plan_events<'a>(
    events: &'a [RawEventRecord],
    stored: &HashSet<EventKey>,
) -> (Vec<&'a RawEventRecord>, UpsertOutcome<EventKey>) {
    let mut outcome = UpsertOutcome::default();
    let mut seen = HashSet::new();
    let mut rows = Vec::with_capacity(events.len());
    for event in events {
        let key = event.key();
        if let Err(reason) = validate_event_row(event) {
            outcome.failed.push(RejectedRow {
                key: key.to_string(),
                reason,
            });
            continue;
        }
        if stored.contains(&key) || !seen.insert(key) {
            outcome.skipped += 1;
            continue;
        }
        outcome.inserted.push(key);
        rows.push(event);
    }
    (rows, outcome)
}

pub(crate) fn plan_participants<'a>(
    participants: &'a [ParticipantRecord],
    stored: &HashSet<ParticipantKey>,
) -> (Vec<&'a ParticipantRecord>, UpsertOutcome<ParticipantKey>) {
    let mut outcome = UpsertOutcome::default();
    let mut seen = HashSet::new();
    let mut rows = Vec::with_capacity(participants.len());
    for participant in participants {
        let key = participant.key();
        if let Err(reason) = validate_participant_row(participant) {
            outcome.failed.push(RejectedRow {
                key: key.to_string(),
                reason,
            });
            continue;
        }
        if stored.contains(&key) || !seen.insert(key) {
            outcome.skipped += 1;
            continue;
        }
        outcome.inserted.push(key);
        rows.push(participant);
    }
    (rows, outcome)
}

/// Distinct event ids, for narrowing existing-key lookups.
pub(crate) fn event_ids<I: IntoIterator<Item = i64>>(ids: I) -> Vec<i64> {
    let mut ids = ids.into_iter().collect::<Vec<_>>();
    ids.sort_unstable();
    ids.dedup();
    ids
}
