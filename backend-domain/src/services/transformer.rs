//! Record transformer: one decoded killmail payload into one
//! [`RawEventRecord`] plus its [`ParticipantRecord`]s.
//!
//! Pure and deterministic. Only a missing `event_id` rejects the payload;
//! every other gap degrades to a default.

use chrono::{DateTime, NaiveDateTime};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

use crate::entities::{ParticipantRecord, RawEventRecord, TransformedKillmail};
use crate::error::TransformError;

const EVENT_ID_FIELDS: &[&str] = &["event_id", "killmail_id"];
const EVENT_TIME_FIELDS: &[&str] = &["event_time", "kill_time", "killmail_time", "timestamp"];
const LOCATION_FIELDS: &[&str] = &["location_id", "solar_system_id", "system_id"];
const HASH_FIELDS: &[&str] = &["content_hash", "hash"];
const PARTICIPANT_COUNT_FIELDS: &[&str] = &["participant_count", "attacker_count"];
const SOURCE_TAG_FIELDS: &[&str] = &["source_tag"];
const SUBJECT_OBJECTS: &[&str] = &["primary_subject", "victim"];
const ACTOR_LISTS: &[&str] = &["participants", "attackers"];

/// `(nested names, flattened top-level names)` per primary-subject field.
const SUBJECT_ID: (&[&str], &[&str]) = (
    &["subject_id", "character_id", "id"],
    &["primary_subject_id", "victim_character_id"],
);
const SUBJECT_CORP: (&[&str], &[&str]) = (
    &["corp_id", "corporation_id"],
    &["primary_corp_id", "victim_corporation_id"],
);
const SUBJECT_ALLIANCE: (&[&str], &[&str]) = (
    &["alliance_id"],
    &["primary_alliance_id", "victim_alliance_id"],
);
const SUBJECT_OBJECT_TYPE: (&[&str], &[&str]) = (
    &["object_type_id", "ship_type_id"],
    &["primary_object_type_id", "victim_ship_type_id"],
);
const SUBJECT_DAMAGE: (&[&str], &[&str]) = (
    &["damage_taken", "damage_value"],
    &["primary_damage_taken", "victim_damage_taken"],
);

const ACTOR_ID_FIELDS: &[&str] = &["actor_id", "character_id"];
const ACTOR_CORP_FIELDS: &[&str] = &["corp_id", "corporation_id"];
const ACTOR_ALLIANCE_FIELDS: &[&str] = &["alliance_id"];
const ACTOR_OBJECT_TYPE_FIELDS: &[&str] = &["object_type_id", "ship_type_id"];
const ACTOR_DAMAGE_FIELDS: &[&str] = &["damage_value", "damage_done"];
const ACTOR_DECISIVE_FIELDS: &[&str] = &["is_decisive_actor", "final_blow"];

/// Primary-subject fields after schema resolution.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PrimarySubject {
    pub subject_id: Option<i64>,
    pub corp_id: Option<i64>,
    pub alliance_id: Option<i64>,
    pub object_type_id: Option<i64>,
    pub damage_taken: Option<i64>,
}

pub fn transform_killmail(
    payload: &Value,
    default_source_tag: &str,
) -> Result<TransformedKillmail, TransformError> {
    let obj = payload.as_object().ok_or(TransformError::NotAnObject)?;
    let event_id = first_i64(obj, EVENT_ID_FIELDS).ok_or(TransformError::MissingEventId)?;
    let event_time = first_timestamp_millis(obj, EVENT_TIME_FIELDS).unwrap_or(0);
    let location_id = first_i64(obj, LOCATION_FIELDS).unwrap_or(0);
    let subject = extract_primary_subject(obj);
    let actors = first_array(obj, ACTOR_LISTS).unwrap_or(&[]);

    let content_hash = first_str(obj, HASH_FIELDS)
        .or_else(|| {
            obj.get("zkb")
                .and_then(Value::as_object)
                .and_then(|zkb| first_str(zkb, &["hash"]))
        })
        .map(ToString::to_string)
        .unwrap_or_else(|| derive_content_hash(event_id, event_time));

    let participant_count = first_i64(obj, PARTICIPANT_COUNT_FIELDS)
        .filter(|count| *count >= 0)
        .map(|count| u32::try_from(count).unwrap_or(u32::MAX))
        .unwrap_or_else(|| u32::try_from(actors.len()).unwrap_or(u32::MAX));

    let source_tag = first_str(obj, SOURCE_TAG_FIELDS)
        .unwrap_or(default_source_tag)
        .to_string();

    let mut participants = Vec::with_capacity(actors.len() + 1);
    let mut dropped_participants = 0;

    match valid_object_type(subject.object_type_id) {
        Some(object_type_id) => participants.push(ParticipantRecord {
            event_id,
            event_time,
            actor_id: subject.subject_id,
            corp_id: subject.corp_id,
            alliance_id: subject.alliance_id,
            object_type_id,
            damage_value: subject.damage_taken.unwrap_or(0).max(0),
            is_primary_subject: true,
            is_decisive_actor: false,
            location_id,
        }),
        None => dropped_participants += 1,
    }

    for actor in actors {
        match build_actor(actor, event_id, event_time, location_id) {
            Some(record) => participants.push(record),
            None => dropped_participants += 1,
        }
    }

    let event = RawEventRecord {
        event_id,
        event_time,
        content_hash,
        location_id,
        primary_subject_id: subject.subject_id,
        primary_corp_id: subject.corp_id,
        primary_alliance_id: subject.alliance_id,
        primary_object_type_id: subject.object_type_id,
        participant_count,
        raw_payload: payload.clone(),
        source_tag,
    };

    Ok(TransformedKillmail {
        event,
        participants,
        dropped_participants,
    })
}

/// Prefers the nested subject object, falls back to flattened fields.
pub fn extract_primary_subject(obj: &Map<String, Value>) -> PrimarySubject {
    let nested = SUBJECT_OBJECTS
        .iter()
        .find_map(|name| obj.get(*name).and_then(Value::as_object));
    let resolve = |(nested_names, flat_names): (&[&str], &[&str])| {
        nested
            .and_then(|subject| first_i64(subject, nested_names))
            .or_else(|| first_i64(obj, flat_names))
    };
    PrimarySubject {
        subject_id: resolve(SUBJECT_ID),
        corp_id: resolve(SUBJECT_CORP),
        alliance_id: resolve(SUBJECT_ALLIANCE),
        object_type_id: resolve(SUBJECT_OBJECT_TYPE),
        damage_taken: resolve(SUBJECT_DAMAGE),
    }
}

/// Stable hash for sources that do not send one.
pub fn derive_content_hash(event_id: i64, event_time: i64) -> String {
    let digest = Sha256::digest(format!("{}:{}", event_id, event_time).as_bytes());
    let mut out = String::with_capacity(digest.len() * 2);
    for byte in digest {
        out.push_str(&format!("{:02x}", byte));
    }
    out
}

fn build_actor(
    actor: &Value,
    event_id: i64,
    event_time: i64,
    location_id: i64,
) -> Option<ParticipantRecord> {
    let actor = actor.as_object()?;
    let object_type_id = valid_object_type(first_i64(actor, ACTOR_OBJECT_TYPE_FIELDS))?;
    Some(ParticipantRecord {
        event_id,
        event_time,
        actor_id: first_i64(actor, ACTOR_ID_FIELDS),
        corp_id: first_i64(actor, ACTOR_CORP_FIELDS),
        alliance_id: first_i64(actor, ACTOR_ALLIANCE_FIELDS),
        object_type_id,
        damage_value: first_i64(actor, ACTOR_DAMAGE_FIELDS).unwrap_or(0).max(0),
        is_primary_subject: false,
        is_decisive_actor: first_bool(actor, ACTOR_DECISIVE_FIELDS).unwrap_or(false),
        location_id,
    })
}

fn valid_object_type(value: Option<i64>) -> Option<i64> {
    value.filter(|id| *id > 0)
}

fn first_i64(obj: &Map<String, Value>, names: &[&str]) -> Option<i64> {
    names.iter().find_map(|name| obj.get(*name).and_then(parse_i64))
}

fn first_str<'a>(obj: &'a Map<String, Value>, names: &[&str]) -> Option<&'a str> {
    names.iter().find_map(|name| {
        obj.get(*name)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|value| !value.is_empty())
    })
}

fn first_bool(obj: &Map<String, Value>, names: &[&str]) -> Option<bool> {
    names.iter().find_map(|name| match obj.get(*name)? {
        Value::Bool(flag) => Some(*flag),
        Value::Number(number) => number.as_i64().map(|value| value != 0),
        Value::String(text) => text.trim().parse::<bool>().ok(),
        _ => None,
    })
}

fn first_array<'a>(obj: &'a Map<String, Value>, names: &[&str]) -> Option<&'a [Value]> {
    names
        .iter()
        .find_map(|name| obj.get(*name).and_then(Value::as_array))
        .map(Vec::as_slice)
}

fn first_timestamp_millis(obj: &Map<String, Value>, names: &[&str]) -> Option<i64> {
    names
        .iter()
        .find_map(|name| obj.get(*name).and_then(parse_timestamp_millis))
}

fn parse_i64(value: &Value) -> Option<i64> {
    match value {
        Value::Number(number) => number.as_i64().or_else(|| {
            number
                .as_f64()
                .filter(|float| float.fract() == 0.0 && float.abs() < 9.0e15)
                .map(|float| float as i64)
        }),
        Value::String(text) => text.trim().parse::<i64>().ok(),
        _ => None,
    }
}

/// Accepts RFC 3339 strings, naive UTC date-times, or unix seconds/millis.
fn parse_timestamp_millis(value: &Value) -> Option<i64> {
    if let Some(text) = value.as_str() {
        let text = text.trim();
        if let Ok(parsed) = DateTime::parse_from_rfc3339(text) {
            return Some(parsed.timestamp_millis());
        }
        for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
            if let Ok(parsed) = NaiveDateTime::parse_from_str(text, format) {
                return Some(parsed.and_utc().timestamp_millis());
            }
        }
    }
    let raw = parse_i64(value)?;
    if raw.abs() >= 100_000_000_000 {
        Some(raw)
    } else {
        raw.checked_mul(1000)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> Value {
        json!({
            "killmail_id": 123,
            "kill_time": "2024-03-01T12:00:00Z",
            "solar_system_id": 30000142,
            "victim": {
                "character_id": 90000001,
                "corporation_id": 98000001,
                "ship_type_id": 587,
                "damage_taken": 1500
            },
            "attackers": [
                {"character_id": 90000002, "corporation_id": 98000002, "ship_type_id": 621, "damage_done": 1000, "final_blow": true},
                {"ship_type_id": 23913, "damage_done": 500},
                {"character_id": 90000003, "damage_done": 0}
            ],
            "zkb": {"hash": "abc123"}
        })
    }

    #[test]
    fn builds_event_and_participants() {
        let out = transform_killmail(&sample(), "stream").expect("transform");
        assert_eq!(out.event.event_id, 123);
        assert_eq!(out.event.event_time, 1_709_294_400_000);
        assert_eq!(out.event.location_id, 30000142);
        assert_eq!(out.event.primary_subject_id, Some(90000001));
        assert_eq!(out.event.primary_object_type_id, Some(587));
        assert_eq!(out.event.content_hash, "abc123");
        assert_eq!(out.event.participant_count, 3);
        assert_eq!(out.event.raw_payload, sample());
        assert_eq!(out.event.source_tag, "stream");

        assert_eq!(out.participants.len(), 3);
        assert!(out.participants[0].is_primary_subject);
        assert_eq!(out.participants[0].damage_value, 1500);
        assert!(out.participants[1].is_decisive_actor);
        assert_eq!(out.participants[2].actor_id, None);
        assert_eq!(out.participants[2].object_type_id, 23913);
        assert_eq!(out.dropped_participants, 1);
    }

    #[test]
    fn missing_event_id_rejects_the_event() {
        let err = transform_killmail(&json!({"kill_time": "2024-03-01T12:00:00Z"}), "stream")
            .expect_err("reject");
        assert_eq!(err, TransformError::MissingEventId);
        assert_eq!(
            transform_killmail(&json!([1, 2]), "stream").expect_err("reject"),
            TransformError::NotAnObject
        );
    }

    #[test]
    fn flattened_subject_fields_are_a_fallback() {
        let payload = json!({
            "event_id": 5,
            "event_time": 1_709_294_400,
            "primary_subject": {"subject_id": 11},
            "primary_subject_id": 99,
            "primary_corp_id": 22,
            "primary_object_type_id": 670
        });
        let out = transform_killmail(&payload, "stream").expect("transform");
        assert_eq!(out.event.primary_subject_id, Some(11));
        assert_eq!(out.event.primary_corp_id, Some(22));
        assert_eq!(out.event.primary_alliance_id, None);
        assert_eq!(out.event.event_time, 1_709_294_400_000);
        assert_eq!(out.participants.len(), 1);
    }

    #[test]
    fn content_hash_is_derived_deterministically() {
        let payload = json!({"event_id": "77", "event_time": 1_709_294_400_000_i64});
        let first = transform_killmail(&payload, "stream").expect("transform");
        let second = transform_killmail(&payload, "stream").expect("transform");
        assert_eq!(first, second);
        assert_eq!(first.event.content_hash, derive_content_hash(77, 1_709_294_400_000));
        assert_eq!(first.event.content_hash.len(), 64);
    }

    #[test]
    fn subject_without_object_type_is_counted_not_fatal() {
        let payload = json!({"event_id": 8, "victim": {"character_id": 1}});
        let out = transform_killmail(&payload, "stream").expect("transform");
        assert!(out.participants.is_empty());
        assert_eq!(out.dropped_participants, 1);
        assert_eq!(out.event.event_time, 0);
        assert_eq!(out.event.participant_count, 0);
    }

    #[test]
    fn negative_damage_is_clamped() {
        let payload = json!({
            "event_id": 9,
            "participants": [{"actor_id": 3, "object_type_id": 10, "damage_value": -4}]
        });
        let out = transform_killmail(&payload, "stream").expect("transform");
        assert_eq!(out.participants[0].damage_value, 0);
    }
}
