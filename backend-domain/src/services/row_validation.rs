// Storage-level row constraints shared by every persistence adapter

use crate::entities::{ParticipantRecord, RawEventRecord};

pub fn validate_event_row(event: &RawEventRecord) -> Result<(), String> {
    if event.event_id <= 0 {
        return Err(format!("event_id must be positive, got {}", event.event_id));
    }
    if event.event_time < 0 {
        return Err("event_time is before the unix epoch".to_string());
    }
    if event.content_hash.trim().is_empty() {
        return Err("content_hash is empty".to_string());
    }
    if event.location_id < 0 {
        return Err(format!("location_id must not be negative, got {}", event.location_id));
    }
    Ok(())
}

pub fn validate_participant_row(participant: &ParticipantRecord) -> Result<(), String> {
    if participant.event_id <= 0 {
        return Err(format!(
            "event_id must be positive, got {}",
            participant.event_id
        ));
    }
    if participant.object_type_id <= 0 {
        return Err("object_type_id is missing".to_string());
    }
    if participant.damage_value < 0 {
        return Err("damage_value is negative".to_string());
    }
    Ok(())
}
