use time::OffsetDateTime;

pub fn millis_to_utc(ms: i64) -> OffsetDateTime {
    let nanos = i128::from(ms).saturating_mul(1_000_000);
    OffsetDateTime::from_unix_timestamp_nanos(nanos).unwrap_or(OffsetDateTime::UNIX_EPOCH)
}

pub fn current_millis() -> i64 {
    (OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000) as i64
}

/// Version for ReplacingMergeTree rows: earlier writes get higher versions,
/// so merges keep the first write.
pub fn first_write_version(ingested_at_ms: i64) -> u64 {
    u64::MAX - u64::try_from(ingested_at_ms).unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn earlier_writes_win_merges() {
        assert!(first_write_version(1_000) > first_write_version(2_000));
    }

    #[test]
    fn millis_round_trip_through_offset_datetime() {
        let at = millis_to_utc(1_709_294_400_123);
        assert_eq!(
            (at.unix_timestamp_nanos() / 1_000_000) as i64,
            1_709_294_400_123
        );
    }
}
