use std::collections::HashSet;

use anyhow::Result;
use async_trait::async_trait;
use clickhouse::{Client, Row};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tracing::debug;

use backend_domain::{
    DbConfig, EventKey, KillmailRepository, ParticipantKey, ParticipantRecord, RawEventRecord,
    UpsertOutcome,
};

use super::write_plan::{event_ids, plan_events, plan_participants};
use crate::utils::{current_millis, first_write_version, millis_to_utc};

const EVENTS_TABLE: &str = "killmail_events";
const PARTICIPANTS_TABLE: &str = "killmail_participants";

#[derive(Debug, Clone, Serialize, Deserialize, Row)]
struct KillmailEventRow {
    event_id: i64,
    #[serde(with = "clickhouse::serde::time::datetime64::millis")]
    event_time: OffsetDateTime,
    content_hash: String,
    location_id: i64,
    primary_subject_id: Option<i64>,
    primary_corp_id: Option<i64>,
    primary_alliance_id: Option<i64>,
    primary_object_type_id: Option<i64>,
    participant_count: u32,
    raw_payload: String,
    source_tag: String,
    #[serde(with = "clickhouse::serde::time::datetime64::millis")]
    ingested_at: OffsetDateTime,
    version: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, Row)]
struct KillmailParticipantRow {
    event_id: i64,
    #[serde(with = "clickhouse::serde::time::datetime64::millis")]
    event_time: OffsetDateTime,
    actor_id: Option<i64>,
    corp_id: Option<i64>,
    alliance_id: Option<i64>,
    object_type_id: i64,
    damage_value: i64,
    is_primary_subject: bool,
    is_decisive_actor: bool,
    location_id: i64,
    #[serde(with = "clickhouse::serde::time::datetime64::millis")]
    ingested_at: OffsetDateTime,
    version: u64,
}

/// Column tuple read back by `stored_participant_keys`; a struct because
/// the clickhouse tuple `Row` impl does not accept `Option` elements.
#[derive(Debug, Deserialize, Row)]
struct StoredParticipantKeyRow {
    event_id: i64,
    event_time: i64,
    actor_id: Option<i64>,
    object_type_id: i64,
}

impl KillmailEventRow {
    fn from_record(event: &RawEventRecord, ingested_at_ms: i64) -> Self {
        Self {
            event_id: event.event_id,
            event_time: millis_to_utc(event.event_time),
            content_hash: event.content_hash.clone(),
            location_id: event.location_id,
            primary_subject_id: event.primary_subject_id,
            primary_corp_id: event.primary_corp_id,
            primary_alliance_id: event.primary_alliance_id,
            primary_object_type_id: event.primary_object_type_id,
            participant_count: event.participant_count,
            raw_payload: event.raw_payload.to_string(),
            source_tag: event.source_tag.clone(),
            ingested_at: millis_to_utc(ingested_at_ms),
            version: first_write_version(ingested_at_ms),
        }
    }
}

impl KillmailParticipantRow {
    fn from_record(participant: &ParticipantRecord, ingested_at_ms: i64) -> Self {
        Self {
            event_id: participant.event_id,
            event_time: millis_to_utc(participant.event_time),
            actor_id: participant.actor_id,
            corp_id: participant.corp_id,
            alliance_id: participant.alliance_id,
            object_type_id: participant.object_type_id,
            damage_value: participant.damage_value,
            is_primary_subject: participant.is_primary_subject,
            is_decisive_actor: participant.is_decisive_actor,
            location_id: participant.location_id,
            ingested_at: millis_to_utc(ingested_at_ms),
            version: first_write_version(ingested_at_ms),
        }
    }
}

/// ClickHouse-backed killmail store.
///
/// Tables are `ReplacingMergeTree(version)` keyed by the natural key, with
/// the version descending in ingest time so background merges keep the
/// first write. Writers also skip keys that are already stored.
#[derive(Clone)]
pub struct ClickhouseRepo {
    client: Client,
    database: String,
}

impl ClickhouseRepo {
    pub fn new(client: Client, database: String) -> Self {
        Self { client, database }
    }

    pub fn from_config(config: &DbConfig) -> Self {
        let mut client = Client::default()
            .with_url(&config.clickhouse_url)
            .with_database(&config.clickhouse_database);
        if let Some(user) = &config.clickhouse_user {
            client = client.with_user(user);
        }
        if let Some(password) = &config.clickhouse_password {
            client = client.with_password(password);
        }
        Self::new(client, config.clickhouse_database.clone())
    }

    async fn stored_event_keys(&self, ids: &[i64]) -> Result<HashSet<EventKey>> {
        if ids.is_empty() {
            return Ok(HashSet::new());
        }
        let query = format!(
            "SELECT event_id, toUnixTimestamp64Milli(event_time) FROM {} WHERE event_id IN ({})",
            EVENTS_TABLE,
            join_ids(ids)
        );
        let rows = self.client.query(&query).fetch_all::<(i64, i64)>().await?;
        Ok(rows
            .into_iter()
            .map(|(event_id, event_time)| EventKey {
                event_id,
                event_time,
            })
            .collect())
    }

    async fn stored_participant_keys(&self, ids: &[i64]) -> Result<HashSet<ParticipantKey>> {
        if ids.is_empty() {
            return Ok(HashSet::new());
        }
        let query = format!(
            "SELECT event_id, toUnixTimestamp64Milli(event_time), actor_id, object_type_id \
             FROM {} WHERE event_id IN ({})",
            PARTICIPANTS_TABLE,
            join_ids(ids)
        );
        let rows = self
            .client
            .query(&query)
            .fetch_all::<StoredParticipantKeyRow>()
            .await?;
        Ok(rows
            .into_iter()
            .map(
                |StoredParticipantKeyRow {
                     event_id,
                     event_time,
                     actor_id,
                     object_type_id,
                 }| ParticipantKey {
                    event_id,
                    event_time,
                    actor_id,
                    object_type_id,
                },
            )
            .collect())
    }
}

#[async_trait]
impl KillmailRepository for ClickhouseRepo {
    async fn ensure_schema(&self) -> Result<()> {
        let create_db = format!("CREATE DATABASE IF NOT EXISTS {}", self.database);
        self.client.query(&create_db).execute().await?;

        let create_events = r#"
CREATE TABLE IF NOT EXISTS killmail_events (
    event_id Int64,
    event_time DateTime64(3),
    content_hash String,
    location_id Int64,
    primary_subject_id Nullable(Int64),
    primary_corp_id Nullable(Int64),
    primary_alliance_id Nullable(Int64),
    primary_object_type_id Nullable(Int64),
    participant_count UInt32,
    raw_payload String,
    source_tag String,
    ingested_at DateTime64(3),
    version UInt64
) ENGINE = ReplacingMergeTree(version)
PARTITION BY toYYYYMM(event_time)
ORDER BY (event_id, event_time)
"#;
        self.client.query(create_events).execute().await?;

        let create_participants = r#"
CREATE TABLE IF NOT EXISTS killmail_participants (
    event_id Int64,
    event_time DateTime64(3),
    actor_id Nullable(Int64),
    corp_id Nullable(Int64),
    alliance_id Nullable(Int64),
    object_type_id Int64,
    damage_value Int64,
    is_primary_subject Bool,
    is_decisive_actor Bool,
    location_id Int64,
    ingested_at DateTime64(3),
    version UInt64
) ENGINE = ReplacingMergeTree(version)
PARTITION BY toYYYYMM(event_time)
ORDER BY (event_id, event_time, ifNull(actor_id, 0), object_type_id)
"#;
        self.client.query(create_participants).execute().await?;
        Ok(())
    }

    async fn upsert_events(&self, events: &[RawEventRecord]) -> Result<UpsertOutcome<EventKey>> {
        let stored = self
            .stored_event_keys(&event_ids(events.iter().map(|event| event.event_id)))
            .await?;
        let (rows, outcome) = plan_events(events, &stored);
        if rows.is_empty() {
            return Ok(outcome);
        }

        let ingested_at_ms = current_millis();
        let mut insert = self.client.insert(EVENTS_TABLE)?;
        for event in &rows {
            insert
                .write(&KillmailEventRow::from_record(event, ingested_at_ms))
                .await?;
        }
        insert.end().await?;
        debug!(
            inserted = outcome.inserted.len(),
            skipped = outcome.skipped,
            rejected = outcome.failed.len(),
            "killmail rows written"
        );
        Ok(outcome)
    }

    async fn upsert_participants(
        &self,
        participants: &[ParticipantRecord],
    ) -> Result<UpsertOutcome<ParticipantKey>> {
        let stored = self
            .stored_participant_keys(&event_ids(
                participants.iter().map(|participant| participant.event_id),
            ))
            .await?;
        let (rows, outcome) = plan_participants(participants, &stored);
        if rows.is_empty() {
            return Ok(outcome);
        }

        let ingested_at_ms = current_millis();
        let mut insert = self.client.insert(PARTICIPANTS_TABLE)?;
        for participant in &rows {
            insert
                .write(&KillmailParticipantRow::from_record(
                    participant,
                    ingested_at_ms,
                ))
                .await?;
        }
        insert.end().await?;
        debug!(
            inserted = outcome.inserted.len(),
            skipped = outcome.skipped,
            rejected = outcome.failed.len(),
            "participant rows written"
        );
        Ok(outcome)
    }

    async fn ping(&self) -> Result<()> {
        let _: u8 = self.client.query("SELECT toUInt8(1)").fetch_one().await?;
        Ok(())
    }
}

fn join_ids(ids: &[i64]) -> String {
    ids.iter().map(i64::to_string).collect::<Vec<_>>().join(",")
}
