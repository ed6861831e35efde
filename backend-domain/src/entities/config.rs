// Runtime configuration entities
// Built once at startup and passed through constructors

use std::time::Duration;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeConfig {
    pub bind_addr: String,
    pub api_token: Option<String>,
    pub request_timeout_seconds: u64,
    pub max_body_bytes: u64,
    pub broadcast_buffer: usize,
    pub backfill_max_days: u32,
    pub watch_webhook_url: Option<String>,
    pub watch_timeout_seconds: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Credit between the stream client and the transformer pool.
    pub demand_capacity: usize,
    pub transformer_concurrency: usize,
    pub batch_size: usize,
    pub batch_timeout_ms: u64,
    pub batcher_concurrency: usize,
}

impl PipelineConfig {
    pub fn batch_timeout(&self) -> Duration {
        Duration::from_millis(self.batch_timeout_ms)
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            demand_capacity: 256,
            transformer_concurrency: 12,
            batch_size: 100,
            batch_timeout_ms: 1000,
            batcher_concurrency: 4,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamConfig {
    pub url: String,
    pub source_tag: String,
    pub connect_timeout_seconds: u64,
    /// Zero waits indefinitely for the next chunk.
    pub read_timeout_seconds: u64,
    pub reconnect_floor_ms: u64,
    pub reconnect_ceiling_ms: u64,
    pub max_frame_bytes: usize,
    pub telemetry_period_seconds: u64,
}

impl StreamConfig {
    pub fn read_timeout(&self) -> Option<Duration> {
        (self.read_timeout_seconds > 0).then(|| Duration::from_secs(self.read_timeout_seconds))
    }
}

#[derive(Debug, Clone)]
pub struct DbConfig {
    pub storage_backend: String,
    pub clickhouse_url: String,
    pub clickhouse_database: String,
    pub clickhouse_user: Option<String>,
    pub clickhouse_password: Option<String>,
}
