use std::env;
use std::path::Path;

use anyhow::{anyhow, Result};
use serde::Deserialize;
use tokio::fs;
use tracing::warn;

use backend_domain::{
    DbConfig, PipelineConfig, RuntimeConfig, StreamConfig, DEFAULT_MAX_FRAME_BYTES,
};

use super::validation::{validate_storage_backend, validate_stream_url};

pub const CONFIG_PATH_ENV: &str = "KILLFEED_CONFIG";

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct AppConfig {
    pub bind_addr: String,
    pub api_token: Option<String>,
    pub stream_url: String,
    pub source_tag: String,
    pub stream_connect_timeout_seconds: u64,
    pub stream_read_timeout_seconds: u64,
    pub reconnect_floor_ms: u64,
    pub reconnect_ceiling_ms: u64,
    pub max_frame_bytes: usize,
    pub telemetry_period_seconds: u64,
    pub demand_capacity: usize,
    pub transformer_concurrency: usize,
    pub batch_size: usize,
    pub batch_timeout_ms: u64,
    pub batcher_concurrency: usize,
    pub storage_backend: String,
    pub clickhouse_url: String,
    pub clickhouse_database: String,
    pub clickhouse_user: Option<String>,
    pub clickhouse_password: Option<String>,
    pub watch_webhook_url: Option<String>,
    pub watch_timeout_seconds: u64,
    pub broadcast_buffer: usize,
    pub backfill_max_days: u32,
    pub max_body_bytes: u64,
    pub request_timeout_seconds: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        let pipeline = PipelineConfig::default();
        Self {
            bind_addr: "127.0.0.1:4004".to_string(),
            api_token: None,
            stream_url: "http://127.0.0.1:4005/api/v1/kills/stream".to_string(),
            source_tag: "stream".to_string(),
            stream_connect_timeout_seconds: 10,
            stream_read_timeout_seconds: 0,
            reconnect_floor_ms: 1_000,
            reconnect_ceiling_ms: 30_000,
            max_frame_bytes: DEFAULT_MAX_FRAME_BYTES,
            telemetry_period_seconds: 60,
            demand_capacity: pipeline.demand_capacity,
            transformer_concurrency: pipeline.transformer_concurrency,
            batch_size: pipeline.batch_size,
            batch_timeout_ms: pipeline.batch_timeout_ms,
            batcher_concurrency: pipeline.batcher_concurrency,
            storage_backend: "clickhouse".to_string(),
            clickhouse_url: "http://127.0.0.1:8123".to_string(),
            clickhouse_database: "killfeed".to_string(),
            clickhouse_user: None,
            clickhouse_password: None,
            watch_webhook_url: None,
            watch_timeout_seconds: 5,
            broadcast_buffer: 256,
            backfill_max_days: 7,
            max_body_bytes: 64 * 1024,
            request_timeout_seconds: 15,
        }
    }
}

impl AppConfig {
    pub async fn load() -> Result<Self> {
        let path = env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| "./config.toml".to_string());
        let file_path = Path::new(&path);
        let mut config = if file_path.exists() {
            let content = fs::read_to_string(file_path).await?;
            Self::from_toml(&content)?
        } else {
            warn!(path = %path, "config file not found, using defaults");
            AppConfig::default()
        };
        config.apply_env_overrides();
        config.normalize();
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|err| anyhow!("invalid config: {}", err))
    }

    pub fn normalize(&mut self) {
        for value in [
            &mut self.api_token,
            &mut self.clickhouse_user,
            &mut self.clickhouse_password,
            &mut self.watch_webhook_url,
        ] {
            if value.as_deref().is_some_and(|raw| raw.trim().is_empty()) {
                *value = None;
            }
        }
        self.stream_url = self.stream_url.trim().to_string();
        self.storage_backend = self.storage_backend.trim().to_lowercase();
        if self.source_tag.trim().is_empty() {
            self.source_tag = "stream".to_string();
        }
    }

    pub fn validate(&self) -> Result<()> {
        self.bind_addr
            .parse::<std::net::SocketAddr>()
            .map_err(|err| anyhow!("invalid bind_addr: {}", err))?;
        validate_stream_url(&self.stream_url)?;
        validate_storage_backend(&self.storage_backend)?;
        if self.reconnect_floor_ms == 0 {
            return Err(anyhow!("reconnect_floor_ms must be greater than 0"));
        }
        if self.reconnect_ceiling_ms < self.reconnect_floor_ms {
            return Err(anyhow!(
                "reconnect_ceiling_ms must not be below reconnect_floor_ms"
            ));
        }
        for (name, value) in [
            ("demand_capacity", self.demand_capacity),
            ("transformer_concurrency", self.transformer_concurrency),
            ("batch_size", self.batch_size),
            ("batcher_concurrency", self.batcher_concurrency),
            ("broadcast_buffer", self.broadcast_buffer),
            ("max_frame_bytes", self.max_frame_bytes),
        ] {
            if value == 0 {
                return Err(anyhow!("{} must be greater than 0", name));
            }
        }
        if self.batch_timeout_ms == 0 {
            return Err(anyhow!("batch_timeout_ms must be greater than 0"));
        }
        if self.backfill_max_days == 0 {
            return Err(anyhow!("backfill_max_days must be greater than 0"));
        }
        Ok(())
    }

    pub fn to_runtime_config(&self) -> RuntimeConfig {
        RuntimeConfig {
            bind_addr: self.bind_addr.clone(),
            api_token: self.api_token.clone(),
            request_timeout_seconds: self.request_timeout_seconds,
            max_body_bytes: self.max_body_bytes,
            broadcast_buffer: self.broadcast_buffer,
            backfill_max_days: self.backfill_max_days,
            watch_webhook_url: self.watch_webhook_url.clone(),
            watch_timeout_seconds: self.watch_timeout_seconds,
        }
    }

    pub fn to_pipeline_config(&self) -> PipelineConfig {
        PipelineConfig {
            demand_capacity: self.demand_capacity,
            transformer_concurrency: self.transformer_concurrency,
            batch_size: self.batch_size,
            batch_timeout_ms: self.batch_timeout_ms,
            batcher_concurrency: self.batcher_concurrency,
        }
    }

    pub fn to_stream_config(&self) -> StreamConfig {
        StreamConfig {
            url: self.stream_url.clone(),
            source_tag: self.source_tag.clone(),
            connect_timeout_seconds: self.stream_connect_timeout_seconds,
            read_timeout_seconds: self.stream_read_timeout_seconds,
            reconnect_floor_ms: self.reconnect_floor_ms,
            reconnect_ceiling_ms: self.reconnect_ceiling_ms,
            max_frame_bytes: self.max_frame_bytes,
            telemetry_period_seconds: self.telemetry_period_seconds,
        }
    }

    pub fn to_db_config(&self) -> DbConfig {
        DbConfig {
            storage_backend: self.storage_backend.clone(),
            clickhouse_url: self.clickhouse_url.clone(),
            clickhouse_database: self.clickhouse_database.clone(),
            clickhouse_user: self.clickhouse_user.clone(),
            clickhouse_password: self.clickhouse_password.clone(),
        }
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(value) = env::var("KILLFEED_BIND_ADDR") {
            self.bind_addr = value;
        }
        if let Ok(value) = env::var("KILLFEED_API_TOKEN") {
            self.api_token = Some(value);
        }
        if let Ok(value) = env::var("KILLFEED_STREAM_URL") {
            self.stream_url = value;
        }
        if let Ok(value) = env::var("KILLFEED_SOURCE_TAG") {
            self.source_tag = value;
        }
        if let Ok(value) = env::var("KILLFEED_STORAGE_BACKEND") {
            self.storage_backend = value;
        }
        if let Ok(value) = env::var("KILLFEED_CLICKHOUSE_URL") {
            self.clickhouse_url = value;
        }
        if let Ok(value) = env::var("KILLFEED_CLICKHOUSE_DATABASE") {
            self.clickhouse_database = value;
        }
        if let Ok(value) = env::var("KILLFEED_CLICKHOUSE_USER") {
            self.clickhouse_user = Some(value);
        }
        if let Ok(value) = env::var("KILLFEED_CLICKHOUSE_PASSWORD") {
            self.clickhouse_password = Some(value);
        }
        if let Ok(value) = env::var("KILLFEED_WATCH_WEBHOOK_URL") {
            self.watch_webhook_url = Some(value);
        }
        override_parsed(
            "KILLFEED_STREAM_CONNECT_TIMEOUT_SECONDS",
            &mut self.stream_connect_timeout_seconds,
        );
        override_parsed(
            "KILLFEED_STREAM_READ_TIMEOUT_SECONDS",
            &mut self.stream_read_timeout_seconds,
        );
        override_parsed("KILLFEED_RECONNECT_FLOOR_MS", &mut self.reconnect_floor_ms);
        override_parsed(
            "KILLFEED_RECONNECT_CEILING_MS",
            &mut self.reconnect_ceiling_ms,
        );
        override_parsed("KILLFEED_MAX_FRAME_BYTES", &mut self.max_frame_bytes);
        override_parsed(
            "KILLFEED_TELEMETRY_PERIOD_SECONDS",
            &mut self.telemetry_period_seconds,
        );
        override_parsed("KILLFEED_DEMAND_CAPACITY", &mut self.demand_capacity);
        override_parsed(
            "KILLFEED_TRANSFORMER_CONCURRENCY",
            &mut self.transformer_concurrency,
        );
        override_parsed("KILLFEED_BATCH_SIZE", &mut self.batch_size);
        override_parsed("KILLFEED_BATCH_TIMEOUT_MS", &mut self.batch_timeout_ms);
        override_parsed(
            "KILLFEED_BATCHER_CONCURRENCY",
            &mut self.batcher_concurrency,
        );
        override_parsed(
            "KILLFEED_WATCH_TIMEOUT_SECONDS",
            &mut self.watch_timeout_seconds,
        );
        override_parsed("KILLFEED_BROADCAST_BUFFER", &mut self.broadcast_buffer);
        override_parsed("KILLFEED_BACKFILL_MAX_DAYS", &mut self.backfill_max_days);
        override_parsed("KILLFEED_MAX_BODY_BYTES", &mut self.max_body_bytes);
        override_parsed(
            "KILLFEED_REQUEST_TIMEOUT_SECONDS",
            &mut self.request_timeout_seconds,
        );
    }
}

fn override_parsed<T: std::str::FromStr>(key: &str, target: &mut T) {
    if let Ok(value) = env::var(key) {
        match value.trim().parse() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(key, value = %value, "ignoring unparsable config override"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = AppConfig::default();
        config.validate().expect("valid defaults");
        assert_eq!(config.transformer_concurrency, 12);
        assert_eq!(config.batcher_concurrency, 4);
    }

    #[test]
    fn toml_overrides_selected_keys() {
        let mut config = AppConfig::from_toml(
            r#"
stream_url = "https://feed.example.org/stream"
batch_size = 50
storage_backend = " Memory "
api_token = "  "
"#,
        )
        .expect("parse");
        config.normalize();
        config.validate().expect("valid");
        assert_eq!(config.batch_size, 50);
        assert_eq!(config.storage_backend, "memory");
        assert_eq!(config.api_token, None);
        assert_eq!(config.reconnect_ceiling_ms, 30_000);
        assert_eq!(config.to_stream_config().read_timeout(), None);
    }

    #[test]
    fn inverted_backoff_bounds_are_rejected() {
        let config = AppConfig {
            reconnect_floor_ms: 5_000,
            reconnect_ceiling_ms: 1_000,
            ..AppConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn zero_concurrency_is_rejected() {
        let config = AppConfig {
            batcher_concurrency: 0,
            ..AppConfig::default()
        };
        let err = config.validate().expect_err("reject");
        assert!(err.to_string().contains("batcher_concurrency"));
    }
}
