use anyhow::{anyhow, Result};

pub const STORAGE_BACKENDS: &[&str] = &["clickhouse", "memory"];

pub fn validate_stream_url(value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(anyhow!("stream_url is empty"));
    }
    if !(value.starts_with("http://") || value.starts_with("https://")) {
        return Err(anyhow!("stream_url must be an http(s) url"));
    }
    Ok(())
}

pub fn validate_storage_backend(value: &str) -> Result<()> {
    if !STORAGE_BACKENDS.contains(&value) {
        return Err(anyhow!(
            "storage_backend must be one of {}",
            STORAGE_BACKENDS.join(", ")
        ));
    }
    Ok(())
}
