use std::time::Duration;

use reqwest::StatusCode;
use thiserror::Error;

/// Why a stream connection ended. All of these are recovered by the
/// reconnect loop; none of them reach the pipeline.
#[derive(Debug, Error)]
pub enum StreamError {
    #[error("failed to build http client: {0}")]
    Client(#[source] reqwest::Error),
    #[error("connect failed: {0}")]
    Connect(#[source] reqwest::Error),
    #[error("server responded {0}")]
    Status(StatusCode),
    #[error("transport error: {0}")]
    Transport(#[source] reqwest::Error),
    #[error("no data received for {0:?}")]
    ReadTimeout(Duration),
    #[error("stream closed by server")]
    Closed,
}
