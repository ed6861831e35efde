use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("unauthorized")]
    Unauthorized,
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("storage unavailable: {0}")]
    StorageUnavailable(anyhow::Error),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}
