use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum FramingError {
    #[error("event block is not valid utf-8")]
    InvalidUtf8,
}

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("invalid payload encoding: {0}")]
    Json(#[from] serde_json::Error),
    #[error("expected a json object")]
    NotAnObject,
    #[error("expected a json array for data-batch")]
    NotAnArray,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TransformError {
    #[error("payload is not a json object")]
    NotAnObject,
    #[error("missing event_id")]
    MissingEventId,
}
