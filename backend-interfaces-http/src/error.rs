use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use tracing::error;

use backend_application::AppError;

#[derive(Debug)]
pub enum HttpError {
    Unauthorized,
    BadRequest(String),
    Unavailable(String),
    Internal(String),
}

impl From<AppError> for HttpError {
    fn from(value: AppError) -> Self {
        match value {
            AppError::Unauthorized => HttpError::Unauthorized,
            AppError::BadRequest(msg) => HttpError::BadRequest(msg),
            AppError::StorageUnavailable(err) => HttpError::Unavailable(err.to_string()),
            AppError::Internal(err) => HttpError::Internal(err.to_string()),
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

impl IntoResponse for HttpError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            HttpError::Unauthorized => (StatusCode::UNAUTHORIZED, "unauthorized".to_string()),
            HttpError::BadRequest(msg) => (StatusCode::BAD_REQUEST, format!("bad request: {}", msg)),
            HttpError::Unavailable(msg) => {
                error!(error = %msg, "dependency unavailable");
                (StatusCode::SERVICE_UNAVAILABLE, "service unavailable".to_string())
            }
            HttpError::Internal(msg) => {
                error!(error = %msg, "request failed");
                (StatusCode::INTERNAL_SERVER_ERROR, "internal error".to_string())
            }
        };
        (status, Json(ErrorBody { error: message })).into_response()
    }
}
