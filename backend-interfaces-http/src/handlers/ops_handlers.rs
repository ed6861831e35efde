use axum::extract::State;
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::response::IntoResponse;
use axum::Json;
use tokio::time::{timeout, Duration};
use tracing::error;

use backend_application::commands::backfill_commands;
use backend_application::queries::pipeline_queries::{self, PipelineStatus};
use backend_application::AppState;
use backend_domain::BackfillRequest;

use crate::error::HttpError;
use crate::middleware::authorize;

pub async fn health_live() -> StatusCode {
    StatusCode::OK
}

pub async fn health_ready(State(state): State<AppState>) -> StatusCode {
    let timeout_secs = state.config.request_timeout_seconds.max(1);
    let timeout_duration = Duration::from_secs(timeout_secs);
    match timeout(timeout_duration, state.killmail_repo.ping()).await {
        Ok(Ok(_)) => StatusCode::OK,
        Ok(Err(err)) => {
            error!("ready check failed: {}", err);
            StatusCode::SERVICE_UNAVAILABLE
        }
        Err(_) => {
            error!("ready check timeout after {}s", timeout_secs);
            StatusCode::SERVICE_UNAVAILABLE
        }
    }
}

pub async fn metrics_prometheus(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> impl IntoResponse {
    if !authorize(&state.config, &headers) {
        return HttpError::Unauthorized.into_response();
    }
    let payload = state.metrics.render_prometheus();
    let mut headers = HeaderMap::new();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("text/plain; version=0.0.4; charset=utf-8"),
    );
    (headers, payload).into_response()
}

pub async fn pipeline_status(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<PipelineStatus>, HttpError> {
    if !authorize(&state.config, &headers) {
        return Err(HttpError::Unauthorized);
    }
    Ok(Json(pipeline_queries::get_pipeline_status(&state).await))
}

pub async fn start_backfill(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<BackfillRequest>,
) -> Result<(StatusCode, Json<BackfillRequest>), HttpError> {
    if !authorize(&state.config, &headers) {
        return Err(HttpError::Unauthorized);
    }
    let accepted = backfill_commands::start_backfill(&state, payload).await?;
    Ok((StatusCode::ACCEPTED, Json(accepted)))
}
