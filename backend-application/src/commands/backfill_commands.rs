use backend_domain::BackfillRequest;
use tracing::{error, info};

use crate::{AppError, AppState};

/// Validates a backfill request, clamps its lookback window, and starts it.
pub async fn start_backfill(
    state: &AppState,
    request: BackfillRequest,
) -> Result<BackfillRequest, AppError> {
    let accepted = normalize_backfill_request(request, state.config.backfill_max_days)?;
    state
        .backfill_service
        .start_backfill(accepted.clone())
        .await
        .map_err(|err| {
            error!(subject_id = accepted.subject_id, error = %err, "failed to start backfill");
            AppError::Internal(err)
        })?;
    state.metrics.record_backfill_started();
    info!(
        subject_id = accepted.subject_id,
        days = accepted.days,
        "backfill started"
    );
    Ok(accepted)
}

pub fn normalize_backfill_request(
    request: BackfillRequest,
    max_days: u32,
) -> Result<BackfillRequest, AppError> {
    if request.subject_id <= 0 {
        return Err(AppError::BadRequest(
            "subject_id must be a positive integer".to_string(),
        ));
    }
    if request.days == 0 {
        return Err(AppError::BadRequest("days must be at least 1".to_string()));
    }
    Ok(BackfillRequest {
        subject_id: request.subject_id,
        days: request.days.min(max_days.max(1)),
    })
}
