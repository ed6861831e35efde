use axum::routing::{get, post};
use axum::Router;

use backend_application::AppState;

use crate::handlers::{ops_handlers, stream_handlers};

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/v2/ops/health/live", get(ops_handlers::health_live))
        .route("/v2/ops/health/ready", get(ops_handlers::health_ready))
        .route(
            "/v2/ops/metrics/prometheus",
            get(ops_handlers::metrics_prometheus),
        )
        .route("/v2/ops/pipeline", get(ops_handlers::pipeline_status))
        .route("/v2/ops/backfill", post(ops_handlers::start_backfill))
        .route(
            "/v2/stream/killmails",
            get(stream_handlers::subscribe_killmails),
        )
        .with_state(state)
}
