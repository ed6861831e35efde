use backend_domain::StreamState;
use serde::Serialize;

use crate::AppState;

#[derive(Debug, Clone, Serialize)]
pub struct PipelineStatus {
    pub stream: StreamState,
    pub items_delivered: u64,
    pub transform_rejected: u64,
    pub batches_persisted: u64,
    pub batches_failed: u64,
    pub subscriber_topics: usize,
}

pub fn get_stream_state(state: &AppState) -> StreamState {
    state.stream_state.borrow().clone()
}

pub async fn get_pipeline_status(state: &AppState) -> PipelineStatus {
    PipelineStatus {
        stream: get_stream_state(state),
        items_delivered: state.metrics.items_delivered(),
        transform_rejected: state.metrics.transform_rejected(),
        batches_persisted: state.metrics.batches_persisted(),
        batches_failed: state.metrics.batches_failed(),
        subscriber_topics: state.stream_hub.topic_count().await,
    }
}
