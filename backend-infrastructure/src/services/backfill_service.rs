use std::sync::Arc;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::{mpsc, watch};
use tracing::{info, warn};

use backend_application::Metrics;
use backend_domain::ports::BackfillService;
use backend_domain::{BackfillRequest, StreamConfig};

use crate::stream::{StreamClient, StreamExit, StreamMode};

/// Runs each backfill as its own bounded stream connection feeding the
/// shared pipeline input. Holds only a weak handle to that input so the
/// pipeline can drain once the live client and running backfills stop.
pub struct StreamBackfillService {
    config: StreamConfig,
    pipeline_input: mpsc::WeakSender<Value>,
    metrics: Arc<Metrics>,
    shutdown: watch::Receiver<bool>,
}

impl StreamBackfillService {
    pub fn new(
        config: StreamConfig,
        pipeline_input: &mpsc::Sender<Value>,
        metrics: Arc<Metrics>,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            config,
            pipeline_input: pipeline_input.downgrade(),
            metrics,
            shutdown,
        }
    }
}

#[async_trait]
impl BackfillService for StreamBackfillService {
    async fn start_backfill(&self, request: BackfillRequest) -> Result<()> {
        if *self.shutdown.borrow() {
            return Err(anyhow!("shutting down"));
        }
        let output = self
            .pipeline_input
            .upgrade()
            .ok_or_else(|| anyhow!("ingest pipeline is closed"))?;
        let subject_id = request.subject_id;
        let client = StreamClient::new(
            self.config.clone(),
            StreamMode::Backfill(request),
            self.metrics.clone(),
        )?;
        let handle = client.spawn(output, self.shutdown.clone());
        tokio::spawn(async move {
            match handle.await {
                Ok(StreamExit::BackfillComplete) => info!(subject_id, "backfill finished"),
                Ok(StreamExit::RetriesExhausted) => {
                    warn!(subject_id, "backfill abandoned after repeated failures")
                }
                Ok(exit) => info!(subject_id, exit = ?exit, "backfill stopped"),
                Err(err) => warn!(subject_id, error = %err, "backfill task aborted"),
            }
        });
        Ok(())
    }
}
