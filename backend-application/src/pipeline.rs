//! Ingest pipeline: decoded payloads flow through a bounded channel into a
//! transformer pool, then into the batch collector, which persists batches
//! with bounded concurrency and hands successes to the fan-out notifier.
//!
//! The input channel's capacity is the stream client's credit. Dropping
//! every input sender drains the pipeline: transformers finish, the
//! collector flushes its partial batch and waits for in-flight writes.

pub mod batch_collector;
pub mod notifier;
pub mod transformer_pool;

pub use batch_collector::*;
pub use notifier::*;
pub use transformer_pool::*;

use std::sync::Arc;

use backend_domain::ports::KillmailRepository;
use backend_domain::PipelineConfig;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::Metrics;

pub struct PipelineContext {
    pub config: PipelineConfig,
    pub source_tag: String,
    pub killmail_repo: Arc<dyn KillmailRepository>,
    pub notifier: FanoutNotifier,
    pub metrics: Arc<Metrics>,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PipelineSummary {
    pub transformed: u64,
    pub rejected: u64,
    pub batches_persisted: u64,
    pub batches_failed: u64,
}

/// Starts the pipeline. Returns the input sender and a handle that resolves
/// once every sender is dropped and all work has drained.
pub fn spawn_pipeline(context: PipelineContext) -> (mpsc::Sender<Value>, JoinHandle<PipelineSummary>) {
    let PipelineContext {
        config,
        source_tag,
        killmail_repo,
        notifier,
        metrics,
    } = context;

    let (input_tx, input_rx) = mpsc::channel(config.demand_capacity.max(1));
    let (transformed_tx, transformed_rx) =
        mpsc::channel(config.batch_size.max(1) * config.batcher_concurrency.max(1));

    let transformers = spawn_transformer_pool(
        input_rx,
        transformed_tx,
        config.transformer_concurrency,
        Arc::from(source_tag),
        metrics.clone(),
    );
    let batch_context = Arc::new(BatchContext {
        killmail_repo,
        notifier,
        metrics,
    });
    let collector = tokio::spawn(run_batch_collector(
        transformed_rx,
        config.clone(),
        batch_context,
    ));

    let handle = tokio::spawn(async move {
        let mut summary = PipelineSummary::default();
        for worker in transformers {
            match worker.await {
                Ok(stats) => {
                    summary.transformed += stats.transformed;
                    summary.rejected += stats.rejected;
                }
                Err(err) => error!(error = %err, "transformer worker aborted"),
            }
        }
        match collector.await {
            Ok(stats) => {
                summary.batches_persisted = stats.batches_persisted;
                summary.batches_failed = stats.batches_failed;
            }
            Err(err) => error!(error = %err, "batch collector aborted"),
        }
        info!(
            transformed = summary.transformed,
            rejected = summary.rejected,
            batches_persisted = summary.batches_persisted,
            batches_failed = summary.batches_failed,
            "pipeline drained"
        );
        summary
    });

    (input_tx, handle)
}
