use std::sync::Arc;

use backend_domain::{PipelineConfig, TransformedKillmail};
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinSet;
use tokio::time::{sleep_until, Instant};
use tracing::error;

use crate::commands::ingest_commands::persist_batch;
pub use crate::commands::ingest_commands::BatchContext;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CollectorStats {
    pub batches_persisted: u64,
    pub batches_failed: u64,
}

/// Groups transformed killmails into batches of `batch_size`, or whatever
/// arrived within `batch_timeout` of the first item, and persists up to
/// `batcher_concurrency` batches at once.
pub async fn run_batch_collector(
    mut input: mpsc::Receiver<TransformedKillmail>,
    config: PipelineConfig,
    context: Arc<BatchContext>,
) -> CollectorStats {
    let batch_size = config.batch_size.max(1);
    let batch_timeout = config.batch_timeout();
    let permits = Arc::new(Semaphore::new(config.batcher_concurrency.max(1)));
    let mut in_flight = JoinSet::new();
    let mut stats = CollectorStats::default();
    let mut pending: Vec<TransformedKillmail> = Vec::with_capacity(batch_size);
    let mut deadline: Option<Instant> = None;

    loop {
        tokio::select! {
            next = input.recv() => match next {
                Some(item) => {
                    if pending.is_empty() {
                        deadline = Some(Instant::now() + batch_timeout);
                    }
                    pending.push(item);
                    if pending.len() >= batch_size {
                        deadline = None;
                        dispatch(&mut pending, &permits, &mut in_flight, &context).await;
                    }
                }
                None => break,
            },
            _ = sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                deadline = None;
                dispatch(&mut pending, &permits, &mut in_flight, &context).await;
            }
            Some(finished) = in_flight.join_next(), if !in_flight.is_empty() => {
                absorb(&mut stats, finished);
            }
        }
    }

    dispatch(&mut pending, &permits, &mut in_flight, &context).await;
    while let Some(finished) = in_flight.join_next().await {
        absorb(&mut stats, finished);
    }
    stats
}

async fn dispatch(
    pending: &mut Vec<TransformedKillmail>,
    permits: &Arc<Semaphore>,
    in_flight: &mut JoinSet<bool>,
    context: &Arc<BatchContext>,
) {
    if pending.is_empty() {
        return;
    }
    let items = std::mem::take(pending);
    let permit = match permits.clone().acquire_owned().await {
        Ok(permit) => permit,
        Err(err) => {
            error!(error = %err, items = items.len(), "batch semaphore closed, dropping batch");
            context.metrics.record_batch_failed(items.len());
            return;
        }
    };
    let context = context.clone();
    in_flight.spawn(async move {
        let _permit = permit;
        persist_batch(&context, items).await.is_ok()
    });
}

fn absorb(stats: &mut CollectorStats, finished: Result<bool, tokio::task::JoinError>) {
    match finished {
        Ok(true) => stats.batches_persisted += 1,
        Ok(false) => stats.batches_failed += 1,
        Err(err) => {
            stats.batches_failed += 1;
            error!(error = %err, "batch persistence task aborted");
        }
    }
}
