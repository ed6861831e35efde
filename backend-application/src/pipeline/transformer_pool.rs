use std::sync::Arc;

use backend_domain::{transform_killmail, TransformedKillmail};
use serde_json::Value;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::Metrics;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TransformerStats {
    pub transformed: u64,
    pub rejected: u64,
}

/// Spawns `concurrency` workers pulling from one shared input queue.
pub fn spawn_transformer_pool(
    input: mpsc::Receiver<Value>,
    output: mpsc::Sender<TransformedKillmail>,
    concurrency: usize,
    source_tag: Arc<str>,
    metrics: Arc<Metrics>,
) -> Vec<JoinHandle<TransformerStats>> {
    let input = Arc::new(Mutex::new(input));
    (0..concurrency.max(1))
        .map(|worker| {
            tokio::spawn(transform_worker(
                worker,
                input.clone(),
                output.clone(),
                source_tag.clone(),
                metrics.clone(),
            ))
        })
        .collect()
}

async fn transform_worker(
    worker: usize,
    input: Arc<Mutex<mpsc::Receiver<Value>>>,
    output: mpsc::Sender<TransformedKillmail>,
    source_tag: Arc<str>,
    metrics: Arc<Metrics>,
) -> TransformerStats {
    let mut stats = TransformerStats::default();
    loop {
        let next = { input.lock().await.recv().await };
        let Some(payload) = next else {
            break;
        };

        match transform_killmail(&payload, &source_tag) {
            Ok(transformed) => {
                stats.transformed += 1;
                metrics.record_transformed(transformed.dropped_participants);
                if output.send(transformed).await.is_err() {
                    warn!(worker, "batch collector closed, stopping transformer");
                    break;
                }
            }
            Err(err) => {
                stats.rejected += 1;
                metrics.record_transform_rejected();
                warn!(
                    worker,
                    error = %err,
                    event_id = ?payload.get("event_id").or_else(|| payload.get("killmail_id")),
                    "rejected killmail payload"
                );
            }
        }
    }
    debug!(worker, transformed = stats.transformed, "transformer worker finished");
    stats
}
