use std::collections::HashSet;
use std::sync::Arc;

use backend_domain::ports::KillmailRepository;
use backend_domain::{dedup_batch, BatchUpsertReport, TransformedKillmail};
use tracing::{debug, error, warn};

use crate::pipeline::{FanoutNotifier, Notification};
use crate::{AppError, Metrics};

pub struct BatchContext {
    pub killmail_repo: Arc<dyn KillmailRepository>,
    pub notifier: FanoutNotifier,
    pub metrics: Arc<Metrics>,
}

/// Deduplicates one batch, writes it through the idempotent upsert, and
/// notifies downstream consumers of newly stored killmails.
///
/// Rows rejected by storage are logged and counted; the batch still counts
/// as processed. Only a failure of the store itself fails the batch.
pub async fn persist_batch(
    context: &BatchContext,
    items: Vec<TransformedKillmail>,
) -> Result<BatchUpsertReport, AppError> {
    let batch = dedup_batch(items);
    context.metrics.record_duplicates(batch.duplicates_collapsed);
    if batch.is_empty() {
        return Ok(BatchUpsertReport::default());
    }

    let report = match context.killmail_repo.bulk_upsert(&batch).await {
        Ok(report) => report,
        Err(err) => {
            context.metrics.record_batch_failed(batch.len());
            error!(
                events = batch.events.len(),
                participants = batch.participants.len(),
                error = %err,
                "batch persistence failed"
            );
            return Err(AppError::StorageUnavailable(err));
        }
    };

    for row in report.failed() {
        warn!(key = %row.key, reason = %row.reason, "storage rejected row");
    }
    if report.orphaned_participants > 0 {
        warn!(
            count = report.orphaned_participants,
            "skipped participants of rejected killmails"
        );
    }
    context.metrics.record_batch_persisted(&report);
    debug!(
        inserted = report.events.inserted.len(),
        skipped = report.events.skipped,
        rejected = report.failed_count(),
        "batch persisted"
    );

    let inserted = report.events.inserted.iter().copied().collect::<HashSet<_>>();
    let notifications = batch
        .events
        .into_iter()
        .filter(|event| inserted.contains(&event.key()))
        .map(|event| Notification {
            location_id: event.location_id,
            payload: event.raw_payload,
        })
        .collect::<Vec<_>>();
    context.notifier.notify(notifications);

    Ok(report)
}
