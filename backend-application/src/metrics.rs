use std::sync::atomic::{AtomicU64, Ordering};

use backend_domain::BatchUpsertReport;

/// Process-wide pipeline counters, rendered for Prometheus.
#[derive(Debug, Default)]
pub struct Metrics {
    stream_connects: AtomicU64,
    stream_failures: AtomicU64,
    stream_events: AtomicU64,
    stream_malformed_frames: AtomicU64,
    stream_server_errors: AtomicU64,
    stream_ignored_events: AtomicU64,
    decode_failures: AtomicU64,
    items_delivered: AtomicU64,
    items_discarded_on_shutdown: AtomicU64,
    transformed: AtomicU64,
    transform_rejected: AtomicU64,
    participants_dropped: AtomicU64,
    duplicates_collapsed: AtomicU64,
    batches_persisted: AtomicU64,
    batches_failed: AtomicU64,
    batch_items_failed: AtomicU64,
    rows_inserted: AtomicU64,
    rows_skipped: AtomicU64,
    rows_rejected: AtomicU64,
    broadcasts: AtomicU64,
    watch_failures: AtomicU64,
    backfills_started: AtomicU64,
}

impl Metrics {
    pub fn record_connect(&self) {
        self.stream_connects.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_connection_failure(&self) {
        self.stream_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_frames(&self, events: usize, malformed: usize) {
        self.stream_events.fetch_add(events as u64, Ordering::Relaxed);
        self.stream_malformed_frames
            .fetch_add(malformed as u64, Ordering::Relaxed);
    }

    pub fn record_server_error(&self) {
        self.stream_server_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_ignored_event(&self) {
        self.stream_ignored_events.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_decode_failures(&self, count: usize) {
        self.decode_failures.fetch_add(count as u64, Ordering::Relaxed);
    }

    pub fn record_delivered(&self) {
        self.items_delivered.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_discarded_on_shutdown(&self, count: usize) {
        self.items_discarded_on_shutdown
            .fetch_add(count as u64, Ordering::Relaxed);
    }

    pub fn record_transformed(&self, dropped_participants: usize) {
        self.transformed.fetch_add(1, Ordering::Relaxed);
        self.participants_dropped
            .fetch_add(dropped_participants as u64, Ordering::Relaxed);
    }

    pub fn record_transform_rejected(&self) {
        self.transform_rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_duplicates(&self, count: usize) {
        self.duplicates_collapsed
            .fetch_add(count as u64, Ordering::Relaxed);
    }

    pub fn record_batch_persisted(&self, report: &BatchUpsertReport) {
        self.batches_persisted.fetch_add(1, Ordering::Relaxed);
        let inserted = report.events.inserted.len() + report.participants.inserted.len();
        let skipped = report.events.skipped + report.participants.skipped;
        let rejected = report.failed_count() + report.orphaned_participants;
        self.rows_inserted.fetch_add(inserted as u64, Ordering::Relaxed);
        self.rows_skipped.fetch_add(skipped as u64, Ordering::Relaxed);
        self.rows_rejected.fetch_add(rejected as u64, Ordering::Relaxed);
    }

    pub fn record_batch_failed(&self, items: usize) {
        self.batches_failed.fetch_add(1, Ordering::Relaxed);
        self.batch_items_failed
            .fetch_add(items as u64, Ordering::Relaxed);
    }

    pub fn record_broadcast(&self, count: usize) {
        self.broadcasts.fetch_add(count as u64, Ordering::Relaxed);
    }

    pub fn record_watch_failure(&self) {
        self.watch_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_backfill_started(&self) {
        self.backfills_started.fetch_add(1, Ordering::Relaxed);
    }

    pub fn batches_persisted(&self) -> u64 {
        self.batches_persisted.load(Ordering::Relaxed)
    }

    pub fn batches_failed(&self) -> u64 {
        self.batches_failed.load(Ordering::Relaxed)
    }

    pub fn transform_rejected(&self) -> u64 {
        self.transform_rejected.load(Ordering::Relaxed)
    }

    pub fn items_delivered(&self) -> u64 {
        self.items_delivered.load(Ordering::Relaxed)
    }

    pub fn render_prometheus(&self) -> String {
        let counters: [(&str, &AtomicU64); 22] = [
            ("killfeed_stream_connects_total", &self.stream_connects),
            ("killfeed_stream_failures_total", &self.stream_failures),
            ("killfeed_stream_events_total", &self.stream_events),
            ("killfeed_stream_malformed_frames_total", &self.stream_malformed_frames),
            ("killfeed_stream_server_errors_total", &self.stream_server_errors),
            ("killfeed_stream_ignored_events_total", &self.stream_ignored_events),
            ("killfeed_decode_failures_total", &self.decode_failures),
            ("killfeed_items_delivered_total", &self.items_delivered),
            (
                "killfeed_items_discarded_on_shutdown_total",
                &self.items_discarded_on_shutdown,
            ),
            ("killfeed_transformed_total", &self.transformed),
            ("killfeed_transform_rejected_total", &self.transform_rejected),
            ("killfeed_participants_dropped_total", &self.participants_dropped),
            ("killfeed_duplicates_collapsed_total", &self.duplicates_collapsed),
            ("killfeed_batches_persisted_total", &self.batches_persisted),
            ("killfeed_batches_failed_total", &self.batches_failed),
            ("killfeed_batch_items_failed_total", &self.batch_items_failed),
            ("killfeed_rows_inserted_total", &self.rows_inserted),
            ("killfeed_rows_skipped_total", &self.rows_skipped),
            ("killfeed_rows_rejected_total", &self.rows_rejected),
            ("killfeed_broadcasts_total", &self.broadcasts),
            ("killfeed_watch_failures_total", &self.watch_failures),
            ("killfeed_backfills_started_total", &self.backfills_started),
        ];

        let mut out = String::new();
        for (name, counter) in counters {
            out.push_str(&format!(
                "# TYPE {name} counter\n{name} {}\n",
                counter.load(Ordering::Relaxed)
            ));
        }
        out
    }
}
