//! Event-stream client.
//!
//! One control loop owns the HTTP connection, the framer buffer and the
//! queue of decoded items. States cycle through
//! `Idle -> Connecting -> Streaming -> Backoff -> Connecting`.
//!
//! Downstream credit is the free capacity of the output channel. The loop
//! only reads from the network while its queue is empty, and it only hands
//! an item over after reserving a slot, so it never delivers more than
//! downstream has room for. A connection is opened only once a slot is free.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use reqwest::header::ACCEPT;
use reqwest::{Client, Response};
use serde_json::Value;
use tokio::sync::mpsc::{self, error::SendError, Permit};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, sleep, sleep_until, Instant, Interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use backend_application::Metrics;
use backend_domain::{
    dispatch_event, BackfillRequest, Backoff, ConnectionStatus, Dispatch, EventFramer,
    StreamConfig, StreamEvent, StreamState,
};

use super::error::StreamError;
use crate::utils::current_millis;

/// Failed connection attempts a backfill run tolerates before giving up.
pub const BACKFILL_MAX_ATTEMPTS: u32 = 5;

#[derive(Debug, Clone)]
pub enum StreamMode {
    /// Unbounded live feed; reconnects forever.
    Live,
    /// Bounded historical preload; done when the server ends the stream.
    Backfill(BackfillRequest),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamExit {
    Shutdown,
    ReceiverClosed,
    BackfillComplete,
    RetriesExhausted,
}

enum SessionEnd {
    Shutdown,
    ReceiverClosed,
    Completed,
    Disconnected(StreamError),
}

enum Step<'a, C> {
    Shutdown,
    Telemetry,
    Credit(Result<Permit<'a, Value>, SendError<()>>),
    Chunk(Option<reqwest::Result<C>>),
    ReadTimeout,
}

pub struct StreamClient {
    config: StreamConfig,
    mode: StreamMode,
    http: Client,
    metrics: Arc<Metrics>,
    state: watch::Sender<StreamState>,
    framer: EventFramer,
    pending: VecDeque<Value>,
    backoff: Backoff,
    status: ConnectionStatus,
    events_this_period: u64,
    connected_since: Option<i64>,
    last_error: Option<String>,
}

impl StreamClient {
    pub fn new(
        config: StreamConfig,
        mode: StreamMode,
        metrics: Arc<Metrics>,
    ) -> Result<Self, StreamError> {
        let http = Client::builder()
            .connect_timeout(Duration::from_secs(config.connect_timeout_seconds.max(1)))
            .build()
            .map_err(StreamError::Client)?;
        let (state, _) = watch::channel(StreamState::default());
        Ok(Self {
            framer: EventFramer::new(config.max_frame_bytes),
            backoff: Backoff::from_millis(config.reconnect_floor_ms, config.reconnect_ceiling_ms),
            config,
            mode,
            http,
            metrics,
            state,
            pending: VecDeque::new(),
            status: ConnectionStatus::Disconnected,
            events_this_period: 0,
            connected_since: None,
            last_error: None,
        })
    }

    /// Receives a snapshot after every state change.
    pub fn subscribe_state(&self) -> watch::Receiver<StreamState> {
        self.state.subscribe()
    }

    pub fn spawn(
        self,
        output: mpsc::Sender<Value>,
        shutdown: watch::Receiver<bool>,
    ) -> JoinHandle<StreamExit> {
        tokio::spawn(self.run(output, shutdown))
    }

    /// Runs until shutdown, until `output` is closed, or until a backfill
    /// finishes or exhausts its attempts.
    pub async fn run(
        mut self,
        output: mpsc::Sender<Value>,
        mut shutdown: watch::Receiver<bool>,
    ) -> StreamExit {
        // consecutive failures; a successful connect starts the count over
        let mut failed_attempts = 0u32;
        loop {
            if let Err(exit) = self.flush_pending(&output, &mut shutdown).await {
                return self.stop(exit);
            }
            if let Err(exit) = wait_for_demand(&output, &mut shutdown).await {
                return self.stop(exit);
            }

            self.set_status(ConnectionStatus::Connecting);
            let connected = tokio::select! {
                biased;
                _ = wait_for_shutdown(&mut shutdown) => None,
                result = self.connect() => Some(result),
            };
            let Some(connected) = connected else {
                return self.stop(StreamExit::Shutdown);
            };

            let end = match connected {
                Ok(response) => {
                    failed_attempts = 0;
                    self.on_connected();
                    self.stream_body(response, &output, &mut shutdown).await
                }
                Err(err) => SessionEnd::Disconnected(err),
            };
            self.framer.reset();

            match end {
                SessionEnd::Shutdown => return self.stop(StreamExit::Shutdown),
                SessionEnd::ReceiverClosed => return self.stop(StreamExit::ReceiverClosed),
                SessionEnd::Completed => {
                    let exit = match self.flush_pending(&output, &mut shutdown).await {
                        Ok(()) => StreamExit::BackfillComplete,
                        Err(exit) => exit,
                    };
                    return self.stop(exit);
                }
                SessionEnd::Disconnected(err) => {
                    failed_attempts += 1;
                    let delay = self.on_disconnected(&err);
                    if matches!(self.mode, StreamMode::Backfill(_))
                        && failed_attempts >= BACKFILL_MAX_ATTEMPTS
                    {
                        return self.stop(StreamExit::RetriesExhausted);
                    }
                    let interrupted = tokio::select! {
                        biased;
                        _ = wait_for_shutdown(&mut shutdown) => true,
                        _ = sleep(delay) => false,
                    };
                    if interrupted {
                        return self.stop(StreamExit::Shutdown);
                    }
                }
            }
        }
    }

    async fn connect(&self) -> Result<Response, StreamError> {
        let mut request = self
            .http
            .get(&self.config.url)
            .header(ACCEPT, "text/event-stream");
        if let StreamMode::Backfill(backfill) = &self.mode {
            request = request.query(&[
                ("subject_id", backfill.subject_id.to_string()),
                ("preload_days", backfill.days.to_string()),
            ]);
        }
        let response = request.send().await.map_err(StreamError::Connect)?;
        let status = response.status();
        if !status.is_success() {
            return Err(StreamError::Status(status));
        }
        Ok(response)
    }

    async fn stream_body(
        &mut self,
        response: Response,
        output: &mpsc::Sender<Value>,
        shutdown: &mut watch::Receiver<bool>,
    ) -> SessionEnd {
        let mut body = Box::pin(response.bytes_stream());
        let read_timeout = self.config.read_timeout();
        let mut read_deadline = read_timeout.map(|timeout| Instant::now() + timeout);
        let (mut telemetry, telemetry_enabled) = telemetry_interval(&self.config);

        loop {
            let idle = self.pending.is_empty();
            let step = tokio::select! {
                biased;
                _ = wait_for_shutdown(shutdown) => Step::Shutdown,
                _ = telemetry.tick(), if telemetry_enabled => Step::Telemetry,
                permit = output.reserve(), if !idle => Step::Credit(permit),
                chunk = body.next(), if idle => Step::Chunk(chunk),
                _ = deadline_elapsed(read_deadline), if idle => Step::ReadTimeout,
            };

            match step {
                Step::Shutdown => return SessionEnd::Shutdown,
                Step::Telemetry => self.report_period(),
                Step::Credit(Ok(permit)) => {
                    self.deliver(permit);
                    if self.pending.is_empty() {
                        read_deadline = read_timeout.map(|timeout| Instant::now() + timeout);
                    }
                }
                Step::Credit(Err(_)) => return SessionEnd::ReceiverClosed,
                Step::Chunk(Some(Ok(chunk))) => {
                    read_deadline = read_timeout.map(|timeout| Instant::now() + timeout);
                    self.ingest_chunk(&chunk);
                }
                Step::Chunk(Some(Err(err))) => {
                    return SessionEnd::Disconnected(StreamError::Transport(err))
                }
                Step::Chunk(None) => {
                    return match self.mode {
                        StreamMode::Backfill(_) => SessionEnd::Completed,
                        StreamMode::Live => SessionEnd::Disconnected(StreamError::Closed),
                    }
                }
                Step::ReadTimeout => {
                    let timeout = read_timeout.unwrap_or_default();
                    return SessionEnd::Disconnected(StreamError::ReadTimeout(timeout));
                }
            }
        }
    }

    fn ingest_chunk(&mut self, chunk: &[u8]) {
        let frames = self.framer.feed(chunk);
        self.metrics
            .record_frames(frames.events.len(), frames.malformed);
        if frames.malformed > 0 {
            warn!(count = frames.malformed, "discarded malformed event blocks");
        }
        self.events_this_period += frames.events.len() as u64;
        for event in &frames.events {
            self.dispatch(event);
        }
        self.publish_state();
    }

    fn dispatch(&mut self, event: &StreamEvent) {
        match dispatch_event(event) {
            Dispatch::Deliver { items, rejected } => {
                if rejected > 0 {
                    warn!(rejected, "dropped non-object elements from data batch");
                    self.metrics.record_decode_failures(rejected);
                }
                self.pending.extend(items);
            }
            Dispatch::Notice(kind) => debug!(kind = kind.as_str(), "stream notice"),
            Dispatch::ServerError(message) => {
                warn!(message = %message, "stream reported an error");
                self.metrics.record_server_error();
                self.last_error = Some(message);
            }
            Dispatch::Ignored(kind) => {
                debug!(kind = kind.as_str(), "ignoring stream event");
                self.metrics.record_ignored_event();
            }
            Dispatch::DecodeFailed(err) => {
                warn!(kind = event.kind().as_str(), error = %err, "dropping undecodable payload");
                self.metrics.record_decode_failures(1);
            }
        }
    }

    async fn flush_pending(
        &mut self,
        output: &mpsc::Sender<Value>,
        shutdown: &mut watch::Receiver<bool>,
    ) -> Result<(), StreamExit> {
        while !self.pending.is_empty() {
            let permit = tokio::select! {
                biased;
                _ = wait_for_shutdown(shutdown) => return Err(StreamExit::Shutdown),
                permit = output.reserve() => permit,
            };
            let permit = permit.map_err(|_| StreamExit::ReceiverClosed)?;
            self.deliver(permit);
        }
        Ok(())
    }

    fn deliver(&mut self, permit: Permit<'_, Value>) {
        if let Some(item) = self.pending.pop_front() {
            permit.send(item);
            self.metrics.record_delivered();
        }
        self.publish_state();
    }

    fn on_connected(&mut self) {
        self.backoff.reset();
        self.connected_since = Some(current_millis());
        self.metrics.record_connect();
        info!(url = %self.config.url, source = %self.config.source_tag, "event stream connected");
        self.set_status(ConnectionStatus::Connected);
    }

    fn on_disconnected(&mut self, err: &StreamError) -> Duration {
        let delay = self.backoff.next_delay();
        self.connected_since = None;
        self.last_error = Some(err.to_string());
        self.metrics.record_connection_failure();
        warn!(
            error = %err,
            retry_in_ms = delay.as_millis() as u64,
            failures = self.backoff.failures(),
            "event stream disconnected"
        );
        self.set_status(ConnectionStatus::Disconnected);
        delay
    }

    fn report_period(&mut self) {
        info!(
            events = self.events_this_period,
            buffered = self.pending.len(),
            status = self.status.as_str(),
            "event stream telemetry"
        );
        self.events_this_period = 0;
        self.publish_state();
    }

    fn stop(mut self, exit: StreamExit) -> StreamExit {
        if !self.pending.is_empty() {
            warn!(
                count = self.pending.len(),
                "discarding undelivered items on stop"
            );
            self.metrics
                .record_discarded_on_shutdown(self.pending.len());
            self.pending.clear();
        }
        self.connected_since = None;
        self.set_status(ConnectionStatus::Disconnected);
        info!(exit = ?exit, "event stream stopped");
        exit
    }

    fn set_status(&mut self, status: ConnectionStatus) {
        self.status = status;
        self.publish_state();
    }

    fn publish_state(&self) {
        self.state.send_replace(StreamState {
            status: self.status,
            partial_frame_bytes: self.framer.buffered_len(),
            buffered_items: self.pending.len(),
            retry_delay_ms: self.backoff.current().as_millis() as u64,
            consecutive_failures: self.backoff.failures(),
            events_this_period: self.events_this_period,
            connected_since: self.connected_since,
            last_error: self.last_error.clone(),
        });
    }
}

/// Resolves once shutdown is signalled or the signal sender is gone.
async fn wait_for_shutdown(shutdown: &mut watch::Receiver<bool>) {
    while !*shutdown.borrow_and_update() {
        if shutdown.changed().await.is_err() {
            return;
        }
    }
}

/// Waits until downstream has room for at least one item.
async fn wait_for_demand(
    output: &mpsc::Sender<Value>,
    shutdown: &mut watch::Receiver<bool>,
) -> Result<(), StreamExit> {
    let permit = tokio::select! {
        biased;
        _ = wait_for_shutdown(shutdown) => return Err(StreamExit::Shutdown),
        permit = output.reserve() => permit,
    };
    permit.map(drop).map_err(|_| StreamExit::ReceiverClosed)
}

async fn deadline_elapsed(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

fn telemetry_interval(config: &StreamConfig) -> (Interval, bool) {
    let enabled = config.telemetry_period_seconds > 0;
    let period = Duration::from_secs(config.telemetry_period_seconds.max(1));
    let mut interval = interval_at(Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    (interval, enabled)
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::convert::Infallible;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use axum::body::Body;
    use axum::extract::{Query, State};
    use axum::http::StatusCode;
    use axum::response::{IntoResponse, Response as HttpResponse};
    use axum::routing::get;
    use axum::Router;
    use futures_util::stream;
    use serde_json::json;
    use tokio::sync::Mutex;
    use tokio::time::timeout;

    use crate::test_support::serve;

    fn config(url: String) -> StreamConfig {
        StreamConfig {
            url,
            source_tag: "test".to_string(),
            connect_timeout_seconds: 2,
            read_timeout_seconds: 0,
            reconnect_floor_ms: 10,
            reconnect_ceiling_ms: 40,
            max_frame_bytes: 1024 * 1024,
            telemetry_period_seconds: 0,
        }
    }

    /// A chunked body that yields each piece separately, then ends.
    fn chunked(chunks: Vec<String>) -> Body {
        let pieces = stream::unfold(chunks.into_iter(), |mut rest| async move {
            let next = rest.next()?;
            tokio::time::sleep(Duration::from_millis(5)).await;
            Some((Ok::<_, Infallible>(next), rest))
        });
        Body::from_stream(pieces)
    }

    /// A body that yields `chunks` and then stays open.
    fn chunked_then_open(chunks: Vec<String>) -> Body {
        let pieces =
            stream::iter(chunks.into_iter().map(Ok::<_, Infallible>)).chain(stream::pending());
        Body::from_stream(pieces)
    }

    fn item(event_id: i64) -> String {
        format!(
            "event-type: data-item\npayload: {{\"event_id\":{}}}\n\n",
            event_id
        )
    }

    async fn start(
        router: Router,
        mode: StreamMode,
        capacity: usize,
    ) -> (
        mpsc::Receiver<Value>,
        watch::Sender<bool>,
        watch::Receiver<StreamState>,
        Arc<Metrics>,
        JoinHandle<StreamExit>,
    ) {
        let addr = serve(router).await;
        let metrics = Arc::new(Metrics::default());
        let client = StreamClient::new(
            config(format!("http://{}/stream", addr)),
            mode,
            metrics.clone(),
        )
        .expect("client");
        let state = client.subscribe_state();
        let (tx, rx) = mpsc::channel(capacity);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = client.spawn(tx, shutdown_rx);
        (rx, shutdown_tx, state, metrics, handle)
    }

    async fn recv(rx: &mut mpsc::Receiver<Value>) -> Value {
        timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("item in time")
            .expect("channel open")
    }

    async fn eventually(mut check: impl FnMut() -> bool) {
        for _ in 0..200 {
            if check() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("condition not reached");
    }

    #[tokio::test]
    async fn delivers_events_split_mid_line_across_chunks() {
        let router = Router::new().route(
            "/stream",
            get(|| async {
                chunked_then_open(vec![
                    "event-type: connected\npayload: {}\n\n".to_string(),
                    "event-type: data-item\npay".to_string(),
                    "load: {\"event_id\":1}\n".to_string(),
                    "\n".to_string(),
                    "event-type: heartbeat\npayload: ping\n\n".to_string(),
                    "event-type: error\npayload: lagging\n\n".to_string(),
                    "event-type: surprise\npayload: {}\n\n".to_string(),
                    "event-type: data-item\npayload: {not json\n\n".to_string(),
                    "event-type: data-batch\npayload: [{\"event_id\":2},3,{\"event_id\":4}]\n\n"
                        .to_string(),
                ])
            }),
        );
        let (mut rx, shutdown, state, metrics, handle) = start(router, StreamMode::Live, 16).await;

        let ids = [
            recv(&mut rx).await,
            recv(&mut rx).await,
            recv(&mut rx).await,
        ]
        .iter()
        .map(|item| item["event_id"].as_i64().expect("id"))
        .collect::<Vec<_>>();
        assert_eq!(ids, vec![1, 2, 4]);
        assert_eq!(state.borrow().status, ConnectionStatus::Connected);
        assert_eq!(state.borrow().last_error.as_deref(), Some("lagging"));
        assert!(metrics
            .render_prometheus()
            .contains("killfeed_decode_failures_total 2"));

        shutdown.send(true).expect("signal");
        let exit = timeout(Duration::from_secs(2), handle)
            .await
            .expect("stops")
            .expect("task");
        assert_eq!(exit, StreamExit::Shutdown);
        assert_eq!(state.borrow().status, ConnectionStatus::Disconnected);
    }

    #[tokio::test]
    async fn never_delivers_beyond_downstream_capacity() {
        let router = Router::new().route(
            "/stream",
            get(|| async {
                let batch = (1..=10)
                    .map(|id| json!({ "event_id": id }))
                    .collect::<Vec<_>>();
                chunked_then_open(vec![format!(
                    "event-type: data-batch\npayload: {}\n\n",
                    Value::Array(batch)
                )])
            }),
        );
        let (mut rx, shutdown, state, metrics, handle) = start(router, StreamMode::Live, 2).await;

        eventually(|| state.borrow().buffered_items == 8).await;
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(metrics.items_delivered(), 2);

        for expected in 1..=3 {
            assert_eq!(recv(&mut rx).await["event_id"], expected);
        }
        eventually(|| metrics.items_delivered() == 5).await;
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(metrics.items_delivered(), 5);
        assert_eq!(state.borrow().buffered_items, 5);

        shutdown.send(true).expect("signal");
        let exit = timeout(Duration::from_secs(2), handle)
            .await
            .expect("stops")
            .expect("task");
        assert_eq!(exit, StreamExit::Shutdown);
        assert!(metrics
            .render_prometheus()
            .contains("killfeed_items_discarded_on_shutdown_total 5"));
        assert_eq!(
            rx.recv().await.map(|item| item["event_id"].clone()),
            Some(json!(4))
        );
    }

    #[tokio::test]
    async fn reconnects_after_failure_and_resets_backoff() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let router = Router::new()
            .route(
                "/stream",
                get(|State(attempts): State<Arc<AtomicUsize>>| async move {
                    match attempts.fetch_add(1, Ordering::SeqCst) {
                        0 | 1 => StatusCode::SERVICE_UNAVAILABLE.into_response(),
                        _ => HttpResponse::new(chunked_then_open(vec![item(7)])),
                    }
                }),
            )
            .with_state(attempts.clone());
        let (mut rx, shutdown, state, metrics, handle) = start(router, StreamMode::Live, 4).await;

        assert_eq!(recv(&mut rx).await["event_id"], 7);
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
        {
            let snapshot = state.borrow();
            assert_eq!(snapshot.status, ConnectionStatus::Connected);
            assert_eq!(snapshot.consecutive_failures, 0);
            assert_eq!(snapshot.retry_delay_ms, 10);
            assert!(snapshot.connected_since.is_some());
        }
        let rendered = metrics.render_prometheus();
        assert!(rendered.contains("killfeed_stream_failures_total 2"));
        assert!(rendered.contains("killfeed_stream_connects_total 1"));

        shutdown.send(true).expect("signal");
        assert_eq!(handle.await.expect("task"), StreamExit::Shutdown);
    }

    #[tokio::test]
    async fn live_stream_reconnects_when_server_closes() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let router = Router::new()
            .route(
                "/stream",
                get(|State(attempts): State<Arc<AtomicUsize>>| async move {
                    let attempt = attempts.fetch_add(1, Ordering::SeqCst) as i64;
                    chunked(vec![item(attempt + 1)])
                }),
            )
            .with_state(attempts.clone());
        let (mut rx, shutdown, _state, _metrics, handle) = start(router, StreamMode::Live, 4).await;

        assert_eq!(recv(&mut rx).await["event_id"], 1);
        assert_eq!(recv(&mut rx).await["event_id"], 2);

        shutdown.send(true).expect("signal");
        assert_eq!(handle.await.expect("task"), StreamExit::Shutdown);
    }

    #[tokio::test]
    async fn backfill_requests_lookback_and_finishes_on_clean_end() {
        let seen = Arc::new(Mutex::new(HashMap::<String, String>::new()));
        let router = Router::new()
            .route(
                "/stream",
                get(
                    |State(seen): State<Arc<Mutex<HashMap<String, String>>>>,
                     Query(params): Query<HashMap<String, String>>| async move {
                        *seen.lock().await = params;
                        chunked(vec![item(11), item(12)])
                    },
                ),
            )
            .with_state(seen.clone());
        let request = BackfillRequest {
            subject_id: 42,
            days: 3,
        };
        let (mut rx, _shutdown, _state, _metrics, handle) =
            start(router, StreamMode::Backfill(request), 1).await;

        assert_eq!(recv(&mut rx).await["event_id"], 11);
        assert_eq!(recv(&mut rx).await["event_id"], 12);
        let exit = timeout(Duration::from_secs(2), handle)
            .await
            .expect("finishes")
            .expect("task");
        assert_eq!(exit, StreamExit::BackfillComplete);

        let params = seen.lock().await.clone();
        assert_eq!(params.get("subject_id").map(String::as_str), Some("42"));
        assert_eq!(params.get("preload_days").map(String::as_str), Some("3"));
    }

    #[tokio::test]
    async fn backfill_gives_up_after_bounded_attempts() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let router = Router::new()
            .route(
                "/stream",
                get(|State(attempts): State<Arc<AtomicUsize>>| async move {
                    attempts.fetch_add(1, Ordering::SeqCst);
                    StatusCode::INTERNAL_SERVER_ERROR
                }),
            )
            .with_state(attempts.clone());
        let request = BackfillRequest {
            subject_id: 1,
            days: 1,
        };
        let (_rx, _shutdown, _state, _metrics, handle) =
            start(router, StreamMode::Backfill(request), 1).await;

        let exit = timeout(Duration::from_secs(5), handle)
            .await
            .expect("gives up")
            .expect("task");
        assert_eq!(exit, StreamExit::RetriesExhausted);
        assert_eq!(
            attempts.load(Ordering::SeqCst),
            BACKFILL_MAX_ATTEMPTS as usize
        );
    }

    #[tokio::test]
    async fn backfill_survives_interruptions_separated_by_good_connections() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let router = Router::new()
            .route(
                "/stream",
                get(|State(attempts): State<Arc<AtomicUsize>>| async move {
                    let attempt = attempts.fetch_add(1, Ordering::SeqCst) + 1;
                    if attempt > BACKFILL_MAX_ATTEMPTS as usize + 1 {
                        return chunked(vec![item(100)]);
                    }
                    let broken = stream::iter(vec![
                        Ok(item(attempt as i64)),
                        Err(std::io::Error::new(
                            std::io::ErrorKind::Other,
                            "upstream reset",
                        )),
                    ]);
                    Body::from_stream(broken)
                }),
            )
            .with_state(attempts.clone());
        let request = BackfillRequest {
            subject_id: 7,
            days: 1,
        };
        let (mut rx, _shutdown, _state, _metrics, handle) =
            start(router, StreamMode::Backfill(request), 16).await;

        let exit = timeout(Duration::from_secs(5), handle)
            .await
            .expect("finishes")
            .expect("task");
        assert_eq!(exit, StreamExit::BackfillComplete);
        assert_eq!(
            attempts.load(Ordering::SeqCst),
            BACKFILL_MAX_ATTEMPTS as usize + 2
        );
        let mut last = 0;
        while let Ok(value) = rx.try_recv() {
            last = value["event_id"].as_i64().expect("id");
        }
        assert_eq!(last, 100);
    }

    #[tokio::test]
    async fn read_timeout_forces_reconnect() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let router = Router::new()
            .route(
                "/stream",
                get(|State(attempts): State<Arc<AtomicUsize>>| async move {
                    attempts.fetch_add(1, Ordering::SeqCst);
                    chunked_then_open(vec![])
                }),
            )
            .with_state(attempts.clone());
        let addr = serve(router).await;
        let metrics = Arc::new(Metrics::default());
        let mut config = config(format!("http://{}/stream", addr));
        config.read_timeout_seconds = 1;
        let client = StreamClient::new(config, StreamMode::Live, metrics).expect("client");
        let state = client.subscribe_state();
        let (tx, _rx) = mpsc::channel(1);
        let (shutdown, shutdown_rx) = watch::channel(false);
        let handle = client.spawn(tx, shutdown_rx);

        tokio::time::sleep(Duration::from_millis(2_500)).await;
        assert!(attempts.load(Ordering::SeqCst) >= 2);
        assert!(state
            .borrow()
            .last_error
            .as_deref()
            .is_some_and(|error| error.starts_with("no data received")));

        shutdown.send(true).expect("signal");
        assert_eq!(handle.await.expect("task"), StreamExit::Shutdown);
    }

    #[tokio::test]
    async fn stops_when_receiver_is_dropped() {
        let router = Router::new().route(
            "/stream",
            get(|| async { chunked_then_open(vec![item(1)]) }),
        );
        let (rx, _shutdown, _state, _metrics, handle) = start(router, StreamMode::Live, 1).await;
        drop(rx);

        let exit = timeout(Duration::from_secs(2), handle)
            .await
            .expect("stops")
            .expect("task");
        assert_eq!(exit, StreamExit::ReceiverClosed);
    }
}
