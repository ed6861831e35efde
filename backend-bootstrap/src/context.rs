use std::sync::Arc;

use anyhow::Result;
use serde_json::Value;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::info;

use backend_application::ops::KillmailStreamHub;
use backend_application::pipeline::{spawn_pipeline, FanoutNotifier, PipelineContext, PipelineSummary};
use backend_application::{AppState, Metrics};
use backend_domain::ports::{KillmailRepository, WatchEvaluator};
use backend_infrastructure::{
    AppConfig, ClickhouseRepo, InMemoryKillmailRepo, NoopWatchEvaluator, StreamBackfillService,
    StreamClient, StreamMode, WebhookWatchEvaluator,
};

/// Everything wired together but not yet running, except the pipeline
/// workers, which idle until the stream client feeds them.
pub struct AppContext {
    pub state: AppState,
    pub stream_client: StreamClient,
    pub pipeline_input: mpsc::Sender<Value>,
    pub pipeline: JoinHandle<PipelineSummary>,
    pub shutdown: watch::Sender<bool>,
}

impl AppContext {
    pub async fn new(config: AppConfig) -> Result<Self> {
        let runtime_config = config.to_runtime_config();
        let pipeline_config = config.to_pipeline_config();
        let stream_config = config.to_stream_config();
        let db_config = config.to_db_config();

        info!(
            storage_backend = %db_config.storage_backend,
            clickhouse_url = %db_config.clickhouse_url,
            clickhouse_database = %db_config.clickhouse_database,
            clickhouse_user = %db_config.clickhouse_user.as_deref().unwrap_or("<default>"),
            clickhouse_password_set = db_config.clickhouse_password.is_some(),
            stream_url = %stream_config.url,
            "storage and stream configuration"
        );

        let killmail_repo: Arc<dyn KillmailRepository> =
            match db_config.storage_backend.as_str() {
                "memory" => Arc::new(InMemoryKillmailRepo::new()),
                _ => Arc::new(ClickhouseRepo::from_config(&db_config)),
            };
        killmail_repo.ensure_schema().await?;

        let metrics = Arc::new(Metrics::default());
        let stream_hub = Arc::new(KillmailStreamHub::new(runtime_config.broadcast_buffer));
        let watch_evaluator: Arc<dyn WatchEvaluator> =
            match WebhookWatchEvaluator::from_config(&runtime_config)? {
                Some(evaluator) => Arc::new(evaluator),
                None => Arc::new(NoopWatchEvaluator),
            };
        let notifier = FanoutNotifier::new(stream_hub.clone(), watch_evaluator, metrics.clone());

        let (pipeline_input, pipeline) = spawn_pipeline(PipelineContext {
            config: pipeline_config,
            source_tag: stream_config.source_tag.clone(),
            killmail_repo: killmail_repo.clone(),
            notifier,
            metrics: metrics.clone(),
        });

        let (shutdown, shutdown_rx) = watch::channel(false);
        let stream_client =
            StreamClient::new(stream_config.clone(), StreamMode::Live, metrics.clone())?;
        let backfill_service = Arc::new(StreamBackfillService::new(
            stream_config,
            &pipeline_input,
            metrics.clone(),
            shutdown_rx,
        ));

        let state = AppState {
            config: runtime_config,
            killmail_repo,
            stream_hub,
            backfill_service,
            metrics,
            stream_state: stream_client.subscribe_state(),
        };

        Ok(Self {
            state,
            stream_client,
            pipeline_input,
            pipeline,
            shutdown,
        })
    }
}
