use std::sync::Arc;

use backend_domain::ports::{BackfillService, KillmailRepository};
use backend_domain::{RuntimeConfig, StreamState};
use tokio::sync::watch;

use crate::ops::KillmailStreamHub;
use crate::Metrics;

#[derive(Clone)]
pub struct AppState {
    pub config: RuntimeConfig,
    pub killmail_repo: Arc<dyn KillmailRepository>,
    pub stream_hub: Arc<KillmailStreamHub>,
    pub backfill_service: Arc<dyn BackfillService>,
    pub metrics: Arc<Metrics>,
    pub stream_state: watch::Receiver<StreamState>,
}
