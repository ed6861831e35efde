use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;

use backend_domain::ports::WatchEvaluator;
use backend_domain::RuntimeConfig;

/// Forwards each persisted killmail to an external watch service, which
/// owns the user-defined criteria.
pub struct WebhookWatchEvaluator {
    client: Client,
    url: String,
}

impl WebhookWatchEvaluator {
    pub fn new(url: String, timeout: Duration) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { client, url })
    }

    /// `None` when no webhook is configured.
    pub fn from_config(config: &RuntimeConfig) -> Result<Option<Self>> {
        match &config.watch_webhook_url {
            Some(url) => Ok(Some(Self::new(
                url.clone(),
                Duration::from_secs(config.watch_timeout_seconds.max(1)),
            )?)),
            None => Ok(None),
        }
    }
}

#[async_trait]
impl WatchEvaluator for WebhookWatchEvaluator {
    async fn evaluate(&self, payload: &Value) -> Result<()> {
        self.client
            .post(&self.url)
            .json(payload)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoopWatchEvaluator;

#[async_trait]
impl WatchEvaluator for NoopWatchEvaluator {
    async fn evaluate(&self, _payload: &Value) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use axum::extract::State;
    use axum::http::StatusCode;
    use axum::routing::post;
    use axum::{Json, Router};
    use serde_json::json;
    use tokio::sync::Mutex;

    use crate::test_support::serve;

    async fn watch_url(router: Router) -> String {
        format!("http://{}/watch", serve(router).await)
    }

    #[tokio::test]
    async fn posts_payload_to_webhook() {
        let received = Arc::new(Mutex::new(Vec::<Value>::new()));
        let router =
            Router::new()
                .route(
                    "/watch",
                    post(
                        |State(received): State<Arc<Mutex<Vec<Value>>>>,
                         Json(body): Json<Value>| async move {
                            received.lock().await.push(body);
                            StatusCode::NO_CONTENT
                        },
                    ),
                )
                .with_state(received.clone());
        let url = watch_url(router).await;

        let evaluator = WebhookWatchEvaluator::new(url, Duration::from_secs(2)).expect("client");
        evaluator
            .evaluate(&json!({"killmail_id": 7}))
            .await
            .expect("delivered");
        assert_eq!(
            received.lock().await.as_slice(),
            &[json!({"killmail_id": 7})]
        );
    }

    #[tokio::test]
    async fn error_status_is_reported() {
        let router = Router::new().route("/watch", post(|| async { StatusCode::BAD_GATEWAY }));
        let url = watch_url(router).await;

        let evaluator = WebhookWatchEvaluator::new(url, Duration::from_secs(2)).expect("client");
        assert!(evaluator.evaluate(&json!({})).await.is_err());
    }
}
