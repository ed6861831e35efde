use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Response};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::Value;
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{debug, warn};

use backend_application::ops::{location_topic, ALL_TOPIC};
use backend_application::AppState;

use crate::error::HttpError;
use crate::middleware::authorize;

#[derive(Debug, Deserialize)]
pub struct KillmailStreamQuery {
    pub location_id: Option<i64>,
}

pub fn resolve_topic(query: &KillmailStreamQuery) -> String {
    match query.location_id {
        Some(location_id) => location_topic(location_id),
        None => ALL_TOPIC.to_string(),
    }
}

/// Upgrades to a WebSocket that receives every newly persisted killmail,
/// optionally narrowed to one location.
pub async fn subscribe_killmails(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<KillmailStreamQuery>,
    ws: WebSocketUpgrade,
) -> Response {
    if !authorize(&state.config, &headers) {
        return HttpError::Unauthorized.into_response();
    }
    let topic = resolve_topic(&query);
    let hub = state.stream_hub.clone();
    let receiver = hub.subscribe(&topic).await;
    ws.on_upgrade(move |socket| async move {
        forward_killmails(socket, receiver, &topic).await;
        hub.prune().await;
    })
}

async fn forward_killmails(
    socket: WebSocket,
    mut receiver: broadcast::Receiver<Arc<Value>>,
    topic: &str,
) {
    let (mut sink, mut incoming) = socket.split();
    debug!(topic = %topic, "killmail subscriber attached");
    loop {
        tokio::select! {
            message = receiver.recv() => match message {
                Ok(payload) => {
                    if sink.send(Message::Text(payload.to_string())).await.is_err() {
                        break;
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(topic = %topic, skipped, "killmail subscriber lagging");
                }
                Err(RecvError::Closed) => break,
            },
            frame = incoming.next() => match frame {
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                Some(Ok(_)) => {}
            },
        }
    }
    drop(receiver);
    debug!(topic = %topic, "killmail subscriber detached");
}
