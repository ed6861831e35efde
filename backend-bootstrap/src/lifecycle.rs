use anyhow::Result;
use axum::Router;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tower_http::cors::CorsLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use backend_application::AppState;
use backend_infrastructure::AppConfig;
use backend_interfaces_http::build_router;

use crate::context::AppContext;

fn build_router_with_layers(state: AppState) -> Router {
    build_router(state.clone())
        .layer(CorsLayer::permissive())
        .layer(RequestBodyLimitLayer::new(
            usize::try_from(state.config.max_body_bytes).unwrap_or(usize::MAX),
        ))
        .layer(TimeoutLayer::new(std::time::Duration::from_secs(
            state.config.request_timeout_seconds,
        )))
        .layer(TraceLayer::new_for_http())
}

/// Runs until ctrl-c or SIGTERM. Shutdown order: stop the stream client,
/// let the pipeline drain every accepted item, then stop the HTTP server.
pub async fn run_standalone() -> Result<()> {
    let config = AppConfig::load().await?;
    let AppContext {
        state,
        stream_client,
        pipeline_input,
        pipeline,
        shutdown,
    } = AppContext::new(config).await?;

    let app = build_router_with_layers(state.clone());
    let addr: std::net::SocketAddr = state.config.bind_addr.parse()?;
    let listener = TcpListener::bind(addr).await?;
    info!("listening on {}", addr);

    let (server_stop_tx, server_stop_rx) = oneshot::channel::<()>();
    let mut server = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = server_stop_rx.await;
            })
            .await
    });

    // The live client owns the only strong input sender from here on.
    let stream = stream_client.spawn(pipeline_input, shutdown.subscribe());

    tokio::select! {
        _ = shutdown_signal() => info!("shutdown requested"),
        result = &mut server => {
            let _ = shutdown.send(true);
            result??;
            warn!("http server exited unexpectedly");
            return Ok(());
        }
    }

    let _ = shutdown.send(true);
    match stream.await {
        Ok(exit) => info!(exit = ?exit, "event stream closed"),
        Err(err) => error!(error = %err, "event stream task aborted"),
    }
    match pipeline.await {
        Ok(summary) => info!(
            transformed = summary.transformed,
            batches_persisted = summary.batches_persisted,
            batches_failed = summary.batches_failed,
            "pipeline drained"
        ),
        Err(err) => error!(error = %err, "pipeline task aborted"),
    }

    let _ = server_stop_tx.send(());
    server.await??;
    info!("shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(err) => {
                warn!(error = %err, "sigterm handler unavailable");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
