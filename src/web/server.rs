//! HTTP server implementation

use axum::{
    routing::{get, post},
    Router,
};
use anyhow::Context;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tracing::info;

use super::handlers::{execute_command, stats_handler, AppState};
use crate::dispatch::Dispatcher;

/// Routes of the HTTP surface
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/command", post(execute_command))
        .route("/stats", get(stats_handler))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Run the web server until `shutdown` is cancelled
pub async fn run_web_server(
    addr: &str,
    dispatcher: Arc<Mutex<Dispatcher>>,
    shutdown: CancellationToken,
) -> anyhow::Result<()> {
    let client = dispatcher.lock().await.connect();
    let app = router(AppState { dispatcher, client });

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    info!("Web interface available at http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
        .context("web server failed")?;

    Ok(())
}
