//! Server module
//!
//! Accepts TCP connections and hands each one to a [`Connection`] task.
//! All connections share one dispatcher behind a mutex.

mod connection;

pub use connection::Connection;

use crate::config::Config;
use crate::dispatch::Dispatcher;
use anyhow::Context;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

/// How often expired keys are purged proactively
const EXPIRE_INTERVAL: Duration = Duration::from_millis(100);

/// Expired keys removed per database per cycle
const EXPIRE_BATCH: usize = 20;

/// Per-connection resource limits
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConnectionLimits {
    /// Unparsed input a client may have buffered before it is disconnected
    pub max_query_buffer: usize,
}

impl ConnectionLimits {
    pub fn from_config(config: &Config) -> Self {
        ConnectionLimits {
            max_query_buffer: config.max_query_buffer,
        }
    }
}

impl Default for ConnectionLimits {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

/// Bind `config.bind` and serve until `shutdown` is cancelled
pub async fn run(
    config: &Config,
    dispatcher: Arc<Mutex<Dispatcher>>,
    shutdown: CancellationToken,
) -> anyhow::Result<()> {
    let listener = TcpListener::bind(&config.bind)
        .await
        .with_context(|| format!("failed to bind {}", config.bind))?;
    info!("RESP server listening on {}", config.bind);
    serve(listener, dispatcher, ConnectionLimits::from_config(config), shutdown).await
}

/// Serve connections from an already bound listener
pub async fn serve(
    listener: TcpListener,
    dispatcher: Arc<Mutex<Dispatcher>>,
    limits: ConnectionLimits,
    shutdown: CancellationToken,
) -> anyhow::Result<()> {
    tokio::spawn(expire_loop(dispatcher.clone(), shutdown.clone()));

    loop {
        let (socket, addr) = tokio::select! {
            _ = shutdown.cancelled() => {
                info!("RESP server shutting down");
                return Ok(());
            }
            accepted = listener.accept() => accepted.context("accept failed")?,
        };

        let client = dispatcher.lock().await.connect();
        info!("New RESP connection from {} (client {})", addr, client.id);

        let dispatcher = dispatcher.clone();
        let cancel = shutdown.child_token();

        tokio::spawn(async move {
            let mut connection = Connection::new(socket, client, limits, cancel);

            if let Err(e) = connection.handle(&dispatcher).await {
                error!("Connection error from {}: {}", addr, e);
            }

            info!("Connection closed: {}", addr);
        });
    }
}

async fn expire_loop(dispatcher: Arc<Mutex<Dispatcher>>, shutdown: CancellationToken) {
    let mut ticker = tokio::time::interval(EXPIRE_INTERVAL);
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => return,
            _ = ticker.tick() => {
                let purged = dispatcher.lock().await.expire_cycle(EXPIRE_BATCH);
                if purged > 0 {
                    debug!("expire cycle removed {} key(s)", purged);
                }
            }
        }
    }
}
