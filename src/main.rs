use anyhow::Context;
use cinderkv::{server, web, Config, Dispatcher};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

fn main() -> anyhow::Result<()> {
    let config = Config::load()?;

    // RUST_LOG wins over the configured level
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_level))
        .context("invalid log_level")?;
    tracing_subscriber::fmt().with_env_filter(filter).init();

    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(config.worker_threads)
        .enable_all()
        .build()
        .context("failed to start the tokio runtime")?
        .block_on(run(config))
}

async fn run(config: Config) -> anyhow::Result<()> {
    info!(
        "cinderkv {} starting with {} databases",
        env!("CARGO_PKG_VERSION"),
        config.databases
    );

    let dispatcher = Arc::new(Mutex::new(Dispatcher::new(&config)));
    let shutdown = CancellationToken::new();

    let ctrl_c = shutdown.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("failed to listen for ctrl-c: {}", e);
            return;
        }
        info!("ctrl-c received, shutting down");
        ctrl_c.cancel();
    });

    let web_handle = config.web_addr.clone().map(|addr| {
        let dispatcher = dispatcher.clone();
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            if let Err(e) = web::run_web_server(&addr, dispatcher, shutdown).await {
                error!("Web server error: {:#}", e);
            }
        })
    });

    let result = server::run(&config, dispatcher, shutdown.clone()).await;
    shutdown.cancel();

    if let Some(handle) = web_handle {
        let _ = handle.await;
    }
    result
}
