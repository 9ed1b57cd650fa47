use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use pixelping_server::config::{BASE_URL_ENV, ServerConfig};
use pixelping_server::delivery::DeliveryEngine;
use pixelping_server::http::{AppState, router};
use pixelping_server::recorder::EventRecorder;
use pixelping_server::registry::PixelRegistry;
use pixelping_store::EventLog;

/// Web-beacon delivery server
#[derive(Parser, Debug)]
#[command(name = "pixelping-server", version, about)]
struct Args {
    /// Address to bind the HTTP listener to
    #[arg(long, default_value = "0.0.0.0:3000")]
    bind: SocketAddr,

    /// Public base URL used when composing pixel URLs
    /// (falls back to the PIXELPING_BASE_URL environment variable)
    #[arg(long)]
    base_url: Option<String>,

    /// Directory event log partitions are written to
    #[arg(long, default_value = "./logs")]
    log_dir: PathBuf,

    /// Default log level filter
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level)),
        )
        .init();

    let mut config = ServerConfig::from_env();
    config.bind_addr = args.bind;
    config.log.base_dir = args.log_dir;
    if let Some(base) = args.base_url {
        config.public_base_url = base;
    }

    if config.public_base_url.is_empty() {
        info!(env = BASE_URL_ENV, "No public base URL configured; pixel URLs will be root-relative");
    }

    let log = Arc::new(EventLog::new(config.log.clone()).await?);
    let recorder = Arc::new(EventRecorder::new(Arc::clone(&log)));
    let registry = Arc::new(PixelRegistry::new(config.registry.clone()));
    let engine = Arc::new(DeliveryEngine::new(
        Arc::clone(&recorder),
        config.delivery.clone(),
    ));

    let state = AppState {
        registry,
        recorder,
        engine,
        public_base_url: config.public_base_url.clone(),
    };

    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    info!(addr = %config.bind_addr, "PixelPing server listening");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

/// Resolve when the process receives ctrl-c
async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        info!("Shutdown signal received");
    }
}
