//! motility-server - Microscopy video analysis service
//!
//! Accepts video uploads, runs the selected analysis worker, normalizes the
//! annotated video for streaming and serves every session artifact over HTTP.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use motility_common::config::{
    load_toml_config, resolve_root_folder, StorageConfig, WorkerConfig, DEFAULT_HOST, DEFAULT_PORT,
};
use tokio::signal;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use motility_server::services::ProcessRunner;
use motility_server::{build_router, AppState};

/// Command-line arguments for motility-server
#[derive(Parser, Debug)]
#[command(name = "motility-server")]
#[command(about = "Video analysis pipeline and session file server")]
#[command(version)]
struct Args {
    /// Explicit config file
    #[arg(short, long, env = "MOTILITY_CONFIG")]
    config: Option<PathBuf>,

    /// Root folder holding uploads/ and sessions/
    #[arg(short, long, env = "MOTILITY_ROOT_FOLDER")]
    root_folder: Option<PathBuf>,

    /// Address to bind
    #[arg(long)]
    host: Option<String>,

    /// Port to listen on
    #[arg(short, long, env = "MOTILITY_PORT")]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = load_toml_config(args.config.as_deref()).context("Failed to load config")?;

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!("motility_server={0},motility_common={0},tower_http=info", config.logging.level)
                    .into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!(
        "Starting motility-server v{} [{}] built {} ({})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_PROFILE")
    );

    let root_folder = resolve_root_folder(args.root_folder.as_deref(), &config);
    let storage = StorageConfig::from_root(&root_folder, &config.storage);
    storage
        .ensure_directories()
        .context("Failed to initialize root folder")?;
    info!("Root folder: {}", root_folder.display());

    let workers = WorkerConfig::from(&config.workers);
    info!(
        interpreter = %workers.interpreter,
        scripts_dir = %workers.scripts_dir.display(),
        transcoder = %workers.transcoder,
        max_concurrent_jobs = workers.max_concurrent_jobs,
        timeout_secs = workers.timeout.map(|t| t.as_secs()).unwrap_or(0),
        "Worker configuration"
    );

    let runner = Arc::new(ProcessRunner::new(workers.max_concurrent_jobs));
    let state = AppState::new(Arc::new(storage), Arc::new(workers), runner);
    let app = build_router(state);

    let host = args
        .host
        .or(config.host)
        .unwrap_or_else(|| DEFAULT_HOST.to_string());
    let port = args.port.or(config.port).unwrap_or(DEFAULT_PORT);
    let addr: SocketAddr = format!("{}:{}", host, port)
        .parse()
        .with_context(|| format!("Invalid listen address {}:{}", host, port))?;

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;
    info!("Listening on http://{}", addr);
    info!("Health check: http://{}/health", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
