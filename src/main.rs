use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use clap::Parser;
use clap_serde_derive::ClapSerde;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::api::health::handle_ping;
use crate::api::invocations::handle_invocation;
use crate::config::Config;
use crate::inference::demucs::DemucsRunner;
use crate::storage::s3::S3ObjectStore;
use crate::storage::ObjectStore;
use crate::telemetry::{init_telemetry, shutdown_telemetry};

mod api;
mod config;
mod error;
mod inference;
mod storage;
mod telemetry;

#[cfg(unix)]
#[global_allocator]
static GLOBAL: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

const DEFAULT_CONFIG_FILE: &str = "DemucsRunner.toml";

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the configuration file
    #[arg(short, long, env, default_value = DEFAULT_CONFIG_FILE)]
    config_file: String,

    /// Configuration options
    #[command(flatten)]
    pub opt_config: <Config as ClapSerde>::Opt,
}

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) store: Arc<dyn ObjectStore>,
    pub(crate) runner: Arc<DemucsRunner>,
    pub(crate) scratch_dir: Arc<PathBuf>,
}

impl AppState {
    pub(crate) fn new(store: Arc<dyn ObjectStore>, runner: DemucsRunner, scratch_dir: PathBuf) -> Self {
        AppState {
            store,
            runner: Arc::new(runner),
            scratch_dir: Arc::new(scratch_dir),
        }
    }
}

pub(crate) fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/ping", get(handle_ping))
        .route(
            "/invocations",
            // 1 MB limit, the body only carries locations
            post(handle_invocation).layer(DefaultBodyLimit::max(1_000_000)),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = Config::load(&args.config_file, args.config_file == DEFAULT_CONFIG_FILE)?
        .merge(args.opt_config);

    let telemetry = init_telemetry(&config.otlp_endpoint, config.console)?;

    let runner = DemucsRunner::from_config(&config)?;
    let store = S3ObjectStore::from_env().await;
    let state = AppState::new(Arc::new(store), runner, PathBuf::from(&config.scratch_dir));

    let listener = TcpListener::bind(format!("{}:{}", config.address, config.port))
        .await
        .with_context(|| format!("Failed to bind {}:{}", config.address, config.port))?;
    info!("Listening on {}", listener.local_addr()?);
    info!(
        "Demucs: {} (model {}, two stems {}, timeout {}s), scratch dir {}",
        config.demucs_command,
        config.model,
        config.two_stems,
        config.tool_timeout_secs,
        config.scratch_dir
    );

    axum::serve(listener, build_router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tokio::task::spawn_blocking(move || shutdown_telemetry(telemetry)).await?;
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for shutdown signal: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {}", e);
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
    info!("Shutting down...");
}
