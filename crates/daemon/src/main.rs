//! PhotoSync daemon entry point.
//!
//! Loads configuration, builds the remote client and sync engine, starts
//! the scheduler, and handles graceful shutdown.

mod scheduler;
mod signals;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use photosync_core::config::AppConfig;
use photosync_core::library::PhotoLibrary;
use photosync_core::remote::{CloudClient, RemoteLibrary};
use photosync_core::sync_engine::SyncEngine;

// ---------------------------------------------------------------------------
// CLI arguments
// ---------------------------------------------------------------------------

/// PhotoSync synchronization daemon.
#[derive(Parser, Debug)]
#[command(
    name = "photosync-daemon",
    version,
    about = "Periodically mirror a remote photo library to local disk"
)]
struct Args {
    /// Path to the TOML configuration file.
    #[arg(short, long)]
    config: PathBuf,

    /// Override the log level from the config file (trace, debug, info, warn, error).
    #[arg(long)]
    log_level: Option<String>,
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config =
        AppConfig::load_and_resolve(&args.config).context("failed to load configuration")?;

    // Initialize tracing
    let log_level = args
        .log_level
        .as_deref()
        .unwrap_or(&config.daemon.log_level);
    let filter = EnvFilter::try_new(log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .init();

    // Startup banner
    info!("========================================");
    info!("  PhotoSync Daemon v{}", env!("CARGO_PKG_VERSION"));
    info!("========================================");
    info!("Config file   : {}", args.config.display());
    info!("Remote        : {}", config.remote.base_url);
    info!("Account       : {}", config.remote.username);
    info!("Data dir      : {}", config.library.data_dir.display());
    info!("Poll interval : {}s", config.daemon.poll_interval_secs);
    info!("Downloads     : {} concurrent", config.sync.download_threads);
    info!("Log level     : {}", log_level);
    info!("========================================");

    let password = config.remote.password.clone().with_context(|| {
        format!(
            "remote password not available; set the '{}' environment variable",
            config.remote.password_env
        )
    })?;

    // Establish the remote session up front so credential problems surface
    // at startup, not at the first scheduled run.
    let client = CloudClient::new(&config.remote.base_url, &config.remote.username, password);
    client
        .refresh_session()
        .await
        .context("failed to establish a remote session")?;
    info!("remote session established");

    let library =
        PhotoLibrary::open(&config.library.data_dir).context("failed to open the local library")?;
    info!("local library opened");

    let engine = Arc::new(SyncEngine::new(&config.sync, client, library));
    info!("sync engine initialized");

    // Forward the engine's progress stream into the log.
    let mut events = engine.subscribe();
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => {
                    let json = serde_json::to_string(&event).unwrap_or_default();
                    debug!(event = %json, "sync progress");
                }
                Err(tokio::sync::broadcast::error::RecvError::Lagged(missed)) => {
                    warn!(missed, "progress stream lagged");
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    });

    // Create a shutdown notify for cooperative cancellation
    let shutdown = Arc::new(tokio::sync::Notify::new());
    let scheduler_shutdown = shutdown.clone();

    let poll_interval = std::time::Duration::from_secs(config.daemon.poll_interval_secs);
    let mut sched = scheduler::Scheduler::new(engine.clone(), poll_interval);

    let scheduler_handle = tokio::spawn(async move {
        sched.run(scheduler_shutdown).await;
    });

    // Wait for shutdown signal
    signals::wait_for_shutdown().await;

    info!("Shutdown signal received, stopping...");
    shutdown.notify_waiters();

    // Wait for the scheduler to finish its current run (up to 30s; a run in
    // the middle of the write phase is left to complete its atomic step).
    match tokio::time::timeout(std::time::Duration::from_secs(30), scheduler_handle).await {
        Ok(Ok(())) => info!("scheduler stopped gracefully"),
        Ok(Err(e)) => warn!("scheduler task error: {}", e),
        Err(_) => warn!("scheduler did not stop within 30s, forcing shutdown"),
    }

    info!("PhotoSync daemon stopped.");
    Ok(())
}
