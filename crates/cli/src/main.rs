//! PhotoSync command-line management tool.
//!
//! Provides subcommands for running a one-shot sync, inspecting the local
//! library, and generating / validating configuration files.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use photosync_core::config::AppConfig;
use photosync_core::errors::SyncError;
use photosync_core::library::PhotoLibrary;
use photosync_core::models::AlbumKind;
use photosync_core::remote::{CloudClient, RemoteLibrary};
use photosync_core::sync_engine::SyncEngine;

/// Exit code for a run that gave up after exhausting its retry budget.
const EXIT_RETRIES_EXHAUSTED: u8 = 2;

// ---------------------------------------------------------------------------
// CLI argument definitions
// ---------------------------------------------------------------------------

/// PhotoSync command-line management tool.
#[derive(Parser, Debug)]
#[command(
    name = "photosync",
    version,
    about = "Mirror a remote photo library into a local directory tree"
)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(
        short,
        long,
        global = true,
        default_value = "/etc/photosync/config.toml"
    )]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run one full sync against the remote library.
    Sync,

    /// Show what the local library currently holds.
    Status,

    /// Generate a default configuration file.
    Init {
        /// Output path for the generated config file.
        #[arg(short, long, default_value = "./photosync.toml")]
        output: PathBuf,
    },

    /// Validate a configuration file.
    Validate,
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> ExitCode {
    // Minimal logging for CLI use; RUST_LOG still overrides.
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Sync => cmd_sync(&cli.config).await,
        Commands::Status => report_exit(cmd_status(&cli.config)),
        Commands::Init { output } => report_exit(cmd_init(&output)),
        Commands::Validate => report_exit(cmd_validate(&cli.config)),
    }
}

fn report_exit(result: Result<()>) -> ExitCode {
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

// ---------------------------------------------------------------------------
// sync
// ---------------------------------------------------------------------------

async fn cmd_sync(config_path: &PathBuf) -> ExitCode {
    let engine = match build_engine(config_path).await {
        Ok(engine) => engine,
        Err(e) => {
            eprintln!("error: {e:#}");
            return ExitCode::FAILURE;
        }
    };

    match engine.sync().await {
        Ok(report) => {
            let stats = &report.stats;
            println!("Sync completed in {} attempt(s).", stats.attempts);
            println!("  assets downloaded : {}", stats.assets_downloaded);
            println!("  assets removed    : {}", stats.assets_removed);
            println!("  albums created    : {}", stats.albums_created);
            println!("  albums removed    : {}", stats.albums_removed);
            println!("  local assets      : {}", report.assets.len());
            println!("  local albums      : {}", report.albums.len());
            ExitCode::SUCCESS
        }
        Err(err @ SyncError::RetriesExhausted { .. }) => {
            eprintln!("error: {err:#}");
            if let Some(cause) = std::error::Error::source(&err) {
                eprintln!("  last cause: {cause}");
            }
            ExitCode::from(EXIT_RETRIES_EXHAUSTED)
        }
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::FAILURE
        }
    }
}

async fn build_engine(config_path: &PathBuf) -> Result<SyncEngine<CloudClient>> {
    let config = AppConfig::load_and_resolve(config_path).context("failed to load configuration")?;

    let password = config.remote.password.clone().with_context(|| {
        format!(
            "remote password not available; set the '{}' environment variable",
            config.remote.password_env
        )
    })?;

    let client = CloudClient::new(&config.remote.base_url, &config.remote.username, password);
    client
        .refresh_session()
        .await
        .context("failed to establish a remote session")?;

    let library =
        PhotoLibrary::open(&config.library.data_dir).context("failed to open the local library")?;

    Ok(SyncEngine::new(&config.sync, client, library))
}

// ---------------------------------------------------------------------------
// status
// ---------------------------------------------------------------------------

fn cmd_status(config_path: &PathBuf) -> Result<()> {
    let config = AppConfig::load_from_file(config_path).context("failed to load configuration")?;
    let library =
        PhotoLibrary::open(&config.library.data_dir).context("failed to open the local library")?;

    let assets = library.load_assets().context("failed to load assets")?;
    let albums = library.load_albums().context("failed to load albums")?;

    let total_bytes: u64 = assets.values().map(|a| a.size).sum();
    let folders = albums.values().filter(|a| a.kind == AlbumKind::Folder).count();
    let leaves = albums.values().filter(|a| a.kind == AlbumKind::Album).count();
    let archived = albums
        .values()
        .filter(|a| a.kind == AlbumKind::Archived)
        .count();

    println!("Library at {}", config.library.data_dir.display());
    println!("  assets   : {} ({} bytes)", assets.len(), total_bytes);
    println!("  folders  : {folders}");
    println!("  albums   : {leaves}");
    println!("  archived : {archived}");
    Ok(())
}

// ---------------------------------------------------------------------------
// init / validate
// ---------------------------------------------------------------------------

const DEFAULT_CONFIG: &str = r#"# PhotoSync configuration.

[library]
# Root of the local mirror: the asset pool plus the album tree.
data_dir = "/var/lib/photosync"

[remote]
# API endpoint of the remote photo library.
base_url = "https://photos.example.com/api"
username = "user@example.com"
# Name of the environment variable holding the account password.
password_env = "PHOTOSYNC_PASSWORD"

[sync]
# Concurrent asset downloads.
download_threads = 4
# Consecutive recoverable failures tolerated before giving up; -1 = forever.
max_retries = 3
# Album labels to leave out of the mirror.
ignore_albums = []

[daemon]
# Seconds between scheduled runs.
poll_interval_secs = 3600
log_level = "info"
"#;

fn cmd_init(output: &PathBuf) -> Result<()> {
    if output.exists() {
        anyhow::bail!("refusing to overwrite existing file {}", output.display());
    }
    std::fs::write(output, DEFAULT_CONFIG)
        .with_context(|| format!("failed to write {}", output.display()))?;
    println!("Wrote default configuration to {}", output.display());
    println!("Edit it, export the password variable, then run: photosync sync");
    Ok(())
}

fn cmd_validate(config_path: &PathBuf) -> Result<()> {
    let mut config =
        AppConfig::load_from_file(config_path).context("failed to load configuration")?;
    config.resolve_env_vars()?;
    config.validate().context("configuration is invalid")?;

    println!("Configuration OK.");
    if config.remote.password.is_none() {
        println!(
            "note: '{}' is not set in the environment; sync will fail until it is",
            config.remote.password_env
        );
    }
    Ok(())
}
