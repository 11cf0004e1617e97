//! TOML-based configuration system for PhotoSync.
//!
//! Sensitive values (the remote account password) are stored as `_env`
//! fields that reference environment variable names. The actual secrets are
//! resolved at runtime via [`AppConfig::resolve_env_vars`].

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::errors::ConfigError;

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

/// Top-level application configuration loaded from a TOML file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Local library settings.
    pub library: LibraryConfig,

    /// Remote account and endpoint settings.
    pub remote: RemoteConfig,

    /// Sync behaviour settings.
    #[serde(default)]
    pub sync: SyncConfig,

    /// Daemon / polling settings.
    #[serde(default)]
    pub daemon: DaemonConfig,
}

// ---------------------------------------------------------------------------
// Library
// ---------------------------------------------------------------------------

/// Local library settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LibraryConfig {
    /// Root of the on-disk layout (asset pool + album tree).
    pub data_dir: PathBuf,
}

// ---------------------------------------------------------------------------
// Remote
// ---------------------------------------------------------------------------

/// Remote account and endpoint settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteConfig {
    /// API base URL of the remote photo library.
    pub base_url: String,

    /// Account username.
    pub username: String,

    /// Environment variable holding the account password.
    pub password_env: String,

    /// Resolved password (populated by `resolve_env_vars`).
    #[serde(skip)]
    pub password: Option<String>,
}

// ---------------------------------------------------------------------------
// Sync behaviour
// ---------------------------------------------------------------------------

/// Sync behaviour configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Number of concurrent asset downloads.
    #[serde(default = "default_download_threads")]
    pub download_threads: usize,

    /// Consecutive recoverable failures tolerated before a run aborts.
    /// `-1` retries forever.
    #[serde(default = "default_max_retries")]
    pub max_retries: i64,

    /// Album labels excluded from the remote list before diffing.
    #[serde(default)]
    pub ignore_albums: Vec<String>,
}

fn default_download_threads() -> usize {
    4
}
fn default_max_retries() -> i64 {
    3
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            download_threads: default_download_threads(),
            max_retries: default_max_retries(),
            ignore_albums: Vec::new(),
        }
    }
}

// ---------------------------------------------------------------------------
// Daemon
// ---------------------------------------------------------------------------

/// Daemon / polling configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonConfig {
    /// Seconds between scheduled sync runs (default 3600).
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,

    /// Minimum tracing level: trace, debug, info, warn, error.
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_poll_interval() -> u64 {
    3600
}
fn default_log_level() -> String {
    "info".into()
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval(),
            log_level: default_log_level(),
        }
    }
}

// ---------------------------------------------------------------------------
// Loading & resolving
// ---------------------------------------------------------------------------

impl AppConfig {
    /// Load an [`AppConfig`] from a TOML file at the given path.
    ///
    /// This does **not** resolve environment variables -- call
    /// [`resolve_env_vars`](Self::resolve_env_vars) afterwards.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        info!(path = %path.display(), "loading configuration");

        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.display().to_string()));
        }

        let contents = std::fs::read_to_string(path)?;
        let config: AppConfig =
            toml::from_str(&contents).map_err(|e| ConfigError::ParseError(e.to_string()))?;

        debug!("configuration parsed successfully");
        Ok(config)
    }

    /// Resolve all `*_env` fields from environment variables and populate the
    /// corresponding resolved fields.
    ///
    /// A missing variable logs a warning but does **not** fail -- callers
    /// check the `Option` fields and decide what their execution mode
    /// requires.
    pub fn resolve_env_vars(&mut self) -> Result<(), ConfigError> {
        self.remote.password =
            resolve_optional_env(&self.remote.password_env, "remote.password_env");
        Ok(())
    }

    /// Validate that all required fields are present and sane.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.library.data_dir.as_os_str().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "library.data_dir".into(),
                detail: "data directory must not be empty".into(),
            });
        }
        if !self.remote.base_url.starts_with("http://")
            && !self.remote.base_url.starts_with("https://")
        {
            return Err(ConfigError::InvalidValue {
                field: "remote.base_url".into(),
                detail: "base URL must start with http:// or https://".into(),
            });
        }
        if self.remote.username.is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "remote.username".into(),
                detail: "username must not be empty".into(),
            });
        }
        if self.sync.download_threads == 0 {
            return Err(ConfigError::InvalidValue {
                field: "sync.download_threads".into(),
                detail: "download pool size must be > 0".into(),
            });
        }
        if self.sync.max_retries < -1 {
            return Err(ConfigError::InvalidValue {
                field: "sync.max_retries".into(),
                detail: "retry budget must be >= -1".into(),
            });
        }
        if self.daemon.poll_interval_secs == 0 {
            return Err(ConfigError::InvalidValue {
                field: "daemon.poll_interval_secs".into(),
                detail: "poll interval must be > 0".into(),
            });
        }

        Ok(())
    }

    /// Convenience: load, resolve, and validate in one call.
    pub fn load_and_resolve<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let mut config = Self::load_from_file(path)?;
        config.resolve_env_vars()?;
        config.validate()?;
        Ok(config)
    }
}

/// Try to read an environment variable by name. Returns `Some(value)` on
/// success; logs a warning and returns `None` if the variable is unset.
fn resolve_optional_env(env_name: &str, field: &str) -> Option<String> {
    match std::env::var(env_name) {
        Ok(val) if !val.is_empty() => {
            debug!(field, env_name, "resolved env var");
            Some(val)
        }
        Ok(_) => {
            warn!(field, env_name, "env var is set but empty");
            None
        }
        Err(_) => {
            warn!(field, env_name, "env var not set");
            None
        }
    }
}
