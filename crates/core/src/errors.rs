//! Error types for the PhotoSync core library.
//!
//! Each subsystem has its own error type derived with `thiserror`, and a
//! top-level [`CoreError`] enum unifies them all for callers that want a
//! single error type. The retry loop in the sync engine keys off
//! [`RemoteError::is_recoverable`] / [`SyncError::is_recoverable`].

use thiserror::Error;

// ---------------------------------------------------------------------------
// Top-level error
// ---------------------------------------------------------------------------

/// Unified error type for the entire core library.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error(transparent)]
    Remote(#[from] RemoteError),

    #[error(transparent)]
    Library(#[from] LibraryError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Sync(#[from] SyncError),
}

// ---------------------------------------------------------------------------
// Remote transport errors
// ---------------------------------------------------------------------------

/// Errors from the remote library transport.
///
/// The variants mirror the failure classes the retry loop distinguishes:
/// bad responses (5xx), bad requests (4xx), transient DNS failures, and
/// corrupt downloads retry; authentication and parse failures do not.
#[derive(Debug, Error)]
pub enum RemoteError {
    /// The remote returned a server-side failure (HTTP 5xx).
    #[error("remote returned a bad response (HTTP {status})")]
    BadResponse { status: u16 },

    /// The remote rejected the request (HTTP 4xx other than an
    /// authentication-final failure).
    #[error("remote rejected the request (HTTP {status})")]
    BadRequest { status: u16 },

    /// Transient name-resolution or connection failure.
    #[error("could not reach the remote: {0}")]
    DnsFailure(String),

    /// A downloaded payload did not match the advertised size or checksum.
    #[error("download for asset {uuid} is corrupt: {detail}")]
    CorruptDownload { uuid: String, detail: String },

    /// The session could not be (re-)established with the given credentials.
    #[error("authentication failed: {0}")]
    AuthenticationFailed(String),

    /// Unclassified transport error.
    #[error("remote transport error: {0}")]
    Http(#[from] reqwest::Error),

    /// The remote response could not be projected into typed records.
    #[error("failed to parse remote response: {0}")]
    Parse(String),
}

impl RemoteError {
    /// Whether the retry loop should refresh the session and try again.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::BadResponse { .. }
                | Self::BadRequest { .. }
                | Self::DnsFailure(_)
                | Self::CorruptDownload { .. }
        )
    }

    /// Classify a raw `reqwest` failure into the transport taxonomy.
    ///
    /// Connection-level failures (DNS, refused, timed out) are transient;
    /// everything else stays an unclassified [`RemoteError::Http`].
    pub fn from_transport(err: reqwest::Error) -> Self {
        if err.is_connect() || err.is_timeout() {
            Self::DnsFailure(err.to_string())
        } else {
            Self::Http(err)
        }
    }

    /// Classify a non-success HTTP status code.
    pub fn from_status(status: u16) -> Self {
        if status >= 500 {
            Self::BadResponse { status }
        } else {
            Self::BadRequest { status }
        }
    }
}

// ---------------------------------------------------------------------------
// Library store errors
// ---------------------------------------------------------------------------

/// Errors from the on-disk library store.
#[derive(Debug, Error)]
pub enum LibraryError {
    /// Refusal to remove an album directory that still holds regular files
    /// or subdirectories. Guards archived albums; callers treat as fatal.
    #[error("album {uuid} is not empty: {detail}")]
    AlbumNotEmpty { uuid: String, detail: String },

    /// No directory for the given album UUID exists in the local tree.
    #[error("album not found in local tree: {0}")]
    AlbumNotFound(String),

    /// An on-disk entry does not fit the library layout.
    #[error("invalid library layout at '{path}': {detail}")]
    InvalidLayout { path: String, detail: String },

    /// The platform cannot represent album membership.
    #[error("symbolic links are not supported on this platform")]
    SymlinksUnsupported,

    /// Generic I/O wrapper.
    #[error("library I/O error: {0}")]
    Io(#[from] std::io::Error),
}

// ---------------------------------------------------------------------------
// Configuration errors
// ---------------------------------------------------------------------------

/// Errors from configuration loading and validation.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Config file not found.
    #[error("configuration file not found: {0}")]
    FileNotFound(String),

    /// TOML parse error.
    #[error("configuration parse error: {0}")]
    ParseError(String),

    /// A config value is invalid.
    #[error("invalid configuration value for '{field}': {detail}")]
    InvalidValue { field: String, detail: String },

    /// Generic I/O error reading the config file.
    #[error("configuration I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

// ---------------------------------------------------------------------------
// Sync engine errors
// ---------------------------------------------------------------------------

/// Errors from the sync engine driver.
#[derive(Debug, Error)]
pub enum SyncError {
    /// The remote state violates a structural invariant (dangling parent
    /// UUID, cycle among album parents). Not retried.
    #[error("invariant violation for {uuid}: {detail}")]
    InvariantViolation { uuid: String, detail: String },

    /// The retry budget was exhausted; carries the last underlying cause.
    #[error("retry budget exhausted after {attempts} attempts")]
    RetriesExhausted {
        attempts: u32,
        #[source]
        source: Box<SyncError>,
    },

    /// Another sync run is already in progress on this engine.
    #[error("sync already in progress")]
    AlreadyRunning,

    /// Underlying transport error.
    #[error("sync remote error: {0}")]
    Remote(#[from] RemoteError),

    /// Underlying library store error.
    #[error("sync library error: {0}")]
    Library(#[from] LibraryError),

    /// A spawned task panicked or was aborted.
    #[error("background task failed: {0}")]
    TaskFailed(String),
}

impl SyncError {
    /// Whether the retry loop should refresh the session and try again.
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::Remote(e) => e.is_recoverable(),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remote_error_classification() {
        assert!(RemoteError::from_status(503).is_recoverable());
        assert!(matches!(
            RemoteError::from_status(503),
            RemoteError::BadResponse { status: 503 }
        ));
        assert!(matches!(
            RemoteError::from_status(404),
            RemoteError::BadRequest { status: 404 }
        ));
        assert!(RemoteError::DnsFailure("EAI_AGAIN".into()).is_recoverable());
        assert!(!RemoteError::AuthenticationFailed("bad password".into()).is_recoverable());
        assert!(!RemoteError::Parse("truncated json".into()).is_recoverable());
    }

    #[test]
    fn test_sync_error_recoverability() {
        let err = SyncError::Remote(RemoteError::BadResponse { status: 500 });
        assert!(err.is_recoverable());

        let err = SyncError::InvariantViolation {
            uuid: "a1".into(),
            detail: "dangling parent".into(),
        };
        assert!(!err.is_recoverable());

        let err = SyncError::RetriesExhausted {
            attempts: 5,
            source: Box::new(SyncError::Remote(RemoteError::BadResponse { status: 502 })),
        };
        assert!(!err.is_recoverable());
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn test_error_display_messages() {
        let err = LibraryError::AlbumNotEmpty {
            uuid: "f1".into(),
            detail: "contains regular files".into(),
        };
        assert_eq!(
            err.to_string(),
            "album f1 is not empty: contains regular files"
        );

        let err = ConfigError::InvalidValue {
            field: "sync.download_threads".into(),
            detail: "must be > 0".into(),
        };
        assert!(err.to_string().contains("sync.download_threads"));
    }

    #[test]
    fn test_core_error_from_subsystem() {
        let remote_err = RemoteError::BadResponse { status: 500 };
        let core_err: CoreError = remote_err.into();
        assert!(matches!(core_err, CoreError::Remote(_)));

        let lib_err = LibraryError::AlbumNotFound("abc".into());
        let core_err: CoreError = lib_err.into();
        assert!(matches!(core_err, CoreError::Library(_)));
    }
}
