//! PhotoSync core library.
//!
//! Mirrors a remote personal photo library (assets plus a hierarchical
//! album structure) into a local filesystem tree. The tree itself is the
//! persistent state: every run re-reads it, diffs it against the remote
//! catalog, and executes the resulting queues.

pub mod config;
pub mod differ;
pub mod errors;
pub mod events;
pub mod library;
pub mod models;
pub mod remote;
pub mod resolver;
pub mod sync_engine;

// Re-exports for convenience.
pub use config::AppConfig;
pub use errors::CoreError;
pub use library::PhotoLibrary;
pub use remote::CloudClient;
pub use sync_engine::SyncEngine;
