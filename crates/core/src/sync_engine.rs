//! The sync driver.
//!
//! [`SyncEngine`] orchestrates one mirror pass against the remote library:
//!
//! 1. Fetch the remote catalog and load the local tree, concurrently.
//! 2. Diff assets and albums into processing queues; order the album queue
//!    hierarchy-first.
//! 3. Write: asset deletions serially, asset downloads through a bounded
//!    pool, then album deletions and additions strictly in queue order.
//!
//! A retry loop wraps the whole attempt: recoverable transport failures
//! drain the download pool, refresh the remote session, and start over.
//! The engine is composed from narrow collaborators (store, differ,
//! resolver, transport trait) and owns no global state; a lock prevents
//! concurrent runs on the same engine.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use sha2::{Digest, Sha256};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::config::SyncConfig;
use crate::differ::{self, ProcessingQueue};
use crate::errors::{RemoteError, SyncError};
use crate::events::{EventSender, SyncEvent};
use crate::library::PhotoLibrary;
use crate::models::{Album, AlbumKind, Asset};
use crate::remote::{self, RemoteLibrary};

// ---------------------------------------------------------------------------
// Phases & stats
// ---------------------------------------------------------------------------

/// Phases of a single `sync()` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncPhase {
    Idle,
    Fetching,
    Diffing,
    Writing,
    Retrying,
    Done,
    Failed,
}

impl std::fmt::Display for SyncPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Fetching => write!(f, "fetching"),
            Self::Diffing => write!(f, "diffing"),
            Self::Writing => write!(f, "writing"),
            Self::Retrying => write!(f, "retrying"),
            Self::Done => write!(f, "done"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// Statistics from a single sync run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SyncStats {
    pub assets_downloaded: usize,
    pub assets_removed: usize,
    pub albums_created: usize,
    pub albums_removed: usize,
    pub attempts: u32,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// Result of a successful run: the final entity maps re-read from disk,
/// plus run statistics.
#[derive(Debug)]
pub struct SyncReport {
    pub assets: HashMap<String, Asset>,
    pub albums: HashMap<String, Album>,
    pub stats: SyncStats,
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

/// The sync driver, generic over the remote transport.
pub struct SyncEngine<R: RemoteLibrary + 'static> {
    remote: Arc<R>,
    library: Arc<PhotoLibrary>,
    download_threads: usize,
    max_retries: i64,
    ignore_albums: HashSet<String>,
    events: EventSender,
    /// Atomic flag preventing concurrent runs on the same engine.
    running: Arc<AtomicBool>,
    phase: Arc<std::sync::Mutex<SyncPhase>>,
}

impl<R: RemoteLibrary + 'static> SyncEngine<R> {
    /// Create a new engine over a remote transport and a local library.
    pub fn new(config: &SyncConfig, remote: R, library: PhotoLibrary) -> Self {
        info!(
            download_threads = config.download_threads,
            max_retries = config.max_retries,
            "initializing sync engine"
        );
        Self {
            remote: Arc::new(remote),
            library: Arc::new(library),
            download_threads: config.download_threads.max(1),
            max_retries: config.max_retries,
            ignore_albums: config.ignore_albums.iter().cloned().collect(),
            events: EventSender::new(),
            running: Arc::new(AtomicBool::new(false)),
            phase: Arc::new(std::sync::Mutex::new(SyncPhase::Idle)),
        }
    }

    /// Open a receiver on the progress event stream.
    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<SyncEvent> {
        self.events.subscribe()
    }

    /// The phase the engine is currently in.
    pub fn phase(&self) -> SyncPhase {
        *self.phase.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn set_phase(&self, next: SyncPhase) {
        let mut phase = self.phase.lock().unwrap_or_else(|e| e.into_inner());
        debug!(from = %*phase, to = %next, "phase transition");
        *phase = next;
    }

    // -----------------------------------------------------------------------
    // Main entry point
    // -----------------------------------------------------------------------

    /// Run one full mirror pass and return the final on-disk entity maps.
    ///
    /// Recoverable transport failures refresh the session and re-attempt the
    /// whole pass, up to `max_retries` consecutive failures (`-1` retries
    /// forever). Anything else aborts immediately.
    pub async fn sync(&self) -> Result<SyncReport, SyncError> {
        if self
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(SyncError::AlreadyRunning);
        }
        let _guard = RunGuard(self.running.clone());

        let started_at = Utc::now();
        let mut attempt: u32 = 1;
        let mut failures: i64 = 0;

        loop {
            match self.run_attempt(attempt).await {
                Ok(mut report) => {
                    report.stats.attempts = attempt;
                    report.stats.started_at = Some(started_at);
                    report.stats.completed_at = Some(Utc::now());
                    self.set_phase(SyncPhase::Done);
                    self.events.emit(SyncEvent::RunCompleted {
                        attempts: attempt,
                        assets_downloaded: report.stats.assets_downloaded,
                        assets_removed: report.stats.assets_removed,
                        albums_created: report.stats.albums_created,
                        albums_removed: report.stats.albums_removed,
                    });
                    info!(
                        attempts = attempt,
                        downloaded = report.stats.assets_downloaded,
                        removed = report.stats.assets_removed,
                        albums_created = report.stats.albums_created,
                        albums_removed = report.stats.albums_removed,
                        "sync completed"
                    );
                    return Ok(report);
                }
                Err(err) if err.is_recoverable() => {
                    failures += 1;
                    if self.max_retries >= 0 && failures > self.max_retries {
                        self.set_phase(SyncPhase::Failed);
                        return Err(SyncError::RetriesExhausted {
                            attempts: attempt,
                            source: Box::new(err),
                        });
                    }
                    warn!(attempt, error = %err, "recoverable failure, will retry");
                    self.events.emit(SyncEvent::RetryScheduled {
                        attempt,
                        cause: err.to_string(),
                    });
                    self.set_phase(SyncPhase::Retrying);
                    attempt += 1;
                }
                Err(err) => {
                    self.set_phase(SyncPhase::Failed);
                    return Err(err);
                }
            }
        }
    }

    // -----------------------------------------------------------------------
    // One attempt
    // -----------------------------------------------------------------------

    async fn run_attempt(&self, attempt: u32) -> Result<SyncReport, SyncError> {
        // The retry edge re-establishes the session before fetching again.
        if attempt > 1 {
            self.remote.refresh_session().await?;
        }

        // Phase 1: fetch & load, four subtasks concurrently.
        self.set_phase(SyncPhase::Fetching);
        self.events.emit(SyncEvent::FetchStarted { attempt });

        let lib_assets = self.library.clone();
        let lib_albums = self.library.clone();
        let (remote_assets, remote_albums, local_assets, local_albums) = tokio::try_join!(
            async {
                let (content, master) = self
                    .remote
                    .fetch_all_assets()
                    .await
                    .map_err(SyncError::from)?;
                Ok::<_, SyncError>(remote::join_asset_records(content, master))
            },
            async {
                let records = self
                    .remote
                    .fetch_all_albums()
                    .await
                    .map_err(SyncError::from)?;
                Ok(remote::project_album_records(records))
            },
            async {
                tokio::task::spawn_blocking(move || lib_assets.load_assets())
                    .await
                    .map_err(|e| SyncError::TaskFailed(e.to_string()))?
                    .map_err(SyncError::from)
            },
            async {
                tokio::task::spawn_blocking(move || lib_albums.load_albums())
                    .await
                    .map_err(|e| SyncError::TaskFailed(e.to_string()))?
                    .map_err(SyncError::from)
            },
        )?;

        let remote_albums = filter_ignored_albums(remote_albums, &self.ignore_albums);

        self.events.emit(SyncEvent::FetchCompleted {
            remote_assets: remote_assets.len(),
            remote_albums: remote_albums.len(),
            local_assets: local_assets.len(),
            local_albums: local_albums.len(),
        });

        // Phase 2: diff, then order the album queue.
        self.set_phase(SyncPhase::Diffing);
        let asset_queue = differ::diff(&remote_assets, &local_assets);
        let mut album_queue = differ::diff(&remote_albums, &local_albums);

        // Archived albums survive remote deletion; that is what archiving
        // is for. Anything else in the queue stays.
        album_queue.to_delete.retain(|album| {
            if album.kind == AlbumKind::Archived {
                info!(uuid = %album.uuid, name = %album.name, "preserving archived album");
                false
            } else {
                true
            }
        });
        let album_queue = crate::resolver::resolve(album_queue, &local_albums)?;

        self.events.emit(SyncEvent::DiffCompleted {
            assets_to_add: asset_queue.to_add.len(),
            assets_to_delete: asset_queue.to_delete.len(),
            albums_to_add: album_queue.to_add.len(),
            albums_to_delete: album_queue.to_delete.len(),
        });

        // Phase 3: write. Assets fully before albums, so every link an
        // album creates already has its target in the pool.
        self.set_phase(SyncPhase::Writing);
        let stats = SyncStats {
            assets_downloaded: asset_queue.to_add.len(),
            assets_removed: asset_queue.to_delete.len(),
            albums_created: album_queue.to_add.len(),
            albums_removed: album_queue.to_delete.len(),
            ..Default::default()
        };
        self.write_assets(&asset_queue).await?;
        self.write_albums(&album_queue)?;

        // Re-read the tree: the returned maps are what the disk now holds.
        let assets = self.library.load_assets()?;
        let albums = self.library.load_albums()?;
        Ok(SyncReport {
            assets,
            albums,
            stats,
        })
    }

    // -----------------------------------------------------------------------
    // Asset phase
    // -----------------------------------------------------------------------

    /// Deletions serially on the driver, then additions through the bounded
    /// download pool. All deletes happen before any add, so a changed
    /// asset's removal can never race its re-download.
    async fn write_assets(&self, queue: &ProcessingQueue<Asset>) -> Result<(), SyncError> {
        for asset in &queue.to_delete {
            self.library.remove_asset(asset)?;
            self.events.emit(SyncEvent::AssetRemoved {
                uuid: asset.uuid.clone(),
            });
        }

        if queue.to_add.is_empty() {
            return Ok(());
        }

        let semaphore = Arc::new(Semaphore::new(self.download_threads));
        let mut tasks: JoinSet<Result<(), SyncError>> = JoinSet::new();
        let mut first_error: Option<SyncError> = None;

        for asset in queue.to_add.iter().cloned() {
            // Collect any finished downloads so a failure stops the queue
            // before more jobs are submitted.
            while let Some(joined) = tasks.try_join_next() {
                record_download_result(&mut first_error, joined);
            }
            if first_error.is_some() {
                break;
            }

            let permit = semaphore
                .clone()
                .acquire_owned()
                .await
                .map_err(|e| SyncError::TaskFailed(e.to_string()))?;
            let remote = self.remote.clone();
            let library = self.library.clone();
            let events = self.events.clone();
            tasks.spawn(async move {
                let _permit = permit;
                download_one(remote, library, events, asset).await
            });
        }

        // On failure pending jobs were dropped above; in-flight ones are
        // always awaited because `add_asset` is the atomic unit.
        while let Some(joined) = tasks.join_next().await {
            record_download_result(&mut first_error, joined);
        }

        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    // -----------------------------------------------------------------------
    // Album phase
    // -----------------------------------------------------------------------

    /// Strictly serial, in resolver order: deletions child-first, then
    /// additions parent-first.
    fn write_albums(&self, queue: &ProcessingQueue<Album>) -> Result<(), SyncError> {
        for album in &queue.to_delete {
            self.library.remove_album(&album.uuid)?;
            self.events.emit(SyncEvent::AlbumRemoved {
                uuid: album.uuid.clone(),
            });
        }
        for album in &queue.to_add {
            self.library.add_album(album)?;
            self.events.emit(SyncEvent::AlbumWritten {
                uuid: album.uuid.clone(),
                name: album.name.clone(),
            });
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Download worker
// ---------------------------------------------------------------------------

/// Download one asset, verify it against the advertised size and checksum,
/// and commit it to the pool.
async fn download_one<R: RemoteLibrary + ?Sized>(
    remote: Arc<R>,
    library: Arc<PhotoLibrary>,
    events: EventSender,
    asset: Asset,
) -> Result<(), SyncError> {
    let url = asset
        .download_url
        .clone()
        .ok_or_else(|| SyncError::InvariantViolation {
            uuid: asset.uuid.clone(),
            detail: "asset queued for download carries no URL".into(),
        })?;

    let bytes = remote.download(&url).await?;

    if bytes.len() as u64 != asset.size {
        return Err(RemoteError::CorruptDownload {
            uuid: asset.uuid.clone(),
            detail: format!("expected {} bytes, got {}", asset.size, bytes.len()),
        }
        .into());
    }
    if let Some(expected) = &asset.checksum {
        let digest = hex::encode(Sha256::digest(&bytes));
        if !digest.eq_ignore_ascii_case(expected) {
            return Err(RemoteError::CorruptDownload {
                uuid: asset.uuid.clone(),
                detail: "checksum mismatch".into(),
            }
            .into());
        }
    }

    let uuid = asset.uuid.clone();
    let filename = asset.filename.clone();
    tokio::task::spawn_blocking(move || library.add_asset(&asset, &bytes))
        .await
        .map_err(|e| SyncError::TaskFailed(e.to_string()))??;

    events.emit(SyncEvent::AssetWritten { uuid, filename });
    Ok(())
}

fn record_download_result(
    first_error: &mut Option<SyncError>,
    joined: Result<Result<(), SyncError>, tokio::task::JoinError>,
) {
    let result = match joined {
        Ok(r) => r,
        Err(e) => Err(SyncError::TaskFailed(e.to_string())),
    };
    if let Err(err) = result {
        if first_error.is_none() {
            *first_error = Some(err);
        } else {
            warn!(error = %err, "additional download failure");
        }
    }
}

// ---------------------------------------------------------------------------
// Ignore filter
// ---------------------------------------------------------------------------

/// Drop remote albums whose label is ignored, together with their
/// transitive descendants (keeping a child of an ignored folder would leave
/// it with a dangling parent).
fn filter_ignored_albums(albums: Vec<Album>, ignore: &HashSet<String>) -> Vec<Album> {
    if ignore.is_empty() {
        return albums;
    }

    let mut excluded: HashSet<String> = albums
        .iter()
        .filter(|a| ignore.contains(&a.name))
        .map(|a| a.uuid.clone())
        .collect();

    loop {
        let grown: Vec<String> = albums
            .iter()
            .filter(|a| !excluded.contains(&a.uuid) && excluded.contains(&a.parent_uuid))
            .map(|a| a.uuid.clone())
            .collect();
        if grown.is_empty() {
            break;
        }
        excluded.extend(grown);
    }

    let kept: Vec<Album> = albums
        .into_iter()
        .filter(|a| !excluded.contains(&a.uuid))
        .collect();
    if !excluded.is_empty() {
        debug!(count = excluded.len(), "ignored albums filtered from the remote list");
    }
    kept
}

// ---------------------------------------------------------------------------
// Run lock RAII guard
// ---------------------------------------------------------------------------

/// Drop guard that clears the `running` flag even if a run panics.
struct RunGuard(Arc<AtomicBool>);

impl Drop for RunGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}
