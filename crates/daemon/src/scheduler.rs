//! Sync scheduler that runs mirror passes on a configurable interval.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::time;
use tracing::{error, info, warn};

use photosync_core::errors::SyncError;
use photosync_core::remote::CloudClient;
use photosync_core::sync_engine::SyncEngine;

/// Tracks aggregate statistics across runs.
pub struct SchedulerStats {
    pub total_runs: AtomicU64,
    pub total_errors: AtomicU64,
    pub consecutive_errors: AtomicU64,
}

impl SchedulerStats {
    fn new() -> Self {
        Self {
            total_runs: AtomicU64::new(0),
            total_errors: AtomicU64::new(0),
            consecutive_errors: AtomicU64::new(0),
        }
    }
}

/// The sync scheduler.
///
/// Runs one mirror pass per tick. If a pass is still in flight when the
/// next tick fires, the tick is skipped rather than queued up.
pub struct Scheduler {
    engine: Arc<SyncEngine<CloudClient>>,
    poll_interval: Duration,
    running: Arc<AtomicBool>,
    stats: Arc<SchedulerStats>,
}

impl Scheduler {
    pub fn new(engine: Arc<SyncEngine<CloudClient>>, poll_interval: Duration) -> Self {
        Self {
            engine,
            poll_interval,
            running: Arc::new(AtomicBool::new(false)),
            stats: Arc::new(SchedulerStats::new()),
        }
    }

    /// Main scheduler loop; returns when `shutdown` is notified.
    pub async fn run(&mut self, shutdown: Arc<tokio::sync::Notify>) {
        info!(
            poll_interval_secs = self.poll_interval.as_secs(),
            "scheduler started"
        );

        let mut interval = time::interval(self.poll_interval);
        interval.set_missed_tick_behavior(time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    self.maybe_run_once().await;
                }
                _ = shutdown.notified() => {
                    info!("scheduler shutting down");
                    return;
                }
            }
        }
    }

    /// Attempt one mirror pass. If the previous pass is still running,
    /// skip this tick; a skip is expected behaviour, not an error.
    async fn maybe_run_once(&self) {
        if self
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            warn!("skipping sync run: previous run still in flight");
            return;
        }

        let run = self.stats.total_runs.fetch_add(1, Ordering::SeqCst) + 1;
        info!(run, "starting sync run");

        match self.engine.sync().await {
            Ok(report) => {
                self.stats.consecutive_errors.store(0, Ordering::SeqCst);
                info!(
                    run,
                    attempts = report.stats.attempts,
                    downloaded = report.stats.assets_downloaded,
                    removed = report.stats.assets_removed,
                    albums_created = report.stats.albums_created,
                    albums_removed = report.stats.albums_removed,
                    "sync run completed"
                );
            }
            // The engine holds its own run lock; if something else (e.g. a
            // manual CLI sync against the same engine) beat us to it, that
            // is a skip, not a failure.
            Err(SyncError::AlreadyRunning) => {
                warn!(run, "sync already in progress, skipping");
            }
            Err(e) => {
                let total = self.stats.total_errors.fetch_add(1, Ordering::SeqCst) + 1;
                let consecutive = self
                    .stats
                    .consecutive_errors
                    .fetch_add(1, Ordering::SeqCst)
                    + 1;
                error!(
                    run,
                    error = %e,
                    total_errors = total,
                    consecutive_errors = consecutive,
                    "sync run failed"
                );
            }
        }

        self.running.store(false, Ordering::SeqCst);
    }
}
