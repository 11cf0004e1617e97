//! Termination-signal plumbing for the daemon.
//!
//! The daemon owns a long-lived scheduler task, so shutdown has to be
//! cooperative: this module resolves a future when the process is asked to
//! stop, and `main` then notifies the scheduler and waits for the current
//! mirror pass to reach a safe point.

use tracing::info;

/// Which signal asked the daemon to stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownSignal {
    Interrupt,
    Terminate,
}

impl std::fmt::Display for ShutdownSignal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Interrupt => write!(f, "SIGINT"),
            Self::Terminate => write!(f, "SIGTERM"),
        }
    }
}

/// Resolve once the process receives Ctrl+C / SIGINT, or SIGTERM on Unix.
pub async fn wait_for_shutdown() -> ShutdownSignal {
    let signal = tokio::select! {
        _ = interrupt() => ShutdownSignal::Interrupt,
        _ = terminate() => ShutdownSignal::Terminate,
    };
    info!(%signal, "shutdown requested");
    signal
}

async fn interrupt() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        // Without a Ctrl+C handler the daemon would be unstoppable except
        // by SIGKILL; treat that as a startup defect.
        panic!("failed to install Ctrl+C handler: {e}");
    }
}

#[cfg(unix)]
async fn terminate() {
    use tokio::signal::unix::{signal, SignalKind};
    match signal(SignalKind::terminate()) {
        Ok(mut stream) => {
            stream.recv().await;
        }
        Err(e) => panic!("failed to install SIGTERM handler: {e}"),
    }
}

#[cfg(not(unix))]
async fn terminate() {
    std::future::pending::<()>().await;
}
