//! Typed progress events emitted by the sync engine.
//!
//! A single outbound broadcast stream carries a tagged union of phase and
//! per-operation records. Subscribers may rely on order being monotonic
//! within a phase and on nothing else; senders never block on (or fail
//! because of) missing or lagging receivers.

use serde::Serialize;
use tokio::sync::broadcast;

/// Capacity of the event channel; laggards lose old events, the engine
/// never waits.
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Progress and phase records emitted during a sync run.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SyncEvent {
    /// An attempt started fetching remote and local state.
    FetchStarted { attempt: u32 },
    /// Fetch & load finished; the four cardinalities.
    FetchCompleted {
        remote_assets: usize,
        remote_albums: usize,
        local_assets: usize,
        local_albums: usize,
    },
    /// Both queues are built and ordered.
    DiffCompleted {
        assets_to_add: usize,
        assets_to_delete: usize,
        albums_to_add: usize,
        albums_to_delete: usize,
    },
    /// An asset was downloaded, verified, and committed to the pool.
    AssetWritten { uuid: String, filename: String },
    /// An asset was unlinked from the pool.
    AssetRemoved { uuid: String },
    /// An album directory (and its links) was created.
    AlbumWritten { uuid: String, name: String },
    /// An album directory was removed.
    AlbumRemoved { uuid: String },
    /// A recoverable failure; the session will be refreshed and the run
    /// re-attempted.
    RetryScheduled { attempt: u32, cause: String },
    /// The run finished successfully.
    RunCompleted {
        attempts: u32,
        assets_downloaded: usize,
        assets_removed: usize,
        albums_created: usize,
        albums_removed: usize,
    },
}

/// Sending half of the progress stream.
#[derive(Debug, Clone)]
pub struct EventSender(broadcast::Sender<SyncEvent>);

impl EventSender {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self(tx)
    }

    /// Emit an event; absent receivers are not an error.
    pub fn emit(&self, event: SyncEvent) {
        let _ = self.0.send(event);
    }

    /// Open a new receiving end of the stream.
    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.0.subscribe()
    }
}

impl Default for EventSender {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_emit_without_receivers_is_fine() {
        let tx = EventSender::new();
        tx.emit(SyncEvent::FetchStarted { attempt: 1 });
    }

    #[tokio::test]
    async fn test_subscriber_sees_events_in_order() {
        let tx = EventSender::new();
        let mut rx = tx.subscribe();

        tx.emit(SyncEvent::FetchStarted { attempt: 1 });
        tx.emit(SyncEvent::AssetWritten {
            uuid: "a1".into(),
            filename: "x.jpg".into(),
        });

        assert!(matches!(
            rx.recv().await.unwrap(),
            SyncEvent::FetchStarted { attempt: 1 }
        ));
        assert!(matches!(
            rx.recv().await.unwrap(),
            SyncEvent::AssetWritten { .. }
        ));
    }

    #[test]
    fn test_events_serialize_tagged() {
        let json = serde_json::to_value(SyncEvent::RetryScheduled {
            attempt: 2,
            cause: "remote returned a bad response (HTTP 502)".into(),
        })
        .unwrap();
        assert_eq!(json["type"], "retry_scheduled");
        assert_eq!(json["attempt"], 2);
    }
}
