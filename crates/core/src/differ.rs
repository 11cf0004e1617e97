//! Set reconciliation between remote and local entities.
//!
//! [`diff`] is a pure function over (remote list, local map) producing a
//! [`ProcessingQueue`]. It is applied independently to assets and to albums;
//! the album queue additionally goes through the dependency resolver before
//! execution.

use std::collections::HashMap;

use crate::models::{Album, Asset};

// ---------------------------------------------------------------------------
// Diffable entities
// ---------------------------------------------------------------------------

/// An entity the differ can reconcile: keyed by UUID, compared by
/// fingerprint.
pub trait DiffEntity: Clone {
    fn uuid(&self) -> &str;
    fn same_state(&self, other: &Self) -> bool;
}

impl DiffEntity for Asset {
    fn uuid(&self) -> &str {
        &self.uuid
    }
    fn same_state(&self, other: &Self) -> bool {
        Asset::same_state(self, other)
    }
}

impl DiffEntity for Album {
    fn uuid(&self) -> &str {
        &self.uuid
    }
    fn same_state(&self, other: &Self) -> bool {
        Album::same_state(self, other)
    }
}

// ---------------------------------------------------------------------------
// Processing queue
// ---------------------------------------------------------------------------

/// The triple produced by the differ.
///
/// `to_keep` holds local instances that match the remote, `to_add` holds
/// remote instances to materialize, `to_delete` holds local instances to
/// destroy. A changed entity appears in both `to_add` and `to_delete`.
#[derive(Debug, Clone)]
pub struct ProcessingQueue<T> {
    pub to_keep: Vec<T>,
    pub to_add: Vec<T>,
    pub to_delete: Vec<T>,
}

impl<T> Default for ProcessingQueue<T> {
    fn default() -> Self {
        Self {
            to_keep: Vec::new(),
            to_add: Vec::new(),
            to_delete: Vec::new(),
        }
    }
}

impl<T> ProcessingQueue<T> {
    /// True when executing the queue would perform no mutations.
    pub fn is_noop(&self) -> bool {
        self.to_add.is_empty() && self.to_delete.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Diff
// ---------------------------------------------------------------------------

/// Reconcile a remote entity list against a local entity map.
///
/// Every local entity starts out doomed (`to_delete`); each remote entity
/// either rescues its local counterpart into `to_keep` (fingerprint match)
/// or lands in `to_add` (absent or changed, the stale local copy staying in
/// `to_delete`). Output lists are sorted by UUID so the operation stream is
/// deterministic.
pub fn diff<T: DiffEntity>(remote: &[T], local: &HashMap<String, T>) -> ProcessingQueue<T> {
    let mut doomed: HashMap<&str, &T> = local.iter().map(|(k, v)| (k.as_str(), v)).collect();
    let mut queue = ProcessingQueue::default();

    for r in remote {
        match local.get(r.uuid()) {
            Some(l) if r.same_state(l) => {
                doomed.remove(r.uuid());
                queue.to_keep.push(l.clone());
            }
            _ => queue.to_add.push(r.clone()),
        }
    }

    queue.to_delete = doomed.into_values().cloned().collect();

    queue.to_keep.sort_by(|a, b| a.uuid().cmp(b.uuid()));
    queue.to_add.sort_by(|a, b| a.uuid().cmp(b.uuid()));
    queue.to_delete.sort_by(|a, b| a.uuid().cmp(b.uuid()));
    queue
}
