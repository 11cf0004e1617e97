//! Hierarchy-aware ordering of the album queue.
//!
//! The differ treats albums as an unordered set; this pass rewrites its
//! queue so that applying deletions in list order and then additions in
//! list order keeps the on-disk tree valid at every intermediate step:
//! children are removed before their parents, parents are created before
//! their children, and kept albums whose ancestor is being destroyed are
//! lifted into a remove+add pair.
//!
//! No parent-pointer graph is materialized; albums carry only their parent
//! UUID and this pass resolves it through UUID-keyed indexes built here.

use std::collections::{BTreeMap, HashMap, HashSet};

use tracing::debug;

use crate::differ::ProcessingQueue;
use crate::errors::SyncError;
use crate::models::Album;

/// Upper bound for ancestor-chain walks; a longer chain means the local map
/// contains a parent cycle, which a tree loaded from disk cannot produce.
fn chain_limit(local: &HashMap<String, Album>) -> usize {
    local.len() + 1
}

/// Rewrite the album queue per the hierarchy rules.
///
/// Fails with [`SyncError::InvariantViolation`] when an added album's parent
/// exists nowhere in the target state, or when the adds contain a parent
/// cycle. No filesystem mutation has happened at that point.
pub fn resolve(
    queue: ProcessingQueue<Album>,
    local: &HashMap<String, Album>,
) -> Result<ProcessingQueue<Album>, SyncError> {
    let mut to_keep = queue.to_keep;
    let mut to_add = queue.to_add;
    let mut to_delete = queue.to_delete;

    // Destroying an album destroys everything nested under it, so any kept
    // album below a doomed ancestor must be rebuilt: its on-disk form joins
    // the deletions and a fresh form joins the additions. The full ancestor
    // chain is checked, which makes the lift transitive in a single pass.
    let doomed: HashSet<&str> = to_delete.iter().map(|a| a.uuid.as_str()).collect();
    let limit = chain_limit(local);
    let (lifted, kept): (Vec<Album>, Vec<Album>) = to_keep
        .drain(..)
        .partition(|album| has_doomed_ancestor(album, &doomed, local, limit));
    to_keep = kept;
    for album in lifted {
        debug!(uuid = %album.uuid, name = %album.name, "lifting album under a removed ancestor");
        to_delete.push(album.clone());
        to_add.push(album);
    }

    // Deletions: deepest first, so every directory is empty of child albums
    // by the time its own removal executes.
    to_delete.sort_by(|a, b| {
        let da = local_depth(a, local, limit);
        let db = local_depth(b, local, limit);
        db.cmp(&da).then_with(|| a.uuid.cmp(&b.uuid))
    });

    // Additions: parent-first topological order over a UUID-keyed index of
    // the target state. Siblings resolve lexicographically by UUID.
    to_add = order_adds(to_add, &to_keep)?;

    Ok(ProcessingQueue {
        to_keep,
        to_add,
        to_delete,
    })
}

fn has_doomed_ancestor(
    album: &Album,
    doomed: &HashSet<&str>,
    local: &HashMap<String, Album>,
    limit: usize,
) -> bool {
    let mut cur = album.parent_uuid.as_str();
    let mut steps = 0;
    while !cur.is_empty() && steps < limit {
        if doomed.contains(cur) {
            return true;
        }
        match local.get(cur) {
            Some(parent) => cur = parent.parent_uuid.as_str(),
            None => return false,
        }
        steps += 1;
    }
    false
}

/// Depth of an album in the *local* tree (root children are depth 1).
fn local_depth(album: &Album, local: &HashMap<String, Album>, limit: usize) -> usize {
    let mut depth = 1;
    let mut cur = album.parent_uuid.as_str();
    while !cur.is_empty() && depth < limit {
        match local.get(cur) {
            Some(parent) => cur = parent.parent_uuid.as_str(),
            None => break,
        }
        depth += 1;
    }
    depth
}

fn order_adds(to_add: Vec<Album>, to_keep: &[Album]) -> Result<Vec<Album>, SyncError> {
    let keep_set: HashSet<&str> = to_keep.iter().map(|a| a.uuid.as_str()).collect();
    let mut pending: BTreeMap<String, Album> = to_add
        .into_iter()
        .map(|a| (a.uuid.clone(), a))
        .collect();

    // Every parent must exist somewhere in the target state before ordering
    // is even attempted; reporting the dangling UUID beats a stuck sort.
    for album in pending.values() {
        let parent = album.parent_uuid.as_str();
        if !parent.is_empty() && !pending.contains_key(parent) && !keep_set.contains(parent) {
            return Err(SyncError::InvariantViolation {
                uuid: album.uuid.clone(),
                detail: format!("parent album {parent} does not exist in the target state"),
            });
        }
    }

    let mut placed: HashSet<String> = HashSet::new();
    let mut ordered = Vec::with_capacity(pending.len());

    while !pending.is_empty() {
        let ready: Option<String> = pending
            .values()
            .find(|album| {
                let parent = album.parent_uuid.as_str();
                parent.is_empty() || keep_set.contains(parent) || placed.contains(parent)
            })
            .map(|album| album.uuid.clone());

        match ready {
            Some(uuid) => {
                if let Some(album) = pending.remove(&uuid) {
                    ordered.push(album);
                }
                placed.insert(uuid);
            }
            None => {
                // Remaining adds all wait on each other: a parent cycle,
                // which the remote invariants rule out.
                let uuid = pending.keys().next().cloned().unwrap_or_default();
                return Err(SyncError::InvariantViolation {
                    uuid,
                    detail: "cycle among album parents in the additions".into(),
                });
            }
        }
    }

    Ok(ordered)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::AlbumKind;

    fn album(uuid: &str, name: &str, kind: AlbumKind, parent: &str) -> Album {
        Album {
            uuid: uuid.into(),
            name: name.into(),
            kind,
            parent_uuid: parent.into(),
            members: BTreeMap::new(),
        }
    }

    fn folder(uuid: &str, parent: &str) -> Album {
        album(uuid, uuid, AlbumKind::Folder, parent)
    }

    fn leaf(uuid: &str, parent: &str) -> Album {
        album(uuid, uuid, AlbumKind::Album, parent)
    }

    fn local_map(albums: &[Album]) -> HashMap<String, Album> {
        albums.iter().map(|a| (a.uuid.clone(), a.clone())).collect()
    }

    fn uuids(list: &[Album]) -> Vec<&str> {
        list.iter().map(|a| a.uuid.as_str()).collect()
    }

    #[test]
    fn test_adds_are_parent_first() {
        let queue = ProcessingQueue {
            to_keep: vec![],
            to_add: vec![leaf("a1", "f1"), folder("f1", ""), leaf("a2", "f1")],
            to_delete: vec![],
        };
        let resolved = resolve(queue, &HashMap::new()).unwrap();
        assert_eq!(uuids(&resolved.to_add), vec!["f1", "a1", "a2"]);
    }

    #[test]
    fn test_add_under_kept_parent_is_free() {
        let local = local_map(&[folder("f1", "")]);
        let queue = ProcessingQueue {
            to_keep: vec![folder("f1", "")],
            to_add: vec![leaf("a1", "f1")],
            to_delete: vec![],
        };
        let resolved = resolve(queue, &local).unwrap();
        assert_eq!(uuids(&resolved.to_add), vec!["a1"]);
        assert_eq!(uuids(&resolved.to_keep), vec!["f1"]);
    }

    #[test]
    fn test_deletes_are_child_first() {
        let f1 = folder("f1", "");
        let f2 = folder("f2", "f1");
        let a1 = leaf("a1", "f2");
        let local = local_map(&[f1.clone(), f2.clone(), a1.clone()]);
        let queue = ProcessingQueue {
            to_keep: vec![],
            to_add: vec![],
            to_delete: vec![f1, f2, a1],
        };
        let resolved = resolve(queue, &local).unwrap();
        assert_eq!(uuids(&resolved.to_delete), vec!["a1", "f2", "f1"]);
    }

    #[test]
    fn test_kept_descendant_of_deleted_album_is_lifted() {
        // f1 is re-created at the root (rename), a1 underneath survives
        // unchanged: a1 must be destroyed with the old tree and rebuilt
        // after the fresh f1 exists.
        let f1_old = album("f1", "old name", AlbumKind::Folder, "");
        let f1_new = album("f1", "new name", AlbumKind::Folder, "");
        let a1 = leaf("a1", "f1");
        let local = local_map(&[f1_old.clone(), a1.clone()]);
        let queue = ProcessingQueue {
            to_keep: vec![a1.clone()],
            to_add: vec![f1_new],
            to_delete: vec![f1_old],
        };
        let resolved = resolve(queue, &local).unwrap();
        assert!(resolved.to_keep.is_empty());
        assert_eq!(uuids(&resolved.to_delete), vec!["a1", "f1"]);
        assert_eq!(uuids(&resolved.to_add), vec!["f1", "a1"]);
    }

    #[test]
    fn test_lift_is_transitive() {
        // f1 deleted; f2 and a1 nested below are both kept and must both
        // lift, deepest removed first.
        let f1 = folder("f1", "");
        let f2 = folder("f2", "f1");
        let a1 = leaf("a1", "f2");
        let f1_new = album("f1", "renamed", AlbumKind::Folder, "");
        let local = local_map(&[f1.clone(), f2.clone(), a1.clone()]);
        let queue = ProcessingQueue {
            to_keep: vec![f2, a1],
            to_add: vec![f1_new],
            to_delete: vec![f1],
        };
        let resolved = resolve(queue, &local).unwrap();
        assert_eq!(uuids(&resolved.to_delete), vec!["a1", "f2", "f1"]);
        assert_eq!(uuids(&resolved.to_add), vec!["f1", "f2", "a1"]);
    }

    #[test]
    fn test_dangling_parent_is_invariant_violation() {
        // Remote deleted f1 but kept a1 pointing at it.
        let f1 = folder("f1", "");
        let a1 = leaf("a1", "f1");
        let local = local_map(&[f1.clone(), a1.clone()]);
        let queue = ProcessingQueue {
            to_keep: vec![a1],
            to_add: vec![],
            to_delete: vec![f1],
        };
        let err = resolve(queue, &local).unwrap_err();
        match err {
            SyncError::InvariantViolation { uuid, detail } => {
                assert_eq!(uuid, "a1");
                assert!(detail.contains("f1"));
            }
            other => panic!("expected invariant violation, got {other:?}"),
        }
    }

    #[test]
    fn test_cycle_is_invariant_violation() {
        let queue = ProcessingQueue {
            to_keep: vec![],
            to_add: vec![folder("f1", "f2"), folder("f2", "f1")],
            to_delete: vec![],
        };
        let err = resolve(queue, &HashMap::new()).unwrap_err();
        assert!(matches!(err, SyncError::InvariantViolation { .. }));
    }

    #[test]
    fn test_sibling_order_is_lexicographic() {
        let queue = ProcessingQueue {
            to_keep: vec![],
            to_add: vec![folder("fb", ""), folder("fa", ""), leaf("ac", "fa")],
            to_delete: vec![],
        };
        let resolved = resolve(queue, &HashMap::new()).unwrap();
        assert_eq!(uuids(&resolved.to_add), vec!["fa", "ac", "fb"]);
    }
}
