//! The remote library contract.
//!
//! The sync engine only ever sees typed records; projecting the remote's
//! loose JSON into [`Asset`] / [`Album`] entities happens at this boundary.
//! Asset metadata arrives as two parallel record streams (content and
//! master) joined by a shared record id, mirroring the remote's data model.

pub mod cloud;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::warn;

use crate::errors::RemoteError;
use crate::models::{Album, AlbumKind, Asset, AssetKind};

pub use cloud::CloudClient;

// ---------------------------------------------------------------------------
// Typed records
// ---------------------------------------------------------------------------

/// Byte-level half of an asset: where the content lives and how to verify it.
#[derive(Debug, Clone, Deserialize)]
pub struct AssetContentRecord {
    pub record_id: String,
    pub download_url: String,
    pub size: u64,
    #[serde(default)]
    pub checksum: Option<String>,
    #[serde(default)]
    pub kind: AssetKind,
}

/// Catalog half of an asset: identity and presentation metadata.
#[derive(Debug, Clone, Deserialize)]
pub struct AssetMasterRecord {
    pub record_id: String,
    pub filename: String,
    /// Seconds since the Unix epoch.
    pub modified: i64,
}

/// One remote album node, including the member listing for leaf albums.
#[derive(Debug, Clone, Deserialize)]
pub struct AlbumRecord {
    pub uuid: String,
    pub name: String,
    #[serde(default)]
    pub parent_uuid: String,
    pub kind: AlbumRecordKind,
    /// `asset UUID -> filename`; populated for `album` records only.
    #[serde(default)]
    pub members: std::collections::BTreeMap<String, String>,
}

/// Kind hint carried by a remote album record.
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AlbumRecordKind {
    Folder,
    Album,
}

// ---------------------------------------------------------------------------
// Transport trait
// ---------------------------------------------------------------------------

/// What the sync engine requires from the remote transport.
#[async_trait]
pub trait RemoteLibrary: Send + Sync {
    /// Fetch the full asset catalog as two joinable record streams.
    async fn fetch_all_assets(
        &self,
    ) -> Result<(Vec<AssetContentRecord>, Vec<AssetMasterRecord>), RemoteError>;

    /// Fetch the full album list.
    async fn fetch_all_albums(&self) -> Result<Vec<AlbumRecord>, RemoteError>;

    /// (Re-)establish the session. Idempotent; blocks until the session is
    /// usable or fails.
    async fn refresh_session(&self) -> Result<(), RemoteError>;

    /// Fetch asset bytes from a URL carried in a content record.
    async fn download(&self, url: &str) -> Result<Vec<u8>, RemoteError>;
}

// ---------------------------------------------------------------------------
// Projection into entities
// ---------------------------------------------------------------------------

/// Join content and master records by record id into [`Asset`] entities.
///
/// Records missing their counterpart are dropped with a warning; a half
/// record cannot be downloaded or named, and the next run will see it again
/// once the remote catalog is consistent.
pub fn join_asset_records(
    content: Vec<AssetContentRecord>,
    master: Vec<AssetMasterRecord>,
) -> Vec<Asset> {
    let mut masters: std::collections::HashMap<String, AssetMasterRecord> = master
        .into_iter()
        .map(|m| (m.record_id.clone(), m))
        .collect();

    let mut assets = Vec::with_capacity(content.len());
    for c in content {
        let Some(m) = masters.remove(&c.record_id) else {
            warn!(record_id = %c.record_id, "content record without master record, dropping");
            continue;
        };
        let modified: DateTime<Utc> = match DateTime::from_timestamp(m.modified, 0) {
            Some(ts) => ts,
            None => {
                warn!(record_id = %c.record_id, raw = m.modified, "unparseable modification time, dropping");
                continue;
            }
        };
        assets.push(Asset {
            uuid: c.record_id,
            filename: m.filename,
            size: c.size,
            modified,
            kind: c.kind,
            download_url: Some(c.download_url),
            checksum: c.checksum,
        });
    }

    for record_id in masters.keys() {
        warn!(%record_id, "master record without content record, dropping");
    }

    assets
}

/// Project album records into [`Album`] entities.
pub fn project_album_records(records: Vec<AlbumRecord>) -> Vec<Album> {
    records
        .into_iter()
        .map(|r| Album {
            uuid: r.uuid,
            name: r.name,
            kind: match r.kind {
                AlbumRecordKind::Folder => AlbumKind::Folder,
                AlbumRecordKind::Album => AlbumKind::Album,
            },
            parent_uuid: r.parent_uuid,
            members: match r.kind {
                AlbumRecordKind::Album => r.members,
                AlbumRecordKind::Folder => Default::default(),
            },
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn content(id: &str, size: u64) -> AssetContentRecord {
        AssetContentRecord {
            record_id: id.into(),
            download_url: format!("https://cdn.example.com/{id}"),
            size,
            checksum: None,
            kind: AssetKind::Original,
        }
    }

    fn master(id: &str, filename: &str, modified: i64) -> AssetMasterRecord {
        AssetMasterRecord {
            record_id: id.into(),
            filename: filename.into(),
            modified,
        }
    }

    #[test]
    fn test_join_matches_by_record_id() {
        let assets = join_asset_records(
            vec![content("a1", 100), content("a2", 200)],
            vec![master("a2", "two.jpg", 20), master("a1", "one.jpg", 10)],
        );
        assert_eq!(assets.len(), 2);
        let a1 = assets.iter().find(|a| a.uuid == "a1").unwrap();
        assert_eq!(a1.filename, "one.jpg");
        assert_eq!(a1.size, 100);
        assert_eq!(a1.modified.timestamp(), 10);
        assert!(a1.download_url.is_some());
    }

    #[test]
    fn test_join_drops_half_records() {
        let assets = join_asset_records(
            vec![content("a1", 100), content("orphan", 1)],
            vec![master("a1", "one.jpg", 10), master("widow", "w.jpg", 5)],
        );
        assert_eq!(assets.len(), 1);
        assert_eq!(assets[0].uuid, "a1");
    }

    #[test]
    fn test_album_projection_strips_folder_members() {
        let records = vec![AlbumRecord {
            uuid: "f1".into(),
            name: "Trips".into(),
            parent_uuid: String::new(),
            kind: AlbumRecordKind::Folder,
            members: std::collections::BTreeMap::from([("a1".to_string(), "x.jpg".to_string())]),
        }];
        let albums = project_album_records(records);
        assert_eq!(albums[0].kind, AlbumKind::Folder);
        assert!(albums[0].members.is_empty());
    }

    #[test]
    fn test_album_record_kind_parses() {
        let json = r#"{"uuid":"al1","name":"Summer","parent_uuid":"f1","kind":"album","members":{"a1":"beach.jpg"}}"#;
        let record: AlbumRecord = serde_json::from_str(json).unwrap();
        assert_eq!(record.kind, AlbumRecordKind::Album);
        let albums = project_album_records(vec![record]);
        assert_eq!(albums[0].members["a1"], "beach.jpg");
    }
}
