//! Domain model types for the PhotoSync library.
//!
//! [`Asset`] and [`Album`] are the two entity kinds the sync pipeline moves
//! around. Both are keyed by a remote-assigned UUID string; equality for the
//! differ is a *fingerprint* comparison ([`Asset::same_state`],
//! [`Album::same_state`]), never full structural equality.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Asset
// ---------------------------------------------------------------------------

/// Kind of a single media asset.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum AssetKind {
    /// The camera original.
    #[default]
    Original,
    /// A user-edited derivative.
    Edit,
    /// The video part of a live photo.
    LivePhotoPart,
}

impl std::fmt::Display for AssetKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Original => write!(f, "original"),
            Self::Edit => write!(f, "edit"),
            Self::LivePhotoPart => write!(f, "live-photo-part"),
        }
    }
}

/// A single photo or video file.
///
/// The bytes of an asset live exactly once in the asset pool, in a file
/// named `{uuid}.{ext}`. Instances loaded from disk carry no download URL
/// or checksum; instances projected from remote records usually carry both.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Asset {
    /// Remote-assigned stable identifier.
    pub uuid: String,
    /// Human-visible filename including extension.
    pub filename: String,
    /// Size in bytes.
    pub size: u64,
    /// Modification time; compared at second granularity.
    pub modified: DateTime<Utc>,
    /// Kind tag.
    pub kind: AssetKind,
    /// Where to fetch the bytes (remote-built assets only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub download_url: Option<String>,
    /// Hex-encoded SHA-256 of the bytes, when the remote advertises one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub checksum: Option<String>,
}

impl Asset {
    /// The filename extension, without the leading dot. Empty if none.
    pub fn extension(&self) -> &str {
        match self.filename.rsplit_once('.') {
            Some((stem, ext)) if !stem.is_empty() => ext,
            _ => "",
        }
    }

    /// The file name this asset occupies in the asset pool.
    pub fn pool_name(&self) -> String {
        let ext = self.extension();
        if ext.is_empty() {
            self.uuid.clone()
        } else {
            format!("{}.{}", self.uuid, ext)
        }
    }

    /// Fingerprint comparison for the differ.
    ///
    /// When both sides advertise a content hash, the hash decides; otherwise
    /// size plus modification time truncated to whole seconds. Membership in
    /// albums does not participate (it is carried by album entities).
    pub fn same_state(&self, other: &Asset) -> bool {
        if let (Some(a), Some(b)) = (&self.checksum, &other.checksum) {
            return a.eq_ignore_ascii_case(b);
        }
        self.size == other.size && self.modified.timestamp() == other.modified.timestamp()
    }
}

// ---------------------------------------------------------------------------
// Album
// ---------------------------------------------------------------------------

/// Kind of an album node.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum AlbumKind {
    /// Contains only child albums.
    Folder,
    /// Contains only asset members, materialized as symbolic links.
    Album,
    /// User-owned regular files; opaque to sync.
    Archived,
}

impl std::fmt::Display for AlbumKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Folder => write!(f, "FOLDER"),
            Self::Album => write!(f, "ALBUM"),
            Self::Archived => write!(f, "ARCHIVED"),
        }
    }
}

/// A node in the hierarchical album tree.
///
/// The root album is implicit (UUID and parent both empty) and never
/// materializes as an entity; `parent_uuid == ""` means "directly under the
/// library root".
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Album {
    /// Remote-assigned stable identifier; empty only for the implicit root.
    pub uuid: String,
    /// Human label.
    pub name: String,
    /// Kind tag.
    pub kind: AlbumKind,
    /// UUID of the enclosing album; empty = root.
    pub parent_uuid: String,
    /// Asset members, `asset UUID -> human-visible filename`. Only albums of
    /// kind [`AlbumKind::Album`] carry members; ordered for deterministic
    /// link creation.
    #[serde(default)]
    pub members: BTreeMap<String, String>,
}

impl Album {
    /// The label in on-disk-safe form, used both for the directory name and
    /// for fingerprint comparison (local labels are recovered from directory
    /// names that already went through sanitization).
    pub fn safe_name(&self) -> String {
        sanitize_name(&self.name)
    }

    /// Fingerprint comparison for the differ.
    ///
    /// (kind, sanitized label, parent UUID, members). A local archived album
    /// is opaque: it matches any remote record with the same UUID so that
    /// the remote entry never produces an add against it.
    pub fn same_state(&self, other: &Album) -> bool {
        if self.kind == AlbumKind::Archived || other.kind == AlbumKind::Archived {
            return self.uuid == other.uuid;
        }
        self.kind == other.kind
            && self.safe_name() == other.safe_name()
            && self.parent_uuid == other.parent_uuid
            && self.members == other.members
    }
}

/// Replace path separators and control characters so a remote label can be
/// used as a single path component.
pub fn sanitize_name(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c == '/' || c == '\\' || c.is_control() {
                '_'
            } else {
                c
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn asset(uuid: &str, filename: &str, size: u64, secs: i64) -> Asset {
        Asset {
            uuid: uuid.into(),
            filename: filename.into(),
            size,
            modified: Utc.timestamp_opt(secs, 0).unwrap(),
            kind: AssetKind::Original,
            download_url: None,
            checksum: None,
        }
    }

    #[test]
    fn test_pool_name_and_extension() {
        let a = asset("a1", "IMG_0001.JPG", 100, 10);
        assert_eq!(a.extension(), "JPG");
        assert_eq!(a.pool_name(), "a1.JPG");

        let bare = asset("a2", "noextension", 1, 1);
        assert_eq!(bare.extension(), "");
        assert_eq!(bare.pool_name(), "a2");

        // A leading dot is not an extension separator.
        let dotfile = asset("a3", ".hidden", 1, 1);
        assert_eq!(dotfile.extension(), "");
    }

    #[test]
    fn test_asset_fingerprint_size_and_mtime() {
        let a = asset("a1", "x.jpg", 100, 10);
        let b = asset("a1", "renamed.jpg", 100, 10);
        // Filename does not participate in the fingerprint.
        assert!(a.same_state(&b));

        let changed = asset("a1", "x.jpg", 100, 11);
        assert!(!a.same_state(&changed));

        let resized = asset("a1", "x.jpg", 101, 10);
        assert!(!a.same_state(&resized));
    }

    #[test]
    fn test_asset_fingerprint_prefers_checksum() {
        let mut a = asset("a1", "x.jpg", 100, 10);
        let mut b = asset("a1", "x.jpg", 100, 99);
        a.checksum = Some("AABB".into());
        b.checksum = Some("aabb".into());
        // Hashes agree (case-insensitively), mtime difference is ignored.
        assert!(a.same_state(&b));

        b.checksum = Some("ffff".into());
        assert!(!a.same_state(&b));
    }

    #[test]
    fn test_album_fingerprint() {
        let a = Album {
            uuid: "f1".into(),
            name: "Trips".into(),
            kind: AlbumKind::Folder,
            parent_uuid: String::new(),
            members: BTreeMap::new(),
        };
        let mut b = a.clone();
        assert!(a.same_state(&b));

        b.parent_uuid = "f2".into();
        assert!(!a.same_state(&b));

        let mut renamed = a.clone();
        renamed.name = "Journeys".into();
        assert!(!a.same_state(&renamed));
    }

    #[test]
    fn test_album_fingerprint_members() {
        let mut a = Album {
            uuid: "a1".into(),
            name: "Summer".into(),
            kind: AlbumKind::Album,
            parent_uuid: "f1".into(),
            members: BTreeMap::from([("u1".to_string(), "beach.jpg".to_string())]),
        };
        let b = a.clone();
        assert!(a.same_state(&b));

        a.members.insert("u2".into(), "dunes.jpg".into());
        assert!(!a.same_state(&b));
    }

    #[test]
    fn test_archived_matches_any_same_uuid() {
        let local = Album {
            uuid: "f1".into(),
            name: "2019".into(),
            kind: AlbumKind::Archived,
            parent_uuid: String::new(),
            members: BTreeMap::new(),
        };
        let remote = Album {
            uuid: "f1".into(),
            name: "2019 renamed".into(),
            kind: AlbumKind::Folder,
            parent_uuid: "other".into(),
            members: BTreeMap::new(),
        };
        assert!(local.same_state(&remote));
        assert!(remote.same_state(&local));
    }

    #[test]
    fn test_sanitize_name() {
        assert_eq!(sanitize_name("Trip/2019"), "Trip_2019");
        assert_eq!(sanitize_name("back\\slash"), "back_slash");
        assert_eq!(sanitize_name("tab\there"), "tab_here");
        assert_eq!(sanitize_name("plain name"), "plain name");
    }
}
