//! The on-disk library store.
//!
//! [`PhotoLibrary`] owns the local layout and is the only component that
//! mutates it. There is no index or database: the tree itself is the
//! persistent state, re-derived by [`PhotoLibrary::load_assets`] /
//! [`PhotoLibrary::load_albums`] at the start of every run. Each mutation
//! is atomic at the filesystem-object level; cross-operation recovery comes
//! from the next run's re-read.

pub mod layout;

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::errors::LibraryError;
use crate::models::{sanitize_name, Album, AlbumKind, Asset, AssetKind};

/// Handle to a library root on disk.
#[derive(Debug, Clone)]
pub struct PhotoLibrary {
    data_dir: PathBuf,
    asset_dir: PathBuf,
}

impl PhotoLibrary {
    /// Open (creating if necessary) the library rooted at `data_dir`.
    pub fn open(data_dir: impl Into<PathBuf>) -> Result<Self, LibraryError> {
        let data_dir = data_dir.into();
        let asset_dir = data_dir.join(layout::ASSET_DIR);
        fs::create_dir_all(&asset_dir)?;
        Ok(Self {
            data_dir,
            asset_dir,
        })
    }

    /// The library root; also the directory of the implicit root album.
    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    // -----------------------------------------------------------------------
    // Loading
    // -----------------------------------------------------------------------

    /// Enumerate the asset pool into a UUID-keyed map.
    ///
    /// Assets that live inside archived albums are under the album tree,
    /// not the pool, so they never show up here.
    pub fn load_assets(&self) -> Result<HashMap<String, Asset>, LibraryError> {
        let mut assets = HashMap::new();

        for entry in fs::read_dir(&self.asset_dir)? {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.starts_with('.') {
                debug!(name, "skipping dotfile in asset pool");
                continue;
            }
            let meta = entry.metadata()?;
            if !meta.is_file() {
                warn!(name, "asset pool entry is not a regular file, skipping");
                continue;
            }
            let Some((uuid, _ext)) = layout::parse_pool_name(&name) else {
                warn!(name, "asset pool entry does not fit the {{uuid}}.{{ext}} scheme");
                continue;
            };

            let modified = meta
                .modified()
                .map(DateTime::<Utc>::from)
                .unwrap_or_else(|_| Utc::now());

            assets.insert(
                uuid.to_string(),
                Asset {
                    uuid: uuid.to_string(),
                    filename: name.clone(),
                    size: meta.len(),
                    modified,
                    kind: AssetKind::Original,
                    download_url: None,
                    checksum: None,
                },
            );
        }

        debug!(count = assets.len(), "loaded local assets");
        Ok(assets)
    }

    /// Recursive descent over the album tree into a UUID-keyed map.
    ///
    /// Directory classification: subdirectories present -> Folder; regular
    /// files present without subdirectories -> Archived; otherwise (only
    /// symlinks, or empty) -> Album.
    pub fn load_albums(&self) -> Result<HashMap<String, Album>, LibraryError> {
        let mut albums = HashMap::new();
        self.scan_album_level(&self.data_dir, "", &mut albums)?;
        debug!(count = albums.len(), "loaded local albums");
        Ok(albums)
    }

    fn scan_album_level(
        &self,
        dir: &Path,
        parent_uuid: &str,
        out: &mut HashMap<String, Album>,
    ) -> Result<(), LibraryError> {
        for entry in fs::read_dir(dir)? {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().into_owned();
            if !entry.file_type()?.is_dir() {
                continue;
            }
            if name == layout::ASSET_DIR {
                continue;
            }
            let Some((uuid, label)) = layout::parse_album_dir_name(&name) else {
                debug!(name, "directory is not an album, skipping");
                continue;
            };
            let path = entry.path();
            let album = self.read_album_dir(&path, uuid, label, parent_uuid)?;
            let kind = album.kind;
            out.insert(uuid.to_string(), album);
            if kind == AlbumKind::Folder {
                self.scan_album_level(&path, uuid, out)?;
            }
        }
        Ok(())
    }

    fn read_album_dir(
        &self,
        path: &Path,
        uuid: &str,
        label: &str,
        parent_uuid: &str,
    ) -> Result<Album, LibraryError> {
        let mut subdirs = 0usize;
        let mut files = 0usize;
        let mut members = BTreeMap::new();

        for entry in fs::read_dir(path)? {
            let entry = entry?;
            let file_type = entry.file_type()?;
            let name = entry.file_name().to_string_lossy().into_owned();

            if file_type.is_dir() {
                subdirs += 1;
            } else if file_type.is_symlink() {
                let target = fs::read_link(entry.path())?;
                let target_name = target
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default();
                match layout::parse_pool_name(&target_name) {
                    Some((asset_uuid, _)) => {
                        members.insert(asset_uuid.to_string(), name);
                    }
                    None => {
                        warn!(
                            album = uuid,
                            link = name,
                            "album link target does not point into the asset pool"
                        );
                    }
                }
            } else if !name.starts_with('.') {
                files += 1;
            }
        }

        let kind = if subdirs > 0 {
            if files > 0 || !members.is_empty() {
                warn!(
                    album = uuid,
                    path = %path.display(),
                    "folder album has mixed contents, treating as folder"
                );
            }
            AlbumKind::Folder
        } else if files > 0 {
            warn!(
                album = uuid,
                path = %path.display(),
                "album contains user files, treating as archived and leaving untouched"
            );
            AlbumKind::Archived
        } else {
            AlbumKind::Album
        };

        Ok(Album {
            uuid: uuid.to_string(),
            name: label.to_string(),
            kind,
            parent_uuid: parent_uuid.to_string(),
            members: if kind == AlbumKind::Album {
                members
            } else {
                BTreeMap::new()
            },
        })
    }

    // -----------------------------------------------------------------------
    // Asset mutations
    // -----------------------------------------------------------------------

    /// Write asset bytes into the pool atomically and stamp the remote
    /// modification time.
    ///
    /// Idempotent: an already-present file matching the fingerprint is left
    /// untouched. Concurrent calls are safe because each asset targets a
    /// distinct filename.
    pub fn add_asset(&self, asset: &Asset, bytes: &[u8]) -> Result<(), LibraryError> {
        let path = self.asset_dir.join(asset.pool_name());

        if let Ok(meta) = fs::metadata(&path) {
            let mtime_matches = meta
                .modified()
                .map(|t| DateTime::<Utc>::from(t).timestamp() == asset.modified.timestamp())
                .unwrap_or(false);
            if meta.is_file() && meta.len() == asset.size && mtime_matches {
                debug!(uuid = %asset.uuid, "asset already present, skipping write");
                return Ok(());
            }
        }

        let mut tmp = tempfile::NamedTempFile::new_in(&self.asset_dir)?;
        tmp.write_all(bytes)?;
        let file = tmp.persist(&path).map_err(|e| e.error)?;
        file.set_modified(SystemTime::from(asset.modified))?;

        info!(uuid = %asset.uuid, filename = %asset.filename, size = asset.size, "asset written");
        Ok(())
    }

    /// Unlink an asset from the pool; no-op if it is already gone.
    pub fn remove_asset(&self, asset: &Asset) -> Result<(), LibraryError> {
        let path = self.asset_dir.join(asset.pool_name());
        match fs::remove_file(&path) {
            Ok(()) => {
                info!(uuid = %asset.uuid, "asset removed");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(uuid = %asset.uuid, "asset already absent");
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    // -----------------------------------------------------------------------
    // Album mutations
    // -----------------------------------------------------------------------

    /// Create the directory for an album under its parent, plus one relative
    /// symlink per member for leaf albums.
    ///
    /// The parent directory is resolved by UUID through the tree itself, so
    /// callers must add parents before children.
    pub fn add_album(&self, album: &Album) -> Result<(), LibraryError> {
        let parent_dir = self.album_dir(&album.parent_uuid)?;
        let dir = parent_dir.join(layout::album_dir_name(album));

        match fs::create_dir(&dir) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                debug!(uuid = %album.uuid, "album directory already exists");
            }
            Err(e) => return Err(e.into()),
        }

        if album.kind == AlbumKind::Album {
            let depth = dir
                .strip_prefix(&self.data_dir)
                .map(|rel| rel.components().count())
                .map_err(|_| LibraryError::InvalidLayout {
                    path: dir.display().to_string(),
                    detail: "album directory escapes the library root".into(),
                })?;

            for (asset_uuid, member_name) in &album.members {
                let link_path = dir.join(sanitize_name(member_name));
                let target = layout::link_target(depth, &layout::member_pool_name(asset_uuid, member_name));
                match fs::remove_file(&link_path) {
                    Ok(()) => {}
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                    Err(e) => return Err(e.into()),
                }
                make_symlink(&target, &link_path)?;
            }
        }

        info!(uuid = %album.uuid, name = %album.name, kind = %album.kind, "album written");
        Ok(())
    }

    /// Remove an album directory.
    ///
    /// Only permitted when the directory holds no subdirectories and no
    /// regular files; member links are removed first. An archived album
    /// trips the regular-file guard and the caller must treat that as fatal.
    pub fn remove_album(&self, uuid: &str) -> Result<(), LibraryError> {
        if uuid.is_empty() {
            return Err(LibraryError::AlbumNotFound(String::from("<root>")));
        }
        let dir = self.album_dir(uuid)?;

        let mut links = Vec::new();
        for entry in fs::read_dir(&dir)? {
            let entry = entry?;
            let file_type = entry.file_type()?;
            if file_type.is_dir() {
                return Err(LibraryError::AlbumNotEmpty {
                    uuid: uuid.to_string(),
                    detail: "contains subdirectories".into(),
                });
            }
            if file_type.is_symlink() {
                links.push(entry.path());
            } else {
                return Err(LibraryError::AlbumNotEmpty {
                    uuid: uuid.to_string(),
                    detail: "contains regular files".into(),
                });
            }
        }

        for link in links {
            fs::remove_file(link)?;
        }
        fs::remove_dir(&dir)?;

        info!(uuid, "album removed");
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Path resolution
    // -----------------------------------------------------------------------

    /// Resolve an album UUID to its directory by searching the tree. The
    /// empty UUID is the implicit root.
    fn album_dir(&self, uuid: &str) -> Result<PathBuf, LibraryError> {
        if uuid.is_empty() {
            return Ok(self.data_dir.clone());
        }
        find_album_dir(&self.data_dir, uuid)?
            .ok_or_else(|| LibraryError::AlbumNotFound(uuid.to_string()))
    }
}

fn find_album_dir(dir: &Path, uuid: &str) -> Result<Option<PathBuf>, LibraryError> {
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_dir() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().into_owned();
        let Some((dir_uuid, _)) = layout::parse_album_dir_name(&name) else {
            continue;
        };
        if dir_uuid == uuid {
            return Ok(Some(entry.path()));
        }
        if let Some(found) = find_album_dir(&entry.path(), uuid)? {
            return Ok(Some(found));
        }
    }
    Ok(None)
}

#[cfg(unix)]
fn make_symlink(target: &Path, link: &Path) -> Result<(), LibraryError> {
    std::os::unix::fs::symlink(target, link)?;
    Ok(())
}

#[cfg(not(unix))]
fn make_symlink(_target: &Path, _link: &Path) -> Result<(), LibraryError> {
    Err(LibraryError::SymlinksUnsupported)
}
