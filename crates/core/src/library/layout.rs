//! On-disk naming scheme for the library tree.
//!
//! The asset pool is a flat directory of `{UUID}.{ext}` files. Album
//! directories are named `.{UUID}-{safeName}`: the leading dot keeps them
//! out of casual directory listings, and the UUID prefix lets the loader
//! recover identity without any side database.

use std::path::PathBuf;

use crate::models::Album;

/// Name of the asset pool directory under the library root.
pub const ASSET_DIR: &str = "assets";

/// Directory name for an album: `.{uuid}-{sanitized label}`.
pub fn album_dir_name(album: &Album) -> String {
    format!(".{}-{}", album.uuid, album.safe_name())
}

/// Recover `(uuid, label)` from an album directory name.
///
/// Strips the leading `.` and reads the UUID up to the first `-`; the rest
/// is the sanitized label.
pub fn parse_album_dir_name(name: &str) -> Option<(&str, &str)> {
    let rest = name.strip_prefix('.')?;
    let (uuid, label) = rest.split_once('-')?;
    if uuid.is_empty() {
        return None;
    }
    Some((uuid, label))
}

/// Recover `(uuid, extension)` from an asset pool file name.
pub fn parse_pool_name(name: &str) -> Option<(&str, &str)> {
    match name.rsplit_once('.') {
        Some((uuid, ext)) if !uuid.is_empty() => Some((uuid, ext)),
        Some(_) => None,
        None => Some((name, "")),
    }
}

/// Pool file name for an album member: the asset UUID carrying the member
/// filename's extension.
pub fn member_pool_name(asset_uuid: &str, member_name: &str) -> String {
    match member_name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => format!("{asset_uuid}.{ext}"),
        _ => asset_uuid.to_string(),
    }
}

/// Relative symlink target from an album directory `depth` levels below the
/// library root into the asset pool.
pub fn link_target(depth: usize, pool_name: &str) -> PathBuf {
    let mut target = PathBuf::new();
    for _ in 0..depth {
        target.push("..");
    }
    target.push(ASSET_DIR);
    target.push(pool_name);
    target
}
