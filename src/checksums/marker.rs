//! Marker-file checksum extraction.
//!
//! The metadata marker of a repository (`repomd.xml` or an image-tree
//! `summary`) is hashed directly over its content with all four checksum
//! kinds, then recorded against the directory holding it.

use std::fs;
use std::path::Path;
use std::sync::LazyLock;

use md5::Md5;
use regex::Regex;
use sha1::Sha1;
use sha2::{Digest, Sha256, Sha512};

use crate::catalog::entities::{ChecksumSet, Directory};
use crate::catalog::store::{CatalogStore, NewFileDetail};
use crate::core::errors::Result;
use crate::reconcile::repository::RepoKind;
use crate::scanner::walk::{file_mtime, stat_path};

/// Timestamp fields embedded in package-repo metadata. Values may carry a
/// fractional part; the largest one wins.
static EMBEDDED_TIMESTAMP_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"<timestamp>\s*([0-9]+(?:\.[0-9]+)?)\s*</timestamp>").expect("hard-coded pattern")
});

/// Compute all four checksum kinds over one buffer.
#[must_use]
pub fn checksum_bytes(bytes: &[u8]) -> ChecksumSet {
    ChecksumSet {
        md5: Some(format!("{:x}", Md5::digest(bytes))),
        sha1: Some(format!("{:x}", Sha1::digest(bytes))),
        sha256: Some(format!("{:x}", Sha256::digest(bytes))),
        sha512: Some(format!("{:x}", Sha512::digest(bytes))),
    }
}

#[allow(clippy::cast_possible_truncation)]
fn embedded_timestamp(content: &str) -> Option<i64> {
    EMBEDDED_TIMESTAMP_RE
        .captures_iter(content)
        .filter_map(|captures| captures[1].parse::<f64>().ok())
        .fold(None, |max, value| {
            let value = value.floor() as i64;
            Some(max.map_or(value, |m: i64| m.max(value)))
        })
}

/// Hash a marker file and record a detail row for it.
///
/// The canonical timestamp comes from the metadata's embedded timestamp
/// fields for package repos (falling back to the file's mtime when absent);
/// image-tree summaries always use the file mtime, since the true
/// generation time would require parsing the summary payload. Returns
/// whether a new row was created; a vanished or unreadable marker is a
/// silent skip.
pub fn extract_marker_details(
    marker_path: &Path,
    kind: RepoKind,
    directory: &Directory,
    store: &mut dyn CatalogStore,
) -> Result<bool> {
    let Some(meta) = stat_path(marker_path)? else {
        return Ok(false);
    };
    let bytes = match fs::read(marker_path) {
        Ok(bytes) => bytes,
        Err(err) if crate::scanner::walk::is_skippable(&err) => return Ok(false),
        Err(err) => return Err(crate::core::errors::MtsError::io(marker_path, err)),
    };

    let checksums = checksum_bytes(&bytes);
    let mtime = file_mtime(&meta);
    let timestamp = match kind {
        RepoKind::PackageRepo => {
            embedded_timestamp(&String::from_utf8_lossy(&bytes)).unwrap_or(mtime)
        }
        RepoKind::ImageTree => mtime,
    };

    let filename = marker_path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    let detail = NewFileDetail {
        directory_id: directory.id,
        filename: &filename,
        size: Some(meta.len()),
        timestamp: Some(timestamp),
        checksums: &checksums,
    };
    if store.file_detail_exact(&detail)?.is_none() {
        store.create_file_detail(&detail)?;
        return Ok(true);
    }
    Ok(false)
}
