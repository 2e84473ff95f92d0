//! Manifest-derived checksum harvesting.
//!
//! Mirror trees ship sidecar manifests (`MD5SUMS`, `SHA256SUMS`,
//! `*-CHECKSUM`, …) whose lines pair a hex digest with a filename. Each
//! checksum kind has its own glob set; filenames found under any kind are
//! unioned, the real files stat'd, and one detail row recorded per file
//! with whichever digests were found.

#![allow(missing_docs)]

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;

use crate::catalog::entities::{ChecksumSet, Directory};
use crate::catalog::store::{CatalogStore, NewFileDetail};
use crate::core::errors::{MtsError, Result};
use crate::scanner::walk::{file_mtime, is_skippable, stat_path};

/// The four checksum kinds harvested from manifests, keyed by digest
/// length in hex characters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChecksumKind {
    Md5,
    Sha1,
    Sha256,
    Sha512,
}

impl ChecksumKind {
    pub const ALL: [Self; 4] = [Self::Md5, Self::Sha1, Self::Sha256, Self::Sha512];

    /// Expected digest length in hex characters.
    #[must_use]
    pub const fn hex_len(self) -> usize {
        match self {
            Self::Md5 => 32,
            Self::Sha1 => 40,
            Self::Sha256 => 64,
            Self::Sha512 => 128,
        }
    }

    /// Manifest filename globs for this kind.
    #[must_use]
    pub const fn manifest_globs(self) -> &'static [&'static str] {
        match self {
            Self::Md5 => &["MD5SUMS", "MD5SUM", "*.md5sum", "*.md5"],
            Self::Sha1 => &["SHA1SUMS", "SHA1SUM", "*.sha1sum", "*.sha1"],
            Self::Sha256 => &["SHA256SUMS", "*-CHECKSUM", "*.sha256sum", "*.sha256"],
            Self::Sha512 => &["SHA512SUMS", "*.sha512sum", "*.sha512"],
        }
    }

    fn set(self, checksums: &mut ChecksumSet, digest: String) {
        match self {
            Self::Md5 => checksums.md5 = Some(digest),
            Self::Sha1 => checksums.sha1 = Some(digest),
            Self::Sha256 => checksums.sha256 = Some(digest),
            Self::Sha512 => checksums.sha512 = Some(digest),
        }
    }
}

/// Shell-style glob over a single filename: `*` matches any run of
/// characters, `?` exactly one, everything else is literal.
fn glob_to_regex(glob: &str) -> String {
    let mut pattern = String::with_capacity(glob.len() + 8);
    pattern.push('^');
    for ch in glob.chars() {
        match ch {
            '*' => pattern.push_str(".*"),
            '?' => pattern.push('.'),
            other => pattern.push_str(&regex::escape(&other.to_string())),
        }
    }
    pattern.push('$');
    pattern
}

static MANIFEST_PATTERNS: LazyLock<Vec<(ChecksumKind, Vec<Regex>)>> = LazyLock::new(|| {
    ChecksumKind::ALL
        .into_iter()
        .map(|kind| {
            let compiled = kind
                .manifest_globs()
                .iter()
                .map(|glob| Regex::new(&glob_to_regex(glob)).expect("hard-coded pattern"))
                .collect();
            (kind, compiled)
        })
        .collect()
});

/// Parse one manifest line as `<hex digest> <filename>`, tolerating a
/// leading `*` on the filename. Digests of the wrong length, non-hex
/// digests and filenames pointing outside the directory are rejected.
fn parse_digest_line(line: &str, hex_len: usize) -> Option<(String, &str)> {
    let fields: Vec<&str> = line.split_whitespace().collect();
    let &[digest, filename] = fields.as_slice() else {
        return None;
    };
    if digest.len() != hex_len || !digest.bytes().all(|b| b.is_ascii_hexdigit()) {
        return None;
    }
    let filename = filename.strip_prefix('*').unwrap_or(filename);
    if filename.is_empty() || filename.contains('/') {
        return None;
    }
    Some((digest.to_ascii_lowercase(), filename))
}

/// Harvest manifest checksums for one directory.
///
/// `dir_path` is the directory's location on the local filesystem;
/// `directory` is its catalog row. Returns the number of detail rows
/// created; rows already matching exactly are left untouched.
pub fn harvest_manifests(
    dir_path: &Path,
    directory: &Directory,
    store: &mut dyn CatalogStore,
) -> Result<usize> {
    let names = match fs::read_dir(dir_path) {
        Ok(dirents) => dirents
            .filter_map(|dirent| {
                dirent
                    .ok()
                    .map(|d| d.file_name().to_string_lossy().into_owned())
            })
            .collect::<Vec<String>>(),
        Err(err) if is_skippable(&err) => return Ok(0),
        Err(err) => return Err(MtsError::io(dir_path, err)),
    };

    let mut found: BTreeMap<String, ChecksumSet> = BTreeMap::new();
    for (kind, patterns) in MANIFEST_PATTERNS.iter() {
        for name in names
            .iter()
            .filter(|name| patterns.iter().any(|p| p.is_match(name)))
        {
            let bytes = match fs::read(dir_path.join(name)) {
                Ok(bytes) => bytes,
                Err(err) if is_skippable(&err) => continue,
                Err(err) => return Err(MtsError::io(dir_path.join(name), err)),
            };
            let content = String::from_utf8_lossy(&bytes);
            for line in content.lines() {
                if let Some((digest, filename)) = parse_digest_line(line, kind.hex_len()) {
                    kind.set(found.entry(filename.to_string()).or_default(), digest);
                }
            }
        }
    }

    let mut created = 0;
    for (filename, checksums) in &found {
        // The named file may have been removed since the manifest was
        // written; that is not an error.
        let Some(meta) = stat_path(&dir_path.join(filename))? else {
            continue;
        };
        let detail = NewFileDetail {
            directory_id: directory.id,
            filename,
            size: Some(meta.len()),
            timestamp: Some(file_mtime(&meta)),
            checksums,
        };
        if store.file_detail_exact(&detail)?.is_none() {
            store.create_file_detail(&detail)?;
            created += 1;
        }
    }
    Ok(created)
}
