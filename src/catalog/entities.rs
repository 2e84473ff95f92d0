//! Catalog entities: what the engine persists about a mirror tree.

#![allow(missing_docs)]

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

/// A named top-level tree under synchronization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Category {
    pub id: i64,
    pub name: String,
    /// Product the tree belongs to; taxonomy lookups key on this.
    pub product: String,
    /// Logical name prefix of all directory rows in this tree.
    pub topdir_name: String,
}

/// Per-file summary entry stored inside a directory row.
///
/// Checksums are normally empty here; they normalize into [`FileDetail`]
/// rows and only appear inline for rows imported from older catalogs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct FileMeta {
    pub size: u64,
    pub timestamp: i64,
    #[serde(default, skip_serializing_if = "ChecksumSet::is_empty")]
    pub checksums: ChecksumSet,
}

/// Size-bounded file summary: filename → metadata, lexically ordered.
pub type FileSummary = BTreeMap<String, FileMeta>;

/// A persisted directory row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Directory {
    pub id: i64,
    /// Full logical name: topdir name + `/` + tree-relative path.
    pub name: String,
    pub readable: bool,
    pub ctime: i64,
    pub files: FileSummary,
}

/// A package or image repository bound to one directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Repository {
    pub id: i64,
    /// Synthesized public handle; nullable for historical rows.
    pub prefix: Option<String>,
    /// Display name, equal to the directory's full name.
    pub name: String,
    pub category_id: i64,
    pub version_id: Option<i64>,
    pub architecture_id: Option<i64>,
    pub directory_id: i64,
}

/// A product version, looked up or created from path conventions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Version {
    pub id: i64,
    pub product: String,
    pub name: String,
}

/// A hardware architecture name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Architecture {
    pub id: i64,
    pub name: String,
}

/// Checksum values for one file; any subset of kinds may be present.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ChecksumSet {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub md5: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sha1: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sha256: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sha512: Option<String>,
}

impl ChecksumSet {
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.md5.is_none() && self.sha1.is_none() && self.sha256.is_none() && self.sha512.is_none()
    }
}

/// Persisted checksum + size + timestamp record for one file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileDetail {
    pub id: i64,
    pub directory_id: i64,
    pub filename: String,
    pub size: Option<u64>,
    pub timestamp: Option<i64>,
    pub checksums: ChecksumSet,
}

/// Cached view of a known directory row, keyed by tree-relative path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CachedDir {
    pub id: i64,
    pub readable: bool,
    pub ctime: i64,
}

/// Relative path → known directory record, rebuilt per category run.
pub type DirectoryCache = HashMap<String, CachedDir>;
