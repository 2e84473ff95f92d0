//! Ephemeral per-run snapshot of observed directory state.

#![allow(missing_docs)]

use std::collections::BTreeMap;

/// Subdirectory marking its parent as a package repository.
pub const REPO_METADATA_DIR: &str = "repodata";
/// Metadata file living inside [`REPO_METADATA_DIR`].
pub const REPO_METADATA_FILE: &str = "repomd.xml";
/// Summary file marking a content-addressed image tree.
pub const IMAGE_SUMMARY_FILE: &str = "summary";
/// Object store subdirectory accompanying [`IMAGE_SUMMARY_FILE`].
pub const IMAGE_OBJECTS_DIR: &str = "objects";

/// Size and modification time observed for one file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileStat {
    /// Size in bytes.
    pub size: u64,
    /// Modification time, seconds since the epoch.
    pub mod_time: i64,
}

/// Observed state of one directory, discarded after reconciliation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirSnapshot {
    /// Filename → stat, populated only when the directory changed.
    pub files: BTreeMap<String, FileStat>,
    /// A `repodata` child subdirectory was observed.
    pub is_repository: bool,
    /// A `summary` file plus an `objects` child were both observed.
    pub is_atomic: bool,
    pub readable: bool,
    pub ctime: i64,
    /// ctime differs from the cached catalog value (or the path is new).
    pub changed: bool,
}

impl Default for DirSnapshot {
    fn default() -> Self {
        Self {
            files: BTreeMap::new(),
            is_repository: false,
            is_atomic: false,
            readable: true,
            ctime: 0,
            changed: true,
        }
    }
}

/// One run's snapshot: tree-relative path → observed state, lexically
/// ordered so the root (empty key) always reconciles first.
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    pub entries: BTreeMap<String, DirSnapshot>,
}

impl Snapshot {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of directories observed.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[must_use]
    pub fn get(&self, relative: &str) -> Option<&DirSnapshot> {
        self.entries.get(relative)
    }

    /// Entry for `relative`, created with defaults when absent.
    pub fn entry_mut(&mut self, relative: &str) -> &mut DirSnapshot {
        self.entries.entry(relative.to_string()).or_default()
    }
}
