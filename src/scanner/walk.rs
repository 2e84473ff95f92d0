//! Live filesystem walker producing a per-run snapshot.
//!
//! Strictly sequential, depth-first and top-down: directory records are
//! folded into the snapshot before their children, excluded subtrees are
//! pruned without descending, and per-file stats only happen for
//! directories whose ctime moved since the cached catalog state.

use std::collections::HashSet;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use crate::catalog::entities::DirectoryCache;
use crate::core::errors::{MtsError, Result};
use crate::scanner::exclusion::ExclusionFilter;
use crate::scanner::snapshot::{
    DirSnapshot, FileStat, IMAGE_OBJECTS_DIR, IMAGE_SUMMARY_FILE, REPO_METADATA_DIR, Snapshot,
};

/// Walks one category tree rooted at a local path.
pub struct TreeScanner<'a> {
    root: &'a Path,
    filter: &'a ExclusionFilter,
}

impl<'a> TreeScanner<'a> {
    #[must_use]
    pub fn new(root: &'a Path, filter: &'a ExclusionFilter) -> Self {
        Self { root, filter }
    }

    /// Walk the tree and produce a snapshot.
    ///
    /// `cache` supplies known ctimes for change detection; paths found
    /// unreadable (directly or through an unreadable parent) are added to
    /// `unreadable`. A missing root yields an empty snapshot.
    pub fn scan(
        &self,
        cache: &DirectoryCache,
        unreadable: &mut HashSet<String>,
    ) -> Result<Snapshot> {
        let mut snapshot = Snapshot::new();
        let Some(meta) = stat_path(self.root)? else {
            return Ok(snapshot);
        };
        if !meta.is_dir() {
            return Ok(snapshot);
        }
        self.walk_dir("", &meta, true, cache, unreadable, &mut snapshot)?;
        Ok(snapshot)
    }

    fn abs(&self, relative: &str) -> PathBuf {
        if relative.is_empty() {
            self.root.to_path_buf()
        } else {
            self.root.join(relative)
        }
    }

    #[allow(clippy::too_many_lines)]
    fn walk_dir(
        &self,
        relative: &str,
        meta: &fs::Metadata,
        parent_readable: bool,
        cache: &DirectoryCache,
        unreadable: &mut HashSet<String>,
        snapshot: &mut Snapshot,
    ) -> Result<()> {
        let abs = self.abs(relative);
        let ctime = dir_ctime(meta);
        // Unreadable status propagates from parent to child: a readable
        // directory below an unreadable one is still unreachable for
        // mirror clients.
        let readable = parent_readable && other_readable(meta);
        if !readable {
            unreadable.insert(relative.to_string());
        }
        let changed = cache.get(relative).is_none_or(|c| c.ctime != ctime);

        let mut entry = DirSnapshot {
            readable,
            ctime,
            changed,
            ..DirSnapshot::default()
        };
        let mut has_summary_file = false;
        let mut has_objects_dir = false;
        let mut subdirs: Vec<String> = Vec::new();

        let dirents = match fs::read_dir(&abs) {
            Ok(dirents) => Some(dirents),
            Err(err) if is_skippable(&err) => None,
            Err(err) => return Err(MtsError::io(&abs, err)),
        };

        if let Some(dirents) = dirents {
            for dirent in dirents {
                // Entries that vanish between discovery and stat are
                // skipped, never fatal.
                let Ok(dirent) = dirent else { continue };
                let name = dirent.file_name().to_string_lossy().into_owned();
                let Ok(file_type) = dirent.file_type() else {
                    continue;
                };

                let is_dir = if file_type.is_symlink() {
                    match stat_path(&dirent.path())? {
                        Some(target) => target.is_dir(),
                        None => continue,
                    }
                } else {
                    file_type.is_dir()
                };

                if is_dir {
                    match name.as_str() {
                        REPO_METADATA_DIR => entry.is_repository = true,
                        IMAGE_OBJECTS_DIR => has_objects_dir = true,
                        _ => {}
                    }
                    // Symlinked directories are recorded as markers but
                    // never descended into.
                    if !file_type.is_symlink() {
                        let child_rel = join_rel(relative, &name);
                        if !self.filter.is_excluded(&child_rel) {
                            subdirs.push(child_rel);
                        }
                    }
                    continue;
                }

                if name == IMAGE_SUMMARY_FILE {
                    has_summary_file = true;
                }
                if !changed {
                    continue;
                }
                let file_meta = if file_type.is_symlink() {
                    stat_path(&dirent.path())?
                } else {
                    match dirent.metadata() {
                        Ok(m) => Some(m),
                        Err(err) if is_skippable(&err) => None,
                        Err(err) => return Err(MtsError::io(dirent.path(), err)),
                    }
                };
                if let Some(file_meta) = file_meta {
                    entry.files.insert(
                        name,
                        FileStat {
                            size: file_meta.len(),
                            mod_time: file_mtime(&file_meta),
                        },
                    );
                }
            }
        }

        entry.is_atomic = has_summary_file && has_objects_dir;
        snapshot.entries.insert(relative.to_string(), entry);

        subdirs.sort_unstable();
        for child_rel in subdirs {
            let Some(child_meta) = stat_path(&self.abs(&child_rel))? else {
                continue;
            };
            if child_meta.is_dir() {
                self.walk_dir(&child_rel, &child_meta, readable, cache, unreadable, snapshot)?;
            }
        }
        Ok(())
    }
}

fn join_rel(parent: &str, name: &str) -> String {
    if parent.is_empty() {
        name.to_string()
    } else {
        format!("{parent}/{name}")
    }
}

/// Classified stat: missing and permission-denied entries are a skip,
/// anything else propagates.
pub(crate) fn stat_path(path: &Path) -> Result<Option<fs::Metadata>> {
    match fs::metadata(path) {
        Ok(meta) => Ok(Some(meta)),
        Err(err) if is_skippable(&err) => Ok(None),
        Err(err) => Err(MtsError::io(path, err)),
    }
}

pub(crate) fn is_skippable(err: &std::io::Error) -> bool {
    matches!(
        err.kind(),
        ErrorKind::NotFound | ErrorKind::PermissionDenied
    )
}

#[cfg(unix)]
fn dir_ctime(meta: &fs::Metadata) -> i64 {
    use std::os::unix::fs::MetadataExt;
    meta.ctime()
}

#[cfg(not(unix))]
fn dir_ctime(meta: &fs::Metadata) -> i64 {
    mtime_fallback(meta)
}

#[cfg(unix)]
pub(crate) fn file_mtime(meta: &fs::Metadata) -> i64 {
    use std::os::unix::fs::MetadataExt;
    meta.mtime()
}

#[cfg(not(unix))]
pub(crate) fn file_mtime(meta: &fs::Metadata) -> i64 {
    mtime_fallback(meta)
}

#[cfg(not(unix))]
#[allow(clippy::cast_possible_wrap)]
fn mtime_fallback(meta: &fs::Metadata) -> i64 {
    meta.modified()
        .ok()
        .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
        .map_or(0, |d| d.as_secs() as i64)
}

/// Readability for mirror clients: "other" read and execute bits.
#[cfg(unix)]
fn other_readable(meta: &fs::Metadata) -> bool {
    use std::os::unix::fs::MetadataExt;
    meta.mode() & 0o005 == 0o005
}

#[cfg(not(unix))]
fn other_readable(_meta: &fs::Metadata) -> bool {
    true
}
