//! Change reconciliation: snapshot vs. cached catalog state.
//!
//! A run is strictly sequential over one category. Pass one persists
//! structural deltas in lexical path order (root first) and harvests
//! manifest checksums; vanished directories are then deleted under the
//! single-category gate; pass two re-walks the snapshot to materialize
//! repositories and marker checksums, once every directory row exists;
//! finally the store's file-detail age-out policy runs.

#![allow(missing_docs)]

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use crate::catalog::entities::{
    CachedDir, Category, Directory, DirectoryCache, FileMeta, FileSummary, Version,
};
use crate::catalog::store::{CatalogStore, FileDetailAgePolicy};
use crate::checksums::{extract_marker_details, harvest_manifests};
use crate::core::errors::Result;
use crate::core::paths::{directory_name, strip_topdir};
use crate::logger::{EventType, LogEntry, ScanLogger, Severity};
use crate::reconcile::repository::{RepoKind, RepoOutcome, detect_repository};
use crate::reconcile::shortlist::shortlist;
use crate::scanner::snapshot::{
    DirSnapshot, IMAGE_SUMMARY_FILE, REPO_METADATA_DIR, REPO_METADATA_FILE, Snapshot,
};

pub mod repository;
pub mod shortlist;

/// Mutable state scoped to one category run, threaded through and
/// returned by each reconciliation call.
#[derive(Debug, Default)]
pub struct RunState {
    /// Relative path → known directory record.
    pub directory_cache: DirectoryCache,
    /// Paths found unreadable this run (directly or via a parent).
    pub unreadable: HashSet<String>,
    /// (product, name) → version, for image-tree detection.
    pub version_cache: HashMap<(String, String), Version>,
}

impl RunState {
    /// Build run state for a category, loading its directory cache.
    pub fn load(store: &dyn CatalogStore, category: &Category) -> Result<Self> {
        let mut state = Self::default();
        state.refresh_directory_cache(store, category)?;
        Ok(state)
    }

    /// Rebuild the directory cache from the store. New directories are
    /// rare per run, so a full rebuild after each creation is acceptable.
    pub fn refresh_directory_cache(
        &mut self,
        store: &dyn CatalogStore,
        category: &Category,
    ) -> Result<()> {
        self.directory_cache.clear();
        for directory in store.directories_for_category(category.id)? {
            if let Some(relative) = strip_topdir(&category.topdir_name, &directory.name) {
                self.directory_cache.insert(
                    relative.to_string(),
                    CachedDir {
                        id: directory.id,
                        readable: directory.readable,
                        ctime: directory.ctime,
                    },
                );
            }
        }
        Ok(())
    }
}

/// Mutation counts for one reconciliation run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunReport {
    pub directories_created: usize,
    pub directories_updated: usize,
    pub directories_deleted: usize,
    pub repositories_created: usize,
    pub file_details_created: usize,
    pub file_details_aged: usize,
}

impl RunReport {
    /// Whether the run mutated the catalog at all.
    #[must_use]
    pub const fn is_noop(&self) -> bool {
        self.directories_created == 0
            && self.directories_updated == 0
            && self.directories_deleted == 0
            && self.repositories_created == 0
            && self.file_details_created == 0
    }
}

/// Reconciles one category's snapshot against the catalog.
pub struct Reconciler<'a> {
    category: &'a Category,
    /// Filesystem root of the tree when it is locally readable; `None`
    /// for listing-driven runs, which cannot read file contents and
    /// therefore skip checksum extraction.
    local_root: Option<&'a Path>,
    age_policy: FileDetailAgePolicy,
}

impl<'a> Reconciler<'a> {
    #[must_use]
    pub fn new(category: &'a Category, local_root: Option<&'a Path>) -> Self {
        Self {
            category,
            local_root,
            age_policy: FileDetailAgePolicy::default(),
        }
    }

    #[must_use]
    pub fn with_age_policy(mut self, policy: FileDetailAgePolicy) -> Self {
        self.age_policy = policy;
        self
    }

    /// Run both passes over a snapshot. Returns the threaded run state
    /// and the mutation report.
    pub fn run(
        &self,
        store: &mut dyn CatalogStore,
        snapshot: &Snapshot,
        mut state: RunState,
        logger: &mut ScanLogger,
    ) -> Result<(RunState, RunReport)> {
        let mut report = RunReport::default();

        for (relative, entry) in &snapshot.entries {
            self.sync_directory(store, relative, entry, &mut state, &mut report, logger)?;
        }

        self.delete_vanished(store, snapshot, &mut state, &mut report, logger)?;

        for (relative, entry) in &snapshot.entries {
            self.sync_repository(store, relative, entry, &mut state, &mut report, logger)?;
        }

        report.file_details_aged = store.age_file_details(&self.age_policy)?;
        Ok((state, report))
    }

    fn sync_directory(
        &self,
        store: &mut dyn CatalogStore,
        relative: &str,
        entry: &DirSnapshot,
        state: &mut RunState,
        report: &mut RunReport,
        logger: &mut ScanLogger,
    ) -> Result<()> {
        let name = directory_name(&self.category.topdir_name, relative);
        // Files were only stat'd for changed directories; an unchanged
        // entry's empty map must never clobber the stored summary.
        let files = if entry.changed {
            to_summary(&shortlist(&entry.files))
        } else {
            FileSummary::new()
        };

        let cached = state.directory_cache.get(relative).copied();
        let existing = match cached {
            Some(cached) => store.directory_by_id(cached.id)?,
            None => store.directory_by_name(&name)?,
        };

        let row = if let Some(mut stored) = existing {
            if cached.is_none() {
                // Known globally but not yet in this category: a shared
                // subtree gaining another category link.
                store.link_directory_category(stored.id, self.category.id)?;
            }
            let mut dirty = false;
            if stored.readable != entry.readable {
                stored.readable = entry.readable;
                dirty = true;
            }
            if stored.ctime != entry.ctime {
                stored.ctime = entry.ctime;
                dirty = true;
            }
            if entry.changed && stored.files != files {
                stored.files = files;
                dirty = true;
            }
            if dirty {
                store.update_directory(&stored)?;
                report.directories_updated += 1;
                logger.log(
                    &LogEntry::new(EventType::DirectoryUpdated, Severity::Info)
                        .category(&self.category.name)
                        .name(&name),
                );
            }
            if cached.is_none() {
                state.refresh_directory_cache(store, self.category)?;
            } else {
                state.directory_cache.insert(
                    relative.to_string(),
                    CachedDir {
                        id: stored.id,
                        readable: stored.readable,
                        ctime: stored.ctime,
                    },
                );
            }
            stored
        } else {
            let created = store.create_directory(&name, entry.readable, entry.ctime, &files)?;
            store.link_directory_category(created.id, self.category.id)?;
            report.directories_created += 1;
            logger.log(
                &LogEntry::new(EventType::DirectoryCreated, Severity::Info)
                    .category(&self.category.name)
                    .name(&name),
            );
            state.refresh_directory_cache(store, self.category)?;
            created
        };

        if let Some(root) = self.local_root {
            report.file_details_created +=
                harvest_manifests(&join_root(root, relative), &row, store)?;
        }
        Ok(())
    }

    fn delete_vanished(
        &self,
        store: &mut dyn CatalogStore,
        snapshot: &Snapshot,
        state: &mut RunState,
        report: &mut RunReport,
        logger: &mut ScanLogger,
    ) -> Result<()> {
        let vanished: Vec<(String, i64)> = state
            .directory_cache
            .iter()
            .filter(|(relative, _)| !snapshot.entries.contains_key(*relative))
            .map(|(relative, cached)| (relative.clone(), cached.id))
            .collect();

        for (relative, id) in vanished {
            // Never delete a directory shared across categories.
            if store.directory_category_count(id)? != 1 {
                continue;
            }
            store.delete_directory(id)?;
            state.directory_cache.remove(&relative);
            report.directories_deleted += 1;
            logger.log(
                &LogEntry::new(EventType::DirectoryDeleted, Severity::Info)
                    .category(&self.category.name)
                    .name(&directory_name(&self.category.topdir_name, &relative)),
            );
        }
        Ok(())
    }

    fn sync_repository(
        &self,
        store: &mut dyn CatalogStore,
        relative: &str,
        entry: &DirSnapshot,
        state: &mut RunState,
        report: &mut RunReport,
        logger: &mut ScanLogger,
    ) -> Result<()> {
        // The structural flag sits on the parent of the metadata
        // directory while the marker file lives inside it, so the file
        // map is checked independently; listing-derived snapshots also
        // never flag image trees structurally.
        let kind = if entry.is_repository || entry.files.contains_key(REPO_METADATA_FILE) {
            RepoKind::PackageRepo
        } else if entry.is_atomic || entry.files.contains_key(IMAGE_SUMMARY_FILE) {
            RepoKind::ImageTree
        } else {
            return Ok(());
        };

        let name = directory_name(&self.category.topdir_name, relative);
        let Some(directory) = store.directory_by_name(&name)? else {
            logger.warn(
                &self.category.name,
                format!("repository candidate {name} has no catalog row"),
            );
            return Ok(());
        };

        match detect_repository(store, state, self.category, relative, &directory, kind, logger)? {
            RepoOutcome::Created(_) => report.repositories_created += 1,
            RepoOutcome::Existing(_) | RepoOutcome::Skipped => {}
        }

        if let Some(root) = self.local_root {
            let (marker_rel, marker_dir) = self.marker_target(store, relative, entry, kind)?;
            let Some(marker_dir) = marker_dir else {
                logger.warn(
                    &self.category.name,
                    format!("metadata directory for {name} has no catalog row"),
                );
                return Ok(());
            };
            let marker_path = join_root(root, &marker_rel).join(kind.marker_filename());
            if extract_marker_details(&marker_path, kind, &marker_dir, store)? {
                report.file_details_created += 1;
            }
        }
        Ok(())
    }

    /// Resolve which directory actually holds the marker file. A package
    /// repo flagged structurally keeps its metadata one level down in
    /// `repodata/`; one recognized by its own file map is that metadata
    /// directory itself.
    fn marker_target(
        &self,
        store: &dyn CatalogStore,
        relative: &str,
        entry: &DirSnapshot,
        kind: RepoKind,
    ) -> Result<(String, Option<Directory>)> {
        let marker_rel = match kind {
            RepoKind::PackageRepo if !entry.files.contains_key(REPO_METADATA_FILE) => {
                if relative.is_empty() {
                    REPO_METADATA_DIR.to_string()
                } else {
                    format!("{relative}/{REPO_METADATA_DIR}")
                }
            }
            RepoKind::PackageRepo | RepoKind::ImageTree => relative.to_string(),
        };
        let row = store.directory_by_name(&directory_name(&self.category.topdir_name, &marker_rel))?;
        Ok((marker_rel, row))
    }
}

fn join_root(root: &Path, relative: &str) -> PathBuf {
    if relative.is_empty() {
        root.to_path_buf()
    } else {
        root.join(relative)
    }
}

fn to_summary(files: &std::collections::BTreeMap<String, crate::scanner::snapshot::FileStat>) -> FileSummary {
    files
        .iter()
        .map(|(name, stat)| {
            (
                name.clone(),
                FileMeta {
                    size: stat.size,
                    timestamp: stat.mod_time,
                    checksums: crate::catalog::entities::ChecksumSet::default(),
                },
            )
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::sqlite::SqliteCatalog;
    use crate::scanner::snapshot::FileStat;

    struct Fixture {
        store: SqliteCatalog,
        category: Category,
    }

    fn fixture() -> Fixture {
        let mut store = SqliteCatalog::open_in_memory().unwrap();
        let category = store
            .create_category("fedora-linux", "Fedora", "pub/fedora")
            .unwrap();
        store.create_architecture("x86_64").unwrap();
        Fixture { store, category }
    }

    fn snapshot_entry(ctime: i64, files: &[(&str, u64, i64)]) -> DirSnapshot {
        DirSnapshot {
            files: files
                .iter()
                .map(|&(name, size, mod_time)| (name.to_string(), FileStat { size, mod_time }))
                .collect(),
            ctime,
            ..DirSnapshot::default()
        }
    }

    fn run(
        fx: &mut Fixture,
        snapshot: &Snapshot,
        state: RunState,
    ) -> (RunState, RunReport) {
        let reconciler = Reconciler::new(&fx.category, None);
        let mut logger = ScanLogger::discard();
        reconciler
            .run(&mut fx.store, snapshot, state, &mut logger)
            .unwrap()
    }

    /// A listing-shaped snapshot: root, a repo tree and its repodata.
    fn repo_snapshot() -> Snapshot {
        let mut snapshot = Snapshot::new();
        snapshot
            .entries
            .insert(String::new(), snapshot_entry(100, &[]));
        let mut tree = snapshot_entry(200, &[("kernel-1.rpm", 10, 500)]);
        tree.is_repository = true;
        snapshot.entries.insert("updates/27/x86_64".to_string(), tree);
        snapshot.entries.insert(
            "updates/27/x86_64/repodata".to_string(),
            snapshot_entry(210, &[("repomd.xml", 3, 510)]),
        );
        snapshot
    }

    #[test]
    fn first_run_creates_rows_and_one_repository() {
        let mut fx = fixture();
        let snapshot = repo_snapshot();
        let state = RunState::load(&fx.store, &fx.category).unwrap();
        let (_, report) = run(&mut fx, &snapshot, state);

        assert_eq!(report.directories_created, 3);
        assert_eq!(report.repositories_created, 1);

        let tree = fx
            .store
            .directory_by_name("pub/fedora/updates/27/x86_64")
            .unwrap()
            .unwrap();
        assert!(tree.files.contains_key("kernel-1.rpm"));
        let repo = fx.store.repository_by_directory(tree.id).unwrap().unwrap();
        assert_eq!(repo.prefix.as_deref(), Some("fedora-updates-27"));
        assert_eq!(repo.name, "pub/fedora/updates/27/x86_64");
    }

    #[test]
    fn unchanged_snapshot_reconciles_to_a_noop() {
        let mut fx = fixture();
        let snapshot = repo_snapshot();
        let state = RunState::load(&fx.store, &fx.category).unwrap();
        let (state, first) = run(&mut fx, &snapshot, state);
        assert!(!first.is_noop());

        // Second run with the threaded state: ctimes match the cache, so
        // nothing was re-stat'd and nothing changes.
        let mut unchanged = repo_snapshot();
        for entry in unchanged.entries.values_mut() {
            entry.changed = false;
            entry.files.clear();
        }
        let (_, second) = run(&mut fx, &unchanged, state);
        assert!(second.is_noop(), "second pass must not mutate: {second:?}");
    }

    #[test]
    fn changed_files_update_the_stored_summary() {
        let mut fx = fixture();
        let snapshot = repo_snapshot();
        let state = RunState::load(&fx.store, &fx.category).unwrap();
        let (state, _) = run(&mut fx, &snapshot, state);

        let mut next = repo_snapshot();
        let tree = next.entries.get_mut("updates/27/x86_64").unwrap();
        tree.ctime = 300;
        tree.files
            .insert("kernel-2.rpm".to_string(), FileStat { size: 11, mod_time: 600 });
        let (_, report) = run(&mut fx, &next, state);
        assert_eq!(report.directories_updated, 1);

        let stored = fx
            .store
            .directory_by_name("pub/fedora/updates/27/x86_64")
            .unwrap()
            .unwrap();
        assert!(stored.files.contains_key("kernel-2.rpm"));
        assert_eq!(stored.ctime, 300);
    }

    #[test]
    fn rereconciling_creates_no_second_repository() {
        let mut fx = fixture();
        let snapshot = repo_snapshot();
        let state = RunState::load(&fx.store, &fx.category).unwrap();
        let (state, _) = run(&mut fx, &snapshot, state);
        let (_, second) = run(&mut fx, &snapshot, state);
        assert_eq!(second.repositories_created, 0);
    }

    #[test]
    fn vanished_single_category_directory_is_deleted() {
        let mut fx = fixture();
        let snapshot = repo_snapshot();
        let state = RunState::load(&fx.store, &fx.category).unwrap();
        let (state, _) = run(&mut fx, &snapshot, state);

        let mut shrunk = Snapshot::new();
        shrunk
            .entries
            .insert(String::new(), snapshot_entry(100, &[]));
        let (_, report) = run(&mut fx, &shrunk, state);
        assert_eq!(report.directories_deleted, 2);
        assert!(
            fx.store
                .directory_by_name("pub/fedora/updates/27/x86_64")
                .unwrap()
                .is_none()
        );
    }

    #[test]
    fn shared_directory_survives_vanishing_from_one_category() {
        let mut fx = fixture();
        let other = fx
            .store
            .create_category("fedora-secondary", "Fedora", "pub/fedora")
            .unwrap();

        let snapshot = repo_snapshot();
        let state = RunState::load(&fx.store, &fx.category).unwrap();
        let (state, _) = run(&mut fx, &snapshot, state);

        // Link the tree into a second category.
        let tree = fx
            .store
            .directory_by_name("pub/fedora/updates/27/x86_64")
            .unwrap()
            .unwrap();
        fx.store.link_directory_category(tree.id, other.id).unwrap();

        let mut shrunk = Snapshot::new();
        shrunk
            .entries
            .insert(String::new(), snapshot_entry(100, &[]));
        let (_, report) = run(&mut fx, &shrunk, state);

        // Only the unshared repodata row goes away.
        assert_eq!(report.directories_deleted, 1);
        assert!(
            fx.store
                .directory_by_name("pub/fedora/updates/27/x86_64")
                .unwrap()
                .is_some()
        );
    }

    #[test]
    fn shortlist_applies_before_persisting() {
        let mut fx = fixture();
        let mut snapshot = Snapshot::new();
        snapshot
            .entries
            .insert(String::new(), snapshot_entry(100, &[]));
        let files: Vec<(String, u64, i64)> = (0..15)
            .map(|i| (format!("pkg-{i:02}.rpm"), 10 + i as u64, 1_000 + i as i64))
            .collect();
        let refs: Vec<(&str, u64, i64)> = files
            .iter()
            .map(|(name, size, time)| (name.as_str(), *size, *time))
            .collect();
        snapshot
            .entries
            .insert("big".to_string(), snapshot_entry(200, &refs));

        let state = RunState::load(&fx.store, &fx.category).unwrap();
        run(&mut fx, &snapshot, state);

        let stored = fx
            .store
            .directory_by_name("pub/fedora/big")
            .unwrap()
            .unwrap();
        assert_eq!(stored.files.len(), 3);
        assert!(stored.files.contains_key("pkg-14.rpm"));
        assert!(stored.files.contains_key("pkg-13.rpm"));
        assert!(stored.files.contains_key("pkg-12.rpm"));
    }

    #[test]
    fn image_tree_snapshot_yields_image_repository() {
        let mut fx = fixture();
        let mut snapshot = Snapshot::new();
        snapshot
            .entries
            .insert(String::new(), snapshot_entry(100, &[]));
        let mut atomic = snapshot_entry(200, &[("summary", 9, 500)]);
        atomic.is_atomic = true;
        snapshot.entries.insert("atomic/27".to_string(), atomic);

        let state = RunState::load(&fx.store, &fx.category).unwrap();
        let (_, report) = run(&mut fx, &snapshot, state);
        assert_eq!(report.repositories_created, 1);

        let dir = fx
            .store
            .directory_by_name("pub/fedora/atomic/27")
            .unwrap()
            .unwrap();
        let repo = fx.store.repository_by_directory(dir.id).unwrap().unwrap();
        assert_eq!(repo.prefix.as_deref(), Some("fedora-27"));
    }
}
