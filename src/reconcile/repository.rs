//! Repository detection and maintenance.
//!
//! Flagged directories are materialized as repository rows, one per
//! directory at most. Dispatch between metadata kinds is a tagged variant
//! chosen once per directory; the two kinds derive version and
//! architecture differently.

use crate::catalog::entities::{Category, Directory, Repository, Version};
use crate::catalog::store::{CatalogStore, NewRepository};
use crate::core::errors::Result;
use crate::core::paths::{guess_ver_arch_from_path, has_segment, last_segment, repo_prefix};
use crate::logger::{EventType, LogEntry, ScanLogger, Severity};
use crate::reconcile::RunState;
use crate::scanner::snapshot::{IMAGE_SUMMARY_FILE, REPO_METADATA_FILE};

/// Metadata kind a repository candidate was recognized by.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepoKind {
    /// Package-manager repository (`repodata/repomd.xml`).
    PackageRepo,
    /// Content-addressed image tree (`summary` + `objects/`).
    ImageTree,
}

impl RepoKind {
    /// Marker filename carrying this kind's metadata.
    #[must_use]
    pub const fn marker_filename(self) -> &'static str {
        match self {
            Self::PackageRepo => REPO_METADATA_FILE,
            Self::ImageTree => IMAGE_SUMMARY_FILE,
        }
    }
}

/// Only architecture supported for image trees. Generalizing would need
/// per-branch payload parsing, so the single value stays an explicit
/// default.
pub const IMAGE_TREE_DEFAULT_ARCH: &str = "x86_64";

/// Path segment identifying the staging area repositories graduate from.
pub const STAGE_PATH_MARKER: &str = "development";
/// Path segment identifying the released area repositories graduate to.
pub const RELEASE_PATH_MARKER: &str = "releases";

/// What repository detection did for one directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RepoOutcome {
    /// A new repository row was created.
    Created(Repository),
    /// An existing row matched; it may have been repaired or repointed.
    Existing(Repository),
    /// Nothing was done (duplicate, or version/arch undeterminable).
    Skipped,
}

/// Identify or materialize the repository for one flagged directory.
pub fn detect_repository(
    store: &mut dyn CatalogStore,
    state: &mut RunState,
    category: &Category,
    relative: &str,
    directory: &Directory,
    kind: RepoKind,
    logger: &mut ScanLogger,
) -> Result<RepoOutcome> {
    // One repository per directory, enforced here independent of the
    // store's constraints.
    if store.repository_by_directory(directory.id)?.is_some() {
        logger.warn(
            &category.name,
            format!("repository already exists for {}", directory.name),
        );
        return Ok(RepoOutcome::Skipped);
    }

    let (version, architecture) = match kind {
        RepoKind::PackageRepo => {
            let (version, architecture) = guess_ver_arch_from_path(store, category, relative)?;
            let (Some(version), Some(architecture)) = (version, architecture) else {
                logger.warn(
                    &category.name,
                    format!("cannot determine version/architecture for {relative:?}, not creating repository"),
                );
                return Ok(RepoOutcome::Skipped);
            };
            (version, architecture)
        }
        RepoKind::ImageTree => {
            let architecture = store.architecture_get_or_create(IMAGE_TREE_DEFAULT_ARCH)?;
            let Some(version_name) = last_segment(relative) else {
                logger.warn(
                    &category.name,
                    "image tree at category root has no version segment".to_string(),
                );
                return Ok(RepoOutcome::Skipped);
            };
            let version = cached_version(store, state, &category.product, version_name)?;
            (version, architecture)
        }
    };

    let prefix = repo_prefix(relative, category, &version);
    if let Some(mut repo) =
        store.repository_by_prefix_or_name(&prefix, &directory.name, Some(architecture.id))?
    {
        if repo.prefix.as_deref() != Some(prefix.as_str()) {
            repo.prefix = Some(prefix.clone());
            store.update_repository(&repo)?;
        }
        if repo.directory_id != directory.id
            && let Some(current) = store.directory_by_id(repo.directory_id)?
            && promote_from_staging(store, &mut repo, &current, directory)?
        {
            logger.log(
                &LogEntry::new(EventType::RepositoryMoved, Severity::Info)
                    .category(&category.name)
                    .name(&directory.name)
                    .details(format!("repository {prefix} left {}", current.name)),
            );
        }
        return Ok(RepoOutcome::Existing(repo));
    }

    // Display name is the directory's full name; shorter names collided
    // historically.
    let repo = store.create_repository(&NewRepository {
        prefix: &prefix,
        name: &directory.name,
        category_id: category.id,
        version_id: Some(version.id),
        architecture_id: Some(architecture.id),
        directory_id: directory.id,
    })?;
    logger.log(
        &LogEntry::new(EventType::RepositoryCreated, Severity::Info)
            .category(&category.name)
            .name(&directory.name)
            .details(format!("prefix {prefix}")),
    );
    Ok(RepoOutcome::Created(repo))
}

fn cached_version(
    store: &mut dyn CatalogStore,
    state: &mut RunState,
    product: &str,
    name: &str,
) -> Result<Version> {
    let key = (product.to_string(), name.to_string());
    if let Some(version) = state.version_cache.get(&key) {
        return Ok(version.clone());
    }
    let version = store.version_get_or_create(product, name)?;
    state.version_cache.insert(key, version.clone());
    Ok(version)
}

/// Graduate a repository from the staging tree to the released tree.
///
/// The directory pointer moves only when the current directory sits under
/// the staging marker and the proposed directory under the released
/// marker; anything else is left alone.
pub fn promote_from_staging(
    store: &mut dyn CatalogStore,
    repository: &mut Repository,
    current: &Directory,
    proposed: &Directory,
) -> Result<bool> {
    if !has_segment(&current.name, STAGE_PATH_MARKER)
        || !has_segment(&proposed.name, RELEASE_PATH_MARKER)
    {
        return Ok(false);
    }
    repository.directory_id = proposed.id;
    repository.name = proposed.name.clone();
    store.update_repository(repository)?;
    Ok(true)
}
