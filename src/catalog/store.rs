//! Catalog store interface.
//!
//! The reconciliation engine never holds a live database connection, only
//! this interface. Every mutation commits individually and immediately; an
//! interrupted run leaves already-committed state consistent and the next
//! run re-diffs from current reality.

#![allow(missing_docs)]

use crate::catalog::entities::{
    Architecture, Category, ChecksumSet, Directory, FileDetail, FileSummary, Repository, Version,
};
use crate::core::errors::Result;

/// Fields for a repository row about to be created.
#[derive(Debug, Clone, Copy)]
pub struct NewRepository<'a> {
    pub prefix: &'a str,
    /// Display name, equal to the directory's full name.
    pub name: &'a str,
    pub category_id: i64,
    pub version_id: Option<i64>,
    pub architecture_id: Option<i64>,
    pub directory_id: i64,
}

/// Fields for a file-detail row about to be created.
#[derive(Debug, Clone, Copy)]
pub struct NewFileDetail<'a> {
    pub directory_id: i64,
    pub filename: &'a str,
    pub size: Option<u64>,
    pub timestamp: Option<i64>,
    pub checksums: &'a ChecksumSet,
}

/// Age-out policy for historical file-detail rows.
///
/// Rows older than `max_age_days` are deleted, except that the newest
/// `keep_latest` rows per (directory, filename) survive regardless of age so
/// freshness checks always have a baseline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileDetailAgePolicy {
    pub max_age_days: u32,
    pub keep_latest: u32,
}

impl Default for FileDetailAgePolicy {
    fn default() -> Self {
        Self {
            max_age_days: 30,
            keep_latest: 2,
        }
    }
}

/// Lookup/create/update/delete operations the engine needs from a catalog.
#[allow(missing_docs)]
pub trait CatalogStore {
    fn category_by_name(&self, name: &str) -> Result<Option<Category>>;
    fn create_category(&mut self, name: &str, product: &str, topdir_name: &str)
    -> Result<Category>;

    fn directory_by_id(&self, id: i64) -> Result<Option<Directory>>;
    fn directory_by_name(&self, name: &str) -> Result<Option<Directory>>;
    fn directories_for_category(&self, category_id: i64) -> Result<Vec<Directory>>;
    fn create_directory(
        &mut self,
        name: &str,
        readable: bool,
        ctime: i64,
        files: &FileSummary,
    ) -> Result<Directory>;
    fn update_directory(&mut self, directory: &Directory) -> Result<()>;
    /// Deletes the row and, through the schema, its category links and
    /// file details.
    fn delete_directory(&mut self, id: i64) -> Result<()>;
    fn link_directory_category(&mut self, directory_id: i64, category_id: i64) -> Result<()>;
    fn directory_category_count(&self, directory_id: i64) -> Result<u32>;

    fn architectures(&self) -> Result<Vec<Architecture>>;
    fn architecture_by_name(&self, name: &str) -> Result<Option<Architecture>>;
    fn create_architecture(&mut self, name: &str) -> Result<Architecture>;

    fn versions_for_product(&self, product: &str) -> Result<Vec<Version>>;
    fn version_by_product_name(&self, product: &str, name: &str) -> Result<Option<Version>>;
    fn create_version(&mut self, product: &str, name: &str) -> Result<Version>;

    fn repository_by_directory(&self, directory_id: i64) -> Result<Option<Repository>>;
    /// Find a repository by synthesized prefix or display name, scoped to
    /// one architecture. The name fallback exists to pick up historical
    /// rows whose stored prefix drifted.
    fn repository_by_prefix_or_name(
        &self,
        prefix: &str,
        name: &str,
        architecture_id: Option<i64>,
    ) -> Result<Option<Repository>>;
    fn create_repository(&mut self, repository: &NewRepository<'_>) -> Result<Repository>;
    fn update_repository(&mut self, repository: &Repository) -> Result<()>;

    /// Exact-tuple lookup used by the upsert rule: an existing matching row
    /// means the caller must not create a duplicate.
    fn file_detail_exact(&self, detail: &NewFileDetail<'_>) -> Result<Option<FileDetail>>;
    fn create_file_detail(&mut self, detail: &NewFileDetail<'_>) -> Result<FileDetail>;
    /// Age out historical file-detail rows; returns the number deleted.
    fn age_file_details(&mut self, policy: &FileDetailAgePolicy) -> Result<usize>;

    fn architecture_get_or_create(&mut self, name: &str) -> Result<Architecture> {
        if let Some(arch) = self.architecture_by_name(name)? {
            return Ok(arch);
        }
        self.create_architecture(name)
    }

    fn version_get_or_create(&mut self, product: &str, name: &str) -> Result<Version> {
        if let Some(version) = self.version_by_product_name(product, name)? {
            return Ok(version);
        }
        self.create_version(product, name)
    }

    fn category_get_or_create(
        &mut self,
        name: &str,
        product: &str,
        topdir_name: &str,
    ) -> Result<Category> {
        if let Some(category) = self.category_by_name(name)? {
            return Ok(category);
        }
        self.create_category(name, product, topdir_name)
    }
}
