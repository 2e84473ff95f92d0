//! Convenient re-exports of the most common types.

pub use crate::catalog::entities::{
    Architecture, CachedDir, Category, ChecksumSet, Directory, DirectoryCache, FileDetail,
    FileMeta, FileSummary, Repository, Version,
};
pub use crate::catalog::sqlite::SqliteCatalog;
pub use crate::catalog::store::{CatalogStore, FileDetailAgePolicy};
pub use crate::core::config::{CategoryConfig, Config};
pub use crate::core::errors::{MtsError, Result};
pub use crate::logger::ScanLogger;
pub use crate::reconcile::repository::RepoKind;
pub use crate::reconcile::{Reconciler, RunReport, RunState};
pub use crate::scanner::{
    ExclusionFilter, ListingParser, Snapshot, TransportOutput, TreeScanner,
};
