//! Tree observation: exclusion filtering, the live filesystem walker and
//! the remote listing parser, both producing the same snapshot shape.

pub mod exclusion;
pub mod listing;
pub mod snapshot;
pub mod walk;

pub use exclusion::ExclusionFilter;
pub use listing::{ListingParser, TransportOutput};
pub use snapshot::{
    DirSnapshot, FileStat, IMAGE_OBJECTS_DIR, IMAGE_SUMMARY_FILE, REPO_METADATA_DIR,
    REPO_METADATA_FILE, Snapshot,
};
pub use walk::TreeScanner;
