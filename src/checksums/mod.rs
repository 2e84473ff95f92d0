//! Checksum extraction: sidecar manifests and repository metadata markers.

pub mod manifest;
pub mod marker;

pub use manifest::{ChecksumKind, harvest_manifests};
pub use marker::{checksum_bytes, extract_marker_details};
