#![forbid(unsafe_code)]

//! Mirror tree synchronizer (mts): reconciles a metadata catalog against
//! a large, slowly-changing mirror file tree.
//!
//! The tree is observed either by walking a live filesystem or by parsing
//! a text listing captured from a remote transport; both produce the same
//! snapshot shape. Reconciliation then:
//! 1. persists directory-level deltas (readable flag, ctime, size-bounded
//!    file summaries) and harvests sidecar checksum manifests,
//! 2. deletes vanished directories belonging to exactly one category,
//! 3. materializes package/image repository rows for flagged directories
//!    and hashes their metadata markers.
//!
//! # Library usage
//!
//! Use the [`prelude`] for convenient access to the most common types:
//!
//! ```rust,no_run
//! use mirror_tree_sync::prelude::*;
//! ```

pub mod prelude;

pub mod catalog;
pub mod checksums;
#[cfg(feature = "cli")]
pub mod cli_app;
pub mod core;
pub mod logger;
pub mod reconcile;
pub mod scanner;
