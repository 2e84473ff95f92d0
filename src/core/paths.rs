//! Path conventions shared by the scanner and the repository detector.
//!
//! Relative paths inside a category tree always use `/` separators and never
//! carry a leading or trailing slash; the tree root is the empty string.

use std::sync::LazyLock;

use regex::Regex;

use crate::catalog::entities::{Architecture, Category, Version};
use crate::catalog::store::CatalogStore;
use crate::core::errors::Result;

/// Numeric path segment usable as a version name, e.g. `27` or `8.4`.
static VERSION_SEGMENT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?:^|/)(\d+(?:\.\d+)?)(?:/|$)").expect("hard-coded pattern"));

/// Source-package path segment, mapped to the `source` pseudo-architecture.
const SOURCE_SEGMENT: &str = "SRPMS";
const SOURCE_ARCH: &str = "source";

/// Build a catalog directory name from a category's logical topdir name and
/// a tree-relative path. The tree root maps to the bare topdir name.
#[must_use]
pub fn directory_name(topdir_name: &str, relative: &str) -> String {
    if topdir_name.is_empty() {
        relative.to_string()
    } else if relative.is_empty() {
        topdir_name.to_string()
    } else {
        format!("{topdir_name}/{relative}")
    }
}

/// Strip a category's logical topdir name from a full directory name,
/// returning the tree-relative path. `None` when the name is outside the
/// category's tree.
#[must_use]
pub fn strip_topdir<'a>(topdir_name: &str, full_name: &'a str) -> Option<&'a str> {
    if topdir_name.is_empty() {
        return Some(full_name);
    }
    if full_name == topdir_name {
        return Some("");
    }
    full_name
        .strip_prefix(topdir_name)
        .and_then(|rest| rest.strip_prefix('/'))
}

/// Containing directory of a relative path; empty string for top-level names.
#[must_use]
pub fn parent_dir(path: &str) -> &str {
    path.rsplit_once('/').map_or("", |(parent, _)| parent)
}

/// Last non-empty `/`-separated segment of a path.
#[must_use]
pub fn last_segment(path: &str) -> Option<&str> {
    path.rsplit('/').find(|segment| !segment.is_empty())
}

/// Whether `path` contains `segment` as a whole `/`-separated component.
#[must_use]
pub fn has_segment(path: &str, segment: &str) -> bool {
    path.split('/').any(|s| s == segment)
}

/// Guess the version and architecture a repository path refers to.
///
/// Architectures are matched as whole path segments against the known
/// architecture names; a `SRPMS` segment maps to the `source`
/// pseudo-architecture. Versions are matched against the product's known
/// version names first; failing that, a numeric segment is looked up or
/// created as a new version of the product. Either side may come back
/// `None` when the path offers no usable signal.
pub fn guess_ver_arch_from_path(
    store: &mut dyn CatalogStore,
    category: &Category,
    relative: &str,
) -> Result<(Option<Version>, Option<Architecture>)> {
    let arch = guess_arch(store, relative)?;
    let version = guess_version(store, category, relative)?;
    Ok((version, arch))
}

fn guess_arch(store: &mut dyn CatalogStore, relative: &str) -> Result<Option<Architecture>> {
    if has_segment(relative, SOURCE_SEGMENT) {
        return Ok(Some(store.architecture_get_or_create(SOURCE_ARCH)?));
    }
    for arch in store.architectures()? {
        if has_segment(relative, &arch.name) {
            return Ok(Some(arch));
        }
    }
    Ok(None)
}

fn guess_version(
    store: &mut dyn CatalogStore,
    category: &Category,
    relative: &str,
) -> Result<Option<Version>> {
    for version in store.versions_for_product(&category.product)? {
        if has_segment(relative, &version.name) {
            return Ok(Some(version));
        }
    }
    if let Some(captures) = VERSION_SEGMENT_RE.captures(relative) {
        let name = &captures[1];
        return Ok(Some(store.version_get_or_create(&category.product, name)?));
    }
    Ok(None)
}

/// Synthesize a repository prefix from a repository path, its category and
/// its version.
///
/// The prefix is the stable public handle for a repository, so it must come
/// out identical whether synthesized from the repository directory or from
/// the metadata directory nested inside it; a trailing `repodata` segment is
/// normalized away. Path segments for updates, testing, debug and source
/// trees become prefix qualifiers between the lowercased product name and
/// the version.
#[must_use]
pub fn repo_prefix(relative: &str, category: &Category, version: &Version) -> String {
    let trimmed = relative
        .strip_suffix("/repodata")
        .or_else(|| (relative == "repodata").then_some(""))
        .unwrap_or(relative);

    let mut parts = vec![category.product.to_lowercase()];
    if has_segment(trimmed, "updates") {
        parts.push("updates".to_string());
    }
    if has_segment(trimmed, "testing") {
        parts.push("testing".to_string());
    }
    if has_segment(trimmed, "debug") {
        parts.push("debug".to_string());
    }
    if has_segment(trimmed, SOURCE_SEGMENT) || has_segment(trimmed, SOURCE_ARCH) {
        parts.push(SOURCE_ARCH.to_string());
    }
    parts.push(version.name.clone());
    parts.join("-")
}
