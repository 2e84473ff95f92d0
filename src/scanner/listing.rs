//! Remote listing parser.
//!
//! The remote transport is a black box producing a line-oriented text
//! listing (rsync `-r` style) and an exit status. Each line splits into
//! exactly five whitespace-separated fields:
//!
//! ```text
//! drwxr-xr-x          4,096 2017/01/01 01:01:01 releases/27/Everything
//! -rw-r--r--     71,075,abc  ...                (malformed lines skipped)
//! ```
//!
//! Directory lines start with the `d` marker in a fixed-width permission
//! string; everything else with five fields is treated as a file line.

use std::io::BufRead;
use std::sync::LazyLock;

use chrono::{NaiveDateTime, TimeZone};
use regex::Regex;

use crate::catalog::entities::DirectoryCache;
use crate::core::errors::{MtsError, Result};
use crate::core::paths::{last_segment, parent_dir};
use crate::logger::{EventType, LogEntry, ScanLogger, Severity};
use crate::scanner::exclusion::ExclusionFilter;
use crate::scanner::snapshot::{FileStat, REPO_METADATA_DIR, Snapshot};

/// Directory bit, six filler characters, then the "other" read and
/// execute characters of a ten-character permission string.
static DIR_READABLE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^d......r.x").expect("hard-coded pattern"));

/// Captured output of the remote transport.
#[derive(Debug, Clone)]
pub struct TransportOutput {
    /// Raw listing bytes as produced on stdout.
    pub stdout: Vec<u8>,
    /// Process exit code; non-zero output is still parsed.
    pub exit_code: i32,
}

/// Parses transport listings into snapshots.
pub struct ListingParser<'a> {
    filter: &'a ExclusionFilter,
}

impl<'a> ListingParser<'a> {
    #[must_use]
    pub fn new(filter: &'a ExclusionFilter) -> Self {
        Self { filter }
    }

    /// Parse captured transport output.
    ///
    /// A non-zero exit status does not abort parsing: whatever partial
    /// listing exists is still folded into the snapshot, and the
    /// degradation is logged.
    pub fn parse_output(
        &self,
        output: &TransportOutput,
        cache: &DirectoryCache,
        logger: &mut ScanLogger,
    ) -> Result<Snapshot> {
        if output.exit_code != 0 {
            logger.log(
                &LogEntry::new(EventType::TransportDegraded, Severity::Warning).details(format!(
                    "transport exited with status {}; parsing partial listing",
                    output.exit_code
                )),
            );
        }
        self.parse(output.stdout.as_slice(), cache)
    }

    /// Parse a line stream into a snapshot.
    ///
    /// Malformed lines are skipped individually; a failing read on the
    /// stream itself is a fatal transport error.
    pub fn parse<R: BufRead>(&self, reader: R, cache: &DirectoryCache) -> Result<Snapshot> {
        let mut snapshot = Snapshot::new();
        for line in reader.lines() {
            let line = line.map_err(|err| MtsError::Transport {
                details: err.to_string(),
            })?;
            self.fold_line(&line, cache, &mut snapshot);
        }
        Ok(snapshot)
    }

    fn fold_line(&self, line: &str, cache: &DirectoryCache, snapshot: &mut Snapshot) {
        let fields: Vec<&str> = line.split_whitespace().collect();
        let &[perm, size, date, time, path] = fields.as_slice() else {
            return;
        };

        if perm.starts_with('d') {
            self.fold_directory(perm, date, time, path, cache, snapshot);
        } else {
            self.fold_file(size, date, time, path, snapshot);
        }
    }

    fn fold_directory(
        &self,
        perm: &str,
        date: &str,
        time: &str,
        path: &str,
        cache: &DirectoryCache,
        snapshot: &mut Snapshot,
    ) {
        let relative = normalize_path(path);
        if !relative.is_empty() && self.filter.is_excluded(relative) {
            return;
        }
        let Some(ctime) = parse_epoch(date, time) else {
            return;
        };

        let readable = DIR_READABLE_RE.is_match(perm);
        let changed = cache.get(relative).is_none_or(|c| c.ctime != ctime);
        let entry = snapshot.entry_mut(relative);
        entry.readable = readable;
        entry.ctime = ctime;
        entry.changed = changed;

        // The metadata marker anywhere in the stream flags its parent.
        if last_segment(relative) == Some(REPO_METADATA_DIR) {
            snapshot.entry_mut(parent_dir(relative)).is_repository = true;
        }
    }

    fn fold_file(&self, size: &str, date: &str, time: &str, path: &str, snapshot: &mut Snapshot) {
        let relative = normalize_path(path);
        if relative.is_empty() || self.filter.is_excluded(relative) {
            return;
        }
        let Ok(size) = size.replace(',', "").parse::<u64>() else {
            return;
        };
        let Some(mod_time) = parse_epoch(date, time) else {
            return;
        };

        // Root-level files land under the empty-string key.
        let (dir, filename) = match relative.rsplit_once('/') {
            Some((dir, filename)) => (dir, filename),
            None => ("", relative),
        };
        snapshot
            .entry_mut(dir)
            .files
            .insert(filename.to_string(), FileStat { size, mod_time });
    }
}

/// Map transport paths onto tree-relative form: the listing root `.`
/// becomes the empty string and incidental `./` prefixes or trailing
/// slashes are dropped.
fn normalize_path(path: &str) -> &str {
    let path = path.strip_prefix("./").unwrap_or(path);
    let path = path.strip_suffix('/').unwrap_or(path);
    if path == "." { "" } else { path }
}

/// Convert listing date and time fields to a local-time epoch.
fn parse_epoch(date: &str, time: &str) -> Option<i64> {
    let naive =
        NaiveDateTime::parse_from_str(&format!("{date} {time}"), "%Y/%m/%d %H:%M:%S").ok()?;
    chrono::Local
        .from_local_datetime(&naive)
        .earliest()
        .map(|dt| dt.timestamp())
}

#[cfg(test)]
mod tests {
    use super::*;

    const LISTING: &str = "\
drwxr-xr-x          4,096 2017/01/01 01:01:01 .
drwxr-xr-x          4,096 2017/01/02 10:00:00 tree
drwxr-xr-x          4,096 2017/01/02 10:00:05 tree/repodata
-rw-r--r--          2,774 2017/01/02 10:00:05 tree/repodata/repomd.xml
-rw-r--r--     71,075,420 2017/01/02 09:59:00 tree/kernel-4.14.rpm
-rw-r--r--             12 2017/01/03 08:00:00 README
drwxr-x---          4,096 2017/01/01 01:01:01 private
";

    fn parse(listing: &str) -> Snapshot {
        let filter = ExclusionFilter::default();
        ListingParser::new(&filter)
            .parse(listing.as_bytes(), &DirectoryCache::new())
            .unwrap()
    }

    #[test]
    fn directory_lines_become_entries_with_ctime() {
        let snapshot = parse(LISTING);
        let root = snapshot.get("").unwrap();
        assert!(root.readable);
        assert!(root.ctime > 0);

        let tree = snapshot.get("tree").unwrap();
        assert!(tree.readable);
        assert!(tree.changed);
        assert!(tree.ctime > root.ctime);
    }

    #[test]
    fn repodata_line_flags_its_parent() {
        let snapshot = parse(LISTING);
        assert!(snapshot.get("tree").unwrap().is_repository);
        assert!(!snapshot.get("tree/repodata").unwrap().is_repository);
    }

    #[test]
    fn file_lines_fold_into_their_directory() {
        let snapshot = parse(LISTING);
        let tree = snapshot.get("tree").unwrap();
        let rpm = tree.files.get("kernel-4.14.rpm").unwrap();
        assert_eq!(rpm.size, 71_075_420);

        let repodata = snapshot.get("tree/repodata").unwrap();
        assert!(repodata.files.contains_key("repomd.xml"));

        // Root-level files use the empty-string key.
        let root = snapshot.get("").unwrap();
        assert_eq!(root.files.get("README").unwrap().size, 12);
    }

    #[test]
    fn permission_string_drives_readability() {
        let snapshot = parse(LISTING);
        assert!(snapshot.get("").unwrap().readable);
        assert!(!snapshot.get("private").unwrap().readable);
    }

    #[test]
    fn malformed_lines_are_skipped() {
        let listing = "\
drwxr-xr-x 4,096 2017/01/01 01:01:01 ok
drwxr-xr-x 4,096 2017/01/01 ok-but-four-fields
drwxr-xr-x 4,096 17-01-01 01:01:01 bad-date
-rw-r--r-- notasize 2017/01/01 01:01:01 bad/size.rpm
this is not a listing line at all
";
        let snapshot = parse(listing);
        assert_eq!(snapshot.len(), 1);
        assert!(snapshot.get("ok").is_some());
    }

    #[test]
    fn excluded_paths_are_dropped() {
        let filter = ExclusionFilter::compile(&["private"]).unwrap();
        let snapshot = ListingParser::new(&filter)
            .parse(LISTING.as_bytes(), &DirectoryCache::new())
            .unwrap();
        assert!(snapshot.get("private").is_none());
        assert!(snapshot.get("tree").is_some());
    }

    #[test]
    fn cached_ctime_clears_changed_flag() {
        let snapshot = parse(LISTING);
        let ctime = snapshot.get("tree").unwrap().ctime;

        let mut cache = DirectoryCache::new();
        cache.insert(
            "tree".to_string(),
            crate::catalog::entities::CachedDir {
                id: 7,
                readable: true,
                ctime,
            },
        );
        let filter = ExclusionFilter::default();
        let again = ListingParser::new(&filter)
            .parse(LISTING.as_bytes(), &cache)
            .unwrap();
        assert!(!again.get("tree").unwrap().changed);
        assert!(again.get("tree/repodata").unwrap().changed);
    }

    #[test]
    fn nonzero_exit_status_still_parses_partial_output() {
        let filter = ExclusionFilter::default();
        let output = TransportOutput {
            stdout: LISTING.as_bytes().to_vec(),
            exit_code: 23,
        };
        let mut logger = ScanLogger::discard();
        let snapshot = ListingParser::new(&filter)
            .parse_output(&output, &DirectoryCache::new(), &mut logger)
            .unwrap();
        assert!(snapshot.get("tree").is_some());
    }
}
