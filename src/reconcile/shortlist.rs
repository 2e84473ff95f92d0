//! Short-list heuristic bounding catalog growth for huge directories.
//!
//! Directories holding thousands of same-class files (package trees, ISO
//! dumps) would bloat the stored file summary without helping freshness
//! checks. When any tracked extension class exceeds the trigger count,
//! the whole map is truncated to the few most recently modified entries.

use std::borrow::Cow;
use std::collections::BTreeMap;

use crate::scanner::snapshot::FileStat;

/// Extension classes whose counts trigger truncation.
pub const TRACKED_EXTENSIONS: &[&str] = &[".rpm", ".drpm", ".iso", ".html"];

/// More than this many files of one class triggers truncation.
pub const SHORTLIST_TRIGGER: usize = 10;

/// Number of entries kept once triggered.
pub const SHORTLIST_KEEP: usize = 3;

/// Apply the short-list heuristic to a directory's file map.
///
/// Identity when every tracked class is at or below the trigger count;
/// otherwise the entire map is replaced by the [`SHORTLIST_KEEP`] entries
/// greatest by `(mod_time, filename, size)`.
#[must_use]
pub fn shortlist(files: &BTreeMap<String, FileStat>) -> Cow<'_, BTreeMap<String, FileStat>> {
    let triggered = TRACKED_EXTENSIONS.iter().any(|ext| {
        files
            .keys()
            .filter(|name| name.ends_with(ext))
            .count()
            > SHORTLIST_TRIGGER
    });
    if !triggered {
        return Cow::Borrowed(files);
    }

    let mut ranked: Vec<(i64, &String, u64)> = files
        .iter()
        .map(|(name, stat)| (stat.mod_time, name, stat.size))
        .collect();
    ranked.sort_unstable();

    let kept = ranked
        .into_iter()
        .rev()
        .take(SHORTLIST_KEEP)
        .map(|(mod_time, name, size)| (name.clone(), FileStat { size, mod_time }))
        .collect();
    Cow::Owned(kept)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn file_map(entries: &[(&str, u64, i64)]) -> BTreeMap<String, FileStat> {
        entries
            .iter()
            .map(|&(name, size, mod_time)| (name.to_string(), FileStat { size, mod_time }))
            .collect()
    }

    #[test]
    fn small_maps_pass_through_unchanged() {
        let files = file_map(&[
            ("a.rpm", 1, 100),
            ("b.rpm", 2, 200),
            ("notes.txt", 3, 300),
        ]);
        let out = shortlist(&files);
        assert!(matches!(out, Cow::Borrowed(_)));
        assert_eq!(*out, files);
    }

    #[test]
    fn eleven_rpms_trigger_truncation_to_three_newest() {
        let mut entries: Vec<(String, FileStat)> = (0..11)
            .map(|i| {
                (
                    format!("pkg-{i:02}.rpm"),
                    FileStat {
                        size: 100 + i,
                        mod_time: 1_000 + i as i64,
                    },
                )
            })
            .collect();
        entries.push((
            "README".to_string(),
            FileStat {
                size: 1,
                mod_time: 5_000,
            },
        ));
        let files: BTreeMap<String, FileStat> = entries.into_iter().collect();

        let out = shortlist(&files);
        assert_eq!(out.len(), SHORTLIST_KEEP);
        // Truncation keeps the globally newest entries, tracked or not.
        let kept: Vec<&str> = out.keys().map(String::as_str).collect();
        assert_eq!(kept, vec!["README", "pkg-09.rpm", "pkg-10.rpm"]);
    }

    #[test]
    fn ties_break_on_filename_then_size() {
        let mut files = BTreeMap::new();
        for i in 0..12 {
            files.insert(
                format!("{}.rpm", (b'a' + i) as char),
                FileStat {
                    size: u64::from(i),
                    mod_time: 42,
                },
            );
        }
        let out = shortlist(&files);
        let kept: Vec<&str> = out.keys().map(String::as_str).collect();
        assert_eq!(kept, vec!["j.rpm", "k.rpm", "l.rpm"]);
    }

    #[test]
    fn untracked_extensions_never_trigger() {
        let files: BTreeMap<String, FileStat> = (0..50)
            .map(|i| {
                (
                    format!("chunk-{i:03}.tar"),
                    FileStat {
                        size: i,
                        mod_time: i as i64,
                    },
                )
            })
            .collect();
        let out = shortlist(&files);
        assert_eq!(out.len(), 50);
    }

    proptest! {
        #[test]
        fn identity_when_every_class_is_at_most_trigger(
            count in 0usize..=SHORTLIST_TRIGGER,
            base in 0i64..1_000_000,
        ) {
            let files: BTreeMap<String, FileStat> = (0..count)
                .map(|i| (
                    format!("pkg-{i:02}.rpm"),
                    FileStat { size: i as u64, mod_time: base + i as i64 },
                ))
                .collect();
            let out = shortlist(&files);
            prop_assert_eq!(&*out, &files);
        }

        #[test]
        fn truncation_keeps_exactly_the_greatest_three(
            count in (SHORTLIST_TRIGGER + 1)..40usize,
            times in proptest::collection::vec(0i64..1_000_000, 40),
        ) {
            let files: BTreeMap<String, FileStat> = (0..count)
                .map(|i| (
                    format!("pkg-{i:02}.rpm"),
                    FileStat { size: i as u64, mod_time: times[i] },
                ))
                .collect();

            let out = shortlist(&files);
            prop_assert_eq!(out.len(), SHORTLIST_KEEP);

            let mut ranked: Vec<(i64, &String, u64)> = files
                .iter()
                .map(|(name, stat)| (stat.mod_time, name, stat.size))
                .collect();
            ranked.sort_unstable();
            for (mod_time, name, size) in ranked.into_iter().rev().take(SHORTLIST_KEEP) {
                let kept = out.get(name).expect("greatest entry kept");
                prop_assert_eq!(kept.mod_time, mod_time);
                prop_assert_eq!(kept.size, size);
            }
        }
    }
}
