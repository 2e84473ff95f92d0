//! Pattern-based path rejection shared by the tree walker and the listing
//! parser.

use regex::Regex;

use crate::core::errors::{MtsError, Result};

/// Compiled exclusion patterns.
///
/// Each pattern is a regular expression matched as a prefix: a path is
/// excluded when some pattern matches starting at its first byte. The live
/// walker additionally prunes descent into excluded subtrees, so a pattern
/// matching a directory also suppresses everything below it.
#[derive(Debug, Clone, Default)]
pub struct ExclusionFilter {
    patterns: Vec<Regex>,
}

impl ExclusionFilter {
    /// Compile a pattern list. Invalid regexes are a configuration error.
    pub fn compile<S: AsRef<str>>(patterns: &[S]) -> Result<Self> {
        let compiled = patterns
            .iter()
            .map(|pattern| {
                let pattern = pattern.as_ref();
                Regex::new(pattern).map_err(|err| MtsError::BadPattern {
                    pattern: pattern.to_string(),
                    details: err.to_string(),
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { patterns: compiled })
    }

    /// Whether `path` matches any pattern from its start.
    #[must_use]
    pub fn is_excluded(&self, path: &str) -> bool {
        self.patterns
            .iter()
            .any(|pattern| pattern.find(path).is_some_and(|m| m.start() == 0))
    }

    /// True when no patterns are configured.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matches_only_from_path_start() {
        let filter = ExclusionFilter::compile(&["testing", "\\.snapshot"]).unwrap();
        assert!(filter.is_excluded("testing/27/x86_64"));
        assert!(filter.is_excluded(".snapshot"));
        // The pattern occurs, but not at the start.
        assert!(!filter.is_excluded("updates/testing/27"));
        assert!(!filter.is_excluded("releases/.snapshot"));
    }

    #[test]
    fn regex_syntax_is_honored() {
        let filter = ExclusionFilter::compile(&["releases/\\d+/Everything"]).unwrap();
        assert!(filter.is_excluded("releases/27/Everything/x86_64"));
        assert!(!filter.is_excluded("releases/rawhide/Everything"));
    }

    #[test]
    fn empty_filter_excludes_nothing() {
        let filter = ExclusionFilter::compile::<&str>(&[]).unwrap();
        assert!(filter.is_empty());
        assert!(!filter.is_excluded("anything/at/all"));
    }

    #[test]
    fn invalid_pattern_is_a_config_error() {
        let err = ExclusionFilter::compile(&["["]).unwrap_err();
        assert_eq!(err.code(), "MTS-1101");
    }
}
