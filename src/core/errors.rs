//! MTS-prefixed error types with structured error codes.

#![allow(missing_docs)]

use std::path::{Path, PathBuf};

use thiserror::Error;

/// Shared `Result` alias for the project.
pub type Result<T> = std::result::Result<T, MtsError>;

/// Top-level error type for the mirror tree synchronizer.
#[derive(Debug, Error)]
pub enum MtsError {
    #[error("[MTS-1001] invalid configuration: {details}")]
    InvalidConfig { details: String },

    #[error("[MTS-1002] missing configuration file: {path}")]
    MissingConfig { path: PathBuf },

    #[error("[MTS-1003] configuration parse failure in {context}: {details}")]
    ConfigParse {
        context: &'static str,
        details: String,
    },

    #[error("[MTS-1101] bad exclusion pattern {pattern:?}: {details}")]
    BadPattern { pattern: String, details: String },

    #[error("[MTS-2001] SQL failure in {context}: {details}")]
    Sql {
        context: &'static str,
        details: String,
    },

    #[error("[MTS-2002] serialization failure in {context}: {details}")]
    Serialization {
        context: &'static str,
        details: String,
    },

    #[error("[MTS-2003] catalog inconsistency: {details}")]
    CatalogConsistency { details: String },

    #[error("[MTS-3001] IO failure at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("[MTS-3002] transport read failure: {details}")]
    Transport { details: String },
}

impl MtsError {
    /// Stable machine-parseable error code.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::InvalidConfig { .. } => "MTS-1001",
            Self::MissingConfig { .. } => "MTS-1002",
            Self::ConfigParse { .. } => "MTS-1003",
            Self::BadPattern { .. } => "MTS-1101",
            Self::Sql { .. } => "MTS-2001",
            Self::Serialization { .. } => "MTS-2002",
            Self::CatalogConsistency { .. } => "MTS-2003",
            Self::Io { .. } => "MTS-3001",
            Self::Transport { .. } => "MTS-3002",
        }
    }

    /// Convenience constructor for IO errors with a known path.
    #[must_use]
    pub fn io(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }
}

impl From<rusqlite::Error> for MtsError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Sql {
            context: "rusqlite",
            details: value.to_string(),
        }
    }
}

impl From<serde_json::Error> for MtsError {
    fn from(value: serde_json::Error) -> Self {
        Self::Serialization {
            context: "serde_json",
            details: value.to_string(),
        }
    }
}

impl From<toml::de::Error> for MtsError {
    fn from(value: toml::de::Error) -> Self {
        Self::ConfigParse {
            context: "toml",
            details: value.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_codes_are_unique() {
        let errors: Vec<MtsError> = vec![
            MtsError::InvalidConfig {
                details: String::new(),
            },
            MtsError::MissingConfig {
                path: PathBuf::new(),
            },
            MtsError::ConfigParse {
                context: "",
                details: String::new(),
            },
            MtsError::BadPattern {
                pattern: String::new(),
                details: String::new(),
            },
            MtsError::Sql {
                context: "",
                details: String::new(),
            },
            MtsError::Serialization {
                context: "",
                details: String::new(),
            },
            MtsError::CatalogConsistency {
                details: String::new(),
            },
            MtsError::Io {
                path: PathBuf::new(),
                source: std::io::Error::new(std::io::ErrorKind::Other, "test"),
            },
            MtsError::Transport {
                details: String::new(),
            },
        ];

        let codes: Vec<&str> = errors.iter().map(|e| e.code()).collect();
        let unique: std::collections::HashSet<&&str> = codes.iter().collect();
        assert_eq!(
            codes.len(),
            unique.len(),
            "error codes must be unique: {codes:?}"
        );
    }

    #[test]
    fn error_display_includes_code() {
        let err = MtsError::BadPattern {
            pattern: "[".to_string(),
            details: "unclosed character class".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("MTS-1101"), "display should contain code: {msg}");
        assert!(msg.contains('['), "display should contain pattern: {msg}");
    }

    #[test]
    fn io_convenience_constructor() {
        let err = MtsError::io(
            "/srv/mirror/pub",
            std::io::Error::new(std::io::ErrorKind::NotFound, "gone"),
        );
        assert_eq!(err.code(), "MTS-3001");
        assert!(err.to_string().contains("/srv/mirror/pub"));
    }

    #[test]
    fn from_rusqlite_error() {
        let sql_err = rusqlite::Error::InvalidQuery;
        let err: MtsError = sql_err.into();
        assert_eq!(err.code(), "MTS-2001");
    }

    #[test]
    fn from_toml_error() {
        let toml_err = toml::from_str::<toml::Value>("= invalid").unwrap_err();
        let err: MtsError = toml_err.into();
        assert_eq!(err.code(), "MTS-1003");
    }
}
