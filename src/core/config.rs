//! Configuration: TOML file + env var overrides + defaults.
//!
//! The engine itself is handed already-populated categories; this module is
//! the thin process-level layer that loads them from disk for the CLI.

#![allow(missing_docs)]

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::core::errors::{MtsError, Result};

/// Environment variable overriding the catalog database path.
pub const ENV_DATABASE: &str = "MTS_DATABASE";

/// Full configuration model.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(default)]
pub struct Config {
    /// Catalog database file.
    pub database: PathBuf,
    pub log: LogConfig,
    /// Categories under synchronization, in scan order.
    #[serde(rename = "category")]
    pub categories: Vec<CategoryConfig>,
}

/// Event log sink settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(default)]
pub struct LogConfig {
    /// JSONL event log file; events fall back to stderr when unset.
    pub file: Option<PathBuf>,
}

/// One top-level tree under synchronization.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct CategoryConfig {
    /// Category name, unique within the catalog.
    pub name: String,
    /// Product this tree belongs to (taxonomy lookup key).
    pub product: String,
    /// Filesystem root of the tree for live scans.
    pub topdir: PathBuf,
    /// Logical name prefix for catalog directory rows. Defaults to the
    /// topdir path without its leading separator.
    pub topdir_name: Option<String>,
    /// Exclusion patterns, matched as regex prefixes of relative paths.
    pub excludes: Vec<String>,
}

impl Default for CategoryConfig {
    fn default() -> Self {
        Self {
            name: String::new(),
            product: String::new(),
            topdir: PathBuf::new(),
            topdir_name: None,
            excludes: Vec::new(),
        }
    }
}

impl CategoryConfig {
    /// Logical name prefix for this category's directory rows.
    #[must_use]
    pub fn topdir_name(&self) -> String {
        self.topdir_name.clone().unwrap_or_else(|| {
            self.topdir
                .to_string_lossy()
                .trim_start_matches('/')
                .to_string()
        })
    }
}

impl Config {
    /// Load configuration from a TOML file and apply env overrides.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(MtsError::MissingConfig {
                path: path.to_path_buf(),
            });
        }
        let raw = fs::read_to_string(path).map_err(|source| MtsError::io(path, source))?;
        let mut config: Self = toml::from_str(&raw)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(value) = env::var(ENV_DATABASE)
            && !value.is_empty()
        {
            self.database = PathBuf::from(value);
        }
    }

    fn validate(&self) -> Result<()> {
        if self.database.as_os_str().is_empty() {
            return Err(MtsError::InvalidConfig {
                details: "database path must be set".to_string(),
            });
        }
        for category in &self.categories {
            if category.name.is_empty() {
                return Err(MtsError::InvalidConfig {
                    details: "category name must not be empty".to_string(),
                });
            }
            if category.product.is_empty() {
                return Err(MtsError::InvalidConfig {
                    details: format!("category {:?} has no product", category.name),
                });
            }
        }
        Ok(())
    }

    /// Find a category by name.
    #[must_use]
    pub fn category(&self, name: &str) -> Option<&CategoryConfig> {
        self.categories.iter().find(|c| c.name == name)
    }
}
