//! JSONL scan logger: append-only line-delimited JSON.
//!
//! Each line is a self-contained JSON object, assembled in memory and
//! written atomically via `write_all` so tailing processes never see
//! interleaved partial lines.
//!
//! Degradation chain:
//! 1. Primary file path
//! 2. stderr with `[MTS-LOG]` prefix
//! 3. Silent discard (a scan must never abort over logging failures)

#![allow(missing_docs)]

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Severity level for log events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Critical,
}

/// Event types matching the reconciliation activity model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    ScanStart,
    ScanComplete,
    DirectoryCreated,
    DirectoryUpdated,
    DirectoryDeleted,
    RepositoryCreated,
    RepositoryMoved,
    TransportDegraded,
    Warning,
}

/// A single JSONL entry; all fields optional except `ts`, `event` and
/// `severity`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    /// ISO 8601 UTC timestamp.
    pub ts: String,
    pub event: EventType,
    pub severity: Severity,
    /// Category the event belongs to.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    /// Catalog directory or repository name involved.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Entity count (e.g. directories seen in a completed scan).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub count: Option<u64>,
    /// Freeform details.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl LogEntry {
    /// Create a new entry stamped with the current UTC time.
    pub fn new(event: EventType, severity: Severity) -> Self {
        Self {
            ts: format_utc_now(),
            event,
            severity,
            category: None,
            name: None,
            count: None,
            details: None,
        }
    }

    #[must_use]
    pub fn category(mut self, category: &str) -> Self {
        self.category = Some(category.to_string());
        self
    }

    #[must_use]
    pub fn name(mut self, name: &str) -> Self {
        self.name = Some(name.to_string());
        self
    }

    #[must_use]
    pub fn count(mut self, count: u64) -> Self {
        self.count = Some(count);
        self
    }

    #[must_use]
    pub fn details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }
}

fn format_utc_now() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WriterState {
    Normal,
    Stderr,
    Discard,
}

/// Append-only JSONL writer with degradation.
pub struct ScanLogger {
    state: WriterState,
    file: Option<File>,
    path: Option<PathBuf>,
}

impl ScanLogger {
    /// Open a file-backed logger. Failure to open degrades to stderr
    /// instead of erroring.
    pub fn open(path: &Path) -> Self {
        let file = OpenOptions::new().create(true).append(true).open(path);
        match file {
            Ok(file) => Self {
                state: WriterState::Normal,
                file: Some(file),
                path: Some(path.to_path_buf()),
            },
            Err(err) => {
                eprintln!("[MTS-LOG] cannot open {}: {err}; logging to stderr", path.display());
                Self::stderr()
            }
        }
    }

    /// Logger that writes straight to stderr.
    #[must_use]
    pub fn stderr() -> Self {
        Self {
            state: WriterState::Stderr,
            file: None,
            path: None,
        }
    }

    /// Logger that discards everything. Used by tests.
    #[must_use]
    pub fn discard() -> Self {
        Self {
            state: WriterState::Discard,
            file: None,
            path: None,
        }
    }

    /// Path of the active log file, when file-backed.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Write one entry, degrading on failure.
    pub fn log(&mut self, entry: &LogEntry) {
        let Ok(mut line) = serde_json::to_string(entry) else {
            return;
        };
        line.push('\n');

        match self.state {
            WriterState::Normal => {
                let ok = self
                    .file
                    .as_mut()
                    .is_some_and(|file| file.write_all(line.as_bytes()).is_ok());
                if !ok {
                    eprintln!("[MTS-LOG] write failed; degrading to stderr");
                    self.state = WriterState::Stderr;
                    self.file = None;
                    eprint!("{line}");
                }
            }
            WriterState::Stderr => eprint!("{line}"),
            WriterState::Discard => {}
        }
    }

    /// Shorthand for a warning event.
    pub fn warn(&mut self, category: &str, details: impl Into<String>) {
        self.log(
            &LogEntry::new(EventType::Warning, Severity::Warning)
                .category(category)
                .details(details),
        );
    }
}
