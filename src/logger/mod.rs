//! Structured scan-event logging: append-only JSONL with graceful degradation.

pub mod jsonl;

pub use jsonl::{EventType, LogEntry, ScanLogger, Severity};
