//! Sink trait and error types
//!
//! A sink is the append-only destination for finished listing records and
//! for reports about tasks the crawl gave up on.

use crate::crawler::{FailureKind, Role};
use crate::listing::ListingRecord;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur while writing to or reading from a sink
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("No active run; create or resume a run before appending")]
    NoActiveRun,

    #[error("Run not found: {0}")]
    RunNotFound(i64),

    #[error("Sink rejected write: {0}")]
    Rejected(String),
}

/// Result type for sink operations
pub type SinkResult<T> = Result<T, SinkError>;

/// Terminal failure of a task
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FailureReport {
    pub url: String,
    pub role: Option<Role>,
    /// Attempts made, including the last one
    pub attempts: u32,
    pub last_error_kind: FailureKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Append-only destination for crawl output
///
/// Delivery is at-least-once: after an interrupted run a record may be
/// appended again on resume. Implementations must be safe to call from
/// several workers at once.
pub trait Sink: Send + Sync {
    /// Appends a finished listing record
    fn append(&self, record: &ListingRecord) -> SinkResult<()>;

    /// Appends a report for an abandoned task
    fn append_failure(&self, report: &FailureReport) -> SinkResult<()>;
}
