//! Output module for crawl summaries and reports
//!
//! This module handles:
//! - Building a `CrawlSummary` for a run from the SQLite sink
//! - Printing summary statistics to stdout
//! - Writing the markdown report

mod markdown;
pub mod stats;

pub use markdown::{format_markdown_summary, generate_markdown_summary};
pub use stats::{field_coverage, print_summary, FieldCoverage};

use crate::crawler::FailureKind;
use crate::sink::{SinkError, SqliteSink};
use chrono::{DateTime, Utc};
use thiserror::Error;

/// Errors that can occur during output operations
#[derive(Debug, Error)]
pub enum OutputError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Sink error: {0}")]
    Sink(#[from] SinkError),

    #[error("No crawl runs found in database")]
    NoRuns,
}

/// Result type for output operations
pub type OutputResult<T> = Result<T, OutputError>;

/// Summary of one crawl run
#[derive(Debug, Clone, Default)]
pub struct CrawlSummary {
    // Run metadata
    pub run_id: i64,
    pub started_at: String,
    pub finished_at: Option<String>,
    pub duration_seconds: Option<u64>,
    pub status: String,
    pub config_hash: String,

    /// Distinct listing URLs appended
    pub listings_emitted: u64,

    /// Abandoned tasks per failure kind, most frequent first
    pub failures_by_kind: Vec<(FailureKind, u64)>,

    /// URLs of the first abandoned tasks
    pub failed_urls: Vec<String>,

    /// Per-field presence across emitted records
    pub field_coverage: Vec<FieldCoverage>,
}

impl CrawlSummary {
    pub fn total_failures(&self) -> u64 {
        self.failures_by_kind.iter().map(|(_, count)| count).sum()
    }

    /// Percentage of finished tasks that produced output rather than a failure report
    pub fn success_rate(&self) -> f64 {
        let finished = self.listings_emitted + self.total_failures();
        if finished == 0 {
            return 0.0;
        }
        (self.listings_emitted as f64 / finished as f64) * 100.0
    }
}

const FAILED_URL_LIMIT: usize = 20;

/// Builds the summary of the most recent run
pub fn generate_summary(sink: &SqliteSink) -> OutputResult<CrawlSummary> {
    let run = sink.get_latest_run()?.ok_or(OutputError::NoRuns)?;
    summarize_run(sink, run.id)
}

/// Builds the summary of a specific run
pub fn summarize_run(sink: &SqliteSink, run_id: i64) -> OutputResult<CrawlSummary> {
    let run = sink.get_run(run_id)?;

    let duration_seconds = match (
        run.started_at.parse::<DateTime<Utc>>(),
        run.finished_at.as_deref().map(str::parse::<DateTime<Utc>>),
    ) {
        (Ok(started), Some(Ok(finished))) => Some((finished - started).num_seconds().max(0) as u64),
        _ => None,
    };

    let mut failures_by_kind: Vec<(FailureKind, u64)> =
        sink.failures_by_kind(run_id)?.into_iter().collect();
    failures_by_kind.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.as_str().cmp(b.0.as_str())));

    let failed_urls = sink
        .load_failures(run_id)?
        .into_iter()
        .take(FAILED_URL_LIMIT)
        .map(|report| report.url)
        .collect();

    let records = sink.load_listings(run_id)?;

    Ok(CrawlSummary {
        run_id: run.id,
        started_at: run.started_at,
        finished_at: run.finished_at,
        duration_seconds,
        status: run.status.to_db_string().to_string(),
        config_hash: run.config_hash,
        listings_emitted: sink.count_listings(run_id)?,
        failures_by_kind,
        failed_urls,
        field_coverage: field_coverage(&records),
    })
}
