//! In-memory sink

use crate::listing::ListingRecord;
use crate::sink::traits::{FailureReport, Sink, SinkError, SinkResult};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

/// Keeps records and failure reports in memory
///
/// Useful for embedding the engine and for tests. Can be told to reject a
/// number of record appends to exercise the sink failure path.
#[derive(Debug, Default)]
pub struct MemorySink {
    records: Mutex<Vec<ListingRecord>>,
    failures: Mutex<Vec<FailureReport>>,
    reject_appends: AtomicUsize,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next `n` calls to [`Sink::append`] fail
    pub fn reject_next_appends(&self, n: usize) {
        self.reject_appends.store(n, Ordering::SeqCst);
    }

    /// Snapshot of appended records, in append order
    pub fn records(&self) -> Vec<ListingRecord> {
        self.records
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Snapshot of appended failure reports, in append order
    pub fn failures(&self) -> Vec<FailureReport> {
        self.failures
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

impl Sink for MemorySink {
    fn append(&self, record: &ListingRecord) -> SinkResult<()> {
        let rejected = self
            .reject_appends
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if rejected {
            return Err(SinkError::Rejected(format!("append of {}", record.url)));
        }

        self.records
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(record.clone());
        Ok(())
    }

    fn append_failure(&self, report: &FailureReport) -> SinkResult<()> {
        self.failures
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(report.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crawler::{FailureKind, Role};

    #[test]
    fn test_records_kept_in_order() {
        let sink = MemorySink::new();
        for i in 0..3 {
            sink.append(&ListingRecord {
                url: format!("https://x/l/{}", i),
                ..Default::default()
            })
            .unwrap();
        }

        let urls: Vec<String> = sink.records().into_iter().map(|r| r.url).collect();
        assert_eq!(urls, vec!["https://x/l/0", "https://x/l/1", "https://x/l/2"]);
    }

    #[test]
    fn test_rejected_appends() {
        let sink = MemorySink::new();
        sink.reject_next_appends(1);

        let record = ListingRecord {
            url: "https://x/l/1".to_string(),
            ..Default::default()
        };
        assert!(sink.append(&record).is_err());
        assert!(sink.append(&record).is_ok());
        assert_eq!(sink.records().len(), 1);
    }

    #[test]
    fn test_failures_recorded() {
        let sink = MemorySink::new();
        sink.append_failure(&FailureReport {
            url: "https://x/l/1".to_string(),
            role: Some(Role::Detail),
            attempts: 3,
            last_error_kind: FailureKind::Timeout,
            message: None,
        })
        .unwrap();

        assert_eq!(sink.failures().len(), 1);
        assert_eq!(sink.failures()[0].last_error_kind, FailureKind::Timeout);
    }
}
