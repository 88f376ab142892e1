//! Statistics over emitted records
//!
//! Field coverage and the plain-text summary printed by `--stats`.

use crate::listing::{ListingRecord, REPORTED_FIELDS};
use crate::output::CrawlSummary;

/// How many records carry a given field
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldCoverage {
    pub field: &'static str,
    pub present: u64,
    pub total: u64,
}

impl FieldCoverage {
    pub fn percentage(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        (self.present as f64 / self.total as f64) * 100.0
    }
}

/// Computes per-field presence across `records`
pub fn field_coverage(records: &[ListingRecord]) -> Vec<FieldCoverage> {
    let mut present = [0u64; REPORTED_FIELDS.len()];
    for record in records {
        for (count, has) in present.iter_mut().zip(record.field_presence()) {
            if has {
                *count += 1;
            }
        }
    }

    REPORTED_FIELDS
        .iter()
        .zip(present)
        .map(|(&field, present)| FieldCoverage {
            field,
            present,
            total: records.len() as u64,
        })
        .collect()
}

/// Prints a summary to stdout in a formatted manner
pub fn print_summary(summary: &CrawlSummary) {
    println!("=== Crawl Statistics ===\n");

    println!("Run {} ({})", summary.run_id, summary.status);
    println!("  Started: {}", summary.started_at);
    if let Some(finished) = &summary.finished_at {
        println!("  Finished: {}", finished);
    }
    println!();

    println!("Overview:");
    println!("  Listings emitted: {}", summary.listings_emitted);
    println!("  Tasks abandoned: {}", summary.total_failures());
    println!();

    if !summary.failures_by_kind.is_empty() {
        println!("Failures by Kind:");
        for (kind, count) in &summary.failures_by_kind {
            println!("  {}: {}", kind, count);
        }
        println!();
    }

    if summary.listings_emitted > 0 {
        println!("Field Coverage:");
        for coverage in &summary.field_coverage {
            println!(
                "  {:<14} {:>5} / {:<5} ({:.1}%)",
                coverage.field,
                coverage.present,
                coverage.total,
                coverage.percentage()
            );
        }
        println!();
    }

    println!("Success Rate: {:.1}%", summary.success_rate());
}
