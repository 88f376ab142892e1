//! Markdown summary generation
//!
//! This module generates human-readable markdown summaries of crawl results,
//! including failure breakdowns and field coverage of emitted records.

use crate::output::{CrawlSummary, OutputResult};
use std::fs::File;
use std::io::Write;
use std::path::Path;

/// Generates a markdown summary and writes it to `output_path`
///
/// # Arguments
///
/// * `summary` - The crawl summary data
/// * `output_path` - Path where the markdown file should be written
///
/// # Returns
///
/// * `Ok(())` - Successfully wrote markdown summary
/// * `Err(OutputError)` - Failed to write summary
pub fn generate_markdown_summary(summary: &CrawlSummary, output_path: &Path) -> OutputResult<()> {
    let markdown = format_markdown_summary(summary);

    let mut file = File::create(output_path)?;
    file.write_all(markdown.as_bytes())?;

    Ok(())
}

/// Formats a crawl summary as markdown
pub fn format_markdown_summary(summary: &CrawlSummary) -> String {
    let mut md = String::new();

    md.push_str("# Listing Crawl Summary\n\n");

    // Run metadata
    md.push_str("## Run Information\n\n");
    md.push_str(&format!("- **Run ID**: {}\n", summary.run_id));
    md.push_str(&format!("- **Started**: {}\n", summary.started_at));
    if let Some(finished) = &summary.finished_at {
        md.push_str(&format!("- **Finished**: {}\n", finished));
    }
    if let Some(duration) = summary.duration_seconds {
        md.push_str(&format!(
            "- **Duration**: {} seconds ({:.2} minutes)\n",
            duration,
            duration as f64 / 60.0
        ));
    }
    md.push_str(&format!("- **Status**: {}\n", summary.status));
    md.push_str(&format!("- **Config Hash**: {}\n\n", summary.config_hash));

    md.push_str("## Overall Statistics\n\n");
    md.push_str(&format!(
        "- **Listings Emitted**: {}\n",
        summary.listings_emitted
    ));
    md.push_str(&format!(
        "- **Tasks Abandoned**: {}\n",
        summary.total_failures()
    ));
    md.push_str(&format!(
        "- **Success Rate**: {:.2}%\n\n",
        summary.success_rate()
    ));

    if summary.listings_emitted > 0 {
        md.push_str("## Field Coverage\n\n");
        md.push_str("| Field | Present | Coverage |\n");
        md.push_str("|-------|---------|----------|\n");
        for coverage in &summary.field_coverage {
            md.push_str(&format!(
                "| {} | {} / {} | {:.1}% |\n",
                coverage.field,
                coverage.present,
                coverage.total,
                coverage.percentage()
            ));
        }
        md.push('\n');
    }

    if !summary.failures_by_kind.is_empty() {
        md.push_str("## Failure Summary\n\n");
        md.push_str("| Error Kind | Count |\n");
        md.push_str("|------------|-------|\n");
        for (kind, count) in &summary.failures_by_kind {
            md.push_str(&format!("| {} | {} |\n", kind, count));
        }
        md.push('\n');
    }

    if !summary.failed_urls.is_empty() {
        md.push_str("## Abandoned URLs\n\n");
        for url in &summary.failed_urls {
            md.push_str(&format!("- {}\n", url));
        }
        let remaining = summary
            .total_failures()
            .saturating_sub(summary.failed_urls.len() as u64);
        if remaining > 0 {
            md.push_str(&format!("\n... and {} more\n", remaining));
        }
        md.push('\n');
    }

    md
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crawler::FailureKind;
    use crate::output::FieldCoverage;
    use tempfile::TempDir;

    fn create_test_summary() -> CrawlSummary {
        CrawlSummary {
            run_id: 1,
            started_at: "2024-01-01T00:00:00Z".to_string(),
            finished_at: Some("2024-01-01T01:00:00Z".to_string()),
            duration_seconds: Some(3600),
            status: "completed".to_string(),
            config_hash: "abc123".to_string(),
            listings_emitted: 48,
            failures_by_kind: vec![(FailureKind::Timeout, 2)],
            failed_urls: vec!["https://x/l/9".to_string()],
            field_coverage: vec![FieldCoverage {
                field: "title",
                present: 48,
                total: 48,
            }],
        }
    }

    #[test]
    fn test_format_markdown_summary() {
        let markdown = format_markdown_summary(&create_test_summary());

        assert!(markdown.contains("# Listing Crawl Summary"));
        assert!(markdown.contains("Run ID"));
        assert!(markdown.contains("- **Listings Emitted**: 48"));
        assert!(markdown.contains("| timeout | 2 |"));
        assert!(markdown.contains("| title | 48 / 48 | 100.0% |"));
        assert!(markdown.contains("https://x/l/9"));
        assert!(markdown.contains("... and 1 more"));
    }

    #[test]
    fn test_empty_sections_omitted() {
        let summary = CrawlSummary {
            run_id: 2,
            status: "running".to_string(),
            ..Default::default()
        };
        let markdown = format_markdown_summary(&summary);

        assert!(!markdown.contains("Field Coverage"));
        assert!(!markdown.contains("Failure Summary"));
        assert!(!markdown.contains("Finished"));
    }

    #[test]
    fn test_generate_markdown_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("summary.md");

        generate_markdown_summary(&create_test_summary(), &path).unwrap();
        let written = std::fs::read_to_string(&path).unwrap();
        assert!(written.starts_with("# Listing Crawl Summary"));
    }
}
