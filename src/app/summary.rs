//! End-of-run summary printed to stdout.

use idscan_core::ScanReport;

/// Builds the summary lines for a finished run.
///
/// `stored` is the store's total record count, when it could be read.
pub(crate) fn completion_summary_lines(report: &ScanReport, stored: Option<u64>) -> Vec<String> {
    let mut lines = Vec::new();

    let headline = if report.interrupted {
        "Scan interrupted"
    } else {
        "Scan complete"
    };
    lines.push(format!(
        "{headline}: ids {}..={} (resumed at {})",
        report.configured.start(),
        report.configured.end(),
        report.resume_from
    ));
    lines.push(format!(
        "  attempted {}, found {}, accepted {}",
        report.attempted, report.found, report.accepted
    ));
    lines.push(format!(
        "  committed {} in {} flushes ({} failed attempts)",
        report.committed, report.flushes, report.failed_flushes
    ));
    if let Some(stored) = stored {
        lines.push(format!("  {stored} records in store"));
    }
    if report.pending > 0 {
        lines.push(format!(
            "  {} records could not be written; rerun to retry them",
            report.pending
        ));
    } else if report.interrupted {
        lines.push("  Progress saved. Run again to resume.".to_string());
    }
    lines
}

pub(crate) fn print_completion_summary(report: &ScanReport, stored: Option<u64>) {
    for line in completion_summary_lines(report, stored) {
        println!("{line}");
    }
}
