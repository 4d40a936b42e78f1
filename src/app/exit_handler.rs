//! Exit code logic for the scanner process.
//!
//! Single responsibility: map the end-of-run report to the process exit outcome.

use idscan_core::ScanReport;

use crate::ProcessExit;

/// A run succeeds, interrupted or not, as long as nothing is left unwritten.
pub(crate) fn determine_exit_outcome(report: &ScanReport) -> ProcessExit {
    if report.pending == 0 {
        ProcessExit::Success
    } else {
        ProcessExit::Failure
    }
}
