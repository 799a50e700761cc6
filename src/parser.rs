//! Parsing of `brew services list` output.
//!
//! The first line is the column header and is always dropped. Body lines
//! are split on runs of spaces and mapped positionally:
//! `<name> [<status>] [<owner>] ...`. Trailing columns (the plist path) are
//! ignored.

use tracing::warn;

use crate::error::SyncError;
use crate::model::{ServiceRecord, ServiceStatus};

/// Records parsed from one snapshot plus any lines that had to be skipped.
#[derive(Debug, Default)]
pub struct ParseReport {
    pub records: Vec<ServiceRecord>,
    pub skipped: Vec<SyncError>,
}

/// Parse captured supervisor output into ordered service records.
pub fn parse(raw: &str) -> Vec<ServiceRecord> {
    parse_report(raw).records
}

/// Like [`parse`], but also reports lines that could not be mapped.
///
/// A malformed line never aborts the snapshot; it is skipped and recorded
/// as [`SyncError::MalformedOutput`].
pub fn parse_report(raw: &str) -> ParseReport {
    let mut report = ParseReport::default();
    let trimmed = raw.trim_start_matches(['\n', '\r']).trim_end();

    // Line numbers are 1-based and count the header.
    for (idx, line) in trimmed.split('\n').enumerate().skip(1) {
        if line.is_empty() {
            continue;
        }

        let mut tokens = line
            .split(' ')
            .map(|token| token.trim())
            .filter(|token| !token.is_empty());

        let Some(name) = tokens.next() else {
            let err = SyncError::MalformedOutput {
                line: idx + 1,
                content: line.to_string(),
            };
            warn!("skipping supervisor output: {err}");
            report.skipped.push(err);
            continue;
        };

        let status = tokens
            .next()
            .map(|token| token.parse().unwrap_or(ServiceStatus::Unknown))
            .unwrap_or(ServiceStatus::Unknown);
        let owner = tokens.next().unwrap_or_default();

        report.records.push(ServiceRecord::new(name, status, owner));
    }

    report
}
