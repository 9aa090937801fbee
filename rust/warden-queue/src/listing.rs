use std::fmt::Write as _;

use crate::{QueueEntry, SOURCE_ARCHITECTURE};

/// One row of a queue listing.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct ListingRow {
    /// Source package name.
    pub source: String,
    /// Package version.
    pub version: String,
    /// Effective destination suite.
    pub suite: String,
    /// Architecture, or `source`.
    pub architecture: String,
    /// Decision label.
    pub decision: &'static str,
}

/// Rows for a set of entries: one per distinct architecture of each entry.
/// An entry without artifacts gets a single `source` row.
pub fn listing_rows(entries: &[QueueEntry]) -> Vec<ListingRow> {
    let mut rows = Vec::new();
    for entry in entries {
        let mut architectures: Vec<&str> = entry
            .artifacts
            .iter()
            .map(|artifact| artifact.architecture.as_str())
            .collect();
        architectures.sort_unstable();
        architectures.dedup();
        if architectures.is_empty() {
            architectures.push(SOURCE_ARCHITECTURE);
        }
        for architecture in architectures {
            rows.push(ListingRow {
                source: entry.source.clone(),
                version: entry.version.clone(),
                suite: entry.effective_suite().to_string(),
                architecture: architecture.to_string(),
                decision: entry.decision.label(),
            });
        }
    }
    rows.sort();
    rows
}

/// Render rows as an aligned text table with a header.
pub fn render_listing(rows: &[ListingRow]) -> String {
    let header = ["source", "version", "suite", "architecture", "decision"];
    let cells: Vec<[&str; 5]> = rows
        .iter()
        .map(|row| {
            [
                row.source.as_str(),
                row.version.as_str(),
                row.suite.as_str(),
                row.architecture.as_str(),
                row.decision,
            ]
        })
        .collect();

    let mut widths = header.map(str::len);
    for line in &cells {
        for (width, cell) in widths.iter_mut().zip(line) {
            *width = (*width).max(cell.len());
        }
    }

    let mut out = String::new();
    for line in std::iter::once(header).chain(cells) {
        let padded: Vec<String> = line
            .iter()
            .zip(widths)
            .map(|(cell, width)| format!("{cell:<width$}"))
            .collect();
        let _ = writeln!(out, "{}", padded.join(" | ").trim_end());
    }
    out
}
