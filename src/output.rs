//! CLI output formatting for the export commands.
//!
//! Output leads with what was exported (units and file names) and keeps
//! filesystem locations as secondary context, one indent level deeper.
//!
//! # Output Format
//!
//! ## Export
//!
//! ```text
//! newspaper → output/newspapers
//! 001 ABC-0001.tif
//! 002 ABC-20210305.xml
//! 003 GAZ.xml
//!
//! Problems
//!     NewspaperIssue LOG_7: Image not found: images/master/img009.tif
//!
//! Exported 3 files, 1 problem
//! ```
//!
//! ## Check
//!
//! ```text
//! newspaper (NewspaperVolume) → output/newspapers
//! 001 NewspaperIssue 2022-06-01 (2 pages)
//!     img001.tif → XYZ-0001
//!     img002.tif → XYZ-0002
//! ```
//!
//! ## Merge anchor
//!
//! ```text
//! GAZ.xml: merged, now 3 volumes
//! ```
//!
//! # Architecture
//!
//! Each command has a `format_*` function (returns `Vec<String>`) for
//! testability and a `print_*` wrapper that writes to stdout. Format
//! functions are pure.

use crate::anchor::MergeOutcome;
use crate::export::{ExportOutcome, ExportPlan};
use std::path::Path;

// ============================================================================
// Shared helpers
// ============================================================================

/// Format a 1-based positional index as 3-digit zero-padded.
fn format_index(pos: usize) -> String {
    format!("{:0>3}", pos)
}

/// Return indentation string: 4 spaces per depth level.
fn indent(depth: usize) -> String {
    "    ".repeat(depth)
}

fn plural(n: usize, word: &str) -> String {
    if n == 1 {
        format!("{n} {word}")
    } else {
        format!("{n} {word}s")
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

// ============================================================================
// Export
// ============================================================================

/// Format the result of one export invocation.
pub fn format_outcome(outcome: &ExportOutcome) -> Vec<String> {
    let mut lines = Vec::new();

    if let Some(route) = outcome.route {
        let target = outcome
            .committed
            .first()
            .and_then(|p| p.parent())
            .map(|p| format!(" → {}", p.display()))
            .unwrap_or_default();
        lines.push(format!("{route}{target}"));
    }
    for (i, path) in outcome.committed.iter().enumerate() {
        lines.push(format!("{} {}", format_index(i + 1), file_name(path)));
    }

    if !outcome.problems.is_empty() {
        if !lines.is_empty() {
            lines.push(String::new());
        }
        lines.push("Problems".to_string());
        for problem in &outcome.problems {
            lines.push(format!("{}{}", indent(1), problem));
        }
    }

    lines.push(String::new());
    let summary = format!(
        "Exported {}, {}",
        plural(outcome.committed.len(), "file"),
        plural(outcome.problems.len(), "problem")
    );
    if outcome.success {
        lines.push(summary);
    } else {
        lines.push(format!("{summary} (failed)"));
    }
    lines
}

pub fn print_outcome(outcome: &ExportOutcome) {
    for line in format_outcome(outcome) {
        println!("{}", line);
    }
}

// ============================================================================
// Check
// ============================================================================

/// Format a dry-run plan: route, target and the file mapping per unit.
pub fn format_plan(plan: &ExportPlan) -> Vec<String> {
    let mut lines = vec![format!(
        "{} ({}) → {}",
        plan.route,
        plan.dispatch_type,
        plan.target.display()
    )];
    if plan.units.is_empty() {
        lines.push(format!("{}handed to the default export", indent(1)));
        return lines;
    }
    for (i, unit) in plan.units.iter().enumerate() {
        lines.push(format!(
            "{} {} ({})",
            format_index(i + 1),
            unit.label,
            plural(unit.files.len(), "page")
        ));
        for (source, export) in &unit.files {
            lines.push(format!("{}{source} → {export}", indent(1)));
        }
    }
    lines
}

pub fn print_plan(plan: &ExportPlan) {
    for line in format_plan(plan) {
        println!("{}", line);
    }
}

// ============================================================================
// Merge anchor
// ============================================================================

pub fn format_merge(anchor: &Path, outcome: &MergeOutcome) -> Vec<String> {
    let name = file_name(anchor);
    match outcome {
        MergeOutcome::Merged { volumes } => {
            vec![format!("{name}: merged, now {}", plural(*volumes, "volume"))]
        }
        MergeOutcome::AlreadyListed => vec![format!("{name}: volume already listed, unchanged")],
    }
}

pub fn print_merge(anchor: &Path, outcome: &MergeOutcome) {
    for line in format_merge(anchor, outcome) {
        println!("{}", line);
    }
}

// ============================================================================
// Tests
// ============================================================================
