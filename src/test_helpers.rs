//! Shared test utilities for the archive-export test suite.
//!
//! Provides a throwaway process folder, lookup helpers that panic with the
//! available choices on a miss, and a calendar shape assertion for
//! newspaper volumes.
//!
//! # Usage
//!
//! ```rust
//! use crate::test_helpers::*;
//!
//! let (tmp, sources) = setup_process(&["img001", "img002"]);
//! let issue = find_node(&tree, "NewspaperIssue");
//!
//! assert_calendar_shape(&hierarchy, &[
//!     ("2022", &[("2022-06", &["2022-06-01", "2022-06-02"])]),
//! ]);
//! ```

use std::fs;
use std::path::Path;
use tempfile::TempDir;

use crate::config::{SourceLayout, SourcePaths};
use crate::hierarchy::Hierarchy;
use crate::tree::{DocumentTree, LogicalNode};

// =========================================================================
// Fixture setup
// =========================================================================

/// Create a process folder with master image, ALTO, text and per-page PDF
/// for each stem, laid out as the stock [`SourceLayout`].
pub fn setup_process(stems: &[&str]) -> (TempDir, SourcePaths) {
    let tmp = TempDir::new().unwrap();
    let sources = SourceLayout::default().resolve(&tmp.path().join("process"));
    for dir in [&sources.images, &sources.alto, &sources.text, &sources.pdf] {
        fs::create_dir_all(dir).unwrap();
    }
    add_pages(&sources, stems);
    (tmp, sources)
}

/// Add source files for more stems to an existing process folder.
pub fn add_pages(sources: &SourcePaths, stems: &[&str]) {
    for stem in stems {
        fs::write(sources.images.join(format!("{stem}.tif")), "tif").unwrap();
        fs::write(sources.alto.join(format!("{stem}.xml")), "<alto/>").unwrap();
        fs::write(sources.text.join(format!("{stem}.txt")), format!("text {stem}")).unwrap();
        fs::write(sources.pdf.join(format!("{stem}.pdf")), "%PDF").unwrap();
    }
}

/// Sorted names of the regular files directly in `dir`. Empty when `dir`
/// does not exist.
pub fn file_names(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = fs::read_dir(dir)
        .map(|entries| {
            entries
                .filter_map(|e| e.ok())
                .filter(|e| e.path().is_file())
                .map(|e| e.file_name().to_string_lossy().into_owned())
                .collect()
        })
        .unwrap_or_default();
    names.sort();
    names
}

// =========================================================================
// Tree lookups, panicking with the available choices on a miss
// =========================================================================

/// First node of `doc_type` in pre-order, root included. Panics if absent.
pub fn find_node<'a>(tree: &'a DocumentTree, doc_type: &str) -> &'a LogicalNode {
    std::iter::once(&tree.logical)
        .chain(tree.logical.descendants())
        .find(|n| n.doc_type == doc_type)
        .unwrap_or_else(|| {
            let types: Vec<&str> = std::iter::once(&tree.logical)
                .chain(tree.logical.descendants())
                .map(|n| n.doc_type.as_str())
                .collect();
            panic!("no '{doc_type}' node. Available: {types:?}")
        })
}

// =========================================================================
// Calendar helpers
// =========================================================================

/// Assert the full Year → Month → Day key structure of a hierarchy.
pub fn assert_calendar_shape(hierarchy: &Hierarchy, expected: &[(&str, &[(&str, &[&str])])]) {
    let years: Vec<&str> = hierarchy.years.iter().map(|y| y.key.as_str()).collect();
    let expected_years: Vec<&str> = expected.iter().map(|(y, _)| *y).collect();
    assert_eq!(years, expected_years, "years mismatch");

    for (year, (_, months)) in hierarchy.years.iter().zip(expected) {
        let actual: Vec<&str> = year.months.iter().map(|m| m.key.as_str()).collect();
        let wanted: Vec<&str> = months.iter().map(|(m, _)| *m).collect();
        assert_eq!(actual, wanted, "months of {} mismatch", year.key);

        for (month, (_, days)) in year.months.iter().zip(months.iter()) {
            let actual: Vec<&str> = month.days.iter().map(|d| d.key.as_str()).collect();
            assert_eq!(actual, days.to_vec(), "days of {} mismatch", month.key);
        }
    }
}
