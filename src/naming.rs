//! Export file naming.
//!
//! Every master image that leaves the system is renamed to a short, stable
//! export name derived from the unit identifier:
//!
//! ```text
//! img001.tif  →  ABC-0001.tif     Counter { width: 4, origin: 1 }
//! img002.tif  →  ABC-0002.tif
//! img001.tif  →  ABC-0001.tif     (seen before: same name, counter unchanged)
//! scan.tif    →  SLIDE7.tif       Identifier
//! ```
//!
//! The mapping is keyed by the source identifier: the file name up to its
//! first `.`. Names are handed out in first-encounter order, so callers must
//! walk pages in physical order. The mapping lives for one export run only.
//! The same source may get a different name in a later run.

use std::collections::HashMap;
use thiserror::Error;

#[derive(Error, Debug, PartialEq)]
pub enum NamingError {
    #[error("source file name '{0}' has no extension separator")]
    NoExtension(String),
}

/// How export names are formed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NamingScheme {
    /// `{unit}-{counter}`, the counter zero-padded to `width` and starting
    /// at `origin`.
    Counter { width: usize, origin: u32 },
    /// The bare unit identifier. Only meaningful for single-image units.
    Identifier,
}

/// Source identifier of a file name: everything before the first `.`.
///
/// `img001.tif` → `img001`, `scan.final.tif` → `scan`.
pub fn source_stem(file_name: &str) -> Result<&str, NamingError> {
    match file_name.find('.') {
        Some(pos) => Ok(&file_name[..pos]),
        None => Err(NamingError::NoExtension(file_name.to_string())),
    }
}

/// Per-run mapping from source identifiers to export names.
#[derive(Debug, Clone)]
pub struct FileNameMapper {
    unit_identifier: String,
    scheme: NamingScheme,
    next: u32,
    entries: Vec<(String, String)>,
    index: HashMap<String, usize>,
}

impl FileNameMapper {
    pub fn new(unit_identifier: &str, scheme: NamingScheme) -> Self {
        let next = match scheme {
            NamingScheme::Counter { origin, .. } => origin,
            NamingScheme::Identifier => 0,
        };
        Self {
            unit_identifier: unit_identifier.to_string(),
            scheme,
            next,
            entries: Vec::new(),
            index: HashMap::new(),
        }
    }

    /// Export name for a source identifier, assigning a new one on first sight.
    pub fn assign(&mut self, source_id: &str) -> String {
        if let Some(&i) = self.index.get(source_id) {
            return self.entries[i].1.clone();
        }
        let name = match self.scheme {
            NamingScheme::Counter { width, .. } => {
                let name = format!("{}-{:0>width$}", self.unit_identifier, self.next);
                self.next += 1;
                name
            }
            NamingScheme::Identifier => self.unit_identifier.clone(),
        };
        self.index.insert(source_id.to_string(), self.entries.len());
        self.entries.push((source_id.to_string(), name.clone()));
        name
    }

    /// [`assign`](Self::assign) for a file name such as `img001.tif`.
    pub fn assign_file(&mut self, file_name: &str) -> Result<String, NamingError> {
        let stem = source_stem(file_name)?;
        Ok(self.assign(stem))
    }

    pub fn get(&self, source_id: &str) -> Option<&str> {
        self.index
            .get(source_id)
            .map(|&i| self.entries[i].1.as_str())
    }

    pub fn contains(&self, source_id: &str) -> bool {
        self.index.contains_key(source_id)
    }

    /// `(source_id, export_name)` pairs in assignment order.
    pub fn entries(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(s, e)| (s.as_str(), e.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn unit_identifier(&self) -> &str {
        &self.unit_identifier
    }

    /// The zero-padded counter part of an export name this mapper produced.
    pub fn counter_suffix<'a>(&self, export_name: &'a str) -> &'a str {
        export_name
            .strip_prefix(self.unit_identifier.as_str())
            .and_then(|rest| rest.strip_prefix('-'))
            .unwrap_or(export_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn four_digits() -> FileNameMapper {
        FileNameMapper::new("ABC", NamingScheme::Counter { width: 4, origin: 1 })
    }

    #[test]
    fn first_name_uses_origin() {
        let mut m = four_digits();
        assert_eq!(m.assign("img001"), "ABC-0001");
        assert_eq!(m.assign("img002"), "ABC-0002");
    }

    #[test]
    fn repeated_source_keeps_name_and_counter() {
        let mut m = four_digits();
        m.assign("img001");
        assert_eq!(m.assign("img001"), "ABC-0001");
        assert_eq!(m.assign("img002"), "ABC-0002");
        assert_eq!(m.len(), 2);
    }

    #[test]
    fn origin_zero_and_wide_padding() {
        let mut m = FileNameMapper::new("NEG9", NamingScheme::Counter { width: 7, origin: 0 });
        assert_eq!(m.assign("a"), "NEG9-0000000");
        assert_eq!(m.assign("b"), "NEG9-0000001");
    }

    #[test]
    fn three_digit_counter() {
        let mut m = FileNameMapper::new("ENV", NamingScheme::Counter { width: 3, origin: 1 });
        assert_eq!(m.assign("x"), "ENV-001");
        assert_eq!(m.counter_suffix("ENV-001"), "001");
    }

    #[test]
    fn identifier_scheme_uses_unit_identifier() {
        let mut m = FileNameMapper::new("SLIDE7", NamingScheme::Identifier);
        assert_eq!(m.assign("scan"), "SLIDE7");
    }

    #[test]
    fn names_are_unique_and_stable() {
        let mut m = four_digits();
        let sources = ["p3", "p1", "p2", "p1", "p3", "p4", "p2"];
        let first: Vec<String> = sources.iter().map(|s| m.assign(s)).collect();
        let second: Vec<String> = sources.iter().map(|s| m.assign(s)).collect();
        assert_eq!(first, second);

        let distinct: HashSet<&String> = first.iter().collect();
        assert_eq!(distinct.len(), 4);
    }

    #[test]
    fn entries_keep_insertion_order() {
        let mut m = four_digits();
        m.assign("z");
        m.assign("a");
        let pairs: Vec<(&str, &str)> = m.entries().collect();
        assert_eq!(pairs, vec![("z", "ABC-0001"), ("a", "ABC-0002")]);
    }

    #[test]
    fn source_stem_cuts_at_first_dot() {
        assert_eq!(source_stem("img001.tif"), Ok("img001"));
        assert_eq!(source_stem("scan.final.tif"), Ok("scan"));
        assert_eq!(
            source_stem("noext"),
            Err(NamingError::NoExtension("noext".to_string()))
        );
    }

    #[test]
    fn assign_file_rejects_missing_extension() {
        let mut m = four_digits();
        assert_eq!(m.assign_file("img001.tif").unwrap(), "ABC-0001");
        assert!(m.assign_file("broken").is_err());
        assert_eq!(m.len(), 1);
    }
}
