//! Calendar structure of a newspaper volume.
//!
//! The volume METS file groups its issues by date:
//!
//! ```text
//! Year 2022
//! └── Month 2022-06
//!     ├── Day 2022-06-01
//!     │   └── Issue stub → XYZ-20220601-mets.xml
//!     └── Day 2022-06-02
//!         ├── Issue stub → ...
//!         └── Issue stub → ...      (two issues on one day)
//! ```
//!
//! Nodes are created on first use and kept sorted by key, so the order of
//! [`Hierarchy::place_issue`] calls does not matter. Placing a second issue
//! on a known date reuses the existing year, month and day.

use crate::metadata::is_iso_date;
use thiserror::Error;

#[derive(Error, Debug, PartialEq)]
pub enum HierarchyError {
    #[error("Issue date {0} has the wrong format. Expected is YYYY-MM-DD")]
    InvalidDate(String),
}

/// Navigation entry for one issue, pointing at its METS file.
#[derive(Debug, Clone, PartialEq)]
pub struct IssueStub {
    pub label: String,
    /// The issue date, used as `ORDERLABEL`.
    pub order_label: String,
    pub link: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DayNode {
    /// `YYYY-MM-DD`
    pub key: String,
    pub issues: Vec<IssueStub>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MonthNode {
    /// `YYYY-MM`
    pub key: String,
    pub days: Vec<DayNode>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct YearNode {
    /// `YYYY`
    pub key: String,
    pub months: Vec<MonthNode>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Hierarchy {
    pub years: Vec<YearNode>,
}

trait Keyed {
    fn key(&self) -> &str;
    fn create(key: &str) -> Self;
}

impl Keyed for YearNode {
    fn key(&self) -> &str {
        &self.key
    }
    fn create(key: &str) -> Self {
        Self {
            key: key.to_string(),
            months: Vec::new(),
        }
    }
}

impl Keyed for MonthNode {
    fn key(&self) -> &str {
        &self.key
    }
    fn create(key: &str) -> Self {
        Self {
            key: key.to_string(),
            days: Vec::new(),
        }
    }
}

impl Keyed for DayNode {
    fn key(&self) -> &str {
        &self.key
    }
    fn create(key: &str) -> Self {
        Self {
            key: key.to_string(),
            issues: Vec::new(),
        }
    }
}

/// The child with `key`, inserted at its sorted position if absent.
fn find_or_insert<'a, T: Keyed>(items: &'a mut Vec<T>, key: &str) -> &'a mut T {
    let index = match items.binary_search_by(|item| item.key().cmp(key)) {
        Ok(i) => i,
        Err(i) => {
            items.insert(i, T::create(key));
            i
        }
    };
    &mut items[index]
}

impl Hierarchy {
    pub fn new() -> Self {
        Self::default()
    }

    /// The day node for `date`, creating missing year, month and day nodes.
    pub fn place_issue(&mut self, date: &str) -> Result<&mut DayNode, HierarchyError> {
        if !is_iso_date(date) {
            return Err(HierarchyError::InvalidDate(date.to_string()));
        }
        let year = find_or_insert(&mut self.years, &date[..4]);
        let month = find_or_insert(&mut year.months, &date[..7]);
        Ok(find_or_insert(&mut month.days, date))
    }

    /// Total number of day nodes.
    pub fn day_count(&self) -> usize {
        self.years
            .iter()
            .flat_map(|y| &y.months)
            .map(|m| m.days.len())
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.years.is_empty()
    }
}
