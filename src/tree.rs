//! The document model handed to the exporter.
//!
//! A [`DocumentTree`] has two axes. The logical axis is a nesting of
//! structural nodes (newspaper, volume, issue, supplement, envelope, ...)
//! carrying typed metadata. The physical axis is a flat list of page images.
//! Logical nodes reference the pages they contain by page id; the order of
//! those references is the page order of every derived output.
//!
//! ```text
//! logical                          physical
//! Newspaper (anchor)               PHYS_0001  img001.tif
//! └── NewspaperVolume              PHYS_0002  img002.tif
//!     ├── NewspaperIssue ─────────▶ PHYS_0001, PHYS_0002
//!     │   └── NewspaperSupplement ▶ PHYS_0002
//!     └── NewspaperIssue ─────────▶ ...
//! ```
//!
//! The tree is produced elsewhere and arrives as JSON; the exporter never
//! mutates the loaded tree. Components that back-fill values work on clones.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TreeError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("{node} references unknown page '{page}'")]
    DanglingReference { node: String, page: String },
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DocumentTree {
    #[serde(default)]
    pub process: ProcessInfo,
    pub logical: LogicalNode,
    #[serde(default)]
    pub physical: Vec<PhysicalPage>,
}

/// The workflow process the document belongs to.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProcessInfo {
    #[serde(default)]
    pub id: u64,
    #[serde(default)]
    pub title: String,
    /// Free-form process properties, addressable as `${process.Name}`.
    #[serde(default)]
    pub properties: BTreeMap<String, String>,
    #[serde(default)]
    pub journal: Vec<JournalEntry>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JournalKind {
    #[default]
    User,
    Info,
    Warning,
    Error,
    Debug,
}

impl JournalKind {
    pub fn title(self) -> &'static str {
        match self {
            JournalKind::User => "user",
            JournalKind::Info => "info",
            JournalKind::Warning => "warn",
            JournalKind::Error => "error",
            JournalKind::Debug => "debug",
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JournalEntry {
    pub date: String,
    #[serde(default)]
    pub kind: JournalKind,
    pub content: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LogicalNode {
    #[serde(default)]
    pub id: String,
    #[serde(rename = "type")]
    pub doc_type: String,
    /// Anchors are the parent records (newspaper, periodical) that only
    /// exist to group volumes.
    #[serde(default)]
    pub anchor: bool,
    #[serde(default)]
    pub metadata: Vec<Metadata>,
    #[serde(default)]
    pub children: Vec<LogicalNode>,
    /// Physical page ids, in reading order.
    #[serde(default)]
    pub pages: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Metadata {
    pub name: String,
    pub value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authority: Option<Authority>,
}

/// Authority record backing a metadata value (GND, VIAF, ...).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Authority {
    pub id: String,
    pub uri: String,
    pub value: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PhysicalPage {
    pub id: String,
    /// Source file name, e.g. `img001.tif`.
    pub image_name: String,
    #[serde(default)]
    pub order: u32,
    #[serde(default)]
    pub order_label: String,
}

impl DocumentTree {
    pub fn from_json(json: &str) -> Result<Self, TreeError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn load(path: &Path) -> Result<Self, TreeError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    /// Lookup table from page id to page. Build it once when resolving the
    /// references of many nodes.
    pub fn page_index(&self) -> PageIndex<'_> {
        PageIndex::new(&self.physical)
    }

    /// The pages a logical node references, in reference order.
    pub fn pages_of(&self, node: &LogicalNode) -> Result<Vec<&PhysicalPage>, TreeError> {
        self.page_index().pages_of(node)
    }
}

impl LogicalNode {
    pub fn new(doc_type: &str) -> Self {
        Self {
            doc_type: doc_type.to_string(),
            ..Self::default()
        }
    }

    /// First value of a metadata field, if present.
    pub fn metadata_value(&self, name: &str) -> Option<&str> {
        self.metadata
            .iter()
            .find(|m| m.name == name)
            .map(|m| m.value.as_str())
    }

    /// First value of a metadata field, or `""`.
    pub fn value(&self, name: &str) -> &str {
        self.metadata_value(name).unwrap_or("")
    }

    pub fn is_blank(&self, name: &str) -> bool {
        self.value(name).trim().is_empty()
    }

    /// Replace the first value of `name`, or append it.
    pub fn set_value(&mut self, name: &str, value: impl Into<String>) {
        let value = value.into();
        match self.metadata.iter_mut().find(|m| m.name == name) {
            Some(m) => m.value = value,
            None => self.add_value(name, value),
        }
    }

    pub fn add_value(&mut self, name: &str, value: impl Into<String>) {
        self.metadata.push(Metadata {
            name: name.to_string(),
            value: value.into(),
            authority: None,
        });
    }

    /// All descendants in pre-order, excluding `self`.
    pub fn descendants(&self) -> Vec<&LogicalNode> {
        let mut out = Vec::new();
        for child in &self.children {
            out.push(child);
            out.extend(child.descendants());
        }
        out
    }

    /// Human-readable handle for log and problem messages.
    pub fn describe(&self) -> String {
        if self.id.is_empty() {
            self.doc_type.clone()
        } else {
            format!("{} {}", self.doc_type, self.id)
        }
    }
}

/// Pages keyed by id, first occurrence wins.
#[derive(Debug, Clone, Default)]
pub struct PageIndex<'a> {
    by_id: HashMap<&'a str, &'a PhysicalPage>,
}

impl<'a> PageIndex<'a> {
    pub fn new(pages: &'a [PhysicalPage]) -> Self {
        let mut by_id = HashMap::with_capacity(pages.len());
        for page in pages {
            by_id.entry(page.id.as_str()).or_insert(page);
        }
        Self { by_id }
    }

    pub fn get(&self, id: &str) -> Option<&'a PhysicalPage> {
        self.by_id.get(id).copied()
    }

    /// The pages `node` references, in reference order.
    pub fn pages_of(&self, node: &LogicalNode) -> Result<Vec<&'a PhysicalPage>, TreeError> {
        node.pages
            .iter()
            .map(|id| {
                self.get(id).ok_or_else(|| TreeError::DanglingReference {
                    node: node.describe(),
                    page: id.clone(),
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "process": { "id": 7, "title": "abc_2021", "properties": { "Capturing device": "Scanner A" } },
        "logical": {
            "type": "Newspaper", "anchor": true,
            "metadata": [{ "name": "TitleDocMain", "value": "Gazette" }],
            "children": [{
                "id": "LOG_1", "type": "NewspaperVolume",
                "children": [{ "id": "LOG_2", "type": "NewspaperIssue", "pages": ["P1", "P2"] }]
            }]
        },
        "physical": [
            { "id": "P1", "image_name": "img001.tif", "order": 1 },
            { "id": "P2", "image_name": "img002.tif", "order": 2 }
        ]
    }"#;

    #[test]
    fn parses_json_tree() {
        let tree = DocumentTree::from_json(SAMPLE).unwrap();
        assert_eq!(tree.process.title, "abc_2021");
        assert!(tree.logical.anchor);
        assert_eq!(tree.logical.value("TitleDocMain"), "Gazette");
        assert_eq!(tree.physical.len(), 2);
    }

    #[test]
    fn pages_of_follows_reference_order() {
        let tree = DocumentTree::from_json(SAMPLE).unwrap();
        let issue = &tree.logical.children[0].children[0];
        let names: Vec<&str> = tree
            .pages_of(issue)
            .unwrap()
            .iter()
            .map(|p| p.image_name.as_str())
            .collect();
        assert_eq!(names, vec!["img001.tif", "img002.tif"]);
    }

    #[test]
    fn pages_of_reports_dangling_reference() {
        let mut tree = DocumentTree::from_json(SAMPLE).unwrap();
        tree.logical.children[0].children[0].pages.push("P9".into());
        let issue = tree.logical.children[0].children[0].clone();
        let err = tree.pages_of(&issue).unwrap_err();
        assert!(matches!(err, TreeError::DanglingReference { ref page, .. } if page == "P9"));
    }

    #[test]
    fn page_index_keeps_first_of_duplicate_ids() {
        let mut tree = DocumentTree::from_json(SAMPLE).unwrap();
        tree.physical.push(PhysicalPage {
            id: "P1".into(),
            image_name: "late.tif".into(),
            ..PhysicalPage::default()
        });
        let index = tree.page_index();
        assert_eq!(index.get("P1").unwrap().image_name, "img001.tif");
        assert!(index.get("P9").is_none());

        let issue = &tree.logical.children[0].children[0];
        assert_eq!(index.pages_of(issue).unwrap(), tree.pages_of(issue).unwrap());
    }

    #[test]
    fn missing_metadata_reads_as_empty() {
        let node = LogicalNode::new("Issue");
        assert_eq!(node.value("Anything"), "");
        assert!(node.is_blank("Anything"));
    }

    #[test]
    fn set_value_replaces_first_then_appends() {
        let mut node = LogicalNode::new("Issue");
        node.set_value("Title", "a");
        node.set_value("Title", "b");
        assert_eq!(node.metadata.len(), 1);
        assert_eq!(node.value("Title"), "b");
        node.add_value("Title", "c");
        assert_eq!(node.value("Title"), "b");
        assert_eq!(node.metadata.len(), 2);
    }

    #[test]
    fn descendants_are_pre_order() {
        let tree = DocumentTree::from_json(SAMPLE).unwrap();
        let types: Vec<&str> = tree
            .logical
            .descendants()
            .iter()
            .map(|n| n.doc_type.as_str())
            .collect();
        assert_eq!(types, vec!["NewspaperVolume", "NewspaperIssue"]);
    }
}
