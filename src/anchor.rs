//! Merging newspaper anchor files.
//!
//! Every volume export writes an anchor file listing that one volume. When
//! the target folder already holds an anchor for the same newspaper, the
//! volume lists are merged into the existing file instead:
//!
//! 1. Volumes of the existing anchor are read, dropping exact duplicate URLs.
//! 2. If any new volume URL is already listed (ignoring a trailing `.xml`),
//!    the export is a re-export and the existing file is left untouched.
//! 3. Otherwise new volumes are appended and the list is sorted: by `ORDER`
//!    when both sides have one, else by URL, case-insensitively.
//! 4. The logical divs are rewritten as `LOG_0001`, `LOG_0002`, ... and the
//!    file is written back pretty-printed.
//!
//! Concurrent exports of volumes of the same newspaper must not interleave
//! steps 1–4; [`AnchorLocks`] hands out one lock per anchor path.

use crate::xml::{XmlElement, XmlError};
use std::cmp::Ordering;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tracing::{debug, info};

#[derive(Error, Debug)]
pub enum AnchorError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Xml(#[from] XmlError),
    #[error("{0}: no logical structMap with an anchor div")]
    NoLogicalStructure(String),
}

/// One volume listed in an anchor file.
#[derive(Debug, Clone, PartialEq)]
pub struct VolumeEntry {
    pub label: String,
    pub doc_type: String,
    pub content_ids: String,
    pub order: String,
    pub url: String,
}

impl VolumeEntry {
    fn from_div(div: &XmlElement) -> Self {
        let attr = |name: &str| div.attr(name).unwrap_or_default().to_string();
        Self {
            label: attr("LABEL"),
            doc_type: attr("TYPE"),
            content_ids: attr("CONTENTIDS"),
            order: attr("ORDER"),
            url: div
                .child("mptr")
                .and_then(|m| m.attr_local("href"))
                .unwrap_or_default()
                .to_string(),
        }
    }

    fn to_div(&self, index: usize) -> XmlElement {
        let mut div = XmlElement::new("mets:div").with_attr("ID", format!("LOG_{index:04}"));
        if !self.label.is_empty() {
            div.set_attr("LABEL", self.label.as_str());
        }
        if !self.content_ids.is_empty() {
            div.set_attr("CONTENTIDS", self.content_ids.as_str());
        }
        if !self.order.is_empty() {
            div.set_attr("ORDER", self.order.as_str());
            div.set_attr("ORDERLABEL", self.order.as_str());
        }
        div.set_attr("TYPE", self.doc_type.as_str());
        let href = if self.url.ends_with(".xml") {
            self.url.clone()
        } else {
            format!("{}.xml", self.url)
        };
        div.push(
            XmlElement::new("mets:mptr")
                .with_attr("LOCTYPE", "URL")
                .with_attr("xlink:href", href),
        );
        div
    }

    fn bare_url(&self) -> &str {
        self.url.strip_suffix(".xml").unwrap_or(&self.url)
    }
}

/// Volume order: `ORDER` when both have one, URL otherwise.
pub fn compare_volumes(a: &VolumeEntry, b: &VolumeEntry) -> Ordering {
    if !a.order.is_empty() && !b.order.is_empty() {
        a.order.to_lowercase().cmp(&b.order.to_lowercase())
    } else {
        a.url.to_lowercase().cmp(&b.url.to_lowercase())
    }
}

/// Stable insertion sort. The volume comparator is not a total order.
fn sort_volumes(volumes: &mut [VolumeEntry]) {
    for i in 1..volumes.len() {
        let mut j = i;
        while j > 0 && compare_volumes(&volumes[j - 1], &volumes[j]) == Ordering::Greater {
            volumes.swap(j - 1, j);
            j -= 1;
        }
    }
}

fn is_logical_map(e: &XmlElement) -> bool {
    e.local_name() == "structMap" && e.attr("TYPE") == Some("LOGICAL")
}

fn anchor_div(doc: &XmlElement) -> Option<&XmlElement> {
    doc.find(&is_logical_map).and_then(|map| map.child("div"))
}

/// Volumes listed in an anchor document, in document order.
pub fn read_volumes(doc: &XmlElement) -> Option<Vec<VolumeEntry>> {
    anchor_div(doc).map(|div| div.children_named("div").map(VolumeEntry::from_div).collect())
}

#[derive(Debug, Clone, PartialEq)]
pub enum MergeOutcome {
    /// The existing anchor now lists `volumes` volumes.
    Merged { volumes: usize },
    /// A new volume was already listed; nothing changed.
    AlreadyListed,
}

/// Merge the volumes of `new` into `existing` in memory.
pub fn merge_documents(
    existing: &mut XmlElement,
    new: &XmlElement,
) -> Result<MergeOutcome, AnchorError> {
    let missing = |which: &str| AnchorError::NoLogicalStructure(which.to_string());
    let old_volumes = read_volumes(existing).ok_or_else(|| missing("existing anchor"))?;
    let new_volumes = read_volumes(new).ok_or_else(|| missing("new anchor"))?;

    let mut volumes: Vec<VolumeEntry> = Vec::with_capacity(old_volumes.len() + new_volumes.len());
    for volume in old_volumes {
        if !volumes.iter().any(|v| v.url == volume.url) {
            volumes.push(volume);
        }
    }
    for volume in &new_volumes {
        if volumes.iter().any(|v| v.bare_url() == volume.bare_url()) {
            debug!(url = %volume.url, "volume already listed in anchor");
            return Ok(MergeOutcome::AlreadyListed);
        }
    }
    volumes.extend(new_volumes);
    sort_volumes(&mut volumes);

    let div = existing
        .find_mut(&is_logical_map)
        .and_then(|map| map.child_mut("div"))
        .ok_or_else(|| missing("existing anchor"))?;
    div.remove_children("div");
    for (i, volume) in volumes.iter().enumerate() {
        div.push(volume.to_div(i + 1));
    }
    Ok(MergeOutcome::Merged {
        volumes: volumes.len(),
    })
}

/// Merge the anchor file at `new` into the one at `existing`.
///
/// `existing` is only rewritten when the outcome is [`MergeOutcome::Merged`].
pub fn merge_files(existing: &Path, new: &Path) -> Result<MergeOutcome, AnchorError> {
    let mut existing_doc = XmlElement::parse(&fs::read_to_string(existing)?)?;
    let new_doc = XmlElement::parse(&fs::read_to_string(new)?)?;
    let outcome = merge_documents(&mut existing_doc, &new_doc)?;
    if let MergeOutcome::Merged { volumes } = outcome {
        fs::write(existing, existing_doc.to_xml_string()?)?;
        info!(anchor = %existing.display(), volumes, "merged anchor file");
    }
    Ok(outcome)
}

/// One lock per anchor path, shared by all exports in a process.
#[derive(Debug, Default)]
pub struct AnchorLocks {
    locks: Mutex<HashMap<PathBuf, Arc<Mutex<()>>>>,
}

impl AnchorLocks {
    pub fn new() -> Self {
        Self::default()
    }

    fn handle(&self, path: &Path) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        locks.entry(path.to_path_buf()).or_default().clone()
    }

    /// Run `f` while holding the lock for `path`.
    pub fn with_lock<R>(&self, path: &Path, f: impl FnOnce() -> R) -> R {
        let handle = self.handle(path);
        let _guard = handle.lock().unwrap_or_else(|e| e.into_inner());
        f()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};
    use std::thread;
    use tempfile::TempDir;

    fn anchor(volumes: &[(&str, &str)]) -> String {
        let divs: String = volumes
            .iter()
            .enumerate()
            .map(|(i, (order, url))| {
                format!(
                    r#"<mets:div ID="LOG_{:04}" TYPE="Year" LABEL="Vol {order}" ORDER="{order}"><mets:mptr LOCTYPE="URL" xlink:href="{url}"/></mets:div>"#,
                    i + 1
                )
            })
            .collect();
        format!(
            r#"<?xml version="1.0" encoding="UTF-8"?>
<mets:mets xmlns:mets="http://www.loc.gov/METS/" xmlns:xlink="http://www.w3.org/1999/xlink">
<mets:structMap TYPE="LOGICAL"><mets:div ID="LOG_0000" TYPE="Newspaper">{divs}</mets:div></mets:structMap>
</mets:mets>"#
        )
    }

    fn urls(doc: &XmlElement) -> Vec<String> {
        read_volumes(doc).unwrap().into_iter().map(|v| v.url).collect()
    }

    // =========================================================================
    // In-memory merge
    // =========================================================================

    #[test]
    fn appends_and_sorts_by_order() {
        let mut existing = XmlElement::parse(&anchor(&[("2020", "u/V2020.xml"), ("2022", "u/V2022.xml")])).unwrap();
        let new = XmlElement::parse(&anchor(&[("2021", "u/V2021.xml")])).unwrap();

        let outcome = merge_documents(&mut existing, &new).unwrap();
        assert_eq!(outcome, MergeOutcome::Merged { volumes: 3 });
        assert_eq!(urls(&existing), vec!["u/V2020.xml", "u/V2021.xml", "u/V2022.xml"]);

        let ids: Vec<_> = anchor_div(&existing)
            .unwrap()
            .children_named("div")
            .filter_map(|d| d.attr("ID"))
            .collect();
        assert_eq!(ids, vec!["LOG_0001", "LOG_0002", "LOG_0003"]);
    }

    #[test]
    fn re_export_is_detected_without_extension() {
        let mut existing = XmlElement::parse(&anchor(&[("2020", "u/V2020.xml")])).unwrap();
        let before = existing.clone();
        let new = XmlElement::parse(&anchor(&[("2020", "u/V2020")])).unwrap();

        assert_eq!(merge_documents(&mut existing, &new).unwrap(), MergeOutcome::AlreadyListed);
        assert_eq!(existing, before);
    }

    #[test]
    fn duplicate_urls_in_existing_are_dropped() {
        let mut existing =
            XmlElement::parse(&anchor(&[("2020", "u/A.xml"), ("2020", "u/A.xml")])).unwrap();
        let new = XmlElement::parse(&anchor(&[("2021", "u/B.xml")])).unwrap();
        merge_documents(&mut existing, &new).unwrap();
        assert_eq!(urls(&existing), vec!["u/A.xml", "u/B.xml"]);
    }

    #[test]
    fn missing_order_falls_back_to_url() {
        let mut a = VolumeEntry {
            label: String::new(),
            doc_type: "Year".into(),
            content_ids: String::new(),
            order: String::new(),
            url: "u/B".into(),
        };
        let b = VolumeEntry {
            order: "1999".into(),
            url: "u/a".into(),
            ..a.clone()
        };
        assert_eq!(compare_volumes(&a, &b), Ordering::Greater);
        a.order = "2000".into();
        assert_eq!(compare_volumes(&a, &b), Ordering::Greater);
    }

    #[test]
    fn rewritten_divs_carry_extension_and_order_label() {
        let entry = VolumeEntry {
            label: "Vol".into(),
            doc_type: "Year".into(),
            content_ids: "urn:x".into(),
            order: "7".into(),
            url: "u/V".into(),
        };
        let div = entry.to_div(3);
        assert_eq!(div.attr("ID"), Some("LOG_0003"));
        assert_eq!(div.attr("ORDERLABEL"), Some("7"));
        assert_eq!(div.attr("CONTENTIDS"), Some("urn:x"));
        assert_eq!(div.child("mptr").unwrap().attr("xlink:href"), Some("u/V.xml"));
    }

    #[test]
    fn document_without_logical_map_is_an_error() {
        let mut existing = XmlElement::parse("<mets:mets xmlns:mets=\"m\"/>").unwrap();
        let new = XmlElement::parse(&anchor(&[])).unwrap();
        assert!(matches!(
            merge_documents(&mut existing, &new),
            Err(AnchorError::NoLogicalStructure(_))
        ));
    }

    // =========================================================================
    // Files and locking
    // =========================================================================

    #[test]
    fn merge_files_leaves_re_export_byte_identical() {
        let dir = TempDir::new().unwrap();
        let existing = dir.path().join("GAZ.xml");
        let new = dir.path().join("new.xml");
        let original = anchor(&[("2020", "u/V2020.xml")]);
        fs::write(&existing, &original).unwrap();
        fs::write(&new, anchor(&[("2020", "u/V2020.xml")])).unwrap();

        assert_eq!(merge_files(&existing, &new).unwrap(), MergeOutcome::AlreadyListed);
        assert_eq!(fs::read_to_string(&existing).unwrap(), original);
    }

    #[test]
    fn merge_files_writes_merged_anchor() {
        let dir = TempDir::new().unwrap();
        let existing = dir.path().join("GAZ.xml");
        let new = dir.path().join("new.xml");
        fs::write(&existing, anchor(&[("2021", "u/V2021.xml")])).unwrap();
        fs::write(&new, anchor(&[("2020", "u/V2020.xml")])).unwrap();

        merge_files(&existing, &new).unwrap();
        let merged = XmlElement::parse(&fs::read_to_string(&existing).unwrap()).unwrap();
        assert_eq!(urls(&merged), vec!["u/V2020.xml", "u/V2021.xml"]);
    }

    #[test]
    fn locks_serialize_same_path() {
        let locks = Arc::new(AnchorLocks::new());
        let inside = Arc::new(AtomicUsize::new(0));
        let max_seen = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let locks = Arc::clone(&locks);
                let inside = Arc::clone(&inside);
                let max_seen = Arc::clone(&max_seen);
                thread::spawn(move || {
                    locks.with_lock(Path::new("/t/GAZ.xml"), || {
                        let now = inside.fetch_add(1, AtomicOrdering::SeqCst) + 1;
                        max_seen.fetch_max(now, AtomicOrdering::SeqCst);
                        thread::sleep(std::time::Duration::from_millis(2));
                        inside.fetch_sub(1, AtomicOrdering::SeqCst);
                    })
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(max_seen.load(AtomicOrdering::SeqCst), 1);
    }
}
