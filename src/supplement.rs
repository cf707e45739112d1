//! Supplement partitioning.
//!
//! A newspaper issue may carry supplements (sport, economy, ...) as child
//! structures. Each supplement category is exported as its own unit next to
//! the issue:
//!
//! ```text
//! ABC-20210305.xml / .pdf      main issue, supplement pages removed
//! ABC-20210305-SS.xml / .pdf   sport supplement
//! ABC-20210305-GS.xml / .pdf   anything the classifier does not know
//! ```
//!
//! The category code comes from the supplement's label: the first keyword
//! found (case-insensitive substring) wins, no match gives [`DEFAULT_CODE`].
//! Supplements sharing a code are exported together. A page belongs to at
//! most one supplement, the first one that claims it.

use crate::metadata::{arabic_part, english_part};
use crate::naming::source_stem;
use crate::types::{OutputUnit, PageEntry};
use crate::unit::{BuiltUnit, PDF_FORMAT, XML_FORMAT, file_ref, renumber_pages};
use crate::xml::XmlElement;
use std::collections::HashSet;
use std::path::PathBuf;

pub const DEFAULT_CODE: &str = "GS";

const RULES: &[(&str, &str)] = &[
    ("sport", "SS"),
    ("econom", "ES"),
    ("cultur", "CS"),
    ("youth", "YS"),
    ("women", "WS"),
];

/// Category code for a supplement label.
pub fn classify(label: &str) -> &'static str {
    let label = label.to_lowercase();
    RULES
        .iter()
        .find(|(keyword, _)| label.contains(keyword))
        .map(|(_, code)| *code)
        .unwrap_or(DEFAULT_CODE)
}

/// One supplement child as found in the issue.
#[derive(Debug, Clone)]
pub struct SupplementInput {
    pub label: String,
    pub pages: Vec<PageEntry>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SupplementGroup {
    pub code: &'static str,
    /// Label of the first supplement in the group.
    pub label: String,
    pub pages: Vec<PageEntry>,
    /// Per-page PDFs of the group's pages, in page order.
    pub pdf_files: Vec<PathBuf>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Partition {
    pub main_pages: Vec<PageEntry>,
    pub main_pdf_files: Vec<PathBuf>,
    pub supplements: Vec<SupplementGroup>,
}

/// Per-page PDFs from `pool` for `pages`, matched by source stem.
pub fn pdfs_for(pages: &[PageEntry], pool: &[PathBuf]) -> Vec<PathBuf> {
    pages
        .iter()
        .filter_map(|page| {
            pool.iter().find(|pdf| {
                pdf.file_name()
                    .and_then(|n| n.to_str())
                    .and_then(|n| source_stem(n).ok())
                    == Some(page.source_stem.as_str())
            })
        })
        .cloned()
        .collect()
}

/// Split an issue's pages between the issue and its supplements.
pub fn partition(
    issue_pages: &[PageEntry],
    supplements: &[SupplementInput],
    pdf_pool: &[PathBuf],
) -> Partition {
    let mut claimed: HashSet<&str> = HashSet::new();
    let mut groups: Vec<SupplementGroup> = Vec::new();

    for supplement in supplements {
        let code = classify(&supplement.label);
        let pages: Vec<PageEntry> = supplement
            .pages
            .iter()
            .filter(|p| claimed.insert(p.export_name.as_str()))
            .cloned()
            .collect();
        match groups.iter_mut().find(|g| g.code == code) {
            Some(group) => group.pages.extend(pages),
            None => groups.push(SupplementGroup {
                code,
                label: supplement.label.clone(),
                pages,
                pdf_files: Vec::new(),
            }),
        }
    }
    for group in &mut groups {
        group.pdf_files = pdfs_for(&group.pages, pdf_pool);
    }

    let main_pages: Vec<PageEntry> = issue_pages
        .iter()
        .filter(|p| !claimed.contains(p.export_name.as_str()))
        .cloned()
        .collect();
    Partition {
        main_pdf_files: pdfs_for(&main_pages, pdf_pool),
        main_pages,
        supplements: groups,
    }
}

/// Keep only the `Page` blocks whose master file belongs to `pages`, then
/// renumber.
fn restrict_pages(document: &mut XmlElement, pages: &[PageEntry]) {
    let keep: HashSet<String> = pages
        .iter()
        .map(|p| format!("{}.tif", p.export_name))
        .collect();
    if let Some(list) = document.find_mut(&|e: &XmlElement| e.local_name() == "Pages") {
        list.children.retain(|child| match child {
            crate::xml::XmlNode::Element(page) => page
                .find_path(&["master", "file"])
                .is_some_and(|file| keep.contains(&file.text())),
            crate::xml::XmlNode::Text(_) => false,
        });
    }
    renumber_pages(document);
}

/// Drop the supplement pages from the main issue.
pub fn restrict_main(main: &mut BuiltUnit, main_pages: Vec<PageEntry>) {
    restrict_pages(&mut main.document, &main_pages);
    main.unit.pages = main_pages;
}

/// Supplement document derived from the full issue document.
///
/// `main` must still hold every page of the issue.
pub fn derive_supplement(main: &BuiltUnit, group: &SupplementGroup, viewer_url: &str) -> BuiltUnit {
    let base = format!("{}-{}", main.unit.file_base(), group.code);
    let unit = OutputUnit {
        identifier: base.clone(),
        date: None,
        title_eng: format!("{} - {}", main.unit.title_eng, english_part(&group.label)),
        title_ara: format!("{} - {}", arabic_part(&group.label), main.unit.title_ara),
        pages: group.pages.clone(),
    };

    let mut document = main.document.clone();
    restrict_pages(&mut document, &group.pages);
    if let Some(issue) = document.find_mut(&|e: &XmlElement| e.local_name() == "issueInfo") {
        let mut set = |name: &str, value: String| {
            if let Some(e) = issue.child_mut(name) {
                e.set_text(value);
            }
        };
        set("issueID", base.clone());
        set("issueTitleENG", unit.title_eng.clone());
        set("issueTitleARA", unit.title_ara.clone());
        set(
            "Open_In_Viewer",
            format!("{}/image/{}/", viewer_url.trim_end_matches('/'), base),
        );
        issue.remove_children("issueFile");
        issue.remove_children("MetadataMetsFile");
        issue.push(file_ref("issueFile", format!("{base}.pdf"), PDF_FORMAT));
        issue.push(file_ref("MetadataMetsFile", format!("{base}-mets.xml"), XML_FORMAT));
    }
    BuiltUnit { unit, document }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::imaging::probe::tests::sample_attributes;
    use crate::unit::page_number;

    fn page(n: usize) -> PageEntry {
        PageEntry {
            source_stem: format!("img{n:03}"),
            export_name: format!("ABC-{n:04}"),
            technical: sample_attributes(),
            has_alto: true,
            has_text: true,
        }
    }

    fn pool(n: usize) -> Vec<PathBuf> {
        (1..=n).map(|i| PathBuf::from(format!("/ocr/pdf/img{i:03}.pdf"))).collect()
    }

    /// Minimal issue document with one `Page` per entry.
    fn issue(pages: &[PageEntry]) -> BuiltUnit {
        let mut doc = XmlElement::new("newspaper");
        let issue = doc
            .push(XmlElement::new("volumeInfo"))
            .push(XmlElement::new("issueInfo"));
        issue.push_text("issueID", "ABC-20210305");
        issue.push_text("issueTitleENG", "Gazette-05-03-2021");
        issue.push_text("No_of_Pages", pages.len().to_string());
        issue.push_text("Open_In_Viewer", "x");
        issue.push(file_ref("issueFile", "ABC-20210305.pdf", PDF_FORMAT));
        issue.push(file_ref("MetadataMetsFile", "ABC-20210305-mets.xml", XML_FORMAT));
        let list = doc.push(XmlElement::new("Pages"));
        for (i, p) in pages.iter().enumerate() {
            let mut master = XmlElement::new("master");
            master.push_text("file", format!("{}.tif", p.export_name));
            list.push(XmlElement::new("Page").with_attr("pg", page_number(i)).with_child(master));
        }
        BuiltUnit {
            unit: OutputUnit {
                identifier: "ABC".into(),
                date: Some("2021-03-05".into()),
                title_eng: "Gazette-05-03-2021".into(),
                title_ara: "05-03-2021-الجريدة".into(),
                pages: pages.to_vec(),
            },
            document: doc,
        }
    }

    // =========================================================================
    // Classifier
    // =========================================================================

    #[test]
    fn classifies_by_keyword() {
        assert_eq!(classify("Sport Supplement"), "SS");
        assert_eq!(classify("weekly SPORTS"), "SS");
        assert_eq!(classify("Economy"), "ES");
        assert_eq!(classify("Culture & Arts"), "CS");
        assert_eq!(classify("Youth page"), "YS");
        assert_eq!(classify("Women"), "WS");
    }

    #[test]
    fn unknown_label_gets_default_code() {
        assert_eq!(classify("Classifieds"), DEFAULT_CODE);
        assert_eq!(classify(""), DEFAULT_CODE);
    }

    #[test]
    fn first_matching_rule_wins() {
        assert_eq!(classify("Sport and Economy"), "SS");
        assert_eq!(classify("Economy and Sport"), "SS");
    }

    // =========================================================================
    // Partition
    // =========================================================================

    #[test]
    fn main_and_supplements_are_disjoint_and_cover_issue() {
        let pages: Vec<_> = (1..=5).map(page).collect();
        let supplements = vec![
            SupplementInput { label: "Sport".into(), pages: vec![page(2), page(3)] },
            SupplementInput { label: "Misc".into(), pages: vec![page(5)] },
        ];
        let result = partition(&pages, &supplements, &pool(5));

        let main: Vec<_> = result.main_pages.iter().map(|p| p.export_name.as_str()).collect();
        assert_eq!(main, vec!["ABC-0001", "ABC-0004"]);
        assert_eq!(result.supplements.len(), 2);
        assert_eq!(result.supplements[0].code, "SS");
        assert_eq!(result.supplements[1].code, DEFAULT_CODE);

        let mut all: Vec<String> = result.main_pages.iter().map(|p| p.export_name.clone()).collect();
        for group in &result.supplements {
            for p in &group.pages {
                assert!(!all.contains(&p.export_name));
                all.push(p.export_name.clone());
            }
        }
        all.sort();
        let mut original: Vec<_> = pages.iter().map(|p| p.export_name.clone()).collect();
        original.sort();
        assert_eq!(all, original);
    }

    #[test]
    fn pdfs_follow_page_membership() {
        let pages: Vec<_> = (1..=3).map(page).collect();
        let supplements = vec![SupplementInput { label: "Sport".into(), pages: vec![page(3)] }];
        let result = partition(&pages, &supplements, &pool(3));
        assert_eq!(
            result.main_pdf_files,
            vec![PathBuf::from("/ocr/pdf/img001.pdf"), PathBuf::from("/ocr/pdf/img002.pdf")]
        );
        assert_eq!(result.supplements[0].pdf_files, vec![PathBuf::from("/ocr/pdf/img003.pdf")]);
    }

    #[test]
    fn same_code_supplements_merge_and_pages_are_claimed_once() {
        let pages: Vec<_> = (1..=4).map(page).collect();
        let supplements = vec![
            SupplementInput { label: "Sport A".into(), pages: vec![page(2)] },
            SupplementInput { label: "Sport B".into(), pages: vec![page(2), page(3)] },
        ];
        let result = partition(&pages, &supplements, &[]);
        assert_eq!(result.supplements.len(), 1);
        let names: Vec<_> = result.supplements[0].pages.iter().map(|p| p.export_name.as_str()).collect();
        assert_eq!(names, vec!["ABC-0002", "ABC-0003"]);
    }

    #[test]
    fn no_supplements_keeps_everything() {
        let pages: Vec<_> = (1..=2).map(page).collect();
        let result = partition(&pages, &[], &pool(2));
        assert_eq!(result.main_pages, pages);
        assert!(result.supplements.is_empty());
        assert_eq!(result.main_pdf_files.len(), 2);
    }

    // =========================================================================
    // Documents
    // =========================================================================

    #[test]
    fn supplement_document_is_filtered_copy() {
        let pages: Vec<_> = (1..=3).map(page).collect();
        let main = issue(&pages);
        let supplements = vec![SupplementInput { label: "ملحق - Sport".into(), pages: vec![page(3)] }];
        let result = partition(&pages, &supplements, &[]);

        let supplement = derive_supplement(&main, &result.supplements[0], "https://v.example/");
        assert_eq!(supplement.xml_file_name(), "ABC-20210305-SS.xml");
        let info = supplement.document.find_path(&["volumeInfo", "issueInfo"]).unwrap();
        assert_eq!(info.child("issueID").unwrap().text(), "ABC-20210305-SS");
        assert_eq!(info.child("issueTitleENG").unwrap().text(), "Gazette-05-03-2021 - Sport");
        assert_eq!(info.child("No_of_Pages").unwrap().text(), "1");
        assert_eq!(info.child("Open_In_Viewer").unwrap().text(), "https://v.example/image/ABC-20210305-SS/");
        assert_eq!(info.child("issueFile").unwrap().text(), "ABC-20210305-SS.pdf");
        assert_eq!(info.children_named("issueFile").count(), 1);

        let only = supplement.document.find_path(&["Pages", "Page"]).unwrap();
        assert_eq!(only.attr("pg"), Some("0001"));
        assert_eq!(only.find_path(&["master", "file"]).unwrap().text(), "ABC-0003.tif");

        // The main document is untouched until restricted
        assert_eq!(main.document.child("Pages").unwrap().children_named("Page").count(), 3);
    }

    #[test]
    fn restrict_main_renumbers_remaining_pages() {
        let pages: Vec<_> = (1..=3).map(page).collect();
        let mut main = issue(&pages);
        let supplements = vec![SupplementInput { label: "Sport".into(), pages: vec![page(2)] }];
        let result = partition(&pages, &supplements, &[]);
        restrict_main(&mut main, result.main_pages);

        let remaining: Vec<_> = main.document.child("Pages").unwrap().children_named("Page").collect();
        assert_eq!(remaining.len(), 2);
        assert_eq!(remaining[1].attr("pg"), Some("0002"));
        assert_eq!(remaining[1].find_path(&["master", "file"]).unwrap().text(), "ABC-0003.tif");
        assert_eq!(main.unit.pages.len(), 2);
        assert_eq!(
            main.document.find_path(&["volumeInfo", "issueInfo", "No_of_Pages"]).unwrap().text(),
            "2"
        );
    }
}
