//! METS files for newspaper volumes.
//!
//! A newspaper export produces three kinds of METS/MODS files, linked to
//! each other by URL pointers (`mets:mptr`) so that each one can be opened
//! on its own:
//!
//! ```text
//! {anchorId}.xml             anchor: the newspaper, one div per volume ─┐
//! {vol}.xml                  volume: year → month → day → issue stubs ◀─┘
//! {vol}-{date8}-mets.xml     one per issue: stub newspaper → year → month
//!                            → day → full issue, plus its pages
//! ```
//!
//! ## Back-fill
//!
//! Before anything is written, missing values are filled in on copies of
//! the logical nodes:
//!
//! | Node | Field | Filled from |
//! |------|-------|-------------|
//! | anchor, volume, issue | main title | display label |
//! | volume, issue | sort number | issue number, when numeric |
//! | issue | language, location, access condition, ZDB ids | anchor, then volume |
//! | issue | identifier | `{vol}-{date8}` |
//! | issue | resource type | `media_type` constant |
//! | issue | purl | `{pi_resolver_url}{vol}-{date8}` |
//! | issue | anchor id / anchor title | anchor identifier / label |
//!
//! Issue labels and titles are translated with
//! [`translate_issue_label`]. A missing or malformed issue date aborts the
//! whole emission; any other per-issue failure is reported as a problem
//! and the remaining issues are still emitted.
//!
//! ## File groups
//!
//! Each issue file declares three groups under
//! `{media_base_path}{issueId}/`: `PRESENTATION` (`image/tif`), `ALTO`
//! (`application/xml+alto`) and `TXT` (`text/plain`). Locations start out
//! as the source image names and are renamed to export names in a last
//! pass over the finished file section.

use crate::config::{ConstKey, Constants, ExportConfig, FieldKey, FieldNames, Variant};
use crate::hierarchy::{Hierarchy, HierarchyError, IssueStub};
use crate::metadata::{compact_date, is_iso_date, is_numeric, translate_issue_label};
use crate::naming::{FileNameMapper, NamingError, source_stem};
use crate::tree::{DocumentTree, LogicalNode, PageIndex, PhysicalPage, TreeError};
use crate::unit::unit_label;
use crate::vars::VariableReplacer;
use crate::xml::XmlElement;
use chrono::Utc;
use thiserror::Error;
use tracing::{debug, warn};

pub const METS_NS: &str = "http://www.loc.gov/METS/";
pub const MODS_NS: &str = "http://www.loc.gov/mods/v3";
pub const XLINK_NS: &str = "http://www.w3.org/1999/xlink";
pub const GOOBI_NS: &str = "http://meta.goobi.org/v1.5.1/";
pub const DV_NS: &str = "http://dfg-viewer.de/";

#[derive(Error, Debug)]
pub enum MetsError {
    #[error("{0} has the wrong type. It is not an anchor.")]
    NotAnAnchor(String),
    #[error("{0} has no volume")]
    NoVolume(String),
    #[error("Abort export, issue has no publication date")]
    MissingDate,
    #[error(transparent)]
    InvalidDate(#[from] HierarchyError),
    #[error(transparent)]
    Tree(#[from] TreeError),
    #[error(transparent)]
    Naming(#[from] NamingError),
    #[error("page '{0}' has no export name")]
    Unmapped(String),
}

impl MetsError {
    /// Errors that end the whole emission rather than one issue.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            MetsError::NotAnAnchor(_)
                | MetsError::NoVolume(_)
                | MetsError::MissingDate
                | MetsError::InvalidDate(_)
        )
    }
}

/// One METS document and the file name it is written under.
#[derive(Debug, Clone)]
pub struct MetsFile {
    pub name: String,
    pub document: XmlElement,
}

/// Everything one emission produces.
#[derive(Debug, Clone)]
pub struct MetsOutput {
    pub issues: Vec<MetsFile>,
    pub volume: MetsFile,
    pub anchor: MetsFile,
    /// Issues that could not be emitted, one message each.
    pub problems: Vec<String>,
    pub hierarchy: Hierarchy,
}

impl MetsOutput {
    pub fn files(&self) -> impl Iterator<Item = &MetsFile> {
        self.issues
            .iter()
            .chain(std::iter::once(&self.volume))
            .chain(std::iter::once(&self.anchor))
    }
}

// =============================================================================
// Back-fill
// =============================================================================

fn fill_if_blank(node: &mut LogicalNode, field: &str, value: &str) {
    if node.is_blank(field) && !value.trim().is_empty() {
        node.set_value(field, value.trim());
    }
}

/// Copy the display label into a blank main title.
pub fn backfill_main_title(node: &mut LogicalNode, fields: &FieldNames) {
    let label = node.value(&fields.title_label).to_string();
    fill_if_blank(node, &fields.main_title, &label);
}

/// Copy a numeric issue number into a blank sort number.
pub fn backfill_sort_number(node: &mut LogicalNode, fields: &FieldNames) {
    let number = node.value(&fields.issue_number).trim().to_string();
    if is_numeric(&number) {
        fill_if_blank(node, &fields.sort_number, &number);
    }
}

/// Values an issue inherits from its anchor and volume.
#[derive(Debug, Clone, Default)]
pub struct IssueDefaults {
    pub volume_identifier: String,
    pub anchor_identifier: String,
    pub anchor_title: String,
    pub language: String,
    pub location: String,
    pub access_condition: String,
    pub zdb_id_analog: String,
    pub zdb_id_digital: String,
    pub resource_type: String,
    pub pi_resolver_url: String,
}

impl IssueDefaults {
    pub fn collect(
        anchor: &LogicalNode,
        volume: &LogicalNode,
        fields: &FieldNames,
        resource_type: String,
        pi_resolver_url: &str,
    ) -> Self {
        let either = |field: &str| {
            let own = anchor.value(field).trim();
            if own.is_empty() {
                volume.value(field).trim().to_string()
            } else {
                own.to_string()
            }
        };
        Self {
            volume_identifier: volume.value(&fields.identifier).trim().to_string(),
            anchor_identifier: anchor.value(&fields.identifier).trim().to_string(),
            anchor_title: anchor.value(&fields.title_label).trim().to_string(),
            language: either(&fields.language),
            location: either(&fields.location),
            access_condition: either(&fields.access_condition),
            zdb_id_analog: anchor.value(&fields.zdb_id_analog).trim().to_string(),
            zdb_id_digital: anchor.value(&fields.zdb_id_digital).trim().to_string(),
            resource_type,
            pi_resolver_url: pi_resolver_url.to_string(),
        }
    }
}

/// Back-fill an issue copy and return its validated date.
pub fn backfill_issue(
    issue: &mut LogicalNode,
    fields: &FieldNames,
    defaults: &IssueDefaults,
) -> Result<String, MetsError> {
    for field in [&fields.title_label, &fields.main_title] {
        if let Some(m) = issue.metadata.iter_mut().find(|m| &m.name == field) {
            m.value = translate_issue_label(&m.value);
        }
    }
    backfill_main_title(issue, fields);
    backfill_sort_number(issue, fields);

    let date = issue.value(&fields.issue_date).trim().to_string();
    if date.is_empty() {
        return Err(MetsError::MissingDate);
    }
    if !is_iso_date(&date) {
        return Err(HierarchyError::InvalidDate(date).into());
    }
    let dated_id = format!("{}-{}", defaults.volume_identifier, compact_date(&date));

    fill_if_blank(issue, &fields.language, &defaults.language);
    fill_if_blank(issue, &fields.location, &defaults.location);
    fill_if_blank(issue, &fields.access_condition, &defaults.access_condition);
    fill_if_blank(issue, &fields.zdb_id_analog, &defaults.zdb_id_analog);
    fill_if_blank(issue, &fields.zdb_id_digital, &defaults.zdb_id_digital);
    fill_if_blank(issue, &fields.identifier, &dated_id);
    fill_if_blank(issue, &fields.resource_type, &defaults.resource_type);
    fill_if_blank(
        issue,
        &fields.purl,
        &format!("{}{}", defaults.pi_resolver_url, dated_id),
    );
    fill_if_blank(issue, &fields.anchor_id, &defaults.anchor_identifier);
    fill_if_blank(issue, &fields.anchor_title, &defaults.anchor_title);
    Ok(date)
}

// =============================================================================
// Document assembly
// =============================================================================

/// Accumulates the sections of one METS document.
struct MetsDoc {
    dmd: Vec<XmlElement>,
    next_log: usize,
}

impl MetsDoc {
    fn new() -> Self {
        Self {
            dmd: Vec::new(),
            next_log: 0,
        }
    }

    fn div(&mut self, doc_type: &str) -> XmlElement {
        let id = format!("LOG_{:04}", self.next_log);
        self.next_log += 1;
        XmlElement::new("mets:div")
            .with_attr("ID", id)
            .with_attr("TYPE", doc_type)
    }

    /// Div linked to a descriptive section holding `node`'s metadata.
    fn described_div(&mut self, node: &LogicalNode, fields: &FieldNames) -> XmlElement {
        let dmd_id = format!("DMDLOG_{:04}", self.dmd.len());
        self.dmd.push(dmd_sec(&dmd_id, node, fields));
        let mut div = self
            .div(&node.doc_type)
            .with_attr("DMDID", dmd_id)
            .with_attr("ADMID", "AMD");
        let label = node.value(&fields.title_label).trim();
        if !label.is_empty() {
            div.set_attr("LABEL", label);
        }
        div
    }
}

fn mptr(href: &str) -> XmlElement {
    XmlElement::new("mets:mptr")
        .with_attr("LOCTYPE", "URL")
        .with_attr("xlink:href", href)
}

fn dmd_sec(id: &str, node: &LogicalNode, fields: &FieldNames) -> XmlElement {
    let mut mods = XmlElement::new("mods:mods");
    let title = node.value(&fields.main_title).trim();
    if !title.is_empty() {
        mods.push(XmlElement::new("mods:titleInfo"))
            .push_text("mods:title", title);
    }
    let identifier = node.value(&fields.identifier).trim();
    if !identifier.is_empty() {
        mods.push(XmlElement::text_element("mods:identifier", identifier).with_attr("type", "local"));
    }
    let language = node.value(&fields.language).trim();
    if !language.is_empty() {
        mods.push(XmlElement::new("mods:language")).push(
            XmlElement::text_element("mods:languageTerm", language)
                .with_attr("authority", "iso639-2b")
                .with_attr("type", "code"),
        );
    }
    let goobi = mods
        .push(XmlElement::new("mods:extension"))
        .push(XmlElement::new("goobi:goobi"));
    for md in &node.metadata {
        let mut element =
            XmlElement::text_element("goobi:metadata", md.value.as_str()).with_attr("name", md.name.as_str());
        if let Some(authority) = &md.authority {
            element.set_attr("authority", authority.id.as_str());
            element.set_attr("authorityURI", authority.uri.as_str());
            element.set_attr("valueURI", authority.value.as_str());
        }
        goobi.push(element);
    }

    XmlElement::new("mets:dmdSec").with_attr("ID", id).with_child(
        XmlElement::new("mets:mdWrap")
            .with_attr("MDTYPE", "MODS")
            .with_child(XmlElement::new("mets:xmlData").with_child(mods)),
    )
}

/// A file group entry: `(group, mime type, suffix)`.
const FILE_GROUPS: [(&str, &str, &str); 3] = [
    ("PRESENTATION", "image/tif", "tif"),
    ("ALTO", "application/xml+alto", "xml"),
    ("TXT", "text/plain", "txt"),
];

/// Point every `FLocat` at the export name of the file it names.
pub fn rename_content_files(file_sec: &mut XmlElement, mapper: &FileNameMapper) -> Result<(), MetsError> {
    for group in file_sec.elements_mut() {
        for file in group.elements_mut() {
            for locat in file.elements_mut().filter(|e| e.local_name() == "FLocat") {
                let Some(href) = locat.attr_local("href").map(str::to_string) else {
                    continue;
                };
                let (dir, name) = href.rsplit_once('/').unwrap_or(("", href.as_str()));
                let stem = source_stem(name)?;
                let suffix = &name[stem.len()..];
                let export = mapper
                    .get(stem)
                    .ok_or_else(|| MetsError::Unmapped(stem.to_string()))?;
                let renamed = if dir.is_empty() {
                    format!("{export}{suffix}")
                } else {
                    format!("{dir}/{export}{suffix}")
                };
                locat.set_attr("xlink:href", renamed);
            }
        }
    }
    Ok(())
}

// =============================================================================
// Emitter
// =============================================================================

pub struct MetsFileEmitter<'a> {
    tree: &'a DocumentTree,
    pages: PageIndex<'a>,
    config: &'a ExportConfig,
    constants: Constants,
    skipped: Vec<&'a LogicalNode>,
}

impl<'a> MetsFileEmitter<'a> {
    pub fn new(tree: &'a DocumentTree, config: &'a ExportConfig) -> Self {
        Self {
            tree,
            pages: tree.page_index(),
            config,
            constants: config.constants_for(Variant::Newspaper),
            skipped: Vec::new(),
        }
    }

    /// Leave out issues whose unit was not exported. They get neither an
    /// issue file nor a calendar entry; their dates are still validated.
    pub fn skipping(mut self, issues: Vec<&'a LogicalNode>) -> Self {
        self.skipped = issues;
        self
    }

    fn is_skipped(&self, issue: &LogicalNode) -> bool {
        self.skipped.iter().any(|s| std::ptr::eq(*s, issue))
    }

    fn fields(&self) -> &FieldNames {
        &self.config.fields
    }

    fn link(&self, prefix: &str, id: &str) -> String {
        if self.config.add_file_extension {
            format!("{prefix}{id}.xml")
        } else {
            format!("{prefix}{id}")
        }
    }

    fn constant(&self, key: ConstKey, vars: &VariableReplacer<'_>) -> String {
        vars.replace_opt(self.constants.get(key))
    }

    /// Emit the anchor, volume and issue files for the tree's first volume.
    ///
    /// `mapper` must already hold the export names of every issue page.
    pub fn emit(&self, mapper: &FileNameMapper) -> Result<MetsOutput, MetsError> {
        let fields = self.fields();
        let anchor_src = &self.tree.logical;
        if !anchor_src.anchor {
            return Err(MetsError::NotAnAnchor(anchor_src.doc_type.clone()));
        }
        let volume_src = anchor_src
            .children
            .first()
            .ok_or_else(|| MetsError::NoVolume(anchor_src.describe()))?;

        let mut anchor = LogicalNode {
            children: Vec::new(),
            ..anchor_src.clone()
        };
        backfill_main_title(&mut anchor, fields);
        let mut volume = LogicalNode {
            children: Vec::new(),
            ..volume_src.clone()
        };
        backfill_main_title(&mut volume, fields);
        backfill_sort_number(&mut volume, fields);

        let volume_vars = VariableReplacer::new(self.tree, anchor_src, vec![volume_src, anchor_src]);
        let defaults = IssueDefaults::collect(
            &anchor,
            &volume,
            fields,
            self.constant(ConstKey::MediaType, &volume_vars),
            &self.config.pi_resolver_url,
        );
        let year_id = defaults.volume_identifier.clone();
        let anchor_stem = if defaults.anchor_identifier.is_empty()
            || defaults.anchor_identifier == year_id
        {
            format!("{year_id}_anchor")
        } else {
            defaults.anchor_identifier.clone()
        };
        let mut year_label = volume.value(&fields.publication_year).trim().to_string();

        let mut hierarchy = Hierarchy::new();
        let mut issues = Vec::new();
        let mut problems = Vec::new();

        for issue_src in volume_src
            .children
            .iter()
            .filter(|c| c.doc_type == self.config.types.issue)
        {
            let mut issue = LogicalNode {
                children: Vec::new(),
                ..issue_src.clone()
            };
            let date = backfill_issue(&mut issue, fields, &defaults)?;
            if year_label.is_empty() {
                year_label = date[..4].to_string();
            }
            if self.is_skipped(issue_src) {
                debug!(issue = %date, "issue not exported, leaving it out of the volume");
                continue;
            }
            let issue_id = issue.value(&fields.identifier).trim().to_string();
            let stub_link = if self.config.add_file_extension {
                format!(
                    "{}{}-{}-mets.xml",
                    self.config.mets_resolver_url,
                    year_id,
                    compact_date(&date)
                )
            } else {
                format!("{}{}", self.config.mets_resolver_url, issue_id)
            };

            let context = IssueContext {
                anchor: &anchor,
                volume: &volume,
                issue: &issue,
                source: issue_src,
                date: &date,
                anchor_stem: &anchor_stem,
                vars: VariableReplacer::new(
                    self.tree,
                    anchor_src,
                    vec![issue_src, volume_src, anchor_src],
                ),
            };
            match self.issue_file(&context, mapper) {
                Ok(file) => {
                    debug!(file = %file.name, "built issue METS");
                    issues.push(file);
                }
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    let message = format!("{}: {e}", unit_label(issue_src, fields));
                    warn!(issue = %issue_id, error = %e, "skipping issue METS");
                    problems.push(message);
                    continue;
                }
            }
            // Only issues with a written file are linked from the volume.
            hierarchy.place_issue(&date)?.issues.push(IssueStub {
                label: issue.value(&fields.title_label).trim().to_string(),
                order_label: date.clone(),
                link: stub_link,
            });
        }

        let volume_file = self.volume_file(
            &anchor,
            &volume,
            &hierarchy,
            &year_label,
            &anchor_stem,
            &volume_vars,
        );
        let anchor_file = self.anchor_file(&anchor, &volume, &year_label, &anchor_stem, &volume_vars);
        Ok(MetsOutput {
            issues,
            volume: MetsFile {
                name: format!("{year_id}.xml"),
                document: volume_file,
            },
            anchor: MetsFile {
                name: format!("{anchor_stem}.xml"),
                document: anchor_file,
            },
            problems,
            hierarchy,
        })
    }

    fn root(
        &self,
        doc: MetsDoc,
        amd: XmlElement,
        sections: impl IntoIterator<Item = XmlElement>,
    ) -> XmlElement {
        let mut root = XmlElement::new("mets:mets")
            .with_attr("xmlns:mets", METS_NS)
            .with_attr("xmlns:mods", MODS_NS)
            .with_attr("xmlns:xlink", XLINK_NS)
            .with_attr("xmlns:goobi", GOOBI_NS)
            .with_attr("xmlns:dv", DV_NS);
        root.push(
            XmlElement::new("mets:metsHdr")
                .with_attr("CREATEDATE", Utc::now().format("%Y-%m-%dT%H:%M:%S").to_string())
                .with_child(
                    XmlElement::new("mets:agent")
                        .with_attr("ROLE", "CREATOR")
                        .with_attr("TYPE", "OTHER")
                        .with_attr("OTHERTYPE", "SOFTWARE")
                        .with_child(XmlElement::text_element(
                            "mets:name",
                            concat!("archive-export ", env!("CARGO_PKG_VERSION")),
                        )),
                ),
        );
        for dmd in doc.dmd {
            root.push(dmd);
        }
        root.push(amd);
        for section in sections {
            root.push(section);
        }
        root
    }

    /// Rights and provenance section. The anchor file uses the anchor links.
    fn amd_sec(&self, vars: &VariableReplacer<'_>, for_anchor: bool) -> XmlElement {
        let m = &self.config.mets;
        let v = |value: &Option<String>| vars.replace_opt(value.as_deref());
        let mut rights = XmlElement::new("dv:rights");
        rights.push_text("dv:owner", v(&m.rights_owner));
        rights.push_text("dv:ownerLogo", v(&m.rights_owner_logo));
        rights.push_text("dv:ownerSiteURL", v(&m.rights_owner_site_url));
        rights.push_text("dv:ownerContact", v(&m.rights_owner_contact));
        rights.push_text("dv:license", v(&m.license));

        let (presentation, reference) = if for_anchor {
            (&m.digiprov_presentation_anchor, &m.digiprov_reference_anchor)
        } else {
            (&m.digiprov_presentation, &m.digiprov_reference)
        };
        let mut links = XmlElement::new("dv:links");
        links.push_text("dv:reference", v(reference));
        links.push_text("dv:presentation", v(presentation));

        let wrap = |id: &str, section: &str, kind: &str, body: XmlElement| {
            XmlElement::new(section).with_attr("ID", id).with_child(
                XmlElement::new("mets:mdWrap")
                    .with_attr("MDTYPE", "OTHER")
                    .with_attr("OTHERMDTYPE", kind)
                    .with_attr("MIMETYPE", "text/xml")
                    .with_child(XmlElement::new("mets:xmlData").with_child(body)),
            )
        };
        XmlElement::new("mets:amdSec")
            .with_attr("ID", "AMD")
            .with_child(wrap("RIGHTS", "mets:rightsMD", "DVRIGHTS", rights))
            .with_child(wrap("DIGIPROV", "mets:digiprovMD", "DVLINKS", links))
    }

    fn issue_file(&self, ctx: &IssueContext<'_>, mapper: &FileNameMapper) -> Result<MetsFile, MetsError> {
        let fields = self.fields();
        let types = &self.config.types;
        let year_id = self.fields_value(ctx.volume, FieldKey::Identifier);
        let issue_id = self.fields_value(ctx.issue, FieldKey::Identifier);
        let pages = self.pages.pages_of(ctx.source)?;

        let mut full = ctx.issue.clone();
        let extras = [
            (&fields.location, ConstKey::SourceOrganisation),
            (&fields.access_condition_use, ConstKey::RightsToUse),
            (&fields.access_condition_details, ConstKey::RightsDetails),
            (&fields.frequency, ConstKey::Frequency),
        ];
        for (field, key) in extras {
            let value = self.constant(key, &ctx.vars);
            if !value.is_empty() {
                full.add_value(field, value);
            }
        }

        let mut doc = MetsDoc::new();
        let mut newspaper = doc.div(&ctx.anchor.doc_type);
        set_label(&mut newspaper, ctx.anchor.value(&fields.title_label));
        newspaper.push(mptr(&self.link(&self.config.mets_url, ctx.anchor_stem)));

        let mut year = doc.div(&types.year);
        set_label(&mut year, ctx.volume.value(&fields.title_label));
        year.set_attr("ORDERLABEL", &ctx.date[..4]);
        year.push(mptr(&self.link(&self.config.mets_url, &year_id)));

        let month = doc.div(&types.month).with_attr("ORDERLABEL", &ctx.date[..7]);
        let day = doc.div(&types.day).with_attr("ORDERLABEL", ctx.date);
        let mut issue_div = doc.described_div(&full, fields);
        issue_div.set_attr("TYPE", types.issue.as_str());
        issue_div.set_attr("ORDERLABEL", ctx.date);
        let issue_log_id = issue_div.attr("ID").unwrap_or_default().to_string();

        newspaper.push(year).push(month).push(day).push(issue_div);
        let logical = XmlElement::new("mets:structMap")
            .with_attr("TYPE", "LOGICAL")
            .with_child(newspaper);

        let location = format!("{}{}/", self.config.media_base_path, issue_id);
        let mut file_sec = XmlElement::new("mets:fileSec");
        for (group, mime, suffix) in FILE_GROUPS {
            let grp = file_sec.push(XmlElement::new("mets:fileGrp").with_attr("USE", group));
            for (i, page) in pages.iter().enumerate() {
                let stem = source_stem(image_file_name(page))?;
                grp.push(
                    XmlElement::new("mets:file")
                        .with_attr("ID", format!("FILE_{i:04}_{group}"))
                        .with_attr("MIMETYPE", mime)
                        .with_child(
                            XmlElement::new("mets:FLocat")
                                .with_attr("LOCTYPE", "URL")
                                .with_attr("xlink:href", format!("{location}{stem}.{suffix}")),
                        ),
                );
            }
        }
        rename_content_files(&mut file_sec, mapper)?;

        let mut sequence = XmlElement::new("mets:div")
            .with_attr("ID", "PHYS_0000")
            .with_attr("TYPE", "physSequence");
        let mut struct_link = XmlElement::new("mets:structLink");
        for (i, page) in pages.iter().enumerate() {
            let phys_id = format!("PHYS_{:04}", i + 1);
            let order = if page.order > 0 { page.order as usize } else { i + 1 };
            let mut div = XmlElement::new("mets:div")
                .with_attr("ID", phys_id.as_str())
                .with_attr("ORDER", order.to_string())
                .with_attr("TYPE", "page");
            if !page.order_label.is_empty() {
                div.set_attr("ORDERLABEL", page.order_label.as_str());
            }
            for (group, _, _) in FILE_GROUPS {
                div.push(XmlElement::new("mets:fptr").with_attr("FILEID", format!("FILE_{i:04}_{group}")));
            }
            sequence.push(div);
            struct_link.push(
                XmlElement::new("mets:smLink")
                    .with_attr("xlink:from", issue_log_id.as_str())
                    .with_attr("xlink:to", phys_id),
            );
        }
        let physical = XmlElement::new("mets:structMap")
            .with_attr("TYPE", "PHYSICAL")
            .with_child(sequence);

        let amd = self.amd_sec(&ctx.vars, false);
        Ok(MetsFile {
            name: format!("{}-{}-mets.xml", year_id, compact_date(ctx.date)),
            document: self.root(doc, amd, [file_sec, logical, physical, struct_link]),
        })
    }

    fn fields_value(&self, node: &LogicalNode, key: FieldKey) -> String {
        node.value(self.fields().name(key)).trim().to_string()
    }

    fn volume_file(
        &self,
        anchor: &LogicalNode,
        volume: &LogicalNode,
        hierarchy: &Hierarchy,
        year_label: &str,
        anchor_stem: &str,
        vars: &VariableReplacer<'_>,
    ) -> XmlElement {
        let fields = self.fields();
        let types = &self.config.types;
        let mut doc = MetsDoc::new();

        let mut top = doc.div(&anchor.doc_type);
        set_label(&mut top, anchor.value(&fields.title_label));
        top.push(mptr(&self.link(&self.config.mets_url, anchor_stem)));

        let mut year = doc.described_div(volume, fields);
        year.set_attr("TYPE", types.year.as_str());
        if !year_label.is_empty() {
            year.set_attr("ORDERLABEL", year_label);
        }
        for month_node in hierarchy.years.iter().flat_map(|y| &y.months) {
            let month = year.push(doc.div(&types.month).with_attr("ORDERLABEL", month_node.key.as_str()));
            for day_node in &month_node.days {
                let day = month.push(doc.div(&types.day).with_attr("ORDERLABEL", day_node.key.as_str()));
                for stub in &day_node.issues {
                    let mut div = doc.div(&types.issue).with_attr("ORDERLABEL", stub.order_label.as_str());
                    set_label(&mut div, &stub.label);
                    div.push(mptr(&stub.link));
                    day.push(div);
                }
            }
        }
        top.push(year);

        let logical = XmlElement::new("mets:structMap")
            .with_attr("TYPE", "LOGICAL")
            .with_child(top);
        let physical = XmlElement::new("mets:structMap")
            .with_attr("TYPE", "PHYSICAL")
            .with_child(
                XmlElement::new("mets:div")
                    .with_attr("ID", "PHYS_0000")
                    .with_attr("TYPE", "physSequence"),
            );
        let amd = self.amd_sec(vars, false);
        self.root(doc, amd, [logical, physical])
    }

    fn anchor_file(
        &self,
        anchor: &LogicalNode,
        volume: &LogicalNode,
        year_label: &str,
        anchor_stem: &str,
        vars: &VariableReplacer<'_>,
    ) -> XmlElement {
        let fields = self.fields();
        let mut doc = MetsDoc::new();
        let mut top = doc.described_div(anchor, fields);

        let year_id = self.fields_value(volume, FieldKey::Identifier);
        let mut entry = doc.div(&self.config.types.year);
        set_label(&mut entry, volume.value(&fields.title_label));
        let order = match volume.value(&fields.sort_number).trim() {
            "" => year_label.to_string(),
            sort => sort.to_string(),
        };
        if !order.is_empty() {
            entry.set_attr("ORDER", order.as_str());
            entry.set_attr("ORDERLABEL", order);
        }
        entry.push(mptr(&format!("{}{}.xml", self.config.mets_url, year_id)));
        top.push(entry);

        debug!(anchor = anchor_stem, volume = %year_id, "built anchor METS");
        let logical = XmlElement::new("mets:structMap")
            .with_attr("TYPE", "LOGICAL")
            .with_child(top);
        let amd = self.amd_sec(vars, true);
        self.root(doc, amd, [logical])
    }
}

struct IssueContext<'a> {
    anchor: &'a LogicalNode,
    volume: &'a LogicalNode,
    /// Back-filled copy.
    issue: &'a LogicalNode,
    source: &'a LogicalNode,
    date: &'a str,
    anchor_stem: &'a str,
    vars: VariableReplacer<'a>,
}

fn set_label(div: &mut XmlElement, label: &str) {
    let label = label.trim();
    if !label.is_empty() {
        div.set_attr("LABEL", label);
    }
}

fn image_file_name(page: &PhysicalPage) -> &str {
    page.image_name
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(page.image_name.as_str())
}

// =============================================================================
// Plain record files
// =============================================================================

/// Record and anchor METS documents for a whole tree, as written by the
/// default export: the logical structure as-is, pages under their source
/// names. The anchor is `None` unless the root is an anchor.
pub fn record_documents(tree: &DocumentTree, config: &ExportConfig) -> (XmlElement, Option<XmlElement>) {
    let emitter = MetsFileEmitter::new(tree, config);
    let fields = &config.fields;
    let vars = VariableReplacer::for_top(tree, &tree.logical);
    let title = tree.process.title.as_str();
    let phys_ids: std::collections::HashMap<&str, String> = tree
        .physical
        .iter()
        .enumerate()
        .map(|(i, p)| (p.id.as_str(), format!("PHYS_{:04}", i + 1)))
        .collect();

    let mut doc = MetsDoc::new();
    let mut struct_link = XmlElement::new("mets:structLink");
    let root = &tree.logical;
    let top = if root.anchor {
        let mut top = doc.div(&root.doc_type);
        set_label(&mut top, root.value(&fields.title_label));
        top.push(mptr(&emitter.link(&config.mets_url, &format!("{title}_anchor"))));
        for child in &root.children {
            let div = record_div(&mut doc, child, fields, &phys_ids, &mut struct_link);
            top.push(div);
        }
        top
    } else {
        record_div(&mut doc, root, fields, &phys_ids, &mut struct_link)
    };
    let logical = XmlElement::new("mets:structMap")
        .with_attr("TYPE", "LOGICAL")
        .with_child(top);

    let mut group = XmlElement::new("mets:fileGrp").with_attr("USE", "PRESENTATION");
    let mut sequence = XmlElement::new("mets:div")
        .with_attr("ID", "PHYS_0000")
        .with_attr("TYPE", "physSequence");
    for (i, page) in tree.physical.iter().enumerate() {
        let file_id = format!("FILE_{i:04}_PRESENTATION");
        group.push(
            XmlElement::new("mets:file")
                .with_attr("ID", file_id.as_str())
                .with_attr("MIMETYPE", "image/tif")
                .with_child(
                    XmlElement::new("mets:FLocat").with_attr("LOCTYPE", "URL").with_attr(
                        "xlink:href",
                        format!("{}{}/{}", config.media_base_path, title, image_file_name(page)),
                    ),
                ),
        );
        let mut div = XmlElement::new("mets:div")
            .with_attr("ID", format!("PHYS_{:04}", i + 1))
            .with_attr("ORDER", (i + 1).to_string())
            .with_attr("TYPE", "page");
        if !page.order_label.is_empty() {
            div.set_attr("ORDERLABEL", page.order_label.as_str());
        }
        div.push(XmlElement::new("mets:fptr").with_attr("FILEID", file_id));
        sequence.push(div);
    }
    let file_sec = XmlElement::new("mets:fileSec").with_child(group);
    let physical = XmlElement::new("mets:structMap")
        .with_attr("TYPE", "PHYSICAL")
        .with_child(sequence);
    let record = emitter.root(
        doc,
        emitter.amd_sec(&vars, false),
        [file_sec, logical, physical, struct_link],
    );

    let anchor = root.anchor.then(|| {
        let mut doc = MetsDoc::new();
        let mut top = doc.described_div(root, fields);
        for child in &root.children {
            let mut entry = doc.div(&child.doc_type);
            set_label(&mut entry, child.value(&fields.title_label));
            entry.push(mptr(&format!("{}{}.xml", config.mets_url, title)));
            top.push(entry);
        }
        let logical = XmlElement::new("mets:structMap")
            .with_attr("TYPE", "LOGICAL")
            .with_child(top);
        emitter.root(doc, emitter.amd_sec(&vars, true), [logical])
    });
    (record, anchor)
}

fn record_div(
    doc: &mut MetsDoc,
    node: &LogicalNode,
    fields: &FieldNames,
    phys_ids: &std::collections::HashMap<&str, String>,
    struct_link: &mut XmlElement,
) -> XmlElement {
    let mut div = doc.described_div(node, fields);
    let log_id = div.attr("ID").unwrap_or_default().to_string();
    for page in &node.pages {
        if let Some(phys) = phys_ids.get(page.as_str()) {
            struct_link.push(
                XmlElement::new("mets:smLink")
                    .with_attr("xlink:from", log_id.as_str())
                    .with_attr("xlink:to", phys.as_str()),
            );
        }
    }
    for child in &node.children {
        let child_div = record_div(doc, child, fields, phys_ids, struct_link);
        div.push(child_div);
    }
    div
}
