//! Description documents for output units.
//!
//! A [`UnitXmlBuilder`] turns one logical node (issue, volume, envelope
//! child, negative strip, slide, generic image) into the institution's
//! description document. The six document shapes share one builder; what
//! differs per variant lives in a [`UnitPolicy`] and in a static header
//! table:
//!
//! | Variant | Root | Header | Pages | Naming | OCR links |
//! |---------|------|--------|-------|--------|-----------|
//! | newspaper | `newspaper` | `volumeInfo` + `issueInfo` | `Pages/Page pg` | `{vol}-NNNN` | alto + text |
//! | magazine | `magazine` | `magazineInfo` + `issueInfo` | `Pages/Page pg` | `{id}-NNNN` | when present |
//! | positive | `Envelope` | `envelopeInfo` | `Images/Image id` | `{id}-NNN` | text, empty if absent |
//! | negative | `Negative` | `negativeInfo` | `Images/Image id` | `{id}-NNNNNNN` | when present |
//! | slide | `image` | `SlideInfo` | single `master` | `{id}` | none |
//! | generic | `image` | `ImageInfo` | `Files` | `{id}` | merged text |
//!
//! Page collection goes through a [`PageCatalog`], the run's file name
//! mapping plus a technical-attribute cache keyed by export name. A page
//! whose export name has been probed before is not probed again.
//! Collection is transactional: a unit that fails half way leaves the
//! catalog exactly as it found it, so no asset of a failed unit is ever
//! copied.

use crate::config::{
    ConstKey, Constants, ExportConfig, FieldKey, FieldNames, MissingImagePolicy, SourcePaths,
    Variant, VariantConfig,
};
use crate::imaging::{ImageProbe, ProbeError};
use crate::metadata::{
    arabic_part, clean_issue_label, english_part, language_name, resolve_field, ymd_to_dmy,
};
use crate::naming::{FileNameMapper, NamingError, NamingScheme, source_stem};
use crate::storage::Storage;
use crate::tree::{DocumentTree, JournalKind, LogicalNode, PageIndex, PhysicalPage, TreeError};
use crate::types::{OutputUnit, PageEntry, TechnicalAttributes};
use crate::vars::VariableReplacer;
use crate::xml::XmlElement;
use std::collections::HashMap;
use std::path::Path;
use thiserror::Error;
use tracing::debug;

pub const XML_FORMAT: &str = "application/xml";
pub const ALTO_FORMAT: &str = "application/xml+alto";
pub const TEXT_FORMAT: &str = "text/plain";
pub const PDF_FORMAT: &str = "application/pdf";

const NO_JOURNAL_ENTRY: &str = "- no entry available -";
const NO_SERIAL_NUMBER: &str = "- no serial number available -";
const DEFAULT_CAPTURING_DEVICE: &str = "${process.Capturing device}";

#[derive(Error, Debug)]
pub enum UnitError {
    #[error(transparent)]
    Tree(#[from] TreeError),
    #[error(transparent)]
    Naming(#[from] NamingError),
    #[error("{unit}: {source}")]
    Probe {
        unit: String,
        #[source]
        source: ProbeError,
    },
}

/// Which OCR links a page block carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OcrLinks {
    /// `alto` and `text` on every page.
    Always,
    /// Only for OCR files that exist.
    WhenPresent,
    /// `text` only; an empty element with just the format when absent.
    TextOrEmpty,
    /// No per-page links.
    Omit,
}

/// Everything that differs between the variants' page handling.
#[derive(Debug, Clone, PartialEq)]
pub struct UnitPolicy {
    pub variant: Variant,
    pub naming: NamingScheme,
    pub ocr: OcrLinks,
    /// `BitDepth` is bits per pixel instead of bits per sample.
    pub bit_depth_per_pixel: bool,
    pub scanning_device_id: &'static str,
    /// Only the first referenced page is exported.
    pub single_image: bool,
    pub on_missing_image: MissingImagePolicy,
}

impl UnitPolicy {
    /// Stock policy for `variant` with the configured overrides applied.
    pub fn for_variant(variant: Variant, overrides: &VariantConfig) -> Self {
        let counter = |width| NamingScheme::Counter { width, origin: 1 };
        let (naming, ocr, bit_depth_per_pixel, single_image) = match variant {
            Variant::Newspaper => (counter(4), OcrLinks::Always, false, false),
            Variant::Magazine => (counter(4), OcrLinks::WhenPresent, true, false),
            Variant::Positive => (counter(3), OcrLinks::TextOrEmpty, false, false),
            Variant::Negative => (
                NamingScheme::Counter {
                    width: 7,
                    origin: 0,
                },
                OcrLinks::WhenPresent,
                false,
                false,
            ),
            Variant::Slide => (NamingScheme::Identifier, OcrLinks::Omit, false, true),
            Variant::Generic => (NamingScheme::Identifier, OcrLinks::Omit, true, true),
        };
        let naming = match naming {
            NamingScheme::Counter { width, origin } => NamingScheme::Counter {
                width: overrides.pad_width.unwrap_or(width),
                origin: overrides.counter_origin.unwrap_or(origin),
            },
            scheme => scheme,
        };
        let default_missing = match variant {
            Variant::Newspaper => MissingImagePolicy::SkipUnit,
            _ => MissingImagePolicy::AbortExport,
        };
        Self {
            variant,
            naming,
            ocr,
            bit_depth_per_pixel,
            scanning_device_id: match variant {
                Variant::Positive => NO_SERIAL_NUMBER,
                _ => "",
            },
            single_image,
            on_missing_image: overrides.on_missing_image.unwrap_or(default_missing),
        }
    }
}

// =============================================================================
// Header tables
// =============================================================================

/// Source of one header element.
#[derive(Debug, Clone, Copy)]
enum Header {
    Const(ConstKey),
    /// Metadata of the top logical element.
    Top(FieldKey),
    /// Language of the top element, as display name.
    TopLanguage,
    /// The unit's barcode (identifier).
    Barcode,
    /// Metadata of the unit itself, falling back to the constant.
    Own(FieldKey, ConstKey),
    TechnicalNotes,
}

use Header::{Barcode, Const, Own, TechnicalNotes, Top, TopLanguage};

const NEWSPAPER_INFO: &[(&str, Header)] = &[
    ("Rights_to_Use", Const(ConstKey::RightsToUse)),
    ("Right_Details", Const(ConstKey::RightsDetails)),
    ("Media_Source", Const(ConstKey::Source)),
    ("Media_type", Const(ConstKey::MediaType)),
    ("Media_Group", Const(ConstKey::MediaGroup)),
    ("Publication_Name", Top(FieldKey::TitleLabel)),
    ("Language", TopLanguage),
    ("Source_Organization", Const(ConstKey::SourceOrganisation)),
    ("Technical_Notes", TechnicalNotes),
    ("Barcode", Barcode),
];

const MAGAZINE_INFO: &[(&str, Header)] = &[
    ("Rights_to_Use", Const(ConstKey::RightsToUse)),
    ("Right_Details", Const(ConstKey::RightsDetails)),
    ("Media_Source", Const(ConstKey::Source)),
    ("Media_type", Const(ConstKey::MediaType)),
    ("Media_Group", Const(ConstKey::MediaGroup)),
    ("Publication_Name", Top(FieldKey::TitleLabel)),
    ("Language", TopLanguage),
    ("Source_Organization", Const(ConstKey::SourceOrganisation)),
    ("Technical_Notes", TechnicalNotes),
];

const ENVELOPE_INFO: &[(&str, Header)] = &[
    ("Rights_to_Use", Const(ConstKey::RightsToUse)),
    ("Right_Details", Const(ConstKey::RightsDetails)),
    ("Media_Source", Const(ConstKey::Source)),
    ("Media_Type", Const(ConstKey::MediaType)),
    ("Envelope_Barcode", Barcode),
    ("Envelope_Number", Const(ConstKey::EnvelopeNumber)),
    ("Publication_Name", Top(FieldKey::TitleLabel)),
    ("Source_Organization", Const(ConstKey::SourceOrganisation)),
    ("Event_Date", Const(ConstKey::EventDate)),
    ("Event_Time", Const(ConstKey::EventTime)),
    ("Event_Name", Const(ConstKey::EventName)),
    ("Subject", Const(ConstKey::Subject)),
    ("Photographer", Const(ConstKey::Photographer)),
    ("Persons_in_Image", Const(ConstKey::PersonsInImage)),
    ("Editor_in_Chief", Const(ConstKey::EditorInChief)),
    ("location", Const(ConstKey::Locations)),
    ("Description", Const(ConstKey::Description)),
    ("Technical_Notes", TechnicalNotes),
];

const NEGATIVE_INFO: &[(&str, Header)] = &[
    ("Rights_to_Use", Const(ConstKey::RightsToUse)),
    ("Right_Details", Const(ConstKey::RightsDetails)),
    ("Media_Source", Const(ConstKey::Source)),
    ("Media_Type", Const(ConstKey::MediaType)),
    ("Barcode", Barcode),
    ("Publication_Name", Top(FieldKey::TitleLabel)),
    ("Source_Organization", Const(ConstKey::SourceOrganisation)),
    ("Event_Date", Const(ConstKey::EventDate)),
    ("Event_Time", Const(ConstKey::EventTime)),
    ("Event_Name", Const(ConstKey::EventName)),
    ("Subject", Const(ConstKey::Subject)),
    ("Photographer", Const(ConstKey::Photographer)),
    ("Persons_in_Image", Const(ConstKey::PersonsInImage)),
    ("location", Const(ConstKey::Locations)),
    ("Description", Const(ConstKey::Description)),
    ("Technical_Notes", TechnicalNotes),
];

const SLIDE_INFO: &[(&str, Header)] = &[
    ("Rights_to_Use", Const(ConstKey::RightsToUse)),
    ("Right_Details", Const(ConstKey::RightsDetails)),
    ("Media_Source", Const(ConstKey::Source)),
    ("Media_type", Const(ConstKey::MediaType)),
    ("Publication_Name", Top(FieldKey::TitleLabel)),
    ("Source_Organization", Const(ConstKey::SourceOrganisation)),
    ("Barcode", Barcode),
    ("Event_Date", Const(ConstKey::EventDate)),
    ("Event_Name", Const(ConstKey::EventName)),
    ("Subject_ENG", Const(ConstKey::SubjectEng)),
    ("Subject_ARA", Const(ConstKey::SubjectAra)),
    ("Photographer", Const(ConstKey::Photographer)),
    ("Format", Const(ConstKey::Format)),
    ("Persons_in_Image", Const(ConstKey::PersonsInImage)),
    ("location", Const(ConstKey::Locations)),
    ("Description", Const(ConstKey::Description)),
    ("Technical_Notes", TechnicalNotes),
];

const GENERIC_INFO: &[(&str, Header)] = &[
    ("Rights_to_Use", Const(ConstKey::RightsToUse)),
    ("Right_Details", Const(ConstKey::RightsDetails)),
    ("Media_Source", Const(ConstKey::Source)),
    ("Media_Type", Const(ConstKey::MediaType)),
    ("Media_Group", Const(ConstKey::MediaGroup)),
    ("Envelope_Number", Const(ConstKey::EnvelopeNumber)),
    ("Editor_in_Chief", Const(ConstKey::EditorInChief)),
    ("Publication_Name", Top(FieldKey::TitleLabel)),
    ("Source_Organization", Const(ConstKey::SourceOrganisation)),
    ("Barcode", Barcode),
    ("Subject", Const(ConstKey::Subject)),
    ("Event_Date", Const(ConstKey::EventDate)),
    ("Event_Name", Const(ConstKey::EventName)),
    ("Photographer", Const(ConstKey::Photographer)),
    ("Format", Const(ConstKey::Format)),
    ("Persons_in_Image", Const(ConstKey::PersonsInImage)),
    ("location", Const(ConstKey::Locations)),
    ("Description", Const(ConstKey::Description)),
    ("Backprint", Own(FieldKey::Backprint, ConstKey::Backprint)),
    ("Technical_Notes", TechnicalNotes),
];

// =============================================================================
// Scope and catalog
// =============================================================================

/// A unit together with the nodes its values may be inherited from.
#[derive(Debug, Clone)]
pub struct UnitScope<'a> {
    pub unit: &'a LogicalNode,
    /// Nearest first: volume, then anchor.
    pub ancestors: Vec<&'a LogicalNode>,
    /// Root of the logical tree.
    pub top: &'a LogicalNode,
}

impl<'a> UnitScope<'a> {
    pub fn new(unit: &'a LogicalNode, ancestors: Vec<&'a LogicalNode>, top: &'a LogicalNode) -> Self {
        Self {
            unit,
            ancestors,
            top,
        }
    }

    /// A unit that is its own top element.
    pub fn root(unit: &'a LogicalNode) -> Self {
        Self::new(unit, Vec::new(), unit)
    }

    /// The unit followed by its ancestors.
    pub fn chain(&self) -> Vec<&'a LogicalNode> {
        std::iter::once(self.unit)
            .chain(self.ancestors.iter().copied())
            .collect()
    }
}

/// File name mapping and probe cache of one export run.
#[derive(Debug, Clone)]
pub struct PageCatalog {
    mapper: FileNameMapper,
    technical: HashMap<String, TechnicalAttributes>,
}

impl PageCatalog {
    pub fn new(unit_identifier: &str, scheme: NamingScheme) -> Self {
        Self {
            mapper: FileNameMapper::new(unit_identifier, scheme),
            technical: HashMap::new(),
        }
    }

    pub fn mapper(&self) -> &FileNameMapper {
        &self.mapper
    }

    pub fn technical(&self, export_name: &str) -> Option<&TechnicalAttributes> {
        self.technical.get(export_name)
    }
}

/// A finished description document and the unit it describes.
#[derive(Debug, Clone)]
pub struct BuiltUnit {
    pub unit: OutputUnit,
    pub document: XmlElement,
}

impl BuiltUnit {
    pub fn xml_file_name(&self) -> String {
        format!("{}.xml", self.unit.file_base())
    }
}

// =============================================================================
// Builder
// =============================================================================

/// Node type plus its issue date, or its identifier when undated.
pub fn unit_label(node: &LogicalNode, fields: &FieldNames) -> String {
    let date = node.value(&fields.issue_date).trim();
    let key = if date.is_empty() {
        node.value(&fields.identifier).trim()
    } else {
        date
    };
    if key.is_empty() {
        node.describe()
    } else {
        format!("{} {key}", node.describe())
    }
}

pub struct UnitXmlBuilder<'a> {
    tree: &'a DocumentTree,
    pages: PageIndex<'a>,
    config: &'a ExportConfig,
    policy: UnitPolicy,
    constants: Constants,
    probe: &'a dyn ImageProbe,
    storage: &'a dyn Storage,
    sources: &'a SourcePaths,
}

impl<'a> UnitXmlBuilder<'a> {
    pub fn new(
        tree: &'a DocumentTree,
        config: &'a ExportConfig,
        variant: Variant,
        probe: &'a dyn ImageProbe,
        storage: &'a dyn Storage,
        sources: &'a SourcePaths,
    ) -> Self {
        Self {
            tree,
            pages: tree.page_index(),
            config,
            policy: UnitPolicy::for_variant(variant, config.variants.get(variant)),
            constants: config.constants_for(variant),
            probe,
            storage,
            sources,
        }
    }

    pub fn policy(&self) -> &UnitPolicy {
        &self.policy
    }

    /// Empty catalog named after `unit_identifier` under this variant's scheme.
    pub fn catalog(&self, unit_identifier: &str) -> PageCatalog {
        PageCatalog::new(unit_identifier, self.policy.naming)
    }

    fn field(&self, key: FieldKey) -> &str {
        self.config.fields.name(key)
    }

    fn replacer(&self, scope: &UnitScope<'a>) -> VariableReplacer<'a> {
        VariableReplacer::new(self.tree, scope.top, scope.chain())
    }

    /// Name, probe and check the OCR files of every page `node` references.
    ///
    /// On error `catalog` is left untouched.
    pub fn collect_pages(
        &self,
        node: &LogicalNode,
        catalog: &mut PageCatalog,
    ) -> Result<Vec<PageEntry>, UnitError> {
        let mut refs = self.pages.pages_of(node)?;
        if self.policy.single_image {
            refs.truncate(1);
        }
        let mut scratch = catalog.clone();
        let mut pages = Vec::with_capacity(refs.len());
        for page in refs {
            let entry = self
                .page_entry(page, &mut scratch)
                .map_err(|e| match e {
                    UnitError::Probe { source, .. } => UnitError::Probe {
                        unit: unit_label(node, &self.config.fields),
                        source,
                    },
                    other => other,
                })?;
            pages.push(entry);
        }
        *catalog = scratch;
        debug!(unit = %node.describe(), pages = pages.len(), "collected pages");
        Ok(pages)
    }

    fn page_entry(
        &self,
        page: &PhysicalPage,
        catalog: &mut PageCatalog,
    ) -> Result<PageEntry, UnitError> {
        let file_name = Path::new(&page.image_name)
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| page.image_name.clone());
        let stem = source_stem(&file_name)?.to_string();
        let export_name = catalog.mapper.assign(&stem);

        let technical = match catalog.technical.get(&export_name) {
            Some(cached) => cached.clone(),
            None => {
                let probed = self
                    .probe
                    .probe(&self.sources.images.join(&file_name))
                    .map_err(|source| UnitError::Probe {
                        unit: String::new(),
                        source,
                    })?;
                catalog.technical.insert(export_name.clone(), probed.clone());
                probed
            }
        };

        Ok(PageEntry {
            has_alto: self
                .storage
                .exists(&self.sources.alto.join(format!("{stem}.xml"))),
            has_text: self
                .storage
                .exists(&self.sources.text.join(format!("{stem}.txt"))),
            source_stem: stem,
            export_name,
            technical,
        })
    }

    // -------------------------------------------------------------------------
    // Shared blocks
    // -------------------------------------------------------------------------

    fn header(
        &self,
        name: &str,
        table: &[(&str, Header)],
        scope: &UnitScope<'a>,
        vars: &VariableReplacer<'_>,
        barcode: &str,
    ) -> XmlElement {
        let mut info = XmlElement::new(name);
        for (element, source) in table {
            let value = match *source {
                Const(key) => vars.replace_opt(self.constants.get(key)),
                Top(key) => scope.top.value(self.field(key)).trim().to_string(),
                TopLanguage => language_name(scope.top.value(self.field(FieldKey::Language)).trim()),
                Barcode => barcode.to_string(),
                Own(key, constant) => resolve_field(
                    scope.unit,
                    &[],
                    self.field(key),
                    false,
                    Some(vars.replace_opt(self.constants.get(constant)).as_str()),
                ),
                TechnicalNotes => {
                    info.push(technical_notes(self.tree));
                    continue;
                }
            };
            info.push_text(element, value);
        }
        info
    }

    fn viewer_link(&self, file_base: &str) -> String {
        format!(
            "{}/image/{}/",
            self.config.viewer_url.trim_end_matches('/'),
            file_base
        )
    }

    /// The `master` block of one page.
    pub fn master(&self, page: &PageEntry, vars: &VariableReplacer<'_>) -> XmlElement {
        let t = &page.technical;
        let bit_depth = if self.policy.bit_depth_per_pixel {
            t.bit_depth * t.samples_per_pixel.max(1)
        } else {
            t.bit_depth
        };
        let device = vars.replace(
            self.constants
                .get(ConstKey::CapturingDevice)
                .unwrap_or(DEFAULT_CAPTURING_DEVICE),
        );
        let mut master = XmlElement::new("master");
        master.push_text("Format", &t.mime_type);
        master.push_text("ResolutionUnit", "PPI");
        master.push_text("Resolution", t.x_resolution.to_string());
        master.push_text("BitDepth", bit_depth.to_string());
        master.push_text("ColorSpace", &t.color_space);
        master.push_text("ScanningDevice", device);
        master.push_text("ScanningDeviceID", self.policy.scanning_device_id);
        master.push_text("Width", t.width.to_string());
        master.push_text("Height", t.height.to_string());
        master.push_text("file", format!("{}.tif", page.export_name));
        master
    }

    fn push_ocr_links(&self, block: &mut XmlElement, page: &PageEntry) {
        let alto = || file_ref("alto", format!("{}.xml", page.export_name), ALTO_FORMAT);
        let text = || file_ref("text", format!("{}.txt", page.export_name), TEXT_FORMAT);
        match self.policy.ocr {
            OcrLinks::Always => {
                block.push(alto());
                block.push(text());
            }
            OcrLinks::WhenPresent => {
                if page.has_alto {
                    block.push(alto());
                }
                if page.has_text {
                    block.push(text());
                }
            }
            OcrLinks::TextOrEmpty => {
                if page.has_text {
                    block.push(text());
                } else {
                    block.push(XmlElement::new("text").with_attr("Format", TEXT_FORMAT));
                }
            }
            OcrLinks::Omit => {}
        }
    }

    fn pages_element(&self, pages: &[PageEntry], vars: &VariableReplacer<'_>) -> XmlElement {
        let mut list = XmlElement::new("Pages");
        for (i, page) in pages.iter().enumerate() {
            let block = list.push(XmlElement::new("Page").with_attr("pg", page_number(i)));
            block.push(self.master(page, vars));
            self.push_ocr_links(block, page);
        }
        list
    }

    fn images_element(
        &self,
        pages: &[PageEntry],
        catalog: &PageCatalog,
        backprint: Option<&str>,
        vars: &VariableReplacer<'_>,
    ) -> XmlElement {
        let mut list = XmlElement::new("Images");
        for page in pages {
            let counter = catalog.mapper().counter_suffix(&page.export_name);
            let image = list.push(XmlElement::new("Image").with_attr("id", counter));
            image.push_text("Barcode", &page.export_name);
            if let Some(backprint) = backprint {
                image.push_text("Backprint", backprint);
            }
            image.push(self.master(page, vars));
            self.push_ocr_links(image, page);
        }
        list
    }

    // -------------------------------------------------------------------------
    // Variants
    // -------------------------------------------------------------------------

    /// One newspaper issue. `scope.top` is the newspaper anchor.
    pub fn newspaper_issue(
        &self,
        scope: &UnitScope<'a>,
        volume_id: &str,
        pages: Vec<PageEntry>,
    ) -> BuiltUnit {
        let vars = self.replacer(scope);
        let date = scope.unit.value(self.field(FieldKey::IssueDate)).trim().to_string();
        let dmy = ymd_to_dmy(&date);
        let anchor_title = scope.top.value(self.field(FieldKey::TitleLabel)).trim();
        let unit = OutputUnit {
            identifier: volume_id.to_string(),
            date: Some(date.clone()),
            title_eng: format!("{}-{}", english_part(anchor_title), dmy),
            title_ara: format!("{}-{}", dmy, arabic_part(anchor_title)),
            pages,
        };
        let base = unit.file_base();

        let mut info = self.header("volumeInfo", NEWSPAPER_INFO, scope, &vars, volume_id);
        info.push(file_ref("MetadataMetsFile", format!("{volume_id}.xml"), XML_FORMAT));
        let issue = info.push(XmlElement::new("issueInfo"));
        issue.push_text("issueNumber", scope.unit.value(self.field(FieldKey::IssueNumber)).trim());
        issue.push_text("issueID", &base);
        issue.push_text("issueFrequency", vars.replace_opt(self.constants.get(ConstKey::Frequency)));
        issue.push_text("issueTitleENG", &unit.title_eng);
        issue.push_text("issueTitleARA", &unit.title_ara);
        issue.push_text("issueDate", &date);
        issue.push_text("No_of_Pages", unit.pages.len().to_string());
        issue.push_text("Open_In_Viewer", self.viewer_link(&base));
        issue.push(file_ref("issueFile", format!("{base}.pdf"), PDF_FORMAT));
        issue.push(file_ref("MetadataMetsFile", format!("{base}-mets.xml"), XML_FORMAT));

        let mut root = XmlElement::new("newspaper");
        root.push(info);
        root.push(self.pages_element(&unit.pages, &vars));
        BuiltUnit {
            unit,
            document: root,
        }
    }

    /// One magazine volume. `scope.unit` is the volume, `scope.top` the
    /// periodical anchor.
    pub fn magazine(&self, scope: &UnitScope<'a>, pages: Vec<PageEntry>) -> BuiltUnit {
        let vars = self.replacer(scope);
        let id = scope.unit.value(self.field(FieldKey::Identifier)).trim().to_string();
        let date = scope.unit.value(self.field(FieldKey::DateOfOrigin)).trim().to_string();
        let label = clean_issue_label(&date);
        let anchor_title = scope.top.value(self.field(FieldKey::TitleLabel)).trim();
        let unit = OutputUnit {
            identifier: id.clone(),
            date: None,
            title_eng: format!("{}-{}", english_part(anchor_title), label),
            title_ara: format!("{}-{}", label, arabic_part(anchor_title)),
            pages,
        };

        let mut info = self.header("magazineInfo", MAGAZINE_INFO, scope, &vars, &id);
        let issue = info.push(XmlElement::new("issueInfo"));
        issue.push_text("issueNumber", scope.unit.value(self.field(FieldKey::IssueNumber)).trim());
        issue.push_text("Barcode_Number", &id);
        issue.push_text("issueDate", &date);
        issue.push_text("issueTitleENG", &unit.title_eng);
        issue.push_text("issueTitleARA", &unit.title_ara);
        issue.push_text("No_of_Pages", unit.pages.len().to_string());
        issue.push_text("Open_In_Viewer", self.viewer_link(&id));
        issue.push(file_ref("issueFile", format!("{id}.pdf"), PDF_FORMAT));
        issue.push(file_ref("issueMetadataFile", format!("{id}-mets.xml"), XML_FORMAT));

        let mut root = XmlElement::new("magazine");
        root.push(info);
        root.push(self.pages_element(&unit.pages, &vars));
        BuiltUnit {
            unit,
            document: root,
        }
    }

    /// One positive of an envelope. `scope.unit` is the positive, `scope.top`
    /// the envelope. The document is named after its first image.
    pub fn positive(
        &self,
        scope: &UnitScope<'a>,
        envelope_id: &str,
        pages: Vec<PageEntry>,
        catalog: &PageCatalog,
    ) -> BuiltUnit {
        let vars = self.replacer(scope);
        let backprint = resolve_field(
            scope.unit,
            &[],
            self.field(FieldKey::Backprint),
            false,
            Some(vars.replace_opt(self.constants.get(ConstKey::Backprint)).as_str()),
        );
        let identifier = pages
            .first()
            .map(|p| p.export_name.clone())
            .unwrap_or_else(|| envelope_id.to_string());
        let title = scope.unit.value(self.field(FieldKey::TitleLabel)).trim();
        let unit = OutputUnit {
            identifier,
            date: None,
            title_eng: english_part(title),
            title_ara: arabic_part(title),
            pages,
        };

        let mut root = XmlElement::new("Envelope");
        root.push(self.header("envelopeInfo", ENVELOPE_INFO, scope, &vars, envelope_id));
        root.push(self.images_element(&unit.pages, catalog, Some(&backprint), &vars));
        BuiltUnit {
            unit,
            document: root,
        }
    }

    /// A whole negative strip.
    pub fn negative(
        &self,
        scope: &UnitScope<'a>,
        pages: Vec<PageEntry>,
        catalog: &PageCatalog,
    ) -> BuiltUnit {
        let vars = self.replacer(scope);
        let id = scope.unit.value(self.field(FieldKey::Identifier)).trim().to_string();
        let title = scope.unit.value(self.field(FieldKey::TitleLabel)).trim();
        let unit = OutputUnit {
            identifier: id.clone(),
            date: None,
            title_eng: english_part(title),
            title_ara: arabic_part(title),
            pages,
        };

        let mut root = XmlElement::new("Negative");
        root.push(self.header("negativeInfo", NEGATIVE_INFO, scope, &vars, &id));
        root.push(self.images_element(&unit.pages, catalog, None, &vars));
        BuiltUnit {
            unit,
            document: root,
        }
    }

    /// A single slide.
    pub fn slide(&self, scope: &UnitScope<'a>, pages: Vec<PageEntry>) -> BuiltUnit {
        let vars = self.replacer(scope);
        let unit = self.single_image_unit(scope, pages);

        let mut root = XmlElement::new("image");
        root.push(self.header("SlideInfo", SLIDE_INFO, scope, &vars, &unit.identifier));
        if let Some(page) = unit.pages.first() {
            root.push(self.master(page, &vars));
        }
        BuiltUnit {
            unit,
            document: root,
        }
    }

    /// A generic image record. `merged_text` is true when the unit's OCR
    /// text files were merged into `{id}.txt`.
    pub fn generic(
        &self,
        scope: &UnitScope<'a>,
        pages: Vec<PageEntry>,
        merged_text: bool,
    ) -> BuiltUnit {
        let vars = self.replacer(scope);
        let unit = self.single_image_unit(scope, pages);

        let mut root = XmlElement::new("image");
        root.push(self.header("ImageInfo", GENERIC_INFO, scope, &vars, &unit.identifier));
        let files = root.push(XmlElement::new("Files"));
        if let Some(page) = unit.pages.first() {
            files.push(self.master(page, &vars));
        }
        if merged_text {
            files.push(file_ref("text", format!("{}.txt", unit.identifier), TEXT_FORMAT));
        }
        BuiltUnit {
            unit,
            document: root,
        }
    }

    fn single_image_unit(&self, scope: &UnitScope<'a>, pages: Vec<PageEntry>) -> OutputUnit {
        let title = scope.unit.value(self.field(FieldKey::TitleLabel)).trim();
        OutputUnit {
            identifier: scope.unit.value(self.field(FieldKey::Identifier)).trim().to_string(),
            date: None,
            title_eng: english_part(title),
            title_ara: arabic_part(title),
            pages,
        }
    }
}

// =============================================================================
// Free helpers
// =============================================================================

/// `0001` for the first page.
pub fn page_number(index: usize) -> String {
    format!("{:04}", index + 1)
}

/// Element naming a file, with its mime type in `Format`.
pub fn file_ref(name: &str, file: impl Into<String>, format: &str) -> XmlElement {
    XmlElement::text_element(name, file).with_attr("Format", format)
}

/// `Technical_Notes` from the process journal's user entries.
pub fn technical_notes(tree: &DocumentTree) -> XmlElement {
    let mut notes = XmlElement::new("Technical_Notes");
    for entry in tree
        .process
        .journal
        .iter()
        .filter(|e| e.kind == JournalKind::User)
    {
        notes.push(
            XmlElement::text_element("Entry", entry.content.as_str())
                .with_attr("date", entry.date.as_str())
                .with_attr("type", entry.kind.title()),
        );
    }
    if notes.children.is_empty() {
        notes.set_text(NO_JOURNAL_ENTRY);
    }
    notes
}

/// Renumber `Pages/Page pg` 1-based and update `No_of_Pages`. Returns the
/// page count.
pub fn renumber_pages(document: &mut XmlElement) -> usize {
    let mut count = 0;
    if let Some(pages) = document.find_mut(&|e: &XmlElement| e.local_name() == "Pages") {
        for (i, page) in pages
            .elements_mut()
            .filter(|e| e.local_name() == "Page")
            .enumerate()
        {
            page.set_attr("pg", page_number(i));
            count = i + 1;
        }
    }
    if let Some(total) = document.find_mut(&|e: &XmlElement| e.local_name() == "No_of_Pages") {
        total.set_text(count.to_string());
    }
    count
}
