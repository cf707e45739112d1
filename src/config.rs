//! Export configuration.
//!
//! Handles loading, validating, and merging `export.toml`. Stock defaults are
//! overridden by the user's file; the user file only needs the keys it wants
//! to change.
//!
//! ## Configuration Options
//!
//! ```toml
//! # All options are optional - defaults shown below
//!
//! viewer_url = "https://viewer.example.org"
//! mets_resolver_url = "https://viewer.example.org/metsresolver?id="
//! pi_resolver_url = "https://viewer.example.org/piresolver?id="
//! mets_url = "https://viewer.example.org/metsresolver?id="
//! add_file_extension = true
//! media_base_path = "file:///opt/digiverso/viewer/media/"
//!
//! [types]
//! issue = "NewspaperIssue"          # Logical type of one dated issue
//! supplement = "NewspaperSupplement"
//!
//! [fields]
//! identifier = "CatalogIDDigital"   # Metadata field holding unit identifiers
//! issue_date = "DateIssued"
//!
//! [constants]
//! rights_to_use = "${meta.AccessLicense}"
//! source_organisation = "National Archive"
//!
//! [variants.newspaper]
//! target_directory = "output/newspapers"
//! pdf_copy_directory = "output/pdf"
//! on_missing_image = "skip_unit"    # or "abort_export"
//!
//! [dispatch]
//! newspaper = ["Newspaper", "NewspaperVolume"]
//! delegate_unknown = false
//! ```
//!
//! ## Constants and Placeholders
//!
//! Every value in `[constants]` and `[mets]` may contain `${...}` tokens.
//! They are resolved per unit by [`crate::vars::VariableReplacer`], so one
//! configuration serves every document. Per-variant `[variants.X.constants]`
//! override the global table field by field.
//!
//! Unknown keys are rejected to catch typos early.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// File name looked up when [`load_config`] is handed a directory.
pub const CONFIG_FILE_NAME: &str = "export.toml";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("TOML serialize error: {0}")]
    TomlSer(#[from] toml::ser::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
}

/// One export pipeline. Each document is routed to exactly one of these.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Variant {
    Newspaper,
    Magazine,
    Positive,
    Negative,
    Slide,
    Generic,
}

impl Variant {
    pub const ALL: [Variant; 6] = [
        Variant::Newspaper,
        Variant::Magazine,
        Variant::Positive,
        Variant::Negative,
        Variant::Slide,
        Variant::Generic,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Variant::Newspaper => "newspaper",
            Variant::Magazine => "magazine",
            Variant::Positive => "positive",
            Variant::Negative => "negative",
            Variant::Slide => "slide",
            Variant::Generic => "generic",
        }
    }
}

impl fmt::Display for Variant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// What happens when a referenced page image cannot be probed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissingImagePolicy {
    /// The whole invocation fails; nothing is committed.
    AbortExport,
    /// The unit is dropped with a problem message; siblings continue.
    SkipUnit,
}

/// Export configuration loaded from `export.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ExportConfig {
    /// Base URL of the presentation viewer.
    pub viewer_url: String,
    /// Prefix for links to per-issue METS files.
    pub mets_resolver_url: String,
    /// Prefix for persistent identifiers written into `purl` back-fill.
    pub pi_resolver_url: String,
    /// Prefix for links from child METS files back to their parents.
    pub mets_url: String,
    /// Append `.xml` to resolver links.
    pub add_file_extension: bool,
    /// Base location declared in METS file groups. Must end with `/`.
    pub media_base_path: String,
    pub types: TypeNames,
    pub fields: FieldNames,
    pub constants: Constants,
    pub variants: Variants,
    pub dispatch: DispatchConfig,
    pub mets: MetsConfig,
    pub sources: SourceLayout,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            viewer_url: "https://viewer.example.org".to_string(),
            mets_resolver_url: "https://viewer.example.org/metsresolver?id=".to_string(),
            pi_resolver_url: "https://viewer.example.org/piresolver?id=".to_string(),
            mets_url: "https://viewer.example.org/metsresolver?id=".to_string(),
            add_file_extension: true,
            media_base_path: "file:///opt/digiverso/viewer/media/".to_string(),
            types: TypeNames::default(),
            fields: FieldNames::default(),
            constants: Constants::default(),
            variants: Variants::default(),
            dispatch: DispatchConfig::default(),
            mets: MetsConfig::default(),
            sources: SourceLayout::default(),
        }
    }
}

impl ExportConfig {
    /// Validate values that serde cannot check on its own.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.media_base_path.ends_with('/') {
            return Err(ConfigError::Validation(
                "media_base_path must end with '/'".into(),
            ));
        }
        for variant in Variant::ALL {
            let vc = self.variants.get(variant);
            if let Some(width) = vc.pad_width
                && !(1..=9).contains(&width)
            {
                return Err(ConfigError::Validation(format!(
                    "variants.{variant}.pad_width must be 1-9"
                )));
            }
            if vc.target_directory.as_os_str().is_empty() {
                return Err(ConfigError::Validation(format!(
                    "variants.{variant}.target_directory must not be empty"
                )));
            }
        }
        let mut seen: Vec<(&str, Variant)> = Vec::new();
        for variant in Variant::ALL {
            for tag in self.dispatch.tags(variant) {
                if let Some((_, other)) = seen.iter().find(|(t, _)| *t == tag.as_str()) {
                    return Err(ConfigError::Validation(format!(
                        "dispatch type '{tag}' is routed to both {other} and {variant}"
                    )));
                }
                seen.push((tag.as_str(), variant));
            }
        }
        Ok(())
    }

    /// Global constants with the variant's overrides applied.
    pub fn constants_for(&self, variant: Variant) -> Constants {
        self.constants.overlay(&self.variants.get(variant).constants)
    }

    /// The variant a logical type tag is routed to, if any.
    pub fn variant_for_type(&self, type_tag: &str) -> Option<Variant> {
        Variant::ALL
            .into_iter()
            .find(|v| self.dispatch.tags(*v).iter().any(|t| t == type_tag))
    }
}

/// Logical structure type names the pipeline looks for.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TypeNames {
    pub issue: String,
    pub supplement: String,
    pub year: String,
    pub month: String,
    pub day: String,
}

impl Default for TypeNames {
    fn default() -> Self {
        Self {
            issue: "NewspaperIssue".to_string(),
            supplement: "NewspaperSupplement".to_string(),
            year: "Year".to_string(),
            month: "Month".to_string(),
            day: "Day".to_string(),
        }
    }
}

/// Metadata field names, resolved once at load time.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FieldNames {
    pub identifier: String,
    pub title_label: String,
    pub main_title: String,
    pub issue_date: String,
    pub issue_number: String,
    pub sort_number: String,
    pub language: String,
    pub location: String,
    pub access_condition: String,
    pub zdb_id_analog: String,
    pub zdb_id_digital: String,
    pub purl: String,
    pub resource_type: String,
    pub anchor_id: String,
    pub anchor_title: String,
    pub publication_year: String,
    pub backprint: String,
    pub access_condition_use: String,
    pub access_condition_details: String,
    pub frequency: String,
    pub date_of_origin: String,
}

impl Default for FieldNames {
    fn default() -> Self {
        Self {
            identifier: "CatalogIDDigital".to_string(),
            title_label: "TitleDocMain".to_string(),
            main_title: "MainTitle".to_string(),
            issue_date: "DateIssued".to_string(),
            issue_number: "CurrentNo".to_string(),
            sort_number: "CurrentNoSorting".to_string(),
            language: "DocLanguage".to_string(),
            location: "PhysicalLocation".to_string(),
            access_condition: "AccessLicense".to_string(),
            zdb_id_analog: "ZDBIDAnalog".to_string(),
            zdb_id_digital: "ZDBIDDigital".to_string(),
            purl: "_purl".to_string(),
            resource_type: "TypeOfResource".to_string(),
            anchor_id: "AnchorID".to_string(),
            anchor_title: "AnchorTitle".to_string(),
            publication_year: "PublicationYear".to_string(),
            backprint: "AdmBackprint".to_string(),
            access_condition_use: "AccessConditionUse".to_string(),
            access_condition_details: "AccessConditionDetails".to_string(),
            frequency: "Frequency".to_string(),
            date_of_origin: "DateOfOrigin".to_string(),
        }
    }
}

/// Names of the configurable metadata fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKey {
    Identifier,
    TitleLabel,
    MainTitle,
    IssueDate,
    IssueNumber,
    SortNumber,
    Language,
    Location,
    AccessCondition,
    ZdbIdAnalog,
    ZdbIdDigital,
    Purl,
    ResourceType,
    AnchorId,
    AnchorTitle,
    PublicationYear,
    Backprint,
    AccessConditionUse,
    AccessConditionDetails,
    Frequency,
    DateOfOrigin,
}

impl FieldNames {
    /// The metadata field name configured for `key`.
    pub fn name(&self, key: FieldKey) -> &str {
        match key {
            FieldKey::Identifier => &self.identifier,
            FieldKey::TitleLabel => &self.title_label,
            FieldKey::MainTitle => &self.main_title,
            FieldKey::IssueDate => &self.issue_date,
            FieldKey::IssueNumber => &self.issue_number,
            FieldKey::SortNumber => &self.sort_number,
            FieldKey::Language => &self.language,
            FieldKey::Location => &self.location,
            FieldKey::AccessCondition => &self.access_condition,
            FieldKey::ZdbIdAnalog => &self.zdb_id_analog,
            FieldKey::ZdbIdDigital => &self.zdb_id_digital,
            FieldKey::Purl => &self.purl,
            FieldKey::ResourceType => &self.resource_type,
            FieldKey::AnchorId => &self.anchor_id,
            FieldKey::AnchorTitle => &self.anchor_title,
            FieldKey::PublicationYear => &self.publication_year,
            FieldKey::Backprint => &self.backprint,
            FieldKey::AccessConditionUse => &self.access_condition_use,
            FieldKey::AccessConditionDetails => &self.access_condition_details,
            FieldKey::Frequency => &self.frequency,
            FieldKey::DateOfOrigin => &self.date_of_origin,
        }
    }
}

/// Names of the configurable constants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConstKey {
    RightsToUse,
    RightsDetails,
    Source,
    MediaType,
    MediaGroup,
    SourceOrganisation,
    Frequency,
    CapturingDevice,
    EnvelopeNumber,
    EventDate,
    EventTime,
    EventName,
    Subject,
    SubjectEng,
    SubjectAra,
    Photographer,
    PersonsInImage,
    Locations,
    Description,
    EditorInChief,
    Format,
    Backprint,
}

/// Institution constants written into unit headers. Unset means empty.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Constants {
    pub rights_to_use: Option<String>,
    pub rights_details: Option<String>,
    pub source: Option<String>,
    pub media_type: Option<String>,
    pub media_group: Option<String>,
    pub source_organisation: Option<String>,
    pub frequency: Option<String>,
    pub capturing_device: Option<String>,
    pub envelope_number: Option<String>,
    pub event_date: Option<String>,
    pub event_time: Option<String>,
    pub event_name: Option<String>,
    pub subject: Option<String>,
    pub subject_eng: Option<String>,
    pub subject_ara: Option<String>,
    pub photographer: Option<String>,
    pub persons_in_image: Option<String>,
    pub locations: Option<String>,
    pub description: Option<String>,
    pub editor_in_chief: Option<String>,
    pub format: Option<String>,
    pub backprint: Option<String>,
}

impl Constants {
    pub fn get(&self, key: ConstKey) -> Option<&str> {
        let slot = match key {
            ConstKey::RightsToUse => &self.rights_to_use,
            ConstKey::RightsDetails => &self.rights_details,
            ConstKey::Source => &self.source,
            ConstKey::MediaType => &self.media_type,
            ConstKey::MediaGroup => &self.media_group,
            ConstKey::SourceOrganisation => &self.source_organisation,
            ConstKey::Frequency => &self.frequency,
            ConstKey::CapturingDevice => &self.capturing_device,
            ConstKey::EnvelopeNumber => &self.envelope_number,
            ConstKey::EventDate => &self.event_date,
            ConstKey::EventTime => &self.event_time,
            ConstKey::EventName => &self.event_name,
            ConstKey::Subject => &self.subject,
            ConstKey::SubjectEng => &self.subject_eng,
            ConstKey::SubjectAra => &self.subject_ara,
            ConstKey::Photographer => &self.photographer,
            ConstKey::PersonsInImage => &self.persons_in_image,
            ConstKey::Locations => &self.locations,
            ConstKey::Description => &self.description,
            ConstKey::EditorInChief => &self.editor_in_chief,
            ConstKey::Format => &self.format,
            ConstKey::Backprint => &self.backprint,
        };
        slot.as_deref()
    }

    /// Field-by-field overlay: values set in `over` win.
    pub fn overlay(&self, over: &Constants) -> Constants {
        fn pick(base: &Option<String>, over: &Option<String>) -> Option<String> {
            over.clone().or_else(|| base.clone())
        }
        Constants {
            rights_to_use: pick(&self.rights_to_use, &over.rights_to_use),
            rights_details: pick(&self.rights_details, &over.rights_details),
            source: pick(&self.source, &over.source),
            media_type: pick(&self.media_type, &over.media_type),
            media_group: pick(&self.media_group, &over.media_group),
            source_organisation: pick(&self.source_organisation, &over.source_organisation),
            frequency: pick(&self.frequency, &over.frequency),
            capturing_device: pick(&self.capturing_device, &over.capturing_device),
            envelope_number: pick(&self.envelope_number, &over.envelope_number),
            event_date: pick(&self.event_date, &over.event_date),
            event_time: pick(&self.event_time, &over.event_time),
            event_name: pick(&self.event_name, &over.event_name),
            subject: pick(&self.subject, &over.subject),
            subject_eng: pick(&self.subject_eng, &over.subject_eng),
            subject_ara: pick(&self.subject_ara, &over.subject_ara),
            photographer: pick(&self.photographer, &over.photographer),
            persons_in_image: pick(&self.persons_in_image, &over.persons_in_image),
            locations: pick(&self.locations, &over.locations),
            description: pick(&self.description, &over.description),
            editor_in_chief: pick(&self.editor_in_chief, &over.editor_in_chief),
            format: pick(&self.format, &over.format),
            backprint: pick(&self.backprint, &over.backprint),
        }
    }
}

/// Per-variant output settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct VariantConfig {
    /// Folder receiving the committed files.
    pub target_directory: PathBuf,
    /// Optional second folder receiving a copy of every PDF.
    pub pdf_copy_directory: Option<PathBuf>,
    /// Override for the counter width of generated export names.
    pub pad_width: Option<usize>,
    /// Override for the first counter value.
    pub counter_origin: Option<u32>,
    /// Override for the variant's missing-image behavior.
    pub on_missing_image: Option<MissingImagePolicy>,
    pub constants: Constants,
}

impl VariantConfig {
    fn with_target(dir: &str) -> Self {
        Self {
            target_directory: PathBuf::from(dir),
            ..Self::default()
        }
    }
}

impl Default for VariantConfig {
    fn default() -> Self {
        Self {
            target_directory: PathBuf::from("output"),
            pdf_copy_directory: None,
            pad_width: None,
            counter_origin: None,
            on_missing_image: None,
            constants: Constants::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Variants {
    pub newspaper: VariantConfig,
    pub magazine: VariantConfig,
    pub positive: VariantConfig,
    pub negative: VariantConfig,
    pub slide: VariantConfig,
    pub generic: VariantConfig,
}

impl Default for Variants {
    fn default() -> Self {
        Self {
            newspaper: VariantConfig::with_target("output/newspapers"),
            magazine: VariantConfig::with_target("output/magazines"),
            positive: VariantConfig::with_target("output/positives"),
            negative: VariantConfig::with_target("output/negatives"),
            slide: VariantConfig::with_target("output/slides"),
            generic: VariantConfig::with_target("output/generic"),
        }
    }
}

impl Variants {
    pub fn get(&self, variant: Variant) -> &VariantConfig {
        match variant {
            Variant::Newspaper => &self.newspaper,
            Variant::Magazine => &self.magazine,
            Variant::Positive => &self.positive,
            Variant::Negative => &self.negative,
            Variant::Slide => &self.slide,
            Variant::Generic => &self.generic,
        }
    }

    pub fn get_mut(&mut self, variant: Variant) -> &mut VariantConfig {
        match variant {
            Variant::Newspaper => &mut self.newspaper,
            Variant::Magazine => &mut self.magazine,
            Variant::Positive => &mut self.positive,
            Variant::Negative => &mut self.negative,
            Variant::Slide => &mut self.slide,
            Variant::Generic => &mut self.generic,
        }
    }
}

/// Routing from logical type tags to variants.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DispatchConfig {
    pub newspaper: Vec<String>,
    pub magazine: Vec<String>,
    pub positive: Vec<String>,
    pub negative: Vec<String>,
    pub slide: Vec<String>,
    pub generic: Vec<String>,
    /// Hand unrecognized types to the delegated default exporter instead
    /// of failing.
    pub delegate_unknown: bool,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        let tags = |t: &[&str]| t.iter().map(|s| s.to_string()).collect();
        Self {
            newspaper: tags(&["Newspaper", "NewspaperVolume"]),
            magazine: tags(&["Periodical", "PeriodicalVolume"]),
            positive: tags(&["AdmPositiveEnvelope"]),
            negative: tags(&["AdmNegative"]),
            slide: tags(&["AdmSlide"]),
            generic: tags(&["AdmGeneric"]),
            delegate_unknown: false,
        }
    }
}

impl DispatchConfig {
    pub fn tags(&self, variant: Variant) -> &[String] {
        match variant {
            Variant::Newspaper => &self.newspaper,
            Variant::Magazine => &self.magazine,
            Variant::Positive => &self.positive,
            Variant::Negative => &self.negative,
            Variant::Slide => &self.slide,
            Variant::Generic => &self.generic,
        }
    }
}

/// Administrative strings written into METS headers.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MetsConfig {
    pub rights_owner: Option<String>,
    pub rights_owner_logo: Option<String>,
    pub rights_owner_site_url: Option<String>,
    pub rights_owner_contact: Option<String>,
    pub license: Option<String>,
    pub digiprov_presentation: Option<String>,
    pub digiprov_reference: Option<String>,
    pub digiprov_presentation_anchor: Option<String>,
    pub digiprov_reference_anchor: Option<String>,
}

/// Folder layout of the process being exported, relative to its root.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SourceLayout {
    /// Master images.
    pub images: PathBuf,
    /// ALTO OCR files, one `.xml` per page.
    pub alto: PathBuf,
    /// Plain text OCR files, one `.txt` per page.
    pub text: PathBuf,
    /// Per-page PDF files.
    pub pdf: PathBuf,
}

impl Default for SourceLayout {
    fn default() -> Self {
        Self {
            images: PathBuf::from("images/master"),
            alto: PathBuf::from("ocr/alto"),
            text: PathBuf::from("ocr/txt"),
            pdf: PathBuf::from("ocr/pdf"),
        }
    }
}

impl SourceLayout {
    /// Absolute source folders for a process rooted at `root`.
    pub fn resolve(&self, root: &Path) -> SourcePaths {
        SourcePaths {
            images: root.join(&self.images),
            alto: root.join(&self.alto),
            text: root.join(&self.text),
            pdf: root.join(&self.pdf),
        }
    }
}

/// Source folders of one process, resolved against its root.
#[derive(Debug, Clone, PartialEq)]
pub struct SourcePaths {
    pub images: PathBuf,
    pub alto: PathBuf,
    pub text: PathBuf,
    pub pdf: PathBuf,
}

// =============================================================================
// Config loading, merging, and validation
// =============================================================================

/// Returns the stock default config as a `toml::Value::Table`.
pub fn stock_defaults_value() -> Result<toml::Value, ConfigError> {
    Ok(toml::Value::try_from(ExportConfig::default())?)
}

/// Recursively merge `overlay` on top of `base`.
///
/// Tables merge key by key; any other overlay value replaces the base value.
pub fn merge_toml(base: toml::Value, overlay: toml::Value) -> toml::Value {
    match (base, overlay) {
        (toml::Value::Table(mut base_table), toml::Value::Table(overlay_table)) => {
            for (key, overlay_val) in overlay_table {
                let merged = match base_table.remove(&key) {
                    Some(base_val) => merge_toml(base_val, overlay_val),
                    None => overlay_val,
                };
                base_table.insert(key, merged);
            }
            toml::Value::Table(base_table)
        }
        (_, overlay) => overlay,
    }
}

/// Read a config file as a raw TOML value. `Ok(None)` when absent.
pub fn load_raw_config(path: &Path) -> Result<Option<toml::Value>, ConfigError> {
    if !path.exists() {
        return Ok(None);
    }
    let content = fs::read_to_string(path)?;
    let value: toml::Value = toml::from_str(&content)?;
    Ok(Some(value))
}

/// Load the export configuration.
///
/// `path` may be the file itself or a directory containing
/// [`CONFIG_FILE_NAME`]. A missing file yields the stock defaults.
pub fn load_config(path: &Path) -> Result<ExportConfig, ConfigError> {
    let file = if path.is_dir() {
        path.join(CONFIG_FILE_NAME)
    } else {
        path.to_path_buf()
    };
    let base = stock_defaults_value()?;
    let merged = match load_raw_config(&file)? {
        Some(overlay) => merge_toml(base, overlay),
        None => base,
    };
    let config: ExportConfig = merged.try_into()?;
    config.validate()?;
    Ok(config)
}

/// Returns a fully-commented stock `export.toml`.
///
/// Used by the `gen-config` CLI command.
pub fn stock_config_toml() -> &'static str {
    r##"# Archive Export Configuration
# ============================
# All settings are optional. Values shown are the defaults.
# Unknown keys will cause an error.
#
# Values under [constants] and [mets] may contain placeholders:
#   ${meta.Field}            metadata of the unit, then its ancestors
#   ${meta.topstruct.Field}  metadata of the top logical element
#   ${process.Name}          process property (Title and Id are built in)
#   ${env.NAME}              environment variable

# Base URL of the presentation viewer. Units link to {viewer_url}/image/{id}/
viewer_url = "https://viewer.example.org"

# Prefix of links pointing at per-issue METS files.
mets_resolver_url = "https://viewer.example.org/metsresolver?id="

# Prefix used when back-filling persistent URLs.
pi_resolver_url = "https://viewer.example.org/piresolver?id="

# Prefix of links from a METS file back to its parent file.
mets_url = "https://viewer.example.org/metsresolver?id="

# Append .xml to resolver links.
add_file_extension = true

# Base location declared for METS file groups (must end with '/').
media_base_path = "file:///opt/digiverso/viewer/media/"

# ---------------------------------------------------------------------------
# Logical structure types
# ---------------------------------------------------------------------------
[types]
issue = "NewspaperIssue"
supplement = "NewspaperSupplement"
year = "Year"
month = "Month"
day = "Day"

# ---------------------------------------------------------------------------
# Metadata field names
# ---------------------------------------------------------------------------
[fields]
identifier = "CatalogIDDigital"
title_label = "TitleDocMain"
main_title = "MainTitle"
issue_date = "DateIssued"
issue_number = "CurrentNo"
sort_number = "CurrentNoSorting"
language = "DocLanguage"
location = "PhysicalLocation"
access_condition = "AccessLicense"
zdb_id_analog = "ZDBIDAnalog"
zdb_id_digital = "ZDBIDDigital"
purl = "_purl"
resource_type = "TypeOfResource"
anchor_id = "AnchorID"
anchor_title = "AnchorTitle"
publication_year = "PublicationYear"
backprint = "AdmBackprint"
access_condition_use = "AccessConditionUse"
access_condition_details = "AccessConditionDetails"
frequency = "Frequency"
date_of_origin = "DateOfOrigin"

# ---------------------------------------------------------------------------
# Constants written into unit headers (all optional)
# ---------------------------------------------------------------------------
[constants]
# rights_to_use = "${meta.AccessLicense}"
# rights_details = ""
# source = "Printed newspaper"
# media_type = "Newspaper"
# media_group = "Print"
# source_organisation = "National Archive"
# frequency = "daily"
# capturing_device = "${process.Capturing device}"
# event_date = "${meta.AdmEventDate}"
# photographer = "${meta.AdmPhotographer}"

# ---------------------------------------------------------------------------
# Variants: output folders and behavior
# ---------------------------------------------------------------------------
# Counter widths default to 4 (newspaper, magazine), 3 (positive) and
# 7 (negative). Slides and generic images are named after the identifier.
# on_missing_image defaults to "skip_unit" for newspapers and
# "abort_export" for every other variant.
[variants.newspaper]
target_directory = "output/newspapers"
# pdf_copy_directory = "output/pdf"

[variants.magazine]
target_directory = "output/magazines"

[variants.positive]
target_directory = "output/positives"

[variants.negative]
target_directory = "output/negatives"

[variants.slide]
target_directory = "output/slides"

[variants.generic]
target_directory = "output/generic"

# ---------------------------------------------------------------------------
# Routing from logical type to variant
# ---------------------------------------------------------------------------
[dispatch]
newspaper = ["Newspaper", "NewspaperVolume"]
magazine = ["Periodical", "PeriodicalVolume"]
positive = ["AdmPositiveEnvelope"]
negative = ["AdmNegative"]
slide = ["AdmSlide"]
generic = ["AdmGeneric"]
# Hand other types to the default exporter instead of failing.
delegate_unknown = false

# ---------------------------------------------------------------------------
# METS administrative section (all optional)
# ---------------------------------------------------------------------------
[mets]
# rights_owner = "National Archive"
# rights_owner_logo = "https://example.org/logo.png"
# rights_owner_site_url = "https://example.org"
# rights_owner_contact = "archive@example.org"
# license = "CC0"
# digiprov_presentation = "https://viewer.example.org/image/${meta.CatalogIDDigital}/"
# digiprov_reference = ""

# ---------------------------------------------------------------------------
# Source folder layout, relative to the process root
# ---------------------------------------------------------------------------
[sources]
images = "images/master"
alto = "ocr/alto"
text = "ocr/txt"
pdf = "ocr/pdf"
"##
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn default_config_validates() {
        ExportConfig::default().validate().unwrap();
    }

    #[test]
    fn default_dispatch_routes_known_types() {
        let config = ExportConfig::default();
        assert_eq!(config.variant_for_type("NewspaperVolume"), Some(Variant::Newspaper));
        assert_eq!(config.variant_for_type("Periodical"), Some(Variant::Magazine));
        assert_eq!(config.variant_for_type("AdmSlide"), Some(Variant::Slide));
        assert_eq!(config.variant_for_type("Monograph"), None);
    }

    #[test]
    fn parse_partial_config() {
        let toml = r##"
viewer_url = "https://v.example"

[constants]
source_organisation = "Archive"

[variants.slide]
target_directory = "/srv/slides"
"##;
        let config: ExportConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.viewer_url, "https://v.example");
        assert_eq!(config.constants.source_organisation.as_deref(), Some("Archive"));
        assert_eq!(config.variants.slide.target_directory, PathBuf::from("/srv/slides"));
        // Defaults preserved
        assert_eq!(config.fields.identifier, "CatalogIDDigital");
        assert_eq!(config.variants.newspaper.target_directory, PathBuf::from("output/newspapers"));
    }

    #[test]
    fn unknown_keys_rejected() {
        let result: Result<ExportConfig, _> = toml::from_str("viewer = \"x\"");
        assert!(result.is_err());
    }

    #[test]
    fn variant_constants_override_globals() {
        let mut config = ExportConfig::default();
        config.constants.media_type = Some("Print".into());
        config.constants.source = Some("Archive".into());
        config.variants.slide.constants.media_type = Some("Slide".into());

        let slide = config.constants_for(Variant::Slide);
        assert_eq!(slide.get(ConstKey::MediaType), Some("Slide"));
        assert_eq!(slide.get(ConstKey::Source), Some("Archive"));

        let newspaper = config.constants_for(Variant::Newspaper);
        assert_eq!(newspaper.get(ConstKey::MediaType), Some("Print"));
    }

    #[test]
    fn validate_rejects_bad_media_base() {
        let mut config = ExportConfig::default();
        config.media_base_path = "file:///media".into();
        assert!(matches!(config.validate(), Err(ConfigError::Validation(_))));
    }

    #[test]
    fn validate_rejects_zero_pad_width() {
        let mut config = ExportConfig::default();
        config.variants.negative.pad_width = Some(0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_duplicate_dispatch_tag() {
        let mut config = ExportConfig::default();
        config.dispatch.slide.push("AdmGeneric".into());
        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("AdmGeneric"), "{err}");
    }

    // =========================================================================
    // merge / load tests
    // =========================================================================

    #[test]
    fn merge_toml_overlays_nested_tables() {
        let base: toml::Value = toml::from_str("[a]\nx = 1\ny = 2").unwrap();
        let overlay: toml::Value = toml::from_str("[a]\ny = 3").unwrap();
        let merged = merge_toml(base, overlay);
        assert_eq!(merged["a"]["x"].as_integer(), Some(1));
        assert_eq!(merged["a"]["y"].as_integer(), Some(3));
    }

    #[test]
    fn load_config_returns_default_when_no_file() {
        let tmp = TempDir::new().unwrap();
        let config = load_config(tmp.path()).unwrap();
        assert_eq!(config.types.issue, "NewspaperIssue");
    }

    #[test]
    fn load_config_reads_directory_file() {
        let tmp = TempDir::new().unwrap();
        fs::write(
            tmp.path().join(CONFIG_FILE_NAME),
            r##"
add_file_extension = false

[fields]
identifier = "Barcode"

[variants.negative]
pad_width = 5
on_missing_image = "skip_unit"
"##,
        )
        .unwrap();

        let config = load_config(tmp.path()).unwrap();
        assert!(!config.add_file_extension);
        assert_eq!(config.fields.identifier, "Barcode");
        assert_eq!(config.fields.issue_date, "DateIssued");
        assert_eq!(config.variants.negative.pad_width, Some(5));
        assert_eq!(
            config.variants.negative.on_missing_image,
            Some(MissingImagePolicy::SkipUnit)
        );
    }

    #[test]
    fn load_config_invalid_toml_errors() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("broken.toml");
        fs::write(&path, "viewer_url = ").unwrap();
        assert!(matches!(load_config(&path), Err(ConfigError::Toml(_))));
    }

    #[test]
    fn stock_config_parses_and_matches_defaults() {
        let config: ExportConfig = toml::from_str(stock_config_toml()).unwrap();
        let defaults = ExportConfig::default();
        assert_eq!(config.viewer_url, defaults.viewer_url);
        assert_eq!(config.media_base_path, defaults.media_base_path);
        assert_eq!(config.fields.frequency, defaults.fields.frequency);
        assert_eq!(config.dispatch.newspaper, defaults.dispatch.newspaper);
        assert_eq!(config.sources.pdf, defaults.sources.pdf);
    }

    #[test]
    fn field_keys_follow_configured_names() {
        let mut config = ExportConfig::default();
        config.fields.backprint = "Rueckseite".into();
        assert_eq!(config.fields.name(FieldKey::Backprint), "Rueckseite");
        assert_eq!(config.fields.name(FieldKey::IssueDate), "DateIssued");
    }

    #[test]
    fn source_layout_resolves_against_root() {
        let paths = SourceLayout::default().resolve(Path::new("/proc/7"));
        assert_eq!(paths.images, PathBuf::from("/proc/7/images/master"));
        assert_eq!(paths.text, PathBuf::from("/proc/7/ocr/txt"));
    }
}
