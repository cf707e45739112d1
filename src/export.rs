//! Export orchestration.
//!
//! One call to [`ExportOrchestrator::export`] takes one document tree from
//! dispatch to committed files:
//!
//! ```text
//! DocumentTree
//!     │ route(): type tag of the root, or of the only child of an anchor
//!     ▼
//! ┌────────────┬──────────┬──────────┬──────────┬───────┬─────────┬───────────┐
//! │ newspaper  │ magazine │ positive │ negative │ slide │ generic │ delegated │
//! └────────────┴──────────┴──────────┴──────────┴───────┴─────────┴───────────┘
//!     │ build unit documents → glue PDFs → copy renamed assets → METS
//!     ▼
//! Staging (inside the target folder) ──commit──▶ target folder ──▶ PDF copy
//! ```
//!
//! Everything is written into a [`Staging`] folder first. An error that
//! aborts the invocation drops the staging folder, so the target folder is
//! never left half-written. Problems that only cost one unit are collected
//! into [`ExportOutcome::problems`] and the rest of the export goes on.
//!
//! ## Failure policy
//!
//! | Failure | Effect |
//! |---------|--------|
//! | unknown type, `delegate_unknown = false` | invocation fails |
//! | missing or malformed issue date | invocation fails, nothing committed |
//! | missing page image | per variant `on_missing_image`: skip the unit or fail |
//! | per-issue METS failure | problem, other issues still emitted |
//! | newspaper PDF failure | problem, the issue's XML is still committed |
//! | anchor already lists the volume | no-op, success |
//!
//! The newspaper anchor is merged and the staging folder committed while
//! holding the [`AnchorLocks`] entry of the target anchor path.

use crate::anchor::{AnchorError, AnchorLocks, MergeOutcome, merge_files};
use crate::config::{ExportConfig, MissingImagePolicy, SourcePaths, Variant};
use crate::hierarchy::HierarchyError;
use crate::imaging::ImageProbe;
use crate::metadata::is_iso_date;
use crate::mets::{MetsError, MetsFileEmitter, record_documents};
use crate::naming::{FileNameMapper, NamingError, source_stem};
use crate::pdf::{PdfAssembler, PdfError};
use crate::storage::{Staging, Storage, StorageError, copy_mapped_assets};
use crate::supplement::{SupplementInput, derive_supplement, partition, pdfs_for, restrict_main};
use crate::tree::{DocumentTree, LogicalNode, PhysicalPage, TreeError};
use crate::types::PageEntry;
use crate::unit::{
    BuiltUnit, PageCatalog, UnitError, UnitPolicy, UnitScope, UnitXmlBuilder, unit_label,
};
use crate::xml::XmlError;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, error, info, warn};

#[derive(Error, Debug)]
pub enum ExportError {
    #[error("Unknown document type '{0}' and no default export configured")]
    UnknownType(String),
    #[error("Abort export, {0} has no publication date")]
    MissingDate(String),
    #[error(transparent)]
    InvalidDate(#[from] HierarchyError),
    #[error(transparent)]
    Unit(#[from] UnitError),
    #[error(transparent)]
    Mets(#[from] MetsError),
    #[error(transparent)]
    Anchor(#[from] AnchorError),
    #[error(transparent)]
    Tree(#[from] TreeError),
    #[error(transparent)]
    Naming(#[from] NamingError),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Pdf(#[from] PdfError),
    #[error(transparent)]
    Xml(#[from] XmlError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("default export failed: {0}")]
    Delegate(String),
}

// =============================================================================
// Routing
// =============================================================================

/// Where a document goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Variant(Variant),
    /// Handed to the [`DefaultExporter`].
    Delegated,
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Route::Variant(v) => write!(f, "{v}"),
            Route::Delegated => f.write_str("delegated"),
        }
    }
}

/// The node whose type decides the route, with its ancestors nearest-first.
///
/// An anchor with exactly one child is looked through.
pub fn dispatch_node(tree: &DocumentTree) -> (&LogicalNode, Vec<&LogicalNode>) {
    let root = &tree.logical;
    match root.children.as_slice() {
        [only] if root.anchor => (only, vec![root]),
        _ => (root, Vec::new()),
    }
}

pub fn route(tree: &DocumentTree, config: &ExportConfig) -> Result<Route, ExportError> {
    let (node, _) = dispatch_node(tree);
    match config.variant_for_type(&node.doc_type) {
        Some(variant) => Ok(Route::Variant(variant)),
        None if config.dispatch.delegate_unknown => Ok(Route::Delegated),
        None => Err(ExportError::UnknownType(node.doc_type.clone())),
    }
}

// =============================================================================
// Delegated default export
// =============================================================================

/// The regular export of a whole record, used for unknown types and as
/// the first step of the magazine export.
pub trait DefaultExporter: Sync {
    /// Write `{title}.xml` (and `{title}_anchor.xml` for anchored records)
    /// into `dest`; return the written paths.
    fn export(
        &self,
        tree: &DocumentTree,
        config: &ExportConfig,
        dest: &Path,
    ) -> Result<Vec<PathBuf>, ExportError>;
}

/// Writes plain METS record files via [`record_documents`].
#[derive(Debug, Default, Clone, Copy)]
pub struct MetsRecordExporter;

impl DefaultExporter for MetsRecordExporter {
    fn export(
        &self,
        tree: &DocumentTree,
        config: &ExportConfig,
        dest: &Path,
    ) -> Result<Vec<PathBuf>, ExportError> {
        let title = tree.process.title.trim();
        if title.is_empty() {
            return Err(ExportError::Delegate("process has no title".into()));
        }
        let (record, anchor) = record_documents(tree, config);
        let mut written = Vec::new();
        let path = dest.join(format!("{title}.xml"));
        fs::write(&path, record.to_xml_string()?)?;
        written.push(path);
        if let Some(anchor) = anchor {
            let path = dest.join(format!("{title}_anchor.xml"));
            fs::write(&path, anchor.to_xml_string()?)?;
            written.push(path);
        }
        debug!(files = written.len(), "wrote record METS");
        Ok(written)
    }
}

// =============================================================================
// Orchestrator
// =============================================================================

/// Collaborators and settings of one export invocation.
pub struct ExportContext<'a> {
    pub config: &'a ExportConfig,
    pub sources: SourcePaths,
    pub probe: &'a dyn ImageProbe,
    pub pdf: &'a dyn PdfAssembler,
    pub storage: &'a dyn Storage,
    pub delegate: &'a dyn DefaultExporter,
    pub anchor_locks: &'a AnchorLocks,
}

/// Result of one invocation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExportOutcome {
    /// `true` when nothing went wrong at all.
    pub success: bool,
    pub route: Option<Route>,
    pub committed: Vec<PathBuf>,
    pub problems: Vec<String>,
}

#[derive(Debug, Default)]
struct Problems(Vec<String>);

impl Problems {
    fn report(&mut self, unit: &str, message: impl fmt::Display) {
        warn!(unit, "{message}");
        self.0.push(format!("{unit}: {message}"));
    }

    /// For errors whose message already names the unit.
    fn note(&mut self, error: impl fmt::Display) {
        let message = error.to_string();
        warn!("{message}");
        self.0.push(message);
    }
}

pub struct ExportOrchestrator<'a> {
    ctx: ExportContext<'a>,
}

impl<'a> ExportOrchestrator<'a> {
    pub fn new(ctx: ExportContext<'a>) -> Self {
        Self { ctx }
    }

    /// Run the export of `tree`. Never panics on bad input; every failure
    /// ends up in the outcome's problem list.
    pub fn export(&self, tree: &DocumentTree) -> ExportOutcome {
        let route = match route(tree, self.ctx.config) {
            Ok(route) => route,
            Err(e) => {
                error!(error = %e, "cannot dispatch document");
                return ExportOutcome {
                    problems: vec![e.to_string()],
                    ..ExportOutcome::default()
                };
            }
        };
        info!(%route, process = %tree.process.title, "exporting");

        let mut problems = Problems::default();
        let result = match route {
            Route::Variant(Variant::Newspaper) => self.newspaper(tree, &mut problems),
            Route::Variant(Variant::Magazine) => self.magazine(tree, &mut problems),
            Route::Variant(Variant::Positive) => self.positive(tree, &mut problems),
            Route::Variant(Variant::Negative) => self.negative(tree, &mut problems),
            Route::Variant(Variant::Slide) => self.slide(tree, &mut problems),
            Route::Variant(Variant::Generic) => self.generic(tree, &mut problems),
            Route::Delegated => self.delegated(tree),
        };
        match result {
            Ok(committed) => {
                info!(%route, files = committed.len(), problems = problems.0.len(), "export finished");
                ExportOutcome {
                    success: problems.0.is_empty(),
                    route: Some(route),
                    committed,
                    problems: problems.0,
                }
            }
            Err(e) => {
                error!(%route, error = %e, "export aborted");
                problems.0.push(e.to_string());
                ExportOutcome {
                    success: false,
                    route: Some(route),
                    committed: Vec::new(),
                    problems: problems.0,
                }
            }
        }
    }

    fn builder<'t>(&'t self, tree: &'t DocumentTree, variant: Variant) -> UnitXmlBuilder<'t> {
        UnitXmlBuilder::new(
            tree,
            self.ctx.config,
            variant,
            self.ctx.probe,
            self.ctx.storage,
            &self.ctx.sources,
        )
    }

    fn staging(&self, variant: Variant) -> Result<Staging, ExportError> {
        Ok(Staging::new(&self.ctx.config.variants.get(variant).target_directory)?)
    }

    fn identifier(&self, node: &LogicalNode) -> String {
        node.value(&self.ctx.config.fields.identifier).trim().to_string()
    }

    /// Pages of `node`, or `None` when the unit is skipped under its policy.
    fn collect_or_skip(
        &self,
        builder: &UnitXmlBuilder<'_>,
        node: &LogicalNode,
        catalog: &mut PageCatalog,
        problems: &mut Problems,
    ) -> Result<Option<Vec<PageEntry>>, ExportError> {
        match builder.collect_pages(node, catalog) {
            Ok(pages) => Ok(Some(pages)),
            Err(e) => match builder.policy().on_missing_image {
                MissingImagePolicy::SkipUnit => {
                    match &e {
                        UnitError::Probe { .. } => problems.note(&e),
                        _ => problems.report(&unit_label(node, &self.ctx.config.fields), &e),
                    }
                    Ok(None)
                }
                MissingImagePolicy::AbortExport => Err(e.into()),
            },
        }
    }

    /// Stage the unit document and, when per-page PDFs exist, its PDF.
    fn stage_unit(
        &self,
        staging: &Staging,
        built: &BuiltUnit,
        pdf_files: &[PathBuf],
    ) -> Result<(), ExportError> {
        staging.write(&built.xml_file_name(), built.document.to_xml_string()?)?;
        if pdf_files.is_empty() {
            debug!(unit = %built.unit.identifier, "no per-page PDFs, skipping PDF");
            return Ok(());
        }
        let output = staging.file(&format!("{}.pdf", built.unit.file_base()));
        self.ctx.pdf.glue(pdf_files, &output)?;
        Ok(())
    }

    /// Copy the mapped master images and the requested OCR files.
    fn copy_assets(
        &self,
        staging: &Staging,
        mapper: &FileNameMapper,
        alto: bool,
        text: bool,
    ) -> Result<(), ExportError> {
        let sources = &self.ctx.sources;
        let mut kinds = vec![(&sources.images, "tif")];
        if alto {
            kinds.push((&sources.alto, "xml"));
        }
        if text {
            kinds.push((&sources.text, "txt"));
        }
        for (dir, ext) in kinds {
            copy_mapped_assets(self.ctx.storage, dir, ext, mapper, staging.path())?;
        }
        Ok(())
    }

    /// Commit the staging folder, then copy committed PDFs to the
    /// variant's PDF copy folder.
    fn finalize(&self, staging: Staging, variant: Variant) -> Result<Vec<PathBuf>, ExportError> {
        let committed = staging.commit(self.ctx.storage)?;
        if let Some(dir) = &self.ctx.config.variants.get(variant).pdf_copy_directory {
            for pdf in committed
                .iter()
                .filter(|p| p.extension().is_some_and(|e| e == "pdf"))
            {
                if let Some(name) = pdf.file_name() {
                    self.ctx.storage.copy(pdf, &dir.join(name))?;
                    debug!(pdf = %pdf.display(), dir = %dir.display(), "copied PDF");
                }
            }
        }
        Ok(committed)
    }

    // -------------------------------------------------------------------------
    // Newspaper
    // -------------------------------------------------------------------------

    fn newspaper(&self, tree: &DocumentTree, problems: &mut Problems) -> Result<Vec<PathBuf>, ExportError> {
        let config = self.ctx.config;
        let fields = &config.fields;
        let anchor = &tree.logical;
        if !anchor.anchor {
            return Err(MetsError::NotAnAnchor(anchor.doc_type.clone()).into());
        }
        let volume = anchor
            .children
            .first()
            .ok_or_else(|| MetsError::NoVolume(anchor.describe()))?;
        let volume_id = self.identifier(volume);
        let issues: Vec<&LogicalNode> = volume
            .children
            .iter()
            .filter(|c| c.doc_type == config.types.issue)
            .collect();
        for issue in &issues {
            let date = issue.value(&fields.issue_date).trim();
            if date.is_empty() {
                return Err(ExportError::MissingDate(issue.describe()));
            }
            if !is_iso_date(date) {
                return Err(HierarchyError::InvalidDate(date.to_string()).into());
            }
        }

        let staging = self.staging(Variant::Newspaper)?;
        let builder = self.builder(tree, Variant::Newspaper);
        let mut catalog = builder.catalog(&volume_id);
        let pdf_pool = self.ctx.storage.list(&self.ctx.sources.pdf)?;

        let mut skipped = Vec::new();
        for issue in issues {
            let Some(pages) = self.collect_or_skip(&builder, issue, &mut catalog, problems)? else {
                skipped.push(issue);
                continue;
            };
            let mut inputs = Vec::new();
            for supplement in issue
                .children
                .iter()
                .filter(|c| c.doc_type == config.types.supplement)
            {
                if let Some(pages) = self.collect_or_skip(&builder, supplement, &mut catalog, problems)? {
                    inputs.push(SupplementInput {
                        label: supplement.value(&fields.title_label).trim().to_string(),
                        pages,
                    });
                }
            }

            let scope = UnitScope::new(issue, vec![volume, anchor], anchor);
            let mut main = builder.newspaper_issue(&scope, &volume_id, pages);
            let part = partition(&main.unit.pages, &inputs, &pdf_pool);
            let derived: Vec<(BuiltUnit, Vec<PathBuf>)> = part
                .supplements
                .iter()
                .filter(|g| !g.pages.is_empty())
                .map(|g| (derive_supplement(&main, g, &config.viewer_url), g.pdf_files.clone()))
                .collect();
            restrict_main(&mut main, part.main_pages);

            for (unit, pdfs) in std::iter::once((&main, &part.main_pdf_files))
                .chain(derived.iter().map(|(u, p)| (u, p)))
            {
                match self.stage_unit(&staging, unit, pdfs) {
                    Ok(()) => info!(unit = %unit.unit.file_base(), pages = unit.unit.pages.len(), "staged issue"),
                    Err(e @ ExportError::Pdf(_)) => problems.report(&unit.unit.file_base(), e),
                    Err(e) => return Err(e),
                }
            }
        }
        self.copy_assets(&staging, catalog.mapper(), true, true)?;

        let mets = MetsFileEmitter::new(tree, config)
            .skipping(skipped)
            .emit(catalog.mapper())?;
        problems.0.extend(mets.problems.iter().cloned());
        for file in mets.issues.iter().chain(std::iter::once(&mets.volume)) {
            staging.write(&file.name, file.document.to_xml_string()?)?;
        }

        let target_anchor = staging.target().join(&mets.anchor.name);
        self.ctx.anchor_locks.with_lock(&target_anchor, || {
            let staged = staging.write(&mets.anchor.name, mets.anchor.document.to_xml_string()?)?;
            if self.ctx.storage.exists(&target_anchor) {
                match merge_files(&target_anchor, &staged)? {
                    MergeOutcome::Merged { volumes } => {
                        info!(anchor = %mets.anchor.name, volumes, "merged into existing anchor")
                    }
                    MergeOutcome::AlreadyListed => {
                        info!(anchor = %mets.anchor.name, "volume already listed in anchor")
                    }
                }
                self.ctx.storage.delete(&staged)?;
            }
            self.finalize(staging, Variant::Newspaper)
        })
    }

    // -------------------------------------------------------------------------
    // Magazine
    // -------------------------------------------------------------------------

    fn magazine(&self, tree: &DocumentTree, problems: &mut Problems) -> Result<Vec<PathBuf>, ExportError> {
        let (volume, ancestors) = dispatch_node(tree);
        let id = self.identifier(volume);
        let staging = self.staging(Variant::Magazine)?;

        let written = self.ctx.delegate.export(tree, self.ctx.config, staging.path())?;
        let title = tree.process.title.trim();
        for path in written {
            let name = path.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default();
            let renamed = if name == format!("{title}.xml") {
                format!("{id}-mets.xml")
            } else if name == format!("{title}_anchor.xml") {
                format!("{id}-mets_anchor.xml")
            } else {
                continue;
            };
            self.ctx.storage.move_file(&path, &staging.file(&renamed))?;
            debug!(from = %name, to = %renamed, "renamed record METS");
        }

        let builder = self.builder(tree, Variant::Magazine);
        let mut catalog = builder.catalog(&id);
        if let Some(pages) = self.collect_or_skip(&builder, volume, &mut catalog, problems)? {
            let scope = UnitScope::new(volume, ancestors, &tree.logical);
            let built = builder.magazine(&scope, pages);
            let pool = self.ctx.storage.list(&self.ctx.sources.pdf)?;
            self.stage_unit(&staging, &built, &pdfs_for(&built.unit.pages, &pool))?;
            info!(unit = %id, pages = built.unit.pages.len(), "staged magazine");
        }
        self.copy_assets(&staging, catalog.mapper(), true, true)?;
        self.finalize(staging, Variant::Magazine)
    }

    // -------------------------------------------------------------------------
    // Photographic material
    // -------------------------------------------------------------------------

    fn positive(&self, tree: &DocumentTree, problems: &mut Problems) -> Result<Vec<PathBuf>, ExportError> {
        let (envelope, ancestors) = dispatch_node(tree);
        let envelope_id = self.identifier(envelope);
        let staging = self.staging(Variant::Positive)?;
        let builder = self.builder(tree, Variant::Positive);
        let mut catalog = builder.catalog(&envelope_id);

        if envelope.children.is_empty() {
            warn!(envelope = %envelope_id, "envelope has no positives");
        }
        let chain: Vec<&LogicalNode> = std::iter::once(envelope).chain(ancestors).collect();
        for positive in &envelope.children {
            let Some(pages) = self.collect_or_skip(&builder, positive, &mut catalog, problems)? else {
                continue;
            };
            let scope = UnitScope::new(positive, chain.clone(), &tree.logical);
            let built = builder.positive(&scope, &envelope_id, pages, &catalog);
            self.stage_unit(&staging, &built, &[])?;
            info!(unit = %built.unit.identifier, images = built.unit.pages.len(), "staged positive");
        }
        self.copy_assets(&staging, catalog.mapper(), false, true)?;
        self.finalize(staging, Variant::Positive)
    }

    fn negative(&self, tree: &DocumentTree, problems: &mut Problems) -> Result<Vec<PathBuf>, ExportError> {
        let (strip, ancestors) = dispatch_node(tree);
        let id = self.identifier(strip);
        let staging = self.staging(Variant::Negative)?;
        let builder = self.builder(tree, Variant::Negative);
        let mut catalog = builder.catalog(&id);

        if let Some(pages) = self.collect_or_skip(&builder, strip, &mut catalog, problems)? {
            let scope = UnitScope::new(strip, ancestors, &tree.logical);
            let built = builder.negative(&scope, pages, &catalog);
            self.stage_unit(&staging, &built, &[])?;
            info!(unit = %id, images = built.unit.pages.len(), "staged negative");
        }
        self.copy_assets(&staging, catalog.mapper(), true, true)?;
        self.finalize(staging, Variant::Negative)
    }

    fn slide(&self, tree: &DocumentTree, problems: &mut Problems) -> Result<Vec<PathBuf>, ExportError> {
        let (slide, ancestors) = dispatch_node(tree);
        let id = self.identifier(slide);
        let staging = self.staging(Variant::Slide)?;
        let builder = self.builder(tree, Variant::Slide);
        let mut catalog = builder.catalog(&id);

        if let Some(pages) = self.collect_or_skip(&builder, slide, &mut catalog, problems)? {
            let scope = UnitScope::new(slide, ancestors, &tree.logical);
            let built = builder.slide(&scope, pages);
            self.stage_unit(&staging, &built, &[])?;
            info!(unit = %id, "staged slide");
        }
        self.copy_assets(&staging, catalog.mapper(), false, false)?;
        self.finalize(staging, Variant::Slide)
    }

    fn generic(&self, tree: &DocumentTree, problems: &mut Problems) -> Result<Vec<PathBuf>, ExportError> {
        let (record, ancestors) = dispatch_node(tree);
        let id = self.identifier(record);
        let staging = self.staging(Variant::Generic)?;
        let builder = self.builder(tree, Variant::Generic);
        let mut catalog = builder.catalog(&id);

        if let Some(pages) = self.collect_or_skip(&builder, record, &mut catalog, problems)? {
            let merged_text = self.merge_text(tree, record)?;
            if let Some(text) = &merged_text {
                staging.write(&format!("{id}.txt"), text)?;
            }
            let scope = UnitScope::new(record, ancestors, &tree.logical);
            let built = builder.generic(&scope, pages, merged_text.is_some());
            self.stage_unit(&staging, &built, &[])?;
            info!(unit = %id, merged_text = merged_text.is_some(), "staged generic image");
        }
        self.copy_assets(&staging, catalog.mapper(), false, false)?;
        self.finalize(staging, Variant::Generic)
    }

    /// All OCR text files of the pages `node` references, concatenated in
    /// page order. `None` when there are none.
    fn merge_text(&self, tree: &DocumentTree, node: &LogicalNode) -> Result<Option<String>, ExportError> {
        let mut merged: Option<String> = None;
        for page in tree.pages_of(node)? {
            let stem = source_stem(&file_name(page))?.to_string();
            let path = self.ctx.sources.text.join(format!("{stem}.txt"));
            if !self.ctx.storage.exists(&path) {
                continue;
            }
            let text = fs::read_to_string(&path)?;
            let buffer = merged.get_or_insert_with(String::new);
            buffer.push_str(&text);
            if !text.ends_with('\n') {
                buffer.push('\n');
            }
        }
        Ok(merged)
    }

    // -------------------------------------------------------------------------
    // Delegated
    // -------------------------------------------------------------------------

    fn delegated(&self, tree: &DocumentTree) -> Result<Vec<PathBuf>, ExportError> {
        let staging = self.staging(Variant::Generic)?;
        self.ctx.delegate.export(tree, self.ctx.config, staging.path())?;
        self.finalize(staging, Variant::Generic)
    }
}

fn file_name(page: &PhysicalPage) -> String {
    Path::new(&page.image_name)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| page.image_name.clone())
}

// =============================================================================
// Dry run
// =============================================================================

/// One unit of a dry run with its `(source file, export name)` pairs.
#[derive(Debug, Clone, PartialEq)]
pub struct UnitPlan {
    pub label: String,
    pub files: Vec<(String, String)>,
}

/// What an export would do, computed without probing or writing.
#[derive(Debug, Clone, PartialEq)]
pub struct ExportPlan {
    pub route: Route,
    pub dispatch_type: String,
    pub target: PathBuf,
    pub units: Vec<UnitPlan>,
}

pub fn plan(tree: &DocumentTree, config: &ExportConfig) -> Result<ExportPlan, ExportError> {
    let route = route(tree, config)?;
    let (node, _) = dispatch_node(tree);
    let dispatch_type = node.doc_type.clone();
    let Route::Variant(variant) = route else {
        return Ok(ExportPlan {
            route,
            dispatch_type,
            target: config.variants.get(Variant::Generic).target_directory.clone(),
            units: Vec::new(),
        });
    };

    let fields = &config.fields;
    let policy = UnitPolicy::for_variant(variant, config.variants.get(variant));
    let (owner, units): (&LogicalNode, Vec<&LogicalNode>) = match variant {
        Variant::Newspaper => {
            let root = &tree.logical;
            let volume = if root.anchor { root.children.first().unwrap_or(root) } else { root };
            let issues = volume
                .children
                .iter()
                .filter(|c| c.doc_type == config.types.issue)
                .collect();
            (volume, issues)
        }
        Variant::Positive => (node, node.children.iter().collect()),
        _ => (node, vec![node]),
    };
    let mut mapper = FileNameMapper::new(owner.value(&fields.identifier).trim(), policy.naming);

    let index = tree.page_index();
    let mut plans = Vec::with_capacity(units.len());
    for unit in units {
        let mut refs = index.pages_of(unit)?;
        if policy.single_image {
            refs.truncate(1);
        }
        let mut files = Vec::with_capacity(refs.len());
        for page in refs {
            let name = file_name(page);
            let export = mapper.assign_file(&name)?;
            files.push((name, export));
        }
        plans.push(UnitPlan {
            label: unit_label(unit, fields),
            files,
        });
    }
    Ok(ExportPlan {
        route,
        dispatch_type,
        target: config.variants.get(variant).target_directory.clone(),
        units: plans,
    })
}
