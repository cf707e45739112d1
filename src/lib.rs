//! # Archive Export
//!
//! Turns one digitised process (a document tree plus its source folders)
//! into a delivery package: renamed master images and OCR files, one XML
//! document per deliverable unit, glued PDFs and, for newspapers, a chain
//! of METS files linking issues, volume and newspaper.
//!
//! # Architecture: One Invocation, One Route
//!
//! ```text
//! 1. Dispatch   tree            →  Route                (type tag of the root)
//! 2. Build      pages + probe   →  unit XML documents   (per-variant policy)
//! 3. Package    unit pages      →  PDFs, renamed assets (staging folder)
//! 4. Describe   tree + names    →  METS files           (newspapers only)
//! 5. Commit     staging         →  target folder        (anchor merged under lock)
//! ```
//!
//! Every file is written to a staging folder inside the target first. An
//! invocation that fails leaves the target untouched; problems limited to
//! one unit are reported and the rest of the export carries on.
//!
//! # Module Map
//!
//! | Module | Role |
//! |--------|------|
//! | [`config`] | `export.toml` loading, merging over stock defaults, validation |
//! | [`vars`] | `${...}` placeholder substitution against tree, process and environment |
//! | [`tree`] | Document tree model (logical structure, physical pages) and JSON loading |
//! | [`types`] | Shared value types: `PageEntry`, `OutputUnit`, `TechnicalAttributes` |
//! | [`naming`] | Export file names: `{unit}-{counter}` or the unit identifier |
//! | [`metadata`] | Field precedence, bilingual titles, dates, issue labels |
//! | [`imaging`] | Technical attributes of master images |
//! | [`xml`] | In-memory XML element tree with quick-xml I/O |
//! | [`unit`] | Per-variant unit XML documents |
//! | [`supplement`] | Splitting newspaper issues into main part and supplements |
//! | [`hierarchy`] | Year → Month → Day calendar of a newspaper volume |
//! | [`mets`] | Issue, volume and anchor METS files |
//! | [`anchor`] | Merging volume lists into existing anchor files |
//! | [`pdf`] | Gluing per-page PDFs with lopdf |
//! | [`storage`] | File operations, staging and commit |
//! | [`export`] | The orchestrator: dispatch, variants, outcome |
//! | [`output`] | CLI report formatting |
//!
//! # Design Decisions
//!
//! ## Collaborators Behind Traits
//!
//! Image probing, PDF assembly, file operations and the default record
//! export are traits ([`imaging::ImageProbe`], [`pdf::PdfAssembler`],
//! [`storage::Storage`], [`export::DefaultExporter`]). The orchestrator only
//! sees `&dyn` references, so tests swap in recording mocks and never need
//! real TIFFs or PDFs.
//!
//! ## Naming Is Decided Once
//!
//! A [`naming::FileNameMapper`] per unit owns the source → export name
//! table. Unit documents, copied assets and METS file sections all read from
//! the same table, so a page can never appear under two names.
//!
//! ## Typed Field Names
//!
//! Metadata field names differ between installations. They live in
//! [`config::FieldNames`] instead of string literals, and every lookup goes
//! through that table.

pub mod anchor;
pub mod config;
pub mod export;
pub mod hierarchy;
pub mod imaging;
pub mod metadata;
pub mod mets;
pub mod naming;
pub mod output;
pub mod pdf;
pub mod storage;
pub mod supplement;
pub mod tree;
pub mod types;
pub mod unit;
pub mod vars;
pub mod xml;

#[cfg(test)]
pub(crate) mod test_helpers;
