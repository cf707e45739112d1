//! Value types shared between the unit builder, the supplement partitioner
//! and the exporters.

use serde::{Deserialize, Serialize};

/// Physical attributes of one master image, as reported by the probe.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TechnicalAttributes {
    pub mime_type: String,
    /// Horizontal resolution in pixels per inch.
    pub x_resolution: u32,
    /// Bits per sample.
    pub bit_depth: u32,
    pub samples_per_pixel: u32,
    /// `bitonal`, `grey` or `color`.
    pub color_space: String,
    pub width: u32,
    pub height: u32,
}

/// One page of an output unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageEntry {
    /// Source file stem, e.g. `img001` for `img001.tif`.
    pub source_stem: String,
    /// Assigned export base name, e.g. `ABC-0001`.
    pub export_name: String,
    pub technical: TechnicalAttributes,
    pub has_alto: bool,
    pub has_text: bool,
}

/// One exportable leaf: an issue, a volume, an envelope or an image record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputUnit {
    /// Identifier used in every file name of the unit.
    pub identifier: String,
    /// Publication date (`YYYY-MM-DD`) for dated units.
    pub date: Option<String>,
    pub title_eng: String,
    pub title_ara: String,
    pub pages: Vec<PageEntry>,
}

impl OutputUnit {
    /// `{identifier}` or `{identifier}-{date8}`, the base of the unit's files.
    pub fn file_base(&self) -> String {
        match &self.date {
            Some(date) => format!("{}-{}", self.identifier, date.replace('-', "")),
            None => self.identifier.clone(),
        }
    }
}
