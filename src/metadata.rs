//! Metadata value resolution and text normalization.
//!
//! ## Resolution precedence
//!
//! A header field of an output unit is resolved in this order. The first
//! non-empty value wins and the result is never absent:
//!
//! 1. the unit's own metadata value for the mapped field name
//! 2. the nearest ancestor (volume, then anchor) carrying it, when the field
//!    is allowed to inherit
//! 3. the configured constant
//! 4. `""`
//!
//! ## Bilingual titles
//!
//! Titles arrive as `"<arabic> - <english>"`. Both the ASCII hyphen and the
//! en dash are accepted as separator; the en dash is normalized first. The
//! English part is everything after the first separator, the Arabic part
//! everything before it. A title without separator is returned unchanged for
//! both parts.
//!
//! ## Dates
//!
//! Conversions between `YYYY-MM-DD` and `DD-MM-YYYY` are lenient: input that
//! does not parse comes back unchanged.

use crate::tree::LogicalNode;
use chrono::NaiveDate;
use regex::Regex;
use std::sync::LazyLock;

static ISO_DATE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[0-9]{4}-[0-9]{2}-[0-9]{2}$").expect("iso date pattern is valid"));
static DMY_DATE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[0-9]{2}-[0-9]{2}-[0-9]{4}$").expect("dmy date pattern is valid"));

/// Resolve a value from multiple sources.
///
/// Takes optional values in priority order and returns the first non-empty
/// one, trimmed.
pub fn resolve(sources: &[Option<&str>]) -> Option<String> {
    sources
        .iter()
        .filter_map(|opt| {
            opt.map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
        })
        .next()
}

/// Resolve one field for a unit following the precedence above.
///
/// `ancestors` are nearest-first. `constant` has already been through
/// placeholder substitution.
pub fn resolve_field(
    unit: &LogicalNode,
    ancestors: &[&LogicalNode],
    field: &str,
    inherit: bool,
    constant: Option<&str>,
) -> String {
    let mut sources = vec![unit.metadata_value(field)];
    if inherit {
        sources.extend(ancestors.iter().map(|a| a.metadata_value(field)));
    }
    sources.push(constant);
    resolve(&sources).unwrap_or_default()
}

// ---------------------------------------------------------------------------
// Titles and labels
// ---------------------------------------------------------------------------

fn normalize_dash(value: &str) -> String {
    value.replace('\u{2013}', "-")
}

/// The part after the first separator, trimmed.
pub fn english_part(value: &str) -> String {
    let copy = normalize_dash(value);
    match copy.split_once('-') {
        Some((_, after)) => after.trim().to_string(),
        None => value.to_string(),
    }
}

/// The part before the first separator, trimmed.
pub fn arabic_part(value: &str) -> String {
    let copy = normalize_dash(value);
    match copy.split_once('-') {
        Some((before, _)) => before.trim().to_string(),
        None => value.to_string(),
    }
}

/// Strip the German and English "issue of" prefixes from an issue label.
pub fn clean_issue_label(value: &str) -> String {
    value.replace("Ausgabe vom ", "").replace("Issue from ", "")
}

const LABEL_TRANSLATIONS: &[(&str, &str)] = &[
    ("Ausgabe vom Montag, den", "Monday,"),
    ("Ausgabe vom Dienstag, den", "Tuesday,"),
    ("Ausgabe vom Mittwoch, den", "Wednesday,"),
    ("Ausgabe vom Donnerstag, den", "Thursday,"),
    ("Ausgabe vom Freitag, den", "Friday,"),
    ("Ausgabe vom Samstag, den", "Saturday,"),
    ("Ausgabe vom Sonntag, den", "Sunday,"),
    ("Januar ", "January "),
    ("Februar ", "February "),
    ("März ", "March "),
    ("Mai ", "May "),
    ("Juni ", "June "),
    ("Juli ", "July "),
    ("Oktober ", "October "),
    ("Dezember ", "December "),
];

/// Translate generated German issue labels into English.
pub fn translate_issue_label(value: &str) -> String {
    LABEL_TRANSLATIONS
        .iter()
        .fold(value.to_string(), |acc, (de, en)| acc.replace(de, en))
}

/// Display name for a language code. Unknown codes pass through.
pub fn language_name(code: &str) -> String {
    match code {
        "Arabic" | "ara" => "عربي - Arabic".to_string(),
        "English" | "eng" => "انجليزي - English".to_string(),
        "ger" => "German".to_string(),
        other => other.to_string(),
    }
}

// ---------------------------------------------------------------------------
// Dates and numbers
// ---------------------------------------------------------------------------

/// `true` for strict `YYYY-MM-DD` shapes (digits only, fixed widths).
pub fn is_iso_date(value: &str) -> bool {
    ISO_DATE.is_match(value)
}

/// `YYYY-MM-DD` to `DD-MM-YYYY`; unparseable input is returned unchanged.
pub fn ymd_to_dmy(value: &str) -> String {
    if !ISO_DATE.is_match(value) {
        return value.to_string();
    }
    match NaiveDate::parse_from_str(value, "%Y-%m-%d") {
        Ok(date) => date.format("%d-%m-%Y").to_string(),
        Err(_) => value.to_string(),
    }
}

/// `DD-MM-YYYY` to `YYYY-MM-DD`; unparseable input is returned unchanged.
pub fn dmy_to_ymd(value: &str) -> String {
    if !DMY_DATE.is_match(value) {
        return value.to_string();
    }
    match NaiveDate::parse_from_str(value, "%d-%m-%Y") {
        Ok(date) => date.format("%Y-%m-%d").to_string(),
        Err(_) => value.to_string(),
    }
}

/// `2021-03-05` becomes `20210305`.
pub fn compact_date(value: &str) -> String {
    value.replace('-', "")
}

/// Non-empty and ASCII digits only.
pub fn is_numeric(value: &str) -> bool {
    !value.is_empty() && value.chars().all(|c| c.is_ascii_digit())
}
