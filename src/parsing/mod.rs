//! Extraction of structured data from model output.
//!
//! Model output is never trusted to follow the requested shape. The parsers in
//! this module locate what they can and fall back to empty values for the
//! rest; none of them return an error for malformed text.
//!
//! - [`sections`]: labelled free-text sections (`Summary:`, `## Key Points`)
//! - [`json`]: JSON objects embedded in prose or code fences

use regex::Regex;
use std::sync::LazyLock;

pub mod json;
pub mod sections;

pub use json::{FieldReader, JsonObject, extract_json, parse_object, parse_value};
pub use sections::{SectionParser, Sections};

/// Leading list markers: `-`, `*`, `•`, `1.`, `2)`.
static LIST_MARKER: LazyLock<Regex> = lazy_regex!(r"^\s*(?:[-*•+]|\d+[.)])\s+");

/// Splits a block of text into list items.
///
/// Each non-empty line is one item with its bullet or number marker removed.
/// A single unmarked line containing commas is split on the commas instead.
#[must_use]
pub fn split_list(block: &str) -> Vec<String> {
    let lines: Vec<&str> = block
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect();

    if let [only] = lines.as_slice() {
        if !LIST_MARKER.is_match(only) && only.contains(',') {
            return only
                .split(',')
                .map(|s| s.trim().trim_end_matches('.').trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
        }
    }

    lines
        .into_iter()
        .map(|l| LIST_MARKER.replace(l, "").trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}
