//! Paragraph extraction from section blocks.
//!
//! A block is split at blank lines, each piece is trimmed, and pieces that are
//! leftover mail headers, separator rules, or too short to carry content are
//! rejected.

use std::sync::LazyLock;

use regex::Regex;
use tracing::trace;

use crate::segment::SEPARATOR_CLASS;

/// Paragraphs shorter than this many characters are dropped.
pub const MIN_PARAGRAPH_CHARS: usize = 20;

/// Header field names that mark a paragraph as raw mail headers.
pub const HEADER_FIELDS: &[&str] = &[
    "From",
    "To",
    "Subject",
    "Date",
    "Bcc",
    "Return-Path",
    "Received",
    "Message-ID",
    "X-TUID",
    "Content-Type",
    "MIME-Version",
];

/// Why a paragraph candidate was dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    /// Starts with a raw mail header field.
    HeaderField,
    /// Made only of separator characters.
    Separator,
    /// Shorter than [`MIN_PARAGRAPH_CHARS`].
    TooShort,
}

/// Decide whether a trimmed paragraph candidate is noise.
pub fn classify(paragraph: &str) -> Option<Rejection> {
    static HEADER_FIELD_RE: LazyLock<Regex> = LazyLock::new(|| {
        let fields: Vec<String> = HEADER_FIELDS.iter().map(|f| regex::escape(f)).collect();
        Regex::new(&format!(r"(?i)^(?:{}):", fields.join("|"))).expect("valid regex")
    });
    static SEPARATOR_ONLY_RE: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(&format!("^[{SEPARATOR_CLASS}]{{5,}}$")).expect("valid regex")
    });

    if HEADER_FIELD_RE.is_match(paragraph) {
        Some(Rejection::HeaderField)
    } else if SEPARATOR_ONLY_RE.is_match(paragraph) {
        Some(Rejection::Separator)
    } else if paragraph.chars().count() < MIN_PARAGRAPH_CHARS {
        Some(Rejection::TooShort)
    } else {
        None
    }
}

/// Split a block into trimmed, non-empty pieces at blank-line boundaries.
///
/// A boundary is any whitespace run containing at least two newlines.
pub fn split_paragraphs(block: &str) -> impl Iterator<Item = &str> {
    static BREAK_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"\s*\n\s*\n\s*").expect("valid regex"));

    BREAK_RE
        .split(block)
        .map(str::trim)
        .filter(|p| !p.is_empty())
}

/// Extract the content paragraphs of a block, in order.
pub fn extract_paragraphs(block: &str) -> Vec<&str> {
    split_paragraphs(block)
        .filter(|p| match classify(p) {
            Some(reason) => {
                trace!(?reason, len = p.len(), "dropping paragraph");
                false
            }
            None => true,
        })
        .collect()
}
