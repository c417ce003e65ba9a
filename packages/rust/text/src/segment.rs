//! Section segmentation of a digest body.
//!
//! The body is scanned line by line. Upper-case headings open a new main
//! section, keyword-suffixed title-case headings open a subsection under the
//! current main section, and long separator rules are dropped. Everything
//! else accumulates into the block of the section that is active.

use std::sync::LazyLock;

use regex::Regex;

use digestmerge_shared::SectionPath;

/// Section that collects everything before the first main heading.
pub const DEFAULT_SECTION: &str = "HEADER";

/// Characters that make up separator rules: ASCII dashes, equals signs,
/// en/em dashes and the Unicode box-drawing block.
pub(crate) const SEPARATOR_CLASS: &str = r"\-=\x{2013}\x{2014}\x{2500}-\x{257F}";

/// Minimum run length for a line to be dropped as a pure separator.
pub const SEPARATOR_MIN_RUN: usize = 10;

/// Suffixes that mark a title-case line as a subsection heading.
pub const SUBSECTION_SUFFIXES: &[&str] = &[
    "Summary",
    "Headlines",
    "Insights",
    "Metrics",
    "Mentioned",
    "Opportunities",
];

/// Minimum length of a heading, excluding the optional trailing colon.
const MIN_HEADER_LEN: usize = 5;

// ---------------------------------------------------------------------------
// Line classification
// ---------------------------------------------------------------------------

/// A line made only of at least [`SEPARATOR_MIN_RUN`] separator characters.
///
/// Leading and trailing whitespace is ignored.
pub fn is_pure_separator(line: &str) -> bool {
    static SEPARATOR_RE: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(&format!("^[{SEPARATOR_CLASS}]{{{SEPARATOR_MIN_RUN},}}$")).expect("valid regex")
    });

    SEPARATOR_RE.is_match(line.trim())
}

/// A main heading: an ASCII upper-case letter followed only by upper-case
/// letters and spaces, at least five characters long, with an optional
/// trailing colon. Leading and trailing whitespace is ignored.
///
/// `GENERAL`, `TOP STORIES:` match; `AI`, `Top Stories`, `Q3 NUMBERS` do not.
pub fn is_main_header(line: &str) -> bool {
    static MAIN_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"^[A-Z][A-Z ]*:?$").expect("valid regex"));

    let line = line.trim();
    MAIN_RE.is_match(line) && heading_text(line).chars().count() >= MIN_HEADER_LEN
}

/// A subsection heading: an ASCII upper-case letter, then letters, digits,
/// spaces or `,&'/-`, ending in one of [`SUBSECTION_SUFFIXES`] (case-sensitive),
/// at least five characters long, with an optional trailing colon. Leading and
/// trailing whitespace is ignored.
///
/// `Market Summary`, `Companies Mentioned:` match; `MARKET SUMMARY`,
/// `Summary` do not.
pub fn is_subsection_header(line: &str) -> bool {
    static SUB_RE: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(&format!(
            r"^[A-Z][A-Za-z0-9 ,&'/\-]*(?:{}):?$",
            SUBSECTION_SUFFIXES.join("|")
        ))
        .expect("valid regex")
    });

    let line = line.trim();
    SUB_RE.is_match(line) && heading_text(line).chars().count() >= MIN_HEADER_LEN
}

/// Heading text with surrounding whitespace and the trailing colon removed.
fn heading_text(line: &str) -> &str {
    let line = line.trim();
    line.strip_suffix(':').unwrap_or(line).trim_end()
}

// ---------------------------------------------------------------------------
// Section map
// ---------------------------------------------------------------------------

/// Ordered mapping from section path to the text blocks found under it.
///
/// Keys keep the order of their first appearance; a section that reappears
/// later in the body gets the new block appended to its existing entry.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SectionMap {
    entries: Vec<(SectionPath, Vec<String>)>,
}

impl SectionMap {
    fn push(&mut self, path: SectionPath, block: String) {
        match self.entries.iter_mut().find(|(p, _)| *p == path) {
            Some((_, blocks)) => blocks.push(block),
            None => self.entries.push((path, vec![block])),
        }
    }

    /// Iterate over sections in discovery order.
    pub fn iter(&self) -> impl Iterator<Item = (&SectionPath, &[String])> {
        self.entries.iter().map(|(p, b)| (p, b.as_slice()))
    }

    /// Blocks recorded for a section key.
    pub fn get(&self, key: &str) -> Option<&[String]> {
        self.entries
            .iter()
            .find(|(p, _)| p.as_str() == key)
            .map(|(_, b)| b.as_slice())
    }

    /// Number of distinct sections.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no block was recorded at all.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Scanner
// ---------------------------------------------------------------------------

/// Accumulator threaded through the line fold.
#[derive(Debug)]
struct ScanState {
    section: String,
    subsection: Option<String>,
    buffer: String,
    sections: SectionMap,
}

impl ScanState {
    fn new() -> Self {
        Self {
            section: DEFAULT_SECTION.to_string(),
            subsection: None,
            buffer: String::new(),
            sections: SectionMap::default(),
        }
    }

    fn step(mut self, line: &str) -> Self {
        if is_pure_separator(line) {
            return self;
        }

        if is_main_header(line) {
            self.flush();
            self.section = heading_text(line).to_string();
            self.subsection = None;
        } else if is_subsection_header(line) {
            self.flush();
            self.subsection = Some(heading_text(line).to_string());
        } else {
            self.buffer.push_str(line);
        }
        self
    }

    fn flush(&mut self) {
        if self.buffer.is_empty() {
            return;
        }
        let path = SectionPath::new(&self.section, self.subsection.as_deref());
        let block = std::mem::take(&mut self.buffer);
        self.sections.push(path, block);
    }

    fn finish(mut self) -> SectionMap {
        self.flush();
        self.sections
    }
}

/// Split a plain-text body into its sections.
///
/// Lines keep their original terminators inside the blocks.
pub fn segment(body: &str) -> SectionMap {
    body.split_inclusive('\n')
        .fold(ScanState::new(), ScanState::step)
        .finish()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
