//! Core domain types for digestmerge runs.

use std::borrow::Borrow;

use chrono::{DateTime, NaiveDate, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{DigestError, Result};

// ---------------------------------------------------------------------------
// Document
// ---------------------------------------------------------------------------

/// Metadata attached to a document by its source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentMeta {
    /// When the document was received.
    pub received_at: DateTime<Utc>,
    /// Source-specific reference (a file path for Maildir sources).
    pub source_id: String,
}

/// A raw digest document as returned by a document source.
#[derive(Debug, Clone)]
pub struct Document {
    /// Full raw message text (headers + body), already decoded to UTF-8.
    pub raw_body: String,
    /// Source metadata.
    pub meta: DocumentMeta,
}

// ---------------------------------------------------------------------------
// SectionPath
// ---------------------------------------------------------------------------

/// Separator between the main heading and the subheading of a section path.
const SECTION_PATH_SEPARATOR: &str = " / ";

/// Hierarchical section key: `MAIN` or `MAIN / Sub`.
///
/// The main heading is upper-cased and both parts have their whitespace
/// collapsed, so the same heading written slightly differently in two
/// documents lands under one key.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SectionPath(String);

impl SectionPath {
    /// Build a section path from a main heading and an optional subheading.
    pub fn new(main: &str, sub: Option<&str>) -> Self {
        let main = collapse_whitespace(main).to_uppercase();
        match sub.map(collapse_whitespace).filter(|s| !s.is_empty()) {
            Some(sub) => Self(format!("{main}{SECTION_PATH_SEPARATOR}{sub}")),
            None => Self(main),
        }
    }

    /// Parse a key written by hand (config priority lists), e.g.
    /// `"Top Stories"` or `"general/key insights"`. Main headings never
    /// contain `/`, so the first one splits main from sub.
    pub fn from_key(key: &str) -> Self {
        match key.split_once('/') {
            Some((main, sub)) => Self::new(main, Some(sub)),
            None => Self::new(key, None),
        }
    }

    /// The rendered key.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for SectionPath {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SectionPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

// ---------------------------------------------------------------------------
// Stats
// ---------------------------------------------------------------------------

/// Duplication counters for one run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stats {
    /// Documents that made it through body extraction.
    pub total_emails: usize,
    /// Every paragraph observed by the registry.
    pub total_paragraphs: usize,
    /// Paragraphs kept (first occurrence of their fingerprint).
    pub unique_paragraphs: usize,
    /// Paragraphs discarded as duplicates.
    pub duplicate_paragraphs: usize,
}

impl Stats {
    /// Duplicate percentage, rounded to one decimal place. `0.0` when nothing was observed.
    pub fn duplicate_rate(&self) -> f64 {
        if self.total_paragraphs == 0 {
            return 0.0;
        }
        let rate = self.duplicate_paragraphs as f64 / self.total_paragraphs as f64 * 100.0;
        (rate * 10.0).round() / 10.0
    }
}

// ---------------------------------------------------------------------------
// DateRange
// ---------------------------------------------------------------------------

/// Inclusive calendar-day range used to select documents.
///
/// Accepted forms: `START..END` (either side may be empty), or a single
/// bound meaning that one day. Each bound is `YYYY-MM-DD`, `today`,
/// `yesterday`, or `Nd` (N days before today).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DateRange {
    /// The selector as the user wrote it; reused as the compendium label.
    pub label: String,
    /// First included day (UTC), if bounded.
    pub since: Option<NaiveDate>,
    /// Last included day (UTC), if bounded.
    pub until: Option<NaiveDate>,
}

impl DateRange {
    /// A range that matches every document.
    pub fn unbounded() -> Self {
        Self {
            label: "all".into(),
            since: None,
            until: None,
        }
    }

    /// Parse a selector relative to the given `today`.
    pub fn parse_relative(input: &str, today: NaiveDate) -> Result<Self> {
        let label = input.trim();
        if label.is_empty() {
            return Err(DigestError::validation("empty date range"));
        }

        let (since, until) = match label.split_once("..") {
            Some((start, end)) => (
                parse_bound(start, today)?,
                parse_bound(end, today)?,
            ),
            None => {
                let day = parse_bound(label, today)?;
                (day, day)
            }
        };

        if let (Some(s), Some(u)) = (since, until) {
            if s > u {
                return Err(DigestError::validation(format!(
                    "date range '{label}' ends before it starts"
                )));
            }
        }

        Ok(Self {
            label: label.to_string(),
            since,
            until,
        })
    }

    /// Whether a timestamp falls inside the range (by its UTC calendar day).
    pub fn contains(&self, at: &DateTime<Utc>) -> bool {
        let day = at.date_naive();
        self.since.is_none_or(|s| day >= s) && self.until.is_none_or(|u| day <= u)
    }
}

impl std::str::FromStr for DateRange {
    type Err = DigestError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse_relative(s, Utc::now().date_naive())
    }
}

impl std::fmt::Display for DateRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.label)
    }
}

fn parse_bound(raw: &str, today: NaiveDate) -> Result<Option<NaiveDate>> {
    let raw = raw.trim();
    match raw {
        "" => Ok(None),
        "today" => Ok(Some(today)),
        "yesterday" => days_before(today, 1).map(Some),
        _ => {
            if let Some(n) = raw.strip_suffix('d') {
                if let Ok(days) = n.parse::<i64>() {
                    return days_before(today, days).map(Some);
                }
            }
            NaiveDate::parse_from_str(raw, "%Y-%m-%d")
                .map(Some)
                .map_err(|e| DigestError::validation(format!("invalid date '{raw}': {e}")))
        }
    }
}

fn days_before(today: NaiveDate, days: i64) -> Result<NaiveDate> {
    TimeDelta::try_days(days)
        .and_then(|delta| today.checked_sub_signed(delta))
        .ok_or_else(|| DigestError::validation(format!("{days}d is out of range")))
}
