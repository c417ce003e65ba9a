//! Run-scoped deduplication registry.
//!
//! The first paragraph to produce a fingerprint is stored under its section;
//! later paragraphs with the same fingerprint are counted and dropped.

use std::collections::{BTreeMap, HashSet};

use tracing::trace;

use digestmerge_shared::{SectionPath, Stats};

use crate::canonical::Fingerprint;

/// Seen fingerprints, kept paragraphs per section, and run counters.
#[derive(Debug, Default)]
pub struct Registry {
    seen: HashSet<Fingerprint>,
    content: BTreeMap<SectionPath, Vec<String>>,
    stats: Stats,
}

impl Registry {
    /// Create an empty registry for a new run.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one paragraph. Returns `true` if it was kept.
    ///
    /// The stored text is the paragraph as given, not its canonical form.
    pub fn observe(&mut self, section: &SectionPath, paragraph: &str) -> bool {
        self.stats.total_paragraphs += 1;

        let fingerprint = Fingerprint::of(paragraph);
        if self.seen.contains(&fingerprint) {
            self.stats.duplicate_paragraphs += 1;
            trace!(%section, %fingerprint, "duplicate paragraph");
            return false;
        }

        self.seen.insert(fingerprint);
        self.content
            .entry(section.clone())
            .or_default()
            .push(paragraph.to_string());
        self.stats.unique_paragraphs += 1;
        true
    }

    /// Count a document whose paragraphs are about to be observed.
    pub fn record_document(&mut self) {
        self.stats.total_emails += 1;
    }

    /// Kept paragraphs of a section, if it has any entry.
    pub fn paragraphs(&self, section: &str) -> Option<&[String]> {
        self.content.get(section).map(Vec::as_slice)
    }

    /// Sections in ascending key order.
    pub fn sections(&self) -> impl Iterator<Item = (&SectionPath, &[String])> {
        self.content.iter().map(|(k, v)| (k, v.as_slice()))
    }

    /// Number of distinct fingerprints seen.
    pub fn seen_len(&self) -> usize {
        self.seen.len()
    }

    /// Counters so far.
    pub fn stats(&self) -> Stats {
        self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn general() -> SectionPath {
        SectionPath::new("GENERAL", None)
    }

    #[test]
    fn first_occurrence_is_kept() {
        let mut reg = Registry::new();
        assert!(reg.observe(&general(), "Revenue grew 40% year over year."));
        assert!(!reg.observe(&general(), "Revenue grew 40% year over year.   "));
        assert_eq!(
            reg.paragraphs("GENERAL").unwrap(),
            ["Revenue grew 40% year over year."]
        );
    }

    #[test]
    fn surface_form_of_first_occurrence_survives() {
        let mut reg = Registry::new();
        reg.observe(&general(), "Revenue  grew 40%\nyear over year.");
        reg.observe(&general(), "Revenue grew 40% year over year.");
        assert_eq!(
            reg.paragraphs("GENERAL").unwrap(),
            ["Revenue  grew 40%\nyear over year."]
        );
    }

    #[test]
    fn duplicates_across_sections_are_dropped() {
        let mut reg = Registry::new();
        let markets = SectionPath::new("MARKETS", None);
        assert!(reg.observe(&general(), "Shared paragraph across two sections."));
        assert!(!reg.observe(&markets, "Shared paragraph across two sections."));
        assert!(reg.paragraphs("MARKETS").is_none());
    }

    #[test]
    fn counters_stay_consistent() {
        let mut reg = Registry::new();
        let paragraphs = [
            "alpha paragraph with content",
            "beta paragraph with content",
            "ALPHA paragraph with   content",
            "gamma paragraph with content",
            "beta paragraph with content",
        ];
        for p in paragraphs {
            reg.observe(&general(), p);
        }
        let stats = reg.stats();
        assert_eq!(stats.total_paragraphs, 5);
        assert_eq!(stats.unique_paragraphs, 3);
        assert_eq!(stats.duplicate_paragraphs, 2);
        assert_eq!(
            stats.unique_paragraphs + stats.duplicate_paragraphs,
            stats.total_paragraphs
        );
        assert_eq!(stats.unique_paragraphs, reg.seen_len());
    }

    #[test]
    fn sections_iterate_in_key_order() {
        let mut reg = Registry::new();
        reg.observe(&SectionPath::new("ZEBRA", None), "zebra paragraph with content");
        reg.observe(&SectionPath::new("ALPHA", None), "alpha paragraph with content");
        let keys: Vec<&str> = reg.sections().map(|(k, _)| k.as_str()).collect();
        assert_eq!(keys, vec!["ALPHA", "ZEBRA"]);
    }

    #[test]
    fn documents_are_counted_separately() {
        let mut reg = Registry::new();
        reg.record_document();
        reg.record_document();
        assert_eq!(reg.stats().total_emails, 2);
        assert_eq!(reg.stats().total_paragraphs, 0);
    }
}
