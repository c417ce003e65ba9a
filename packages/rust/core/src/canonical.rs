//! Paragraph canonicalization and fingerprinting.
//!
//! Two paragraphs are duplicates iff their fingerprints are equal. The
//! canonical form only exists for comparison and is never rendered.

use sha2::{Digest, Sha256};

/// Collapse whitespace runs to single spaces, trim, and lower-case.
pub fn canonicalize(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// SHA-256 of a paragraph's canonical form, as 64 lowercase hex characters.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Fingerprint a paragraph (canonicalizes first).
    pub fn of(text: &str) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(canonicalize(text).as_bytes());
        Self(format!("{:x}", hasher.finalize()))
    }

    /// The hex digest.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}
