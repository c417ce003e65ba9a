//! Deduplication core and pipeline orchestration for digestmerge.
//!
//! This crate fingerprints paragraphs, keeps the first occurrence of each in
//! a run-scoped [`registry::Registry`], renders the compendium, and drives a
//! full run against the collaborator traits in [`ports`].

pub mod canonical;
pub mod compendium;
pub mod pipeline;
pub mod ports;
pub mod registry;
