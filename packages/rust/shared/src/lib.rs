//! Shared types, error model, and configuration for digestmerge.
//!
//! This crate is the foundation depended on by all other digestmerge crates.
//! It provides:
//! - [`DigestError`]: the unified error type
//! - Domain types ([`Document`], [`SectionPath`], [`Stats`], [`DateRange`])
//! - Configuration ([`AppConfig`], [`RunConfig`], config loading)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, DEFAULT_SECTION_PRIORITY, DefaultsConfig, FiltersConfig, RunConfig,
    SectionsConfig, TransportConfig, config_file_path, expand_home, init_config,
    load_config,
};
pub use error::{DigestError, Result};
pub use types::{DateRange, Document, DocumentMeta, SectionPath, Stats};
