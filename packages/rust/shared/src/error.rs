//! Error types for digestmerge.
//!
//! Library crates use [`DigestError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;

/// Top-level error type for all digestmerge operations.
#[derive(Debug, thiserror::Error)]
pub enum DigestError {
    /// The document source could not be queried. Aborts the run.
    #[error("source unavailable: {message}")]
    SourceUnavailable { message: String },

    /// A single document could not be parsed. The document is skipped.
    #[error("malformed document {document}: {message}")]
    MalformedDocument { document: String, message: String },

    /// Body bytes were not valid UTF-8 and had to be replaced.
    #[error("encoding error in {document}: {message}")]
    Encoding { document: String, message: String },

    /// The transport sink rejected or failed to deliver the compendium.
    #[error("sink failure: {0}")]
    Sink(String),

    /// A processed document could not be archived.
    #[error("archive failure for {document}: {message}")]
    Archive { document: String, message: String },

    /// A collaborator call exceeded its time budget.
    #[error("{operation} timed out after {secs}s")]
    Timeout { operation: String, secs: u64 },

    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Data validation error (bad selector, bad input format, etc.).
    #[error("validation error: {message}")]
    Validation { message: String },
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, DigestError>;

impl DigestError {
    /// Create a source-unavailable error from any displayable message.
    pub fn source_unavailable(msg: impl Into<String>) -> Self {
        Self::SourceUnavailable {
            message: msg.into(),
        }
    }

    /// Create a malformed-document error for the given document id.
    pub fn malformed(document: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::MalformedDocument {
            document: document.into(),
            message: msg.into(),
        }
    }

    /// Create an archive error for the given document id.
    pub fn archive(document: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Archive {
            document: document.into(),
            message: msg.into(),
        }
    }

    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a validation error from any displayable message.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
        }
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Whether this error must abort the run.
    ///
    /// Everything else is recovered locally by the pipeline and logged.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::SourceUnavailable { .. }
                | Self::Config { .. }
                | Self::Io { .. }
                | Self::Validation { .. }
        )
    }
}
