//! Collaborator traits at the pipeline boundary.
//!
//! The pipeline never talks to a mail store or transport directly; concrete
//! adapters live in `digestmerge-mailbox`, and tests use in-memory fakes.

use std::future::Future;

use digestmerge_shared::{DateRange, Document, DocumentMeta, Result};

/// Lists the documents selected for a run.
pub trait DocumentSource: Send + Sync {
    /// Documents in processing order. An empty list is a valid outcome.
    ///
    /// Fails with `SourceUnavailable` when the backing store cannot be queried.
    fn list_documents(&self, selector: &DateRange)
    -> impl Future<Output = Result<Vec<Document>>> + Send;

    /// Human-readable source name for tracing.
    fn name(&self) -> &str;
}

/// Delivers the assembled compendium.
pub trait TransportSink: Send + Sync {
    /// Send `body` to `recipient`. Any error is reported as a sink failure.
    fn send(
        &self,
        body: &str,
        subject: &str,
        recipient: &str,
    ) -> impl Future<Output = Result<()>> + Send;
}

/// Moves a processed document out of the inbox.
pub trait ArchivalMover: Send + Sync {
    /// Archive one document.
    fn archive(&self, document: &DocumentMeta) -> impl Future<Output = Result<()>> + Send;
}
