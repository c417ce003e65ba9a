//! End-to-end digest run: list → extract → segment → dedup → assemble → deliver → archive.

use std::future::Future;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use tracing::{debug, info, instrument, warn};

use digestmerge_shared::{DateRange, DigestError, Document, Result, RunConfig, SectionPath, Stats};

use crate::compendium::{self, RunMetadata};
use crate::ports::{ArchivalMover, DocumentSource, TransportSink};
use crate::registry::Registry;

/// How the compendium left the run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivery {
    /// No compendium was produced (no usable documents).
    NotAttempted,
    /// Dry run: nothing sent, nothing archived.
    DryRun,
    /// Sending explicitly skipped; documents were archived.
    Skipped,
    /// Delivered by the transport sink.
    Sent,
    /// The sink failed; the compendium was written to `path` instead.
    Fallback { path: PathBuf, error: String },
}

/// Result of one run.
#[derive(Debug)]
pub struct RunReport {
    /// Final counters.
    pub stats: Stats,
    /// The assembled compendium, if any document was processed.
    pub compendium: Option<String>,
    /// Delivery outcome.
    pub delivery: Delivery,
    /// Source ids of documents excluded as malformed.
    pub skipped: Vec<String>,
    /// Documents archived successfully.
    pub archived: usize,
    /// Documents whose archival failed.
    pub archive_failures: usize,
    /// Total elapsed time.
    pub elapsed: Duration,
}

/// Progress callback for reporting pipeline status.
pub trait ProgressReporter: Send + Sync {
    /// Called when entering a new phase.
    fn phase(&self, name: &str);
    /// Called after each document has been deduplicated (or skipped).
    fn document_processed(&self, source_id: &str, current: usize, total: usize);
    /// Called when the run completes.
    fn done(&self, report: &RunReport);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn phase(&self, _name: &str) {}
    fn document_processed(&self, _source_id: &str, _current: usize, _total: usize) {}
    fn done(&self, _report: &RunReport) {}
}

// ---------------------------------------------------------------------------
// Dedup pass
// ---------------------------------------------------------------------------

/// Feed one document into the registry.
///
/// Order: sections in discovery order, blocks in discovery order, paragraphs
/// in extraction order. Returns the number of paragraphs kept.
pub fn process_document(registry: &mut Registry, document: &Document) -> Result<usize> {
    let source_id = &document.meta.source_id;
    let body = digestmerge_text::plain_text_body(&document.raw_body, source_id)?;
    let sections = digestmerge_text::segment(&body);

    registry.record_document();

    let mut kept = 0;
    for (path, blocks) in sections.iter() {
        for block in blocks {
            for paragraph in digestmerge_text::extract_paragraphs(block) {
                if registry.observe(path, paragraph) {
                    kept += 1;
                }
            }
        }
    }

    debug!(%source_id, sections = sections.len(), kept, "document processed");
    Ok(kept)
}

/// Run the dedup pass over a batch, in batch order.
///
/// Malformed documents are logged and returned as skipped; they never abort
/// the pass and are not counted in `total_emails`.
pub fn build_registry(
    documents: &[Document],
    progress: &dyn ProgressReporter,
) -> (Registry, Vec<String>) {
    let mut registry = Registry::new();
    let mut skipped = Vec::new();
    let total = documents.len();

    for (i, document) in documents.iter().enumerate() {
        let source_id = &document.meta.source_id;
        if let Err(e) = process_document(&mut registry, document) {
            warn!(%source_id, error = %e, "skipping document");
            skipped.push(source_id.clone());
        }
        progress.document_processed(source_id, i + 1, total);
    }

    (registry, skipped)
}

// ---------------------------------------------------------------------------
// Full run
// ---------------------------------------------------------------------------

/// Run the full digest pipeline.
///
/// 1. List documents (fatal on failure)
/// 2. Deduplicate in batch order
/// 3. Assemble the compendium
/// 4. Deliver (or fall back to a file)
/// 5. Archive processed documents
#[instrument(skip_all, fields(range = %selector, source = source.name(), dry_run = config.dry_run))]
pub async fn run_digest<S, T, A>(
    config: &RunConfig,
    selector: &DateRange,
    source: &S,
    sink: &T,
    mover: &A,
    progress: &dyn ProgressReporter,
) -> Result<RunReport>
where
    S: DocumentSource,
    T: TransportSink,
    A: ArchivalMover,
{
    let start = Instant::now();

    // --- Phase 1: List documents ---
    progress.phase("Listing documents");
    let documents = bounded("list documents", config.timeout, source.list_documents(selector))
        .await
        .map_err(|e| match e {
            DigestError::SourceUnavailable { .. } => e,
            other => DigestError::source_unavailable(other.to_string()),
        })?;

    info!(count = documents.len(), "documents selected");

    if documents.is_empty() {
        return Ok(finish(empty_report(Vec::new(), start), progress));
    }

    // --- Phase 2: Deduplicate ---
    progress.phase("Deduplicating paragraphs");
    let (registry, skipped) = build_registry(&documents, progress);
    let stats = registry.stats();

    if stats.total_emails == 0 {
        warn!(skipped = skipped.len(), "no document could be processed");
        return Ok(finish(empty_report(skipped, start), progress));
    }

    info!(
        emails = stats.total_emails,
        paragraphs = stats.total_paragraphs,
        unique = stats.unique_paragraphs,
        duplicates = stats.duplicate_paragraphs,
        "dedup pass complete"
    );

    // --- Phase 3: Assemble ---
    progress.phase("Assembling compendium");
    let text = compendium::assemble(
        &registry,
        &RunMetadata {
            title: &config.title,
            date_label: &selector.label,
            priority: &config.priority,
        },
    );

    // --- Phase 4: Deliver ---
    let delivery = if config.dry_run {
        info!("dry run, not sending");
        Delivery::DryRun
    } else if config.skip_send {
        info!("sending skipped");
        Delivery::Skipped
    } else {
        progress.phase("Sending compendium");
        deliver(config, sink, &text).await?
    };

    // --- Phase 5: Archive ---
    let processed: Vec<&Document> = documents
        .iter()
        .filter(|d| !skipped.contains(&d.meta.source_id))
        .collect();

    let (archived, archive_failures) = match delivery {
        Delivery::Sent | Delivery::Skipped => {
            progress.phase("Archiving documents");
            archive_all(config.timeout, mover, &processed).await
        }
        _ => (0, 0),
    };

    let report = RunReport {
        stats,
        compendium: Some(text),
        delivery,
        skipped,
        archived,
        archive_failures,
        elapsed: start.elapsed(),
    };

    info!(
        archived = report.archived,
        archive_failures = report.archive_failures,
        elapsed_ms = report.elapsed.as_millis(),
        "digest run complete"
    );

    Ok(finish(report, progress))
}

/// Send the compendium; on failure write the fallback copy.
///
/// Only a failed fallback write is returned as an error.
async fn deliver<T: TransportSink>(config: &RunConfig, sink: &T, text: &str) -> Result<Delivery> {
    let sent = bounded(
        "send",
        config.timeout,
        sink.send(text, &config.subject, &config.recipient),
    )
    .await;

    match sent {
        Ok(()) => {
            info!(recipient = %config.recipient, "compendium sent");
            Ok(Delivery::Sent)
        }
        Err(e) => {
            let error = match e {
                DigestError::Sink(msg) => msg,
                other => other.to_string(),
            };
            warn!(%error, "send failed, writing fallback copy");
            let path = compendium::write_fallback(&config.fallback_dir, text, chrono::Utc::now())?;
            Ok(Delivery::Fallback { path, error })
        }
    }
}

/// Archive each document independently. Returns `(archived, failed)`.
async fn archive_all<A: ArchivalMover>(
    limit: Duration,
    mover: &A,
    documents: &[&Document],
) -> (usize, usize) {
    let mut archived = 0;
    let mut failed = 0;

    for document in documents {
        let source_id = &document.meta.source_id;
        match bounded("archive", limit, mover.archive(&document.meta)).await {
            Ok(()) => archived += 1,
            Err(e) => {
                warn!(%source_id, error = %e, "archive failed");
                failed += 1;
            }
        }
    }

    (archived, failed)
}

/// Await a collaborator call with an upper time bound.
async fn bounded<T, F>(operation: &str, limit: Duration, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    tokio::time::timeout(limit, fut)
        .await
        .map_err(|_| DigestError::Timeout {
            operation: operation.to_string(),
            secs: limit.as_secs(),
        })?
}

fn empty_report(skipped: Vec<String>, start: Instant) -> RunReport {
    RunReport {
        stats: Stats::default(),
        compendium: None,
        delivery: Delivery::NotAttempted,
        skipped,
        archived: 0,
        archive_failures: 0,
        elapsed: start.elapsed(),
    }
}

fn finish(report: RunReport, progress: &dyn ProgressReporter) -> RunReport {
    progress.done(&report);
    report
}

/// Sections of a single document with the paragraphs that survive
/// extraction, before any deduplication. Used for diagnostics.
pub fn document_sections(document: &Document) -> Result<Vec<(SectionPath, Vec<String>)>> {
    let body = digestmerge_text::plain_text_body(&document.raw_body, &document.meta.source_id)?;
    let sections = digestmerge_text::segment(&body);
    Ok(sections
        .iter()
        .map(|(path, blocks)| {
            let paragraphs = blocks
                .iter()
                .flat_map(|b| digestmerge_text::extract_paragraphs(b))
                .map(str::to_string)
                .collect();
            (path.clone(), paragraphs)
        })
        .collect())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
