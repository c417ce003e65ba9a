//! Compendium assembly.
//!
//! Renders the registry into one plain-text document: header, sections in
//! priority-then-alphabetical order, and a statistics footer. Also writes
//! the fallback copy when delivery fails.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use tracing::{debug, info, instrument};

use digestmerge_shared::{DigestError, Result, SectionPath, Stats};

use crate::registry::Registry;

/// Width of the rule lines.
const RULE_WIDTH: usize = 80;

/// Run-level labels for the compendium header.
#[derive(Debug, Clone)]
pub struct RunMetadata<'a> {
    /// Title line.
    pub title: &'a str,
    /// Date-range label, as the selector was written.
    pub date_label: &'a str,
    /// Section keys emitted first, in order.
    pub priority: &'a [String],
}

/// Sections to emit, in order: priority entries that have content, then the
/// remaining non-empty sections in ascending key order.
///
/// Priority entries are normalised like section keys, so `"General"` matches
/// `GENERAL`.
pub fn section_order<'r>(registry: &'r Registry, priority: &[String]) -> Vec<&'r SectionPath> {
    let wanted: Vec<SectionPath> = priority.iter().map(|p| SectionPath::from_key(p)).collect();
    let mut order: Vec<&SectionPath> = Vec::new();

    for name in &wanted {
        if let Some((path, _)) = registry
            .sections()
            .find(|(path, paras)| *path == name && !paras.is_empty())
        {
            if !order.contains(&path) {
                order.push(path);
            }
        }
    }

    let rest = registry
        .sections()
        .filter(|(path, paras)| !paras.is_empty() && !wanted.contains(*path))
        .map(|(path, _)| path);
    order.extend(rest);

    order
}

/// Render the compendium text.
#[instrument(skip_all, fields(sections = registry.sections().count()))]
pub fn assemble(registry: &Registry, meta: &RunMetadata<'_>) -> String {
    let stats = registry.stats();
    let major_rule = "=".repeat(RULE_WIDTH);
    let minor_rule = "-".repeat(RULE_WIDTH);

    let mut out = String::new();
    out.push_str(meta.title);
    out.push('\n');
    out.push_str(&format!("Date range: {}\n", meta.date_label));
    out.push_str(&format!("Source documents: {}\n", stats.total_emails));
    out.push_str(&major_rule);
    out.push_str("\n\n");

    let order = section_order(registry, meta.priority);
    for path in &order {
        let paragraphs = registry.paragraphs(path.as_str()).unwrap_or_default();
        out.push_str(path.as_str());
        out.push('\n');
        out.push_str(&minor_rule);
        out.push_str("\n\n");
        for paragraph in paragraphs {
            out.push_str(paragraph);
            out.push_str("\n\n");
        }
        out.push('\n');
    }

    out.push_str(&major_rule);
    out.push('\n');
    out.push_str("End of compendium\n\n");
    out.push_str(&render_stats(&stats));

    debug!(sections = order.len(), len = out.len(), "compendium assembled");
    out
}

/// The statistics block that closes the compendium.
pub fn render_stats(stats: &Stats) -> String {
    format!(
        "Statistics\n\
         \x20 Total emails: {}\n\
         \x20 Total paragraphs: {}\n\
         \x20 Unique paragraphs: {}\n\
         \x20 Duplicate paragraphs: {}\n\
         \x20 Duplicate rate: {:.1}%\n",
        stats.total_emails,
        stats.total_paragraphs,
        stats.unique_paragraphs,
        stats.duplicate_paragraphs,
        stats.duplicate_rate(),
    )
}

/// Write the compendium into `dir` atomically (temp file, then rename).
///
/// Returns the final path, `compendium-YYYYMMDD-HHMMSS.txt`.
#[instrument(skip(text), fields(dir = %dir.display()))]
pub fn write_fallback(dir: &Path, text: &str, now: DateTime<Utc>) -> Result<PathBuf> {
    std::fs::create_dir_all(dir).map_err(|e| DigestError::io(dir, e))?;

    let filename = format!("compendium-{}.txt", now.format("%Y%m%d-%H%M%S"));
    let target = dir.join(&filename);
    let temp = dir.join(format!(".{filename}.tmp"));

    std::fs::write(&temp, text).map_err(|e| DigestError::io(&temp, e))?;
    std::fs::rename(&temp, &target).map_err(|e| DigestError::io(&target, e))?;

    info!(path = %target.display(), size = text.len(), "wrote fallback compendium");
    Ok(target)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
