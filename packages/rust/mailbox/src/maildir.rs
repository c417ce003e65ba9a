//! Maildir-backed document source and archival mover.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use tracing::{debug, info, instrument, warn};

use digestmerge_core::ports::{ArchivalMover, DocumentSource};
use digestmerge_shared::{DateRange, DigestError, Document, DocumentMeta, Result};
use digestmerge_text::{ParsedMessage, decode_text};

// ---------------------------------------------------------------------------
// Source
// ---------------------------------------------------------------------------

/// Reads digest messages from a Maildir (`cur/` and `new/`), or from a plain
/// directory of message files when neither subdirectory exists.
#[derive(Debug, Clone)]
pub struct MaildirSource {
    root: PathBuf,
    senders: Vec<String>,
}

impl MaildirSource {
    /// Create a source. `senders` are case-insensitive `From:` substrings;
    /// empty selects every message.
    pub fn new(root: impl Into<PathBuf>, senders: Vec<String>) -> Self {
        Self {
            root: root.into(),
            senders: senders.into_iter().map(|s| s.to_lowercase()).collect(),
        }
    }

    fn scan_dirs(&self) -> Vec<PathBuf> {
        let subdirs: Vec<PathBuf> = ["cur", "new"]
            .iter()
            .map(|d| self.root.join(d))
            .filter(|p| p.is_dir())
            .collect();
        if subdirs.is_empty() {
            vec![self.root.clone()]
        } else {
            subdirs
        }
    }

    fn sender_matches(&self, from: Option<&str>) -> bool {
        if self.senders.is_empty() {
            return true;
        }
        let Some(from) = from else {
            return false;
        };
        let from = from.to_lowercase();
        self.senders.iter().any(|s| from.contains(s.as_str()))
    }

    async fn read_document(&self, path: &Path) -> Option<(Document, Option<String>)> {
        let source_id = path.to_string_lossy().to_string();

        let bytes = match tokio::fs::read(path).await {
            Ok(b) => b,
            Err(e) => {
                warn!(%source_id, error = %e, "unreadable message file, skipping");
                return None;
            }
        };
        let raw_body = decode_text(&bytes, &source_id);

        let parsed = ParsedMessage::parse(&raw_body, &source_id).ok();
        let from = parsed
            .as_ref()
            .and_then(|m| m.header("From"))
            .map(str::to_string);
        let header_date = parsed
            .as_ref()
            .and_then(|m| m.header("Date"))
            .and_then(parse_mail_date);

        let received_at = match header_date {
            Some(d) => d,
            None => file_mtime(path).await.unwrap_or_else(Utc::now),
        };

        Some((
            Document {
                raw_body,
                meta: DocumentMeta {
                    received_at,
                    source_id,
                },
            },
            from,
        ))
    }
}

impl DocumentSource for MaildirSource {
    #[instrument(skip_all, fields(root = %self.root.display(), range = %selector))]
    async fn list_documents(&self, selector: &DateRange) -> Result<Vec<Document>> {
        if !self.root.is_dir() {
            return Err(DigestError::source_unavailable(format!(
                "maildir {} does not exist",
                self.root.display()
            )));
        }

        let mut documents = Vec::new();
        let mut seen_files = 0usize;

        for dir in self.scan_dirs() {
            let mut entries = tokio::fs::read_dir(&dir).await.map_err(|e| {
                DigestError::source_unavailable(format!("cannot list {}: {e}", dir.display()))
            })?;

            while let Some(entry) = entries.next_entry().await.map_err(|e| {
                DigestError::source_unavailable(format!("cannot list {}: {e}", dir.display()))
            })? {
                let path = entry.path();
                let hidden = entry.file_name().to_string_lossy().starts_with('.');
                let is_file = entry.file_type().await.map(|t| t.is_file()).unwrap_or(false);
                if hidden || !is_file {
                    continue;
                }
                seen_files += 1;

                let Some((document, from)) = self.read_document(&path).await else {
                    continue;
                };
                if !selector.contains(&document.meta.received_at) {
                    continue;
                }
                if !self.sender_matches(from.as_deref()) {
                    debug!(source_id = %document.meta.source_id, "sender not selected");
                    continue;
                }
                documents.push(document);
            }
        }

        documents.sort_by(|a, b| {
            a.meta
                .received_at
                .cmp(&b.meta.received_at)
                .then_with(|| a.meta.source_id.cmp(&b.meta.source_id))
        });

        info!(files = seen_files, selected = documents.len(), "maildir scanned");
        Ok(documents)
    }

    fn name(&self) -> &str {
        "maildir"
    }
}

/// Parse an RFC 2822 `Date:` value, tolerating a trailing `(comment)`.
fn parse_mail_date(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    let without_comment = match value.rfind('(') {
        Some(i) if value.ends_with(')') => value[..i].trim_end(),
        _ => value,
    };
    DateTime::parse_from_rfc2822(without_comment)
        .ok()
        .map(|d| d.with_timezone(&Utc))
}

async fn file_mtime(path: &Path) -> Option<DateTime<Utc>> {
    let modified = tokio::fs::metadata(path).await.ok()?.modified().ok()?;
    Some(DateTime::<Utc>::from(modified))
}

// ---------------------------------------------------------------------------
// Archiver
// ---------------------------------------------------------------------------

/// Moves processed messages into `<archive_root>/cur/`, keeping file names.
#[derive(Debug, Clone)]
pub struct MaildirArchiver {
    archive_root: PathBuf,
}

impl MaildirArchiver {
    /// Create an archiver rooted at `archive_root`.
    pub fn new(archive_root: impl Into<PathBuf>) -> Self {
        Self {
            archive_root: archive_root.into(),
        }
    }
}

impl ArchivalMover for MaildirArchiver {
    async fn archive(&self, document: &DocumentMeta) -> Result<()> {
        let source_id = &document.source_id;
        let source = PathBuf::from(source_id);
        let name = source
            .file_name()
            .ok_or_else(|| DigestError::archive(source_id, "source id has no file name"))?;

        let target_dir = self.archive_root.join("cur");
        tokio::fs::create_dir_all(&target_dir)
            .await
            .map_err(|e| DigestError::archive(source_id, format!("{}: {e}", target_dir.display())))?;
        let target = target_dir.join(name);

        if let Err(rename_err) = tokio::fs::rename(&source, &target).await {
            debug!(%source_id, error = %rename_err, "rename failed, copying instead");
            tokio::fs::copy(&source, &target)
                .await
                .map_err(|e| DigestError::archive(source_id, e.to_string()))?;
            tokio::fs::remove_file(&source)
                .await
                .map_err(|e| DigestError::archive(source_id, e.to_string()))?;
        }

        debug!(%source_id, target = %target.display(), "archived");
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn temp_dir() -> PathBuf {
        let dir = std::env::temp_dir().join(format!("dm-maildir-test-{}", uuid::Uuid::now_v7()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn write_message(dir: &Path, name: &str, from: &str, date: &str, body: &str) -> PathBuf {
        std::fs::create_dir_all(dir).unwrap();
        let path = dir.join(name);
        let raw = format!("From: {from}\nDate: {date}\nSubject: Digest\n\n{body}");
        std::fs::write(&path, raw).unwrap();
        path
    }

    fn march(since: u32, until: u32) -> DateRange {
        DateRange::parse_relative(
            &format!("2025-03-{since:02}..2025-03-{until:02}"),
            NaiveDate::from_ymd_opt(2025, 3, 31).unwrap(),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn lists_cur_and_new_in_date_order() {
        let root = temp_dir();
        write_message(
            &root.join("cur"),
            "b",
            "news@example.com",
            "Tue, 4 Mar 2025 08:00:00 +0000",
            "GENERAL\nsecond\n",
        );
        write_message(
            &root.join("new"),
            "a",
            "news@example.com",
            "Mon, 3 Mar 2025 08:00:00 +0000",
            "GENERAL\nfirst\n",
        );
        write_message(
            &root.join("cur"),
            "c",
            "news@example.com",
            "Mon, 10 Mar 2025 08:00:00 +0000",
            "GENERAL\nout of range\n",
        );

        let source = MaildirSource::new(&root, vec![]);
        let docs = source.list_documents(&march(1, 7)).await.unwrap();

        let names: Vec<&str> = docs
            .iter()
            .map(|d| Path::new(&d.meta.source_id).file_name().unwrap().to_str().unwrap())
            .collect();
        assert_eq!(names, vec!["a", "b"]);
        assert!(docs[0].raw_body.contains("first"));

        let _ = std::fs::remove_dir_all(&root);
    }

    #[tokio::test]
    async fn plain_directory_is_scanned_when_no_maildir_subdirs() {
        let root = temp_dir();
        write_message(
            &root,
            "only",
            "news@example.com",
            "Mon, 3 Mar 2025 08:00:00 +0000 (UTC)",
            "body\n",
        );
        std::fs::write(root.join(".hidden"), "From: x\n\nignored").unwrap();

        let docs = MaildirSource::new(&root, vec![])
            .list_documents(&march(3, 3))
            .await
            .unwrap();
        assert_eq!(docs.len(), 1);

        let _ = std::fs::remove_dir_all(&root);
    }

    #[tokio::test]
    async fn sender_filter_selects_matching_from() {
        let root = temp_dir();
        let date = "Mon, 3 Mar 2025 08:00:00 +0000";
        write_message(&root.join("cur"), "keep", "Morning Brew <crew@MorningBrew.com>", date, "x\n");
        write_message(&root.join("cur"), "drop", "friend@example.com", date, "y\n");

        let source = MaildirSource::new(&root, vec!["morningbrew.com".into()]);
        let docs = source.list_documents(&march(1, 7)).await.unwrap();
        assert_eq!(docs.len(), 1);
        assert!(docs[0].meta.source_id.ends_with("keep"));

        let _ = std::fs::remove_dir_all(&root);
    }

    #[tokio::test]
    async fn missing_root_is_source_unavailable() {
        let root = temp_dir().join("does-not-exist");
        let err = MaildirSource::new(&root, vec![])
            .list_documents(&DateRange::unbounded())
            .await
            .unwrap_err();
        assert!(matches!(err, DigestError::SourceUnavailable { .. }));
    }

    #[tokio::test]
    async fn invalid_utf8_is_replaced_not_fatal() {
        let root = temp_dir();
        std::fs::create_dir_all(root.join("cur")).unwrap();
        std::fs::write(
            root.join("cur").join("latin1"),
            b"From: a@b.c\nDate: Mon, 3 Mar 2025 08:00:00 +0000\n\ncaf\xe9 news\n".as_slice(),
        )
        .unwrap();

        let docs = MaildirSource::new(&root, vec![])
            .list_documents(&DateRange::unbounded())
            .await
            .unwrap();
        assert_eq!(docs.len(), 1);
        assert!(docs[0].raw_body.contains("caf\u{FFFD} news"));

        let _ = std::fs::remove_dir_all(&root);
    }

    #[test]
    fn mail_dates_parse_with_and_without_comment() {
        let plain = parse_mail_date("Mon, 3 Mar 2025 08:00:00 +0100").unwrap();
        assert_eq!(plain.to_rfc3339(), "2025-03-03T07:00:00+00:00");
        assert!(parse_mail_date("Mon, 3 Mar 2025 08:00:00 +0000 (UTC)").is_some());
        assert!(parse_mail_date("yesterday-ish").is_none());
    }

    #[tokio::test]
    async fn archiver_moves_into_cur() {
        let root = temp_dir();
        let message = write_message(
            &root.join("inbox").join("cur"),
            "msg1",
            "a@b.c",
            "Mon, 3 Mar 2025 08:00:00 +0000",
            "body\n",
        );
        let archiver = MaildirArchiver::new(root.join("archive"));
        let meta = DocumentMeta {
            received_at: Utc::now(),
            source_id: message.to_string_lossy().to_string(),
        };

        archiver.archive(&meta).await.unwrap();

        assert!(!message.exists());
        assert!(root.join("archive").join("cur").join("msg1").exists());

        let _ = std::fs::remove_dir_all(&root);
    }

    #[tokio::test]
    async fn archiving_missing_file_fails() {
        let root = temp_dir();
        let archiver = MaildirArchiver::new(root.join("archive"));
        let meta = DocumentMeta {
            received_at: Utc::now(),
            source_id: root.join("gone").to_string_lossy().to_string(),
        };
        let err = archiver.archive(&meta).await.unwrap_err();
        assert!(matches!(err, DigestError::Archive { .. }));

        let _ = std::fs::remove_dir_all(&root);
    }
}
