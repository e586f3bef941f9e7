use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono_tz::Tz;
use tracing::{debug, info, warn};

use super::{DayKey, PostDeleter};
use crate::constants::ARCHIVED_MIN_CHARS;
use crate::post::Post;
use crate::render::{AttachmentRequest, AttachmentResolver, ContentRenderer, RenderPolicy, RenderedDocument, TrailOrder};

/// Writes day documents under an archive root.
#[derive(Debug, Clone)]
pub struct ArchiveWriter {
    root: PathBuf,
    policy: RenderPolicy,
    tz: Tz,
    trail_order: TrailOrder,
}

/// What happened to one day.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DayOutcome {
    /// The day was already archived; nothing was rendered, written or deleted.
    Skipped { path: PathBuf },
    Written(DayReport),
}

/// Result of writing one day document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DayReport {
    pub path: PathBuf,
    pub post_count: usize,
    pub attachments: Vec<AttachmentRequest>,
    pub playlist_urls: Vec<String>,
    /// Ids of posts removed from the source.
    pub deleted: Vec<String>,
    /// Ids of posts whose deletion failed.
    pub delete_failures: Vec<String>,
}

impl ArchiveWriter {
    #[must_use]
    pub fn new(root: impl Into<PathBuf>, policy: RenderPolicy, tz: Tz) -> Self {
        Self {
            root: root.into(),
            policy,
            tz,
            trail_order: TrailOrder::default(),
        }
    }

    #[must_use]
    pub fn with_trail_order(mut self, order: TrailOrder) -> Self {
        self.trail_order = order;
        self
    }

    /// Absolute path of a day's document.
    #[must_use]
    pub fn document_path(&self, day: &DayKey) -> PathBuf {
        self.root.join(day.document_path())
    }

    /// Absolute path of the directory a day's attachments are stored in.
    #[must_use]
    pub fn attachments_dir(&self, day: &DayKey) -> PathBuf {
        self.root.join(day.attachments_dir())
    }

    /// Archive one day.
    ///
    /// Skips the day if its document already holds content. Otherwise the
    /// document is rendered in full and written in one step, after which
    /// each post is handed to `deleter`. Deletion is best-effort: failures
    /// are logged and reported but never undo the write.
    ///
    /// # Errors
    ///
    /// Returns an error if the existing document cannot be inspected or the
    /// new one cannot be written. No post is deleted in that case.
    pub async fn write_day(
        &self,
        day: &DayKey,
        posts: &[Post],
        resolver: &dyn AttachmentResolver,
        deleter: Option<&dyn PostDeleter>,
    ) -> Result<DayOutcome> {
        let path = self.document_path(day);

        if is_archived(&path).await? {
            debug!(day = %day, path = %path.display(), "Day already archived, skipping");
            return Ok(DayOutcome::Skipped { path });
        }

        let doc = self.render_day(day, posts, resolver).await;
        write_atomic(&path, &doc.to_markdown()).await?;
        info!(
            day = %day,
            posts = posts.len(),
            attachments = doc.attachments.len(),
            path = %path.display(),
            "Wrote day document"
        );

        let mut report = DayReport {
            path,
            post_count: posts.len(),
            attachments: doc.attachments,
            playlist_urls: doc.playlist_urls,
            deleted: Vec::new(),
            delete_failures: Vec::new(),
        };

        if let Some(deleter) = deleter {
            for post in posts {
                match deleter.delete_post(&post.id).await {
                    Ok(()) => {
                        debug!(post_id = %post.id, "Deleted archived post");
                        report.deleted.push(post.id.clone());
                    }
                    Err(e) => {
                        warn!(post_id = %post.id, day = %day, "Failed to delete archived post: {e:#}");
                        report.delete_failures.push(post.id.clone());
                    }
                }
            }
        }

        Ok(DayOutcome::Written(report))
    }

    /// Render the full day document: date heading, then each post separated
    /// by a horizontal rule.
    async fn render_day(&self, day: &DayKey, posts: &[Post], resolver: &dyn AttachmentResolver) -> RenderedDocument {
        let renderer = ContentRenderer::new(self.policy, self.tz, resolver).with_trail_order(self.trail_order);

        let mut doc = RenderedDocument::default();
        doc.lines.push(format!("# {day}"));
        doc.lines.push(String::new());

        for (i, post) in posts.iter().enumerate() {
            if i > 0 {
                doc.lines.extend([String::new(), "---".to_string(), String::new()]);
            }
            doc.extend(renderer.render_post(post, true).await);
        }

        doc
    }
}

/// Whether a day document exists with more than a trivial amount of content.
async fn is_archived(path: &Path) -> Result<bool> {
    match tokio::fs::read(path).await {
        Ok(bytes) => Ok(String::from_utf8_lossy(&bytes).chars().count() > ARCHIVED_MIN_CHARS),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(anyhow::Error::new(e))
            .with_context(|| format!("Failed to read day document: {}", path.display())),
    }
}

/// Write through a temporary sibling and rename, so a crash never leaves a
/// half-written document that a later run would mistake for a finished one.
async fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }

    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);

    tokio::fs::write(&tmp, contents)
        .await
        .with_context(|| format!("Failed to write {}", tmp.display()))?;
    tokio::fs::rename(&tmp, path)
        .await
        .with_context(|| format!("Failed to move {} into place", tmp.display()))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;
    use chrono::NaiveDate;
    use tempfile::TempDir;

    use super::*;
    use crate::post::ContentBlock;
    use crate::render::tests::{StubResolver, NO_DOWNLOADS};

    #[derive(Default)]
    struct RecordingDeleter {
        calls: Mutex<Vec<String>>,
        fail_on: Option<&'static str>,
    }

    #[async_trait]
    impl PostDeleter for RecordingDeleter {
        async fn delete_post(&self, post_id: &str) -> Result<()> {
            self.calls.lock().unwrap().push(post_id.to_string());
            if self.fail_on == Some(post_id) {
                anyhow::bail!("refused");
            }
            Ok(())
        }
    }

    fn day() -> DayKey {
        DayKey::new(NaiveDate::from_ymd_opt(2023, 11, 14).unwrap())
    }

    fn text_post(id: &str, timestamp: i64, body: &str) -> Post {
        Post {
            id: id.to_string(),
            timestamp,
            content: vec![ContentBlock::Text {
                text: body.to_string(),
                subtype: None,
            }],
            ..Post::default()
        }
    }

    fn posts() -> Vec<Post> {
        vec![
            text_post("1", 1_699_970_700, "hello"),
            text_post("2", 1_699_974_000, "world"),
        ]
    }

    #[tokio::test]
    async fn test_write_day_document_layout() {
        let dir = TempDir::new().unwrap();
        let writer = ArchiveWriter::new(dir.path(), NO_DOWNLOADS, chrono_tz::UTC);
        let resolver = StubResolver::default();

        let outcome = writer.write_day(&day(), &posts(), &resolver, None).await.unwrap();
        let DayOutcome::Written(report) = outcome else {
            panic!("expected day to be written");
        };
        assert_eq!(report.post_count, 2);
        assert_eq!(report.path, dir.path().join("2023/11/2023-11-14.md"));

        let contents = std::fs::read_to_string(&report.path).unwrap();
        assert_eq!(
            contents,
            "# 2023-11-14\n\n## 14:05\n\nhello\n\n---\n\n## 15:00\n\nworld\n"
        );
        assert!(!dir.path().join("2023/11/2023-11-14.md.tmp").exists());
    }

    #[tokio::test]
    async fn test_write_day_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let writer = ArchiveWriter::new(dir.path(), NO_DOWNLOADS, chrono_tz::UTC);
        let resolver = StubResolver::default();
        let deleter = RecordingDeleter::default();

        let first = writer
            .write_day(&day(), &posts(), &resolver, Some(&deleter))
            .await
            .unwrap();
        assert!(matches!(first, DayOutcome::Written(_)));
        let path = writer.document_path(&day());
        let written = std::fs::read(&path).unwrap();
        let modified = std::fs::metadata(&path).unwrap().modified().unwrap();
        assert_eq!(deleter.calls.lock().unwrap().len(), 2);

        let second = writer
            .write_day(&day(), &posts(), &resolver, Some(&deleter))
            .await
            .unwrap();
        assert_eq!(second, DayOutcome::Skipped { path: path.clone() });
        assert_eq!(std::fs::read(&path).unwrap(), written);
        assert_eq!(std::fs::metadata(&path).unwrap().modified().unwrap(), modified);
        assert_eq!(deleter.calls.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_trivial_existing_file_is_replaced() {
        let dir = TempDir::new().unwrap();
        let writer = ArchiveWriter::new(dir.path(), NO_DOWNLOADS, chrono_tz::UTC);
        let resolver = StubResolver::default();
        let path = writer.document_path(&day());
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        // Exactly at the threshold still counts as unarchived
        std::fs::write(&path, "0123456789").unwrap();

        let outcome = writer.write_day(&day(), &posts(), &resolver, None).await.unwrap();
        assert!(matches!(outcome, DayOutcome::Written(_)));
        assert!(std::fs::read_to_string(&path).unwrap().starts_with("# 2023-11-14"));
    }

    #[tokio::test]
    async fn test_existing_file_over_threshold_is_kept() {
        let dir = TempDir::new().unwrap();
        let writer = ArchiveWriter::new(dir.path(), NO_DOWNLOADS, chrono_tz::UTC);
        let resolver = StubResolver::default();
        let deleter = RecordingDeleter::default();
        let path = writer.document_path(&day());
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, "01234567890").unwrap();

        let outcome = writer
            .write_day(&day(), &posts(), &resolver, Some(&deleter))
            .await
            .unwrap();
        assert!(matches!(outcome, DayOutcome::Skipped { .. }));
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "01234567890");
        assert!(deleter.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_failed_deletion_does_not_stop_others() {
        let dir = TempDir::new().unwrap();
        let writer = ArchiveWriter::new(dir.path(), NO_DOWNLOADS, chrono_tz::UTC);
        let resolver = StubResolver::default();
        let deleter = RecordingDeleter {
            fail_on: Some("1"),
            ..RecordingDeleter::default()
        };

        let outcome = writer
            .write_day(&day(), &posts(), &resolver, Some(&deleter))
            .await
            .unwrap();
        let DayOutcome::Written(report) = outcome else {
            panic!("expected day to be written");
        };
        assert_eq!(*deleter.calls.lock().unwrap(), vec!["1", "2"]);
        assert_eq!(report.deleted, vec!["2"]);
        assert_eq!(report.delete_failures, vec!["1"]);
        assert!(report.path.exists());
    }
}
