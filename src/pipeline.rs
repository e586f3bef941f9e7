//! One backup run: fetch, archive by day, then the optional publish and
//! upload steps.

use std::collections::HashSet;
use std::future::Future;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{error, info, warn};

use crate::archive::{group_by_day, ArchiveWriter, DayOutcome, PostDeleter};
use crate::attachments::AttachmentDownloader;
use crate::config::Config;
use crate::constants::USER_AGENT;
use crate::s3::{ArchiveUploader, UploadSummary};
use crate::tumblr::TumblrClient;
use crate::youtube::{PlaylistPublisher, PlaylistSummary};

/// Totals for one run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub posts_fetched: usize,
    pub days_written: usize,
    pub days_skipped: usize,
    pub days_failed: usize,
    pub attachments: usize,
    pub deleted: usize,
    pub delete_failures: usize,
    /// Video links collected for the playlist, in first-seen order.
    pub playlist_urls: Vec<String>,
    pub playlist: Option<PlaylistSummary>,
    pub upload: Option<UploadSummary>,
}

pub struct BackupPipeline {
    config: Config,
    http: reqwest::Client,
    tumblr: TumblrClient,
}

impl BackupPipeline {
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built or no Tumblr
    /// credential is configured.
    pub fn new(config: Config) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(300))
            .build()
            .context("Failed to build HTTP client")?;
        let tumblr = TumblrClient::new(http.clone(), &config)?;

        Ok(Self { config, http, tumblr })
    }

    /// Replace the Tumblr client, e.g. to change its page delay.
    ///
    /// The client is re-authenticated at the start of every run.
    #[must_use]
    pub fn with_tumblr_client(mut self, tumblr: TumblrClient) -> Self {
        self.tumblr = tumblr;
        self
    }

    #[must_use]
    pub fn tumblr(&self) -> &TumblrClient {
        &self.tumblr
    }

    /// Earliest post timestamp to fetch, or `None` for a full backup.
    fn cutoff(&self) -> Option<i64> {
        let hours = self.config.incremental_hours?;
        let seconds = i64::try_from(hours.saturating_mul(3600)).unwrap_or(i64::MAX);
        Some(chrono::Utc::now().timestamp().saturating_sub(seconds))
    }

    /// Run the whole backup once.
    ///
    /// Failures of individual days, the playlist step, and the upload are
    /// logged and reflected in the summary rather than aborting the run.
    ///
    /// # Errors
    ///
    /// Returns an error only if the output directory cannot be created.
    pub async fn run(&self) -> Result<RunSummary> {
        let output_dir = &self.config.output_dir;
        tokio::fs::create_dir_all(output_dir)
            .await
            .with_context(|| format!("Failed to create output directory: {}", output_dir.display()))?;

        let mut summary = RunSummary::default();

        let tumblr = match self.tumblr.authenticate().await {
            Ok(client) => client,
            Err(e) => {
                warn!("Failed to refresh Tumblr access token, using configured credentials: {e:#}");
                self.tumblr.clone()
            }
        };

        let posts = tumblr.fetch_all_posts(self.cutoff()).await;
        summary.posts_fetched = posts.len();
        if posts.is_empty() {
            info!("No posts to back up");
        }

        let writer = ArchiveWriter::new(output_dir, self.config.render_policy(), self.config.timezone)
            .with_trail_order(self.config.trail_order);
        let deleter: Option<&dyn PostDeleter> = if self.config.delete_after_backup {
            Some(&tumblr)
        } else {
            None
        };

        let mut seen_urls = HashSet::new();
        for (day, day_posts) in group_by_day(posts, self.config.timezone) {
            let downloader = AttachmentDownloader::new(self.http.clone(), writer.attachments_dir(&day));

            match writer.write_day(&day, &day_posts, &downloader, deleter).await {
                Ok(DayOutcome::Skipped { .. }) => summary.days_skipped += 1,
                Ok(DayOutcome::Written(report)) => {
                    summary.days_written += 1;
                    summary.attachments += report.attachments.len();
                    summary.deleted += report.deleted.len();
                    summary.delete_failures += report.delete_failures.len();
                    for url in report.playlist_urls {
                        if seen_urls.insert(url.clone()) {
                            summary.playlist_urls.push(url);
                        }
                    }
                }
                Err(e) => {
                    error!(day = %day, "Failed to archive day: {e:#}");
                    summary.days_failed += 1;
                }
            }
        }

        info!(
            posts = summary.posts_fetched,
            written = summary.days_written,
            skipped = summary.days_skipped,
            failed = summary.days_failed,
            attachments = summary.attachments,
            deleted = summary.deleted,
            "Archived posts"
        );

        if !summary.playlist_urls.is_empty() {
            if let Some(publisher) = PlaylistPublisher::from_config(self.http.clone(), &self.config) {
                match publisher.publish(&summary.playlist_urls).await {
                    Ok(result) => {
                        info!(
                            added = result.added,
                            skipped = result.skipped,
                            failed = result.failed,
                            "Updated YouTube playlist"
                        );
                        summary.playlist = Some(result);
                    }
                    Err(e) => warn!("Failed to update YouTube playlist: {e:#}"),
                }
            }
        }

        if let Some(uploader) = ArchiveUploader::from_config(&self.config).await {
            match uploader.upload_dir(output_dir).await {
                Ok(result) => summary.upload = Some(result),
                Err(e) => warn!("Failed to upload archive: {e:#}"),
            }
        }

        Ok(summary)
    }

    /// Run once, abandoning the run when `shutdown` completes first.
    ///
    /// Days already written stay on disk and are skipped next time.
    ///
    /// # Errors
    ///
    /// Returns an error if the run fails or is interrupted.
    pub async fn run_until(&self, shutdown: impl Future<Output = ()>) -> Result<RunSummary> {
        tokio::select! {
            biased;
            () = shutdown => anyhow::bail!("Backup interrupted before completion"),
            result = self.run() => result,
        }
    }
}

impl std::fmt::Debug for BackupPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackupPipeline")
            .field("output_dir", &self.config.output_dir)
            .field("tumblr", &self.tumblr)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cutoff() {
        let mut config = Config::for_testing();
        config.incremental_hours = None;
        assert_eq!(BackupPipeline::new(config.clone()).unwrap().cutoff(), None);

        config.incremental_hours = Some(5);
        let cutoff = BackupPipeline::new(config).unwrap().cutoff().unwrap();
        let expected = chrono::Utc::now().timestamp() - 5 * 3600;
        assert!((cutoff - expected).abs() <= 2);
    }

    #[tokio::test]
    async fn test_interrupted_run_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config {
            output_dir: dir.path().to_path_buf(),
            ..Config::for_testing()
        };
        let pipeline = BackupPipeline::new(config).unwrap();

        let err = pipeline.run_until(std::future::ready(())).await.unwrap_err();
        assert!(err.to_string().contains("interrupted"));
    }
}
