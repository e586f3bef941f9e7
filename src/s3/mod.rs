//! Mirrors the archive directory to S3-compatible storage.

mod multipart;

use std::path::Path;

use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::config::Config;
use crate::fs_utils::collect_files;

/// Outcome of one directory upload.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UploadSummary {
    pub uploaded: usize,
    pub failed: usize,
    pub bytes: u64,
}

#[derive(Clone)]
pub struct ArchiveUploader {
    client: aws_sdk_s3::Client,
    bucket: String,
    prefix: String,
}

impl ArchiveUploader {
    /// Create an uploader for the configured bucket, if any.
    ///
    /// Credentials come from the standard AWS provider chain. A custom
    /// endpoint (MinIO, R2, ...) switches to path-style addressing.
    pub async fn from_config(config: &Config) -> Option<Self> {
        let bucket = config.s3_bucket.clone()?;

        let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .region(aws_config::Region::new(config.s3_region.clone()));
        if let Some(endpoint) = &config.s3_endpoint {
            loader = loader.endpoint_url(endpoint);
        }
        let aws_config = loader.load().await;

        let s3_config = aws_sdk_s3::config::Builder::from(&aws_config)
            .force_path_style(config.s3_endpoint.is_some())
            .build();

        Some(Self {
            client: aws_sdk_s3::Client::from_conf(s3_config),
            bucket,
            prefix: config.s3_prefix.clone(),
        })
    }

    /// Upload every file under `root`, keyed by its path relative to `root`.
    ///
    /// Partial downloads and temp files are skipped. A failed file is
    /// logged and counted; the rest still go up.
    ///
    /// # Errors
    ///
    /// Returns an error only if `root` cannot be listed.
    pub async fn upload_dir(&self, root: &Path) -> Result<UploadSummary> {
        let files = collect_files(root)
            .await
            .with_context(|| format!("Failed to list {}", root.display()))?;

        let mut summary = UploadSummary::default();
        for path in files {
            if is_incomplete(&path) {
                continue;
            }
            let Some(key) = object_key(&self.prefix, root, &path) else {
                continue;
            };
            let content_type = mime_guess::from_path(&path).first_or_octet_stream().to_string();

            match multipart::upload_file(&self.client, &self.bucket, &key, &path, &content_type).await {
                Ok(bytes) => {
                    summary.uploaded += 1;
                    summary.bytes += bytes;
                }
                Err(e) => {
                    warn!(key = %key, "Upload failed: {e:#}");
                    summary.failed += 1;
                }
            }
        }

        info!(
            bucket = %self.bucket,
            uploaded = summary.uploaded,
            failed = summary.failed,
            "Finished uploading archive"
        );
        Ok(summary)
    }
}

impl std::fmt::Debug for ArchiveUploader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArchiveUploader")
            .field("bucket", &self.bucket)
            .field("prefix", &self.prefix)
            .finish_non_exhaustive()
    }
}

/// Bucket key for `path`: the prefix followed by the path relative to `root`
/// with forward slashes.
#[must_use]
pub fn object_key(prefix: &str, root: &Path, path: &Path) -> Option<String> {
    let relative = path.strip_prefix(root).ok()?;
    let parts: Vec<String> = relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    if parts.is_empty() {
        return None;
    }
    Some(format!("{prefix}{}", parts.join("/")))
}

fn is_incomplete(path: &Path) -> bool {
    path.extension()
        .is_some_and(|ext| ext == "part" || ext == "tmp")
}
