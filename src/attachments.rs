//! Local mirroring of post media.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use sha2::{Digest, Sha256};
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

use crate::constants::{ATTACHMENTS_DIR_NAME, ATTACHMENT_TIMEOUT_SECS, MAX_ATTACHMENT_BYTES};
use crate::render::{AttachmentResolver, MediaKind};

/// Downloads attachments into one directory and hands back relative links.
///
/// Files already present are reused without a request, so resolving the
/// same URL twice is cheap and stable.
#[derive(Debug, Clone)]
pub struct AttachmentDownloader {
    http: reqwest::Client,
    dir: PathBuf,
    max_bytes: u64,
    timeout: Duration,
}

impl AttachmentDownloader {
    #[must_use]
    pub fn new(http: reqwest::Client, dir: impl Into<PathBuf>) -> Self {
        Self {
            http,
            dir: dir.into(),
            max_bytes: MAX_ATTACHMENT_BYTES,
            timeout: Duration::from_secs(ATTACHMENT_TIMEOUT_SECS),
        }
    }

    #[must_use]
    pub fn with_max_bytes(mut self, max_bytes: u64) -> Self {
        self.max_bytes = max_bytes;
        self
    }

    /// Limit for one whole download, from request to last byte.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Download `url` unless it is already on disk; returns the relative link.
    async fn fetch(&self, url: &str, kind: MediaKind) -> Result<String> {
        let known_name = match name_from_url(url) {
            Some(name) => Some(name),
            None => find_with_stem(&self.dir, &hashed_stem(url)).await,
        };

        if let Some(name) = &known_name {
            let path = self.dir.join(name);
            if tokio::fs::try_exists(&path).await.unwrap_or(false) {
                debug!(url = %url, path = %path.display(), "Attachment already downloaded");
                return Ok(format!("{ATTACHMENTS_DIR_NAME}/{name}"));
            }
        }

        tokio::fs::create_dir_all(&self.dir)
            .await
            .with_context(|| format!("Failed to create attachments directory: {}", self.dir.display()))?;

        let mut response = self
            .http
            .get(url)
            .timeout(self.timeout)
            .send()
            .await
            .context("Request failed")?
            .error_for_status()
            .context("Server returned an error")?;

        if let Some(length) = response.content_length() {
            if length > self.max_bytes {
                anyhow::bail!("attachment is {length} bytes, limit is {}", self.max_bytes);
            }
        }

        let file_name = known_name.unwrap_or_else(|| {
            let content_type = response
                .headers()
                .get(reqwest::header::CONTENT_TYPE)
                .and_then(|v| v.to_str().ok());
            file_name_for(url, content_type, kind)
        });
        let link = format!("{ATTACHMENTS_DIR_NAME}/{file_name}");
        let path = self.dir.join(&file_name);

        let mut part = path.as_os_str().to_owned();
        part.push(".part");
        let part = PathBuf::from(part);

        let result = async {
            let mut file = tokio::fs::File::create(&part)
                .await
                .with_context(|| format!("Failed to create {}", part.display()))?;
            let mut written = 0u64;
            while let Some(chunk) = response.chunk().await.context("Failed to read body")? {
                written += chunk.len() as u64;
                if written > self.max_bytes {
                    anyhow::bail!("attachment exceeded {} bytes", self.max_bytes);
                }
                file.write_all(&chunk).await.context("Failed to write attachment")?;
            }
            file.flush().await.context("Failed to flush attachment")?;
            Ok::<u64, anyhow::Error>(written)
        }
        .await;

        match result {
            Ok(bytes) => {
                tokio::fs::rename(&part, &path)
                    .await
                    .with_context(|| format!("Failed to move {} into place", part.display()))?;
                debug!(url = %url, kind = %kind, bytes, path = %path.display(), "Downloaded attachment");
                Ok(link)
            }
            Err(e) => {
                let _ = tokio::fs::remove_file(&part).await;
                Err(e)
            }
        }
    }
}

#[async_trait]
impl AttachmentResolver for AttachmentDownloader {
    async fn resolve(&self, url: &str, kind: MediaKind) -> String {
        match self.fetch(url, kind).await {
            Ok(link) => link,
            Err(e) => {
                warn!(url = %url, kind = %kind, "Failed to download attachment, linking original: {e:#}");
                url.to_string()
            }
        }
    }
}

/// Local file name for an attachment URL.
///
/// Uses the last path segment with unsafe characters replaced. URLs without
/// one get a name derived from a hash of the URL, with the extension taken
/// from `content_type` when it is known.
#[must_use]
pub fn file_name_for(url: &str, content_type: Option<&str>, kind: MediaKind) -> String {
    name_from_url(url).unwrap_or_else(|| format!("{}.{}", hashed_stem(url), extension_for(content_type, kind)))
}

fn name_from_url(url: &str) -> Option<String> {
    let segment = url::Url::parse(url)
        .ok()
        .and_then(|u| {
            u.path_segments()
                .and_then(|mut segments| segments.next_back().map(ToString::to_string))
        })
        .filter(|s| !s.is_empty());

    if let Some(segment) = segment {
        let decoded = urlencoding::decode(&segment).map_or(segment.clone(), |s| s.into_owned());
        let sanitized: String = decoded
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        let trimmed = sanitized.trim_start_matches('.');
        if !trimmed.is_empty() {
            return Some(trimmed.to_string());
        }
    }
    None
}

fn hashed_stem(url: &str) -> String {
    let digest = hex::encode(Sha256::digest(url.as_bytes()));
    digest[..16].to_string()
}

/// File extension for a response `Content-Type`, or the usual one for `kind`.
fn extension_for(content_type: Option<&str>, kind: MediaKind) -> &'static str {
    let default = match kind {
        MediaKind::Image => "jpg",
        MediaKind::Video => "mp4",
        MediaKind::Audio => "mp3",
    };

    let essence = content_type
        .and_then(|ct| ct.split(';').next())
        .map(|ct| ct.trim().to_ascii_lowercase());
    let Some(extensions) = essence.as_deref().and_then(mime_guess::get_mime_extensions_str) else {
        return default;
    };

    if extensions.contains(&default) {
        default
    } else {
        extensions.first().copied().unwrap_or(default)
    }
}

/// An already downloaded file named `<stem>.<ext>` in `dir`.
async fn find_with_stem(dir: &Path, stem: &str) -> Option<String> {
    let prefix = format!("{stem}.");
    let mut entries = tokio::fs::read_dir(dir).await.ok()?;
    while let Ok(Some(entry)) = entries.next_entry().await {
        let name = entry.file_name().to_string_lossy().into_owned();
        if name.starts_with(&prefix) && !name.ends_with(".part") {
            return Some(name);
        }
    }
    None
}
