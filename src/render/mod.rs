//! Conversion of posts into Markdown lines.
//!
//! The renderer never touches the network. Media that should be stored
//! locally is handed to an [`AttachmentResolver`], which returns either a
//! relative path to embed or the original URL.

mod hosts;
mod legacy;

use std::fmt;

use async_trait::async_trait;
use chrono_tz::Tz;

use crate::post::{ContentBlock, Post, TextSubtype};

pub use hosts::{is_external, is_playlist_eligible};

/// Kind of media an attachment holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MediaKind {
    Image,
    Video,
    Audio,
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Image => "image",
            Self::Video => "video",
            Self::Audio => "audio",
        })
    }
}

/// Maps a remote media URL to the string embedded in the document.
///
/// Implementations return a relative path when the file is available
/// locally and the original URL otherwise. Resolving the same URL twice
/// must yield the same result without fetching it again.
#[async_trait]
pub trait AttachmentResolver: Send + Sync {
    async fn resolve(&self, url: &str, kind: MediaKind) -> String;
}

/// Which media to mirror locally and whether to collect playlist links.
///
/// There is intentionally no `Default`: every flag must be chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderPolicy {
    pub download_images: bool,
    pub download_videos: bool,
    pub download_audio: bool,
    pub collect_external_video_links: bool,
}

/// Order in which reblog trail entries are written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TrailOrder {
    /// API order: the original poster first, the most recent reblogger last.
    #[default]
    OriginalFirst,
    MostRecentFirst,
}

/// An attachment the renderer asked the resolver for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttachmentRequest {
    pub url: String,
    pub kind: MediaKind,
}

/// Rendered lines plus everything collected on the side.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RenderedDocument {
    pub lines: Vec<String>,
    pub attachments: Vec<AttachmentRequest>,
    /// External video links eligible for the playlist, one entry per occurrence.
    pub playlist_urls: Vec<String>,
}

impl RenderedDocument {
    /// Append another document's lines and side channels.
    pub fn extend(&mut self, other: Self) {
        self.lines.extend(other.lines);
        self.attachments.extend(other.attachments);
        self.playlist_urls.extend(other.playlist_urls);
    }

    /// The document text, newline-terminated.
    #[must_use]
    pub fn to_markdown(&self) -> String {
        let mut text = self.lines.join("\n");
        text.push('\n');
        text
    }

    fn blank(&mut self) {
        self.lines.push(String::new());
    }
}

/// Renders posts under a fixed policy and time zone.
pub struct ContentRenderer<'a> {
    policy: RenderPolicy,
    tz: Tz,
    trail_order: TrailOrder,
    resolver: &'a dyn AttachmentResolver,
}

impl<'a> ContentRenderer<'a> {
    #[must_use]
    pub fn new(policy: RenderPolicy, tz: Tz, resolver: &'a dyn AttachmentResolver) -> Self {
        Self {
            policy,
            tz,
            trail_order: TrailOrder::default(),
            resolver,
        }
    }

    #[must_use]
    pub fn with_trail_order(mut self, order: TrailOrder) -> Self {
        self.trail_order = order;
        self
    }

    /// Render one post.
    ///
    /// NPF content (trail, then own content) takes precedence; the legacy
    /// fields are only used when both are empty.
    pub async fn render_post(&self, post: &Post, include_heading: bool) -> RenderedDocument {
        let mut doc = RenderedDocument::default();

        if include_heading {
            let time = post.local_datetime(self.tz).format("%H:%M");
            doc.lines.push(format!("## {time}"));
            doc.blank();
        }

        if !post.tags.is_empty() {
            let tags = post
                .tags
                .iter()
                .map(|tag| format!("`{tag}`"))
                .collect::<Vec<_>>()
                .join(", ");
            doc.lines.push(format!("Tags: {tags}"));
            doc.blank();
        }

        let mut trail: Vec<_> = post.trail.iter().collect();
        if self.trail_order == TrailOrder::MostRecentFirst {
            trail.reverse();
        }
        for entry in trail {
            doc.lines.push(format!("{}:", entry.blog_name));
            self.write_blocks(&entry.content, 1, &mut doc).await;
            doc.blank();
        }

        if !post.content.is_empty() {
            self.write_blocks(&post.content, 0, &mut doc).await;
        } else if post.trail.is_empty() {
            self.write_legacy(post, &mut doc).await;
        }

        doc
    }

    /// Render a sequence of blocks at the given quote depth.
    pub async fn render_blocks(&self, blocks: &[ContentBlock], quote_level: usize) -> RenderedDocument {
        let mut doc = RenderedDocument::default();
        self.write_blocks(blocks, quote_level, &mut doc).await;
        doc
    }

    async fn write_blocks(&self, blocks: &[ContentBlock], quote_level: usize, doc: &mut RenderedDocument) {
        let prefix = ">".repeat(quote_level);

        for (i, block) in blocks.iter().enumerate() {
            let lines = self.block_lines(block, &prefix, doc).await;
            let produced = !lines.is_empty();
            doc.lines.extend(lines);
            if produced && i + 1 < blocks.len() {
                doc.lines.push(prefix.clone());
            }
        }
    }

    async fn block_lines(&self, block: &ContentBlock, prefix: &str, doc: &mut RenderedDocument) -> Vec<String> {
        match block {
            ContentBlock::Text { text, subtype } => {
                if text.is_empty() {
                    return Vec::new();
                }
                apply_subtype(text, *subtype)
                    .split('\n')
                    .map(|line| format!("{prefix}{line}"))
                    .collect()
            }
            ContentBlock::Image { media } => match media.first().filter(|m| !m.url.is_empty()) {
                Some(candidate) => {
                    let target = self.media_target(&candidate.url, MediaKind::Image, doc).await;
                    vec![format!("{prefix}![Image]({target})")]
                }
                None => Vec::new(),
            },
            ContentBlock::Video { url: Some(url) } if !url.is_empty() => {
                let target = self.media_target(url, MediaKind::Video, doc).await;
                vec![format!("{prefix}[Video]({target})")]
            }
            ContentBlock::Audio { url: Some(url) } if !url.is_empty() => {
                let target = self.media_target(url, MediaKind::Audio, doc).await;
                vec![format!("{prefix}[Audio]({target})")]
            }
            ContentBlock::Link { url, title } if !url.is_empty() => {
                let title = title.as_deref().filter(|t| !t.is_empty()).unwrap_or(url);
                vec![format!("{prefix}[{title}]({url})")]
            }
            ContentBlock::Video { .. }
            | ContentBlock::Audio { .. }
            | ContentBlock::Link { .. }
            | ContentBlock::Unsupported => Vec::new(),
        }
    }

    /// Decide between a local copy and the remote URL for one media item,
    /// recording attachment and playlist side effects on `doc`.
    async fn media_target(&self, url: &str, kind: MediaKind, doc: &mut RenderedDocument) -> String {
        if kind == MediaKind::Video
            && self.policy.collect_external_video_links
            && is_playlist_eligible(url)
        {
            doc.playlist_urls.push(url.to_string());
        }

        let enabled = match kind {
            MediaKind::Image => self.policy.download_images,
            MediaKind::Video => self.policy.download_videos,
            MediaKind::Audio => self.policy.download_audio,
        };
        if !enabled || is_external(url, kind) {
            return url.to_string();
        }

        doc.attachments.push(AttachmentRequest {
            url: url.to_string(),
            kind,
        });
        self.resolver.resolve(url, kind).await
    }
}

fn apply_subtype(text: &str, subtype: Option<TextSubtype>) -> String {
    match subtype {
        Some(TextSubtype::Heading1) => format!("# {text}"),
        Some(TextSubtype::Heading2) => format!("## {text}"),
        Some(TextSubtype::Quote) => format!("> {text}"),
        Some(TextSubtype::Indented) => format!("  {text}"),
        Some(TextSubtype::Chat) => format!("**{text}**"),
        None => text.to_string(),
    }
}
