//! Fallback rendering for posts without NPF content.

use once_cell::sync::Lazy;
use regex::Regex;

use super::{ContentRenderer, MediaKind, RenderedDocument};
use crate::post::{Post, PostType};

static EMBED_SRC: Lazy<Regex> = Lazy::new(|| Regex::new(r#"src="([^"]+)""#).unwrap());

impl ContentRenderer<'_> {
    pub(super) async fn write_legacy(&self, post: &Post, doc: &mut RenderedDocument) {
        let legacy = &post.legacy;

        match post.post_type {
            PostType::Text => {
                if let Some(title) = &legacy.title {
                    doc.lines.push(format!("## {title}"));
                    doc.blank();
                }
                if let Some(body) = &legacy.body {
                    push_text(doc, body);
                }
            }
            PostType::Photo => {
                push_paragraph(doc, legacy.caption.as_deref());
                for url in &legacy.photos {
                    let target = self.media_target(url, MediaKind::Image, doc).await;
                    doc.lines.push(format!("![Photo]({target})"));
                    doc.blank();
                }
            }
            PostType::Quote => {
                doc.lines
                    .push(format!("> {}", legacy.text.as_deref().unwrap_or_default()));
                doc.blank();
                if let Some(source) = &legacy.source {
                    doc.lines.push(format!("— {source}"));
                    doc.blank();
                }
            }
            PostType::Link => {
                doc.lines.push(format!(
                    "## [{}]({})",
                    legacy.title.as_deref().unwrap_or_default(),
                    legacy.url.as_deref().unwrap_or_default()
                ));
                doc.blank();
                push_paragraph(doc, legacy.description.as_deref());
            }
            PostType::Video => {
                push_paragraph(doc, legacy.caption.as_deref());
                let url = legacy
                    .video_url
                    .clone()
                    .or_else(|| legacy.players.last().map(|code| embed_source(code)));
                if let Some(url) = url.filter(|u| !u.is_empty()) {
                    let target = self.media_target(&url, MediaKind::Video, doc).await;
                    doc.lines.push(format!("[Video]({target})"));
                    doc.blank();
                }
            }
            PostType::Audio => {
                if legacy.artist.is_some() || legacy.track_name.is_some() {
                    doc.lines.push(format!(
                        "## {} - {}",
                        legacy.artist.as_deref().unwrap_or_default(),
                        legacy.track_name.as_deref().unwrap_or_default()
                    ));
                    doc.blank();
                }
                push_paragraph(doc, legacy.caption.as_deref());
                let url = legacy.audio_url.as_ref().or(legacy.audio_source_url.as_ref());
                if let Some(url) = url {
                    let target = self.media_target(url, MediaKind::Audio, doc).await;
                    doc.lines.push(format!("[Audio]({target})"));
                    doc.blank();
                }
            }
            PostType::Unknown => {}
        }
    }
}

/// Pull the `src` attribute out of an embed snippet; a bare URL is returned as is.
fn embed_source(embed_code: &str) -> String {
    EMBED_SRC
        .captures(embed_code)
        .and_then(|c| c.get(1))
        .map_or_else(|| embed_code.to_string(), |m| m.as_str().to_string())
}

fn push_text(doc: &mut RenderedDocument, text: &str) {
    doc.lines.extend(text.split('\n').map(ToString::to_string));
}

fn push_paragraph(doc: &mut RenderedDocument, text: Option<&str>) {
    if let Some(text) = text {
        push_text(doc, text);
        doc.blank();
    }
}
