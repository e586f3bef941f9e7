//! Post model as returned by the Tumblr API in Neue Post Format.
//!
//! Deserialization is deliberately lenient: unknown block types, odd field
//! types and missing values degrade to empty data instead of failing the
//! whole post.

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Deserializer};
use serde_json::Value;

/// Legacy post type tag. Only consulted when a post has no NPF content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PostType {
    Text,
    Photo,
    Quote,
    Link,
    Video,
    Audio,
    #[default]
    #[serde(other)]
    Unknown,
}

/// One archived post.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(from = "RawPost")]
pub struct Post {
    pub id: String,
    /// Epoch seconds.
    pub timestamp: i64,
    pub post_type: PostType,
    pub tags: Vec<String>,
    /// The post's own content (what was added when posting or reblogging).
    pub content: Vec<ContentBlock>,
    /// Reblog chain, original poster first.
    pub trail: Vec<TrailEntry>,
    pub legacy: LegacyFields,
}

impl Post {
    /// Whether the post carries NPF content, in which case the legacy
    /// fields are ignored.
    #[must_use]
    pub fn has_structured_content(&self) -> bool {
        !self.content.is_empty() || !self.trail.is_empty()
    }

    /// Post time in the given zone. Out-of-range timestamps map to the epoch.
    #[must_use]
    pub fn local_datetime(&self, tz: Tz) -> DateTime<Tz> {
        DateTime::<Utc>::from_timestamp(self.timestamp, 0)
            .unwrap_or_default()
            .with_timezone(&tz)
    }
}

/// One reblog hop.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(from = "RawTrailEntry")]
pub struct TrailEntry {
    pub blog_name: String,
    pub content: Vec<ContentBlock>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaObject {
    pub url: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextSubtype {
    Heading1,
    Heading2,
    Quote,
    Indented,
    Chat,
}

impl TextSubtype {
    fn parse(value: &str) -> Option<Self> {
        match value {
            "heading1" => Some(Self::Heading1),
            "heading2" => Some(Self::Heading2),
            "quote" => Some(Self::Quote),
            "indented" => Some(Self::Indented),
            "chat" => Some(Self::Chat),
            _ => None,
        }
    }
}

/// A single NPF content block.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(from = "RawBlock")]
pub enum ContentBlock {
    Text {
        text: String,
        subtype: Option<TextSubtype>,
    },
    /// Candidates are ordered by preference; the first one is used.
    Image { media: Vec<MediaObject> },
    Video { url: Option<String> },
    Audio { url: Option<String> },
    Link { url: String, title: Option<String> },
    /// Block types this archiver does not render (polls, paywalls, ...).
    Unsupported,
}

/// Pre-NPF fields used by the legacy rendering fallback.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LegacyFields {
    pub title: Option<String>,
    pub body: Option<String>,
    pub caption: Option<String>,
    /// `original_size.url` of each photo, in order.
    pub photos: Vec<String>,
    pub text: Option<String>,
    pub source: Option<String>,
    pub url: Option<String>,
    pub description: Option<String>,
    pub video_url: Option<String>,
    /// Embed codes of the player variants, smallest first.
    pub players: Vec<String>,
    pub artist: Option<String>,
    pub track_name: Option<String>,
    pub audio_url: Option<String>,
    pub audio_source_url: Option<String>,
}

#[derive(Deserialize)]
struct RawPost {
    #[serde(default, deserialize_with = "lenient_string")]
    id_string: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    id: Option<String>,
    #[serde(default, deserialize_with = "lenient_i64")]
    timestamp: i64,
    #[serde(rename = "type", default)]
    post_type: PostType,
    #[serde(default, deserialize_with = "lenient_strings")]
    tags: Vec<String>,
    #[serde(default, deserialize_with = "lenient_vec")]
    content: Vec<ContentBlock>,
    #[serde(default, deserialize_with = "lenient_vec")]
    trail: Vec<TrailEntry>,

    #[serde(default, deserialize_with = "lenient_string")]
    title: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    body: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    caption: Option<String>,
    #[serde(default)]
    photos: Option<Value>,
    #[serde(default, deserialize_with = "lenient_string")]
    text: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    source: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    url: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    description: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    video_url: Option<String>,
    #[serde(default)]
    player: Option<Value>,
    #[serde(default, deserialize_with = "lenient_string")]
    artist: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    track_name: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    audio_url: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    audio_source_url: Option<String>,
}

impl From<RawPost> for Post {
    fn from(raw: RawPost) -> Self {
        let photos = raw
            .photos
            .as_ref()
            .and_then(Value::as_array)
            .map(|photos| {
                photos
                    .iter()
                    .filter_map(|p| p.pointer("/original_size/url").and_then(Value::as_str))
                    .filter(|url| !url.is_empty())
                    .map(ToString::to_string)
                    .collect()
            })
            .unwrap_or_default();

        // Audio posts carry a single embed string here; only video posts
        // have the list of player variants.
        let players = raw
            .player
            .as_ref()
            .and_then(Value::as_array)
            .map(|players| {
                players
                    .iter()
                    .filter_map(|p| p.get("embed_code").and_then(Value::as_str))
                    .filter(|code| !code.is_empty())
                    .map(ToString::to_string)
                    .collect()
            })
            .unwrap_or_default();

        Self {
            id: raw.id_string.or(raw.id).unwrap_or_default(),
            timestamp: raw.timestamp,
            post_type: raw.post_type,
            tags: raw.tags,
            content: raw.content,
            trail: raw.trail,
            legacy: LegacyFields {
                title: raw.title,
                body: raw.body,
                caption: raw.caption,
                photos,
                text: raw.text,
                source: raw.source,
                url: raw.url,
                description: raw.description,
                video_url: raw.video_url,
                players,
                artist: raw.artist,
                track_name: raw.track_name,
                audio_url: raw.audio_url,
                audio_source_url: raw.audio_source_url,
            },
        }
    }
}

#[derive(Deserialize)]
struct RawTrailEntry {
    #[serde(default)]
    blog: Option<Value>,
    #[serde(default, deserialize_with = "lenient_string")]
    broken_blog_name: Option<String>,
    #[serde(default, deserialize_with = "lenient_vec")]
    content: Vec<ContentBlock>,
}

impl From<RawTrailEntry> for TrailEntry {
    fn from(raw: RawTrailEntry) -> Self {
        let blog_name = raw
            .blog
            .as_ref()
            .and_then(|b| b.get("name"))
            .and_then(Value::as_str)
            .filter(|name| !name.is_empty())
            .map(ToString::to_string)
            .or(raw.broken_blog_name)
            .unwrap_or_else(|| "unknown".to_string());

        Self {
            blog_name,
            content: raw.content,
        }
    }
}

#[derive(Deserialize)]
struct RawBlock {
    #[serde(rename = "type", default, deserialize_with = "lenient_string")]
    kind: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    text: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    subtype: Option<String>,
    #[serde(default)]
    media: Option<Value>,
    #[serde(default, deserialize_with = "lenient_string")]
    url: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    title: Option<String>,
}

impl RawBlock {
    /// `media` is a list of candidates for images and a single object for
    /// video and audio.
    fn media_urls(&self) -> Vec<String> {
        let url_of = |v: &Value| {
            v.get("url")
                .and_then(Value::as_str)
                .filter(|url| !url.is_empty())
                .map(ToString::to_string)
        };
        match &self.media {
            Some(Value::Array(items)) => items.iter().filter_map(url_of).collect(),
            Some(item @ Value::Object(_)) => url_of(item).into_iter().collect(),
            _ => Vec::new(),
        }
    }
}

impl From<RawBlock> for ContentBlock {
    fn from(raw: RawBlock) -> Self {
        match raw.kind.as_deref() {
            Some("text") => Self::Text {
                subtype: raw.subtype.as_deref().and_then(TextSubtype::parse),
                text: raw.text.unwrap_or_default(),
            },
            Some("image") => Self::Image {
                media: raw
                    .media_urls()
                    .into_iter()
                    .map(|url| MediaObject { url })
                    .collect(),
            },
            Some("video") => Self::Video {
                url: raw.media_urls().into_iter().next().or(raw.url),
            },
            Some("audio") => Self::Audio {
                url: raw.media_urls().into_iter().next().or(raw.url),
            },
            Some("link") => Self::Link {
                url: raw.url.unwrap_or_default(),
                title: raw.title,
            },
            _ => Self::Unsupported,
        }
    }
}

/// Accept strings and numbers; anything else (null, `false`, objects) is absent.
fn lenient_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::String(s)) if !s.is_empty() => Some(s),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

fn lenient_i64<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::Number(n)) => n.as_i64().unwrap_or_default(),
        Some(Value::String(s)) => s.parse().unwrap_or_default(),
        _ => 0,
    })
}

fn lenient_strings<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::Array(items)) => items
            .into_iter()
            .filter_map(|v| match v {
                Value::String(s) => Some(s),
                _ => None,
            })
            .collect(),
        _ => Vec::new(),
    })
}

/// Deserialize a list element by element, dropping elements that fail.
fn lenient_vec<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: serde::de::DeserializeOwned,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::Array(items)) => items
            .into_iter()
            .filter_map(|v| serde_json::from_value(v).ok())
            .collect(),
        _ => Vec::new(),
    })
}
