//! Host classification for embedded media.

use super::MediaKind;

/// Video hosts whose pages are linked rather than downloaded.
const EXTERNAL_VIDEO_HOSTS: &[&str] = &["youtube.com", "youtu.be", "vimeo.com", "instagram.com"];

/// Audio hosts whose pages are linked rather than downloaded.
const EXTERNAL_AUDIO_HOSTS: &[&str] = &["spotify.com", "soundcloud.com", "bandcamp.com"];

/// Video hosts whose links can be added to a YouTube playlist.
const PLAYLIST_HOSTS: &[&str] = &["youtube.com", "youtu.be"];

/// Whether `url` points at a third-party player for `kind` media.
///
/// Images are never external.
#[must_use]
pub fn is_external(url: &str, kind: MediaKind) -> bool {
    match kind {
        MediaKind::Image => false,
        MediaKind::Video => host_in(url, EXTERNAL_VIDEO_HOSTS),
        MediaKind::Audio => host_in(url, EXTERNAL_AUDIO_HOSTS),
    }
}

/// Whether a video URL can be published to a YouTube playlist.
#[must_use]
pub fn is_playlist_eligible(url: &str) -> bool {
    host_in(url, PLAYLIST_HOSTS)
}

/// Extract the lowercase host from a URL.
fn extract_host(url: &str) -> Option<String> {
    url::Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(str::to_ascii_lowercase))
}

/// Host equals one of `domains` or is a subdomain of one.
fn host_in(url: &str, domains: &[&str]) -> bool {
    let Some(host) = extract_host(url) else {
        return false;
    };
    domains
        .iter()
        .any(|domain| host == *domain || host.ends_with(&format!(".{domain}")))
}
