//! Integration tests for attachment downloads.

use std::time::{Duration, Instant};

use blog_archiver::attachments::AttachmentDownloader;
use blog_archiver::constants::ATTACHMENT_TIMEOUT_SECS;
use blog_archiver::render::{AttachmentResolver, MediaKind};
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[tokio::test]
async fn test_download_and_reuse() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/img/photo.png"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"png".to_vec()))
        .expect(1)
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let downloader = AttachmentDownloader::new(reqwest::Client::new(), dir.path().join("Attachments"));
    let url = format!("{}/img/photo.png", server.uri());

    let first = downloader.resolve(&url, MediaKind::Image).await;
    let second = downloader.resolve(&url, MediaKind::Image).await;

    assert_eq!(first, "Attachments/photo.png");
    assert_eq!(second, first);
    assert_eq!(std::fs::read(dir.path().join("Attachments/photo.png")).unwrap(), b"png");
}

#[tokio::test]
async fn test_failed_download_links_original() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/missing.mp4"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let downloader = AttachmentDownloader::new(reqwest::Client::new(), dir.path());
    let url = format!("{}/missing.mp4", server.uri());

    assert_eq!(downloader.resolve(&url, MediaKind::Video).await, url);
    assert!(!dir.path().join("missing.mp4").exists());
}

#[tokio::test]
async fn test_oversized_download_links_original() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/big.mp3"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![0u8; 2048]))
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let downloader = AttachmentDownloader::new(reqwest::Client::new(), dir.path()).with_max_bytes(1024);
    let url = format!("{}/big.mp3", server.uri());

    assert_eq!(downloader.resolve(&url, MediaKind::Audio).await, url);
    assert!(!dir.path().join("big.mp3").exists());
    assert!(!dir.path().join("big.mp3.part").exists());
}

#[tokio::test]
async fn test_existing_file_skips_request() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(500))
        .expect(0)
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("kept.jpg"), b"old").unwrap();
    let downloader = AttachmentDownloader::new(reqwest::Client::new(), dir.path());

    let link = downloader
        .resolve(&format!("{}/kept.jpg", server.uri()), MediaKind::Image)
        .await;
    assert_eq!(link, "Attachments/kept.jpg");
}

#[tokio::test]
async fn test_slow_download_links_original() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/slow.jpg"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_bytes(b"late".to_vec())
                .set_delay(Duration::from_secs(5)),
        )
        .mount(&server)
        .await;

    // Shared client with a much longer limit, as the pipeline builds it.
    let http = reqwest::Client::builder()
        .timeout(Duration::from_secs(300))
        .build()
        .unwrap();
    let dir = TempDir::new().unwrap();
    let downloader = AttachmentDownloader::new(http, dir.path()).with_timeout(Duration::from_millis(300));
    let url = format!("{}/slow.jpg", server.uri());

    let started = Instant::now();
    assert_eq!(downloader.resolve(&url, MediaKind::Image).await, url);
    assert!(started.elapsed() < Duration::from_secs(4));
    assert!(!dir.path().join("slow.jpg").exists());
}

#[test]
fn test_default_download_timeout() {
    assert_eq!(ATTACHMENT_TIMEOUT_SECS, 30);
}

#[tokio::test]
async fn test_unnamed_url_uses_content_type_extension() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(
            ResponseTemplate::new(200).set_body_raw(b"png".to_vec(), "image/png"),
        )
        .expect(1)
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let downloader = AttachmentDownloader::new(reqwest::Client::new(), dir.path());
    let url = format!("{}/", server.uri());

    let first = downloader.resolve(&url, MediaKind::Image).await;
    assert!(first.starts_with("Attachments/"), "{first}");
    assert!(first.ends_with(".png"), "{first}");

    // The hashed name is found again without a second request.
    assert_eq!(downloader.resolve(&url, MediaKind::Image).await, first);
}
