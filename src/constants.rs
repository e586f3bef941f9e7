//! Shared constants used across the application.

/// User agent string sent with API and attachment requests.
pub const USER_AGENT: &str = concat!("blog-archiver/", env!("CARGO_PKG_VERSION"));

/// Name of the directory, next to each day document, that holds downloaded media.
pub const ATTACHMENTS_DIR_NAME: &str = "Attachments";

/// Attachments larger than this are linked instead of downloaded.
pub const MAX_ATTACHMENT_BYTES: u64 = 100 * 1024 * 1024;

/// A day document with more characters than this counts as already archived.
pub const ARCHIVED_MIN_CHARS: usize = 10;

/// Maximum page size accepted by the Tumblr posts endpoint.
pub const TUMBLR_PAGE_SIZE: usize = 20;

/// Each attachment download must finish within this many seconds.
pub const ATTACHMENT_TIMEOUT_SECS: u64 = 30;
