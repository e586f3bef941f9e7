use std::path::PathBuf;
use std::str::FromStr;

use chrono_tz::Tz;
use thiserror::Error;

use crate::auth;
use crate::render::{RenderPolicy, TrailOrder};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),
    #[error("invalid value for {name}: {message}")]
    InvalidValue { name: String, message: String },
    #[error("failed to parse {name} as integer: {source}")]
    ParseInt {
        name: String,
        #[source]
        source: std::num::ParseIntError,
    },
    #[error("failed to parse {name} as boolean: {value}")]
    ParseBool { name: String, value: String },
}

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    // Tumblr
    pub tumblr_blog: String,
    pub tumblr_api_key: Option<String>,
    pub tumblr_access_token: Option<String>,
    pub tumblr_api_base: String,
    /// OAuth2 client and refresh token; when all three are set, a fresh
    /// access token is obtained at the start of each run.
    pub tumblr_client_id: Option<String>,
    pub tumblr_client_secret: Option<String>,
    pub tumblr_refresh_token: Option<String>,
    pub tumblr_token_url: String,
    /// Only fetch posts from the last N hours; `None` fetches everything.
    pub incremental_hours: Option<u64>,

    // Archive
    pub output_dir: PathBuf,
    pub timezone: Tz,
    pub trail_order: TrailOrder,
    pub download_images: bool,
    pub download_videos: bool,
    pub download_audio: bool,
    pub delete_after_backup: bool,

    // YouTube playlist
    pub collect_youtube_links: bool,
    pub youtube_client_id: Option<String>,
    pub youtube_client_secret: Option<String>,
    pub youtube_refresh_token: Option<String>,
    pub youtube_playlist_id: Option<String>,

    // S3 Storage
    pub s3_bucket: Option<String>,
    pub s3_region: String,
    pub s3_endpoint: Option<String>,
    pub s3_prefix: String,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if required environment variables are missing or invalid.
    pub fn from_env() -> Result<Self, ConfigError> {
        let incremental_hours = parse_env_u64("INCREMENTAL_HOURS", 5)?;

        Ok(Self {
            // Tumblr
            tumblr_blog: required_env("TUMBLR_BLOG")?,
            tumblr_api_key: optional_env("TUMBLR_API_KEY"),
            tumblr_access_token: optional_env("TUMBLR_ACCESS_TOKEN"),
            tumblr_api_base: env_or_default("TUMBLR_API_BASE", "https://api.tumblr.com/v2"),
            tumblr_client_id: optional_env("TUMBLR_CLIENT_ID"),
            tumblr_client_secret: optional_env("TUMBLR_CLIENT_SECRET"),
            tumblr_refresh_token: optional_env("TUMBLR_REFRESH_TOKEN"),
            tumblr_token_url: env_or_default("TUMBLR_TOKEN_URL", auth::TUMBLR.token_url),
            incremental_hours: (incremental_hours > 0).then_some(incremental_hours),

            // Archive
            output_dir: PathBuf::from(env_or_default("OUTPUT_DIR", "./backup")),
            timezone: parse_timezone(&env_or_default("TIMEZONE", "UTC"))?,
            trail_order: parse_trail_order(&env_or_default("TRAIL_ORDER", "original-first"))?,
            download_images: parse_env_bool("DOWNLOAD_IMAGES", false)?,
            download_videos: parse_env_bool("DOWNLOAD_VIDEOS", false)?,
            download_audio: parse_env_bool("DOWNLOAD_AUDIO", false)?,
            delete_after_backup: parse_env_bool("DELETE_AFTER_BACKUP", false)?,

            // YouTube playlist
            collect_youtube_links: parse_env_bool("COLLECT_YOUTUBE_LINKS", false)?,
            youtube_client_id: optional_env("YOUTUBE_CLIENT_ID"),
            youtube_client_secret: optional_env("YOUTUBE_CLIENT_SECRET"),
            youtube_refresh_token: optional_env("YOUTUBE_REFRESH_TOKEN"),
            youtube_playlist_id: optional_env("YOUTUBE_PLAYLIST_ID"),

            // S3 Storage
            s3_bucket: optional_env("S3_BUCKET"),
            s3_region: env_or_default("S3_REGION", "us-east-1"),
            s3_endpoint: optional_env("S3_ENDPOINT"),
            s3_prefix: env_or_default("S3_PREFIX", "tumblr/"),
        })
    }

    /// Configuration for tests: no downloads, no remote sinks.
    #[must_use]
    pub fn for_testing() -> Self {
        Self {
            tumblr_blog: "example".to_string(),
            tumblr_api_key: Some("test-key".to_string()),
            tumblr_access_token: None,
            tumblr_api_base: "http://127.0.0.1:1/v2".to_string(),
            tumblr_client_id: None,
            tumblr_client_secret: None,
            tumblr_refresh_token: None,
            tumblr_token_url: "http://127.0.0.1:1/v2/oauth2/token".to_string(),
            incremental_hours: None,
            output_dir: PathBuf::from("./backup"),
            timezone: Tz::UTC,
            trail_order: TrailOrder::OriginalFirst,
            download_images: false,
            download_videos: false,
            download_audio: false,
            delete_after_backup: false,
            collect_youtube_links: false,
            youtube_client_id: None,
            youtube_client_secret: None,
            youtube_refresh_token: None,
            youtube_playlist_id: None,
            s3_bucket: None,
            s3_region: "us-east-1".to_string(),
            s3_endpoint: None,
            s3_prefix: "tumblr/".to_string(),
        }
    }

    /// Validate that the configuration is usable.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.tumblr_blog.is_empty() {
            return Err(ConfigError::InvalidValue {
                name: "TUMBLR_BLOG".to_string(),
                message: "cannot be empty".to_string(),
            });
        }
        let has_oauth = self.tumblr_access_token.is_some() || self.tumblr_refresh_credentials().is_some();
        if self.tumblr_api_key.is_none() && !has_oauth {
            return Err(ConfigError::MissingEnvVar(
                "TUMBLR_API_KEY, TUMBLR_ACCESS_TOKEN or TUMBLR_REFRESH_TOKEN".to_string(),
            ));
        }
        if self.delete_after_backup && !has_oauth {
            return Err(ConfigError::InvalidValue {
                name: "DELETE_AFTER_BACKUP".to_string(),
                message: "requires TUMBLR_ACCESS_TOKEN or TUMBLR_CLIENT_ID, TUMBLR_CLIENT_SECRET and TUMBLR_REFRESH_TOKEN"
                    .to_string(),
            });
        }
        if self.collect_youtube_links && self.youtube_playlist_id.is_some() && self.youtube_credentials().is_none() {
            return Err(ConfigError::InvalidValue {
                name: "YOUTUBE_PLAYLIST_ID".to_string(),
                message: "requires YOUTUBE_CLIENT_ID, YOUTUBE_CLIENT_SECRET and YOUTUBE_REFRESH_TOKEN".to_string(),
            });
        }
        Ok(())
    }

    /// Rendering flags derived from the download and playlist settings.
    #[must_use]
    pub fn render_policy(&self) -> RenderPolicy {
        RenderPolicy {
            download_images: self.download_images,
            download_videos: self.download_videos,
            download_audio: self.download_audio,
            collect_external_video_links: self.collect_youtube_links,
        }
    }

    /// Tumblr `(client_id, client_secret, refresh_token)` when all three are set.
    #[must_use]
    pub fn tumblr_refresh_credentials(&self) -> Option<(&str, &str, &str)> {
        Some((
            self.tumblr_client_id.as_deref()?,
            self.tumblr_client_secret.as_deref()?,
            self.tumblr_refresh_token.as_deref()?,
        ))
    }

    /// `(client_id, client_secret, refresh_token)` when all three are set.
    #[must_use]
    pub fn youtube_credentials(&self) -> Option<(&str, &str, &str)> {
        Some((
            self.youtube_client_id.as_deref()?,
            self.youtube_client_secret.as_deref()?,
            self.youtube_refresh_token.as_deref()?,
        ))
    }
}

fn required_env(name: &str) -> Result<String, ConfigError> {
    std::env::var(name).map_err(|_| ConfigError::MissingEnvVar(name.to_string()))
}

pub(crate) fn optional_env(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|s| !s.is_empty())
}

pub(crate) fn env_or_default(name: &str, default: &str) -> String {
    std::env::var(name)
        .ok()
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| default.to_string())
}

fn parse_env_u64(name: &str, default: u64) -> Result<u64, ConfigError> {
    match std::env::var(name) {
        Ok(val) if !val.is_empty() => val.parse().map_err(|e| ConfigError::ParseInt {
            name: name.to_string(),
            source: e,
        }),
        _ => Ok(default),
    }
}

fn parse_env_bool(name: &str, default: bool) -> Result<bool, ConfigError> {
    match std::env::var(name) {
        Ok(val) if !val.is_empty() => match val.to_lowercase().as_str() {
            "true" | "1" | "yes" | "on" => Ok(true),
            "false" | "0" | "no" | "off" => Ok(false),
            _ => Err(ConfigError::ParseBool {
                name: name.to_string(),
                value: val,
            }),
        },
        _ => Ok(default),
    }
}

fn parse_timezone(value: &str) -> Result<Tz, ConfigError> {
    Tz::from_str(value).map_err(|_| ConfigError::InvalidValue {
        name: "TIMEZONE".to_string(),
        message: format!("unknown IANA time zone '{value}'"),
    })
}

fn parse_trail_order(value: &str) -> Result<TrailOrder, ConfigError> {
    match value.to_lowercase().as_str() {
        "original-first" => Ok(TrailOrder::OriginalFirst),
        "most-recent-first" => Ok(TrailOrder::MostRecentFirst),
        _ => Err(ConfigError::InvalidValue {
            name: "TRAIL_ORDER".to_string(),
            message: format!("must be 'original-first' or 'most-recent-first', got '{value}'"),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    const VARS: &[&str] = &[
        "TUMBLR_BLOG",
        "TUMBLR_API_KEY",
        "TUMBLR_ACCESS_TOKEN",
        "TUMBLR_CLIENT_ID",
        "TUMBLR_CLIENT_SECRET",
        "TUMBLR_REFRESH_TOKEN",
        "INCREMENTAL_HOURS",
        "TIMEZONE",
        "DOWNLOAD_IMAGES",
        "DELETE_AFTER_BACKUP",
    ];

    fn clear_env() {
        for var in VARS {
            std::env::remove_var(var);
        }
    }

    #[test]
    fn test_parse_trail_order() {
        assert_eq!(parse_trail_order("original-first").unwrap(), TrailOrder::OriginalFirst);
        assert_eq!(parse_trail_order("MOST-RECENT-FIRST").unwrap(), TrailOrder::MostRecentFirst);
        assert!(parse_trail_order("newest").is_err());
    }

    #[test]
    fn test_parse_timezone() {
        assert_eq!(parse_timezone("Australia/Sydney").unwrap(), chrono_tz::Australia::Sydney);
        assert_eq!(parse_timezone("UTC").unwrap(), Tz::UTC);
        assert!(parse_timezone("Mars/Olympus").is_err());
    }

    #[test]
    fn test_parse_bool() {
        assert!(parse_env_bool("NONEXISTENT_VAR", true).unwrap());
        assert!(!parse_env_bool("NONEXISTENT_VAR", false).unwrap());
    }

    #[test]
    #[serial]
    fn test_from_env_defaults() {
        clear_env();
        std::env::set_var("TUMBLR_BLOG", "myblog");
        std::env::set_var("TUMBLR_API_KEY", "key");

        let config = Config::from_env().unwrap();
        config.validate().unwrap();
        assert_eq!(config.tumblr_blog, "myblog");
        assert_eq!(config.incremental_hours, Some(5));
        assert_eq!(config.timezone, Tz::UTC);
        assert_eq!(
            config.render_policy(),
            RenderPolicy {
                download_images: false,
                download_videos: false,
                download_audio: false,
                collect_external_video_links: false,
            }
        );
        clear_env();
    }

    #[test]
    #[serial]
    fn test_from_env_full_backup_and_flags() {
        clear_env();
        std::env::set_var("TUMBLR_BLOG", "myblog");
        std::env::set_var("TUMBLR_API_KEY", "key");
        std::env::set_var("INCREMENTAL_HOURS", "0");
        std::env::set_var("TIMEZONE", "Australia/Sydney");
        std::env::set_var("DOWNLOAD_IMAGES", "yes");

        let config = Config::from_env().unwrap();
        assert_eq!(config.incremental_hours, None);
        assert_eq!(config.timezone, chrono_tz::Australia::Sydney);
        assert!(config.download_images);
        clear_env();
    }

    #[test]
    #[serial]
    fn test_missing_blog_is_an_error() {
        clear_env();
        assert!(matches!(Config::from_env(), Err(ConfigError::MissingEnvVar(_))));
    }

    #[test]
    fn test_validate_delete_requires_token() {
        let mut config = Config::for_testing();
        config.delete_after_backup = true;
        assert!(config.validate().is_err());

        config.tumblr_access_token = Some("token".to_string());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_delete_accepts_refresh_credentials() {
        let mut config = Config::for_testing();
        config.tumblr_api_key = None;
        config.delete_after_backup = true;
        config.tumblr_client_id = Some("id".to_string());
        config.tumblr_client_secret = Some("secret".to_string());
        assert!(config.validate().is_err());

        config.tumblr_refresh_token = Some("refresh".to_string());
        assert!(config.validate().is_ok());
    }

    #[test]
    #[serial]
    fn test_from_env_reads_tumblr_refresh_credentials() {
        clear_env();
        std::env::set_var("TUMBLR_BLOG", "myblog");
        std::env::set_var("TUMBLR_CLIENT_ID", "cid");
        std::env::set_var("TUMBLR_CLIENT_SECRET", "csecret");
        std::env::set_var("TUMBLR_REFRESH_TOKEN", "refresh");

        let config = Config::from_env().unwrap();
        config.validate().unwrap();
        assert_eq!(config.tumblr_refresh_credentials(), Some(("cid", "csecret", "refresh")));
        assert_eq!(config.tumblr_token_url, "https://api.tumblr.com/v2/oauth2/token");
        clear_env();
    }

    #[test]
    fn test_validate_requires_some_credential() {
        let mut config = Config::for_testing();
        config.tumblr_api_key = None;
        assert!(config.validate().is_err());
    }
}
