//! Tumblr API v2 client: paginated post listing and post deletion.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::archive::PostDeleter;
use crate::auth::{self, ClientCredentials};
use crate::config::Config;
use crate::constants::{TUMBLR_PAGE_SIZE, USER_AGENT};
use crate::post::Post;

#[derive(Debug, Error)]
pub enum TumblrError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Tumblr API returned {status}: {message}")]
    Api { status: u16, message: String },
    #[error("this operation needs an OAuth access token (TUMBLR_ACCESS_TOKEN)")]
    TokenRequired,
}

/// How requests are authenticated.
#[derive(Clone)]
enum Credentials {
    ApiKey(String),
    Bearer(String),
    /// Only a refresh token is configured and no access token has been obtained yet.
    Unauthenticated,
}

/// Refresh-token grant used to obtain a current OAuth2 access token.
#[derive(Clone)]
struct RefreshGrant {
    token_url: String,
    client: ClientCredentials,
    refresh_token: String,
}

/// One page of the posts listing.
#[derive(Debug, Clone, Default)]
pub struct PostsPage {
    pub posts: Vec<Post>,
    /// Number of entries the API returned, including ones that failed to parse.
    pub returned: usize,
    pub total_posts: Option<usize>,
}

#[derive(Deserialize)]
struct Envelope<T> {
    response: T,
}

#[derive(Deserialize)]
struct PostsResponse {
    #[serde(default)]
    posts: Vec<Value>,
    #[serde(default)]
    total_posts: Option<usize>,
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    #[serde(default)]
    meta: Option<ErrorMeta>,
}

#[derive(Deserialize)]
struct ErrorMeta {
    #[serde(default)]
    msg: String,
}

/// Client for a single blog.
#[derive(Clone)]
pub struct TumblrClient {
    http: reqwest::Client,
    base_url: String,
    blog: String,
    credentials: Credentials,
    refresh: Option<RefreshGrant>,
    page_delay: Duration,
}

impl TumblrClient {
    /// Build a client from configuration. An OAuth access token, when
    /// present, takes precedence over the API key. Configured refresh
    /// credentials are used by [`Self::authenticate`].
    ///
    /// # Errors
    ///
    /// Returns an error if no credential is configured.
    pub fn new(http: reqwest::Client, config: &Config) -> Result<Self> {
        let refresh = config
            .tumblr_refresh_credentials()
            .map(|(client_id, client_secret, refresh_token)| RefreshGrant {
                token_url: config.tumblr_token_url.clone(),
                client: ClientCredentials {
                    client_id: client_id.to_string(),
                    client_secret: client_secret.to_string(),
                },
                refresh_token: refresh_token.to_string(),
            });

        let credentials = match (&config.tumblr_access_token, &config.tumblr_api_key) {
            (Some(token), _) => Credentials::Bearer(token.clone()),
            (None, Some(key)) => Credentials::ApiKey(key.clone()),
            (None, None) if refresh.is_some() => Credentials::Unauthenticated,
            (None, None) => anyhow::bail!("No Tumblr API key, access token or refresh token configured"),
        };

        Ok(Self {
            http,
            base_url: config.tumblr_api_base.trim_end_matches('/').to_string(),
            blog: config.tumblr_blog.clone(),
            credentials,
            refresh,
            page_delay: Duration::from_millis(200),
        })
    }

    /// Exchange the configured refresh token for a current access token.
    ///
    /// Returns a copy of this client that sends the new token as a bearer
    /// credential. Without refresh credentials the client is returned as is.
    ///
    /// # Errors
    ///
    /// Returns an error if the token endpoint rejects the refresh token.
    pub async fn authenticate(&self) -> Result<Self> {
        let Some(grant) = &self.refresh else {
            return Ok(self.clone());
        };

        let tokens =
            auth::refresh_access_token(&self.http, &grant.token_url, &grant.client, &grant.refresh_token).await?;
        info!(blog = %self.blog, expires_in = ?tokens.expires_in, "Obtained Tumblr access token");

        let mut client = self.clone();
        if let Some(rotated) = tokens.refresh_token.filter(|t| t != &grant.refresh_token) {
            warn!("Tumblr issued a new refresh token; run `blog-archiver auth tumblr` if the configured one stops working");
            if let Some(grant) = client.refresh.as_mut() {
                grant.refresh_token = rotated;
            }
        }
        client.credentials = Credentials::Bearer(tokens.access_token);
        Ok(client)
    }

    /// Whether requests carry an OAuth2 bearer token.
    #[must_use]
    pub fn has_access_token(&self) -> bool {
        matches!(self.credentials, Credentials::Bearer(_))
    }

    /// Pause between page requests (the API allows 300 calls per minute).
    #[must_use]
    pub fn with_page_delay(mut self, delay: Duration) -> Self {
        self.page_delay = delay;
        self
    }

    fn blog_url(&self, endpoint: &str) -> String {
        format!(
            "{}/blog/{}/{endpoint}",
            self.base_url,
            urlencoding::encode(&self.blog)
        )
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.credentials {
            Credentials::ApiKey(key) => request.query(&[("api_key", key.as_str())]),
            Credentials::Bearer(token) => request.bearer_auth(token),
            Credentials::Unauthenticated => request,
        }
    }

    /// Fetch one page of posts in Neue Post Format.
    ///
    /// Posts that fail to parse are logged and dropped.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the API reports an error.
    pub async fn fetch_posts(&self, limit: usize, offset: usize) -> Result<PostsPage, TumblrError> {
        let limit = limit.min(TUMBLR_PAGE_SIZE).to_string();
        let offset = offset.to_string();
        let request = self
            .http
            .get(self.blog_url("posts"))
            .header("User-Agent", USER_AGENT)
            .query(&[("limit", limit.as_str()), ("offset", offset.as_str()), ("npf", "true")]);

        let response = self.authorize(request).send().await?;
        let response = check_status(response).await?;
        let body: Envelope<PostsResponse> = response.json().await?;

        let returned = body.response.posts.len();
        let posts = body
            .response
            .posts
            .into_iter()
            .filter_map(|raw| match serde_json::from_value::<Post>(raw) {
                Ok(post) => Some(post),
                Err(e) => {
                    warn!("Skipping unparseable post: {e}");
                    None
                }
            })
            .collect();

        Ok(PostsPage {
            posts,
            returned,
            total_posts: body.response.total_posts,
        })
    }

    /// Fetch every post, newest first.
    ///
    /// With a `cutoff` (epoch seconds) only posts at or after it are kept and
    /// paging stops at the first page reaching past it. A failed page ends
    /// paging early with whatever was collected.
    pub async fn fetch_all_posts(&self, cutoff: Option<i64>) -> Vec<Post> {
        let mut all_posts = Vec::new();
        let mut offset = 0;

        match cutoff {
            Some(cutoff) => info!(blog = %self.blog, cutoff, "Fetching posts newer than cutoff"),
            None => info!(blog = %self.blog, "Fetching all posts"),
        }

        loop {
            let page = match self.fetch_posts(TUMBLR_PAGE_SIZE, offset).await {
                Ok(page) => page,
                Err(e) => {
                    warn!(offset, "Failed to fetch posts page, stopping: {e}");
                    break;
                }
            };

            if page.returned == 0 {
                break;
            }

            if let Some(cutoff) = cutoff {
                let reached_cutoff = page.posts.iter().any(|p| p.timestamp < cutoff);
                all_posts.extend(page.posts.into_iter().filter(|p| p.timestamp >= cutoff));
                if reached_cutoff {
                    debug!(fetched = all_posts.len(), "Reached cutoff time");
                    break;
                }
            } else {
                all_posts.extend(page.posts);
                if page.total_posts.is_some_and(|total| all_posts.len() >= total) {
                    break;
                }
            }

            debug!(fetched = all_posts.len(), "Fetched posts so far");
            offset += TUMBLR_PAGE_SIZE;
            tokio::time::sleep(self.page_delay).await;
        }

        info!(count = all_posts.len(), "Finished fetching posts");
        all_posts
    }

    /// Delete one post from the blog.
    ///
    /// # Errors
    ///
    /// Returns an error if no access token is configured or the API rejects the request.
    pub async fn delete(&self, post_id: &str) -> Result<(), TumblrError> {
        let Credentials::Bearer(token) = &self.credentials else {
            return Err(TumblrError::TokenRequired);
        };

        let response = self
            .http
            .post(self.blog_url("post/delete"))
            .header("User-Agent", USER_AGENT)
            .bearer_auth(token)
            .form(&[("id", post_id)])
            .send()
            .await?;
        check_status(response).await?;
        Ok(())
    }
}

#[async_trait]
impl PostDeleter for TumblrClient {
    async fn delete_post(&self, post_id: &str) -> Result<()> {
        self.delete(post_id)
            .await
            .with_context(|| format!("Failed to delete post {post_id}"))
    }
}

impl std::fmt::Debug for TumblrClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TumblrClient")
            .field("base_url", &self.base_url)
            .field("blog", &self.blog)
            .finish_non_exhaustive()
    }
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, TumblrError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ErrorEnvelope>(&body)
        .ok()
        .and_then(|e| e.meta)
        .map(|m| m.msg)
        .filter(|m| !m.is_empty())
        .unwrap_or(body);

    Err(TumblrError::Api {
        status: status.as_u16(),
        message,
    })
}
