//! OAuth2 helpers for the services the archiver talks to.
//!
//! The interactive flow is only needed once per service to obtain a
//! refresh token; regular runs use [`refresh_access_token`].

mod interactive;

use anyhow::{Context, Result};
use rand::distributions::Alphanumeric;
use rand::Rng;
use serde::Deserialize;
use url::Url;

use crate::constants::USER_AGENT;

pub use interactive::run_interactive;

/// Endpoints and scopes of an OAuth2 provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OAuthProvider {
    pub name: &'static str,
    pub authorize_url: &'static str,
    pub token_url: &'static str,
    pub scopes: &'static [&'static str],
    /// Additional authorization parameters.
    pub extra_params: &'static [(&'static str, &'static str)],
    /// Prefix of the environment variables holding this provider's credentials.
    pub env_prefix: &'static str,
}

pub const TUMBLR: OAuthProvider = OAuthProvider {
    name: "Tumblr",
    authorize_url: "https://www.tumblr.com/oauth2/authorize",
    token_url: "https://api.tumblr.com/v2/oauth2/token",
    scopes: &["basic", "write", "offline_access"],
    extra_params: &[],
    env_prefix: "TUMBLR",
};

pub const GOOGLE: OAuthProvider = OAuthProvider {
    name: "YouTube",
    authorize_url: "https://accounts.google.com/o/oauth2/auth",
    token_url: "https://oauth2.googleapis.com/token",
    scopes: &["https://www.googleapis.com/auth/youtube"],
    // Needed for Google to issue a refresh token every time.
    extra_params: &[("access_type", "offline"), ("prompt", "consent")],
    env_prefix: "YOUTUBE",
};

/// Token endpoint response.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expires_in: Option<u64>,
    #[serde(default)]
    pub token_type: Option<String>,
}

/// Client registration used for the code and refresh grants.
#[derive(Debug, Clone)]
pub struct ClientCredentials {
    pub client_id: String,
    pub client_secret: String,
}

/// Random `state` value for CSRF protection of the redirect.
#[must_use]
pub fn generate_state() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(32)
        .map(char::from)
        .collect()
}

/// Build the URL the user opens to grant access.
///
/// # Errors
///
/// Returns an error if the provider's authorization URL is malformed.
pub fn authorization_url(
    provider: &OAuthProvider,
    client_id: &str,
    redirect_uri: &str,
    state: &str,
) -> Result<Url> {
    let mut url = Url::parse(provider.authorize_url).context("Invalid authorization URL")?;
    {
        let mut query = url.query_pairs_mut();
        query
            .append_pair("response_type", "code")
            .append_pair("client_id", client_id)
            .append_pair("redirect_uri", redirect_uri)
            .append_pair("scope", &provider.scopes.join(" "))
            .append_pair("state", state);
        for (key, value) in provider.extra_params {
            query.append_pair(key, value);
        }
    }
    Ok(url)
}

/// Authorization response pasted back by the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Callback {
    pub code: String,
    pub state: Option<String>,
}

/// Parse either the full redirect URL or a bare authorization code.
///
/// # Errors
///
/// Returns an error if the input is empty, the provider reported an error,
/// or a redirect URL carries no code.
pub fn parse_callback(input: &str) -> Result<Callback> {
    let input = input.trim();
    if input.is_empty() {
        anyhow::bail!("No authorization code given");
    }

    let Ok(url) = Url::parse(input) else {
        return Ok(Callback {
            code: input.to_string(),
            state: None,
        });
    };

    let param = |name: &str| {
        url.query_pairs()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.into_owned())
    };

    if let Some(error) = param("error") {
        anyhow::bail!("Authorization was denied: {error}");
    }

    let code = param("code").context("Redirect URL has no 'code' parameter")?;
    Ok(Callback {
        code,
        state: param("state"),
    })
}

/// Exchange an authorization code for tokens.
///
/// # Errors
///
/// Returns an error if the token endpoint rejects the code.
pub async fn exchange_code(
    http: &reqwest::Client,
    token_url: &str,
    client: &ClientCredentials,
    code: &str,
    redirect_uri: &str,
) -> Result<TokenResponse> {
    request_token(
        http,
        token_url,
        &[
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", redirect_uri),
            ("client_id", &client.client_id),
            ("client_secret", &client.client_secret),
        ],
    )
    .await
    .context("Authorization code exchange failed")
}

/// Obtain a fresh access token from a refresh token.
///
/// # Errors
///
/// Returns an error if the token endpoint rejects the refresh token.
pub async fn refresh_access_token(
    http: &reqwest::Client,
    token_url: &str,
    client: &ClientCredentials,
    refresh_token: &str,
) -> Result<TokenResponse> {
    request_token(
        http,
        token_url,
        &[
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
            ("client_id", &client.client_id),
            ("client_secret", &client.client_secret),
        ],
    )
    .await
    .context("Refreshing access token failed")
}

async fn request_token(http: &reqwest::Client, token_url: &str, form: &[(&str, &str)]) -> Result<TokenResponse> {
    let response = http
        .post(token_url)
        .header("User-Agent", USER_AGENT)
        .form(form)
        .send()
        .await
        .context("Token request failed")?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        anyhow::bail!("Token endpoint returned {status}: {body}");
    }

    response.json().await.context("Failed to parse token response")
}
