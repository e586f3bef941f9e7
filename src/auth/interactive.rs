use anyhow::{Context, Result};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines, Stdin};
use tracing::info;

use super::{authorization_url, exchange_code, generate_state, parse_callback, ClientCredentials, OAuthProvider};
use crate::config::{env_or_default, optional_env};

/// Walk the user through the authorization-code flow on the terminal and
/// print the resulting tokens as `.env` lines.
///
/// Client id and secret come from `<PREFIX>_CLIENT_ID` / `<PREFIX>_CLIENT_SECRET`
/// when set, otherwise they are prompted for. The redirect URI defaults to
/// `http://localhost` and must match the one registered with the provider.
///
/// # Errors
///
/// Returns an error if input is missing, the state does not match, or the
/// code exchange fails.
pub async fn run_interactive(provider: &OAuthProvider, http: &reqwest::Client) -> Result<()> {
    let mut stdin = BufReader::new(tokio::io::stdin()).lines();

    let prefix = provider.env_prefix;
    let client_id = match optional_env(&format!("{prefix}_CLIENT_ID")) {
        Some(id) => id,
        None => prompt(&mut stdin, &format!("{} client ID: ", provider.name)).await?,
    };
    let client_secret = match optional_env(&format!("{prefix}_CLIENT_SECRET")) {
        Some(secret) => secret,
        None => prompt(&mut stdin, &format!("{} client secret: ", provider.name)).await?,
    };
    if client_id.is_empty() || client_secret.is_empty() {
        anyhow::bail!("Client ID and client secret are required");
    }

    let redirect_uri = env_or_default("OAUTH_REDIRECT_URI", "http://localhost");
    let state = generate_state();
    let url = authorization_url(provider, &client_id, &redirect_uri, &state)?;

    println!("\nOpen this URL in a browser and approve access:\n\n{url}\n");
    println!("You will be redirected to {redirect_uri}. The page may fail to load; that is fine.");
    let pasted = prompt(&mut stdin, "Paste the full redirect URL (or just the code): ").await?;

    let callback = parse_callback(&pasted)?;
    if let Some(returned) = &callback.state {
        if returned != &state {
            anyhow::bail!("State mismatch in redirect; start over");
        }
    }

    let client = ClientCredentials {
        client_id,
        client_secret,
    };
    let tokens = exchange_code(http, provider.token_url, &client, &callback.code, &redirect_uri).await?;
    info!(provider = provider.name, "Obtained OAuth tokens");

    println!("\nAdd these to your .env:\n");
    println!("{prefix}_CLIENT_ID={}", client.client_id);
    println!("{prefix}_CLIENT_SECRET={}", client.client_secret);
    println!("{prefix}_ACCESS_TOKEN={}", tokens.access_token);
    let refresh = tokens
        .refresh_token
        .context("Provider did not return a refresh token; revoke access and try again")?;
    println!("{prefix}_REFRESH_TOKEN={refresh}");

    Ok(())
}

async fn prompt(stdin: &mut Lines<BufReader<Stdin>>, label: &str) -> Result<String> {
    let mut stdout = tokio::io::stdout();
    stdout.write_all(label.as_bytes()).await?;
    stdout.flush().await?;
    let line = stdin.next_line().await?.unwrap_or_default();
    Ok(line.trim().to_string())
}
