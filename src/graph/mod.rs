//! Minimal Microsoft Graph client.
//!
//! Only the identity call is needed by the connect flow; mail and calendar
//! access is left to downstream consumers of the stored token.

use anyhow::{anyhow, Context, Result};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::time::Duration;

const API_VERSION: &str = "v1.0";

/// Subset of the Graph `user` resource returned by `/me`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphUser {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub user_principal_name: Option<String>,
    #[serde(default)]
    pub mail: Option<String>,
}

impl GraphUser {
    /// Sign-in address, falling back to the primary SMTP address.
    pub fn email(&self) -> Option<&str> {
        [&self.user_principal_name, &self.mail]
            .into_iter()
            .flatten()
            .map(|s| s.trim())
            .find(|s| !s.is_empty())
    }
}

/// HTTP client for Microsoft Graph, bound to one access token.
pub struct GraphClient {
    access_token: String,
    http_client: Client,
    base_url: String,
    timeout: Option<Duration>,
}

impl GraphClient {
    /// Create a client with a custom base URL (national clouds, mock servers).
    pub fn with_base_url(http_client: Client, access_token: String, base_url: String) -> Self {
        Self {
            access_token,
            http_client,
            base_url: base_url.trim_end_matches('/').to_string(),
            timeout: None,
        }
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Fetch the signed-in user's profile.
    pub async fn get_me(&self) -> Result<GraphUser> {
        let url = format!("{}/{}/me", self.base_url, API_VERSION);
        let mut request = self
            .http_client
            .get(&url)
            .bearer_auth(&self.access_token)
            .header("Accept", "application/json");
        if let Some(timeout) = self.timeout {
            request = request.timeout(timeout);
        }

        let response = request
            .send()
            .await
            .context("Failed to send Graph /me request")?;

        check_response_status(&response)?;
        response
            .json::<GraphUser>()
            .await
            .context("Failed to parse Graph /me response")
    }
}

fn check_response_status(response: &reqwest::Response) -> Result<()> {
    match response.status() {
        StatusCode::UNAUTHORIZED => Err(anyhow!("Graph auth error: token expired or invalid")),
        StatusCode::FORBIDDEN => Err(anyhow!("Graph denied access: missing user.read consent")),
        s if !s.is_success() => Err(anyhow!("Graph API error: {}", s)),
        _ => Ok(()),
    }
}
