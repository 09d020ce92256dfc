//! OAuth token exchange logic.
//!
//! Handles exchanging authorization codes for access tokens.

use super::{OAuthProviderConfig, Token};
use anyhow::{anyhow, Context, Result};
use chrono::Utc;
use serde::Deserialize;
use std::time::Duration;

/// OAuth token response (standard OAuth 2.0)
#[derive(Deserialize, Debug)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    expires_in: Option<i64>,
    #[serde(default)]
    token_type: Option<String>,
}

/// Exchange an authorization code for a token pair.
///
/// The request is bounded by `timeout`; transport errors, non-2xx responses
/// and unparsable bodies all fail.
pub async fn exchange_code_for_token(
    client: &reqwest::Client,
    provider: &OAuthProviderConfig,
    code: &str,
    timeout: Duration,
) -> Result<Token> {
    let scopes = provider.scopes.join(" ");
    let form = [
        ("grant_type", "authorization_code"),
        ("code", code),
        ("redirect_uri", provider.redirect_uri.as_str()),
        ("client_id", provider.client_id.as_str()),
        ("client_secret", provider.client_secret.as_str()),
        ("scope", scopes.as_str()),
    ];

    tracing::debug!("Exchanging authorization code for token at {}", provider.token_url);

    let response = client
        .post(&provider.token_url)
        .header("Accept", "application/json")
        .timeout(timeout)
        .form(&form)
        .send()
        .await
        .context("Failed to send token exchange request")?;

    if !response.status().is_success() {
        let status = response.status();
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".to_string());
        return Err(anyhow!(
            "Token exchange failed with status {}: {}",
            status,
            body
        ));
    }

    let token_response: TokenResponse = response
        .json()
        .await
        .context("Failed to parse token response")?;

    if token_response.access_token.is_empty() {
        return Err(anyhow!("Token response contained an empty access_token"));
    }

    tracing::debug!(
        has_refresh_token = token_response.refresh_token.is_some(),
        expires_in = ?token_response.expires_in,
        "Token exchange successful"
    );

    let expires_at = token_response
        .expires_in
        .map(|seconds| Utc::now() + chrono::Duration::seconds(seconds));

    Ok(Token {
        access_token: token_response.access_token,
        token_type: token_response.token_type,
        refresh_token: token_response.refresh_token,
        expires_at,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::{Matcher, Server};

    fn provider_for(server_url: &str) -> OAuthProviderConfig {
        OAuthProviderConfig {
            auth_url: format!("{}/common/oauth2/v2.0/authorize", server_url),
            token_url: format!("{}/common/oauth2/v2.0/token", server_url),
            scopes: vec!["user.read".to_string()],
            client_id: "cid".to_string(),
            client_secret: "secret".to_string(),
            redirect_uri: "http://localhost/oauth/complete".to_string(),
        }
    }

    #[test]
    fn test_token_response_deserialization() {
        let json = r#"{
            "access_token": "EwB4A8l6",
            "refresh_token": "M.R3_BAY",
            "expires_in": 3600,
            "token_type": "Bearer"
        }"#;

        let response: TokenResponse = serde_json::from_str(json).unwrap();
        assert_eq!(response.access_token, "EwB4A8l6");
        assert_eq!(response.refresh_token, Some("M.R3_BAY".to_string()));
        assert_eq!(response.expires_in, Some(3600));
        assert_eq!(response.token_type, Some("Bearer".to_string()));
    }

    #[tokio::test]
    async fn test_exchange_posts_form() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/common/oauth2/v2.0/token")
            .match_body(Matcher::AllOf(vec![
                Matcher::UrlEncoded("grant_type".into(), "authorization_code".into()),
                Matcher::UrlEncoded("code".into(), "the-code".into()),
                Matcher::UrlEncoded("client_id".into(), "cid".into()),
                Matcher::UrlEncoded("client_secret".into(), "secret".into()),
                Matcher::UrlEncoded(
                    "redirect_uri".into(),
                    "http://localhost/oauth/complete".into(),
                ),
            ]))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"access_token":"at","refresh_token":"rt","expires_in":60}"#)
            .create_async()
            .await;

        let token = exchange_code_for_token(
            &reqwest::Client::new(),
            &provider_for(&server.url()),
            "the-code",
            Duration::from_secs(5),
        )
        .await
        .unwrap();

        mock.assert_async().await;
        assert_eq!(token.access_token, "at");
        assert_eq!(token.refresh_token.as_deref(), Some("rt"));
        assert!(token.expires_at.unwrap() > Utc::now());
    }

    #[tokio::test]
    async fn test_exchange_error_status() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("POST", "/common/oauth2/v2.0/token")
            .with_status(401)
            .with_body("invalid_client")
            .create_async()
            .await;

        let err = exchange_code_for_token(
            &reqwest::Client::new(),
            &provider_for(&server.url()),
            "c",
            Duration::from_secs(5),
        )
        .await
        .unwrap_err();

        assert!(err.to_string().contains("401"));
    }

    #[tokio::test]
    async fn test_exchange_unparsable_body() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("POST", "/common/oauth2/v2.0/token")
            .with_status(200)
            .with_body("<html>not json</html>")
            .create_async()
            .await;

        let result = exchange_code_for_token(
            &reqwest::Client::new(),
            &provider_for(&server.url()),
            "c",
            Duration::from_secs(5),
        )
        .await;

        assert!(result.is_err());
    }
}
