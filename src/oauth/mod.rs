//! OAuth 2.0 authorization-code flow against Microsoft identity.
//!
//! 1. User hits `/oauth/connect` from the chat client
//! 2. A single-use state token bound to the user is stored
//! 3. User is redirected to the Microsoft authorize endpoint
//! 4. Microsoft redirects to `/oauth/complete?code=..&state=..`
//! 5. State is validated and consumed, code exchanged for tokens
//! 6. Graph `/me` identifies the Outlook account
//! 7. Tokens are encrypted and stored, the email index updated

mod exchange;
mod provider;
mod state_manager;

pub use exchange::exchange_code_for_token;
pub use provider::{OAuthProviderConfig, SCOPES};
pub use state_manager::{StateManager, StateRecord, StateStatus};

use crate::config::PluginConfig;
use crate::error::BridgeError;
use crate::graph::GraphClient;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// OAuth token pair as returned by the token endpoint.
///
/// Field names match the `golang.org/x/oauth2` JSON encoding so records
/// written by earlier deployments still deserialize.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Token {
    pub access_token: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_type: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,

    /// When the access token expires (UTC)
    #[serde(rename = "expiry", default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
}

/// The remote account behind an access token.
#[derive(Clone, Debug, PartialEq)]
pub struct Identity {
    pub email: String,
    pub display_name: String,
}

/// Remote identity provider: authorization URL, code exchange, "who am I".
///
/// Every call takes the configuration snapshot of the request it serves, so
/// a configuration swap never changes endpoints halfway through a flow.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    fn authorization_url(&self, config: &PluginConfig, state: &str) -> String;

    async fn exchange_code(&self, config: &PluginConfig, code: &str) -> Result<Token, BridgeError>;

    async fn fetch_identity(
        &self,
        config: &PluginConfig,
        access_token: &str,
    ) -> Result<Identity, BridgeError>;
}

/// Microsoft identity platform + Graph.
#[derive(Clone, Default)]
pub struct MicrosoftProvider {
    http: reqwest::Client,
}

impl MicrosoftProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_client(http: reqwest::Client) -> Self {
        Self { http }
    }
}

#[async_trait]
impl IdentityProvider for MicrosoftProvider {
    fn authorization_url(&self, config: &PluginConfig, state: &str) -> String {
        OAuthProviderConfig::from_plugin_config(config).build_auth_url(state)
    }

    async fn exchange_code(&self, config: &PluginConfig, code: &str) -> Result<Token, BridgeError> {
        let provider = OAuthProviderConfig::from_plugin_config(config);
        let timeout = Duration::from_secs(config.http_timeout_seconds);

        exchange_code_for_token(&self.http, &provider, code, timeout)
            .await
            .map_err(|e| BridgeError::ExchangeFailed(format!("{:#}", e)))
    }

    async fn fetch_identity(
        &self,
        config: &PluginConfig,
        access_token: &str,
    ) -> Result<Identity, BridgeError> {
        let client = GraphClient::with_base_url(
            self.http.clone(),
            access_token.to_string(),
            config.graph_url.clone(),
        )
        .timeout(Duration::from_secs(config.http_timeout_seconds));

        let me = client
            .get_me()
            .await
            .map_err(|e| BridgeError::IdentityUnavailable(format!("{:#}", e)))?;

        let email = me.email().unwrap_or_default().to_string();
        if email.is_empty() {
            return Err(BridgeError::IdentityUnavailable(
                "Graph returned no email for this account".to_string(),
            ));
        }

        Ok(Identity {
            email,
            display_name: me.display_name.unwrap_or_default(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::valid_plugin_config;
    use mockito::Server;

    #[test]
    fn test_token_json_matches_oauth2_encoding() {
        let json = r#"{
            "access_token": "EwB4A8l6",
            "token_type": "Bearer",
            "refresh_token": "M.R3_BAY",
            "expiry": "2026-10-18T12:00:00Z"
        }"#;

        let token: Token = serde_json::from_str(json).unwrap();
        assert_eq!(token.access_token, "EwB4A8l6");
        assert_eq!(token.refresh_token.as_deref(), Some("M.R3_BAY"));
        assert!(token.expires_at.is_some());

        let out = serde_json::to_string(&token).unwrap();
        assert!(out.contains("\"expiry\""));
    }

    #[test]
    fn test_token_minimal() {
        let token: Token = serde_json::from_str(r#"{"access_token":"t"}"#).unwrap();
        assert_eq!(token.token_type, None);
        assert_eq!(serde_json::to_string(&token).unwrap(), r#"{"access_token":"t"}"#);
    }

    #[tokio::test]
    async fn test_microsoft_provider_exchange_and_identity() {
        let mut server = Server::new_async().await;
        let _token = server
            .mock("POST", "/common/oauth2/v2.0/token")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{"access_token":"at-1","refresh_token":"rt-1","expires_in":3600,"token_type":"Bearer"}"#,
            )
            .create_async()
            .await;
        let _me = server
            .mock("GET", "/v1.0/me")
            .match_header("authorization", "Bearer at-1")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"displayName":"Ada","userPrincipalName":"ada@contoso.com"}"#)
            .create_async()
            .await;

        let mut config = valid_plugin_config();
        config.authority_url = server.url();
        config.graph_url = server.url();

        let provider = MicrosoftProvider::new();
        let token = provider.exchange_code(&config, "code-1").await.unwrap();
        assert_eq!(token.access_token, "at-1");

        let identity = provider
            .fetch_identity(&config, &token.access_token)
            .await
            .unwrap();
        assert_eq!(identity.email, "ada@contoso.com");
        assert_eq!(identity.display_name, "Ada");
    }

    #[tokio::test]
    async fn test_microsoft_provider_exchange_failure() {
        let mut server = Server::new_async().await;
        let _token = server
            .mock("POST", "/common/oauth2/v2.0/token")
            .with_status(400)
            .with_body(r#"{"error":"invalid_grant"}"#)
            .create_async()
            .await;

        let mut config = valid_plugin_config();
        config.authority_url = server.url();

        let err = MicrosoftProvider::new()
            .exchange_code(&config, "expired-code")
            .await
            .unwrap_err();
        assert!(matches!(err, BridgeError::ExchangeFailed(_)));
    }

    #[tokio::test]
    async fn test_microsoft_provider_rejects_identity_without_email() {
        let mut server = Server::new_async().await;
        let _me = server
            .mock("GET", "/v1.0/me")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"displayName":"No Mail"}"#)
            .create_async()
            .await;

        let mut config = valid_plugin_config();
        config.graph_url = server.url();

        let err = MicrosoftProvider::new()
            .fetch_identity(&config, "at")
            .await
            .unwrap_err();
        assert!(matches!(err, BridgeError::IdentityUnavailable(_)));
    }
}
