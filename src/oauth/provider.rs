//! Microsoft identity platform endpoints.

use crate::config::PluginConfig;

/// Delegated Graph permissions requested on every connect
pub const SCOPES: [&str; 5] = [
    "calendars.readwrite",
    "mail.readwrite",
    "mail.send",
    "user.read",
    "offline_access",
];

/// OAuth provider configuration for one request
#[derive(Clone, Debug)]
pub struct OAuthProviderConfig {
    /// OAuth authorization endpoint URL
    pub auth_url: String,

    /// OAuth token exchange endpoint URL
    pub token_url: String,

    pub scopes: Vec<String>,

    pub client_id: String,

    pub client_secret: String,

    /// Must match the redirect URI registered for the Azure AD app
    pub redirect_uri: String,
}

impl OAuthProviderConfig {
    /// Derive endpoints from the configured authority (common tenant).
    pub fn from_plugin_config(config: &PluginConfig) -> Self {
        let authority = config.authority_url.trim_end_matches('/');
        Self {
            auth_url: format!("{}/common/oauth2/v2.0/authorize", authority),
            token_url: format!("{}/common/oauth2/v2.0/token", authority),
            scopes: SCOPES.iter().map(|s| s.to_string()).collect(),
            client_id: config.client_id.clone(),
            client_secret: config.client_secret.clone(),
            redirect_uri: config.redirect_url.clone(),
        }
    }

    /// Build authorization URL carrying `state`
    pub fn build_auth_url(&self, state: &str) -> String {
        let scopes = self.scopes.join(" ");
        format!(
            "{}?access_type=offline&client_id={}&redirect_uri={}&response_type=code&scope={}&state={}",
            self.auth_url,
            urlencoding::encode(&self.client_id),
            urlencoding::encode(&self.redirect_uri),
            urlencoding::encode(&scopes),
            urlencoding::encode(state)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoints_from_authority() {
        let config = PluginConfig {
            client_id: "cid".to_string(),
            authority_url: "https://login.microsoftonline.com/".to_string(),
            ..PluginConfig::default()
        };

        let provider = OAuthProviderConfig::from_plugin_config(&config);
        assert_eq!(
            provider.auth_url,
            "https://login.microsoftonline.com/common/oauth2/v2.0/authorize"
        );
        assert_eq!(
            provider.token_url,
            "https://login.microsoftonline.com/common/oauth2/v2.0/token"
        );
    }

    #[test]
    fn test_build_auth_url() {
        let config = PluginConfig {
            client_id: "test_client_id".to_string(),
            redirect_url: "http://localhost:8065/plugins/outlook/oauth/complete".to_string(),
            ..PluginConfig::default()
        };

        let url = OAuthProviderConfig::from_plugin_config(&config)
            .build_auth_url("0a1b2c3d4e5f6a7_U1");

        assert!(url.starts_with("https://login.microsoftonline.com/common/oauth2/v2.0/authorize?"));
        assert!(url.contains("client_id=test_client_id"));
        assert!(url.contains(
            "redirect_uri=http%3A%2F%2Flocalhost%3A8065%2Fplugins%2Foutlook%2Foauth%2Fcomplete"
        ));
        assert!(url.contains("scope=calendars.readwrite%20mail.readwrite%20mail.send%20user.read"));
        assert!(url.contains("access_type=offline"));
        assert!(url.contains("response_type=code"));
        assert!(url.ends_with("state=0a1b2c3d4e5f6a7_U1"));
    }

    #[test]
    fn test_deterministic() {
        let config = PluginConfig::default();
        let provider = OAuthProviderConfig::from_plugin_config(&config);
        assert_eq!(provider.build_auth_url("s"), provider.build_auth_url("s"));
    }
}
