pub mod runtime;
pub use runtime::ConfigHandle;

use crate::crypto;
use anyhow::{anyhow, Context, Result};
use serde::Deserialize;

/// Complete bridge configuration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BridgeConfig {
    #[serde(default)]
    pub plugin: PluginConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

/// Settings the OAuth flow depends on. Checked on activation and on every
/// request; handlers never run against an invalid value.
#[derive(Debug, Clone, Deserialize)]
pub struct PluginConfig {
    /// Azure AD application (client) id
    #[serde(default)]
    pub client_id: String,
    /// Azure AD client secret
    #[serde(default)]
    pub client_secret: String,
    /// Base64-encoded 32-byte AES key used for tokens at rest
    #[serde(default)]
    pub encryption_key: String,
    /// Username of the bot account that sends welcome messages
    #[serde(default)]
    pub bot_username: String,
    #[serde(default = "default_redirect_url")]
    pub redirect_url: String,
    #[serde(default = "default_authority_url")]
    pub authority_url: String,
    #[serde(default = "default_graph_url")]
    pub graph_url: String,
    /// How long an issued state token stays valid
    #[serde(default = "default_state_ttl")]
    pub state_ttl_seconds: i64,
    /// Upper bound for each outbound provider call
    #[serde(default = "default_http_timeout")]
    pub http_timeout_seconds: u64,
}

/// Longest accepted state token lifetime (one day)
pub const MAX_STATE_TTL_SECONDS: i64 = 24 * 60 * 60;

fn default_redirect_url() -> String {
    "http://localhost:8065/plugins/outlook/oauth/complete".to_string()
}

fn default_authority_url() -> String {
    "https://login.microsoftonline.com".to_string()
}

fn default_graph_url() -> String {
    "https://graph.microsoft.com".to_string()
}

fn default_state_ttl() -> i64 {
    600
}

fn default_http_timeout() -> u64 {
    30
}

impl Default for PluginConfig {
    fn default() -> Self {
        Self {
            client_id: String::new(),
            client_secret: String::new(),
            encryption_key: String::new(),
            bot_username: String::new(),
            redirect_url: default_redirect_url(),
            authority_url: default_authority_url(),
            graph_url: default_graph_url(),
            state_ttl_seconds: default_state_ttl(),
            http_timeout_seconds: default_http_timeout(),
        }
    }
}

impl PluginConfig {
    /// Returns an error naming the first missing or malformed setting.
    pub fn is_valid(&self) -> Result<()> {
        if self.client_id.trim().is_empty() {
            return Err(anyhow!("Must have an Azure AD client ID"));
        }
        if self.client_secret.trim().is_empty() {
            return Err(anyhow!("Must have an Azure AD client secret"));
        }
        if self.bot_username.trim().is_empty() {
            return Err(anyhow!("Must have a bot username"));
        }
        crypto::validate_key(&self.encryption_key).context("Invalid encryption key")?;
        if self.redirect_url.trim().is_empty() {
            return Err(anyhow!("Must have a redirect URL"));
        }
        if self.state_ttl_seconds <= 0 || self.state_ttl_seconds > MAX_STATE_TTL_SECONDS {
            return Err(anyhow!(
                "state_ttl_seconds must be between 1 and {}",
                MAX_STATE_TTL_SECONDS
            ));
        }
        if self.http_timeout_seconds == 0 {
            return Err(anyhow!("http_timeout_seconds must be positive"));
        }
        Ok(())
    }

    /// Apply `OUTLOOK_*` environment overrides.
    pub fn apply_env(&mut self) {
        override_string("OUTLOOK_CLIENT_ID", &mut self.client_id);
        override_string("OUTLOOK_CLIENT_SECRET", &mut self.client_secret);
        override_string("OUTLOOK_ENCRYPTION_KEY", &mut self.encryption_key);
        override_string("OUTLOOK_BOT_USERNAME", &mut self.bot_username);
        override_string("OUTLOOK_REDIRECT_URL", &mut self.redirect_url);
        override_string("OUTLOOK_AUTHORITY_URL", &mut self.authority_url);
        override_string("OUTLOOK_GRAPH_URL", &mut self.graph_url);
        if let Ok(v) = std::env::var("OUTLOOK_STATE_TTL_SECONDS") {
            if let Ok(n) = v.parse::<i64>() {
                self.state_ttl_seconds = n;
            }
        }
        if let Ok(v) = std::env::var("OUTLOOK_HTTP_TIMEOUT_SECONDS") {
            if let Ok(n) = v.parse::<u64>() {
                self.http_timeout_seconds = n;
            }
        }
    }
}

/// Settings for the standalone server binary
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
    /// SQLite file backing the key-value store
    #[serde(default = "default_kv_db_path")]
    pub kv_db_path: String,
    /// Base URL of the Mattermost server (REST API v4)
    #[serde(default = "default_mattermost_url")]
    pub mattermost_url: String,
    /// Personal access token used for host API calls
    #[serde(default)]
    pub bot_token: String,
    /// How often expired KV entries are purged
    #[serde(default = "default_purge_interval")]
    pub purge_interval_seconds: u64,
}

fn default_bind_addr() -> String {
    "127.0.0.1:8066".to_string()
}

fn default_kv_db_path() -> String {
    "outlook_kv.db".to_string()
}

fn default_mattermost_url() -> String {
    "http://localhost:8065".to_string()
}

fn default_purge_interval() -> u64 {
    60
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            kv_db_path: default_kv_db_path(),
            mattermost_url: default_mattermost_url(),
            bot_token: String::new(),
            purge_interval_seconds: default_purge_interval(),
        }
    }
}

impl ServerConfig {
    pub fn is_valid(&self) -> Result<()> {
        if self.purge_interval_seconds == 0 {
            return Err(anyhow!("purge_interval_seconds must be positive"));
        }
        Ok(())
    }

    pub fn apply_env(&mut self) {
        override_string("OUTLOOK_BIND_ADDR", &mut self.bind_addr);
        override_string("OUTLOOK_KV_DB", &mut self.kv_db_path);
        override_string("OUTLOOK_MATTERMOST_URL", &mut self.mattermost_url);
        override_string("OUTLOOK_BOT_TOKEN", &mut self.bot_token);
        if let Ok(v) = std::env::var("OUTLOOK_PURGE_INTERVAL_SECONDS") {
            if let Ok(n) = v.parse::<u64>() {
                self.purge_interval_seconds = n;
            }
        }
    }
}

fn override_string(var: &str, target: &mut String) {
    if let Ok(v) = std::env::var(var) {
        *target = v;
    }
}

/// Load configuration from a TOML file
pub fn load_config(path: &str) -> Result<BridgeConfig> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file {}", path))?;
    let config: BridgeConfig = toml::from_str(&contents).context("Failed to parse config")?;
    Ok(config)
}

/// Load from an optional TOML file, then apply environment overrides.
///
/// Only server settings are checked here; an invalid plugin section still
/// loads so the bridge can start and answer 501 until it is fixed.
pub fn load_from_env(path: Option<&str>) -> Result<BridgeConfig> {
    let mut config = match path {
        Some(p) => load_config(p)?,
        None => BridgeConfig::default(),
    };
    config.plugin.apply_env();
    config.server.apply_env();
    config.server.is_valid().context("Invalid server configuration")?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::valid_plugin_config;
    use base64::{engine::general_purpose::STANDARD as BASE64, Engine};

    #[test]
    fn test_default_config() {
        let config = BridgeConfig::default();
        assert_eq!(config.plugin.state_ttl_seconds, 600);
        assert_eq!(config.plugin.authority_url, "https://login.microsoftonline.com");
        assert_eq!(config.server.bind_addr, "127.0.0.1:8066");
        assert!(config.plugin.is_valid().is_err());
    }

    #[test]
    fn test_valid_config() {
        assert!(valid_plugin_config().is_valid().is_ok());
    }

    #[test]
    fn test_missing_fields_rejected() {
        let mut config = valid_plugin_config();
        config.client_secret = "  ".to_string();
        assert!(config.is_valid().is_err());

        let mut config = valid_plugin_config();
        config.bot_username.clear();
        assert!(config.is_valid().is_err());

        let mut config = valid_plugin_config();
        config.encryption_key = BASE64.encode([0u8; 16]);
        assert!(config.is_valid().is_err());

        let mut config = valid_plugin_config();
        config.state_ttl_seconds = 0;
        assert!(config.is_valid().is_err());
    }

    #[test]
    fn test_state_ttl_upper_bound() {
        let mut config = valid_plugin_config();
        config.state_ttl_seconds = MAX_STATE_TTL_SECONDS;
        assert!(config.is_valid().is_ok());

        config.state_ttl_seconds = MAX_STATE_TTL_SECONDS + 1;
        assert!(config.is_valid().is_err());

        config.state_ttl_seconds = i64::MAX;
        let err = config.is_valid().unwrap_err();
        assert!(err.to_string().contains("state_ttl_seconds"));
    }

    #[test]
    fn test_zero_purge_interval_rejected() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("bridge.toml");
        std::fs::write(&path, "[server]\npurge_interval_seconds = 0\n").unwrap();

        let err = load_from_env(path.to_str()).unwrap_err();
        assert!(format!("{:#}", err).contains("purge_interval_seconds"));

        assert!(ServerConfig::default().is_valid().is_ok());
    }

    #[test]
    fn test_config_deserialization() {
        let toml = r#"
            [plugin]
            client_id = "abc"
            client_secret = "def"
            encryption_key = "AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA="
            bot_username = "outlookbot"
            state_ttl_seconds = 120

            [server]
            bind_addr = "0.0.0.0:9000"
            kv_db_path = "/tmp/kv.db"
        "#;

        let config: BridgeConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.plugin.client_id, "abc");
        assert_eq!(config.plugin.state_ttl_seconds, 120);
        assert_eq!(config.plugin.http_timeout_seconds, 30); // Default
        assert_eq!(config.server.bind_addr, "0.0.0.0:9000");
        assert_eq!(config.server.mattermost_url, "http://localhost:8065"); // Default
        assert!(config.plugin.is_valid().is_ok());
    }
}
