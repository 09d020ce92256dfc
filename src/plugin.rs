//! Plugin activation and configuration changes.

use crate::config::{self, ConfigHandle, PluginConfig};
use crate::error::BridgeError;
use crate::host::ChatHost;
use std::sync::Arc;
use tracing::{error, info, warn};

/// The bridge as the chat host sees it.
pub struct Plugin {
    config: ConfigHandle,
    host: Arc<dyn ChatHost>,
}

impl Plugin {
    pub fn new(config: ConfigHandle, host: Arc<dyn ChatHost>) -> Self {
        Self { config, host }
    }

    #[cfg(test)]
    pub(crate) fn config(&self) -> &ConfigHandle {
        &self.config
    }

    /// Validate configuration and resolve the bot account's user id.
    pub async fn on_activate(&self) -> Result<String, BridgeError> {
        let config = self.config.snapshot();
        config
            .is_valid()
            .map_err(|e| BridgeError::NotConfigured(format!("{:#}", e)))?;

        let user = self
            .host
            .get_user_by_username(&config.bot_username)
            .await
            .map_err(|e| {
                error!(username = %config.bot_username, error = %e, "Bot user lookup failed");
                BridgeError::HostError(format!(
                    "Unable to find user with configured username: {}",
                    config.bot_username
                ))
            })?;

        info!(bot_user_id = %user.id, "Plugin activated");
        Ok(user.id)
    }

    /// Publish a new configuration.
    ///
    /// An invalid configuration is still published; requests answer 501
    /// until it is fixed. The bot id resolved at activation is kept.
    pub fn on_configuration_change(&self, config: PluginConfig) -> Result<(), BridgeError> {
        let validity = config
            .is_valid()
            .map_err(|e| BridgeError::NotConfigured(format!("{:#}", e)));
        if let Err(e) = &validity {
            warn!(error = %e, "New configuration is invalid");
        }
        self.config.update(config);
        validity
    }

    /// Re-read the configuration file and environment, then publish the
    /// plugin section. Server settings only take effect on restart.
    pub fn reload(&self, path: Option<&str>) -> Result<(), BridgeError> {
        let loaded = config::load_from_env(path).map_err(|e| {
            error!(error = %format!("{:#}", e), "Failed to reload configuration");
            BridgeError::NotConfigured(format!("{:#}", e))
        })?;
        self.on_configuration_change(loaded.plugin)
    }
}
