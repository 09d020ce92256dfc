//! Shared helpers for unit tests.

use crate::config::PluginConfig;
use crate::kv::{KvStore, MemoryKvStore};
use anyhow::{anyhow, Result};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use chrono::Duration;

pub(crate) fn valid_plugin_config() -> PluginConfig {
    PluginConfig {
        client_id: "client-id".to_string(),
        client_secret: "client-secret".to_string(),
        encryption_key: BASE64.encode([7u8; 32]),
        bot_username: "outlook".to_string(),
        ..PluginConfig::default()
    }
}

/// Memory store whose writes and deletes fail for keys ending in `suffix`.
pub(crate) struct FailingKvStore {
    pub inner: MemoryKvStore,
    pub suffix: &'static str,
}

impl FailingKvStore {
    pub fn new(suffix: &'static str) -> Self {
        Self {
            inner: MemoryKvStore::new(),
            suffix,
        }
    }

    fn check(&self, key: &str) -> Result<()> {
        if key.ends_with(self.suffix) {
            return Err(anyhow!("simulated KV failure for {}", key));
        }
        Ok(())
    }
}

impl KvStore for FailingKvStore {
    fn set(&self, key: &str, value: &[u8]) -> Result<()> {
        self.check(key)?;
        self.inner.set(key, value)
    }

    fn set_with_expiry(&self, key: &str, value: &[u8], ttl: Duration) -> Result<()> {
        self.check(key)?;
        self.inner.set_with_expiry(key, value, ttl)
    }

    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        self.inner.get(key)
    }

    fn delete(&self, key: &str) -> Result<()> {
        self.check(key)?;
        self.inner.delete(key)
    }

    fn purge_expired(&self) -> Result<usize> {
        self.inner.purge_expired()
    }
}
