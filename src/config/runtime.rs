use super::PluginConfig;
use std::sync::Arc;
use tokio::sync::watch;

/// Shared, swappable plugin configuration.
///
/// Each value is immutable once published. Readers take an `Arc` snapshot
/// that stays consistent for the whole request; `update` swaps in a new
/// value without blocking them.
#[derive(Clone)]
pub struct ConfigHandle {
    tx: Arc<watch::Sender<Arc<PluginConfig>>>,
}

impl ConfigHandle {
    pub fn new(config: PluginConfig) -> Self {
        let (tx, _rx) = watch::channel(Arc::new(config));
        Self { tx: Arc::new(tx) }
    }

    /// Current configuration.
    pub fn snapshot(&self) -> Arc<PluginConfig> {
        Arc::clone(&self.tx.borrow())
    }

    /// Replace the configuration (on SIGHUP or when the host reports a change).
    pub fn update(&self, config: PluginConfig) {
        self.tx.send_replace(Arc::new(config));
        tracing::info!("Plugin configuration updated");
    }
}
