//! Key-value persistence.
//!
//! Every record the bridge keeps (state tokens, connected accounts, the email
//! index) is addressed by a string key and stored as an opaque byte blob.
//! There is no client-side cache; every read goes to the store.

mod memory;
mod sqlite;

pub use memory::MemoryKvStore;
pub use sqlite::SqliteKvStore;

use anyhow::Result;
use chrono::Duration;
use std::sync::Arc;

/// Host-style key-value store.
///
/// Mirrors the chat host's plugin KV API: set, get, delete, plus optional
/// per-key expiry. Expired keys read as absent even before they are purged.
pub trait KvStore: Send + Sync {
    fn set(&self, key: &str, value: &[u8]) -> Result<()>;

    /// Store `value` so that it reads as absent once `ttl` has elapsed.
    fn set_with_expiry(&self, key: &str, value: &[u8], ttl: Duration) -> Result<()>;

    /// Returns `None` if the key is absent or expired.
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Deleting a missing key is not an error.
    fn delete(&self, key: &str) -> Result<()>;

    /// Physically remove expired keys. Returns how many were removed.
    fn purge_expired(&self) -> Result<usize>;
}

/// Background task that periodically purges expired keys.
pub async fn run_expiry_purge(store: Arc<dyn KvStore>, interval_seconds: u64) {
    let mut interval = tokio::time::interval(tokio::time::Duration::from_secs(interval_seconds));

    loop {
        interval.tick().await;
        match store.purge_expired() {
            Ok(0) => {}
            Ok(removed) => tracing::debug!(removed, "Purged expired KV entries"),
            Err(e) => tracing::warn!(error = %e, "Failed to purge expired KV entries"),
        }
    }
}
