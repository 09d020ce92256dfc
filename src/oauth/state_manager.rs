//! OAuth state management for CSRF protection.
//!
//! A state token is `<random15>_<userID>`. It is stored in the KV store
//! under its own value, round-trips through the provider redirect, and is
//! consumed exactly once on callback.

use crate::error::BridgeError;
use crate::kv::KvStore;
use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Length of the random prefix
const PREFIX_LEN: usize = 15;

const HEX: &[u8; 16] = b"0123456789abcdef";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StateStatus {
    /// Issued, waiting for the provider callback
    Pending,
    /// Presented once; any further use is a replay
    Consumed,
}

/// Persisted form of a state token
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StateRecord {
    pub state: String,
    pub user_id: String,
    pub status: StateStatus,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// Issues and validates single-use state tokens
#[derive(Clone)]
pub struct StateManager {
    store: Arc<dyn KvStore>,
    ttl: Duration,
}

impl StateManager {
    pub fn new(store: Arc<dyn KvStore>, ttl: Duration) -> Self {
        Self { store, ttl }
    }

    /// Generate a new state token for `user_id` and store it.
    ///
    /// The KV entry carries the same expiry as the record, so abandoned
    /// attempts are purged by the store.
    pub fn begin_state(&self, user_id: &str) -> Result<String, BridgeError> {
        if user_id.is_empty() {
            return Err(BridgeError::Unauthorized);
        }

        let state = format!("{}_{}", random_hex(PREFIX_LEN), user_id);
        let now = Utc::now();
        let record = StateRecord {
            state: state.clone(),
            user_id: user_id.to_string(),
            status: StateStatus::Pending,
            created_at: now,
            expires_at: now + self.ttl,
        };

        let bytes = serde_json::to_vec(&record)
            .map_err(|e| BridgeError::StorageError(format!("Failed to encode state: {}", e)))?;
        self.store
            .set_with_expiry(&state, &bytes, self.ttl)
            .map_err(|e| BridgeError::StorageError(format!("{:#}", e)))?;

        Ok(state)
    }

    /// Validate and consume a state token, returning the user it was issued to.
    ///
    /// The stored entry is consumed before any check runs, so a token that
    /// fails validation cannot be retried either.
    pub fn validate_state(&self, state: &str) -> Result<String, BridgeError> {
        let stored = self
            .store
            .get(state)
            .map_err(|e| BridgeError::StorageError(format!("{:#}", e)))?
            .ok_or_else(|| BridgeError::InvalidState("missing stored state".to_string()))?;

        self.consume(state)?;

        let record: StateRecord = serde_json::from_slice(&stored)
            .map_err(|_| BridgeError::InvalidState("stored state is corrupted".to_string()))?;

        if record.state != state {
            return Err(BridgeError::InvalidState(
                "stored state does not match".to_string(),
            ));
        }

        if record.status != StateStatus::Pending {
            return Err(BridgeError::InvalidState("state already used".to_string()));
        }

        if Utc::now() >= record.expires_at {
            return Err(BridgeError::InvalidState("state expired".to_string()));
        }

        let user_id = match state.split_once('_') {
            Some((_, user_id)) if !user_id.is_empty() => user_id,
            _ => return Err(BridgeError::InvalidState("malformed state".to_string())),
        };

        if user_id != record.user_id {
            return Err(BridgeError::InvalidState(
                "state user does not match".to_string(),
            ));
        }

        Ok(user_id.to_string())
    }

    /// Stored record for `state`, if any
    #[cfg(test)]
    pub(crate) fn lookup(&self, state: &str) -> Result<Option<StateRecord>, BridgeError> {
        let stored = self
            .store
            .get(state)
            .map_err(|e| BridgeError::StorageError(format!("{:#}", e)))?;

        Ok(stored.and_then(|bytes| serde_json::from_slice(&bytes).ok()))
    }

    /// Delete the entry; if the store refuses, tombstone it as consumed.
    fn consume(&self, state: &str) -> Result<(), BridgeError> {
        let delete_err = match self.store.delete(state) {
            Ok(()) => return Ok(()),
            Err(e) => e,
        };

        tracing::warn!(error = %delete_err, "Failed to delete OAuth state, marking consumed");

        let now = Utc::now();
        let tombstone = StateRecord {
            state: state.to_string(),
            user_id: String::new(),
            status: StateStatus::Consumed,
            created_at: now,
            expires_at: now,
        };
        let bytes = serde_json::to_vec(&tombstone)
            .map_err(|e| BridgeError::StorageError(format!("Failed to encode state: {}", e)))?;

        self.store
            .set_with_expiry(state, &bytes, self.ttl)
            .map_err(|e| BridgeError::StorageError(format!("{:#}", e)))
    }
}

fn random_hex(len: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..len)
        .map(|_| HEX[rng.gen_range(0..HEX.len())] as char)
        .collect()
}
