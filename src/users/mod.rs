//! Connected Outlook accounts.
//!
//! Two kinds of KV entries are kept per connected user:
//!
//! | key                      | value                              |
//! |--------------------------|------------------------------------|
//! | `<userID>_graphtoken`    | JSON `ConnectedAccount`, encrypted |
//! | `<email>_outlookemail`   | raw user id (reverse lookup)       |
//!
//! The account record is the source of truth. The email index is a
//! convenience lookup: failing to write it never fails a connect, but the
//! outcome is reported so callers can log or assert on it.

use crate::crypto::TokenCipher;
use crate::error::BridgeError;
use crate::kv::KvStore;
use crate::oauth::Token;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub const GRAPH_TOKEN_KEY: &str = "_graphtoken";
pub const OUTLOOK_EMAIL_KEY: &str = "_outlookemail";

/// A local user's connected Outlook account.
///
/// In storage `token.access_token` and `token.refresh_token` are ciphertext.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ConnectedAccount {
    #[serde(rename = "UserID")]
    pub user_id: String,
    #[serde(rename = "Email")]
    pub email: String,
    #[serde(rename = "Token")]
    pub token: Token,
}

/// Result of the email index write during [`UserInfoStore::connect`]
#[derive(Debug, PartialEq)]
pub enum IndexOutcome {
    Written,
    Failed(BridgeError),
}

/// What a successful connect changed
#[derive(Debug, PartialEq)]
pub struct ConnectOutcome {
    pub index: IndexOutcome,
    /// Previous email whose index entry was removed on re-connect
    pub replaced_email: Option<String>,
}

pub fn account_key(user_id: &str) -> String {
    format!("{}{}", user_id, GRAPH_TOKEN_KEY)
}

pub fn email_key(email: &str) -> String {
    format!("{}{}", email, OUTLOOK_EMAIL_KEY)
}

/// Reads and writes connected-account records and the email index.
#[derive(Clone)]
pub struct UserInfoStore {
    store: Arc<dyn KvStore>,
    cipher: TokenCipher,
}

impl UserInfoStore {
    pub fn new(store: Arc<dyn KvStore>, cipher: TokenCipher) -> Self {
        Self { store, cipher }
    }

    /// Encrypt the token fields and write the record under `<userID>_graphtoken`.
    pub fn save(&self, account: &ConnectedAccount) -> Result<(), BridgeError> {
        let mut sealed = account.clone();
        sealed.token.access_token = self.cipher.encrypt(&account.token.access_token)?;
        sealed.token.refresh_token = account
            .token
            .refresh_token
            .as_deref()
            .map(|t| self.cipher.encrypt(t))
            .transpose()?;

        let bytes = serde_json::to_vec(&sealed).map_err(|e| {
            BridgeError::StorageError(format!("Failed to encode account record: {}", e))
        })?;

        self.store
            .set(&account_key(&account.user_id), &bytes)
            .map_err(|e| BridgeError::StorageError(format!("{:#}", e)))
    }

    /// Stored record for `user_id`, token fields still encrypted.
    pub fn get(&self, user_id: &str) -> Result<Option<ConnectedAccount>, BridgeError> {
        let Some(bytes) = self
            .store
            .get(&account_key(user_id))
            .map_err(|e| BridgeError::StorageError(format!("{:#}", e)))?
        else {
            return Ok(None);
        };

        let account = serde_json::from_slice(&bytes).map_err(|e| {
            BridgeError::StorageError(format!("Failed to decode account record: {}", e))
        })?;
        Ok(Some(account))
    }

    /// Decrypted token for `user_id`, ready to use against Graph.
    ///
    /// `CryptoError` means the record cannot be trusted; the user has to
    /// connect again.
    pub fn load_token(&self, user_id: &str) -> Result<Option<Token>, BridgeError> {
        let Some(account) = self.get(user_id)? else {
            return Ok(None);
        };

        let mut token = account.token;
        token.access_token = self.cipher.decrypt(&token.access_token)?;
        token.refresh_token = token
            .refresh_token
            .as_deref()
            .map(|t| self.cipher.decrypt(t))
            .transpose()?;

        Ok(Some(token))
    }

    /// Write `<email>_outlookemail -> user_id`.
    pub fn index_email(&self, email: &str, user_id: &str) -> Result<(), BridgeError> {
        self.store
            .set(&email_key(email), user_id.as_bytes())
            .map_err(|e| {
                BridgeError::StorageError(format!("Failed to save outlook email mapping: {:#}", e))
            })
    }

    /// Local user id connected with `email`, if any.
    pub fn lookup_by_email(&self, email: &str) -> Result<Option<String>, BridgeError> {
        let value = self
            .store
            .get(&email_key(email))
            .map_err(|e| BridgeError::StorageError(format!("{:#}", e)))?;

        Ok(value
            .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
            .filter(|user_id| !user_id.is_empty()))
    }

    /// Persist a freshly connected account and maintain the email index.
    ///
    /// Saving the record is fatal on failure. Index maintenance is reported
    /// in the returned [`ConnectOutcome`]. When the user previously connected
    /// a different mailbox, that mailbox's index entry is removed if it still
    /// points at this user.
    pub fn connect(&self, account: &ConnectedAccount) -> Result<ConnectOutcome, BridgeError> {
        let previous_email = match self.get(&account.user_id) {
            Ok(prev) => prev.map(|p| p.email),
            Err(e) => {
                tracing::warn!(
                    user_id = %account.user_id,
                    error = %e,
                    "Unreadable previous account record, overwriting"
                );
                None
            }
        };

        self.save(account)?;

        let replaced_email = match previous_email {
            Some(old) if !old.is_empty() && old != account.email => {
                self.remove_stale_index(&old, &account.user_id)
            }
            _ => None,
        };

        let index = match self.index_email(&account.email, &account.user_id) {
            Ok(()) => IndexOutcome::Written,
            Err(e) => IndexOutcome::Failed(e),
        };

        Ok(ConnectOutcome {
            index,
            replaced_email,
        })
    }

    fn remove_stale_index(&self, old_email: &str, user_id: &str) -> Option<String> {
        match self.lookup_by_email(old_email) {
            Ok(Some(owner)) if owner == user_id => {}
            // Another user connected that mailbox since; leave their entry alone
            Ok(_) => return None,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to read stale email index entry");
                return None;
            }
        }

        match self.store.delete(&email_key(old_email)) {
            Ok(()) => Some(old_email.to_string()),
            Err(e) => {
                tracing::warn!(
                    user_id = %user_id,
                    error = %e,
                    "Failed to remove stale email index entry"
                );
                None
            }
        }
    }
}
