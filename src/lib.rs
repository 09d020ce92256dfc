// Error taxonomy surfaced over HTTP
pub mod error;

// Plugin and server configuration
pub mod config;

// Token encryption at rest
pub mod crypto;

// Key-value persistence
pub mod kv;

// OAuth state, code exchange and identity provider
pub mod oauth;

// Microsoft Graph client
pub mod graph;

// Connected accounts and the email index
pub mod users;

// Chat host collaborator and bot notifications
pub mod host;

// Activation and configuration changes
pub mod plugin;

// HTTP endpoints
pub mod api;

#[cfg(test)]
pub(crate) mod test_support;

pub use error::BridgeError;
