//! Error taxonomy for the OAuth bridge.
//!
//! Components work with `anyhow::Result` internally and convert into
//! [`BridgeError`] at their public boundary, so the HTTP layer can map every
//! failure onto a precise status code.

use axum::{
    http::{header, StatusCode},
    response::{IntoResponse, Response},
};

/// Bridge errors, one variant per failure class surfaced to callers.
#[derive(Debug, Clone, PartialEq)]
pub enum BridgeError {
    /// Caller identity header missing or empty
    Unauthorized,
    /// Plugin configuration is incomplete or invalid
    NotConfigured(String),
    /// Required query parameter (`code` or `state`) absent
    MissingParameter(&'static str),
    /// Provider redirected back with an `error` parameter
    ProviderDenied(String),
    /// State token unknown, tampered, already consumed or expired
    InvalidState(String),
    /// Authorization code could not be exchanged for a token
    ExchangeFailed(String),
    /// Identity ("me") call failed or returned no usable email
    IdentityUnavailable(String),
    /// Encryption or decryption failure
    CryptoError(String),
    /// Serialization or key-value write failure
    StorageError(String),
    /// Chat host call (user lookup, DM channel, post) failed
    HostError(String),
    /// Unknown route
    NotFound,
}

impl BridgeError {
    /// HTTP status for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            BridgeError::Unauthorized => StatusCode::UNAUTHORIZED,
            BridgeError::NotConfigured(_) => StatusCode::NOT_IMPLEMENTED,
            BridgeError::MissingParameter(_)
            | BridgeError::ProviderDenied(_)
            | BridgeError::InvalidState(_) => StatusCode::BAD_REQUEST,
            BridgeError::ExchangeFailed(_)
            | BridgeError::CryptoError(_)
            | BridgeError::StorageError(_)
            | BridgeError::HostError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            BridgeError::IdentityUnavailable(_) => StatusCode::BAD_GATEWAY,
            BridgeError::NotFound => StatusCode::NOT_FOUND,
        }
    }
}

impl std::fmt::Display for BridgeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BridgeError::Unauthorized => write!(f, "Not authorized"),
            BridgeError::NotConfigured(msg) => {
                write!(f, "This plugin is not configured: {}", msg)
            }
            BridgeError::MissingParameter(name) => write!(f, "Missing '{}' parameter", name),
            BridgeError::ProviderDenied(msg) => write!(f, "Authorization denied: {}", msg),
            BridgeError::InvalidState(msg) => write!(f, "Invalid state: {}", msg),
            BridgeError::ExchangeFailed(msg) => {
                write!(f, "Failed to exchange authorization code: {}", msg)
            }
            BridgeError::IdentityUnavailable(msg) => {
                write!(f, "Unable to read Outlook account identity: {}", msg)
            }
            BridgeError::CryptoError(msg) => write!(f, "Crypto error: {}", msg),
            BridgeError::StorageError(msg) => write!(f, "Storage error: {}", msg),
            BridgeError::HostError(msg) => write!(f, "Chat host error: {}", msg),
            BridgeError::NotFound => write!(f, "404 page not found"),
        }
    }
}

impl std::error::Error for BridgeError {}

impl IntoResponse for BridgeError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        // Storage and crypto detail stays in the logs
        let body = match &self {
            BridgeError::StorageError(_) | BridgeError::CryptoError(_) => {
                "Unable to connect user to Outlook".to_string()
            }
            other => other.to_string(),
        };

        (
            status,
            [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
            body,
        )
            .into_response()
    }
}
