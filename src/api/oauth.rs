//! HTTP endpoints for connecting an Outlook account.
//!
//! - `GET /oauth/connect`  → 302 to the Microsoft authorize page
//! - `GET /oauth/complete` → provider callback, stores the account
//! - anything else         → 404
//!
//! Every request first checks the current configuration; an invalid one
//! answers 501 before any route runs.

use crate::config::{ConfigHandle, PluginConfig};
use crate::crypto::TokenCipher;
use crate::error::BridgeError;
use crate::host::Notifier;
use crate::kv::KvStore;
use crate::oauth::{IdentityProvider, StateManager};
use crate::users::{ConnectedAccount, IndexOutcome, UserInfoStore};
use axum::{
    extract::{Query, Request, State},
    http::{header, HeaderMap, StatusCode},
    middleware::{self, Next},
    response::{Html, IntoResponse, Response},
    routing::get,
    Extension, Router,
};
use chrono::Duration;
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Header the chat server sets to the authenticated user's id
pub const USER_ID_HEADER: &str = "Mattermost-User-ID";

const COMPLETE_HTML: &str = r#"<!DOCTYPE html>
<html>
    <head>
        <script>
            window.close();
        </script>
    </head>
    <body>
        <p>Completed connecting to Outlook. Please close this window.</p>
    </body>
</html>
"#;

/// Shared application state for the OAuth endpoints
#[derive(Clone)]
pub struct OAuthAppState {
    pub config: ConfigHandle,
    pub store: Arc<dyn KvStore>,
    pub provider: Arc<dyn IdentityProvider>,
    pub notifier: Notifier,
}

impl OAuthAppState {
    fn state_manager(&self, config: &PluginConfig) -> StateManager {
        StateManager::new(
            Arc::clone(&self.store),
            Duration::seconds(config.state_ttl_seconds),
        )
    }

    fn user_store(&self, config: &PluginConfig) -> Result<UserInfoStore, BridgeError> {
        let cipher = TokenCipher::from_base64(&config.encryption_key)?;
        Ok(UserInfoStore::new(Arc::clone(&self.store), cipher))
    }
}

/// OAuth callback query parameters
#[derive(Debug, Deserialize)]
pub struct OAuthCallback {
    code: Option<String>,
    state: Option<String>,
    error: Option<String>,
    error_description: Option<String>,
}

/// Create the OAuth router
pub fn create_oauth_router(state: OAuthAppState) -> Router {
    let state = Arc::new(state);
    Router::new()
        .route("/oauth/connect", get(connect))
        .route("/oauth/complete", get(complete))
        .fallback(not_found)
        .layer(middleware::from_fn_with_state(
            Arc::clone(&state),
            require_valid_config,
        ))
        .with_state(state)
}

/// Rejects every request with 501 while the configuration is invalid, and
/// hands handlers the snapshot it validated.
async fn require_valid_config(
    State(state): State<Arc<OAuthAppState>>,
    mut request: Request,
    next: Next,
) -> Response {
    let config = state.config.snapshot();
    if let Err(e) = config.is_valid() {
        warn!(error = %e, "Request rejected, plugin not configured");
        return BridgeError::NotConfigured(format!("{:#}", e)).into_response();
    }

    request.extensions_mut().insert(config);
    next.run(request).await
}

/// GET /oauth/connect
///
/// Issues a state token for the calling user and redirects to Microsoft.
async fn connect(
    State(state): State<Arc<OAuthAppState>>,
    Extension(config): Extension<Arc<PluginConfig>>,
    headers: HeaderMap,
) -> Result<Response, BridgeError> {
    let user_id = headers
        .get(USER_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or(BridgeError::Unauthorized)?;

    let csrf_state = state.state_manager(&config).begin_state(user_id)?;
    let auth_url = state.provider.authorization_url(&config, &csrf_state);

    info!(user_id = %user_id, "Redirecting to Microsoft authorization");

    Ok((StatusCode::FOUND, [(header::LOCATION, auth_url)]).into_response())
}

/// GET /oauth/complete
///
/// Validates and consumes the state, exchanges the code, identifies the
/// Outlook account, stores it and greets the user.
async fn complete(
    State(state): State<Arc<OAuthAppState>>,
    Extension(config): Extension<Arc<PluginConfig>>,
    Query(callback): Query<OAuthCallback>,
) -> Result<Response, BridgeError> {
    if let Some(error) = callback.error {
        let description = callback
            .error_description
            .unwrap_or_else(|| "Unknown error".to_string());
        warn!(error = %error, description = %description, "OAuth authorization failed");
        return Err(BridgeError::ProviderDenied(format!("{} - {}", error, description)));
    }

    let code = callback
        .code
        .filter(|c| !c.is_empty())
        .ok_or(BridgeError::MissingParameter("code"))?;
    let csrf_state = callback
        .state
        .filter(|s| !s.is_empty())
        .ok_or(BridgeError::MissingParameter("state"))?;

    let user_id = state
        .state_manager(&config)
        .validate_state(&csrf_state)
        .map_err(|e| {
            warn!(error = %e, "OAuth state rejected");
            e
        })?;

    debug!(user_id = %user_id, "OAuth state validated, exchanging code");

    let token = state
        .provider
        .exchange_code(&config, &code)
        .await
        .map_err(|e| {
            error!(user_id = %user_id, error = %e, "Token exchange failed");
            e
        })?;

    let identity = state
        .provider
        .fetch_identity(&config, &token.access_token)
        .await
        .map_err(|e| {
            error!(user_id = %user_id, error = %e, "Identity lookup failed");
            e
        })?;
    if identity.email.trim().is_empty() {
        error!(user_id = %user_id, "Identity lookup returned no email");
        return Err(BridgeError::IdentityUnavailable(
            "account has no email address".to_string(),
        ));
    }

    let account = ConnectedAccount {
        user_id: user_id.clone(),
        email: identity.email.clone(),
        token,
    };

    let outcome = state.user_store(&config)?.connect(&account).map_err(|e| {
        error!(user_id = %user_id, error = %e, "Failed to store Outlook account");
        e
    })?;

    if let IndexOutcome::Failed(e) = &outcome.index {
        warn!(user_id = %user_id, error = %e, "Email index not updated");
    }
    if let Some(old) = &outcome.replaced_email {
        debug!(user_id = %user_id, old_email = %old, "Removed stale email index entry");
    }

    if let Err(e) = state.notifier.send_welcome(&user_id, &identity).await {
        warn!(user_id = %user_id, error = %e, "Welcome message not sent");
    }

    info!(
        user_id = %user_id,
        has_refresh_token = account.token.refresh_token.is_some(),
        "Outlook account connected"
    );

    Ok(Html(COMPLETE_HTML).into_response())
}

async fn not_found() -> BridgeError {
    BridgeError::NotFound
}
