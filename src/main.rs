use anyhow::{Context, Result};
use outlook_bridge::{
    api::{create_oauth_router, OAuthAppState},
    config::{self, ConfigHandle},
    host::{Notifier, RestChatHost},
    kv::{run_expiry_purge, KvStore, MemoryKvStore, SqliteKvStore},
    oauth::MicrosoftProvider,
    plugin::Plugin,
};
use std::sync::Arc;
use std::time::Duration;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing subscriber
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "outlook_bridge=info,tower_http=info".into()),
        )
        .init();

    info!("Outlook bridge starting...");

    let config_path = std::env::var("OUTLOOK_CONFIG").ok();
    let config = config::load_from_env(config_path.as_deref())
        .context("Failed to load configuration")?;

    info!(
        bind_addr = %config.server.bind_addr,
        kv_db_path = %config.server.kv_db_path,
        mattermost_url = %config.server.mattermost_url,
        "Configuration loaded"
    );

    let store: Arc<dyn KvStore> = if config.server.kv_db_path == ":memory:" {
        warn!("Using in-memory KV store, connected accounts will not survive a restart");
        Arc::new(MemoryKvStore::new())
    } else {
        Arc::new(
            SqliteKvStore::new(&config.server.kv_db_path)
                .context("Failed to initialize KV store")?,
        )
    };

    tokio::spawn(run_expiry_purge(
        Arc::clone(&store),
        config.server.purge_interval_seconds,
    ));

    let http = reqwest::Client::builder()
        .user_agent(concat!("outlook-bridge/", env!("CARGO_PKG_VERSION")))
        .build()
        .context("Failed to build HTTP client")?;

    let host = Arc::new(
        RestChatHost::new(
            http.clone(),
            config.server.mattermost_url.clone(),
            config.server.bot_token.clone(),
        )
        .timeout(Duration::from_secs(config.plugin.http_timeout_seconds)),
    );

    let config_handle = ConfigHandle::new(config.plugin);
    let plugin = Plugin::new(config_handle.clone(), host.clone());
    let bot_user_id = plugin
        .on_activate()
        .await
        .context("Plugin activation failed")?;

    spawn_config_reload(plugin, config_path)?;

    let app = create_oauth_router(OAuthAppState {
        config: config_handle,
        store,
        provider: Arc::new(MicrosoftProvider::with_client(http)),
        notifier: Notifier::new(host, bot_user_id),
    })
    .layer(TraceLayer::new_for_http());

    let listener = tokio::net::TcpListener::bind(&config.server.bind_addr)
        .await
        .with_context(|| format!("Failed to bind {}", config.server.bind_addr))?;

    info!(addr = %config.server.bind_addr, "Listening");

    axum::serve(listener, app).await.context("Server error")?;

    Ok(())
}

/// Reload the plugin configuration on SIGHUP.
#[cfg(unix)]
fn spawn_config_reload(plugin: Plugin, config_path: Option<String>) -> Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut hangup = signal(SignalKind::hangup()).context("Failed to install SIGHUP handler")?;
    tokio::spawn(async move {
        while hangup.recv().await.is_some() {
            info!("SIGHUP received, reloading configuration");
            if let Err(e) = plugin.reload(config_path.as_deref()) {
                warn!(error = %e, "Reloaded configuration rejected");
            }
        }
    });
    Ok(())
}

#[cfg(not(unix))]
fn spawn_config_reload(_plugin: Plugin, _config_path: Option<String>) -> Result<()> {
    warn!("Configuration reload is only supported on unix");
    Ok(())
}
