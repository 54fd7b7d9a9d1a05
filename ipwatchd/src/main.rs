mod api;
mod config;
mod notifier;
mod poller;
mod reconcile;
mod resolver;
mod store;

use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use anyhow::{Context, Result};
use crate::config::Config;
use crate::notifier::Notifier;
use crate::poller::Poller;
use crate::resolver::HttpResolver;
use crate::store::{EntryDb, StoreHandle};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("ipwatchd=info,tower_http=info"))
        )
        .init();

    tracing::info!("Starting ipwatchd");

    // Optional TOML config, then PORT / WATCH_INTERVAL / IPWATCH_* from the environment
    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let config = Config::load(config_path.as_deref())
        .context("Failed to load configuration")?;

    if let Some(path) = &config_path {
        tracing::info!("Loaded config from {}", path.display());
    }

    // The store must be reachable before anything else starts
    let db = EntryDb::open(&config.store.db_path)?;
    tracing::info!(
        "Opened database at {:?} ({} entries)",
        config.store.db_path,
        db.count()?
    );

    let store = StoreHandle::spawn(db)?;

    let notifier = Notifier::new(config.realtime.channel_capacity);

    let resolver = HttpResolver::new(
        config.watcher.lookup_url.clone(),
        config.watcher.request_timeout(),
    )?;
    let poller = Poller::new(resolver, store.clone(), notifier.clone())
        .await
        .context("Failed to read the latest entry")?;

    let app_state = api::routes::AppState {
        store: store.clone(),
        notifier: notifier.clone(),
    };
    let app = api::routes::router(app_state, Some(config.api.public_dir.as_path()));

    let listener = tokio::net::TcpListener::bind(config.api.listen)
        .await
        .with_context(|| format!("Failed to bind to {}", config.api.listen))?;

    tracing::info!("Server is running on http://{}", config.api.listen);

    let cancel = CancellationToken::new();

    let server_cancel = cancel.clone();
    let server_handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app)
            .with_graceful_shutdown(async move { server_cancel.cancelled().await })
            .await
        {
            tracing::error!("Server error: {}", e);
        }
    });

    // Start polling only once the server can push events
    let poller_handle = tokio::spawn(poller.run(config.watcher.interval(), cancel.clone()));

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl-c")?;

    tracing::info!("Shutdown signal received");

    cancel.cancel();

    let _ = tokio::join!(server_handle, poller_handle);

    if let Err(e) = store.shutdown().await {
        tracing::error!("Failed to shutdown store: {}", e);
    }

    tracing::info!("Shutdown complete");
    Ok(())
}
