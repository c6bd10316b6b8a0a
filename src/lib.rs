pub(crate) mod api;
pub(crate) mod core;
pub(crate) mod db;
pub(crate) mod repositories;
pub(crate) mod schemas;
pub(crate) mod services;
pub(crate) mod tasks;

#[cfg(test)]
mod test_support;

use std::sync::Arc;

use tokio::sync::watch;

use crate::core::{config::Settings, redis::RedisHandle, state::AppState, telemetry};
use crate::services::storage::StorageService;
use crate::services::store::{PgStore, PortalStore};

pub async fn run() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let settings = Settings::load()?;
    telemetry::init_tracing(&settings)?;
    core::metrics::init(&settings)?;

    let db_pool = db::init_pool(&settings).await?;
    db::run_migrations(&db_pool).await?;

    let redis = RedisHandle::new(settings.redis().redis_url());
    if let Err(err) = redis.connect().await {
        tracing::error!(error = %err, "Failed to connect to Redis; continuing without cache");
    } else {
        tracing::info!("Redis connected successfully");
    }

    let storage = StorageService::from_settings(&settings).await?;
    if storage.is_none() {
        tracing::warn!("S3 not configured; transcript uploads disabled");
    }

    let store: Arc<dyn PortalStore> = Arc::new(PgStore::new(db_pool.clone()));
    let state = AppState::new(settings, db_pool, redis.clone(), store, storage);

    if let Err(err) = core::bootstrap::ensure_admin(&state).await {
        tracing::error!(error = %err, "Failed to ensure bootstrap admin");
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let watcher_handles = tasks::watcher::spawn(state.clone(), shutdown_rx);

    let app = api::router::router(state.clone());
    let listener = tokio::net::TcpListener::bind(state.settings().server_addr()).await?;

    tracing::info!(
        host = %state.settings().server_host(),
        port = state.settings().server_port(),
        environment = %state.settings().runtime().environment,
        "Examhall API listening"
    );

    let result =
        axum::serve(listener, app).with_graceful_shutdown(core::shutdown::shutdown_signal()).await;

    if shutdown_tx.send(true).is_err() {
        tracing::warn!("Failed to broadcast shutdown signal to watcher tasks");
    }
    for handle in watcher_handles {
        if let Err(err) = handle.await {
            tracing::error!(error = %err, "Watcher task join failed");
        }
    }

    redis.disconnect().await;
    tracing::info!("Redis disconnected");

    result?;

    Ok(())
}
