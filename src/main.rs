// src/main.rs
mod api;
mod config;
mod error;
mod models;
mod persistence;
mod preferences;
mod quotes;
mod storage;
mod store;

use crate::api::AppState;
use crate::config::{Config, StorageBackend};
use crate::preferences::ThemeStore;
use crate::quotes::TwelveDataClient;
use crate::storage::{FileStorage, KeyValueStorage, MemoryStorage, ScyllaStorage};
use crate::store::WatchlistStore;
use env_logger::Builder;
use log::{error, info, warn};
use std::sync::Arc;

async fn open_storage(
    backend: &StorageBackend,
) -> Result<Arc<dyn KeyValueStorage>, Box<dyn std::error::Error>> {
    let storage: Arc<dyn KeyValueStorage> = match backend {
        StorageBackend::File(path) => {
            info!("Using file storage at {}", path.display());
            Arc::new(FileStorage::new(path.clone()))
        }
        StorageBackend::Scylla(node) => Arc::new(ScyllaStorage::connect(node).await?),
        StorageBackend::Memory => {
            warn!("Using in-memory storage; watchlists will not survive a restart");
            Arc::new(MemoryStorage::new())
        }
    };
    Ok(storage)
}

#[tokio::main]
async fn main() {
    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Invalid configuration: {}", e);
            return;
        }
    };

    Builder::new()
        .filter_level(config.log_level)
        .format_timestamp_secs()
        .init();

    info!("Starting the stock watch service...");

    let storage = match open_storage(&config.storage).await {
        Ok(storage) => storage,
        Err(e) => {
            error!("Failed to open storage: {}", e);
            return;
        }
    };

    let store = Arc::new(WatchlistStore::restore(storage.clone()).await);
    let themes = Arc::new(ThemeStore::load(storage, config.default_theme).await);
    let quotes = Arc::new(TwelveDataClient::new(
        config.api_key.clone(),
        config.base_url.clone(),
    ));

    let state = AppState {
        store: store.clone(),
        quotes,
        themes,
        movers: Arc::new(config.movers.clone()),
    };

    let bound = warp::serve(api::routes(state)).try_bind_with_graceful_shutdown(
        config.bind,
        async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("Failed to listen for shutdown signal: {}", e);
            }
        },
    );
    let (addr, server) = match bound {
        Ok(bound) => bound,
        Err(e) => {
            error!("Failed to bind {}: {}", config.bind, e);
            return;
        }
    };
    info!("Server running on http://{}", addr);
    server.await;

    info!("Shutting down; flushing pending writes...");
    store.flush().await;
}
