//! Application state and initialization
//!
//! All services are built here and shared with the HTTP layer through
//! `AppState`.

use crate::config::ServerConfig;
use crate::database::{create_pool, Repository};
use crate::error::Result;
use crate::server::RateLimiter;
use crate::services::{GamesService, ImageBinder};
use crate::storage::BlobStore;
use sqlx::SqlitePool;
use std::sync::Arc;

/// Central application state holding all services
#[derive(Clone)]
pub struct AppState {
    pub config: ServerConfig,
    pub pool: SqlitePool,
    pub blob_store: BlobStore,
    pub games: GamesService,
    pub limiter: Arc<RateLimiter>,
}

impl AppState {
    pub fn new(pool: SqlitePool, config: ServerConfig) -> Self {
        let blob_store = BlobStore::new(pool.clone());
        let binder = ImageBinder::new(blob_store.clone());
        let games = GamesService::new(
            Repository::new(pool.clone()),
            binder,
            config.max_image_bytes,
            config.public_base_url.clone(),
        );
        let limiter = Arc::new(RateLimiter::new(config.rate_limit));

        Self {
            config,
            pool,
            blob_store,
            games,
            limiter,
        }
    }
}

/// Application setup - called once on startup
pub async fn setup(config: ServerConfig) -> Result<AppState> {
    tracing::info!("Initializing application");
    tracing::info!("Database path: {:?}", config.database_path);

    let pool = create_pool(&config.database_path).await?;
    let state = AppState::new(pool, config);

    tracing::info!("Application initialized successfully");
    Ok(state)
}
