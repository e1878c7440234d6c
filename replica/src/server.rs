//! Replica HTTP server.

use std::sync::Arc;
use std::time::Instant;

use asset_store::AssetStore;
use axum::Router;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::config::ReplicaConfig;
use crate::error::Result;
use crate::routes;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<AssetStore>,
    pub config: Arc<ReplicaConfig>,
    pub start_time: Instant,
}

impl AppState {
    pub fn new(store: AssetStore, config: ReplicaConfig) -> Self {
        Self {
            store: Arc::new(store),
            config: Arc::new(config),
            start_time: Instant::now(),
        }
    }

    /// Open the asset directory named by `config` and build the state.
    pub async fn open(config: ReplicaConfig) -> Result<Self> {
        let store = AssetStore::open(&config.videos_dir).await?;
        info!(
            replica = %config.name,
            root = %store.root().display(),
            "Asset store opened"
        );
        Ok(Self::new(store, config))
    }
}

/// Build the replica router with middleware applied.
pub fn build_router(state: AppState) -> Router {
    let server_config = state.config.server.clone();
    cdn_common::with_middleware(routes::create_router(state), &server_config)
}

/// Serve the replica until `cancel_token` fires.
pub async fn run(state: AppState, cancel_token: CancellationToken) -> Result<()> {
    let server_config = state.config.server.clone();
    info!(
        replica = %state.config.name,
        port = server_config.port,
        "Starting replica server"
    );
    cdn_common::serve(build_router(state), &server_config, cancel_token).await?;
    Ok(())
}
