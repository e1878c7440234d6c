//! Controller HTTP server and background tasks.

use std::sync::Arc;
use std::time::Instant;

use axum::Router;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::config::ControllerConfig;
use crate::error::Result;
use crate::monitor::HealthMonitor;
use crate::proxy::build_client;
use crate::registry::ReplicaRegistry;
use crate::routes;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<ReplicaRegistry>,
    pub client: reqwest::Client,
    pub config: Arc<ControllerConfig>,
    pub start_time: Instant,
}

impl AppState {
    pub fn new(config: ControllerConfig) -> Result<Self> {
        let client = build_client(&config.proxy)?;
        let registry = Arc::new(ReplicaRegistry::from_specs(config.replicas.clone()));
        Ok(Self {
            registry,
            client,
            config: Arc::new(config),
            start_time: Instant::now(),
        })
    }
}

/// Build the controller router with middleware applied.
pub fn build_router(state: AppState) -> Router {
    let server_config = state.config.server.clone();
    cdn_common::with_middleware(routes::create_router(state), &server_config)
}

/// Run the health monitor and serve until `cancel_token` fires.
pub async fn run(state: AppState, cancel_token: CancellationToken) -> Result<()> {
    let config = state.config.clone();

    for replica in state.registry.endpoints() {
        info!(replica = %replica.id, url = %replica.base_url, "Configured replica");
    }
    info!(
        mode = %config.routing_mode,
        port = config.server.port,
        "Starting controller"
    );

    let monitor = HealthMonitor::with_http_probe(state.registry.clone(), config.health.clone())?;
    let monitor_token = cancel_token.child_token();
    let monitor_handle = monitor.spawn(monitor_token.clone());

    let served = cdn_common::serve(build_router(state), &config.server, cancel_token).await;

    monitor_token.cancel();
    let _ = monitor_handle.await;

    served?;
    Ok(())
}
