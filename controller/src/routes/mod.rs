//! Controller route modules.

pub mod health;
pub mod replicas;
pub mod videos;

use axum::Router;

use crate::server::AppState;

/// Create the controller router with all routes.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .merge(videos::router())
        .merge(health::router())
        .merge(replicas::router())
        .with_state(state)
}
