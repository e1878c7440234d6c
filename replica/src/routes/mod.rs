//! Replica route modules.

pub mod admin;
pub mod health;
pub mod videos;

use axum::Router;

use crate::server::AppState;

/// Create the replica router with all routes.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .merge(videos::router())
        .merge(admin::router())
        .merge(health::router())
        .with_state(state)
}
