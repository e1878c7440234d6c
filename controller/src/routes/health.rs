//! Controller liveness route.

use axum::{Json, Router, extract::State, routing::get};
use serde::Serialize;

use crate::config::RoutingMode;
use crate::server::AppState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub ok: bool,
    pub status: &'static str,
    pub mode: RoutingMode,
    pub replicas_total: usize,
    pub replicas_healthy: usize,
    pub uptime_secs: u64,
}

pub fn router() -> Router<AppState> {
    Router::new().route(cdn_common::server::HEALTH_PATH, get(health_check))
}

async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let snapshot = state.registry.snapshot();
    Json(HealthResponse {
        ok: true,
        status: "ok",
        mode: state.config.routing_mode,
        replicas_total: state.registry.len(),
        replicas_healthy: snapshot.healthy_count(),
        uptime_secs: state.start_time.elapsed().as_secs(),
    })
}
