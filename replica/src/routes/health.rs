//! Liveness route probed by the controller.

use axum::{Json, Router, extract::State, routing::get};
use serde::Serialize;

use crate::server::AppState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub ok: bool,
    pub replica: String,
    pub uptime_secs: u64,
}

pub fn router() -> Router<AppState> {
    Router::new().route(cdn_common::server::HEALTH_PATH, get(health_check))
}

async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        ok: true,
        replica: state.config.name.clone(),
        uptime_secs: state.start_time.elapsed().as_secs(),
    })
}
