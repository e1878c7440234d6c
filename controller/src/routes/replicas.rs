//! Registry view: `GET /replicas`.

use axum::{Json, Router, extract::State, routing::get};

use crate::registry::Replica;
use crate::server::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/replicas", get(list_replicas))
}

async fn list_replicas(State(state): State<AppState>) -> Json<Vec<Replica>> {
    Json(state.registry.replicas())
}
