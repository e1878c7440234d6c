//! Video routes: `GET` and `HEAD /videos/{id}`.

use axum::Router;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, Method};
use axum::response::Response;
use axum::routing::get;
use cdn_common::normalize_video_name;
use tracing::debug;

use crate::config::RoutingMode;
use crate::error::ProxyError;
use crate::proxy::{VideoProxy, redirect};
use crate::server::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/videos/{id}", get(serve_video).head(serve_video))
}

async fn serve_video(
    State(state): State<AppState>,
    Path(id): Path<String>,
    method: Method,
    headers: HeaderMap,
) -> Result<Response, ProxyError> {
    let name = normalize_video_name(&id).map_err(|_| ProxyError::InvalidName(id))?;

    let candidates = state.registry.candidates();
    debug!(
        name = %name,
        method = %method,
        first = candidates.first().map(|r| r.id.as_str()).unwrap_or("-"),
        "Routing video request"
    );

    match state.config.routing_mode {
        RoutingMode::Redirect => redirect(&candidates, &name),
        RoutingMode::Proxy => {
            VideoProxy::new(&state.client, &state.config.proxy)
                .forward(&candidates, &method, &name, &headers)
                .await
        }
    }
}
