//! Administrative routes: upload, purge and cache bust.

use asset_store::{StoreError, VideoAsset};
use axum::Router;
use axum::body::Body;
use axum::extract::{DefaultBodyLimit, Path, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::Json;
use cdn_common::{normalize_video_name, sanitize_video_id};
use cdn_delivery::CacheValidator;
use serde::Serialize;
use tracing::{info, warn};

use crate::error::{Error, Result};
use crate::server::AppState;

/// Header carrying the id of an uploaded video.
pub const VIDEO_ID_HEADER: &str = "video-id";

pub fn router() -> Router<AppState> {
    Router::new()
        .route(
            "/upload",
            post(upload_video).layer(DefaultBodyLimit::disable()),
        )
        .route("/purge/{name}", post(purge_video))
        .route("/bust/{name}", post(bust_video))
}

#[derive(Debug, Serialize)]
pub struct AssetResponse {
    pub ok: bool,
    pub name: String,
    pub size: u64,
    pub version: u64,
    pub etag: String,
    pub last_modified: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created: Option<bool>,
}

impl AssetResponse {
    fn from_asset(asset: &VideoAsset, created: Option<bool>) -> Self {
        let validator = CacheValidator::compute(asset.size, asset.modified, asset.version);
        Self {
            ok: true,
            name: asset.name.clone(),
            size: asset.size,
            version: asset.version,
            etag: validator.etag().to_string(),
            last_modified: validator.last_modified().to_string(),
            created,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct PurgeResponse {
    pub ok: bool,
    pub name: String,
    pub purged: bool,
}

async fn upload_video(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Body,
) -> Result<Response> {
    let raw_id = headers
        .get(VIDEO_ID_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .ok_or(Error::MissingHeader(VIDEO_ID_HEADER))?;
    let name = sanitize_video_id(raw_id)?;

    let limit = state.config.max_upload_bytes;
    if let Some(limit) = limit
        && let Some(declared) = headers
            .get(header::CONTENT_LENGTH)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.parse::<u64>().ok())
        && declared > limit
    {
        warn!(name = %name, declared, limit, "Rejecting oversized upload");
        return Err(StoreError::TooLarge { name, limit }.into());
    }

    let receipt = state
        .store
        .store_stream(&name, body.into_data_stream(), limit)
        .await?;

    info!(
        replica = %state.config.name,
        name = %receipt.asset.name,
        size = receipt.asset.size,
        created = receipt.created,
        "Video uploaded"
    );

    let status = if receipt.created {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    Ok((
        status,
        Json(AssetResponse::from_asset(&receipt.asset, Some(receipt.created))),
    )
        .into_response())
}

async fn purge_video(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<PurgeResponse>> {
    let name = normalize_video_name(&name)?;
    state.store.purge(&name).await?;

    info!(replica = %state.config.name, name = %name, "Video purged");
    Ok(Json(PurgeResponse {
        ok: true,
        name,
        purged: true,
    }))
}

async fn bust_video(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<AssetResponse>> {
    let name = normalize_video_name(&name)?;
    let asset = state.store.bump_version(&name).await?;

    let response = AssetResponse::from_asset(&asset, None);
    info!(
        replica = %state.config.name,
        name = %name,
        version = asset.version,
        etag = %response.etag,
        "Cache validator busted"
    );
    Ok(Json(response))
}
