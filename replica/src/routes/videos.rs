//! Video delivery routes: `GET` and `HEAD /videos/{name}`.
//!
//! The conditional and range decision is made by `cdn_delivery::decide`; this
//! module turns the outcome into headers and a bounded file stream.

use asset_store::VideoAsset;
use axum::Router;
use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, HeaderValue, StatusCode, header};
use axum::http::response::Builder;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use cdn_common::{ApiError, content_type_for, normalize_video_name};
use cdn_delivery::{Outcome, RequestConditions, Resource, ResourceMeta, decide};
use tracing::debug;

use crate::error::{Error, Result};
use crate::server::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/videos/{name}", get(get_video).head(head_video))
}

fn resource_for(asset: &VideoAsset) -> Resource {
    Resource::new(ResourceMeta {
        size: asset.size,
        modified: asset.modified,
        version: asset.version,
    })
}

fn header_str(headers: &HeaderMap, name: header::HeaderName) -> Option<&str> {
    headers.get(name).and_then(|value| value.to_str().ok())
}

/// A `Range` header that is not valid UTF-8 stays present as an empty value,
/// which fails to parse and is answered with `416`.
fn range_header(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::RANGE)
        .map(|value| value.to_str().unwrap_or_default())
}

/// Headers carried by every `200`, `206` and `304` for `resource`.
fn validator_headers(builder: Builder, resource: &Resource, cache_control: &str) -> Builder {
    let validator = resource.validator();
    builder
        .header(header::ETAG, validator.etag())
        .header(header::LAST_MODIFIED, validator.last_modified())
        .header(header::CACHE_CONTROL, cache_control)
        .header(header::ACCEPT_RANGES, "bytes")
}

async fn lookup(state: &AppState, name: &str) -> Result<(String, Option<VideoAsset>)> {
    let file_name = normalize_video_name(name)?;
    let asset = state.store.stat(&file_name).await?;
    Ok((file_name, asset))
}

async fn get_video(
    State(state): State<AppState>,
    Path(name): Path<String>,
    headers: HeaderMap,
) -> Result<Response> {
    let (file_name, asset) = lookup(&state, &name).await?;
    let resource = asset.as_ref().map(resource_for);

    let conditions = RequestConditions {
        range: range_header(&headers),
        if_none_match: header_str(&headers, header::IF_NONE_MATCH),
        if_modified_since: header_str(&headers, header::IF_MODIFIED_SINCE),
    };
    let outcome = decide(resource.as_ref(), &conditions);

    let (Some(asset), Some(resource)) = (asset, resource) else {
        debug!(name = %file_name, "Video not found");
        return Err(Error::NotFound(file_name));
    };

    debug!(
        name = %file_name,
        status = outcome.status(),
        range = conditions.range.unwrap_or("-"),
        "Serving video"
    );

    let cache_control = state.config.cache_control.as_str();
    match outcome {
        Outcome::NotFound => Err(Error::NotFound(file_name)),
        Outcome::NotModified => {
            let response = validator_headers(Response::builder(), &resource, cache_control)
                .status(StatusCode::NOT_MODIFIED)
                .body(Body::empty())?;
            Ok(response)
        }
        Outcome::RangeNotSatisfiable { size } => {
            let mut response = ApiError::range_not_satisfiable(format!(
                "Requested range not satisfiable for {} ({} bytes)",
                file_name, size
            ))
            .into_response();
            let content_range = HeaderValue::from_str(&format!("bytes */{}", size))
                .map_err(|e| Error::Http(e.into()))?;
            response
                .headers_mut()
                .insert(header::CONTENT_RANGE, content_range);
            response
                .headers_mut()
                .insert(header::ACCEPT_RANGES, HeaderValue::from_static("bytes"));
            Ok(response)
        }
        Outcome::Full { .. } | Outcome::Partial { .. } => {
            let mut builder = validator_headers(Response::builder(), &resource, cache_control)
                .header(header::CONTENT_TYPE, content_type_for(&asset.name))
                .header(header::CONTENT_LENGTH, outcome.content_length().unwrap_or(0));

            if let Outcome::Partial { range, size } = outcome {
                builder = builder
                    .status(StatusCode::PARTIAL_CONTENT)
                    .header(header::CONTENT_RANGE, range.content_range(size));
            } else {
                builder = builder.status(StatusCode::OK);
            }

            let body = match outcome.window() {
                Some(window) => {
                    let chunks = state
                        .store
                        .read_window(&asset, window.start, window.len(), state.config.chunk_size)
                        .await?;
                    Body::from_stream(chunks)
                }
                None => Body::empty(),
            };

            Ok(builder.body(body)?)
        }
    }
}

async fn head_video(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Response> {
    let (file_name, asset) = lookup(&state, &name).await?;
    let Some(asset) = asset else {
        return Err(Error::NotFound(file_name));
    };
    let resource = resource_for(&asset);

    let response = validator_headers(Response::builder(), &resource, &state.config.cache_control)
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, content_type_for(&asset.name))
        .header(header::CONTENT_LENGTH, asset.size)
        .body(Body::empty())?;
    Ok(response)
}
