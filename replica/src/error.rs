//! Replica errors and their HTTP mapping.

use asset_store::StoreError;
use axum::response::{IntoResponse, Response};
use cdn_common::ApiError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Invalid video name: {0}")]
    InvalidName(String),

    #[error("Missing header: {0}")]
    MissingHeader(&'static str),

    #[error("Video not found: {0}")]
    NotFound(String),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Common(#[from] cdn_common::Error),

    #[error("Response build error: {0}")]
    Http(#[from] axum::http::Error),
}

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        match err {
            Error::InvalidName(_) | Error::MissingHeader(_) => ApiError::bad_request(err.to_string()),
            Error::NotFound(_) => ApiError::not_found(err.to_string()),
            Error::Common(cdn_common::Error::InvalidName(_)) => ApiError::bad_request(err.to_string()),
            Error::Common(_) | Error::Http(_) => ApiError::internal(err.to_string()),
            Error::Store(store) => match store {
                StoreError::InvalidName(_)
                | StoreError::EmptyUpload(_)
                | StoreError::Body { .. } => ApiError::bad_request(store.to_string()),
                StoreError::NotFound(_) => ApiError::not_found(store.to_string()),
                StoreError::TooLarge { .. } => ApiError::payload_too_large(store.to_string()),
                StoreError::Io { .. } | StoreError::Index(_) => {
                    tracing::error!(error = %store, "Store failure");
                    ApiError::internal("Storage error")
                }
            },
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        ApiError::from(self).into_response()
    }
}
