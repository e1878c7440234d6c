//! JSON error responses shared by the controller and the replicas.
//!
//! Every error body has the form `{"code": ..., "message": ..., "details": ...}`,
//! where `code` is derived from the status.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;

/// An HTTP error answered to a client.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
    pub details: Option<serde_json::Value>,
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    code: &'static str,
    message: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<&'a serde_json::Value>,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    pub fn payload_too_large(message: impl Into<String>) -> Self {
        Self::new(StatusCode::PAYLOAD_TOO_LARGE, message)
    }

    pub fn range_not_satisfiable(message: impl Into<String>) -> Self {
        Self::new(StatusCode::RANGE_NOT_SATISFIABLE, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }

    pub fn bad_gateway(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_GATEWAY, message)
    }

    /// Machine-readable code for the status.
    pub fn code(&self) -> &'static str {
        match self.status {
            StatusCode::BAD_REQUEST => "BAD_REQUEST",
            StatusCode::NOT_FOUND => "NOT_FOUND",
            StatusCode::PAYLOAD_TOO_LARGE => "PAYLOAD_TOO_LARGE",
            StatusCode::RANGE_NOT_SATISFIABLE => "RANGE_NOT_SATISFIABLE",
            StatusCode::BAD_GATEWAY => "BAD_GATEWAY",
            status if status.is_server_error() => "INTERNAL_ERROR",
            _ => "ERROR",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            code: self.code(),
            message: &self.message,
            details: self.details.as_ref(),
        };
        (self.status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[test]
    fn test_code_follows_status() {
        assert_eq!(ApiError::not_found("missing").code(), "NOT_FOUND");
        assert_eq!(ApiError::range_not_satisfiable("x").code(), "RANGE_NOT_SATISFIABLE");
        assert_eq!(ApiError::internal("x").code(), "INTERNAL_ERROR");
        assert_eq!(ApiError::new(StatusCode::CONFLICT, "x").code(), "ERROR");
    }

    #[tokio::test]
    async fn test_into_response_body() {
        let response = ApiError::bad_gateway("all replicas failed")
            .with_details(serde_json::json!({"attempts": ["http://a/videos/x.mp4"]}))
            .into_response();
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);

        let body = body_json(response).await;
        assert_eq!(body["code"], "BAD_GATEWAY");
        assert_eq!(body["message"], "all replicas failed");
        assert_eq!(body["details"]["attempts"][0], "http://a/videos/x.mp4");

        let body = body_json(ApiError::payload_too_large("too big").into_response()).await;
        assert_eq!(body["code"], "PAYLOAD_TOO_LARGE");
        assert!(body.get("details").is_none());
    }
}
