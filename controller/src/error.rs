//! Controller errors.
//!
//! `Error` covers startup and configuration. `ProxyError` is what a single
//! client request can end in once every candidate replica has been tried.

use axum::http::{HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use cdn_common::ApiError;
use serde::Serialize;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Common(#[from] cdn_common::Error),

    #[error("HTTP client error: {0}")]
    Client(#[from] reqwest::Error),
}

/// Why one candidate replica could not serve a request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum AttemptFailure {
    /// The replica answered with a status that does not count as success.
    Status(u16),
    /// No response headers within the response timeout.
    Timeout,
    /// Connection or protocol failure.
    Transport(String),
}

impl std::fmt::Display for AttemptFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AttemptFailure::Status(status) => write!(f, "status {}", status),
            AttemptFailure::Timeout => f.write_str("timed out waiting for response"),
            AttemptFailure::Transport(reason) => write!(f, "transport error: {}", reason),
        }
    }
}

/// A failed attempt against one candidate.
#[derive(Debug, Clone, Serialize)]
pub struct FailedAttempt {
    pub replica: String,
    pub url: String,
    pub error: AttemptFailure,
    /// `Content-Range` of a rejected response, e.g. `bytes */5000` on a `416`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_range: Option<String>,
}

#[derive(Error, Debug)]
pub enum ProxyError {
    #[error("Invalid video id: {0:?}")]
    InvalidName(String),

    #[error("No replicas configured")]
    NoReplicas,

    #[error("All {} replicas failed for {name}", attempts.len())]
    Exhausted {
        name: String,
        attempts: Vec<FailedAttempt>,
    },

    #[error("Response build error: {0}")]
    Http(#[from] axum::http::Error),
}

impl ProxyError {
    /// Status the client sees for an exhausted candidate list.
    ///
    /// A uniform `404` or `416` from every replica is passed through, any other
    /// mix is a gateway failure.
    fn exhausted_status(attempts: &[FailedAttempt]) -> StatusCode {
        let uniform = |status: u16| {
            !attempts.is_empty()
                && attempts
                    .iter()
                    .all(|attempt| attempt.error == AttemptFailure::Status(status))
        };

        if uniform(404) {
            StatusCode::NOT_FOUND
        } else if uniform(416) {
            StatusCode::RANGE_NOT_SATISFIABLE
        } else {
            StatusCode::BAD_GATEWAY
        }
    }
}

impl From<ProxyError> for ApiError {
    fn from(err: ProxyError) -> Self {
        match err {
            ProxyError::InvalidName(_) => ApiError::bad_request(err.to_string()),
            ProxyError::NoReplicas => ApiError::bad_gateway(err.to_string()),
            ProxyError::Exhausted { ref attempts, .. } => {
                let status = ProxyError::exhausted_status(attempts);
                let details = serde_json::json!({ "attempts": attempts });
                ApiError::new(status, err.to_string()).with_details(details)
            }
            ProxyError::Http(_) => ApiError::internal(err.to_string()),
        }
    }
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        // A uniform 416 keeps the replica's unsatisfied-range header
        let content_range = match &self {
            ProxyError::Exhausted { attempts, .. }
                if ProxyError::exhausted_status(attempts) == StatusCode::RANGE_NOT_SATISFIABLE =>
            {
                attempts
                    .iter()
                    .find_map(|attempt| attempt.content_range.as_deref())
                    .and_then(|value| HeaderValue::from_str(value).ok())
            }
            _ => None,
        };

        let mut response = ApiError::from(self).into_response();
        if let Some(value) = content_range {
            response.headers_mut().insert(header::CONTENT_RANGE, value);
            response
                .headers_mut()
                .insert(header::ACCEPT_RANGES, HeaderValue::from_static("bytes"));
        }
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn attempt(replica: &str, error: AttemptFailure) -> FailedAttempt {
        FailedAttempt {
            replica: replica.to_string(),
            url: format!("http://{}/videos/clip.mp4", replica),
            error,
            content_range: None,
        }
    }

    fn exhausted(attempts: Vec<FailedAttempt>) -> ApiError {
        ApiError::from(ProxyError::Exhausted {
            name: "clip.mp4".to_string(),
            attempts,
        })
    }

    #[test]
    fn test_mixed_failures_are_bad_gateway() {
        let err = exhausted(vec![
            attempt("a", AttemptFailure::Status(404)),
            attempt("b", AttemptFailure::Transport("connection refused".into())),
        ]);
        assert_eq!(err.status, StatusCode::BAD_GATEWAY);

        let details = err.details.unwrap();
        let attempts = details["attempts"].as_array().unwrap();
        assert_eq!(attempts.len(), 2);
        assert_eq!(attempts[0]["url"], "http://a/videos/clip.mp4");
        assert_eq!(attempts[0]["error"]["kind"], "status");
        assert_eq!(attempts[1]["error"]["kind"], "transport");
    }

    #[test]
    fn test_uniform_failures_pass_through() {
        let err = exhausted(vec![
            attempt("a", AttemptFailure::Status(404)),
            attempt("b", AttemptFailure::Status(404)),
        ]);
        assert_eq!(err.status, StatusCode::NOT_FOUND);

        let err = exhausted(vec![attempt("a", AttemptFailure::Status(416))]);
        assert_eq!(err.status, StatusCode::RANGE_NOT_SATISFIABLE);

        let err = exhausted(vec![attempt("a", AttemptFailure::Timeout)]);
        assert_eq!(err.status, StatusCode::BAD_GATEWAY);
    }

    #[test]
    fn test_uniform_416_keeps_content_range() {
        let mut first = attempt("a", AttemptFailure::Status(416));
        first.content_range = Some("bytes */5000".to_string());
        let mut second = attempt("b", AttemptFailure::Status(416));
        second.content_range = Some("bytes */5000".to_string());

        let response = ProxyError::Exhausted {
            name: "clip.mp4".to_string(),
            attempts: vec![first.clone(), second],
        }
        .into_response();
        assert_eq!(response.status(), StatusCode::RANGE_NOT_SATISFIABLE);
        assert_eq!(response.headers()[header::CONTENT_RANGE], "bytes */5000");

        let response = ProxyError::Exhausted {
            name: "clip.mp4".to_string(),
            attempts: vec![first, attempt("b", AttemptFailure::Timeout)],
        }
        .into_response();
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
        assert!(response.headers().get(header::CONTENT_RANGE).is_none());
    }

    #[test]
    fn test_other_errors() {
        assert_eq!(
            ApiError::from(ProxyError::NoReplicas).status,
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            ApiError::from(ProxyError::InvalidName("../x".into())).status,
            StatusCode::BAD_REQUEST
        );
    }
}
