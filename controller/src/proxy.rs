//! Forwarding video requests to replicas.
//!
//! Candidates are tried strictly in order. The first acceptable response is
//! streamed back as-is; its body is pulled from the replica only as fast as the
//! client reads, and dropping the client response drops the upstream stream.

use std::time::Duration;

use axum::body::Body;
use axum::http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode, header};
use axum::response::Response;
use futures::TryStreamExt;
use tracing::{debug, warn};
use url::Url;

use crate::error::{AttemptFailure, FailedAttempt, ProxyError, Result};
use crate::registry::ReplicaEndpoint;

/// Header naming the replica that served a response.
pub const REPLICA_HEADER: &str = "x-cdn-replica";

/// Request headers passed to the replica unchanged.
const FORWARDED_REQUEST_HEADERS: [HeaderName; 3] = [
    header::RANGE,
    header::IF_NONE_MATCH,
    header::IF_MODIFIED_SINCE,
];

/// Response headers copied back to the client. Hop-by-hop headers are never
/// on this list.
const FORWARDED_RESPONSE_HEADERS: [HeaderName; 7] = [
    header::CONTENT_TYPE,
    header::CONTENT_LENGTH,
    header::CONTENT_RANGE,
    header::ACCEPT_RANGES,
    header::ETAG,
    header::LAST_MODIFIED,
    header::CACHE_CONTROL,
];

/// Outbound timeouts.
#[derive(Debug, Clone)]
pub struct ProxyConfig {
    /// TCP connect bound per candidate.
    pub connect_timeout: Duration,
    /// Bound on receiving response headers per candidate.
    pub response_timeout: Duration,
    /// Idle bound between body reads while streaming.
    pub read_timeout: Duration,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(3),
            response_timeout: Duration::from_secs(10),
            read_timeout: Duration::from_secs(30),
        }
    }
}

/// Build the shared outbound client.
pub fn build_client(config: &ProxyConfig) -> Result<reqwest::Client> {
    let client = reqwest::Client::builder()
        .connect_timeout(config.connect_timeout)
        .read_timeout(config.read_timeout)
        .tcp_nodelay(true)
        .pool_max_idle_per_host(20)
        .redirect(reqwest::redirect::Policy::none())
        .build()?;
    Ok(client)
}

/// `{base}/videos/{name}` with `name` encoded as a single path segment.
pub fn video_url(base_url: &str, name: &str) -> std::result::Result<Url, url::ParseError> {
    let mut url = Url::parse(base_url)?;
    url.path_segments_mut()
        .map_err(|_| url::ParseError::RelativeUrlWithoutBase)?
        .pop_if_empty()
        .push("videos")
        .push(name);
    Ok(url)
}

/// Whether a replica status ends the candidate loop.
fn is_success(method: &Method, status: StatusCode) -> bool {
    if method == Method::HEAD {
        status == StatusCode::OK
    } else {
        matches!(
            status,
            StatusCode::OK | StatusCode::PARTIAL_CONTENT | StatusCode::NOT_MODIFIED
        )
    }
}

/// Forwards a `GET` or `HEAD` for one video across ordered candidates.
pub struct VideoProxy<'a> {
    client: &'a reqwest::Client,
    config: &'a ProxyConfig,
}

impl<'a> VideoProxy<'a> {
    pub fn new(client: &'a reqwest::Client, config: &'a ProxyConfig) -> Self {
        Self { client, config }
    }

    /// Try `candidates` in order until one answers acceptably.
    pub async fn forward(
        &self,
        candidates: &[&ReplicaEndpoint],
        method: &Method,
        name: &str,
        headers: &HeaderMap,
    ) -> std::result::Result<Response, ProxyError> {
        if candidates.is_empty() {
            return Err(ProxyError::NoReplicas);
        }

        let mut forwarded = HeaderMap::new();
        for key in FORWARDED_REQUEST_HEADERS {
            if let Some(value) = headers.get(&key) {
                forwarded.insert(key, value.clone());
            }
        }

        let mut attempts = Vec::with_capacity(candidates.len());
        for replica in candidates {
            let url = match video_url(&replica.base_url, name) {
                Ok(url) => url,
                Err(e) => {
                    attempts.push(FailedAttempt {
                        replica: replica.id.clone(),
                        url: replica.base_url.clone(),
                        error: AttemptFailure::Transport(e.to_string()),
                        content_range: None,
                    });
                    continue;
                }
            };

            match self.attempt(replica, method, url, &forwarded).await {
                Ok(response) => return Ok(response),
                Err(failed) => {
                    warn!(
                        replica = %failed.replica,
                        url = %failed.url,
                        error = %failed.error,
                        "Replica attempt failed, trying next candidate"
                    );
                    attempts.push(failed);
                }
            }
        }

        Err(ProxyError::Exhausted {
            name: name.to_string(),
            attempts,
        })
    }

    async fn attempt(
        &self,
        replica: &ReplicaEndpoint,
        method: &Method,
        url: Url,
        forwarded: &HeaderMap,
    ) -> std::result::Result<Response, FailedAttempt> {
        let failed = |error: AttemptFailure, content_range: Option<String>| FailedAttempt {
            replica: replica.id.clone(),
            url: url.to_string(),
            error,
            content_range,
        };

        let request = self
            .client
            .request(method.clone(), url.clone())
            .headers(forwarded.clone())
            .send();

        let upstream = match tokio::time::timeout(self.config.response_timeout, request).await {
            Err(_) => return Err(failed(AttemptFailure::Timeout, None)),
            Ok(Err(e)) if e.is_timeout() => return Err(failed(AttemptFailure::Timeout, None)),
            Ok(Err(e)) => return Err(failed(AttemptFailure::Transport(e.to_string()), None)),
            Ok(Ok(upstream)) => upstream,
        };

        let status = upstream.status();
        if !is_success(method, status) {
            let content_range = upstream
                .headers()
                .get(header::CONTENT_RANGE)
                .and_then(|value| value.to_str().ok())
                .map(str::to_string);
            return Err(failed(AttemptFailure::Status(status.as_u16()), content_range));
        }

        debug!(replica = %replica.id, status = status.as_u16(), "Streaming from replica");

        let mut out_headers = HeaderMap::new();
        for key in FORWARDED_RESPONSE_HEADERS {
            if let Some(value) = upstream.headers().get(&key) {
                out_headers.insert(key, value.clone());
            }
        }
        if let Ok(value) = HeaderValue::from_str(&replica.id) {
            out_headers.insert(HeaderName::from_static(REPLICA_HEADER), value);
        }

        let body = if method == Method::HEAD || status == StatusCode::NOT_MODIFIED {
            Body::empty()
        } else {
            let stream = upstream.bytes_stream().map_err(std::io::Error::other);
            Body::from_stream(stream)
        };

        let mut response = Response::new(body);
        *response.status_mut() = status;
        *response.headers_mut() = out_headers;
        Ok(response)
    }
}

/// `302` to the first candidate.
pub fn redirect(
    candidates: &[&ReplicaEndpoint],
    name: &str,
) -> std::result::Result<Response, ProxyError> {
    let Some(replica) = candidates.first() else {
        return Err(ProxyError::NoReplicas);
    };

    let location = video_url(&replica.base_url, name).map_err(|e| ProxyError::Exhausted {
        name: name.to_string(),
        attempts: vec![FailedAttempt {
            replica: replica.id.clone(),
            url: replica.base_url.clone(),
            error: AttemptFailure::Transport(e.to_string()),
            content_range: None,
        }],
    })?;

    debug!(replica = %replica.id, location = %location, "Redirecting to replica");

    let mut builder = Response::builder()
        .status(StatusCode::FOUND)
        .header(header::LOCATION, location.as_str());
    if let Ok(value) = HeaderValue::from_str(&replica.id) {
        builder = builder.header(REPLICA_HEADER, value);
    }
    Ok(builder.body(Body::empty())?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::Router;
    use axum::extract::State;
    use axum::response::IntoResponse;
    use axum::routing::get;
    use std::net::SocketAddr;
    use tokio::net::TcpListener;

    #[derive(Clone)]
    struct Upstream {
        status: StatusCode,
        delay: Duration,
    }

    async fn upstream_handler(
        State(upstream): State<Upstream>,
        headers: HeaderMap,
    ) -> impl IntoResponse {
        tokio::time::sleep(upstream.delay).await;

        let mut out = HeaderMap::new();
        out.insert(header::CONTENT_TYPE, HeaderValue::from_static("video/mp4"));
        out.insert(header::ACCEPT_RANGES, HeaderValue::from_static("bytes"));
        out.insert(header::ETAG, HeaderValue::from_static("\"abc\""));
        out.insert(header::CONNECTION, HeaderValue::from_static("keep-alive"));
        out.insert("x-internal", HeaderValue::from_static("secret"));

        if upstream.status != StatusCode::OK {
            return (upstream.status, out, Vec::new());
        }
        if headers.get(header::IF_NONE_MATCH).is_some() {
            return (StatusCode::NOT_MODIFIED, out, Vec::new());
        }
        if headers.get(header::RANGE).is_some() {
            out.insert(header::CONTENT_RANGE, HeaderValue::from_static("bytes 0-1/3"));
            return (StatusCode::PARTIAL_CONTENT, out, b"ab".to_vec());
        }
        (StatusCode::OK, out, b"abc".to_vec())
    }

    async fn spawn_upstream(status: StatusCode, delay: Duration) -> SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let app = Router::new()
            .route("/videos/{name}", get(upstream_handler))
            .with_state(Upstream { status, delay });
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        addr
    }

    async fn dead_addr() -> SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap()
    }

    fn endpoint(id: &str, addr: SocketAddr) -> ReplicaEndpoint {
        ReplicaEndpoint {
            id: id.to_string(),
            base_url: format!("http://{}", addr),
        }
    }

    fn config() -> ProxyConfig {
        ProxyConfig {
            connect_timeout: Duration::from_millis(500),
            response_timeout: Duration::from_millis(300),
            read_timeout: Duration::from_secs(2),
        }
    }

    async fn body_bytes(response: Response) -> Vec<u8> {
        axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap()
            .to_vec()
    }

    #[test]
    fn test_video_url() {
        assert_eq!(
            video_url("http://127.0.0.1:9101", "clip.mp4").unwrap().as_str(),
            "http://127.0.0.1:9101/videos/clip.mp4"
        );
        assert_eq!(
            video_url("http://cdn.local/edge", "my clip.mp4").unwrap().as_str(),
            "http://cdn.local/edge/videos/my%20clip.mp4"
        );
    }

    #[test]
    fn test_success_statuses() {
        assert!(is_success(&Method::GET, StatusCode::OK));
        assert!(is_success(&Method::GET, StatusCode::PARTIAL_CONTENT));
        assert!(is_success(&Method::GET, StatusCode::NOT_MODIFIED));
        assert!(!is_success(&Method::GET, StatusCode::NOT_FOUND));
        assert!(is_success(&Method::HEAD, StatusCode::OK));
        assert!(!is_success(&Method::HEAD, StatusCode::NOT_MODIFIED));
    }

    #[tokio::test]
    async fn test_fails_over_and_filters_headers() {
        let broken = endpoint("broken", spawn_upstream(StatusCode::INTERNAL_SERVER_ERROR, Duration::ZERO).await);
        let good = endpoint("good", spawn_upstream(StatusCode::OK, Duration::ZERO).await);
        let client = build_client(&config()).unwrap();
        let config = config();
        let proxy = VideoProxy::new(&client, &config);

        let mut headers = HeaderMap::new();
        headers.insert(header::RANGE, HeaderValue::from_static("bytes=0-1"));
        let response = proxy
            .forward(&[&broken, &good], &Method::GET, "clip.mp4", &headers)
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::PARTIAL_CONTENT);
        assert_eq!(response.headers()[header::CONTENT_RANGE], "bytes 0-1/3");
        assert_eq!(response.headers()[REPLICA_HEADER], "good");
        assert_eq!(response.headers()[header::ETAG], "\"abc\"");
        assert!(response.headers().get(header::CONNECTION).is_none());
        assert!(response.headers().get("x-internal").is_none());
        assert_eq!(body_bytes(response).await, b"ab");
    }

    #[tokio::test]
    async fn test_not_modified_is_success() {
        let good = endpoint("good", spawn_upstream(StatusCode::OK, Duration::ZERO).await);
        let client = build_client(&config()).unwrap();
        let config = config();

        let mut headers = HeaderMap::new();
        headers.insert(header::IF_NONE_MATCH, HeaderValue::from_static("\"abc\""));
        let response = VideoProxy::new(&client, &config)
            .forward(&[&good], &Method::GET, "clip.mp4", &headers)
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_MODIFIED);
        assert!(body_bytes(response).await.is_empty());
    }

    #[tokio::test]
    async fn test_timeout_and_refused_are_recorded() {
        let slow = endpoint("slow", spawn_upstream(StatusCode::OK, Duration::from_secs(5)).await);
        let dead = endpoint("dead", dead_addr().await);
        let client = build_client(&config()).unwrap();
        let config = config();

        let err = VideoProxy::new(&client, &config)
            .forward(&[&slow, &dead], &Method::GET, "clip.mp4", &HeaderMap::new())
            .await
            .unwrap_err();

        let attempts = match err {
            ProxyError::Exhausted { attempts, .. } => attempts,
            other => panic!("expected exhaustion, got {:?}", other),
        };
        assert_eq!(attempts.len(), 2);
        assert_eq!(attempts[0].replica, "slow");
        assert_eq!(attempts[0].error, AttemptFailure::Timeout);
        assert!(attempts[0].url.ends_with("/videos/clip.mp4"));
        assert!(matches!(attempts[1].error, AttemptFailure::Transport(_)));
    }

    #[tokio::test]
    async fn test_head_requires_ok() {
        let missing = endpoint("missing", spawn_upstream(StatusCode::NOT_FOUND, Duration::ZERO).await);
        let good = endpoint("good", spawn_upstream(StatusCode::OK, Duration::ZERO).await);
        let client = build_client(&config()).unwrap();
        let config = config();
        let proxy = VideoProxy::new(&client, &config);

        let response = proxy
            .forward(&[&missing, &good], &Method::HEAD, "clip.mp4", &HeaderMap::new())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[REPLICA_HEADER], "good");
        assert!(body_bytes(response).await.is_empty());

        let err = proxy
            .forward(&[&missing], &Method::HEAD, "clip.mp4", &HeaderMap::new())
            .await
            .unwrap_err();
        assert_eq!(cdn_common::ApiError::from(err).status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_no_candidates() {
        let client = build_client(&config()).unwrap();
        let config = config();
        let err = VideoProxy::new(&client, &config)
            .forward(&[], &Method::GET, "clip.mp4", &HeaderMap::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ProxyError::NoReplicas));
    }

    #[test]
    fn test_redirect_location() {
        let replica = ReplicaEndpoint {
            id: "ReplicaB".into(),
            base_url: "http://127.0.0.1:9102".into(),
        };
        let response = redirect(&[&replica], "clip.mp4").unwrap();
        assert_eq!(response.status(), StatusCode::FOUND);
        assert_eq!(
            response.headers()[header::LOCATION],
            "http://127.0.0.1:9102/videos/clip.mp4"
        );
        assert_eq!(response.headers()[REPLICA_HEADER], "ReplicaB");
        assert!(matches!(redirect(&[], "clip.mp4"), Err(ProxyError::NoReplicas)));
    }
}
