//! End-to-end flows against the full replica router.

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use axum::response::Response;
use cdn_replica::{AppState, ReplicaConfig, build_router};
use tower::ServiceExt;

async fn replica() -> (tempfile::TempDir, Router) {
    let dir = tempfile::tempdir().unwrap();
    let config = ReplicaConfig::new("ReplicaA", dir.path());
    let state = AppState::open(config).await.unwrap();
    (dir, build_router(state))
}

async fn send(app: &Router, request: Request<Body>) -> Response {
    app.clone().oneshot(request).await.unwrap()
}

fn get(uri: &str, headers: &[(&str, &str)]) -> Request<Body> {
    let mut builder = Request::builder().uri(uri);
    for (name, value) in headers {
        builder = builder.header(*name, *value);
    }
    builder.body(Body::empty()).unwrap()
}

fn post(uri: &str, headers: &[(&str, &str)], body: Vec<u8>) -> Request<Body> {
    let mut builder = Request::builder().method("POST").uri(uri);
    for (name, value) in headers {
        builder = builder.header(*name, *value);
    }
    builder.body(Body::from(body)).unwrap()
}

async fn body_bytes(response: Response) -> Vec<u8> {
    axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap()
        .to_vec()
}

fn sample(size: usize) -> Vec<u8> {
    (0..size).map(|i| (i % 256) as u8).collect()
}

#[tokio::test]
async fn healthz_reports_name() {
    let (_dir, app) = replica().await;

    let response = send(&app, get("/healthz", &[])).await;
    assert_eq!(response.status(), StatusCode::OK);

    let body: serde_json::Value = serde_json::from_slice(&body_bytes(response).await).unwrap();
    assert_eq!(body["ok"], true);
    assert_eq!(body["replica"], "ReplicaA");
    assert!(body["uptime_secs"].is_u64());
}

#[tokio::test]
async fn upload_then_range_request() {
    let (_dir, app) = replica().await;
    let content = sample(5000);

    let response = send(&app, post("/upload", &[("video-id", "clip")], content.clone())).await;
    assert_eq!(response.status(), StatusCode::CREATED);

    let response = send(&app, get("/videos/clip.mp4", &[("range", "bytes=100-199")])).await;
    assert_eq!(response.status(), StatusCode::PARTIAL_CONTENT);
    assert_eq!(
        response.headers()[header::CONTENT_RANGE],
        "bytes 100-199/5000"
    );
    assert_eq!(body_bytes(response).await, content[100..200].to_vec());

    let response = send(&app, get("/videos/clip", &[])).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_bytes(response).await, content);
}

#[tokio::test]
async fn bust_invalidates_cached_etag() {
    let (_dir, app) = replica().await;
    send(&app, post("/upload", &[("video-id", "clip")], sample(1000))).await;

    let response = send(&app, get("/videos/clip", &[])).await;
    let old_etag = response.headers()[header::ETAG]
        .to_str()
        .unwrap()
        .to_string();

    let response = send(&app, get("/videos/clip", &[("if-none-match", old_etag.as_str())])).await;
    assert_eq!(response.status(), StatusCode::NOT_MODIFIED);

    let response = send(&app, post("/bust/clip", &[], Vec::new())).await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = send(&app, get("/videos/clip", &[("if-none-match", old_etag.as_str())])).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_ne!(response.headers()[header::ETAG], old_etag.as_str());

    let response = send(
        &app,
        get(
            "/videos/clip",
            &[("if-none-match", old_etag.as_str()), ("range", "bytes=0-9")],
        ),
    )
    .await;
    assert_eq!(response.status(), StatusCode::PARTIAL_CONTENT);
    assert_eq!(body_bytes(response).await.len(), 10);
}

#[tokio::test]
async fn purge_removes_video() {
    let (_dir, app) = replica().await;
    send(&app, post("/upload", &[("video-id", "clip")], sample(10))).await;

    let response = send(&app, post("/purge/clip", &[], Vec::new())).await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = send(&app, get("/videos/clip", &[])).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = send(&app, post("/purge/clip", &[], Vec::new())).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn versions_survive_restart() {
    let dir = tempfile::tempdir().unwrap();

    let first = build_router(
        AppState::open(ReplicaConfig::new("ReplicaA", dir.path()))
            .await
            .unwrap(),
    );
    send(&first, post("/upload", &[("video-id", "clip")], sample(10))).await;
    let before = send(&first, get("/videos/clip", &[])).await;
    let before_etag = before.headers()[header::ETAG].clone();
    send(&first, post("/bust/clip", &[], Vec::new())).await;
    let busted = send(&first, get("/videos/clip", &[])).await;
    let busted_etag = busted.headers()[header::ETAG].clone();
    drop(first);

    let second = build_router(
        AppState::open(ReplicaConfig::new("ReplicaA", dir.path()))
            .await
            .unwrap(),
    );
    let after = send(&second, get("/videos/clip", &[])).await;
    assert_eq!(after.headers()[header::ETAG], busted_etag);
    assert_ne!(after.headers()[header::ETAG], before_etag);
}

#[tokio::test]
async fn same_size_reupload_changes_etag() {
    let (_dir, app) = replica().await;

    for i in 0..20u8 {
        send(&app, post("/upload", &[("video-id", "clip")], vec![i; 64])).await;
        let response = send(&app, get("/videos/clip", &[])).await;
        let old_etag = response.headers()[header::ETAG]
            .to_str()
            .unwrap()
            .to_string();

        let response = send(&app, post("/upload", &[("video-id", "clip")], vec![i + 100; 64])).await;
        assert_eq!(response.status(), StatusCode::OK);

        let response = send(&app, get("/videos/clip", &[("if-none-match", old_etag.as_str())])).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_ne!(response.headers()[header::ETAG], old_etag.as_str());
        assert_eq!(body_bytes(response).await, vec![i + 100; 64]);
    }
}
