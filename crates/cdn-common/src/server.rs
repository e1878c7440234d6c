//! HTTP server setup shared by the controller and replicas.

use std::net::SocketAddr;
use std::time::Duration;

use axum::Router;
use axum::extract::Request;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};
use tower_http::classify::ServerErrorsFailureClass;
use tower_http::trace::TraceLayer;
use tracing::{Span, error, info, info_span};

use crate::error::{Error, Result};

/// Liveness path; requests to it are not traced.
pub const HEALTH_PATH: &str = "/healthz";

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Server bind address
    pub bind_address: String,
    /// Server port
    pub port: u16,
    /// Enable CORS
    pub enable_cors: bool,
}

impl ServerConfig {
    pub fn new(port: u16) -> Self {
        Self {
            bind_address: "0.0.0.0".to_string(),
            port,
            enable_cors: true,
        }
    }

    /// Load server config from environment variables, falling back to defaults.
    ///
    /// Supported env vars:
    /// - `BIND_ADDRESS` (e.g. "0.0.0.0")
    /// - `PORT` (e.g. "9101")
    /// - `ENABLE_CORS` ("true" / "false")
    pub fn from_env_or_default(default_port: u16) -> Self {
        let mut config = Self::new(default_port);

        if let Ok(bind_address) = std::env::var("BIND_ADDRESS")
            && !bind_address.trim().is_empty()
        {
            config.bind_address = bind_address;
        }

        if let Ok(port) = std::env::var("PORT")
            && let Ok(parsed) = port.parse::<u16>()
        {
            config.port = parsed;
        }

        if let Some(enable_cors) = env_bool("ENABLE_CORS") {
            config.enable_cors = enable_cors;
        }

        config
    }

    /// Socket address to bind.
    pub fn socket_addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.bind_address, self.port)
            .parse()
            .map_err(|e| Error::config(format!("Invalid address: {}", e)))
    }
}

/// Read a boolean environment variable (`1/0`, `true/false`, `yes/no`).
pub fn env_bool(key: &str) -> Option<bool> {
    let value = std::env::var(key).ok()?;
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Read a millisecond duration from the environment.
pub fn env_millis(key: &str) -> Option<Duration> {
    std::env::var(key)
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_millis)
}

/// Read any parseable value from the environment.
pub fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok()?.trim().parse().ok()
}

/// Add CORS and request tracing to a router.
pub fn with_middleware(router: Router, config: &ServerConfig) -> Router {
    let mut router = router;

    if config.enable_cors {
        let cors = CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
            .expose_headers(Any);
        router = router.layer(cors);
    }

    // Health probes get no span and so no access log lines
    router.layer(
        TraceLayer::new_for_http()
            .make_span_with(|req: &Request| {
                if req.uri().path() == HEALTH_PATH {
                    Span::none()
                } else {
                    info_span!("http", method = %req.method(), path = %req.uri().path())
                }
            })
            .on_request(())
            .on_response(
                |res: &axum::http::Response<_>, latency: Duration, span: &Span| {
                    if !span.is_disabled() {
                        info!(
                            parent: span,
                            status = res.status().as_u16(),
                            latency_ms = latency.as_millis() as u64,
                            "Request finished"
                        );
                    }
                },
            )
            .on_failure(
                |class: ServerErrorsFailureClass, latency: Duration, span: &Span| {
                    if !span.is_disabled() {
                        error!(
                            parent: span,
                            failure = %class,
                            latency_ms = latency.as_millis() as u64,
                            "Request failed"
                        );
                    }
                },
            ),
    )
}

/// Bind and serve `router` until `cancel_token` fires.
pub async fn serve(router: Router, config: &ServerConfig, cancel_token: CancellationToken) -> Result<()> {
    let addr = config.socket_addr()?;
    let listener = TcpListener::bind(addr)
        .await
        .map_err(|e| Error::Server(format!("Failed to bind to {}: {}", addr, e)))?;

    serve_listener(listener, router, cancel_token).await
}

/// Serve `router` on an already bound listener until `cancel_token` fires.
pub async fn serve_listener(
    listener: TcpListener,
    router: Router,
    cancel_token: CancellationToken,
) -> Result<()> {
    let local_addr = listener
        .local_addr()
        .map_err(|e| Error::Server(format!("Failed to get local addr: {}", e)))?;
    tracing::info!("Server listening on http://{}", local_addr);

    axum::serve(listener, router)
        .with_graceful_shutdown(async move {
            cancel_token.cancelled().await;
            tracing::info!("Server shutting down...");
        })
        .await
        .map_err(|e| Error::Server(format!("Server error: {}", e)))
}

/// Cancel `cancel_token` on Ctrl+C (and SIGTERM on unix).
pub fn cancel_on_shutdown_signal(cancel_token: CancellationToken) {
    tokio::spawn(async move {
        let ctrl_c = async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::warn!(error = %e, "Failed to listen for Ctrl+C");
                std::future::pending::<()>().await;
            }
        };

        #[cfg(unix)]
        let terminate = async {
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(mut signal) => {
                    signal.recv().await;
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Failed to listen for SIGTERM");
                    std::future::pending::<()>().await;
                }
            }
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            _ = ctrl_c => {}
            _ = terminate => {}
        }

        tracing::info!("Shutdown signal received");
        cancel_token.cancel();
    });
}
