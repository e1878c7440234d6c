//! Plumbing shared by the CDN controller, the replicas and the origin uploader.

pub mod api_error;
pub mod error;
pub mod logging;
pub mod naming;
pub mod replicas;
pub mod server;

pub use api_error::ApiError;
pub use error::{Error, Result};
pub use logging::{LoggingOptions, init_logging};
pub use naming::{content_type_for, normalize_video_name, sanitize_video_id};
pub use replicas::{ReplicaSpec, default_replicas, load_replicas_file, parse_replica_urls, parse_replicas};
pub use server::{ServerConfig, serve, serve_listener, with_middleware};
