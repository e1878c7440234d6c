//! Controller of the mini video CDN.
//!
//! Tracks replica health in the background, orders candidates per request with
//! a shared rotation cursor, and either proxies the video from the first
//! replica that answers or redirects the client to it.

pub mod config;
pub mod error;
pub mod monitor;
pub mod proxy;
pub mod registry;
pub mod routes;
pub mod selector;
pub mod server;

pub use config::{ControllerConfig, RoutingMode};
pub use error::{AttemptFailure, Error, FailedAttempt, ProxyError, Result};
pub use monitor::{HealthCheckConfig, HealthMonitor, HttpProbe, ReplicaProbe};
pub use registry::{HealthSnapshot, Replica, ReplicaEndpoint, ReplicaRegistry};
pub use server::{AppState, build_router, run};
