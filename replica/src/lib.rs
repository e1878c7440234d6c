//! Replica content server.
//!
//! Serves video files from a local directory with byte-range and conditional
//! request support, and accepts uploads, purges and cache busts from the
//! origin.

pub mod config;
pub mod error;
pub mod routes;
pub mod server;

pub use config::ReplicaConfig;
pub use error::{Error, Result};
pub use server::{AppState, build_router, run};
