//! Controller configuration.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use cdn_common::server::{env_millis, env_parse};
use cdn_common::{ReplicaSpec, ServerConfig, default_replicas, load_replicas_file, parse_replica_urls};
use serde::Serialize;
use tracing::{info, warn};

use crate::error::{Error, Result};
use crate::monitor::HealthCheckConfig;
use crate::proxy::ProxyConfig;

/// Default listen port of the controller.
pub const DEFAULT_PORT: u16 = 8000;

/// Default location of the replica list.
pub const DEFAULT_REPLICAS_FILE: &str = "config/replicas.json";

/// How the controller answers video requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RoutingMode {
    /// Stream the replica response through the controller.
    #[default]
    Proxy,
    /// Answer `302` pointing at the chosen replica.
    Redirect,
}

impl RoutingMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            RoutingMode::Proxy => "proxy",
            RoutingMode::Redirect => "redirect",
        }
    }
}

impl std::fmt::Display for RoutingMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RoutingMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "proxy" => Ok(RoutingMode::Proxy),
            "redirect" => Ok(RoutingMode::Redirect),
            other => Err(Error::Common(cdn_common::Error::config(format!(
                "unknown routing mode {:?}, expected \"proxy\" or \"redirect\"",
                other
            )))),
        }
    }
}

/// Controller configuration.
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    pub server: ServerConfig,
    /// Replicas in configuration order.
    pub replicas: Vec<ReplicaSpec>,
    pub routing_mode: RoutingMode,
    pub health: HealthCheckConfig,
    pub proxy: ProxyConfig,
}

impl ControllerConfig {
    pub fn new(replicas: Vec<ReplicaSpec>) -> Self {
        Self {
            server: ServerConfig::new(DEFAULT_PORT),
            replicas,
            routing_mode: RoutingMode::default(),
            health: HealthCheckConfig::default(),
            proxy: ProxyConfig::default(),
        }
    }

    /// Load controller config from environment variables, falling back to defaults.
    ///
    /// Supported env vars (besides the server ones):
    /// - `REPLICAS` comma separated replica URLs, takes precedence over the file
    /// - `REPLICAS_FILE` (defaults to `config/replicas.json`)
    /// - `ROUTING_MODE` (`proxy` or `redirect`)
    /// - `HEALTH_INTERVAL_MS`, `HEALTH_TIMEOUT_MS`
    /// - `HEALTH_FAILURE_THRESHOLD`, `HEALTH_SUCCESS_THRESHOLD`
    /// - `CONNECT_TIMEOUT_MS`, `RESPONSE_TIMEOUT_MS`, `READ_TIMEOUT_MS`
    pub fn from_env_or_default() -> Result<Self> {
        let mut config = Self::new(resolve_replicas()?);
        config.server = ServerConfig::from_env_or_default(DEFAULT_PORT);

        if let Ok(mode) = std::env::var("ROUTING_MODE")
            && !mode.trim().is_empty()
        {
            config.routing_mode = mode.parse()?;
        }

        if let Some(interval) = env_millis("HEALTH_INTERVAL_MS") {
            config.health.interval = interval;
        }
        if let Some(timeout) = env_millis("HEALTH_TIMEOUT_MS") {
            config.health.timeout = timeout;
        }
        if let Some(threshold) = env_parse::<u32>("HEALTH_FAILURE_THRESHOLD") {
            config.health.failure_threshold = threshold.max(1);
        }
        if let Some(threshold) = env_parse::<u32>("HEALTH_SUCCESS_THRESHOLD") {
            config.health.success_threshold = threshold.max(1);
        }

        if let Some(timeout) = env_millis("CONNECT_TIMEOUT_MS") {
            config.proxy.connect_timeout = timeout;
        }
        if let Some(timeout) = env_millis("RESPONSE_TIMEOUT_MS") {
            config.proxy.response_timeout = timeout;
        }
        if let Some(timeout) = env_millis("READ_TIMEOUT_MS") {
            config.proxy.read_timeout = timeout;
        }

        if config.health.interval.is_zero() {
            config.health.interval = Duration::from_millis(100);
        }

        Ok(config)
    }
}

fn resolve_replicas() -> Result<Vec<ReplicaSpec>> {
    if let Ok(list) = std::env::var("REPLICAS")
        && !list.trim().is_empty()
    {
        let replicas = parse_replica_urls(&list)?;
        if !replicas.is_empty() {
            info!(count = replicas.len(), "Using replicas from REPLICAS");
            return Ok(replicas);
        }
    }

    let path = std::env::var("REPLICAS_FILE")
        .ok()
        .filter(|path| !path.trim().is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_REPLICAS_FILE));

    match load_replicas_file(&path)? {
        Some(replicas) if !replicas.is_empty() => {
            info!(
                path = %path.display(),
                count = replicas.len(),
                "Loaded replica list"
            );
            Ok(replicas)
        }
        _ => {
            warn!(
                path = %path.display(),
                "Replica list missing or empty, falling back to local defaults"
            );
            Ok(default_replicas())
        }
    }
}
