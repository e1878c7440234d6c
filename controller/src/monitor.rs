//! Background health monitor.
//!
//! Probes every replica concurrently on a fixed interval and publishes a new
//! health snapshot after each cycle. Request handling never waits on it.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::registry::{HealthSnapshot, ReplicaEndpoint, ReplicaRegistry, Thresholds};

/// Shortest accepted probe interval.
pub const MIN_PROBE_INTERVAL: Duration = Duration::from_millis(10);

/// Result of a single probe: `Err` carries the failure reason.
pub type ProbeResult = std::result::Result<(), String>;

/// Health check configuration.
#[derive(Debug, Clone)]
pub struct HealthCheckConfig {
    pub interval: Duration,
    pub timeout: Duration,
    pub failure_threshold: u32,
    pub success_threshold: u32,
}

impl Default for HealthCheckConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(5),
            timeout: Duration::from_millis(2000),
            failure_threshold: 1,
            success_threshold: 1,
        }
    }
}

impl HealthCheckConfig {
    pub fn thresholds(&self) -> Thresholds {
        Thresholds {
            failure: self.failure_threshold,
            success: self.success_threshold,
        }
    }
}

/// Checks whether one replica is serving.
#[async_trait]
pub trait ReplicaProbe: Send + Sync {
    async fn probe(&self, replica: &ReplicaEndpoint) -> ProbeResult;
}

/// Probe that expects a 2xx from `GET {base}/healthz`.
#[derive(Debug, Clone)]
pub struct HttpProbe {
    client: reqwest::Client,
    timeout: Duration,
}

impl HttpProbe {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(timeout)
            .timeout(timeout)
            .redirect(reqwest::redirect::Policy::none())
            .build()?;
        Ok(Self { client, timeout })
    }
}

#[async_trait]
impl ReplicaProbe for HttpProbe {
    async fn probe(&self, replica: &ReplicaEndpoint) -> ProbeResult {
        let url = format!("{}{}", replica.base_url, cdn_common::server::HEALTH_PATH);
        let response = self
            .client
            .get(&url)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    format!("timed out after {}ms", self.timeout.as_millis())
                } else {
                    e.to_string()
                }
            })?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(format!("health endpoint returned {}", status.as_u16()))
        }
    }
}

/// A replica whose healthy flag flipped during a cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub replica: String,
    pub healthy: bool,
    pub reason: Option<String>,
}

/// Periodic prober; the single writer of the registry's health.
pub struct HealthMonitor<P = HttpProbe> {
    registry: Arc<ReplicaRegistry>,
    probe: P,
    config: HealthCheckConfig,
}

impl HealthMonitor<HttpProbe> {
    /// Monitor probing over HTTP with the configured timeout.
    pub fn with_http_probe(registry: Arc<ReplicaRegistry>, config: HealthCheckConfig) -> Result<Self> {
        let probe = HttpProbe::new(config.timeout)?;
        Ok(Self::new(registry, probe, config))
    }
}

impl<P: ReplicaProbe + 'static> HealthMonitor<P> {
    pub fn new(registry: Arc<ReplicaRegistry>, probe: P, mut config: HealthCheckConfig) -> Self {
        config.interval = config.interval.max(MIN_PROBE_INTERVAL);
        Self {
            registry,
            probe,
            config,
        }
    }

    /// Starts the monitor task.
    pub fn spawn(self, cancel_token: CancellationToken) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            self.run(cancel_token).await;
        })
    }

    /// Probe loop; the first cycle runs immediately.
    pub async fn run(self, cancel_token: CancellationToken) {
        let mut interval = tokio::time::interval(self.config.interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            replicas = self.registry.len(),
            interval_ms = self.config.interval.as_millis() as u64,
            "Health monitor started"
        );

        loop {
            tokio::select! {
                _ = cancel_token.cancelled() => break,
                _ = interval.tick() => {
                    tokio::select! {
                        _ = cancel_token.cancelled() => break,
                        _ = self.check_all() => {}
                    }
                }
            }
        }

        info!("Health monitor stopped");
    }

    /// Probe every replica once and publish the resulting snapshot.
    pub async fn check_all(&self) -> Vec<Transition> {
        let endpoints = self.registry.endpoints();
        let checks = endpoints.iter().map(|replica| self.probe.probe(replica));
        let results = futures::future::join_all(checks).await;

        let previous = self.registry.snapshot();
        let now = Utc::now();
        let thresholds = self.config.thresholds();

        let mut transitions = Vec::new();
        let mut next = Vec::with_capacity(endpoints.len());
        for (index, (replica, result)) in endpoints.iter().zip(results).enumerate() {
            let before = previous.get(index).cloned().unwrap_or_default();
            let after = before.record(&result, now, thresholds);

            if let Err(reason) = &result {
                debug!(replica = %replica.id, url = %replica.base_url, reason = %reason, "Probe failed");
            }

            if before.healthy != after.healthy {
                if after.healthy {
                    info!(replica = %replica.id, url = %replica.base_url, "Replica is healthy again");
                } else {
                    warn!(
                        replica = %replica.id,
                        url = %replica.base_url,
                        failures = after.consecutive_failures,
                        reason = after.last_error.as_deref().unwrap_or("unknown"),
                        "Replica marked unhealthy"
                    );
                }
                transitions.push(Transition {
                    replica: replica.id.clone(),
                    healthy: after.healthy,
                    reason: after.last_error.clone(),
                });
            }

            next.push(after);
        }

        self.registry.publish(HealthSnapshot::from_health(next));
        transitions
    }
}
