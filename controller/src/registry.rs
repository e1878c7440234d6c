//! Replica registry: configured endpoints, their health and the rotation cursor.
//!
//! Endpoints never change after startup. Health lives in an immutable
//! [`HealthSnapshot`] published through a `watch` channel: the health monitor
//! is the only writer, request handlers clone the current `Arc` and never hold
//! a lock across I/O.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use cdn_common::ReplicaSpec;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::watch;

use crate::selector;

/// A configured replica.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplicaEndpoint {
    pub id: String,
    pub base_url: String,
}

impl From<ReplicaSpec> for ReplicaEndpoint {
    fn from(spec: ReplicaSpec) -> Self {
        Self {
            id: spec.name,
            base_url: spec.url,
        }
    }
}

/// Health of one replica as seen by the last probes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplicaHealth {
    pub healthy: bool,
    pub last_checked: Option<DateTime<Utc>>,
    pub consecutive_failures: u32,
    pub consecutive_successes: u32,
    pub last_error: Option<String>,
}

impl Default for ReplicaHealth {
    fn default() -> Self {
        Self {
            healthy: true,
            last_checked: None,
            consecutive_failures: 0,
            consecutive_successes: 0,
            last_error: None,
        }
    }
}

/// Consecutive probe results needed to flip a replica's state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Thresholds {
    pub failure: u32,
    pub success: u32,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            failure: 1,
            success: 1,
        }
    }
}

impl ReplicaHealth {
    /// Health after one more probe result.
    pub fn record(
        &self,
        result: &Result<(), String>,
        at: DateTime<Utc>,
        thresholds: Thresholds,
    ) -> Self {
        let mut next = self.clone();
        next.last_checked = Some(at);

        match result {
            Ok(()) => {
                next.consecutive_successes = next.consecutive_successes.saturating_add(1);
                next.consecutive_failures = 0;
                next.last_error = None;
                if !next.healthy && next.consecutive_successes >= thresholds.success.max(1) {
                    next.healthy = true;
                }
            }
            Err(reason) => {
                next.consecutive_failures = next.consecutive_failures.saturating_add(1);
                next.consecutive_successes = 0;
                next.last_error = Some(reason.clone());
                if next.healthy && next.consecutive_failures >= thresholds.failure.max(1) {
                    next.healthy = false;
                }
            }
        }

        next
    }
}

/// Immutable health view, index-aligned with the registry's endpoints.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HealthSnapshot {
    replicas: Vec<ReplicaHealth>,
}

impl HealthSnapshot {
    /// Every replica healthy and never probed.
    pub fn initial(count: usize) -> Self {
        Self {
            replicas: vec![ReplicaHealth::default(); count],
        }
    }

    pub fn from_health(replicas: Vec<ReplicaHealth>) -> Self {
        Self { replicas }
    }

    /// Snapshot with explicit healthy flags.
    pub fn from_flags(flags: &[bool]) -> Self {
        Self {
            replicas: flags
                .iter()
                .map(|healthy| ReplicaHealth {
                    healthy: *healthy,
                    ..ReplicaHealth::default()
                })
                .collect(),
        }
    }

    /// Health of the replica at `index`. Unknown replicas count as healthy.
    pub fn is_healthy(&self, index: usize) -> bool {
        self.replicas.get(index).is_none_or(|health| health.healthy)
    }

    pub fn get(&self, index: usize) -> Option<&ReplicaHealth> {
        self.replicas.get(index)
    }

    pub fn healthy_count(&self) -> usize {
        self.replicas.iter().filter(|health| health.healthy).count()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ReplicaHealth> {
        self.replicas.iter()
    }
}

/// Read-only joined view of an endpoint and its health.
#[derive(Debug, Clone, Serialize)]
pub struct Replica {
    pub id: String,
    pub base_url: String,
    pub healthy: bool,
    pub last_checked: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

/// Endpoints, published health and the shared rotation cursor.
pub struct ReplicaRegistry {
    endpoints: Vec<ReplicaEndpoint>,
    health_tx: watch::Sender<Arc<HealthSnapshot>>,
    cursor: AtomicUsize,
}

impl ReplicaRegistry {
    pub fn new(endpoints: Vec<ReplicaEndpoint>) -> Self {
        let (health_tx, _) = watch::channel(Arc::new(HealthSnapshot::initial(endpoints.len())));
        Self {
            endpoints,
            health_tx,
            cursor: AtomicUsize::new(0),
        }
    }

    pub fn from_specs(specs: Vec<ReplicaSpec>) -> Self {
        Self::new(specs.into_iter().map(ReplicaEndpoint::from).collect())
    }

    pub fn endpoints(&self) -> &[ReplicaEndpoint] {
        &self.endpoints
    }

    pub fn len(&self) -> usize {
        self.endpoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }

    /// Current health snapshot.
    pub fn snapshot(&self) -> Arc<HealthSnapshot> {
        self.health_tx.borrow().clone()
    }

    /// Receiver notified whenever a new snapshot is published.
    pub fn subscribe(&self) -> watch::Receiver<Arc<HealthSnapshot>> {
        self.health_tx.subscribe()
    }

    /// Replace the published snapshot.
    pub fn publish(&self, snapshot: HealthSnapshot) {
        self.health_tx.send_replace(Arc::new(snapshot));
    }

    /// Advance the rotation cursor, returning its previous value.
    pub fn next_start(&self) -> usize {
        self.cursor.fetch_add(1, Ordering::Relaxed)
    }

    /// Ordered candidates for one client request.
    ///
    /// Advances the rotation cursor exactly once.
    pub fn candidates(&self) -> Vec<&ReplicaEndpoint> {
        let snapshot = self.snapshot();
        selector::select(&self.endpoints, &snapshot, self.next_start())
    }

    /// Joined view of every replica in configuration order.
    pub fn replicas(&self) -> Vec<Replica> {
        let snapshot = self.snapshot();
        self.endpoints
            .iter()
            .enumerate()
            .map(|(index, endpoint)| {
                let health = snapshot.get(index).cloned().unwrap_or_default();
                Replica {
                    id: endpoint.id.clone(),
                    base_url: endpoint.base_url.clone(),
                    healthy: health.healthy,
                    last_checked: health.last_checked,
                    last_error: health.last_error,
                }
            })
            .collect()
    }
}
