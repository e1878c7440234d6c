//! Candidate ordering for a single request.

use crate::registry::{HealthSnapshot, ReplicaEndpoint};

/// Order the replicas to try for one request.
///
/// The pool is the healthy replicas in configuration order, or every replica
/// when none is healthy. The list starts at `start % pool.len()` and wraps, so
/// it holds each pool member exactly once.
pub fn select<'a>(
    replicas: &'a [ReplicaEndpoint],
    health: &HealthSnapshot,
    start: usize,
) -> Vec<&'a ReplicaEndpoint> {
    let healthy: Vec<&ReplicaEndpoint> = replicas
        .iter()
        .enumerate()
        .filter(|(index, _)| health.is_healthy(*index))
        .map(|(_, replica)| replica)
        .collect();

    let pool = if healthy.is_empty() {
        replicas.iter().collect()
    } else {
        healthy
    };

    if pool.is_empty() {
        return pool;
    }

    let offset = start % pool.len();
    pool[offset..]
        .iter()
        .chain(pool[..offset].iter())
        .copied()
        .collect()
}
