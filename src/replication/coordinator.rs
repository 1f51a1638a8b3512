//! Fan-out of key operations to the live replicas of a key.
//!
//! The coordinator never decides liveness. Every call resolves the replica
//! set from the current membership view, then talks to the nodes with the
//! topology lock released. A replica that fails mid-call is logged and
//! skipped; the operation as a whole fails only when no replica succeeded.
//!
//! ```text
//!  put ──► resolve ──► node₁.put ─┐
//!                      node₂.put ─┼─► written ≥ 1 ? Ok : WriteUnavailable
//!                      nodeₙ.put ─┘
//!
//!  get ──► resolve ──► node₁.get ─► hit? ─► return
//!                      node₂.get ─► hit? ─► return
//!                           │
//!                           ▼ all missed
//!                      backing store (timeout) ─► fill first live replica
//! ```

use super::backing_store::BackingStore;
use crate::cluster::{Membership, Replica};
use crate::config::ClusterConfig;
use crate::error::{Error, Result};
use crate::metrics::CacheMetrics;
use crate::partitioning::ReplicaPlacement;
use crate::types::{NodeId, ReadSource};
use bytes::Bytes;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, trace, warn};

/// Result of a replicated write.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriteOutcome {
    /// Replicas that accepted the write, in ring order.
    pub written: Vec<NodeId>,
    /// Replicas whose call failed and were skipped.
    pub failed: Vec<NodeId>,
}

/// Result of a replicated read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadOutcome {
    /// The value, if any source had it.
    pub value: Option<Bytes>,
    /// The replica that served the hit or received the cache fill.
    pub served_by: Option<NodeId>,
    /// Where the value came from.
    pub source: ReadSource,
}

impl ReadOutcome {
    fn not_found() -> Self {
        Self {
            value: None,
            served_by: None,
            source: ReadSource::NotFound,
        }
    }
}

/// Result of a replicated remove.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RemoveOutcome {
    /// Replicas that held the key and dropped it.
    pub removed_from: Vec<NodeId>,
    /// Replicas that were called but did not hold the key.
    pub absent_on: Vec<NodeId>,
    /// Replicas whose call failed and were skipped.
    pub failed: Vec<NodeId>,
}

/// Turns logical key operations into calls against live replicas.
#[derive(Debug)]
pub struct ReplicationCoordinator {
    membership: Arc<Membership>,
    placement: Arc<dyn ReplicaPlacement>,
    backing_store: Option<Arc<dyn BackingStore>>,
    replication_factor: usize,
    default_ttl: Option<Duration>,
    backing_store_timeout: Duration,
    metrics: Arc<CacheMetrics>,
}

impl ReplicationCoordinator {
    /// Create a coordinator over `membership` with no backing store.
    pub fn new(
        membership: Arc<Membership>,
        config: &ClusterConfig,
        metrics: Arc<CacheMetrics>,
    ) -> Self {
        Self {
            membership,
            placement: config.placement.build(),
            backing_store: None,
            replication_factor: config.replication_factor,
            default_ttl: config.default_ttl,
            backing_store_timeout: config.backing_store_timeout,
            metrics,
        }
    }

    /// Consult `store` on a full cache miss.
    pub fn with_backing_store(mut self, store: Arc<dyn BackingStore>) -> Self {
        self.backing_store = Some(store);
        self
    }

    pub fn replication_factor(&self) -> usize {
        self.replication_factor
    }

    /// The replica set a key currently resolves to, in ring order.
    pub fn replicas_for(&self, key: &str) -> Result<Vec<NodeId>> {
        Ok(self
            .resolve(key)?
            .into_iter()
            .map(|replica| replica.node_id)
            .collect())
    }

    fn resolve(&self, key: &str) -> Result<Vec<Replica>> {
        let replicas =
            self.membership
                .resolve(key, self.replication_factor, self.placement.as_ref())?;
        Ok(replicas
            .into_iter()
            .filter(|replica| replica.state.is_active())
            .collect())
    }

    // ==================== Writes ====================

    /// Write `value` to every live replica of `key`.
    pub fn put(&self, key: &str, value: impl Into<Bytes>) -> Result<WriteOutcome> {
        self.write(key, value.into(), None)
    }

    /// Write `value` to every live replica of `key`, expiring after `ttl`.
    pub fn put_with_ttl(
        &self,
        key: &str,
        value: impl Into<Bytes>,
        ttl: Duration,
    ) -> Result<WriteOutcome> {
        self.write(key, value.into(), Some(ttl))
    }

    fn write(&self, key: &str, value: Bytes, ttl: Option<Duration>) -> Result<WriteOutcome> {
        let start = Instant::now();
        let result = self.fan_out_put(key, value, ttl.or(self.default_ttl));

        self.metrics.record_put(result.is_ok(), start.elapsed());
        if let Err(e) = &result {
            self.metrics.record_error(e.kind());
        }
        result
    }

    fn fan_out_put(&self, key: &str, value: Bytes, ttl: Option<Duration>) -> Result<WriteOutcome> {
        let replicas = self.resolve(key)?;
        let mut outcome = WriteOutcome::default();

        for replica in &replicas {
            match replica.node.put(key, value.clone(), ttl) {
                Ok(()) => outcome.written.push(replica.node_id.clone()),
                Err(e) => {
                    warn!(node_id = %replica.node_id, key, error = %e, "Replica write failed, skipping");
                    self.metrics.record_replica_failure("put");
                    outcome.failed.push(replica.node_id.clone());
                }
            }
        }

        if outcome.written.is_empty() {
            warn!(key, failed = ?outcome.failed, "No live replica accepted write");
            return Err(Error::WriteUnavailable {
                key: key.to_string(),
            });
        }

        debug!(key, replicas = ?outcome.written, "Write replicated");
        Ok(outcome)
    }

    // ==================== Reads ====================

    /// Read `key` from the first replica that has it, falling back to the
    /// backing store when every replica misses.
    ///
    /// The backing store is read at most once per call.
    pub async fn get(&self, key: &str) -> Result<ReadOutcome> {
        let start = Instant::now();
        let result = self.read(key).await;

        match &result {
            Ok(outcome) => self.metrics.record_get(outcome.source, start.elapsed()),
            Err(e) => self.metrics.record_error(e.kind()),
        }
        result
    }

    async fn read(&self, key: &str) -> Result<ReadOutcome> {
        let replicas = self.resolve(key)?;

        for replica in &replicas {
            match replica.node.get(key) {
                Ok(Some(value)) => {
                    trace!(node_id = %replica.node_id, key, "Replica hit");
                    return Ok(ReadOutcome {
                        value: Some(value),
                        served_by: Some(replica.node_id.clone()),
                        source: ReadSource::Replica,
                    });
                }
                Ok(None) => trace!(node_id = %replica.node_id, key, "Replica miss"),
                Err(e) => {
                    warn!(node_id = %replica.node_id, key, error = %e, "Replica read failed, skipping");
                    self.metrics.record_replica_failure("get");
                }
            }
        }

        let Some(value) = self.read_backing_store(key).await else {
            debug!(key, "Key not found");
            return Ok(ReadOutcome::not_found());
        };

        let filled = self.fill(key, &value, &replicas);
        Ok(ReadOutcome {
            value: Some(value),
            served_by: filled,
            source: ReadSource::BackingStore,
        })
    }

    async fn read_backing_store(&self, key: &str) -> Option<Bytes> {
        let store = self.backing_store.as_ref()?;
        self.metrics.backing_store_reads.inc();

        let start = Instant::now();
        let result = tokio::time::timeout(self.backing_store_timeout, store.read(key)).await;
        self.metrics.backing_store_latency.observe(start.elapsed());

        match result {
            Ok(Ok(value)) => value,
            Ok(Err(e)) => {
                warn!(key, error = %e, "Backing store read failed");
                self.metrics.backing_store_errors.inc();
                None
            }
            Err(_) => {
                warn!(
                    key,
                    timeout_ms = self.backing_store_timeout.as_millis() as u64,
                    "Backing store read timed out"
                );
                self.metrics.backing_store_timeouts.inc();
                None
            }
        }
    }

    /// Write a backing-store value into the first replica that accepts it.
    ///
    /// The fill only lands where the key is absent. A write that reached the
    /// replica while the backing store was being read is newer and wins.
    fn fill(&self, key: &str, value: &Bytes, replicas: &[Replica]) -> Option<NodeId> {
        for replica in replicas {
            match replica.node.fill(key, value.clone(), self.default_ttl) {
                Ok(true) => {
                    debug!(node_id = %replica.node_id, key, "Cache filled from backing store");
                    self.metrics.cache_fills.inc();
                    return Some(replica.node_id.clone());
                }
                Ok(false) => {
                    debug!(node_id = %replica.node_id, key, "Skipped cache fill, replica already holds a newer value");
                    return None;
                }
                Err(e) => {
                    warn!(node_id = %replica.node_id, key, error = %e, "Cache fill failed, trying next replica");
                    self.metrics.record_replica_failure("fill");
                }
            }
        }
        None
    }

    // ==================== Removes ====================

    /// Remove `key` from every live replica. Absence is not an error.
    pub fn remove(&self, key: &str) -> Result<RemoveOutcome> {
        self.metrics.record_remove();
        let replicas = self.resolve(key).inspect_err(|e| {
            self.metrics.record_error(e.kind());
        })?;

        let mut outcome = RemoveOutcome::default();
        for replica in &replicas {
            match replica.node.remove(key) {
                Ok(true) => outcome.removed_from.push(replica.node_id.clone()),
                Ok(false) => outcome.absent_on.push(replica.node_id.clone()),
                Err(e) => {
                    warn!(node_id = %replica.node_id, key, error = %e, "Replica remove failed, skipping");
                    self.metrics.record_replica_failure("remove");
                    outcome.failed.push(replica.node_id.clone());
                }
            }
        }

        debug!(key, removed_from = ?outcome.removed_from, "Key removed");
        Ok(outcome)
    }
}
