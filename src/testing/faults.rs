//! Fault injection for cache nodes.
//!
//! A [`FaultyNode`] wraps any [`CacheNode`] and makes its calls fail, either
//! because it was forced down or at random with a seeded probability. The
//! node's membership state is untouched, which is how a replica that is
//! still believed live but unreachable looks to the coordinator.

use crate::cache::CacheNode;
use crate::error::NodeError;
use crate::types::CacheStats;
use bytes::Bytes;
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Configuration for random call failures.
#[derive(Debug, Clone)]
pub struct FaultConfig {
    /// Probability that a call fails (0.0 - 1.0).
    pub failure_rate: f64,

    /// Random seed for reproducibility.
    pub seed: u64,
}

impl Default for FaultConfig {
    fn default() -> Self {
        Self {
            failure_rate: 0.0,
            seed: 0,
        }
    }
}

impl FaultConfig {
    /// Fail roughly `rate` of all calls.
    pub fn flaky(rate: f64, seed: u64) -> Self {
        Self {
            failure_rate: rate,
            seed,
        }
    }
}

/// A cache node whose calls can be made to fail.
#[derive(Debug)]
pub struct FaultyNode {
    inner: Arc<dyn CacheNode>,
    down: AtomicBool,
    failure_rate: f64,
    rng: Mutex<StdRng>,
    calls: AtomicU64,
    injected: AtomicU64,
}

impl FaultyNode {
    /// Wrap `inner` without any faults.
    pub fn new(inner: Arc<dyn CacheNode>) -> Self {
        Self::with_config(inner, FaultConfig::default())
    }

    pub fn with_config(inner: Arc<dyn CacheNode>, config: FaultConfig) -> Self {
        Self {
            inner,
            down: AtomicBool::new(false),
            failure_rate: config.failure_rate.clamp(0.0, 1.0),
            rng: Mutex::new(StdRng::seed_from_u64(config.seed)),
            calls: AtomicU64::new(0),
            injected: AtomicU64::new(0),
        }
    }

    /// Fail every call until brought back up.
    pub fn set_down(&self, down: bool) {
        self.down.store(down, Ordering::SeqCst);
    }

    pub fn is_down(&self) -> bool {
        self.down.load(Ordering::SeqCst)
    }

    /// Calls received, failed or not.
    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::Relaxed)
    }

    /// Calls that were made to fail.
    pub fn injected_failures(&self) -> u64 {
        self.injected.load(Ordering::Relaxed)
    }

    /// The wrapped node, bypassing fault injection.
    pub fn inner(&self) -> &Arc<dyn CacheNode> {
        &self.inner
    }

    fn check(&self, op: &str) -> Result<(), NodeError> {
        self.calls.fetch_add(1, Ordering::Relaxed);

        let reason = if self.is_down() {
            Some("node down")
        } else if self.failure_rate > 0.0 && self.rng.lock().random_bool(self.failure_rate) {
            Some("injected fault")
        } else {
            None
        };

        match reason {
            Some(reason) => {
                self.injected.fetch_add(1, Ordering::Relaxed);
                Err(NodeError::Unavailable(format!("{op}: {reason}")))
            }
            None => Ok(()),
        }
    }
}

impl CacheNode for FaultyNode {
    fn get(&self, key: &str) -> Result<Option<Bytes>, NodeError> {
        self.check("get")?;
        self.inner.get(key)
    }

    fn put(&self, key: &str, value: Bytes, ttl: Option<Duration>) -> Result<(), NodeError> {
        self.check("put")?;
        self.inner.put(key, value, ttl)
    }

    fn peek(&self, key: &str) -> Result<Option<Bytes>, NodeError> {
        self.check("peek")?;
        self.inner.peek(key)
    }

    fn fill(&self, key: &str, value: Bytes, ttl: Option<Duration>) -> Result<bool, NodeError> {
        self.check("fill")?;
        self.inner.fill(key, value, ttl)
    }

    fn remove(&self, key: &str) -> Result<bool, NodeError> {
        self.check("remove")?;
        self.inner.remove(key)
    }

    fn stats(&self) -> CacheStats {
        self.inner.stats()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::NodeCache;

    #[test]
    fn test_forced_down() {
        let node = FaultyNode::new(Arc::new(NodeCache::new(4)));
        node.put("k", Bytes::from("v"), None).unwrap();

        node.set_down(true);
        assert!(matches!(node.get("k"), Err(NodeError::Unavailable(_))));
        assert!(node.put("k", Bytes::from("w"), None).is_err());

        node.set_down(false);
        assert_eq!(node.get("k").unwrap(), Some(Bytes::from("v")));
        assert_eq!(node.calls(), 4);
        assert_eq!(node.injected_failures(), 2);
    }

    #[test]
    fn test_seeded_failures_are_reproducible() {
        let run = || {
            let node = FaultyNode::with_config(
                Arc::new(NodeCache::new(4)),
                FaultConfig::flaky(0.5, 42),
            );
            (0..64)
                .map(|_| node.get("k").is_err())
                .collect::<Vec<bool>>()
        };

        let first = run();
        assert_eq!(first, run());
        assert!(first.iter().any(|failed| *failed));
        assert!(first.iter().any(|failed| !*failed));
    }

    #[test]
    fn test_stats_pass_through_when_down() {
        let node = FaultyNode::new(Arc::new(NodeCache::new(3)));
        node.set_down(true);
        assert_eq!(node.stats().capacity, 3);
    }
}
