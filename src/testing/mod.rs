//! Testing utilities for the distributed cache.
//!
//! [`TestCluster`] builds a [`DistributedCache`] whose nodes are all wrapped
//! in a [`FaultyNode`], backed by a [`MemoryBackingStore`], so tests can make
//! individual replicas unreachable without changing membership.
//!
//! # Example
//!
//! ```rust
//! use ringcache::testing::TestCluster;
//! use ringcache::ClusterConfig;
//!
//! let cluster = TestCluster::new(ClusterConfig::new(2), &["a", "b", "c"], 16).unwrap();
//! let primary = cluster.cache.replicas_for("user1").unwrap()[0].clone();
//!
//! // The primary stays Active but every call to it fails.
//! cluster.take_down(&primary);
//! assert!(cluster.cache.put("user1", "Alice").is_ok());
//! ```

mod faults;

mod cluster_scenario_tests;

pub use faults::{FaultConfig, FaultyNode};

use crate::cache::{DistributedCache, NodeCache};
use crate::config::ClusterConfig;
use crate::error::Result;
use crate::replication::MemoryBackingStore;
use crate::types::NodeId;
use bytes::Bytes;
use std::collections::BTreeMap;
use std::sync::Arc;

/// A cache cluster with fault-injectable nodes.
#[derive(Debug)]
pub struct TestCluster {
    /// The cache under test.
    pub cache: DistributedCache,

    /// The backing store consulted on full misses.
    pub store: Arc<MemoryBackingStore>,

    faults: BTreeMap<NodeId, Arc<FaultyNode>>,
}

impl TestCluster {
    /// Create a cluster with one node per id, each holding `capacity` entries.
    pub fn new(config: ClusterConfig, nodes: &[&str], capacity: usize) -> Result<Self> {
        Self::with_store(config, nodes, capacity, MemoryBackingStore::new())
    }

    /// Create a cluster over a preconfigured backing store.
    pub fn with_store(
        config: ClusterConfig,
        nodes: &[&str],
        capacity: usize,
        store: MemoryBackingStore,
    ) -> Result<Self> {
        let store = Arc::new(store);
        let cache = DistributedCache::with_backing_store(config, store.clone())?;

        let mut cluster = Self {
            cache,
            store,
            faults: BTreeMap::new(),
        };
        for node in nodes {
            cluster.add_node(node, capacity, FaultConfig::default())?;
        }
        Ok(cluster)
    }

    /// Add a node with the given fault configuration.
    pub fn add_node(&mut self, node_id: &str, capacity: usize, faults: FaultConfig) -> Result<()> {
        let node = Arc::new(FaultyNode::with_config(
            Arc::new(NodeCache::new(capacity)),
            faults,
        ));
        self.cache.add_cache_node(node_id, node.clone())?;
        self.faults.insert(NodeId::from(node_id), node);
        Ok(())
    }

    /// The fault handle of a node.
    pub fn node(&self, node_id: &NodeId) -> Option<&Arc<FaultyNode>> {
        self.faults.get(node_id)
    }

    /// Make every call to a node fail.
    pub fn take_down(&self, node_id: &NodeId) {
        if let Some(node) = self.faults.get(node_id) {
            node.set_down(true);
        }
    }

    /// Let calls to a node succeed again.
    pub fn bring_up(&self, node_id: &NodeId) {
        if let Some(node) = self.faults.get(node_id) {
            node.set_down(false);
        }
    }

    /// The value a node's cache holds for `key`.
    ///
    /// Reads without fault injection and without touching recency or hit
    /// counts.
    pub fn value_on(&self, node_id: &NodeId, key: &str) -> Option<Bytes> {
        self.faults
            .get(node_id)
            .and_then(|node| node.inner().peek(key).ok().flatten())
    }

    /// Whether a node's cache holds `key`. See [`TestCluster::value_on`].
    pub fn holds(&self, node_id: &NodeId, key: &str) -> bool {
        self.value_on(node_id, key).is_some()
    }

    /// Ids of all nodes ever added, ordered.
    pub fn node_ids(&self) -> Vec<NodeId> {
        self.faults.keys().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::CacheNode;

    #[test]
    fn test_test_cluster() {
        let cluster = TestCluster::new(ClusterConfig::new(2), &["a", "b", "c"], 8).unwrap();
        assert_eq!(cluster.node_ids().len(), 3);
        assert_eq!(cluster.cache.status().active_count(), 3);

        let a = NodeId::from("a");
        cluster.take_down(&a);
        assert!(cluster.node(&a).unwrap().is_down());
        cluster.bring_up(&a);
        assert!(!cluster.node(&a).unwrap().is_down());
    }

    #[test]
    fn test_holds_bypasses_faults() {
        let cluster = TestCluster::new(ClusterConfig::new(1), &["a"], 8).unwrap();
        cluster.cache.put("k", "v").unwrap();

        let a = NodeId::from("a");
        cluster.take_down(&a);
        assert!(cluster.holds(&a, "k"));
    }

    #[test]
    fn test_value_on_leaves_recency_and_stats_alone() {
        let cluster = TestCluster::new(ClusterConfig::new(1), &["a"], 2).unwrap();
        let a = NodeId::from("a");
        cluster.cache.put("k1", "1").unwrap();
        cluster.cache.put("k2", "2").unwrap();
        let before = cluster.node(&a).unwrap().stats();

        assert_eq!(cluster.value_on(&a, "k1"), Some(Bytes::from("1")));
        assert_eq!(cluster.node(&a).unwrap().stats(), before);

        // k1 was not promoted, so it is still the one evicted.
        cluster.cache.put("k3", "3").unwrap();
        assert!(!cluster.holds(&a, "k1"));
        assert!(cluster.holds(&a, "k2"));
    }
}
