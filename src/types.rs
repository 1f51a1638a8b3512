//! Core types used throughout the cache layer.

use serde::{Deserialize, Serialize};
use smol_str::SmolStr;
use std::borrow::Borrow;
use std::fmt;

/// Identifier of a physical cache node.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(SmolStr);

impl NodeId {
    /// Create a node identifier.
    pub fn new(id: impl AsRef<str>) -> Self {
        Self(SmolStr::new(id.as_ref()))
    }

    /// The identifier as a string slice.
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0.as_str())
    }
}

impl From<&str> for NodeId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for NodeId {
    fn from(id: String) -> Self {
        Self(SmolStr::from(id))
    }
}

impl AsRef<str> for NodeId {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

impl Borrow<str> for NodeId {
    fn borrow(&self) -> &str {
        self.as_str()
    }
}

/// Liveness state of a member node.
///
/// A decommissioned node has no state: it is no longer a member.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeState {
    /// Serving traffic and present on the ring.
    Active,
    /// Off the ring; its cache contents are retained for a later rejoin.
    Failed,
}

impl NodeState {
    /// Whether the node may serve requests.
    pub fn is_active(self) -> bool {
        matches!(self, NodeState::Active)
    }
}

impl fmt::Display for NodeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeState::Active => f.write_str("active"),
            NodeState::Failed => f.write_str("failed"),
        }
    }
}

/// Where a read was answered from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReadSource {
    /// A cache replica held the key.
    Replica,
    /// Every replica missed and the backing store supplied the value.
    BackingStore,
    /// Neither the replicas nor the backing store had the key.
    NotFound,
}

impl ReadSource {
    /// Short label used in logs and metrics.
    pub fn as_str(self) -> &'static str {
        match self {
            ReadSource::Replica => "replica",
            ReadSource::BackingStore => "backing_store",
            ReadSource::NotFound => "not_found",
        }
    }
}

/// Statistics for a single node cache.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    /// Number of entries currently held, including expired ones not yet purged.
    pub entry_count: usize,
    /// Maximum number of entries.
    pub capacity: usize,
    /// Number of cache hits.
    pub hits: u64,
    /// Number of cache misses.
    pub misses: u64,
    /// Number of entries evicted to honour the capacity bound.
    pub evictions: u64,
    /// Number of entries dropped because their TTL elapsed.
    pub expirations: u64,
}

impl CacheStats {
    /// Fraction of lookups that hit, or 0.0 when nothing was looked up.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// Point-in-time view of one member node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeStatus {
    /// The node's identifier.
    pub node_id: NodeId,
    /// Current liveness state.
    pub state: NodeState,
    /// Number of ring positions the node currently owns (0 while failed).
    pub ring_positions: usize,
    /// Statistics of the node's cache.
    pub stats: CacheStats,
}

/// Point-in-time view of the whole cluster.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterStatus {
    /// Configured replication factor.
    pub replication_factor: usize,
    /// Total positions on the ring.
    pub ring_positions: usize,
    /// Per-node status, ordered by node id.
    pub nodes: Vec<NodeStatus>,
}

impl ClusterStatus {
    /// Number of active members.
    pub fn active_count(&self) -> usize {
        self.nodes.iter().filter(|n| n.state.is_active()).count()
    }

    /// Number of failed members.
    pub fn failed_count(&self) -> usize {
        self.nodes.len() - self.active_count()
    }

    /// Sum of entries held across all members.
    pub fn total_entries(&self) -> usize {
        self.nodes.iter().map(|n| n.stats.entry_count).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_id_conversions() {
        let a = NodeId::from("NodeA");
        let b = NodeId::from(String::from("NodeA"));
        assert_eq!(a, b);
        assert_eq!(a.as_str(), "NodeA");
        assert_eq!(a.to_string(), "NodeA");
    }

    #[test]
    fn test_hit_rate() {
        let stats = CacheStats {
            hits: 3,
            misses: 1,
            ..Default::default()
        };
        assert!((stats.hit_rate() - 0.75).abs() < f64::EPSILON);
        assert_eq!(CacheStats::default().hit_rate(), 0.0);
    }
}
