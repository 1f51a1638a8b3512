//! Configuration types for the cache layer.

use crate::error::{Error, Result};
use crate::partitioning::{RendezvousPlacement, ReplicaPlacement, RingWalkPlacement};
use std::sync::Arc;
use std::time::Duration;

/// Default number of ring positions per physical node.
pub const DEFAULT_VNODES_PER_NODE: usize = 160;

/// Default number of salted retries before a ring position collision is fatal.
pub const DEFAULT_MAX_SALT_RETRIES: u32 = 8;

/// Main configuration for a cache cluster.
#[derive(Debug, Clone)]
pub struct ClusterConfig {
    /// Number of distinct nodes each key is written to.
    pub replication_factor: usize,

    /// Ring positions created per physical node.
    pub vnodes_per_node: usize,

    /// Cache capacity used when a node joins without an explicit capacity.
    pub default_node_capacity: usize,

    /// TTL applied to writes that do not carry their own.
    pub default_ttl: Option<Duration>,

    /// Upper bound on a single backing-store read.
    pub backing_store_timeout: Duration,

    /// Salted retries per virtual node when positions collide.
    pub max_salt_retries: u32,

    /// Replica selection policy.
    pub placement: PlacementPolicy,

    /// Membership configuration.
    pub membership: MembershipConfig,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            replication_factor: 2,
            vnodes_per_node: DEFAULT_VNODES_PER_NODE,
            default_node_capacity: 1024,
            default_ttl: None,
            backing_store_timeout: Duration::from_millis(500),
            max_salt_retries: DEFAULT_MAX_SALT_RETRIES,
            placement: PlacementPolicy::RingWalk,
            membership: MembershipConfig::default(),
        }
    }
}

impl ClusterConfig {
    /// Create a configuration with the given replication factor.
    pub fn new(replication_factor: usize) -> Self {
        Self {
            replication_factor,
            ..Default::default()
        }
    }

    /// Set the replication factor.
    pub fn with_replication_factor(mut self, n: usize) -> Self {
        self.replication_factor = n;
        self
    }

    /// Set the number of ring positions per node.
    pub fn with_vnodes_per_node(mut self, vnodes: usize) -> Self {
        self.vnodes_per_node = vnodes;
        self
    }

    /// Set the default node capacity.
    pub fn with_default_node_capacity(mut self, capacity: usize) -> Self {
        self.default_node_capacity = capacity;
        self
    }

    /// Set the default TTL for cache entries.
    pub fn with_default_ttl(mut self, ttl: Duration) -> Self {
        self.default_ttl = Some(ttl);
        self
    }

    /// Set the backing-store read timeout.
    pub fn with_backing_store_timeout(mut self, timeout: Duration) -> Self {
        self.backing_store_timeout = timeout;
        self
    }

    /// Set the salted retry budget for ring collisions.
    pub fn with_max_salt_retries(mut self, retries: u32) -> Self {
        self.max_salt_retries = retries;
        self
    }

    /// Set the replica placement policy.
    pub fn with_placement(mut self, placement: PlacementPolicy) -> Self {
        self.placement = placement;
        self
    }

    /// Set membership configuration.
    pub fn with_membership_config(mut self, membership: MembershipConfig) -> Self {
        self.membership = membership;
        self
    }

    /// Reject configurations that cannot place or hold any key.
    pub fn validate(&self) -> Result<()> {
        if self.replication_factor == 0 {
            return Err(Error::Config("replication_factor must be at least 1".into()));
        }
        if self.vnodes_per_node == 0 {
            return Err(Error::Config("vnodes_per_node must be at least 1".into()));
        }
        if self.default_node_capacity == 0 {
            return Err(Error::Config("default_node_capacity must be at least 1".into()));
        }
        if self.backing_store_timeout.is_zero() {
            return Err(Error::Config("backing_store_timeout must be non-zero".into()));
        }
        if self.membership.failure_confirmations == 0 {
            return Err(Error::Config("failure_confirmations must be at least 1".into()));
        }
        Ok(())
    }
}

/// Cluster membership configuration.
#[derive(Debug, Clone)]
pub struct MembershipConfig {
    /// Consecutive failed health checks before a node is marked failed.
    pub failure_confirmations: usize,
}

impl Default for MembershipConfig {
    fn default() -> Self {
        Self {
            failure_confirmations: 3,
        }
    }
}

/// Replica selection policy, chosen at configuration time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlacementPolicy {
    /// Walk the ring clockwise from the key and collect distinct nodes.
    #[default]
    RingWalk,

    /// Rank ring members by a per-key score and take the highest.
    Rendezvous,
}

impl PlacementPolicy {
    /// Build the placement implementation for this policy.
    pub fn build(self) -> Arc<dyn ReplicaPlacement> {
        match self {
            PlacementPolicy::RingWalk => Arc::new(RingWalkPlacement),
            PlacementPolicy::Rendezvous => Arc::new(RendezvousPlacement),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ClusterConfig::default();
        assert_eq!(config.replication_factor, 2);
        assert_eq!(config.vnodes_per_node, DEFAULT_VNODES_PER_NODE);
        assert!(config.default_ttl.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_builder() {
        let config = ClusterConfig::new(3)
            .with_vnodes_per_node(64)
            .with_default_ttl(Duration::from_secs(30))
            .with_placement(PlacementPolicy::Rendezvous);

        assert_eq!(config.replication_factor, 3);
        assert_eq!(config.vnodes_per_node, 64);
        assert_eq!(config.default_ttl, Some(Duration::from_secs(30)));
        assert_eq!(config.placement.build().name(), "rendezvous");
    }

    #[test]
    fn test_validate_rejects_zero_values() {
        assert!(ClusterConfig::new(0).validate().is_err());
        assert!(ClusterConfig::default()
            .with_vnodes_per_node(0)
            .validate()
            .is_err());
        assert!(ClusterConfig::default()
            .with_backing_store_timeout(Duration::ZERO)
            .validate()
            .is_err());
    }
}
