//! Distributed cache implementation.

mod node;
mod node_cache;
pub mod router;

pub use node::CacheNode;
pub use node_cache::NodeCache;
pub use router::{Operation, RouteReport, Router};

use crate::cluster::{ChannelEventListener, MemberEvent, Membership};
use crate::config::ClusterConfig;
use crate::error::Result;
use crate::metrics::CacheMetrics;
use crate::replication::{BackingStore, ReplicationCoordinator};
use crate::types::{ClusterStatus, NodeId};
use bytes::Bytes;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::info;

/// The main distributed cache instance.
///
/// Keys are partitioned over a consistent-hashing ring and written to
/// `replication_factor` nodes. Reads fail over along the replica set and
/// fall back to the backing store, when one is configured.
pub struct DistributedCache {
    /// Configuration.
    config: ClusterConfig,

    /// Liveness and ring membership.
    membership: Arc<Membership>,

    /// Fan-out to replicas.
    coordinator: Arc<ReplicationCoordinator>,

    /// Request entry point.
    router: Router,

    metrics: Arc<CacheMetrics>,
}

impl DistributedCache {
    /// Create a cache with no nodes and no backing store.
    pub fn new(config: ClusterConfig) -> Result<Self> {
        Self::build(config, None)
    }

    /// Create a cache that falls back to `store` on a full miss.
    pub fn with_backing_store(config: ClusterConfig, store: Arc<dyn BackingStore>) -> Result<Self> {
        Self::build(config, Some(store))
    }

    fn build(config: ClusterConfig, store: Option<Arc<dyn BackingStore>>) -> Result<Self> {
        config.validate()?;

        let metrics = Arc::new(CacheMetrics::new());
        // Events only reach explicit subscribers.
        let (membership, _) = Membership::new(&config);

        let mut coordinator =
            ReplicationCoordinator::new(membership.clone(), &config, metrics.clone());
        if let Some(store) = store {
            coordinator = coordinator.with_backing_store(store);
        }
        let coordinator = Arc::new(coordinator);
        let router = Router::new(coordinator.clone());

        info!(
            replication_factor = config.replication_factor,
            vnodes_per_node = config.vnodes_per_node,
            placement = ?config.placement,
            "Distributed cache created"
        );

        Ok(Self {
            config,
            membership,
            coordinator,
            router,
            metrics,
        })
    }

    /// Receive membership events from now on.
    ///
    /// Each call creates an independent subscription. Dropping the receiver
    /// discards later events for it.
    pub fn subscribe_events(&self) -> mpsc::UnboundedReceiver<MemberEvent> {
        let (listener, rx) = ChannelEventListener::new();
        self.membership.add_listener(Arc::new(listener));
        rx
    }

    // ==================== Cluster Management ====================

    /// Add a node with the configured default capacity.
    pub fn add_node(&self, node_id: impl Into<NodeId>) -> Result<()> {
        self.add_node_with_capacity(node_id, self.config.default_node_capacity)
    }

    /// Add a node whose cache holds at most `capacity` entries.
    pub fn add_node_with_capacity(&self, node_id: impl Into<NodeId>, capacity: usize) -> Result<()> {
        self.membership.join(node_id, capacity)?;
        self.refresh_cluster_gauges();
        Ok(())
    }

    /// Add an externally built node, such as a client for a remote cache.
    pub fn add_cache_node(&self, node_id: impl Into<NodeId>, node: Arc<dyn CacheNode>) -> Result<()> {
        self.membership.join_with_node(node_id, node)?;
        self.refresh_cluster_gauges();
        Ok(())
    }

    /// Permanently remove a node and its cache.
    pub fn remove_node(&self, node_id: impl Into<NodeId>) -> Result<()> {
        self.membership.decommission(&node_id.into())?;
        self.refresh_cluster_gauges();
        Ok(())
    }

    /// Take a node off the ring, keeping its cache for a later rejoin.
    pub fn mark_failed(&self, node_id: impl Into<NodeId>) -> Result<()> {
        self.membership.mark_failed(&node_id.into())?;
        self.refresh_cluster_gauges();
        Ok(())
    }

    /// Return a failed node to the ring.
    pub fn rejoin(&self, node_id: impl Into<NodeId>) -> Result<()> {
        self.membership.rejoin(&node_id.into())?;
        self.refresh_cluster_gauges();
        Ok(())
    }

    fn refresh_cluster_gauges(&self) {
        let active = self.membership.active_nodes().len();
        let failed = self.membership.member_count().saturating_sub(active);
        self.metrics.update_cluster_stats(active, failed);
    }

    // ==================== Data Operations ====================

    /// Write a value to every live replica of `key`.
    pub fn put(&self, key: &str, value: impl Into<Bytes>) -> Result<()> {
        self.router.handle_put(key, value)?;
        Ok(())
    }

    /// Write a value that expires after `ttl`.
    pub fn put_with_ttl(&self, key: &str, value: impl Into<Bytes>, ttl: Duration) -> Result<()> {
        self.router.handle_put_with_ttl(key, value, ttl)?;
        Ok(())
    }

    /// Read a value. `Ok(None)` means no replica and no backing store had it.
    pub async fn get(&self, key: &str) -> Result<Option<Bytes>> {
        Ok(self.router.handle_get(key).await?.outcome.value)
    }

    /// Remove a key from every live replica. Removing an absent key succeeds.
    pub fn remove(&self, key: &str) -> Result<()> {
        self.router.handle_remove(key)?;
        Ok(())
    }

    /// The nodes `key` currently resolves to, in ring order.
    pub fn replicas_for(&self, key: &str) -> Result<Vec<NodeId>> {
        self.coordinator.replicas_for(key)
    }

    // ==================== Introspection ====================

    /// Get the current cluster status.
    pub fn status(&self) -> ClusterStatus {
        self.membership.status(self.config.replication_factor)
    }

    pub fn metrics(&self) -> &CacheMetrics {
        &self.metrics
    }

    pub fn membership(&self) -> &Arc<Membership> {
        &self.membership
    }

    pub fn router(&self) -> &Router {
        &self.router
    }

    pub fn config(&self) -> &ClusterConfig {
        &self.config
    }
}

impl std::fmt::Debug for DistributedCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DistributedCache")
            .field("config", &self.config)
            .field("membership", &self.membership)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    #[test]
    fn test_invalid_config_rejected() {
        assert!(matches!(
            DistributedCache::new(ClusterConfig::new(0)),
            Err(Error::Config(_))
        ));
    }

    #[tokio::test]
    async fn test_basic_operations() {
        let cache = DistributedCache::new(ClusterConfig::new(2).with_vnodes_per_node(32)).unwrap();
        cache.add_node("a").unwrap();
        cache.add_node("b").unwrap();

        cache.put("k", "v").unwrap();
        assert_eq!(cache.get("k").await.unwrap(), Some(Bytes::from("v")));

        cache.remove("k").unwrap();
        assert_eq!(cache.get("k").await.unwrap(), None);

        let status = cache.status();
        assert_eq!(status.nodes.len(), 2);
        assert_eq!(status.nodes[0].stats.capacity, 1024);
    }

    #[test]
    fn test_cluster_gauges_follow_membership() {
        let cache = DistributedCache::new(ClusterConfig::default()).unwrap();
        cache.add_node("a").unwrap();
        cache.add_node("b").unwrap();
        cache.mark_failed("a").unwrap();

        assert_eq!(cache.metrics().active_nodes.get(), 1);
        assert_eq!(cache.metrics().failed_nodes.get(), 1);

        cache.remove_node("a").unwrap();
        assert_eq!(cache.metrics().failed_nodes.get(), 0);
    }

    #[test]
    fn test_event_subscriptions() {
        let cache = DistributedCache::new(ClusterConfig::default()).unwrap();

        // Nobody subscribed yet: the join is not queued anywhere.
        cache.add_node_with_capacity("a", 4).unwrap();

        let mut first = cache.subscribe_events();
        let second = cache.subscribe_events();
        drop(second);

        cache.add_node_with_capacity("b", 8).unwrap();
        assert!(matches!(
            first.try_recv(),
            Ok(MemberEvent::NodeJoin { capacity: 8, .. })
        ));
        assert!(first.try_recv().is_err());
    }
}
