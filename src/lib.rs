//! Replicated LRU cache layer partitioned over a consistent-hashing ring.
//!
//! This crate provides an embedded distributed cache made of:
//! - A **hash ring** with virtual nodes that maps every key to an ordered
//!   replica set of distinct nodes
//! - A bounded, thread-safe **LRU cache** per node
//! - **Membership** that takes failed nodes off the ring while keeping their
//!   caches warm for a later rejoin
//! - A **replication coordinator** that fans writes out to every live replica
//!   and fails reads over along the replica set, then to a backing store
//!
//! # Example
//!
//! ```rust
//! use ringcache::{ClusterConfig, DistributedCache};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let cache = DistributedCache::new(ClusterConfig::new(2))?;
//!     cache.add_node("A")?;
//!     cache.add_node("B")?;
//!     cache.add_node("C")?;
//!
//!     cache.put("user1", "Alice")?;
//!
//!     // Reads keep working while the key's primary is down.
//!     let primary = cache.replicas_for("user1")?[0].clone();
//!     cache.mark_failed(primary)?;
//!     assert_eq!(cache.get("user1").await?.as_deref(), Some(&b"Alice"[..]));
//!
//!     cache.remove("user1")?;
//!     assert!(cache.get("user1").await?.is_none());
//!     Ok(())
//! }
//! ```
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │                  Router                      │
//! │  request_id span, reports serving nodes      │
//! └─────────────────────────────────────────────┘
//!                     │
//!                     ▼
//! ┌─────────────────────────────────────────────┐
//! │          ReplicationCoordinator             │──► BackingStore
//! │  fan-out put/remove, failover get           │    (on full miss)
//! └─────────────────────────────────────────────┘
//!          │                       │
//!          ▼                       ▼
//! ┌──────────────────┐   ┌──────────────────────┐
//! │    Membership    │   │  NodeCache (per node) │
//! │ HashRing + state │   │  LRU, own lock        │
//! └──────────────────┘   └──────────────────────┘
//! ```
//!
//! # Locking
//!
//! The ring and the member table share one read-write lock. Every node cache
//! has its own. A request resolves its replicas under the shared ring lock,
//! releases it, then calls the node caches, so the two are never held
//! together.

pub mod cache;
pub mod cluster;
pub mod config;
pub mod error;
pub mod metrics;
pub mod partitioning;
pub mod replication;
pub mod testing;
pub mod types;

// Re-export main types
pub use cache::{CacheNode, DistributedCache, NodeCache, Operation, RouteReport, Router};
pub use config::{ClusterConfig, MembershipConfig, PlacementPolicy};
pub use error::{Error, MembershipError, NodeError, Result};
pub use types::{CacheStats, ClusterStatus, NodeId, NodeState, NodeStatus, ReadSource};

// Re-export cluster types
pub use cluster::{
    ChannelEventListener, LoggingEventListener, MemberEvent, MemberEventListener, Membership,
    Replica,
};

// Re-export partitioning types
pub use partitioning::{HashRing, RendezvousPlacement, ReplicaPlacement, RingWalkPlacement};

// Re-export replication types
pub use replication::{
    BackingStore, MemoryBackingStore, ReadOutcome, RemoveOutcome, ReplicationCoordinator,
    WriteOutcome,
};

// Re-export metrics types
pub use metrics::{CacheMetrics, MetricsSnapshot};

// Re-export testing types
pub use testing::{FaultConfig, FaultyNode, TestCluster};
