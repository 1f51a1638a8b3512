//! Partitioning of keys across cache nodes.
//!
//! Keys are placed with consistent hashing over virtual nodes:
//! - Every physical node owns many positions on a 64-bit ring
//! - Adding or removing a node only moves keys adjacent to its positions
//! - A replica set is the first `n` distinct nodes met walking clockwise
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                         HashRing                            │
//! │  ┌─────┐ ┌─────┐ ┌─────┐ ┌─────┐ ┌─────┐ ┌─────┐           │
//! │  │ A:0 │→│ B:3 │→│ C:1 │→│ A:7 │→│ B:0 │→│ C:5 │→ (wrap)   │
//! │  └─────┘ └─────┘ └─────┘ └─────┘ └─────┘ └─────┘           │
//! │                                                             │
//! │  "user1" → hash → first position ≥ hash → B (primary)       │
//! │                                         → C (replica)       │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```rust
//! use ringcache::partitioning::HashRing;
//! use ringcache::NodeId;
//!
//! let mut ring = HashRing::default();
//! for node in ["NodeA", "NodeB", "NodeC"] {
//!     ring.add_node(&NodeId::from(node), 64).unwrap();
//! }
//!
//! let replicas = ring.resolve_replica_set(b"user1", 2).unwrap();
//! assert_eq!(replicas.len(), 2);
//! assert_ne!(replicas[0], replicas[1]);
//! ```

mod hashring;
mod placement;

pub use hashring::{xxhash64, HashRing, RingHasher};
pub use placement::{RendezvousPlacement, ReplicaPlacement, RingWalkPlacement};
