//! Replica placement policies.
//!
//! A policy turns a key into an ordered list of distinct ring members. The
//! coordinator holds one policy behind `Arc<dyn ReplicaPlacement>`, picked
//! from `PlacementPolicy` when the cluster is built.

use super::hashring::{xxhash64, HashRing};
use crate::error::{Error, Result};
use crate::types::NodeId;
use std::fmt::Debug;

/// Chooses the ordered replica set for a key.
pub trait ReplicaPlacement: Send + Sync + Debug {
    /// Short policy name for logs.
    fn name(&self) -> &'static str;

    /// Up to `n` distinct nodes for the key, most preferred first.
    ///
    /// Must be deterministic for an unchanged ring and must fail with
    /// `NoNodesAvailable` when the ring is empty.
    fn place(&self, ring: &HashRing, key: &[u8], n: usize) -> Result<Vec<NodeId>>;
}

/// Clockwise ring walk collecting distinct physical nodes.
#[derive(Debug, Clone, Copy, Default)]
pub struct RingWalkPlacement;

impl ReplicaPlacement for RingWalkPlacement {
    fn name(&self) -> &'static str {
        "ring-walk"
    }

    fn place(&self, ring: &HashRing, key: &[u8], n: usize) -> Result<Vec<NodeId>> {
        ring.resolve_replica_set(key, n)
    }
}

/// Highest-random-weight selection over the nodes on the ring.
///
/// Every node scores `hash(node || 0xff || key)`; the highest scores win.
/// Removing a node only affects keys that ranked it within their top `n`.
#[derive(Debug, Clone, Copy, Default)]
pub struct RendezvousPlacement;

impl RendezvousPlacement {
    fn score(node_id: &NodeId, key: &[u8]) -> u64 {
        let mut buf = Vec::with_capacity(node_id.as_str().len() + 1 + key.len());
        buf.extend_from_slice(node_id.as_str().as_bytes());
        buf.push(0xff);
        buf.extend_from_slice(key);
        xxhash64(&buf)
    }
}

impl ReplicaPlacement for RendezvousPlacement {
    fn name(&self) -> &'static str {
        "rendezvous"
    }

    fn place(&self, ring: &HashRing, key: &[u8], n: usize) -> Result<Vec<NodeId>> {
        if ring.is_empty() {
            return Err(Error::NoNodesAvailable);
        }

        let mut scored: Vec<(u64, &NodeId)> = ring
            .node_ids()
            .map(|node_id| (Self::score(node_id, key), node_id))
            .collect();
        // Ties on score fall back to id order so the result never depends on
        // map iteration order.
        scored.sort_unstable_by(|a, b| b.0.cmp(&a.0).then_with(|| a.1.cmp(b.1)));

        Ok(scored
            .into_iter()
            .take(n)
            .map(|(_, node_id)| node_id.clone())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ring(nodes: &[&str]) -> HashRing {
        let mut ring = HashRing::default();
        for node in nodes {
            ring.add_node(&NodeId::from(*node), 32).unwrap();
        }
        ring
    }

    #[test]
    fn test_ring_walk_matches_ring() {
        let ring = ring(&["a", "b", "c"]);
        let placement = RingWalkPlacement;
        assert_eq!(
            placement.place(&ring, b"user1", 2).unwrap(),
            ring.resolve_replica_set(b"user1", 2).unwrap()
        );
    }

    #[test]
    fn test_rendezvous_distinct_and_deterministic() {
        let ring = ring(&["a", "b", "c", "d"]);
        let placement = RendezvousPlacement;

        for i in 0..200 {
            let key = format!("k{}", i);
            let first = placement.place(&ring, key.as_bytes(), 3).unwrap();
            assert_eq!(first, placement.place(&ring, key.as_bytes(), 3).unwrap());
            assert_eq!(first.len(), 3);
            assert_ne!(first[0], first[1]);
            assert_ne!(first[0], first[2]);
            assert_ne!(first[1], first[2]);
        }
    }

    #[test]
    fn test_rendezvous_removal_keeps_survivor_order() {
        let mut ring = ring(&["a", "b", "c", "d"]);
        let placement = RendezvousPlacement;
        let before = placement.place(&ring, b"order:9", 4).unwrap();

        let removed = before[1].clone();
        ring.remove_node(&removed);
        let after = placement.place(&ring, b"order:9", 3).unwrap();

        let expected: Vec<NodeId> = before.into_iter().filter(|n| *n != removed).collect();
        assert_eq!(after, expected);
    }

    #[test]
    fn test_empty_ring_fails() {
        let ring = HashRing::default();
        assert!(matches!(
            RendezvousPlacement.place(&ring, b"k", 1),
            Err(Error::NoNodesAvailable)
        ));
        assert!(matches!(
            RingWalkPlacement.place(&ring, b"k", 1),
            Err(Error::NoNodesAvailable)
        ));
    }
}
