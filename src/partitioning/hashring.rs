//! Consistent hashing with virtual nodes.
//!
//! Each physical node owns several positions on a 64-bit ring. A key belongs
//! to the first position at or after its own hash, wrapping past the maximum
//! back to the minimum.

use crate::error::{Error, Result};
use crate::types::NodeId;
use std::collections::{BTreeMap, HashMap};
use std::hash::Hasher;
use twox_hash::XxHash64;

/// Function mapping bytes to a ring position.
pub type RingHasher = fn(&[u8]) -> u64;

/// Hash bytes with xxHash64, seed 0.
pub fn xxhash64(bytes: &[u8]) -> u64 {
    let mut hasher = XxHash64::with_seed(0);
    hasher.write(bytes);
    hasher.finish()
}

/// A consistent hash ring mapping positions to node identifiers.
#[derive(Debug, Clone)]
pub struct HashRing {
    /// Ring positions, ascending, each owned by exactly one node.
    positions: BTreeMap<u64, NodeId>,

    /// Positions held by each node. Salting means they cannot be recomputed
    /// from the node id alone.
    owned: HashMap<NodeId, Vec<u64>>,

    /// Extra salted attempts per virtual node after the first collision.
    max_salt_retries: u32,

    hasher: RingHasher,
}

impl HashRing {
    /// Create an empty ring with the given collision retry budget.
    pub fn new(max_salt_retries: u32) -> Self {
        Self::with_hasher(max_salt_retries, xxhash64)
    }

    /// Create an empty ring that places positions with a custom hash function.
    pub fn with_hasher(max_salt_retries: u32, hasher: RingHasher) -> Self {
        Self {
            positions: BTreeMap::new(),
            owned: HashMap::new(),
            max_salt_retries,
            hasher,
        }
    }

    /// Number of physical nodes on the ring.
    pub fn node_count(&self) -> usize {
        self.owned.len()
    }

    /// Total number of positions on the ring.
    pub fn position_count(&self) -> usize {
        self.positions.len()
    }

    /// Whether the ring has no nodes.
    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    /// Whether a node has positions on the ring.
    pub fn contains_node(&self, node_id: &NodeId) -> bool {
        self.owned.contains_key(node_id)
    }

    /// Iterate over the physical nodes on the ring, in no particular order.
    pub fn node_ids(&self) -> impl Iterator<Item = &NodeId> {
        self.owned.keys()
    }

    /// Positions owned by a node, in creation order.
    pub fn positions_of(&self, node_id: &NodeId) -> &[u64] {
        self.owned.get(node_id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Position of a key on the ring.
    pub fn key_position(&self, key: &[u8]) -> u64 {
        (self.hasher)(key)
    }

    /// Add `virtual_count` positions for a node.
    ///
    /// Position `i` is the hash of `"{node}:{i}"`. When that position is
    /// taken, `"{node}:{i}#{salt}"` is tried for each salt up to the retry
    /// budget. If every attempt collides the ring is left unchanged and
    /// `DuplicatePosition` is returned. Adding a node that is already present
    /// does nothing.
    pub fn add_node(&mut self, node_id: &NodeId, virtual_count: usize) -> Result<()> {
        if self.owned.contains_key(node_id) {
            return Ok(());
        }

        let count = virtual_count.max(1);
        let mut placed = Vec::with_capacity(count);

        for vnode in 0..count {
            match self.free_position(node_id, vnode) {
                Some(position) => {
                    self.positions.insert(position, node_id.clone());
                    placed.push(position);
                }
                None => {
                    for position in &placed {
                        self.positions.remove(position);
                    }
                    return Err(Error::DuplicatePosition {
                        node_id: node_id.clone(),
                        vnode,
                        attempts: self.max_salt_retries + 1,
                    });
                }
            }
        }

        self.owned.insert(node_id.clone(), placed);
        Ok(())
    }

    /// Remove every position owned by a node.
    ///
    /// Keys are not rehashed: only keys whose nearest position belonged to
    /// this node move, each to the next position clockwise. Returns whether
    /// the node was present.
    pub fn remove_node(&mut self, node_id: &NodeId) -> bool {
        match self.owned.remove(node_id) {
            Some(positions) => {
                for position in positions {
                    self.positions.remove(&position);
                }
                true
            }
            None => false,
        }
    }

    /// The node owning the first position at or after the key's hash.
    pub fn resolve_primary(&self, key: &[u8]) -> Result<NodeId> {
        self.walk(key).next().cloned().ok_or(Error::NoNodesAvailable)
    }

    /// Up to `n` distinct nodes, in clockwise order from the key.
    ///
    /// Positions of already-collected nodes are skipped. The walk stops after
    /// `n` nodes or one full revolution, so a ring with fewer than `n` nodes
    /// yields a shorter set.
    pub fn resolve_replica_set(&self, key: &[u8], n: usize) -> Result<Vec<NodeId>> {
        if self.positions.is_empty() {
            return Err(Error::NoNodesAvailable);
        }

        let wanted = n.min(self.owned.len());
        let mut replicas: Vec<NodeId> = Vec::with_capacity(wanted);

        for node_id in self.walk(key) {
            if replicas.len() >= wanted {
                break;
            }
            if !replicas.contains(node_id) {
                replicas.push(node_id.clone());
            }
        }

        Ok(replicas)
    }

    /// The node owning a ring position, wrapping past the maximum.
    pub fn owner_at(&self, position: u64) -> Option<&NodeId> {
        self.positions
            .range(position..)
            .next()
            .or_else(|| self.positions.iter().next())
            .map(|(_, node_id)| node_id)
    }

    /// Count primary ownership over a sample of synthetic keys.
    pub fn distribution(&self, sample_size: usize) -> HashMap<NodeId, usize> {
        let mut distribution = HashMap::new();

        for i in 0..sample_size {
            let key = format!("sample_key_{}", i);
            if let Ok(owner) = self.resolve_primary(key.as_bytes()) {
                *distribution.entry(owner).or_insert(0) += 1;
            }
        }

        distribution
    }

    /// One clockwise revolution of node ids starting at the key's position.
    fn walk(&self, key: &[u8]) -> impl Iterator<Item = &NodeId> {
        let hash = self.key_position(key);
        self.positions
            .range(hash..)
            .chain(self.positions.range(..hash))
            .map(|(_, node_id)| node_id)
    }

    fn free_position(&self, node_id: &NodeId, vnode: usize) -> Option<u64> {
        (0..=self.max_salt_retries)
            .map(|salt| self.vnode_position(node_id, vnode, salt))
            .find(|position| !self.positions.contains_key(position))
    }

    fn vnode_position(&self, node_id: &NodeId, vnode: usize, salt: u32) -> u64 {
        let label = if salt == 0 {
            format!("{}:{}", node_id, vnode)
        } else {
            format!("{}:{}#{}", node_id, vnode, salt)
        };
        (self.hasher)(label.as_bytes())
    }
}

impl Default for HashRing {
    fn default() -> Self {
        Self::new(crate::config::DEFAULT_MAX_SALT_RETRIES)
    }
}
