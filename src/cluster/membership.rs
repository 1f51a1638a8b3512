//! Node liveness and ring membership.
//!
//! The ring and the member table share one read-write lock: resolutions run
//! concurrently under the shared lock, while join, failure, rejoin and
//! decommission take it exclusively. Node caches have their own locks and
//! are never called while this lock is held.
//!
//! Per-node lifecycle:
//!
//! ```text
//!   join ──► Active ──mark_failed──► Failed ──rejoin──► Active
//!              │                        │
//!              └──────decommission──────┴──► (removed)
//! ```

use crate::cache::{CacheNode, NodeCache};
use crate::cluster::events::{MemberEvent, MemberEventListener};
use crate::config::{ClusterConfig, MembershipConfig};
use crate::error::{Error, MembershipError, Result};
use crate::partitioning::{HashRing, ReplicaPlacement};
use crate::types::{ClusterStatus, NodeId, NodeState, NodeStatus};
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// A member node and its liveness.
#[derive(Debug)]
struct Member {
    node: Arc<dyn CacheNode>,
    state: NodeState,

    /// Consecutive failed health checks.
    failed_checks: usize,

    /// When `state` last changed.
    state_since: Instant,
}

impl Member {
    fn new(node: Arc<dyn CacheNode>) -> Self {
        Self {
            node,
            state: NodeState::Active,
            failed_checks: 0,
            state_since: Instant::now(),
        }
    }

    fn set_state(&mut self, state: NodeState) {
        self.state = state;
        self.failed_checks = 0;
        self.state_since = Instant::now();
    }
}

#[derive(Debug)]
struct Topology {
    ring: HashRing,
    members: BTreeMap<NodeId, Member>,
}

/// A resolved replica: the node to call and its state at resolution time.
#[derive(Debug, Clone)]
pub struct Replica {
    /// The node's ID.
    pub node_id: NodeId,
    /// The node's state when the replica set was resolved.
    pub state: NodeState,
    /// Handle used to call the node.
    pub node: Arc<dyn CacheNode>,
}

/// Authoritative liveness state and ring membership.
pub struct Membership {
    topology: RwLock<Topology>,

    /// Ring positions per node.
    vnodes_per_node: usize,

    config: MembershipConfig,

    listeners: RwLock<Vec<Arc<dyn MemberEventListener>>>,

    event_tx: mpsc::UnboundedSender<MemberEvent>,
}

impl Membership {
    /// Create an empty membership table.
    pub fn new(config: &ClusterConfig) -> (Arc<Self>, mpsc::UnboundedReceiver<MemberEvent>) {
        let (event_tx, event_rx) = mpsc::unbounded_channel();

        let membership = Arc::new(Self {
            topology: RwLock::new(Topology {
                ring: HashRing::new(config.max_salt_retries),
                members: BTreeMap::new(),
            }),
            vnodes_per_node: config.vnodes_per_node,
            config: config.membership.clone(),
            listeners: RwLock::new(Vec::new()),
            event_tx,
        });

        (membership, event_rx)
    }

    /// Add an event listener.
    pub fn add_listener(&self, listener: Arc<dyn MemberEventListener>) {
        self.listeners.write().push(listener);
    }

    fn notify(&self, event: MemberEvent) {
        for listener in self.listeners.read().iter() {
            listener.on_event(&event);
        }
        let _ = self.event_tx.send(event);
    }

    // ==================== Topology changes ====================

    /// Create a cache of `capacity` entries for a new node and put it on the ring.
    pub fn join(&self, node_id: impl Into<NodeId>, capacity: usize) -> Result<()> {
        let node_id = node_id.into();
        if capacity == 0 {
            return Err(MembershipError::InvalidCapacity { node_id, capacity }.into());
        }

        self.admit(node_id, Arc::new(NodeCache::new(capacity)))
    }

    /// Put an externally built node on the ring.
    pub fn join_with_node(&self, node_id: impl Into<NodeId>, node: Arc<dyn CacheNode>) -> Result<()> {
        self.admit(node_id.into(), node)
    }

    fn admit(&self, node_id: NodeId, node: Arc<dyn CacheNode>) -> Result<()> {
        let capacity = node.stats().capacity;
        {
            let mut topology = self.topology.write();
            if topology.members.contains_key(&node_id) {
                return Err(MembershipError::DuplicateNode(node_id).into());
            }
            topology.ring.add_node(&node_id, self.vnodes_per_node)?;
            topology.members.insert(node_id.clone(), Member::new(node));
        }

        info!(node_id = %node_id, capacity, "Node joined ring");
        self.notify(MemberEvent::NodeJoin { node_id, capacity });
        Ok(())
    }

    /// Take a node off the ring without discarding its cache.
    ///
    /// Marking an already failed node is a no-op.
    pub fn mark_failed(&self, node_id: &NodeId) -> Result<()> {
        {
            let mut topology = self.topology.write();
            let Topology { ring, members } = &mut *topology;
            let member = members
                .get_mut(node_id)
                .ok_or_else(|| MembershipError::NodeNotFound(node_id.clone()))?;

            if member.state == NodeState::Failed {
                return Ok(());
            }
            member.set_state(NodeState::Failed);
            ring.remove_node(node_id);
        }

        warn!(node_id = %node_id, "Node marked failed, removed from ring");
        self.notify(MemberEvent::NodeFailed {
            node_id: node_id.clone(),
        });
        Ok(())
    }

    /// Return a failed node to the ring with its cache contents intact.
    ///
    /// Rejoining an active node is a no-op.
    pub fn rejoin(&self, node_id: &NodeId) -> Result<()> {
        {
            let mut topology = self.topology.write();
            let Topology { ring, members } = &mut *topology;
            let member = members
                .get_mut(node_id)
                .ok_or_else(|| MembershipError::NodeNotFound(node_id.clone()))?;

            if member.state == NodeState::Active {
                return Ok(());
            }
            ring.add_node(node_id, self.vnodes_per_node)?;
            member.set_state(NodeState::Active);
        }

        info!(node_id = %node_id, "Node rejoined ring");
        self.notify(MemberEvent::NodeRecovered {
            node_id: node_id.clone(),
        });
        Ok(())
    }

    /// Permanently remove a node, dropping its cache and ring positions.
    pub fn decommission(&self, node_id: &NodeId) -> Result<()> {
        {
            let mut topology = self.topology.write();
            if topology.members.remove(node_id).is_none() {
                return Err(MembershipError::NodeNotFound(node_id.clone()).into());
            }
            topology.ring.remove_node(node_id);
        }

        info!(node_id = %node_id, "Node decommissioned");
        self.notify(MemberEvent::NodeDecommissioned {
            node_id: node_id.clone(),
        });
        Ok(())
    }

    // ==================== Health checks ====================

    /// Record a failed health check against a node.
    ///
    /// The node is marked failed once `failure_confirmations` consecutive
    /// checks have failed. Returns the node's state afterwards.
    pub fn record_failed_check(&self, node_id: &NodeId) -> Result<NodeState> {
        let failed_checks = {
            let mut topology = self.topology.write();
            let member = topology
                .members
                .get_mut(node_id)
                .ok_or_else(|| MembershipError::NodeNotFound(node_id.clone()))?;

            if member.state == NodeState::Failed {
                return Ok(NodeState::Failed);
            }
            member.failed_checks += 1;
            member.failed_checks
        };

        if failed_checks >= self.config.failure_confirmations {
            self.mark_failed(node_id)?;
            return Ok(NodeState::Failed);
        }

        debug!(node_id = %node_id, failed_checks, "Health check failed");
        self.notify(MemberEvent::NodeSuspect {
            node_id: node_id.clone(),
            failed_checks,
        });
        Ok(NodeState::Active)
    }

    /// Record a passing health check, clearing any suspicion.
    pub fn record_healthy_check(&self, node_id: &NodeId) -> Result<()> {
        let mut topology = self.topology.write();
        let member = topology
            .members
            .get_mut(node_id)
            .ok_or_else(|| MembershipError::NodeNotFound(node_id.clone()))?;
        member.failed_checks = 0;
        Ok(())
    }

    // ==================== Queries ====================

    /// Resolve the replicas for a key under the shared lock.
    ///
    /// Fails with `NoNodesAvailable` when there are no members at all. When
    /// members exist but none is on the ring, the result is empty.
    pub fn resolve(
        &self,
        key: &str,
        n: usize,
        placement: &dyn ReplicaPlacement,
    ) -> Result<Vec<Replica>> {
        let topology = self.topology.read();
        if topology.members.is_empty() {
            return Err(Error::NoNodesAvailable);
        }
        if topology.ring.is_empty() {
            return Ok(Vec::new());
        }

        let node_ids = placement.place(&topology.ring, key.as_bytes(), n)?;
        let replicas = node_ids
            .into_iter()
            .filter_map(|node_id| {
                let member = topology.members.get(&node_id)?;
                Some(Replica {
                    state: member.state,
                    node: member.node.clone(),
                    node_id,
                })
            })
            .collect();
        Ok(replicas)
    }

    /// Get a node's current state, or `None` if it is not a member.
    pub fn node_state(&self, node_id: &NodeId) -> Option<NodeState> {
        self.topology.read().members.get(node_id).map(|m| m.state)
    }

    /// How long a node has been in its current state.
    pub fn state_age(&self, node_id: &NodeId) -> Option<Duration> {
        self.topology
            .read()
            .members
            .get(node_id)
            .map(|m| m.state_since.elapsed())
    }

    /// Get the handle of a member node.
    pub fn node(&self, node_id: &NodeId) -> Option<Arc<dyn CacheNode>> {
        self.topology.read().members.get(node_id).map(|m| m.node.clone())
    }

    /// Check if a node is a member.
    pub fn contains(&self, node_id: &NodeId) -> bool {
        self.topology.read().members.contains_key(node_id)
    }

    /// Number of members, active or failed.
    pub fn member_count(&self) -> usize {
        self.topology.read().members.len()
    }

    /// Whether there are no members.
    pub fn is_empty(&self) -> bool {
        self.member_count() == 0
    }

    /// Active members, ordered by id.
    pub fn active_nodes(&self) -> Vec<NodeId> {
        self.nodes_in(NodeState::Active)
    }

    /// Failed members, ordered by id.
    pub fn failed_nodes(&self) -> Vec<NodeId> {
        self.nodes_in(NodeState::Failed)
    }

    fn nodes_in(&self, state: NodeState) -> Vec<NodeId> {
        self.topology
            .read()
            .members
            .iter()
            .filter(|(_, m)| m.state == state)
            .map(|(id, _)| id.clone())
            .collect()
    }

    /// Total positions on the ring.
    pub fn ring_positions(&self) -> usize {
        self.topology.read().ring.position_count()
    }

    /// Run a read-only function against the ring.
    pub fn with_ring<R>(&self, f: impl FnOnce(&HashRing) -> R) -> R {
        f(&self.topology.read().ring)
    }

    /// Status of every member, ordered by id.
    pub fn node_statuses(&self) -> Vec<NodeStatus> {
        let members: Vec<(NodeId, NodeState, usize, Arc<dyn CacheNode>)> = {
            let topology = self.topology.read();
            topology
                .members
                .iter()
                .map(|(id, m)| {
                    let positions = topology.ring.positions_of(id).len();
                    (id.clone(), m.state, positions, m.node.clone())
                })
                .collect()
        };

        // Node locks are taken only after the topology lock is released.
        members
            .into_iter()
            .map(|(node_id, state, ring_positions, node)| NodeStatus {
                node_id,
                state,
                ring_positions,
                stats: node.stats(),
            })
            .collect()
    }

    /// Snapshot of the whole cluster.
    pub fn status(&self, replication_factor: usize) -> ClusterStatus {
        ClusterStatus {
            replication_factor,
            ring_positions: self.ring_positions(),
            nodes: self.node_statuses(),
        }
    }
}

impl std::fmt::Debug for Membership {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let topology = self.topology.read();
        f.debug_struct("Membership")
            .field("members", &topology.members.len())
            .field("ring_positions", &topology.ring.position_count())
            .field("vnodes_per_node", &self.vnodes_per_node)
            .finish()
    }
}
