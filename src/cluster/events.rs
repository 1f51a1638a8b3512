//! Cluster membership events.

use crate::types::NodeId;
use tokio::sync::mpsc;

/// Events related to cluster membership changes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MemberEvent {
    /// A node joined and took positions on the ring.
    NodeJoin {
        /// The node's ID.
        node_id: NodeId,
        /// Capacity of the node's cache.
        capacity: usize,
    },

    /// A health check against a node failed, below the confirmation threshold.
    NodeSuspect {
        /// The node's ID.
        node_id: NodeId,
        /// Consecutive failed checks so far.
        failed_checks: usize,
    },

    /// A node was marked failed and left the ring.
    NodeFailed {
        /// The node's ID.
        node_id: NodeId,
    },

    /// A failed node rejoined the ring with its cache intact.
    NodeRecovered {
        /// The node's ID.
        node_id: NodeId,
    },

    /// A node was permanently removed.
    NodeDecommissioned {
        /// The node's ID.
        node_id: NodeId,
    },
}

impl MemberEvent {
    /// Get the node ID associated with this event.
    pub fn node_id(&self) -> &NodeId {
        match self {
            MemberEvent::NodeJoin { node_id, .. } => node_id,
            MemberEvent::NodeSuspect { node_id, .. } => node_id,
            MemberEvent::NodeFailed { node_id } => node_id,
            MemberEvent::NodeRecovered { node_id } => node_id,
            MemberEvent::NodeDecommissioned { node_id } => node_id,
        }
    }

    /// Check if this event adds ring positions.
    pub fn is_join(&self) -> bool {
        matches!(
            self,
            MemberEvent::NodeJoin { .. } | MemberEvent::NodeRecovered { .. }
        )
    }

    /// Check if this event removes ring positions.
    pub fn is_leave(&self) -> bool {
        matches!(
            self,
            MemberEvent::NodeFailed { .. } | MemberEvent::NodeDecommissioned { .. }
        )
    }
}

/// Listener for membership events.
pub trait MemberEventListener: Send + Sync + 'static {
    /// Called when a membership event occurs.
    fn on_event(&self, event: &MemberEvent);
}

/// Event listener that logs events.
pub struct LoggingEventListener;

impl MemberEventListener for LoggingEventListener {
    fn on_event(&self, event: &MemberEvent) {
        match event {
            MemberEvent::NodeJoin { node_id, capacity } => {
                tracing::info!(node_id = %node_id, capacity, "Node joined cluster");
            }
            MemberEvent::NodeSuspect {
                node_id,
                failed_checks,
            } => {
                tracing::warn!(node_id = %node_id, failed_checks, "Node suspected failed");
            }
            MemberEvent::NodeFailed { node_id } => {
                tracing::error!(node_id = %node_id, "Node marked failed");
            }
            MemberEvent::NodeRecovered { node_id } => {
                tracing::info!(node_id = %node_id, "Node recovered");
            }
            MemberEvent::NodeDecommissioned { node_id } => {
                tracing::info!(node_id = %node_id, "Node decommissioned");
            }
        }
    }
}

/// Event listener that forwards events to a channel.
///
/// Sends to a dropped receiver are discarded, so an abandoned subscription
/// never queues events.
pub struct ChannelEventListener {
    tx: mpsc::UnboundedSender<MemberEvent>,
}

impl ChannelEventListener {
    /// Create a listener and the receiver it feeds.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<MemberEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl MemberEventListener for ChannelEventListener {
    fn on_event(&self, event: &MemberEvent) {
        let _ = self.tx.send(event.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_listener_forwards() {
        let (listener, mut rx) = ChannelEventListener::new();
        let event = MemberEvent::NodeRecovered {
            node_id: NodeId::from("a"),
        };
        listener.on_event(&event);
        assert_eq!(rx.try_recv().unwrap(), event);

        drop(rx);
        listener.on_event(&event);
    }

    #[test]
    fn test_event_types() {
        let join = MemberEvent::NodeJoin {
            node_id: NodeId::from("a"),
            capacity: 8,
        };
        assert!(join.is_join());
        assert!(!join.is_leave());
        assert_eq!(join.node_id().as_str(), "a");

        let failed = MemberEvent::NodeFailed {
            node_id: NodeId::from("a"),
        };
        assert!(!failed.is_join());
        assert!(failed.is_leave());

        let suspect = MemberEvent::NodeSuspect {
            node_id: NodeId::from("a"),
            failed_checks: 1,
        };
        assert!(!suspect.is_join() && !suspect.is_leave());
    }
}
