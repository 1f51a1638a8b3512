//! Error types for the cache layer.

use crate::types::NodeId;
use thiserror::Error;

/// Result type alias for cache operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the cache layer.
#[derive(Error, Debug)]
pub enum Error {
    /// No node is registered, so no key can be placed.
    #[error("no nodes available")]
    NoNodesAvailable,

    /// Every resolved replica for the key is failed or rejected the write.
    #[error("write unavailable for key {key:?}: no live replica accepted it")]
    WriteUnavailable { key: String },

    /// Salted retries could not find a free ring position.
    #[error("duplicate ring position for {node_id} vnode {vnode} after {attempts} attempts")]
    DuplicatePosition {
        node_id: NodeId,
        vnode: usize,
        attempts: u32,
    },

    /// Membership management errors.
    #[error("membership error: {0}")]
    Membership(#[from] MembershipError),

    /// A single node call failed.
    #[error("node error: {0}")]
    Node(#[from] NodeError),

    /// The backing store failed to answer.
    #[error("backing store error: {0}")]
    BackingStore(String),

    /// Configuration errors.
    #[error("config error: {0}")]
    Config(String),
}

/// Cluster membership errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MembershipError {
    /// A member with this id already exists.
    #[error("node already exists: {0}")]
    DuplicateNode(NodeId),

    /// No member with this id exists.
    #[error("node not found: {0}")]
    NodeNotFound(NodeId),

    /// Node caches must hold at least one entry.
    #[error("invalid cache capacity {capacity} for node {node_id}")]
    InvalidCapacity { node_id: NodeId, capacity: usize },
}

/// Errors raised by an individual node call.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NodeError {
    /// The node could not be reached or refused the call.
    #[error("node unavailable: {0}")]
    Unavailable(String),
}

impl Error {
    /// Short label used for metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::NoNodesAvailable => "no_nodes_available",
            Error::WriteUnavailable { .. } => "write_unavailable",
            Error::DuplicatePosition { .. } => "duplicate_position",
            Error::Membership(_) => "membership",
            Error::Node(_) => "node",
            Error::BackingStore(_) => "backing_store",
            Error::Config(_) => "config",
        }
    }
}
