//! External entry point for cache requests.
//!
//! The router holds no state of its own. Each request gets a `request_id`
//! and a tracing span, is delegated to the [`ReplicationCoordinator`], and
//! comes back annotated with the nodes that served it.

use crate::error::Result;
use crate::replication::{ReadOutcome, RemoveOutcome, ReplicationCoordinator, WriteOutcome};
use crate::types::NodeId;
use bytes::Bytes;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, info_span, warn, Instrument, Span};
use uuid::Uuid;

/// The kind of request being routed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Put,
    Get,
    Remove,
}

impl Operation {
    pub fn as_str(self) -> &'static str {
        match self {
            Operation::Put => "put",
            Operation::Get => "get",
            Operation::Remove => "remove",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A routed request and the nodes that served it.
#[derive(Debug, Clone)]
pub struct RouteReport<T> {
    /// Identifier logged with every event of the request.
    pub request_id: Uuid,
    pub operation: Operation,
    /// Nodes that served the request, in ring order.
    pub nodes: Vec<NodeId>,
    /// The coordinator's detailed result.
    pub outcome: T,
}

/// Stateless request router.
#[derive(Debug, Clone)]
pub struct Router {
    coordinator: Arc<ReplicationCoordinator>,
}

fn request_span(operation: Operation, key: &str) -> (Uuid, Span) {
    let request_id = Uuid::new_v4();
    let span = info_span!("request", request_id = %request_id, op = operation.as_str(), key);
    (request_id, span)
}

impl Router {
    pub fn new(coordinator: Arc<ReplicationCoordinator>) -> Self {
        Self { coordinator }
    }

    /// Route a write.
    pub fn handle_put(&self, key: &str, value: impl Into<Bytes>) -> Result<RouteReport<WriteOutcome>> {
        self.route_put(key, value.into(), None)
    }

    /// Route a write that expires after `ttl`.
    pub fn handle_put_with_ttl(
        &self,
        key: &str,
        value: impl Into<Bytes>,
        ttl: Duration,
    ) -> Result<RouteReport<WriteOutcome>> {
        self.route_put(key, value.into(), Some(ttl))
    }

    fn route_put(
        &self,
        key: &str,
        value: Bytes,
        ttl: Option<Duration>,
    ) -> Result<RouteReport<WriteOutcome>> {
        let (request_id, span) = request_span(Operation::Put, key);
        span.in_scope(|| -> Result<RouteReport<WriteOutcome>> {
            let outcome = match ttl {
                Some(ttl) => self.coordinator.put_with_ttl(key, value, ttl),
                None => self.coordinator.put(key, value),
            }
            .inspect_err(|e| warn!(error = %e, "Put failed"))?;

            info!(nodes = ?outcome.written, "Put served");
            Ok(RouteReport {
                request_id,
                operation: Operation::Put,
                nodes: outcome.written.clone(),
                outcome,
            })
        })
    }

    /// Route a read.
    pub async fn handle_get(&self, key: &str) -> Result<RouteReport<ReadOutcome>> {
        let (request_id, span) = request_span(Operation::Get, key);
        self.route_get(request_id, key).instrument(span).await
    }

    async fn route_get(&self, request_id: Uuid, key: &str) -> Result<RouteReport<ReadOutcome>> {
        let outcome = self
            .coordinator
            .get(key)
            .await
            .inspect_err(|e| warn!(error = %e, "Get failed"))?;

        info!(
            served_by = ?outcome.served_by,
            source = outcome.source.as_str(),
            "Get served"
        );
        Ok(RouteReport {
            request_id,
            operation: Operation::Get,
            nodes: outcome.served_by.iter().cloned().collect(),
            outcome,
        })
    }

    /// Route a remove.
    pub fn handle_remove(&self, key: &str) -> Result<RouteReport<RemoveOutcome>> {
        let (request_id, span) = request_span(Operation::Remove, key);
        span.in_scope(|| -> Result<RouteReport<RemoveOutcome>> {
            let outcome = self
                .coordinator
                .remove(key)
                .inspect_err(|e| warn!(error = %e, "Remove failed"))?;

            let nodes: Vec<NodeId> = outcome
                .removed_from
                .iter()
                .chain(&outcome.absent_on)
                .cloned()
                .collect();
            info!(nodes = ?nodes, "Remove served");
            Ok(RouteReport {
                request_id,
                operation: Operation::Remove,
                nodes,
                outcome,
            })
        })
    }
}
