//! The synchronous node abstraction the coordinator fans out to.
//!
//! In-process deployments use [`NodeCache`] directly. A networked deployment
//! puts an RPC client behind the same trait and maps transport failures to
//! [`NodeError`].

use super::node_cache::NodeCache;
use crate::error::NodeError;
use crate::types::CacheStats;
use bytes::Bytes;
use std::fmt::Debug;
use std::time::Duration;

/// A cache node that can be called synchronously.
pub trait CacheNode: Send + Sync + Debug + 'static {
    /// Look up a key. `Ok(None)` is a miss.
    fn get(&self, key: &str) -> Result<Option<Bytes>, NodeError>;

    /// Insert or update a key. `None` uses the node's default TTL.
    fn put(&self, key: &str, value: Bytes, ttl: Option<Duration>) -> Result<(), NodeError>;

    /// Look up a key without touching recency or statistics.
    fn peek(&self, key: &str) -> Result<Option<Bytes>, NodeError>;

    /// Store a key only when no live entry holds it. Returns whether the
    /// value was stored.
    ///
    /// Used for cache fills, which must never replace a newer write.
    fn fill(&self, key: &str, value: Bytes, ttl: Option<Duration>) -> Result<bool, NodeError>;

    /// Delete a key. Returns whether it was present.
    fn remove(&self, key: &str) -> Result<bool, NodeError>;

    /// Statistics of the node's cache.
    fn stats(&self) -> CacheStats;
}

impl CacheNode for NodeCache {
    fn get(&self, key: &str) -> Result<Option<Bytes>, NodeError> {
        Ok(NodeCache::get(self, key))
    }

    fn put(&self, key: &str, value: Bytes, ttl: Option<Duration>) -> Result<(), NodeError> {
        self.insert(key, value, ttl);
        Ok(())
    }

    fn peek(&self, key: &str) -> Result<Option<Bytes>, NodeError> {
        Ok(NodeCache::peek(self, key))
    }

    fn fill(&self, key: &str, value: Bytes, ttl: Option<Duration>) -> Result<bool, NodeError> {
        Ok(self.put_if_absent(key, value, ttl))
    }

    fn remove(&self, key: &str) -> Result<bool, NodeError> {
        Ok(NodeCache::remove(self, key))
    }

    fn stats(&self) -> CacheStats {
        NodeCache::stats(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_node_cache_behind_trait() {
        let node: Arc<dyn CacheNode> = Arc::new(NodeCache::new(2));

        node.put("a", Bytes::from("1"), None).unwrap();
        assert_eq!(node.get("a").unwrap(), Some(Bytes::from("1")));
        assert_eq!(node.peek("a").unwrap(), Some(Bytes::from("1")));
        assert!(!node.fill("a", Bytes::from("0"), None).unwrap());
        assert!(node.fill("b", Bytes::from("2"), None).unwrap());
        assert_eq!(node.peek("a").unwrap(), Some(Bytes::from("1")));
        assert!(node.remove("a").unwrap());
        assert!(!node.remove("a").unwrap());
        assert_eq!(node.stats().capacity, 2);
    }
}
