//! The slow source of truth consulted when every replica misses.

use crate::error::Result;
use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;
use std::fmt::Debug;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// External store read on a full cache miss.
///
/// The coordinator bounds every call with a timeout and treats both a
/// timeout and an error as "not found".
#[async_trait]
pub trait BackingStore: Send + Sync + Debug + 'static {
    /// Read a key. `Ok(None)` means the store has no value for it.
    async fn read(&self, key: &str) -> Result<Option<Bytes>>;
}

/// In-memory backing store with an optional artificial latency.
#[derive(Debug, Default)]
pub struct MemoryBackingStore {
    data: DashMap<String, Bytes>,
    latency: Option<Duration>,
    reads: AtomicU64,
}

impl MemoryBackingStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay every read by `latency`.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    pub fn insert(&self, key: impl Into<String>, value: impl Into<Bytes>) {
        self.data.insert(key.into(), value.into());
    }

    pub fn remove(&self, key: &str) -> Option<Bytes> {
        self.data.remove(key).map(|(_, value)| value)
    }

    /// Number of reads served so far, including ones that found nothing.
    pub fn read_count(&self) -> u64 {
        self.reads.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl BackingStore for MemoryBackingStore {
    async fn read(&self, key: &str) -> Result<Option<Bytes>> {
        self.reads.fetch_add(1, Ordering::Relaxed);
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        Ok(self.data.get(key).map(|entry| entry.value().clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_backing_store() {
        let store = MemoryBackingStore::new();
        store.insert("user1", "Alice");

        assert_eq!(store.read("user1").await.unwrap(), Some(Bytes::from("Alice")));
        assert_eq!(store.read("user2").await.unwrap(), None);
        assert_eq!(store.read_count(), 2);

        assert_eq!(store.remove("user1"), Some(Bytes::from("Alice")));
        assert_eq!(store.read("user1").await.unwrap(), None);
    }
}
