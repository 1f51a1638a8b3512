//! Bounded least-recently-used cache local to one node.
//!
//! Entries live in a slab-backed doubly linked list ordered from most to
//! least recently used, with a hash index from key to slot. Lookups take the
//! shared lock and record the slot they touched in a small read buffer; the
//! buffer is replayed in order under the exclusive lock before every write,
//! so eviction always sees the exact recency order.
//!
//! The lock is `parking_lot`'s task-fair `RwLock` rather than a strictly
//! read-preferring one. Concurrent hits share the read lock, but a queued
//! writer holds back new readers. A hit also takes the read-buffer mutex for
//! the single push.

use crate::types::CacheStats;
use bytes::Bytes;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tracing::trace;

/// Buffered promotions that force a drain from the read path.
const READ_BUFFER_LIMIT: usize = 64;

#[derive(Debug)]
struct Entry {
    key: String,
    value: Bytes,
    expires_at: Option<Instant>,
    prev: Option<usize>,
    next: Option<usize>,
}

impl Entry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

/// Recency list. `head` is the most recently used slot, `tail` the least.
#[derive(Debug, Default)]
struct LruList {
    slots: Vec<Option<Entry>>,
    free: Vec<usize>,
    index: HashMap<String, usize>,
    head: Option<usize>,
    tail: Option<usize>,
}

impl LruList {
    fn with_capacity(capacity: usize) -> Self {
        Self {
            slots: Vec::with_capacity(capacity),
            free: Vec::new(),
            index: HashMap::with_capacity(capacity),
            head: None,
            tail: None,
        }
    }

    fn len(&self) -> usize {
        self.index.len()
    }

    fn lookup(&self, key: &str) -> Option<(usize, &Entry)> {
        let slot = *self.index.get(key)?;
        self.slots[slot].as_ref().map(|entry| (slot, entry))
    }

    fn entry_mut(&mut self, slot: usize) -> Option<&mut Entry> {
        self.slots.get_mut(slot).and_then(Option::as_mut)
    }

    fn unlink(&mut self, slot: usize) {
        let (prev, next) = match self.slots[slot].as_ref() {
            Some(entry) => (entry.prev, entry.next),
            None => return,
        };

        match prev {
            Some(p) => {
                if let Some(entry) = self.entry_mut(p) {
                    entry.next = next;
                }
            }
            None => self.head = next,
        }
        match next {
            Some(n) => {
                if let Some(entry) = self.entry_mut(n) {
                    entry.prev = prev;
                }
            }
            None => self.tail = prev,
        }

        if let Some(entry) = self.entry_mut(slot) {
            entry.prev = None;
            entry.next = None;
        }
    }

    fn push_front(&mut self, slot: usize) {
        let old_head = self.head;
        if let Some(entry) = self.entry_mut(slot) {
            entry.prev = None;
            entry.next = old_head;
        }
        match old_head {
            Some(h) => {
                if let Some(entry) = self.entry_mut(h) {
                    entry.prev = Some(slot);
                }
            }
            None => self.tail = Some(slot),
        }
        self.head = Some(slot);
    }

    fn promote(&mut self, slot: usize) {
        if self.head != Some(slot) && self.slots.get(slot).is_some_and(Option::is_some) {
            self.unlink(slot);
            self.push_front(slot);
        }
    }

    fn insert_front(&mut self, entry: Entry) -> usize {
        let key = entry.key.clone();
        let slot = match self.free.pop() {
            Some(slot) => {
                self.slots[slot] = Some(entry);
                slot
            }
            None => {
                self.slots.push(Some(entry));
                self.slots.len() - 1
            }
        };
        self.index.insert(key, slot);
        self.push_front(slot);
        slot
    }

    fn remove_slot(&mut self, slot: usize) -> Option<Entry> {
        self.unlink(slot);
        let entry = self.slots[slot].take()?;
        self.index.remove(&entry.key);
        self.free.push(slot);
        Some(entry)
    }

    fn pop_lru(&mut self) -> Option<Entry> {
        let tail = self.tail?;
        self.remove_slot(tail)
    }

    fn keys_mru(&self) -> Vec<String> {
        let mut keys = Vec::with_capacity(self.len());
        let mut cursor = self.head;
        while let Some(slot) = cursor {
            match self.slots[slot].as_ref() {
                Some(entry) => {
                    keys.push(entry.key.clone());
                    cursor = entry.next;
                }
                None => break,
            }
        }
        keys
    }

    fn expired_slots(&self, now: Instant) -> Vec<usize> {
        self.index
            .values()
            .copied()
            .filter(|&slot| self.slots[slot].as_ref().is_some_and(|e| e.is_expired(now)))
            .collect()
    }
}

/// A bounded, thread-safe LRU cache owned by a single node.
pub struct NodeCache {
    capacity: usize,

    /// TTL applied to writes that carry none.
    default_ttl: Option<Duration>,

    list: RwLock<LruList>,

    /// Slots hit by readers since the last write, oldest first.
    reads: Mutex<Vec<usize>>,

    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
    expirations: AtomicU64,
}

impl NodeCache {
    /// Create a cache holding at most `capacity` entries (at least one).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            default_ttl: None,
            list: RwLock::new(LruList::with_capacity(capacity)),
            reads: Mutex::new(Vec::with_capacity(READ_BUFFER_LIMIT)),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
            expirations: AtomicU64::new(0),
        }
    }

    /// Apply a TTL to every write that does not specify one.
    pub fn with_default_ttl(mut self, ttl: Duration) -> Self {
        self.default_ttl = Some(ttl);
        self
    }

    /// Look up a key, marking it most recently used on a hit.
    ///
    /// Expired entries read as misses.
    pub fn get(&self, key: &str) -> Option<Bytes> {
        let now = Instant::now();
        let list = self.list.read();
        let (value, pending) = match list.lookup(key) {
            Some((slot, entry)) if !entry.is_expired(now) => {
                let mut reads = self.reads.lock();
                reads.push(slot);
                (Some(entry.value.clone()), reads.len())
            }
            _ => (None, 0),
        };
        drop(list);

        if value.is_some() {
            self.hits.fetch_add(1, Ordering::Relaxed);
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
        }

        if pending >= READ_BUFFER_LIMIT {
            let mut list = self.list.write();
            self.apply_reads(&mut list);
        }

        value
    }

    /// Look up a key without touching recency or statistics.
    pub fn peek(&self, key: &str) -> Option<Bytes> {
        let now = Instant::now();
        let list = self.list.read();
        let value = list
            .lookup(key)
            .filter(|(_, entry)| !entry.is_expired(now))
            .map(|(_, entry)| entry.value.clone());
        value
    }

    /// Check if a live entry exists for a key.
    pub fn contains(&self, key: &str) -> bool {
        self.peek(key).is_some()
    }

    /// Insert or update a key with the default TTL.
    ///
    /// Returns the key evicted to make room, if any.
    pub fn put(&self, key: &str, value: impl Into<Bytes>) -> Option<String> {
        self.insert(key, value.into(), None)
    }

    /// Insert or update a key that expires after `ttl`.
    pub fn put_with_ttl(&self, key: &str, value: impl Into<Bytes>, ttl: Duration) -> Option<String> {
        self.insert(key, value.into(), Some(ttl))
    }

    pub(crate) fn insert(&self, key: &str, value: Bytes, ttl: Option<Duration>) -> Option<String> {
        let now = Instant::now();
        let mut list = self.list.write();
        self.apply_reads(&mut list);
        self.store(&mut list, key, value, ttl, now)
    }

    /// Insert a key only when no live entry holds it.
    ///
    /// An expired entry counts as absent and is replaced. Returns whether the
    /// value was stored. A present entry is left untouched, recency included.
    pub fn put_if_absent(&self, key: &str, value: impl Into<Bytes>, ttl: Option<Duration>) -> bool {
        let now = Instant::now();
        let mut list = self.list.write();
        self.apply_reads(&mut list);

        if list.lookup(key).is_some_and(|(_, entry)| !entry.is_expired(now)) {
            return false;
        }
        self.store(&mut list, key, value.into(), ttl, now);
        true
    }

    fn store(
        &self,
        list: &mut LruList,
        key: &str,
        value: Bytes,
        ttl: Option<Duration>,
        now: Instant,
    ) -> Option<String> {
        let expires_at = ttl.or(self.default_ttl).map(|ttl| now + ttl);

        let existing = list.index.get(key).copied();
        if let Some(slot) = existing {
            if let Some(entry) = list.entry_mut(slot) {
                entry.value = value;
                entry.expires_at = expires_at;
            }
            list.promote(slot);
            return None;
        }

        list.insert_front(Entry {
            key: key.to_owned(),
            value,
            expires_at,
            prev: None,
            next: None,
        });

        if list.len() <= self.capacity {
            return None;
        }

        let evicted = list.pop_lru()?;
        if evicted.is_expired(now) {
            self.expirations.fetch_add(1, Ordering::Relaxed);
        } else {
            self.evictions.fetch_add(1, Ordering::Relaxed);
        }
        trace!(key = %evicted.key, "Evicted least recently used entry");
        Some(evicted.key)
    }

    /// Remove a key. Returns whether an entry was present.
    pub fn remove(&self, key: &str) -> bool {
        let mut list = self.list.write();
        self.apply_reads(&mut list);

        let slot = list.index.get(key).copied();
        match slot {
            Some(slot) => list.remove_slot(slot).is_some(),
            None => false,
        }
    }

    /// Drop every expired entry. Returns how many were dropped.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut list = self.list.write();
        self.apply_reads(&mut list);

        let expired = list.expired_slots(now);
        for &slot in &expired {
            list.remove_slot(slot);
        }
        self.expirations
            .fetch_add(expired.len() as u64, Ordering::Relaxed);
        expired.len()
    }

    /// Remove all entries.
    pub fn clear(&self) {
        let mut list = self.list.write();
        self.reads.lock().clear();
        *list = LruList::with_capacity(self.capacity);
    }

    /// Keys ordered from most to least recently used.
    pub fn keys_by_recency(&self) -> Vec<String> {
        let mut list = self.list.write();
        self.apply_reads(&mut list);
        list.keys_mru()
    }

    /// Number of entries held.
    pub fn len(&self) -> usize {
        self.list.read().len()
    }

    /// Whether the cache holds no entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Maximum number of entries.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Get cache statistics.
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entry_count: self.len(),
            capacity: self.capacity,
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            expirations: self.expirations.load(Ordering::Relaxed),
        }
    }

    /// Replay buffered reads. Caller holds the exclusive lock, so no reader
    /// can append while the buffer is drained.
    fn apply_reads(&self, list: &mut LruList) {
        let touched = std::mem::take(&mut *self.reads.lock());
        for slot in touched {
            list.promote(slot);
        }
    }
}

impl std::fmt::Debug for NodeCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeCache")
            .field("capacity", &self.capacity)
            .field("len", &self.len())
            .field("default_ttl", &self.default_ttl)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_put_and_get() {
        let cache = NodeCache::new(4);
        assert_eq!(cache.put("user1", "Alice"), None);
        assert_eq!(cache.get("user1"), Some(Bytes::from("Alice")));
        assert_eq!(cache.get("user2"), None);
    }

    #[test]
    fn test_evicts_least_recently_used() {
        let cache = NodeCache::new(3);
        cache.put("K1", "1");
        cache.put("K2", "2");
        cache.put("K3", "3");

        assert_eq!(cache.put("K4", "4"), Some("K1".to_string()));
        assert_eq!(cache.len(), 3);
        assert!(!cache.contains("K1"));
    }

    #[test]
    fn test_get_promotes_entry() {
        let cache = NodeCache::new(3);
        for key in ["K1", "K2", "K3", "K4"] {
            cache.put(key, key);
        }
        // Order is now K4, K3, K2; reading K2 moves it to the front.
        assert!(cache.get("K2").is_some());
        assert_eq!(cache.keys_by_recency(), vec!["K2", "K4", "K3"]);

        assert_eq!(cache.put("K5", "5"), Some("K3".to_string()));
        assert!(cache.contains("K2"));
        assert!(cache.contains("K4"));
        assert!(cache.contains("K5"));
    }

    #[test]
    fn test_update_promotes_and_replaces() {
        let cache = NodeCache::new(2);
        cache.put("a", "1");
        cache.put("b", "2");
        assert_eq!(cache.put("a", "3"), None);

        assert_eq!(cache.peek("a"), Some(Bytes::from("3")));
        assert_eq!(cache.put("c", "4"), Some("b".to_string()));
    }

    #[test]
    fn test_peek_does_not_promote() {
        let cache = NodeCache::new(2);
        cache.put("a", "1");
        cache.put("b", "2");
        assert!(cache.peek("a").is_some());

        assert_eq!(cache.put("c", "3"), Some("a".to_string()));
    }

    #[test]
    fn test_read_buffer_overflow_drains() {
        let cache = NodeCache::new(2);
        cache.put("a", "1");
        cache.put("b", "2");
        for _ in 0..(READ_BUFFER_LIMIT * 2 + 3) {
            cache.get("a");
        }
        assert!(cache.reads.lock().len() < READ_BUFFER_LIMIT);

        assert_eq!(cache.put("c", "3"), Some("b".to_string()));
    }

    #[test]
    fn test_put_if_absent_keeps_live_entry() {
        let cache = NodeCache::new(3);
        cache.put("a", "new");
        cache.put("b", "2");

        assert!(!cache.put_if_absent("a", "old", None));
        assert_eq!(cache.peek("a"), Some(Bytes::from("new")));
        // The refused fill did not promote "a".
        assert_eq!(cache.keys_by_recency(), vec!["b", "a"]);

        assert!(cache.put_if_absent("c", "3", None));
        assert_eq!(cache.peek("c"), Some(Bytes::from("3")));
    }

    #[test]
    fn test_put_if_absent_replaces_expired_entry() {
        let cache = NodeCache::new(2);
        cache.put_with_ttl("a", "stale", Duration::from_millis(5));
        thread::sleep(Duration::from_millis(20));

        assert!(cache.put_if_absent("a", "fresh", None));
        assert_eq!(cache.get("a"), Some(Bytes::from("fresh")));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_remove_is_idempotent() {
        let cache = NodeCache::new(2);
        cache.put("a", "1");
        assert!(cache.remove("a"));
        assert!(!cache.remove("a"));
        assert!(cache.is_empty());

        // Freed slots are reused without corrupting order.
        cache.put("b", "2");
        cache.put("c", "3");
        assert_eq!(cache.keys_by_recency(), vec!["c", "b"]);
    }

    #[test]
    fn test_ttl_expiry() {
        let cache = NodeCache::new(4);
        cache.put_with_ttl("short", "x", Duration::from_millis(20));
        cache.put("long", "y");
        assert!(cache.get("short").is_some());

        thread::sleep(Duration::from_millis(40));

        assert_eq!(cache.get("short"), None);
        assert!(cache.get("long").is_some());
        assert_eq!(cache.purge_expired(), 1);
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.stats().expirations, 1);
    }

    #[test]
    fn test_default_ttl() {
        let cache = NodeCache::new(4).with_default_ttl(Duration::from_millis(10));
        cache.put("a", "1");
        thread::sleep(Duration::from_millis(30));
        assert!(!cache.contains("a"));
    }

    #[test]
    fn test_stats() {
        let cache = NodeCache::new(1);
        cache.put("a", "1");
        cache.get("a");
        cache.get("missing");
        cache.put("b", "2");

        let stats = cache.stats();
        assert_eq!(stats.entry_count, 1);
        assert_eq!(stats.capacity, 1);
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.evictions, 1);
    }

    #[test]
    fn test_zero_capacity_is_clamped() {
        let cache = NodeCache::new(0);
        assert_eq!(cache.capacity(), 1);
        cache.put("a", "1");
        assert_eq!(cache.put("b", "2"), Some("a".to_string()));
    }

    #[test]
    fn test_clear() {
        let cache = NodeCache::new(4);
        cache.put("a", "1");
        cache.get("a");
        cache.clear();
        assert!(cache.is_empty());
        cache.put("b", "2");
        assert_eq!(cache.keys_by_recency(), vec!["b"]);
    }

    #[test]
    fn test_concurrent_readers_and_writers() {
        let cache = Arc::new(NodeCache::new(64));
        for i in 0..64 {
            cache.put(&format!("k{}", i), "v");
        }

        let mut handles = Vec::new();
        for t in 0..4 {
            let cache = cache.clone();
            handles.push(thread::spawn(move || {
                for i in 0..1000 {
                    let key = format!("k{}", (i * 7 + t) % 128);
                    if i % 10 == 0 {
                        cache.put(&key, "w");
                    } else {
                        cache.get(&key);
                    }
                }
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }

        assert!(cache.len() <= 64);
        assert_eq!(cache.keys_by_recency().len(), cache.len());
    }
}
