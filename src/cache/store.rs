//! Cache Store Module
//!
//! Bounded TTL cache engine: HashMap storage, insertion-order eviction and
//! lazy expiry on read. Every operation is total.

use std::collections::HashMap;
use std::time::Duration;

use crate::cache::entry::current_timestamp_ms;
use crate::cache::{CacheEntry, CacheStats, InsertionOrder};

// == Cache Store ==
/// Bounded key/value store with per-entry expiry.
///
/// Invariant: `len() <= max_size` after every `set` returns.
#[derive(Debug)]
pub struct CacheStore<V> {
    /// Key-value storage
    entries: HashMap<String, CacheEntry<V>>,
    /// Eviction order (oldest insertion first)
    order: InsertionOrder,
    /// Performance statistics
    stats: CacheStats,
    /// Maximum number of entries allowed
    max_size: usize,
    /// TTL applied when `set` gets no override
    default_ttl: Duration,
}

impl<V: Clone> CacheStore<V> {
    // == Constructor ==
    /// Creates a new store.
    ///
    /// A `max_size` of zero is accepted and yields a store that never holds
    /// anything.
    pub fn new(max_size: usize, default_ttl: Duration) -> Self {
        Self {
            entries: HashMap::new(),
            order: InsertionOrder::new(),
            stats: CacheStats::new(max_size),
            max_size,
            default_ttl,
        }
    }

    // == Set ==
    /// Stores a value, overwriting any previous entry for the key.
    ///
    /// A new key arriving at capacity evicts the oldest insertion first. A zero
    /// TTL removes any previous value and stores nothing.
    pub fn set(&mut self, key: impl Into<String>, value: V, ttl: Option<Duration>) {
        let key = key.into();
        let ttl = ttl.unwrap_or(self.default_ttl);

        if let Some(previous) = self.entries.remove(&key) {
            self.order.remove(previous.seq);
        }

        if ttl.is_zero() || self.max_size == 0 {
            self.stats.set_size(self.entries.len());
            return;
        }

        while self.entries.len() >= self.max_size {
            match self.order.pop_oldest() {
                Some(evicted) => {
                    self.entries.remove(&evicted);
                    self.stats.record_eviction();
                }
                None => break,
            }
        }

        let seq = self.order.record(&key);
        self.entries.insert(key, CacheEntry::new(value, ttl, seq));
        self.stats.set_size(self.entries.len());
    }

    // == Get ==
    /// Returns a live value for `key`.
    ///
    /// An expired entry is removed on the spot and reported as absent, whether
    /// or not the sweep has visited it yet.
    pub fn get(&mut self, key: &str) -> Option<V> {
        let expired = match self.entries.get(key) {
            Some(entry) if !entry.is_expired() => {
                self.stats.record_hit();
                return Some(entry.value.clone());
            }
            Some(_) => true,
            None => false,
        };

        if expired {
            self.remove_entry(key);
            self.stats.record_expired(1);
        }
        self.stats.record_miss();
        None
    }

    // == Delete ==
    /// Removes an entry. Returns whether anything was removed.
    pub fn delete(&mut self, key: &str) -> bool {
        self.remove_entry(key)
    }

    // == Clear ==
    /// Removes every entry. Counters other than size are kept.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.order.clear();
        self.stats.set_size(0);
    }

    // == Keys ==
    /// Returns all unexpired keys, oldest insertion first.
    pub fn keys(&self) -> Vec<String> {
        let now = current_timestamp_ms();
        self.order
            .iter()
            .filter(|key| {
                self.entries
                    .get(key.as_str())
                    .is_some_and(|entry| !entry.is_expired_at(now))
            })
            .cloned()
            .collect()
    }

    /// Returns the unexpired keys containing `pattern`.
    pub fn keys_matching(&self, pattern: &str) -> Vec<String> {
        self.keys()
            .into_iter()
            .filter(|key| key.contains(pattern))
            .collect()
    }

    // == Stats ==
    /// Returns current statistics.
    pub fn stats(&self) -> CacheStats {
        let mut stats = self.stats.clone();
        stats.set_size(self.entries.len());
        stats
    }

    // == Sweep Expired ==
    /// Physically removes every expired entry. Returns the number removed.
    pub fn sweep_expired(&mut self) -> usize {
        let now = current_timestamp_ms();
        let expired: Vec<(String, u64)> = self
            .entries
            .iter()
            .filter(|(_, entry)| entry.is_expired_at(now))
            .map(|(key, entry)| (key.clone(), entry.seq))
            .collect();

        for (key, seq) in &expired {
            self.entries.remove(key);
            self.order.remove(*seq);
        }

        self.stats.record_expired(expired.len());
        self.stats.set_size(self.entries.len());
        expired.len()
    }

    /// Number of physically resident entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }

    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    fn remove_entry(&mut self, key: &str) -> bool {
        match self.entries.remove(key) {
            Some(entry) => {
                self.order.remove(entry.seq);
                self.stats.set_size(self.entries.len());
                true
            }
            None => false,
        }
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use std::thread::sleep;

    fn store(max_size: usize) -> CacheStore<i32> {
        CacheStore::new(max_size, Duration::from_secs(10))
    }

    #[test]
    fn test_store_new() {
        let store = store(100);
        assert_eq!(store.len(), 0);
        assert!(store.is_empty());
        assert_eq!(store.max_size(), 100);
    }

    #[test]
    fn test_store_set_and_get() {
        let mut store = store(100);

        store.set("key1", 1, None);

        assert_eq!(store.get("key1"), Some(1));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_store_get_nonexistent() {
        let mut store = store(100);
        assert_eq!(store.get("nonexistent"), None);
    }

    #[test]
    fn test_store_delete_is_idempotent() {
        let mut store = store(100);

        store.set("key1", 1, None);
        assert!(store.delete("key1"));
        assert!(!store.delete("key1"));

        assert!(store.is_empty());
        assert_eq!(store.get("key1"), None);
    }

    #[test]
    fn test_store_overwrite() {
        let mut store = store(100);

        store.set("key1", 1, None);
        store.set("key1", 2, None);

        assert_eq!(store.get("key1"), Some(2));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_store_evicts_oldest_insertion() {
        let mut store = store(2);

        store.set("a", 1, None);
        store.set("b", 2, None);
        store.set("c", 3, None);

        assert_eq!(store.get("a"), None);
        assert_eq!(store.get("b"), Some(2));
        assert_eq!(store.get("c"), Some(3));
        assert_eq!(store.stats().evictions, 1);
    }

    #[test]
    fn test_reads_do_not_protect_from_eviction() {
        let mut store = store(2);

        store.set("a", 1, None);
        store.set("b", 2, None);
        assert_eq!(store.get("a"), Some(1));

        store.set("c", 3, None);

        assert_eq!(store.get("a"), None);
        assert_eq!(store.get("b"), Some(2));
    }

    #[test]
    fn test_overwrite_at_capacity_does_not_evict() {
        let mut store = store(2);

        store.set("a", 1, None);
        store.set("b", 2, None);
        store.set("a", 10, None);

        assert_eq!(store.len(), 2);
        assert_eq!(store.stats().evictions, 0);
        // "a" is now the newest insertion, so "b" goes first
        store.set("c", 3, None);
        assert_eq!(store.get("b"), None);
        assert_eq!(store.get("a"), Some(10));
    }

    #[test]
    fn test_store_ttl_expiration_without_sweep() {
        let mut store = store(100);

        store.set("x", 1, Some(Duration::from_millis(10)));
        sleep(Duration::from_millis(50));

        // still resident until someone looks
        assert_eq!(store.len(), 1);
        assert_eq!(store.get("x"), None);
        assert_eq!(store.len(), 0);
        assert_eq!(store.stats().expired, 1);
    }

    #[test]
    fn test_zero_ttl_stores_nothing_and_drops_previous() {
        let mut store = store(100);

        store.set("x", 1, None);
        store.set("x", 2, Some(Duration::ZERO));

        assert_eq!(store.get("x"), None);
        assert!(store.is_empty());
    }

    #[test]
    fn test_zero_max_size_is_degenerate_not_a_crash() {
        let mut store = store(0);

        store.set("x", 1, None);
        store.set("y", 2, None);

        assert!(store.is_empty());
        assert_eq!(store.get("x"), None);
    }

    #[test]
    fn test_keys_skip_expired_and_keep_insertion_order() {
        let mut store = store(100);

        store.set("user_sessions_alice", 1, None);
        store.set("short", 2, Some(Duration::from_millis(5)));
        store.set("active_users", 3, None);
        sleep(Duration::from_millis(20));

        assert_eq!(store.keys(), vec!["user_sessions_alice", "active_users"]);
        assert_eq!(store.keys_matching("user_sessions"), vec!["user_sessions_alice"]);
    }

    #[test]
    fn test_store_stats() {
        let mut store = store(100);

        store.set("key1", 1, None);
        store.get("key1");
        store.get("nonexistent");

        let stats = store.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.size, 1);
        assert_eq!(stats.max_size, 100);
    }

    #[test]
    fn test_store_sweep_expired() {
        let mut store = store(100);

        store.set("key1", 1, Some(Duration::from_millis(10)));
        store.set("key2", 2, Some(Duration::from_secs(10)));
        sleep(Duration::from_millis(30));

        assert_eq!(store.sweep_expired(), 1);
        assert_eq!(store.len(), 1);
        assert_eq!(store.get("key2"), Some(2));
    }

    #[test]
    fn test_clear_empties_store_and_order() {
        let mut store = store(2);

        store.set("a", 1, None);
        store.set("b", 2, None);
        store.clear();
        store.set("c", 3, None);
        store.set("d", 4, None);

        assert_eq!(store.len(), 2);
        assert_eq!(store.stats().evictions, 0);
    }
}
