//! Cache Statistics Module
//!
//! Per-store counters for hits, misses, evictions and expiry reclamation.

use serde::Serialize;

// == Cache Stats ==
/// Snapshot of one store's counters.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CacheStats {
    /// Entries physically resident, including not-yet-swept expired ones
    pub size: usize,
    /// Configured entry ceiling
    pub max_size: usize,
    /// Reads that returned a live entry
    pub hits: u64,
    /// Reads that found nothing or an expired entry
    pub misses: u64,
    /// Entries removed to respect `max_size`
    pub evictions: u64,
    /// Expired entries removed lazily or by the sweep
    pub expired: u64,
}

impl CacheStats {
    // == Constructor ==
    /// Creates zeroed stats for a store with the given ceiling.
    pub fn new(max_size: usize) -> Self {
        Self {
            max_size,
            ..Self::default()
        }
    }

    // == Hit Rate ==
    /// Returns hits / (hits + misses), or 0.0 if nothing was read yet.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }

    pub fn record_hit(&mut self) {
        self.hits += 1;
    }

    pub fn record_miss(&mut self) {
        self.misses += 1;
    }

    pub fn record_eviction(&mut self) {
        self.evictions += 1;
    }

    /// Adds `count` reclaimed expired entries.
    pub fn record_expired(&mut self, count: usize) {
        self.expired += count as u64;
    }

    pub fn set_size(&mut self, size: usize) {
        self.size = size;
    }
}
