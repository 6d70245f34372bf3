//! Insertion Order Module
//!
//! Tracks insertion order for oldest-first eviction.

use std::collections::BTreeMap;

// == Insertion Order ==
/// Tracks keys by the sequence number they were inserted under.
///
/// The smallest sequence number is the oldest insertion and the next eviction
/// candidate. Reads do not reorder keys; only a fresh `set` does.
#[derive(Debug, Default)]
pub struct InsertionOrder {
    /// Sequence number -> key
    order: BTreeMap<u64, String>,
    /// Next sequence number to hand out
    next_seq: u64,
}

impl InsertionOrder {
    // == Constructor ==
    /// Creates a new empty tracker.
    pub fn new() -> Self {
        Self::default()
    }

    // == Record ==
    /// Records `key` as the newest insertion and returns its sequence number.
    ///
    /// Callers overwriting a key must `remove` its previous sequence first.
    pub fn record(&mut self, key: &str) -> u64 {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.order.insert(seq, key.to_string());
        seq
    }

    // == Remove ==
    /// Forgets the insertion recorded under `seq`.
    pub fn remove(&mut self, seq: u64) {
        self.order.remove(&seq);
    }

    // == Evict Oldest ==
    /// Returns and removes the oldest inserted key.
    pub fn pop_oldest(&mut self) -> Option<String> {
        self.order.pop_first().map(|(_, key)| key)
    }

    /// Returns the oldest inserted key without removing it.
    pub fn peek_oldest(&self) -> Option<&String> {
        self.order.first_key_value().map(|(_, key)| key)
    }

    /// Iterates keys from oldest to newest.
    pub fn iter(&self) -> impl Iterator<Item = &String> {
        self.order.values()
    }

    /// Drops every tracked key.
    pub fn clear(&mut self) {
        self.order.clear();
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}
