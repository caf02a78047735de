//! Key Index Module
//!
//! Tracks the live keys of a cache in sorted order to pick eviction victims.

use std::collections::BTreeSet;

use parking_lot::RwLock;

// == Key Index ==
/// Ordered, deduplicated set of live keys.
///
/// Keys are ordered by byte-wise string comparison, not by insertion time:
/// [`KeyIndex::pop`] always yields the lexicographically smallest key.
///
/// All operations go through one read/write lock over the whole set. Each
/// call is atomic, but sequences of calls (check `len` then `pop`) are not.
#[derive(Debug, Default)]
pub struct KeyIndex {
    keys: RwLock<BTreeSet<String>>,
}

impl KeyIndex {
    // == Constructor ==
    /// Creates a new empty key index.
    pub fn new() -> Self {
        Self::default()
    }

    // == Append ==
    /// Adds a key. Appending a key that is already present does nothing.
    pub fn append(&self, key: &str) {
        let mut keys = self.keys.write();
        if !keys.contains(key) {
            keys.insert(key.to_string());
        }
    }

    // == Pop ==
    /// Removes and returns the smallest key.
    ///
    /// # Panics
    /// Panics if the index is empty. Callers must only pop an index they know
    /// to be non-empty.
    pub fn pop(&self) -> String {
        match self.keys.write().pop_first() {
            Some(key) => key,
            None => panic!("pop called on an empty key index"),
        }
    }

    // == Delete Key ==
    /// Removes a key, returning whether it was present.
    pub fn delete_key(&self, key: &str) -> bool {
        self.keys.write().remove(key)
    }

    // == Length ==
    /// Returns the number of tracked keys.
    pub fn len(&self) -> usize {
        self.keys.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.read().is_empty()
    }

    // == Contains ==
    /// Checks if a key is being tracked.
    pub fn contains(&self, key: &str) -> bool {
        self.keys.read().contains(key)
    }

    /// Returns a sorted snapshot of the tracked keys.
    pub fn keys(&self) -> Vec<String> {
        self.keys.read().iter().cloned().collect()
    }
}
