//! Per-run, write-once lookup cache.

use std::collections::BTreeMap;
use std::sync::{Mutex, PoisonError};

/// Successful lookup results keyed by lookup key.
///
/// The first value stored for a key wins; later inserts for the same
/// key are ignored and return the stored value.
#[derive(Debug)]
pub struct LookupCache<K, V> {
    entries: Mutex<BTreeMap<K, V>>,
}

impl<K, V> Default for LookupCache<K, V> {
    fn default() -> Self {
        Self {
            entries: Mutex::new(BTreeMap::new()),
        }
    }
}

impl<K: Ord + Clone, V: Clone> LookupCache<K, V> {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn get(&self, key: &K) -> Option<V> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    #[must_use]
    pub fn contains(&self, key: &K) -> bool {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(key)
    }

    /// Stores `value` unless `key` already has one; returns the stored
    /// value either way.
    pub fn insert_if_absent(&self, key: K, value: V) -> V {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(key)
            .or_insert(value)
            .clone()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
