//! Ordered map wrapper that never creates entries implicitly.
//!
//! `SyncMap` is used wherever the core keys objects by value rather than by
//! handle: interned key-type field sets and binding lists per attachment
//! point. Iteration order is the key order, so every listing built from a
//! `SyncMap` is deterministic.
//!
//! There is no `entry()`-style accessor that inserts on miss: `get()`
//! returns `Option<&V>` and replacing a value takes an explicit `insert()`.

use std::collections::BTreeMap;

/// An ordered map that never creates entries implicitly.
///
/// # Example
///
/// ```
/// use flexacl_common::SyncMap;
///
/// let mut map: SyncMap<Vec<u16>, u32> = SyncMap::new();
///
/// // get() returns None for missing keys (doesn't create entry)
/// assert!(map.get(&vec![1, 2]).is_none());
///
/// map.insert(vec![1, 2], 42);
/// assert_eq!(map.get(&vec![1, 2]), Some(&42));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncMap<K, V> {
    inner: BTreeMap<K, V>,
}

impl<K: Ord, V> SyncMap<K, V> {
    pub fn new() -> Self {
        Self {
            inner: BTreeMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub fn contains_key(&self, key: &K) -> bool {
        self.inner.contains_key(key)
    }

    /// Returns a reference to the value, or `None`. Never inserts.
    pub fn get(&self, key: &K) -> Option<&V> {
        self.inner.get(key)
    }

    /// Inserts a value, returning the previous one if the key was present.
    pub fn insert(&mut self, key: K, value: V) -> Option<V> {
        self.inner.insert(key, value)
    }

    pub fn remove(&mut self, key: &K) -> Option<V> {
        self.inner.remove(key)
    }

    /// Iterates in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&K, &V)> {
        self.inner.iter()
    }

    pub fn values(&self) -> impl Iterator<Item = &V> {
        self.inner.values()
    }
}

impl<K: Ord, V> Default for SyncMap<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_get_does_not_create_entry() {
        let map: SyncMap<u32, u32> = SyncMap::new();
        assert!(map.get(&7).is_none());
        assert!(!map.contains_key(&7));
        assert!(map.is_empty());
    }

    #[test]
    fn test_iteration_is_key_ordered() {
        let mut map: SyncMap<u32, &str> = SyncMap::new();
        for (k, v) in [(3, "c"), (1, "a"), (2, "b")] {
            map.insert(k, v);
        }
        let values: Vec<_> = map.values().copied().collect();
        assert_eq!(values, vec!["a", "b", "c"]);
        let keys: Vec<_> = map.iter().map(|(k, _)| *k).collect();
        assert_eq!(keys, vec![1, 2, 3]);
    }

    #[test]
    fn test_insert_replaces_and_remove() {
        let mut map = SyncMap::new();
        assert_eq!(map.insert("ipv4", 1), None);
        assert_eq!(map.insert("ipv4", 2), Some(1));
        assert_eq!(map.len(), 1);
        assert_eq!(map.remove(&"ipv4"), Some(2));
        assert_eq!(map.remove(&"ipv4"), None);
    }
}
