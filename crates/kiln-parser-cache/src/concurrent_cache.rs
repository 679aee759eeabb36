use std::hash::Hash;
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

/// An unbounded concurrent point cache.
///
/// Values are shared behind `Arc`, so removal never invalidates a reader that
/// already holds an entry. `put_if_absent` is atomic per key; callers detect
/// whether their insert won the race by pointer identity of the returned
/// value (`Arc::ptr_eq`).
#[derive(Debug)]
pub struct ConcurrentCache<K: Eq + Hash, V> {
    map: DashMap<K, Arc<V>>,
}

impl<K: Eq + Hash, V> ConcurrentCache<K, V> {
    /// Creates a cache sized for `parallelism` concurrent writers.
    pub fn with_parallelism(parallelism: usize) -> Self {
        let shards = (parallelism.max(1) * 4).next_power_of_two();
        Self {
            map: DashMap::with_shard_amount(shards),
        }
    }

    pub fn get(&self, key: &K) -> Option<Arc<V>> {
        self.map.get(key).map(|entry| Arc::clone(entry.value()))
    }

    /// Inserts `value` unless `key` is already present; returns whichever
    /// value is in the cache afterwards.
    pub fn put_if_absent(&self, key: K, value: Arc<V>) -> Arc<V> {
        match self.map.entry(key) {
            Entry::Occupied(entry) => Arc::clone(entry.get()),
            Entry::Vacant(entry) => {
                entry.insert(Arc::clone(&value));
                value
            }
        }
    }

    pub fn remove(&self, key: &K) -> Option<Arc<V>> {
        self.map.remove(key).map(|(_, value)| value)
    }

    pub fn contains(&self, key: &K) -> bool {
        self.map.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}
