//! Per-kind computed-node caches.
//!
//! Each cache kind pairs a key type with projections back to the target
//! identity levels. The cell state owns one [`NodeCache`] per kind and
//! invalidates all of them together, so no two kinds can disagree on which
//! targets are live.

use std::fmt;
use std::hash::Hash;
use std::sync::Arc;

use dashmap::{DashMap, DashSet};

use kiln_core::{BuildTarget, UnconfiguredBuildTarget, UnflavoredBuildTarget};

use crate::concurrent_cache::ConcurrentCache;
use crate::nodes::{MaybeIncompatibleTargetNode, UnconfiguredTargetNode};
use crate::state::CellState;

/// A type tag for one computed-node cache.
///
/// The projections connect a cache key back to the unflavored target it was
/// derived from; invalidation is keyed by unflavored targets, so these decide
/// which entries die when a build file changes.
pub trait CacheKind: Sized + 'static {
    type Key: Clone + Eq + Hash + fmt::Display;
    type Value;

    fn to_unconfigured(key: &Self::Key) -> &UnconfiguredBuildTarget;
    fn to_unflavored(key: &Self::Key) -> &UnflavoredBuildTarget;
    fn cache(state: &CellState) -> &NodeCache<Self>;
}

/// Unconfigured target nodes, keyed by unconfigured target.
pub struct RawNodeKind;

impl CacheKind for RawNodeKind {
    type Key = UnconfiguredBuildTarget;
    type Value = UnconfiguredTargetNode;

    fn to_unconfigured(key: &Self::Key) -> &UnconfiguredBuildTarget {
        key
    }

    fn to_unflavored(key: &Self::Key) -> &UnflavoredBuildTarget {
        key.unflavored()
    }

    fn cache(state: &CellState) -> &NodeCache<Self> {
        state.raw_node_cache()
    }
}

/// Configured (possibly incompatible) target nodes, keyed by configured
/// target.
pub struct ConfiguredNodeKind;

impl CacheKind for ConfiguredNodeKind {
    type Key = BuildTarget;
    type Value = MaybeIncompatibleTargetNode;

    fn to_unconfigured(key: &Self::Key) -> &UnconfiguredBuildTarget {
        key.unconfigured()
    }

    fn to_unflavored(key: &Self::Key) -> &UnflavoredBuildTarget {
        key.unflavored()
    }

    fn cache(state: &CellState) -> &NodeCache<Self> {
        state.configured_node_cache()
    }
}

/// One computed-node cache plus the index of live keys per unflavored target.
///
/// The index is what makes bulk invalidation possible: all flavored and
/// configured variants of a rule are found through the unflavored target their
/// build file declared.
pub struct NodeCache<K: CacheKind> {
    nodes: ConcurrentCache<K::Key, K::Value>,
    by_unflavored: DashMap<UnflavoredBuildTarget, DashSet<K::Key>>,
}

impl<K: CacheKind> NodeCache<K> {
    pub(crate) fn with_parallelism(parallelism: usize) -> Self {
        Self {
            nodes: ConcurrentCache::with_parallelism(parallelism),
            by_unflavored: DashMap::new(),
        }
    }

    /// Removes every cached node derived from `target` and the index entry
    /// itself. Caller must hold the cell state's write lock.
    pub(crate) fn invalidate_for(&self, target: &UnflavoredBuildTarget) {
        if let Some((_, keys)) = self.by_unflavored.remove(target) {
            for key in keys {
                self.nodes.remove(&key);
            }
        }
    }
}

/// Access to one computed-node cache, scoped to the owning cell state so that
/// inserts can honor the state's lock discipline and raw-target invariant.
pub struct CacheHandle<'a, K: CacheKind> {
    state: &'a CellState,
    cache: &'a NodeCache<K>,
}

impl<'a, K: CacheKind> CacheHandle<'a, K> {
    pub(crate) fn new(state: &'a CellState) -> Self {
        Self {
            state,
            cache: K::cache(state),
        }
    }

    pub fn lookup(&self, key: &K::Key) -> Option<Arc<K::Value>> {
        self.cache.nodes.get(key)
    }

    /// Inserts `node` unless `key` is already cached and returns the cached
    /// node; the winning insert also registers `key` for invalidation.
    ///
    /// Panics if the key's unflavored target has no raw node in this cell
    /// state: a computed node must never outlive the manifest it came from,
    /// so inserting one that was never backed by a manifest is a programmer
    /// error.
    pub fn put_if_absent(&self, key: K::Key, node: Arc<K::Value>) -> Arc<K::Value> {
        let _guard = self.state.read_caches();
        let updated = self
            .cache
            .nodes
            .put_if_absent(key.clone(), Arc::clone(&node));
        assert!(
            self.state.contains_raw_target(K::to_unflavored(&key)),
            "added computed node {key} with no raw target backing it",
        );
        if Arc::ptr_eq(&updated, &node) {
            self.cache
                .by_unflavored
                .entry(K::to_unflavored(&key).clone())
                .or_default()
                .insert(key);
        }
        updated
    }
}
