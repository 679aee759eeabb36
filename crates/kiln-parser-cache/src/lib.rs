//! Per-cell parse caches for the kiln daemon.
//!
//! The daemon keeps one [`CellState`] per cell. It memoizes three related
//! artifacts and the dependency edges between the files that produced them:
//!
//! - build file manifests and package file manifests, keyed by absolute path
//! - computed target nodes (unconfigured and configured), keyed by target
//! - two reverse dependency indices (auxiliary file → dependent build files /
//!   dependent package files)
//!
//! When the filesystem watcher reports a changed path, [`CellState::invalidate_path`]
//! cascades through the dependency indices and removes exactly the cached
//! artifacts whose parse or resolution observed that file.
//!
//! ## Concurrency
//!
//! Lookups are lock-free point reads on concurrent maps. Inserts take the
//! cell's caches lock in *read* mode (they may race each other; the maps pick
//! one winner per key). Invalidation takes the lock in *write* mode for the
//! whole cascade, so readers never observe a half-invalidated pair of caches.

mod cell;
mod concurrent_cache;
mod node_cache;
mod nodes;
mod state;

pub use cell::{Cell, DEFAULT_BUILD_FILE_NAME, DEFAULT_PACKAGE_FILE_NAME};
pub use concurrent_cache::ConcurrentCache;
pub use node_cache::{CacheHandle, CacheKind, ConfiguredNodeKind, NodeCache, RawNodeKind};
pub use nodes::{ConfiguredTargetNode, MaybeIncompatibleTargetNode, UnconfiguredTargetNode};
pub use state::CellState;
