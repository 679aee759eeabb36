use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;

use dashmap::{DashMap, DashSet};
use parking_lot::{RwLock, RwLockReadGuard};
use smol_str::SmolStr;
use tracing::{debug, trace};

use kiln_core::{
    AbsPathBuf, CellName, ForwardRelPathBuf, TargetName, TargetParseError, UnflavoredBuildTarget,
};
use kiln_manifest::{BuildFileManifest, PackageFileManifest, RawTargetNode};

use crate::cell::Cell;
use crate::concurrent_cache::ConcurrentCache;
use crate::node_cache::{CacheHandle, CacheKind, ConfiguredNodeKind, NodeCache, RawNodeKind};

/// Reverse dependency edges: auxiliary file → files whose parse result
/// depends on it. The dependent file knows about the auxiliary through its
/// manifest's `includes`; this index stores the inverse edge.
struct DependencyIndex {
    edges: DashMap<AbsPathBuf, DashSet<AbsPathBuf>>,
}

impl DependencyIndex {
    fn new() -> Self {
        Self {
            edges: DashMap::new(),
        }
    }

    fn register(&self, auxiliary: AbsPathBuf, dependent: AbsPathBuf) {
        self.edges.entry(auxiliary).or_default().insert(dependent);
    }

    /// Snapshots the dependents of `path`. The cascade mutates the index
    /// while it walks, so callers iterate over an owned copy.
    fn dependents_of(&self, path: &AbsPathBuf) -> Vec<AbsPathBuf> {
        self.edges
            .get(path)
            .map(|set| set.iter().map(|entry| entry.key().clone()).collect())
            .unwrap_or_default()
    }

    fn remove_dependents(&self, path: &AbsPathBuf) {
        self.edges.remove(path);
    }

    fn intersects(&self, path: &AbsPathBuf, candidates: &HashSet<AbsPathBuf>) -> bool {
        self.edges
            .get(path)
            .is_some_and(|set| set.iter().any(|entry| candidates.contains(entry.key())))
    }
}

/// All parse caches for one cell.
///
/// One read/write lock sequences mutation across the caches: insertions take
/// it in read mode (the concurrent maps coordinate racing inserts on their
/// own), invalidation takes it in write mode for the whole cascade. Lookups
/// take no lock at all.
pub struct CellState {
    /// The descriptor is swappable on reconfiguration; root, canonical name
    /// and the package file name are fixed for the state's lifetime and
    /// cached below.
    cell: RwLock<Arc<Cell>>,
    cell_root: AbsPathBuf,
    cell_name: CellName,
    package_file_name: SmolStr,

    build_manifests: ConcurrentCache<AbsPathBuf, BuildFileManifest>,
    package_manifests: ConcurrentCache<AbsPathBuf, PackageFileManifest>,

    /// Every unflavored target collected from cached build file manifests.
    /// Consistency witness: computed nodes may only exist for targets that
    /// are present here (see [`CacheHandle::put_if_absent`]).
    raw_targets: DashSet<UnflavoredBuildTarget>,

    raw_node_cache: NodeCache<RawNodeKind>,
    configured_node_cache: NodeCache<ConfiguredNodeKind>,

    /// Auxiliary file → build files whose parse depends on it.
    build_file_dependents: DependencyIndex,
    /// Auxiliary file → package files whose parse depends on it.
    package_file_dependents: DependencyIndex,

    caches_lock: RwLock<()>,
}

impl CellState {
    pub fn new(cell: Arc<Cell>, parsing_parallelism: usize) -> Self {
        let cell_root = cell.root().clone();
        let cell_name = cell.name().clone();
        let package_file_name = cell.package_file_name_smol();
        Self {
            cell: RwLock::new(cell),
            cell_root,
            cell_name,
            package_file_name,
            build_manifests: ConcurrentCache::with_parallelism(parsing_parallelism),
            package_manifests: ConcurrentCache::with_parallelism(parsing_parallelism),
            raw_targets: DashSet::new(),
            raw_node_cache: NodeCache::with_parallelism(parsing_parallelism),
            configured_node_cache: NodeCache::with_parallelism(parsing_parallelism),
            build_file_dependents: DependencyIndex::new(),
            package_file_dependents: DependencyIndex::new(),
            caches_lock: RwLock::new(()),
        }
    }

    pub fn cell(&self) -> Arc<Cell> {
        Arc::clone(&self.cell.read())
    }

    /// Replaces the cell descriptor (configuration reload). The root and
    /// canonical name must not change; caches stay valid across the swap.
    pub fn set_cell(&self, cell: Arc<Cell>) {
        debug_assert_eq!(cell.root(), &self.cell_root);
        debug_assert_eq!(cell.name(), &self.cell_name);
        *self.cell.write() = cell;
    }

    pub fn cell_root(&self) -> &AbsPathBuf {
        &self.cell_root
    }

    pub fn cell_name(&self) -> &CellName {
        &self.cell_name
    }

    /// Access to the computed-node cache of kind `K`.
    pub fn cache<K: CacheKind>(&self) -> CacheHandle<'_, K> {
        CacheHandle::new(self)
    }

    pub fn lookup_build_manifest(&self, build_file: &AbsPathBuf) -> Option<Arc<BuildFileManifest>> {
        self.build_manifests.get(build_file)
    }

    /// Caches `manifest` for `build_file` unless one is already cached, and
    /// returns whichever manifest is cached afterwards.
    ///
    /// Either way, every raw target of the cached manifest is recorded in the
    /// raw-target set. Only the winning insert registers `build_file` as a
    /// dependent of each path in `dependents`: the dependent edges of a path
    /// stay canonical to the insertion that won, until the path is
    /// invalidated.
    ///
    /// Fails without touching any cache if a raw node of `manifest` yields no
    /// well-formed target.
    pub fn put_build_manifest_if_absent(
        &self,
        build_file: AbsPathBuf,
        manifest: Arc<BuildFileManifest>,
        dependents: &BTreeSet<AbsPathBuf>,
    ) -> Result<Arc<BuildFileManifest>, TargetParseError> {
        let targets: Vec<UnflavoredBuildTarget> = manifest
            .targets
            .values()
            .map(|node| self.unflavored_target_for(node))
            .collect::<Result<_, _>>()?;

        let _guard = self.caches_lock.read();
        let updated = self
            .build_manifests
            .put_if_absent(build_file.clone(), Arc::clone(&manifest));
        if Arc::ptr_eq(&updated, &manifest) {
            for target in targets {
                self.raw_targets.insert(target);
            }
            for dependent in dependents {
                self.build_file_dependents
                    .register(dependent.clone(), build_file.clone());
            }
        } else {
            // Lost the race: re-record the winner's targets (idempotent) so
            // the raw-target set covers whatever manifest is actually cached.
            for node in updated.targets.values() {
                self.raw_targets.insert(self.unflavored_target_for(node)?);
            }
        }
        Ok(updated)
    }

    pub fn lookup_package_manifest(
        &self,
        package_file: &AbsPathBuf,
    ) -> Option<Arc<PackageFileManifest>> {
        self.package_manifests.get(package_file)
    }

    /// Caches `manifest` for `package_file` unless one is already cached and
    /// returns whichever manifest is cached afterwards. Dependent
    /// registration follows the same winner-only rule as build manifests.
    pub fn put_package_manifest_if_absent(
        &self,
        package_file: AbsPathBuf,
        manifest: Arc<PackageFileManifest>,
        dependents: &BTreeSet<AbsPathBuf>,
    ) -> Arc<PackageFileManifest> {
        let _guard = self.caches_lock.read();
        let updated = self
            .package_manifests
            .put_if_absent(package_file.clone(), Arc::clone(&manifest));
        if Arc::ptr_eq(&updated, &manifest) {
            for dependent in dependents {
                self.package_file_dependents
                    .register(dependent.clone(), package_file.clone());
            }
        }
        updated
    }

    /// Invalidates the computed nodes of every target declared in `path`'s
    /// cached build manifest, across all cache kinds. With
    /// `invalidate_build_targets` the targets also leave the raw-target set.
    ///
    /// Returns the number of raw nodes the manifest declared, 0 if no
    /// manifest is cached for `path`.
    pub fn invalidate_nodes_in_path(
        &self,
        path: &AbsPathBuf,
        invalidate_build_targets: bool,
    ) -> u64 {
        let _guard = self.caches_lock.write();
        self.invalidate_nodes_locked(path, invalidate_build_targets)
    }

    /// Invalidates all cached content based on `path` and returns the count
    /// of invalidated raw nodes.
    ///
    /// `path` may be any file. For a build file this drops the manifest (when
    /// `invalidate_manifests`), its computed nodes and its raw targets; for a
    /// package file it additionally drops the nodes (but not the manifests)
    /// of dependent build files; for anything else it recursively invalidates
    /// every dependent build and package file.
    pub fn invalidate_path(&self, path: &AbsPathBuf, invalidate_manifests: bool) -> u64 {
        let _guard = self.caches_lock.write();
        self.invalidate_path_locked(path, invalidate_manifests)
    }

    /// Whether any build file in `build_files` depends on the file at
    /// `path` (cell-relative). Read-only; takes no lock.
    pub fn path_dependent_present_in(
        &self,
        path: &ForwardRelPathBuf,
        build_files: &HashSet<AbsPathBuf>,
    ) -> bool {
        self.build_file_dependents
            .intersects(&self.cell_root.join(path), build_files)
    }

    pub(crate) fn read_caches(&self) -> RwLockReadGuard<'_, ()> {
        self.caches_lock.read()
    }

    pub(crate) fn contains_raw_target(&self, target: &UnflavoredBuildTarget) -> bool {
        self.raw_targets.contains(target)
    }

    pub(crate) fn raw_node_cache(&self) -> &NodeCache<RawNodeKind> {
        &self.raw_node_cache
    }

    pub(crate) fn configured_node_cache(&self) -> &NodeCache<ConfiguredNodeKind> {
        &self.configured_node_cache
    }

    fn unflavored_target_for(
        &self,
        node: &RawTargetNode,
    ) -> Result<UnflavoredBuildTarget, TargetParseError> {
        let name = node
            .name()
            .ok_or_else(|| TargetParseError::MissingNameAttr {
                package: node.package.as_str().to_string(),
            })?;
        Ok(UnflavoredBuildTarget::new(
            self.cell_name.clone(),
            node.package.clone(),
            TargetName::new(name)?,
        ))
    }

    fn is_package_file(&self, path: &AbsPathBuf) -> bool {
        path.file_name() == Some(self.package_file_name.as_str())
    }

    fn invalidate_nodes_locked(&self, path: &AbsPathBuf, invalidate_build_targets: bool) -> u64 {
        let Some(manifest) = self.build_manifests.get(path) else {
            return 0;
        };
        let invalidated = manifest.targets.len() as u64;
        for node in manifest.targets.values() {
            // Cached manifests were validated on insertion.
            let Ok(target) = self.unflavored_target_for(node) else {
                continue;
            };
            debug!(path = %path, target = %target, "invalidating computed nodes");
            self.raw_node_cache.invalidate_for(&target);
            self.configured_node_cache.invalidate_for(&target);
            if invalidate_build_targets {
                self.raw_targets.remove(&target);
            }
        }
        invalidated
    }

    fn invalidate_path_locked(&self, path: &AbsPathBuf, invalidate_manifests: bool) -> u64 {
        // If `path` is a build file with a cached manifest, its own targets
        // go first.
        let mut invalidated = self.invalidate_nodes_locked(path, true);

        if invalidate_manifests {
            self.build_manifests.remove(path);
            self.package_manifests.remove(path);
        }

        let path_is_package_file = self.is_package_file(path);

        let dependents = self.build_file_dependents.dependents_of(path);
        if !dependents.is_empty() {
            trace!(path = %path, count = dependents.len(), "walking build file dependents");
        }
        for dependent in &dependents {
            if dependent == path {
                continue;
            }
            if path_is_package_file {
                // A package change alters the attributes injected into the
                // dependent build file's nodes, not its parse result: drop
                // the nodes, keep the manifest and its raw targets.
                invalidated += self.invalidate_nodes_locked(dependent, false);
            } else {
                invalidated += self.invalidate_path_locked(dependent, true);
            }
        }
        if !path_is_package_file {
            // Package files keep their dependent edges: the set of build
            // files affected by a package file is stable across a change to
            // its content.
            self.build_file_dependents.remove_dependents(path);
        }

        let dependents = self.package_file_dependents.dependents_of(path);
        for dependent in &dependents {
            if dependent == path {
                continue;
            }
            if path_is_package_file {
                // A parent package invalidates values a child inherited, but
                // never forces the child package file to be re-parsed.
                invalidated += self.invalidate_path_locked(dependent, false);
            } else {
                invalidated += self.invalidate_path_locked(dependent, true);
            }
        }
        if !path_is_package_file {
            self.package_file_dependents.remove_dependents(path);
        }

        invalidated
    }
}
