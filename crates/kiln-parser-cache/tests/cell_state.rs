use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;

use pretty_assertions::assert_eq;

use kiln_core::{
    AbsPathBuf, CellName, ConfigurationRef, ForwardRelPathBuf, UnconfiguredBuildTarget,
};
use kiln_manifest::{BuildFileManifest, PackageFileManifest, RawTargetNode};
use kiln_parser_cache::{
    Cell, CellState, ConfiguredNodeKind, ConfiguredTargetNode, MaybeIncompatibleTargetNode,
    RawNodeKind, UnconfiguredTargetNode,
};

fn abs(path: &str) -> AbsPathBuf {
    AbsPathBuf::new(path).unwrap()
}

fn rel(path: &str) -> ForwardRelPathBuf {
    ForwardRelPathBuf::new(path).unwrap()
}

fn root_state() -> CellState {
    CellState::new(Arc::new(Cell::new(CellName::root(), abs("/repo"))), 2)
}

fn build_manifest(package: &str, names: &[&str]) -> Arc<BuildFileManifest> {
    let package = rel(package);
    let mut manifest = BuildFileManifest::new();
    for name in names {
        manifest
            .add_target(RawTargetNode::new(package.clone(), "java_library").with_attr("name", *name));
    }
    Arc::new(manifest)
}

fn deps(paths: &[&AbsPathBuf]) -> BTreeSet<AbsPathBuf> {
    paths.iter().map(|path| (*path).clone()).collect()
}

fn raw_node(label: &str) -> Arc<UnconfiguredTargetNode> {
    let target = UnconfiguredBuildTarget::parse(label).unwrap();
    Arc::new(UnconfiguredTargetNode::new(target, "java_library"))
}

/// Seeds the raw-target set for `label` by caching a single-target build
/// manifest in the target's package.
fn populate_raw_node(state: &CellState, label: &str) -> AbsPathBuf {
    let target = UnconfiguredBuildTarget::parse(label).unwrap();
    let unflavored = target.unflavored();
    let build_file = state.cell().build_file_in(unflavored.package());
    state
        .put_build_manifest_if_absent(
            build_file.clone(),
            build_manifest(unflavored.package().as_str(), &[unflavored.name().as_str()]),
            &BTreeSet::new(),
        )
        .unwrap();
    build_file
}

#[test]
fn put_computed_node_if_absent_keeps_the_first_node() {
    let state = root_state();
    populate_raw_node(&state, "//path/to:target");

    let key = UnconfiguredBuildTarget::parse("//path/to:target").unwrap();
    let n1 = raw_node("//n1:n1");
    let n2 = raw_node("//n2:n2");

    let cache = state.cache::<RawNodeKind>();
    cache.put_if_absent(key.clone(), Arc::clone(&n1));
    let cached = cache.lookup(&key).expect("cached node was not found");
    assert!(Arc::ptr_eq(&cached, &n1));

    let kept = cache.put_if_absent(key.clone(), Arc::clone(&n2));
    assert!(Arc::ptr_eq(&kept, &n1));
    let cached = cache.lookup(&key).expect("cached node should survive a losing put");
    assert!(Arc::ptr_eq(&cached, &n1), "previously cached node should not be updated");
}

#[test]
fn cell_name_does_not_affect_invalidation() {
    let cell = Cell::new(CellName::new("xplat"), abs("/xplat"));
    let state = CellState::new(Arc::new(cell), 1);

    let key = UnconfiguredBuildTarget::parse("xplat//path/to:target").unwrap();
    let build_file = populate_raw_node(&state, "xplat//path/to:target");
    assert_eq!(build_file, abs("/xplat/path/to/BUILD"));

    let cache = state.cache::<RawNodeKind>();
    let n1 = raw_node("xplat//n1:n1");
    cache.put_if_absent(key.clone(), Arc::clone(&n1));
    assert!(Arc::ptr_eq(&cache.lookup(&key).unwrap(), &n1));

    // Re-inserting an equivalent manifest loses the race and changes nothing.
    state
        .put_build_manifest_if_absent(
            build_file.clone(),
            build_manifest("path/to", &["target"]),
            &BTreeSet::new(),
        )
        .unwrap();

    assert_eq!(
        state.invalidate_path(&build_file, true),
        1,
        "still only one invalidated node"
    );
    assert!(
        state.cache::<RawNodeKind>().lookup(&key).is_none(),
        "cell-named target should still be invalidated"
    );
}

#[test]
fn put_package_manifest_if_absent_discards_the_loser() {
    let state = root_state();
    let package_file = abs("/repo/path/to/PACKAGE");
    let manifest = Arc::new(PackageFileManifest::empty());

    let cached =
        state.put_package_manifest_if_absent(package_file.clone(), Arc::clone(&manifest), &deps(&[]));
    assert!(Arc::ptr_eq(&cached, &manifest));

    let mut secondary = PackageFileManifest::empty();
    secondary.package.visibility.push("//visibility:public".to_string());
    let secondary = Arc::new(secondary);

    let cached =
        state.put_package_manifest_if_absent(package_file.clone(), Arc::clone(&secondary), &deps(&[]));
    assert!(!Arc::ptr_eq(&cached, &secondary));
    assert!(Arc::ptr_eq(&cached, &manifest));
}

#[test]
fn lookup_package_manifest_round_trip() {
    let state = root_state();
    let package_file = abs("/repo/path/to/PACKAGE");

    assert!(state.lookup_package_manifest(&package_file).is_none());

    let manifest = Arc::new(PackageFileManifest::empty());
    state.put_package_manifest_if_absent(package_file.clone(), Arc::clone(&manifest), &deps(&[]));
    let cached = state.lookup_package_manifest(&package_file).unwrap();
    assert!(Arc::ptr_eq(&cached, &manifest));
}

#[test]
fn unrelated_path_invalidation_keeps_package_manifest() {
    let state = root_state();
    let package_file = abs("/repo/path/to/PACKAGE");
    let manifest = Arc::new(PackageFileManifest::empty());
    state.put_package_manifest_if_absent(package_file.clone(), Arc::clone(&manifest), &deps(&[]));

    state.invalidate_path(&abs("/repo/path/to/random.bzl"), true);
    assert!(state.lookup_package_manifest(&package_file).is_some());

    state.invalidate_path(&package_file, true);
    assert!(state.lookup_package_manifest(&package_file).is_none());
}

#[test]
fn dependent_invalidates_package_file_manifest() {
    let state = root_state();
    let package_file = abs("/repo/path/to/PACKAGE");
    let dependent_file = abs("/repo/path/to/pkg_dependent.bzl");

    let manifest = Arc::new(PackageFileManifest::empty());
    state.put_package_manifest_if_absent(
        package_file.clone(),
        Arc::clone(&manifest),
        &deps(&[&dependent_file]),
    );
    assert!(state.lookup_package_manifest(&package_file).is_some());

    state.invalidate_path(&dependent_file, true);
    assert!(state.lookup_package_manifest(&package_file).is_none());
}

#[test]
fn concurrent_puts_agree_on_a_single_winner() {
    let state = root_state();
    populate_raw_node(&state, "//race:target");
    let key = UnconfiguredBuildTarget::parse("//race:target").unwrap();

    let candidates: Vec<Arc<UnconfiguredTargetNode>> =
        (0..8).map(|i| raw_node(&format!("//race:n{i}"))).collect();

    let returned: Vec<Arc<UnconfiguredTargetNode>> = std::thread::scope(|scope| {
        let handles: Vec<_> = candidates
            .iter()
            .map(|node| {
                let state = &state;
                let key = key.clone();
                let node = Arc::clone(node);
                scope.spawn(move || state.cache::<RawNodeKind>().put_if_absent(key, node))
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    let winner = state.cache::<RawNodeKind>().lookup(&key).unwrap();
    assert!(candidates.iter().any(|c| Arc::ptr_eq(c, &winner)));
    for node in returned {
        assert!(
            Arc::ptr_eq(&node, &winner),
            "every put must observe the same winner"
        );
    }
}

#[test]
fn build_file_invalidation_reaches_every_cache_kind() {
    let state = root_state();
    let build_file = populate_raw_node(&state, "//lib:core");

    let unconfigured = UnconfiguredBuildTarget::parse("//lib:core").unwrap();
    let flavored = UnconfiguredBuildTarget::parse("//lib:core#shared").unwrap();
    let configured = unconfigured
        .clone()
        .configure(ConfigurationRef::new("linux-x86_64"));

    state
        .cache::<RawNodeKind>()
        .put_if_absent(unconfigured.clone(), raw_node("//lib:core"));
    state
        .cache::<RawNodeKind>()
        .put_if_absent(flavored.clone(), raw_node("//lib:core"));
    state.cache::<ConfiguredNodeKind>().put_if_absent(
        configured.clone(),
        Arc::new(MaybeIncompatibleTargetNode::Compatible(
            ConfiguredTargetNode::new(configured.clone(), "java_library"),
        )),
    );

    assert_eq!(state.invalidate_path(&build_file, true), 1);

    assert!(state.cache::<RawNodeKind>().lookup(&unconfigured).is_none());
    assert!(
        state.cache::<RawNodeKind>().lookup(&flavored).is_none(),
        "flavored variants share the unflavored parent's fate"
    );
    assert!(state.cache::<ConfiguredNodeKind>().lookup(&configured).is_none());
    assert!(state.lookup_build_manifest(&build_file).is_none());
}

#[test]
fn invalidation_is_idempotent_for_build_files() {
    let state = root_state();
    let build_file = populate_raw_node(&state, "//lib:core");

    assert_eq!(state.invalidate_path(&build_file, true), 1);
    assert_eq!(state.invalidate_path(&build_file, true), 0);
    assert!(state.lookup_build_manifest(&build_file).is_none());
}

#[test]
fn invalidating_an_unknown_path_is_a_no_op() {
    let state = root_state();
    assert_eq!(state.invalidate_path(&abs("/repo/nowhere/BUILD"), true), 0);
    assert_eq!(state.invalidate_path(&abs("/repo/nowhere/BUILD"), false), 0);
}

#[test]
fn include_change_invalidates_the_downstream_manifest() {
    let state = root_state();
    let defs = abs("/repo/defs.bzl");
    let build_file = abs("/repo/lib/BUILD");

    state
        .put_build_manifest_if_absent(
            build_file.clone(),
            build_manifest("lib", &["a", "b"]),
            &deps(&[&defs]),
        )
        .unwrap();

    let key = UnconfiguredBuildTarget::parse("//lib:a").unwrap();
    state
        .cache::<RawNodeKind>()
        .put_if_absent(key.clone(), raw_node("//lib:a"));

    assert_eq!(state.invalidate_path(&defs, true), 2);
    assert!(state.lookup_build_manifest(&build_file).is_none());
    assert!(state.cache::<RawNodeKind>().lookup(&key).is_none());

    // The edge from `defs.bzl` was consumed; a second change finds nothing.
    assert_eq!(state.invalidate_path(&defs, true), 0);
}

#[test]
fn include_changes_cascade_transitively() {
    let state = root_state();
    let defs = abs("/repo/defs.bzl");
    let build_a = abs("/repo/a/BUILD");
    let build_b = abs("/repo/b/BUILD");

    // b's parse depends on a, a's parse depends on defs.bzl.
    state
        .put_build_manifest_if_absent(build_a.clone(), build_manifest("a", &["a"]), &deps(&[&defs]))
        .unwrap();
    state
        .put_build_manifest_if_absent(
            build_b.clone(),
            build_manifest("b", &["b1", "b2"]),
            &deps(&[&build_a]),
        )
        .unwrap();

    assert_eq!(state.invalidate_path(&defs, true), 3);
    assert!(state.lookup_build_manifest(&build_a).is_none());
    assert!(state.lookup_build_manifest(&build_b).is_none());
}

#[test]
fn package_change_spares_dependent_build_manifests() {
    let state = root_state();
    let package_file = abs("/repo/lib/PACKAGE");
    let build_file = abs("/repo/lib/BUILD");

    state
        .put_build_manifest_if_absent(
            build_file.clone(),
            build_manifest("lib", &["core"]),
            &deps(&[&package_file]),
        )
        .unwrap();

    let key = UnconfiguredBuildTarget::parse("//lib:core").unwrap();
    state
        .cache::<RawNodeKind>()
        .put_if_absent(key.clone(), raw_node("//lib:core"));

    assert_eq!(state.invalidate_path(&package_file, true), 1);

    // The injected attributes changed, so the node is gone; the parse result
    // and its raw targets are not.
    assert!(state.cache::<RawNodeKind>().lookup(&key).is_none());
    assert!(state.lookup_build_manifest(&build_file).is_some());
    state
        .cache::<RawNodeKind>()
        .put_if_absent(key.clone(), raw_node("//lib:core"));

    // Package files keep their dependent edges: a second package change
    // invalidates the re-resolved node again.
    assert_eq!(state.invalidate_path(&package_file, true), 1);
    assert!(state.cache::<RawNodeKind>().lookup(&key).is_none());
}

#[test]
fn parent_package_invalidation_keeps_the_child_manifest() {
    let state = root_state();
    let parent = abs("/repo/PACKAGE");
    let child = abs("/repo/lib/PACKAGE");

    state.put_package_manifest_if_absent(
        parent.clone(),
        Arc::new(PackageFileManifest::empty()),
        &deps(&[]),
    );
    let mut child_manifest = PackageFileManifest::empty();
    child_manifest.parents.insert(parent.clone());
    state.put_package_manifest_if_absent(child.clone(), Arc::new(child_manifest), &deps(&[&parent]));

    assert_eq!(state.invalidate_path(&parent, true), 0);
    assert!(state.lookup_package_manifest(&parent).is_none());
    assert!(
        state.lookup_package_manifest(&child).is_some(),
        "a parent package change must not force a re-parse of the child"
    );
}

#[test]
fn path_dependent_present_in_sees_registered_edges() {
    let state = root_state();
    let defs = abs("/repo/tools/defs.bzl");
    let build_file = abs("/repo/lib/BUILD");

    state
        .put_build_manifest_if_absent(
            build_file.clone(),
            build_manifest("lib", &["core"]),
            &deps(&[&defs]),
        )
        .unwrap();

    let candidates: HashSet<AbsPathBuf> = [build_file.clone()].into_iter().collect();
    let unrelated: HashSet<AbsPathBuf> = [abs("/repo/other/BUILD")].into_iter().collect();

    assert!(state.path_dependent_present_in(&rel("tools/defs.bzl"), &candidates));
    assert!(!state.path_dependent_present_in(&rel("tools/defs.bzl"), &unrelated));
    assert!(!state.path_dependent_present_in(&rel("tools/other.bzl"), &candidates));
}

#[test]
fn losing_build_manifest_insert_does_not_register_dependents() {
    let state = root_state();
    let first_dep = abs("/repo/first.bzl");
    let second_dep = abs("/repo/second.bzl");
    let build_file = abs("/repo/lib/BUILD");

    let winner = state
        .put_build_manifest_if_absent(
            build_file.clone(),
            build_manifest("lib", &["core"]),
            &deps(&[&first_dep]),
        )
        .unwrap();
    let loser = state
        .put_build_manifest_if_absent(
            build_file.clone(),
            build_manifest("lib", &["core"]),
            &deps(&[&second_dep]),
        )
        .unwrap();
    assert!(Arc::ptr_eq(&winner, &loser));

    // Only the winner's dependents were recorded.
    assert_eq!(state.invalidate_path(&second_dep, true), 0);
    assert!(state.lookup_build_manifest(&build_file).is_some());
    assert_eq!(state.invalidate_path(&first_dep, true), 1);
    assert!(state.lookup_build_manifest(&build_file).is_none());
}

#[test]
fn malformed_manifest_insert_leaves_the_state_unchanged() {
    let state = root_state();
    let build_file = abs("/repo/lib/BUILD");
    let defs = abs("/repo/defs.bzl");

    let mut manifest = BuildFileManifest::new();
    manifest.add_target(RawTargetNode::new(rel("lib"), "java_library")); // no `name`
    let result =
        state.put_build_manifest_if_absent(build_file.clone(), Arc::new(manifest), &deps(&[&defs]));

    assert!(result.is_err());
    assert!(state.lookup_build_manifest(&build_file).is_none());
    assert_eq!(state.invalidate_path(&defs, true), 0, "no dependent edges were recorded");
}

#[test]
#[should_panic(expected = "no raw target backing it")]
fn computed_node_without_raw_target_fails_loudly() {
    let state = root_state();
    let key = UnconfiguredBuildTarget::parse("//never/parsed:target").unwrap();
    state
        .cache::<RawNodeKind>()
        .put_if_absent(key, raw_node("//never/parsed:target"));
}

#[test]
fn invalidated_raw_targets_reject_new_computed_nodes() {
    let state = root_state();
    let build_file = populate_raw_node(&state, "//lib:core");
    let key = UnconfiguredBuildTarget::parse("//lib:core").unwrap();

    state.invalidate_path(&build_file, true);

    let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
        state
            .cache::<RawNodeKind>()
            .put_if_absent(key.clone(), raw_node("//lib:core"));
    }));
    assert!(
        result.is_err(),
        "the raw target was invalidated with the manifest; the insert must panic"
    );

    // Re-inserting the manifest re-seeds the raw target and the insert works.
    populate_raw_node(&state, "//lib:core");
    state
        .cache::<RawNodeKind>()
        .put_if_absent(key.clone(), raw_node("//lib:core"));
    assert!(state.cache::<RawNodeKind>().lookup(&key).is_some());
}

#[test]
fn invalidate_nodes_in_path_keeps_manifest_and_raw_targets() {
    let state = root_state();
    let build_file = populate_raw_node(&state, "//lib:core");
    let key = UnconfiguredBuildTarget::parse("//lib:core").unwrap();
    state
        .cache::<RawNodeKind>()
        .put_if_absent(key.clone(), raw_node("//lib:core"));

    assert_eq!(state.invalidate_nodes_in_path(&build_file, false), 1);

    assert!(state.cache::<RawNodeKind>().lookup(&key).is_none());
    assert!(state.lookup_build_manifest(&build_file).is_some());
    // Raw targets survived, so re-inserting the node is legal.
    state
        .cache::<RawNodeKind>()
        .put_if_absent(key.clone(), raw_node("//lib:core"));
}

#[test]
fn cell_descriptor_is_swappable_without_dropping_caches() {
    let state = root_state();
    let build_file = populate_raw_node(&state, "//lib:core");

    let reloaded = Arc::new(Cell::new(CellName::root(), abs("/repo")));
    state.set_cell(Arc::clone(&reloaded));

    assert!(Arc::ptr_eq(&state.cell(), &reloaded));
    assert_eq!(state.cell_root(), &abs("/repo"));
    assert!(state.lookup_build_manifest(&build_file).is_some());
}
