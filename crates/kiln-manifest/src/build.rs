use std::collections::{BTreeMap, BTreeSet};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;

use kiln_core::AbsPathBuf;

use crate::node::RawTargetNode;

/// One glob the parser evaluated while executing a build file, together with
/// its result. Re-evaluating the patterns against the current tree tells the
/// daemon whether a directory change altered the parse.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GlobSpec {
    pub include: Vec<String>,
    pub exclude: Vec<String>,
    pub include_dotfiles: bool,
    /// Paths the glob matched at parse time, package-relative, sorted.
    pub matches: BTreeSet<String>,
}

/// Configuration the parser read while executing a file.
///
/// Tracked so the daemon can tell whether a config change could alter the
/// parse result; the invalidation engine itself never inspects this.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestMetadata {
    /// `read_config`-style lookups and the values they observed (`None` for
    /// absent keys).
    pub configs: BTreeMap<String, Option<String>>,
    /// Environment variables the parse observed.
    pub env: BTreeMap<String, String>,
}

/// The structured parse result of one build file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BuildFileManifest {
    /// Declared rules keyed by short name, in declaration order.
    pub targets: IndexMap<SmolStr, RawTargetNode>,
    /// Files whose content the parse depended on (extension files, etc).
    pub includes: BTreeSet<AbsPathBuf>,
    pub globs: Vec<GlobSpec>,
    pub metadata: ManifestMetadata,
}

impl BuildFileManifest {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a rule, keyed by the node's `name` attribute when present.
    ///
    /// Nameless nodes are still recorded (under their rule type) so that a
    /// malformed manifest round-trips; deriving target identities from such a
    /// node fails at cache-insertion time instead.
    pub fn add_target(&mut self, node: RawTargetNode) {
        let key = node
            .name()
            .map(SmolStr::new)
            .unwrap_or_else(|| node.rule_type.clone());
        self.targets.insert(key, node);
    }
}
