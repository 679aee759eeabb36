//! Computed target node values stored in the per-kind caches.

use smol_str::SmolStr;

use kiln_core::{BuildTarget, UnconfiguredBuildTarget};
use kiln_manifest::{AttrMap, RawTargetNode};

/// A target node after cell-context resolution, before configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct UnconfiguredTargetNode {
    pub target: UnconfiguredBuildTarget,
    pub rule_type: SmolStr,
    pub attrs: AttrMap,
    pub visibility: Vec<String>,
    pub within_view: Vec<String>,
}

impl UnconfiguredTargetNode {
    pub fn new(target: UnconfiguredBuildTarget, rule_type: impl Into<SmolStr>) -> Self {
        Self {
            target,
            rule_type: rule_type.into(),
            attrs: AttrMap::new(),
            visibility: Vec::new(),
            within_view: Vec::new(),
        }
    }

    /// Lifts a raw node into an unconfigured node for `target`.
    pub fn from_raw(target: UnconfiguredBuildTarget, raw: &RawTargetNode) -> Self {
        Self {
            target,
            rule_type: raw.rule_type.clone(),
            attrs: raw.attrs.clone(),
            visibility: raw.visibility.clone(),
            within_view: raw.within_view.clone(),
        }
    }
}

/// A fully configured target node.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfiguredTargetNode {
    pub target: BuildTarget,
    pub rule_type: SmolStr,
    pub attrs: AttrMap,
}

impl ConfiguredTargetNode {
    pub fn new(target: BuildTarget, rule_type: impl Into<SmolStr>) -> Self {
        Self {
            target,
            rule_type: rule_type.into(),
            attrs: AttrMap::new(),
        }
    }
}

/// Configuration can reveal that a target is incompatible with the requested
/// platform; the incompatibility is cached like any other resolution result.
#[derive(Debug, Clone, PartialEq)]
pub enum MaybeIncompatibleTargetNode {
    Compatible(ConfiguredTargetNode),
    Incompatible { target: BuildTarget, reason: String },
}

impl MaybeIncompatibleTargetNode {
    pub fn target(&self) -> &BuildTarget {
        match self {
            Self::Compatible(node) => &node.target,
            Self::Incompatible { target, .. } => target,
        }
    }

    pub fn compatible(&self) -> Option<&ConfiguredTargetNode> {
        match self {
            Self::Compatible(node) => Some(node),
            Self::Incompatible { .. } => None,
        }
    }
}
