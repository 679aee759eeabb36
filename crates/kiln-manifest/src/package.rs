use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use kiln_core::AbsPathBuf;

use crate::node::AttrMap;

/// Metadata a package file injects into the targets of sibling and descendant
/// build files.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageMetadata {
    pub visibility: Vec<String>,
    pub within_view: Vec<String>,
}

/// The structured parse result of one package file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PackageFileManifest {
    pub package: PackageMetadata,
    /// Parent package files whose values this one inherits from.
    pub parents: BTreeSet<AbsPathBuf>,
    pub attrs: AttrMap,
    /// Files whose content the parse depended on.
    pub includes: BTreeSet<AbsPathBuf>,
}

impl PackageFileManifest {
    /// The common case: a package file contributing nothing.
    pub fn empty() -> Self {
        Self::default()
    }
}
