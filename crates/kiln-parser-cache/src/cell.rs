use smol_str::SmolStr;

use kiln_core::{AbsPathBuf, CellName, ForwardRelPathBuf};

pub const DEFAULT_BUILD_FILE_NAME: &str = "BUILD";
pub const DEFAULT_PACKAGE_FILE_NAME: &str = "PACKAGE";

/// A cell descriptor: a named, rooted subtree of the repository with its own
/// file-naming configuration.
///
/// `CellState` caches the root and canonical name at construction; the
/// descriptor itself can be swapped on reconfiguration without rebuilding the
/// caches (see [`crate::CellState::set_cell`]).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cell {
    name: CellName,
    root: AbsPathBuf,
    build_file_name: SmolStr,
    package_file_name: SmolStr,
}

impl Cell {
    pub fn new(name: CellName, root: AbsPathBuf) -> Self {
        Self {
            name,
            root,
            build_file_name: SmolStr::new_static(DEFAULT_BUILD_FILE_NAME),
            package_file_name: SmolStr::new_static(DEFAULT_PACKAGE_FILE_NAME),
        }
    }

    /// Overrides the configured file names. Both must be bare file names, not
    /// paths.
    pub fn with_file_names(
        mut self,
        build_file_name: impl Into<SmolStr>,
        package_file_name: impl Into<SmolStr>,
    ) -> Self {
        self.build_file_name = build_file_name.into();
        self.package_file_name = package_file_name.into();
        debug_assert!(!self.build_file_name.contains(['/', '\\']));
        debug_assert!(!self.package_file_name.contains(['/', '\\']));
        self
    }

    pub fn name(&self) -> &CellName {
        &self.name
    }

    pub fn root(&self) -> &AbsPathBuf {
        &self.root
    }

    pub fn build_file_name(&self) -> &str {
        &self.build_file_name
    }

    pub fn package_file_name(&self) -> &str {
        &self.package_file_name
    }

    pub(crate) fn package_file_name_smol(&self) -> SmolStr {
        self.package_file_name.clone()
    }

    /// Absolute path of the build file for `package`.
    pub fn build_file_in(&self, package: &ForwardRelPathBuf) -> AbsPathBuf {
        self.root.join(package).join_component(&self.build_file_name)
    }

    /// Absolute path of the package file for `package`.
    pub fn package_file_in(&self, package: &ForwardRelPathBuf) -> AbsPathBuf {
        self.root
            .join(package)
            .join_component(&self.package_file_name)
    }
}
