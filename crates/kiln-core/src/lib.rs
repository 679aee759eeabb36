//! Shared, dependency-minimized core types used across kiln.
//!
//! This crate defines the vocabulary the rest of the daemon speaks:
//! - canonicalized absolute paths and forward relative paths
//! - cell and target names
//! - the three levels of target identity (unflavored, unconfigured,
//!   configured) and the projections between them

pub mod path;
pub mod target;

pub use path::{AbsPathBuf, ForwardRelPathBuf, PathError};
pub use target::{
    BuildTarget, CellName, ConfigurationRef, Flavor, FlavorSet, TargetName, TargetParseError,
    UnconfiguredBuildTarget, UnflavoredBuildTarget,
};
