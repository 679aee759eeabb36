//! The parser's output data model.
//!
//! A *manifest* is the structured parse result of one build file or one
//! package file. Manifests are immutable once produced: the parser hands them
//! to the cell state, which shares them behind `Arc` and never mutates them.
//!
//! Everything here is serde-serializable because manifests cross the daemon's
//! RPC surface (external parser processes, tracing dumps).

mod build;
mod node;
mod package;

pub use build::{BuildFileManifest, GlobSpec, ManifestMetadata};
pub use node::{AttrMap, RawTargetNode};
pub use package::{PackageFileManifest, PackageMetadata};
