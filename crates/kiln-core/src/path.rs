//! Path newtypes used by the parser state.
//!
//! `AbsPathBuf` is canonicalized on construction so that equality and hashing
//! are byte-exact; the caches key manifests by these paths and must never see
//! two spellings of the same file.

use std::fmt;
use std::path::{Component, Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PathError {
    #[error("path is not absolute: `{0}`")]
    NotAbsolute(PathBuf),
    #[error("path escapes the filesystem root: `{0}`")]
    EscapesRoot(PathBuf),
    #[error("`{path}` is not a forward relative path: {reason}")]
    NotForward { path: String, reason: &'static str },
}

/// An absolute file path, lexically normalized.
///
/// `.` components are dropped and `..` components are resolved against their
/// parent during construction. No filesystem access happens here; symlink
/// resolution is the watcher's problem.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "PathBuf", into = "PathBuf")]
pub struct AbsPathBuf(PathBuf);

impl AbsPathBuf {
    pub fn new(path: impl Into<PathBuf>) -> Result<Self, PathError> {
        let path = path.into();
        if !path.is_absolute() {
            return Err(PathError::NotAbsolute(path));
        }

        let mut normalized = PathBuf::new();
        for component in path.components() {
            match component {
                Component::Prefix(_) | Component::RootDir => {
                    normalized.push(component.as_os_str());
                }
                Component::CurDir => {}
                Component::ParentDir => {
                    if !normalized.pop() {
                        return Err(PathError::EscapesRoot(path));
                    }
                }
                Component::Normal(segment) => normalized.push(segment),
            }
        }
        Ok(Self(normalized))
    }

    pub fn as_path(&self) -> &Path {
        &self.0
    }

    /// The final path component, if it is valid UTF-8.
    pub fn file_name(&self) -> Option<&str> {
        self.0.file_name().and_then(|name| name.to_str())
    }

    /// Resolves a cell-relative path against this path.
    ///
    /// Forward relative paths contain no `.`/`..` components, so the result
    /// stays normalized.
    pub fn join(&self, rel: &ForwardRelPathBuf) -> AbsPathBuf {
        let mut joined = self.0.clone();
        for segment in rel.segments() {
            joined.push(segment);
        }
        AbsPathBuf(joined)
    }

    /// Appends a single path component. The component must be a bare file or
    /// directory name.
    pub fn join_component(&self, component: &str) -> AbsPathBuf {
        debug_assert!(!component.contains(['/', '\\']) && component != "." && component != "..");
        let mut joined = self.0.clone();
        joined.push(component);
        AbsPathBuf(joined)
    }
}

impl TryFrom<PathBuf> for AbsPathBuf {
    type Error = PathError;

    fn try_from(value: PathBuf) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<AbsPathBuf> for PathBuf {
    fn from(value: AbsPathBuf) -> Self {
        value.0
    }
}

impl AsRef<Path> for AbsPathBuf {
    fn as_ref(&self) -> &Path {
        &self.0
    }
}

impl fmt::Debug for AbsPathBuf {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("AbsPathBuf").field(&self.0).finish()
    }
}

impl fmt::Display for AbsPathBuf {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.display().fmt(f)
    }
}

/// A `/`-separated relative path with no `.` or `..` components.
///
/// Used for package paths within a cell. The empty path is the cell root
/// package.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ForwardRelPathBuf(String);

impl ForwardRelPathBuf {
    pub fn new(path: impl Into<String>) -> Result<Self, PathError> {
        let path = path.into();
        if path.is_empty() {
            return Ok(Self(path));
        }
        if path.starts_with('/') {
            return Err(PathError::NotForward {
                path,
                reason: "leading `/`",
            });
        }
        for segment in path.split('/') {
            let reason = match segment {
                "" => Some("empty segment"),
                "." | ".." => Some("dot segment"),
                _ => None,
            };
            if let Some(reason) = reason {
                return Err(PathError::NotForward { path, reason });
            }
        }
        Ok(Self(path))
    }

    pub fn empty() -> Self {
        Self(String::new())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.0.split('/').filter(|segment| !segment.is_empty())
    }
}

impl TryFrom<String> for ForwardRelPathBuf {
    type Error = PathError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<ForwardRelPathBuf> for String {
    fn from(value: ForwardRelPathBuf) -> Self {
        value.0
    }
}

impl fmt::Debug for ForwardRelPathBuf {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ForwardRelPathBuf").field(&self.0).finish()
    }
}

impl fmt::Display for ForwardRelPathBuf {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn abs_path_normalizes_dot_segments() {
        let a = AbsPathBuf::new("/repo/./path/to/../to/BUILD").unwrap();
        let b = AbsPathBuf::new("/repo/path/to/BUILD").unwrap();
        assert_eq!(a, b);
        assert_eq!(a.file_name(), Some("BUILD"));
    }

    #[test]
    fn abs_path_rejects_relative() {
        assert_eq!(
            AbsPathBuf::new("repo/BUILD"),
            Err(PathError::NotAbsolute(PathBuf::from("repo/BUILD")))
        );
    }

    #[test]
    fn abs_path_rejects_escaping_root() {
        assert!(matches!(
            AbsPathBuf::new("/../etc"),
            Err(PathError::EscapesRoot(_))
        ));
    }

    #[test]
    fn join_resolves_against_root() {
        let root = AbsPathBuf::new("/repo").unwrap();
        let rel = ForwardRelPathBuf::new("path/to").unwrap();
        assert_eq!(root.join(&rel), AbsPathBuf::new("/repo/path/to").unwrap());
        assert_eq!(root.join(&ForwardRelPathBuf::empty()), root);
    }

    #[test]
    fn forward_rel_path_rejects_dot_segments() {
        assert!(ForwardRelPathBuf::new("a/../b").is_err());
        assert!(ForwardRelPathBuf::new("/a/b").is_err());
        assert!(ForwardRelPathBuf::new("a//b").is_err());
        assert!(ForwardRelPathBuf::new("a/b").is_ok());
        assert!(ForwardRelPathBuf::new("").is_ok());
    }
}
