//! Virtual path parsing and confinement to the storage root.
//!
//! # Design
//! - Any `..` segment is rejected outright, before cleaning, so cancelling
//!   sequences such as `a/../..` never reach the join.
//! - Containment is re-checked on the joined real path as a second,
//!   independent guard.
//! - Resolution is a pure function of `(root, virtual path)`; nothing here
//!   touches the filesystem.

use std::fmt;
use std::path::{Component, Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{FsOpsError, FsOpsResult};

/// Cleaned, slash-separated path rooted at `/`.
///
/// Never contains `..` segments, empty segments, NUL bytes or control
/// characters. Equality is byte equality of the cleaned form.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct VirtualPath(String);

impl VirtualPath {
    /// The sandbox root, `/`.
    #[must_use]
    pub fn root() -> Self {
        Self("/".to_string())
    }

    /// Normalise and validate client input.
    ///
    /// Whitespace is trimmed and backslashes become forward slashes. Empty
    /// input and `/` denote the root.
    ///
    /// # Errors
    ///
    /// Returns [`FsOpsError::InvalidPath`] for NUL bytes or control characters
    /// and [`FsOpsError::PathTraversal`] when any segment is `..`.
    pub fn parse(raw: &str) -> FsOpsResult<Self> {
        let normalized = raw.trim().replace('\\', "/");
        if normalized.is_empty() || normalized == "/" {
            return Ok(Self::root());
        }

        if normalized.contains('\0') {
            return Err(FsOpsError::InvalidPath {
                path: normalized,
                reason: "path contains null bytes",
            });
        }
        if normalized.chars().any(char::is_control) {
            return Err(FsOpsError::InvalidPath {
                path: normalized,
                reason: "path contains control characters",
            });
        }

        if normalized.split('/').any(|segment| segment == "..") {
            return Err(FsOpsError::PathTraversal { path: normalized });
        }

        let segments: Vec<&str> = normalized
            .split('/')
            .filter(|segment| !segment.is_empty() && *segment != ".")
            .collect();
        if segments.is_empty() {
            return Ok(Self::root());
        }
        Ok(Self(format!("/{}", segments.join("/"))))
    }

    /// The cleaned string form.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether this is the sandbox root.
    #[must_use]
    pub fn is_root(&self) -> bool {
        self.0 == "/"
    }

    /// Final segment, or `None` for the root.
    #[must_use]
    pub fn file_name(&self) -> Option<&str> {
        if self.is_root() {
            return None;
        }
        self.0.rsplit('/').next()
    }

    /// Containing directory, or `None` for the root.
    #[must_use]
    pub fn parent(&self) -> Option<Self> {
        if self.is_root() {
            return None;
        }
        match self.0.rfind('/') {
            Some(0) | None => Some(Self::root()),
            Some(idx) => Some(Self(self.0[..idx].to_string())),
        }
    }

    /// Append one or more segments, re-validating the result.
    ///
    /// # Errors
    ///
    /// Propagates the same errors as [`VirtualPath::parse`].
    pub fn join(&self, child: &str) -> FsOpsResult<Self> {
        Self::parse(&format!("{}/{child}", self.0))
    }

    /// Whether `self` lies strictly below `ancestor`.
    #[must_use]
    pub fn is_descendant_of(&self, ancestor: &Self) -> bool {
        if ancestor.is_root() {
            return !self.is_root();
        }
        self.0
            .strip_prefix(ancestor.as_str())
            .is_some_and(|rest| rest.starts_with('/'))
    }

    fn segments(&self) -> impl Iterator<Item = &str> {
        self.0.split('/').filter(|segment| !segment.is_empty())
    }
}

impl fmt::Display for VirtualPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for VirtualPath {
    type Err = FsOpsError;

    fn from_str(raw: &str) -> FsOpsResult<Self> {
        Self::parse(raw)
    }
}

impl TryFrom<String> for VirtualPath {
    type Error = FsOpsError;

    fn try_from(raw: String) -> FsOpsResult<Self> {
        Self::parse(&raw)
    }
}

impl From<VirtualPath> for String {
    fn from(path: VirtualPath) -> Self {
        path.0
    }
}

/// Maps virtual paths to real paths confined to one storage root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathSandbox {
    root: PathBuf,
}

impl PathSandbox {
    /// Anchor a sandbox at `root`, made absolute and lexically cleaned.
    ///
    /// The directory does not need to exist yet.
    ///
    /// # Errors
    ///
    /// Returns an IO error when the current directory cannot be determined
    /// for a relative root.
    pub fn new(root: impl AsRef<Path>) -> FsOpsResult<Self> {
        let root = root.as_ref();
        let absolute = std::path::absolute(root)
            .map_err(|source| FsOpsError::io("sandbox.absolute", root, source))?;
        Ok(Self {
            root: lexical_clean(&absolute),
        })
    }

    /// The absolute storage root.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Parse client input into a [`VirtualPath`].
    ///
    /// # Errors
    ///
    /// See [`VirtualPath::parse`].
    pub fn parse(&self, raw: &str) -> FsOpsResult<VirtualPath> {
        VirtualPath::parse(raw)
    }

    /// Resolve client input straight to a real path.
    ///
    /// # Errors
    ///
    /// Returns [`FsOpsError::InvalidPath`] or [`FsOpsError::PathTraversal`].
    pub fn resolve(&self, raw: &str) -> FsOpsResult<PathBuf> {
        self.real(&VirtualPath::parse(raw)?)
    }

    /// Real location of an already-parsed virtual path.
    ///
    /// # Errors
    ///
    /// Returns [`FsOpsError::PathTraversal`] if the joined path is not the
    /// root or a descendant of it.
    pub fn real(&self, path: &VirtualPath) -> FsOpsResult<PathBuf> {
        let mut real = self.root.clone();
        for segment in path.segments() {
            real.push(segment);
        }
        if !self.contains(&real) {
            return Err(FsOpsError::PathTraversal {
                path: path.to_string(),
            });
        }
        Ok(real)
    }

    /// Whether `candidate` is the root or strictly below it.
    #[must_use]
    pub fn contains(&self, candidate: &Path) -> bool {
        // Component-wise, so `/data-other` is not inside `/data`.
        candidate.starts_with(&self.root)
            && !candidate
                .components()
                .any(|component| matches!(component, Component::ParentDir))
    }
}

fn lexical_clean(path: &Path) -> PathBuf {
    let mut cleaned = PathBuf::new();
    for component in path.components() {
        match component {
            Component::ParentDir => {
                cleaned.pop();
            }
            Component::CurDir => {}
            other => cleaned.push(other),
        }
    }
    cleaned
}
