//! Conflict policies and target resolution.
//!
//! # Design
//! - One resolver for every mutation so moves, copies and uploads agree on
//!   naming.
//! - The numbered-suffix search is bounded; running out of candidates is a
//!   hard `Conflict` error.
//! - Candidates never exceed the filename limit: the stem is shortened first,
//!   then the extension, so the counter always survives.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{FsOpsError, FsOpsResult};
use crate::names::{MAX_FILENAME_BYTES, truncate_bytes};
use crate::sandbox::{PathSandbox, VirtualPath};
use crate::transfer::{entry_exists, remove_entry};

/// Highest `n` tried for `"<stem> (<n>)<ext>"`.
pub const MAX_RENAME_ATTEMPTS: u32 = 10_000;

/// Strategy for a target that already exists.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConflictPolicy {
    /// Remove the existing entry first.
    Overwrite,
    /// Pick the first free numbered sibling name.
    #[default]
    Rename,
    /// Leave the existing entry alone and do nothing.
    Skip,
}

impl ConflictPolicy {
    /// Lowercase name used on the wire.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Overwrite => "overwrite",
            Self::Rename => "rename",
            Self::Skip => "skip",
        }
    }
}

impl fmt::Display for ConflictPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ConflictPolicy {
    type Err = FsOpsError;

    /// Case-insensitive; blank input selects the default.
    fn from_str(raw: &str) -> FsOpsResult<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "" | "rename" => Ok(Self::Rename),
            "overwrite" => Ok(Self::Overwrite),
            "skip" => Ok(Self::Skip),
            _ => Err(FsOpsError::invalid_input(
                "conflict_policy",
                "must be one of overwrite|rename|skip",
                Some(raw.to_string()),
            )),
        }
    }
}

/// Decision returned by [`ConflictResolver::resolve`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// Proceed with the mutation at this (possibly renamed) path.
    Proceed(VirtualPath),
    /// The target exists and the policy is `skip`; do nothing.
    Skip,
}

/// Applies a [`ConflictPolicy`] to a desired target inside the sandbox.
#[derive(Debug, Clone)]
pub struct ConflictResolver {
    sandbox: PathSandbox,
}

impl ConflictResolver {
    /// Resolver bound to `sandbox`.
    #[must_use]
    pub const fn new(sandbox: PathSandbox) -> Self {
        Self { sandbox }
    }

    /// Decide where a mutation aimed at `desired` should land.
    ///
    /// With `overwrite` the existing entry is removed before returning.
    ///
    /// # Errors
    ///
    /// Returns [`FsOpsError::Conflict`] when every numbered candidate is
    /// taken, or the IO error from probing or removing an entry.
    pub fn resolve(
        &self,
        desired: &VirtualPath,
        policy: ConflictPolicy,
    ) -> FsOpsResult<Resolution> {
        let real = self.sandbox.real(desired)?;
        if !entry_exists(&real)? {
            return Ok(Resolution::Proceed(desired.clone()));
        }

        match policy {
            ConflictPolicy::Skip => {
                debug!(target = %desired, "target exists, skipping");
                Ok(Resolution::Skip)
            }
            ConflictPolicy::Overwrite => {
                debug!(target = %desired, "target exists, overwriting");
                remove_entry(&real)?;
                Ok(Resolution::Proceed(desired.clone()))
            }
            ConflictPolicy::Rename => self.next_free_name(desired).map(Resolution::Proceed),
        }
    }

    fn next_free_name(&self, desired: &VirtualPath) -> FsOpsResult<VirtualPath> {
        let parent = desired.parent().unwrap_or_else(VirtualPath::root);
        let name = desired.file_name().unwrap_or_default();
        let (stem, ext) = split_extension(name);

        for n in 1..=MAX_RENAME_ATTEMPTS {
            let candidate = parent.join(&numbered_name(stem, ext, n))?;
            if !entry_exists(&self.sandbox.real(&candidate)?)? {
                debug!(target = %desired, chosen = %candidate, "target exists, renamed");
                return Ok(candidate);
            }
        }

        Err(FsOpsError::Conflict {
            path: desired.to_string(),
            reason: "could not resolve unique target name",
            conflicts: Vec::new(),
        })
    }
}

/// `"<stem> (<n>)<ext>"`, shortened on character boundaries to fit one segment.
fn numbered_name(stem: &str, ext: &str, n: u32) -> String {
    let counter = format!(" ({n})");
    let ext = truncate_bytes(ext, MAX_FILENAME_BYTES.saturating_sub(counter.len() + 1));
    let stem = truncate_bytes(
        stem,
        MAX_FILENAME_BYTES.saturating_sub(counter.len() + ext.len()),
    );
    format!("{stem}{counter}{ext}")
}

/// Split at the last dot; a leading dot belongs to the stem.
fn split_extension(name: &str) -> (&str, &str) {
    match name.rfind('.') {
        Some(idx) if idx > 0 => name.split_at(idx),
        _ => (name, ""),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use std::error::Error;
    use std::fs;
    use tempfile::TempDir;

    type TestResult<T> = Result<T, Box<dyn Error>>;

    fn fixture() -> TestResult<(TempDir, PathSandbox, ConflictResolver)> {
        let temp = TempDir::new()?;
        let sandbox = PathSandbox::new(temp.path())?;
        let resolver = ConflictResolver::new(sandbox.clone());
        Ok((temp, sandbox, resolver))
    }

    #[test]
    fn policy_parsing_defaults_to_rename() -> TestResult<()> {
        assert_eq!("".parse::<ConflictPolicy>()?, ConflictPolicy::Rename);
        assert_eq!(" SKIP ".parse::<ConflictPolicy>()?, ConflictPolicy::Skip);
        assert_eq!(
            "Overwrite".parse::<ConflictPolicy>()?,
            ConflictPolicy::Overwrite
        );
        let err = "merge"
            .parse::<ConflictPolicy>()
            .err()
            .ok_or("expected rejection")?;
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert_eq!(ConflictPolicy::default(), ConflictPolicy::Rename);
        Ok(())
    }

    #[test]
    fn missing_target_is_returned_unchanged() -> TestResult<()> {
        let (_temp, _sandbox, resolver) = fixture()?;
        let desired = VirtualPath::parse("/report.pdf")?;
        for policy in [
            ConflictPolicy::Overwrite,
            ConflictPolicy::Rename,
            ConflictPolicy::Skip,
        ] {
            assert_eq!(
                resolver.resolve(&desired, policy)?,
                Resolution::Proceed(desired.clone())
            );
        }
        Ok(())
    }

    #[test]
    fn rename_picks_next_free_number() -> TestResult<()> {
        let (temp, _sandbox, resolver) = fixture()?;
        fs::write(temp.path().join("report.pdf"), b"v1")?;
        let desired = VirtualPath::parse("/report.pdf")?;

        assert_eq!(
            resolver.resolve(&desired, ConflictPolicy::Rename)?,
            Resolution::Proceed(VirtualPath::parse("/report (1).pdf")?)
        );

        fs::write(temp.path().join("report (1).pdf"), b"v2")?;
        assert_eq!(
            resolver.resolve(&desired, ConflictPolicy::Rename)?,
            Resolution::Proceed(VirtualPath::parse("/report (2).pdf")?)
        );
        Ok(())
    }

    #[test]
    fn rename_handles_dotless_and_hidden_names() -> TestResult<()> {
        let (temp, _sandbox, resolver) = fixture()?;
        fs::create_dir_all(temp.path().join("photos"))?;
        fs::write(temp.path().join(".profile"), b"")?;

        assert_eq!(
            resolver.resolve(&VirtualPath::parse("/photos")?, ConflictPolicy::Rename)?,
            Resolution::Proceed(VirtualPath::parse("/photos (1)")?)
        );
        assert_eq!(
            resolver.resolve(&VirtualPath::parse("/.profile")?, ConflictPolicy::Rename)?,
            Resolution::Proceed(VirtualPath::parse("/.profile (1)")?)
        );
        Ok(())
    }

    #[test]
    fn skip_leaves_target_untouched() -> TestResult<()> {
        let (temp, _sandbox, resolver) = fixture()?;
        fs::write(temp.path().join("a.txt"), b"keep")?;
        assert_eq!(
            resolver.resolve(&VirtualPath::parse("/a.txt")?, ConflictPolicy::Skip)?,
            Resolution::Skip
        );
        assert_eq!(fs::read(temp.path().join("a.txt"))?, b"keep");
        Ok(())
    }

    #[test]
    fn overwrite_removes_existing_tree() -> TestResult<()> {
        let (temp, _sandbox, resolver) = fixture()?;
        fs::create_dir_all(temp.path().join("dir").join("inner"))?;
        fs::write(temp.path().join("dir").join("inner").join("x"), b"x")?;
        let desired = VirtualPath::parse("/dir")?;

        assert_eq!(
            resolver.resolve(&desired, ConflictPolicy::Overwrite)?,
            Resolution::Proceed(desired.clone())
        );
        assert!(!temp.path().join("dir").exists());
        Ok(())
    }

    #[test]
    fn rename_shortens_long_names_to_fit() -> TestResult<()> {
        let (temp, _sandbox, resolver) = fixture()?;
        let name = format!("{}.txt", "b".repeat(250));
        fs::write(temp.path().join(&name), b"v1")?;

        let Resolution::Proceed(target) =
            resolver.resolve(&VirtualPath::parse(&name)?, ConflictPolicy::Rename)?
        else {
            return Err("expected a renamed target".into());
        };
        let chosen = target.file_name().ok_or("missing file name")?;
        assert_eq!(chosen.len(), MAX_FILENAME_BYTES);
        assert!(chosen.ends_with(" (1).txt"));
        assert!(chosen.starts_with("bbb"));
        Ok(())
    }

    #[test]
    fn numbered_names_keep_counter_and_char_boundaries() {
        assert_eq!(numbered_name("report", ".pdf", 3), "report (3).pdf");

        let stem = "ж".repeat(200);
        let name = numbered_name(&stem, ".txt", 12);
        assert!(name.len() <= MAX_FILENAME_BYTES);
        assert!(name.ends_with(" (12).txt"));

        let ext = format!(".{}", "x".repeat(300));
        let name = numbered_name("a", &ext, 1);
        assert!(name.len() <= MAX_FILENAME_BYTES);
        assert!(name.starts_with("a (1)."));
    }

    #[test]
    fn exhausted_candidates_are_a_conflict() -> TestResult<()> {
        let (temp, _sandbox, resolver) = fixture()?;
        fs::write(temp.path().join("f.txt"), b"")?;
        for n in 1..=MAX_RENAME_ATTEMPTS {
            fs::File::create(temp.path().join(format!("f ({n}).txt")))?;
        }

        let err = resolver
            .resolve(&VirtualPath::parse("/f.txt")?, ConflictPolicy::Rename)
            .err()
            .ok_or("expected exhaustion")?;
        assert_eq!(err.kind(), ErrorKind::Conflict);
        assert_eq!(err.to_string(), "could not resolve unique target name");

        fs::remove_file(temp.path().join("f (10000).txt"))?;
        assert_eq!(
            resolver.resolve(&VirtualPath::parse("/f.txt")?, ConflictPolicy::Rename)?,
            Resolution::Proceed(VirtualPath::parse("/f (10000).txt")?)
        );
        Ok(())
    }

    #[test]
    fn split_extension_uses_last_dot() {
        assert_eq!(split_extension("archive.tar.gz"), ("archive.tar", ".gz"));
        assert_eq!(split_extension("README"), ("README", ""));
        assert_eq!(split_extension(".env"), (".env", ""));
    }
}
