//! Assertions over directory trees.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use walkdir::WalkDir;

/// What a snapshot records for one entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TreeEntry {
    /// A directory.
    Dir,
    /// A regular file and its bytes.
    File(Vec<u8>),
    /// A symbolic link and its target.
    Link(String),
}

/// Every entry below `root`, keyed by its `/`-separated relative path.
///
/// Links are recorded, never followed. Compare two snapshots to assert that
/// an operation left a tree untouched.
///
/// # Errors
///
/// Returns an error if the tree cannot be walked or a file cannot be read.
pub fn snapshot_tree(root: &Path) -> Result<BTreeMap<String, TreeEntry>> {
    let mut snapshot = BTreeMap::new();
    if !root.exists() {
        return Ok(snapshot);
    }
    for entry in WalkDir::new(root).min_depth(1).follow_links(false) {
        let entry = entry.with_context(|| format!("failed to walk {}", root.display()))?;
        let relative = entry
            .path()
            .strip_prefix(root)
            .context("walk escaped the snapshot root")?
            .components()
            .map(|component| component.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        let file_type = entry.file_type();
        let value = if file_type.is_dir() {
            TreeEntry::Dir
        } else if file_type.is_symlink() {
            let target = fs::read_link(entry.path())
                .with_context(|| format!("failed to read link {}", entry.path().display()))?;
            TreeEntry::Link(target.display().to_string())
        } else {
            TreeEntry::File(
                fs::read(entry.path())
                    .with_context(|| format!("failed to read {}", entry.path().display()))?,
            )
        };
        snapshot.insert(relative, value);
    }
    Ok(snapshot)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn snapshot_captures_dirs_and_contents() -> Result<()> {
        let temp = TempDir::new()?;
        fs::create_dir_all(temp.path().join("a/b"))?;
        fs::write(temp.path().join("a/b/c.txt"), b"c")?;

        let snapshot = snapshot_tree(temp.path())?;
        assert_eq!(snapshot.get("a"), Some(&TreeEntry::Dir));
        assert_eq!(snapshot.get("a/b/c.txt"), Some(&TreeEntry::File(b"c".to_vec())));
        assert_eq!(snapshot.len(), 3);

        fs::write(temp.path().join("a/b/c.txt"), b"changed")?;
        assert_ne!(snapshot_tree(temp.path())?, snapshot);
        Ok(())
    }

    #[test]
    fn missing_root_is_empty() -> Result<()> {
        let temp = TempDir::new()?;
        assert!(snapshot_tree(&temp.path().join("absent"))?.is_empty());
        Ok(())
    }
}
