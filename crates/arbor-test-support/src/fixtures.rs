//! Temporary directory layouts for engine tests.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tempfile::TempDir;

/// Storage, trash and thumbnail roots side by side in one temp dir.
///
/// The roots are siblings, so none lies inside the storage root. Everything
/// is removed when the fixture drops.
#[derive(Debug)]
pub struct SandboxFixture {
    temp: TempDir,
    storage: PathBuf,
    trash: PathBuf,
    thumbnails: PathBuf,
}

impl SandboxFixture {
    /// Create the temp dir and the storage and thumbnail roots.
    ///
    /// The trash root is left for the store under test to create.
    ///
    /// # Errors
    ///
    /// Returns an error if the temp dir or a root cannot be created.
    pub fn new() -> Result<Self> {
        let temp = TempDir::new().context("failed to create temp dir")?;
        let storage = temp.path().join("files");
        let trash = temp.path().join(".trash");
        let thumbnails = temp.path().join(".thumbnails");
        for dir in [&storage, &thumbnails] {
            fs::create_dir_all(dir)
                .with_context(|| format!("failed to create {}", dir.display()))?;
        }
        Ok(Self {
            temp,
            storage,
            trash,
            thumbnails,
        })
    }

    /// Root of the temp dir.
    #[must_use]
    pub fn base(&self) -> &Path {
        self.temp.path()
    }

    /// Sandbox root.
    #[must_use]
    pub fn storage(&self) -> &Path {
        &self.storage
    }

    /// Trash area.
    #[must_use]
    pub fn trash(&self) -> &Path {
        &self.trash
    }

    /// Thumbnail cache root.
    #[must_use]
    pub fn thumbnails(&self) -> &Path {
        &self.thumbnails
    }

    /// Location of a trash ledger file outside the storage root.
    #[must_use]
    pub fn ledger_path(&self) -> PathBuf {
        self.temp.path().join("trash-ledger.json")
    }

    /// Real path of `relative` inside the storage root.
    #[must_use]
    pub fn path(&self, relative: &str) -> PathBuf {
        self.storage.join(relative.trim_start_matches('/'))
    }

    /// Write a file under the storage root, creating parent directories.
    ///
    /// # Errors
    ///
    /// Returns an error if a directory or the file cannot be written.
    pub fn write(&self, relative: &str, contents: impl AsRef<[u8]>) -> Result<PathBuf> {
        let path = self.path(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        fs::write(&path, contents).with_context(|| format!("failed to write {}", path.display()))?;
        Ok(path)
    }

    /// Create a directory under the storage root.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created.
    pub fn mkdir(&self, relative: &str) -> Result<PathBuf> {
        let path = self.path(relative);
        fs::create_dir_all(&path).with_context(|| format!("failed to create {}", path.display()))?;
        Ok(path)
    }

    /// Read a file under the storage root.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read.
    pub fn read(&self, relative: &str) -> Result<Vec<u8>> {
        let path = self.path(relative);
        fs::read(&path).with_context(|| format!("failed to read {}", path.display()))
    }
}
