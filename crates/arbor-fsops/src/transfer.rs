//! Relocation and recursive copy primitives shared by moves, trash and copies.
//!
//! # Design
//! - `relocate` is the single primitive behind moves, soft deletes and
//!   restores; a plain rename when possible, copy then remove across devices.
//! - Traversals never follow symbolic links. Copies skip them; cross-device
//!   relocation recreates the link itself so nothing is lost from the tree.
//! - Only regular files are read; sockets, FIFOs and devices are skipped.

use std::fs;
use std::io;
use std::path::Path;

use tracing::debug;
use walkdir::WalkDir;

use crate::error::{FsOpsError, FsOpsResult};

/// What to do with symbolic links met during a recursive copy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkHandling {
    /// Leave them out of the copy.
    Skip,
    /// Recreate the link (not its target) at the destination.
    Preserve,
}

/// Totals from a recursive copy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CopyStats {
    /// Regular files copied.
    pub files: u64,
    /// Directories created.
    pub directories: u64,
    /// Bytes copied.
    pub bytes: u64,
    /// Symbolic links and special files left out.
    pub skipped: u64,
}

/// Whether anything occupies `path`, without following a final symlink.
pub(crate) fn entry_exists(path: &Path) -> FsOpsResult<bool> {
    match fs::symlink_metadata(path) {
        Ok(_) => Ok(true),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(err) => Err(FsOpsError::io("entry.stat", path, err)),
    }
}

/// Remove a file, link or directory tree. A missing entry is not an error.
pub(crate) fn remove_entry(path: &Path) -> FsOpsResult<()> {
    let metadata = match fs::symlink_metadata(path) {
        Ok(metadata) => metadata,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(()),
        Err(err) => return Err(FsOpsError::io("entry.stat", path, err)),
    };
    let removed = if metadata.is_dir() {
        fs::remove_dir_all(path)
    } else {
        fs::remove_file(path)
    };
    match removed {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(FsOpsError::io("entry.remove", path, err)),
    }
}

/// Move `from` to `to`, creating the destination's parent directories.
///
/// Falls back to copy-then-remove when the two paths are on different
/// devices. That fallback is not atomic: a failure part way through leaves
/// the source intact and removes whatever was written at `to`.
///
/// # Errors
///
/// Returns the classified IO error from the rename or the fallback.
pub fn relocate(from: &Path, to: &Path) -> FsOpsResult<()> {
    if let Some(parent) = to.parent() {
        fs::create_dir_all(parent)
            .map_err(|err| FsOpsError::io("relocate.create_parent", parent, err))?;
    }

    match fs::rename(from, to) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == io::ErrorKind::CrossesDevices => {
            debug!(from = %from.display(), to = %to.display(), "cross-device relocate, copying");
            if let Err(copy_err) = copy_tree(from, to, LinkHandling::Preserve) {
                let _ = remove_entry(to);
                return Err(copy_err);
            }
            remove_entry(from)
        }
        Err(err) => Err(FsOpsError::io("relocate.rename", from, err)),
    }
}

/// Copy `from` to `to` recursively without following symbolic links.
///
/// A symlink at `from` itself is refused.
///
/// # Errors
///
/// Returns [`FsOpsError::Unsupported`] when `from` is a link or special
/// file, otherwise the first IO or traversal error.
pub fn copy_tree(from: &Path, to: &Path, links: LinkHandling) -> FsOpsResult<CopyStats> {
    let metadata =
        fs::symlink_metadata(from).map_err(|err| FsOpsError::io("copy.stat", from, err))?;
    let mut stats = CopyStats::default();

    if metadata.file_type().is_symlink() {
        if links == LinkHandling::Preserve {
            copy_link(from, to, &mut stats)?;
            return Ok(stats);
        }
        return Err(FsOpsError::Unsupported {
            operation: "copy",
            reason: "symbolic links cannot be copied",
            value: Some(from.display().to_string()),
        });
    }

    if metadata.is_file() {
        if let Some(parent) = to.parent() {
            fs::create_dir_all(parent)
                .map_err(|err| FsOpsError::io("copy.create_parent", parent, err))?;
        }
        stats.bytes += fs::copy(from, to).map_err(|err| FsOpsError::io("copy.file", to, err))?;
        stats.files += 1;
        return Ok(stats);
    }

    if !metadata.is_dir() {
        return Err(FsOpsError::Unsupported {
            operation: "copy",
            reason: "special files cannot be copied",
            value: Some(from.display().to_string()),
        });
    }

    for entry in WalkDir::new(from).follow_links(false) {
        let entry = entry.map_err(|err| FsOpsError::walkdir("copy.walk", from, err))?;
        let relative = entry.path().strip_prefix(from).map_err(|_| {
            FsOpsError::invalid_input(
                "source_path",
                "entry escaped the copy root",
                Some(entry.path().display().to_string()),
            )
        })?;
        let target = to.join(relative);
        let file_type = entry.file_type();

        if file_type.is_dir() {
            fs::create_dir_all(&target)
                .map_err(|err| FsOpsError::io("copy.create_dir", &target, err))?;
            stats.directories += 1;
        } else if file_type.is_file() {
            stats.bytes += fs::copy(entry.path(), &target)
                .map_err(|err| FsOpsError::io("copy.file", &target, err))?;
            stats.files += 1;
        } else if file_type.is_symlink() && links == LinkHandling::Preserve {
            copy_link(entry.path(), &target, &mut stats)?;
        } else {
            debug!(path = %entry.path().display(), "skipping non-regular entry");
            stats.skipped += 1;
        }
    }

    Ok(stats)
}

#[cfg(unix)]
fn copy_link(from: &Path, to: &Path, _stats: &mut CopyStats) -> FsOpsResult<()> {
    let target = fs::read_link(from).map_err(|err| FsOpsError::io("copy.read_link", from, err))?;
    std::os::unix::fs::symlink(&target, to).map_err(|err| FsOpsError::io("copy.symlink", to, err))
}

#[cfg(not(unix))]
fn copy_link(from: &Path, _to: &Path, stats: &mut CopyStats) -> FsOpsResult<()> {
    debug!(path = %from.display(), "symbolic links are not recreated on this platform");
    stats.skipped += 1;
    Ok(())
}
