//! Zip reading and writing for compress and decompress.
//!
//! # Design
//! - Entry names always use `/` and directories end in `/`, whatever the host.
//! - Every entry name of an archive is validated before the first byte is
//!   written, so a zip-slip entry anywhere in the archive aborts the whole
//!   extraction with nothing on disk.
//! - Writing never follows symbolic links and never includes the archive
//!   being written.

use std::fs::{self, File};
use std::io;
use std::path::{Component, Path, PathBuf};

use tracing::debug;
use walkdir::WalkDir;
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::error::{FsOpsError, FsOpsResult};
use crate::sandbox::VirtualPath;
use crate::transfer::remove_entry;

/// Totals for a written archive.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ArchiveSummary {
    /// Entries written, directories included.
    pub entries: usize,
    /// Size of the finished archive in bytes.
    pub size: u64,
}

/// A validated archive entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveEntry {
    /// Relative path, `/`-separated, without a trailing slash.
    pub path: String,
    /// Whether the entry is a directory.
    pub is_dir: bool,
}

impl ArchiveEntry {
    /// Path as reported to callers; directories keep their trailing slash.
    #[must_use]
    pub fn display_name(&self) -> String {
        if self.is_dir {
            format!("{}/", self.path)
        } else {
            self.path.clone()
        }
    }

    fn target(&self, destination: &Path) -> PathBuf {
        let mut target = destination.to_path_buf();
        target.extend(self.path.split('/'));
        target
    }
}

/// Create a new archive at `output` holding every path in `sources`.
///
/// A directory source is stored under its own name with its whole subtree; a
/// file source is stored by its basename. Symbolic links and special files
/// below a directory source are left out. On failure the partial archive is
/// removed.
///
/// # Errors
///
/// Returns [`FsOpsError::AlreadyExists`] when `output` exists,
/// [`FsOpsError::Unsupported`] for a symbolic-link source, or the first IO,
/// traversal or archive error.
pub fn write_zip(output: &Path, sources: &[PathBuf]) -> FsOpsResult<ArchiveSummary> {
    let file =
        File::create_new(output).map_err(|err| FsOpsError::io("zip.create", output, err))?;
    let mut writer = ZipWriter::new(file);

    let written = sources
        .iter()
        .try_fold(0, |count, source| {
            add_source(&mut writer, output, source).map(|added| count + added)
        })
        .and_then(|entries| {
            writer
                .finish()
                .map_err(|err| FsOpsError::zip("zip.finish", output, err))?;
            Ok(entries)
        });

    match written {
        Ok(entries) => {
            let size = fs::metadata(output)
                .map_err(|err| FsOpsError::io("zip.stat", output, err))?
                .len();
            Ok(ArchiveSummary { entries, size })
        }
        Err(err) => {
            drop(writer);
            let _ = remove_entry(output);
            Err(err)
        }
    }
}

fn add_source(
    writer: &mut ZipWriter<File>,
    output: &Path,
    source: &Path,
) -> FsOpsResult<usize> {
    let metadata =
        fs::symlink_metadata(source).map_err(|err| FsOpsError::io("zip.stat", source, err))?;
    if metadata.file_type().is_symlink() {
        return Err(FsOpsError::Unsupported {
            operation: "compress",
            reason: "symbolic links cannot be archived",
            value: Some(source.display().to_string()),
        });
    }

    let base = source.parent().unwrap_or(source);
    let mut entries = 0;
    for entry in WalkDir::new(source)
        .follow_links(false)
        .sort_by_file_name()
    {
        let entry = entry.map_err(|err| FsOpsError::walkdir("zip.walk", source, err))?;
        let path = entry.path();
        if path == output {
            continue;
        }

        let file_type = entry.file_type();
        if !file_type.is_dir() && !file_type.is_file() {
            debug!(path = %path.display(), "skipping non-regular entry in archive");
            continue;
        }

        let name = entry_name(base, path)?;
        let options = entry_options(path)?;
        if file_type.is_dir() {
            writer
                .add_directory(format!("{name}/"), options)
                .map_err(|err| FsOpsError::zip("zip.add_directory", path, err))?;
        } else {
            writer
                .start_file(name, options)
                .map_err(|err| FsOpsError::zip("zip.start_file", path, err))?;
            let mut input =
                File::open(path).map_err(|err| FsOpsError::io("zip.open", path, err))?;
            io::copy(&mut input, writer).map_err(|err| FsOpsError::io("zip.write", path, err))?;
        }
        entries += 1;
    }
    Ok(entries)
}

fn entry_name(base: &Path, path: &Path) -> FsOpsResult<String> {
    let relative = path.strip_prefix(base).map_err(|_| FsOpsError::PathTraversal {
        path: path.display().to_string(),
    })?;
    let mut segments = Vec::new();
    for component in relative.components() {
        let Component::Normal(segment) = component else {
            return Err(FsOpsError::PathTraversal {
                path: path.display().to_string(),
            });
        };
        segments.push(segment.to_str().ok_or_else(|| FsOpsError::InvalidPath {
            path: path.display().to_string(),
            reason: "path is not valid utf-8",
        })?);
    }
    Ok(segments.join("/"))
}

#[cfg(unix)]
fn entry_options(path: &Path) -> FsOpsResult<FileOptions> {
    use std::os::unix::fs::PermissionsExt;

    let metadata = fs::metadata(path).map_err(|err| FsOpsError::io("zip.stat", path, err))?;
    Ok(FileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .unix_permissions(metadata.permissions().mode() & 0o777))
}

#[cfg(not(unix))]
fn entry_options(_path: &Path) -> FsOpsResult<FileOptions> {
    Ok(FileOptions::default().compression_method(CompressionMethod::Deflated))
}

/// Validate an archive entry name and return its relative form.
///
/// Returns `None` for entries that name the extraction root itself (`./`).
///
/// # Errors
///
/// Returns [`FsOpsError::PathTraversal`] for absolute names, drive prefixes
/// or `..` segments, and [`FsOpsError::InvalidPath`] for control characters.
pub fn sanitize_entry_name(raw: &str) -> FsOpsResult<Option<ArchiveEntry>> {
    let normalized = raw.replace('\\', "/");
    let drive = normalized
        .split('/')
        .next()
        .is_some_and(|first| first.len() == 2 && first.ends_with(':'));
    if normalized.starts_with('/') || drive {
        return Err(FsOpsError::PathTraversal {
            path: raw.to_string(),
        });
    }

    let is_dir = normalized.ends_with('/');
    let cleaned = VirtualPath::parse(&normalized)?;
    if cleaned.is_root() {
        return Ok(None);
    }
    Ok(Some(ArchiveEntry {
        path: cleaned.as_str().trim_start_matches('/').to_string(),
        is_dir,
    }))
}

/// Read and validate every entry name of the archive at `archive`.
///
/// # Errors
///
/// Returns the first invalid entry name or the error from reading the archive.
pub fn scan(archive: &Path) -> FsOpsResult<Vec<ArchiveEntry>> {
    let mut reader = open(archive)?;
    let mut entries = Vec::with_capacity(reader.len());
    for index in 0..reader.len() {
        let file = reader
            .by_index(index)
            .map_err(|err| FsOpsError::zip("unzip.read_entry", archive, err))?;
        if let Some(mut entry) = sanitize_entry_name(file.name())? {
            entry.is_dir |= file.is_dir();
            entries.push(entry);
        }
    }
    Ok(entries)
}

/// Entries that would collide with something already under `destination`.
///
/// A directory entry landing on an existing directory is not a collision.
/// An entry whose ancestor exists as a non-directory is.
///
/// # Errors
///
/// Returns an IO error other than "not found" from probing the destination.
pub fn find_collisions(entries: &[ArchiveEntry], destination: &Path) -> FsOpsResult<Vec<String>> {
    let mut collisions = Vec::new();
    for entry in entries {
        if collides(entry, destination)? {
            collisions.push(entry.path.clone());
        }
    }
    Ok(collisions)
}

fn collides(entry: &ArchiveEntry, destination: &Path) -> FsOpsResult<bool> {
    let segments: Vec<&str> = entry.path.split('/').collect();
    let mut current = destination.to_path_buf();
    for (index, segment) in segments.iter().enumerate() {
        current.push(segment);
        let last = index + 1 == segments.len();
        match fs::symlink_metadata(&current) {
            Ok(meta) if meta.is_dir() && (!last || entry.is_dir) => {}
            Ok(_) => return Ok(true),
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(false),
            Err(err) => return Err(FsOpsError::io("unzip.probe", &current, err)),
        }
    }
    Ok(false)
}

/// Extract the archive at `archive` into `destination`.
///
/// All names are validated first. Existing entries in the way are replaced.
/// Returns the relative names written, in archive order.
///
/// # Errors
///
/// Returns the first invalid entry name before anything is written, or the
/// first IO or archive error during extraction.
pub fn extract(archive: &Path, destination: &Path) -> FsOpsResult<Vec<String>> {
    let entries = scan(archive)?;
    let mut reader = open(archive)?;
    fs::create_dir_all(destination)
        .map_err(|err| FsOpsError::io("unzip.create_destination", destination, err))?;

    let mut written = Vec::with_capacity(entries.len());
    for index in 0..reader.len() {
        let mut file = reader
            .by_index(index)
            .map_err(|err| FsOpsError::zip("unzip.read_entry", archive, err))?;
        let Some(mut entry) = sanitize_entry_name(file.name())? else {
            continue;
        };
        entry.is_dir |= file.is_dir();
        let target = entry.target(destination);

        if entry.is_dir {
            prepare_dir(destination, &target)?;
            written.push(entry.display_name());
            continue;
        }

        if let Some(parent) = target.parent() {
            prepare_dir(destination, parent)?;
        }
        // Never write through whatever currently sits at the target.
        remove_entry(&target)?;
        let mut output =
            File::create_new(&target).map_err(|err| FsOpsError::io("unzip.create", &target, err))?;
        io::copy(&mut file, &mut output)
            .map_err(|err| FsOpsError::io("unzip.write", &target, err))?;

        #[cfg(unix)]
        if let Some(mode) = file.unix_mode() {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&target, fs::Permissions::from_mode((mode & 0o777) | 0o600))
                .map_err(|err| FsOpsError::io("unzip.set_permissions", &target, err))?;
        }
        written.push(entry.display_name());
    }

    debug!(
        archive = %archive.display(),
        destination = %destination.display(),
        entries = written.len(),
        "archive extracted"
    );
    Ok(written)
}

/// Create every directory between `root` and `dir`, replacing non-directories.
fn prepare_dir(root: &Path, dir: &Path) -> FsOpsResult<()> {
    let Ok(relative) = dir.strip_prefix(root) else {
        return Err(FsOpsError::PathTraversal {
            path: dir.display().to_string(),
        });
    };
    let mut current = root.to_path_buf();
    for component in relative.components() {
        current.push(component);
        match fs::symlink_metadata(&current) {
            Ok(meta) if meta.is_dir() => continue,
            Ok(_) => remove_entry(&current)?,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {}
            Err(err) => return Err(FsOpsError::io("unzip.probe", &current, err)),
        }
        fs::create_dir(&current)
            .map_err(|err| FsOpsError::io("unzip.create_dir", &current, err))?;
    }
    Ok(())
}

fn open(archive: &Path) -> FsOpsResult<ZipArchive<File>> {
    let file = File::open(archive).map_err(|err| FsOpsError::io("unzip.open", archive, err))?;
    ZipArchive::new(file).map_err(|err| FsOpsError::zip("unzip.decode", archive, err))
}
