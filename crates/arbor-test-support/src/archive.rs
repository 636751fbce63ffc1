//! Zip builder for archive tests.

use std::fs::File;
use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};
use zip::ZipWriter;
use zip::write::FileOptions;

/// Write a zip at `path` with the given raw entry names and bodies.
///
/// Names are stored verbatim, so hostile names such as `../evil.txt` can be
/// produced. A name ending in `/` becomes a directory entry and its body is
/// ignored.
///
/// # Errors
///
/// Returns an error if the archive cannot be written.
pub fn write_zip(path: &Path, entries: &[(&str, &[u8])]) -> Result<()> {
    let file = File::create(path).with_context(|| format!("failed to create {}", path.display()))?;
    let mut writer = ZipWriter::new(file);
    for (name, body) in entries {
        if name.ends_with('/') {
            writer
                .add_directory(*name, FileOptions::default())
                .with_context(|| format!("failed to add directory {name}"))?;
        } else {
            writer
                .start_file(*name, FileOptions::default())
                .with_context(|| format!("failed to add file {name}"))?;
            writer
                .write_all(body)
                .with_context(|| format!("failed to write {name}"))?;
        }
    }
    writer.finish().context("failed to finish archive")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use zip::ZipArchive;

    #[test]
    fn entries_are_stored_verbatim() -> Result<()> {
        let temp = TempDir::new()?;
        let path = temp.path().join("a.zip");
        write_zip(&path, &[("dir/", b""), ("../evil.txt", b"x")])?;

        let mut archive = ZipArchive::new(File::open(&path)?)?;
        assert_eq!(archive.len(), 2);
        assert_eq!(archive.by_index(0)?.name(), "dir/");
        assert_eq!(archive.by_index(1)?.name(), "../evil.txt");
        Ok(())
    }
}
