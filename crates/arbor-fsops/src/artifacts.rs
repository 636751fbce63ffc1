//! Derived-artifact cache invalidation.

use std::fs;
use std::io;
use std::ops::RangeInclusive;
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};

use crate::error::{FsOpsError, FsOpsResult};

/// Every thumbnail edge length the cache may hold, in pixels.
pub const THUMBNAIL_SIZES: RangeInclusive<u32> = 32..=2048;

/// Cache of artifacts derived from files inside the storage root.
pub trait ArtifactCache: Send + Sync {
    /// Drop every cached artifact for the file at `real_path`.
    ///
    /// Returns the number of artifacts removed.
    ///
    /// # Errors
    ///
    /// Returns the IO error from removing an existing artifact.
    fn invalidate(&self, real_path: &Path) -> FsOpsResult<usize>;
}

/// Thumbnails stored flat as `hex(sha256("<real path>|<size>")).jpg`.
#[derive(Debug, Clone)]
pub struct ThumbnailCache {
    root: PathBuf,
}

impl ThumbnailCache {
    /// Cache rooted at `root`.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Where the thumbnail of `real_path` at `size` lives.
    #[must_use]
    pub fn thumbnail_path(&self, real_path: &Path, size: u32) -> PathBuf {
        let digest = Sha256::digest(format!("{}|{size}", real_path.display()).as_bytes());
        self.root.join(format!("{}.jpg", hex::encode(digest)))
    }
}

impl ArtifactCache for ThumbnailCache {
    fn invalidate(&self, real_path: &Path) -> FsOpsResult<usize> {
        let mut removed = 0;
        for size in THUMBNAIL_SIZES {
            let thumbnail = self.thumbnail_path(real_path, size);
            match fs::remove_file(&thumbnail) {
                Ok(()) => removed += 1,
                Err(err) if err.kind() == io::ErrorKind::NotFound => {}
                Err(err) => return Err(FsOpsError::io("thumbnail.remove", &thumbnail, err)),
            }
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;
    use tempfile::TempDir;

    #[test]
    fn key_is_sha256_of_path_and_size() {
        let cache = ThumbnailCache::new("/cache");
        let path = cache.thumbnail_path(Path::new("/data/a.png"), 256);
        let expected = hex::encode(Sha256::digest(b"/data/a.png|256"));
        assert_eq!(path, PathBuf::from(format!("/cache/{expected}.jpg")));
    }

    #[test]
    fn invalidate_removes_every_size() -> Result<(), Box<dyn Error>> {
        let temp = TempDir::new()?;
        let cache = ThumbnailCache::new(temp.path());
        let source = Path::new("/data/photo.jpg");
        for size in [32, 256, 2048] {
            fs::write(cache.thumbnail_path(source, size), b"jpg")?;
        }
        let unrelated = cache.thumbnail_path(Path::new("/data/other.jpg"), 256);
        fs::write(&unrelated, b"jpg")?;

        assert_eq!(cache.invalidate(source)?, 3);
        assert_eq!(cache.invalidate(source)?, 0);
        assert!(unrelated.exists());
        Ok(())
    }
}
