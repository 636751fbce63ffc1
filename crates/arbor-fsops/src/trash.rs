//! Soft delete, restore and purge of sandboxed entries.
//!
//! # Design
//! - Data and ledger move together: when the ledger write fails after the
//!   filesystem move succeeded, the move is undone, so every path has exactly
//!   one authoritative copy.
//! - The trash area is a flat namespace of `<uuid>_<basename>` entries, one
//!   per ledger record. The basename is shortened to keep the entry within
//!   the filename limit; the ledger keeps the full original path.
//! - Purging invalidates derived artifacts for the entry and for every file
//!   nested inside it, keyed on the original real paths.

use std::fs;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use tracing::{error, info, warn};
use uuid::Uuid;
use walkdir::WalkDir;

use crate::artifacts::ArtifactCache;
use crate::error::{FsOpsError, FsOpsResult};
use crate::ledger::{LedgerError, TrashLedger};
use crate::model::{Actor, TrashRecord};
use crate::names::{MAX_FILENAME_BYTES, truncate_bytes};
use crate::sandbox::{PathSandbox, VirtualPath};
use crate::transfer::{entry_exists, relocate, remove_entry};

/// Quarantine area plus the ledger describing it.
#[derive(Clone)]
pub struct TrashStore {
    sandbox: PathSandbox,
    root: PathBuf,
    ledger: Arc<dyn TrashLedger>,
    artifacts: Option<Arc<dyn ArtifactCache>>,
}

impl TrashStore {
    /// Create the store, creating `trash_root` when missing.
    ///
    /// # Errors
    ///
    /// Returns the IO error from creating the trash directory.
    pub fn new(
        sandbox: PathSandbox,
        trash_root: impl Into<PathBuf>,
        ledger: Arc<dyn TrashLedger>,
    ) -> FsOpsResult<Self> {
        let root = trash_root.into();
        fs::create_dir_all(&root).map_err(|err| FsOpsError::io("trash.prepare", &root, err))?;
        Ok(Self {
            sandbox,
            root,
            ledger,
            artifacts: None,
        })
    }

    /// Invalidate `cache` whenever trash data is purged.
    #[must_use]
    pub fn with_artifacts(mut self, cache: Arc<dyn ArtifactCache>) -> Self {
        self.artifacts = Some(cache);
        self
    }

    /// Directory holding trashed entries.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Move `path` into the trash and record it.
    ///
    /// # Errors
    ///
    /// Returns [`FsOpsError::NotFound`] when nothing exists at `path`,
    /// [`FsOpsError::Forbidden`] for the root, or the move/ledger error. On a
    /// ledger error the entry has been moved back.
    pub fn soft_delete(&self, path: &VirtualPath, actor: &Actor) -> FsOpsResult<TrashRecord> {
        let Some(base) = path.file_name() else {
            return Err(FsOpsError::forbidden(path, "root path cannot be deleted"));
        };
        let real = self.sandbox.real(path)?;
        if !entry_exists(&real)? {
            return Err(FsOpsError::not_found(path));
        }

        let record = TrashRecord {
            id: Uuid::new_v4(),
            original_path: path.clone(),
            trash_name: trash_name(Uuid::new_v4(), base),
            deleted_at: Utc::now(),
            deleted_by: actor.clone(),
            restored_at: None,
            restored_by: None,
        };
        let trashed = self.root.join(&record.trash_name);
        relocate(&real, &trashed)?;

        if let Err(err) = self.ledger.insert(&record) {
            self.undo_move(&trashed, &real, "trash.soft_delete");
            return Err(FsOpsError::ledger("trash.insert", err));
        }

        info!(path = %path, trash_id = %record.id, "entry moved to trash");
        Ok(record)
    }

    /// Put the most recently trashed live version of `path` back.
    ///
    /// # Errors
    ///
    /// Returns [`FsOpsError::NotFound`] when no live record exists,
    /// [`FsOpsError::AlreadyExists`] when the original location is occupied,
    /// or the move/ledger error. On a ledger error the entry has been moved
    /// back into the trash.
    pub fn restore_latest(&self, path: &VirtualPath, actor: &Actor) -> FsOpsResult<TrashRecord> {
        let record = self
            .ledger
            .latest_live(path)
            .map_err(|err| FsOpsError::ledger("trash.lookup", err))?
            .ok_or_else(|| FsOpsError::NotFound {
                path: path.to_string(),
                reason: "no trashed version found",
            })?;

        let target = self.sandbox.real(path)?;
        if entry_exists(&target)? {
            return Err(FsOpsError::AlreadyExists {
                path: path.to_string(),
                reason: "target path already exists",
            });
        }

        let trashed = self.entry_path(&record)?;
        relocate(&trashed, &target)?;

        match self.ledger.mark_restored(record.id, Utc::now(), actor) {
            Ok(updated) => {
                info!(path = %path, trash_id = %updated.id, "entry restored from trash");
                Ok(updated)
            }
            Err(err) => {
                self.undo_move(&target, &trashed, "trash.restore");
                Err(FsOpsError::ledger("trash.mark_restored", err))
            }
        }
    }

    /// Records, newest first.
    ///
    /// # Errors
    ///
    /// Returns the ledger error.
    pub fn list(&self, include_restored: bool) -> FsOpsResult<Vec<TrashRecord>> {
        self.ledger
            .list(include_restored)
            .map_err(|err| FsOpsError::ledger("trash.list", err))
    }

    /// Remove a live record and its data for good.
    ///
    /// Artifact invalidation failures are logged and do not fail the purge.
    ///
    /// # Errors
    ///
    /// Returns [`FsOpsError::NotFound`] when no live record has `id`, or the
    /// error from removing the data or the record.
    pub fn permanent_delete(&self, id: Uuid) -> FsOpsResult<TrashRecord> {
        let record = self
            .ledger
            .find_live(id)
            .map_err(|err| FsOpsError::ledger("trash.lookup", err))?
            .ok_or_else(|| FsOpsError::NotFound {
                path: id.to_string(),
                reason: "trash item not found",
            })?;
        self.purge(&record)?;
        Ok(record)
    }

    /// Purge every live record; returns the records that were removed.
    ///
    /// A record whose data cannot be removed stays in the ledger and the
    /// remaining records are still processed.
    ///
    /// # Errors
    ///
    /// Returns the ledger error if the records cannot be listed.
    pub fn empty_trash(&self) -> FsOpsResult<Vec<TrashRecord>> {
        let records = self.list(false)?;
        let total = records.len();
        let mut purged = Vec::with_capacity(total);
        for record in records {
            match self.purge(&record) {
                Ok(()) => purged.push(record),
                Err(err) => {
                    warn!(trash_id = %record.id, error = %err, "trash record could not be purged");
                }
            }
        }
        info!(purged = purged.len(), total, "trash emptied");
        Ok(purged)
    }

    fn purge(&self, record: &TrashRecord) -> FsOpsResult<()> {
        let trashed = self.entry_path(record)?;
        let affected = self.affected_paths(record, &trashed)?;

        remove_entry(&trashed)?;
        match self.ledger.remove(record.id) {
            Ok(()) | Err(LedgerError::Missing { .. }) => {}
            Err(err) => return Err(FsOpsError::ledger("trash.remove", err)),
        }

        if let Some(cache) = &self.artifacts {
            for path in &affected {
                if let Err(err) = cache.invalidate(path) {
                    warn!(path = %path.display(), error = %err, "artifact invalidation failed");
                }
            }
        }
        info!(trash_id = %record.id, files = affected.len(), "trash record purged");
        Ok(())
    }

    /// Original real paths of the entry and every file nested inside it.
    fn affected_paths(&self, record: &TrashRecord, trashed: &Path) -> FsOpsResult<Vec<PathBuf>> {
        let original = self.sandbox.real(&record.original_path)?;
        let mut paths = vec![original.clone()];
        if !fs::symlink_metadata(trashed).is_ok_and(|meta| meta.is_dir()) {
            return Ok(paths);
        }

        for entry in WalkDir::new(trashed).min_depth(1).follow_links(false) {
            let entry = entry.map_err(|err| FsOpsError::walkdir("trash.walk", trashed, err))?;
            if entry.file_type().is_dir() {
                continue;
            }
            if let Ok(relative) = entry.path().strip_prefix(trashed) {
                paths.push(original.join(relative));
            }
        }
        Ok(paths)
    }

    /// Location of a record's data, refusing names that are not a single segment.
    fn entry_path(&self, record: &TrashRecord) -> FsOpsResult<PathBuf> {
        let mut components = Path::new(&record.trash_name).components();
        match (components.next(), components.next()) {
            (Some(Component::Normal(_)), None) => Ok(self.root.join(&record.trash_name)),
            _ => Err(FsOpsError::PathTraversal {
                path: record.trash_name.clone(),
            }),
        }
    }

    fn undo_move(&self, from: &Path, to: &Path, operation: &'static str) {
        match relocate(from, to) {
            Ok(()) => warn!(operation, path = %to.display(), "ledger write failed, move rolled back"),
            Err(err) => error!(
                operation,
                from = %from.display(),
                to = %to.display(),
                error = %err,
                "ledger write failed and rollback failed"
            ),
        }
    }
}

/// `<prefix>_<base>`, with `base` cut short so the result fits one path segment.
fn trash_name(prefix: Uuid, base: &str) -> String {
    let prefix = prefix.to_string();
    let budget = MAX_FILENAME_BYTES.saturating_sub(prefix.len() + 1);
    format!("{prefix}_{}", truncate_bytes(base, budget))
}
