//! Trash ledger storage.
//!
//! # Design
//! - The trash store talks to a [`TrashLedger`] trait so tests run against an
//!   in-memory ledger and deployments can persist records without code changes.
//! - The JSON ledger rewrites the whole document on every mutation through a
//!   temp file and rename, so a crash never leaves a half-written ledger.
//! - Listing is newest first; ties on `deleted_at` go to the later insert.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::model::{Actor, TrashRecord};
use crate::sandbox::VirtualPath;

/// Result alias for ledger operations.
pub type LedgerResult<T> = Result<T, LedgerError>;

/// Failures raised by ledger backends.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// Reading or writing the backing file failed.
    #[error("ledger io failure")]
    Io {
        /// Ledger file.
        path: PathBuf,
        /// Underlying IO error.
        source: io::Error,
    },
    /// The backing file could not be parsed or serialised.
    #[error("ledger document is malformed")]
    Json {
        /// Ledger file.
        path: PathBuf,
        /// Underlying serde error.
        source: serde_json::Error,
    },
    /// A record with the same id already exists.
    #[error("duplicate trash record")]
    Duplicate {
        /// Conflicting id.
        id: Uuid,
    },
    /// No live record with the given id.
    #[error("trash record not found")]
    Missing {
        /// Requested id.
        id: Uuid,
    },
    /// A writer panicked while holding the ledger lock.
    #[error("ledger lock poisoned")]
    Poisoned,
    /// The backend refused the request.
    #[error("ledger unavailable: {reason}")]
    Unavailable {
        /// Static reason.
        reason: &'static str,
    },
}

/// Persistence contract for trash records.
pub trait TrashLedger: Send + Sync {
    /// Store a new record.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Duplicate`] if the id exists, or a backend error.
    fn insert(&self, record: &TrashRecord) -> LedgerResult<()>;

    /// Most recently deleted live record for `original_path`.
    ///
    /// # Errors
    ///
    /// Returns a backend error.
    fn latest_live(&self, original_path: &VirtualPath) -> LedgerResult<Option<TrashRecord>>;

    /// Live record with `id`.
    ///
    /// # Errors
    ///
    /// Returns a backend error.
    fn find_live(&self, id: Uuid) -> LedgerResult<Option<TrashRecord>>;

    /// Set the restore fields of a live record and return the updated record.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Missing`] when no live record has `id`.
    fn mark_restored(
        &self,
        id: Uuid,
        restored_at: DateTime<Utc>,
        restored_by: &Actor,
    ) -> LedgerResult<TrashRecord>;

    /// All records, newest first, optionally including restored ones.
    ///
    /// # Errors
    ///
    /// Returns a backend error.
    fn list(&self, include_restored: bool) -> LedgerResult<Vec<TrashRecord>>;

    /// Delete a record.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Missing`] when no record has `id`.
    fn remove(&self, id: Uuid) -> LedgerResult<()>;
}

/// Shared record-set logic for both backends.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
struct RecordSet {
    records: Vec<TrashRecord>,
}

impl RecordSet {
    fn insert(&mut self, record: &TrashRecord) -> LedgerResult<()> {
        if self.records.iter().any(|existing| existing.id == record.id) {
            return Err(LedgerError::Duplicate { id: record.id });
        }
        self.records.push(record.clone());
        Ok(())
    }

    fn newest_first(&self, include_restored: bool) -> Vec<TrashRecord> {
        let mut records: Vec<TrashRecord> = self
            .records
            .iter()
            .rev()
            .filter(|record| include_restored || record.is_live())
            .cloned()
            .collect();
        // Stable sort keeps later inserts ahead on equal timestamps.
        records.sort_by(|a, b| b.deleted_at.cmp(&a.deleted_at));
        records
    }

    fn latest_live(&self, original_path: &VirtualPath) -> Option<TrashRecord> {
        self.newest_first(false)
            .into_iter()
            .find(|record| &record.original_path == original_path)
    }

    fn find_live(&self, id: Uuid) -> Option<TrashRecord> {
        self.records
            .iter()
            .find(|record| record.id == id && record.is_live())
            .cloned()
    }

    fn mark_restored(
        &mut self,
        id: Uuid,
        restored_at: DateTime<Utc>,
        restored_by: &Actor,
    ) -> LedgerResult<TrashRecord> {
        let record = self
            .records
            .iter_mut()
            .find(|record| record.id == id && record.is_live())
            .ok_or(LedgerError::Missing { id })?;
        record.restored_at = Some(restored_at);
        record.restored_by = Some(restored_by.clone());
        Ok(record.clone())
    }

    fn remove(&mut self, id: Uuid) -> LedgerResult<()> {
        let before = self.records.len();
        self.records.retain(|record| record.id != id);
        if self.records.len() == before {
            return Err(LedgerError::Missing { id });
        }
        Ok(())
    }
}

/// Ledger kept in process memory. Lost on restart.
#[derive(Debug, Default)]
pub struct MemoryLedger {
    inner: Mutex<RecordSet>,
}

impl MemoryLedger {
    /// Empty ledger.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> LedgerResult<MutexGuard<'_, RecordSet>> {
        self.inner.lock().map_err(|_| LedgerError::Poisoned)
    }
}

impl TrashLedger for MemoryLedger {
    fn insert(&self, record: &TrashRecord) -> LedgerResult<()> {
        self.lock()?.insert(record)
    }

    fn latest_live(&self, original_path: &VirtualPath) -> LedgerResult<Option<TrashRecord>> {
        Ok(self.lock()?.latest_live(original_path))
    }

    fn find_live(&self, id: Uuid) -> LedgerResult<Option<TrashRecord>> {
        Ok(self.lock()?.find_live(id))
    }

    fn mark_restored(
        &self,
        id: Uuid,
        restored_at: DateTime<Utc>,
        restored_by: &Actor,
    ) -> LedgerResult<TrashRecord> {
        self.lock()?.mark_restored(id, restored_at, restored_by)
    }

    fn list(&self, include_restored: bool) -> LedgerResult<Vec<TrashRecord>> {
        Ok(self.lock()?.newest_first(include_restored))
    }

    fn remove(&self, id: Uuid) -> LedgerResult<()> {
        self.lock()?.remove(id)
    }
}

/// Ledger persisted as a pretty-printed JSON document.
#[derive(Debug)]
pub struct JsonFileLedger {
    path: PathBuf,
    guard: Mutex<()>,
}

impl JsonFileLedger {
    /// Ledger backed by `path`. The file is created on first write.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            guard: Mutex::new(()),
        }
    }

    /// Backing file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read<T>(&self, view: impl FnOnce(&RecordSet) -> T) -> LedgerResult<T> {
        let _held = self.guard.lock().map_err(|_| LedgerError::Poisoned)?;
        let set = load_records(&self.path)?;
        Ok(view(&set))
    }

    fn update<T>(&self, change: impl FnOnce(&mut RecordSet) -> LedgerResult<T>) -> LedgerResult<T> {
        let _held = self.guard.lock().map_err(|_| LedgerError::Poisoned)?;
        let mut set = load_records(&self.path)?;
        let result = change(&mut set)?;
        persist_records(&self.path, &set)?;
        Ok(result)
    }
}

impl TrashLedger for JsonFileLedger {
    fn insert(&self, record: &TrashRecord) -> LedgerResult<()> {
        self.update(|set| set.insert(record))
    }

    fn latest_live(&self, original_path: &VirtualPath) -> LedgerResult<Option<TrashRecord>> {
        self.read(|set| set.latest_live(original_path))
    }

    fn find_live(&self, id: Uuid) -> LedgerResult<Option<TrashRecord>> {
        self.read(|set| set.find_live(id))
    }

    fn mark_restored(
        &self,
        id: Uuid,
        restored_at: DateTime<Utc>,
        restored_by: &Actor,
    ) -> LedgerResult<TrashRecord> {
        self.update(|set| set.mark_restored(id, restored_at, restored_by))
    }

    fn list(&self, include_restored: bool) -> LedgerResult<Vec<TrashRecord>> {
        self.read(|set| set.newest_first(include_restored))
    }

    fn remove(&self, id: Uuid) -> LedgerResult<()> {
        self.update(|set| set.remove(id))
    }
}

fn load_records(path: &Path) -> LedgerResult<RecordSet> {
    let raw = match fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(RecordSet::default()),
        Err(source) => {
            return Err(LedgerError::Io {
                path: path.to_path_buf(),
                source,
            });
        }
    };
    serde_json::from_str(&raw).map_err(|source| LedgerError::Json {
        path: path.to_path_buf(),
        source,
    })
}

fn persist_records(path: &Path, set: &RecordSet) -> LedgerResult<()> {
    let io_err = |source| LedgerError::Io {
        path: path.to_path_buf(),
        source,
    };
    let serialised = serde_json::to_string_pretty(set).map_err(|source| LedgerError::Json {
        path: path.to_path_buf(),
        source,
    })?;
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(io_err)?;
    }
    let staging = path.with_extension("json.tmp");
    fs::write(&staging, serialised).map_err(io_err)?;
    fs::rename(&staging, path).map_err(io_err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use std::error::Error;
    use tempfile::TempDir;

    type TestResult<T> = Result<T, Box<dyn Error>>;

    fn record(path: &str, deleted_at: DateTime<Utc>) -> TestResult<TrashRecord> {
        Ok(TrashRecord {
            id: Uuid::new_v4(),
            original_path: VirtualPath::parse(path)?,
            trash_name: format!("{}_entry", Uuid::new_v4()),
            deleted_at,
            deleted_by: Actor::default(),
            restored_at: None,
            restored_by: None,
        })
    }

    fn exercise(ledger: &dyn TrashLedger) -> TestResult<()> {
        let now = Utc::now();
        let older = record("/a.txt", now - Duration::seconds(10))?;
        let newer = record("/a.txt", now)?;
        let other = record("/b.txt", now - Duration::seconds(5))?;
        ledger.insert(&older)?;
        ledger.insert(&newer)?;
        ledger.insert(&other)?;
        assert!(matches!(
            ledger.insert(&older),
            Err(LedgerError::Duplicate { .. })
        ));

        let latest = ledger.latest_live(&VirtualPath::parse("/a.txt")?)?;
        assert_eq!(latest.map(|r| r.id), Some(newer.id));

        let ids: Vec<Uuid> = ledger.list(false)?.into_iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![newer.id, other.id, older.id]);

        let actor = Actor {
            username: "restorer".to_string(),
            ..Actor::default()
        };
        let restored = ledger.mark_restored(newer.id, now, &actor)?;
        assert_eq!(restored.restored_by, Some(actor.clone()));
        assert!(matches!(
            ledger.mark_restored(newer.id, now, &actor),
            Err(LedgerError::Missing { .. })
        ));
        assert!(ledger.find_live(newer.id)?.is_none());
        assert_eq!(ledger.list(false)?.len(), 2);
        assert_eq!(ledger.list(true)?.len(), 3);

        let latest = ledger.latest_live(&VirtualPath::parse("/a.txt")?)?;
        assert_eq!(latest.map(|r| r.id), Some(older.id));

        ledger.remove(other.id)?;
        assert!(matches!(
            ledger.remove(other.id),
            Err(LedgerError::Missing { .. })
        ));
        assert_eq!(ledger.list(true)?.len(), 2);
        Ok(())
    }

    #[test]
    fn memory_ledger_contract() -> TestResult<()> {
        exercise(&MemoryLedger::new())
    }

    #[test]
    fn json_ledger_contract_and_persistence() -> TestResult<()> {
        let temp = TempDir::new()?;
        let path = temp.path().join("state").join("ledger.json");
        exercise(&JsonFileLedger::new(&path))?;

        let reopened = JsonFileLedger::new(&path);
        assert_eq!(reopened.list(true)?.len(), 2);
        assert!(!path.with_extension("json.tmp").exists());
        Ok(())
    }

    #[test]
    fn equal_timestamps_list_later_insert_first() -> TestResult<()> {
        let ledger = MemoryLedger::new();
        let at = Utc::now();
        let first = record("/same", at)?;
        let second = record("/same", at)?;
        ledger.insert(&first)?;
        ledger.insert(&second)?;
        let latest = ledger.latest_live(&VirtualPath::parse("/same")?)?;
        assert_eq!(latest.map(|r| r.id), Some(second.id));
        Ok(())
    }

    #[test]
    fn malformed_json_is_reported() -> TestResult<()> {
        let temp = TempDir::new()?;
        let path = temp.path().join("ledger.json");
        fs::write(&path, "not json")?;
        let ledger = JsonFileLedger::new(&path);
        assert!(matches!(ledger.list(true), Err(LedgerError::Json { .. })));
        Ok(())
    }
}
