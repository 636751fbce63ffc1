//! Request and result types exchanged with callers of the engine.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use arbor_events::JobOutcome;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::conflict::ConflictPolicy;
use crate::error::{ErrorKind, FsOpsError};
use crate::sandbox::VirtualPath;

/// Identity attributed to a mutating call. Threaded through, never checked.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    /// Stable user identifier.
    pub user_id: String,
    /// Display name.
    pub username: String,
    /// Role at the time of the call.
    pub role: String,
    /// Client address.
    pub ip: String,
}

/// Ledger entry for one soft-deleted file or directory tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrashRecord {
    /// Generated at deletion time.
    pub id: Uuid,
    /// Where the entry lived before it was trashed.
    pub original_path: VirtualPath,
    /// Unique name inside the trash area.
    pub trash_name: String,
    /// When the entry was trashed.
    pub deleted_at: DateTime<Utc>,
    /// Who trashed it.
    pub deleted_by: Actor,
    /// Set once, when the entry is restored.
    pub restored_at: Option<DateTime<Utc>>,
    /// Who restored it.
    pub restored_by: Option<Actor>,
}

impl TrashRecord {
    /// A live record can still be restored.
    #[must_use]
    pub const fn is_live(&self) -> bool {
        self.restored_at.is_none()
    }
}

/// Move or copy request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferRequest {
    /// Virtual paths to move or copy.
    pub sources: Vec<String>,
    /// Virtual directory receiving the entries; created when missing.
    pub destination: String,
    /// How to handle an occupied target.
    #[serde(default)]
    pub policy: ConflictPolicy,
}

/// Archive creation request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompressRequest {
    /// Virtual paths to include.
    pub sources: Vec<String>,
    /// Virtual directory receiving the archive.
    pub destination: String,
    /// Archive file name; `.zip` is appended when absent.
    pub name: String,
}

/// Archive extraction request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecompressRequest {
    /// Virtual path of the archive.
    pub source: String,
    /// Virtual directory to extract into.
    pub destination: String,
    /// Anything but `overwrite` refuses to extract over existing entries.
    #[serde(default)]
    pub policy: ConflictPolicy,
}

/// Successful move or copy of one source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transfer {
    /// Source virtual path.
    pub from: VirtualPath,
    /// Final virtual path after conflict resolution.
    pub to: VirtualPath,
}

/// Successful delete or restore of one path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrashedItem {
    /// Virtual path the entry was removed from or restored to.
    pub path: VirtualPath,
    /// Ledger record involved.
    pub trash_id: Uuid,
}

/// One failed batch item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemFailure {
    /// Input exactly as supplied.
    pub item: String,
    /// Human-readable reason.
    pub reason: String,
    /// Taxonomy of the failure.
    pub kind: ErrorKind,
}

impl ItemFailure {
    /// Record `err` against `item`.
    #[must_use]
    pub fn new(item: impl Into<String>, err: &FsOpsError) -> Self {
        Self {
            item: item.into(),
            reason: err.to_string(),
            kind: err.kind(),
        }
    }
}

/// Result of a batch call. Every input lands in exactly one list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchOutcome<T> {
    /// Items that succeeded, in input order.
    pub succeeded: Vec<T>,
    /// Items that failed, in input order.
    pub failed: Vec<ItemFailure>,
}

impl<T> Default for BatchOutcome<T> {
    fn default() -> Self {
        Self {
            succeeded: Vec::new(),
            failed: Vec::new(),
        }
    }
}

impl<T> BatchOutcome<T> {
    /// Number of inputs accounted for.
    #[must_use]
    pub fn len(&self) -> usize {
        self.succeeded.len() + self.failed.len()
    }

    /// Whether the batch had no inputs.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Terminal job state implied by the counts.
    #[must_use]
    pub fn job_outcome(&self) -> JobOutcome {
        match (self.succeeded.is_empty(), self.failed.is_empty()) {
            (false, true) => JobOutcome::Completed,
            (false, false) => JobOutcome::Partial,
            (true, _) => JobOutcome::Failed,
        }
    }
}

/// Result of [`crate::MutationEngine::rename`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenameOutcome {
    /// Previous virtual path.
    pub old_path: VirtualPath,
    /// New virtual path.
    pub new_path: VirtualPath,
    /// Sanitised name that was applied.
    pub name: String,
}

/// Result of [`crate::MutationEngine::write_file`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriteOutcome {
    /// Virtual path the content landed at.
    pub path: VirtualPath,
    /// Sanitised name requested by the caller.
    pub name: String,
    /// Bytes written.
    pub size: u64,
}

/// Result of [`crate::MutationEngine::compress`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompressOutcome {
    /// Virtual path of the new archive.
    pub path: VirtualPath,
    /// Archive size in bytes.
    pub size: u64,
    /// Entries written, directories included.
    pub entries: usize,
}

/// Result of [`crate::MutationEngine::decompress`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecompressOutcome {
    /// Virtual directory the archive was extracted into.
    pub destination: VirtualPath,
    /// Relative entry paths written, forward-slash separated.
    pub files: Vec<String>,
}

/// Cooperative cancellation for batch calls.
///
/// Cloning shares the flag. Once cancelled, a batch stops starting new items.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    /// A flag that has not been cancelled.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Whether cancellation was requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;

    #[test]
    fn job_outcome_follows_counts() {
        let mut outcome: BatchOutcome<u8> = BatchOutcome::default();
        assert_eq!(outcome.job_outcome(), JobOutcome::Failed);

        outcome.succeeded.push(1);
        assert_eq!(outcome.job_outcome(), JobOutcome::Completed);

        outcome
            .failed
            .push(ItemFailure::new("/x", &FsOpsError::not_found("/x")));
        assert_eq!(outcome.job_outcome(), JobOutcome::Partial);
        assert_eq!(outcome.len(), 2);

        outcome.succeeded.clear();
        assert_eq!(outcome.job_outcome(), JobOutcome::Failed);
    }

    #[test]
    fn failure_carries_reason_and_kind() {
        let failure = ItemFailure::new("/", &FsOpsError::forbidden("/", "root path cannot be moved"));
        assert_eq!(failure.reason, "root path cannot be moved");
        assert_eq!(failure.kind, ErrorKind::Forbidden);
    }

    #[test]
    fn cancel_flag_is_shared_between_clones() {
        let flag = CancelFlag::new();
        let clone = flag.clone();
        assert!(!clone.is_cancelled());
        flag.cancel();
        assert!(clone.is_cancelled());
    }

    #[test]
    fn transfer_request_policy_defaults() -> Result<(), Box<dyn Error>> {
        let request: TransferRequest =
            serde_json::from_str(r#"{"sources":["/a"],"destination":"/b"}"#)?;
        assert_eq!(request.policy, ConflictPolicy::Rename);
        Ok(())
    }
}
