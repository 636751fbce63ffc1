//! Lifecycle tracking for batch jobs.
//!
//! # Design
//! - States advance `queued -> running -> {completed | partial | failed}`;
//!   anything else is rejected and the record is left untouched.
//! - The terminal state is derived from the batch counts, never chosen by
//!   the caller.
//! - `job.started` and `job.completed` are published on the shared bus.
//! - Only the most recent [`JOB_HISTORY_LIMIT`] finished jobs are retained;
//!   queued and running jobs are never evicted.

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use arbor_events::{Event, EventBus, JobOutcome};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::error::{FsOpsError, FsOpsResult};
use crate::model::BatchOutcome;

/// Finished jobs kept for lookup before the oldest are evicted.
pub const JOB_HISTORY_LIMIT: usize = 1_024;

/// Batch operation a job wraps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    /// Batch move.
    Move,
    /// Batch copy.
    Copy,
    /// Batch soft delete.
    Delete,
    /// Batch restore from trash.
    Restore,
}

impl JobKind {
    /// Lowercase name used in events and metrics.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Move => "move",
            Self::Copy => "copy",
            Self::Delete => "delete",
            Self::Restore => "restore",
        }
    }
}

/// Lifecycle state of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    /// Accepted, not started.
    Queued,
    /// Items are being processed.
    Running,
    /// Every item succeeded.
    Completed,
    /// Some items failed.
    Partial,
    /// No item succeeded.
    Failed,
}

impl JobState {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Partial => "partial",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<JobOutcome> for JobState {
    fn from(outcome: JobOutcome) -> Self {
        match outcome {
            JobOutcome::Completed => Self::Completed,
            JobOutcome::Partial => Self::Partial,
            JobOutcome::Failed => Self::Failed,
        }
    }
}

/// Snapshot of one job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobRecord {
    /// Job identifier.
    pub id: Uuid,
    /// Wrapped operation.
    pub kind: JobKind,
    /// Current state.
    pub state: JobState,
    /// Items in the batch.
    pub total: usize,
    /// Items that succeeded; set on completion.
    pub succeeded: usize,
    /// Items that failed; set on completion.
    pub failed: usize,
    /// When the job was queued.
    pub created_at: DateTime<Utc>,
    /// Last transition.
    pub updated_at: DateTime<Utc>,
}

#[derive(Default)]
struct JobTable {
    records: HashMap<Uuid, JobRecord>,
    finished: VecDeque<Uuid>,
}

impl JobTable {
    /// Remember `id` as finished and drop the oldest finished jobs past `limit`.
    fn retire(&mut self, id: Uuid, limit: usize) {
        self.finished.push_back(id);
        while self.finished.len() > limit {
            if let Some(oldest) = self.finished.pop_front() {
                self.records.remove(&oldest);
            }
        }
    }
}

/// In-process registry of batch jobs.
#[derive(Clone)]
pub struct JobTracker {
    events: EventBus,
    history: usize,
    jobs: Arc<Mutex<JobTable>>,
}

impl JobTracker {
    /// Tracker publishing lifecycle events on `events`, keeping
    /// [`JOB_HISTORY_LIMIT`] finished jobs.
    #[must_use]
    pub fn new(events: EventBus) -> Self {
        Self::with_history(events, JOB_HISTORY_LIMIT)
    }

    fn with_history(events: EventBus, history: usize) -> Self {
        Self {
            events,
            history,
            jobs: Arc::new(Mutex::new(JobTable::default())),
        }
    }

    /// Register a queued job for `total` items.
    pub fn enqueue(&self, kind: JobKind, total: usize) -> JobRecord {
        let now = Utc::now();
        let record = JobRecord {
            id: Uuid::new_v4(),
            kind,
            state: JobState::Queued,
            total,
            succeeded: 0,
            failed: 0,
            created_at: now,
            updated_at: now,
        };
        self.lock().records.insert(record.id, record.clone());
        record
    }

    /// Move a queued job to running.
    ///
    /// # Errors
    ///
    /// Returns [`FsOpsError::NotFound`] for an unknown job and
    /// [`FsOpsError::InvalidInput`] when the job is not queued.
    pub fn start(&self, id: Uuid) -> FsOpsResult<JobRecord> {
        let record = {
            let mut table = self.lock();
            let record = table.records.get_mut(&id).ok_or_else(|| job_not_found(id))?;
            if record.state != JobState::Queued {
                return Err(invalid_transition(record.state, JobState::Running));
            }
            record.state = JobState::Running;
            record.updated_at = Utc::now();
            record.clone()
        };
        self.events.publish(Event::JobStarted {
            job_id: record.id,
            operation: record.kind.as_str().to_string(),
            total: record.total,
        });
        Ok(record)
    }

    /// Close a running job with the counts from `outcome`.
    ///
    /// # Errors
    ///
    /// Returns [`FsOpsError::NotFound`] for an unknown job and
    /// [`FsOpsError::InvalidInput`] when the job is not running.
    pub fn finish<T>(&self, id: Uuid, outcome: &BatchOutcome<T>) -> FsOpsResult<JobRecord> {
        let job_outcome = outcome.job_outcome();
        let mut table = self.lock();
        let record = table.records.get_mut(&id).ok_or_else(|| job_not_found(id))?;
        let next = JobState::from(job_outcome);
        if record.state != JobState::Running {
            return Err(invalid_transition(record.state, next));
        }
        record.state = next;
        record.succeeded = outcome.succeeded.len();
        record.failed = outcome.failed.len();
        record.updated_at = Utc::now();
        let record = record.clone();
        table.retire(id, self.history);
        drop(table);

        self.completed(&record, job_outcome);
        Ok(record)
    }

    /// Current snapshot of a job, while it is retained.
    #[must_use]
    pub fn get(&self, id: Uuid) -> Option<JobRecord> {
        self.lock().records.get(&id).cloned()
    }

    /// Every retained job, oldest first.
    #[must_use]
    pub fn list(&self) -> Vec<JobRecord> {
        let mut jobs: Vec<JobRecord> = self.lock().records.values().cloned().collect();
        jobs.sort_by_key(|job| job.created_at);
        jobs
    }

    fn completed(&self, record: &JobRecord, outcome: JobOutcome) {
        info!(
            job_id = %record.id,
            operation = record.kind.as_str(),
            state = %record.state,
            succeeded = record.succeeded,
            failed = record.failed,
            "job finished"
        );
        self.events.publish(Event::JobCompleted {
            job_id: record.id,
            outcome,
            succeeded: record.succeeded,
            failed: record.failed,
        });
    }

    fn lock(&self) -> MutexGuard<'_, JobTable> {
        // Each update is a single field assignment; a poisoned map is still consistent.
        self.jobs.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn job_not_found(id: Uuid) -> FsOpsError {
    FsOpsError::NotFound {
        path: id.to_string(),
        reason: "job not found",
    }
}

fn invalid_transition(from: JobState, to: JobState) -> FsOpsError {
    FsOpsError::invalid_input(
        "job_state",
        "invalid job state transition",
        Some(format!("{from} -> {to}")),
    )
}
