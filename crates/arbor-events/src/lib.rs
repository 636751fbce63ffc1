#![forbid(unsafe_code)]
#![warn(
    unused,
    unused_must_use,
    unreachable_pub,
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    rustdoc::broken_intra_doc_links,
    missing_docs
)]
#![allow(clippy::module_name_repetitions, clippy::multiple_crate_versions)]

//! In-process event bus for filesystem mutations.
//!
//! The bus carries a typed event enum with sequential identifiers and keeps a
//! bounded replay buffer so subscribers that reconnect (for example a push
//! channel that remembers its last seen id) can catch up. Internally it uses
//! `tokio::broadcast`; publishing never blocks and never fails, and when a
//! subscriber lags the oldest events are dropped for that subscriber only.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tokio::sync::broadcast::{Receiver, Sender};
use uuid::Uuid;

/// Identifier assigned to each published event.
pub type EventId = u64;

/// Default buffer size for the in-memory replay ring.
const DEFAULT_REPLAY_CAPACITY: usize = 1_024;

/// Typed domain events emitted after successful mutations.
///
/// Paths are virtual paths (rooted at `/`), never real filesystem paths.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// An entry was renamed in place.
    FileRenamed {
        /// Previous virtual path.
        from: String,
        /// New virtual path.
        to: String,
        /// Username of the acting user.
        actor: String,
    },
    /// A directory was created.
    DirectoryCreated {
        /// Virtual path of the new directory.
        path: String,
        /// Username of the acting user.
        actor: String,
    },
    /// File content was written from a client stream.
    FileUploaded {
        /// Final virtual path after conflict resolution.
        path: String,
        /// Bytes written.
        size_bytes: u64,
        /// Username of the acting user.
        actor: String,
    },
    /// An entry was relocated into another directory.
    FileMoved {
        /// Source virtual path.
        from: String,
        /// Final virtual path after conflict resolution.
        to: String,
        /// Username of the acting user.
        actor: String,
    },
    /// An entry was copied (recursively for directories).
    FileCopied {
        /// Source virtual path.
        from: String,
        /// Final virtual path of the copy.
        to: String,
        /// Username of the acting user.
        actor: String,
    },
    /// An entry was moved into the trash.
    FileDeleted {
        /// Virtual path the entry occupied.
        path: String,
        /// Ledger record created for the delete.
        trash_id: Uuid,
        /// Username of the acting user.
        actor: String,
    },
    /// A trashed entry was restored to its original location.
    FileRestored {
        /// Virtual path the entry was restored to.
        path: String,
        /// Ledger record that was marked restored.
        trash_id: Uuid,
        /// Username of the acting user.
        actor: String,
    },
    /// A zip archive was written.
    FileCompressed {
        /// Virtual path of the archive.
        path: String,
        /// Archive size on disk.
        size_bytes: u64,
        /// Username of the acting user.
        actor: String,
    },
    /// A zip archive was extracted.
    FileDecompressed {
        /// Virtual directory the archive was extracted into.
        destination: String,
        /// Relative entry paths that were written.
        files: Vec<String>,
        /// Username of the acting user.
        actor: String,
    },
    /// A trash record and its data were permanently removed.
    TrashPurged {
        /// Removed ledger record.
        trash_id: Uuid,
        /// Virtual path the entry occupied before it was trashed.
        original_path: String,
    },
    /// A batch job transitioned to running.
    JobStarted {
        /// Job identifier.
        job_id: Uuid,
        /// Operation the job wraps (`move`, `copy`, ...).
        operation: String,
        /// Number of items in the batch.
        total: usize,
    },
    /// A batch job reached a terminal state.
    JobCompleted {
        /// Job identifier.
        job_id: Uuid,
        /// Terminal state.
        outcome: JobOutcome,
        /// Items that succeeded.
        succeeded: usize,
        /// Items that failed.
        failed: usize,
    },
}

impl Event {
    /// Dotted discriminator used by push consumers and metrics labels.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::FileRenamed { .. } => "file.renamed",
            Self::DirectoryCreated { .. } => "directory.created",
            Self::FileUploaded { .. } => "file.uploaded",
            Self::FileMoved { .. } => "file.moved",
            Self::FileCopied { .. } => "file.copied",
            Self::FileDeleted { .. } => "file.deleted",
            Self::FileRestored { .. } => "file.restored",
            Self::FileCompressed { .. } => "file.compressed",
            Self::FileDecompressed { .. } => "file.decompressed",
            Self::TrashPurged { .. } => "trash.purged",
            Self::JobStarted { .. } => "job.started",
            Self::JobCompleted { .. } => "job.completed",
        }
    }
}

/// Terminal state of a batch job.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum JobOutcome {
    /// Every item succeeded.
    Completed,
    /// Some items succeeded and some failed.
    Partial,
    /// No item succeeded.
    Failed,
}

/// Metadata wrapper around events. Each envelope tracks the event id and
/// emission timestamp.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EventEnvelope {
    /// Sequential identifier.
    pub id: EventId,
    /// Time the event was published.
    pub timestamp: DateTime<Utc>,
    /// Event payload.
    pub event: Event,
}

/// Shared event bus built on top of `tokio::broadcast`.
#[derive(Clone)]
pub struct EventBus {
    sender: Sender<EventEnvelope>,
    buffer: Arc<Mutex<VecDeque<EventEnvelope>>>,
    next_id: Arc<AtomicU64>,
    replay_capacity: usize,
}

impl EventBus {
    /// Construct a new bus with the provided broadcast capacity.
    ///
    /// The broadcast channel uses the same capacity as the in-memory replay
    /// buffer, so dropped events impact both structures consistently. A zero
    /// capacity is raised to one.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender,
            buffer: Arc::new(Mutex::new(VecDeque::with_capacity(capacity))),
            next_id: Arc::new(AtomicU64::new(1)),
            replay_capacity: capacity,
        }
    }

    /// Construct a bus with the default in-memory buffer size.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_REPLAY_CAPACITY)
    }

    /// Publish a new event to the bus, assigning it a sequential identifier.
    ///
    /// Publishing succeeds whether or not anyone is subscribed.
    pub fn publish(&self, event: Event) -> EventId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let envelope = EventEnvelope {
            id,
            timestamp: Utc::now(),
            event,
        };

        {
            let mut buffer = self.lock_buffer();
            if buffer.len() == self.replay_capacity {
                buffer.pop_front();
            }
            buffer.push_back(envelope.clone());
        }

        // No receivers is the common case for one-shot CLI runs.
        let _ = self.sender.send(envelope);
        id
    }

    /// Subscribe to the bus, replaying any buffered events newer than `since_id`.
    #[must_use]
    pub fn subscribe(&self, since_id: Option<EventId>) -> EventStream {
        let mut backlog = VecDeque::new();
        if let Some(since) = since_id {
            let buffer = self.lock_buffer();
            backlog.extend(buffer.iter().filter(|item| item.id > since).cloned());
        }

        let receiver = self.sender.subscribe();
        EventStream { backlog, receiver }
    }

    /// Returns the last assigned identifier, if any events have been published.
    #[must_use]
    pub fn last_event_id(&self) -> Option<EventId> {
        self.lock_buffer().back().map(|event| event.id)
    }

    /// Snapshot of the replay buffer, oldest first.
    #[must_use]
    pub fn recent(&self) -> Vec<EventEnvelope> {
        self.lock_buffer().iter().cloned().collect()
    }

    fn lock_buffer(&self) -> MutexGuard<'_, VecDeque<EventEnvelope>> {
        // A panic while holding the lock cannot leave the ring half-updated.
        self.buffer.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Stream wrapper that yields events either from the replay backlog or from the
/// live broadcast channel.
pub struct EventStream {
    backlog: VecDeque<EventEnvelope>,
    receiver: Receiver<EventEnvelope>,
}

impl EventStream {
    /// Receive the next event, respecting the replay backlog first.
    pub async fn next(&mut self) -> Option<EventEnvelope> {
        if let Some(event) = self.backlog.pop_front() {
            return Some(event);
        }

        loop {
            match self.receiver.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(_)) => {}
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Receive the next event without waiting, if one is ready.
    pub fn try_next(&mut self) -> Option<EventEnvelope> {
        if let Some(event) = self.backlog.pop_front() {
            return Some(event);
        }

        loop {
            match self.receiver.try_recv() {
                Ok(event) => return Some(event),
                Err(broadcast::error::TryRecvError::Lagged(_)) => {}
                Err(_) => return None,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::error::Error;
    use std::time::Duration;
    use tokio::task;
    use tokio::time::timeout;

    type TestResult<T> = Result<T, Box<dyn Error>>;

    const PUBLISH_TIMEOUT: Duration = Duration::from_secs(1);

    fn moved(index: usize) -> Event {
        Event::FileMoved {
            from: format!("/inbox/{index}.txt"),
            to: format!("/archive/{index}.txt"),
            actor: "tester".to_string(),
        }
    }

    #[tokio::test]
    async fn sequential_ids_and_replay() -> TestResult<()> {
        let bus = EventBus::with_capacity(16);

        let mut last_id = 0;
        for i in 0..5 {
            last_id = bus.publish(moved(i));
        }
        assert_eq!(last_id, 5);
        assert_eq!(bus.last_event_id(), Some(5));

        let mut stream = bus.subscribe(Some(2));
        let mut received = Vec::new();
        for _ in 0..3 {
            if let Some(event) = timeout(PUBLISH_TIMEOUT, stream.next()).await? {
                received.push(event);
            }
        }

        assert_eq!(received.len(), 3);
        assert_eq!(received.first().map(|e| e.id), Some(3));
        assert_eq!(received.last().map(|e| e.id), Some(5));
        Ok(())
    }

    #[test]
    fn publish_without_subscribers_still_buffers() {
        let bus = EventBus::with_capacity(2);
        let _ = bus.publish(moved(1));
        let _ = bus.publish(moved(2));
        let _ = bus.publish(moved(3));

        let recent = bus.recent();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent.first().map(|e| e.id), Some(2));
    }

    #[test]
    fn kinds_are_dotted() -> TestResult<()> {
        let event = Event::FileDeleted {
            path: "/a.txt".to_string(),
            trash_id: Uuid::nil(),
            actor: "tester".to_string(),
        };
        assert_eq!(event.kind(), "file.deleted");

        let json = serde_json::to_value(&event)?;
        assert_eq!(json["type"], "file_deleted");

        let created = Event::DirectoryCreated {
            path: "/reports".to_string(),
            actor: "tester".to_string(),
        };
        assert_eq!(created.kind(), "directory.created");
        let uploaded = Event::FileUploaded {
            path: "/reports/q1.csv".to_string(),
            size_bytes: 12,
            actor: "tester".to_string(),
        };
        assert_eq!(uploaded.kind(), "file.uploaded");
        assert_eq!(serde_json::to_value(&uploaded)?["type"], "file_uploaded");
        Ok(())
    }

    #[tokio::test]
    async fn load_test_does_not_stall_publishers() -> TestResult<()> {
        let bus = Arc::new(EventBus::with_capacity(512));
        let mut stream = bus.subscribe(None);

        let publisher = {
            let bus = bus.clone();
            task::spawn(async move {
                for i in 0..500 {
                    let _ = bus.publish(moved(i));
                }
            })
        };

        let consumer = task::spawn(async move {
            let mut ids = HashSet::new();
            while ids.len() < 500 {
                match stream.next().await {
                    Some(event) => {
                        ids.insert(event.id);
                    }
                    None => break,
                }
            }
            ids
        });

        timeout(PUBLISH_TIMEOUT, publisher).await??;
        let ids = timeout(PUBLISH_TIMEOUT * 5, consumer).await??;
        assert_eq!(ids.len(), 500);
        Ok(())
    }
}
