//! Sandboxed mutations over the storage root.
//!
//! # Design
//! - Every call validates the whole request before touching the filesystem;
//!   a request that fails validation has no side effects.
//! - Batch calls are best effort. Each input lands in exactly one of the
//!   success or failure lists, in input order, and one bad item never stops
//!   the others.
//! - Successful mutations publish a typed event; publishing never blocks or
//!   fails the mutation.
//! - One operation sample is recorded per call and one item sample per batch
//!   item.

use std::fs::{self, File};
use std::io::{self, Read};

use arbor_events::{Event, EventBus, JobOutcome};
use arbor_telemetry::Metrics;
use tracing::{info, warn};
use uuid::Uuid;

use crate::archive;
use crate::conflict::{ConflictPolicy, ConflictResolver, Resolution};
use crate::error::{FsOpsError, FsOpsResult};
use crate::jobs::{JobKind, JobTracker};
use crate::model::{
    Actor, BatchOutcome, CancelFlag, CompressOutcome, CompressRequest, DecompressOutcome,
    DecompressRequest, ItemFailure, RenameOutcome, Transfer, TransferRequest, TrashRecord,
    TrashedItem, WriteOutcome,
};
use crate::names::sanitize_filename;
use crate::sandbox::{PathSandbox, VirtualPath};
use crate::transfer::{LinkHandling, copy_tree, entry_exists, relocate};
use crate::trash::TrashStore;

/// Executes renames, directory creation, file writes, batch
/// move/copy/delete/restore and archive operations.
#[derive(Clone)]
pub struct MutationEngine {
    sandbox: PathSandbox,
    resolver: ConflictResolver,
    trash: TrashStore,
    jobs: JobTracker,
    events: EventBus,
    metrics: Metrics,
}

impl MutationEngine {
    /// Engine over `sandbox`, deleting into `trash`.
    #[must_use]
    pub fn new(sandbox: PathSandbox, trash: TrashStore, events: EventBus, metrics: Metrics) -> Self {
        Self {
            resolver: ConflictResolver::new(sandbox.clone()),
            jobs: JobTracker::new(events.clone()),
            sandbox,
            trash,
            events,
            metrics,
        }
    }

    /// The sandbox every path goes through.
    #[must_use]
    pub const fn sandbox(&self) -> &PathSandbox {
        &self.sandbox
    }

    /// The trash store backing deletes and restores.
    #[must_use]
    pub const fn trash(&self) -> &TrashStore {
        &self.trash
    }

    /// Lifecycle records of batch jobs run by this engine.
    #[must_use]
    pub const fn jobs(&self) -> &JobTracker {
        &self.jobs
    }

    /// Bus receiving mutation events.
    #[must_use]
    pub const fn events(&self) -> &EventBus {
        &self.events
    }

    /// Rename an entry in place.
    ///
    /// # Errors
    ///
    /// Returns [`FsOpsError::InvalidFilename`] for a rejected name,
    /// [`FsOpsError::Forbidden`] for the root, [`FsOpsError::NotFound`] when
    /// the entry is missing and [`FsOpsError::AlreadyExists`] when the new
    /// name is taken.
    pub fn rename(&self, path: &str, new_name: &str, actor: &Actor) -> FsOpsResult<RenameOutcome> {
        let result = self.rename_entry(path, new_name, actor);
        self.record("rename", &result);
        result
    }

    fn rename_entry(&self, path: &str, new_name: &str, actor: &Actor) -> FsOpsResult<RenameOutcome> {
        let source = self.sandbox.parse(path)?;
        let name = sanitize_filename(new_name, false)?;
        let Some(parent) = source.parent() else {
            return Err(FsOpsError::forbidden(&source, "root path cannot be renamed"));
        };

        let from = self.sandbox.real(&source)?;
        if !entry_exists(&from)? {
            return Err(FsOpsError::not_found(&source));
        }
        let target = parent.join(&name)?;
        let to = self.sandbox.real(&target)?;
        if entry_exists(&to)? {
            return Err(FsOpsError::AlreadyExists {
                path: target.to_string(),
                reason: "target path already exists",
            });
        }

        fs::rename(&from, &to).map_err(|err| FsOpsError::io("rename", &from, err))?;
        info!(from = %source, to = %target, "entry renamed");
        self.publish(Event::FileRenamed {
            from: source.to_string(),
            to: target.to_string(),
            actor: actor.username.clone(),
        });
        Ok(RenameOutcome {
            old_path: source,
            new_path: target,
            name,
        })
    }

    /// Create the directory `name` under `parent`; a blank parent means root.
    ///
    /// # Errors
    ///
    /// Returns [`FsOpsError::InvalidFilename`] for a rejected name and
    /// [`FsOpsError::AlreadyExists`] when the entry is already present.
    pub fn create_directory(
        &self,
        parent: &str,
        name: &str,
        actor: &Actor,
    ) -> FsOpsResult<VirtualPath> {
        let result = self.make_directory(parent, name, actor);
        self.record("create_directory", &result);
        result
    }

    fn make_directory(&self, parent: &str, name: &str, actor: &Actor) -> FsOpsResult<VirtualPath> {
        let name = sanitize_filename(name, false)?;
        let target = self.sandbox.parse(parent)?.join(&name)?;
        let real = self.sandbox.real(&target)?;
        if entry_exists(&real)? {
            return Err(FsOpsError::AlreadyExists {
                path: target.to_string(),
                reason: "directory already exists",
            });
        }

        fs::create_dir_all(&real).map_err(|err| FsOpsError::io("create_directory", &real, err))?;
        info!(path = %target, "directory created");
        self.publish(Event::DirectoryCreated {
            path: target.to_string(),
            actor: actor.username.clone(),
        });
        Ok(target)
    }

    /// Stream `reader` into a new file `name` under `destination`.
    ///
    /// The destination directory is created when missing and the target name
    /// goes through the conflict policy. A failed copy removes the partial
    /// file.
    ///
    /// # Errors
    ///
    /// Returns [`FsOpsError::InvalidFilename`] for a rejected name,
    /// [`FsOpsError::Conflict`] when the policy is `skip` and the name is
    /// taken, or the IO error from reading or writing.
    pub fn write_file<R: Read>(
        &self,
        destination: &str,
        name: &str,
        policy: ConflictPolicy,
        reader: &mut R,
        actor: &Actor,
    ) -> FsOpsResult<WriteOutcome> {
        let result = self.write_content(destination, name, policy, reader, actor);
        self.record("write_file", &result);
        result
    }

    fn write_content<R: Read>(
        &self,
        destination: &str,
        name: &str,
        policy: ConflictPolicy,
        reader: &mut R,
        actor: &Actor,
    ) -> FsOpsResult<WriteOutcome> {
        let name = sanitize_filename(name, false)?;
        let destination = self.sandbox.parse(destination)?;
        let dest_real = self.sandbox.real(&destination)?;
        fs::create_dir_all(&dest_real)
            .map_err(|err| FsOpsError::io("write_file.create_destination", &dest_real, err))?;
        if !fs::metadata(&dest_real).is_ok_and(|meta| meta.is_dir()) {
            return Err(FsOpsError::invalid_input(
                "destination",
                "destination is not a directory",
                Some(destination.to_string()),
            ));
        }

        let target = self.resolve_target(&destination.join(&name)?, policy)?;
        let real = self.sandbox.real(&target)?;
        let mut file =
            File::create_new(&real).map_err(|err| FsOpsError::io("write_file.create", &real, err))?;
        let size = match io::copy(reader, &mut file).and_then(|size| file.sync_all().map(|()| size)) {
            Ok(size) => size,
            Err(err) => {
                drop(file);
                if let Err(cleanup) = fs::remove_file(&real) {
                    warn!(path = %target, error = %cleanup, "partial file could not be removed");
                }
                return Err(FsOpsError::io("write_file.copy", &real, err));
            }
        };

        info!(path = %target, size, "file written");
        self.publish(Event::FileUploaded {
            path: target.to_string(),
            size_bytes: size,
            actor: actor.username.clone(),
        });
        Ok(WriteOutcome {
            path: target,
            name,
            size,
        })
    }

    /// Move every source into the destination directory.
    ///
    /// # Errors
    ///
    /// Aborts with an error only when the request itself is invalid: no
    /// sources, or a destination that cannot be resolved or created.
    /// Per-item problems are reported in the returned outcome.
    pub fn move_items(
        &self,
        request: &TransferRequest,
        actor: &Actor,
        cancel: &CancelFlag,
    ) -> FsOpsResult<BatchOutcome<Transfer>> {
        let destination = self.prepare_transfer("move", request)?;
        Ok(self.run_batch(JobKind::Move, &request.sources, cancel, |raw| {
            self.move_one(raw, &destination, request.policy, actor)
        }))
    }

    fn move_one(
        &self,
        raw: &str,
        destination: &VirtualPath,
        policy: ConflictPolicy,
        actor: &Actor,
    ) -> FsOpsResult<Transfer> {
        let (source, desired) = self.transfer_target(raw, destination, "root path cannot be moved")?;
        if desired == source {
            return Ok(Transfer {
                from: source,
                to: desired,
            });
        }
        guard_nesting(&source, &desired, policy)?;

        let target = self.resolve_target(&desired, policy)?;
        relocate(&self.sandbox.real(&source)?, &self.sandbox.real(&target)?)?;
        self.publish(Event::FileMoved {
            from: source.to_string(),
            to: target.to_string(),
            actor: actor.username.clone(),
        });
        Ok(Transfer {
            from: source,
            to: target,
        })
    }

    /// Copy every source, recursively, into the destination directory.
    ///
    /// Symbolic links below a source directory are left out of the copy.
    ///
    /// # Errors
    ///
    /// Same request-level errors as [`MutationEngine::move_items`].
    pub fn copy_items(
        &self,
        request: &TransferRequest,
        actor: &Actor,
        cancel: &CancelFlag,
    ) -> FsOpsResult<BatchOutcome<Transfer>> {
        let destination = self.prepare_transfer("copy", request)?;
        Ok(self.run_batch(JobKind::Copy, &request.sources, cancel, |raw| {
            self.copy_one(raw, &destination, request.policy, actor)
        }))
    }

    fn copy_one(
        &self,
        raw: &str,
        destination: &VirtualPath,
        policy: ConflictPolicy,
        actor: &Actor,
    ) -> FsOpsResult<Transfer> {
        let (source, desired) = self.transfer_target(raw, destination, "root path cannot be copied")?;
        if desired == source && policy == ConflictPolicy::Overwrite {
            return Err(FsOpsError::invalid_input(
                "destination",
                "cannot overwrite an entry with itself",
                Some(desired.to_string()),
            ));
        }
        guard_nesting(&source, &desired, policy)?;

        let target = self.resolve_target(&desired, policy)?;
        let stats = copy_tree(
            &self.sandbox.real(&source)?,
            &self.sandbox.real(&target)?,
            LinkHandling::Skip,
        )?;
        info!(
            from = %source,
            to = %target,
            files = stats.files,
            bytes = stats.bytes,
            skipped = stats.skipped,
            "entry copied"
        );
        self.publish(Event::FileCopied {
            from: source.to_string(),
            to: target.to_string(),
            actor: actor.username.clone(),
        });
        Ok(Transfer {
            from: source,
            to: target,
        })
    }

    /// Soft-delete every path into the trash.
    ///
    /// # Errors
    ///
    /// Aborts only when `paths` is empty.
    pub fn delete_items(
        &self,
        paths: &[String],
        actor: &Actor,
        cancel: &CancelFlag,
    ) -> FsOpsResult<BatchOutcome<TrashedItem>> {
        self.require_items("delete", "paths", paths)?;
        Ok(self.run_batch(JobKind::Delete, paths, cancel, |raw| {
            let path = self.sandbox.parse(raw)?;
            if path.is_root() {
                return Err(FsOpsError::forbidden(&path, "root path cannot be deleted"));
            }
            let record = self.trash.soft_delete(&path, actor)?;
            self.publish(Event::FileDeleted {
                path: path.to_string(),
                trash_id: record.id,
                actor: actor.username.clone(),
            });
            Ok(TrashedItem {
                path,
                trash_id: record.id,
            })
        }))
    }

    /// Restore the most recently deleted version of every path.
    ///
    /// # Errors
    ///
    /// Aborts only when `paths` is empty.
    pub fn restore_items(
        &self,
        paths: &[String],
        actor: &Actor,
        cancel: &CancelFlag,
    ) -> FsOpsResult<BatchOutcome<TrashedItem>> {
        self.require_items("restore", "paths", paths)?;
        Ok(self.run_batch(JobKind::Restore, paths, cancel, |raw| {
            let path = self.sandbox.parse(raw)?;
            if path.is_root() {
                return Err(FsOpsError::forbidden(&path, "root path cannot be restored"));
            }
            let record = self.trash.restore_latest(&path, actor)?;
            self.publish(Event::FileRestored {
                path: path.to_string(),
                trash_id: record.id,
                actor: actor.username.clone(),
            });
            Ok(TrashedItem {
                path,
                trash_id: record.id,
            })
        }))
    }

    /// Write every source into a new zip archive.
    ///
    /// # Errors
    ///
    /// Returns [`FsOpsError::InvalidFilename`] for a rejected archive name,
    /// [`FsOpsError::AlreadyExists`] when the archive exists,
    /// [`FsOpsError::NotFound`] for a missing source,
    /// [`FsOpsError::Unsupported`] for a symbolic-link source, or the archive
    /// error.
    pub fn compress(
        &self,
        request: &CompressRequest,
        actor: &Actor,
    ) -> FsOpsResult<CompressOutcome> {
        let result = self.compress_sources(request, actor);
        self.record("compress", &result);
        result
    }

    fn compress_sources(
        &self,
        request: &CompressRequest,
        actor: &Actor,
    ) -> FsOpsResult<CompressOutcome> {
        if request.sources.is_empty() {
            return Err(missing_items("sources"));
        }
        let mut name = sanitize_filename(&request.name, false)?;
        if !name.to_ascii_lowercase().ends_with(".zip") {
            name.push_str(".zip");
        }
        let destination = self.sandbox.parse(&request.destination)?;
        let target = destination.join(&name)?;

        let mut sources = Vec::with_capacity(request.sources.len());
        for raw in &request.sources {
            let source = self.sandbox.parse(raw)?;
            if source.is_root() {
                return Err(FsOpsError::forbidden(&source, "root path cannot be compressed"));
            }
            let real = self.sandbox.real(&source)?;
            if !entry_exists(&real)? {
                return Err(FsOpsError::not_found(&source));
            }
            sources.push(real);
        }

        let output = self.sandbox.real(&target)?;
        if entry_exists(&output)? {
            return Err(FsOpsError::AlreadyExists {
                path: target.to_string(),
                reason: "target zip already exists",
            });
        }
        let dest_real = self.sandbox.real(&destination)?;
        fs::create_dir_all(&dest_real)
            .map_err(|err| FsOpsError::io("compress.create_destination", &dest_real, err))?;

        let summary = archive::write_zip(&output, &sources)?;
        info!(path = %target, entries = summary.entries, size = summary.size, "archive created");
        self.publish(Event::FileCompressed {
            path: target.to_string(),
            size_bytes: summary.size,
            actor: actor.username.clone(),
        });
        Ok(CompressOutcome {
            path: target,
            size: summary.size,
            entries: summary.entries,
        })
    }

    /// Extract a zip archive into the destination directory.
    ///
    /// # Errors
    ///
    /// Returns [`FsOpsError::PathTraversal`] when any entry would land
    /// outside the destination and, unless the policy is `overwrite`,
    /// [`FsOpsError::Conflict`] listing the colliding entries. Nothing is
    /// written in either case.
    pub fn decompress(
        &self,
        request: &DecompressRequest,
        actor: &Actor,
    ) -> FsOpsResult<DecompressOutcome> {
        let result = self.decompress_archive(request, actor);
        self.record("decompress", &result);
        result
    }

    fn decompress_archive(
        &self,
        request: &DecompressRequest,
        actor: &Actor,
    ) -> FsOpsResult<DecompressOutcome> {
        let source = self.sandbox.parse(&request.source)?;
        let destination = self.sandbox.parse(&request.destination)?;
        let archive_path = self.sandbox.real(&source)?;
        match fs::symlink_metadata(&archive_path) {
            Ok(meta) if meta.is_file() => {}
            Ok(_) => {
                return Err(FsOpsError::invalid_input(
                    "source",
                    "archive must be a regular file",
                    Some(source.to_string()),
                ));
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                return Err(FsOpsError::not_found(&source));
            }
            Err(err) => return Err(FsOpsError::io("decompress.stat", &archive_path, err)),
        }
        let dest_real = self.sandbox.real(&destination)?;

        let entries = archive::scan(&archive_path)?;
        if request.policy != ConflictPolicy::Overwrite {
            let conflicts = archive::find_collisions(&entries, &dest_real)?;
            if !conflicts.is_empty() {
                warn!(
                    archive = %source,
                    destination = %destination,
                    collisions = conflicts.len(),
                    "archive extraction refused"
                );
                return Err(FsOpsError::Conflict {
                    path: destination.to_string(),
                    reason: "archive entries collide with existing files",
                    conflicts,
                });
            }
        }

        let files = archive::extract(&archive_path, &dest_real)?;
        info!(archive = %source, destination = %destination, entries = files.len(), "archive extracted");
        self.publish(Event::FileDecompressed {
            destination: destination.to_string(),
            files: files.clone(),
            actor: actor.username.clone(),
        });
        Ok(DecompressOutcome { destination, files })
    }

    /// Records in the trash, newest first.
    ///
    /// # Errors
    ///
    /// Returns the ledger error.
    pub fn list_trash(&self, include_restored: bool) -> FsOpsResult<Vec<TrashRecord>> {
        self.trash.list(include_restored)
    }

    /// Permanently remove one live trash record and its data.
    ///
    /// # Errors
    ///
    /// Returns [`FsOpsError::NotFound`] for an unknown or restored record.
    pub fn purge(&self, id: Uuid) -> FsOpsResult<TrashRecord> {
        let result = self.trash.permanent_delete(id);
        if let Ok(record) = &result {
            self.purged(record);
        }
        self.record("purge", &result);
        result
    }

    /// Permanently remove every live trash record; returns those removed.
    ///
    /// # Errors
    ///
    /// Returns the ledger error when the records cannot be listed.
    pub fn empty_trash(&self) -> FsOpsResult<Vec<TrashRecord>> {
        let result = self.trash.empty_trash();
        if let Ok(records) = &result {
            for record in records {
                self.purged(record);
            }
        }
        self.record("empty_trash", &result);
        result
    }

    fn purged(&self, record: &TrashRecord) {
        self.metrics.add_trash_purged(1);
        self.publish(Event::TrashPurged {
            trash_id: record.id,
            original_path: record.original_path.to_string(),
        });
    }

    /// Validate a move/copy request and create its destination directory.
    fn prepare_transfer(
        &self,
        operation: &'static str,
        request: &TransferRequest,
    ) -> FsOpsResult<VirtualPath> {
        self.require_items(operation, "sources", &request.sources)?;
        let prepared = self.sandbox.parse(&request.destination).and_then(|destination| {
            let real = self.sandbox.real(&destination)?;
            fs::create_dir_all(&real)
                .map_err(|err| FsOpsError::io("transfer.create_destination", &real, err))?;
            if !fs::metadata(&real).is_ok_and(|meta| meta.is_dir()) {
                return Err(FsOpsError::invalid_input(
                    "destination",
                    "destination is not a directory",
                    Some(destination.to_string()),
                ));
            }
            Ok(destination)
        });
        if let Err(err) = &prepared {
            warn!(operation, error = %err, "batch request rejected");
            self.metrics.inc_operation(operation, "failure");
        }
        prepared
    }

    fn require_items(
        &self,
        operation: &'static str,
        field: &'static str,
        items: &[String],
    ) -> FsOpsResult<()> {
        if items.is_empty() {
            self.metrics.inc_operation(operation, "failure");
            return Err(missing_items(field));
        }
        Ok(())
    }

    /// Parse one transfer source and compute `destination/basename(source)`.
    fn transfer_target(
        &self,
        raw: &str,
        destination: &VirtualPath,
        root_reason: &'static str,
    ) -> FsOpsResult<(VirtualPath, VirtualPath)> {
        let source = self.sandbox.parse(raw)?;
        let Some(name) = source.file_name() else {
            return Err(FsOpsError::forbidden(&source, root_reason));
        };
        if !entry_exists(&self.sandbox.real(&source)?)? {
            return Err(FsOpsError::not_found(&source));
        }
        let desired = destination.join(name)?;
        Ok((source, desired))
    }

    fn resolve_target(
        &self,
        desired: &VirtualPath,
        policy: ConflictPolicy,
    ) -> FsOpsResult<VirtualPath> {
        match self.resolver.resolve(desired, policy)? {
            Resolution::Proceed(target) => Ok(target),
            Resolution::Skip => Err(FsOpsError::Conflict {
                path: desired.to_string(),
                reason: "skipped: target already exists",
                conflicts: Vec::new(),
            }),
        }
    }

    fn run_batch<T>(
        &self,
        kind: JobKind,
        items: &[String],
        cancel: &CancelFlag,
        mut apply: impl FnMut(&str) -> FsOpsResult<T>,
    ) -> BatchOutcome<T> {
        let operation = kind.as_str();
        let job = self.jobs.enqueue(kind, items.len());
        if let Err(err) = self.jobs.start(job.id) {
            warn!(job_id = %job.id, error = %err, "job could not be started");
        }

        let mut outcome = BatchOutcome::default();
        for item in items {
            let result = if cancel.is_cancelled() {
                Err(FsOpsError::Cancelled)
            } else {
                apply(item)
            };
            match result {
                Ok(value) => {
                    self.metrics.inc_item(operation, "success");
                    outcome.succeeded.push(value);
                }
                Err(err) => {
                    warn!(operation, item = %item, error = %err, "batch item failed");
                    self.metrics.inc_item(operation, "failure");
                    outcome.failed.push(ItemFailure::new(item.clone(), &err));
                }
            }
        }

        if let Err(err) = self.jobs.finish(job.id, &outcome) {
            warn!(job_id = %job.id, error = %err, "job could not be finished");
        }
        let status = match outcome.job_outcome() {
            JobOutcome::Completed => "success",
            JobOutcome::Partial => "partial",
            JobOutcome::Failed => "failure",
        };
        self.metrics.inc_operation(operation, status);
        info!(
            operation,
            job_id = %job.id,
            succeeded = outcome.succeeded.len(),
            failed = outcome.failed.len(),
            "batch finished"
        );
        outcome
    }

    fn record<T>(&self, operation: &'static str, result: &FsOpsResult<T>) {
        match result {
            Ok(_) => self.metrics.inc_operation(operation, "success"),
            Err(err) => {
                warn!(operation, error = %err, kind = %err.kind(), "operation failed");
                self.metrics.inc_operation(operation, "failure");
            }
        }
    }

    fn publish(&self, event: Event) {
        self.metrics.inc_event(event.kind());
        self.events.publish(event);
    }
}

/// Refuse targets inside the source, and overwrites that would remove the source.
fn guard_nesting(
    source: &VirtualPath,
    desired: &VirtualPath,
    policy: ConflictPolicy,
) -> FsOpsResult<()> {
    if desired.is_descendant_of(source) {
        return Err(FsOpsError::invalid_input(
            "destination",
            "cannot place a directory inside itself",
            Some(desired.to_string()),
        ));
    }
    if policy == ConflictPolicy::Overwrite && source.is_descendant_of(desired) {
        return Err(FsOpsError::invalid_input(
            "destination",
            "cannot overwrite a directory containing the source",
            Some(desired.to_string()),
        ));
    }
    Ok(())
}

fn missing_items(field: &'static str) -> FsOpsError {
    FsOpsError::invalid_input(field, "at least one entry is required", None)
}
