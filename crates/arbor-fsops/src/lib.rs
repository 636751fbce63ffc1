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

//! Sandboxed filesystem mutations for the Arbor file explorer.
//!
//! Every request goes through [`PathSandbox`] to obtain real paths confined
//! to the storage root, then through [`ConflictResolver`] for targets that may
//! already exist, and only then touches the filesystem. Deletes never remove
//! data: they move it into the [`TrashStore`], which keeps a ledger of what
//! was trashed so it can be restored or purged later. [`MutationEngine`] ties
//! these together and reports batch results per item.

pub mod archive;
pub mod artifacts;
pub mod conflict;
pub mod engine;
pub mod error;
pub mod jobs;
pub mod ledger;
pub mod model;
pub mod names;
pub mod sandbox;
pub mod transfer;
pub mod trash;

pub use artifacts::{ArtifactCache, THUMBNAIL_SIZES, ThumbnailCache};
pub use conflict::{ConflictPolicy, ConflictResolver, MAX_RENAME_ATTEMPTS, Resolution};
pub use engine::MutationEngine;
pub use error::{ErrorKind, FsOpsError, FsOpsResult};
pub use jobs::{JobKind, JobRecord, JobState, JobTracker};
pub use ledger::{JsonFileLedger, LedgerError, LedgerResult, MemoryLedger, TrashLedger};
pub use model::{
    Actor, BatchOutcome, CancelFlag, CompressOutcome, CompressRequest, DecompressOutcome,
    DecompressRequest, ItemFailure, RenameOutcome, Transfer, TransferRequest, TrashRecord,
    TrashedItem, WriteOutcome,
};
pub use names::{MAX_FILENAME_BYTES, sanitize_filename};
pub use sandbox::{PathSandbox, VirtualPath};
pub use transfer::{CopyStats, LinkHandling, copy_tree, relocate};
pub use trash::TrashStore;
