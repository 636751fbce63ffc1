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

//! Environment-driven configuration for the Arbor filesystem engine.
//!
//! Configuration is read once at startup from a key lookup (the process
//! environment in production, a map in tests) and validated before any
//! directory is touched.

mod defaults;
pub mod error;
pub mod model;

pub use defaults::{
    DEFAULT_LEDGER_PATH, DEFAULT_LOG_FORMAT, DEFAULT_LOG_LEVEL, DEFAULT_STORAGE_ROOT,
    DEFAULT_THUMBNAIL_ROOT, DEFAULT_TRASH_ROOT,
};
pub use error::{ConfigError, ConfigResult};
pub use model::ExplorerConfig;
