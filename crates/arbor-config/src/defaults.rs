//! Default locations and logging settings.
//!
//! # Design
//! - Keep the quarantine area, cache and ledger beside the storage root, never
//!   inside it.

/// Default sandbox root.
pub const DEFAULT_STORAGE_ROOT: &str = "./data/files";
/// Default trash area.
pub const DEFAULT_TRASH_ROOT: &str = "./data/.trash";
/// Default thumbnail cache directory.
pub const DEFAULT_THUMBNAIL_ROOT: &str = "./data/.thumbnails";
/// Default trash ledger file.
pub const DEFAULT_LEDGER_PATH: &str = "./data/trash-ledger.json";
/// Default `tracing` filter directive.
pub const DEFAULT_LOG_LEVEL: &str = "info";
/// Default log output format.
pub const DEFAULT_LOG_FORMAT: &str = "pretty";

pub(crate) const STORAGE_ROOT_KEY: &str = "STORAGE_ROOT";
pub(crate) const TRASH_ROOT_KEY: &str = "TRASH_ROOT";
pub(crate) const THUMBNAIL_ROOT_KEY: &str = "THUMBNAIL_ROOT";
pub(crate) const LEDGER_PATH_KEY: &str = "TRASH_LEDGER_PATH";
pub(crate) const LOG_LEVEL_KEY: &str = "LOG_LEVEL";
pub(crate) const LOG_FORMAT_KEY: &str = "LOG_FORMAT";
