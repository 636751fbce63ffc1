//! # Design
//!
//! - Provide structured errors whose messages double as the human-readable
//!   reason shown for a failed batch item.
//! - Capture operation context (paths, fields, inputs) to make failures reproducible in tests.
//! - Classify OS errors into the domain taxonomy at construction time; keep the
//!   OS text only when no mapping exists.

use std::fmt;
use std::io;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::ledger::LedgerError;

/// Result type for filesystem operations.
pub type FsOpsResult<T> = Result<T, FsOpsError>;

/// Errors produced by the mutation engine.
#[derive(Debug, Error)]
pub enum FsOpsError {
    /// The virtual path is malformed (control characters, NUL bytes, bad encoding).
    #[error("{reason}")]
    InvalidPath {
        /// Path as supplied by the caller.
        path: String,
        /// Static reason for the failure.
        reason: &'static str,
    },
    /// The virtual path tries to leave the storage root.
    #[error("path traversal attempt detected")]
    PathTraversal {
        /// Path as supplied by the caller.
        path: String,
    },
    /// A filename failed sanitisation.
    #[error("{reason}")]
    InvalidFilename {
        /// Name as supplied by the caller.
        name: String,
        /// Static reason for the failure.
        reason: &'static str,
    },
    /// The referenced entry does not exist.
    #[error("{reason}")]
    NotFound {
        /// Path or identifier that was not found.
        path: String,
        /// Static reason for the failure.
        reason: &'static str,
    },
    /// The target location is already occupied.
    #[error("{reason}")]
    AlreadyExists {
        /// Occupied path.
        path: String,
        /// Static reason for the failure.
        reason: &'static str,
    },
    /// The request collides with existing state and was not applied.
    #[error("{reason}")]
    Conflict {
        /// Path the conflict was detected at.
        path: String,
        /// Static reason for the failure.
        reason: &'static str,
        /// Colliding relative paths, when the conflict is a list.
        conflicts: Vec<String>,
    },
    /// The operation is never allowed on this path.
    #[error("{reason}")]
    Forbidden {
        /// Path the operation targeted.
        path: String,
        /// Static reason for the failure.
        reason: &'static str,
    },
    /// The operating system refused access.
    #[error("permission denied")]
    PermissionDenied {
        /// Operation that triggered the failure.
        operation: &'static str,
        /// Real path involved in the failure.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// Unsupported entry type or mode.
    #[error("{reason}")]
    Unsupported {
        /// Operation that is unsupported.
        operation: &'static str,
        /// Static reason for the failure.
        reason: &'static str,
        /// Optional value that triggered the unsupported error.
        value: Option<String>,
    },
    /// Input validation failures.
    #[error("{field}: {reason}")]
    InvalidInput {
        /// Field that failed validation.
        field: &'static str,
        /// Static reason for the failure.
        reason: &'static str,
        /// Offending value when available.
        value: Option<String>,
    },
    /// The batch was cancelled before this item started.
    #[error("cancelled before start")]
    Cancelled,
    /// IO failures without a domain mapping.
    #[error("filesystem operation failed: {source}")]
    Io {
        /// Operation that triggered the IO failure.
        operation: &'static str,
        /// Path involved in the IO failure.
        path: PathBuf,
        /// Underlying IO error.
        source: io::Error,
    },
    /// Walkdir traversal failures.
    #[error("directory walk failed: {source}")]
    Walkdir {
        /// Operation that triggered the walkdir failure.
        operation: &'static str,
        /// Path involved in the walkdir failure.
        path: PathBuf,
        /// Underlying walkdir error.
        source: walkdir::Error,
    },
    /// Zip archive failures.
    #[error("archive operation failed: {source}")]
    Zip {
        /// Operation that triggered the archive failure.
        operation: &'static str,
        /// Path involved in the archive failure.
        path: PathBuf,
        /// Underlying zip error.
        source: zip::result::ZipError,
    },
    /// Trash ledger failures.
    #[error("trash ledger failure: {source}")]
    Ledger {
        /// Operation that triggered the ledger failure.
        operation: &'static str,
        /// Underlying ledger error.
        source: LedgerError,
    },
}

/// Coarse classification of [`FsOpsError`] for transport mapping and audit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Malformed virtual path.
    InvalidPath,
    /// Attempted escape from the storage root.
    PathTraversal,
    /// Filename rejected by sanitisation.
    InvalidFilename,
    /// Missing entry or record.
    NotFound,
    /// Target already occupied.
    AlreadyExists,
    /// Collision or skip under the active conflict policy.
    Conflict,
    /// Root-path operations and OS permission failures.
    Forbidden,
    /// Entry type or mode the engine refuses to handle.
    Unsupported,
    /// Request-level validation failure.
    Validation,
    /// Cancelled before start.
    Cancelled,
    /// Storage or ledger failure without a domain mapping.
    Internal,
}

impl ErrorKind {
    /// Stable machine-readable code.
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::InvalidPath => "INVALID_PATH",
            Self::PathTraversal => "PATH_TRAVERSAL",
            Self::InvalidFilename => "INVALID_FILENAME",
            Self::NotFound => "NOT_FOUND",
            Self::AlreadyExists => "ALREADY_EXISTS",
            Self::Conflict => "CONFLICT",
            Self::Forbidden => "FORBIDDEN",
            Self::Unsupported => "UNSUPPORTED",
            Self::Validation => "BAD_REQUEST",
            Self::Cancelled => "CANCELLED",
            Self::Internal => "INTERNAL",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FsOpsError {
    /// Classify the error into the domain taxonomy.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidPath { .. } => ErrorKind::InvalidPath,
            Self::PathTraversal { .. } => ErrorKind::PathTraversal,
            Self::InvalidFilename { .. } => ErrorKind::InvalidFilename,
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::AlreadyExists { .. } => ErrorKind::AlreadyExists,
            Self::Conflict { .. } => ErrorKind::Conflict,
            Self::Forbidden { .. } | Self::PermissionDenied { .. } => ErrorKind::Forbidden,
            Self::Unsupported { .. } => ErrorKind::Unsupported,
            Self::InvalidInput { .. } => ErrorKind::Validation,
            Self::Cancelled => ErrorKind::Cancelled,
            Self::Io { .. } | Self::Walkdir { .. } | Self::Zip { .. } | Self::Ledger { .. } => {
                ErrorKind::Internal
            }
        }
    }

    /// Colliding paths carried by a [`FsOpsError::Conflict`]; empty otherwise.
    #[must_use]
    pub fn conflicts(&self) -> &[String] {
        match self {
            Self::Conflict { conflicts, .. } => conflicts,
            _ => &[],
        }
    }

    /// Map an IO error onto the taxonomy, keeping unmapped errors as [`FsOpsError::Io`].
    pub(crate) fn io(operation: &'static str, path: impl Into<PathBuf>, source: io::Error) -> Self {
        let path = path.into();
        match source.kind() {
            io::ErrorKind::NotFound => Self::NotFound {
                path: path.display().to_string(),
                reason: "path not found",
            },
            io::ErrorKind::AlreadyExists => Self::AlreadyExists {
                path: path.display().to_string(),
                reason: "target path already exists",
            },
            io::ErrorKind::PermissionDenied => Self::PermissionDenied {
                operation,
                path,
                source,
            },
            _ => Self::Io {
                operation,
                path,
                source,
            },
        }
    }

    pub(crate) fn walkdir(
        operation: &'static str,
        path: impl Into<PathBuf>,
        source: walkdir::Error,
    ) -> Self {
        Self::Walkdir {
            operation,
            path: path.into(),
            source,
        }
    }

    pub(crate) fn zip(
        operation: &'static str,
        path: impl Into<PathBuf>,
        source: zip::result::ZipError,
    ) -> Self {
        match source {
            zip::result::ZipError::Io(err) => Self::io(operation, path, err),
            other => Self::Zip {
                operation,
                path: path.into(),
                source: other,
            },
        }
    }

    pub(crate) fn ledger(operation: &'static str, source: LedgerError) -> Self {
        Self::Ledger { operation, source }
    }

    pub(crate) fn not_found(path: impl fmt::Display) -> Self {
        Self::NotFound {
            path: path.to_string(),
            reason: "path not found",
        }
    }

    pub(crate) fn forbidden(path: impl fmt::Display, reason: &'static str) -> Self {
        Self::Forbidden {
            path: path.to_string(),
            reason,
        }
    }

    pub(crate) fn invalid_input(
        field: &'static str,
        reason: &'static str,
        value: Option<String>,
    ) -> Self {
        Self::InvalidInput {
            field,
            reason,
            value,
        }
    }
}
