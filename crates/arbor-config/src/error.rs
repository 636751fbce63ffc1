//! Error types for configuration loading.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Result alias for configuration operations.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Primary error type for configuration operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Field contained an invalid value.
    #[error("invalid configuration field")]
    InvalidField {
        /// Environment key that failed validation.
        field: &'static str,
        /// Offending value when available.
        value: Option<String>,
        /// Machine-readable reason for the failure.
        reason: &'static str,
    },
    /// A configured path could not be made absolute.
    #[error("failed to resolve configured path")]
    PathResolve {
        /// Environment key holding the path.
        field: &'static str,
        /// Path as configured.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
}

impl ConfigError {
    pub(crate) fn invalid(field: &'static str, reason: &'static str, value: &str) -> Self {
        Self::InvalidField {
            field,
            value: Some(value.to_string()),
            reason,
        }
    }
}
