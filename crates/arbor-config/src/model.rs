//! Typed configuration model and loader.

use std::path::{Component, Path, PathBuf};

use serde::Serialize;

use crate::defaults::{
    DEFAULT_LEDGER_PATH, DEFAULT_LOG_FORMAT, DEFAULT_LOG_LEVEL, DEFAULT_STORAGE_ROOT,
    DEFAULT_THUMBNAIL_ROOT, DEFAULT_TRASH_ROOT, LEDGER_PATH_KEY, LOG_FORMAT_KEY, LOG_LEVEL_KEY,
    STORAGE_ROOT_KEY, THUMBNAIL_ROOT_KEY, TRASH_ROOT_KEY,
};
use crate::error::{ConfigError, ConfigResult};

/// Locations and logging settings for one storage root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExplorerConfig {
    /// Sandbox root exposed to clients.
    pub storage_root: PathBuf,
    /// Flat quarantine directory for soft-deleted entries.
    pub trash_root: PathBuf,
    /// Derived-artifact cache directory.
    pub thumbnail_root: PathBuf,
    /// JSON file holding the trash ledger.
    pub ledger_path: PathBuf,
    /// `tracing` filter directive.
    pub log_level: String,
    /// `pretty` or `json`.
    pub log_format: String,
}

impl Default for ExplorerConfig {
    fn default() -> Self {
        Self {
            storage_root: PathBuf::from(DEFAULT_STORAGE_ROOT),
            trash_root: PathBuf::from(DEFAULT_TRASH_ROOT),
            thumbnail_root: PathBuf::from(DEFAULT_THUMBNAIL_ROOT),
            ledger_path: PathBuf::from(DEFAULT_LEDGER_PATH),
            log_level: DEFAULT_LOG_LEVEL.to_string(),
            log_format: DEFAULT_LOG_FORMAT.to_string(),
        }
    }
}

impl ExplorerConfig {
    /// Load and validate configuration from the process environment.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when a value is blank or the layout is unsafe.
    pub fn from_env() -> ConfigResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load and validate configuration from an arbitrary key lookup.
    ///
    /// Keys that are absent fall back to their defaults; keys that are present
    /// but blank are rejected.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when a value is blank or the layout is unsafe.
    pub fn from_lookup<F>(lookup: F) -> ConfigResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let text = |key: &'static str, default: &str| -> ConfigResult<String> {
            match lookup(key) {
                None => Ok(default.to_string()),
                Some(value) if value.trim().is_empty() => {
                    Err(ConfigError::invalid(key, "must not be blank", &value))
                }
                Some(value) => Ok(value.trim().to_string()),
            }
        };

        let config = Self {
            storage_root: PathBuf::from(text(STORAGE_ROOT_KEY, DEFAULT_STORAGE_ROOT)?),
            trash_root: PathBuf::from(text(TRASH_ROOT_KEY, DEFAULT_TRASH_ROOT)?),
            thumbnail_root: PathBuf::from(text(THUMBNAIL_ROOT_KEY, DEFAULT_THUMBNAIL_ROOT)?),
            ledger_path: PathBuf::from(text(LEDGER_PATH_KEY, DEFAULT_LEDGER_PATH)?),
            log_level: text(LOG_LEVEL_KEY, DEFAULT_LOG_LEVEL)?,
            log_format: text(LOG_FORMAT_KEY, DEFAULT_LOG_FORMAT)?.to_ascii_lowercase(),
        };
        config.validate()?;
        Ok(config)
    }

    /// Check invariants that must hold before the engine is constructed.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidField`] when a path is empty, when the
    /// trash area, cache or ledger lies inside the storage root, or when the
    /// log format is unknown.
    pub fn validate(&self) -> ConfigResult<()> {
        let paths = [
            (STORAGE_ROOT_KEY, &self.storage_root),
            (TRASH_ROOT_KEY, &self.trash_root),
            (THUMBNAIL_ROOT_KEY, &self.thumbnail_root),
            (LEDGER_PATH_KEY, &self.ledger_path),
        ];
        for (field, path) in paths {
            if path.as_os_str().is_empty() {
                return Err(ConfigError::invalid(field, "must not be blank", ""));
            }
        }

        if !matches!(self.log_format.as_str(), "pretty" | "json") {
            return Err(ConfigError::invalid(
                LOG_FORMAT_KEY,
                "must be pretty or json",
                &self.log_format,
            ));
        }

        let storage = absolute(STORAGE_ROOT_KEY, &self.storage_root)?;
        let private = [
            (TRASH_ROOT_KEY, &self.trash_root),
            (THUMBNAIL_ROOT_KEY, &self.thumbnail_root),
            (LEDGER_PATH_KEY, &self.ledger_path),
        ];
        for (field, path) in private {
            let resolved = absolute(field, path)?;
            if resolved.starts_with(&storage) || storage.starts_with(&resolved) {
                return Err(ConfigError::invalid(
                    field,
                    "must not overlap the storage root",
                    &path.display().to_string(),
                ));
            }
        }
        Ok(())
    }
}

fn absolute(field: &'static str, path: &Path) -> ConfigResult<PathBuf> {
    let absolute = std::path::absolute(path).map_err(|source| ConfigError::PathResolve {
        field,
        path: path.to_path_buf(),
        source,
    })?;
    Ok(lexical_clean(&absolute))
}

fn lexical_clean(path: &Path) -> PathBuf {
    let mut cleaned = PathBuf::new();
    for component in path.components() {
        match component {
            Component::ParentDir => {
                cleaned.pop();
            }
            Component::CurDir => {}
            other => cleaned.push(other),
        }
    }
    cleaned
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::error::Error;

    type TestResult<T> = Result<T, Box<dyn Error>>;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_apply_when_keys_are_absent() -> TestResult<()> {
        let config = ExplorerConfig::from_lookup(lookup(&[]))?;
        assert_eq!(config, ExplorerConfig::default());
        Ok(())
    }

    #[test]
    fn values_are_trimmed_and_format_lowercased() -> TestResult<()> {
        let temp = tempfile::tempdir()?;
        let root = temp.path().join("files");
        let trash = temp.path().join("trash");
        let padded_root = format!(" {} ", root.display());
        let trash_text = trash.display().to_string();
        let config = ExplorerConfig::from_lookup(lookup(&[
            ("STORAGE_ROOT", padded_root.as_str()),
            ("TRASH_ROOT", trash_text.as_str()),
            ("LOG_FORMAT", "JSON"),
        ]))?;
        assert_eq!(config.storage_root, root);
        assert_eq!(config.trash_root, trash);
        assert_eq!(config.log_format, "json");
        Ok(())
    }

    #[test]
    fn blank_values_are_rejected() {
        let err = ExplorerConfig::from_lookup(lookup(&[("TRASH_ROOT", "   ")]));
        assert!(matches!(
            err,
            Err(ConfigError::InvalidField {
                field: "TRASH_ROOT",
                ..
            })
        ));
    }

    #[test]
    fn trash_inside_storage_root_is_rejected() {
        let err = ExplorerConfig::from_lookup(lookup(&[
            ("STORAGE_ROOT", "/srv/arbor"),
            ("TRASH_ROOT", "/srv/arbor/.trash"),
        ]));
        assert!(matches!(
            err,
            Err(ConfigError::InvalidField {
                field: "TRASH_ROOT",
                reason: "must not overlap the storage root",
                ..
            })
        ));
    }

    #[test]
    fn overlap_check_sees_through_parent_segments() {
        let err = ExplorerConfig::from_lookup(lookup(&[
            ("STORAGE_ROOT", "/srv/arbor/files"),
            ("THUMBNAIL_ROOT", "/srv/arbor/other/../files/thumbs"),
        ]));
        assert!(matches!(
            err,
            Err(ConfigError::InvalidField {
                field: "THUMBNAIL_ROOT",
                ..
            })
        ));
    }

    #[test]
    fn unknown_log_format_is_rejected() {
        let err = ExplorerConfig::from_lookup(lookup(&[("LOG_FORMAT", "xml")]));
        assert!(matches!(
            err,
            Err(ConfigError::InvalidField {
                field: "LOG_FORMAT",
                ..
            })
        ));
    }

    #[test]
    fn config_serialises_for_diagnostics() -> TestResult<()> {
        let json = serde_json::to_value(ExplorerConfig::default())?;
        assert_eq!(json["trash_root"], "./data/.trash");
        Ok(())
    }
}
