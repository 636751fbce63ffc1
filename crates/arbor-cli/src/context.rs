//! Error types, configuration loading and engine wiring for the CLI.

use std::fmt::{self, Display, Formatter};
use std::fs;
use std::str::FromStr;
use std::sync::Arc;

use anyhow::anyhow;
use arbor_config::{ConfigError, ExplorerConfig};
use arbor_events::EventBus;
use arbor_fsops::{
    Actor, ErrorKind, FsOpsError, JsonFileLedger, MutationEngine, PathSandbox, ThumbnailCache,
    TrashStore,
};
use arbor_telemetry::{LogFormat, LoggingConfig, Metrics, build_sha, init_logging};
use tracing::debug;

use crate::cli::{Cli, OutputFormat};

/// CLI-level error type to distinguish validation from operational failures.
#[derive(Debug)]
pub(crate) enum CliError {
    Validation(String),
    Failure(anyhow::Error),
}

/// Convenience alias for functions returning a `CliError`.
pub(crate) type CliResult<T> = Result<T, CliError>;

impl CliError {
    pub(crate) fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub(crate) fn failure(error: impl Into<anyhow::Error>) -> Self {
        Self::Failure(error.into())
    }

    pub(crate) const fn exit_code(&self) -> i32 {
        match self {
            Self::Validation(_) => 2,
            Self::Failure(_) => 3,
        }
    }

    pub(crate) fn display_message(&self) -> String {
        match self {
            Self::Validation(message) => message.clone(),
            Self::Failure(error) => format!("{error:#}"),
        }
    }
}

impl Display for CliError {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        formatter.write_str("cli error")
    }
}

impl std::error::Error for CliError {}

impl From<FsOpsError> for CliError {
    fn from(err: FsOpsError) -> Self {
        let mut message = err.to_string();
        if !err.conflicts().is_empty() {
            message = format!("{message}: {}", err.conflicts().join(", "));
        }
        match err.kind() {
            ErrorKind::InvalidPath
            | ErrorKind::PathTraversal
            | ErrorKind::InvalidFilename
            | ErrorKind::Validation => Self::Validation(message),
            ErrorKind::Internal => Self::Failure(anyhow::Error::new(err)),
            _ => Self::Failure(anyhow!(message)),
        }
    }
}

impl From<ConfigError> for CliError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::InvalidField {
                field,
                value,
                reason,
            } => match value {
                Some(value) if !value.is_empty() => {
                    Self::validation(format!("{field} {reason} (got {value:?})"))
                }
                _ => Self::validation(format!("{field} {reason}")),
            },
            other @ ConfigError::PathResolve { .. } => Self::failure(other),
        }
    }
}

/// Everything a command handler needs.
pub(crate) struct AppContext {
    pub(crate) engine: MutationEngine,
    pub(crate) actor: Actor,
    pub(crate) format: OutputFormat,
}

impl AppContext {
    /// Load configuration, apply command-line overrides and build the engine.
    pub(crate) fn from_cli(cli: &Cli) -> CliResult<Self> {
        let config = load_config(cli)?;
        install_logging(&config)?;

        fs::create_dir_all(&config.storage_root).map_err(|err| {
            CliError::failure(anyhow!(
                "failed to create storage root {}: {err}",
                config.storage_root.display()
            ))
        })?;
        let sandbox = PathSandbox::new(&config.storage_root)?;
        let ledger = Arc::new(JsonFileLedger::new(&config.ledger_path));
        let trash = TrashStore::new(sandbox.clone(), &config.trash_root, ledger)?
            .with_artifacts(Arc::new(ThumbnailCache::new(&config.thumbnail_root)));
        let metrics = Metrics::new()
            .map_err(|err| CliError::failure(anyhow!("failed to register metrics: {err}")))?;
        let engine = MutationEngine::new(sandbox, trash, EventBus::new(), metrics);
        debug!(storage_root = %config.storage_root.display(), "engine ready");

        Ok(Self {
            engine,
            actor: cli_actor(&cli.user),
            format: cli.output,
        })
    }
}

pub(crate) fn load_config(cli: &Cli) -> CliResult<ExplorerConfig> {
    let mut config = ExplorerConfig::from_env()?;
    if let Some(path) = &cli.storage_root {
        config.storage_root.clone_from(path);
    }
    if let Some(path) = &cli.trash_root {
        config.trash_root.clone_from(path);
    }
    if let Some(path) = &cli.thumbnail_root {
        config.thumbnail_root.clone_from(path);
    }
    if let Some(path) = &cli.ledger {
        config.ledger_path.clone_from(path);
    }
    config.validate()?;
    Ok(config)
}

fn install_logging(config: &ExplorerConfig) -> CliResult<()> {
    let format = LogFormat::from_str(&config.log_format)
        .map_err(|err| CliError::validation(format!("LOG_FORMAT: {err}")))?;
    let logging = LoggingConfig {
        level: &config.log_level,
        format,
        build_sha: build_sha(),
    };
    // A subscriber can only be installed once per process.
    if init_logging(&logging).is_err() {
        debug!("tracing subscriber already installed");
    }
    Ok(())
}

fn cli_actor(user: &str) -> Actor {
    Actor {
        user_id: user.to_string(),
        username: user.to_string(),
        role: "cli".to_string(),
        ip: "local".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn exit_codes_split_validation_from_failure() {
        assert_eq!(CliError::validation("bad").exit_code(), 2);
        assert_eq!(CliError::failure(anyhow!("boom")).exit_code(), 3);
    }

    #[test]
    fn fsops_errors_are_classified() {
        let traversal = CliError::from(FsOpsError::PathTraversal {
            path: "/../etc".to_string(),
        });
        assert_eq!(traversal.exit_code(), 2);

        let conflict = CliError::from(FsOpsError::Conflict {
            path: "/out".to_string(),
            reason: "archive entries collide with existing files",
            conflicts: vec!["a.txt".to_string(), "b/".to_string()],
        });
        assert_eq!(conflict.exit_code(), 3);
        assert_eq!(
            conflict.display_message(),
            "archive entries collide with existing files: a.txt, b/"
        );
    }

    #[test]
    fn config_errors_name_the_field() {
        let err = CliError::from(ConfigError::InvalidField {
            field: "TRASH_ROOT",
            value: Some("./data/files/.trash".to_string()),
            reason: "must not overlap the storage root",
        });
        assert_eq!(err.exit_code(), 2);
        assert_eq!(
            err.display_message(),
            "TRASH_ROOT must not overlap the storage root (got \"./data/files/.trash\")"
        );

        let resolve = CliError::from(ConfigError::PathResolve {
            field: "STORAGE_ROOT",
            path: PathBuf::from("data"),
            source: std::io::Error::other("cwd missing"),
        });
        assert_eq!(resolve.exit_code(), 3);
    }

    #[test]
    fn actor_is_attributed_to_the_cli() {
        let actor = cli_actor("ops");
        assert_eq!(actor.username, "ops");
        assert_eq!(actor.role, "cli");
    }
}
