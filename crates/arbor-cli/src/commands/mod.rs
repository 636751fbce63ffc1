//! Command handlers grouped by concern.

mod archive;
mod entries;
mod paths;
mod trash;

use anyhow::anyhow;
use arbor_fsops::BatchOutcome;

use crate::context::{CliError, CliResult};

pub(crate) use archive::{handle_unzip, handle_zip};
pub(crate) use entries::{handle_mkdir, handle_put};
pub(crate) use paths::{handle_copy, handle_move, handle_rename, handle_resolve};
pub(crate) use trash::{
    handle_delete, handle_empty_trash, handle_purge, handle_restore, handle_trash_list,
};

/// Turn a batch with failed items into a non-zero exit.
fn batch_status<T>(outcome: &BatchOutcome<T>) -> CliResult<()> {
    if outcome.failed.is_empty() {
        return Ok(());
    }
    Err(CliError::failure(anyhow!(
        "{} of {} items failed",
        outcome.failed.len(),
        outcome.len()
    )))
}
