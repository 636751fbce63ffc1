//! Output renderers for CLI commands.

use std::io::Write;
use std::path::Path;

use anyhow::anyhow;
use arbor_fsops::{
    BatchOutcome, CompressOutcome, DecompressOutcome, ItemFailure, RenameOutcome, Transfer,
    TrashRecord, TrashedItem, WriteOutcome,
};
use serde::Serialize;
use serde_json::json;

use crate::cli::OutputFormat;
use crate::context::{CliError, CliResult};

pub(crate) fn render_resolved<W: Write>(
    out: &mut W,
    virtual_path: &str,
    real_path: &Path,
    format: OutputFormat,
) -> CliResult<()> {
    match format {
        OutputFormat::Json => write_json(
            out,
            &json!({ "path": virtual_path, "real_path": real_path.display().to_string() }),
        ),
        OutputFormat::Table => line(out, format_args!("{virtual_path} -> {}", real_path.display())),
    }
}

pub(crate) fn render_renamed<W: Write>(
    out: &mut W,
    outcome: &RenameOutcome,
    format: OutputFormat,
) -> CliResult<()> {
    match format {
        OutputFormat::Json => write_json(out, outcome),
        OutputFormat::Table => line(
            out,
            format_args!("renamed {} -> {}", outcome.old_path, outcome.new_path),
        ),
    }
}

pub(crate) fn render_created<W: Write>(
    out: &mut W,
    path: &str,
    format: OutputFormat,
) -> CliResult<()> {
    match format {
        OutputFormat::Json => write_json(out, &json!({ "path": path })),
        OutputFormat::Table => line(out, format_args!("created {path}")),
    }
}

pub(crate) fn render_written<W: Write>(
    out: &mut W,
    outcome: &WriteOutcome,
    format: OutputFormat,
) -> CliResult<()> {
    match format {
        OutputFormat::Json => write_json(out, outcome),
        OutputFormat::Table => line(
            out,
            format_args!("wrote {} ({} bytes)", outcome.path, outcome.size),
        ),
    }
}

pub(crate) fn render_transfers<W: Write>(
    out: &mut W,
    verb: &str,
    outcome: &BatchOutcome<Transfer>,
    format: OutputFormat,
) -> CliResult<()> {
    match format {
        OutputFormat::Json => write_json(out, outcome),
        OutputFormat::Table => {
            for transfer in &outcome.succeeded {
                line(out, format_args!("{:<8} {} -> {}", verb, transfer.from, transfer.to))?;
            }
            render_failures(out, &outcome.failed)
        }
    }
}

pub(crate) fn render_trashed<W: Write>(
    out: &mut W,
    verb: &str,
    outcome: &BatchOutcome<TrashedItem>,
    format: OutputFormat,
) -> CliResult<()> {
    match format {
        OutputFormat::Json => write_json(out, outcome),
        OutputFormat::Table => {
            for item in &outcome.succeeded {
                line(out, format_args!("{:<8} {} ({})", verb, item.path, item.trash_id))?;
            }
            render_failures(out, &outcome.failed)
        }
    }
}

pub(crate) fn render_trash_records<W: Write>(
    out: &mut W,
    records: &[TrashRecord],
    format: OutputFormat,
) -> CliResult<()> {
    match format {
        OutputFormat::Json => write_json(out, records),
        OutputFormat::Table => {
            line(
                out,
                format_args!("{:<36} {:<20} {:<12} PATH", "ID", "DELETED", "BY"),
            )?;
            for record in records {
                let path = if record.is_live() {
                    record.original_path.to_string()
                } else {
                    format!("{} (restored)", record.original_path)
                };
                line(
                    out,
                    format_args!(
                        "{:<36} {:<20} {:<12} {}",
                        record.id,
                        record.deleted_at.format("%Y-%m-%d %H:%M:%S"),
                        record.deleted_by.username,
                        path
                    ),
                )?;
            }
            Ok(())
        }
    }
}

pub(crate) fn render_purged<W: Write>(
    out: &mut W,
    records: &[TrashRecord],
    format: OutputFormat,
) -> CliResult<()> {
    match format {
        OutputFormat::Json => write_json(out, records),
        OutputFormat::Table => {
            for record in records {
                line(out, format_args!("purged   {} ({})", record.original_path, record.id))?;
            }
            line(out, format_args!("{} record(s) purged", records.len()))
        }
    }
}

pub(crate) fn render_compressed<W: Write>(
    out: &mut W,
    outcome: &CompressOutcome,
    format: OutputFormat,
) -> CliResult<()> {
    match format {
        OutputFormat::Json => write_json(out, outcome),
        OutputFormat::Table => line(
            out,
            format_args!(
                "created {} ({} entries, {} bytes)",
                outcome.path, outcome.entries, outcome.size
            ),
        ),
    }
}

pub(crate) fn render_decompressed<W: Write>(
    out: &mut W,
    outcome: &DecompressOutcome,
    format: OutputFormat,
) -> CliResult<()> {
    match format {
        OutputFormat::Json => write_json(out, outcome),
        OutputFormat::Table => {
            for file in &outcome.files {
                line(out, format_args!("extracted {file}"))?;
            }
            line(
                out,
                format_args!("{} entries into {}", outcome.files.len(), outcome.destination),
            )
        }
    }
}

fn render_failures<W: Write>(out: &mut W, failures: &[ItemFailure]) -> CliResult<()> {
    for failure in failures {
        line(
            out,
            format_args!("{:<8} {} [{}] {}", "failed", failure.item, failure.kind, failure.reason),
        )?;
    }
    Ok(())
}

fn write_json<W: Write, T: Serialize + ?Sized>(out: &mut W, value: &T) -> CliResult<()> {
    let text = serde_json::to_string_pretty(value)
        .map_err(|err| CliError::failure(anyhow!("failed to format JSON: {err}")))?;
    line(out, format_args!("{text}"))
}

fn line<W: Write>(out: &mut W, args: std::fmt::Arguments<'_>) -> CliResult<()> {
    writeln!(out, "{args}").map_err(|err| CliError::failure(anyhow!("failed to write output: {err}")))
}
