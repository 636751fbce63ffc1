use std::io::Write;

use arbor_fsops::CancelFlag;

use super::batch_status;
use crate::cli::{PathsArgs, PurgeArgs, TrashListArgs};
use crate::context::{AppContext, CliResult};
use crate::output::{render_purged, render_trash_records, render_trashed};

pub(crate) fn handle_delete<W: Write>(
    ctx: &AppContext,
    args: &PathsArgs,
    out: &mut W,
) -> CliResult<()> {
    let outcome = ctx
        .engine
        .delete_items(&args.paths, &ctx.actor, &CancelFlag::new())?;
    render_trashed(out, "trashed", &outcome, ctx.format)?;
    batch_status(&outcome)
}

pub(crate) fn handle_restore<W: Write>(
    ctx: &AppContext,
    args: &PathsArgs,
    out: &mut W,
) -> CliResult<()> {
    let outcome = ctx
        .engine
        .restore_items(&args.paths, &ctx.actor, &CancelFlag::new())?;
    render_trashed(out, "restored", &outcome, ctx.format)?;
    batch_status(&outcome)
}

pub(crate) fn handle_trash_list<W: Write>(
    ctx: &AppContext,
    args: &TrashListArgs,
    out: &mut W,
) -> CliResult<()> {
    let records = ctx.engine.list_trash(args.all)?;
    render_trash_records(out, &records, ctx.format)
}

pub(crate) fn handle_purge<W: Write>(
    ctx: &AppContext,
    args: &PurgeArgs,
    out: &mut W,
) -> CliResult<()> {
    let record = ctx.engine.purge(args.id)?;
    render_purged(out, &[record], ctx.format)
}

pub(crate) fn handle_empty_trash<W: Write>(ctx: &AppContext, out: &mut W) -> CliResult<()> {
    let records = ctx.engine.empty_trash()?;
    render_purged(out, &records, ctx.format)
}
