use std::io::Write;

use arbor_fsops::{CancelFlag, TransferRequest};

use super::batch_status;
use crate::cli::{RenameArgs, ResolveArgs, TransferArgs};
use crate::context::{AppContext, CliResult};
use crate::output::{render_renamed, render_resolved, render_transfers};

pub(crate) fn handle_resolve<W: Write>(
    ctx: &AppContext,
    args: &ResolveArgs,
    out: &mut W,
) -> CliResult<()> {
    let sandbox = ctx.engine.sandbox();
    let path = sandbox.parse(&args.path)?;
    let real = sandbox.real(&path)?;
    render_resolved(out, path.as_str(), &real, ctx.format)
}

pub(crate) fn handle_rename<W: Write>(
    ctx: &AppContext,
    args: &RenameArgs,
    out: &mut W,
) -> CliResult<()> {
    let outcome = ctx.engine.rename(&args.path, &args.name, &ctx.actor)?;
    render_renamed(out, &outcome, ctx.format)
}

pub(crate) fn handle_move<W: Write>(
    ctx: &AppContext,
    args: &TransferArgs,
    out: &mut W,
) -> CliResult<()> {
    let outcome = ctx
        .engine
        .move_items(&transfer_request(args), &ctx.actor, &CancelFlag::new())?;
    render_transfers(out, "moved", &outcome, ctx.format)?;
    batch_status(&outcome)
}

pub(crate) fn handle_copy<W: Write>(
    ctx: &AppContext,
    args: &TransferArgs,
    out: &mut W,
) -> CliResult<()> {
    let outcome = ctx
        .engine
        .copy_items(&transfer_request(args), &ctx.actor, &CancelFlag::new())?;
    render_transfers(out, "copied", &outcome, ctx.format)?;
    batch_status(&outcome)
}

fn transfer_request(args: &TransferArgs) -> TransferRequest {
    TransferRequest {
        sources: args.sources.clone(),
        destination: args.destination.clone(),
        policy: args.policy,
    }
}
