use std::io::Write;

use arbor_fsops::{CompressRequest, DecompressRequest};

use crate::cli::{UnzipArgs, ZipArgs};
use crate::context::{AppContext, CliResult};
use crate::output::{render_compressed, render_decompressed};

pub(crate) fn handle_zip<W: Write>(ctx: &AppContext, args: &ZipArgs, out: &mut W) -> CliResult<()> {
    let request = CompressRequest {
        sources: args.sources.clone(),
        destination: args.destination.clone(),
        name: args.name.clone(),
    };
    let outcome = ctx.engine.compress(&request, &ctx.actor)?;
    render_compressed(out, &outcome, ctx.format)
}

pub(crate) fn handle_unzip<W: Write>(
    ctx: &AppContext,
    args: &UnzipArgs,
    out: &mut W,
) -> CliResult<()> {
    let request = DecompressRequest {
        source: args.archive.clone(),
        destination: args.destination.clone(),
        policy: args.policy,
    };
    let outcome = ctx.engine.decompress(&request, &ctx.actor)?;
    render_decompressed(out, &outcome, ctx.format)
}
