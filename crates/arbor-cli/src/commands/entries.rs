use std::fs::File;
use std::io::{BufReader, Write};

use anyhow::Context;

use crate::cli::{MkdirArgs, PutArgs};
use crate::context::{AppContext, CliError, CliResult};
use crate::output::{render_created, render_written};

pub(crate) fn handle_mkdir<W: Write>(
    ctx: &AppContext,
    args: &MkdirArgs,
    out: &mut W,
) -> CliResult<()> {
    let path = ctx.engine.create_directory(&args.parent, &args.name, &ctx.actor)?;
    render_created(out, path.as_str(), ctx.format)
}

pub(crate) fn handle_put<W: Write>(ctx: &AppContext, args: &PutArgs, out: &mut W) -> CliResult<()> {
    let name = match &args.name {
        Some(name) => name.clone(),
        None => args
            .file
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .ok_or_else(|| CliError::validation("local file has no name; pass --name"))?,
    };
    let file = File::open(&args.file)
        .with_context(|| format!("failed to open {}", args.file.display()))
        .map_err(CliError::failure)?;
    let mut reader = BufReader::new(file);
    let outcome =
        ctx.engine
            .write_file(&args.destination, &name, args.policy, &mut reader, &ctx.actor)?;
    render_written(out, &outcome, ctx.format)
}
