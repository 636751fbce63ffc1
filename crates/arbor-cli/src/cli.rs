//! Command-line surface for administering a storage root.

use std::ffi::OsString;
use std::io::{self, Write};
use std::path::PathBuf;

use arbor_fsops::ConflictPolicy;
use clap::{Args, Parser, Subcommand, ValueEnum};
use uuid::Uuid;

use crate::commands::{
    handle_copy, handle_delete, handle_empty_trash, handle_mkdir, handle_move, handle_purge,
    handle_put, handle_rename, handle_resolve, handle_restore, handle_trash_list, handle_unzip,
    handle_zip,
};
use crate::context::{AppContext, CliResult};

/// Parse the process arguments, run the command and return the exit code.
#[must_use]
pub fn run() -> i32 {
    let stdout = io::stdout();
    let mut out = stdout.lock();
    execute(std::env::args_os(), &mut out)
}

/// Parse `args`, run the command writing results to `out`, and return the
/// exit code: `0` on success, `2` for invalid input and `3` when the
/// operation (or any item of a batch) failed.
pub fn execute<I, T, W>(args: I, out: &mut W) -> i32
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
    W: Write,
{
    let cli = match Cli::try_parse_from(args) {
        Ok(cli) => cli,
        Err(err) => {
            let _ = err.print();
            return err.exit_code();
        }
    };

    match dispatch(&cli, out) {
        Ok(()) => 0,
        Err(err) => {
            eprintln!("error: {}", err.display_message());
            err.exit_code()
        }
    }
}

fn dispatch<W: Write>(cli: &Cli, out: &mut W) -> CliResult<()> {
    let ctx = AppContext::from_cli(cli)?;

    match &cli.command {
        Command::Resolve(args) => handle_resolve(&ctx, args, out),
        Command::Rename(args) => handle_rename(&ctx, args, out),
        Command::Mkdir(args) => handle_mkdir(&ctx, args, out),
        Command::Put(args) => handle_put(&ctx, args, out),
        Command::Mv(args) => handle_move(&ctx, args, out),
        Command::Cp(args) => handle_copy(&ctx, args, out),
        Command::Rm(args) => handle_delete(&ctx, args, out),
        Command::Restore(args) => handle_restore(&ctx, args, out),
        Command::Trash(trash) => match trash {
            TrashCommand::List(args) => handle_trash_list(&ctx, args, out),
            TrashCommand::Purge(args) => handle_purge(&ctx, args, out),
            TrashCommand::Empty => handle_empty_trash(&ctx, out),
        },
        Command::Zip(args) => handle_zip(&ctx, args, out),
        Command::Unzip(args) => handle_unzip(&ctx, args, out),
    }
}

#[derive(Parser)]
#[command(name = "arbor", about = "Administrative CLI for an Arbor storage root")]
pub(crate) struct Cli {
    #[arg(
        long = "output",
        alias = "format",
        global = true,
        value_enum,
        default_value_t = OutputFormat::Table,
        help = "Select output format for command results"
    )]
    pub(crate) output: OutputFormat,
    #[arg(
        long,
        global = true,
        env = "ARBOR_USER",
        default_value = "admin",
        help = "User recorded against mutations"
    )]
    pub(crate) user: String,
    #[arg(long, global = true, help = "Override STORAGE_ROOT")]
    pub(crate) storage_root: Option<PathBuf>,
    #[arg(long, global = true, help = "Override TRASH_ROOT")]
    pub(crate) trash_root: Option<PathBuf>,
    #[arg(long, global = true, help = "Override THUMBNAIL_ROOT")]
    pub(crate) thumbnail_root: Option<PathBuf>,
    #[arg(long, global = true, help = "Override TRASH_LEDGER_PATH")]
    pub(crate) ledger: Option<PathBuf>,
    #[command(subcommand)]
    pub(crate) command: Command,
}

#[derive(Subcommand)]
pub(crate) enum Command {
    /// Print the real path a virtual path maps to.
    Resolve(ResolveArgs),
    /// Rename an entry in place.
    Rename(RenameArgs),
    /// Create a directory.
    Mkdir(MkdirArgs),
    /// Upload a local file into a directory.
    Put(PutArgs),
    /// Move entries into a directory.
    Mv(TransferArgs),
    /// Copy entries into a directory.
    Cp(TransferArgs),
    /// Move entries to the trash.
    Rm(PathsArgs),
    /// Restore the most recently trashed version of each path.
    Restore(PathsArgs),
    /// Inspect or purge the trash.
    #[command(subcommand)]
    Trash(TrashCommand),
    /// Pack entries into a zip archive.
    Zip(ZipArgs),
    /// Extract a zip archive.
    Unzip(UnzipArgs),
}

#[derive(Subcommand)]
pub(crate) enum TrashCommand {
    /// List trash records, newest first.
    List(TrashListArgs),
    /// Permanently remove one trash record.
    Purge(PurgeArgs),
    /// Permanently remove every live trash record.
    Empty,
}

#[derive(Args, Debug)]
pub(crate) struct ResolveArgs {
    pub(crate) path: String,
}

#[derive(Args, Debug)]
pub(crate) struct RenameArgs {
    pub(crate) path: String,
    pub(crate) name: String,
}

#[derive(Args, Debug)]
pub(crate) struct MkdirArgs {
    pub(crate) parent: String,
    pub(crate) name: String,
}

#[derive(Args, Debug)]
pub(crate) struct PutArgs {
    pub(crate) file: PathBuf,
    #[arg(long = "dest", default_value = "/")]
    pub(crate) destination: String,
    #[arg(long, help = "Stored name; defaults to the local file name")]
    pub(crate) name: Option<String>,
    #[arg(long, default_value = "rename", value_parser = parse_policy)]
    pub(crate) policy: ConflictPolicy,
}

#[derive(Args, Debug)]
pub(crate) struct TransferArgs {
    #[arg(required = true)]
    pub(crate) sources: Vec<String>,
    #[arg(long = "dest")]
    pub(crate) destination: String,
    #[arg(long, default_value = "rename", value_parser = parse_policy)]
    pub(crate) policy: ConflictPolicy,
}

#[derive(Args, Debug)]
pub(crate) struct PathsArgs {
    #[arg(required = true)]
    pub(crate) paths: Vec<String>,
}

#[derive(Args, Debug)]
pub(crate) struct TrashListArgs {
    #[arg(long, help = "Include records that were already restored")]
    pub(crate) all: bool,
}

#[derive(Args, Debug)]
pub(crate) struct PurgeArgs {
    pub(crate) id: Uuid,
}

#[derive(Args, Debug)]
pub(crate) struct ZipArgs {
    #[arg(required = true)]
    pub(crate) sources: Vec<String>,
    #[arg(long = "dest", default_value = "/")]
    pub(crate) destination: String,
    #[arg(long)]
    pub(crate) name: String,
}

#[derive(Args, Debug)]
pub(crate) struct UnzipArgs {
    pub(crate) archive: String,
    #[arg(long = "dest", default_value = "/")]
    pub(crate) destination: String,
    #[arg(long, default_value = "skip", value_parser = parse_policy)]
    pub(crate) policy: ConflictPolicy,
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, ValueEnum)]
pub(crate) enum OutputFormat {
    #[default]
    Table,
    Json,
}

fn parse_policy(value: &str) -> Result<ConflictPolicy, String> {
    value.parse::<ConflictPolicy>().map_err(|err| err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;

    type TestResult<T> = Result<T, Box<dyn Error>>;

    #[test]
    fn transfer_arguments_parse_policy_and_destination() -> TestResult<()> {
        let cli = Cli::try_parse_from([
            "arbor", "mv", "/a.txt", "/b", "--dest", "/archive", "--policy", "overwrite",
        ])?;
        let Command::Mv(args) = cli.command else {
            return Err("expected mv".into());
        };
        assert_eq!(args.sources, ["/a.txt", "/b"]);
        assert_eq!(args.destination, "/archive");
        assert_eq!(args.policy, ConflictPolicy::Overwrite);
        Ok(())
    }

    #[test]
    fn copy_defaults_to_rename_policy() -> TestResult<()> {
        let cli = Cli::try_parse_from(["arbor", "cp", "/a.txt", "--dest", "/b"])?;
        let Command::Cp(args) = cli.command else {
            return Err("expected cp".into());
        };
        assert_eq!(args.policy, ConflictPolicy::Rename);
        Ok(())
    }

    #[test]
    fn unknown_policy_is_rejected() {
        let result = Cli::try_parse_from(["arbor", "cp", "/a", "--dest", "/b", "--policy", "merge"]);
        assert!(result.is_err());
    }

    #[test]
    fn batch_commands_require_at_least_one_path() {
        assert!(Cli::try_parse_from(["arbor", "rm"]).is_err());
        assert!(Cli::try_parse_from(["arbor", "mv", "--dest", "/b"]).is_err());
    }

    #[test]
    fn global_options_apply_after_the_subcommand() -> TestResult<()> {
        let cli = Cli::try_parse_from([
            "arbor",
            "trash",
            "list",
            "--all",
            "--format",
            "json",
            "--user",
            "ops",
            "--storage-root",
            "/srv/files",
        ])?;
        assert_eq!(cli.output, OutputFormat::Json);
        assert_eq!(cli.user, "ops");
        assert_eq!(cli.storage_root, Some(PathBuf::from("/srv/files")));
        let Command::Trash(TrashCommand::List(args)) = cli.command else {
            return Err("expected trash list".into());
        };
        assert!(args.all);
        Ok(())
    }

    #[test]
    fn put_defaults_to_root_and_rename_policy() -> TestResult<()> {
        let cli = Cli::try_parse_from(["arbor", "put", "./report.pdf"])?;
        let Command::Put(args) = cli.command else {
            return Err("expected put".into());
        };
        assert_eq!(args.file, PathBuf::from("./report.pdf"));
        assert_eq!(args.destination, "/");
        assert_eq!(args.name, None);
        assert_eq!(args.policy, ConflictPolicy::Rename);
        Ok(())
    }

    #[test]
    fn purge_requires_a_uuid() -> TestResult<()> {
        assert!(Cli::try_parse_from(["arbor", "trash", "purge", "not-a-uuid"]).is_err());
        let id = Uuid::new_v4();
        let cli = Cli::try_parse_from(["arbor", "trash", "purge", &id.to_string()])?;
        let Command::Trash(TrashCommand::Purge(args)) = cli.command else {
            return Err("expected trash purge".into());
        };
        assert_eq!(args.id, id);
        Ok(())
    }

    #[test]
    fn unzip_defaults_to_root_and_refusing_collisions() -> TestResult<()> {
        let cli = Cli::try_parse_from(["arbor", "unzip", "/bundle.zip"])?;
        let Command::Unzip(args) = cli.command else {
            return Err("expected unzip".into());
        };
        assert_eq!(args.destination, "/");
        assert_eq!(args.policy, ConflictPolicy::Skip);
        Ok(())
    }
}
