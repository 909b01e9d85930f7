use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use braid::BraidConfig;
use clap::{Parser, Subcommand};

mod commands;
mod telemetry;
mod terminal;

/// Merge several git histories into one chronological history
///
/// braid orders the commits of every configured repository by author date
/// and cherry-picks them, one by one, into a fresh result repository.
/// Patches already applied from another repository are skipped. Conflicts
/// are resolved from the resolution cache when the same conflict was seen
/// before; otherwise you are asked:
///
///   fix   open a shell in the result repository, resolve and stage, exit
///   skip  drop this commit
///   quit  stop; `braid resume` continues from the last handled commit
///
/// TYPICAL SESSION:
///
///   braid logs          # write data/<repo>.log for every repository
///   braid chunks        # review how the histories interleave
///   braid run --train   # prime the cache from old merges, then replay
///   braid resume        # after a quit or a crash
#[derive(Parser)]
#[command(name = "braid")]
#[command(version, about)]
#[command(propagate_version = true)]
#[command(after_help = "See 'braid <command> --help' for more information on a specific command.")]
struct Cli {
    /// Configuration file
    #[arg(long, global = true, env = "BRAID_CONFIG", default_value = "braid.toml")]
    config: PathBuf,

    /// Abort at the first conflict the cache cannot resolve
    #[arg(long, global = true)]
    non_interactive: bool,

    /// Format of the diagnostics written to stderr (filter with BRAID_LOG)
    #[arg(long, global = true, env = "BRAID_LOG_FORMAT", value_enum, default_value_t)]
    log_format: telemetry::LogFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start from scratch: recreate the result repository and replay
    /// everything
    Run {
        /// Prime the resolution cache from historical merges first
        #[arg(long)]
        train: bool,
    },

    /// Continue after a commit (default: the saved checkpoint)
    Resume {
        /// Full hash or unique prefix of the last handled commit
        hash: Option<String>,
    },

    /// Print the timeline grouped into same-repository runs
    Chunks,

    /// Print per-repository commit statistics
    Stats,

    /// Prime the resolution cache from historical merges only
    Train,

    /// Write the commit log of every configured repository
    Logs,
}

impl Commands {
    const fn name(&self) -> &'static str {
        match self {
            Self::Run { .. } => "run",
            Self::Resume { .. } => "resume",
            Self::Chunks => "chunks",
            Self::Stats => "stats",
            Self::Train => "train",
            Self::Logs => "logs",
        }
    }
}

fn dispatch(cli: &Cli) -> Result<()> {
    let config = BraidConfig::load(&cli.config)?;
    match &cli.command {
        Commands::Run { train } => commands::run(&config, *train, cli.non_interactive),
        Commands::Resume { hash } => {
            commands::resume(&config, hash.as_deref(), cli.non_interactive)
        }
        Commands::Chunks => commands::chunks(&config),
        Commands::Stats => commands::stats(&config),
        Commands::Train => commands::train(&config),
        Commands::Logs => commands::logs(&config),
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let _telemetry = telemetry::init(cli.log_format);
    let span = telemetry::command_span(cli.command.name());
    let outcome = span.in_scope(|| dispatch(&cli));
    drop(span);
    match outcome {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{e:#}");
            ExitCode::FAILURE
        }
    }
}
