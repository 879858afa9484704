//! regen — reconcile generated files with the edits people make to them.
//!
//! # Usage
//!
//! ```text
//! regen init [--root DIR]
//! regen run --spec FILE [--root DIR] [--force] [--component NAME]... [--max-attempts N] [--config FILE]
//! regen status [--root DIR] [--spec FILE] [--json]
//! regen diff [--root DIR] [PATH]
//! regen history [--root DIR]
//! regen rollback <SNAPSHOT> [--root DIR]
//! ```

mod commands;

use std::process::ExitCode;

use anyhow::Result;
use clap::{Parser, Subcommand};

use commands::{
    diff::DiffArgs, history::HistoryArgs, init::InitArgs, rollback::RollbackArgs, run::RunArgs,
    status::StatusArgs,
};

// ---------------------------------------------------------------------------
// CLI entry point
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(
    name = "regen",
    version,
    about = "Regenerate files from a specification without clobbering local edits",
    long_about = None,
)]
struct Cli {
    /// Log at debug level (overridden by RUST_LOG).
    #[arg(long, short = 'v', global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Write a default .regen/config.yaml under the writable root.
    Init(InitArgs),

    /// Run one regeneration pass: generate, validate, retry, reconcile.
    Run(RunArgs),

    /// Show which generated files were edited since the last pass.
    Status(StatusArgs),

    /// Show unified diffs for pending `.new` conflicts.
    Diff(DiffArgs),

    /// List archived manifest snapshots.
    History(HistoryArgs),

    /// Restore the manifest from a snapshot.
    Rollback(RollbackArgs),
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    match cli.command {
        Commands::Init(args) => args.run().map(|()| ExitCode::SUCCESS),
        Commands::Run(args) => args.run(),
        Commands::Status(args) => args.run().map(|()| ExitCode::SUCCESS),
        Commands::Diff(args) => args.run().map(|()| ExitCode::SUCCESS),
        Commands::History(args) => args.run().map(|()| ExitCode::SUCCESS),
        Commands::Rollback(args) => args.run().map(|()| ExitCode::SUCCESS),
    }
}

fn init_tracing(verbose: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let _ = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}
