//! toolsync: keep extensions, MCP servers, skills, themes and env in step
//! across developer tools.
//!
//! # Usage
//!
//! ```text
//! toolsync [--root DIR] init [--force]
//! toolsync [--root DIR] cycle [--reason R] [--json]
//! toolsync [--root DIR] plan [TOOL] [--json]
//! toolsync [--root DIR] status [--json]
//! toolsync [--root DIR] report
//! toolsync [--root DIR] daemon start|stop|status|logs
//! ```

mod commands;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use commands::{
    cycle::CycleArgs, daemon::DaemonCommand, init::InitArgs, plan::PlanArgs, report::ReportArgs,
    status::StatusArgs,
};
use toolsync_core::SyncRoot;

// ---------------------------------------------------------------------------
// CLI entry point
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(
    name = "toolsync",
    version,
    about = "Reconcile tool configuration across editors and terminals",
    long_about = None,
)]
struct Cli {
    /// Sync root directory (defaults to ~/.toolsync).
    #[arg(long, global = true, env = "TOOLSYNC_ROOT", value_name = "DIR")]
    root: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Create the sync root layout and a default config.
    Init(InitArgs),

    /// Run one reconciliation cycle (through the daemon when it is running).
    Cycle(CycleArgs),

    /// Show persisted plans.
    Plan(PlanArgs),

    /// Show revision and pending actions per tool.
    Status(StatusArgs),

    /// Write a diagnostic report.
    Report(ReportArgs),

    /// Manage the background daemon.
    Daemon {
        #[command(subcommand)]
        command: DaemonCommand,
    },
}

fn resolve_root(root: Option<PathBuf>) -> Result<SyncRoot> {
    match root {
        Some(path) => Ok(SyncRoot::new(path)),
        None => SyncRoot::default_root().context("could not determine home directory"),
    }
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn main() -> Result<()> {
    let cli = Cli::parse();
    let root = resolve_root(cli.root)?;
    match cli.command {
        Commands::Init(args) => args.run(&root),
        Commands::Cycle(args) => args.run(&root),
        Commands::Plan(args) => args.run(&root),
        Commands::Status(args) => args.run(&root),
        Commands::Report(args) => args.run(&root),
        Commands::Daemon { command } => commands::daemon::run(command, &root),
    }
}
