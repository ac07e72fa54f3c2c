//! `toolsync daemon`: background scheduler lifecycle and logs.

use anyhow::{Context, Result};
use clap::{Args, Subcommand};

use toolsync_core::{config::load_config, SyncRoot};
use toolsync_daemon::paths::socket_path;
use toolsync_daemon::{request_status, request_stop, start_blocking, DaemonError};
use toolsync_engine::report::tail_lines;

#[derive(Subcommand, Debug)]
pub enum DaemonCommand {
    /// Run daemon in foreground (timer + watcher + socket server).
    Start,
    /// Request graceful daemon shutdown over Unix socket.
    Stop,
    /// Query daemon runtime status over Unix socket.
    Status,
    /// Print recent runtime log lines.
    Logs(DaemonLogsArgs),
}

#[derive(Args, Debug)]
pub struct DaemonLogsArgs {
    /// Number of trailing lines to show (defaults to reportTailLines).
    #[arg(long)]
    pub lines: Option<usize>,

    /// Show the error log instead of the runtime log.
    #[arg(long)]
    pub errors: bool,
}

pub fn run(command: DaemonCommand, root: &SyncRoot) -> Result<()> {
    match command {
        DaemonCommand::Start => {
            start_blocking(root.clone()).context("daemon exited with error")?;
        }
        DaemonCommand::Stop => match request_stop(root) {
            Ok(()) => println!("daemon stop requested"),
            Err(DaemonError::DaemonNotRunning { .. }) => {
                println!("daemon is not running");
            }
            Err(err) => return Err(err).context("failed to stop daemon"),
        },
        DaemonCommand::Status => {
            let payload = match request_status(root) {
                Ok(status) => status,
                Err(DaemonError::DaemonNotRunning { .. }) => serde_json::json!({
                    "running": false,
                    "socket": socket_path(root).display().to_string(),
                }),
                Err(err) => return Err(err).context("failed to query daemon status"),
            };
            println!(
                "{}",
                serde_json::to_string_pretty(&payload)
                    .context("failed to render daemon status JSON")?
            );
        }
        DaemonCommand::Logs(args) => {
            let lines = args
                .lines
                .unwrap_or_else(|| {
                    usize::try_from(load_config(root).report_tail_lines).unwrap_or(usize::MAX)
                });
            let path = if args.errors {
                root.error_log_path()
            } else {
                root.runtime_log_path()
            };
            if !path.exists() {
                println!("log file not found: {}", path.display());
                return Ok(());
            }
            let tail = tail_lines(&path, lines)
                .with_context(|| format!("failed to read {}", path.display()))?;
            println!("==> {} <==", path.display());
            for line in tail {
                println!("{line}");
            }
        }
    }

    Ok(())
}
