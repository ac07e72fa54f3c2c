//! `toolsync cycle`: run one reconciliation cycle.

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use serde_json::Value;

use toolsync_core::SyncRoot;
use toolsync_daemon::{outcome_payload, request_cycle, CycleController, DaemonError};

/// Arguments for `toolsync cycle`.
#[derive(Args, Debug)]
pub struct CycleArgs {
    /// Reason recorded in the runtime log.
    #[arg(long, default_value = "manual")]
    pub reason: String,

    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,
}

impl CycleArgs {
    pub fn run(self, root: &SyncRoot) -> Result<()> {
        let (via, payload) = match request_cycle(root, Some(self.reason.clone())) {
            Ok(payload) => ("daemon", payload),
            Err(DaemonError::DaemonNotRunning { .. }) => {
                // No connectors in-process: reconcile the snapshot files on disk.
                let controller = CycleController::new(root.clone(), Vec::new());
                let outcome = controller
                    .run_cycle(&self.reason)
                    .with_context(|| format!("cycle '{}' failed", self.reason))?;
                ("local", outcome_payload(&outcome))
            }
            Err(err) => return Err(err).context("failed to request cycle from daemon"),
        };

        if self.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&payload).context("failed to serialize cycle JSON")?
            );
            return Ok(());
        }
        print_outcome(via, &payload);
        Ok(())
    }
}

fn print_outcome(via: &str, payload: &Value) {
    let outcome = payload["outcome"].as_str().unwrap_or("unknown");
    if outcome != "completed" {
        println!("{} cycle {outcome} ({via})", "·".bright_black());
        return;
    }

    let report = &payload["report"];
    println!(
        "{} revision {} ({via}, reason: {}, {} ms)",
        "✓".green().bold(),
        report["revision"],
        report["reason"].as_str().unwrap_or("-"),
        report["duration_ms"],
    );
    if let Some(actions) = report["actions"].as_object() {
        for (tool, count) in actions {
            let count = count.as_u64().unwrap_or(0);
            let label = if count == 0 {
                "up to date".green().to_string()
            } else {
                format!("{count} pending").yellow().to_string()
            };
            println!("  {tool:<12} {label}");
        }
    }
}
