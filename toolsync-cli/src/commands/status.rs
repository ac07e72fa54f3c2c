//! `toolsync status`: revision and pending actions per tool.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::Args;
use colored::Colorize;
use serde::Serialize;
use tabled::{settings::Style, Table, Tabled};

use toolsync_core::{config::load_config, state::load_state, SyncRoot, EPOCH_ISO};
use toolsync_daemon::{send_request, DaemonRequest};
use toolsync_engine::{apply::load_plan, normalize::load_snapshot};

/// Arguments for `toolsync status`.
#[derive(Args, Debug)]
pub struct StatusArgs {
    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct StatusJson {
    root: String,
    revision: u64,
    last_run_at: Option<String>,
    daemon_running: bool,
    auto_apply: bool,
    tools: Vec<ToolStatusJson>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ToolStatusJson {
    tool: String,
    pending: usize,
    plan_revision: u64,
    snapshot_updated_at: Option<String>,
}

#[derive(Tabled)]
struct ToolRow {
    #[tabled(rename = "tool")]
    tool: String,
    #[tabled(rename = "pending")]
    pending: String,
    #[tabled(rename = "plan rev")]
    plan_revision: u64,
    #[tabled(rename = "snapshot")]
    snapshot: String,
}

impl StatusArgs {
    pub fn run(self, root: &SyncRoot) -> Result<()> {
        let status = build_status(root)?;
        if self.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&status).context("failed to serialize status JSON")?
            );
            return Ok(());
        }
        print_table(status);
        Ok(())
    }
}

fn build_status(root: &SyncRoot) -> Result<StatusJson> {
    let config = load_config(root);
    let state = load_state(root);

    let mut tools = Vec::with_capacity(config.tools.len());
    for tool in &config.tools {
        let plan = load_plan(root, tool).with_context(|| format!("failed to load plan for '{tool}'"))?;
        let snapshot = load_snapshot(root, tool);
        tools.push(ToolStatusJson {
            tool: tool.to_string(),
            pending: plan.action_count,
            plan_revision: plan.revision,
            snapshot_updated_at: (snapshot.updated_at != EPOCH_ISO).then_some(snapshot.updated_at),
        });
    }

    Ok(StatusJson {
        root: root.path().display().to_string(),
        revision: state.revision,
        last_run_at: state.last_run_at,
        daemon_running: send_request(root, &DaemonRequest::new("status")).is_ok(),
        auto_apply: config.auto_apply,
        tools,
    })
}

fn print_table(status: StatusJson) {
    let daemon = if status.daemon_running {
        "running".green().to_string()
    } else {
        "stopped".bright_black().to_string()
    };
    println!(
        "toolsync v{} | revision {} | last run {} | daemon {}",
        env!("CARGO_PKG_VERSION"),
        status.revision,
        status
            .last_run_at
            .as_deref()
            .map(format_age)
            .unwrap_or_else(|| "never".to_string()),
        daemon,
    );

    if status.tools.is_empty() {
        println!("No tools configured.");
        return;
    }

    let pending_total: usize = status.tools.iter().map(|t| t.pending).sum();
    let rows: Vec<ToolRow> = status
        .tools
        .into_iter()
        .map(|t| ToolRow {
            tool: t.tool,
            pending: if t.pending == 0 {
                "0".green().to_string()
            } else {
                t.pending.to_string().yellow().bold().to_string()
            },
            plan_revision: t.plan_revision,
            snapshot: t.snapshot_updated_at.unwrap_or_else(|| "missing".to_string()),
        })
        .collect();
    let mut table = Table::new(rows);
    table.with(Style::rounded());
    println!("{table}");

    if pending_total > 0 && !status.auto_apply {
        println!("Auto-apply is off; connectors apply pending actions on their next run.");
    }
}

/// `2026-10-18T09:30:00.000Z` → `12m ago`; unparsable stamps are shown as-is.
fn format_age(stamp: &str) -> String {
    let Ok(at) = DateTime::parse_from_rfc3339(stamp) else {
        return stamp.to_string();
    };
    let secs = (Utc::now() - at.with_timezone(&Utc)).num_seconds().max(0);
    match secs {
        0..=59 => format!("{secs}s ago"),
        60..=3599 => format!("{}m ago", secs / 60),
        3600..=86_399 => format!("{}h ago", secs / 3600),
        _ => format!("{}d ago", secs / 86_400),
    }
}
