//! `toolsync plan [TOOL]`: show persisted plans.

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use tabled::{settings::Style, Table, Tabled};

use toolsync_core::{config::load_config, Action, Plan, SyncRoot, ToolId};
use toolsync_engine::apply::load_plan;

/// Arguments for `toolsync plan`.
#[derive(Args, Debug)]
pub struct PlanArgs {
    /// Only show this tool's plan.
    pub tool: Option<String>,

    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,
}

#[derive(Tabled)]
struct ActionRow {
    #[tabled(rename = "action")]
    action: String,
    #[tabled(rename = "target")]
    target: String,
    #[tabled(rename = "source")]
    source: String,
}

impl PlanArgs {
    pub fn run(self, root: &SyncRoot) -> Result<()> {
        let tools: Vec<ToolId> = match self.tool {
            Some(tool) => vec![ToolId::from(tool)],
            None => load_config(root).tools,
        };

        let mut plans = Vec::with_capacity(tools.len());
        for tool in &tools {
            plans.push(
                load_plan(root, tool).with_context(|| format!("failed to load plan for '{tool}'"))?,
            );
        }

        if self.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&plans).context("failed to serialize plan JSON")?
            );
            return Ok(());
        }

        for plan in &plans {
            print_plan(plan);
        }
        Ok(())
    }
}

fn print_plan(plan: &Plan) {
    println!(
        "{} (revision {}, {} action(s))",
        plan.tool.to_string().bold(),
        plan.revision,
        plan.action_count
    );
    if plan.actions.is_empty() {
        println!("  {}", "nothing to do".green());
        return;
    }
    let rows: Vec<ActionRow> = plan.actions.iter().map(action_row).collect();
    let mut table = Table::new(rows);
    table.with(Style::rounded());
    println!("{table}");
}

fn action_row(action: &Action) -> ActionRow {
    match action {
        Action::Install {
            category,
            name,
            source_tools,
        } => ActionRow {
            action: "install".to_string(),
            target: format!("{category}:{name}"),
            source: source_tools
                .iter()
                .map(|t| t.to_string())
                .collect::<Vec<_>>()
                .join(", "),
        },
        Action::SetEnv {
            key,
            value,
            source_tool,
        } => ActionRow {
            action: "set_env".to_string(),
            target: format!("{key}={value}"),
            source: source_tool.to_string(),
        },
    }
}
