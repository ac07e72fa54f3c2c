//! Plan builder: diffs the registry against one tool's own snapshot.
//!
//! Emission order is fixed: categories in [`Category::ALL`] order, item names
//! sorted within a category, then env keys sorted. Rebuilding from unchanged
//! inputs therefore yields the same action list, only `generatedAt` moves.

use toolsync_core::{types::iso_now, Action, Category, Plan, Registry, Snapshot, ToolId};

/// Build the plan for `tool`. A missing snapshot counts as all-empty.
pub fn build_plan(registry: &Registry, tool: &ToolId, own: Option<&Snapshot>) -> Plan {
    build_plan_at(registry, tool, own, &iso_now())
}

/// [`build_plan`] with an explicit `generatedAt` stamp.
pub fn build_plan_at(
    registry: &Registry,
    tool: &ToolId,
    own: Option<&Snapshot>,
    generated_at: &str,
) -> Plan {
    let empty;
    let own = match own {
        Some(snapshot) => snapshot,
        None => {
            empty = Snapshot::empty(tool.clone());
            &empty
        }
    };

    let mut actions = Vec::new();
    for category in Category::all() {
        let Some(owners) = registry.owners(*category) else {
            continue;
        };
        for (name, tools) in owners {
            if !tools.contains(tool) {
                actions.push(Action::Install {
                    category: *category,
                    name: name.clone(),
                    source_tools: tools.iter().cloned().collect(),
                });
            }
        }
    }

    for (key, entry) in &registry.env {
        if own.env.get(key) != Some(&entry.value) {
            actions.push(Action::SetEnv {
                key: key.clone(),
                value: entry.value.clone(),
                source_tool: entry.source_tool.clone(),
            });
        }
    }

    Plan {
        tool: tool.clone(),
        revision: registry.revision,
        generated_at: generated_at.to_string(),
        action_count: actions.len(),
        actions,
    }
}

/// One plan per tool in `registry.tools`, resolving each tool's snapshot from
/// `snapshots`.
pub fn build_plans(registry: &Registry, snapshots: &[Snapshot]) -> Vec<Plan> {
    let now = iso_now();
    registry
        .tools
        .iter()
        .map(|tool| {
            let own = snapshots.iter().find(|s| &s.tool == tool);
            build_plan_at(registry, tool, own, &now)
        })
        .collect()
}
