//! Cycle pipeline steps shared by the CLI and the daemon scheduler.
//!
//! A full cycle is `take_snapshots` → `build_and_persist` → optional
//! `apply_all`. Scheduling, coalescing and suppression live in the daemon.

use std::sync::Arc;

use toolsync_core::{
    config::ToolSyncConfig, state, store, types::iso_now, Plan, Registry, RevisionState,
    SyncRoot, ToolId,
};

use crate::apply::{apply_tool, ApplySummary, Backoff};
use crate::connector::{capture_snapshot, Connector};
use crate::error::EngineError;
use crate::logs::LogSink;
use crate::normalize::{load_all_snapshots, load_snapshot_checked};
use crate::plan::build_plans;
use crate::registry::build_registry_at;

/// What one build step produced.
#[derive(Debug, Clone, PartialEq)]
pub struct BuildOutcome {
    pub revision: u64,
    pub registry: Registry,
    pub plans: Vec<Plan>,
}

impl BuildOutcome {
    pub fn action_counts(&self) -> Vec<(ToolId, usize)> {
        self.plans
            .iter()
            .map(|p| (p.tool.clone(), p.action_count))
            .collect()
    }
}

/// Capture a snapshot from every connector whose tool is configured and
/// persist the ones whose content changed. Returns the tools written.
///
/// A capture equal to the file on disk (ignoring `updatedAt`) is not
/// rewritten, so an idle tool keeps its fingerprint and its env timestamp.
pub fn take_snapshots(
    root: &SyncRoot,
    config: &ToolSyncConfig,
    connectors: &[Arc<dyn Connector>],
) -> Result<Vec<ToolId>, EngineError> {
    let mut written = Vec::new();
    for connector in connectors {
        let tool = connector.tool();
        if !config.is_configured(tool) {
            tracing::debug!("skipping snapshot for unconfigured tool {tool}");
            continue;
        }
        let snapshot = capture_snapshot(connector.as_ref(), &config.allow_env_keys);
        let (mut previous, err) = load_snapshot_checked(root, tool);
        previous.updated_at = snapshot.updated_at.clone();
        if err.is_none() && previous == snapshot {
            continue;
        }
        store::write_json_atomic(&root.snapshot_path(tool), &snapshot)?;
        written.push(tool.clone());
    }
    Ok(written)
}

/// Bump the revision, rebuild the registry from every snapshot on disk and
/// persist the registry, one plan per configured tool and the new state.
pub fn build_and_persist(root: &SyncRoot, config: &ToolSyncConfig) -> Result<BuildOutcome, EngineError> {
    root.ensure()?;
    let previous = state::load_state(root);
    let revision = previous.revision + 1;
    let now = iso_now();

    let snapshots = load_all_snapshots(root, config);
    let registry = build_registry_at(revision, config, &snapshots, &now);
    store::write_json_atomic(&root.registry_path(), &registry)?;

    let plans: Vec<Plan> = build_plans(&registry, &snapshots)
        .into_iter()
        .filter(|plan| config.is_configured(&plan.tool))
        .collect();
    for plan in &plans {
        store::write_json_atomic(&root.plan_path(&plan.tool), plan)?;
    }

    state::save_state(
        root,
        &RevisionState {
            revision,
            last_run_at: Some(now),
        },
    )?;
    tracing::info!(
        "revision {revision}: {} tool(s), {} plan(s)",
        registry.tools.len(),
        plans.len()
    );
    Ok(BuildOutcome {
        revision,
        registry,
        plans,
    })
}

/// Apply the persisted plan of every configured tool that has a connector.
///
/// A plan with an unknown action is refused for its tool only; the other
/// tools still run. Log-write failures abort.
pub fn apply_all(
    root: &SyncRoot,
    config: &ToolSyncConfig,
    connectors: &[Arc<dyn Connector>],
    sink: &LogSink,
    backoff: &dyn Backoff,
) -> Result<Vec<ApplySummary>, EngineError> {
    let mut summaries = Vec::new();
    for connector in connectors {
        if !config.is_configured(connector.tool()) {
            continue;
        }
        match apply_tool(root, config, connector.as_ref(), sink, backoff) {
            Ok(summary) => summaries.push(summary),
            Err(err @ EngineError::UnsupportedAction { .. }) => {
                tracing::warn!("{err}");
                sink.error(
                    "apply",
                    format!("plan for {} refused", connector.tool()),
                    None,
                    err.to_string(),
                )?;
                summaries.push(ApplySummary {
                    tool: connector.tool().to_string(),
                    rejected: Some(err.to_string()),
                    ..ApplySummary::default()
                });
            }
            Err(err) => return Err(err),
        }
    }
    Ok(summaries)
}
