//! Apply executor: best-effort execution of one tool's plan.
//!
//! For each action, in order:
//! 1. Excluded install → `skipped`, connector untouched.
//! 2. Otherwise call the connector.
//! 3. On failure retry up to `applyRetryCount` more times; the n-th retry
//!    waits `n × applyRetryDelaySec`. Exhausted retries → `failed`.
//!
//! A failed action never stops the rest of the plan. Every outcome is
//! written to the runtime log; failures also go to the error log.

use std::time::Duration;

use serde::Serialize;
use serde_json::{json, Value};

use toolsync_core::{config::ToolSyncConfig, store, Action, ParseError, Plan, SyncRoot, ToolId};

use crate::connector::{Connector, ConnectorError};
use crate::error::EngineError;
use crate::logs::{Level, LogSink};

const SOURCE: &str = "apply";

/// Waits between retries. Injected so tests can observe the schedule.
pub trait Backoff {
    fn wait(&self, delay: Duration);
}

/// Production backoff: blocks the current thread.
#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadSleep;

impl Backoff for ThreadSleep {
    fn wait(&self, delay: Duration) {
        std::thread::sleep(delay);
    }
}

/// Linear retry schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub retry_count: u64,
    pub retry_delay: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &ToolSyncConfig) -> Self {
        Self {
            retry_count: config.apply_retry_count,
            retry_delay: config.retry_delay(),
        }
    }

    /// Wait before the `retry`-th retry (1-indexed).
    pub fn delay_for(&self, retry: u64) -> Duration {
        self.retry_delay.saturating_mul(retry.min(u32::MAX as u64) as u32)
    }
}

/// Result of one action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionOutcome {
    Ok { attempts: u64 },
    Skipped,
    Failed { attempts: u64, error: String },
}

/// Counts for one applied plan.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ApplySummary {
    pub tool: String,
    pub ok: usize,
    pub fail: usize,
    pub skipped: usize,
    /// Set when the persisted plan was refused and nothing was applied.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rejected: Option<String>,
}

impl ApplySummary {
    fn record(&mut self, outcome: &ActionOutcome) {
        match outcome {
            ActionOutcome::Ok { .. } => self.ok += 1,
            ActionOutcome::Skipped => self.skipped += 1,
            ActionOutcome::Failed { .. } => self.fail += 1,
        }
    }
}

/// Executes plans against one connector.
pub struct ApplyExecutor<'a> {
    config: &'a ToolSyncConfig,
    policy: RetryPolicy,
    sink: &'a LogSink,
    backoff: &'a dyn Backoff,
}

impl<'a> ApplyExecutor<'a> {
    pub fn new(config: &'a ToolSyncConfig, sink: &'a LogSink, backoff: &'a dyn Backoff) -> Self {
        Self {
            config,
            policy: RetryPolicy::from_config(config),
            sink,
            backoff,
        }
    }

    /// Apply every action of `plan`. Only log-write failures are returned.
    pub fn apply_plan(
        &self,
        plan: &Plan,
        connector: &dyn Connector,
    ) -> Result<ApplySummary, EngineError> {
        let mut summary = ApplySummary {
            tool: plan.tool.to_string(),
            ..ApplySummary::default()
        };
        for action in &plan.actions {
            let outcome = self.apply_action(action, connector);
            self.log_outcome(&plan.tool, action, &outcome)?;
            summary.record(&outcome);
        }
        self.sink.event(
            Level::Info,
            SOURCE,
            format!("applied plan for {}", plan.tool),
            Some(json!({
                "tool": plan.tool,
                "revision": plan.revision,
                "ok": summary.ok,
                "fail": summary.fail,
                "skipped": summary.skipped,
            })),
        )?;
        Ok(summary)
    }

    pub fn apply_action(&self, action: &Action, connector: &dyn Connector) -> ActionOutcome {
        if let Action::Install { category, name, .. } = action {
            if self.config.is_excluded(*category, name) {
                return ActionOutcome::Skipped;
            }
        }

        let mut attempts = 0;
        loop {
            attempts += 1;
            let error = match invoke(action, connector) {
                Ok(()) => return ActionOutcome::Ok { attempts },
                Err(err) => err,
            };
            let retry = attempts;
            if retry > self.policy.retry_count {
                return ActionOutcome::Failed {
                    attempts,
                    error: error.to_string(),
                };
            }
            tracing::debug!(
                "{} on {} failed (attempt {attempts}): {error}",
                action.label(),
                connector.tool()
            );
            self.backoff.wait(self.policy.delay_for(retry));
        }
    }

    fn log_outcome(
        &self,
        tool: &ToolId,
        action: &Action,
        outcome: &ActionOutcome,
    ) -> Result<(), EngineError> {
        let data = |extra: Value| {
            let mut payload = json!({ "tool": tool, "action": action });
            if let (Some(obj), Value::Object(more)) = (payload.as_object_mut(), extra) {
                obj.extend(more);
            }
            Some(payload)
        };
        match outcome {
            ActionOutcome::Ok { attempts } => self.sink.event(
                Level::Info,
                SOURCE,
                format!("apply.ok {} on {tool}", action.label()),
                data(json!({ "attempts": attempts })),
            ),
            ActionOutcome::Skipped => self.sink.event(
                Level::Info,
                SOURCE,
                format!("apply.skipped {} on {tool} (excluded)", action.label()),
                data(json!({})),
            ),
            ActionOutcome::Failed { attempts, error } => {
                self.sink.event(
                    Level::Error,
                    SOURCE,
                    format!("apply.failed {} on {tool}", action.label()),
                    data(json!({ "attempts": attempts, "error": error })),
                )?;
                self.sink.error(
                    SOURCE,
                    format!("{} on {tool} failed after {attempts} attempt(s)", action.label()),
                    Some(action),
                    error.clone(),
                )
            }
        }
    }
}

fn invoke(action: &Action, connector: &dyn Connector) -> Result<(), ConnectorError> {
    match action {
        Action::Install { category, name, .. } => connector.apply_install(*category, name),
        Action::SetEnv { key, value, .. } => connector.apply_set_env(key, value),
    }
}

// ---------------------------------------------------------------------------
// Persisted plans
// ---------------------------------------------------------------------------

/// Load `plans/<tool>.json`, distinguishing an unknown action tag (hard error)
/// from a missing or unreadable file (empty plan).
pub fn load_plan_checked(root: &SyncRoot, tool: &ToolId) -> Result<Result<Plan, ParseError>, EngineError> {
    let raw = match store::read_value(&root.plan_path(tool)) {
        Ok(raw) => raw,
        Err(err) => return Ok(Err(err)),
    };
    let mut plan = Plan::empty(tool.clone());
    plan.revision = raw.get("revision").and_then(Value::as_u64).unwrap_or(0);
    if let Some(at) = raw.get("generatedAt").and_then(Value::as_str) {
        plan.generated_at = at.to_string();
    }
    if let Some(actions) = raw.get("actions").and_then(Value::as_array) {
        for item in actions {
            let tag = item.get("action").and_then(Value::as_str).unwrap_or("");
            if !matches!(tag, "install" | "set_env") {
                return Err(EngineError::UnsupportedAction {
                    tool: tool.clone(),
                    tag: tag.to_string(),
                });
            }
            match serde_json::from_value::<Action>(item.clone()) {
                Ok(action) => plan.actions.push(action),
                Err(err) => {
                    tracing::warn!("dropping malformed {tag} action in plan for {tool}: {err}");
                }
            }
        }
    }
    plan.action_count = plan.actions.len();
    Ok(Ok(plan))
}

/// Load a persisted plan; missing or unreadable plans are empty.
pub fn load_plan(root: &SyncRoot, tool: &ToolId) -> Result<Plan, EngineError> {
    Ok(load_plan_checked(root, tool)?.unwrap_or_else(|_| Plan::empty(tool.clone())))
}

/// Apply the persisted plan for `connector.tool()`.
pub fn apply_tool(
    root: &SyncRoot,
    config: &ToolSyncConfig,
    connector: &dyn Connector,
    sink: &LogSink,
    backoff: &dyn Backoff,
) -> Result<ApplySummary, EngineError> {
    let plan = load_plan(root, connector.tool())?;
    ApplyExecutor::new(config, sink, backoff).apply_plan(&plan, connector)
}
