//! Connector capability boundary.
//!
//! A connector knows one tool's local environment: it can list what is
//! installed and apply one corrective action at a time. It cannot see other
//! tools; reconciliation happens in this crate.

use std::collections::BTreeSet;

use thiserror::Error;

use toolsync_core::{types::iso_now, Category, Snapshot, ToolId};

/// Failure reported by a connector. Carries the connector's own message.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct ConnectorError(pub String);

/// Injected per-tool capability. Each `apply_*` call must be idempotent:
/// applying an already-present item succeeds.
pub trait Connector: Send + Sync {
    fn tool(&self) -> &ToolId;

    fn list_installed(&self, category: Category) -> Result<BTreeSet<String>, ConnectorError>;

    /// Install an item, set a theme, register an MCP server or a skill.
    fn apply_install(&self, category: Category, name: &str) -> Result<(), ConnectorError>;

    fn apply_set_env(&self, key: &str, value: &str) -> Result<(), ConnectorError>;

    fn current_env(&self, key: &str) -> Option<String>;
}

/// Ask `connector` for its current state and shape it as a [`Snapshot`].
///
/// Only `allow_env_keys` are read. A category the connector cannot list is
/// recorded as empty, matching the normalizer's degradation rule.
pub fn capture_snapshot(connector: &dyn Connector, allow_env_keys: &[String]) -> Snapshot {
    let mut snapshot = Snapshot::empty(connector.tool().clone());
    snapshot.updated_at = iso_now();
    for category in Category::all() {
        match connector.list_installed(*category) {
            Ok(items) => {
                *snapshot.items_mut(*category) = items
                    .into_iter()
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect();
            }
            Err(err) => {
                tracing::warn!("{}: listing {category} failed: {err}", connector.tool());
            }
        }
    }
    for key in allow_env_keys {
        if let Some(value) = connector.current_env(key) {
            snapshot.env.insert(key.clone(), value);
        }
    }
    snapshot
}
