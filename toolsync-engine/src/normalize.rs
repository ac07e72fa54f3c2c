//! Snapshot normalizer.
//!
//! Turns whatever a connector left in `snapshots/<tool>.json` into a complete
//! [`Snapshot`]. Never fails: a structurally wrong field becomes its empty
//! default, so one corrupt file only degrades that tool's contribution.

use serde_json::Value;

use toolsync_core::{
    config::ToolSyncConfig, store, Category, ParseError, Snapshot, SyncRoot, ToolId,
};

/// Canonicalize a raw (possibly absent or partial) snapshot payload.
///
/// `tool` always wins over any `tool` field inside the payload: the file name
/// is the identity.
pub fn normalize_snapshot(raw: Option<&Value>, tool: &ToolId) -> Snapshot {
    let mut snapshot = Snapshot::empty(tool.clone());
    let Some(obj) = raw.and_then(Value::as_object) else {
        return snapshot;
    };

    if let Some(updated_at) = obj.get("updatedAt").and_then(Value::as_str) {
        if !updated_at.trim().is_empty() {
            snapshot.updated_at = updated_at.to_string();
        }
    }

    for category in Category::all() {
        let Some(items) = obj.get(category.as_str()).and_then(Value::as_array) else {
            continue;
        };
        let set = snapshot.items_mut(*category);
        for name in items.iter().filter_map(Value::as_str) {
            let name = name.trim();
            if !name.is_empty() {
                set.insert(name.to_string());
            }
        }
    }

    if let Some(env) = obj.get("env").and_then(Value::as_object) {
        for (key, value) in env {
            if let Some(value) = value.as_str() {
                snapshot.env.insert(key.clone(), value.to_string());
            }
        }
    }

    snapshot
}

/// Read and normalize one tool's snapshot file, reporting why it was unusable.
///
/// The returned snapshot is still usable on error: it is the all-empty default.
pub fn load_snapshot_checked(root: &SyncRoot, tool: &ToolId) -> (Snapshot, Option<ParseError>) {
    match store::read_value(&root.snapshot_path(tool)) {
        Ok(raw) => (normalize_snapshot(Some(&raw), tool), None),
        Err(err) => (Snapshot::empty(tool.clone()), Some(err)),
    }
}

/// Read and normalize one tool's snapshot file; absence is an empty snapshot.
pub fn load_snapshot(root: &SyncRoot, tool: &ToolId) -> Snapshot {
    load_snapshot_checked(root, tool).0
}

/// Load one snapshot per configured tool, then one per unconfigured snapshot
/// file found on disk.
///
/// Order matters: it is the input order for env tie-breaking. Configured tools
/// come first in configuration order, extras follow sorted by file stem.
pub fn load_all_snapshots(root: &SyncRoot, config: &ToolSyncConfig) -> Vec<Snapshot> {
    let mut snapshots: Vec<Snapshot> = Vec::new();
    for tool in &config.tools {
        let (snapshot, err) = load_snapshot_checked(root, tool);
        match err {
            None | Some(ParseError::Missing { .. }) => {}
            Some(err) => tracing::warn!("snapshot for {tool} ignored: {err}"),
        }
        snapshots.push(snapshot);
    }

    let on_disk = match root.snapshot_tools_on_disk() {
        Ok(tools) => tools,
        Err(err) => {
            tracing::warn!("could not list snapshot directory: {err}");
            vec![]
        }
    };
    for stem in on_disk {
        let known = config
            .tools
            .iter()
            .any(|t| t.file_stem() == stem.as_str());
        if !known {
            snapshots.push(load_snapshot(root, &stem));
        }
    }
    snapshots
}
