//! Sync-root directory layout.
//!
//! # Storage layout
//!
//! ```text
//! <root>/
//!   config.json
//!   state.json
//!   registry.json
//!   snapshots/<tool>.json
//!   plans/<tool>.json
//!   logs/runtime.log
//!   logs/errors.ndjson
//!   logs/archive/<prefix>-<ts>.log
//!   reports/diagnostic-<ts>.json
//! ```
//!
//! All path helpers are pure; only [`SyncRoot::ensure`] touches the disk.

use std::path::{Path, PathBuf};

use crate::error::{io_err, StoreError};
use crate::types::ToolId;

pub const CONFIG_FILE: &str = "config.json";
pub const STATE_FILE: &str = "state.json";
pub const REGISTRY_FILE: &str = "registry.json";
pub const RUNTIME_LOG_FILE: &str = "runtime.log";
pub const ERROR_LOG_FILE: &str = "errors.ndjson";

/// Root directory shared by the engine and every connector on this machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncRoot {
    root: PathBuf,
}

impl SyncRoot {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// `~/.toolsync` (uses `dirs::home_dir()`).
    pub fn default_root() -> Result<Self, StoreError> {
        let home = dirs::home_dir().ok_or(StoreError::HomeNotFound)?;
        Ok(Self::new(home.join(".toolsync")))
    }

    pub fn path(&self) -> &Path {
        &self.root
    }

    pub fn config_path(&self) -> PathBuf {
        self.root.join(CONFIG_FILE)
    }

    pub fn state_path(&self) -> PathBuf {
        self.root.join(STATE_FILE)
    }

    pub fn registry_path(&self) -> PathBuf {
        self.root.join(REGISTRY_FILE)
    }

    pub fn snapshots_dir(&self) -> PathBuf {
        self.root.join("snapshots")
    }

    pub fn snapshot_path(&self, tool: &ToolId) -> PathBuf {
        self.snapshots_dir()
            .join(format!("{}.json", tool.file_stem()))
    }

    pub fn plans_dir(&self) -> PathBuf {
        self.root.join("plans")
    }

    pub fn plan_path(&self, tool: &ToolId) -> PathBuf {
        self.plans_dir().join(format!("{}.json", tool.file_stem()))
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.root.join("logs")
    }

    pub fn runtime_log_path(&self) -> PathBuf {
        self.logs_dir().join(RUNTIME_LOG_FILE)
    }

    pub fn error_log_path(&self) -> PathBuf {
        self.logs_dir().join(ERROR_LOG_FILE)
    }

    pub fn archive_dir(&self) -> PathBuf {
        self.logs_dir().join("archive")
    }

    pub fn reports_dir(&self) -> PathBuf {
        self.root.join("reports")
    }

    /// Create every directory of the layout. Idempotent.
    pub fn ensure(&self) -> Result<(), StoreError> {
        for dir in [
            self.root.clone(),
            self.snapshots_dir(),
            self.plans_dir(),
            self.logs_dir(),
            self.archive_dir(),
            self.reports_dir(),
        ] {
            if !dir.exists() {
                std::fs::create_dir_all(&dir).map_err(|e| io_err(&dir, e))?;
            }
        }
        Ok(())
    }

    /// Tool ids of every `snapshots/*.json` file, sorted by file stem.
    ///
    /// A missing directory yields an empty list.
    pub fn snapshot_tools_on_disk(&self) -> Result<Vec<ToolId>, StoreError> {
        let dir = self.snapshots_dir();
        let entries = match std::fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(vec![]),
            Err(err) => return Err(io_err(&dir, err)),
        };
        let mut tools: Vec<ToolId> = entries
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().map(|t| t.is_file()).unwrap_or(false))
            .filter_map(|e| {
                let path = e.path();
                if path.extension().and_then(|ext| ext.to_str()) != Some("json") {
                    return None;
                }
                path.file_stem()
                    .and_then(|s| s.to_str())
                    .map(ToolId::from)
            })
            .collect();
        tools.sort();
        Ok(tools)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn paths_are_rooted() {
        let root = SyncRoot::new("/sync");
        assert_eq!(root.config_path(), PathBuf::from("/sync/config.json"));
        assert_eq!(
            root.snapshot_path(&ToolId::from("vscode")),
            PathBuf::from("/sync/snapshots/vscode.json")
        );
        assert_eq!(
            root.plan_path(&ToolId::from("cursor")),
            PathBuf::from("/sync/plans/cursor.json")
        );
        assert_eq!(
            root.error_log_path(),
            PathBuf::from("/sync/logs/errors.ndjson")
        );
        assert_eq!(root.archive_dir(), PathBuf::from("/sync/logs/archive"));
    }

    #[test]
    fn ensure_creates_every_directory() {
        let tmp = TempDir::new().unwrap();
        let root = SyncRoot::new(tmp.path().join("root"));
        root.ensure().unwrap();
        root.ensure().unwrap();
        for dir in [
            root.snapshots_dir(),
            root.plans_dir(),
            root.archive_dir(),
            root.reports_dir(),
        ] {
            assert!(dir.is_dir(), "{} should exist", dir.display());
        }
    }

    #[test]
    fn snapshot_tools_lists_json_stems_sorted() {
        let tmp = TempDir::new().unwrap();
        let root = SyncRoot::new(tmp.path());
        root.ensure().unwrap();
        std::fs::write(root.snapshots_dir().join("zed.json"), "{}").unwrap();
        std::fs::write(root.snapshots_dir().join("cursor.json"), "{}").unwrap();
        std::fs::write(root.snapshots_dir().join("notes.txt"), "").unwrap();
        let tools = root.snapshot_tools_on_disk().unwrap();
        assert_eq!(tools, vec![ToolId::from("cursor"), ToolId::from("zed")]);
    }

    #[test]
    fn snapshot_tools_empty_without_directory() {
        let tmp = TempDir::new().unwrap();
        let root = SyncRoot::new(tmp.path().join("missing"));
        assert!(root.snapshot_tools_on_disk().unwrap().is_empty());
    }
}
