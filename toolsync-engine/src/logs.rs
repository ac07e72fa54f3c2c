//! Append-only domain logs with size-based rotation.
//!
//! Two newline-delimited JSON logs live under `logs/`:
//! - `runtime.log`: [`RuntimeRecord`] per engine event
//! - `errors.ndjson`: [`ErrorRecord`] per failure
//!
//! Before each append the target's size is checked. Once it exceeds
//! `logMaxSizeKb`, the file is renamed to
//! `logs/archive/<prefix>-<yyyymmddThhmmssmmmZ>.log` and the record goes to a
//! fresh file. Archives sharing the prefix are then sorted by mtime (newest
//! first) and all but `logKeepArchives` are deleted.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use toolsync_core::{config::ToolSyncConfig, types::iso_now, Action, SyncRoot};

use crate::error::{io_err, EngineError};

pub const RUNTIME_PREFIX: &str = "runtime";
pub const ERROR_PREFIX: &str = "errors";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Debug,
    Info,
    Warn,
    Error,
}

/// One line of `runtime.log`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuntimeRecord {
    pub ts: String,
    pub level: Level,
    pub source: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// One line of `errors.ndjson`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorRecord {
    pub ts: String,
    pub source: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action: Option<Action>,
    pub error: String,
}

/// Writer for both domain logs of one sync root.
#[derive(Debug, Clone)]
pub struct LogSink {
    runtime_path: PathBuf,
    error_path: PathBuf,
    archive_dir: PathBuf,
    max_bytes: u64,
    keep_archives: usize,
}

impl LogSink {
    pub fn new(root: &SyncRoot, config: &ToolSyncConfig) -> Self {
        Self {
            runtime_path: root.runtime_log_path(),
            error_path: root.error_log_path(),
            archive_dir: root.archive_dir(),
            max_bytes: config.log_max_bytes(),
            keep_archives: config.log_keep_archives.max(1) as usize,
        }
    }

    /// Override thresholds; used by tests to rotate without megabytes of data.
    pub fn with_limits(mut self, max_bytes: u64, keep_archives: usize) -> Self {
        self.max_bytes = max_bytes;
        self.keep_archives = keep_archives.max(1);
        self
    }

    pub fn runtime_path(&self) -> &Path {
        &self.runtime_path
    }

    pub fn error_path(&self) -> &Path {
        &self.error_path
    }

    pub fn archive_dir(&self) -> &Path {
        &self.archive_dir
    }

    pub fn event(
        &self,
        level: Level,
        source: &str,
        message: impl Into<String>,
        data: Option<Value>,
    ) -> Result<(), EngineError> {
        let record = RuntimeRecord {
            ts: iso_now(),
            level,
            source: source.to_string(),
            message: message.into(),
            data,
        };
        self.append(&self.runtime_path, RUNTIME_PREFIX, &record)
    }

    pub fn info(&self, source: &str, message: impl Into<String>) -> Result<(), EngineError> {
        self.event(Level::Info, source, message, None)
    }

    pub fn error(
        &self,
        source: &str,
        message: impl Into<String>,
        action: Option<&Action>,
        error: impl Into<String>,
    ) -> Result<(), EngineError> {
        let record = ErrorRecord {
            ts: iso_now(),
            source: source.to_string(),
            message: message.into(),
            action: action.cloned(),
            error: error.into(),
        };
        self.append(&self.error_path, ERROR_PREFIX, &record)
    }

    fn append<T: Serialize>(&self, path: &Path, prefix: &str, record: &T) -> Result<(), EngineError> {
        if let Some(archive) = rotate_if_needed(path, &self.archive_dir, prefix, self.max_bytes)
            .map_err(|e| io_err(path, e))?
        {
            tracing::info!("rotated {} to {}", path.display(), archive.display());
            prune_archives(&self.archive_dir, prefix, self.keep_archives)
                .map_err(|e| io_err(&self.archive_dir, e))?;
        }

        let mut line = serde_json::to_string(record)?;
        line.push('\n');
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir).map_err(|e| io_err(dir, e))?;
        }
        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|e| io_err(path, e))?;
        file.write_all(line.as_bytes()).map_err(|e| io_err(path, e))?;
        Ok(())
    }
}

/// Move `log_path` into `archive_dir` if its size exceeds `max_bytes`.
///
/// Returns the archive path when rotation occurred, `None` if the file was
/// under the threshold or did not exist yet.
pub fn rotate_if_needed(
    log_path: &Path,
    archive_dir: &Path,
    prefix: &str,
    max_bytes: u64,
) -> io::Result<Option<PathBuf>> {
    let size = match fs::metadata(log_path) {
        Ok(meta) => meta.len(),
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(err) => return Err(err),
    };
    if size <= max_bytes {
        return Ok(None);
    }

    fs::create_dir_all(archive_dir)?;
    let archive = archive_path(archive_dir, prefix);
    fs::rename(log_path, &archive)?;
    Ok(Some(archive))
}

/// Delete all but the `keep` most recently modified `<prefix>-*.log` archives.
///
/// Returns the number of deleted files.
pub fn prune_archives(archive_dir: &Path, prefix: &str, keep: usize) -> io::Result<usize> {
    let mut archives = list_archives(archive_dir, prefix)?;
    let mut removed = 0;
    for (path, _) in archives.drain(keep.min(archives.len())..) {
        match fs::remove_file(&path) {
            Ok(()) => removed += 1,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {}
            Err(err) => return Err(err),
        }
    }
    Ok(removed)
}

/// Archives for `prefix`, newest first. Equal mtimes fall back to name order.
pub fn list_archives(
    archive_dir: &Path,
    prefix: &str,
) -> io::Result<Vec<(PathBuf, std::time::SystemTime)>> {
    let entries = match fs::read_dir(archive_dir) {
        Ok(entries) => entries,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(vec![]),
        Err(err) => return Err(err),
    };
    let marker = format!("{prefix}-");
    let mut archives = Vec::new();
    for entry in entries {
        let entry = entry?;
        let name = entry.file_name();
        let name = name.to_string_lossy();
        if !name.starts_with(&marker) || !name.ends_with(".log") {
            continue;
        }
        let modified = entry.metadata()?.modified()?;
        archives.push((entry.path(), modified));
    }
    archives.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| b.0.cmp(&a.0)));
    Ok(archives)
}

/// Timestamped archive path that does not collide with an existing file.
fn archive_path(archive_dir: &Path, prefix: &str) -> PathBuf {
    let stamp = Utc::now().format("%Y%m%dT%H%M%S%3fZ");
    let base = archive_dir.join(format!("{prefix}-{stamp}.log"));
    if !base.exists() {
        return base;
    }
    (1..)
        .map(|n| archive_dir.join(format!("{prefix}-{stamp}-{n}.log")))
        .find(|p| !p.exists())
        .unwrap_or(base)
}

// ─── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use filetime::{set_file_mtime, FileTime};
    use tempfile::TempDir;
    use toolsync_core::{Category, ToolId};

    fn sink(dir: &TempDir, max_bytes: u64, keep: usize) -> LogSink {
        let root = SyncRoot::new(dir.path());
        LogSink::new(&root, &ToolSyncConfig::default()).with_limits(max_bytes, keep)
    }

    fn archive_count(sink: &LogSink, prefix: &str) -> usize {
        list_archives(sink.archive_dir(), prefix).unwrap().len()
    }

    #[test]
    fn appends_structured_runtime_records() {
        let dir = TempDir::new().unwrap();
        let sink = sink(&dir, 1 << 20, 3);
        sink.info("cycle", "started").unwrap();
        sink.event(
            Level::Warn,
            "apply",
            "slow",
            Some(serde_json::json!({"tool": "vscode"})),
        )
        .unwrap();

        let contents = fs::read_to_string(sink.runtime_path()).unwrap();
        let records: Vec<RuntimeRecord> = contents
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].level, Level::Info);
        assert_eq!(records[1].source, "apply");
        assert_eq!(records[1].data.as_ref().unwrap()["tool"], "vscode");
    }

    #[test]
    fn error_records_carry_the_failing_action() {
        let dir = TempDir::new().unwrap();
        let sink = sink(&dir, 1 << 20, 3);
        let action = Action::Install {
            category: Category::Mcp,
            name: "github".into(),
            source_tools: vec![ToolId::from("cursor")],
        };
        sink.error("apply", "install failed", Some(&action), "exit 1")
            .unwrap();
        let line = fs::read_to_string(sink.error_path()).unwrap();
        let record: ErrorRecord = serde_json::from_str(line.trim()).unwrap();
        assert_eq!(record.action, Some(action));
        assert_eq!(record.error, "exit 1");
    }

    #[test]
    fn rotation_noop_when_under_threshold() {
        let dir = TempDir::new().unwrap();
        let sink = sink(&dir, 1 << 20, 3);
        for _ in 0..10 {
            sink.info("t", "small").unwrap();
        }
        assert_eq!(archive_count(&sink, RUNTIME_PREFIX), 0);
    }

    #[test]
    fn crossing_threshold_rotates_exactly_once() {
        let dir = TempDir::new().unwrap();
        let sink = sink(&dir, 200, 5);
        // Each record is well under 200 bytes; keep appending until the file
        // crosses the threshold, then one more append triggers rotation.
        while fs::metadata(sink.runtime_path()).map(|m| m.len()).unwrap_or(0) <= 200 {
            sink.info("t", "payload").unwrap();
        }
        assert_eq!(archive_count(&sink, RUNTIME_PREFIX), 0);

        sink.info("t", "after crossing").unwrap();
        assert_eq!(archive_count(&sink, RUNTIME_PREFIX), 1);
        let fresh = fs::read_to_string(sink.runtime_path()).unwrap();
        assert_eq!(fresh.lines().count(), 1, "fresh file holds only the new record");

        sink.info("t", "still small").unwrap();
        assert_eq!(archive_count(&sink, RUNTIME_PREFIX), 1);
    }

    #[test]
    fn retention_keeps_newest_archives_and_deletes_oldest() {
        let dir = TempDir::new().unwrap();
        let sink = sink(&dir, 10, 2);
        fs::create_dir_all(sink.archive_dir()).unwrap();

        let base = FileTime::from_unix_time(1_700_000_000, 0);
        for (i, name) in ["runtime-a.log", "runtime-b.log", "runtime-c.log"]
            .iter()
            .enumerate()
        {
            let p = sink.archive_dir().join(name);
            fs::write(&p, "old").unwrap();
            set_file_mtime(&p, FileTime::from_unix_time(base.unix_seconds() + i as i64, 0))
                .unwrap();
        }
        // Unrelated prefix must survive pruning.
        fs::write(sink.archive_dir().join("errors-x.log"), "x").unwrap();

        fs::write(sink.runtime_path(), "x".repeat(64)).unwrap();
        sink.info("t", "rotate now").unwrap();

        let remaining: Vec<String> = list_archives(sink.archive_dir(), RUNTIME_PREFIX)
            .unwrap()
            .into_iter()
            .map(|(p, _)| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(remaining.len(), 2);
        assert!(!remaining.contains(&"runtime-a.log".to_string()));
        assert!(!remaining.contains(&"runtime-b.log".to_string()));
        assert!(remaining.contains(&"runtime-c.log".to_string()));
        assert!(sink.archive_dir().join("errors-x.log").exists());
    }

    #[test]
    fn error_log_rotates_independently() {
        let dir = TempDir::new().unwrap();
        let sink = sink(&dir, 10, 3);
        fs::create_dir_all(dir.path().join("logs")).unwrap();
        fs::write(sink.error_path(), "x".repeat(64)).unwrap();
        sink.error("apply", "boom", None, "e").unwrap();
        assert_eq!(archive_count(&sink, ERROR_PREFIX), 1);
        assert_eq!(archive_count(&sink, RUNTIME_PREFIX), 0);
    }

    #[test]
    fn rotation_skips_missing_file() {
        let dir = TempDir::new().unwrap();
        let rotated =
            rotate_if_needed(&dir.path().join("none.log"), dir.path(), "runtime", 1).unwrap();
        assert!(rotated.is_none());
    }

    #[test]
    fn archive_names_do_not_collide() {
        let dir = TempDir::new().unwrap();
        let first = archive_path(dir.path(), "runtime");
        fs::write(&first, "").unwrap();
        let second = archive_path(dir.path(), "runtime");
        assert_ne!(first, second);
    }
}
