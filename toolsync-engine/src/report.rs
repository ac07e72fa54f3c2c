//! On-demand diagnostic report.
//!
//! Bundles config, revision state, a registry summary and the tails of both
//! logs into `reports/diagnostic-<ts>.json`. Reads logs, never writes them.

use std::collections::{BTreeMap, VecDeque};
use std::fs::File;
use std::io::{BufRead, BufReader, ErrorKind};
use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::{Deserialize, Serialize};

use toolsync_core::{
    config::ToolSyncConfig, state, store, types::iso_now, Category, Registry, RevisionState,
    SyncRoot, ToolId,
};

use crate::error::{io_err, EngineError};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistrySummary {
    pub revision: u64,
    pub updated_at: String,
    pub tools: Vec<ToolId>,
    pub item_counts: BTreeMap<Category, usize>,
    pub env_keys: Vec<String>,
}

impl RegistrySummary {
    pub fn from_registry(registry: &Registry) -> Self {
        Self {
            revision: registry.revision,
            updated_at: registry.updated_at.clone(),
            tools: registry.tools.clone(),
            item_counts: Category::all()
                .iter()
                .map(|c| (*c, registry.item_count(*c)))
                .collect(),
            env_keys: registry.env.keys().cloned().collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiagnosticReport {
    pub generated_at: String,
    pub sync_root: PathBuf,
    pub config: ToolSyncConfig,
    pub state: RevisionState,
    pub registry: Option<RegistrySummary>,
    pub runtime_log_tail: Vec<String>,
    pub error_log_tail: Vec<String>,
}

/// Assemble a report from the current on-disk state.
pub fn build_report(root: &SyncRoot, config: &ToolSyncConfig) -> Result<DiagnosticReport, EngineError> {
    let tail = usize::try_from(config.report_tail_lines).unwrap_or(usize::MAX);
    let registry = store::read_json::<Registry>(&root.registry_path())
        .ok()
        .map(|r| RegistrySummary::from_registry(&r));
    Ok(DiagnosticReport {
        generated_at: iso_now(),
        sync_root: root.path().to_path_buf(),
        config: config.clone(),
        state: state::load_state(root),
        registry,
        runtime_log_tail: tail_lines(&root.runtime_log_path(), tail)?,
        error_log_tail: tail_lines(&root.error_log_path(), tail)?,
    })
}

/// Build and persist a report; returns the written path.
pub fn write_report(root: &SyncRoot, config: &ToolSyncConfig) -> Result<PathBuf, EngineError> {
    let report = build_report(root, config)?;
    let stamp = Utc::now().format("%Y%m%dT%H%M%S%3fZ");
    let mut path = root.reports_dir().join(format!("diagnostic-{stamp}.json"));
    let mut n = 1;
    while path.exists() {
        path = root
            .reports_dir()
            .join(format!("diagnostic-{stamp}-{n}.json"));
        n += 1;
    }
    store::write_json_atomic(&path, &report)?;
    tracing::info!("diagnostic report written to {}", path.display());
    Ok(path)
}

/// Last `lines` lines of `path`; a missing file has no lines.
pub fn tail_lines(path: &Path, lines: usize) -> Result<Vec<String>, EngineError> {
    let file = match File::open(path) {
        Ok(file) => file,
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(vec![]),
        Err(err) => return Err(io_err(path, err)),
    };
    let mut tail = VecDeque::new();
    for line in BufReader::new(file).lines() {
        let line = line.map_err(|e| io_err(path, e))?;
        if lines == 0 {
            continue;
        }
        if tail.len() == lines {
            tail.pop_front();
        }
        tail.push_back(line);
    }
    Ok(tail.into_iter().collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logs::LogSink;
    use tempfile::TempDir;

    #[test]
    fn report_without_registry_or_logs() {
        let tmp = TempDir::new().unwrap();
        let root = SyncRoot::new(tmp.path());
        let report = build_report(&root, &ToolSyncConfig::default()).unwrap();
        assert!(report.registry.is_none());
        assert!(report.runtime_log_tail.is_empty());
        assert_eq!(report.state.revision, 0);
    }

    #[test]
    fn report_tails_logs_without_mutating_them() {
        let tmp = TempDir::new().unwrap();
        let root = SyncRoot::new(tmp.path());
        let config = ToolSyncConfig {
            report_tail_lines: 10,
            ..ToolSyncConfig::default()
        };
        let sink = LogSink::new(&root, &config);
        for i in 0..25 {
            sink.info("test", format!("event {i}")).unwrap();
        }
        sink.error("apply", "boom", None, "bad").unwrap();
        let before = std::fs::read(root.runtime_log_path()).unwrap();

        let path = write_report(&root, &config).unwrap();
        assert!(path.starts_with(root.reports_dir()));
        assert!(path
            .file_name()
            .unwrap()
            .to_string_lossy()
            .starts_with("diagnostic-"));

        let report: DiagnosticReport = store::read_json(&path).unwrap();
        assert_eq!(report.runtime_log_tail.len(), 10);
        assert!(report.runtime_log_tail[9].contains("event 24"));
        assert_eq!(report.error_log_tail.len(), 1);
        assert_eq!(std::fs::read(root.runtime_log_path()).unwrap(), before);
    }

    #[test]
    fn two_reports_do_not_overwrite_each_other() {
        let tmp = TempDir::new().unwrap();
        let root = SyncRoot::new(tmp.path());
        let config = ToolSyncConfig::default();
        let a = write_report(&root, &config).unwrap();
        let b = write_report(&root, &config).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn tail_of_missing_file_is_empty() {
        let tmp = TempDir::new().unwrap();
        assert!(tail_lines(&tmp.path().join("nope.log"), 5).unwrap().is_empty());
    }

    #[test]
    fn huge_tail_setting_reads_whole_log() {
        let tmp = TempDir::new().unwrap();
        let root = SyncRoot::new(tmp.path());
        let config = ToolSyncConfig::from_value(&serde_json::json!({
            "reportTailLines": 1u64 << 62
        }));
        let sink = LogSink::new(&root, &config);
        for i in 0..3 {
            sink.info("test", format!("event {i}")).unwrap();
        }

        let report = build_report(&root, &config).unwrap();
        assert_eq!(report.runtime_log_tail.len(), 3);
        assert!(report.error_log_tail.is_empty());
        assert_eq!(tail_lines(&root.runtime_log_path(), usize::MAX).unwrap().len(), 3);
    }
}
