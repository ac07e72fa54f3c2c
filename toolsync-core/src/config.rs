//! `config.json`: resolved [`ToolSyncConfig`].
//!
//! Loading is lenient: a field of the wrong type falls back to its default,
//! numeric fields are clamped to their minimum, and a missing or unparsable
//! file yields [`ToolSyncConfig::default`].

use std::collections::HashSet;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{ParseError, StoreError};
use crate::layout::SyncRoot;
use crate::store;
use crate::types::{Category, ToolId};

pub const MIN_APPLY_RETRY_COUNT: u64 = 0;
pub const MIN_APPLY_RETRY_DELAY_SEC: u64 = 1;
pub const MIN_LOG_MAX_SIZE_KB: u64 = 64;
pub const MIN_LOG_KEEP_ARCHIVES: u64 = 1;
pub const MIN_REPORT_TAIL_LINES: u64 = 10;
pub const MIN_PERIODIC_INTERVAL_SEC: u64 = 60;

/// Engine configuration shared by every cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolSyncConfig {
    pub tools: Vec<ToolId>,
    pub allow_env_keys: Vec<String>,
    /// Modelled only; removal propagation is connector-specific.
    pub propagate_delete: bool,
    pub exclude_extensions: Vec<String>,
    pub exclude_mcp: Vec<String>,
    pub exclude_skills: Vec<String>,
    pub apply_retry_count: u64,
    pub apply_retry_delay_sec: u64,
    pub log_max_size_kb: u64,
    pub log_keep_archives: u64,
    pub report_tail_lines: u64,
    pub auto_apply: bool,
    pub periodic_interval_sec: u64,
}

impl Default for ToolSyncConfig {
    fn default() -> Self {
        Self {
            tools: ["vscode", "cursor", "windsurf"]
                .into_iter()
                .map(ToolId::from)
                .collect(),
            allow_env_keys: ["TZ", "LANG", "EDITOR"].into_iter().map(String::from).collect(),
            propagate_delete: false,
            exclude_extensions: vec![],
            exclude_mcp: vec![],
            exclude_skills: vec![],
            apply_retry_count: 2,
            apply_retry_delay_sec: 5,
            log_max_size_kb: 1024,
            log_keep_archives: 5,
            report_tail_lines: 200,
            auto_apply: false,
            periodic_interval_sec: 900,
        }
    }
}

impl ToolSyncConfig {
    /// Build a config from an arbitrary JSON value, field by field.
    pub fn from_value(raw: &Value) -> Self {
        let defaults = Self::default();
        let Some(obj) = raw.as_object() else {
            return defaults;
        };

        Self {
            tools: string_list(obj, "tools")
                .map(|v| v.into_iter().map(ToolId::from).collect())
                .unwrap_or(defaults.tools),
            allow_env_keys: string_list(obj, "allowEnvKeys").unwrap_or(defaults.allow_env_keys),
            propagate_delete: bool_field(obj, "propagateDelete")
                .unwrap_or(defaults.propagate_delete),
            exclude_extensions: string_list(obj, "excludeExtensions")
                .unwrap_or(defaults.exclude_extensions),
            exclude_mcp: string_list(obj, "excludeMcp").unwrap_or(defaults.exclude_mcp),
            exclude_skills: string_list(obj, "excludeSkills").unwrap_or(defaults.exclude_skills),
            apply_retry_count: clamped(
                obj,
                "applyRetryCount",
                defaults.apply_retry_count,
                MIN_APPLY_RETRY_COUNT,
            ),
            apply_retry_delay_sec: clamped(
                obj,
                "applyRetryDelaySec",
                defaults.apply_retry_delay_sec,
                MIN_APPLY_RETRY_DELAY_SEC,
            ),
            log_max_size_kb: clamped(
                obj,
                "logMaxSizeKb",
                defaults.log_max_size_kb,
                MIN_LOG_MAX_SIZE_KB,
            ),
            log_keep_archives: clamped(
                obj,
                "logKeepArchives",
                defaults.log_keep_archives,
                MIN_LOG_KEEP_ARCHIVES,
            ),
            report_tail_lines: clamped(
                obj,
                "reportTailLines",
                defaults.report_tail_lines,
                MIN_REPORT_TAIL_LINES,
            ),
            auto_apply: bool_field(obj, "autoApply").unwrap_or(defaults.auto_apply),
            periodic_interval_sec: clamped(
                obj,
                "periodicIntervalSec",
                defaults.periodic_interval_sec,
                MIN_PERIODIC_INTERVAL_SEC,
            ),
        }
    }

    /// Exclusion list consulted for installs in `category`, if any.
    pub fn exclusions(&self, category: Category) -> &[String] {
        match category {
            Category::Extension => &self.exclude_extensions,
            Category::Mcp => &self.exclude_mcp,
            Category::Skill => &self.exclude_skills,
            Category::TerminalTheme | Category::EditorTheme => &[],
        }
    }

    pub fn is_excluded(&self, category: Category, name: &str) -> bool {
        self.exclusions(category).iter().any(|n| n == name)
    }

    pub fn is_configured(&self, tool: &ToolId) -> bool {
        self.tools.contains(tool)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_secs(self.apply_retry_delay_sec)
    }

    pub fn log_max_bytes(&self) -> u64 {
        self.log_max_size_kb.saturating_mul(1024)
    }

    pub fn periodic_interval(&self) -> Duration {
        Duration::from_secs(self.periodic_interval_sec)
    }
}

/// Load `config.json`, reporting why it could not be used.
pub fn load_config_checked(root: &SyncRoot) -> Result<ToolSyncConfig, ParseError> {
    let raw = store::read_value(&root.config_path())?;
    Ok(ToolSyncConfig::from_value(&raw))
}

/// Load `config.json`; any problem yields the default config.
pub fn load_config(root: &SyncRoot) -> ToolSyncConfig {
    load_config_checked(root).unwrap_or_default()
}

pub fn save_config(root: &SyncRoot, config: &ToolSyncConfig) -> Result<(), StoreError> {
    store::write_json_atomic(&root.config_path(), config)
}

// ---------------------------------------------------------------------------
// Field extraction
// ---------------------------------------------------------------------------

fn string_list(obj: &Map<String, Value>, key: &str) -> Option<Vec<String>> {
    let items = obj.get(key)?.as_array()?;
    let mut seen = HashSet::new();
    Some(
        items
            .iter()
            .filter_map(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .filter(|s| seen.insert(s.to_string()))
            .map(String::from)
            .collect(),
    )
}

fn bool_field(obj: &Map<String, Value>, key: &str) -> Option<bool> {
    obj.get(key)?.as_bool()
}

fn clamped(obj: &Map<String, Value>, key: &str, default: u64, min: u64) -> u64 {
    let value = match obj.get(key) {
        Some(Value::Number(n)) => n
            .as_u64()
            .or_else(|| n.as_i64().map(|i| i.max(0) as u64))
            .or_else(|| n.as_f64().map(|f| f.max(0.0).floor() as u64))
            .unwrap_or(default),
        _ => default,
    };
    value.max(min)
}
