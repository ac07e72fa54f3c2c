//! Domain types shared by every toolsync crate.
//!
//! All timestamps are ISO-8601 strings in one fixed shape
//! (`2026-10-18T09:30:00.000Z`) so that lexical comparison is chronological.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

/// Timestamp used when a snapshot does not carry `updatedAt`.
pub const EPOCH_ISO: &str = "1970-01-01T00:00:00.000Z";

/// Current time in the canonical persisted format.
pub fn iso_now() -> String {
    iso_timestamp(Utc::now())
}

/// Format `at` in the canonical persisted format.
pub fn iso_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

// ---------------------------------------------------------------------------
// Newtypes
// ---------------------------------------------------------------------------

/// Identifier of a tool connector (`vscode`, `cursor`, ...). Open set.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ToolId(pub String);

impl ToolId {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// File stem used for `snapshots/<tool>.json` and `plans/<tool>.json`.
    pub fn file_stem(&self) -> String {
        self.0
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                    c
                } else {
                    '_'
                }
            })
            .collect()
    }
}

impl fmt::Display for ToolId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<String> for ToolId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for ToolId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

// ---------------------------------------------------------------------------
// Category
// ---------------------------------------------------------------------------

/// The closed set of reconciled item categories.
///
/// Declaration order is the plan emission order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Extension,
    Mcp,
    Skill,
    TerminalTheme,
    EditorTheme,
}

impl Category {
    pub const ALL: [Category; 5] = [
        Category::Extension,
        Category::Mcp,
        Category::Skill,
        Category::TerminalTheme,
        Category::EditorTheme,
    ];

    pub fn all() -> &'static [Category] {
        &Self::ALL
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Category::Extension => "extension",
            Category::Mcp => "mcp",
            Category::Skill => "skill",
            Category::TerminalTheme => "terminal_theme",
            Category::EditorTheme => "editor_theme",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Category::ALL
            .iter()
            .copied()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| {
                format!(
                    "unknown category '{s}'; expected: extension, mcp, skill, terminal_theme, editor_theme"
                )
            })
    }
}

// ---------------------------------------------------------------------------
// Snapshot
// ---------------------------------------------------------------------------

/// What one tool reported about itself in one cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    pub tool: ToolId,
    #[serde(rename = "updatedAt")]
    pub updated_at: String,
    #[serde(default)]
    pub extension: BTreeSet<String>,
    #[serde(default)]
    pub mcp: BTreeSet<String>,
    #[serde(default)]
    pub skill: BTreeSet<String>,
    #[serde(default)]
    pub terminal_theme: BTreeSet<String>,
    #[serde(default)]
    pub editor_theme: BTreeSet<String>,
    #[serde(default)]
    pub env: BTreeMap<String, String>,
}

impl Snapshot {
    /// An all-empty snapshot stamped with the epoch.
    pub fn empty(tool: ToolId) -> Self {
        Self {
            tool,
            updated_at: EPOCH_ISO.to_string(),
            extension: BTreeSet::new(),
            mcp: BTreeSet::new(),
            skill: BTreeSet::new(),
            terminal_theme: BTreeSet::new(),
            editor_theme: BTreeSet::new(),
            env: BTreeMap::new(),
        }
    }

    pub fn items(&self, category: Category) -> &BTreeSet<String> {
        match category {
            Category::Extension => &self.extension,
            Category::Mcp => &self.mcp,
            Category::Skill => &self.skill,
            Category::TerminalTheme => &self.terminal_theme,
            Category::EditorTheme => &self.editor_theme,
        }
    }

    pub fn items_mut(&mut self, category: Category) -> &mut BTreeSet<String> {
        match category {
            Category::Extension => &mut self.extension,
            Category::Mcp => &mut self.mcp,
            Category::Skill => &mut self.skill,
            Category::TerminalTheme => &mut self.terminal_theme,
            Category::EditorTheme => &mut self.editor_theme,
        }
    }
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// The winning value for one allow-listed environment key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnvEntry {
    pub value: String,
    pub source_tool: ToolId,
    pub updated_at: String,
}

/// Item name → tools that currently have it.
pub type ItemOwners = BTreeMap<String, BTreeSet<ToolId>>;

/// Canonical cross-tool view, rebuilt every cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Registry {
    pub revision: u64,
    pub updated_at: String,
    pub tools: Vec<ToolId>,
    pub by_type: BTreeMap<Category, ItemOwners>,
    pub env: BTreeMap<String, EnvEntry>,
}

impl Registry {
    /// Owners of every item in `category`. Built registries list every
    /// category; `None` only for a loaded registry missing the key.
    pub fn owners(&self, category: Category) -> Option<&ItemOwners> {
        self.by_type.get(&category)
    }

    pub fn item_count(&self, category: Category) -> usize {
        self.owners(category).map(BTreeMap::len).unwrap_or(0)
    }
}

// ---------------------------------------------------------------------------
// Plan
// ---------------------------------------------------------------------------

/// One corrective step for a target tool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Action {
    #[serde(rename_all = "camelCase")]
    Install {
        category: Category,
        name: String,
        source_tools: Vec<ToolId>,
    },
    #[serde(rename_all = "camelCase")]
    SetEnv {
        key: String,
        value: String,
        source_tool: ToolId,
    },
}

impl Action {
    /// Short human label, e.g. `install extension:X` or `set_env TZ`.
    pub fn label(&self) -> String {
        match self {
            Action::Install { category, name, .. } => format!("install {category}:{name}"),
            Action::SetEnv { key, .. } => format!("set_env {key}"),
        }
    }
}

/// Ordered actions for one tool, derived from one registry revision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Plan {
    pub tool: ToolId,
    pub revision: u64,
    pub generated_at: String,
    pub action_count: usize,
    pub actions: Vec<Action>,
}

impl Plan {
    pub fn empty(tool: ToolId) -> Self {
        Self {
            tool,
            revision: 0,
            generated_at: EPOCH_ISO.to_string(),
            action_count: 0,
            actions: vec![],
        }
    }
}

// ---------------------------------------------------------------------------
// Revision state
// ---------------------------------------------------------------------------

/// Cross-cycle memory: the last committed revision.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RevisionState {
    #[serde(default)]
    pub revision: u64,
    #[serde(default)]
    pub last_run_at: Option<String>,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
