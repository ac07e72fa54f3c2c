//! Full cycles against a temp sync root: snapshot files in, registry and
//! plans out, applied through a recording connector.

use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tempfile::TempDir;
use toolsync_core::{
    config::{save_config, ToolSyncConfig},
    store, Action, Category, Registry, SyncRoot, ToolId,
};
use toolsync_engine::{
    apply::load_plan, apply_all, build_and_persist, Backoff, Connector, ConnectorError, LogSink,
};

struct Recorder {
    tool: ToolId,
    installed: Mutex<BTreeSet<(Category, String)>>,
    env: Mutex<Vec<(String, String)>>,
}

impl Recorder {
    fn new(tool: &str) -> Self {
        Self {
            tool: ToolId::from(tool),
            installed: Mutex::new(BTreeSet::new()),
            env: Mutex::new(Vec::new()),
        }
    }
}

impl Connector for Recorder {
    fn tool(&self) -> &ToolId {
        &self.tool
    }

    fn list_installed(&self, category: Category) -> Result<BTreeSet<String>, ConnectorError> {
        Ok(self
            .installed
            .lock()
            .unwrap()
            .iter()
            .filter(|(c, _)| *c == category)
            .map(|(_, n)| n.clone())
            .collect())
    }

    fn apply_install(&self, category: Category, name: &str) -> Result<(), ConnectorError> {
        self.installed
            .lock()
            .unwrap()
            .insert((category, name.to_string()));
        Ok(())
    }

    fn apply_set_env(&self, key: &str, value: &str) -> Result<(), ConnectorError> {
        self.env
            .lock()
            .unwrap()
            .push((key.to_string(), value.to_string()));
        Ok(())
    }

    fn current_env(&self, _key: &str) -> Option<String> {
        None
    }
}

struct NoWait;

impl Backoff for NoWait {
    fn wait(&self, _: Duration) {}
}

fn setup(tools: &[&str]) -> (TempDir, SyncRoot, ToolSyncConfig) {
    let _ = env_logger::builder().is_test(true).try_init();
    let tmp = TempDir::new().unwrap();
    let root = SyncRoot::new(tmp.path());
    root.ensure().unwrap();
    let config = ToolSyncConfig {
        tools: tools.iter().map(|t| ToolId::from(*t)).collect(),
        ..ToolSyncConfig::default()
    };
    save_config(&root, &config).unwrap();
    (tmp, root, config)
}

fn write_snapshot(root: &SyncRoot, tool: &str, body: &str) {
    std::fs::write(root.snapshot_path(&ToolId::from(tool)), body).unwrap();
}

#[test]
fn missing_extension_is_planned_and_applied() {
    let (_tmp, root, config) = setup(&["A", "B"]);
    write_snapshot(&root, "A", r#"{"tool":"A","extension":["X"]}"#);
    write_snapshot(&root, "B", r#"{"tool":"B","extension":[]}"#);

    build_and_persist(&root, &config).unwrap();
    let plan = load_plan(&root, &ToolId::from("B")).unwrap();
    assert_eq!(plan.action_count, 1);
    assert_eq!(
        plan.actions,
        vec![Action::Install {
            category: Category::Extension,
            name: "X".into(),
            source_tools: vec![ToolId::from("A")],
        }]
    );

    let b = Arc::new(Recorder::new("B"));
    let connectors: Vec<Arc<dyn Connector>> = vec![b.clone()];
    let sink = LogSink::new(&root, &config);
    let summaries = apply_all(&root, &config, &connectors, &sink, &NoWait).unwrap();
    assert_eq!(summaries[0].ok, 1);
    assert!(b
        .installed
        .lock()
        .unwrap()
        .contains(&(Category::Extension, "X".to_string())));
}

#[test]
fn newer_env_value_is_propagated() {
    let (_tmp, root, config) = setup(&["A", "B"]);
    write_snapshot(
        &root,
        "A",
        r#"{"tool":"A","updatedAt":"2026-10-02T00:00:00.000Z","env":{"TZ":"Europe/Berlin"}}"#,
    );
    write_snapshot(
        &root,
        "B",
        r#"{"tool":"B","updatedAt":"2026-10-01T00:00:00.000Z","env":{"TZ":"UTC"}}"#,
    );

    build_and_persist(&root, &config).unwrap();
    let registry: Registry = store::read_json(&root.registry_path()).unwrap();
    assert_eq!(registry.env["TZ"].value, "Europe/Berlin");

    let plan = load_plan(&root, &ToolId::from("B")).unwrap();
    assert_eq!(
        plan.actions,
        vec![Action::SetEnv {
            key: "TZ".into(),
            value: "Europe/Berlin".into(),
            source_tool: ToolId::from("A"),
        }]
    );
    assert!(load_plan(&root, &ToolId::from("A")).unwrap().actions.is_empty());
}

#[test]
fn unchanged_inputs_rebuild_identical_plans_at_next_revision() {
    let (_tmp, root, config) = setup(&["A", "B"]);
    write_snapshot(&root, "A", r#"{"tool":"A","mcp":["fs","github"],"skill":["pdf"]}"#);
    write_snapshot(&root, "B", r#"{"tool":"B","mcp":["fs"]}"#);

    let first = build_and_persist(&root, &config).unwrap();
    let second = build_and_persist(&root, &config).unwrap();
    assert_eq!(second.revision, first.revision + 1);
    for (a, b) in first.plans.iter().zip(&second.plans) {
        assert_eq!(a.actions, b.actions);
    }
}

#[test]
fn corrupt_snapshot_and_config_degrade_to_defaults() {
    let (_tmp, root, _config) = setup(&["A"]);
    std::fs::write(root.config_path(), "{not json").unwrap();
    write_snapshot(&root, "vscode", "also not json");
    write_snapshot(&root, "cursor", r#"{"extension":["rust"]}"#);

    let config = toolsync_core::config::load_config(&root);
    assert_eq!(config, ToolSyncConfig::default());
    let outcome = build_and_persist(&root, &config).unwrap();
    let vscode = outcome
        .plans
        .iter()
        .find(|p| p.tool == ToolId::from("vscode"))
        .unwrap();
    assert_eq!(vscode.action_count, 1);
}
