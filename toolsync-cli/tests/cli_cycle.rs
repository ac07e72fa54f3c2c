use std::fs;
use std::path::Path;
use std::process::Command;

use assert_cmd::prelude::*;
use predicates::prelude::PredicateBooleanExt;
use predicates::str::contains;
use serde_json::Value;
use tempfile::TempDir;

fn toolsync_cmd(root: &Path) -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("toolsync"));
    cmd.env_remove("TOOLSYNC_ROOT")
        .env("NO_COLOR", "1")
        .arg("--root")
        .arg(root);
    cmd
}

fn json_output(root: &Path, args: &[&str]) -> Value {
    let output = toolsync_cmd(root).args(args).output().expect("run toolsync");
    assert!(output.status.success(), "{args:?} failed: {output:?}");
    serde_json::from_slice(&output.stdout).expect("stdout is JSON")
}

#[test]
fn init_writes_default_config_once() {
    let tmp = TempDir::new().expect("root");
    toolsync_cmd(tmp.path())
        .arg("init")
        .assert()
        .success()
        .stdout(contains("Initialized sync root"));
    assert!(tmp.path().join("config.json").exists());
    assert!(tmp.path().join("snapshots").is_dir());

    fs::write(tmp.path().join("config.json"), r#"{"tools":["zed"]}"#).expect("edit config");
    toolsync_cmd(tmp.path())
        .arg("init")
        .assert()
        .success()
        .stdout(contains("already initialized"));
    let kept = fs::read_to_string(tmp.path().join("config.json")).expect("config");
    assert!(kept.contains("zed"));
}

#[test]
fn local_cycle_builds_plans_visible_to_plan_and_status() {
    let tmp = TempDir::new().expect("root");
    toolsync_cmd(tmp.path()).arg("init").assert().success();
    fs::write(
        tmp.path().join("snapshots/vscode.json"),
        r#"{"tool":"vscode","extension":["rust-lang.rust-analyzer"]}"#,
    )
    .expect("write snapshot");

    let cycle = json_output(tmp.path(), &["cycle", "--json"]);
    assert_eq!(cycle["outcome"], "completed");
    assert_eq!(cycle["report"]["revision"], 1);
    assert_eq!(cycle["report"]["reason"], "manual");

    let plans = json_output(tmp.path(), &["plan", "cursor", "--json"]);
    let actions = plans[0]["actions"].as_array().expect("actions");
    assert_eq!(actions.len(), 1);
    assert_eq!(actions[0]["action"], "install");
    assert_eq!(actions[0]["name"], "rust-lang.rust-analyzer");

    let status = json_output(tmp.path(), &["status", "--json"]);
    assert_eq!(status["revision"], 1);
    assert_eq!(status["daemonRunning"], false);
    let tools = status["tools"].as_array().expect("tools");
    let pending: Vec<u64> = tools
        .iter()
        .map(|t| t["pending"].as_u64().expect("pending"))
        .collect();
    assert_eq!(pending, vec![0, 1, 1]);

    toolsync_cmd(tmp.path())
        .args(["plan", "windsurf"])
        .assert()
        .success()
        .stdout(contains("extension:rust-lang.rust-analyzer"));
}

#[test]
fn report_and_logs_read_back_cycle_events() {
    let tmp = TempDir::new().expect("root");
    toolsync_cmd(tmp.path()).arg("init").assert().success();
    toolsync_cmd(tmp.path())
        .args(["cycle", "--reason", "smoke"])
        .assert()
        .success()
        .stdout(contains("revision 1"));

    toolsync_cmd(tmp.path())
        .arg("report")
        .assert()
        .success()
        .stdout(contains("diagnostic-").and(contains("(local)")));
    let report_count = fs::read_dir(tmp.path().join("reports"))
        .expect("reports dir")
        .count();
    assert_eq!(report_count, 1);

    toolsync_cmd(tmp.path())
        .args(["daemon", "logs", "--lines", "5"])
        .assert()
        .success()
        .stdout(contains("cycle.completed smoke"));
}

#[test]
fn daemon_commands_without_daemon() {
    let tmp = TempDir::new().expect("root");
    toolsync_cmd(tmp.path())
        .args(["daemon", "stop"])
        .assert()
        .success()
        .stdout(contains("daemon is not running"));
    toolsync_cmd(tmp.path())
        .args(["daemon", "status"])
        .assert()
        .success()
        .stdout(contains("\"running\": false"));
    toolsync_cmd(tmp.path())
        .args(["daemon", "logs", "--errors"])
        .assert()
        .success()
        .stdout(contains("log file not found"));
}
