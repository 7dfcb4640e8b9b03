//! CLI tests for `therapydrift wg check` and `therapydrift wg ack`.
//!
//! Spawns the therapydrift binary against a temporary `.workgraph/` and
//! verifies exit codes and the files it leaves behind.

use std::fs;
use std::path::Path;
use std::process::{Command, Output};

use serde_json::{Value, json};
use therapydrift::exit_codes;
use therapydrift::io::paths::WorkgraphPaths;

const BLOCK: &str = "Build the thing.\n\n```therapydrift\nschema = 1\nmin_signal_count = 2\n```\n";

fn write_graph(root: &Path, tasks: &[Value]) -> WorkgraphPaths {
    let paths = WorkgraphPaths::new(root.join(".workgraph"));
    fs::create_dir_all(&paths.wg_dir).expect("wg dir");
    let lines: Vec<String> = tasks.iter().map(Value::to_string).collect();
    fs::write(&paths.graph_path, lines.join("\n") + "\n").expect("write graph");
    paths
}

fn drifting_task(id: &str, description: &str) -> Value {
    json!({
        "kind": "task",
        "id": id,
        "title": "Drifting task",
        "status": "in-progress",
        "description": description,
        "log": [
            {"timestamp": "2026-02-16T10:00:00Z", "message": "Speedrift: yellow (scope_drift)"},
            {"timestamp": "2026-02-16T10:05:00Z", "message": "Specdrift: yellow (spec_lag)"},
            {"timestamp": "2026-02-16T10:10:00Z", "message": "Speedrift: yellow (scope_drift)"}
        ]
    })
}

fn therapydrift(root: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_therapydrift"))
        .current_dir(root)
        .env("THERAPYDRIFT_WG_BIN", root.join("no-such-wg"))
        .args(args)
        .output()
        .expect("run therapydrift")
}

#[test]
fn advisory_check_reports_findings_without_mutating_state() {
    let temp = tempfile::tempdir().expect("tempdir");
    let paths = write_graph(temp.path(), &[drifting_task("t1", BLOCK)]);

    let output = therapydrift(temp.path(), &["wg", "check", "--task", "t1"]);

    assert_eq!(output.status.code(), Some(exit_codes::FINDINGS));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("score: yellow"));
    assert!(stdout.contains("repeated_drift_signals"));
    assert!(!paths.state_path.exists());
    assert!(paths.last_report_path.exists());
}

#[test]
fn json_output_carries_the_decision() {
    let temp = tempfile::tempdir().expect("tempdir");
    write_graph(temp.path(), &[drifting_task("t1", BLOCK)]);

    let output = therapydrift(temp.path(), &["--json", "wg", "check", "--task", "t1"]);

    assert_eq!(output.status.code(), Some(exit_codes::FINDINGS));
    let report: Value = serde_json::from_slice(&output.stdout).expect("json");
    let decision = &report["tasks"][0]["decision"];
    assert_eq!(decision["drift_detected"], true);
    assert_eq!(decision["reason"], "allowed");
    assert_eq!(decision["recovery_task_id"], "drift-therapy-t1");
}

#[test]
fn task_without_block_is_clean() {
    let temp = tempfile::tempdir().expect("tempdir");
    write_graph(temp.path(), &[drifting_task("t1", "No config here.")]);

    let output = therapydrift(temp.path(), &["wg", "check", "--task", "t1"]);

    assert_eq!(output.status.code(), Some(exit_codes::OK));
    assert!(String::from_utf8_lossy(&output.stdout).contains("findings: none"));
}

#[test]
fn invalid_block_is_a_finding() {
    let temp = tempfile::tempdir().expect("tempdir");
    write_graph(
        temp.path(),
        &[drifting_task("t1", "```therapydrift\nschema = 9\n```")],
    );

    let output = therapydrift(temp.path(), &["wg", "check", "--task", "t1"]);

    assert_eq!(output.status.code(), Some(exit_codes::FINDINGS));
    assert!(String::from_utf8_lossy(&output.stdout).contains("invalid_therapydrift_spec"));
}

#[test]
fn unknown_task_is_an_error() {
    let temp = tempfile::tempdir().expect("tempdir");
    write_graph(temp.path(), &[drifting_task("t1", BLOCK)]);

    let output = therapydrift(temp.path(), &["wg", "check", "--task", "nope"]);

    assert_eq!(output.status.code(), Some(exit_codes::ERROR));
    assert!(String::from_utf8_lossy(&output.stdout).contains("task not found: nope"));
}

#[test]
fn missing_task_flag_is_a_usage_error() {
    let temp = tempfile::tempdir().expect("tempdir");
    write_graph(temp.path(), &[]);

    let output = therapydrift(temp.path(), &["wg", "check"]);

    assert_eq!(output.status.code(), Some(exit_codes::USAGE));
}

#[test]
fn ack_writes_state() {
    let temp = tempfile::tempdir().expect("tempdir");
    let paths = write_graph(temp.path(), &[drifting_task("t1", BLOCK)]);

    let output = therapydrift(temp.path(), &["wg", "ack", "--task", "t1"]);

    assert_eq!(output.status.code(), Some(exit_codes::OK));
    let state: Value =
        serde_json::from_str(&fs::read_to_string(&paths.state_path).expect("state")).expect("json");
    assert_eq!(state["tasks"]["t1"]["version"], 1);
    assert_eq!(state["tasks"]["t1"]["state"]["consecutive_actions_since_ack"], 0);
}

#[cfg(unix)]
#[test]
fn commit_creates_recovery_task_through_wg() {
    use std::os::unix::fs::PermissionsExt;

    let temp = tempfile::tempdir().expect("tempdir");
    let paths = write_graph(temp.path(), &[drifting_task("t1", BLOCK)]);
    let wg = temp.path().join("fake-wg");
    fs::write(
        &wg,
        "#!/bin/sh\necho \"$1 $2\" >> wg-calls.log\nif [ \"$1\" = show ]; then exit 1; fi\nexit 0\n",
    )
    .expect("write fake wg");
    let mut perms = fs::metadata(&wg).expect("meta").permissions();
    perms.set_mode(0o755);
    fs::set_permissions(&wg, perms).expect("chmod");

    let output = Command::new(env!("CARGO_BIN_EXE_therapydrift"))
        .current_dir(temp.path())
        .env("THERAPYDRIFT_WG_BIN", &wg)
        .args(["wg", "check", "--task", "t1", "--write-log", "--create-followups"])
        .output()
        .expect("run therapydrift");

    assert_eq!(output.status.code(), Some(exit_codes::FINDINGS));
    let calls = fs::read_to_string(temp.path().join("wg-calls.log")).expect("calls");
    let calls: Vec<&str> = calls.lines().collect();
    assert_eq!(calls, vec!["show drift-therapy-t1", "add therapy: Drifting task", "log t1"]);
    let state: Value =
        serde_json::from_str(&fs::read_to_string(&paths.state_path).expect("state")).expect("json");
    assert_eq!(state["tasks"]["t1"]["state"]["consecutive_actions_since_ack"], 1);
    let last: Value = serde_json::from_str(&fs::read_to_string(&paths.last_report_path).expect("last"))
        .expect("json");
    assert_eq!(last["tasks"][0]["action_committed"], true);
    let kinds: Vec<&str> = last["tasks"][0]["findings"]
        .as_array()
        .expect("findings")
        .iter()
        .filter_map(|f| f["kind"].as_str())
        .collect();
    assert_eq!(kinds, vec!["repeated_drift_signals"]);
}
