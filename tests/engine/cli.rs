use std::path::Path;
use std::process::{Command, Output};

use tempfile::TempDir;

const BIN: &str = env!("CARGO_BIN_EXE_phasegate");

fn phasegate(dir: &Path, args: &[&str]) -> Output {
    Command::new(BIN)
        .args(args)
        .current_dir(dir)
        .env("PHASEGATE_STATE_DIR", dir.join("state"))
        .env("PHASEGATE_LOG", "warn")
        .env("HOME", dir)
        .output()
        .expect("run phasegate binary")
}

fn write(dir: &Path, name: &str, text: &str) {
    std::fs::write(dir.join(name), text).unwrap();
}

fn report_count(dir: &Path) -> usize {
    std::fs::read_dir(dir.join("state/reports"))
        .map(|entries| entries.flatten().count())
        .unwrap_or(0)
}

const PASSING: &str = r#"{"task_id": "cli-ok", "title": "CLI",
    "phases": [{"name": "p", "tasks": [{"id": "hello", "command": ["printf", "hello"]}]}]}"#;

#[test]
fn malformed_contract_exits_2() {
    let tmp = TempDir::new().unwrap();
    write(tmp.path(), "bad.json", r#"{"task_id": "x", "phases": ["#);
    let out = phasegate(tmp.path(), &["execute", "bad.json"]);
    assert_eq!(out.status.code(), Some(2));
    assert!(String::from_utf8_lossy(&out.stderr).contains("parse error"));
}

#[test]
fn empty_command_exits_2() {
    let tmp = TempDir::new().unwrap();
    write(
        tmp.path(),
        "empty.json",
        r#"{"task_id": "x", "title": "X", "phases": [{"name": "p", "tasks": [{"id": "t", "command": []}]}]}"#,
    );
    let out = phasegate(tmp.path(), &["execute", "empty.json"]);
    assert_eq!(out.status.code(), Some(2));
    assert!(String::from_utf8_lossy(&out.stderr).contains("command"));
}

#[test]
fn plan_mode_runs_nothing() {
    let tmp = TempDir::new().unwrap();
    write(
        tmp.path(),
        "plan.json",
        r#"{"task_id": "plan", "title": "Plan",
            "phases": [{"name": "p", "tasks": [{"id": "t", "command": ["touch", "ran"]}]}]}"#,
    );
    let out = phasegate(tmp.path(), &["execute", "plan.json", "--plan"]);
    assert_eq!(out.status.code(), Some(0));
    assert!(String::from_utf8_lossy(&out.stdout).contains("plan: "));
    assert!(!tmp.path().join("ran").exists());
    assert_eq!(report_count(tmp.path()), 0);
}

#[test]
fn plan_mode_rejects_unknown_gate_type() {
    let tmp = TempDir::new().unwrap();
    write(
        tmp.path(),
        "gate.json",
        r#"{"task_id": "plan", "title": "Plan",
            "gates": [{"id": "cov", "type": "coverage", "scope": "global"}],
            "phases": [{"name": "p", "tasks": [{"id": "t", "command": ["true"]}]}]}"#,
    );
    let out = phasegate(tmp.path(), &["execute", "gate.json", "--plan"]);
    assert_eq!(out.status.code(), Some(2));
    assert!(String::from_utf8_lossy(&out.stdout).contains("unknown gate type"));
}

#[test]
fn successful_plan_is_not_rerun_without_force() {
    let tmp = TempDir::new().unwrap();
    write(tmp.path(), "ok.json", PASSING);

    let first = phasegate(tmp.path(), &["execute", "ok.json"]);
    assert_eq!(first.status.code(), Some(0));
    assert!(String::from_utf8_lossy(&first.stdout).contains("report: "));
    assert_eq!(report_count(tmp.path()), 1);

    let skipped = phasegate(tmp.path(), &["execute", "ok.json"]);
    assert_eq!(skipped.status.code(), Some(0));
    assert!(String::from_utf8_lossy(&skipped.stdout).contains("already succeeded"));
    assert_eq!(report_count(tmp.path()), 1);

    let forced = phasegate(tmp.path(), &["execute", "ok.json", "--force"]);
    assert_eq!(forced.status.code(), Some(0));
    assert_eq!(report_count(tmp.path()), 2);
}

#[test]
fn skipped_rerun_prints_earlier_digests() {
    let tmp = TempDir::new().unwrap();
    write(tmp.path(), "ok.json", PASSING);

    let first = phasegate(tmp.path(), &["execute", "ok.json", "--json"]);
    let second = phasegate(tmp.path(), &["execute", "ok.json", "--json"]);
    assert_eq!(second.status.code(), Some(0));
    assert_eq!(report_count(tmp.path()), 1);

    let first: serde_json::Value = serde_json::from_slice(&first.stdout).unwrap();
    let second: serde_json::Value = serde_json::from_slice(&second.stdout).unwrap();
    assert_eq!(first["plan_hash"], second["plan_hash"]);
    assert_eq!(first["evidence"], second["evidence"]);
    assert_eq!(
        first["phases"][0]["tasks"][0]["stdout_digest"],
        second["phases"][0]["tasks"][0]["stdout_digest"]
    );

    let text = phasegate(tmp.path(), &["execute", "ok.json"]);
    let text = String::from_utf8_lossy(&text.stdout);
    assert!(text.contains("already succeeded"));
    assert!(text.contains("report: "));
}

#[test]
fn halted_run_exits_3_and_json_report_is_printed() {
    let tmp = TempDir::new().unwrap();
    write(
        tmp.path(),
        "halt.json",
        r#"{"task_id": "halt", "title": "Halt", "phases": [
            {"name": "build", "blocking": true, "tasks": [{"id": "boom", "command": ["false"]}]},
            {"name": "after", "tasks": [{"id": "later", "command": ["true"]}]}
        ]}"#,
    );
    let out = phasegate(tmp.path(), &["execute", "halt.json", "--json"]);
    assert_eq!(out.status.code(), Some(3));
    let report: serde_json::Value = serde_json::from_slice(&out.stdout).unwrap();
    assert_eq!(report["status"], "halted");
    assert_eq!(report["phases"][1]["tasks"][0]["status"], "skipped");
}

#[test]
fn evidence_command_prints_blob() {
    let tmp = TempDir::new().unwrap();
    write(tmp.path(), "ok.json", PASSING);
    let out = phasegate(tmp.path(), &["execute", "ok.json", "--json"]);
    assert_eq!(out.status.code(), Some(0));
    let report: serde_json::Value = serde_json::from_slice(&out.stdout).unwrap();
    let digest = report["phases"][0]["tasks"][0]["stdout_digest"]
        .as_str()
        .unwrap()
        .to_string();

    let blob = phasegate(tmp.path(), &["evidence", &digest]);
    assert_eq!(blob.status.code(), Some(0));
    assert_eq!(blob.stdout, b"hello");
}
