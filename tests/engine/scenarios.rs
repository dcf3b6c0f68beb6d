use std::time::Instant;

use phasegate::report::{PhaseStatus, RunStatus, TaskStatus};

use super::engine_harness::EngineHarness;

const PARALLEL_THEN_SEQUENTIAL: &str = r#"
task_id: scenario-a
title: Parallel fan-out then a sequential step
phases:
  - name: fan-out
    tasks:
      - id: slowest
        title: "[P] sleep 0.3"
        command: "sleep 0.3; printf A"
        shell: true
      - id: middle
        title: "[P] sleep 0.2"
        command: "sleep 0.2; printf B"
        shell: true
      - id: fastest
        title: "[P] sleep 0.1"
        command: "sleep 0.1; printf C"
        shell: true
  - name: follow-up
    tasks:
      - id: after
        command: "sleep 0.1; printf D"
        shell: true
"#;

#[tokio::test]
async fn parallel_phase_overlaps_and_reports_in_declared_order() {
    let harness = EngineHarness::new(4);
    let path = harness.write_contract("a.yaml", PARALLEL_THEN_SEQUENTIAL);

    let started = Instant::now();
    let report = harness.run(&path).await;
    let wall_ms = started.elapsed().as_millis();

    assert_eq!(report.status, RunStatus::Success);
    assert_eq!(report.exit_code, 0);
    // max(0.3) + 0.1, far below the 0.7s a sequential run would take.
    assert!(wall_ms >= 390, "finished too early: {wall_ms}ms");
    assert!(wall_ms < 650, "phase did not run in parallel: {wall_ms}ms");

    let ids: Vec<&str> = report.phases[0]
        .tasks
        .iter()
        .map(|t| t.task_id.as_str())
        .collect();
    assert_eq!(ids, vec!["slowest", "middle", "fastest"]);
    let outputs: Vec<String> = ids
        .iter()
        .map(|id| harness.stdout_of(&report, id))
        .collect();
    assert_eq!(outputs, vec!["A", "B", "C"]);
    assert_eq!(harness.stdout_of(&report, "after"), "D");
}

#[tokio::test]
async fn blocking_phase_failure_halts_run() {
    let harness = EngineHarness::new(2);
    let path = harness.write_contract(
        "b.json",
        r#"{
            "task_id": "scenario-b",
            "title": "Blocking failure",
            "phases": [
                {"name": "build", "blocking": true,
                 "tasks": [{"id": "compile", "command": ["sh", "-c", "echo broken >&2; exit 1"]}]},
                {"name": "deploy",
                 "tasks": [{"id": "ship", "command": ["touch", "shipped"]}]}
            ]
        }"#,
    );

    let report = harness.run(&path).await;

    assert_eq!(report.status, RunStatus::Halted);
    assert_eq!(report.exit_code, 3);
    assert_eq!(report.phases[0].status, PhaseStatus::Halted);
    assert_eq!(report.task("compile").unwrap().exit_code, Some(1));
    assert_eq!(report.task("ship").unwrap().status, TaskStatus::Skipped);
    assert!(!harness.path().join("shipped").exists());
}

#[tokio::test]
async fn failing_global_gate_executes_nothing() {
    let harness = EngineHarness::new(2);
    let path = harness.write_contract(
        "c.toml",
        r#"
task_id = "scenario-c"
title = "Global gate"

[[gates]]
id = "always-no"
type = "custom-check"
scope = "global"
params = { command = ["false"] }

[[phases]]
name = "only"

[[phases.tasks]]
id = "touch"
command = ["touch", "ran"]
"#,
    );

    let report = harness.run(&path).await;

    assert_eq!(report.status, RunStatus::Halted);
    assert_eq!(report.exit_code, 3);
    assert_eq!(report.count(TaskStatus::Skipped), 1);
    assert!(report.evidence.is_empty());
    assert!(!harness.path().join("ran").exists());
    assert_eq!(report.gates.len(), 1);
    assert!(!report.gates[0].result.passed);
}

#[tokio::test]
async fn policy_validator_gates_a_phase() {
    let harness = EngineHarness::new(2);
    let path = harness.write_contract(
        "policy.yaml",
        r#"
task_id: policy-demo
title: Validator guarded release
metadata:
  max_failures: 0
gates:
  - id: release-policy
    type: policy-validator
    scope: phase-pre
    phase: release
    params:
      command: |
        ctx=$(cat)
        case "$ctx" in
          *'"tasks_failed":0.0'*|*'"tasks_failed":0'*) echo '{"passed": true, "reasons": ["clean"]}' ;;
          *) echo '{"passed": false, "reasons": ["failures present"]}'; exit 1 ;;
        esac
      shell: true
  - id: failure-budget
    type: threshold
    scope: global
    stage: finish
    params:
      metric: tasks_failed
      op: le
      bound: 0
phases:
  - name: test
    tasks:
      - id: unit
        command: ["true"]
  - name: release
    tasks:
      - id: publish
        command: ["sh", "-c", "printf published"]
"#,
    );

    let report = harness.run(&path).await;

    assert_eq!(report.status, RunStatus::Success, "{:?}", report.gates);
    assert_eq!(harness.stdout_of(&report, "publish"), "published");
    let gate_ids: Vec<&str> = report.gates.iter().map(|g| g.gate_id.as_str()).collect();
    assert_eq!(gate_ids, vec!["release-policy", "failure-budget"]);
    assert_eq!(report.gates[0].result.reason, "clean");
}

#[tokio::test]
async fn task_timeout_is_recorded() {
    let harness = EngineHarness::new(2);
    let path = harness.write_contract(
        "timeout.json",
        r#"{
            "task_id": "timeouts",
            "title": "Timeouts",
            "phases": [{"name": "p", "tasks": [
                {"id": "hangs", "command": ["sleep", "30"], "timeout_ms": 150},
                {"id": "quick", "command": ["sleep", "0.05"], "timeout_ms": 2000}
            ]}]
        }"#,
    );

    let started = Instant::now();
    let report = harness.run(&path).await;

    assert!(started.elapsed().as_secs() < 5);
    assert_eq!(report.task("hangs").unwrap().status, TaskStatus::Timeout);
    assert_eq!(report.task("quick").unwrap().status, TaskStatus::Success);
    assert_eq!(report.status, RunStatus::Partial);
    assert_eq!(report.exit_code, 1);
}
