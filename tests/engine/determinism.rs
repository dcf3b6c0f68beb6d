use phasegate::report::RunStatus;

use super::engine_harness::EngineHarness;

fn contract(second_output: &str) -> String {
    format!(
        r#"{{
            "task_id": "scenario-d",
            "title": "Repeatable",
            "phases": [{{"name": "p", "tasks": [
                {{"id": "one", "command": ["printf", "stable output"], "parallel": true}},
                {{"id": "two", "command": ["printf", "{second_output}"], "parallel": true}},
                {{"id": "three", "command": ["printf", "stable output"]}}
            ]}}]
        }}"#
    )
}

#[tokio::test]
async fn rerun_reuses_evidence_and_hash() {
    let harness = EngineHarness::new(2);
    let path = harness.write_contract("d.json", &contract("second"));

    let first = harness.run(&path).await;
    let blobs_after_first = harness.evidence.blob_count().unwrap();
    let second = harness.run(&path).await;

    assert_eq!(first.status, RunStatus::Success);
    assert_eq!(first.plan_hash, second.plan_hash);
    assert_ne!(first.run_id, second.run_id);
    assert_eq!(first.evidence, second.evidence);
    // "stable output", "second" and the shared empty stderr.
    assert_eq!(blobs_after_first, 3);
    assert_eq!(harness.evidence.blob_count().unwrap(), blobs_after_first);
    for (a, b) in first.tasks().zip(second.tasks()) {
        assert_eq!(a.1.stdout_digest, b.1.stdout_digest);
        assert_eq!(a.1.stderr_digest, b.1.stderr_digest);
    }
}

#[tokio::test]
async fn evidence_growth_matches_new_content_only() {
    let harness = EngineHarness::new(2);
    let original = harness.write_contract("d1.json", &contract("second"));
    let changed = harness.write_contract("d2.json", &contract("different"));

    let first = harness.run(&original).await;
    let before = harness.evidence.blob_count().unwrap();
    let second = harness.run(&changed).await;

    assert_ne!(first.plan_hash, second.plan_hash);
    assert_eq!(harness.evidence.blob_count().unwrap(), before + 1);
}

#[test]
fn plan_hash_ignores_format_and_key_order() {
    let harness = EngineHarness::new(1);
    let json = harness.write_contract(
        "h.json",
        r#"{"title": "Hash", "task_id": "hash",
            "phases": [{"tasks": [{"command": ["true"], "id": "t"}], "name": "p"}]}"#,
    );
    let yaml = harness.write_contract(
        "h.yaml",
        "task_id: hash\ntitle: Hash\nphases:\n  - name: p\n    blocking: false\n    tasks:\n      - id: t\n        command: [\"true\"]\n        retry:\n          max_attempts: 1\n",
    );
    let toml = harness.write_contract(
        "h.toml",
        "task_id = \"hash\"\ntitle = \"Hash\"\n\n[[phases]]\nname = \"p\"\n\n[[phases.tasks]]\nid = \"t\"\ncommand = [\"true\"]\n",
    );

    let hash = harness.plan(&json).plan_hash;
    assert_eq!(harness.plan(&yaml).plan_hash, hash);
    assert_eq!(harness.plan(&toml).plan_hash, hash);
}
