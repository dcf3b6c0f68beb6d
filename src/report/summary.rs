use super::model::{ExecutionReport, ExecutionResult, TaskStatus};
use crate::evidence::EvidenceStore;
use std::fmt::Write;
use std::path::Path;

const EXCERPT_BYTES: usize = 240;

/// Human-readable run summary for the terminal. Failures list the phase,
/// task, error kind and a short output excerpt with its evidence digest;
/// the report path is printed last.
pub fn render_summary(
    report: &ExecutionReport,
    evidence: Option<&EvidenceStore>,
    report_path: Option<&Path>,
) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{} ({})", report.task_id, report.title);
    let _ = writeln!(out, "plan:   {}", report.plan_hash);
    let _ = writeln!(
        out,
        "status: {} (exit {}) in {}ms",
        report.status, report.exit_code, report.duration_ms
    );
    if let Some(reason) = &report.halt_reason {
        let _ = writeln!(out, "halted: {reason}");
    }

    out.push('\n');
    for phase in &report.phases {
        let succeeded = phase
            .tasks
            .iter()
            .filter(|task| task.status == TaskStatus::Success)
            .count();
        let _ = writeln!(
            out,
            "phase {:<20} {:<10} {succeeded}/{} ok  {}ms",
            phase.name,
            phase.status.to_string(),
            phase.tasks.len(),
            phase.duration_ms
        );
    }

    let failures: Vec<_> = report
        .tasks()
        .filter(|(_, task)| task.status != TaskStatus::Success)
        .collect();
    if !failures.is_empty() {
        out.push_str("\nnot successful:\n");
        for (phase, task) in failures {
            render_failure(&mut out, &phase.name, task, evidence);
        }
    }

    if !report.gates.is_empty() {
        out.push_str("\ngates:\n");
        for gate in &report.gates {
            let verdict = if gate.result.passed { "pass" } else { "FAIL" };
            let place = gate
                .phase
                .as_deref()
                .map_or_else(|| gate.scope.to_string(), |p| format!("{} {p}", gate.scope));
            let _ = writeln!(
                out,
                "  {verdict} {} [{}, {place}{}]: {}",
                gate.gate_id,
                gate.gate_type,
                if gate.result.blocking { "" } else { ", non-blocking" },
                gate.result.reason
            );
        }
    }

    if let Some(path) = report_path {
        let _ = writeln!(out, "\nreport: {}", path.display());
    }
    out
}

fn render_failure(
    out: &mut String,
    phase: &str,
    task: &ExecutionResult,
    evidence: Option<&EvidenceStore>,
) {
    let kind = task
        .error
        .as_ref()
        .map_or_else(|| task.status.to_string(), |e| e.kind.to_string());
    let detail = task
        .error
        .as_ref()
        .map(|e| e.message.as_str())
        .or(task.skip_reason.as_deref())
        .unwrap_or_default();
    let _ = writeln!(out, "  [{phase}] {} {kind}: {detail}", task.task_id);

    // stderr usually explains a failure better than stdout.
    let digest = task.stderr_digest.as_ref().or(task.stdout_digest.as_ref());
    if let Some(digest) = digest {
        let excerpt = evidence
            .and_then(|store| store.excerpt(digest, EXCERPT_BYTES).ok())
            .map(|text| text.trim().replace('\n', "\n      | "))
            .filter(|text| !text.is_empty());
        match excerpt {
            Some(text) => {
                let _ = writeln!(out, "      evidence {}\n      | {text}", short(digest));
            }
            None => {
                let _ = writeln!(out, "      evidence {}", short(digest));
            }
        }
    }
}

fn short(digest: &str) -> &str {
    &digest[..digest.len().min(12)]
}
