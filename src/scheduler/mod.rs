//! Run state machine: global start gates, then each phase in order (pre-gates,
//! tasks, post-gates), then global finish gates, then the report.

pub mod events;
pub mod phase;

use crate::config::NonBlockingFailure;
use crate::contract::{GateScope, GateSpec, GateStage, Phase};
use crate::gates::{GateContext, GateEngine};
use crate::observability::{Observer, ObserverEvent};
use crate::plan::Plan;
use crate::report::{
    ExecutionReport, ExecutionResult, GateRecord, PhaseReport, PhaseStatus, RunStatus, TaskStatus,
    collect_evidence,
};
use crate::runner::{RunControl, TaskRunner};
use chrono::Utc;
use phase::PhaseOwner;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone)]
pub struct SchedulerOptions {
    /// Bound on concurrently running tasks of a phase's parallel set.
    pub max_workers: usize,
    pub non_blocking_failure: NonBlockingFailure,
    /// Base working directory for tasks and gates.
    pub workdir: PathBuf,
}

pub struct Scheduler {
    runner: Arc<dyn TaskRunner>,
    gates: GateEngine,
    observer: Arc<dyn Observer>,
    options: SchedulerOptions,
}

/// Mutable bookkeeping of one run. Only the scheduler task touches it.
struct RunState<'a> {
    plan: &'a Plan,
    started: Instant,
    phases: Vec<PhaseReport>,
    gates: Vec<GateRecord>,
    halt_reason: Option<String>,
    cancelled: bool,
}

impl RunState<'_> {
    fn stopped(&self) -> bool {
        self.halt_reason.is_some() || self.cancelled
    }

    fn finished_tasks(&self) -> impl Iterator<Item = &ExecutionResult> {
        self.phases.iter().flat_map(|phase| phase.tasks.iter())
    }

    #[allow(clippy::cast_precision_loss)]
    fn metrics(&self) -> BTreeMap<String, f64> {
        let count = |status: TaskStatus| {
            self.finished_tasks()
                .filter(|task| task.status == status)
                .count() as f64
        };
        let succeeded = count(TaskStatus::Success);
        let failed = count(TaskStatus::Failed);
        let timeout = count(TaskStatus::Timeout);
        let completed = succeeded + failed + timeout;
        let success_rate = if completed > 0.0 {
            succeeded / completed
        } else {
            1.0
        };

        let mut metrics = BTreeMap::from([
            ("tasks_total".to_string(), self.plan.contract.task_count() as f64),
            ("tasks_succeeded".to_string(), succeeded),
            ("tasks_failed".to_string(), failed),
            ("tasks_timeout".to_string(), timeout),
            ("tasks_skipped".to_string(), count(TaskStatus::Skipped)),
            ("tasks_completed".to_string(), completed),
            ("success_rate".to_string(), success_rate),
            (
                "elapsed_ms".to_string(),
                self.started.elapsed().as_millis() as f64,
            ),
            (
                "phases_completed".to_string(),
                self.phases
                    .iter()
                    .filter(|phase| phase.status == PhaseStatus::Completed)
                    .count() as f64,
            ),
            (
                "gates_failed".to_string(),
                self.gates.iter().filter(|gate| !gate.result.passed).count() as f64,
            ),
        ]);
        for (key, value) in &self.plan.contract.metadata {
            if let Some(number) = value.as_f64() {
                metrics.insert(format!("metadata.{key}"), number);
            }
        }
        metrics
    }
}

/// Status precedence: cancelled, halted, partial, success.
pub fn compute_status(
    cancelled: bool,
    halted: bool,
    phases: &[PhaseReport],
    gates: &[GateRecord],
) -> RunStatus {
    if cancelled {
        return RunStatus::Cancelled;
    }
    if halted {
        return RunStatus::Halted;
    }
    let all_tasks_succeeded = phases
        .iter()
        .flat_map(|phase| phase.tasks.iter())
        .all(|task| task.status == TaskStatus::Success);
    let all_gates_passed = gates.iter().all(|gate| gate.result.passed);
    if all_tasks_succeeded && all_gates_passed {
        RunStatus::Success
    } else {
        RunStatus::Partial
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}

fn skipped_phase(phase: &Phase, reason: &str) -> PhaseReport {
    PhaseReport {
        name: phase.name.clone(),
        blocking: phase.blocking,
        status: PhaseStatus::Skipped,
        duration_ms: 0,
        tasks: phase
            .tasks
            .iter()
            .map(|task| ExecutionResult::skipped(&task.id, reason))
            .collect(),
    }
}

impl Scheduler {
    pub fn new(
        runner: Arc<dyn TaskRunner>,
        gates: GateEngine,
        observer: Arc<dyn Observer>,
        options: SchedulerOptions,
    ) -> Self {
        Self {
            runner,
            gates,
            observer,
            options,
        }
    }

    /// Execute `plan` to completion. Task and gate failures are recorded in the
    /// report; nothing here returns an error.
    pub async fn run(&self, plan: &Plan, cancel: CancellationToken) -> ExecutionReport {
        let contract = &plan.contract;
        let started_at = Utc::now();
        let mut state = RunState {
            plan,
            started: Instant::now(),
            phases: Vec::with_capacity(contract.phases.len()),
            gates: Vec::new(),
            halt_reason: None,
            cancelled: false,
        };
        let control = RunControl::new(cancel.clone(), &self.options.workdir);

        self.observer.record_event(&ObserverEvent::RunStart {
            plan_hash: plan.plan_hash.clone(),
            phases: contract.phases.len(),
            tasks: contract.task_count(),
        });

        for gate in contract.global_gates(GateStage::Start) {
            if let Some(reason) = self.evaluate_gate(&mut state, gate, None).await {
                state.halt_reason = Some(reason);
                break;
            }
        }

        for phase in &contract.phases {
            if state.stopped() {
                let reason = if state.cancelled {
                    "run cancelled"
                } else {
                    "run halted before this phase"
                };
                state.phases.push(skipped_phase(phase, reason));
                continue;
            }
            if cancel.is_cancelled() {
                self.mark_cancelled(&mut state);
                state.phases.push(skipped_phase(phase, "run cancelled"));
                continue;
            }
            let report = self.run_phase(&mut state, phase, &control).await;
            state.phases.push(report);
        }

        if state.cancelled {
            tracing::debug!("skipping finish gates after cancellation");
        } else {
            for gate in contract.global_gates(GateStage::Finish) {
                if let Some(reason) = self.evaluate_gate(&mut state, gate, None).await {
                    state.halt_reason.get_or_insert(reason);
                }
            }
        }

        let status = compute_status(
            state.cancelled,
            state.halt_reason.is_some(),
            &state.phases,
            &state.gates,
        );
        let duration_ms = elapsed_ms(state.started);
        self.observer.record_event(&ObserverEvent::RunEnd {
            plan_hash: plan.plan_hash.clone(),
            status: status.to_string(),
            duration: Duration::from_millis(duration_ms),
        });
        self.observer.flush();

        ExecutionReport {
            run_id: uuid::Uuid::new_v4().to_string(),
            task_id: contract.task_id.clone(),
            title: contract.title.clone(),
            plan_hash: plan.plan_hash.clone(),
            status,
            exit_code: status.exit_code(),
            started_at,
            finished_at: Utc::now(),
            duration_ms,
            halt_reason: state.halt_reason,
            evidence: collect_evidence(&state.phases),
            phases: state.phases,
            gates: state.gates,
        }
    }

    async fn run_phase(
        &self,
        state: &mut RunState<'_>,
        phase: &Phase,
        control: &RunControl,
    ) -> PhaseReport {
        let plan = state.plan;
        let contract = &plan.contract;
        let started = Instant::now();
        let (parallel, sequential) = phase.partition();
        self.observer.record_event(&ObserverEvent::PhaseStart {
            phase: phase.name.clone(),
            parallel: parallel.len(),
            sequential: sequential.len(),
        });

        let mut skip_reason = None;
        for gate in contract.phase_gates(phase, GateScope::PhasePre) {
            let Some(blocking_reason) = self.evaluate_gate(state, gate, Some(phase)).await else {
                let failed_non_blocking = state
                    .gates
                    .last()
                    .is_some_and(|record| !record.result.passed);
                if failed_non_blocking
                    && self.options.non_blocking_failure == NonBlockingFailure::SkipPhase
                {
                    skip_reason.get_or_insert_with(|| {
                        format!("non-blocking pre-gate `{}` failed", gate.id)
                    });
                }
                continue;
            };
            state.halt_reason = Some(blocking_reason);
            return self.end_phase(
                PhaseReport {
                    status: PhaseStatus::Halted,
                    ..skipped_phase(phase, "pre-gate failed")
                },
                started,
            );
        }
        if let Some(reason) = skip_reason {
            return self.end_phase(skipped_phase(phase, &reason), started);
        }

        let outcome = PhaseOwner::new(phase, self.runner.clone(), self.observer.clone(), control)
            .run(self.options.max_workers)
            .await;

        let mut report = PhaseReport {
            name: phase.name.clone(),
            blocking: phase.blocking,
            status: PhaseStatus::Completed,
            duration_ms: 0,
            tasks: outcome.tasks,
        };

        if outcome.cancelled {
            self.mark_cancelled(state);
            report.status = PhaseStatus::Halted;
            return self.end_phase(report, started);
        }
        if outcome.timed_out {
            tracing::warn!(phase = %phase.name, "phase timeout elapsed");
        }

        if phase.blocking {
            let unsuccessful: Vec<&str> = report
                .tasks
                .iter()
                .filter(|task| task.status != TaskStatus::Success)
                .map(|task| task.task_id.as_str())
                .collect();
            if !unsuccessful.is_empty() {
                state.halt_reason = Some(format!(
                    "blocking phase `{}` had unsuccessful tasks: {}",
                    phase.name,
                    unsuccessful.join(", ")
                ));
                report.status = PhaseStatus::Halted;
                return self.end_phase(report, started);
            }
        }

        // Post-gates see this phase's results in the metrics.
        state.phases.push(report);
        let mut halted = None;
        for gate in contract.phase_gates(phase, GateScope::PhasePost) {
            if let Some(reason) = self.evaluate_gate(state, gate, Some(phase)).await {
                halted = Some(reason);
                break;
            }
        }
        let mut report = state
            .phases
            .pop()
            .unwrap_or_else(|| skipped_phase(phase, "phase report lost"));
        if let Some(reason) = halted {
            state.halt_reason = Some(reason);
            report.status = PhaseStatus::Halted;
        }
        self.end_phase(report, started)
    }

    fn end_phase(&self, mut report: PhaseReport, started: Instant) -> PhaseReport {
        report.duration_ms = elapsed_ms(started);
        self.observer.record_event(&ObserverEvent::PhaseEnd {
            phase: report.name.clone(),
            status: report.status.to_string(),
            duration: Duration::from_millis(report.duration_ms),
        });
        report
    }

    fn mark_cancelled(&self, state: &mut RunState<'_>) {
        if !state.cancelled {
            state.cancelled = true;
            self.observer.record_event(&ObserverEvent::Cancelled {
                reason: "cancellation signal raised".into(),
            });
        }
    }

    /// Evaluate and record one gate. Returns the halt reason when it failed
    /// and is blocking.
    async fn evaluate_gate(
        &self,
        state: &mut RunState<'_>,
        gate: &GateSpec,
        phase: Option<&Phase>,
    ) -> Option<String> {
        let plan = state.plan;
        let contract = &plan.contract;
        let ctx = GateContext {
            plan_hash: plan.plan_hash.clone(),
            contract_id: contract.task_id.clone(),
            title: contract.title.clone(),
            scope: gate.scope,
            phase: phase.map(|p| p.name.clone()),
            workdir: self.options.workdir.clone(),
            metrics: state.metrics(),
            metadata: contract.metadata.clone(),
            evidence: collect_evidence(&state.phases),
        };
        let record = self.gates.evaluate(gate, &ctx).await;
        self.observer.record_event(&ObserverEvent::GateEvaluated {
            gate_id: record.gate_id.clone(),
            gate_type: record.gate_type.clone(),
            passed: record.result.passed,
            blocking: record.result.blocking,
            reason: record.result.reason.clone(),
        });
        let halt = record.failed_blocking().then(|| {
            let place = phase.map_or_else(
                || format!("{} gate", gate.scope),
                |p| format!("{} gate of phase `{}`", gate.scope, p.name),
            );
            format!(
                "blocking {place} `{}` failed: {}",
                record.gate_id, record.result.reason
            )
        });
        state.gates.push(record);
        halt
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GatesConfig;
    use crate::contract::{ContractFormat, ContractParser, Task};
    use crate::gates::GateRegistry;
    use crate::observability::NoopObserver;
    use crate::report::{TaskError, TaskErrorKind};
    use async_trait::async_trait;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Runs no processes: outcome and delay are read from the task argv,
    /// e.g. `["ok", "30"]` or `["fail", "5"]`.
    #[derive(Default)]
    struct MockRunner {
        started: Mutex<Vec<String>>,
        active: AtomicUsize,
        peak: AtomicUsize,
    }

    #[async_trait]
    impl TaskRunner for MockRunner {
        async fn run(&self, task: &Task, control: &RunControl) -> ExecutionResult {
            self.started.lock().unwrap().push(task.id.clone());
            let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);

            let delay: u64 = task.command.get(1).and_then(|d| d.parse().ok()).unwrap_or(0);
            let aborted = tokio::select! {
                () = tokio::time::sleep(Duration::from_millis(delay)) => false,
                () = control.abort.cancelled() => true,
            };
            self.active.fetch_sub(1, Ordering::SeqCst);

            let mut result = ExecutionResult::pending(&task.id);
            result.attempt_count = 1;
            result.duration_ms = delay;
            if aborted {
                result.status = TaskStatus::Timeout;
                result.error = Some(TaskError {
                    kind: TaskErrorKind::Timeout,
                    message: "killed".into(),
                });
            } else if task.command[0] == "ok" {
                result.status = TaskStatus::Success;
                result.exit_code = Some(0);
            } else {
                result.status = TaskStatus::Failed;
                result.exit_code = Some(1);
                result.error = Some(TaskError {
                    kind: TaskErrorKind::NonZeroExit,
                    message: "exited with code 1".into(),
                });
            }
            result
        }
    }

    fn plan(json: &str) -> Plan {
        Plan::from_contract(ContractParser::parse_str(json, ContractFormat::Json).unwrap())
    }

    fn scheduler(runner: Arc<MockRunner>, max_workers: usize) -> Scheduler {
        scheduler_with(runner, max_workers, NonBlockingFailure::Record)
    }

    fn scheduler_with(
        runner: Arc<MockRunner>,
        max_workers: usize,
        non_blocking_failure: NonBlockingFailure,
    ) -> Scheduler {
        Scheduler::new(
            runner,
            GateEngine::new(
                Arc::new(GateRegistry::with_builtins()),
                &GatesConfig::default(),
            ),
            Arc::new(NoopObserver),
            SchedulerOptions {
                max_workers,
                non_blocking_failure,
                workdir: std::env::temp_dir(),
            },
        )
    }

    fn ids(report: &PhaseReport) -> Vec<&str> {
        report.tasks.iter().map(|t| t.task_id.as_str()).collect()
    }

    #[tokio::test]
    async fn parallel_results_keep_declared_order() {
        let runner = Arc::new(MockRunner::default());
        let plan = plan(
            r#"{"task_id": "order", "title": "Order", "phases": [{"name": "p", "tasks": [
                {"id": "a", "command": ["ok", "60"], "parallel": true},
                {"id": "b", "command": ["ok", "5"], "parallel": true},
                {"id": "c", "command": ["ok", "30"], "parallel": true},
                {"id": "d", "command": ["ok", "1"], "parallel": true}
            ]}]}"#,
        );
        let report = scheduler(runner.clone(), 4)
            .run(&plan, CancellationToken::new())
            .await;
        assert_eq!(report.status, RunStatus::Success);
        assert_eq!(ids(&report.phases[0]), vec!["a", "b", "c", "d"]);
        assert!(runner.peak.load(Ordering::SeqCst) > 1);
    }

    #[tokio::test]
    async fn worker_bound_is_respected() {
        let runner = Arc::new(MockRunner::default());
        let tasks: Vec<String> = (0..8)
            .map(|i| format!(r#"{{"id": "t{i}", "command": ["ok", "20"], "parallel": true}}"#))
            .collect();
        let plan = plan(&format!(
            r#"{{"task_id": "bound", "title": "Bound", "phases": [{{"name": "p", "tasks": [{}]}}]}}"#,
            tasks.join(",")
        ));
        let report = scheduler(runner.clone(), 2)
            .run(&plan, CancellationToken::new())
            .await;
        assert_eq!(report.status, RunStatus::Success);
        assert!(runner.peak.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test]
    async fn sequential_tasks_run_after_parallel_set_in_order() {
        let runner = Arc::new(MockRunner::default());
        let plan = plan(
            r#"{"task_id": "mix", "title": "Mix", "phases": [{"name": "p", "tasks": [
                {"id": "s1", "command": ["ok", "1"]},
                {"id": "p1", "command": ["ok", "20"], "parallel": true},
                {"id": "s2", "command": ["ok", "1"]}
            ]}]}"#,
        );
        let report = scheduler(runner.clone(), 4)
            .run(&plan, CancellationToken::new())
            .await;
        assert_eq!(ids(&report.phases[0]), vec!["s1", "p1", "s2"]);
        assert_eq!(*runner.started.lock().unwrap(), vec!["p1", "s1", "s2"]);
    }

    #[tokio::test]
    async fn blocking_phase_failure_halts_and_skips_later_phases() {
        let runner = Arc::new(MockRunner::default());
        let plan = plan(
            r#"{"task_id": "halt", "title": "Halt", "phases": [
                {"name": "build", "blocking": true, "tasks": [
                    {"id": "compile", "command": ["fail", "1"]},
                    {"id": "lint", "command": ["ok", "1"]}
                ]},
                {"name": "deploy", "tasks": [{"id": "ship", "command": ["ok", "1"]}]}
            ]}"#,
        );
        let report = scheduler(runner.clone(), 2)
            .run(&plan, CancellationToken::new())
            .await;
        assert_eq!(report.status, RunStatus::Halted);
        assert_eq!(report.exit_code, 3);
        assert_eq!(report.phases[0].status, PhaseStatus::Halted);
        assert_eq!(report.phases[1].status, PhaseStatus::Skipped);
        assert_eq!(report.task("ship").unwrap().status, TaskStatus::Skipped);
        assert!(!runner.started.lock().unwrap().contains(&"ship".to_string()));
        assert!(report.halt_reason.unwrap().contains("compile"));
    }

    #[tokio::test]
    async fn non_blocking_phase_failure_is_partial() {
        let runner = Arc::new(MockRunner::default());
        let plan = plan(
            r#"{"task_id": "partial", "title": "Partial", "phases": [
                {"name": "test", "tasks": [{"id": "flaky", "command": ["fail", "1"]}]},
                {"name": "docs", "tasks": [{"id": "render", "command": ["ok", "1"]}]}
            ]}"#,
        );
        let report = scheduler(runner, 2).run(&plan, CancellationToken::new()).await;
        assert_eq!(report.status, RunStatus::Partial);
        assert_eq!(report.exit_code, 1);
        assert_eq!(report.task("render").unwrap().status, TaskStatus::Success);
    }

    #[tokio::test]
    async fn failing_global_start_gate_skips_everything() {
        let runner = Arc::new(MockRunner::default());
        let plan = plan(
            r#"{"task_id": "gated", "title": "Gated",
                "gates": [{"id": "policy", "type": "custom-check", "scope": "global",
                           "params": {"command": ["false"]}}],
                "phases": [{"name": "p", "tasks": [{"id": "t", "command": ["ok", "1"]}]}]}"#,
        );
        let report = scheduler(runner.clone(), 2)
            .run(&plan, CancellationToken::new())
            .await;
        assert_eq!(report.status, RunStatus::Halted);
        assert_eq!(report.task("t").unwrap().status, TaskStatus::Skipped);
        assert!(runner.started.lock().unwrap().is_empty());
        assert_eq!(report.gates.len(), 1);
    }

    #[tokio::test]
    async fn non_blocking_pre_gate_can_skip_phase() {
        let json = r#"{"task_id": "soft", "title": "Soft",
            "gates": [{"id": "soft", "type": "custom-check", "scope": "phase-pre", "phase": "optional",
                       "blocking": false, "params": {"command": ["false"]}}],
            "phases": [
                {"name": "optional", "tasks": [{"id": "extra", "command": ["ok", "1"]}]},
                {"name": "main", "tasks": [{"id": "core", "command": ["ok", "1"]}]}
            ]}"#;

        let recorded = scheduler(Arc::new(MockRunner::default()), 2)
            .run(&plan(json), CancellationToken::new())
            .await;
        assert_eq!(recorded.status, RunStatus::Partial);
        assert_eq!(recorded.task("extra").unwrap().status, TaskStatus::Success);

        let skipped = scheduler_with(
            Arc::new(MockRunner::default()),
            2,
            NonBlockingFailure::SkipPhase,
        )
        .run(&plan(json), CancellationToken::new())
        .await;
        assert_eq!(skipped.status, RunStatus::Partial);
        assert_eq!(skipped.phases[0].status, PhaseStatus::Skipped);
        assert_eq!(skipped.task("extra").unwrap().status, TaskStatus::Skipped);
        assert_eq!(skipped.task("core").unwrap().status, TaskStatus::Success);
    }

    #[tokio::test]
    async fn post_gate_sees_phase_metrics() {
        let runner = Arc::new(MockRunner::default());
        let plan = plan(
            r#"{"task_id": "metrics", "title": "Metrics",
                "gates": [{"id": "no-failures", "type": "threshold", "scope": "phase-post",
                           "params": {"metric": "tasks_failed", "op": "eq", "bound": 0}}],
                "phases": [
                    {"name": "a", "tasks": [{"id": "x", "command": ["fail", "1"]}]},
                    {"name": "b", "tasks": [{"id": "y", "command": ["ok", "1"]}]}
                ]}"#,
        );
        let report = scheduler(runner, 2).run(&plan, CancellationToken::new()).await;
        assert_eq!(report.status, RunStatus::Halted);
        assert_eq!(report.phases[0].status, PhaseStatus::Halted);
        assert_eq!(report.phases[1].status, PhaseStatus::Skipped);
        assert!(report.gates[0].result.reason.contains("tasks_failed = 1"));
    }

    #[tokio::test]
    async fn cancellation_stops_dispatch() {
        let runner = Arc::new(MockRunner::default());
        let plan = plan(
            r#"{"task_id": "cancel", "title": "Cancel", "phases": [
                {"name": "p", "tasks": [
                    {"id": "first", "command": ["ok", "80"]},
                    {"id": "second", "command": ["ok", "1"]}
                ]},
                {"name": "q", "tasks": [{"id": "later", "command": ["ok", "1"]}]}
            ]}"#,
        );
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            trigger.cancel();
        });
        let report = scheduler(runner, 2).run(&plan, cancel).await;
        assert_eq!(report.status, RunStatus::Cancelled);
        assert_eq!(report.exit_code, 130);
        assert_eq!(report.task("first").unwrap().status, TaskStatus::Success);
        assert_eq!(report.task("second").unwrap().status, TaskStatus::Skipped);
        assert_eq!(report.task("later").unwrap().status, TaskStatus::Skipped);
    }

    #[tokio::test]
    async fn phase_timeout_marks_in_flight_and_skips_rest() {
        let runner = Arc::new(MockRunner::default());
        let plan = plan(
            r#"{"task_id": "deadline", "title": "Deadline", "phases": [
                {"name": "p", "timeout_ms": 50, "tasks": [
                    {"id": "slow", "command": ["ok", "5000"]},
                    {"id": "never", "command": ["ok", "1"]}
                ]}
            ]}"#,
        );
        let report = scheduler(runner, 2).run(&plan, CancellationToken::new()).await;
        assert_eq!(report.task("slow").unwrap().status, TaskStatus::Timeout);
        assert_eq!(report.task("never").unwrap().status, TaskStatus::Skipped);
        assert_eq!(report.status, RunStatus::Partial);
    }

    #[test]
    fn status_precedence() {
        let mut ok = ExecutionResult::pending("t");
        ok.status = TaskStatus::Success;
        let phases = vec![PhaseReport {
            name: "p".into(),
            blocking: false,
            status: PhaseStatus::Completed,
            duration_ms: 0,
            tasks: vec![ok],
        }];
        assert_eq!(compute_status(false, false, &phases, &[]), RunStatus::Success);
        assert_eq!(compute_status(false, true, &phases, &[]), RunStatus::Halted);
        assert_eq!(compute_status(true, true, &phases, &[]), RunStatus::Cancelled);
    }
}
