use crate::contract::GateScope;
use crate::evidence::Digest;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

// ── Task results ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Running,
    Success,
    Failed,
    Skipped,
    Timeout,
}

impl TaskStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Success | Self::Failed | Self::Skipped | Self::Timeout
        )
    }

    /// `pending → running → terminal`, or `pending → skipped`. Nothing leaves a
    /// terminal state.
    pub fn can_transition_to(self, next: Self) -> bool {
        match self {
            Self::Pending => matches!(next, Self::Running | Self::Skipped),
            Self::Running => matches!(next, Self::Success | Self::Failed | Self::Timeout),
            Self::Success | Self::Failed | Self::Skipped | Self::Timeout => false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum TaskErrorKind {
    Spawn,
    NonZeroExit,
    Signalled,
    Timeout,
    EvidenceIo,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskError {
    pub kind: TaskErrorKind,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("illegal task transition for {task_id}: {from} -> {to}")]
pub struct InvalidTransition {
    pub task_id: String,
    pub from: TaskStatus,
    pub to: TaskStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub task_id: String,
    pub status: TaskStatus,
    pub exit_code: Option<i32>,
    pub stdout_digest: Option<Digest>,
    pub stderr_digest: Option<Digest>,
    #[serde(default)]
    pub stdout_truncated: bool,
    #[serde(default)]
    pub stderr_truncated: bool,
    pub duration_ms: u64,
    pub attempt_count: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<TaskError>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skip_reason: Option<String>,
}

impl ExecutionResult {
    pub fn pending(task_id: impl Into<String>) -> Self {
        Self {
            task_id: task_id.into(),
            status: TaskStatus::Pending,
            exit_code: None,
            stdout_digest: None,
            stderr_digest: None,
            stdout_truncated: false,
            stderr_truncated: false,
            duration_ms: 0,
            attempt_count: 0,
            error: None,
            skip_reason: None,
        }
    }

    pub fn skipped(task_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            status: TaskStatus::Skipped,
            skip_reason: Some(reason.into()),
            ..Self::pending(task_id)
        }
    }

    pub fn transition(&mut self, next: TaskStatus) -> Result<(), InvalidTransition> {
        if self.status.can_transition_to(next) {
            self.status = next;
            Ok(())
        } else {
            Err(InvalidTransition {
                task_id: self.task_id.clone(),
                from: self.status,
                to: next,
            })
        }
    }

    /// Move to `skipped` with a reason; only legal from `pending`.
    pub fn skip(&mut self, reason: impl Into<String>) -> Result<(), InvalidTransition> {
        self.transition(TaskStatus::Skipped)?;
        self.skip_reason = Some(reason.into());
        Ok(())
    }

    /// Adopt a terminal result produced by a worker for a `running` slot.
    pub fn complete(&mut self, finished: Self) -> Result<(), InvalidTransition> {
        self.transition(finished.status)?;
        *self = Self {
            task_id: std::mem::take(&mut self.task_id),
            ..finished
        };
        Ok(())
    }

    pub fn digests(&self) -> impl Iterator<Item = &Digest> {
        self.stdout_digest.iter().chain(self.stderr_digest.iter())
    }
}

// ── Gate records ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GateResult {
    pub passed: bool,
    pub reason: String,
    pub blocking: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GateRecord {
    pub gate_id: String,
    pub gate_type: String,
    pub scope: GateScope,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phase: Option<String>,
    #[serde(flatten)]
    pub result: GateResult,
    pub attempts: u32,
    pub duration_ms: u64,
}

impl GateRecord {
    pub fn failed_blocking(&self) -> bool {
        !self.result.passed && self.result.blocking
    }
}

// ── Phases ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum PhaseStatus {
    Pending,
    Running,
    Completed,
    Halted,
    /// Never started because the run stopped earlier.
    Skipped,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseReport {
    pub name: String,
    pub blocking: bool,
    pub status: PhaseStatus,
    pub duration_ms: u64,
    pub tasks: Vec<ExecutionResult>,
}

// ── Run ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum RunStatus {
    Success,
    Partial,
    Halted,
    Cancelled,
}

pub mod exit_codes {
    pub const SUCCESS: i32 = 0;
    pub const PARTIAL: i32 = 1;
    pub const INVALID: i32 = 2;
    pub const HALTED: i32 = 3;
    pub const CANCELLED: i32 = 130;
}

impl RunStatus {
    pub fn exit_code(self) -> i32 {
        match self {
            Self::Success => exit_codes::SUCCESS,
            Self::Partial => exit_codes::PARTIAL,
            Self::Halted => exit_codes::HALTED,
            Self::Cancelled => exit_codes::CANCELLED,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionReport {
    pub run_id: String,
    pub task_id: String,
    pub title: String,
    pub plan_hash: String,
    pub status: RunStatus,
    pub exit_code: i32,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub duration_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub halt_reason: Option<String>,
    pub phases: Vec<PhaseReport>,
    pub gates: Vec<GateRecord>,
    pub evidence: Vec<Digest>,
}

impl ExecutionReport {
    pub fn tasks(&self) -> impl Iterator<Item = (&PhaseReport, &ExecutionResult)> {
        self.phases
            .iter()
            .flat_map(|phase| phase.tasks.iter().map(move |task| (phase, task)))
    }

    pub fn task(&self, task_id: &str) -> Option<&ExecutionResult> {
        self.tasks()
            .map(|(_, task)| task)
            .find(|task| task.task_id == task_id)
    }

    pub fn count(&self, status: TaskStatus) -> usize {
        self.tasks().filter(|(_, task)| task.status == status).count()
    }
}

/// Distinct digests in declared task order, stdout before stderr.
pub fn collect_evidence(phases: &[PhaseReport]) -> Vec<Digest> {
    let mut seen = BTreeSet::new();
    phases
        .iter()
        .flat_map(|phase| phase.tasks.iter())
        .flat_map(ExecutionResult::digests)
        .filter(|digest| seen.insert((*digest).clone()))
        .cloned()
        .collect()
}
