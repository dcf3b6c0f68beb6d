use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Maximum length of a contract or task identifier.
pub const MAX_ID_LEN: usize = 128;

/// A parsed, validated execution contract. Immutable after parse.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Contract {
    pub task_id: String,
    pub title: String,
    pub phases: Vec<Phase>,
    pub gates: Vec<GateSpec>,
    pub metadata: BTreeMap<String, serde_json::Value>,
}

impl Contract {
    pub fn task_count(&self) -> usize {
        self.phases.iter().map(|phase| phase.tasks.len()).sum()
    }

    /// Iterate all tasks in declared order, paired with their phase.
    pub fn tasks(&self) -> impl Iterator<Item = (&Phase, &Task)> {
        self.phases
            .iter()
            .flat_map(|phase| phase.tasks.iter().map(move |task| (phase, task)))
    }

    /// Every gate in the contract: global list first, then phase-local gates in
    /// phase order.
    pub fn all_gates(&self) -> impl Iterator<Item = &GateSpec> {
        self.gates
            .iter()
            .chain(self.phases.iter().flat_map(|phase| phase.gates.iter()))
    }

    pub fn global_gates(&self, stage: GateStage) -> impl Iterator<Item = &GateSpec> {
        self.gates
            .iter()
            .filter(move |gate| gate.scope == GateScope::Global && gate.stage == stage)
    }

    /// Gates that apply to `phase` for the given phase scope, contract-level
    /// gates first.
    pub fn phase_gates<'a>(
        &'a self,
        phase: &'a Phase,
        scope: GateScope,
    ) -> impl Iterator<Item = &'a GateSpec> {
        let contract_level = self.gates.iter().filter(move |gate| {
            gate.scope == scope
                && gate
                    .phase
                    .as_deref()
                    .is_none_or(|selector| selector == phase.name)
        });
        let local = phase.gates.iter().filter(move |gate| gate.scope == scope);
        contract_level.chain(local)
    }
}

/// A unit of sequential scheduling.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Phase {
    pub name: String,
    pub blocking: bool,
    pub timeout_ms: Option<u64>,
    pub gates: Vec<GateSpec>,
    pub tasks: Vec<Task>,
}

impl Phase {
    /// Split tasks into (parallel, sequential) sets of declared indices, each in
    /// declared order.
    pub fn partition(&self) -> (Vec<usize>, Vec<usize>) {
        self.tasks
            .iter()
            .enumerate()
            .map(|(index, task)| (index, task.parallel))
            .fold((Vec::new(), Vec::new()), |(mut par, mut seq), (index, parallel)| {
                if parallel {
                    par.push(index);
                } else {
                    seq.push(index);
                }
                (par, seq)
            })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub title: Option<String>,
    /// Exact argument vector. When `shell` is set this holds a single script.
    pub command: Vec<String>,
    pub shell: bool,
    pub parallel: bool,
    pub retry: RetryPolicy,
    pub timeout_ms: Option<u64>,
    pub env: BTreeMap<String, String>,
    pub workdir: Option<String>,
}

impl Task {
    /// Program and arguments actually handed to the OS.
    pub fn argv(&self) -> Vec<String> {
        if self.shell {
            let mut argv = vec!["sh".to_string(), "-c".to_string()];
            argv.extend(self.command.iter().cloned());
            argv
        } else {
            self.command.clone()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum BackoffKind {
    #[default]
    Fixed,
    Exponential,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff: BackoffKind,
    pub delay_ms: u64,
    pub max_delay_ms: u64,
}

pub const DEFAULT_RETRY_DELAY_MS: u64 = 500;
pub const DEFAULT_RETRY_MAX_DELAY_MS: u64 = 30_000;

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 1,
            backoff: BackoffKind::Fixed,
            delay_ms: DEFAULT_RETRY_DELAY_MS,
            max_delay_ms: DEFAULT_RETRY_MAX_DELAY_MS,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum GateScope {
    Global,
    PhasePre,
    PhasePost,
}

/// When a global gate runs: before the first phase or after the last.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum GateStage {
    #[default]
    Start,
    Finish,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GateSpec {
    pub id: String,
    #[serde(rename = "type")]
    pub gate_type: String,
    pub params: serde_json::Value,
    pub scope: GateScope,
    pub blocking: bool,
    pub timeout_ms: Option<u64>,
    /// Phase selector for contract-level phase gates; `None` applies to all.
    pub phase: Option<String>,
    pub stage: GateStage,
}

/// `^[A-Za-z0-9][A-Za-z0-9._-]{0,127}$`
pub fn is_valid_identifier(value: &str) -> bool {
    let mut chars = value.chars();
    let Some(first) = chars.next() else {
        return false;
    };
    value.len() <= MAX_ID_LEN
        && first.is_ascii_alphanumeric()
        && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
}
