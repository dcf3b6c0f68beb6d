use super::model::{
    Contract, GateScope, GateSpec, GateStage, Phase, RetryPolicy, Task, is_valid_identifier,
};
use super::parser::{RawCommand, RawContract, RawGate, RawPhase, RawRetry, RawTask};
use crate::error::ContractError;
use std::collections::BTreeSet;

const PARALLEL_MARKER: &str = "[P]";

/// Validate a decoded contract and apply defaults.
pub(super) fn normalize(raw: RawContract) -> Result<Contract, ContractError> {
    if !is_valid_identifier(&raw.task_id) {
        return Err(ContractError::validation(
            "task_id",
            format!(
                "`{}` must match [A-Za-z0-9][A-Za-z0-9._-]{{0,127}}",
                raw.task_id
            ),
        ));
    }

    let mut phase_names = BTreeSet::new();
    let mut task_ids = BTreeSet::new();
    let mut gate_ids = BTreeSet::new();

    let mut phases = Vec::with_capacity(raw.phases.len());
    for (index, raw_phase) in raw.phases.into_iter().enumerate() {
        let path = format!("phases[{index}]");
        let phase = normalize_phase(raw_phase, index, &mut task_ids, &mut gate_ids)?;
        if !phase_names.insert(phase.name.clone()) {
            return Err(ContractError::validation(
                format!("{path}.name"),
                format!("duplicate phase name `{}`", phase.name),
            ));
        }
        phases.push(phase);
    }

    let mut gates = Vec::with_capacity(raw.gates.len());
    for (index, raw_gate) in raw.gates.into_iter().enumerate() {
        let path = format!("gates[{index}]");
        let default_id = format!("{}#{index}", raw_gate.gate_type);
        let gate = normalize_gate(raw_gate, &path, default_id, GateScope::Global, false)?;
        if let Some(selector) = &gate.phase {
            if !phase_names.contains(selector) {
                return Err(ContractError::validation(
                    format!("{path}.phase"),
                    format!("unknown phase `{selector}`"),
                ));
            }
        }
        claim_gate_id(&gate, &path, &mut gate_ids)?;
        gates.push(gate);
    }

    Ok(Contract {
        task_id: raw.task_id,
        title: raw.title,
        phases,
        gates,
        metadata: raw.metadata,
    })
}

fn normalize_phase(
    raw: RawPhase,
    phase_index: usize,
    task_ids: &mut BTreeSet<String>,
    gate_ids: &mut BTreeSet<String>,
) -> Result<Phase, ContractError> {
    let path = format!("phases[{phase_index}]");
    if raw.name.trim().is_empty() {
        return Err(ContractError::validation(
            format!("{path}.name"),
            "phase name must not be empty",
        ));
    }
    if raw.tasks.is_empty() {
        return Err(ContractError::validation(
            format!("{path}.tasks"),
            format!("phase `{}` declares no tasks", raw.name),
        ));
    }
    check_timeout(raw.timeout_ms, &format!("{path}.timeout_ms"))?;

    let mut tasks = Vec::with_capacity(raw.tasks.len());
    for (index, raw_task) in raw.tasks.into_iter().enumerate() {
        let task_path = format!("{path}.tasks[{index}]");
        let task = normalize_task(raw_task, &task_path)?;
        if !task_ids.insert(task.id.clone()) {
            return Err(ContractError::validation(
                format!("{task_path}.id"),
                format!("duplicate task id `{}`", task.id),
            ));
        }
        tasks.push(task);
    }

    let mut gates = Vec::with_capacity(raw.gates.len());
    for (index, raw_gate) in raw.gates.into_iter().enumerate() {
        let gate_path = format!("{path}.gates[{index}]");
        let default_id = format!("{}#p{phase_index}.{index}", raw_gate.gate_type);
        let gate = normalize_gate(raw_gate, &gate_path, default_id, GateScope::PhasePre, true)?;
        claim_gate_id(&gate, &gate_path, gate_ids)?;
        gates.push(gate);
    }

    Ok(Phase {
        name: raw.name,
        blocking: raw.blocking,
        timeout_ms: raw.timeout_ms,
        gates,
        tasks,
    })
}

fn normalize_task(raw: RawTask, path: &str) -> Result<Task, ContractError> {
    if !is_valid_identifier(&raw.id) {
        return Err(ContractError::validation(
            format!("{path}.id"),
            format!("`{}` is not a valid task id", raw.id),
        ));
    }

    let command = match raw.command {
        RawCommand::Argv(argv) => {
            if argv.is_empty() || argv[0].trim().is_empty() {
                return Err(ContractError::validation(
                    format!("{path}.command"),
                    "command must be a non-empty argument list",
                ));
            }
            if raw.shell && argv.len() != 1 {
                return Err(ContractError::validation(
                    format!("{path}.command"),
                    "shell commands take exactly one script string",
                ));
            }
            argv
        }
        RawCommand::Script(script) => {
            if !raw.shell {
                return Err(ContractError::validation(
                    format!("{path}.command"),
                    "string commands require `shell = true`; use an argument list instead",
                ));
            }
            if script.trim().is_empty() {
                return Err(ContractError::validation(
                    format!("{path}.command"),
                    "shell script must not be empty",
                ));
            }
            vec![script]
        }
    };

    let marker = raw
        .title
        .as_deref()
        .is_some_and(|title| title.split_whitespace().any(|word| word == PARALLEL_MARKER));
    let parallel = match raw.parallel {
        Some(false) if marker => {
            return Err(ContractError::validation(
                format!("{path}.parallel"),
                "title carries the [P] marker but `parallel` is false",
            ));
        }
        Some(declared) => declared,
        None => marker,
    };

    check_timeout(raw.timeout_ms, &format!("{path}.timeout_ms"))?;
    let retry = normalize_retry(raw.retry, &format!("{path}.retry"))?;

    for key in raw.env.keys() {
        if key.is_empty() || key.contains('=') || key.contains('\0') {
            return Err(ContractError::validation(
                format!("{path}.env"),
                format!("invalid environment variable name `{key}`"),
            ));
        }
    }

    Ok(Task {
        id: raw.id,
        title: raw.title,
        command,
        shell: raw.shell,
        parallel,
        retry,
        timeout_ms: raw.timeout_ms,
        env: raw.env,
        workdir: raw.workdir,
    })
}

fn normalize_retry(raw: Option<RawRetry>, path: &str) -> Result<RetryPolicy, ContractError> {
    let defaults = RetryPolicy::default();
    let Some(raw) = raw else {
        return Ok(defaults);
    };
    let policy = RetryPolicy {
        max_attempts: raw.max_attempts.unwrap_or(defaults.max_attempts),
        backoff: raw.backoff.unwrap_or(defaults.backoff),
        delay_ms: raw.delay_ms.unwrap_or(defaults.delay_ms),
        max_delay_ms: raw.max_delay_ms.unwrap_or(defaults.max_delay_ms),
    };
    if policy.max_attempts == 0 {
        return Err(ContractError::validation(
            format!("{path}.max_attempts"),
            "max_attempts must be at least 1",
        ));
    }
    if policy.max_delay_ms < policy.delay_ms {
        return Err(ContractError::validation(
            format!("{path}.max_delay_ms"),
            "max_delay_ms must not be smaller than delay_ms",
        ));
    }
    Ok(policy)
}

fn normalize_gate(
    raw: RawGate,
    path: &str,
    default_id: String,
    default_scope: GateScope,
    phase_local: bool,
) -> Result<GateSpec, ContractError> {
    if raw.gate_type.trim().is_empty() {
        return Err(ContractError::validation(
            format!("{path}.type"),
            "gate type must not be empty",
        ));
    }
    let scope = raw.scope.unwrap_or(default_scope);
    if phase_local && scope == GateScope::Global {
        return Err(ContractError::validation(
            format!("{path}.scope"),
            "phase gates must be `phase-pre` or `phase-post`",
        ));
    }
    if phase_local && raw.phase.is_some() {
        return Err(ContractError::validation(
            format!("{path}.phase"),
            "phase gates are already bound to their phase",
        ));
    }
    if scope == GateScope::Global && raw.phase.is_some() {
        return Err(ContractError::validation(
            format!("{path}.phase"),
            "global gates cannot select a phase",
        ));
    }
    if scope != GateScope::Global && raw.stage.is_some() {
        return Err(ContractError::validation(
            format!("{path}.stage"),
            "`stage` only applies to global gates",
        ));
    }
    check_timeout(raw.timeout_ms, &format!("{path}.timeout_ms"))?;

    let params = raw
        .params
        .unwrap_or_else(|| serde_json::Value::Object(serde_json::Map::new()));
    if !params.is_object() {
        return Err(ContractError::validation(
            format!("{path}.params"),
            "gate params must be a mapping",
        ));
    }

    let id = match raw.id {
        Some(id) if is_valid_identifier(&id) => id,
        Some(id) => {
            return Err(ContractError::validation(
                format!("{path}.id"),
                format!("`{id}` is not a valid gate id"),
            ));
        }
        None => default_id,
    };

    Ok(GateSpec {
        id,
        gate_type: raw.gate_type,
        params,
        scope,
        blocking: raw.blocking.unwrap_or(true),
        timeout_ms: raw.timeout_ms,
        phase: raw.phase,
        stage: raw.stage.unwrap_or(GateStage::Start),
    })
}

fn claim_gate_id(
    gate: &GateSpec,
    path: &str,
    gate_ids: &mut BTreeSet<String>,
) -> Result<(), ContractError> {
    if gate_ids.insert(gate.id.clone()) {
        Ok(())
    } else {
        Err(ContractError::validation(
            format!("{path}.id"),
            format!("duplicate gate id `{}`", gate.id),
        ))
    }
}

fn check_timeout(timeout_ms: Option<u64>, path: &str) -> Result<(), ContractError> {
    if timeout_ms == Some(0) {
        return Err(ContractError::validation(path, "timeout must be positive"));
    }
    Ok(())
}
