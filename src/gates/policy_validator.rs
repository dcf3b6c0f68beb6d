use super::process::{command_from_params, excerpt, run_check};
use super::traits::{Gate, GateContext, Verdict};
use crate::contract::GateSpec;
use crate::error::GateError;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

const OUTPUT_EXCERPT_CHARS: usize = 200;

/// Payload an external validator prints on stdout.
#[derive(Debug, Deserialize)]
struct ValidatorPayload {
    passed: bool,
    #[serde(default)]
    reasons: Vec<String>,
}

/// Delegates the decision to an external validator process. The validator
/// sees the run context on stdin (JSON) and in `PHASEGATE_*` env vars and
/// answers with `{"passed": bool, "reasons": [..]}`. Exit code must agree.
pub struct PolicyValidatorGate;

impl PolicyValidatorGate {
    pub const fn new() -> Self {
        Self
    }
}

fn args_context(params: &serde_json::Value) -> Result<bool, String> {
    params
        .get("args_context")
        .map(|v| v.as_bool().ok_or("`args_context` must be a boolean"))
        .transpose()
        .map(Option::unwrap_or_default)
        .map_err(str::to_string)
}

/// Whole stdout first, then the last line that parses, so validators may
/// log before printing their verdict.
fn parse_payload(stdout: &str) -> Option<ValidatorPayload> {
    serde_json::from_str(stdout.trim()).ok().or_else(|| {
        stdout
            .lines()
            .rev()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .find_map(|line| serde_json::from_str(line).ok())
    })
}

#[async_trait]
impl Gate for PolicyValidatorGate {
    fn name(&self) -> &str {
        "policy-validator"
    }

    fn validate_params(&self, params: &serde_json::Value) -> Result<(), String> {
        command_from_params(params)?;
        args_context(params)?;
        Ok(())
    }

    async fn evaluate(&self, spec: &GateSpec, ctx: &GateContext) -> Result<Verdict, GateError> {
        let invalid = |message: String| GateError::InvalidParams {
            gate: spec.id.clone(),
            message,
        };
        let mut argv = command_from_params(&spec.params).map_err(invalid)?;
        if args_context(&spec.params).map_err(invalid)? {
            argv.extend([
                "--plan-hash".to_string(),
                ctx.plan_hash.clone(),
                "--task-id".to_string(),
                ctx.contract_id.clone(),
            ]);
            if let Some(phase) = &ctx.phase {
                argv.extend(["--phase".to_string(), phase.clone()]);
            }
        }

        let payload = json!({
            "gate": {
                "id": spec.id,
                "type": spec.gate_type,
                "params": spec.params,
            },
            "context": ctx,
        });
        let stdin = serde_json::to_vec(&payload).map_err(|e| invalid(e.to_string()))?;
        let output = run_check(&argv, spec, ctx, Some(stdin)).await?;

        let Some(verdict) = parse_payload(&output.stdout) else {
            let detail = excerpt(&output.stdout, OUTPUT_EXCERPT_CHARS);
            return Ok(Verdict::fail(format!(
                "validator output is not a verdict payload (exit {:?}): {detail}",
                output.exit_code
            )));
        };

        let reasons = verdict.reasons.join("; ");
        match (output.success(), verdict.passed) {
            (true, true) => Ok(Verdict::pass(if reasons.is_empty() {
                "validator passed".to_string()
            } else {
                reasons
            })),
            (false, true) => Ok(Verdict::fail(format!(
                "validator reported passed but exited {:?}",
                output.exit_code
            ))),
            (_, false) => Ok(Verdict::fail(if reasons.is_empty() {
                "validator rejected the run".to_string()
            } else {
                reasons
            })),
        }
    }
}
