use super::process::{command_from_params, excerpt, run_check};
use super::traits::{Gate, GateContext, Verdict};
use crate::contract::GateSpec;
use crate::error::GateError;
use async_trait::async_trait;

const STDERR_EXCERPT_CHARS: usize = 200;

/// Runs an arbitrary command; exit code 0 passes.
pub struct CustomCheckGate;

impl CustomCheckGate {
    pub const fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Gate for CustomCheckGate {
    fn name(&self) -> &str {
        "custom-check"
    }

    fn validate_params(&self, params: &serde_json::Value) -> Result<(), String> {
        command_from_params(params).map(|_| ())
    }

    async fn evaluate(&self, spec: &GateSpec, ctx: &GateContext) -> Result<Verdict, GateError> {
        let argv = command_from_params(&spec.params).map_err(|message| GateError::InvalidParams {
            gate: spec.id.clone(),
            message,
        })?;
        let output = run_check(&argv, spec, ctx, None).await?;

        if output.success() {
            return Ok(Verdict::pass("check exited 0"));
        }
        let code = output
            .exit_code
            .map_or_else(|| "signal".to_string(), |c| c.to_string());
        let stderr = excerpt(&output.stderr, STDERR_EXCERPT_CHARS);
        Ok(Verdict::fail(if stderr.is_empty() {
            format!("check exited {code}")
        } else {
            format!("check exited {code}: {stderr}")
        }))
    }
}
