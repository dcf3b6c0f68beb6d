//! Gate evaluation: type registry, built-in gates and the engine that wraps
//! each evaluation in a timeout and folds every outcome into a `GateRecord`.

pub mod custom_check;
pub mod policy_validator;
pub mod process;
pub mod registry;
pub mod threshold;
pub mod traits;

pub use registry::GateRegistry;
pub use traits::{Gate, GateContext, Verdict};

use crate::config::GatesConfig;
use crate::contract::{Contract, GateSpec};
use crate::error::GateError;
use crate::report::{GateRecord, GateResult};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Evaluations allowed per gate: the first try plus one retry on spawn failure.
const MAX_GATE_ATTEMPTS: u32 = 2;

/// A static problem found by [`GateEngine::dry_run`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GateIssue {
    pub gate_id: String,
    pub error: GateError,
}

impl std::fmt::Display for GateIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.gate_id, self.error)
    }
}

#[derive(Debug, Clone)]
pub struct GateEngine {
    registry: Arc<GateRegistry>,
    default_timeout_ms: u64,
}

impl GateEngine {
    pub fn new(registry: Arc<GateRegistry>, config: &GatesConfig) -> Self {
        Self {
            registry,
            default_timeout_ms: config.timeout_ms,
        }
    }

    pub fn registry(&self) -> &GateRegistry {
        &self.registry
    }

    /// Evaluate one gate. Never fails: unknown types, bad params, timeouts and
    /// spawn errors all become a failed `GateRecord`.
    pub async fn evaluate(&self, spec: &GateSpec, ctx: &GateContext) -> GateRecord {
        let started = Instant::now();
        let (result, attempts) = self.evaluate_inner(spec, ctx).await;
        let record = GateRecord {
            gate_id: spec.id.clone(),
            gate_type: spec.gate_type.clone(),
            scope: spec.scope,
            phase: ctx.phase.clone(),
            result: GateResult {
                passed: result.passed,
                reason: result.reason,
                blocking: spec.blocking,
            },
            attempts,
            duration_ms: elapsed_ms(started),
        };
        if record.result.passed {
            tracing::debug!(gate = %record.gate_id, "gate passed: {}", record.result.reason);
        } else {
            tracing::debug!(
                gate = %record.gate_id,
                blocking = record.result.blocking,
                "gate failed: {}",
                record.result.reason
            );
        }
        record
    }

    async fn evaluate_inner(&self, spec: &GateSpec, ctx: &GateContext) -> (Verdict, u32) {
        let Some(gate) = self.registry.get(&spec.gate_type) else {
            return (
                Verdict::fail(GateError::UnknownType(spec.gate_type.clone()).to_string()),
                0,
            );
        };
        if let Err(message) = gate.validate_params(&spec.params) {
            let err = GateError::InvalidParams {
                gate: spec.id.clone(),
                message,
            };
            return (Verdict::fail(err.to_string()), 0);
        }

        let timeout_ms = spec.timeout_ms.unwrap_or(self.default_timeout_ms);
        let mut attempt = 0;
        loop {
            attempt += 1;
            let outcome =
                tokio::time::timeout(Duration::from_millis(timeout_ms), gate.evaluate(spec, ctx))
                    .await;
            match outcome {
                Ok(Ok(verdict)) => return (verdict, attempt),
                Ok(Err(err)) if err.is_transient() && attempt < MAX_GATE_ATTEMPTS => {
                    tracing::warn!(gate = %spec.id, attempt, "gate evaluation failed, retrying: {err}");
                }
                Ok(Err(err)) => return (Verdict::fail(err.to_string()), attempt),
                Err(_) => {
                    return (
                        Verdict::fail(GateError::Timeout(timeout_ms).to_string()),
                        attempt,
                    );
                }
            }
        }
    }

    /// Check every declared gate's type and params without running anything.
    pub fn dry_run(&self, contract: &Contract) -> Vec<GateIssue> {
        contract
            .all_gates()
            .filter_map(|spec| {
                let error = match self.registry.get(&spec.gate_type) {
                    None => GateError::UnknownType(spec.gate_type.clone()),
                    Some(gate) => match gate.validate_params(&spec.params) {
                        Ok(()) => return None,
                        Err(message) => GateError::InvalidParams {
                            gate: spec.id.clone(),
                            message,
                        },
                    },
                };
                Some(GateIssue {
                    gate_id: spec.id.clone(),
                    error,
                })
            })
            .collect()
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}
