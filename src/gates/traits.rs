use crate::contract::{GateScope, GateSpec};
use crate::error::GateError;
use crate::evidence::Digest;
use async_trait::async_trait;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Run state handed to a gate at evaluation time.
#[derive(Debug, Clone, Serialize)]
pub struct GateContext {
    pub plan_hash: String,
    pub contract_id: String,
    pub title: String,
    pub scope: GateScope,
    pub phase: Option<String>,
    pub workdir: PathBuf,
    /// Numeric run metrics (`tasks_failed`, `success_rate`, `metadata.<key>`, ...).
    pub metrics: BTreeMap<String, f64>,
    pub metadata: BTreeMap<String, serde_json::Value>,
    pub evidence: Vec<Digest>,
}

/// Pass/fail decision of a single evaluation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verdict {
    pub passed: bool,
    pub reason: String,
}

impl Verdict {
    pub fn pass(reason: impl Into<String>) -> Self {
        Self {
            passed: true,
            reason: reason.into(),
        }
    }

    pub fn fail(reason: impl Into<String>) -> Self {
        Self {
            passed: false,
            reason: reason.into(),
        }
    }
}

/// A named policy check. Implementations are registered by type name in a
/// `GateRegistry`; the scheduler only ever sees this trait.
#[async_trait]
pub trait Gate: Send + Sync {
    /// Type name used in contracts (`type = "..."`).
    fn name(&self) -> &str;

    /// Static parameter check, used by dry runs and before every evaluation.
    fn validate_params(&self, params: &serde_json::Value) -> Result<(), String>;

    /// Evaluate once. `Err` is reserved for failures to evaluate at all; a
    /// check that ran and did not pass is `Ok(Verdict { passed: false, .. })`.
    async fn evaluate(&self, spec: &GateSpec, ctx: &GateContext) -> Result<Verdict, GateError>;
}
