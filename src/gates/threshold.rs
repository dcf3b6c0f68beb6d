use super::traits::{Gate, GateContext, Verdict};
use crate::contract::GateSpec;
use crate::error::GateError;
use async_trait::async_trait;
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
enum Op {
    #[strum(serialize = "<")]
    Lt,
    #[strum(serialize = "<=")]
    Le,
    #[strum(serialize = ">")]
    Gt,
    #[strum(serialize = ">=")]
    Ge,
    #[strum(serialize = "==")]
    Eq,
    #[strum(serialize = "!=")]
    Ne,
}

impl Op {
    fn parse(raw: &str) -> Option<Self> {
        match raw {
            "lt" | "<" => Some(Self::Lt),
            "le" | "<=" => Some(Self::Le),
            "gt" | ">" => Some(Self::Gt),
            "ge" | ">=" => Some(Self::Ge),
            "eq" | "==" => Some(Self::Eq),
            "ne" | "!=" => Some(Self::Ne),
            _ => None,
        }
    }

    #[allow(clippy::float_cmp)]
    fn holds(self, value: f64, bound: f64) -> bool {
        match self {
            Self::Lt => value < bound,
            Self::Le => value <= bound,
            Self::Gt => value > bound,
            Self::Ge => value >= bound,
            Self::Eq => value == bound,
            Self::Ne => value != bound,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ThresholdParams {
    metric: String,
    op: String,
    bound: f64,
    #[serde(default)]
    file: Option<String>,
    #[serde(default)]
    pointer: Option<String>,
}

fn parse_params(params: &serde_json::Value) -> Result<(ThresholdParams, Op), String> {
    let parsed: ThresholdParams =
        serde_json::from_value(params.clone()).map_err(|e| e.to_string())?;
    if parsed.metric.trim().is_empty() {
        return Err("`metric` must not be empty".into());
    }
    let op = Op::parse(&parsed.op).ok_or_else(|| format!("unknown op `{}`", parsed.op))?;
    if let Some(pointer) = &parsed.pointer {
        if parsed.file.is_none() {
            return Err("`pointer` requires `file`".into());
        }
        if !pointer.is_empty() && !pointer.starts_with('/') {
            return Err("`pointer` must be a JSON pointer starting with `/`".into());
        }
    }
    Ok((parsed, op))
}

/// Compares a numeric metric against a bound. The metric comes from the run
/// context, or from a JSON file in the working directory when `file` is set.
pub struct ThresholdGate;

impl ThresholdGate {
    pub const fn new() -> Self {
        Self
    }
}

async fn read_file_metric(workdir: &Path, params: &ThresholdParams) -> Result<f64, String> {
    let Some(file) = &params.file else {
        return Err("no file".into());
    };
    let path = workdir.join(file);
    let text = tokio::fs::read_to_string(&path)
        .await
        .map_err(|e| format!("{}: {e}", path.display()))?;
    let doc: serde_json::Value =
        serde_json::from_str(&text).map_err(|e| format!("{}: {e}", path.display()))?;
    let pointer = params
        .pointer
        .clone()
        .unwrap_or_else(|| format!("/{}", params.metric));
    doc.pointer(&pointer)
        .and_then(serde_json::Value::as_f64)
        .ok_or_else(|| format!("no number at `{pointer}` in {}", path.display()))
}

#[async_trait]
impl Gate for ThresholdGate {
    fn name(&self) -> &str {
        "threshold"
    }

    fn validate_params(&self, params: &serde_json::Value) -> Result<(), String> {
        parse_params(params).map(|_| ())
    }

    async fn evaluate(&self, spec: &GateSpec, ctx: &GateContext) -> Result<Verdict, GateError> {
        let (params, op) =
            parse_params(&spec.params).map_err(|message| GateError::InvalidParams {
                gate: spec.id.clone(),
                message,
            })?;

        let value = if params.file.is_some() {
            match read_file_metric(&ctx.workdir, &params).await {
                Ok(value) => value,
                Err(reason) => return Ok(Verdict::fail(reason)),
            }
        } else {
            match ctx.metrics.get(&params.metric) {
                Some(value) => *value,
                None => {
                    return Ok(Verdict::fail(format!(
                        "metric `{}` is not available",
                        params.metric
                    )));
                }
            }
        };

        let summary = format!("{} = {value} (required {op} {})", params.metric, params.bound);
        if op.holds(value, params.bound) {
            Ok(Verdict::pass(summary))
        } else {
            Ok(Verdict::fail(summary))
        }
    }
}
