use super::model::{Contract, GateScope, GateStage};
use super::validate::normalize;
use crate::error::ContractError;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;

/// Source format of a contract file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum ContractFormat {
    Json,
    Yaml,
    Toml,
}

impl ContractFormat {
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "json" => Some(Self::Json),
            "yaml" | "yml" => Some(Self::Yaml),
            "toml" => Some(Self::Toml),
            _ => None,
        }
    }

    /// Guess the format from content when the extension says nothing.
    pub fn sniff(text: &str) -> Self {
        if text.trim_start().starts_with('{') {
            Self::Json
        } else {
            Self::Yaml
        }
    }
}

pub struct ContractParser;

impl ContractParser {
    pub fn parse_file(path: &Path) -> Result<Contract, ContractError> {
        let text = std::fs::read_to_string(path).map_err(|e| ContractError::Read {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        let format = ContractFormat::from_path(path).unwrap_or_else(|| ContractFormat::sniff(&text));
        Self::parse_str(&text, format)
    }

    pub fn parse_str(text: &str, format: ContractFormat) -> Result<Contract, ContractError> {
        let raw = decode(text, format)?;
        if raw.phases.is_empty() {
            return Err(ContractError::parse(
                "phases",
                "contract must declare at least one phase",
            ));
        }
        normalize(raw)
    }
}

fn decode(text: &str, format: ContractFormat) -> Result<RawContract, ContractError> {
    match format {
        ContractFormat::Json => serde_json::from_str(text).map_err(|e| {
            ContractError::parse(format!("{}:{}", e.line(), e.column()), e.to_string())
        }),
        ContractFormat::Yaml => serde_yaml::from_str(text).map_err(|e| {
            let location = e.location().map_or_else(
                || "unknown".to_string(),
                |loc| format!("{}:{}", loc.line(), loc.column()),
            );
            ContractError::parse(location, e.to_string())
        }),
        ContractFormat::Toml => toml::from_str(text).map_err(|e| {
            let location = e
                .span()
                .map_or_else(|| "unknown".to_string(), |span| offset_to_line_col(text, span.start));
            ContractError::parse(location, e.message().to_string())
        }),
    }
}

/// 1-based `line:column` for a byte offset.
fn offset_to_line_col(text: &str, offset: usize) -> String {
    let prefix = &text[..offset.min(text.len())];
    let line = prefix.matches('\n').count() + 1;
    let column = prefix.rfind('\n').map_or(prefix.len(), |nl| prefix.len() - nl - 1) + 1;
    format!("{line}:{column}")
}

// ── Wire shapes ─────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub(super) struct RawContract {
    pub task_id: String,
    #[serde(default)]
    pub title: String,
    pub phases: Vec<RawPhase>,
    #[serde(default)]
    pub gates: Vec<RawGate>,
    #[serde(default)]
    pub metadata: BTreeMap<String, serde_json::Value>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub(super) struct RawPhase {
    pub name: String,
    #[serde(default)]
    pub blocking: bool,
    #[serde(default)]
    pub timeout_ms: Option<u64>,
    #[serde(default)]
    pub gates: Vec<RawGate>,
    #[serde(default)]
    pub tasks: Vec<RawTask>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub(super) struct RawTask {
    pub id: String,
    #[serde(default)]
    pub title: Option<String>,
    pub command: RawCommand,
    #[serde(default)]
    pub shell: bool,
    #[serde(default)]
    pub parallel: Option<bool>,
    #[serde(default)]
    pub retry: Option<RawRetry>,
    #[serde(default)]
    pub timeout_ms: Option<u64>,
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    #[serde(default)]
    pub workdir: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub(super) enum RawCommand {
    Argv(Vec<String>),
    Script(String),
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub(super) struct RawRetry {
    #[serde(default)]
    pub max_attempts: Option<u32>,
    #[serde(default)]
    pub backoff: Option<super::model::BackoffKind>,
    #[serde(default)]
    pub delay_ms: Option<u64>,
    #[serde(default)]
    pub max_delay_ms: Option<u64>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub(super) struct RawGate {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(rename = "type")]
    pub gate_type: String,
    #[serde(default)]
    pub params: Option<serde_json::Value>,
    #[serde(default)]
    pub scope: Option<GateScope>,
    #[serde(default)]
    pub blocking: Option<bool>,
    #[serde(default)]
    pub timeout_ms: Option<u64>,
    #[serde(default)]
    pub phase: Option<String>,
    #[serde(default)]
    pub stage: Option<GateStage>,
}
