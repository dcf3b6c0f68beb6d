//! Canonical plan hashing.
//!
//! The hash is computed over the *normalized* contract, so defaults that were
//! spelled out and defaults that were omitted hash the same, as do JSON, YAML
//! and TOML renditions of one contract.

use crate::contract::{Contract, ContractParser};
use serde::Serialize;
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use std::path::Path;

/// A normalized contract plus its deterministic identity.
#[derive(Debug, Clone, Serialize)]
pub struct Plan {
    pub plan_hash: String,
    pub contract: Contract,
}

impl Plan {
    pub fn from_contract(contract: Contract) -> Self {
        Self {
            plan_hash: plan_hash(&contract),
            contract,
        }
    }

    /// Parse and validate the contract at `path`, then hash it.
    pub fn load(path: &Path) -> crate::Result<Self> {
        Ok(Self::from_contract(ContractParser::parse_file(path)?))
    }
}

/// SHA-256 (lowercase hex) over the canonical byte form of `contract`.
pub fn plan_hash(contract: &Contract) -> String {
    let mut hasher = Sha256::new();
    hasher.update(canonical_bytes(contract));
    hex::encode(hasher.finalize())
}

/// Compact JSON with object keys sorted at every depth.
pub fn canonical_bytes(contract: &Contract) -> Vec<u8> {
    // Contract is plain data (strings, numbers, maps); serialization cannot fail.
    let value = serde_json::to_value(contract).unwrap_or(Value::Null);
    let canonical = canonicalize(value);
    serde_json::to_vec(&canonical).unwrap_or_default()
}

/// Rebuild every object with keys inserted in sorted order, so the output is
/// ordered even when `serde_json` is built with `preserve_order`.
pub fn canonicalize(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(String, Value)> = map.into_iter().collect();
            entries.sort_by(|a, b| a.0.cmp(&b.0));
            let mut sorted = Map::new();
            for (key, inner) in entries {
                sorted.insert(key, canonicalize(inner));
            }
            Value::Object(sorted)
        }
        Value::Array(items) => Value::Array(items.into_iter().map(canonicalize).collect()),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contract::{ContractFormat, ContractParser};

    fn parse(text: &str, format: ContractFormat) -> Contract {
        ContractParser::parse_str(text, format).unwrap()
    }

    #[test]
    fn key_order_and_whitespace_do_not_change_hash() {
        let a = r#"{"task_id":"H-1","title":"hash","phases":[{"name":"p","tasks":[{"id":"a","command":["echo","x"]}]}],"metadata":{"owner":"ci","tier":2}}"#;
        let b = r#"
        {
            "metadata": { "tier": 2, "owner": "ci" },
            "phases": [ { "tasks": [ { "command": [ "echo", "x" ], "id": "a" } ], "name": "p" } ],
            "title": "hash",
            "task_id": "H-1"
        }"#;
        assert_eq!(
            plan_hash(&parse(a, ContractFormat::Json)),
            plan_hash(&parse(b, ContractFormat::Json))
        );
    }

    #[test]
    fn explicit_defaults_hash_like_omitted_defaults() {
        let implicit = r#"{"task_id":"H-1","title":"t","phases":[{"name":"p","tasks":[{"id":"a","command":["true"]}]}]}"#;
        let explicit = r#"{"task_id":"H-1","title":"t","gates":[],"metadata":{},
            "phases":[{"name":"p","blocking":false,"tasks":[{"id":"a","command":["true"],
            "shell":false,"parallel":false,"retry":{"max_attempts":1,"backoff":"fixed"}}]}]}"#;
        assert_eq!(
            plan_hash(&parse(implicit, ContractFormat::Json)),
            plan_hash(&parse(explicit, ContractFormat::Json))
        );
    }

    #[test]
    fn json_and_yaml_renditions_hash_identically() {
        let json = r#"{"task_id":"H-2","title":"t","phases":[{"name":"p","blocking":true,"tasks":[{"id":"a","command":["make","test"],"parallel":true}]}]}"#;
        let yaml = "
task_id: H-2
title: t
phases:
  - name: p
    blocking: true
    tasks:
      - id: a
        parallel: true
        command:
          - make
          - test
";
        assert_eq!(
            plan_hash(&parse(json, ContractFormat::Json)),
            plan_hash(&parse(yaml, ContractFormat::Yaml))
        );
    }

    #[test]
    fn logical_change_changes_hash() {
        let a = r#"{"task_id":"H-1","title":"t","phases":[{"name":"p","tasks":[{"id":"a","command":["true"]}]}]}"#;
        let b = r#"{"task_id":"H-1","title":"t","phases":[{"name":"p","tasks":[{"id":"a","command":["false"]}]}]}"#;
        assert_ne!(
            plan_hash(&parse(a, ContractFormat::Json)),
            plan_hash(&parse(b, ContractFormat::Json))
        );
    }

    #[test]
    fn hash_is_lowercase_sha256_hex() {
        let a = r#"{"task_id":"H-1","phases":[{"name":"p","tasks":[{"id":"a","command":["true"]}]}]}"#;
        let plan = Plan::from_contract(parse(a, ContractFormat::Json));
        assert_eq!(plan.plan_hash.len(), 64);
        assert!(plan.plan_hash.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn canonicalize_sorts_nested_objects() {
        let value = serde_json::json!({"b": {"z": 1, "a": [{"y": 2, "x": 1}]}, "a": 0});
        let text = serde_json::to_string(&canonicalize(value)).unwrap();
        assert_eq!(text, r#"{"a":0,"b":{"a":[{"x":1,"y":2}],"z":1}}"#);
    }

    #[test]
    fn load_reads_and_hashes_contract_file() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("c.json");
        let text = r#"{"task_id":"H-1","phases":[{"name":"p","tasks":[{"id":"a","command":["true"]}]}]}"#;
        std::fs::write(&path, text).unwrap();

        let plan = Plan::load(&path).unwrap();
        assert_eq!(plan.plan_hash, plan_hash(&parse(text, ContractFormat::Json)));

        let missing = Plan::load(&tmp.path().join("absent.json")).unwrap_err();
        assert!(matches!(missing, crate::EngineError::Contract(_)));
        assert_eq!(missing.exit_code(), crate::report::exit_codes::INVALID);
    }
}
