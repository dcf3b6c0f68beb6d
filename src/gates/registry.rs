use super::custom_check::CustomCheckGate;
use super::policy_validator::PolicyValidatorGate;
use super::threshold::ThresholdGate;
use super::traits::Gate;
use std::collections::HashMap;
use std::sync::Arc;

/// Gate implementations keyed by contract type name.
#[derive(Default)]
pub struct GateRegistry {
    gates: HashMap<String, Arc<dyn Gate>>,
}

impl GateRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry preloaded with `policy-validator`, `threshold` and `custom-check`.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register(Box::new(PolicyValidatorGate::new()));
        registry.register(Box::new(ThresholdGate::new()));
        registry.register(Box::new(CustomCheckGate::new()));
        registry
    }

    /// Register a gate. Replaces any existing gate with the same name.
    pub fn register(&mut self, gate: Box<dyn Gate>) {
        let gate: Arc<dyn Gate> = Arc::from(gate);
        self.gates.insert(gate.name().to_string(), gate);
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn Gate>> {
        self.gates.get(name)
    }

    /// Sorted list of registered type names.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.gates.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl std::fmt::Debug for GateRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GateRegistry")
            .field("gates", &self.names())
            .finish()
    }
}
