//! Module registry: link-state bookkeeping and evaluation order.
//!
//! The interpreter compiles and runs module code; the registry keeps
//! one record per specifier, tracks the link/evaluate state machine
//! and answers the dependency-topological evaluation order.

use std::collections::HashMap;
use std::rc::Rc;

use bytecode_system::BytecodeModule;
use core_types::{EnvId, Value};

/// Link/evaluation state of one module.
#[derive(Debug, Clone)]
pub enum ModuleStatus {
    /// Parsed, dependencies not yet resolved.
    Unlinked,
    /// Dependency resolution in progress (cycle detection).
    Linking,
    /// Environment created, imports bound.
    Linked,
    /// Body running (or suspended at a top-level await).
    Evaluating,
    /// Done; a throw during evaluation is remembered and re-thrown on
    /// re-import.
    Evaluated(Option<Value>),
}

impl PartialEq for ModuleStatus {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (ModuleStatus::Unlinked, ModuleStatus::Unlinked) => true,
            (ModuleStatus::Linking, ModuleStatus::Linking) => true,
            (ModuleStatus::Linked, ModuleStatus::Linked) => true,
            (ModuleStatus::Evaluating, ModuleStatus::Evaluating) => true,
            (ModuleStatus::Evaluated(a), ModuleStatus::Evaluated(b)) => match (a, b) {
                (None, None) => true,
                (Some(a), Some(b)) => a.same_value_zero(b),
                _ => false,
            },
            _ => false,
        }
    }
}

/// One registered module.
#[derive(Debug, Clone)]
pub struct ModuleRecord {
    /// Resolved specifier (the registry key).
    pub specifier: String,
    /// Compiled code.
    pub bytecode: Rc<BytecodeModule>,
    /// The module environment, once linked.
    pub env: Option<EnvId>,
    /// State machine position.
    pub status: ModuleStatus,
    /// Specifiers this module requests, in source order.
    pub requests: Vec<String>,
}

/// The per-runtime module map.
#[derive(Debug, Default)]
pub struct ModuleRegistry {
    modules: HashMap<String, ModuleRecord>,
}

impl ModuleRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a compiled module. Re-registering a specifier is an
    /// embedder error and replaces the record.
    pub fn insert(&mut self, record: ModuleRecord) {
        self.modules.insert(record.specifier.clone(), record);
    }

    /// Look up a record.
    pub fn get(&self, specifier: &str) -> Option<&ModuleRecord> {
        self.modules.get(specifier)
    }

    /// Mutable record access.
    pub fn get_mut(&mut self, specifier: &str) -> Option<&mut ModuleRecord> {
        self.modules.get_mut(specifier)
    }

    /// Whether a specifier is registered.
    pub fn contains(&self, specifier: &str) -> bool {
        self.modules.contains_key(specifier)
    }

    /// Dependency-topological evaluation order for `root`:
    /// depth-first post-order, each module once, cycles broken at the
    /// back-edge.
    pub fn evaluation_order(&self, root: &str) -> Vec<String> {
        let mut order = Vec::new();
        let mut visiting = Vec::new();
        let mut done: HashMap<&str, ()> = HashMap::new();
        self.visit(root, &mut order, &mut visiting, &mut done);
        order
    }

    fn visit<'a>(
        &'a self,
        specifier: &'a str,
        order: &mut Vec<String>,
        visiting: &mut Vec<&'a str>,
        done: &mut HashMap<&'a str, ()>,
    ) {
        if done.contains_key(specifier) || visiting.contains(&specifier) {
            return;
        }
        let Some(record) = self.modules.get(specifier) else {
            return;
        };
        visiting.push(specifier);
        for req in &record.requests {
            self.visit(req, order, visiting, done);
        }
        visiting.pop();
        done.insert(specifier, ());
        order.push(specifier.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(specifier: &str, requests: &[&str]) -> ModuleRecord {
        ModuleRecord {
            specifier: specifier.to_string(),
            bytecode: Rc::new(BytecodeModule::new(specifier)),
            env: None,
            status: ModuleStatus::Unlinked,
            requests: requests.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn test_topological_order() {
        let mut reg = ModuleRegistry::new();
        reg.insert(record("a", &["b", "c"]));
        reg.insert(record("b", &["c"]));
        reg.insert(record("c", &[]));
        assert_eq!(reg.evaluation_order("a"), vec!["c", "b", "a"]);
    }

    #[test]
    fn test_cycle_does_not_loop() {
        let mut reg = ModuleRegistry::new();
        reg.insert(record("a", &["b"]));
        reg.insert(record("b", &["a"]));
        let order = reg.evaluation_order("a");
        assert_eq!(order, vec!["b", "a"]);
    }

    #[test]
    fn test_status_transitions() {
        let mut reg = ModuleRegistry::new();
        reg.insert(record("m", &[]));
        reg.get_mut("m").unwrap().status = ModuleStatus::Linking;
        reg.get_mut("m").unwrap().status = ModuleStatus::Linked;
        reg.get_mut("m").unwrap().status = ModuleStatus::Evaluating;
        reg.get_mut("m").unwrap().status = ModuleStatus::Evaluated(None);
        assert_eq!(
            reg.get("m").unwrap().status,
            ModuleStatus::Evaluated(None)
        );
    }
}
