//! Shared helpers for the cross-crate integration tests.

use core_types::Value;
use interpreter::Vm;

/// Run a script on a fresh VM and return its terminal value.
pub fn eval(source: &str) -> Result<Value, core_types::JsError> {
    let mut vm = Vm::new();
    vm.evaluate_script(source, "integration.js")
}

/// Run a script and expect a number.
pub fn eval_number(source: &str) -> f64 {
    match eval(source).expect("evaluation succeeds") {
        Value::Number(n) => n,
        other => panic!("expected number, got {:?}", other),
    }
}

/// Run a script and expect a string.
pub fn eval_string(source: &str) -> String {
    match eval(source).expect("evaluation succeeds") {
        Value::String(s) => s.as_str().to_string(),
        other => panic!("expected string, got {:?}", other),
    }
}
