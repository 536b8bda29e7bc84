//! Runtime orchestration: one `Vm` plus the compile/run plumbing the
//! CLI and REPL share.

use std::path::Path;
use std::rc::Rc;

use core_types::Value;
use interpreter::Vm;

use crate::error::{CliError, CliResult};

/// Orchestrates parsing, bytecode printing and execution over a
/// persistent VM.
pub struct Runtime {
    vm: Vm,
    print_bytecode: bool,
}

impl Runtime {
    /// A fresh runtime with a file-system module loader.
    pub fn new() -> Self {
        let mut vm = Vm::new();
        vm.set_module_loader(Box::new(|specifier, referrer| {
            let base = Path::new(referrer)
                .parent()
                .unwrap_or_else(|| Path::new("."));
            let mut path = base.join(specifier);
            if path.extension().is_none() {
                path.set_extension("js");
            }
            std::fs::read_to_string(&path).map_err(|e| e.to_string())
        }));
        Self {
            vm,
            print_bytecode: false,
        }
    }

    /// Enable bytecode printing.
    pub fn with_print_bytecode(mut self, enabled: bool) -> Self {
        self.print_bytecode = enabled;
        self
    }

    /// Direct VM access for embedders.
    pub fn vm(&mut self) -> &mut Vm {
        &mut self.vm
    }

    /// Execute a script file.
    pub fn execute_file(&mut self, path: &str) -> CliResult<Value> {
        let source = std::fs::read_to_string(path)?;
        if path.ends_with(".mjs") {
            self.execute_module(&source, path)
        } else {
            self.execute_script(&source, path)
        }
    }

    /// Execute a module file.
    pub fn execute_module_file(&mut self, path: &str) -> CliResult<Value> {
        let source = std::fs::read_to_string(path)?;
        self.execute_module(&source, path)
    }

    /// Execute script source text.
    pub fn execute_script(&mut self, source: &str, name: &str) -> CliResult<Value> {
        if self.print_bytecode {
            let module = parser::compile_script(source, name)
                .map_err(|e| CliError::Parse(e.to_string()))?;
            print!("{}", bytecode_system::disassemble(&module));
            let result = match self.vm.evaluate_compiled_script(Rc::new(module)) {
                Ok(v) => Ok(v),
                Err(t) => {
                    let err = self.vm.thrown_to_error(t);
                    Err(CliError::from_js_error(err))
                }
            };
            self.vm.run_jobs();
            return result;
        }
        self.vm
            .evaluate_script(source, name)
            .map_err(CliError::from_js_error)
    }

    /// Execute module source text.
    pub fn execute_module(&mut self, source: &str, name: &str) -> CliResult<Value> {
        self.vm
            .evaluate_module(source, name)
            .map_err(CliError::from_js_error)
    }

    /// Start the read-eval-print loop.
    pub fn repl(&mut self) -> CliResult<()> {
        crate::repl::run_repl(self)
    }

    /// Render a terminal value the way the REPL prints it.
    pub fn display_value(&mut self, value: &Value) -> String {
        match value {
            Value::String(s) => format!("{:?}", s.as_str()),
            other => self
                .vm
                .to_string_value(other)
                .unwrap_or_else(|_| format!("{:?}", other)),
        }
    }
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_execute_script() {
        let mut rt = Runtime::new();
        let v = rt.execute_script("6 * 7", "t.js").unwrap();
        assert_eq!(v.as_number(), Some(42.0));
    }

    #[test]
    fn test_state_persists_between_inputs() {
        let mut rt = Runtime::new();
        rt.execute_script("var acc = 1;", "a.js").unwrap();
        rt.execute_script("acc += 10;", "b.js").unwrap();
        let v = rt.execute_script("acc", "c.js").unwrap();
        assert_eq!(v.as_number(), Some(11.0));
    }

    #[test]
    fn test_parse_error_classified() {
        let mut rt = Runtime::new();
        let err = rt.execute_script("let = ;", "bad.js").unwrap_err();
        assert_eq!(err.exit_code(), crate::exit_codes::PARSE_ERROR);
    }

    #[test]
    fn test_uncaught_error_classified() {
        let mut rt = Runtime::new();
        let err = rt.execute_script("throw new TypeError('no')", "bad.js").unwrap_err();
        assert_eq!(err.exit_code(), crate::exit_codes::RUNTIME_ERROR);
    }

    #[test]
    fn test_display_value() {
        let mut rt = Runtime::new();
        let v = rt.execute_script("'hi'", "t.js").unwrap();
        assert_eq!(rt.display_value(&v), "\"hi\"");
        let v = rt.execute_script("1.5", "t.js").unwrap();
        assert_eq!(rt.display_value(&v), "1.5");
    }
}
