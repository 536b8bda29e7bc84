//! Execution contexts: the activation records of running and
//! suspended functions.
//!
//! A context is a heap-adjacent structure so a coroutine can own its
//! parked frame; the interpreter keeps the live ones on its context
//! stack. Suspension freezes the register file and instruction
//! pointer here; resumption re-enters the dispatch loop at the saved
//! point.

use std::collections::HashMap;
use std::rc::Rc;

use bytecode_system::{BytecodeModule, FunctionInfo};
use core_types::{EnvId, ObjectId, PrivateNameRef, Value};

/// A runtime private environment: maps private-name table indices of
/// the module to the name instances minted when the class body
/// evaluated.
#[derive(Debug)]
pub struct PrivEnv {
    /// Enclosing class body's environment.
    pub parent: Option<PrivEnvRef>,
    /// Minted names, keyed by private-name table index.
    pub names: HashMap<u16, PrivateNameRef>,
}

/// Shared handle to a private environment.
pub type PrivEnvRef = Rc<PrivEnv>;

impl PrivEnv {
    /// Resolve a private-name table index through the chain.
    pub fn resolve(env: &PrivEnvRef, index: u16) -> Option<PrivateNameRef> {
        let mut cur = Some(env.clone());
        while let Some(e) = cur {
            if let Some(name) = e.names.get(&index) {
                return Some(name.clone());
            }
            cur = e.parent.clone();
        }
        None
    }
}

/// An abrupt completion travelling through finally handlers during
/// unwinding.
#[derive(Debug, Clone)]
pub enum PendingCompletion {
    /// Exception looking for a catch handler.
    Throw(Value),
    /// Abrupt return (generator `.return()`); runs only finally
    /// handlers.
    Return(Value),
}

/// An activation record.
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    /// The function object being run; `None` for top-level code.
    pub function: Option<ObjectId>,
    /// The module containing the running code.
    pub module: Rc<BytecodeModule>,
    /// Index into the module's function table.
    pub func_index: u16,
    /// Instruction pointer: absolute offset into the module's code.
    pub ip: usize,
    /// Register file, sized by the compiled function.
    pub registers: Vec<Value>,
    /// Call arguments as passed (before parameter binding).
    pub args: Vec<Value>,
    /// Variable environment (the function-entry scope).
    pub var_env: EnvId,
    /// Innermost lexical environment.
    pub lex_env: EnvId,
    /// Environments pushed by `push_scope`, innermost last.
    pub scope_stack: Vec<EnvId>,
    /// Current private environment.
    pub priv_env: Option<PrivEnvRef>,
    /// Private environments pushed by `push_priv_env`.
    pub priv_stack: Vec<PrivEnvRef>,
    /// Abrupt completion in flight through finally handlers.
    pub pending: Option<PendingCompletion>,
    /// Register awaiting the resume value at the active suspension
    /// point.
    pub resume_reg: Option<u8>,
    /// Offset of the instruction that suspended the context; `throw`
    /// resumption unwinds from here.
    pub suspend_ip: usize,
}

impl ExecutionContext {
    /// Build a context for `func_index` of `module`, with its
    /// register file zeroed to `undefined`.
    pub fn new(
        module: Rc<BytecodeModule>,
        func_index: u16,
        function: Option<ObjectId>,
        env: EnvId,
    ) -> Self {
        let info = &module.functions[func_index as usize];
        let registers = vec![Value::Undefined; info.register_count as usize];
        let ip = info.code_start as usize;
        Self {
            function,
            module,
            func_index,
            ip,
            registers,
            args: Vec::new(),
            var_env: env,
            lex_env: env,
            scope_stack: Vec::new(),
            priv_env: None,
            priv_stack: Vec::new(),
            pending: None,
            resume_reg: None,
            suspend_ip: 0,
        }
    }

    /// Metadata of the running function.
    pub fn info(&self) -> &FunctionInfo {
        &self.module.functions[self.func_index as usize]
    }

    /// End offset (exclusive) of the running function's code.
    pub fn code_end(&self) -> usize {
        let info = self.info();
        (info.code_start + info.code_len) as usize
    }

    /// Read a register.
    pub fn reg(&self, r: u8) -> &Value {
        &self.registers[r as usize]
    }

    /// Write a register.
    pub fn set_reg(&mut self, r: u8, v: Value) {
        self.registers[r as usize] = v;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytecode_system::{FunctionFlags, NO_GROUP};
    use core_types::PrivateName;

    fn module_with_one_function() -> Rc<BytecodeModule> {
        let mut m = BytecodeModule::new("t");
        m.functions.push(FunctionInfo {
            name: String::new(),
            param_count: 0,
            flags: FunctionFlags(0),
            code_start: 0,
            code_len: 0,
            register_count: 4,
            scope_group: NO_GROUP,
            func_group: NO_GROUP,
            line: 1,
        });
        Rc::new(m)
    }

    #[test]
    fn test_registers_start_undefined() {
        let cx = ExecutionContext::new(module_with_one_function(), 0, None, EnvId(0));
        assert_eq!(cx.registers.len(), 4);
        assert!(cx.registers.iter().all(|v| v.is_undefined()));
    }

    #[test]
    fn test_priv_env_chain_resolution() {
        let name = PrivateName::new(core_types::JsString::from_str("#x"));
        let outer = Rc::new(PrivEnv {
            parent: None,
            names: HashMap::from([(0u16, name.clone())]),
        });
        let inner = Rc::new(PrivEnv {
            parent: Some(outer),
            names: HashMap::new(),
        });
        let found = PrivEnv::resolve(&inner, 0).unwrap();
        assert!(PrivateName::same(&found, &name));
        assert!(PrivEnv::resolve(&inner, 9).is_none());
    }
}
