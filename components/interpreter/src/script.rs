//! Script and module evaluation: global declaration instantiation,
//! module linking and the `eval` entry.

use std::collections::HashSet;
use std::rc::Rc;

use async_runtime::{ModuleRecord, ModuleStatus};
use bytecode_system::{BindingFlags, BytecodeModule, FunctionFlags, NO_GROUP};
use core_types::{Completion, EnvId, JsError, ObjectId, Thrown, Value};
use environments as env_ops;
use memory_manager::{
    Agent, AgentErrors, DeclarativeEnv, EnvKind, EnvRecord, ExecutionContext, ModuleEnv, ObjectKind,
    PromiseState,
};

use crate::dispatch::FrameResult;
use crate::vm::Vm;

impl Vm {
    /// Parse, compile and run a script; drains jobs before returning.
    pub fn evaluate_script(&mut self, source: &str, name: &str) -> Result<Value, JsError> {
        let module = parser::compile_script(source, name)
            .map_err(|e| JsError::new(core_types::ErrorKind::SyntaxError, e.to_string()))?;
        let result = self
            .evaluate_compiled_script(Rc::new(module))
            .map_err(|t| self.thrown_to_error(t));
        self.run_jobs();
        result
    }

    /// Compile a script without running it (embedder API).
    pub fn compile_script(&mut self, source: &str, name: &str) -> Result<BytecodeModule, JsError> {
        parser::compile_script(source, name)
            .map_err(|e| JsError::new(core_types::ErrorKind::SyntaxError, e.to_string()))
    }

    /// Run an already-compiled script module to its terminal value.
    pub fn evaluate_compiled_script(
        &mut self,
        module: Rc<BytecodeModule>,
    ) -> Completion<Value> {
        let global_env = self.realm.global_env;
        self.global_declaration_instantiation(&module, global_env)?;

        let mut ctx = ExecutionContext::new(module, 0, None, global_env);
        ctx.var_env = global_env;
        ctx.lex_env = global_env;
        self.contexts.push(ctx);
        let result = self.run_frame();
        self.contexts.pop();
        match result? {
            FrameResult::Return(v) => Ok(v),
            FrameResult::Suspend { .. } => {
                let err = self.make_error(
                    core_types::ErrorKind::InternalError,
                    "script suspended outside a coroutine",
                );
                Err(Thrown(err))
            }
        }
    }

    /// Global declaration instantiation for a script's top level:
    /// checks first, bindings after, nothing on failure.
    fn global_declaration_instantiation(
        &mut self,
        module: &Rc<BytecodeModule>,
        global_env: EnvId,
    ) -> Completion<()> {
        let info = &module.functions[0];
        let mut lexical = Vec::new();
        let mut vars = Vec::new();
        if info.scope_group != NO_GROUP {
            let g = module.binding_groups[info.scope_group as usize];
            for i in g.start..(g.start + g.len) {
                let row = module.bindings[i as usize];
                let name = module.binding_refs[row.bref as usize].name.clone();
                if row.flags.has(BindingFlags::VAR) {
                    vars.push(name);
                } else {
                    lexical.push((name, row.flags.has(BindingFlags::CONST)));
                }
            }
        }
        let mut functions = Vec::new();
        if info.func_group != NO_GROUP {
            let g = module.func_groups[info.func_group as usize];
            for i in g.start..(g.start + g.len) {
                let row = module.func_decls[i as usize];
                let name = module.binding_refs[row.bref as usize].name.clone();
                let closure = self.create_closure(module, row.func, global_env, None);
                functions.push((name, Value::Object(closure)));
            }
        }
        env_ops::instantiate_global_declarations(self, global_env, &lexical, &vars, &functions)
    }

    /// Indirect `eval`: compile in the global scope and run.
    pub(crate) fn eval_source(&mut self, source: &str) -> Completion<Value> {
        let module = match parser::compile_script(source, "<eval>") {
            Ok(m) => m,
            Err(e) => {
                return self.syntax_error(&e.to_string());
            }
        };
        self.evaluate_compiled_script(Rc::new(module))
    }

    /// Parse, link and evaluate a module graph rooted at `source`.
    /// Top-level await is honoured: evaluation runs the job queues
    /// until the module's promise settles.
    pub fn evaluate_module(&mut self, source: &str, specifier: &str) -> Result<Value, JsError> {
        let compiled = parser::compile_module(source, specifier)
            .map_err(|e| JsError::new(core_types::ErrorKind::SyntaxError, e.to_string()))?;
        self.register_module(specifier, Rc::new(compiled))
            .map_err(|t| self.thrown_to_error(t))?;
        let result = self
            .link_and_evaluate(specifier)
            .map_err(|t| self.thrown_to_error(t));
        self.run_jobs();
        result
    }

    fn register_module(
        &mut self,
        specifier: &str,
        compiled: Rc<BytecodeModule>,
    ) -> Completion<()> {
        if self.modules.contains(specifier) {
            return Ok(());
        }
        let mut requests: Vec<String> = Vec::new();
        for import in &compiled.imports {
            if !requests.contains(&import.specifier) {
                requests.push(import.specifier.clone());
            }
        }
        self.modules.insert(ModuleRecord {
            specifier: specifier.to_string(),
            bytecode: compiled.clone(),
            env: None,
            status: ModuleStatus::Unlinked,
            requests: requests.clone(),
        });
        // load and register the dependency graph
        for request in requests {
            if self.modules.contains(&request) {
                continue;
            }
            let source = self.load_module_source(&request, specifier)?;
            let dep = match parser::compile_module(&source, &request) {
                Ok(m) => m,
                Err(e) => return self.syntax_error(&e.to_string()),
            };
            self.register_module(&request, Rc::new(dep))?;
        }
        Ok(())
    }

    fn load_module_source(&mut self, specifier: &str, referrer: &str) -> Completion<String> {
        let Some(loader) = self.module_loader.as_mut() else {
            return self.type_error("no module loader installed");
        };
        match loader(specifier, referrer) {
            Ok(source) => Ok(source),
            Err(message) => {
                let msg = format!("cannot load module '{}': {}", specifier, message);
                self.type_error(&msg)
            }
        }
    }

    fn link_and_evaluate(&mut self, root: &str) -> Completion<Value> {
        let order = self.modules.evaluation_order(root);
        // link: create environments and bind imports
        for spec in &order {
            self.link_module(spec)?;
        }
        let mut last = Value::Undefined;
        for spec in &order {
            last = self.evaluate_linked_module(spec)?;
        }
        Ok(last)
    }

    fn link_module(&mut self, specifier: &str) -> Completion<()> {
        let (bytecode, status) = {
            let record = self
                .modules
                .get(specifier)
                .expect("module registered before linking");
            (record.bytecode.clone(), record.status.clone())
        };
        if status != ModuleStatus::Unlinked {
            return Ok(());
        }
        if let Some(record) = self.modules.get_mut(specifier) {
            record.status = ModuleStatus::Linking;
        }

        let global_env = self.realm.global_env;
        let env = self.heap.alloc_env(EnvRecord {
            outer: Some(global_env),
            kind: EnvKind::Module(ModuleEnv {
                decl: DeclarativeEnv::default(),
                indirect: Default::default(),
            }),
        });
        self.heap.add_root_env(env);
        self.seed_scope_group(env, &bytecode, bytecode.functions[0].scope_group)?;

        // bind imports as indirect references into the exporting
        // module's environment
        for import in &bytecode.imports {
            if import.local.is_empty() {
                continue; // side-effect import
            }
            let Some(source_record) = self.modules.get(&import.specifier) else {
                let msg = format!("module '{}' is not registered", import.specifier);
                return self.type_error(&msg);
            };
            let Some(source_env) = source_record.env else {
                // cycle: the exporting module links later; bind to its
                // env when it exists
                continue;
            };
            let source_local = if import.import_name == "default" {
                "*default*".to_string()
            } else if import.import_name == "*" {
                // namespace imports materialize a snapshot object at
                // evaluation time
                continue;
            } else {
                let exported = source_record
                    .bytecode
                    .exports
                    .iter()
                    .find(|e| e.export_name == import.import_name);
                match exported {
                    Some(e) => e.local.clone(),
                    None => {
                        let msg = format!(
                            "module '{}' does not export '{}'",
                            import.specifier, import.import_name
                        );
                        return self.syntax_error(&msg);
                    }
                }
            };
            if let EnvKind::Module(m) = &mut self.heap.env_mut(env).kind {
                m.indirect
                    .insert(import.local.clone(), (source_env, source_local));
            }
        }

        if let Some(record) = self.modules.get_mut(specifier) {
            record.env = Some(env);
            record.status = ModuleStatus::Linked;
        }
        Ok(())
    }

    fn evaluate_linked_module(&mut self, specifier: &str) -> Completion<Value> {
        let (bytecode, env, status) = {
            let record = self.modules.get(specifier).expect("module linked");
            (
                record.bytecode.clone(),
                record.env.expect("linked module has an environment"),
                record.status.clone(),
            )
        };
        match status {
            ModuleStatus::Evaluated(None) => return Ok(Value::Undefined),
            ModuleStatus::Evaluated(Some(err)) => return Err(Thrown(err)),
            ModuleStatus::Evaluating => return Ok(Value::Undefined),
            _ => {}
        }
        if let Some(record) = self.modules.get_mut(specifier) {
            record.status = ModuleStatus::Evaluating;
        }

        // namespace imports resolve now that every dependency linked
        self.bind_namespace_imports(&bytecode, env)?;

        let info = &bytecode.functions[0];
        if info.func_group != NO_GROUP {
            self.instantiate_function_group(&bytecode, info.func_group, env, &None)?;
        }

        let mut ctx = ExecutionContext::new(bytecode.clone(), 0, None, env);
        ctx.var_env = env;
        ctx.lex_env = env;

        let outcome = if info.flags.has(FunctionFlags::ASYNC) {
            // top-level await: run as an async body and pump jobs
            // until the module promise settles
            let promise = crate::generator::start_async_body(self, ctx)?;
            self.run_jobs();
            let state = match &self.heap.object(promise).kind {
                ObjectKind::Promise(p) => (p.state, p.result.clone()),
                _ => (PromiseState::Pending, None),
            };
            match state {
                (PromiseState::Rejected, reason) => {
                    Err(Thrown(reason.unwrap_or(Value::Undefined)))
                }
                (_, value) => Ok(value.unwrap_or(Value::Undefined)),
            }
        } else {
            self.contexts.push(ctx);
            let result = self.run_frame();
            self.contexts.pop();
            result.map(|r| match r {
                FrameResult::Return(v) => v,
                FrameResult::Suspend { .. } => Value::Undefined,
            })
        };

        match outcome {
            Ok(v) => {
                if let Some(record) = self.modules.get_mut(specifier) {
                    record.status = ModuleStatus::Evaluated(None);
                }
                Ok(v)
            }
            Err(Thrown(e)) => {
                if let Some(record) = self.modules.get_mut(specifier) {
                    record.status = ModuleStatus::Evaluated(Some(e.clone()));
                }
                Err(Thrown(e))
            }
        }
    }

    /// Materialize `import * as ns` bindings as snapshot objects over
    /// the exporting module's current exports.
    fn bind_namespace_imports(
        &mut self,
        bytecode: &Rc<BytecodeModule>,
        env: EnvId,
    ) -> Completion<()> {
        let namespace_imports: Vec<_> = bytecode
            .imports
            .iter()
            .filter(|i| i.import_name == "*")
            .cloned()
            .collect();
        for import in namespace_imports {
            let Some(record) = self.modules.get(&import.specifier) else {
                continue;
            };
            let exports = record.bytecode.exports.clone();
            let Some(source_env) = record.env else {
                continue;
            };
            let ns = self.make_namespace_object(source_env, &exports)?;
            env_ops::create_immutable_binding(self, env, &import.local, true)?;
            env_ops::initialize_binding(self, env, &import.local, Value::Object(ns))?;
        }
        Ok(())
    }

    fn make_namespace_object(
        &mut self,
        source_env: EnvId,
        exports: &[bytecode_system::ExportEntry],
    ) -> Completion<ObjectId> {
        let ns = self
            .heap
            .alloc_object(memory_manager::JsObject::ordinary(None));
        let mut seen = HashSet::new();
        for entry in exports {
            if !seen.insert(entry.export_name.clone()) {
                continue;
            }
            let value = env_ops::get_binding_value(self, source_env, &entry.local, true)
                .unwrap_or(Value::Undefined);
            self.heap.object_mut(ns).set_property(
                core_types::PropertyKey::from_str(&entry.export_name),
                memory_manager::Property::data(value),
            );
        }
        self.heap.object_mut(ns).extensible = false;
        Ok(ns)
    }
}
