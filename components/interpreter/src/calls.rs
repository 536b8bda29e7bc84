//! Call and construct paths: ordinary calls, bound functions, proxy
//! traps, constructors and closure creation.

use std::rc::Rc;

use bytecode_system::{BytecodeModule, FunctionFlags, NO_GROUP};
use core_types::{Completion, EnvId, JsString, ObjectId, PropertyKey, Thrown, Value};
use environments as env_ops;
use memory_manager::{
    Agent, AgentErrors, BindingSlot, CoroutineKind, EnvKind, EnvRecord, ExecutionContext, JsObject,
    NativeCallInfo, ObjectKind, PrivEnvRef, Property, PropertyValue, ScriptFunctionData,
    ThisBinding,
};
use object_model as om;

use crate::dispatch::FrameResult;
use crate::vm::Vm;

impl Vm {
    /// The `[[Call]]` entry point.
    pub(crate) fn execute_call(
        &mut self,
        callee: Value,
        this: Value,
        args: &[Value],
    ) -> Completion<Value> {
        self.check_call_depth()?;
        let Some(id) = callee.as_object() else {
            let msg = format!("{} is not a function", om::type_of_value(self, &callee));
            return self.type_error(&msg);
        };
        let kind_probe = {
            let obj = self.heap.object(id);
            match &obj.kind {
                ObjectKind::Builtin(b) => Callee::Builtin(b.func),
                ObjectKind::Bound(b) => Callee::Bound(b.target, b.bound_this.clone(), b.bound_args.clone()),
                ObjectKind::Proxy { target, handler } => Callee::Proxy(*target, *handler),
                ObjectKind::Function(f) => Callee::Script(f.clone()),
                _ => Callee::NotCallable,
            }
        };
        match kind_probe {
            Callee::NotCallable => {
                let msg = format!("{} is not a function", om::type_of_value(self, &callee));
                self.type_error(&msg)
            }
            Callee::Builtin(func) => {
                // native locals hold raw handles; no collection while
                // a native frame is on the Rust stack
                self.native_depth += 1;
                let result = func(
                    self,
                    &NativeCallInfo {
                        callee: id,
                        this,
                        args,
                        new_target: Value::Undefined,
                    },
                );
                self.native_depth -= 1;
                result
            }
            Callee::Bound(target, bound_this, bound_args) => {
                let mut all = bound_args;
                all.extend_from_slice(args);
                self.execute_call(Value::Object(target), bound_this, &all)
            }
            Callee::Proxy(target, handler) => {
                let (Some(target), Some(handler)) = (target, handler) else {
                    return self.type_error("proxy has been revoked");
                };
                let trap = om::get_method(
                    self,
                    &Value::Object(handler),
                    &PropertyKey::from_str("apply"),
                )?;
                match trap {
                    Some(trap) => {
                        let arg_array = self.values_to_array(args);
                        self.execute_call(
                            trap,
                            Value::Object(handler),
                            &[Value::Object(target), this, arg_array],
                        )
                    }
                    None => self.execute_call(Value::Object(target), this, args),
                }
            }
            Callee::Script(data) => self.call_script_function(id, data, this, args),
        }
    }

    fn call_script_function(
        &mut self,
        func_obj: ObjectId,
        data: ScriptFunctionData,
        this: Value,
        args: &[Value],
    ) -> Completion<Value> {
        let info = &data.module.functions[data.func_index as usize];
        let flags = info.flags;
        if flags.has(FunctionFlags::CLASS_CTOR) {
            let name = if info.name.is_empty() { "anonymous" } else { &info.name };
            let msg = format!("class constructor {} cannot be invoked without 'new'", name);
            return self.type_error(&msg);
        }
        let ctx = self.prepare_context(
            func_obj,
            &data,
            this,
            args.to_vec(),
            Value::Undefined,
            None,
        )?;

        if flags.has(FunctionFlags::GENERATOR) {
            let kind = if flags.has(FunctionFlags::ASYNC) {
                CoroutineKind::AsyncGenerator
            } else {
                CoroutineKind::Generator
            };
            let gen = crate::generator::create_coroutine_object(self, Some(func_obj), ctx, kind);
            return Ok(Value::Object(gen));
        }
        if flags.has(FunctionFlags::ASYNC) {
            let promise = crate::generator::start_async_body(self, ctx)?;
            return Ok(Value::Object(promise));
        }

        self.contexts.push(ctx);
        let result = self.run_frame();
        self.contexts.pop();
        match result? {
            FrameResult::Return(v) => Ok(v),
            FrameResult::Suspend { .. } => {
                let err = self.make_error(
                    core_types::ErrorKind::InternalError,
                    "suspension outside a coroutine",
                );
                Err(Thrown(err))
            }
        }
    }

    /// The `[[Construct]]` entry point.
    pub(crate) fn execute_construct(
        &mut self,
        callee: Value,
        args: &[Value],
        new_target: Value,
    ) -> Completion<Value> {
        self.check_call_depth()?;
        let Some(id) = callee.as_object() else {
            return self.type_error("value is not a constructor");
        };
        let kind_probe = {
            let obj = self.heap.object(id);
            match &obj.kind {
                ObjectKind::Builtin(b) if b.constructable => Callee::Builtin(b.func),
                ObjectKind::Builtin(_) => Callee::NotCallable,
                ObjectKind::Bound(b) => Callee::Bound(b.target, b.bound_this.clone(), b.bound_args.clone()),
                ObjectKind::Proxy { target, handler } => Callee::Proxy(*target, *handler),
                ObjectKind::Function(f) => Callee::Script(f.clone()),
                _ => Callee::NotCallable,
            }
        };
        match kind_probe {
            Callee::NotCallable => self.type_error("value is not a constructor"),
            Callee::Builtin(func) => {
                self.native_depth += 1;
                let result = func(
                    self,
                    &NativeCallInfo {
                        callee: id,
                        this: Value::Undefined,
                        args,
                        new_target,
                    },
                );
                self.native_depth -= 1;
                result
            }
            Callee::Bound(target, _, bound_args) => {
                let mut all = bound_args;
                all.extend_from_slice(args);
                let inner_target = if new_target.as_object() == Some(id) {
                    Value::Object(target)
                } else {
                    new_target
                };
                self.execute_construct(Value::Object(target), &all, inner_target)
            }
            Callee::Proxy(target, handler) => {
                let (Some(target), Some(handler)) = (target, handler) else {
                    return self.type_error("proxy has been revoked");
                };
                let trap = om::get_method(
                    self,
                    &Value::Object(handler),
                    &PropertyKey::from_str("construct"),
                )?;
                match trap {
                    Some(trap) => {
                        let arg_array = self.values_to_array(args);
                        let result = self.execute_call(
                            trap,
                            Value::Object(handler),
                            &[Value::Object(target), arg_array, new_target],
                        )?;
                        if !result.is_object() {
                            return self.type_error("construct trap must return an object");
                        }
                        Ok(result)
                    }
                    None => self.execute_construct(Value::Object(target), args, new_target),
                }
            }
            Callee::Script(data) => self.construct_script_function(id, data, args, new_target),
        }
    }

    fn construct_script_function(
        &mut self,
        func_obj: ObjectId,
        data: ScriptFunctionData,
        args: &[Value],
        new_target: Value,
    ) -> Completion<Value> {
        let info = &data.module.functions[data.func_index as usize];
        let flags = info.flags;
        if flags.has(FunctionFlags::ARROW)
            || flags.has(FunctionFlags::GENERATOR)
            || flags.has(FunctionFlags::ASYNC)
            || (flags.has(FunctionFlags::METHOD) && !flags.has(FunctionFlags::CLASS_CTOR))
        {
            return self.type_error("value is not a constructor");
        }
        let derived = flags.has(FunctionFlags::DERIVED_CTOR);

        // ordinary object wired to new.target's prototype
        let this = if derived {
            None
        } else {
            let proto = match new_target.as_object() {
                Some(nt) => {
                    let p = om::get(
                        self,
                        nt,
                        &PropertyKey::from_str("prototype"),
                        &new_target,
                    )?;
                    p.as_object()
                        .unwrap_or(self.realm.intrinsics.object_prototype)
                }
                None => self.realm.intrinsics.object_prototype,
            };
            Some(self.heap.alloc_object(JsObject::ordinary(Some(proto))))
        };

        let ctx = self.prepare_context(
            func_obj,
            &data,
            this.map(Value::Object).unwrap_or(Value::Undefined),
            args.to_vec(),
            new_target,
            Some(derived),
        )?;
        let func_env = ctx.var_env;

        self.contexts.push(ctx);
        let result = self.run_frame();
        self.contexts.pop();

        match result? {
            FrameResult::Return(v) => {
                if v.is_object() {
                    return Ok(v);
                }
                if let Some(this) = this {
                    return Ok(Value::Object(this));
                }
                // derived: this must have been bound by super()
                env_ops::get_this_binding(self, func_env)
            }
            FrameResult::Suspend { .. } => {
                let err = self.make_error(
                    core_types::ErrorKind::InternalError,
                    "suspension outside a coroutine",
                );
                Err(Thrown(err))
            }
        }
    }

    /// Build the activation: function environment with `this`,
    /// scope-group seeding and declared-function instantiation.
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn prepare_context(
        &mut self,
        func_obj: ObjectId,
        data: &ScriptFunctionData,
        this: Value,
        args: Vec<Value>,
        new_target: Value,
        construct_derived: Option<bool>,
    ) -> Completion<ExecutionContext> {
        let info = &data.module.functions[data.func_index as usize];
        let flags = info.flags;
        let this_binding = if flags.has(FunctionFlags::ARROW) {
            ThisBinding::Lexical
        } else if construct_derived == Some(true) {
            ThisBinding::Uninitialized
        } else {
            let coerced = match this {
                Value::Undefined | Value::Null if !flags.has(FunctionFlags::STRICT) => {
                    Value::Object(self.realm.global_object)
                }
                other => other,
            };
            ThisBinding::Initialized(coerced)
        };
        let env = self.heap.alloc_env(EnvRecord::function(
            data.closure_env,
            this_binding,
            data.home_object,
            new_target,
        ));
        self.seed_scope_group(env, &data.module, info.scope_group)?;

        let mut ctx = ExecutionContext::new(
            data.module.clone(),
            data.func_index,
            Some(func_obj),
            env,
        );
        ctx.args = args;
        ctx.priv_env = data.priv_env.clone();
        if let Some(p) = &data.priv_env {
            ctx.priv_stack.push(p.clone());
        }

        let func_group = info.func_group;
        if func_group != NO_GROUP {
            self.instantiate_function_group(&data.module, func_group, env, &ctx.priv_env)?;
        }
        Ok(ctx)
    }

    /// Seed a declarative-flavoured environment from a binding group.
    pub(crate) fn seed_scope_group(
        &mut self,
        env: EnvId,
        module: &Rc<BytecodeModule>,
        group: u16,
    ) -> Completion<()> {
        if group == NO_GROUP {
            return Ok(());
        }
        let g = module.binding_groups[group as usize];
        for i in g.start..(g.start + g.len) {
            let row = module.bindings[i as usize];
            let name = &module.binding_refs[row.bref as usize].name;
            let record = self.heap.env_mut(env);
            let Some(decl) = record.decl_mut() else {
                continue;
            };
            let slot = if row.flags.has(bytecode_system::BindingFlags::VAR) {
                BindingSlot::var()
            } else if row.flags.has(bytecode_system::BindingFlags::CONST) {
                BindingSlot::immutable(true)
            } else {
                BindingSlot::mutable()
            };
            decl.bindings.insert(name.clone(), slot);
        }
        Ok(())
    }

    /// Create the closures of a function-declaration group and bind
    /// them in `env`.
    pub(crate) fn instantiate_function_group(
        &mut self,
        module: &Rc<BytecodeModule>,
        group: u16,
        env: EnvId,
        priv_env: &Option<PrivEnvRef>,
    ) -> Completion<()> {
        let g = module.func_groups[group as usize];
        for i in g.start..(g.start + g.len) {
            let row = module.func_decls[i as usize];
            let closure = self.create_closure(module, row.func, env, priv_env.clone());
            let name = module.binding_refs[row.bref as usize].name.clone();
            env_ops::initialize_binding(self, env, &name, Value::Object(closure))?;
        }
        Ok(())
    }

    /// Allocate a function object for a compiled function, capturing
    /// the current lexical and private environments.
    pub(crate) fn create_closure(
        &mut self,
        module: &Rc<BytecodeModule>,
        func_index: u16,
        lex_env: EnvId,
        priv_env: Option<PrivEnvRef>,
    ) -> ObjectId {
        let info = &module.functions[func_index as usize];
        let flags = info.flags;
        let name = info.name.clone();
        let param_count = info.param_count;

        let func_proto = self.realm.intrinsics.function_prototype;
        let func = self.heap.alloc_object(JsObject::with_kind(
            Some(func_proto),
            ObjectKind::Function(ScriptFunctionData {
                module: module.clone(),
                func_index,
                closure_env: lex_env,
                home_object: None,
                priv_env,
            }),
        ));

        let non_enum = |value: Value| Property {
            value: PropertyValue::Data {
                value,
                writable: false,
            },
            enumerable: false,
            configurable: true,
        };
        let name_value = Value::String(JsString::from_str(&name));
        self.heap
            .object_mut(func)
            .set_property(PropertyKey::from_str("name"), non_enum(name_value));
        self.heap.object_mut(func).set_property(
            PropertyKey::from_str("length"),
            non_enum(Value::Number(param_count as f64)),
        );

        // constructable functions get a prototype object eagerly;
        // generators get theirs wired to the generator prototypes
        if flags.has(FunctionFlags::GENERATOR) {
            let proto_proto = if flags.has(FunctionFlags::ASYNC) {
                self.realm.intrinsics.async_generator_prototype
            } else {
                self.realm.intrinsics.generator_prototype
            };
            let proto = self
                .heap
                .alloc_object(JsObject::ordinary(Some(proto_proto)));
            self.heap.object_mut(func).set_property(
                PropertyKey::from_str("prototype"),
                Property {
                    value: PropertyValue::Data {
                        value: Value::Object(proto),
                        writable: true,
                    },
                    enumerable: false,
                    configurable: false,
                },
            );
        } else if !flags.has(FunctionFlags::ARROW)
            && !flags.has(FunctionFlags::METHOD)
            && !flags.has(FunctionFlags::ASYNC)
            || flags.has(FunctionFlags::CLASS_CTOR)
        {
            let obj_proto = self.realm.intrinsics.object_prototype;
            let proto = self.heap.alloc_object(JsObject::ordinary(Some(obj_proto)));
            self.heap.object_mut(proto).set_property(
                PropertyKey::from_str("constructor"),
                Property::method(Value::Object(func)),
            );
            self.heap.object_mut(func).set_property(
                PropertyKey::from_str("prototype"),
                Property {
                    value: PropertyValue::Data {
                        value: Value::Object(proto),
                        writable: !flags.has(FunctionFlags::CLASS_CTOR),
                    },
                    enumerable: false,
                    configurable: false,
                },
            );
        }
        func
    }

    /// Materialize an argument slice as an array object.
    pub(crate) fn values_to_array(&mut self, values: &[Value]) -> Value {
        let arr = om::array_create(self, values.len() as u32);
        for (i, v) in values.iter().enumerate() {
            self.heap
                .object_mut(arr)
                .set_property(PropertyKey::Index(i as u32), Property::data(v.clone()));
        }
        Value::Object(arr)
    }

    /// Bind `this` in the nearest function environment after a
    /// `super()` call.
    pub(crate) fn bind_this_after_super(&mut self, value: Value) -> Completion<()> {
        let mut cur = Some(self.top().lex_env);
        while let Some(env) = cur {
            let state = match &self.heap.env(env).kind {
                EnvKind::Function(f) => match f.this {
                    ThisBinding::Lexical => ThisState::Skip,
                    ThisBinding::Uninitialized => ThisState::Bindable,
                    ThisBinding::Initialized(_) => ThisState::Bound,
                },
                _ => ThisState::Skip,
            };
            match state {
                ThisState::Bindable => {
                    if let EnvKind::Function(f) = &mut self.heap.env_mut(env).kind {
                        f.this = ThisBinding::Initialized(value);
                    }
                    return Ok(());
                }
                ThisState::Bound => {
                    return self.reference_error("super constructor may only be called once");
                }
                ThisState::Skip => {}
            }
            cur = self.heap.env(env).outer;
        }
        self.reference_error("unexpected super call")
    }
}

enum Callee {
    NotCallable,
    Builtin(memory_manager::NativeFn),
    Bound(ObjectId, Value, Vec<Value>),
    Proxy(Option<ObjectId>, Option<ObjectId>),
    Script(ScriptFunctionData),
}

enum ThisState {
    Skip,
    Bindable,
    Bound,
}
