//! The fetch-decode-dispatch loop.
//!
//! Executes instructions straight from the module byte buffer,
//! advancing the instruction pointer by each instruction's width.
//! Exceptions unwind through the try-region table; `yield`/`await`
//! freeze the frame and hand it back to the coroutine layer.

use bytecode_system::{decode_instr, FunctionFlags, Instr, TryRegionKind};
use core_types::{
    Completion, ErrorKind, JsString, ObjectId, PrivateName, PropertyKey, Thrown, Value,
};
use environments as env_ops;
use memory_manager::{
    Agent, AgentErrors, EnvRecord, JsObject, KeyListData, ObjectKind, PendingCompletion, PrivEnv, Property,
    PropertyValue,
};
use object_model as om;

use crate::cache::CacheSlot;
use crate::vm::Vm;

/// How a frame finished.
pub(crate) enum FrameResult {
    /// Normal or abrupt return with a value.
    Return(Value),
    /// The frame parked itself at a suspension point.
    Suspend {
        /// yield vs await.
        kind: SuspendKind,
        /// Yielded value or awaited operand.
        value: Value,
    },
}

/// The two suspension flavours; `async_for_step` behaves as an await.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SuspendKind {
    Yield,
    Await,
}

impl Vm {
    fn reg(&self, r: bytecode_system::Reg) -> Value {
        self.top().registers[r.0 as usize].clone()
    }

    fn set_reg(&mut self, r: bytecode_system::Reg, v: Value) {
        self.top_mut().registers[r.0 as usize] = v;
    }

    fn jump(&mut self, next: usize, off: i16) {
        self.top_mut().ip = (next as i64 + off as i64) as usize;
    }

    /// Route a thrown value through the try-region table. `Ok` means
    /// a handler in this frame took it; `Err` propagates to the
    /// caller.
    pub(crate) fn unwind_top(&mut self, thrown: Value, probe_ip: usize) -> Completion<()> {
        let module = self.top().module.clone();
        match module.find_region(probe_ip as u32, true, None) {
            Some((_, region)) => {
                let region = *region;
                self.truncate_to_region(region.scope_depth, region.priv_depth);
                let cx = self.top_mut();
                match region.kind {
                    TryRegionKind::Catch(reg) => {
                        cx.pending = None;
                        cx.registers[reg.0 as usize] = thrown;
                    }
                    TryRegionKind::Finally => {
                        cx.pending = Some(PendingCompletion::Throw(thrown));
                    }
                }
                cx.ip = region.handler as usize;
                Ok(())
            }
            None => Err(Thrown(thrown)),
        }
    }

    fn truncate_to_region(&mut self, scope_depth: u16, priv_depth: u16) {
        let priv_base = self.priv_base();
        let cx = self.top_mut();
        cx.scope_stack.truncate(scope_depth as usize);
        cx.lex_env = cx.scope_stack.last().copied().unwrap_or(cx.var_env);
        cx.priv_stack.truncate(priv_base + priv_depth as usize);
        cx.priv_env = cx.priv_stack.last().cloned();
    }

    /// Private environments captured at activation (below any pushed
    /// by the running code).
    pub(crate) fn priv_base(&self) -> usize {
        match self.top().function {
            Some(f) => match &self.heap.object(f).kind {
                ObjectKind::Function(data) => usize::from(data.priv_env.is_some()),
                _ => 0,
            },
            None => 0,
        }
    }

    fn frame_try<T>(&mut self, ip: usize, r: Completion<T>) -> Completion<Option<T>> {
        match r {
            Ok(v) => Ok(Some(v)),
            Err(t) => {
                self.unwind_top(t.into_value(), ip)?;
                Ok(None)
            }
        }
    }

    /// Run the top context to completion or suspension.
    pub(crate) fn run_frame(&mut self) -> Completion<FrameResult> {
        let module = self.top().module.clone();
        let strict = self.top().info().flags.has(FunctionFlags::STRICT);

        macro_rules! attempt {
            ($ip:expr, $r:expr) => {{
                let outcome = $r;
                match self.frame_try($ip, outcome)? {
                    Some(v) => v,
                    None => continue,
                }
            }};
        }

        loop {
            if let Err(t) = self.safe_point() {
                let ip = self.top().ip;
                attempt!(ip, Err::<(), _>(t));
            }
            let ip = self.top().ip;
            let Some((instr, next)) = decode_instr(&module.code, ip) else {
                let err = self.make_error(ErrorKind::InternalError, "corrupt bytecode");
                self.unwind_top(err, ip)?;
                continue;
            };
            self.top_mut().ip = next;

            match instr {
                // ---- constants and moves ----
                Instr::LoadConst { dst, idx } => {
                    let v = match &module.constants[idx as usize] {
                        bytecode_system::Constant::Number(n) => Value::Number(*n),
                        bytecode_system::Constant::String(s) => {
                            Value::String(self.heap.intern(s))
                        }
                        bytecode_system::Constant::BigInt(b) => {
                            Value::BigInt(std::rc::Rc::new(b.clone()))
                        }
                    };
                    self.set_reg(dst, v);
                }
                Instr::LoadUndefined { dst } => self.set_reg(dst, Value::Undefined),
                Instr::LoadNull { dst } => self.set_reg(dst, Value::Null),
                Instr::LoadTrue { dst } => self.set_reg(dst, Value::Boolean(true)),
                Instr::LoadFalse { dst } => self.set_reg(dst, Value::Boolean(false)),
                Instr::LoadSmallInt { dst, value } => {
                    self.set_reg(dst, Value::Number(value as f64))
                }
                Instr::Move { dst, src } => {
                    let v = self.reg(src);
                    self.set_reg(dst, v);
                }

                // ---- bindings and scopes ----
                Instr::LoadBinding { dst, bref } => {
                    let name = module.binding_refs[bref as usize].name.clone();
                    let lex = self.top().lex_env;
                    let v = attempt!(ip, self.lookup_binding(lex, &name));
                    self.set_reg(dst, v);
                }
                Instr::StoreBinding { bref, src } => {
                    let name = module.binding_refs[bref as usize].name.clone();
                    let value = self.reg(src);
                    let lex = self.top().lex_env;
                    attempt!(ip, self.store_binding(lex, &name, value, strict));
                }
                Instr::InitBinding { bref, src } => {
                    let name = module.binding_refs[bref as usize].name.clone();
                    let value = self.reg(src);
                    let lex = self.top().lex_env;
                    attempt!(ip, env_ops::initialize_binding(self, lex, &name, value));
                }
                Instr::DeleteBinding { dst, bref } => {
                    let name = module.binding_refs[bref as usize].name.clone();
                    let lex = self.top().lex_env;
                    let found = attempt!(ip, env_ops::resolve_binding(self, lex, &name));
                    let deleted = match found {
                        Some(env) => attempt!(ip, env_ops::delete_binding(self, env, &name)),
                        None => true,
                    };
                    self.set_reg(dst, Value::Boolean(deleted));
                }
                Instr::TypeofBinding { dst, bref } => {
                    let name = module.binding_refs[bref as usize].name.clone();
                    let lex = self.top().lex_env;
                    let found = attempt!(ip, env_ops::resolve_binding(self, lex, &name));
                    let text = match found {
                        None => "undefined",
                        Some(env) => {
                            let v =
                                attempt!(ip, env_ops::get_binding_value(self, env, &name, strict));
                            om::type_of_value(self, &v)
                        }
                    };
                    self.set_reg(dst, Value::string(text));
                }
                Instr::PushScope { group } => {
                    attempt!(ip, self.push_scope(group));
                }
                Instr::PopScope {} => {
                    let cx = self.top_mut();
                    cx.scope_stack.pop();
                    cx.lex_env = cx.scope_stack.last().copied().unwrap_or(cx.var_env);
                }
                Instr::InstantiateFunctions { group } => {
                    let lex = self.top().lex_env;
                    let priv_env = self.top().priv_env.clone();
                    attempt!(
                        ip,
                        self.instantiate_function_group(&module, group, lex, &priv_env)
                    );
                }
                Instr::LoadThis { dst } => {
                    let lex = self.top().lex_env;
                    let v = attempt!(ip, env_ops::get_this_binding(self, lex));
                    self.set_reg(dst, v);
                }
                Instr::LoadNewTarget { dst } => {
                    let lex = self.top().lex_env;
                    let v = env_ops::get_new_target(self, lex);
                    self.set_reg(dst, v);
                }

                // ---- properties ----
                Instr::GetProp { dst, obj, pref } => {
                    let base = self.reg(obj);
                    let v = attempt!(ip, self.get_prop_cached(&module, pref, &base));
                    self.set_reg(dst, v);
                }
                Instr::SetProp { obj, pref, src } => {
                    let base = self.reg(obj);
                    let value = self.reg(src);
                    let key = self.caches.key_for(&module, pref);
                    attempt!(ip, self.set_property_value(&base, &key, value, strict));
                }
                Instr::DefineProp { obj, pref, src } => {
                    let base = self.reg(obj);
                    let value = self.reg(src);
                    let key = self.caches.key_for(&module, pref);
                    let id = base.as_object().expect("literal target is an object");
                    attempt!(ip, om::create_data_property(self, id, &key, value));
                }
                Instr::GetElem { dst, obj, key } => {
                    let base = self.reg(obj);
                    let key_value = self.reg(key);
                    let key = attempt!(ip, om::to_property_key(self, &key_value));
                    let v = attempt!(ip, om::get_v(self, &base, &key));
                    self.set_reg(dst, v);
                }
                Instr::SetElem { obj, key, src } => {
                    let base = self.reg(obj);
                    let key_value = self.reg(key);
                    let value = self.reg(src);
                    let key = attempt!(ip, om::to_property_key(self, &key_value));
                    attempt!(ip, self.set_property_value(&base, &key, value, strict));
                }
                Instr::DefineElem { obj, key, src } => {
                    let base = self.reg(obj);
                    let key_value = self.reg(key);
                    let value = self.reg(src);
                    let key = attempt!(ip, om::to_property_key(self, &key_value));
                    let id = base.as_object().expect("literal target is an object");
                    attempt!(ip, om::create_data_property(self, id, &key, value));
                }
                Instr::DeleteProp { dst, obj, pref } => {
                    let base = self.reg(obj);
                    let key = self.caches.key_for(&module, pref);
                    let ok = attempt!(ip, self.delete_property_value(&base, &key, strict));
                    self.set_reg(dst, Value::Boolean(ok));
                }
                Instr::DeleteElem { dst, obj, key } => {
                    let base = self.reg(obj);
                    let key_value = self.reg(key);
                    let key = attempt!(ip, om::to_property_key(self, &key_value));
                    let ok = attempt!(ip, self.delete_property_value(&base, &key, strict));
                    self.set_reg(dst, Value::Boolean(ok));
                }
                Instr::GetPrivate { dst, obj, pname } => {
                    let base = self.reg(obj);
                    let v = attempt!(ip, self.get_private(&base, pname));
                    self.set_reg(dst, v);
                }
                Instr::SetPrivate { obj, pname, src } => {
                    let base = self.reg(obj);
                    let value = self.reg(src);
                    attempt!(ip, self.set_private(&base, pname, value));
                }
                Instr::DefinePrivateField { obj, pname, src } => {
                    let base = self.reg(obj);
                    let value = self.reg(src);
                    attempt!(ip, self.define_private_field(&base, pname, value));
                }
                Instr::HasPrivate { dst, obj, pname } => {
                    let base = self.reg(obj);
                    let name = attempt!(ip, self.resolve_private_name(pname));
                    let has = base
                        .as_object()
                        .map(|id| self.heap.object(id).private_member(&name).is_some())
                        .unwrap_or(false);
                    self.set_reg(dst, Value::Boolean(has));
                }
                Instr::DefineMethod {
                    obj,
                    key,
                    func,
                    kind,
                } => {
                    let target = self.reg(obj);
                    let key_value = self.reg(key);
                    let method = self.reg(func);
                    attempt!(ip, self.define_method(&target, &key_value, &method, kind));
                }
                Instr::DefinePrivateMethod {
                    obj,
                    pname,
                    func,
                    kind,
                } => {
                    let target = self.reg(obj);
                    let method = self.reg(func);
                    attempt!(ip, self.define_private_method(&target, pname, &method, kind));
                }

                // ---- calls ----
                Instr::Call {
                    dst,
                    func,
                    this,
                    argv,
                    argc,
                } => {
                    let callee = self.reg(func);
                    let this_value = self.reg(this);
                    let args = self.gather_args(argv, argc);
                    let v = attempt!(ip, self.execute_call(callee, this_value, &args));
                    self.set_reg(dst, v);
                }
                Instr::CallVarargs {
                    dst,
                    func,
                    this,
                    args,
                } => {
                    let callee = self.reg(func);
                    let this_value = self.reg(this);
                    let arg_array = self.reg(args);
                    let args = attempt!(ip, self.array_to_values(&arg_array));
                    let v = attempt!(ip, self.execute_call(callee, this_value, &args));
                    self.set_reg(dst, v);
                }
                Instr::TailCall {
                    func,
                    this,
                    argv,
                    argc,
                } => {
                    let callee = self.reg(func);
                    let this_value = self.reg(this);
                    let args = self.gather_args(argv, argc);
                    let v = attempt!(ip, self.execute_call(callee, this_value, &args));
                    return Ok(FrameResult::Return(v));
                }
                Instr::Construct {
                    dst,
                    func,
                    argv,
                    argc,
                } => {
                    let callee = self.reg(func);
                    let args = self.gather_args(argv, argc);
                    let v = attempt!(
                        ip,
                        self.execute_construct(callee.clone(), &args, callee)
                    );
                    self.set_reg(dst, v);
                }
                Instr::ConstructVarargs { dst, func, args } => {
                    let callee = self.reg(func);
                    let arg_array = self.reg(args);
                    let args = attempt!(ip, self.array_to_values(&arg_array));
                    let v = attempt!(
                        ip,
                        self.execute_construct(callee.clone(), &args, callee)
                    );
                    self.set_reg(dst, v);
                }
                Instr::SuperCall { dst, argv, argc } => {
                    let args = self.gather_args(argv, argc);
                    let v = attempt!(ip, self.super_call(&args));
                    self.set_reg(dst, v);
                }
                Instr::GetSuperProp { dst, key } => {
                    let key_value = self.reg(key);
                    let v = attempt!(ip, self.get_super_property(&key_value));
                    self.set_reg(dst, v);
                }
                Instr::Return { src } => {
                    let v = self.reg(src);
                    return Ok(FrameResult::Return(v));
                }

                // ---- operators ----
                Instr::Add { dst, lhs, rhs } => {
                    let (a, b) = (self.reg(lhs), self.reg(rhs));
                    let v = attempt!(ip, om::add_values(self, &a, &b));
                    self.set_reg(dst, v);
                }
                Instr::Sub { dst, lhs, rhs }
                | Instr::Mul { dst, lhs, rhs }
                | Instr::Div { dst, lhs, rhs }
                | Instr::Mod { dst, lhs, rhs }
                | Instr::Exp { dst, lhs, rhs }
                | Instr::BitAnd { dst, lhs, rhs }
                | Instr::BitOr { dst, lhs, rhs }
                | Instr::BitXor { dst, lhs, rhs }
                | Instr::Shl { dst, lhs, rhs }
                | Instr::Shr { dst, lhs, rhs }
                | Instr::UShr { dst, lhs, rhs } => {
                    let op = numeric_op_for(&instr);
                    let (a, b) = (self.reg(lhs), self.reg(rhs));
                    let v = attempt!(ip, om::numeric_binary_op(self, op, &a, &b));
                    self.set_reg(dst, v);
                }
                Instr::Eq { dst, lhs, rhs } => {
                    let (a, b) = (self.reg(lhs), self.reg(rhs));
                    let v = attempt!(ip, om::equals_abstract(self, &a, &b));
                    self.set_reg(dst, Value::Boolean(v));
                }
                Instr::Ne { dst, lhs, rhs } => {
                    let (a, b) = (self.reg(lhs), self.reg(rhs));
                    let v = attempt!(ip, om::equals_abstract(self, &a, &b));
                    self.set_reg(dst, Value::Boolean(!v));
                }
                Instr::StrictEq { dst, lhs, rhs } => {
                    let v = self.reg(lhs).strict_equals(&self.reg(rhs));
                    self.set_reg(dst, Value::Boolean(v));
                }
                Instr::StrictNe { dst, lhs, rhs } => {
                    let v = self.reg(lhs).strict_equals(&self.reg(rhs));
                    self.set_reg(dst, Value::Boolean(!v));
                }
                Instr::Lt { dst, lhs, rhs } => {
                    let (a, b) = (self.reg(lhs), self.reg(rhs));
                    let v = attempt!(ip, om::less_than(self, &a, &b));
                    self.set_reg(dst, Value::Boolean(v == Some(true)));
                }
                Instr::Gt { dst, lhs, rhs } => {
                    let (a, b) = (self.reg(lhs), self.reg(rhs));
                    let v = attempt!(ip, om::less_than(self, &b, &a));
                    self.set_reg(dst, Value::Boolean(v == Some(true)));
                }
                Instr::Le { dst, lhs, rhs } => {
                    let (a, b) = (self.reg(lhs), self.reg(rhs));
                    let v = attempt!(ip, om::less_than(self, &b, &a));
                    self.set_reg(dst, Value::Boolean(v == Some(false)));
                }
                Instr::Ge { dst, lhs, rhs } => {
                    let (a, b) = (self.reg(lhs), self.reg(rhs));
                    let v = attempt!(ip, om::less_than(self, &a, &b));
                    self.set_reg(dst, Value::Boolean(v == Some(false)));
                }
                Instr::InstanceOf { dst, lhs, rhs } => {
                    let (a, b) = (self.reg(lhs), self.reg(rhs));
                    let v = attempt!(ip, om::instance_of(self, &a, &b));
                    self.set_reg(dst, Value::Boolean(v));
                }
                Instr::In { dst, key, obj } => {
                    let key_value = self.reg(key);
                    let base = self.reg(obj);
                    let Some(id) = base.as_object() else {
                        attempt!(
                            ip,
                            self.type_error::<()>("cannot use 'in' on a non-object")
                        );
                        continue;
                    };
                    let pkey = attempt!(ip, om::to_property_key(self, &key_value));
                    let v = attempt!(ip, om::has_property(self, id, &pkey));
                    self.set_reg(dst, Value::Boolean(v));
                }
                Instr::Neg { dst, src } => {
                    let a = self.reg(src);
                    let v = attempt!(ip, om::numeric_negate(self, &a));
                    self.set_reg(dst, v);
                }
                Instr::ToNumber { dst, src } => {
                    let a = self.reg(src);
                    let v = attempt!(ip, om::to_number(self, &a));
                    self.set_reg(dst, Value::Number(v));
                }
                Instr::ToNumeric { dst, src } => {
                    let a = self.reg(src);
                    let v = attempt!(ip, om::to_numeric(self, &a));
                    self.set_reg(dst, v.to_value());
                }
                Instr::BitNot { dst, src } => {
                    let a = self.reg(src);
                    let v = attempt!(ip, om::numeric_bit_not(self, &a));
                    self.set_reg(dst, v);
                }
                Instr::Not { dst, src } => {
                    let a = self.reg(src);
                    self.set_reg(dst, Value::Boolean(!a.is_truthy()));
                }
                Instr::TypeOf { dst, src } => {
                    let a = self.reg(src);
                    let text = om::type_of_value(self, &a);
                    self.set_reg(dst, Value::string(text));
                }
                Instr::Inc { dst, src } => {
                    let a = self.reg(src);
                    let v = attempt!(ip, om::numeric_increment(self, &a, 1));
                    self.set_reg(dst, v);
                }
                Instr::Dec { dst, src } => {
                    let a = self.reg(src);
                    let v = attempt!(ip, om::numeric_increment(self, &a, -1));
                    self.set_reg(dst, v);
                }

                // ---- branches ----
                Instr::Jump { off } => self.jump(next, off),
                Instr::JumpIfTrue { cond, off } => {
                    if self.reg(cond).is_truthy() {
                        self.jump(next, off);
                    }
                }
                Instr::JumpIfFalse { cond, off } => {
                    if !self.reg(cond).is_truthy() {
                        self.jump(next, off);
                    }
                }
                Instr::JumpIfUndefined { src, off } => {
                    if self.reg(src).is_undefined() {
                        self.jump(next, off);
                    }
                }
                Instr::JumpIfNullish { src, off } => {
                    if self.reg(src).is_nullish() {
                        self.jump(next, off);
                    }
                }

                // ---- literals ----
                Instr::NewObject { dst } => {
                    let proto = self.realm.intrinsics.object_prototype;
                    let id = self.heap.alloc_object(JsObject::ordinary(Some(proto)));
                    self.set_reg(dst, Value::Object(id));
                }
                Instr::NewArray { dst } => {
                    let id = om::array_create(self, 0);
                    self.set_reg(dst, Value::Object(id));
                }
                Instr::ArrayPush { arr, src } => {
                    let target = self.reg(arr);
                    let value = self.reg(src);
                    attempt!(ip, self.array_append(&target, value));
                }
                Instr::ArrayHole { arr } => {
                    let target = self.reg(arr);
                    if let Some(id) = target.as_object() {
                        if let ObjectKind::Array { length, .. } =
                            &mut self.heap.object_mut(id).kind
                        {
                            *length += 1;
                        }
                    }
                }
                Instr::ArraySpread { arr, src } => {
                    let target = self.reg(arr);
                    let source = self.reg(src);
                    attempt!(ip, self.array_spread(&target, &source));
                }
                Instr::CopyDataProps {
                    obj,
                    src,
                    excl_start,
                    excl_count,
                } => {
                    let target = self.reg(obj);
                    let source = self.reg(src);
                    let mut excluded = Vec::with_capacity(excl_count as usize);
                    for i in 0..excl_count {
                        let kv = self.reg(bytecode_system::Reg(excl_start.0 + i));
                        let k = attempt!(ip, om::to_property_key(self, &kv));
                        excluded.push(k);
                    }
                    attempt!(ip, self.copy_data_properties(&target, &source, &excluded));
                }
                Instr::NewClosure { dst, func } => {
                    let lex = self.top().lex_env;
                    let priv_env = self.top().priv_env.clone();
                    let id = self.create_closure(&module, func, lex, priv_env);
                    self.set_reg(dst, Value::Object(id));
                }

                // ---- iteration ----
                Instr::GetIterator { dst, src } => {
                    let v = self.reg(src);
                    let record = attempt!(ip, om::get_iterator(self, &v, false));
                    self.set_reg(dst, record.iterator);
                }
                Instr::GetAsyncIterator { dst, src } => {
                    let v = self.reg(src);
                    let record = attempt!(ip, om::get_iterator(self, &v, true));
                    self.set_reg(dst, record.iterator);
                }
                Instr::IteratorNext { dst, iter } => {
                    let iterator = self.reg(iter);
                    let v = attempt!(ip, self.iterator_step(&iterator));
                    self.set_reg(dst, v);
                }
                Instr::ForOfNext { dst, iter, off } => {
                    let iterator = self.reg(iter);
                    let result = attempt!(ip, self.iterator_step(&iterator));
                    let done = attempt!(
                        ip,
                        om::get_v(self, &result, &PropertyKey::from_str("done"))
                    );
                    if done.is_truthy() {
                        self.jump(next, off);
                    } else {
                        let value = attempt!(
                            ip,
                            om::get_v(self, &result, &PropertyKey::from_str("value"))
                        );
                        self.set_reg(dst, value);
                    }
                }
                Instr::IteratorClose { iter } => {
                    let iterator = self.reg(iter);
                    let record = om::IteratorRecord {
                        iterator,
                        next_method: Value::Undefined,
                    };
                    om::iterator_close(self, &record);
                }
                Instr::ForInInit { dst, src } => {
                    let v = self.reg(src);
                    let id = attempt!(ip, self.for_in_init(&v));
                    self.set_reg(dst, Value::Object(id));
                }
                Instr::ForInNext { dst, iter, off } => {
                    let iterator = self.reg(iter);
                    match attempt!(ip, self.for_in_next(&iterator)) {
                        Some(key) => self.set_reg(dst, key),
                        None => self.jump(next, off),
                    }
                }

                // ---- exceptions ----
                Instr::Throw { src } => {
                    let v = self.reg(src);
                    attempt!(ip, Err::<(), _>(Thrown(v)));
                }
                Instr::FinallyEnd {} => {
                    match self.top_mut().pending.take() {
                        None => {}
                        Some(PendingCompletion::Throw(v)) => {
                            attempt!(ip, Err::<(), _>(Thrown(v)));
                        }
                        Some(PendingCompletion::Return(v)) => {
                            match module.find_region(ip as u32, false, None) {
                                Some((_, region)) => {
                                    let region = *region;
                                    self.truncate_to_region(
                                        region.scope_depth,
                                        region.priv_depth,
                                    );
                                    let cx = self.top_mut();
                                    cx.pending = Some(PendingCompletion::Return(v));
                                    cx.ip = region.handler as usize;
                                }
                                None => return Ok(FrameResult::Return(v)),
                            }
                        }
                    }
                }

                // ---- suspension ----
                Instr::Yield { dst, src } => {
                    let value = self.reg(src);
                    let cx = self.top_mut();
                    cx.resume_reg = Some(dst.0);
                    cx.suspend_ip = ip;
                    return Ok(FrameResult::Suspend {
                        kind: SuspendKind::Yield,
                        value,
                    });
                }
                Instr::Await { dst, src } | Instr::AsyncForStep { dst, src } => {
                    let value = self.reg(src);
                    let cx = self.top_mut();
                    cx.resume_reg = Some(dst.0);
                    cx.suspend_ip = ip;
                    return Ok(FrameResult::Suspend {
                        kind: SuspendKind::Await,
                        value,
                    });
                }

                // ---- classes ----
                Instr::PushPrivateEnv { penv } => {
                    let info = &module.private_envs[penv as usize];
                    let mut names = std::collections::HashMap::new();
                    for idx in &info.names {
                        let text = &module.private_names[*idx as usize];
                        let name = PrivateName::new(JsString::new(format!("#{}", text)));
                        names.insert(*idx, name);
                    }
                    let cx = self.top_mut();
                    let env = std::rc::Rc::new(PrivEnv {
                        parent: cx.priv_env.clone(),
                        names,
                    });
                    cx.priv_stack.push(env.clone());
                    cx.priv_env = Some(env);
                }
                Instr::PopPrivateEnv {} => {
                    let cx = self.top_mut();
                    cx.priv_stack.pop();
                    cx.priv_env = cx.priv_stack.last().cloned();
                }
                Instr::SetPrototype { obj, proto } => {
                    let target = self.reg(obj);
                    let proto_value = self.reg(proto);
                    if let Some(id) = target.as_object() {
                        let proto = proto_value.as_object();
                        let o = self.heap.object_mut(id);
                        o.prototype = proto;
                        o.version = o.version.wrapping_add(1);
                    }
                }
                Instr::SetHomeObject { func, obj } => {
                    let func_value = self.reg(func);
                    let home = self.reg(obj).as_object();
                    if let Some(fid) = func_value.as_object() {
                        if let ObjectKind::Function(data) = &mut self.heap.object_mut(fid).kind {
                            data.home_object = home;
                        }
                    }
                }

                // ---- arguments ----
                Instr::Arguments { dst } => {
                    let id = self.make_arguments_object();
                    self.set_reg(dst, Value::Object(id));
                }
                Instr::LoadArg { dst, index } => {
                    let v = self
                        .top()
                        .args
                        .get(index as usize)
                        .cloned()
                        .unwrap_or(Value::Undefined);
                    self.set_reg(dst, v);
                }
                Instr::RestArgs { dst, index } => {
                    let rest: Vec<Value> = self
                        .top()
                        .args
                        .iter()
                        .skip(index as usize)
                        .cloned()
                        .collect();
                    let arr = self.values_to_array(&rest);
                    self.set_reg(dst, arr);
                }

                // ---- misc ----
                Instr::Eval { dst, src } => {
                    let v = self.reg(src);
                    let source = v.as_string().map(|s| s.as_str().to_string());
                    let result = match source {
                        Some(source) => attempt!(ip, self.eval_source(&source)),
                        None => v,
                    };
                    self.set_reg(dst, result);
                }
                Instr::Debugger {} => {}
            }
        }
    }

    // ---- instruction helpers ----

    fn lookup_binding(&mut self, lex: core_types::EnvId, name: &str) -> Completion<Value> {
        match env_ops::resolve_binding(self, lex, name)? {
            Some(env) => env_ops::get_binding_value(self, env, name, true),
            None => {
                let msg = format!("{} is not defined", name);
                self.reference_error(&msg)
            }
        }
    }

    fn store_binding(
        &mut self,
        lex: core_types::EnvId,
        name: &str,
        value: Value,
        strict: bool,
    ) -> Completion<()> {
        match env_ops::resolve_binding(self, lex, name)? {
            Some(env) => env_ops::set_mutable_binding(self, env, name, value, strict),
            None if strict => {
                let msg = format!("{} is not defined", name);
                self.reference_error(&msg)
            }
            None => {
                let global = self.realm.global_object;
                let receiver = Value::Object(global);
                om::set(self, global, &PropertyKey::from_str(name), value, &receiver)?;
                Ok(())
            }
        }
    }

    fn push_scope(&mut self, group: u16) -> Completion<()> {
        let module = self.top().module.clone();
        let outer = self.top().lex_env;
        let g = module.binding_groups[group as usize];

        // inherit-flagged rows read their seed before the new scope
        // shadows them
        let mut seeds = Vec::new();
        for i in g.start..(g.start + g.len) {
            let row = module.bindings[i as usize];
            if row.flags.has(bytecode_system::BindingFlags::INHERIT) {
                let name = module.binding_refs[row.bref as usize].name.clone();
                let v = self.lookup_binding(outer, &name)?;
                seeds.push((name, v));
            }
        }

        let env = self.heap.alloc_env(EnvRecord::declarative(Some(outer)));
        for i in g.start..(g.start + g.len) {
            let row = module.bindings[i as usize];
            let name = module.binding_refs[row.bref as usize].name.clone();
            if row.flags.has(bytecode_system::BindingFlags::INHERIT) {
                continue;
            }
            if row.flags.has(bytecode_system::BindingFlags::VAR) {
                env_ops::create_mutable_binding(self, env, &name, false)?;
                env_ops::initialize_binding(self, env, &name, Value::Undefined)?;
            } else if row.flags.has(bytecode_system::BindingFlags::CONST) {
                env_ops::create_immutable_binding(self, env, &name, true)?;
            } else {
                env_ops::create_mutable_binding(self, env, &name, false)?;
            }
        }
        for (name, v) in seeds {
            env_ops::create_mutable_binding(self, env, &name, false)?;
            env_ops::initialize_binding(self, env, &name, v)?;
        }

        let cx = self.top_mut();
        cx.scope_stack.push(env);
        cx.lex_env = env;
        Ok(())
    }

    fn gather_args(&self, argv: bytecode_system::Reg, argc: u8) -> Vec<Value> {
        let cx = self.top();
        (0..argc)
            .map(|i| cx.registers[argv.0 as usize + i as usize].clone())
            .collect()
    }

    pub(crate) fn array_to_values(&mut self, array: &Value) -> Completion<Vec<Value>> {
        let Some(id) = array.as_object() else {
            return self.type_error("expected an array of arguments");
        };
        let length = match &self.heap.object(id).kind {
            ObjectKind::Array { length, .. } => *length,
            ObjectKind::Arguments => self
                .heap
                .object(id)
                .elements
                .max_index()
                .map(|i| i + 1)
                .unwrap_or(0),
            _ => return self.type_error("expected an array of arguments"),
        };
        let mut out = Vec::with_capacity(length as usize);
        for i in 0..length {
            let v = om::get(self, id, &PropertyKey::Index(i), array)?;
            out.push(v);
        }
        Ok(out)
    }

    fn set_property_value(
        &mut self,
        base: &Value,
        key: &PropertyKey,
        value: Value,
        strict: bool,
    ) -> Completion<()> {
        match base {
            Value::Object(id) => {
                let ok = om::set(self, *id, key, value, base)?;
                if !ok && strict {
                    let msg = format!(
                        "cannot assign to read only property '{}'",
                        key.to_display_string()
                    );
                    return self.type_error(&msg);
                }
                Ok(())
            }
            Value::Undefined | Value::Null => {
                let msg = format!(
                    "cannot set properties of {} (setting '{}')",
                    base.type_of(),
                    key.to_display_string()
                );
                self.type_error(&msg)
            }
            _ if strict => self.type_error("cannot create property on a primitive value"),
            _ => Ok(()),
        }
    }

    fn delete_property_value(
        &mut self,
        base: &Value,
        key: &PropertyKey,
        strict: bool,
    ) -> Completion<bool> {
        match base {
            Value::Object(id) => {
                let ok = om::delete_property(self, *id, key)?;
                if !ok && strict {
                    let msg =
                        format!("cannot delete property '{}'", key.to_display_string());
                    return self.type_error(&msg);
                }
                Ok(ok)
            }
            Value::Undefined | Value::Null => {
                self.type_error("cannot convert undefined or null to object")
            }
            _ => Ok(true),
        }
    }

    /// Cached named-property read.
    fn get_prop_cached(
        &mut self,
        module: &std::rc::Rc<bytecode_system::BytecodeModule>,
        pref: u16,
        base: &Value,
    ) -> Completion<Value> {
        let (key, slot) = {
            let entry = self.caches.entry_mut(module, pref);
            (entry.key.clone(), entry.slot)
        };
        if let (Some(slot), Some(id)) = (slot, base.as_object()) {
            if slot.receiver == id {
                let receiver_ok = self.heap.object(id).version == slot.receiver_version;
                let holder_ok =
                    self.heap.object(slot.holder).version == slot.holder_version;
                if receiver_ok && holder_ok {
                    if let Some(p) = self.heap.object(slot.holder).own_property(&key) {
                        if let PropertyValue::Data { value, .. } = &p.value {
                            return Ok(value.clone());
                        }
                    }
                }
            }
        }
        let result = om::get_v(self, base, &key)?;
        if let Some(id) = base.as_object() {
            if let Some(slot) = self.resolve_cacheable(id, &key) {
                self.caches.entry_mut(module, pref).slot = Some(slot);
            }
        }
        Ok(result)
    }

    /// Find a plain data property along an exotic-free prototype walk
    /// for cache filling.
    fn resolve_cacheable(&self, receiver: ObjectId, key: &PropertyKey) -> Option<CacheSlot> {
        let mut cur = receiver;
        loop {
            let obj = self.heap.object(cur);
            match &obj.kind {
                ObjectKind::Proxy { .. } | ObjectKind::IntegerIndexed(_) => return None,
                ObjectKind::Array { .. } => {
                    if matches!(key, PropertyKey::String(s) if s.as_str() == "length") {
                        return None;
                    }
                }
                _ => {}
            }
            if let Some(p) = obj.own_property(key) {
                return match &p.value {
                    PropertyValue::Data { .. } => Some(CacheSlot {
                        receiver,
                        receiver_version: self.heap.object(receiver).version,
                        holder: cur,
                        holder_version: obj.version,
                    }),
                    PropertyValue::Accessor { .. } => None,
                };
            }
            match obj.prototype {
                Some(p) => cur = p,
                None => return None,
            }
        }
    }

    fn resolve_private_name(
        &mut self,
        index: u16,
    ) -> Completion<core_types::PrivateNameRef> {
        let found = self
            .top()
            .priv_env
            .as_ref()
            .and_then(|env| PrivEnv::resolve(env, index));
        match found {
            Some(name) => Ok(name),
            None => self.type_error("private name is not defined in this scope"),
        }
    }

    fn get_private(&mut self, base: &Value, pname: u16) -> Completion<Value> {
        let name = self.resolve_private_name(pname)?;
        let Some(id) = base.as_object() else {
            return self.type_error("cannot read private member of a non-object");
        };
        let member = self.heap.object(id).private_member(&name).cloned();
        match member {
            None => {
                let msg = format!(
                    "cannot read private member {} from an object whose class did not declare it",
                    name.description
                );
                self.type_error(&msg)
            }
            Some(p) => match p.value {
                PropertyValue::Data { value, .. } => Ok(value),
                PropertyValue::Accessor { get: Some(g), .. } => {
                    self.execute_call(Value::Object(g), base.clone(), &[])
                }
                PropertyValue::Accessor { get: None, .. } => {
                    self.type_error("private member has no getter")
                }
            },
        }
    }

    fn set_private(&mut self, base: &Value, pname: u16, value: Value) -> Completion<()> {
        let name = self.resolve_private_name(pname)?;
        let Some(id) = base.as_object() else {
            return self.type_error("cannot write private member of a non-object");
        };
        enum Route {
            Data,
            Setter(ObjectId),
            NoSetter,
            Method,
            Missing,
        }
        let route = match self.heap.object(id).private_member(&name) {
            None => Route::Missing,
            Some(p) => match &p.value {
                PropertyValue::Data { writable: true, .. } => Route::Data,
                PropertyValue::Data { writable: false, .. } => Route::Method,
                PropertyValue::Accessor { set: Some(s), .. } => Route::Setter(*s),
                PropertyValue::Accessor { set: None, .. } => Route::NoSetter,
            },
        };
        match route {
            Route::Missing => self.type_error(
                "cannot write private member to an object whose class did not declare it",
            ),
            Route::Method => self.type_error("cannot assign to a private method"),
            Route::NoSetter => self.type_error("private member has no setter"),
            Route::Setter(s) => {
                self.execute_call(Value::Object(s), base.clone(), &[value])?;
                Ok(())
            }
            Route::Data => {
                if let Some(p) = self.heap.object_mut(id).private_member_mut(&name) {
                    p.value = PropertyValue::Data {
                        value,
                        writable: true,
                    };
                }
                Ok(())
            }
        }
    }

    fn define_private_field(
        &mut self,
        base: &Value,
        pname: u16,
        value: Value,
    ) -> Completion<()> {
        let name = self.resolve_private_name(pname)?;
        let Some(id) = base.as_object() else {
            return self.type_error("cannot add a private field to a non-object");
        };
        if self.heap.object(id).private_member(&name).is_some() {
            return self.type_error("private field has already been declared");
        }
        self.heap
            .object_mut(id)
            .private
            .push((name, Property::data(value)));
        Ok(())
    }

    fn define_private_method(
        &mut self,
        base: &Value,
        pname: u16,
        method: &Value,
        kind: u8,
    ) -> Completion<()> {
        let name = self.resolve_private_name(pname)?;
        let Some(id) = base.as_object() else {
            return self.type_error("cannot add a private method to a non-object");
        };
        let mid = method.as_object().expect("compiled method is an object");
        let obj = self.heap.object_mut(id);
        match kind & 3 {
            0 => obj.private.push((
                name,
                Property {
                    value: PropertyValue::Data {
                        value: method.clone(),
                        writable: false,
                    },
                    enumerable: false,
                    configurable: false,
                },
            )),
            accessor_kind => {
                let (get, set) = if accessor_kind == 1 {
                    (Some(mid), None)
                } else {
                    (None, Some(mid))
                };
                if let Some(p) = obj.private_member_mut(&name) {
                    if let PropertyValue::Accessor {
                        get: old_get,
                        set: old_set,
                    } = &mut p.value
                    {
                        if let Some(g) = get {
                            *old_get = Some(g);
                        }
                        if let Some(s) = set {
                            *old_set = Some(s);
                        }
                        return Ok(());
                    }
                }
                obj.private.push((
                    name,
                    Property {
                        value: PropertyValue::Accessor { get, set },
                        enumerable: false,
                        configurable: false,
                    },
                ));
            }
        }
        Ok(())
    }

    fn define_method(
        &mut self,
        target: &Value,
        key_value: &Value,
        method: &Value,
        kind: u8,
    ) -> Completion<()> {
        let Some(target_id) = target.as_object() else {
            return self.type_error("cannot define a method on a non-object");
        };
        let key = om::to_property_key(self, key_value)?;
        let enumerable = kind & 4 == 0;
        if let Some(mid) = method.as_object() {
            if let ObjectKind::Function(data) = &mut self.heap.object_mut(mid).kind {
                data.home_object = Some(target_id);
            }
        }
        let desc = match kind & 3 {
            0 => om::PropertyDescriptor {
                value: Some(method.clone()),
                writable: Some(true),
                enumerable: Some(enumerable),
                configurable: Some(true),
                ..Default::default()
            },
            1 => om::PropertyDescriptor {
                get: Some(method.as_object()),
                enumerable: Some(enumerable),
                configurable: Some(true),
                ..Default::default()
            },
            _ => om::PropertyDescriptor {
                set: Some(method.as_object()),
                enumerable: Some(enumerable),
                configurable: Some(true),
                ..Default::default()
            },
        };
        om::define_own_property(self, target_id, &key, desc)?;
        Ok(())
    }

    fn super_call(&mut self, args: &[Value]) -> Completion<Value> {
        let active = self
            .top()
            .function
            .expect("super call outside a function");
        let super_ctor = self.heap.object(active).prototype;
        let Some(super_ctor) = super_ctor else {
            return self.type_error("super constructor is not a constructor");
        };
        let lex = self.top().lex_env;
        let new_target = env_ops::get_new_target(self, lex);
        let result =
            self.execute_construct(Value::Object(super_ctor), args, new_target)?;
        self.bind_this_after_super(result.clone())?;
        Ok(result)
    }

    fn get_super_property(&mut self, key_value: &Value) -> Completion<Value> {
        let lex = self.top().lex_env;
        let Some(home) = env_ops::get_home_object(self, lex) else {
            return self.type_error("'super' keyword unexpected here");
        };
        let Some(proto) = self.heap.object(home).prototype else {
            return self.type_error("super base is null");
        };
        let key = om::to_property_key(self, key_value)?;
        let this = env_ops::get_this_binding(self, lex)?;
        om::get(self, proto, &key, &this)
    }

    fn array_append(&mut self, target: &Value, value: Value) -> Completion<()> {
        let Some(id) = target.as_object() else {
            return self.type_error("cannot append to a non-array");
        };
        let length = match &self.heap.object(id).kind {
            ObjectKind::Array { length, .. } => *length,
            _ => return self.type_error("cannot append to a non-array"),
        };
        om::create_data_property(self, id, &PropertyKey::Index(length), value)?;
        Ok(())
    }

    fn array_spread(&mut self, target: &Value, source: &Value) -> Completion<()> {
        let record = om::get_iterator(self, source, false)?;
        loop {
            let (done, value) = om::iterator_next(self, &record, None)?;
            if done {
                return Ok(());
            }
            self.array_append(target, value)?;
        }
    }

    fn copy_data_properties(
        &mut self,
        target: &Value,
        source: &Value,
        excluded: &[PropertyKey],
    ) -> Completion<()> {
        if source.is_nullish() {
            return Ok(());
        }
        let Some(src_id) = source.as_object() else {
            return Ok(());
        };
        let target_id = target.as_object().expect("copy target is an object");
        let keys = om::own_property_keys(self, src_id)?;
        for key in keys {
            if matches!(key, PropertyKey::Private(_)) || excluded.contains(&key) {
                continue;
            }
            let Some(desc) = om::get_own_property(self, src_id, &key)? else {
                continue;
            };
            if desc.enumerable != Some(true) {
                continue;
            }
            let value = om::get(self, src_id, &key, source)?;
            om::create_data_property(self, target_id, &key, value)?;
        }
        Ok(())
    }

    /// One iterator-protocol step returning the raw result object.
    fn iterator_step(&mut self, iterator: &Value) -> Completion<Value> {
        let next = om::get_v(self, iterator, &PropertyKey::from_str("next"))?;
        if !om::is_callable(self, &next) {
            return self.type_error("iterator has no callable 'next' method");
        }
        let result = self.execute_call(next, iterator.clone(), &[])?;
        if !result.is_object() {
            return self.type_error("iterator result is not an object");
        }
        Ok(result)
    }

    fn for_in_init(&mut self, source: &Value) -> Completion<ObjectId> {
        let mut keys: Vec<core_types::JsStringRef> = Vec::new();
        if let Some(start) = source.as_object() {
            let mut seen = std::collections::HashSet::new();
            let mut cur = Some(start);
            while let Some(id) = cur {
                let own = om::own_property_keys(self, id)?;
                for key in own {
                    match &key {
                        PropertyKey::Symbol(_) | PropertyKey::Private(_) => continue,
                        _ => {}
                    }
                    let text = key.to_display_string();
                    if !seen.insert(text.clone()) {
                        continue;
                    }
                    if let Some(desc) = om::get_own_property(self, id, &key)? {
                        if desc.enumerable == Some(true) {
                            keys.push(self.heap.intern(&text));
                        }
                    }
                }
                cur = om::get_prototype_of(self, id)?;
            }
        }
        let target = source.as_object();
        Ok(self.heap.alloc_object(JsObject::with_kind(
            None,
            ObjectKind::KeyList(KeyListData {
                keys,
                pos: 0,
                target,
            }),
        )))
    }

    fn for_in_next(&mut self, iterator: &Value) -> Completion<Option<Value>> {
        let id = iterator.as_object().expect("for-in iterator object");
        loop {
            let (key, target) = {
                let data = match &mut self.heap.object_mut(id).kind {
                    ObjectKind::KeyList(data) => data,
                    _ => unreachable!("for-in over a non key list"),
                };
                if data.pos >= data.keys.len() {
                    return Ok(None);
                }
                let key = data.keys[data.pos].clone();
                data.pos += 1;
                (key, data.target)
            };
            // a key deleted mid-loop is skipped
            if let Some(target) = target {
                let pkey = PropertyKey::from_string(key.clone());
                if !om::has_property(self, target, &pkey)? {
                    continue;
                }
            }
            return Ok(Some(Value::String(key)));
        }
    }

    fn make_arguments_object(&mut self) -> ObjectId {
        let args = self.top().args.clone();
        let proto = self.realm.intrinsics.object_prototype;
        let id = self
            .heap
            .alloc_object(JsObject::with_kind(Some(proto), ObjectKind::Arguments));
        for (i, v) in args.iter().enumerate() {
            self.heap
                .object_mut(id)
                .set_property(PropertyKey::Index(i as u32), Property::data(v.clone()));
        }
        self.heap.object_mut(id).set_property(
            PropertyKey::from_str("length"),
            Property::method(Value::Number(args.len() as f64)),
        );
        // iterable like an array
        let array_proto = self.realm.intrinsics.array_prototype;
        let receiver = Value::Object(array_proto);
        let values = om::get(self, array_proto, &PropertyKey::from_str("values"), &receiver)
            .unwrap_or(Value::Undefined);
        if !values.is_undefined() {
            let iter_sym = self.heap.well_known.iterator.clone();
            self.heap
                .object_mut(id)
                .set_property(PropertyKey::Symbol(iter_sym), Property::method(values));
        }
        id
    }
}

fn numeric_op_for(instr: &Instr) -> om::NumericOp {
    match instr {
        Instr::Sub { .. } => om::NumericOp::Sub,
        Instr::Mul { .. } => om::NumericOp::Mul,
        Instr::Div { .. } => om::NumericOp::Div,
        Instr::Mod { .. } => om::NumericOp::Mod,
        Instr::Exp { .. } => om::NumericOp::Exp,
        Instr::BitAnd { .. } => om::NumericOp::BitAnd,
        Instr::BitOr { .. } => om::NumericOp::BitOr,
        Instr::BitXor { .. } => om::NumericOp::BitXor,
        Instr::Shl { .. } => om::NumericOp::Shl,
        Instr::Shr { .. } => om::NumericOp::Shr,
        Instr::UShr { .. } => om::NumericOp::UShr,
        _ => unreachable!("not a numeric operator"),
    }
}
