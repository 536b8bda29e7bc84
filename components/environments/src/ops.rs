//! The per-record binding operations and chain walks.

use core_types::{Completion, EnvId, ObjectId, PropertyKey, Value};
use memory_manager::{Agent, AgentErrors, BindingSlot, EnvKind, ThisBinding};
use object_model as om;

/// `HasBinding`
pub fn has_binding(agent: &mut dyn Agent, env: EnvId, name: &str) -> Completion<bool> {
    let record = agent.heap_ref().env(env);
    match &record.kind {
        EnvKind::Declarative(d) => Ok(d.bindings.contains_key(name)),
        EnvKind::Function(f) => Ok(f.decl.bindings.contains_key(name)),
        EnvKind::Module(m) => {
            Ok(m.decl.bindings.contains_key(name) || m.indirect.contains_key(name))
        }
        EnvKind::Object(o) => {
            let obj = o.object;
            om::has_property(agent, obj, &PropertyKey::from_str(name))
        }
        EnvKind::Global(g) => {
            if g.decl.bindings.contains_key(name) {
                return Ok(true);
            }
            let obj = g.object;
            om::has_property(agent, obj, &PropertyKey::from_str(name))
        }
    }
}

/// `CreateMutableBinding`
pub fn create_mutable_binding(
    agent: &mut dyn Agent,
    env: EnvId,
    name: &str,
    deletable: bool,
) -> Completion<()> {
    let record = agent.heap().env_mut(env);
    match record.decl_mut() {
        Some(d) => {
            let mut slot = BindingSlot::mutable();
            slot.deletable = deletable;
            d.bindings.insert(name.to_string(), slot);
            Ok(())
        }
        None => {
            // object env: a configurable property initialized later
            let obj = match &record.kind {
                EnvKind::Object(o) => o.object,
                _ => unreachable!(),
            };
            om::create_data_property(agent, obj, &PropertyKey::from_str(name), Value::Undefined)?;
            Ok(())
        }
    }
}

/// `CreateImmutableBinding`
pub fn create_immutable_binding(
    agent: &mut dyn Agent,
    env: EnvId,
    name: &str,
    strict: bool,
) -> Completion<()> {
    let record = agent.heap().env_mut(env);
    if let Some(d) = record.decl_mut() {
        d.bindings
            .insert(name.to_string(), BindingSlot::immutable(strict));
    }
    Ok(())
}

/// `InitializeBinding`: first write; clears the dead zone.
pub fn initialize_binding(
    agent: &mut dyn Agent,
    env: EnvId,
    name: &str,
    value: Value,
) -> Completion<()> {
    let record = agent.heap().env_mut(env);
    match record.decl_mut() {
        Some(d) => {
            match d.bindings.get_mut(name) {
                Some(slot) => slot.value = Some(value),
                None => {
                    // var-style late materialization
                    let mut slot = BindingSlot::var();
                    slot.value = Some(value);
                    d.bindings.insert(name.to_string(), slot);
                }
            }
            Ok(())
        }
        None => {
            let obj = match &record.kind {
                EnvKind::Object(o) => o.object,
                _ => unreachable!(),
            };
            let receiver = Value::Object(obj);
            om::set(agent, obj, &PropertyKey::from_str(name), value, &receiver)?;
            Ok(())
        }
    }
}

/// `SetMutableBinding`
pub fn set_mutable_binding(
    agent: &mut dyn Agent,
    env: EnvId,
    name: &str,
    value: Value,
    strict: bool,
) -> Completion<()> {
    enum Target {
        Slot,
        Object(ObjectId),
        TdzError,
        ConstError,
        Missing,
    }
    let target = {
        let record = agent.heap_ref().env(env);
        match &record.kind {
            EnvKind::Object(o) => Target::Object(o.object),
            EnvKind::Global(g) => match g.decl.bindings.get(name) {
                Some(slot) if slot.value.is_none() => Target::TdzError,
                Some(slot) if !slot.mutable => Target::ConstError,
                Some(_) => Target::Slot,
                None => Target::Object(g.object),
            },
            _ => match record.decl().and_then(|d| d.bindings.get(name)) {
                Some(slot) if slot.value.is_none() => Target::TdzError,
                Some(slot) if !slot.mutable => Target::ConstError,
                Some(_) => Target::Slot,
                None => Target::Missing,
            },
        }
    };
    match target {
        Target::Slot => {
            let record = agent.heap().env_mut(env);
            if let Some(d) = record.decl_mut() {
                if let Some(slot) = d.bindings.get_mut(name) {
                    slot.value = Some(value);
                }
            }
            Ok(())
        }
        Target::Object(obj) => {
            let receiver = Value::Object(obj);
            let ok = om::set(agent, obj, &PropertyKey::from_str(name), value, &receiver)?;
            if !ok && strict {
                let msg = format!("cannot assign to read only property '{}'", name);
                return agent.type_error(&msg);
            }
            Ok(())
        }
        Target::TdzError => {
            let msg = format!("cannot access '{}' before initialization", name);
            agent.reference_error(&msg)
        }
        Target::ConstError => {
            let msg = format!("assignment to constant variable '{}'", name);
            agent.type_error(&msg)
        }
        Target::Missing => {
            if strict {
                let msg = format!("{} is not defined", name);
                return agent.reference_error(&msg);
            }
            initialize_binding(agent, env, name, value)
        }
    }
}

/// `GetBindingValue`
pub fn get_binding_value(
    agent: &mut dyn Agent,
    env: EnvId,
    name: &str,
    _strict: bool,
) -> Completion<Value> {
    enum Source {
        Value(Value),
        Object(ObjectId),
        Indirect(EnvId, String),
        Tdz,
        Missing,
    }
    let source = {
        let record = agent.heap_ref().env(env);
        match &record.kind {
            EnvKind::Object(o) => Source::Object(o.object),
            EnvKind::Global(g) => match g.decl.bindings.get(name) {
                Some(slot) => match &slot.value {
                    Some(v) => Source::Value(v.clone()),
                    None => Source::Tdz,
                },
                None => Source::Object(g.object),
            },
            EnvKind::Module(m) => match m.decl.bindings.get(name) {
                Some(slot) => match &slot.value {
                    Some(v) => Source::Value(v.clone()),
                    None => Source::Tdz,
                },
                None => match m.indirect.get(name) {
                    Some((src_env, src_name)) => Source::Indirect(*src_env, src_name.clone()),
                    None => Source::Missing,
                },
            },
            _ => match record.decl().and_then(|d| d.bindings.get(name)) {
                Some(slot) => match &slot.value {
                    Some(v) => Source::Value(v.clone()),
                    None => Source::Tdz,
                },
                None => Source::Missing,
            },
        }
    };
    match source {
        Source::Value(v) => Ok(v),
        Source::Object(obj) => {
            let receiver = Value::Object(obj);
            om::get(agent, obj, &PropertyKey::from_str(name), &receiver)
        }
        Source::Indirect(src_env, src_name) => get_binding_value(agent, src_env, &src_name, true),
        Source::Tdz => {
            let msg = format!("cannot access '{}' before initialization", name);
            agent.reference_error(&msg)
        }
        Source::Missing => {
            let msg = format!("{} is not defined", name);
            agent.reference_error(&msg)
        }
    }
}

/// `DeleteBinding`
pub fn delete_binding(agent: &mut dyn Agent, env: EnvId, name: &str) -> Completion<bool> {
    let obj = {
        let record = agent.heap_ref().env(env);
        match &record.kind {
            EnvKind::Object(o) => Some(o.object),
            EnvKind::Global(g) => {
                if g.decl.bindings.contains_key(name) {
                    None
                } else {
                    Some(g.object)
                }
            }
            _ => None,
        }
    };
    match obj {
        Some(obj) => om::delete_property(agent, obj, &PropertyKey::from_str(name)),
        None => {
            let record = agent.heap().env_mut(env);
            if let Some(d) = record.decl_mut() {
                match d.bindings.get(name) {
                    Some(slot) if slot.deletable => {
                        d.bindings.remove(name);
                        Ok(true)
                    }
                    Some(_) => Ok(false),
                    None => Ok(true),
                }
            } else {
                Ok(true)
            }
        }
    }
}

/// Walk outward until `name` resolves; `None` when unresolvable.
pub fn resolve_binding(
    agent: &mut dyn Agent,
    start: EnvId,
    name: &str,
) -> Completion<Option<EnvId>> {
    let mut cur = Some(start);
    while let Some(env) = cur {
        if has_binding(agent, env, name)? {
            return Ok(Some(env));
        }
        cur = agent.heap_ref().env(env).outer;
    }
    Ok(None)
}

/// `GetThisBinding` resolved through the chain: the nearest function
/// record with a non-lexical `this`, else the global/module default.
pub fn get_this_binding(agent: &mut dyn Agent, start: EnvId) -> Completion<Value> {
    let mut cur = Some(start);
    while let Some(env) = cur {
        let record = agent.heap_ref().env(env);
        match &record.kind {
            EnvKind::Function(f) => match &f.this {
                ThisBinding::Lexical => {}
                ThisBinding::Uninitialized => {
                    return agent.reference_error(
                        "must call super constructor before accessing 'this'",
                    );
                }
                ThisBinding::Initialized(v) => return Ok(v.clone()),
            },
            EnvKind::Global(g) => return Ok(Value::Object(g.object)),
            EnvKind::Module(_) => return Ok(Value::Undefined),
            _ => {}
        }
        cur = record.outer;
    }
    Ok(Value::Undefined)
}

/// `new.target` of the nearest non-arrow activation.
pub fn get_new_target(agent: &dyn Agent, start: EnvId) -> Value {
    let mut cur = Some(start);
    while let Some(env) = cur {
        let record = agent.heap_ref().env(env);
        if let EnvKind::Function(f) = &record.kind {
            if !matches!(f.this, ThisBinding::Lexical) {
                return f.new_target.clone();
            }
        }
        cur = record.outer;
    }
    Value::Undefined
}

/// Home object of the nearest method activation, for `super`.
pub fn get_home_object(agent: &dyn Agent, start: EnvId) -> Option<ObjectId> {
    let mut cur = Some(start);
    while let Some(env) = cur {
        let record = agent.heap_ref().env(env);
        if let EnvKind::Function(f) = &record.kind {
            if let Some(h) = f.home_object {
                return Some(h);
            }
            if !matches!(f.this, ThisBinding::Lexical) {
                return None;
            }
        }
        cur = record.outer;
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use memory_manager::{DeclarativeEnv, EnvRecord, FunctionEnv, Heap, Intrinsics, JsObject, Realm};

    struct EnvAgent {
        heap: Heap,
        realm: Realm,
    }

    impl EnvAgent {
        fn new() -> Self {
            let mut heap = Heap::new();
            let mut alloc = || heap.alloc_object(JsObject::ordinary(None));
            let intrinsics = Intrinsics {
                object_prototype: alloc(),
                function_prototype: alloc(),
                array_prototype: alloc(),
                string_prototype: alloc(),
                number_prototype: alloc(),
                boolean_prototype: alloc(),
                symbol_prototype: alloc(),
                bigint_prototype: alloc(),
                error_prototype: alloc(),
                type_error_prototype: alloc(),
                range_error_prototype: alloc(),
                reference_error_prototype: alloc(),
                syntax_error_prototype: alloc(),
                uri_error_prototype: alloc(),
                eval_error_prototype: alloc(),
                map_prototype: alloc(),
                set_prototype: alloc(),
                weak_map_prototype: alloc(),
                weak_set_prototype: alloc(),
                weak_ref_prototype: alloc(),
                finalization_registry_prototype: alloc(),
                promise_prototype: alloc(),
                iterator_prototype: alloc(),
                async_iterator_prototype: alloc(),
                array_iterator_prototype: alloc(),
                map_iterator_prototype: alloc(),
                set_iterator_prototype: alloc(),
                generator_prototype: alloc(),
                async_generator_prototype: alloc(),
                array_buffer_prototype: alloc(),
                typed_array_prototype: alloc(),
            };
            let global_object = heap.alloc_object(JsObject::ordinary(None));
            let global_env = heap.alloc_env(EnvRecord::declarative(None));
            Self {
                heap,
                realm: Realm {
                    global_object,
                    global_env,
                    intrinsics,
                },
            }
        }
    }

    impl Agent for EnvAgent {
        fn heap(&mut self) -> &mut Heap {
            &mut self.heap
        }
        fn heap_ref(&self) -> &Heap {
            &self.heap
        }
        fn realm(&self) -> &Realm {
            &self.realm
        }
        fn call(&mut self, _: Value, _: Value, _: &[Value]) -> Completion<Value> {
            self.type_error("no calls in env tests")
        }
        fn construct(&mut self, _: Value, _: &[Value], _: Value) -> Completion<Value> {
            self.type_error("no construction in env tests")
        }
        fn enqueue_reaction(&mut self, _: memory_manager::Reaction, _: Value) {}
    }

    #[test]
    fn test_dead_zone_read_is_reference_error() {
        let mut agent = EnvAgent::new();
        let env = agent.heap.alloc_env(EnvRecord::declarative(None));
        create_mutable_binding(&mut agent, env, "x", false).unwrap();
        assert!(get_binding_value(&mut agent, env, "x", true).is_err());
        initialize_binding(&mut agent, env, "x", Value::Number(1.0)).unwrap();
        assert_eq!(
            get_binding_value(&mut agent, env, "x", true)
                .unwrap()
                .as_number(),
            Some(1.0)
        );
    }

    #[test]
    fn test_const_assignment_rejected() {
        let mut agent = EnvAgent::new();
        let env = agent.heap.alloc_env(EnvRecord::declarative(None));
        create_immutable_binding(&mut agent, env, "k", true).unwrap();
        initialize_binding(&mut agent, env, "k", Value::Number(1.0)).unwrap();
        assert!(set_mutable_binding(&mut agent, env, "k", Value::Number(2.0), true).is_err());
    }

    #[test]
    fn test_chain_resolution_finds_outer() {
        let mut agent = EnvAgent::new();
        let outer = agent.heap.alloc_env(EnvRecord::declarative(None));
        create_mutable_binding(&mut agent, outer, "a", false).unwrap();
        initialize_binding(&mut agent, outer, "a", Value::Number(9.0)).unwrap();
        let inner = agent.heap.alloc_env(EnvRecord::declarative(Some(outer)));

        let found = resolve_binding(&mut agent, inner, "a").unwrap();
        assert_eq!(found, Some(outer));
        assert_eq!(resolve_binding(&mut agent, inner, "zz").unwrap(), None);
    }

    #[test]
    fn test_shadowing_resolves_innermost() {
        let mut agent = EnvAgent::new();
        let outer = agent.heap.alloc_env(EnvRecord::declarative(None));
        create_mutable_binding(&mut agent, outer, "x", false).unwrap();
        initialize_binding(&mut agent, outer, "x", Value::Number(1.0)).unwrap();
        let inner = agent.heap.alloc_env(EnvRecord::declarative(Some(outer)));
        create_mutable_binding(&mut agent, inner, "x", false).unwrap();
        initialize_binding(&mut agent, inner, "x", Value::Number(2.0)).unwrap();

        let found = resolve_binding(&mut agent, inner, "x").unwrap().unwrap();
        assert_eq!(
            get_binding_value(&mut agent, found, "x", true)
                .unwrap()
                .as_number(),
            Some(2.0)
        );
    }

    #[test]
    fn test_this_walks_past_arrow_records() {
        let mut agent = EnvAgent::new();
        let base = agent.heap.alloc_env(EnvRecord::declarative(None));
        let function_env = agent.heap.alloc_env(EnvRecord {
            outer: Some(base),
            kind: EnvKind::Function(FunctionEnv {
                decl: DeclarativeEnv::default(),
                this: ThisBinding::Initialized(Value::Number(7.0)),
                home_object: None,
                new_target: Value::Undefined,
            }),
        });
        let arrow_env = agent.heap.alloc_env(EnvRecord {
            outer: Some(function_env),
            kind: EnvKind::Function(FunctionEnv {
                decl: DeclarativeEnv::default(),
                this: ThisBinding::Lexical,
                home_object: None,
                new_target: Value::Undefined,
            }),
        });
        let this = get_this_binding(&mut agent, arrow_env).unwrap();
        assert_eq!(this.as_number(), Some(7.0));
    }

    #[test]
    fn test_uninitialized_this_throws() {
        let mut agent = EnvAgent::new();
        let env = agent.heap.alloc_env(EnvRecord {
            outer: None,
            kind: EnvKind::Function(FunctionEnv {
                decl: DeclarativeEnv::default(),
                this: ThisBinding::Uninitialized,
                home_object: None,
                new_target: Value::Undefined,
            }),
        });
        assert!(get_this_binding(&mut agent, env).is_err());
    }
}
