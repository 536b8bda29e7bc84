//! Global environment specifics: the declaration checks that guard
//! the host object's non-configurables, and global declaration
//! instantiation.

use core_types::{Completion, EnvId, PropertyKey, Value};
use memory_manager::{Agent, AgentErrors, EnvKind};
use object_model::{self as om, PropertyDescriptor};

use crate::ops::{create_immutable_binding, create_mutable_binding};

fn global_parts(agent: &dyn Agent, env: EnvId) -> (core_types::ObjectId, bool) {
    match &agent.heap_ref().env(env).kind {
        EnvKind::Global(g) => (g.object, true),
        _ => (agent.realm().global_object, false),
    }
}

/// `HasRestrictedGlobalProperty`: a non-configurable own property of
/// the global object that a lexical declaration must not shadow.
pub fn has_restricted_global_property(
    agent: &mut dyn Agent,
    env: EnvId,
    name: &str,
) -> Completion<bool> {
    let (object, _) = global_parts(agent, env);
    match om::get_own_property(agent, object, &PropertyKey::from_str(name))? {
        Some(desc) => Ok(desc.configurable == Some(false)),
        None => Ok(false),
    }
}

/// `CanDeclareGlobalVar`
pub fn can_declare_global_var(agent: &mut dyn Agent, env: EnvId, name: &str) -> Completion<bool> {
    let (object, _) = global_parts(agent, env);
    if om::get_own_property(agent, object, &PropertyKey::from_str(name))?.is_some() {
        return Ok(true);
    }
    om::is_extensible(agent, object)
}

/// `CanDeclareGlobalFunction`
pub fn can_declare_global_function(
    agent: &mut dyn Agent,
    env: EnvId,
    name: &str,
) -> Completion<bool> {
    let (object, _) = global_parts(agent, env);
    let existing = om::get_own_property(agent, object, &PropertyKey::from_str(name))?;
    match existing {
        None => om::is_extensible(agent, object),
        Some(desc) => {
            if desc.configurable == Some(true) {
                return Ok(true);
            }
            // a non-configurable slot is acceptable only as a plain
            // writable+enumerable data property
            Ok(desc.is_data() && desc.writable == Some(true) && desc.enumerable == Some(true))
        }
    }
}

/// `CreateGlobalVarBinding`
pub fn create_global_var_binding(agent: &mut dyn Agent, env: EnvId, name: &str) -> Completion<()> {
    let (object, is_global_record) = global_parts(agent, env);
    let key = PropertyKey::from_str(name);
    let has = om::get_own_property(agent, object, &key)?.is_some();
    if !has && om::is_extensible(agent, object)? {
        om::create_data_property(agent, object, &key, Value::Undefined)?;
    }
    if is_global_record {
        if let EnvKind::Global(g) = &mut agent.heap().env_mut(env).kind {
            g.var_names.insert(name.to_string());
        }
    }
    Ok(())
}

/// `CreateGlobalFunctionBinding`: replaces an existing slot with a
/// configurable data property where allowed.
pub fn create_global_function_binding(
    agent: &mut dyn Agent,
    env: EnvId,
    name: &str,
    value: Value,
) -> Completion<()> {
    let (object, is_global_record) = global_parts(agent, env);
    let key = PropertyKey::from_str(name);
    let existing = om::get_own_property(agent, object, &key)?;
    let desc = match existing {
        None => PropertyDescriptor::data(value.clone(), true, true, true),
        Some(d) if d.configurable == Some(true) => {
            PropertyDescriptor::data(value.clone(), true, true, true)
        }
        Some(_) => PropertyDescriptor::value_only(value.clone()),
    };
    let ok = om::define_own_property(agent, object, &key, desc)?;
    if !ok {
        let msg = format!("cannot declare global function '{}'", name);
        return agent.type_error(&msg);
    }
    let receiver = Value::Object(object);
    om::set(agent, object, &key, value, &receiver)?;
    if is_global_record {
        if let EnvKind::Global(g) = &mut agent.heap().env_mut(env).kind {
            g.var_names.insert(name.to_string());
        }
    }
    Ok(())
}

/// Global declaration instantiation.
///
/// Runs every check before creating any binding, so a rejected
/// declaration leaves the global scope untouched: (1) lexical names
/// may not collide with existing lexical/var/restricted bindings,
/// (2) var names may not collide with lexical ones, (3) every
/// function declaration must be declarable, then (4) lexical
/// bindings, (5) function bindings, (6) var bindings are created in
/// that order.
pub fn instantiate_global_declarations(
    agent: &mut dyn Agent,
    env: EnvId,
    lexical: &[(String, bool)],
    vars: &[String],
    functions: &[(String, Value)],
) -> Completion<()> {
    let decl_names: Vec<&String> = lexical.iter().map(|(n, _)| n).collect();
    for name in &decl_names {
        let taken = {
            let record = agent.heap_ref().env(env);
            match &record.kind {
                EnvKind::Global(g) => {
                    g.decl.bindings.contains_key(*name) || g.var_names.contains(*name)
                }
                _ => record
                    .decl()
                    .map(|d| d.bindings.contains_key(*name))
                    .unwrap_or(false),
            }
        };
        if taken || has_restricted_global_property(agent, env, name)? {
            let msg = format!("identifier '{}' has already been declared", name);
            return agent.syntax_error(&msg);
        }
    }
    for name in vars {
        let lexical_taken = {
            let record = agent.heap_ref().env(env);
            record
                .decl()
                .map(|d| d.bindings.contains_key(name))
                .unwrap_or(false)
        };
        if lexical_taken {
            let msg = format!("identifier '{}' has already been declared", name);
            return agent.syntax_error(&msg);
        }
        if !can_declare_global_var(agent, env, name)? {
            let msg = format!("cannot declare global variable '{}'", name);
            return agent.type_error(&msg);
        }
    }
    for (name, _) in functions {
        if !can_declare_global_function(agent, env, name)? {
            let msg = format!("cannot declare global function '{}'", name);
            return agent.type_error(&msg);
        }
    }

    for (name, is_const) in lexical {
        if *is_const {
            create_immutable_binding(agent, env, name, true)?;
        } else {
            create_mutable_binding(agent, env, name, false)?;
        }
    }
    for (name, value) in functions {
        create_global_function_binding(agent, env, name, value.clone())?;
    }
    for name in vars {
        create_global_var_binding(agent, env, name)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use memory_manager::{
        EnvRecord, GlobalEnv, Heap, Intrinsics, JsObject, Property, Realm,
    };
    use std::collections::HashSet;

    struct GlobalAgent {
        heap: Heap,
        realm: Realm,
    }

    impl GlobalAgent {
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
            let global_env = heap.alloc_env(EnvRecord {
                outer: None,
                kind: EnvKind::Global(GlobalEnv {
                    decl: Default::default(),
                    object: global_object,
                    var_names: HashSet::new(),
                }),
            });
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

    impl Agent for GlobalAgent {
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
            self.type_error("no calls here")
        }
        fn construct(&mut self, _: Value, _: &[Value], _: Value) -> Completion<Value> {
            self.type_error("no construction here")
        }
        fn enqueue_reaction(&mut self, _: memory_manager::Reaction, _: Value) {}
    }

    #[test]
    fn test_lexical_cannot_shadow_restricted_global() {
        let mut agent = GlobalAgent::new();
        let env = agent.realm.global_env;
        let global = agent.realm.global_object;
        // a non-configurable host property, like `Infinity`
        agent.heap.object_mut(global).set_property(
            PropertyKey::from_str("Infinity"),
            Property::frozen(Value::Number(f64::INFINITY)),
        );
        let result = instantiate_global_declarations(
            &mut agent,
            env,
            &[("Infinity".to_string(), false)],
            &[],
            &[],
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_var_lexical_collision_detected_before_any_binding() {
        let mut agent = GlobalAgent::new();
        let env = agent.realm.global_env;
        instantiate_global_declarations(
            &mut agent,
            env,
            &[("x".to_string(), false)],
            &[],
            &[],
        )
        .unwrap();
        // `var x` now collides; the failed run must not create `y`
        let result = instantiate_global_declarations(
            &mut agent,
            env,
            &[("y".to_string(), false)],
            &["x".to_string()],
            &[],
        );
        assert!(result.is_err());
        let record = agent.heap.env(env);
        assert!(!record.decl().unwrap().bindings.contains_key("y"));
    }

    #[test]
    fn test_vars_land_on_global_object() {
        let mut agent = GlobalAgent::new();
        let env = agent.realm.global_env;
        instantiate_global_declarations(&mut agent, env, &[], &["answer".to_string()], &[])
            .unwrap();
        let global = agent.realm.global_object;
        assert!(agent
            .heap
            .object(global)
            .own_property(&PropertyKey::from_str("answer"))
            .is_some());
    }

    #[test]
    fn test_function_binding_replaces_configurable_slot() {
        let mut agent = GlobalAgent::new();
        let env = agent.realm.global_env;
        let global = agent.realm.global_object;
        agent.heap.object_mut(global).set_property(
            PropertyKey::from_str("f"),
            Property::data(Value::Number(1.0)),
        );
        instantiate_global_declarations(
            &mut agent,
            env,
            &[],
            &[],
            &[("f".to_string(), Value::string("function"))],
        )
        .unwrap();
        let p = agent
            .heap
            .object(global)
            .own_property(&PropertyKey::from_str("f"))
            .unwrap();
        match &p.value {
            memory_manager::PropertyValue::Data { value, .. } => {
                assert_eq!(value.as_string().unwrap().as_str(), "function")
            }
            _ => unreachable!(),
        }
    }
}
