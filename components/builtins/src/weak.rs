//! Weak collections: WeakMap, WeakSet, WeakRef,
//! FinalizationRegistry. The collector does the clearing; these are
//! thin views over the heap data.

use core_types::{Completion, ObjectId, PropertyKey, Value};
use memory_manager::{
    Agent, AgentErrors, FinalizationCell, Heap, JsObject, MapData, NativeCallInfo, ObjectKind, Realm, SetData,
};
use object_model as om;

use crate::helpers::{data_hidden, method, native_ctor, this_object};

pub(crate) fn install(heap: &mut Heap, realm: &Realm) {
    let i = &realm.intrinsics;
    let fp = i.function_prototype;

    let wm = native_ctor(heap, fp, i.weak_map_prototype, "WeakMap", 0, weak_map_ctor);
    data_hidden(heap, realm.global_object, "WeakMap", Value::Object(wm));
    method(heap, fp, i.weak_map_prototype, "get", 1, weak_map_get);
    method(heap, fp, i.weak_map_prototype, "set", 2, weak_map_set);
    method(heap, fp, i.weak_map_prototype, "has", 1, weak_map_has);
    method(heap, fp, i.weak_map_prototype, "delete", 1, weak_map_delete);

    let ws = native_ctor(heap, fp, i.weak_set_prototype, "WeakSet", 0, weak_set_ctor);
    data_hidden(heap, realm.global_object, "WeakSet", Value::Object(ws));
    method(heap, fp, i.weak_set_prototype, "add", 1, weak_set_add);
    method(heap, fp, i.weak_set_prototype, "has", 1, weak_set_has);
    method(heap, fp, i.weak_set_prototype, "delete", 1, weak_set_delete);

    let wr = native_ctor(heap, fp, i.weak_ref_prototype, "WeakRef", 1, weak_ref_ctor);
    data_hidden(heap, realm.global_object, "WeakRef", Value::Object(wr));
    method(heap, fp, i.weak_ref_prototype, "deref", 0, weak_ref_deref);

    let fr = native_ctor(
        heap,
        fp,
        i.finalization_registry_prototype,
        "FinalizationRegistry",
        1,
        registry_ctor,
    );
    data_hidden(
        heap,
        realm.global_object,
        "FinalizationRegistry",
        Value::Object(fr),
    );
    method(
        heap,
        fp,
        i.finalization_registry_prototype,
        "register",
        2,
        registry_register,
    );
    method(
        heap,
        fp,
        i.finalization_registry_prototype,
        "unregister",
        1,
        registry_unregister,
    );
}

/// A value that may be held weakly: an object or an unregistered
/// symbol.
fn check_weak_target(agent: &mut dyn Agent, v: &Value) -> Completion<()> {
    match v {
        Value::Object(_) => Ok(()),
        Value::Symbol(s) => {
            if agent.heap_ref().symbol_key_for(s).is_some() {
                agent.type_error("registered symbols cannot be held weakly")
            } else {
                Ok(())
            }
        }
        _ => agent.type_error("value cannot be held weakly"),
    }
}

fn weak_map_ctor(agent: &mut dyn Agent, info: &NativeCallInfo<'_>) -> Completion<Value> {
    if info.new_target.is_undefined() {
        return agent.type_error("constructor WeakMap requires 'new'");
    }
    let proto = agent.realm().intrinsics.weak_map_prototype;
    let id = agent.heap().alloc_object(JsObject::with_kind(
        Some(proto),
        ObjectKind::WeakMap(MapData::default()),
    ));
    let iterable = info.arg(0);
    if !iterable.is_nullish() {
        let record = om::get_iterator(agent, &iterable, false)?;
        loop {
            let (done, entry) = om::iterator_next(agent, &record, None)?;
            if done {
                break;
            }
            let key = om::get_v(agent, &entry, &PropertyKey::Index(0))?;
            let value = om::get_v(agent, &entry, &PropertyKey::Index(1))?;
            check_weak_target(agent, &key)?;
            if let ObjectKind::WeakMap(data) = &mut agent.heap().object_mut(id).kind {
                data.set(key, value);
            }
        }
    }
    Ok(Value::Object(id))
}

fn weak_map_access<'h>(
    agent: &'h mut dyn Agent,
    id: ObjectId,
    what: &str,
) -> Completion<&'h mut MapData> {
    let ok = matches!(agent.heap_ref().object(id).kind, ObjectKind::WeakMap(_));
    if !ok {
        let msg = format!("{} called on a non-WeakMap", what);
        return agent.type_error(&msg);
    }
    match &mut agent.heap().object_mut(id).kind {
        ObjectKind::WeakMap(data) => Ok(data),
        _ => unreachable!(),
    }
}

fn weak_map_get(agent: &mut dyn Agent, info: &NativeCallInfo<'_>) -> Completion<Value> {
    let id = this_object(agent, info, "WeakMap.prototype.get")?;
    let key = info.arg(0);
    Ok(weak_map_access(agent, id, "WeakMap.prototype.get")?
        .get(&key)
        .cloned()
        .unwrap_or(Value::Undefined))
}

fn weak_map_set(agent: &mut dyn Agent, info: &NativeCallInfo<'_>) -> Completion<Value> {
    let id = this_object(agent, info, "WeakMap.prototype.set")?;
    let key = info.arg(0);
    check_weak_target(agent, &key)?;
    weak_map_access(agent, id, "WeakMap.prototype.set")?.set(key, info.arg(1));
    Ok(info.this.clone())
}

fn weak_map_has(agent: &mut dyn Agent, info: &NativeCallInfo<'_>) -> Completion<Value> {
    let id = this_object(agent, info, "WeakMap.prototype.has")?;
    let key = info.arg(0);
    Ok(Value::Boolean(
        weak_map_access(agent, id, "WeakMap.prototype.has")?.has(&key),
    ))
}

fn weak_map_delete(agent: &mut dyn Agent, info: &NativeCallInfo<'_>) -> Completion<Value> {
    let id = this_object(agent, info, "WeakMap.prototype.delete")?;
    let key = info.arg(0);
    Ok(Value::Boolean(
        weak_map_access(agent, id, "WeakMap.prototype.delete")?.delete(&key),
    ))
}

fn weak_set_ctor(agent: &mut dyn Agent, info: &NativeCallInfo<'_>) -> Completion<Value> {
    if info.new_target.is_undefined() {
        return agent.type_error("constructor WeakSet requires 'new'");
    }
    let proto = agent.realm().intrinsics.weak_set_prototype;
    let id = agent.heap().alloc_object(JsObject::with_kind(
        Some(proto),
        ObjectKind::WeakSet(SetData::default()),
    ));
    Ok(Value::Object(id))
}

fn weak_set_access<'h>(
    agent: &'h mut dyn Agent,
    id: ObjectId,
    what: &str,
) -> Completion<&'h mut SetData> {
    let ok = matches!(agent.heap_ref().object(id).kind, ObjectKind::WeakSet(_));
    if !ok {
        let msg = format!("{} called on a non-WeakSet", what);
        return agent.type_error(&msg);
    }
    match &mut agent.heap().object_mut(id).kind {
        ObjectKind::WeakSet(data) => Ok(data),
        _ => unreachable!(),
    }
}

fn weak_set_add(agent: &mut dyn Agent, info: &NativeCallInfo<'_>) -> Completion<Value> {
    let id = this_object(agent, info, "WeakSet.prototype.add")?;
    let v = info.arg(0);
    check_weak_target(agent, &v)?;
    weak_set_access(agent, id, "WeakSet.prototype.add")?.add(v);
    Ok(info.this.clone())
}

fn weak_set_has(agent: &mut dyn Agent, info: &NativeCallInfo<'_>) -> Completion<Value> {
    let id = this_object(agent, info, "WeakSet.prototype.has")?;
    let v = info.arg(0);
    Ok(Value::Boolean(
        weak_set_access(agent, id, "WeakSet.prototype.has")?.has(&v),
    ))
}

fn weak_set_delete(agent: &mut dyn Agent, info: &NativeCallInfo<'_>) -> Completion<Value> {
    let id = this_object(agent, info, "WeakSet.prototype.delete")?;
    let v = info.arg(0);
    Ok(Value::Boolean(
        weak_set_access(agent, id, "WeakSet.prototype.delete")?.delete(&v),
    ))
}

fn weak_ref_ctor(agent: &mut dyn Agent, info: &NativeCallInfo<'_>) -> Completion<Value> {
    if info.new_target.is_undefined() {
        return agent.type_error("constructor WeakRef requires 'new'");
    }
    let target = info.arg(0);
    check_weak_target(agent, &target)?;
    let Some(target) = target.as_object() else {
        // unregistered symbols never die under reference counting, so
        // holding one weakly is a permanent strong view; unsupported
        return agent.type_error("WeakRef over symbols is not supported");
    };
    let proto = agent.realm().intrinsics.weak_ref_prototype;
    Ok(Value::Object(agent.heap().alloc_object(JsObject::with_kind(
        Some(proto),
        ObjectKind::WeakRef {
            target: Some(target),
        },
    ))))
}

fn weak_ref_deref(agent: &mut dyn Agent, info: &NativeCallInfo<'_>) -> Completion<Value> {
    let id = this_object(agent, info, "WeakRef.prototype.deref")?;
    match &agent.heap_ref().object(id).kind {
        ObjectKind::WeakRef { target } => Ok(match target {
            Some(t) => Value::Object(*t),
            None => Value::Undefined,
        }),
        _ => agent.type_error("WeakRef.prototype.deref called on a non-WeakRef"),
    }
}

fn registry_ctor(agent: &mut dyn Agent, info: &NativeCallInfo<'_>) -> Completion<Value> {
    if info.new_target.is_undefined() {
        return agent.type_error("constructor FinalizationRegistry requires 'new'");
    }
    let callback = info.arg(0);
    if !om::is_callable(agent, &callback) {
        return agent.type_error("cleanup callback must be callable");
    }
    let callback = callback.as_object().expect("callable is an object");
    let proto = agent.realm().intrinsics.finalization_registry_prototype;
    Ok(Value::Object(agent.heap().alloc_object(JsObject::with_kind(
        Some(proto),
        ObjectKind::FinalizationRegistry {
            callback,
            cells: Vec::new(),
        },
    ))))
}

fn registry_register(agent: &mut dyn Agent, info: &NativeCallInfo<'_>) -> Completion<Value> {
    let id = this_object(agent, info, "FinalizationRegistry.prototype.register")?;
    let target = info.arg(0);
    check_weak_target(agent, &target)?;
    let Some(target) = target.as_object() else {
        return agent.type_error("finalization over symbols is not supported");
    };
    let held = info.arg(1);
    if held.as_object() == Some(target) {
        return agent.type_error("held value may not be the registered target");
    }
    let token = info.arg(2).as_object();
    match &mut agent.heap().object_mut(id).kind {
        ObjectKind::FinalizationRegistry { cells, .. } => {
            cells.push(FinalizationCell {
                target,
                held,
                token,
            });
            Ok(Value::Undefined)
        }
        _ => agent.type_error("register called on a non-FinalizationRegistry"),
    }
}

fn registry_unregister(agent: &mut dyn Agent, info: &NativeCallInfo<'_>) -> Completion<Value> {
    let id = this_object(agent, info, "FinalizationRegistry.prototype.unregister")?;
    let Some(token) = info.arg(0).as_object() else {
        return agent.type_error("unregister token must be an object");
    };
    match &mut agent.heap().object_mut(id).kind {
        ObjectKind::FinalizationRegistry { cells, .. } => {
            let before = cells.len();
            cells.retain(|c| c.token != Some(token));
            Ok(Value::Boolean(cells.len() != before))
        }
        _ => agent.type_error("unregister called on a non-FinalizationRegistry"),
    }
}
