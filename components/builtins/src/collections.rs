//! `Map` and `Set` with their iterators.

use core_types::{Completion, ObjectId, PropertyKey, Value};
use memory_manager::{
    Agent, AgentErrors, Heap, IterationKind, JsObject, MapData, NativeCallInfo, ObjectKind, Property, Realm,
    SetData,
};
use object_model as om;

use crate::array::iteration_result;
use crate::helpers::{data_hidden, getter, method, native_ctor, this_object};

pub(crate) fn install(heap: &mut Heap, realm: &Realm) {
    let i = &realm.intrinsics;
    let fp = i.function_prototype;

    let map_ctor = native_ctor(heap, fp, i.map_prototype, "Map", 0, map_constructor);
    data_hidden(heap, realm.global_object, "Map", Value::Object(map_ctor));
    method(heap, fp, i.map_prototype, "get", 1, map_get);
    method(heap, fp, i.map_prototype, "set", 2, map_set);
    method(heap, fp, i.map_prototype, "has", 1, map_has);
    method(heap, fp, i.map_prototype, "delete", 1, map_delete);
    method(heap, fp, i.map_prototype, "clear", 0, map_clear);
    method(heap, fp, i.map_prototype, "forEach", 1, map_for_each);
    method(heap, fp, i.map_prototype, "values", 0, map_values);
    method(heap, fp, i.map_prototype, "keys", 0, map_keys);
    method(heap, fp, i.map_prototype, "entries", 0, map_entries);
    getter(heap, fp, i.map_prototype, "size", map_size);
    install_default_iterator(heap, i.map_prototype, "entries");

    let set_ctor = native_ctor(heap, fp, i.set_prototype, "Set", 0, set_constructor);
    data_hidden(heap, realm.global_object, "Set", Value::Object(set_ctor));
    method(heap, fp, i.set_prototype, "add", 1, set_add);
    method(heap, fp, i.set_prototype, "has", 1, set_has);
    method(heap, fp, i.set_prototype, "delete", 1, set_delete);
    method(heap, fp, i.set_prototype, "clear", 0, set_clear);
    method(heap, fp, i.set_prototype, "forEach", 1, set_for_each);
    method(heap, fp, i.set_prototype, "values", 0, set_values);
    getter(heap, fp, i.set_prototype, "size", set_size);
    install_default_iterator(heap, i.set_prototype, "values");

    method(heap, fp, i.map_iterator_prototype, "next", 0, map_iterator_next);
    method(heap, fp, i.set_iterator_prototype, "next", 0, set_iterator_next);
}

fn install_default_iterator(heap: &mut Heap, proto: ObjectId, name: &str) {
    let value = {
        let p = heap.object(proto);
        match p.own_property(&PropertyKey::from_str(name)) {
            Some(prop) => match &prop.value {
                memory_manager::PropertyValue::Data { value, .. } => value.clone(),
                _ => Value::Undefined,
            },
            None => Value::Undefined,
        }
    };
    let sym = heap.well_known.iterator.clone();
    heap.object_mut(proto)
        .set_property(PropertyKey::Symbol(sym), Property::method(value));
}

fn map_data<'a>(agent: &'a mut dyn Agent, id: ObjectId, what: &str) -> Completion<&'a mut MapData> {
    // borrow checker: probe the kind first, then reborrow mutably
    let is_map = matches!(agent.heap_ref().object(id).kind, ObjectKind::Map(_));
    if !is_map {
        let msg = format!("{} called on a non-Map", what);
        return agent.type_error(&msg);
    }
    match &mut agent.heap().object_mut(id).kind {
        ObjectKind::Map(data) => Ok(data),
        _ => unreachable!(),
    }
}

fn set_data<'a>(agent: &'a mut dyn Agent, id: ObjectId, what: &str) -> Completion<&'a mut SetData> {
    let is_set = matches!(agent.heap_ref().object(id).kind, ObjectKind::Set(_));
    if !is_set {
        let msg = format!("{} called on a non-Set", what);
        return agent.type_error(&msg);
    }
    match &mut agent.heap().object_mut(id).kind {
        ObjectKind::Set(data) => Ok(data),
        _ => unreachable!(),
    }
}

fn map_constructor(agent: &mut dyn Agent, info: &NativeCallInfo<'_>) -> Completion<Value> {
    if info.new_target.is_undefined() {
        return agent.type_error("constructor Map requires 'new'");
    }
    let proto = agent.realm().intrinsics.map_prototype;
    let map = agent
        .heap()
        .alloc_object(JsObject::with_kind(Some(proto), ObjectKind::Map(MapData::default())));
    let iterable = info.arg(0);
    if !iterable.is_nullish() {
        let record = om::get_iterator(agent, &iterable, false)?;
        loop {
            let (done, entry) = om::iterator_next(agent, &record, None)?;
            if done {
                break;
            }
            if !entry.is_object() {
                return agent.type_error("iterator entry is not an object");
            }
            let key = om::get_v(agent, &entry, &PropertyKey::Index(0))?;
            let value = om::get_v(agent, &entry, &PropertyKey::Index(1))?;
            map_data(agent, map, "Map")?.set(key, value);
        }
    }
    Ok(Value::Object(map))
}

fn map_get(agent: &mut dyn Agent, info: &NativeCallInfo<'_>) -> Completion<Value> {
    let id = this_object(agent, info, "Map.prototype.get")?;
    let key = info.arg(0);
    Ok(map_data(agent, id, "Map.prototype.get")?
        .get(&key)
        .cloned()
        .unwrap_or(Value::Undefined))
}

fn map_set(agent: &mut dyn Agent, info: &NativeCallInfo<'_>) -> Completion<Value> {
    let id = this_object(agent, info, "Map.prototype.set")?;
    map_data(agent, id, "Map.prototype.set")?.set(info.arg(0), info.arg(1));
    Ok(info.this.clone())
}

fn map_has(agent: &mut dyn Agent, info: &NativeCallInfo<'_>) -> Completion<Value> {
    let id = this_object(agent, info, "Map.prototype.has")?;
    let key = info.arg(0);
    Ok(Value::Boolean(map_data(agent, id, "Map.prototype.has")?.has(&key)))
}

fn map_delete(agent: &mut dyn Agent, info: &NativeCallInfo<'_>) -> Completion<Value> {
    let id = this_object(agent, info, "Map.prototype.delete")?;
    let key = info.arg(0);
    Ok(Value::Boolean(
        map_data(agent, id, "Map.prototype.delete")?.delete(&key),
    ))
}

fn map_clear(agent: &mut dyn Agent, info: &NativeCallInfo<'_>) -> Completion<Value> {
    let id = this_object(agent, info, "Map.prototype.clear")?;
    map_data(agent, id, "Map.prototype.clear")?.clear();
    Ok(Value::Undefined)
}

fn map_size(agent: &mut dyn Agent, info: &NativeCallInfo<'_>) -> Completion<Value> {
    let id = this_object(agent, info, "Map.prototype.size")?;
    Ok(Value::Number(
        map_data(agent, id, "Map.prototype.size")?.size() as f64,
    ))
}

fn map_for_each(agent: &mut dyn Agent, info: &NativeCallInfo<'_>) -> Completion<Value> {
    let id = this_object(agent, info, "Map.prototype.forEach")?;
    let callback = info.arg(0);
    let mut index = 0;
    loop {
        let entry = {
            let data = map_data(agent, id, "Map.prototype.forEach")?;
            if index >= data.entries.len() {
                break;
            }
            let e = data.entries[index].clone();
            index += 1;
            e
        };
        if let Some((k, v)) = entry {
            agent.call(callback.clone(), info.arg(1), &[v, k, info.this.clone()])?;
        }
    }
    Ok(Value::Undefined)
}

fn make_map_iterator(agent: &mut dyn Agent, target: ObjectId, kind: IterationKind) -> Value {
    let proto = agent.realm().intrinsics.map_iterator_prototype;
    Value::Object(agent.heap().alloc_object(JsObject::with_kind(
        Some(proto),
        ObjectKind::MapIterator {
            target,
            index: 0,
            kind,
            done: false,
        },
    )))
}

fn map_values(agent: &mut dyn Agent, info: &NativeCallInfo<'_>) -> Completion<Value> {
    let id = this_object(agent, info, "Map.prototype.values")?;
    map_data(agent, id, "Map.prototype.values")?;
    Ok(make_map_iterator(agent, id, IterationKind::Value))
}

fn map_keys(agent: &mut dyn Agent, info: &NativeCallInfo<'_>) -> Completion<Value> {
    let id = this_object(agent, info, "Map.prototype.keys")?;
    map_data(agent, id, "Map.prototype.keys")?;
    Ok(make_map_iterator(agent, id, IterationKind::Key))
}

fn map_entries(agent: &mut dyn Agent, info: &NativeCallInfo<'_>) -> Completion<Value> {
    let id = this_object(agent, info, "Map.prototype.entries")?;
    map_data(agent, id, "Map.prototype.entries")?;
    Ok(make_map_iterator(agent, id, IterationKind::KeyValue))
}

fn map_iterator_next(agent: &mut dyn Agent, info: &NativeCallInfo<'_>) -> Completion<Value> {
    let iter = this_object(agent, info, "Map iterator")?;
    let (target, mut index, kind, done) = match &agent.heap_ref().object(iter).kind {
        ObjectKind::MapIterator {
            target,
            index,
            kind,
            done,
        } => (*target, *index, *kind, *done),
        _ => return agent.type_error("next called on a non map iterator"),
    };
    if done {
        return iteration_result(agent, Value::Undefined, true);
    }
    // skip tombstones
    let entry = loop {
        let data = match &agent.heap_ref().object(target).kind {
            ObjectKind::Map(d) => d,
            _ => return agent.type_error("map iterator target is not a Map"),
        };
        if index >= data.entries.len() {
            break None;
        }
        let slot = data.entries[index].clone();
        index += 1;
        if let Some(e) = slot {
            break Some(e);
        }
    };
    if let ObjectKind::MapIterator {
        index: i, done: d, ..
    } = &mut agent.heap().object_mut(iter).kind
    {
        *i = index;
        if entry.is_none() {
            *d = true;
        }
    }
    match entry {
        None => iteration_result(agent, Value::Undefined, true),
        Some((k, v)) => {
            let value = match kind {
                IterationKind::Key => k,
                IterationKind::Value => v,
                IterationKind::KeyValue => {
                    let pair = om::array_create(agent, 0);
                    om::create_data_property(agent, pair, &PropertyKey::Index(0), k)?;
                    om::create_data_property(agent, pair, &PropertyKey::Index(1), v)?;
                    Value::Object(pair)
                }
            };
            iteration_result(agent, value, false)
        }
    }
}

fn set_constructor(agent: &mut dyn Agent, info: &NativeCallInfo<'_>) -> Completion<Value> {
    if info.new_target.is_undefined() {
        return agent.type_error("constructor Set requires 'new'");
    }
    let proto = agent.realm().intrinsics.set_prototype;
    let set = agent
        .heap()
        .alloc_object(JsObject::with_kind(Some(proto), ObjectKind::Set(SetData::default())));
    let iterable = info.arg(0);
    if !iterable.is_nullish() {
        let record = om::get_iterator(agent, &iterable, false)?;
        loop {
            let (done, value) = om::iterator_next(agent, &record, None)?;
            if done {
                break;
            }
            set_data(agent, set, "Set")?.add(value);
        }
    }
    Ok(Value::Object(set))
}

fn set_add(agent: &mut dyn Agent, info: &NativeCallInfo<'_>) -> Completion<Value> {
    let id = this_object(agent, info, "Set.prototype.add")?;
    set_data(agent, id, "Set.prototype.add")?.add(info.arg(0));
    Ok(info.this.clone())
}

fn set_has(agent: &mut dyn Agent, info: &NativeCallInfo<'_>) -> Completion<Value> {
    let id = this_object(agent, info, "Set.prototype.has")?;
    let v = info.arg(0);
    Ok(Value::Boolean(set_data(agent, id, "Set.prototype.has")?.has(&v)))
}

fn set_delete(agent: &mut dyn Agent, info: &NativeCallInfo<'_>) -> Completion<Value> {
    let id = this_object(agent, info, "Set.prototype.delete")?;
    let v = info.arg(0);
    Ok(Value::Boolean(
        set_data(agent, id, "Set.prototype.delete")?.delete(&v),
    ))
}

fn set_clear(agent: &mut dyn Agent, info: &NativeCallInfo<'_>) -> Completion<Value> {
    let id = this_object(agent, info, "Set.prototype.clear")?;
    set_data(agent, id, "Set.prototype.clear")?.clear();
    Ok(Value::Undefined)
}

fn set_size(agent: &mut dyn Agent, info: &NativeCallInfo<'_>) -> Completion<Value> {
    let id = this_object(agent, info, "Set.prototype.size")?;
    Ok(Value::Number(
        set_data(agent, id, "Set.prototype.size")?.size() as f64,
    ))
}

fn set_for_each(agent: &mut dyn Agent, info: &NativeCallInfo<'_>) -> Completion<Value> {
    let id = this_object(agent, info, "Set.prototype.forEach")?;
    let callback = info.arg(0);
    let mut index = 0;
    loop {
        let entry = {
            let data = set_data(agent, id, "Set.prototype.forEach")?;
            if index >= data.entries.len() {
                break;
            }
            let e = data.entries[index].clone();
            index += 1;
            e
        };
        if let Some(v) = entry {
            agent.call(
                callback.clone(),
                info.arg(1),
                &[v.clone(), v, info.this.clone()],
            )?;
        }
    }
    Ok(Value::Undefined)
}

fn set_values(agent: &mut dyn Agent, info: &NativeCallInfo<'_>) -> Completion<Value> {
    let id = this_object(agent, info, "Set.prototype.values")?;
    set_data(agent, id, "Set.prototype.values")?;
    let proto = agent.realm().intrinsics.set_iterator_prototype;
    Ok(Value::Object(agent.heap().alloc_object(JsObject::with_kind(
        Some(proto),
        ObjectKind::SetIterator {
            target: id,
            index: 0,
            kind: IterationKind::Value,
            done: false,
        },
    ))))
}

fn set_iterator_next(agent: &mut dyn Agent, info: &NativeCallInfo<'_>) -> Completion<Value> {
    let iter = this_object(agent, info, "Set iterator")?;
    let (target, mut index, done) = match &agent.heap_ref().object(iter).kind {
        ObjectKind::SetIterator {
            target,
            index,
            done,
            ..
        } => (*target, *index, *done),
        _ => return agent.type_error("next called on a non set iterator"),
    };
    if done {
        return iteration_result(agent, Value::Undefined, true);
    }
    let entry = loop {
        let data = match &agent.heap_ref().object(target).kind {
            ObjectKind::Set(d) => d,
            _ => return agent.type_error("set iterator target is not a Set"),
        };
        if index >= data.entries.len() {
            break None;
        }
        let slot = data.entries[index].clone();
        index += 1;
        if let Some(e) = slot {
            break Some(e);
        }
    };
    if let ObjectKind::SetIterator {
        index: i, done: d, ..
    } = &mut agent.heap().object_mut(iter).kind
    {
        *i = index;
        if entry.is_none() {
            *d = true;
        }
    }
    match entry {
        None => iteration_result(agent, Value::Undefined, true),
        Some(v) => iteration_result(agent, v, false),
    }
}
