//! `Array` constructor, prototype methods and the array iterator.

use core_types::{Completion, PropertyKey, Value};
use memory_manager::{
    Agent, AgentErrors, Heap, IterationKind, JsObject, NativeCallInfo, ObjectKind, Property, Realm,
};
use object_model as om;

use crate::helpers::{data_hidden, method, native_ctor, this_object};

pub(crate) fn install(heap: &mut Heap, realm: &Realm) {
    let i = &realm.intrinsics;
    let ctor = native_ctor(
        heap,
        i.function_prototype,
        i.array_prototype,
        "Array",
        1,
        array_constructor,
    );
    data_hidden(heap, realm.global_object, "Array", Value::Object(ctor));
    method(heap, i.function_prototype, ctor, "isArray", 1, array_is_array);
    method(heap, i.function_prototype, ctor, "of", 0, array_of);

    let proto = i.array_prototype;
    let fp = i.function_prototype;
    method(heap, fp, proto, "push", 1, proto_push);
    method(heap, fp, proto, "pop", 0, proto_pop);
    method(heap, fp, proto, "join", 1, proto_join);
    method(heap, fp, proto, "indexOf", 1, proto_index_of);
    method(heap, fp, proto, "includes", 1, proto_includes);
    method(heap, fp, proto, "slice", 2, proto_slice);
    method(heap, fp, proto, "forEach", 1, proto_for_each);
    method(heap, fp, proto, "map", 1, proto_map);
    method(heap, fp, proto, "filter", 1, proto_filter);
    method(heap, fp, proto, "values", 0, proto_values);
    method(heap, fp, proto, "keys", 0, proto_keys);
    method(heap, fp, proto, "entries", 0, proto_entries);

    // @@iterator is the values method
    let values = {
        let p = heap.object(proto);
        match p.own_property(&PropertyKey::from_str("values")) {
            Some(prop) => match &prop.value {
                memory_manager::PropertyValue::Data { value, .. } => value.clone(),
                _ => Value::Undefined,
            },
            None => Value::Undefined,
        }
    };
    let iter_sym = heap.well_known.iterator.clone();
    heap.object_mut(proto)
        .set_property(PropertyKey::Symbol(iter_sym), Property::method(values));

    // %ArrayIteratorPrototype%.next
    method(heap, fp, i.array_iterator_prototype, "next", 0, iterator_next);

    // %IteratorPrototype%[@@iterator] returns the receiver
    let self_iter = crate::helpers::native_fn(heap, fp, "[Symbol.iterator]", 0, return_this);
    let iter_sym = heap.well_known.iterator.clone();
    heap.object_mut(i.iterator_prototype).set_property(
        PropertyKey::Symbol(iter_sym),
        Property::method(Value::Object(self_iter)),
    );
    let async_iter_sym = heap.well_known.async_iterator.clone();
    let self_async = crate::helpers::native_fn(heap, fp, "[Symbol.asyncIterator]", 0, return_this);
    heap.object_mut(i.async_iterator_prototype).set_property(
        PropertyKey::Symbol(async_iter_sym),
        Property::method(Value::Object(self_async)),
    );
}

fn return_this(_agent: &mut dyn Agent, info: &NativeCallInfo<'_>) -> Completion<Value> {
    Ok(info.this.clone())
}

fn array_constructor(agent: &mut dyn Agent, info: &NativeCallInfo<'_>) -> Completion<Value> {
    if info.args.len() == 1 {
        if let Value::Number(n) = info.arg(0) {
            let len = om::to_uint32(agent, &Value::Number(n))?;
            if len as f64 != n {
                return agent.range_error("invalid array length");
            }
            return Ok(Value::Object(om::array_create(agent, len)));
        }
    }
    let arr = om::array_create(agent, 0);
    for (idx, v) in info.args.iter().enumerate() {
        om::create_data_property(agent, arr, &PropertyKey::Index(idx as u32), v.clone())?;
    }
    Ok(Value::Object(arr))
}

fn array_is_array(agent: &mut dyn Agent, info: &NativeCallInfo<'_>) -> Completion<Value> {
    let is = info
        .arg(0)
        .as_object()
        .map(|id| matches!(agent.heap_ref().object(id).kind, ObjectKind::Array { .. }))
        .unwrap_or(false);
    Ok(Value::Boolean(is))
}

fn array_of(agent: &mut dyn Agent, info: &NativeCallInfo<'_>) -> Completion<Value> {
    let arr = om::array_create(agent, 0);
    for (idx, v) in info.args.iter().enumerate() {
        om::create_data_property(agent, arr, &PropertyKey::Index(idx as u32), v.clone())?;
    }
    Ok(Value::Object(arr))
}

fn array_length(agent: &mut dyn Agent, arr: core_types::ObjectId) -> Completion<u32> {
    let v = om::get(
        agent,
        arr,
        &PropertyKey::from_str("length"),
        &Value::Object(arr),
    )?;
    om::to_uint32(agent, &v)
}

fn proto_push(agent: &mut dyn Agent, info: &NativeCallInfo<'_>) -> Completion<Value> {
    let arr = this_object(agent, info, "Array.prototype.push")?;
    let mut len = array_length(agent, arr)?;
    for v in info.args {
        om::set(
            agent,
            arr,
            &PropertyKey::Index(len),
            v.clone(),
            &info.this,
        )?;
        len += 1;
    }
    Ok(Value::Number(len as f64))
}

fn proto_pop(agent: &mut dyn Agent, info: &NativeCallInfo<'_>) -> Completion<Value> {
    let arr = this_object(agent, info, "Array.prototype.pop")?;
    let len = array_length(agent, arr)?;
    if len == 0 {
        return Ok(Value::Undefined);
    }
    let key = PropertyKey::Index(len - 1);
    let value = om::get(agent, arr, &key, &info.this)?;
    om::delete_property(agent, arr, &key)?;
    om::set(
        agent,
        arr,
        &PropertyKey::from_str("length"),
        Value::Number((len - 1) as f64),
        &info.this,
    )?;
    Ok(value)
}

fn proto_join(agent: &mut dyn Agent, info: &NativeCallInfo<'_>) -> Completion<Value> {
    let arr = this_object(agent, info, "Array.prototype.join")?;
    let len = array_length(agent, arr)?;
    let sep = match info.arg(0) {
        Value::Undefined => ",".to_string(),
        other => om::to_string(agent, &other)?.as_str().to_string(),
    };
    let mut out = String::new();
    for idx in 0..len {
        if idx > 0 {
            out.push_str(&sep);
        }
        let v = om::get(agent, arr, &PropertyKey::Index(idx), &info.this)?;
        if !v.is_nullish() {
            out.push_str(om::to_string(agent, &v)?.as_str());
        }
    }
    Ok(Value::string(&out))
}

fn proto_index_of(agent: &mut dyn Agent, info: &NativeCallInfo<'_>) -> Completion<Value> {
    let arr = this_object(agent, info, "Array.prototype.indexOf")?;
    let len = array_length(agent, arr)?;
    let needle = info.arg(0);
    for idx in 0..len {
        let v = om::get(agent, arr, &PropertyKey::Index(idx), &info.this)?;
        if v.strict_equals(&needle) {
            return Ok(Value::Number(idx as f64));
        }
    }
    Ok(Value::Number(-1.0))
}

fn proto_includes(agent: &mut dyn Agent, info: &NativeCallInfo<'_>) -> Completion<Value> {
    let arr = this_object(agent, info, "Array.prototype.includes")?;
    let len = array_length(agent, arr)?;
    let needle = info.arg(0);
    for idx in 0..len {
        let v = om::get(agent, arr, &PropertyKey::Index(idx), &info.this)?;
        if v.same_value_zero(&needle) {
            return Ok(Value::Boolean(true));
        }
    }
    Ok(Value::Boolean(false))
}

fn proto_slice(agent: &mut dyn Agent, info: &NativeCallInfo<'_>) -> Completion<Value> {
    let arr = this_object(agent, info, "Array.prototype.slice")?;
    let len = array_length(agent, arr)? as i64;
    let resolve = |v: Value, default: i64, agent: &mut dyn Agent| -> Completion<i64> {
        match v {
            Value::Undefined => Ok(default),
            other => {
                let n = om::to_number(agent, &other)?;
                let n = if n.is_nan() { 0.0 } else { n.trunc() };
                Ok(if n < 0.0 {
                    (len + n as i64).max(0)
                } else {
                    (n as i64).min(len)
                })
            }
        }
    };
    let start = resolve(info.arg(0), 0, agent)?;
    let end = resolve(info.arg(1), len, agent)?;
    let out = om::array_create(agent, 0);
    let mut n = 0;
    for idx in start..end {
        let v = om::get(agent, arr, &PropertyKey::Index(idx as u32), &info.this)?;
        om::create_data_property(agent, out, &PropertyKey::Index(n), v)?;
        n += 1;
    }
    Ok(Value::Object(out))
}

fn proto_for_each(agent: &mut dyn Agent, info: &NativeCallInfo<'_>) -> Completion<Value> {
    let arr = this_object(agent, info, "Array.prototype.forEach")?;
    let len = array_length(agent, arr)?;
    let callback = info.arg(0);
    for idx in 0..len {
        let v = om::get(agent, arr, &PropertyKey::Index(idx), &info.this)?;
        agent.call(
            callback.clone(),
            info.arg(1),
            &[v, Value::Number(idx as f64), info.this.clone()],
        )?;
    }
    Ok(Value::Undefined)
}

fn proto_map(agent: &mut dyn Agent, info: &NativeCallInfo<'_>) -> Completion<Value> {
    let arr = this_object(agent, info, "Array.prototype.map")?;
    let len = array_length(agent, arr)?;
    let callback = info.arg(0);
    let out = om::array_create(agent, 0);
    for idx in 0..len {
        let v = om::get(agent, arr, &PropertyKey::Index(idx), &info.this)?;
        let mapped = agent.call(
            callback.clone(),
            info.arg(1),
            &[v, Value::Number(idx as f64), info.this.clone()],
        )?;
        om::create_data_property(agent, out, &PropertyKey::Index(idx), mapped)?;
    }
    Ok(Value::Object(out))
}

fn proto_filter(agent: &mut dyn Agent, info: &NativeCallInfo<'_>) -> Completion<Value> {
    let arr = this_object(agent, info, "Array.prototype.filter")?;
    let len = array_length(agent, arr)?;
    let callback = info.arg(0);
    let out = om::array_create(agent, 0);
    let mut n = 0;
    for idx in 0..len {
        let v = om::get(agent, arr, &PropertyKey::Index(idx), &info.this)?;
        let keep = agent.call(
            callback.clone(),
            info.arg(1),
            &[v.clone(), Value::Number(idx as f64), info.this.clone()],
        )?;
        if keep.is_truthy() {
            om::create_data_property(agent, out, &PropertyKey::Index(n), v)?;
            n += 1;
        }
    }
    Ok(Value::Object(out))
}

fn make_iterator(
    agent: &mut dyn Agent,
    target: core_types::ObjectId,
    kind: IterationKind,
) -> Value {
    let proto = agent.realm().intrinsics.array_iterator_prototype;
    Value::Object(agent.heap().alloc_object(JsObject::with_kind(
        Some(proto),
        ObjectKind::ArrayIterator {
            target,
            index: 0,
            kind,
            done: false,
        },
    )))
}

fn proto_values(agent: &mut dyn Agent, info: &NativeCallInfo<'_>) -> Completion<Value> {
    let arr = this_object(agent, info, "Array.prototype.values")?;
    Ok(make_iterator(agent, arr, IterationKind::Value))
}

fn proto_keys(agent: &mut dyn Agent, info: &NativeCallInfo<'_>) -> Completion<Value> {
    let arr = this_object(agent, info, "Array.prototype.keys")?;
    Ok(make_iterator(agent, arr, IterationKind::Key))
}

fn proto_entries(agent: &mut dyn Agent, info: &NativeCallInfo<'_>) -> Completion<Value> {
    let arr = this_object(agent, info, "Array.prototype.entries")?;
    Ok(make_iterator(agent, arr, IterationKind::KeyValue))
}

pub(crate) fn iteration_result(
    agent: &mut dyn Agent,
    value: Value,
    done: bool,
) -> Completion<Value> {
    let proto = agent.realm().intrinsics.object_prototype;
    let id = agent.heap().alloc_object(JsObject::ordinary(Some(proto)));
    let obj = agent.heap().object_mut(id);
    obj.set_property(PropertyKey::from_str("value"), Property::data(value));
    obj.set_property(
        PropertyKey::from_str("done"),
        Property::data(Value::Boolean(done)),
    );
    Ok(Value::Object(id))
}

fn iterator_next(agent: &mut dyn Agent, info: &NativeCallInfo<'_>) -> Completion<Value> {
    let iter = this_object(agent, info, "Array iterator")?;
    let (target, index, kind, done) = match &agent.heap_ref().object(iter).kind {
        ObjectKind::ArrayIterator {
            target,
            index,
            kind,
            done,
        } => (*target, *index, *kind, *done),
        _ => return agent.type_error("next called on a non array iterator"),
    };
    if done {
        return iteration_result(agent, Value::Undefined, true);
    }
    let len = array_length(agent, target)?;
    if index >= len {
        if let ObjectKind::ArrayIterator { done, .. } = &mut agent.heap().object_mut(iter).kind {
            *done = true;
        }
        return iteration_result(agent, Value::Undefined, true);
    }
    if let ObjectKind::ArrayIterator { index: i, .. } = &mut agent.heap().object_mut(iter).kind {
        *i = index + 1;
    }
    let element = om::get(
        agent,
        target,
        &PropertyKey::Index(index),
        &Value::Object(target),
    )?;
    let value = match kind {
        IterationKind::Value => element,
        IterationKind::Key => Value::Number(index as f64),
        IterationKind::KeyValue => {
            let pair = om::array_create(agent, 0);
            om::create_data_property(
                agent,
                pair,
                &PropertyKey::Index(0),
                Value::Number(index as f64),
            )?;
            om::create_data_property(agent, pair, &PropertyKey::Index(1), element)?;
            Value::Object(pair)
        }
    };
    iteration_result(agent, value, false)
}
