//! `Object` constructor and prototype.

use core_types::{Completion, PropertyKey, Value};
use memory_manager::{Agent, AgentErrors, Heap, JsObject, NativeCallInfo, Realm};
use object_model as om;

use crate::helpers::{data_hidden, method, native_ctor, this_object};

pub(crate) fn install(heap: &mut Heap, realm: &Realm) {
    let i = &realm.intrinsics;
    let ctor = native_ctor(
        heap,
        i.function_prototype,
        i.object_prototype,
        "Object",
        1,
        object_constructor,
    );
    data_hidden(heap, realm.global_object, "Object", Value::Object(ctor));

    method(heap, i.function_prototype, ctor, "keys", 1, object_keys);
    method(
        heap,
        i.function_prototype,
        ctor,
        "getPrototypeOf",
        1,
        object_get_prototype_of,
    );
    method(
        heap,
        i.function_prototype,
        ctor,
        "defineProperty",
        3,
        object_define_property,
    );
    method(
        heap,
        i.function_prototype,
        ctor,
        "getOwnPropertyNames",
        1,
        object_get_own_property_names,
    );
    method(
        heap,
        i.function_prototype,
        ctor,
        "preventExtensions",
        1,
        object_prevent_extensions,
    );
    method(heap, i.function_prototype, ctor, "assign", 2, object_assign);

    let proto = i.object_prototype;
    method(
        heap,
        i.function_prototype,
        proto,
        "hasOwnProperty",
        1,
        proto_has_own_property,
    );
    method(heap, i.function_prototype, proto, "toString", 0, proto_to_string);
    method(heap, i.function_prototype, proto, "valueOf", 0, proto_value_of);
    method(
        heap,
        i.function_prototype,
        proto,
        "isPrototypeOf",
        1,
        proto_is_prototype_of,
    );
}

fn object_constructor(agent: &mut dyn Agent, info: &NativeCallInfo<'_>) -> Completion<Value> {
    let arg = info.arg(0);
    match arg {
        Value::Undefined | Value::Null => {
            let proto = agent.realm().intrinsics.object_prototype;
            Ok(Value::Object(
                agent.heap().alloc_object(JsObject::ordinary(Some(proto))),
            ))
        }
        other => Ok(other),
    }
}

fn object_keys(agent: &mut dyn Agent, info: &NativeCallInfo<'_>) -> Completion<Value> {
    let obj = om::to_object_or_throw(agent, &info.arg(0))?;
    let keys = om::own_property_keys(agent, obj)?;
    let arr = om::array_create(agent, 0);
    let mut n = 0;
    for key in keys {
        if matches!(key, PropertyKey::Symbol(_) | PropertyKey::Private(_)) {
            continue;
        }
        let Some(desc) = om::get_own_property(agent, obj, &key)? else {
            continue;
        };
        if desc.enumerable != Some(true) {
            continue;
        }
        om::create_data_property(agent, arr, &PropertyKey::Index(n), key.to_value())?;
        n += 1;
    }
    Ok(Value::Object(arr))
}

fn object_get_own_property_names(
    agent: &mut dyn Agent,
    info: &NativeCallInfo<'_>,
) -> Completion<Value> {
    let obj = om::to_object_or_throw(agent, &info.arg(0))?;
    let keys = om::own_property_keys(agent, obj)?;
    let arr = om::array_create(agent, 0);
    let mut n = 0;
    for key in keys {
        if matches!(key, PropertyKey::Symbol(_) | PropertyKey::Private(_)) {
            continue;
        }
        om::create_data_property(agent, arr, &PropertyKey::Index(n), key.to_value())?;
        n += 1;
    }
    Ok(Value::Object(arr))
}

fn object_get_prototype_of(
    agent: &mut dyn Agent,
    info: &NativeCallInfo<'_>,
) -> Completion<Value> {
    let obj = om::to_object_or_throw(agent, &info.arg(0))?;
    Ok(match om::get_prototype_of(agent, obj)? {
        Some(p) => Value::Object(p),
        None => Value::Null,
    })
}

fn object_define_property(
    agent: &mut dyn Agent,
    info: &NativeCallInfo<'_>,
) -> Completion<Value> {
    let obj = om::to_object_or_throw(agent, &info.arg(0))?;
    let key = om::to_property_key(agent, &info.arg(1))?;
    let desc_obj = om::to_object_or_throw(agent, &info.arg(2))?;
    let desc = om::descriptor_from_object(agent, desc_obj)?;
    let ok = om::define_own_property(agent, obj, &key, desc)?;
    if !ok {
        let msg = format!("cannot define property '{}'", key.to_display_string());
        return agent.type_error(&msg);
    }
    Ok(info.arg(0))
}

fn object_prevent_extensions(
    agent: &mut dyn Agent,
    info: &NativeCallInfo<'_>,
) -> Completion<Value> {
    if let Some(obj) = info.arg(0).as_object() {
        om::prevent_extensions(agent, obj)?;
    }
    Ok(info.arg(0))
}

fn object_assign(agent: &mut dyn Agent, info: &NativeCallInfo<'_>) -> Completion<Value> {
    let target = om::to_object_or_throw(agent, &info.arg(0))?;
    for source in info.args.iter().skip(1) {
        if source.is_nullish() {
            continue;
        }
        let Some(src) = source.as_object() else {
            continue;
        };
        let keys = om::own_property_keys(agent, src)?;
        for key in keys {
            let Some(desc) = om::get_own_property(agent, src, &key)? else {
                continue;
            };
            if desc.enumerable != Some(true) {
                continue;
            }
            let value = om::get(agent, src, &key, source)?;
            let receiver = Value::Object(target);
            om::set(agent, target, &key, value, &receiver)?;
        }
    }
    Ok(Value::Object(target))
}

fn proto_has_own_property(
    agent: &mut dyn Agent,
    info: &NativeCallInfo<'_>,
) -> Completion<Value> {
    let obj = this_object(agent, info, "Object.prototype.hasOwnProperty")?;
    let key = om::to_property_key(agent, &info.arg(0))?;
    Ok(Value::Boolean(
        om::get_own_property(agent, obj, &key)?.is_some(),
    ))
}

fn proto_to_string(agent: &mut dyn Agent, info: &NativeCallInfo<'_>) -> Completion<Value> {
    let tag = match &info.this {
        Value::Undefined => "Undefined",
        Value::Null => "Null",
        Value::Object(id) => match &agent.heap_ref().object(*id).kind {
            memory_manager::ObjectKind::Array { .. } => "Array",
            memory_manager::ObjectKind::Error { .. } => "Error",
            k if agent.heap_ref().object(*id).is_callable() => {
                let _ = k;
                "Function"
            }
            _ => "Object",
        },
        _ => "Object",
    };
    Ok(Value::string(&format!("[object {}]", tag)))
}

fn proto_value_of(_agent: &mut dyn Agent, info: &NativeCallInfo<'_>) -> Completion<Value> {
    Ok(info.this.clone())
}

fn proto_is_prototype_of(
    agent: &mut dyn Agent,
    info: &NativeCallInfo<'_>,
) -> Completion<Value> {
    let Some(target) = info.arg(0).as_object() else {
        return Ok(Value::Boolean(false));
    };
    let Some(this_id) = info.this.as_object() else {
        return Ok(Value::Boolean(false));
    };
    let mut cur = om::get_prototype_of(agent, target)?;
    while let Some(p) = cur {
        if p == this_id {
            return Ok(Value::Boolean(true));
        }
        cur = om::get_prototype_of(agent, p)?;
    }
    Ok(Value::Boolean(false))
}
