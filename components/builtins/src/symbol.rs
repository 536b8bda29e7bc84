//! `Symbol` constructor, registry functions and well-known symbols.

use core_types::{Completion, JsSymbol, PropertyKey, Value};
use memory_manager::{Agent, AgentErrors, Heap, NativeCallInfo, Property, PropertyValue, Realm};
use object_model as om;

use crate::helpers::{data_hidden, method, native_ctor};

pub(crate) fn install(heap: &mut Heap, realm: &Realm) {
    let i = &realm.intrinsics;
    let fp = i.function_prototype;
    let ctor = native_ctor(
        heap,
        fp,
        i.symbol_prototype,
        "Symbol",
        0,
        symbol_constructor,
    );
    data_hidden(heap, realm.global_object, "Symbol", Value::Object(ctor));
    method(heap, fp, ctor, "for", 1, symbol_for);
    method(heap, fp, ctor, "keyFor", 1, symbol_key_for);

    let frozen = |value: Value| Property {
        value: PropertyValue::Data {
            value,
            writable: false,
        },
        enumerable: false,
        configurable: false,
    };
    let wk = heap.well_known.clone();
    heap.object_mut(ctor).set_property(
        PropertyKey::from_str("iterator"),
        frozen(Value::Symbol(wk.iterator)),
    );
    heap.object_mut(ctor).set_property(
        PropertyKey::from_str("asyncIterator"),
        frozen(Value::Symbol(wk.async_iterator)),
    );
    heap.object_mut(ctor).set_property(
        PropertyKey::from_str("toPrimitive"),
        frozen(Value::Symbol(wk.to_primitive)),
    );
    heap.object_mut(ctor).set_property(
        PropertyKey::from_str("toStringTag"),
        frozen(Value::Symbol(wk.to_string_tag)),
    );
    heap.object_mut(ctor).set_property(
        PropertyKey::from_str("hasInstance"),
        frozen(Value::Symbol(wk.has_instance)),
    );

    method(heap, fp, i.symbol_prototype, "toString", 0, symbol_to_string);
}

fn symbol_constructor(agent: &mut dyn Agent, info: &NativeCallInfo<'_>) -> Completion<Value> {
    if !info.new_target.is_undefined() {
        return agent.type_error("Symbol is not a constructor");
    }
    let description = match info.arg(0) {
        Value::Undefined => None,
        other => Some(om::to_string(agent, &other)?),
    };
    Ok(Value::Symbol(JsSymbol::new(description)))
}

fn symbol_for(agent: &mut dyn Agent, info: &NativeCallInfo<'_>) -> Completion<Value> {
    let key = om::to_string(agent, &info.arg(0))?;
    Ok(Value::Symbol(agent.heap().symbol_for(key.as_str())))
}

fn symbol_key_for(agent: &mut dyn Agent, info: &NativeCallInfo<'_>) -> Completion<Value> {
    let Value::Symbol(sym) = info.arg(0) else {
        return agent.type_error("Symbol.keyFor expects a symbol");
    };
    Ok(match agent.heap_ref().symbol_key_for(&sym) {
        Some(key) => Value::string(key),
        None => Value::Undefined,
    })
}

fn symbol_to_string(agent: &mut dyn Agent, info: &NativeCallInfo<'_>) -> Completion<Value> {
    match &info.this {
        Value::Symbol(s) => Ok(Value::string(&s.to_string())),
        _ => agent.type_error("Symbol.prototype.toString requires a symbol"),
    }
}
