//! `Proxy` constructor (with `Proxy.revocable`).

use core_types::{Completion, PropertyKey, Value};
use memory_manager::{
    Agent, AgentErrors, BuiltinFunctionData, Heap, JsObject, NativeCallInfo, ObjectKind, Property, Realm,
};
use object_model as om;

use crate::helpers::{data_hidden, method, native_fn};

pub(crate) fn install(heap: &mut Heap, realm: &Realm) {
    let i = &realm.intrinsics;
    let fp = i.function_prototype;
    // Proxy has no prototype property
    let ctor = heap.alloc_object(JsObject::with_kind(
        Some(fp),
        ObjectKind::Builtin(BuiltinFunctionData {
            func: proxy_constructor,
            name: core_types::JsString::from_str("Proxy"),
            length: 2,
            constructable: true,
            captured: Vec::new(),
        }),
    ));
    data_hidden(heap, realm.global_object, "Proxy", Value::Object(ctor));
    method(heap, fp, ctor, "revocable", 2, proxy_revocable);
}

fn proxy_constructor(agent: &mut dyn Agent, info: &NativeCallInfo<'_>) -> Completion<Value> {
    if info.new_target.is_undefined() {
        return agent.type_error("constructor Proxy requires 'new'");
    }
    make_proxy(agent, info.arg(0), info.arg(1))
}

fn make_proxy(agent: &mut dyn Agent, target: Value, handler: Value) -> Completion<Value> {
    let (Some(target), Some(handler)) = (target.as_object(), handler.as_object()) else {
        return agent.type_error("cannot create proxy with a non-object target or handler");
    };
    Ok(Value::Object(agent.heap().alloc_object(JsObject::with_kind(
        None,
        ObjectKind::Proxy {
            target: Some(target),
            handler: Some(handler),
        },
    ))))
}

fn proxy_revocable(agent: &mut dyn Agent, info: &NativeCallInfo<'_>) -> Completion<Value> {
    let proxy = make_proxy(agent, info.arg(0), info.arg(1))?;
    let fp = agent.realm().intrinsics.function_prototype;
    let revoke = {
        let f = native_fn(agent.heap(), fp, "revoke", 0, revoke_fn);
        if let ObjectKind::Builtin(b) = &mut agent.heap().object_mut(f).kind {
            b.captured.push(proxy.clone());
        }
        f
    };
    let result_proto = agent.realm().intrinsics.object_prototype;
    let result = agent
        .heap()
        .alloc_object(JsObject::ordinary(Some(result_proto)));
    agent
        .heap()
        .object_mut(result)
        .set_property(PropertyKey::from_str("proxy"), Property::data(proxy));
    agent.heap().object_mut(result).set_property(
        PropertyKey::from_str("revoke"),
        Property::data(Value::Object(revoke)),
    );
    Ok(Value::Object(result))
}

fn revoke_fn(agent: &mut dyn Agent, info: &NativeCallInfo<'_>) -> Completion<Value> {
    let captured = match &agent.heap_ref().object(info.callee).kind {
        ObjectKind::Builtin(b) => b.captured.first().cloned(),
        _ => None,
    };
    if let Some(id) = captured.and_then(|v| v.as_object()) {
        if let ObjectKind::Proxy { target, handler } = &mut agent.heap().object_mut(id).kind {
            *target = None;
            *handler = None;
        }
    }
    Ok(Value::Undefined)
}
