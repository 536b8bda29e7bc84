//! `Promise` constructor and prototype, over the shared promise
//! operations.

use async_runtime as ar;
use core_types::{Completion, PropertyKey, Thrown, Value};
use memory_manager::{Agent, AgentErrors, Heap, NativeCallInfo, ObjectKind, ReactionHandler, Realm};
use object_model as om;

use crate::helpers::{data_hidden, method, native_ctor, this_object};

pub(crate) fn install(heap: &mut Heap, realm: &Realm) {
    let i = &realm.intrinsics;
    let fp = i.function_prototype;
    let ctor = native_ctor(
        heap,
        fp,
        i.promise_prototype,
        "Promise",
        1,
        promise_constructor,
    );
    data_hidden(heap, realm.global_object, "Promise", Value::Object(ctor));
    method(heap, fp, ctor, "resolve", 1, promise_resolve);
    method(heap, fp, ctor, "reject", 1, promise_reject);
    method(heap, fp, i.promise_prototype, "then", 2, promise_then);
    method(heap, fp, i.promise_prototype, "catch", 1, promise_catch);
    method(heap, fp, i.promise_prototype, "finally", 1, promise_finally);
}

fn promise_constructor(agent: &mut dyn Agent, info: &NativeCallInfo<'_>) -> Completion<Value> {
    if info.new_target.is_undefined() {
        return agent.type_error("constructor Promise requires 'new'");
    }
    let executor = info.arg(0);
    if !om::is_callable(agent, &executor) {
        return agent.type_error("promise executor is not a function");
    }
    let promise = ar::new_promise(agent);
    let (resolve, reject) = ar::make_resolving_functions(agent, promise);
    match agent.call(executor, Value::Undefined, &[resolve, reject.clone()]) {
        Ok(_) => {}
        Err(Thrown(reason)) => {
            agent.call(reject, Value::Undefined, &[reason])?;
        }
    }
    Ok(Value::Object(promise))
}

fn promise_resolve(agent: &mut dyn Agent, info: &NativeCallInfo<'_>) -> Completion<Value> {
    let promise = ar::promise_resolve_value(agent, info.arg(0))?;
    Ok(Value::Object(promise))
}

fn promise_reject(agent: &mut dyn Agent, info: &NativeCallInfo<'_>) -> Completion<Value> {
    let promise = ar::new_promise(agent);
    ar::reject_promise(agent, promise, info.arg(0));
    Ok(Value::Object(promise))
}

fn handler_for(agent: &dyn Agent, v: Value, fallback: ReactionHandler) -> ReactionHandler {
    match v.as_object() {
        Some(id) if agent.heap_ref().object(id).is_callable() => ReactionHandler::Function(id),
        _ => fallback,
    }
}

fn promise_then(agent: &mut dyn Agent, info: &NativeCallInfo<'_>) -> Completion<Value> {
    let promise = this_object(agent, info, "Promise.prototype.then")?;
    if !matches!(agent.heap_ref().object(promise).kind, ObjectKind::Promise(_)) {
        return agent.type_error("Promise.prototype.then called on a non-promise");
    }
    let on_fulfilled = handler_for(agent, info.arg(0), ReactionHandler::Identity);
    let on_rejected = handler_for(agent, info.arg(1), ReactionHandler::Thrower);
    let derived = ar::new_promise(agent);
    ar::perform_then(agent, promise, on_fulfilled, on_rejected, Some(derived));
    Ok(Value::Object(derived))
}

fn promise_catch(agent: &mut dyn Agent, info: &NativeCallInfo<'_>) -> Completion<Value> {
    let then = om::get_v(agent, &info.this, &PropertyKey::from_str("then"))?;
    agent.call(then, info.this.clone(), &[Value::Undefined, info.arg(0)])
}

fn promise_finally(agent: &mut dyn Agent, info: &NativeCallInfo<'_>) -> Completion<Value> {
    // both paths run the callback; settlement passes through
    let then = om::get_v(agent, &info.this, &PropertyKey::from_str("then"))?;
    let callback = info.arg(0);
    agent.call(then, info.this.clone(), &[callback.clone(), callback])
}
