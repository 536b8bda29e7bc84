//! `Function.prototype`: call, apply, bind.

use core_types::{Completion, PropertyKey, Value};
use memory_manager::{
    Agent, AgentErrors, BoundFunctionData, Heap, JsObject, NativeCallInfo, ObjectKind, Realm,
};
use object_model as om;

use crate::helpers::{method, this_object};

pub(crate) fn install(heap: &mut Heap, realm: &Realm) {
    let i = &realm.intrinsics;
    let proto = i.function_prototype;
    method(heap, proto, proto, "call", 1, fn_call);
    method(heap, proto, proto, "apply", 2, fn_apply);
    method(heap, proto, proto, "bind", 1, fn_bind);
    method(heap, proto, proto, "toString", 0, fn_to_string);
}

fn fn_call(agent: &mut dyn Agent, info: &NativeCallInfo<'_>) -> Completion<Value> {
    let this_arg = info.arg(0);
    let rest: Vec<Value> = info.args.iter().skip(1).cloned().collect();
    agent.call(info.this.clone(), this_arg, &rest)
}

fn fn_apply(agent: &mut dyn Agent, info: &NativeCallInfo<'_>) -> Completion<Value> {
    let this_arg = info.arg(0);
    let list = info.arg(1);
    let args = match &list {
        Value::Undefined | Value::Null => Vec::new(),
        _ => {
            let id = om::to_object_or_throw(agent, &list)?;
            let length = om::get(agent, id, &PropertyKey::from_str("length"), &list)?;
            let length = om::to_uint32(agent, &length)?;
            let mut out = Vec::with_capacity(length as usize);
            for idx in 0..length {
                out.push(om::get(agent, id, &PropertyKey::Index(idx), &list)?);
            }
            out
        }
    };
    agent.call(info.this.clone(), this_arg, &args)
}

fn fn_bind(agent: &mut dyn Agent, info: &NativeCallInfo<'_>) -> Completion<Value> {
    let target = this_object(agent, info, "Function.prototype.bind")?;
    if !agent.heap_ref().object(target).is_callable() {
        return agent.type_error("Function.prototype.bind requires a function");
    }
    let bound_this = info.arg(0);
    let bound_args: Vec<Value> = info.args.iter().skip(1).cloned().collect();
    let proto = agent.realm().intrinsics.function_prototype;
    let bound = agent.heap().alloc_object(JsObject::with_kind(
        Some(proto),
        ObjectKind::Bound(BoundFunctionData {
            target,
            bound_this,
            bound_args,
        }),
    ));
    Ok(Value::Object(bound))
}

fn fn_to_string(agent: &mut dyn Agent, info: &NativeCallInfo<'_>) -> Completion<Value> {
    let name = match info.this.as_object() {
        Some(id) => match &agent.heap_ref().object(id).kind {
            ObjectKind::Builtin(b) => b.name.as_str().to_string(),
            ObjectKind::Function(f) => f.module.functions[f.func_index as usize].name.clone(),
            ObjectKind::Bound(_) => "bound".to_string(),
            _ => return agent.type_error("Function.prototype.toString requires a function"),
        },
        None => return agent.type_error("Function.prototype.toString requires a function"),
    };
    Ok(Value::string(&format!(
        "function {}() {{ [native code] }}",
        name
    )))
}
