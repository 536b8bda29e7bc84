//! The `Error` constructor family.

use core_types::{Completion, ErrorKind, ObjectId, PropertyKey, Value};
use memory_manager::{Agent, Heap, JsObject, NativeCallInfo, ObjectKind, Realm};
use object_model as om;

use crate::helpers::{data, data_hidden, method, native_ctor};

pub(crate) fn install(heap: &mut Heap, realm: &Realm) {
    let i = &realm.intrinsics;
    let fp = i.function_prototype;

    let kinds: [(&str, ErrorKind, ObjectId); 7] = [
        ("Error", ErrorKind::InternalError, i.error_prototype),
        ("TypeError", ErrorKind::TypeError, i.type_error_prototype),
        ("RangeError", ErrorKind::RangeError, i.range_error_prototype),
        (
            "ReferenceError",
            ErrorKind::ReferenceError,
            i.reference_error_prototype,
        ),
        ("SyntaxError", ErrorKind::SyntaxError, i.syntax_error_prototype),
        ("URIError", ErrorKind::URIError, i.uri_error_prototype),
        ("EvalError", ErrorKind::EvalError, i.eval_error_prototype),
    ];
    for (name, _, proto) in kinds {
        let func = match name {
            "Error" => error_constructor,
            "TypeError" => type_error_constructor,
            "RangeError" => range_error_constructor,
            "ReferenceError" => reference_error_constructor,
            "SyntaxError" => syntax_error_constructor,
            "URIError" => uri_error_constructor,
            _ => eval_error_constructor,
        };
        let ctor = native_ctor(heap, fp, proto, name, 1, func);
        data_hidden(heap, realm.global_object, name, Value::Object(ctor));
        data(heap, proto, "name", Value::string(name));
        data(heap, proto, "message", Value::string(""));
    }
    method(heap, fp, i.error_prototype, "toString", 0, error_to_string);
}

fn construct_error(
    agent: &mut dyn Agent,
    info: &NativeCallInfo<'_>,
    kind: ErrorKind,
) -> Completion<Value> {
    let proto = agent.realm().intrinsics.error_prototype_for(kind);
    let id = agent
        .heap()
        .alloc_object(JsObject::with_kind(Some(proto), ObjectKind::Error { kind }));
    let message = info.arg(0);
    if !message.is_undefined() {
        let text = om::to_string(agent, &message)?;
        agent.heap().object_mut(id).set_property(
            PropertyKey::from_str("message"),
            memory_manager::Property::method(Value::String(text)),
        );
    }
    Ok(Value::Object(id))
}

fn error_constructor(agent: &mut dyn Agent, info: &NativeCallInfo<'_>) -> Completion<Value> {
    construct_error(agent, info, ErrorKind::InternalError)
}

fn type_error_constructor(agent: &mut dyn Agent, info: &NativeCallInfo<'_>) -> Completion<Value> {
    construct_error(agent, info, ErrorKind::TypeError)
}

fn range_error_constructor(agent: &mut dyn Agent, info: &NativeCallInfo<'_>) -> Completion<Value> {
    construct_error(agent, info, ErrorKind::RangeError)
}

fn reference_error_constructor(
    agent: &mut dyn Agent,
    info: &NativeCallInfo<'_>,
) -> Completion<Value> {
    construct_error(agent, info, ErrorKind::ReferenceError)
}

fn syntax_error_constructor(
    agent: &mut dyn Agent,
    info: &NativeCallInfo<'_>,
) -> Completion<Value> {
    construct_error(agent, info, ErrorKind::SyntaxError)
}

fn uri_error_constructor(agent: &mut dyn Agent, info: &NativeCallInfo<'_>) -> Completion<Value> {
    construct_error(agent, info, ErrorKind::URIError)
}

fn eval_error_constructor(agent: &mut dyn Agent, info: &NativeCallInfo<'_>) -> Completion<Value> {
    construct_error(agent, info, ErrorKind::EvalError)
}

fn error_to_string(agent: &mut dyn Agent, info: &NativeCallInfo<'_>) -> Completion<Value> {
    let name = om::get_v(agent, &info.this, &PropertyKey::from_str("name"))?;
    let message = om::get_v(agent, &info.this, &PropertyKey::from_str("message"))?;
    let name = if name.is_undefined() {
        "Error".to_string()
    } else {
        om::to_string(agent, &name)?.as_str().to_string()
    };
    let message = if message.is_undefined() {
        String::new()
    } else {
        om::to_string(agent, &message)?.as_str().to_string()
    };
    let text = if message.is_empty() {
        name
    } else if name.is_empty() {
        message
    } else {
        format!("{}: {}", name, message)
    };
    Ok(Value::string(&text))
}
