//! Global functions and the console object.

use core_types::{parse_number_literal, Completion, PropertyKey, Value};
use memory_manager::{Agent, AgentErrors, Heap, JsObject, NativeCallInfo, Property, Realm};
use object_model as om;

use crate::helpers::{data_hidden, method, native_fn};

pub(crate) fn install(heap: &mut Heap, realm: &Realm) {
    let i = &realm.intrinsics;
    let fp = i.function_prototype;
    let global = realm.global_object;

    for (name, len, func) in [
        ("isNaN", 1, global_is_nan as memory_manager::NativeFn),
        ("isFinite", 1, global_is_finite),
        ("parseInt", 2, global_parse_int),
        ("parseFloat", 1, global_parse_float),
        ("queueMicrotask", 1, global_queue_microtask),
    ] {
        let f = native_fn(heap, fp, name, len, func);
        data_hidden(heap, global, name, Value::Object(f));
    }

    let console = heap.alloc_object(JsObject::ordinary(Some(i.object_prototype)));
    method(heap, fp, console, "log", 0, console_log);
    method(heap, fp, console, "error", 0, console_error);
    method(heap, fp, console, "warn", 0, console_log);
    heap.object_mut(global).set_property(
        PropertyKey::from_str("console"),
        Property::data(Value::Object(console)),
    );
}

fn global_is_nan(agent: &mut dyn Agent, info: &NativeCallInfo<'_>) -> Completion<Value> {
    let n = om::to_number(agent, &info.arg(0))?;
    Ok(Value::Boolean(n.is_nan()))
}

fn global_is_finite(agent: &mut dyn Agent, info: &NativeCallInfo<'_>) -> Completion<Value> {
    let n = om::to_number(agent, &info.arg(0))?;
    Ok(Value::Boolean(n.is_finite()))
}

fn global_parse_int(agent: &mut dyn Agent, info: &NativeCallInfo<'_>) -> Completion<Value> {
    let text = om::to_string(agent, &info.arg(0))?;
    let radix = om::to_number(agent, &info.arg(1))? as u32;
    let t = text.as_str().trim();
    let (neg, t) = match t.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, t.strip_prefix('+').unwrap_or(t)),
    };
    let (radix, t) = if radix == 16 || (radix == 0 && (t.starts_with("0x") || t.starts_with("0X")))
    {
        (16, t.trim_start_matches("0x").trim_start_matches("0X"))
    } else if radix == 0 {
        (10, t)
    } else {
        (radix, t)
    };
    if !(2..=36).contains(&radix) {
        return Ok(Value::Number(f64::NAN));
    }
    let digits: String = t
        .chars()
        .take_while(|c| c.to_digit(radix).is_some())
        .collect();
    if digits.is_empty() {
        return Ok(Value::Number(f64::NAN));
    }
    let mut n = 0.0f64;
    for c in digits.chars() {
        n = n * radix as f64 + c.to_digit(radix).unwrap_or(0) as f64;
    }
    Ok(Value::Number(if neg { -n } else { n }))
}

fn global_parse_float(agent: &mut dyn Agent, info: &NativeCallInfo<'_>) -> Completion<Value> {
    let text = om::to_string(agent, &info.arg(0))?;
    let t = text.as_str().trim();
    // longest numeric prefix
    let mut end = 0;
    for i in (0..=t.len()).rev() {
        if t.is_char_boundary(i) && t[..i].parse::<f64>().is_ok() {
            end = i;
            break;
        }
    }
    Ok(Value::Number(match &t[..end] {
        "" => f64::NAN,
        prefix => parse_number_literal(prefix).unwrap_or(f64::NAN),
    }))
}

fn global_queue_microtask(
    agent: &mut dyn Agent,
    info: &NativeCallInfo<'_>,
) -> Completion<Value> {
    let callback = info.arg(0);
    if !om::is_callable(agent, &callback) {
        return agent.type_error("queueMicrotask expects a function");
    }
    agent.enqueue_reaction(
        memory_manager::Reaction {
            capability: None,
            handler: memory_manager::ReactionHandler::Function(
                callback.as_object().expect("callable is an object"),
            ),
        },
        Value::Undefined,
    );
    Ok(Value::Undefined)
}

fn print_values(agent: &mut dyn Agent, info: &NativeCallInfo<'_>) -> Completion<String> {
    let mut parts = Vec::with_capacity(info.args.len());
    for v in info.args {
        let text = match v {
            Value::String(s) => s.as_str().to_string(),
            other => om::to_string(agent, other)
                .map(|s| s.as_str().to_string())
                .unwrap_or_else(|_| format!("{:?}", other)),
        };
        parts.push(text);
    }
    Ok(parts.join(" "))
}

fn console_log(agent: &mut dyn Agent, info: &NativeCallInfo<'_>) -> Completion<Value> {
    let line = print_values(agent, info)?;
    println!("{}", line);
    Ok(Value::Undefined)
}

fn console_error(agent: &mut dyn Agent, info: &NativeCallInfo<'_>) -> Completion<Value> {
    let line = print_values(agent, info)?;
    eprintln!("{}", line);
    Ok(Value::Undefined)
}
