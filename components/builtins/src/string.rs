//! String, Number, Boolean and BigInt prototypes (the slice the
//! engine's own tests exercise).

use core_types::{format_f64, Completion, Value};
use memory_manager::{Agent, AgentErrors, Heap, NativeCallInfo, Realm};
use object_model as om;

use crate::helpers::{data_hidden, method, native_ctor};

pub(crate) fn install(heap: &mut Heap, realm: &Realm) {
    let i = &realm.intrinsics;
    let fp = i.function_prototype;

    let string_ctor = native_ctor(
        heap,
        fp,
        i.string_prototype,
        "String",
        1,
        string_constructor,
    );
    data_hidden(heap, realm.global_object, "String", Value::Object(string_ctor));
    let sp = i.string_prototype;
    method(heap, fp, sp, "toUpperCase", 0, to_upper_case);
    method(heap, fp, sp, "toLowerCase", 0, to_lower_case);
    method(heap, fp, sp, "charAt", 1, char_at);
    method(heap, fp, sp, "indexOf", 1, index_of);
    method(heap, fp, sp, "includes", 1, includes);
    method(heap, fp, sp, "slice", 2, slice);
    method(heap, fp, sp, "split", 2, split);
    method(heap, fp, sp, "trim", 0, trim);
    method(heap, fp, sp, "toString", 0, string_to_string);
    method(heap, fp, sp, "valueOf", 0, string_to_string);

    let number_ctor = native_ctor(
        heap,
        fp,
        i.number_prototype,
        "Number",
        1,
        number_constructor,
    );
    data_hidden(heap, realm.global_object, "Number", Value::Object(number_ctor));
    method(heap, fp, number_ctor, "isInteger", 1, number_is_integer);
    method(heap, fp, i.number_prototype, "toString", 1, number_to_string);
    method(heap, fp, i.number_prototype, "valueOf", 0, number_value_of);

    let boolean_ctor = native_ctor(
        heap,
        fp,
        i.boolean_prototype,
        "Boolean",
        1,
        boolean_constructor,
    );
    data_hidden(heap, realm.global_object, "Boolean", Value::Object(boolean_ctor));

    method(heap, fp, i.bigint_prototype, "toString", 0, bigint_to_string);
}

fn this_string(agent: &mut dyn Agent, info: &NativeCallInfo<'_>) -> Completion<String> {
    match &info.this {
        Value::String(s) => Ok(s.as_str().to_string()),
        other => Ok(om::to_string(agent, other)?.as_str().to_string()),
    }
}

fn string_constructor(agent: &mut dyn Agent, info: &NativeCallInfo<'_>) -> Completion<Value> {
    match info.args.first() {
        None => Ok(Value::string("")),
        Some(v) => {
            let s = om::to_string(agent, v)?;
            Ok(Value::String(s))
        }
    }
}

fn string_to_string(agent: &mut dyn Agent, info: &NativeCallInfo<'_>) -> Completion<Value> {
    match &info.this {
        Value::String(_) => Ok(info.this.clone()),
        _ => agent.type_error("String.prototype.toString requires a string"),
    }
}

fn to_upper_case(agent: &mut dyn Agent, info: &NativeCallInfo<'_>) -> Completion<Value> {
    let s = this_string(agent, info)?;
    Ok(Value::string(&s.to_uppercase()))
}

fn to_lower_case(agent: &mut dyn Agent, info: &NativeCallInfo<'_>) -> Completion<Value> {
    let s = this_string(agent, info)?;
    Ok(Value::string(&s.to_lowercase()))
}

fn char_at(agent: &mut dyn Agent, info: &NativeCallInfo<'_>) -> Completion<Value> {
    let s = this_string(agent, info)?;
    let idx = om::to_number(agent, &info.arg(0))?;
    let idx = if idx.is_nan() { 0 } else { idx as i64 };
    let units: Vec<u16> = s.encode_utf16().collect();
    if idx < 0 || idx as usize >= units.len() {
        return Ok(Value::string(""));
    }
    Ok(Value::string(&String::from_utf16_lossy(&[units[idx as usize]])))
}

fn index_of(agent: &mut dyn Agent, info: &NativeCallInfo<'_>) -> Completion<Value> {
    let s = this_string(agent, info)?;
    let needle = om::to_string(agent, &info.arg(0))?;
    Ok(Value::Number(match s.find(needle.as_str()) {
        Some(byte_idx) => s[..byte_idx].encode_utf16().count() as f64,
        None => -1.0,
    }))
}

fn includes(agent: &mut dyn Agent, info: &NativeCallInfo<'_>) -> Completion<Value> {
    let s = this_string(agent, info)?;
    let needle = om::to_string(agent, &info.arg(0))?;
    Ok(Value::Boolean(s.contains(needle.as_str())))
}

fn slice(agent: &mut dyn Agent, info: &NativeCallInfo<'_>) -> Completion<Value> {
    let s = this_string(agent, info)?;
    let units: Vec<u16> = s.encode_utf16().collect();
    let len = units.len() as i64;
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
    if start >= end {
        return Ok(Value::string(""));
    }
    Ok(Value::string(&String::from_utf16_lossy(
        &units[start as usize..end as usize],
    )))
}

fn split(agent: &mut dyn Agent, info: &NativeCallInfo<'_>) -> Completion<Value> {
    let s = this_string(agent, info)?;
    let arr = om::array_create(agent, 0);
    let sep = info.arg(0);
    let parts: Vec<String> = match sep {
        Value::Undefined => vec![s],
        other => {
            let sep = om::to_string(agent, &other)?;
            if sep.as_str().is_empty() {
                s.chars().map(|c| c.to_string()).collect()
            } else {
                s.split(sep.as_str()).map(|p| p.to_string()).collect()
            }
        }
    };
    for (i, part) in parts.iter().enumerate() {
        om::create_data_property(
            agent,
            arr,
            &core_types::PropertyKey::Index(i as u32),
            Value::string(part),
        )?;
    }
    Ok(Value::Object(arr))
}

fn trim(agent: &mut dyn Agent, info: &NativeCallInfo<'_>) -> Completion<Value> {
    let s = this_string(agent, info)?;
    Ok(Value::string(s.trim()))
}

fn number_constructor(agent: &mut dyn Agent, info: &NativeCallInfo<'_>) -> Completion<Value> {
    match info.args.first() {
        None => Ok(Value::Number(0.0)),
        Some(v) => Ok(Value::Number(om::to_number(agent, v)?)),
    }
}

fn number_is_integer(_agent: &mut dyn Agent, info: &NativeCallInfo<'_>) -> Completion<Value> {
    Ok(Value::Boolean(matches!(
        info.arg(0),
        Value::Number(n) if n.is_finite() && n.fract() == 0.0
    )))
}

fn number_to_string(agent: &mut dyn Agent, info: &NativeCallInfo<'_>) -> Completion<Value> {
    match &info.this {
        Value::Number(n) => Ok(Value::string(&format_f64(*n))),
        _ => agent.type_error("Number.prototype.toString requires a number"),
    }
}

fn number_value_of(agent: &mut dyn Agent, info: &NativeCallInfo<'_>) -> Completion<Value> {
    match &info.this {
        Value::Number(_) => Ok(info.this.clone()),
        _ => agent.type_error("Number.prototype.valueOf requires a number"),
    }
}

fn boolean_constructor(_agent: &mut dyn Agent, info: &NativeCallInfo<'_>) -> Completion<Value> {
    Ok(Value::Boolean(info.arg(0).is_truthy()))
}

fn bigint_to_string(agent: &mut dyn Agent, info: &NativeCallInfo<'_>) -> Completion<Value> {
    match &info.this {
        Value::BigInt(b) => Ok(Value::string(&b.to_string())),
        _ => agent.type_error("BigInt.prototype.toString requires a BigInt"),
    }
}
