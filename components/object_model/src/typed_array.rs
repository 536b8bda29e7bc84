//! Integer-indexed (typed array) exotic behaviour.
//!
//! Numeric keys are canonicalized and bounds-checked against the view
//! and its buffer's detach state; out-of-range stores are silently
//! dropped, string keys fall through to the ordinary path.

use core_types::{Completion, ObjectId, PropertyKey, Value};
use memory_manager::{Agent, ObjectKind, TypedArrayData};

use crate::descriptor::PropertyDescriptor;
use crate::operations::to_number;

fn view(agent: &dyn Agent, obj: ObjectId) -> TypedArrayData {
    match &agent.heap_ref().object(obj).kind {
        ObjectKind::IntegerIndexed(t) => t.clone(),
        _ => unreachable!("typed-array method on non-view"),
    }
}

/// A numeric key valid for the view: in range, buffer attached.
fn valid_index(agent: &dyn Agent, ta: &TypedArrayData, index: u32) -> bool {
    let buffer = agent.heap_ref().object(ta.buffer);
    match &buffer.kind {
        ObjectKind::ArrayBuffer(b) => !b.is_detached() && (index as usize) < ta.length,
        _ => false,
    }
}

/// Whether a string spells a canonical numeric value that is not an
/// array index (`"1.5"`, `"-0"`, `"NaN"`); such keys are numeric for
/// the view but never valid, so access is absorbed.
pub fn is_canonical_numeric_string(s: &str) -> bool {
    if s == "NaN" || s == "Infinity" || s == "-Infinity" || s == "-0" {
        return true;
    }
    match s.parse::<f64>() {
        Ok(n) => core_types::format_f64(n) == s,
        Err(_) => false,
    }
}

/// Typed-array `[[GetOwnProperty]]` for numeric keys; `None` routes
/// to the ordinary path.
pub fn get_own_property(
    agent: &mut dyn Agent,
    obj: ObjectId,
    key: &PropertyKey,
) -> Option<Option<PropertyDescriptor>> {
    match key {
        PropertyKey::Index(i) => {
            let ta = view(agent, obj);
            if !valid_index(agent, &ta, *i) {
                return Some(None);
            }
            let value = read_element(agent, &ta, *i);
            Some(Some(PropertyDescriptor::data(value, true, true, true)))
        }
        PropertyKey::String(s) if is_canonical_numeric_string(s.as_str()) => Some(None),
        _ => None,
    }
}

/// Typed-array `[[Set]]` for numeric keys; `None` routes to the
/// ordinary path. Out-of-range numeric stores succeed silently.
pub fn set(
    agent: &mut dyn Agent,
    obj: ObjectId,
    key: &PropertyKey,
    value: &Value,
) -> Option<Completion<bool>> {
    let index = match key {
        PropertyKey::Index(i) => Some(*i),
        PropertyKey::String(s) if is_canonical_numeric_string(s.as_str()) => None,
        _ => return None,
    };
    let ta = view(agent, obj);
    let n = match to_number(agent, value) {
        Ok(n) => n,
        Err(e) => return Some(Err(e)),
    };
    if let Some(i) = index {
        if valid_index(agent, &ta, i) {
            write_element(agent, &ta, i, n);
        }
    }
    Some(Ok(true))
}

/// Typed-array `[[DefineOwnProperty]]` for numeric keys.
pub fn define_own_property(
    agent: &mut dyn Agent,
    obj: ObjectId,
    key: &PropertyKey,
    desc: &PropertyDescriptor,
) -> Option<Completion<bool>> {
    let PropertyKey::Index(i) = key else {
        if let PropertyKey::String(s) = key {
            if is_canonical_numeric_string(s.as_str()) {
                return Some(Ok(false));
            }
        }
        return None;
    };
    let ta = view(agent, obj);
    if !valid_index(agent, &ta, *i) {
        return Some(Ok(false));
    }
    if desc.is_accessor()
        || desc.configurable == Some(false)
        || desc.enumerable == Some(false)
        || desc.writable == Some(false)
    {
        return Some(Ok(false));
    }
    match &desc.value {
        Some(v) => {
            let n = match to_number(agent, v) {
                Ok(n) => n,
                Err(e) => return Some(Err(e)),
            };
            write_element(agent, &ta, *i, n);
            Some(Ok(true))
        }
        None => Some(Ok(true)),
    }
}

/// Ascending element keys for `own-keys`.
pub fn element_keys(agent: &dyn Agent, obj: ObjectId) -> Vec<PropertyKey> {
    let ta = view(agent, obj);
    let live = {
        let buffer = agent.heap_ref().object(ta.buffer);
        match &buffer.kind {
            ObjectKind::ArrayBuffer(b) => !b.is_detached(),
            _ => false,
        }
    };
    if !live {
        return Vec::new();
    }
    (0..ta.length as u32).map(PropertyKey::Index).collect()
}

fn read_element(agent: &dyn Agent, ta: &TypedArrayData, index: u32) -> Value {
    let buffer = agent.heap_ref().object(ta.buffer);
    if let ObjectKind::ArrayBuffer(b) = &buffer.kind {
        if let Some(block) = &b.block {
            if let Some(n) = ta.read_element(block, index as usize) {
                return Value::Number(n);
            }
        }
    }
    Value::Undefined
}

fn write_element(agent: &mut dyn Agent, ta: &TypedArrayData, index: u32, value: f64) {
    let block = {
        let buffer = agent.heap_ref().object(ta.buffer);
        match &buffer.kind {
            ObjectKind::ArrayBuffer(b) => b.block.clone(),
            _ => None,
        }
    };
    if let Some(block) = block {
        ta.write_element(&block, index as usize, value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol;
    use crate::test_agent::TestAgent;
    use memory_manager::{ArrayBufferData, DataBlock, ElementType, JsObject};

    fn make_view(agent: &mut TestAgent, len: usize) -> ObjectId {
        let block = DataBlock::new(len * 4);
        let buffer = agent.heap.alloc_object(JsObject::with_kind(
            None,
            ObjectKind::ArrayBuffer(ArrayBufferData {
                block: Some(block),
                byte_length: len * 4,
                shared: false,
            }),
        ));
        agent.heap.alloc_object(JsObject::with_kind(
            None,
            ObjectKind::IntegerIndexed(TypedArrayData {
                buffer,
                element_type: ElementType::Int32,
                byte_offset: 0,
                length: len,
            }),
        ))
    }

    #[test]
    fn test_in_range_read_write() {
        let mut agent = TestAgent::new();
        let ta = make_view(&mut agent, 4);
        protocol::set(
            &mut agent,
            ta,
            &PropertyKey::Index(2),
            Value::Number(41.0),
            &Value::Object(ta),
        )
        .unwrap();
        let v = protocol::get(&mut agent, ta, &PropertyKey::Index(2), &Value::Object(ta)).unwrap();
        assert_eq!(v.as_number(), Some(41.0));
    }

    #[test]
    fn test_out_of_range_set_silently_ignored() {
        let mut agent = TestAgent::new();
        let ta = make_view(&mut agent, 2);
        let ok = protocol::set(
            &mut agent,
            ta,
            &PropertyKey::Index(10),
            Value::Number(1.0),
            &Value::Object(ta),
        )
        .unwrap();
        assert!(ok);
        let v =
            protocol::get(&mut agent, ta, &PropertyKey::Index(10), &Value::Object(ta)).unwrap();
        assert!(v.is_undefined());
        // no ordinary property leaked through
        assert!(agent.heap.object(ta).own_property(&PropertyKey::Index(10)).is_none());
    }

    #[test]
    fn test_detached_buffer_reads_undefined() {
        let mut agent = TestAgent::new();
        let ta = make_view(&mut agent, 2);
        let buffer = match &agent.heap.object(ta).kind {
            ObjectKind::IntegerIndexed(t) => t.buffer,
            _ => unreachable!(),
        };
        if let ObjectKind::ArrayBuffer(b) = &mut agent.heap.object_mut(buffer).kind {
            b.block = None;
        }
        let v = protocol::get(&mut agent, ta, &PropertyKey::Index(0), &Value::Object(ta)).unwrap();
        assert!(v.is_undefined());
    }

    #[test]
    fn test_string_keys_fall_through_to_ordinary() {
        let mut agent = TestAgent::new();
        let ta = make_view(&mut agent, 2);
        protocol::set(
            &mut agent,
            ta,
            &PropertyKey::from_str("tag"),
            Value::string("x"),
            &Value::Object(ta),
        )
        .unwrap();
        let v = protocol::get(
            &mut agent,
            ta,
            &PropertyKey::from_str("tag"),
            &Value::Object(ta),
        )
        .unwrap();
        assert_eq!(v.as_string().unwrap().as_str(), "x");
    }

    #[test]
    fn test_canonical_numeric_string_detection() {
        assert!(is_canonical_numeric_string("1.5"));
        assert!(is_canonical_numeric_string("-0"));
        assert!(is_canonical_numeric_string("NaN"));
        assert!(!is_canonical_numeric_string("01"));
        assert!(!is_canonical_numeric_string("tag"));
    }
}
