//! Array exotic behaviour: the `length` coupling.
//!
//! `length` is virtualized out of the object's payload: reads
//! synthesize its descriptor, writes may delete trailing indices in
//! descending order and stop at the first non-configurable one, and
//! defining an index at or past `length` extends it.

use core_types::{Completion, ObjectId, PropertyKey, Value};
use memory_manager::{Agent, AgentErrors, ObjectKind};

use crate::descriptor::PropertyDescriptor;
use crate::operations::{to_number, to_uint32};
use crate::ordinary;

/// Array payload accessors.
fn array_parts(agent: &dyn Agent, obj: ObjectId) -> (u32, bool) {
    match agent.heap_ref().object(obj).kind {
        ObjectKind::Array {
            length,
            length_writable,
        } => (length, length_writable),
        _ => unreachable!("array method on non-array"),
    }
}

fn store_length(agent: &mut dyn Agent, obj: ObjectId, length: u32, writable: bool) {
    if let ObjectKind::Array {
        length: l,
        length_writable: w,
    } = &mut agent.heap().object_mut(obj).kind
    {
        *l = length;
        *w = writable;
    }
}

/// The synthesized own descriptor for `length`.
pub fn length_descriptor(agent: &dyn Agent, obj: ObjectId) -> PropertyDescriptor {
    let (length, writable) = array_parts(agent, obj);
    PropertyDescriptor {
        value: Some(Value::Number(length as f64)),
        writable: Some(writable),
        enumerable: Some(false),
        configurable: Some(false),
        ..Default::default()
    }
}

/// `ArrayDefineOwnProperty`.
pub fn define_own_property(
    agent: &mut dyn Agent,
    obj: ObjectId,
    key: &PropertyKey,
    desc: PropertyDescriptor,
) -> Completion<bool> {
    if let PropertyKey::String(s) = key {
        if s.as_str() == "length" {
            return set_length(agent, obj, desc);
        }
    }
    if let PropertyKey::Index(i) = key {
        let (length, length_writable) = array_parts(agent, obj);
        if *i >= length && !length_writable {
            return Ok(false);
        }
        let ok = ordinary::define_own_property(agent, obj, key, desc)?;
        if ok && *i >= length {
            store_length(agent, obj, i + 1, length_writable);
        }
        return Ok(ok);
    }
    ordinary::define_own_property(agent, obj, key, desc)
}

/// `ArraySetLength`.
fn set_length(
    agent: &mut dyn Agent,
    obj: ObjectId,
    desc: PropertyDescriptor,
) -> Completion<bool> {
    let (old_length, length_writable) = array_parts(agent, obj);

    let Some(value) = desc.value.clone() else {
        // attribute-only change (e.g. freezing length)
        if desc.configurable == Some(true) || desc.enumerable == Some(true) {
            return Ok(false);
        }
        if let Some(w) = desc.writable {
            if w && !length_writable {
                return Ok(false);
            }
            store_length(agent, obj, old_length, w);
        }
        return Ok(true);
    };

    let new_len = to_uint32(agent, &value)?;
    let number_len = to_number(agent, &value)?;
    if new_len as f64 != number_len {
        return agent.range_error("invalid array length");
    }
    if !length_writable && new_len != old_length {
        return Ok(false);
    }

    if new_len < old_length {
        // Delete indices from high to low; a non-configurable one
        // stops the truncation and leaves length just above it.
        let doomed: Vec<u32> = agent
            .heap_ref()
            .object(obj)
            .elements
            .indices()
            .into_iter()
            .filter(|i| *i >= new_len)
            .rev()
            .collect();
        for i in doomed {
            let configurable = agent
                .heap_ref()
                .object(obj)
                .elements
                .get(i)
                .map(|p| p.configurable)
                .unwrap_or(true);
            if !configurable {
                store_length(agent, obj, i + 1, desc.writable.unwrap_or(length_writable));
                return Ok(false);
            }
            agent.heap().object_mut(obj).remove_property(&PropertyKey::Index(i));
        }
    }
    store_length(agent, obj, new_len, desc.writable.unwrap_or(length_writable));
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operations::array_create;
    use crate::protocol;
    use crate::test_agent::TestAgent;

    #[test]
    fn test_index_write_extends_length() {
        let mut agent = TestAgent::new();
        let arr = array_create(&mut agent, 0);
        protocol::set(
            &mut agent,
            arr,
            &PropertyKey::Index(4),
            Value::Number(1.0),
            &Value::Object(arr),
        )
        .unwrap();
        let len = protocol::get(
            &mut agent,
            arr,
            &PropertyKey::from_str("length"),
            &Value::Object(arr),
        )
        .unwrap();
        assert_eq!(len.as_number(), Some(5.0));
    }

    #[test]
    fn test_shrinking_length_deletes_indices() {
        let mut agent = TestAgent::new();
        let arr = array_create(&mut agent, 0);
        for i in 0..5 {
            protocol::set(
                &mut agent,
                arr,
                &PropertyKey::Index(i),
                Value::Number(i as f64),
                &Value::Object(arr),
            )
            .unwrap();
        }
        let ok = define_own_property(
            &mut agent,
            arr,
            &PropertyKey::from_str("length"),
            PropertyDescriptor::value_only(Value::Number(2.0)),
        )
        .unwrap();
        assert!(ok);
        assert!(protocol::get_own_property(&mut agent, arr, &PropertyKey::Index(4))
            .unwrap()
            .is_none());
        assert!(protocol::get_own_property(&mut agent, arr, &PropertyKey::Index(1))
            .unwrap()
            .is_some());
    }

    #[test]
    fn test_non_configurable_index_blocks_truncation() {
        let mut agent = TestAgent::new();
        let arr = array_create(&mut agent, 0);
        protocol::define_own_property(
            &mut agent,
            arr,
            &PropertyKey::Index(3),
            PropertyDescriptor::data(Value::Number(3.0), true, true, false),
        )
        .unwrap();
        let ok = define_own_property(
            &mut agent,
            arr,
            &PropertyKey::from_str("length"),
            PropertyDescriptor::value_only(Value::Number(0.0)),
        )
        .unwrap();
        assert!(!ok, "truncation past a non-configurable index must fail");
        let (len, _) = super::array_parts(&agent, arr);
        assert_eq!(len, 4, "length stops just above the blocking index");
    }

    #[test]
    fn test_non_integer_length_is_range_error() {
        let mut agent = TestAgent::new();
        let arr = array_create(&mut agent, 0);
        let result = define_own_property(
            &mut agent,
            arr,
            &PropertyKey::from_str("length"),
            PropertyDescriptor::value_only(Value::Number(1.5)),
        );
        assert!(result.is_err());
    }
}
