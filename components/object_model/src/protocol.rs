//! The essential-internal-method dispatch table.
//!
//! Every caller in the engine goes through these functions; they
//! route to the ordinary algorithms or the exotic override for the
//! object's kind.

use core_types::{Completion, ObjectId, PropertyKey, Value};
use memory_manager::{Agent, ObjectKind};

use crate::descriptor::PropertyDescriptor;
use crate::{array, ordinary, proxy, typed_array};

#[derive(Clone, Copy, PartialEq, Eq)]
enum Dispatch {
    Ordinary,
    Array,
    TypedArray,
    Proxy,
}

fn dispatch(agent: &dyn Agent, obj: ObjectId) -> Dispatch {
    match agent.heap_ref().object(obj).kind {
        ObjectKind::Proxy { .. } => Dispatch::Proxy,
        ObjectKind::Array { .. } => Dispatch::Array,
        ObjectKind::IntegerIndexed(_) => Dispatch::TypedArray,
        _ => Dispatch::Ordinary,
    }
}

fn is_length_key(key: &PropertyKey) -> bool {
    matches!(key, PropertyKey::String(s) if s.as_str() == "length")
}

/// `[[GetPrototypeOf]]`
pub fn get_prototype_of(agent: &mut dyn Agent, obj: ObjectId) -> Completion<Option<ObjectId>> {
    match dispatch(agent, obj) {
        Dispatch::Proxy => proxy::get_prototype_of(agent, obj),
        _ => Ok(ordinary::get_prototype_of(agent, obj)),
    }
}

/// `[[SetPrototypeOf]]`
pub fn set_prototype_of(
    agent: &mut dyn Agent,
    obj: ObjectId,
    proto: Option<ObjectId>,
) -> Completion<bool> {
    match dispatch(agent, obj) {
        Dispatch::Proxy => proxy::set_prototype_of(agent, obj, proto),
        _ => Ok(ordinary::set_prototype_of(agent, obj, proto)),
    }
}

/// `[[IsExtensible]]`
pub fn is_extensible(agent: &mut dyn Agent, obj: ObjectId) -> Completion<bool> {
    match dispatch(agent, obj) {
        Dispatch::Proxy => proxy::is_extensible(agent, obj),
        _ => Ok(ordinary::is_extensible(agent, obj)),
    }
}

/// `[[PreventExtensions]]`
pub fn prevent_extensions(agent: &mut dyn Agent, obj: ObjectId) -> Completion<bool> {
    match dispatch(agent, obj) {
        Dispatch::Proxy => proxy::prevent_extensions(agent, obj),
        _ => Ok(ordinary::prevent_extensions(agent, obj)),
    }
}

/// `[[GetOwnProperty]]`
pub fn get_own_property(
    agent: &mut dyn Agent,
    obj: ObjectId,
    key: &PropertyKey,
) -> Completion<Option<PropertyDescriptor>> {
    match dispatch(agent, obj) {
        Dispatch::Proxy => proxy::get_own_property(agent, obj, key),
        Dispatch::Array if is_length_key(key) => Ok(Some(array::length_descriptor(agent, obj))),
        Dispatch::TypedArray => match typed_array::get_own_property(agent, obj, key) {
            Some(result) => Ok(result),
            None => Ok(ordinary::get_own_property(agent, obj, key)),
        },
        _ => Ok(ordinary::get_own_property(agent, obj, key)),
    }
}

/// `[[DefineOwnProperty]]`
pub fn define_own_property(
    agent: &mut dyn Agent,
    obj: ObjectId,
    key: &PropertyKey,
    desc: PropertyDescriptor,
) -> Completion<bool> {
    match dispatch(agent, obj) {
        Dispatch::Proxy => proxy::define_own_property(agent, obj, key, desc),
        Dispatch::Array => array::define_own_property(agent, obj, key, desc),
        Dispatch::TypedArray => {
            match typed_array::define_own_property(agent, obj, key, &desc) {
                Some(result) => result,
                None => ordinary::define_own_property(agent, obj, key, desc),
            }
        }
        Dispatch::Ordinary => ordinary::define_own_property(agent, obj, key, desc),
    }
}

/// `[[HasProperty]]`
pub fn has_property(agent: &mut dyn Agent, obj: ObjectId, key: &PropertyKey) -> Completion<bool> {
    match dispatch(agent, obj) {
        Dispatch::Proxy => proxy::has_property(agent, obj, key),
        Dispatch::TypedArray => {
            // numeric keys never consult the prototype chain
            match typed_array::get_own_property(agent, obj, key) {
                Some(result) => Ok(result.is_some()),
                None => ordinary::has_property(agent, obj, key),
            }
        }
        _ => ordinary::has_property(agent, obj, key),
    }
}

/// `[[Get]]`
pub fn get(
    agent: &mut dyn Agent,
    obj: ObjectId,
    key: &PropertyKey,
    receiver: &Value,
) -> Completion<Value> {
    match dispatch(agent, obj) {
        Dispatch::Proxy => proxy::get(agent, obj, key, receiver),
        Dispatch::TypedArray => match typed_array::get_own_property(agent, obj, key) {
            Some(Some(desc)) => Ok(desc.value.unwrap_or(Value::Undefined)),
            Some(None) => Ok(Value::Undefined),
            None => ordinary::get(agent, obj, key, receiver),
        },
        _ => ordinary::get(agent, obj, key, receiver),
    }
}

/// `[[Set]]`
pub fn set(
    agent: &mut dyn Agent,
    obj: ObjectId,
    key: &PropertyKey,
    value: Value,
    receiver: &Value,
) -> Completion<bool> {
    match dispatch(agent, obj) {
        Dispatch::Proxy => proxy::set(agent, obj, key, value, receiver),
        Dispatch::TypedArray => match typed_array::set(agent, obj, key, &value) {
            Some(result) => result,
            None => ordinary::set(agent, obj, key, value, receiver),
        },
        _ => ordinary::set(agent, obj, key, value, receiver),
    }
}

/// `[[Delete]]`
pub fn delete_property(
    agent: &mut dyn Agent,
    obj: ObjectId,
    key: &PropertyKey,
) -> Completion<bool> {
    match dispatch(agent, obj) {
        Dispatch::Proxy => proxy::delete_property(agent, obj, key),
        Dispatch::TypedArray => match typed_array::get_own_property(agent, obj, key) {
            Some(result) => Ok(result.is_none()),
            None => Ok(ordinary::delete_property(agent, obj, key)),
        },
        _ => Ok(ordinary::delete_property(agent, obj, key)),
    }
}

/// `[[OwnPropertyKeys]]`
pub fn own_property_keys(agent: &mut dyn Agent, obj: ObjectId) -> Completion<Vec<PropertyKey>> {
    match dispatch(agent, obj) {
        Dispatch::Proxy => proxy::own_property_keys(agent, obj),
        Dispatch::TypedArray => {
            let mut keys = typed_array::element_keys(agent, obj);
            keys.extend(
                agent
                    .heap_ref()
                    .object(obj)
                    .named_keys()
                    .iter()
                    .cloned(),
            );
            Ok(keys)
        }
        _ => Ok(ordinary::own_property_keys(agent, obj)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operations::array_create;
    use crate::test_agent::TestAgent;

    #[test]
    fn test_array_sparsity_scenario() {
        // insert 0 and 100000, remove 0: only "100000" remains and
        // the store is sparse; filling 0..99 brings it back dense.
        let mut agent = TestAgent::new();
        let arr = array_create(&mut agent, 0);
        let this = Value::Object(arr);
        set(&mut agent, arr, &PropertyKey::Index(0), Value::Number(1.0), &this).unwrap();
        set(
            &mut agent,
            arr,
            &PropertyKey::Index(100000),
            Value::Number(2.0),
            &this,
        )
        .unwrap();
        delete_property(&mut agent, arr, &PropertyKey::Index(0)).unwrap();

        let keys: Vec<String> = own_property_keys(&mut agent, arr)
            .unwrap()
            .iter()
            .filter(|k| k.is_index())
            .map(|k| k.to_display_string())
            .collect();
        assert_eq!(keys, vec!["100000"]);
        assert!(!agent.heap.object(arr).elements.is_dense());

        delete_property(&mut agent, arr, &PropertyKey::Index(100000)).unwrap();
        for i in 0..100 {
            set(
                &mut agent,
                arr,
                &PropertyKey::Index(i),
                Value::Number(i as f64),
                &this,
            )
            .unwrap();
        }
        assert!(agent.heap.object(arr).elements.is_dense());
    }
}
