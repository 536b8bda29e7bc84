//! The ordinary internal-method algorithms.
//!
//! Each function implements the default behaviour; the exotic
//! variants in the sibling modules override individual methods and
//! fall back here. Chain walks always re-enter through [`crate::protocol`]
//! so a proxy anywhere on the prototype chain keeps its traps.

use core_types::{Completion, ObjectId, PropertyKey, Value};
use memory_manager::{Agent, Property, PropertyValue};

use crate::descriptor::PropertyDescriptor;
use crate::protocol;

/// `OrdinaryGetPrototypeOf`
pub fn get_prototype_of(agent: &mut dyn Agent, obj: ObjectId) -> Option<ObjectId> {
    agent.heap_ref().object(obj).prototype
}

/// `OrdinarySetPrototypeOf`: cycle-checked prototype replacement.
pub fn set_prototype_of(agent: &mut dyn Agent, obj: ObjectId, proto: Option<ObjectId>) -> bool {
    let heap = agent.heap_ref();
    let current = heap.object(obj).prototype;
    if current == proto {
        return true;
    }
    if !heap.object(obj).extensible {
        return false;
    }
    // Walk the new chain; adding `obj` must not create a cycle. The
    // walk stops at a proxy, whose prototype is trap-determined.
    let mut p = proto;
    while let Some(id) = p {
        if id == obj {
            return false;
        }
        let o = heap.object(id);
        if matches!(o.kind, memory_manager::ObjectKind::Proxy { .. }) {
            break;
        }
        p = o.prototype;
    }
    let obj_ref = agent.heap().object_mut(obj);
    obj_ref.prototype = proto;
    obj_ref.version = obj_ref.version.wrapping_add(1);
    true
}

/// `OrdinaryIsExtensible`
pub fn is_extensible(agent: &mut dyn Agent, obj: ObjectId) -> bool {
    agent.heap_ref().object(obj).extensible
}

/// `OrdinaryPreventExtensions`
pub fn prevent_extensions(agent: &mut dyn Agent, obj: ObjectId) -> bool {
    let o = agent.heap().object_mut(obj);
    o.extensible = false;
    o.version = o.version.wrapping_add(1);
    true
}

/// `OrdinaryGetOwnProperty`
pub fn get_own_property(
    agent: &mut dyn Agent,
    obj: ObjectId,
    key: &PropertyKey,
) -> Option<PropertyDescriptor> {
    agent
        .heap_ref()
        .object(obj)
        .own_property(key)
        .map(PropertyDescriptor::from_property)
}

/// `ValidateAndApplyPropertyDescriptor` as a pure decision: whether
/// the change is allowed, given extensibility and the current
/// property.
pub fn validate_descriptor(
    extensible: bool,
    current: Option<&Property>,
    desc: &PropertyDescriptor,
) -> bool {
    let Some(current) = current else {
        return extensible;
    };
    if desc.is_generic()
        && desc.enumerable.is_none()
        && desc.configurable.is_none()
    {
        return true;
    }
    if current.configurable {
        return true;
    }
    // Non-configurable: nothing may loosen.
    if desc.configurable == Some(true) {
        return false;
    }
    if let Some(e) = desc.enumerable {
        if e != current.enumerable {
            return false;
        }
    }
    if desc.is_generic() {
        return true;
    }
    match &current.value {
        PropertyValue::Data { value, writable } => {
            if desc.is_accessor() {
                return false;
            }
            if !writable {
                if desc.writable == Some(true) {
                    return false;
                }
                if let Some(v) = &desc.value {
                    if !v.same_value(value) {
                        return false;
                    }
                }
            }
            true
        }
        PropertyValue::Accessor { get, set } => {
            if desc.is_data() {
                return false;
            }
            if let Some(g) = desc.get {
                if g != *get {
                    return false;
                }
            }
            if let Some(s) = desc.set {
                if s != *set {
                    return false;
                }
            }
            true
        }
    }
}

/// `OrdinaryDefineOwnProperty`
pub fn define_own_property(
    agent: &mut dyn Agent,
    obj: ObjectId,
    key: &PropertyKey,
    desc: PropertyDescriptor,
) -> Completion<bool> {
    let (extensible, current) = {
        let o = agent.heap_ref().object(obj);
        (o.extensible, o.own_property(key).cloned())
    };
    if !validate_descriptor(extensible, current.as_ref(), &desc) {
        return Ok(false);
    }
    let o = agent.heap().object_mut(obj);
    match current {
        Some(mut p) => {
            let was_data = matches!(p.value, PropertyValue::Data { .. });
            desc.apply_to(&mut p);
            let is_data = matches!(p.value, PropertyValue::Data { .. });
            if was_data != is_data
                || desc.enumerable.is_some()
                || desc.configurable.is_some()
                || desc.writable.is_some()
            {
                o.version = o.version.wrapping_add(1);
            }
            o.set_property(key.clone(), p);
        }
        None => {
            o.set_property(key.clone(), desc.into_property());
        }
    }
    Ok(true)
}

/// `OrdinaryHasProperty`
pub fn has_property(agent: &mut dyn Agent, obj: ObjectId, key: &PropertyKey) -> Completion<bool> {
    if protocol::get_own_property(agent, obj, key)?.is_some() {
        return Ok(true);
    }
    match protocol::get_prototype_of(agent, obj)? {
        Some(parent) => protocol::has_property(agent, parent, key),
        None => Ok(false),
    }
}

/// `OrdinaryGet`
pub fn get(
    agent: &mut dyn Agent,
    obj: ObjectId,
    key: &PropertyKey,
    receiver: &Value,
) -> Completion<Value> {
    let desc = match protocol::get_own_property(agent, obj, key)? {
        Some(d) => d,
        None => {
            return match protocol::get_prototype_of(agent, obj)? {
                Some(parent) => protocol::get(agent, parent, key, receiver),
                None => Ok(Value::Undefined),
            };
        }
    };
    if let Some(v) = desc.value {
        return Ok(v);
    }
    match desc.get.flatten() {
        Some(getter) => agent.call(Value::Object(getter), receiver.clone(), &[]),
        None => Ok(Value::Undefined),
    }
}

/// `OrdinarySet`
pub fn set(
    agent: &mut dyn Agent,
    obj: ObjectId,
    key: &PropertyKey,
    value: Value,
    receiver: &Value,
) -> Completion<bool> {
    let own = protocol::get_own_property(agent, obj, key)?;
    let desc = match own {
        Some(d) => d,
        None => {
            // Defer to the prototype chain; absent everywhere means a
            // fresh writable data property on the receiver.
            if let Some(parent) = protocol::get_prototype_of(agent, obj)? {
                return protocol::set(agent, parent, key, value, receiver);
            }
            PropertyDescriptor::data(Value::Undefined, true, true, true)
        }
    };
    if desc.is_accessor() {
        return match desc.set.flatten() {
            Some(setter) => {
                agent.call(Value::Object(setter), receiver.clone(), &[value])?;
                Ok(true)
            }
            None => Ok(false),
        };
    }
    if desc.writable == Some(false) {
        return Ok(false);
    }
    let Some(receiver_id) = receiver.as_object() else {
        return Ok(false);
    };
    let existing = protocol::get_own_property(agent, receiver_id, key)?;
    match existing {
        Some(e) if e.is_accessor() => Ok(false),
        Some(e) if e.writable == Some(false) => Ok(false),
        Some(_) => protocol::define_own_property(
            agent,
            receiver_id,
            key,
            PropertyDescriptor::value_only(value),
        ),
        None => protocol::define_own_property(
            agent,
            receiver_id,
            key,
            PropertyDescriptor::data(value, true, true, true),
        ),
    }
}

/// `OrdinaryDelete`
pub fn delete_property(agent: &mut dyn Agent, obj: ObjectId, key: &PropertyKey) -> bool {
    let o = agent.heap().object_mut(obj);
    match o.own_property(key) {
        None => true,
        Some(p) if p.configurable => {
            o.remove_property(key);
            true
        }
        Some(_) => false,
    }
}

/// `OrdinaryOwnPropertyKeys`
pub fn own_property_keys(agent: &mut dyn Agent, obj: ObjectId) -> Vec<PropertyKey> {
    agent.heap_ref().object(obj).own_keys()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_agent::TestAgent;

    #[test]
    fn test_non_configurable_data_cannot_become_accessor() {
        let mut agent = TestAgent::new();
        let obj = agent.fresh_object();
        let key = PropertyKey::from_str("x");
        define_own_property(
            &mut agent,
            obj,
            &key,
            PropertyDescriptor::data(Value::Number(1.0), false, false, false),
        )
        .unwrap();
        let ok = define_own_property(
            &mut agent,
            obj,
            &key,
            PropertyDescriptor {
                get: Some(None),
                ..Default::default()
            },
        )
        .unwrap();
        assert!(!ok);
    }

    #[test]
    fn test_non_writable_value_change_rejected() {
        let mut agent = TestAgent::new();
        let obj = agent.fresh_object();
        let key = PropertyKey::from_str("x");
        define_own_property(
            &mut agent,
            obj,
            &key,
            PropertyDescriptor::data(Value::Number(1.0), false, false, false),
        )
        .unwrap();
        // same value is fine
        assert!(define_own_property(
            &mut agent,
            obj,
            &key,
            PropertyDescriptor::value_only(Value::Number(1.0)),
        )
        .unwrap());
        // different value is not
        assert!(!define_own_property(
            &mut agent,
            obj,
            &key,
            PropertyDescriptor::value_only(Value::Number(2.0)),
        )
        .unwrap());
    }

    #[test]
    fn test_get_walks_prototype_chain() {
        let mut agent = TestAgent::new();
        let proto = agent.fresh_object();
        let obj = agent.fresh_object_with_proto(proto);
        let key = PropertyKey::from_str("inherited");
        define_own_property(
            &mut agent,
            proto,
            &key,
            PropertyDescriptor::data(Value::Number(7.0), true, true, true),
        )
        .unwrap();
        let v = get(&mut agent, obj, &key, &Value::Object(obj)).unwrap();
        assert_eq!(v.as_number(), Some(7.0));
    }

    #[test]
    fn test_set_creates_on_receiver_not_holder() {
        let mut agent = TestAgent::new();
        let proto = agent.fresh_object();
        let obj = agent.fresh_object_with_proto(proto);
        let key = PropertyKey::from_str("p");
        define_own_property(
            &mut agent,
            proto,
            &key,
            PropertyDescriptor::data(Value::Number(1.0), true, true, true),
        )
        .unwrap();
        set(&mut agent, obj, &key, Value::Number(2.0), &Value::Object(obj)).unwrap();
        // own copy shadows; the prototype keeps its value
        let own = get_own_property(&mut agent, obj, &key).unwrap();
        assert_eq!(own.value.unwrap().as_number(), Some(2.0));
        let parent = get_own_property(&mut agent, proto, &key).unwrap();
        assert_eq!(parent.value.unwrap().as_number(), Some(1.0));
    }

    #[test]
    fn test_prototype_cycle_rejected() {
        let mut agent = TestAgent::new();
        let a = agent.fresh_object();
        let b = agent.fresh_object_with_proto(a);
        assert!(!set_prototype_of(&mut agent, a, Some(b)));
        assert!(set_prototype_of(&mut agent, a, None));
    }

    #[test]
    fn test_delete_respects_configurable() {
        let mut agent = TestAgent::new();
        let obj = agent.fresh_object();
        let key = PropertyKey::from_str("x");
        define_own_property(
            &mut agent,
            obj,
            &key,
            PropertyDescriptor::data(Value::Number(1.0), true, true, false),
        )
        .unwrap();
        assert!(!delete_property(&mut agent, obj, &key));
        let key2 = PropertyKey::from_str("y");
        define_own_property(
            &mut agent,
            obj,
            &key2,
            PropertyDescriptor::data(Value::Number(1.0), true, true, true),
        )
        .unwrap();
        assert!(delete_property(&mut agent, obj, &key2));
        assert!(get_own_property(&mut agent, obj, &key2).is_none());
    }
}
