//! Proxy exotic behaviour: trap dispatch plus the invariant checks
//! that keep a handler from lying about its target.

use core_types::{Completion, ObjectId, PropertyKey, Value};
use memory_manager::{Agent, AgentErrors, ObjectKind};

use crate::descriptor::PropertyDescriptor;
use crate::operations::{get_method, to_boolean, to_property_key};
use crate::protocol;

/// The (target, handler) pair, or a `TypeError` for a revoked proxy.
fn parts(agent: &mut dyn Agent, proxy: ObjectId) -> Completion<(ObjectId, ObjectId)> {
    match agent.heap_ref().object(proxy).kind {
        ObjectKind::Proxy {
            target: Some(t),
            handler: Some(h),
        } => Ok((t, h)),
        ObjectKind::Proxy { .. } => agent.type_error("proxy has been revoked"),
        _ => unreachable!("proxy method on non-proxy"),
    }
}

fn trap(agent: &mut dyn Agent, handler: ObjectId, name: &str) -> Completion<Option<Value>> {
    get_method(agent, &Value::Object(handler), &PropertyKey::from_str(name))
}

/// Proxy `[[GetPrototypeOf]]`.
pub fn get_prototype_of(agent: &mut dyn Agent, proxy: ObjectId) -> Completion<Option<ObjectId>> {
    let (target, handler) = parts(agent, proxy)?;
    let Some(t) = trap(agent, handler, "getPrototypeOf")? else {
        return protocol::get_prototype_of(agent, target);
    };
    let result = agent.call(t, Value::Object(handler), &[Value::Object(target)])?;
    let proto = match &result {
        Value::Null => None,
        Value::Object(id) => Some(*id),
        _ => return agent.type_error("getPrototypeOf trap must return an object or null"),
    };
    if protocol::is_extensible(agent, target)? {
        return Ok(proto);
    }
    let actual = protocol::get_prototype_of(agent, target)?;
    if proto != actual {
        return agent.type_error("getPrototypeOf trap disagrees with non-extensible target");
    }
    Ok(proto)
}

/// Proxy `[[SetPrototypeOf]]`.
pub fn set_prototype_of(
    agent: &mut dyn Agent,
    proxy: ObjectId,
    proto: Option<ObjectId>,
) -> Completion<bool> {
    let (target, handler) = parts(agent, proxy)?;
    let Some(t) = trap(agent, handler, "setPrototypeOf")? else {
        return protocol::set_prototype_of(agent, target, proto);
    };
    let proto_value = proto.map(Value::Object).unwrap_or(Value::Null);
    let result = agent.call(t, Value::Object(handler), &[Value::Object(target), proto_value])?;
    if !to_boolean(&result) {
        return Ok(false);
    }
    if !protocol::is_extensible(agent, target)? {
        let actual = protocol::get_prototype_of(agent, target)?;
        if proto != actual {
            return agent.type_error("setPrototypeOf trap changed a non-extensible target");
        }
    }
    Ok(true)
}

/// Proxy `[[IsExtensible]]`.
pub fn is_extensible(agent: &mut dyn Agent, proxy: ObjectId) -> Completion<bool> {
    let (target, handler) = parts(agent, proxy)?;
    let Some(t) = trap(agent, handler, "isExtensible")? else {
        return protocol::is_extensible(agent, target);
    };
    let result = agent.call(t, Value::Object(handler), &[Value::Object(target)])?;
    let answer = to_boolean(&result);
    if answer != protocol::is_extensible(agent, target)? {
        return agent.type_error("isExtensible trap disagrees with target");
    }
    Ok(answer)
}

/// Proxy `[[PreventExtensions]]`.
pub fn prevent_extensions(agent: &mut dyn Agent, proxy: ObjectId) -> Completion<bool> {
    let (target, handler) = parts(agent, proxy)?;
    let Some(t) = trap(agent, handler, "preventExtensions")? else {
        return protocol::prevent_extensions(agent, target);
    };
    let result = agent.call(t, Value::Object(handler), &[Value::Object(target)])?;
    if to_boolean(&result) && protocol::is_extensible(agent, target)? {
        return agent.type_error("preventExtensions trap lied about an extensible target");
    }
    Ok(to_boolean(&result))
}

/// Proxy `[[GetOwnProperty]]`.
pub fn get_own_property(
    agent: &mut dyn Agent,
    proxy: ObjectId,
    key: &PropertyKey,
) -> Completion<Option<PropertyDescriptor>> {
    let (target, handler) = parts(agent, proxy)?;
    let Some(t) = trap(agent, handler, "getOwnPropertyDescriptor")? else {
        return protocol::get_own_property(agent, target, key);
    };
    let result = agent.call(
        t,
        Value::Object(handler),
        &[Value::Object(target), key.to_value()],
    )?;
    let target_desc = protocol::get_own_property(agent, target, key)?;
    match &result {
        Value::Undefined => {
            if let Some(td) = &target_desc {
                if td.configurable == Some(false) {
                    return agent
                        .type_error("trap reported a non-configurable property as absent");
                }
                if !protocol::is_extensible(agent, target)? {
                    return agent.type_error("trap hid a property of a non-extensible target");
                }
            }
            Ok(None)
        }
        Value::Object(desc_obj) => {
            let desc = descriptor_from_object(agent, *desc_obj)?;
            if let Some(td) = &target_desc {
                if td.configurable == Some(false) && desc.configurable == Some(true) {
                    return agent
                        .type_error("trap reported a non-configurable property as configurable");
                }
            }
            Ok(Some(desc))
        }
        _ => agent.type_error("getOwnPropertyDescriptor trap must return an object or undefined"),
    }
}

/// Proxy `[[DefineOwnProperty]]`.
pub fn define_own_property(
    agent: &mut dyn Agent,
    proxy: ObjectId,
    key: &PropertyKey,
    desc: PropertyDescriptor,
) -> Completion<bool> {
    let (target, handler) = parts(agent, proxy)?;
    let Some(t) = trap(agent, handler, "defineProperty")? else {
        return protocol::define_own_property(agent, target, key, desc);
    };
    let desc_obj = descriptor_to_object(agent, &desc);
    let result = agent.call(
        t,
        Value::Object(handler),
        &[Value::Object(target), key.to_value(), desc_obj],
    )?;
    Ok(to_boolean(&result))
}

/// Proxy `[[HasProperty]]`.
pub fn has_property(agent: &mut dyn Agent, proxy: ObjectId, key: &PropertyKey) -> Completion<bool> {
    let (target, handler) = parts(agent, proxy)?;
    let Some(t) = trap(agent, handler, "has")? else {
        return protocol::has_property(agent, target, key);
    };
    let result = agent.call(
        t,
        Value::Object(handler),
        &[Value::Object(target), key.to_value()],
    )?;
    let answer = to_boolean(&result);
    if !answer {
        if let Some(td) = protocol::get_own_property(agent, target, key)? {
            if td.configurable == Some(false) {
                return agent.type_error("has trap hid a non-configurable property");
            }
            if !protocol::is_extensible(agent, target)? {
                return agent.type_error("has trap hid a property of a non-extensible target");
            }
        }
    }
    Ok(answer)
}

/// Proxy `[[Get]]`.
pub fn get(
    agent: &mut dyn Agent,
    proxy: ObjectId,
    key: &PropertyKey,
    receiver: &Value,
) -> Completion<Value> {
    let (target, handler) = parts(agent, proxy)?;
    let Some(t) = trap(agent, handler, "get")? else {
        return protocol::get(agent, target, key, receiver);
    };
    let result = agent.call(
        t,
        Value::Object(handler),
        &[Value::Object(target), key.to_value(), receiver.clone()],
    )?;
    if let Some(td) = protocol::get_own_property(agent, target, key)? {
        if td.configurable == Some(false) {
            if let (Some(v), Some(false)) = (&td.value, td.writable) {
                if !result.same_value(v) {
                    return agent
                        .type_error("get trap disagrees with non-writable data property");
                }
            }
            if td.is_accessor() && td.get == Some(None) && !result.is_undefined() {
                return agent.type_error("get trap returned a value for a getter-less accessor");
            }
        }
    }
    Ok(result)
}

/// Proxy `[[Set]]`.
pub fn set(
    agent: &mut dyn Agent,
    proxy: ObjectId,
    key: &PropertyKey,
    value: Value,
    receiver: &Value,
) -> Completion<bool> {
    let (target, handler) = parts(agent, proxy)?;
    let Some(t) = trap(agent, handler, "set")? else {
        return protocol::set(agent, target, key, value, receiver);
    };
    let result = agent.call(
        t,
        Value::Object(handler),
        &[
            Value::Object(target),
            key.to_value(),
            value.clone(),
            receiver.clone(),
        ],
    )?;
    if !to_boolean(&result) {
        return Ok(false);
    }
    if let Some(td) = protocol::get_own_property(agent, target, key)? {
        if td.configurable == Some(false) {
            if let (Some(v), Some(false)) = (&td.value, td.writable) {
                if !value.same_value(v) {
                    return agent
                        .type_error("set trap changed a non-writable data property");
                }
            }
            if td.is_accessor() && td.set == Some(None) {
                return agent.type_error("set trap wrote through a setter-less accessor");
            }
        }
    }
    Ok(true)
}

/// Proxy `[[Delete]]`.
pub fn delete_property(
    agent: &mut dyn Agent,
    proxy: ObjectId,
    key: &PropertyKey,
) -> Completion<bool> {
    let (target, handler) = parts(agent, proxy)?;
    let Some(t) = trap(agent, handler, "deleteProperty")? else {
        return Ok(protocol::delete_property(agent, target, key)?);
    };
    let result = agent.call(
        t,
        Value::Object(handler),
        &[Value::Object(target), key.to_value()],
    )?;
    if !to_boolean(&result) {
        return Ok(false);
    }
    if let Some(td) = protocol::get_own_property(agent, target, key)? {
        if td.configurable == Some(false) {
            return agent.type_error("deleteProperty trap removed a non-configurable property");
        }
    }
    Ok(true)
}

/// Proxy `[[OwnPropertyKeys]]`.
pub fn own_property_keys(agent: &mut dyn Agent, proxy: ObjectId) -> Completion<Vec<PropertyKey>> {
    let (target, handler) = parts(agent, proxy)?;
    let Some(t) = trap(agent, handler, "ownKeys")? else {
        return protocol::own_property_keys(agent, target);
    };
    let result = agent.call(t, Value::Object(handler), &[Value::Object(target)])?;
    let Some(list) = result.as_object() else {
        return agent.type_error("ownKeys trap must return an array");
    };
    let length = {
        let v = protocol::get(
            agent,
            list,
            &PropertyKey::from_str("length"),
            &Value::Object(list),
        )?;
        v.as_number().unwrap_or(0.0) as u32
    };
    let mut keys = Vec::with_capacity(length as usize);
    for i in 0..length {
        let v = protocol::get(agent, list, &PropertyKey::Index(i), &Value::Object(list))?;
        match &v {
            Value::String(_) | Value::Symbol(_) => keys.push(to_property_key(agent, &v)?),
            _ => return agent.type_error("ownKeys trap entries must be strings or symbols"),
        }
    }
    // every non-configurable own key of the target must be reported
    let target_keys = protocol::own_property_keys(agent, target)?;
    for tk in target_keys {
        let td = protocol::get_own_property(agent, target, &tk)?;
        if let Some(td) = td {
            if td.configurable == Some(false) && !keys.contains(&tk) {
                return agent.type_error("ownKeys trap omitted a non-configurable key");
            }
        }
    }
    Ok(keys)
}

/// Read a descriptor object (`{value, writable, get, ...}`) into a
/// partial descriptor.
pub fn descriptor_from_object(
    agent: &mut dyn Agent,
    obj: ObjectId,
) -> Completion<PropertyDescriptor> {
    let mut desc = PropertyDescriptor::default();
    let this = Value::Object(obj);
    let field = |agent: &mut dyn Agent, name: &str| -> Completion<Option<Value>> {
        let key = PropertyKey::from_str(name);
        if protocol::has_property(agent, obj, &key)? {
            Ok(Some(protocol::get(agent, obj, &key, &this)?))
        } else {
            Ok(None)
        }
    };
    if let Some(v) = field(agent, "value")? {
        desc.value = Some(v);
    }
    if let Some(v) = field(agent, "writable")? {
        desc.writable = Some(to_boolean(&v));
    }
    if let Some(v) = field(agent, "enumerable")? {
        desc.enumerable = Some(to_boolean(&v));
    }
    if let Some(v) = field(agent, "configurable")? {
        desc.configurable = Some(to_boolean(&v));
    }
    if let Some(v) = field(agent, "get")? {
        desc.get = match v {
            Value::Undefined => Some(None),
            Value::Object(id) if agent.heap_ref().object(id).is_callable() => Some(Some(id)),
            _ => return agent.type_error("getter must be a function"),
        };
    }
    if let Some(v) = field(agent, "set")? {
        desc.set = match v {
            Value::Undefined => Some(None),
            Value::Object(id) if agent.heap_ref().object(id).is_callable() => Some(Some(id)),
            _ => return agent.type_error("setter must be a function"),
        };
    }
    if desc.is_accessor() && desc.is_data() {
        return agent.type_error("descriptor cannot be both data and accessor");
    }
    Ok(desc)
}

/// Materialize a descriptor as an ordinary object.
pub fn descriptor_to_object(agent: &mut dyn Agent, desc: &PropertyDescriptor) -> Value {
    let proto = agent.realm().intrinsics.object_prototype;
    let obj = agent
        .heap()
        .alloc_object(memory_manager::JsObject::ordinary(Some(proto)));
    let mut put = |agent: &mut dyn Agent, name: &str, v: Value| {
        agent.heap().object_mut(obj).set_property(
            PropertyKey::from_str(name),
            memory_manager::Property::data(v),
        );
    };
    if let Some(v) = &desc.value {
        put(agent, "value", v.clone());
    }
    if let Some(w) = desc.writable {
        put(agent, "writable", Value::Boolean(w));
    }
    if let Some(g) = desc.get {
        put(
            agent,
            "get",
            g.map(Value::Object).unwrap_or(Value::Undefined),
        );
    }
    if let Some(s) = desc.set {
        put(
            agent,
            "set",
            s.map(Value::Object).unwrap_or(Value::Undefined),
        );
    }
    if let Some(e) = desc.enumerable {
        put(agent, "enumerable", Value::Boolean(e));
    }
    if let Some(c) = desc.configurable {
        put(agent, "configurable", Value::Boolean(c));
    }
    Value::Object(obj)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_agent::TestAgent;
    use memory_manager::{JsObject, NativeCallInfo, Property};

    fn upper_get(
        agent: &mut dyn Agent,
        info: &NativeCallInfo<'_>,
    ) -> Completion<Value> {
        // get(target, key, receiver) -> key.toUpperCase()
        let key = info.arg(1);
        let s = key.as_string().cloned();
        let _ = agent;
        match s {
            Some(s) => Ok(Value::string(&s.as_str().to_uppercase())),
            None => Ok(Value::Undefined),
        }
    }

    fn make_proxy(agent: &mut TestAgent, handler: ObjectId) -> ObjectId {
        let target = agent.fresh_object();
        agent.heap.alloc_object(JsObject::with_kind(
            None,
            ObjectKind::Proxy {
                target: Some(target),
                handler: Some(handler),
            },
        ))
    }

    #[test]
    fn test_get_trap_invoked() {
        let mut agent = TestAgent::new();
        let getter = agent.native("get", upper_get);
        let handler = agent.fresh_object();
        agent.heap.object_mut(handler).set_property(
            PropertyKey::from_str("get"),
            Property::data(Value::Object(getter)),
        );
        let proxy = make_proxy(&mut agent, handler);
        let v = protocol::get(
            &mut agent,
            proxy,
            &PropertyKey::from_str("hello"),
            &Value::Object(proxy),
        )
        .unwrap();
        assert_eq!(v.as_string().unwrap().as_str(), "HELLO");
    }

    #[test]
    fn test_missing_trap_forwards_to_target() {
        let mut agent = TestAgent::new();
        let handler = agent.fresh_object();
        let proxy = make_proxy(&mut agent, handler);
        let target = match agent.heap.object(proxy).kind {
            ObjectKind::Proxy {
                target: Some(t), ..
            } => t,
            _ => unreachable!(),
        };
        agent.heap.object_mut(target).set_property(
            PropertyKey::from_str("x"),
            Property::data(Value::Number(3.0)),
        );
        let v = protocol::get(
            &mut agent,
            proxy,
            &PropertyKey::from_str("x"),
            &Value::Object(proxy),
        )
        .unwrap();
        assert_eq!(v.as_number(), Some(3.0));
    }

    #[test]
    fn test_get_trap_invariant_on_frozen_data() {
        let mut agent = TestAgent::new();
        let getter = agent.native("get", upper_get);
        let handler = agent.fresh_object();
        agent.heap.object_mut(handler).set_property(
            PropertyKey::from_str("get"),
            Property::data(Value::Object(getter)),
        );
        let proxy = make_proxy(&mut agent, handler);
        let target = match agent.heap.object(proxy).kind {
            ObjectKind::Proxy {
                target: Some(t), ..
            } => t,
            _ => unreachable!(),
        };
        // non-configurable non-writable data property on the target
        agent.heap.object_mut(target).set_property(
            PropertyKey::from_str("frozen"),
            Property::frozen(Value::Number(1.0)),
        );
        let result = protocol::get(
            &mut agent,
            proxy,
            &PropertyKey::from_str("frozen"),
            &Value::Object(proxy),
        );
        assert!(result.is_err(), "trap result must match the frozen value");
    }

    #[test]
    fn test_revoked_proxy_throws() {
        let mut agent = TestAgent::new();
        let handler = agent.fresh_object();
        let proxy = make_proxy(&mut agent, handler);
        if let ObjectKind::Proxy { target, handler } = &mut agent.heap.object_mut(proxy).kind {
            *target = None;
            *handler = None;
        }
        let result = protocol::get(
            &mut agent,
            proxy,
            &PropertyKey::from_str("x"),
            &Value::Object(proxy),
        );
        assert!(result.is_err());
    }
}
