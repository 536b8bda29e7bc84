//! Shared plumbing for installing native functions and properties.

use core_types::{Completion, JsString, ObjectId, PropertyKey, Value};
use memory_manager::{
    Agent, AgentErrors, BuiltinFunctionData, Heap, JsObject, NativeCallInfo, NativeFn, ObjectKind, Property,
    PropertyValue,
};

/// Allocate a native function object.
pub(crate) fn native_fn(
    heap: &mut Heap,
    function_prototype: ObjectId,
    name: &str,
    length: u8,
    func: NativeFn,
) -> ObjectId {
    heap.alloc_object(JsObject::with_kind(
        Some(function_prototype),
        ObjectKind::Builtin(BuiltinFunctionData {
            func,
            name: JsString::from_str(name),
            length,
            constructable: false,
            captured: Vec::new(),
        }),
    ))
}

/// Allocate a constructable native function with its `prototype`
/// link wired both ways.
pub(crate) fn native_ctor(
    heap: &mut Heap,
    function_prototype: ObjectId,
    prototype: ObjectId,
    name: &str,
    length: u8,
    func: NativeFn,
) -> ObjectId {
    let ctor = heap.alloc_object(JsObject::with_kind(
        Some(function_prototype),
        ObjectKind::Builtin(BuiltinFunctionData {
            func,
            name: JsString::from_str(name),
            length,
            constructable: true,
            captured: Vec::new(),
        }),
    ));
    heap.object_mut(ctor).set_property(
        PropertyKey::from_str("prototype"),
        Property {
            value: PropertyValue::Data {
                value: Value::Object(prototype),
                writable: false,
            },
            enumerable: false,
            configurable: false,
        },
    );
    heap.object_mut(prototype).set_property(
        PropertyKey::from_str("constructor"),
        Property::method(Value::Object(ctor)),
    );
    ctor
}

/// Install a method property.
pub(crate) fn method(
    heap: &mut Heap,
    function_prototype: ObjectId,
    target: ObjectId,
    name: &str,
    length: u8,
    func: NativeFn,
) {
    let f = native_fn(heap, function_prototype, name, length, func);
    heap.object_mut(target)
        .set_property(PropertyKey::from_str(name), Property::method(Value::Object(f)));
}

/// Install an accessor with only a getter.
pub(crate) fn getter(
    heap: &mut Heap,
    function_prototype: ObjectId,
    target: ObjectId,
    name: &str,
    func: NativeFn,
) {
    let f = native_fn(heap, function_prototype, name, 0, func);
    heap.object_mut(target).set_property(
        PropertyKey::from_str(name),
        Property {
            value: PropertyValue::Accessor {
                get: Some(f),
                set: None,
            },
            enumerable: false,
            configurable: true,
        },
    );
}

/// Install a plain data property.
pub(crate) fn data(heap: &mut Heap, target: ObjectId, name: &str, value: Value) {
    heap.object_mut(target)
        .set_property(PropertyKey::from_str(name), Property::data(value));
}

/// Install a non-enumerable data property.
pub(crate) fn data_hidden(heap: &mut Heap, target: ObjectId, name: &str, value: Value) {
    heap.object_mut(target)
        .set_property(PropertyKey::from_str(name), Property::method(value));
}

/// The `this` value as an object handle or a TypeError.
pub(crate) fn this_object(
    agent: &mut dyn Agent,
    info: &NativeCallInfo<'_>,
    what: &str,
) -> Completion<ObjectId> {
    match info.this.as_object() {
        Some(id) => Ok(id),
        None => {
            let msg = format!("{} called on a non-object", what);
            agent.type_error(&msg)
        }
    }
}
