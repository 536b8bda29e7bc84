//! Realm bootstrap: intrinsic allocation, prototype wiring and
//! global population.

use std::collections::HashSet;

use core_types::{PropertyKey, Value};
use memory_manager::{
    EnvKind, EnvRecord, GlobalEnv, Heap, Intrinsics, JsObject, Property, PropertyValue, Realm,
};

use crate::helpers::data_hidden;

/// Create a realm on the heap: intrinsics, global object and global
/// environment, fully populated.
pub fn create_realm(heap: &mut Heap) -> Realm {
    // every intrinsic exists before any is populated, so circular
    // references (Function.prototype on functions, error chains) wire
    // up cleanly
    let object_prototype = heap.alloc_object(JsObject::ordinary(None));
    let mut child = |heap: &mut Heap| heap.alloc_object(JsObject::ordinary(Some(object_prototype)));

    let function_prototype = child(heap);
    let array_prototype = child(heap);
    let string_prototype = child(heap);
    let number_prototype = child(heap);
    let boolean_prototype = child(heap);
    let symbol_prototype = child(heap);
    let bigint_prototype = child(heap);
    let error_prototype = child(heap);
    let map_prototype = child(heap);
    let set_prototype = child(heap);
    let weak_map_prototype = child(heap);
    let weak_set_prototype = child(heap);
    let weak_ref_prototype = child(heap);
    let finalization_registry_prototype = child(heap);
    let promise_prototype = child(heap);
    let iterator_prototype = child(heap);
    let async_iterator_prototype = child(heap);
    let array_buffer_prototype = child(heap);
    let typed_array_prototype = child(heap);

    let mut error_child = |heap: &mut Heap| heap.alloc_object(JsObject::ordinary(Some(error_prototype)));
    let type_error_prototype = error_child(heap);
    let range_error_prototype = error_child(heap);
    let reference_error_prototype = error_child(heap);
    let syntax_error_prototype = error_child(heap);
    let uri_error_prototype = error_child(heap);
    let eval_error_prototype = error_child(heap);

    let mut iter_child =
        |heap: &mut Heap| heap.alloc_object(JsObject::ordinary(Some(iterator_prototype)));
    let array_iterator_prototype = iter_child(heap);
    let map_iterator_prototype = iter_child(heap);
    let set_iterator_prototype = iter_child(heap);
    let generator_prototype = iter_child(heap);
    let async_generator_prototype =
        heap.alloc_object(JsObject::ordinary(Some(async_iterator_prototype)));

    let intrinsics = Intrinsics {
        object_prototype,
        function_prototype,
        array_prototype,
        string_prototype,
        number_prototype,
        boolean_prototype,
        symbol_prototype,
        bigint_prototype,
        error_prototype,
        type_error_prototype,
        range_error_prototype,
        reference_error_prototype,
        syntax_error_prototype,
        uri_error_prototype,
        eval_error_prototype,
        map_prototype,
        set_prototype,
        weak_map_prototype,
        weak_set_prototype,
        weak_ref_prototype,
        finalization_registry_prototype,
        promise_prototype,
        iterator_prototype,
        async_iterator_prototype,
        array_iterator_prototype,
        map_iterator_prototype,
        set_iterator_prototype,
        generator_prototype,
        async_generator_prototype,
        array_buffer_prototype,
        typed_array_prototype,
    };

    let global_object = heap.alloc_object(JsObject::ordinary(Some(object_prototype)));
    let global_env = heap.alloc_env(EnvRecord {
        outer: None,
        kind: EnvKind::Global(GlobalEnv {
            decl: Default::default(),
            object: global_object,
            var_names: HashSet::new(),
        }),
    });

    let realm = Realm {
        global_object,
        global_env,
        intrinsics,
    };

    // population
    crate::object::install(heap, &realm);
    crate::function::install(heap, &realm);
    crate::array::install(heap, &realm);
    crate::string::install(heap, &realm);
    crate::symbol::install(heap, &realm);
    crate::error::install(heap, &realm);
    crate::collections::install(heap, &realm);
    crate::weak::install(heap, &realm);
    crate::promise::install(heap, &realm);
    crate::proxy::install(heap, &realm);
    crate::generator_objects::install(heap, &realm);
    crate::global::install(heap, &realm);

    // restricted global constants
    let frozen = |value: Value| Property {
        value: PropertyValue::Data {
            value,
            writable: false,
        },
        enumerable: false,
        configurable: false,
    };
    heap.object_mut(global_object)
        .set_property(PropertyKey::from_str("NaN"), frozen(Value::Number(f64::NAN)));
    heap.object_mut(global_object).set_property(
        PropertyKey::from_str("Infinity"),
        frozen(Value::Number(f64::INFINITY)),
    );
    heap.object_mut(global_object)
        .set_property(PropertyKey::from_str("undefined"), frozen(Value::Undefined));
    data_hidden(heap, global_object, "globalThis", Value::Object(global_object));

    realm
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_realm_creates_wired_intrinsics() {
        let mut heap = Heap::new();
        let realm = create_realm(&mut heap);
        let i = &realm.intrinsics;
        // prototype chains
        assert_eq!(heap.object(i.function_prototype).prototype, Some(i.object_prototype));
        assert_eq!(heap.object(i.type_error_prototype).prototype, Some(i.error_prototype));
        assert_eq!(
            heap.object(i.array_iterator_prototype).prototype,
            Some(i.iterator_prototype)
        );
        assert_eq!(heap.object(i.object_prototype).prototype, None);
        // globals installed
        let g = heap.object(realm.global_object);
        assert!(g.own_property(&PropertyKey::from_str("Object")).is_some());
        assert!(g.own_property(&PropertyKey::from_str("Map")).is_some());
        assert!(g.own_property(&PropertyKey::from_str("Proxy")).is_some());
        assert!(g.own_property(&PropertyKey::from_str("Promise")).is_some());
        assert!(g.own_property(&PropertyKey::from_str("console")).is_some());
        // NaN is restricted
        let nan = g.own_property(&PropertyKey::from_str("NaN")).unwrap();
        assert!(!nan.configurable);
    }
}
