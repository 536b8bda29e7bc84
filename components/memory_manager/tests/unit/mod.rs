//! Cross-module heap tests: allocation pressure, slot reuse and
//! collection cadence.

use core_types::{PropertyKey, Value};
use memory_manager::{Heap, JsObject, Property};

#[test]
fn test_slots_are_reused_after_collection() {
    let mut heap = Heap::new();
    let first = heap.alloc_object(JsObject::ordinary(None));
    let first_index = first.index();
    heap.collect(|_| {});

    // the freed slot comes back on the next allocation
    let second = heap.alloc_object(JsObject::ordinary(None));
    assert_eq!(second.index(), first_index);
}

#[test]
fn test_collection_threshold_adapts() {
    let mut heap = Heap::new();
    assert!(!heap.should_collect());
    let root = heap.alloc_object(JsObject::ordinary(None));
    heap.add_root_object(root);

    // churn garbage until a safe point would trigger a collection
    let mut triggered = false;
    for i in 0..10_000 {
        let id = heap.alloc_object(JsObject::ordinary(None));
        heap.object_mut(id).set_property(
            PropertyKey::from_str("n"),
            Property::data(Value::Number(i as f64)),
        );
        if heap.should_collect() {
            triggered = true;
            break;
        }
    }
    assert!(triggered, "allocation pressure never requested a collection");

    let stats = heap.collect(|_| {});
    assert_eq!(stats.live_objects, 1);
    assert!(!heap.should_collect());
}

#[test]
fn test_native_value_stack_roots_survive() {
    let mut heap = Heap::new();
    let id = heap.alloc_object(JsObject::ordinary(None));
    let mark = heap.root_mark();
    heap.roots.push(Value::Object(id));

    let stats = heap.collect(|_| {});
    assert_eq!(stats.live_objects, 1);

    heap.root_release(mark);
    let stats = heap.collect(|_| {});
    assert_eq!(stats.live_objects, 0);
}
