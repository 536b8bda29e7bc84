//! Heap/interpreter integration: collection during execution, weak
//! semantics observed from script code, finalization scheduling.

use interpreter::Vm;

#[test]
fn test_collection_preserves_reachable_script_state() {
    let mut vm = Vm::new();
    vm.evaluate_script(
        "var root = {list: []};\
         for (let i = 0; i < 5000; i++) {\
             root.list = {prev: root.list, n: i, junk: [i, {i}]};\
         }",
        "churn.js",
    )
    .unwrap();
    let stats = vm.collect_garbage();
    assert!(stats.live_objects > 0);
    let n = vm.evaluate_script("root.list.n", "probe.js").unwrap();
    assert_eq!(n.as_number(), Some(4999.0));
}

#[test]
fn test_cycles_from_script_are_collected() {
    let mut vm = Vm::new();
    vm.evaluate_script(
        "{ let a = {}; let b = {back: a}; a.fwd = b; } var anchor = {};",
        "cycle.js",
    )
    .unwrap();
    let before = vm.collect_garbage().live_objects;
    // a second collection finds nothing new to free
    let after = vm.collect_garbage().live_objects;
    assert_eq!(before, after);
}

#[test]
fn test_weak_ref_observed_from_script() {
    let mut vm = Vm::new();
    vm.evaluate_script("var wr = new WeakRef({payload: 1});", "wr.js").unwrap();
    vm.collect_garbage();
    let cleared = vm
        .evaluate_script("wr.deref() === undefined", "probe.js")
        .unwrap();
    assert_eq!(cleared.as_number(), None);
    assert!(matches!(cleared, core_types::Value::Boolean(true)));
}

#[test]
fn test_finalization_registry_callback_runs_after_gc() {
    let mut vm = Vm::new();
    vm.evaluate_script(
        "var seen = [];\
         var reg = new FinalizationRegistry(held => seen.push(held));\
         { let target = {}; reg.register(target, 'gone'); }",
        "fr.js",
    )
    .unwrap();
    vm.collect_garbage();
    // the callback is a host job
    vm.run_jobs();
    let seen = vm.evaluate_script("seen.join(',')", "probe.js").unwrap();
    assert_eq!(seen.as_string().unwrap().as_str(), "gone");
}

#[test]
fn test_generator_keeps_its_frame_alive_across_gc() {
    let mut vm = Vm::new();
    vm.evaluate_script(
        "function* g(){ let held = {n: 41}; yield 1; yield held.n + 1; }\
         var it = g(); it.next();",
        "gen.js",
    )
    .unwrap();
    vm.collect_garbage();
    let v = vm.evaluate_script("it.next().value", "probe.js").unwrap();
    assert_eq!(v.as_number(), Some(42.0));
}

#[test]
fn test_suspended_async_frame_survives_gc() {
    let mut vm = Vm::new();
    vm.evaluate_script(
        "var out; var release;\
         const gate = new Promise(r => { release = r; });\
         async function f(){ const held = {n: 7}; await gate; out = held.n; }\
         f();",
        "async.js",
    )
    .unwrap();
    vm.collect_garbage();
    vm.evaluate_script("release(null);", "release.js").unwrap();
    let out = vm.evaluate_script("out", "probe.js").unwrap();
    assert_eq!(out.as_number(), Some(7.0));
}
