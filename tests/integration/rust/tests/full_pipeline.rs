//! The six end-to-end scenarios and the cross-cutting laws, run
//! through the whole pipeline: lexer → parser → compiler →
//! interpreter → builtins.

use core_types::Value;
use integration_tests::{eval, eval_number, eval_string};
use interpreter::Vm;

#[test]
fn test_scenario_loop_sum() {
    assert_eq!(eval_number("let s=0;for(let i=1;i<=100;i++)s+=i;s"), 5050.0);
}

#[test]
fn test_scenario_generator_spread() {
    let src = "function*g(){yield 1;yield 2}let a=[...g()];a";
    let mut vm = Vm::new();
    let arr = vm.evaluate_script(src, "s2.js").unwrap();
    assert_eq!(vm.get_property(&arr, "length").unwrap().as_number(), Some(2.0));
    let first = vm.evaluate_script("a[0]", "probe.js").unwrap();
    let second = vm.evaluate_script("a[1]", "probe.js").unwrap();
    assert_eq!(first.as_number(), Some(1.0));
    assert_eq!(second.as_number(), Some(2.0));
}

#[test]
fn test_scenario_async_function() {
    let mut vm = Vm::new();
    vm.evaluate_script(
        "let got; async function f(){return await 41+1} f().then(v=>{got=v});",
        "s3.js",
    )
    .unwrap();
    let got = vm.evaluate_script("got", "probe.js").unwrap();
    assert_eq!(got.as_number(), Some(42.0));
}

#[test]
fn test_scenario_map_values_join() {
    assert_eq!(
        eval_string("const m=new Map([[1,'a'],[2,'b']]);[...m.values()].join(',')"),
        "a,b"
    );
}

#[test]
fn test_scenario_throw_catch_object() {
    assert_eq!(eval_number("try{throw {x:7}}catch(e){e.x}"), 7.0);
}

#[test]
fn test_scenario_proxy_get_trap() {
    assert_eq!(
        eval_string("const p=new Proxy({},{ get(_,k){return k.toUpperCase()}}); p.hello"),
        "HELLO"
    );
}

#[test]
fn test_law_property_key_canonicalization() {
    let v = eval("const o={}; o['100000']=1; o[100000]===o['100000'] && o[100000]===1").unwrap();
    assert_eq!(v, Value::Boolean(true));
}

#[test]
fn test_law_array_sparsity_enumeration() {
    assert_eq!(
        eval_string("const a=[];a[0]=1;a[100000]=2;delete a[0];Object.keys(a).join()"),
        "100000"
    );
    assert_eq!(
        eval_number("const a=[];for(let i=0;i<100;i++)a[i]=i;a.length"),
        100.0
    );
}

#[test]
fn test_law_environment_dead_zone() {
    let err = eval("{ probe; let probe = 1; }").unwrap_err();
    assert_eq!(err.kind, core_types::ErrorKind::ReferenceError);
    assert_eq!(eval_number("{ let probe = 9; probe; }"), 9.0);
}

#[test]
fn test_law_generator_return_runs_finally_once() {
    assert_eq!(
        eval_string(
            "let fin=0;function*g(){try{yield 'a'}finally{fin++}}\
             const it=g();it.next();it.return('r');\
             const after=it.next();\
             [fin, after.done, after.value===undefined].join('|')"
        ),
        "1|true|true"
    );
}

#[test]
fn test_law_await_is_asynchronous() {
    // the awaited continuation runs in a later microtask: strictly
    // after the synchronous tail and after jobs queued before it
    let mut vm = Vm::new();
    vm.evaluate_script(
        "const order=[];\
         Promise.resolve().then(()=>order.push('queued-first'));\
         async function f(){ await 0; order.push('resumed'); }\
         f(); order.push('sync-tail');",
        "law.js",
    )
    .unwrap();
    let order = vm.evaluate_script("order.join(',')", "probe.js").unwrap();
    assert_eq!(
        order.as_string().unwrap().as_str(),
        "sync-tail,queued-first,resumed"
    );
}

#[test]
fn test_indirect_eval_repeated_in_one_vm() {
    // every eval() compiles a fresh one-shot module; the ones here
    // carry property sites so each gets its own cache table, and the
    // churn reuses allocations round after round
    let mut vm = Vm::new();
    let total = vm
        .evaluate_script(
            "var total = 0;\
             for (let i = 0; i < 8; i++) {\
                 total += eval('({first: ' + i + ', second: ' + (i * 2) + '}).first + ({a: 1}).a');\
             }\
             total",
            "eval-loop.js",
        )
        .unwrap();
    assert_eq!(total.as_number(), Some(36.0));

    // collection evicts the dead eval modules' cache tables
    vm.collect_garbage();

    // a later eval whose module has a different, smaller property
    // table must resolve its own names, not a predecessor's
    let v = vm
        .evaluate_script("eval('({value: 7}).value') + eval('total')", "eval-again.js")
        .unwrap();
    assert_eq!(v.as_number(), Some(43.0));
}

#[test]
fn test_number_string_round_trip() {
    for v in ["0", "1", "-1", "1.5", "5050", "0.25"] {
        let src = format!("String(Number('{}')) === '{}'", v, v);
        assert_eq!(eval(&src).unwrap(), Value::Boolean(true));
    }
}

#[test]
fn test_weak_map_law() {
    let mut vm = Vm::new();
    vm.evaluate_script(
        "var wm=new WeakMap(); var keep={}; wm.set(keep,'kept'); { let dead={}; wm.set(dead,'dead'); }",
        "weak.js",
    )
    .unwrap();
    vm.collect_garbage();
    let kept = vm.evaluate_script("wm.get(keep)", "probe.js").unwrap();
    assert_eq!(kept.as_string().unwrap().as_str(), "kept");
}
