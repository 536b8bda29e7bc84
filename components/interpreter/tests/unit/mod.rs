//! End-to-end interpreter tests: source in, terminal value out.

use core_types::Value;
use interpreter::Vm;

fn eval(src: &str) -> Value {
    let mut vm = Vm::new();
    vm.evaluate_script(src, "test.js")
        .unwrap_or_else(|e| panic!("evaluation failed for {:?}: {}", src, e))
}

fn eval_number(src: &str) -> f64 {
    match eval(src) {
        Value::Number(n) => n,
        other => panic!("expected number from {:?}, got {:?}", src, other),
    }
}

fn eval_string(src: &str) -> String {
    match eval(src) {
        Value::String(s) => s.as_str().to_string(),
        other => panic!("expected string from {:?}, got {:?}", src, other),
    }
}

fn eval_bool(src: &str) -> bool {
    match eval(src) {
        Value::Boolean(b) => b,
        other => panic!("expected boolean from {:?}, got {:?}", src, other),
    }
}

#[test]
fn test_arithmetic_basics() {
    assert_eq!(eval_number("1 + 2 * 3"), 7.0);
    assert_eq!(eval_number("(1 + 2) * 3"), 9.0);
    assert_eq!(eval_number("2 ** 10"), 1024.0);
    assert_eq!(eval_number("7 % 3"), 1.0);
    assert_eq!(eval_number("-(5)"), -5.0);
    assert_eq!(eval_number("10 / 4"), 2.5);
}

#[test]
fn test_loop_sum_scenario() {
    // end-to-end scenario 1
    assert_eq!(eval_number("let s=0;for(let i=1;i<=100;i++)s+=i;s"), 5050.0);
}

#[test]
fn test_generator_spread_scenario() {
    // end-to-end scenario 2
    assert_eq!(
        eval_number("function*g(){yield 1;yield 2}let a=[...g()];a.length"),
        2.0
    );
    assert_eq!(
        eval_number("function*g(){yield 1;yield 2}let a=[...g()];a[0]"),
        1.0
    );
    assert_eq!(
        eval_number("function*g(){yield 1;yield 2}let a=[...g()];a[1]"),
        2.0
    );
}

#[test]
fn test_async_await_scenario() {
    // end-to-end scenario 3: the promise fulfils with 42 after jobs run
    let mut vm = Vm::new();
    vm.evaluate_script(
        "let result; async function f(){return await 41+1} f().then(v => { result = v; });",
        "test.js",
    )
    .unwrap();
    let result = vm.evaluate_script("result", "probe.js").unwrap();
    assert_eq!(result.as_number(), Some(42.0));
}

#[test]
fn test_map_scenario() {
    // end-to-end scenario 4
    assert_eq!(
        eval_string("const m=new Map([[1,'a'],[2,'b']]);[...m.values()].join(',')"),
        "a,b"
    );
}

#[test]
fn test_try_catch_scenario() {
    // end-to-end scenario 5
    assert_eq!(eval_number("try{throw {x:7}}catch(e){e.x}"), 7.0);
}

#[test]
fn test_proxy_scenario() {
    // end-to-end scenario 6
    assert_eq!(
        eval_string("const p=new Proxy({},{ get(_,k){return k.toUpperCase()}}); p.hello"),
        "HELLO"
    );
}

#[test]
fn test_closures_capture_environments() {
    assert_eq!(
        eval_number(
            "function counter(){let n=0;return function(){n++;return n}}\
             const c=counter();c();c();c()"
        ),
        3.0
    );
}

#[test]
fn test_let_per_iteration_capture() {
    assert_eq!(
        eval_string(
            "const fs=[];for(let i=0;i<3;i++){fs.push(()=>i)}\
             [fs[0](),fs[1](),fs[2]()].join(',')"
        ),
        "0,1,2"
    );
}

#[test]
fn test_dead_zone_throws_reference_error() {
    let mut vm = Vm::new();
    let err = vm
        .evaluate_script("{ x; let x = 1; }", "tdz.js")
        .unwrap_err();
    assert_eq!(err.kind, core_types::ErrorKind::ReferenceError);
    // reading after initialization is fine
    assert_eq!(eval_number("{ let x = 1; x; }"), 1.0);
}

#[test]
fn test_const_assignment_throws() {
    let mut vm = Vm::new();
    let err = vm.evaluate_script("const k = 1; k = 2;", "c.js").unwrap_err();
    assert_eq!(err.kind, core_types::ErrorKind::TypeError);
}

#[test]
fn test_generator_state_machine() {
    // a generator returned mid-flight: later next() is {undefined, true}
    assert_eq!(
        eval_string(
            "function*g(){try{yield 1;yield 2}finally{log.push('fin')}}\
             const log=[];const it=g();it.next();it.return(9);\
             const r=it.next();[r.value===undefined, r.done, log.join()].join('|')"
        ),
        "true|true|fin"
    );
}

#[test]
fn test_generator_finally_runs_once_on_return() {
    assert_eq!(
        eval_number(
            "let runs=0;function*g(){try{yield 1}finally{runs++}}\
             const it=g();it.next();it.return();it.next();runs"
        ),
        1.0
    );
}

#[test]
fn test_generator_throw_caught_inside() {
    assert_eq!(
        eval_string(
            "function*g(){try{yield 1}catch(e){yield e}}\
             const it=g();it.next();it.throw('caught').value"
        ),
        "caught"
    );
}

#[test]
fn test_await_resumes_in_microtask_not_synchronously() {
    let mut vm = Vm::new();
    vm.evaluate_script(
        "const order=[];\
         async function f(){order.push('before');await 0;order.push('after')}\
         f();order.push('sync');",
        "order.js",
    )
    .unwrap();
    let order = vm.evaluate_script("order.join(',')", "probe.js").unwrap();
    assert_eq!(order.as_string().unwrap().as_str(), "before,sync,after");
}

#[test]
fn test_await_runs_after_previously_queued_jobs() {
    let mut vm = Vm::new();
    vm.evaluate_script(
        "const order=[];\
         Promise.resolve().then(()=>order.push('job1'));\
         async function f(){await 0;order.push('await')}\
         f();\
         Promise.resolve().then(()=>order.push('job2'));",
        "order.js",
    )
    .unwrap();
    let order = vm.evaluate_script("order.join(',')", "probe.js").unwrap();
    assert_eq!(order.as_string().unwrap().as_str(), "job1,await,job2");
}

#[test]
fn test_promise_chain() {
    let mut vm = Vm::new();
    vm.evaluate_script(
        "let out; Promise.resolve(1).then(v=>v+1).then(v=>v*10).then(v=>{out=v});",
        "chain.js",
    )
    .unwrap();
    let out = vm.evaluate_script("out", "probe.js").unwrap();
    assert_eq!(out.as_number(), Some(20.0));
}

#[test]
fn test_promise_rejection_caught() {
    let mut vm = Vm::new();
    vm.evaluate_script(
        "let out; Promise.reject('boom').catch(e=>{out='caught:'+e});",
        "rej.js",
    )
    .unwrap();
    let out = vm.evaluate_script("out", "probe.js").unwrap();
    assert_eq!(out.as_string().unwrap().as_str(), "caught:boom");
}

#[test]
fn test_classes_with_private_fields() {
    assert_eq!(
        eval_number(
            "class Counter{ #n=0; inc(){this.#n++} get value(){return this.#n} }\
             const c=new Counter();c.inc();c.inc();c.value"
        ),
        2.0
    );
}

#[test]
fn test_class_inheritance_and_super() {
    assert_eq!(
        eval_string(
            "class A{ constructor(x){this.x=x} hi(){return 'A'+this.x} }\
             class B extends A{ constructor(){super(7)} hi(){return 'B'+super.hi()} }\
             new B().hi()"
        ),
        "BA7"
    );
}

#[test]
fn test_instanceof_and_typeof() {
    assert!(eval_bool("class C{}; new C() instanceof C"));
    assert_eq!(eval_string("typeof 1"), "number");
    assert_eq!(eval_string("typeof 'x'"), "string");
    assert_eq!(eval_string("typeof undefined"), "undefined");
    assert_eq!(eval_string("typeof null"), "object");
    assert_eq!(eval_string("typeof function(){}"), "function");
    assert_eq!(eval_string("typeof missing"), "undefined");
}

#[test]
fn test_destructuring() {
    assert_eq!(
        eval_string("const {a, b: [c, d = 4], ...rest} = {a:1, b:[2], z:9}; [a,c,d,rest.z].join()"),
        "1,2,4,9"
    );
    assert_eq!(eval_string("let a=1,b=2;[a,b]=[b,a];[a,b].join()"), "2,1");
}

#[test]
fn test_for_in_enumeration_order() {
    assert_eq!(
        eval_string(
            "const o={b:1, 10:2, a:3, 2:4}; const ks=[]; for(const k in o) ks.push(k); ks.join()"
        ),
        "2,10,b,a"
    );
}

#[test]
fn test_for_of_over_strings_map_set() {
    assert_eq!(
        eval_string("const out=[];for(const [k,v] of new Map([['x',1]])) out.push(k,v); out.join()"),
        "x,1"
    );
    assert_eq!(
        eval_number("let n=0;for(const v of new Set([1,2,2,3])) n+=v; n"),
        6.0
    );
}

#[test]
fn test_switch_fallthrough_and_default() {
    assert_eq!(
        eval_string(
            "function f(x){const out=[];switch(x){case 1:out.push('one');case 2:out.push('two');break;default:out.push('other')}return out.join()}\
             [f(1),f(2),f(9)].join('|')"
        ),
        "one,two|two|other"
    );
}

#[test]
fn test_template_literals() {
    assert_eq!(eval_string("const x=6;`${x} * 7 = ${x*7}`"), "6 * 7 = 42");
}

#[test]
fn test_property_key_canonicalization() {
    assert!(eval_bool("const o={}; o['42']=1; o[42]===o['42']"));
    assert!(eval_bool("const o={}; o[7]='x'; o['7']==='x'"));
}

#[test]
fn test_array_sparsity_behaviour() {
    assert_eq!(
        eval_string(
            "const a=[];a[0]=1;a[100000]=2;delete a[0];Object.keys(a).join()"
        ),
        "100000"
    );
}

#[test]
fn test_weak_map_entry_dropped_after_gc() {
    let mut vm = Vm::new();
    vm.evaluate_script(
        "const wm=new WeakMap(); let k={}; wm.set(k,'held'); var probe1=wm.get(k); k=null;",
        "weak.js",
    )
    .unwrap();
    vm.collect_garbage();
    let before = vm.evaluate_script("probe1", "probe.js").unwrap();
    assert_eq!(before.as_string().unwrap().as_str(), "held");
    // the key is unreachable: no WeakMap entry can answer for it any
    // more (observable through a fresh key never matching)
    let still_empty = vm
        .evaluate_script("wm.get({}) === undefined", "probe2.js")
        .unwrap();
    assert_eq!(still_empty, Value::Boolean(true));
}

#[test]
fn test_weak_ref_cleared_by_gc() {
    let mut vm = Vm::new();
    vm.evaluate_script("var wr = new WeakRef({}); ", "weak.js").unwrap();
    vm.collect_garbage();
    let deref = vm.evaluate_script("wr.deref()", "probe.js").unwrap();
    assert!(deref.is_undefined());
}

#[test]
fn test_weak_ref_keeps_strongly_held_target() {
    let mut vm = Vm::new();
    vm.evaluate_script("var keep = {tag: 1}; var wr = new WeakRef(keep);", "weak.js")
        .unwrap();
    vm.collect_garbage();
    let deref = vm.evaluate_script("wr.deref().tag", "probe.js").unwrap();
    assert_eq!(deref.as_number(), Some(1.0));
}

#[test]
fn test_uncaught_error_reports_kind() {
    let mut vm = Vm::new();
    let err = vm.evaluate_script("null.x", "err.js").unwrap_err();
    assert_eq!(err.kind, core_types::ErrorKind::TypeError);
    let err = vm.evaluate_script("missing()", "err.js").unwrap_err();
    assert_eq!(err.kind, core_types::ErrorKind::ReferenceError);
}

#[test]
fn test_finally_runs_on_both_paths() {
    assert_eq!(
        eval_string(
            "const log=[];\
             function f(fail){try{if(fail)throw 'x';log.push('try')}catch(e){log.push('catch')}finally{log.push('fin')}}\
             f(false);f(true);log.join()"
        ),
        "try,fin,catch,fin"
    );
}

#[test]
fn test_nested_finally_with_return() {
    assert_eq!(
        eval_string(
            "const log=[];\
             function f(){try{try{return 'r'}finally{log.push('inner')}}finally{log.push('outer')}}\
             const r=f();log.push(r);log.join()"
        ),
        "inner,outer,r"
    );
}

#[test]
fn test_labelled_break() {
    assert_eq!(
        eval_number(
            "let n=0;outer:for(let i=0;i<10;i++){for(let j=0;j<10;j++){if(j===2)continue outer;if(i===3)break outer;n++}}n"
        ),
        6.0
    );
}

#[test]
fn test_logical_operators_short_circuit() {
    assert_eq!(eval_number("let n=0;function b(){n++;return true} false && b(); n"), 0.0);
    assert_eq!(eval_number("0 ?? 5"), 0.0);
    assert_eq!(eval_number("null ?? 5"), 5.0);
    assert_eq!(eval_number("undefined || 3"), 3.0);
    assert_eq!(eval_number("2 && 3"), 3.0);
}

#[test]
fn test_bigint_arithmetic() {
    assert_eq!(eval_string("(2n ** 64n).toString()"), "18446744073709551616");
    assert!(eval_bool("1n + 2n === 3n"));
    let mut vm = Vm::new();
    let err = vm.evaluate_script("1n + 1", "mix.js").unwrap_err();
    assert_eq!(err.kind, core_types::ErrorKind::TypeError);
}

#[test]
fn test_equality_semantics() {
    assert!(eval_bool("NaN !== NaN"));
    assert!(eval_bool("0 === -0"));
    assert!(eval_bool("null == undefined"));
    assert!(eval_bool("null !== undefined"));
    assert!(eval_bool("'1' == 1"));
    assert!(eval_bool("'1' !== 1"));
}

#[test]
fn test_interrupt_flag_stops_execution() {
    let mut vm = Vm::new();
    let handle = vm.interrupt_handle();
    handle.store(true, std::sync::atomic::Ordering::Relaxed);
    let err = vm
        .evaluate_script("let i = 0; while (true) { i++; }", "spin.js")
        .unwrap_err();
    assert_eq!(err.kind, core_types::ErrorKind::InternalError);
}

#[test]
fn test_gc_during_execution_preserves_live_data() {
    // enough churn to cross the collection threshold mid-script
    assert_eq!(
        eval_number(
            "let keep={n:0};\
             for(let i=0;i<20000;i++){ keep = {n: keep.n + 1, junk: {a: i, b: [i, i]}}; }\
             keep.n"
        ),
        20000.0
    );
}

#[test]
fn test_function_apply_call_bind() {
    assert_eq!(
        eval_number("function f(a,b){return this.base+a+b} f.call({base:1},2,3)"),
        6.0
    );
    assert_eq!(
        eval_number("function f(a,b){return this.base+a+b} f.apply({base:1},[2,3])"),
        6.0
    );
    assert_eq!(
        eval_number("function f(a,b){return this.base+a+b} const g=f.bind({base:10},5); g(1)"),
        16.0
    );
}

#[test]
fn test_module_evaluation_with_imports() {
    let mut vm = Vm::new();
    vm.set_module_loader(Box::new(|specifier, _referrer| match specifier {
        "./math" => Ok("export const double = x => x * 2; export default 42;".to_string()),
        other => Err(format!("unknown module {}", other)),
    }));
    let result = vm.evaluate_module(
        "import answer, {double} from './math'; export const out = double(answer); out",
        "main.js",
    );
    let value = result.unwrap();
    assert_eq!(value.as_number(), Some(84.0));
}

#[test]
fn test_eval_runs_in_global_scope() {
    assert_eq!(eval_number("eval('2 + 3')"), 5.0);
    assert_eq!(eval_number("eval('var evx = 7'); evx"), 7.0);
}

#[test]
fn test_getters_and_setters() {
    assert_eq!(
        eval_number(
            "const o={ _v: 1, get v(){return this._v}, set v(x){this._v = x*2} }; o.v = 5; o.v"
        ),
        10.0
    );
}

#[test]
fn test_spread_arguments_and_rest_params() {
    assert_eq!(
        eval_number("function f(a, ...rest){return a + rest.length} f(1, 2, 3, 4)"),
        4.0
    );
    assert_eq!(eval_number("function f(a,b,c){return a+b+c} f(...[1,2,3])"), 6.0);
}

#[test]
fn test_default_parameters() {
    assert_eq!(eval_number("function f(a, b = a + 1){return b} f(1)"), 2.0);
    assert_eq!(eval_number("function f(a, b = a + 1){return b} f(1, 9)"), 9.0);
}

#[test]
fn test_arrow_this_lexical() {
    assert_eq!(
        eval_number(
            "const o = { n: 5, get(){ const f = () => this.n; return f(); } }; o.get()"
        ),
        5.0
    );
}

#[test]
fn test_async_generator_for_await() {
    let mut vm = Vm::new();
    vm.evaluate_script(
        "let out=[];\
         async function* gen(){ yield 1; yield 2; }\
         async function main(){ for await (const v of gen()) out.push(v); out.push('done'); }\
         main();",
        "ag.js",
    )
    .unwrap();
    let out = vm.evaluate_script("out.join(',')", "probe.js").unwrap();
    assert_eq!(out.as_string().unwrap().as_str(), "1,2,done");
}
