//! Execution behaviour through the Runtime facade.

use js_cli::Runtime;

#[test]
fn expression_results_are_returned() {
    let mut rt = Runtime::new();
    assert_eq!(
        rt.execute_script("'ab' + 'cd'", "t.js").unwrap().as_string().unwrap().as_str(),
        "abcd"
    );
}

#[test]
fn later_inputs_see_earlier_globals() {
    let mut rt = Runtime::new();
    rt.execute_script("function inc(x){return x + 1}", "a.js").unwrap();
    let v = rt.execute_script("inc(inc(40))", "b.js").unwrap();
    assert_eq!(v.as_number(), Some(42.0));
}

#[test]
fn errors_do_not_poison_the_runtime() {
    let mut rt = Runtime::new();
    rt.execute_script("var ok = 1;", "a.js").unwrap();
    assert!(rt.execute_script("throw 'x'", "b.js").is_err());
    let v = rt.execute_script("ok", "c.js").unwrap();
    assert_eq!(v.as_number(), Some(1.0));
}

#[test]
fn jobs_drain_between_inputs() {
    let mut rt = Runtime::new();
    rt.execute_script("var seen; Promise.resolve('later').then(v => { seen = v; });", "a.js")
        .unwrap();
    let v = rt.execute_script("seen", "b.js").unwrap();
    assert_eq!(v.as_string().unwrap().as_str(), "later");
}
