//! Value-representation behaviour across module boundaries.

use core_types::{JsString, JsSymbol, PropertyKey, Value};

#[test]
fn value_equality_relations_disagree_exactly_where_specified() {
    let nan = Value::Number(f64::NAN);
    let pz = Value::Number(0.0);
    let nz = Value::Number(-0.0);

    // strict equality: NaN != NaN, +0 == -0
    assert!(!nan.strict_equals(&nan));
    assert!(pz.strict_equals(&nz));

    // SameValue: NaN == NaN, +0 != -0
    assert!(nan.same_value(&nan));
    assert!(!pz.same_value(&nz));

    // SameValueZero: NaN == NaN, +0 == -0
    assert!(nan.same_value_zero(&nan));
    assert!(pz.same_value_zero(&nz));
}

#[test]
fn strings_compare_by_content_symbols_by_identity() {
    let a = Value::String(JsString::from_str("key"));
    let b = Value::String(JsString::from_str("key"));
    assert!(a.strict_equals(&b));

    let s1 = JsSymbol::new(Some(JsString::from_str("desc")));
    let s2 = JsSymbol::new(Some(JsString::from_str("desc")));
    assert!(!Value::Symbol(s1.clone()).strict_equals(&Value::Symbol(s2)));
    assert!(Value::Symbol(s1.clone()).strict_equals(&Value::Symbol(s1)));
}

#[test]
fn property_keys_canonicalize_index_strings() {
    assert_eq!(PropertyKey::from_str("0"), PropertyKey::Index(0));
    assert_eq!(PropertyKey::from_str("100000"), PropertyKey::Index(100000));
    // leading zeros are not canonical
    assert!(matches!(PropertyKey::from_str("007"), PropertyKey::String(_)));
    // the numeric form maps to the same key
    assert_eq!(PropertyKey::from_f64(100000.0), PropertyKey::from_str("100000"));
}
