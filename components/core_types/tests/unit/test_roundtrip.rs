//! Primitive string round-trip: `parse(format(v))` preserves the
//! value under SameValueZero for every primitive domain.

use core_types::{format_f64, parse_number_literal, Value};

#[test]
fn number_round_trip_same_value_zero() {
    let cases = [
        0.0,
        -0.0,
        1.0,
        -1.0,
        0.5,
        1.5,
        5050.0,
        1e21,
        f64::MAX,
        f64::MIN_POSITIVE,
        f64::NAN,
        f64::INFINITY,
        f64::NEG_INFINITY,
    ];
    for v in cases {
        let text = format_f64(v);
        let back = match text.as_str() {
            "NaN" => f64::NAN,
            _ => parse_number_literal(&text).unwrap_or_else(|| panic!("reparse {}", text)),
        };
        assert!(
            Value::Number(v).same_value_zero(&Value::Number(back)),
            "round trip changed {} -> {} -> {}",
            v,
            text,
            back
        );
    }
}

#[test]
fn boolean_null_undefined_have_fixed_spellings() {
    assert_eq!(Value::Boolean(true).primitive_string().unwrap(), "true");
    assert_eq!(Value::Boolean(false).primitive_string().unwrap(), "false");
    assert_eq!(Value::Undefined.primitive_string().unwrap(), "undefined");
    assert_eq!(Value::Null.primitive_string().unwrap(), "null");
    assert_eq!(Value::Number(5050.0).primitive_string().unwrap(), "5050");
}
