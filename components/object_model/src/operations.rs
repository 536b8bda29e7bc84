//! Abstract operations over values: coercions, equality, arithmetic
//! and the iterator protocol. Everything that may call back into user
//! code (`valueOf`, `@@iterator`, getters) takes the agent.

use std::rc::Rc;

use num_bigint::BigInt;
use num_traits::{Signed, ToPrimitive, Zero};

use core_types::{
    format_f64, parse_number_literal, Completion, JsString, JsStringRef, ObjectId, PropertyKey,
    Value,
};
use memory_manager::{Agent, AgentErrors, JsObject, ObjectKind};

use crate::descriptor::PropertyDescriptor;
use crate::protocol;

/// Preferred type for `ToPrimitive`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrimitiveHint {
    /// No preference (`default`)
    Default,
    /// Prefer numbers
    Number,
    /// Prefer strings
    String,
}

/// The numeric domain of a value after `ToNumeric`.
#[derive(Debug, Clone)]
pub enum Numeric {
    /// A double
    Number(f64),
    /// A big integer
    BigInt(Rc<BigInt>),
}

impl Numeric {
    /// Back to a value.
    pub fn to_value(self) -> Value {
        match self {
            Numeric::Number(n) => Value::Number(n),
            Numeric::BigInt(b) => Value::BigInt(b),
        }
    }
}

/// `ToBoolean`
pub fn to_boolean(v: &Value) -> bool {
    v.is_truthy()
}

/// `ToPrimitive`
pub fn to_primitive(agent: &mut dyn Agent, v: &Value, hint: PrimitiveHint) -> Completion<Value> {
    let Some(obj) = v.as_object() else {
        return Ok(v.clone());
    };
    let exotic = {
        let sym = agent.heap().well_known.to_primitive.clone();
        get_method(agent, v, &PropertyKey::Symbol(sym))?
    };
    if let Some(method) = exotic {
        let hint_str = match hint {
            PrimitiveHint::Default => "default",
            PrimitiveHint::Number => "number",
            PrimitiveHint::String => "string",
        };
        let result = agent.call(method, v.clone(), &[Value::string(hint_str)])?;
        if result.is_object() {
            return agent.type_error("Symbol.toPrimitive returned an object");
        }
        return Ok(result);
    }
    // OrdinaryToPrimitive
    let names: [&str; 2] = if hint == PrimitiveHint::String {
        ["toString", "valueOf"]
    } else {
        ["valueOf", "toString"]
    };
    for name in names {
        let method = protocol::get(agent, obj, &PropertyKey::from_str(name), v)?;
        if is_callable(agent, &method) {
            let result = agent.call(method, v.clone(), &[])?;
            if !result.is_object() {
                return Ok(result);
            }
        }
    }
    agent.type_error("cannot convert object to primitive value")
}

/// `ToNumber`
pub fn to_number(agent: &mut dyn Agent, v: &Value) -> Completion<f64> {
    match v {
        Value::Number(n) => Ok(*n),
        Value::Undefined => Ok(f64::NAN),
        Value::Null => Ok(0.0),
        Value::Boolean(b) => Ok(if *b { 1.0 } else { 0.0 }),
        Value::String(s) => Ok(parse_number_literal(s.as_str()).unwrap_or(f64::NAN)),
        Value::BigInt(_) => agent.type_error("cannot convert a BigInt to a number"),
        Value::Symbol(_) | Value::PrivateName(_) => {
            agent.type_error("cannot convert a Symbol to a number")
        }
        Value::Object(_) => {
            let prim = to_primitive(agent, v, PrimitiveHint::Number)?;
            to_number(agent, &prim)
        }
    }
}

/// `ToNumeric`: like `ToNumber` but BigInts stay BigInts.
pub fn to_numeric(agent: &mut dyn Agent, v: &Value) -> Completion<Numeric> {
    let prim = to_primitive(agent, v, PrimitiveHint::Number)?;
    match prim {
        Value::BigInt(b) => Ok(Numeric::BigInt(b)),
        other => Ok(Numeric::Number(to_number(agent, &other)?)),
    }
}

/// `ToString`
pub fn to_string(agent: &mut dyn Agent, v: &Value) -> Completion<JsStringRef> {
    match v {
        Value::String(s) => Ok(s.clone()),
        Value::Undefined => Ok(JsString::from_str("undefined")),
        Value::Null => Ok(JsString::from_str("null")),
        Value::Boolean(b) => Ok(JsString::from_str(if *b { "true" } else { "false" })),
        Value::Number(n) => Ok(JsString::new(format_f64(*n))),
        Value::BigInt(b) => Ok(JsString::new(b.to_string())),
        Value::Symbol(_) | Value::PrivateName(_) => {
            agent.type_error("cannot convert a Symbol to a string")
        }
        Value::Object(_) => {
            let prim = to_primitive(agent, v, PrimitiveHint::String)?;
            to_string(agent, &prim)
        }
    }
}

/// Modular double-to-int32.
pub fn f64_to_int32(n: f64) -> i32 {
    if !n.is_finite() || n == 0.0 {
        return 0;
    }
    let n = n.trunc();
    let m = n.rem_euclid(4294967296.0);
    if m >= 2147483648.0 {
        (m - 4294967296.0) as i32
    } else {
        m as i32
    }
}

/// Modular double-to-uint32.
pub fn f64_to_uint32(n: f64) -> u32 {
    if !n.is_finite() || n == 0.0 {
        return 0;
    }
    n.trunc().rem_euclid(4294967296.0) as u32
}

/// `ToInt32`
pub fn to_int32(agent: &mut dyn Agent, v: &Value) -> Completion<i32> {
    Ok(f64_to_int32(to_number(agent, v)?))
}

/// `ToUint32`
pub fn to_uint32(agent: &mut dyn Agent, v: &Value) -> Completion<u32> {
    Ok(f64_to_uint32(to_number(agent, v)?))
}

/// `ToPropertyKey`
pub fn to_property_key(agent: &mut dyn Agent, v: &Value) -> Completion<PropertyKey> {
    match v {
        Value::Symbol(s) => Ok(PropertyKey::Symbol(s.clone())),
        Value::PrivateName(p) => Ok(PropertyKey::Private(p.clone())),
        Value::Number(n) => Ok(PropertyKey::from_f64(*n)),
        _ => {
            let prim = to_primitive(agent, v, PrimitiveHint::String)?;
            match prim {
                Value::Symbol(s) => Ok(PropertyKey::Symbol(s)),
                other => {
                    let s = to_string(agent, &other)?;
                    Ok(PropertyKey::from_string(s))
                }
            }
        }
    }
}

/// `ToObject`, but throwing for every primitive: the engine works on
/// primitives directly through [`get_v`] and never materializes
/// wrapper objects.
pub fn to_object_or_throw(agent: &mut dyn Agent, v: &Value) -> Completion<ObjectId> {
    match v {
        Value::Object(id) => Ok(*id),
        Value::Undefined | Value::Null => {
            agent.type_error("cannot convert undefined or null to object")
        }
        _ => agent.type_error("primitive value used where an object is required"),
    }
}

/// Whether a value is a callable object.
pub fn is_callable(agent: &dyn Agent, v: &Value) -> bool {
    match v.as_object() {
        Some(id) => agent.heap_ref().object(id).is_callable(),
        None => false,
    }
}

/// `typeof`, including the callable-object case.
pub fn type_of_value(agent: &dyn Agent, v: &Value) -> &'static str {
    if is_callable(agent, v) {
        "function"
    } else {
        v.type_of()
    }
}

/// `GetV`: property access on any base value. Primitives delegate to
/// their wrapper prototype with the primitive as receiver; strings
/// additionally answer `length` and index keys directly.
pub fn get_v(agent: &mut dyn Agent, base: &Value, key: &PropertyKey) -> Completion<Value> {
    match base {
        Value::Object(id) => protocol::get(agent, *id, key, base),
        Value::Undefined | Value::Null => {
            let msg = format!(
                "cannot read properties of {} (reading '{}')",
                base.type_of(),
                key.to_display_string()
            );
            agent.type_error(&msg)
        }
        Value::String(s) => {
            if let PropertyKey::String(k) = key {
                if k.as_str() == "length" {
                    return Ok(Value::Number(s.utf16_len() as f64));
                }
            }
            if let PropertyKey::Index(i) = key {
                let units: Vec<u16> = s.as_str().encode_utf16().collect();
                return Ok(match units.get(*i as usize) {
                    Some(u) => Value::String(JsString::new(String::from_utf16_lossy(&[*u]))),
                    None => Value::Undefined,
                });
            }
            let proto = agent.realm().intrinsics.string_prototype;
            protocol::get(agent, proto, key, base)
        }
        Value::Number(_) => {
            let proto = agent.realm().intrinsics.number_prototype;
            protocol::get(agent, proto, key, base)
        }
        Value::Boolean(_) => {
            let proto = agent.realm().intrinsics.boolean_prototype;
            protocol::get(agent, proto, key, base)
        }
        Value::BigInt(_) => {
            let proto = agent.realm().intrinsics.bigint_prototype;
            protocol::get(agent, proto, key, base)
        }
        Value::Symbol(s) => {
            if let PropertyKey::String(k) = key {
                if k.as_str() == "description" {
                    return Ok(match &s.description {
                        Some(d) => Value::String(d.clone()),
                        None => Value::Undefined,
                    });
                }
            }
            let proto = agent.realm().intrinsics.symbol_prototype;
            protocol::get(agent, proto, key, base)
        }
        Value::PrivateName(_) => agent.type_error("invalid private-name access"),
    }
}

/// `GetMethod`: a callable property or `None` for undefined/null.
pub fn get_method(
    agent: &mut dyn Agent,
    base: &Value,
    key: &PropertyKey,
) -> Completion<Option<Value>> {
    let func = get_v(agent, base, key)?;
    if func.is_nullish() {
        return Ok(None);
    }
    if !is_callable(agent, &func) {
        let msg = format!("{} is not a function", key.to_display_string());
        return agent.type_error(&msg);
    }
    Ok(Some(func))
}

/// `CreateDataProperty`
pub fn create_data_property(
    agent: &mut dyn Agent,
    obj: ObjectId,
    key: &PropertyKey,
    value: Value,
) -> Completion<bool> {
    protocol::define_own_property(
        agent,
        obj,
        key,
        PropertyDescriptor::data(value, true, true, true),
    )
}

/// `ArrayCreate`
pub fn array_create(agent: &mut dyn Agent, length: u32) -> ObjectId {
    let proto = agent.realm().intrinsics.array_prototype;
    agent.heap().alloc_object(JsObject::with_kind(
        Some(proto),
        ObjectKind::Array {
            length,
            length_writable: true,
        },
    ))
}

/// The `+` operator: string concatenation or numeric addition.
pub fn add_values(agent: &mut dyn Agent, lhs: &Value, rhs: &Value) -> Completion<Value> {
    let lp = to_primitive(agent, lhs, PrimitiveHint::Default)?;
    let rp = to_primitive(agent, rhs, PrimitiveHint::Default)?;
    if matches!(lp, Value::String(_)) || matches!(rp, Value::String(_)) {
        let ls = to_string(agent, &lp)?;
        let rs = to_string(agent, &rp)?;
        let mut s = String::with_capacity(ls.as_str().len() + rs.as_str().len());
        s.push_str(ls.as_str());
        s.push_str(rs.as_str());
        return Ok(Value::String(JsString::new(s)));
    }
    let ln = to_numeric(agent, &lp)?;
    let rn = to_numeric(agent, &rp)?;
    match (ln, rn) {
        (Numeric::Number(a), Numeric::Number(b)) => Ok(Value::Number(a + b)),
        (Numeric::BigInt(a), Numeric::BigInt(b)) => {
            Ok(Value::BigInt(Rc::new(a.as_ref() + b.as_ref())))
        }
        _ => agent.type_error("cannot mix BigInt and other types in addition"),
    }
}

/// The non-additive binary numeric operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NumericOp {
    /// `-`
    Sub,
    /// `*`
    Mul,
    /// `/`
    Div,
    /// `%`
    Mod,
    /// `**`
    Exp,
    /// `&`
    BitAnd,
    /// `|`
    BitOr,
    /// `^`
    BitXor,
    /// `<<`
    Shl,
    /// `>>`
    Shr,
    /// `>>>`
    UShr,
}

/// Apply a numeric operator with BigInt awareness.
pub fn numeric_binary_op(
    agent: &mut dyn Agent,
    op: NumericOp,
    lhs: &Value,
    rhs: &Value,
) -> Completion<Value> {
    let ln = to_numeric(agent, lhs)?;
    let rn = to_numeric(agent, rhs)?;
    match (ln, rn) {
        (Numeric::Number(a), Numeric::Number(b)) => Ok(number_op(op, a, b)),
        (Numeric::BigInt(a), Numeric::BigInt(b)) => bigint_op(agent, op, &a, &b),
        _ => agent.type_error("cannot mix BigInt and other types"),
    }
}

fn number_op(op: NumericOp, a: f64, b: f64) -> Value {
    let n = match op {
        NumericOp::Sub => a - b,
        NumericOp::Mul => a * b,
        NumericOp::Div => a / b,
        NumericOp::Mod => {
            if b == 0.0 || a.is_nan() || b.is_nan() || a.is_infinite() {
                f64::NAN
            } else if b.is_infinite() {
                a
            } else {
                a % b
            }
        }
        NumericOp::Exp => a.powf(b),
        NumericOp::BitAnd => return Value::Number((f64_to_int32(a) & f64_to_int32(b)) as f64),
        NumericOp::BitOr => return Value::Number((f64_to_int32(a) | f64_to_int32(b)) as f64),
        NumericOp::BitXor => return Value::Number((f64_to_int32(a) ^ f64_to_int32(b)) as f64),
        NumericOp::Shl => {
            return Value::Number((f64_to_int32(a).wrapping_shl(f64_to_uint32(b) & 31)) as f64)
        }
        NumericOp::Shr => {
            return Value::Number((f64_to_int32(a).wrapping_shr(f64_to_uint32(b) & 31)) as f64)
        }
        NumericOp::UShr => {
            return Value::Number((f64_to_uint32(a).wrapping_shr(f64_to_uint32(b) & 31)) as f64)
        }
    };
    Value::Number(n)
}

fn bigint_op(
    agent: &mut dyn Agent,
    op: NumericOp,
    a: &Rc<BigInt>,
    b: &Rc<BigInt>,
) -> Completion<Value> {
    let result = match op {
        NumericOp::Sub => a.as_ref() - b.as_ref(),
        NumericOp::Mul => a.as_ref() * b.as_ref(),
        NumericOp::Div => {
            if b.is_zero() {
                return agent.range_error("division by zero");
            }
            a.as_ref() / b.as_ref()
        }
        NumericOp::Mod => {
            if b.is_zero() {
                return agent.range_error("division by zero");
            }
            a.as_ref() % b.as_ref()
        }
        NumericOp::Exp => {
            if b.is_negative() {
                return agent.range_error("exponent must be non-negative");
            }
            let Some(e) = b.to_u32() else {
                return agent.range_error("BigInt exponent too large");
            };
            a.pow(e)
        }
        NumericOp::BitAnd => a.as_ref() & b.as_ref(),
        NumericOp::BitOr => a.as_ref() | b.as_ref(),
        NumericOp::BitXor => a.as_ref() ^ b.as_ref(),
        NumericOp::Shl | NumericOp::Shr => {
            let Some(shift) = b.abs().to_usize() else {
                return agent.range_error("BigInt shift too large");
            };
            let left = matches!(op, NumericOp::Shl) != b.is_negative();
            if left {
                a.as_ref() << shift
            } else {
                a.as_ref() >> shift
            }
        }
        NumericOp::UShr => {
            return agent.type_error("BigInts have no unsigned right shift");
        }
    };
    Ok(Value::BigInt(Rc::new(result)))
}

/// Unary `-`.
pub fn numeric_negate(agent: &mut dyn Agent, v: &Value) -> Completion<Value> {
    match to_numeric(agent, v)? {
        Numeric::Number(n) => Ok(Value::Number(-n)),
        Numeric::BigInt(b) => Ok(Value::BigInt(Rc::new(-b.as_ref().clone()))),
    }
}

/// Unary `~`.
pub fn numeric_bit_not(agent: &mut dyn Agent, v: &Value) -> Completion<Value> {
    match to_numeric(agent, v)? {
        Numeric::Number(n) => Ok(Value::Number(!f64_to_int32(n) as f64)),
        Numeric::BigInt(b) => Ok(Value::BigInt(Rc::new(!b.as_ref().clone()))),
    }
}

/// `++`/`--` on an already-read operand.
pub fn numeric_increment(agent: &mut dyn Agent, v: &Value, delta: i32) -> Completion<Value> {
    match to_numeric(agent, v)? {
        Numeric::Number(n) => Ok(Value::Number(n + delta as f64)),
        Numeric::BigInt(b) => Ok(Value::BigInt(Rc::new(b.as_ref() + BigInt::from(delta)))),
    }
}

/// Abstract equality (`==`).
pub fn equals_abstract(agent: &mut dyn Agent, x: &Value, y: &Value) -> Completion<bool> {
    use Value::*;
    match (x, y) {
        (Undefined | Null, Undefined | Null) => Ok(true),
        (Number(_), Number(_))
        | (String(_), String(_))
        | (Boolean(_), Boolean(_))
        | (BigInt(_), BigInt(_))
        | (Symbol(_), Symbol(_))
        | (Object(_), Object(_)) => Ok(x.strict_equals(y)),
        (Number(n), String(s)) | (String(s), Number(n)) => {
            Ok(*n == parse_number_literal(s.as_str()).unwrap_or(f64::NAN))
        }
        (BigInt(b), String(s)) | (String(s), BigInt(b)) => {
            Ok(s.as_str().trim().parse::<num_bigint::BigInt>().map(|p| p == *b.as_ref()).unwrap_or(false))
        }
        (Boolean(_), _) => {
            let n = to_number(agent, x)?;
            equals_abstract(agent, &Number(n), y)
        }
        (_, Boolean(_)) => {
            let n = to_number(agent, y)?;
            equals_abstract(agent, x, &Number(n))
        }
        (BigInt(b), Number(n)) | (Number(n), BigInt(b)) => {
            if !n.is_finite() || n.fract() != 0.0 {
                return Ok(false);
            }
            Ok(num_bigint::BigInt::from(*n as i64) == *b.as_ref())
        }
        (Object(_), Number(_) | String(_) | BigInt(_) | Symbol(_)) => {
            let p = to_primitive(agent, x, PrimitiveHint::Default)?;
            equals_abstract(agent, &p, y)
        }
        (Number(_) | String(_) | BigInt(_) | Symbol(_), Object(_)) => {
            let p = to_primitive(agent, y, PrimitiveHint::Default)?;
            equals_abstract(agent, x, &p)
        }
        _ => Ok(false),
    }
}

/// Abstract relational comparison: `Some(bool)` or `None` when an
/// operand is NaN.
pub fn less_than(agent: &mut dyn Agent, x: &Value, y: &Value) -> Completion<Option<bool>> {
    let px = to_primitive(agent, x, PrimitiveHint::Number)?;
    let py = to_primitive(agent, y, PrimitiveHint::Number)?;
    if let (Value::String(a), Value::String(b)) = (&px, &py) {
        return Ok(Some(a.as_str() < b.as_str()));
    }
    let nx = to_numeric(agent, &px)?;
    let ny = to_numeric(agent, &py)?;
    match (nx, ny) {
        (Numeric::Number(a), Numeric::Number(b)) => {
            if a.is_nan() || b.is_nan() {
                Ok(None)
            } else {
                Ok(Some(a < b))
            }
        }
        (Numeric::BigInt(a), Numeric::BigInt(b)) => Ok(Some(a < b)),
        (Numeric::BigInt(a), Numeric::Number(b)) => {
            if b.is_nan() {
                Ok(None)
            } else {
                Ok(Some(a.to_f64().map(|af| af < b).unwrap_or(a.is_negative())))
            }
        }
        (Numeric::Number(a), Numeric::BigInt(b)) => {
            if a.is_nan() {
                Ok(None)
            } else {
                Ok(Some(b.to_f64().map(|bf| a < bf).unwrap_or(!b.is_negative())))
            }
        }
    }
}

/// `instanceof`, with `@@hasInstance` dispatch.
pub fn instance_of(agent: &mut dyn Agent, v: &Value, target: &Value) -> Completion<bool> {
    let Some(target_id) = target.as_object() else {
        return agent.type_error("right-hand side of instanceof is not an object");
    };
    let method = {
        let sym = agent.heap().well_known.has_instance.clone();
        get_method(agent, target, &PropertyKey::Symbol(sym))?
    };
    if let Some(m) = method {
        let result = agent.call(m, target.clone(), &[v.clone()])?;
        return Ok(to_boolean(&result));
    }
    if !is_callable(agent, target) {
        return agent.type_error("right-hand side of instanceof is not callable");
    }
    // bound functions check against their wrapped target
    if let ObjectKind::Bound(b) = &agent.heap_ref().object(target_id).kind {
        let inner = Value::Object(b.target);
        return instance_of(agent, v, &inner);
    }
    let proto = protocol::get(
        agent,
        target_id,
        &PropertyKey::from_str("prototype"),
        target,
    )?;
    let Some(proto_id) = proto.as_object() else {
        return agent.type_error("prototype is not an object");
    };
    let Some(mut walk) = v.as_object() else {
        return Ok(false);
    };
    loop {
        match protocol::get_prototype_of(agent, walk)? {
            Some(p) if p == proto_id => return Ok(true),
            Some(p) => walk = p,
            None => return Ok(false),
        }
    }
}

/// A captured iterator: the object and its `next` method.
#[derive(Debug, Clone)]
pub struct IteratorRecord {
    /// The iterator object.
    pub iterator: Value,
    /// The `next` method.
    pub next_method: Value,
}

/// `GetIterator`. With `is_async` the `@@asyncIterator` method is
/// preferred, falling back to the sync protocol.
pub fn get_iterator(agent: &mut dyn Agent, v: &Value, is_async: bool) -> Completion<IteratorRecord> {
    let mut method = None;
    if is_async {
        let sym = agent.heap().well_known.async_iterator.clone();
        method = get_method(agent, v, &PropertyKey::Symbol(sym))?;
    }
    if method.is_none() {
        let sym = agent.heap().well_known.iterator.clone();
        method = get_method(agent, v, &PropertyKey::Symbol(sym))?;
    }
    let Some(method) = method else {
        let msg = format!("{} is not iterable", type_of_value(agent, v));
        return agent.type_error(&msg);
    };
    let iterator = agent.call(method, v.clone(), &[])?;
    if !iterator.is_object() {
        return agent.type_error("iterator method did not return an object");
    }
    let next_method = get_v(agent, &iterator, &PropertyKey::from_str("next"))?;
    Ok(IteratorRecord {
        iterator,
        next_method,
    })
}

/// `IteratorNext`: one protocol step, returning `(done, value)`.
pub fn iterator_next(
    agent: &mut dyn Agent,
    record: &IteratorRecord,
    arg: Option<Value>,
) -> Completion<(bool, Value)> {
    let args: Vec<Value> = arg.into_iter().collect();
    let result = agent.call(record.next_method.clone(), record.iterator.clone(), &args)?;
    let Some(obj) = result.as_object() else {
        return agent.type_error("iterator result is not an object");
    };
    let done = protocol::get(agent, obj, &PropertyKey::from_str("done"), &result)?;
    let value = protocol::get(agent, obj, &PropertyKey::from_str("value"), &result)?;
    Ok((to_boolean(&done), value))
}

/// `IteratorClose`: call `return` if present; errors from the close
/// itself are dropped so the original completion wins.
pub fn iterator_close(agent: &mut dyn Agent, record: &IteratorRecord) {
    let method = get_method(agent, &record.iterator, &PropertyKey::from_str("return"));
    if let Ok(Some(m)) = method {
        let _ = agent.call(m, record.iterator.clone(), &[]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_agent::TestAgent;

    #[test]
    fn test_to_number_of_strings() {
        let mut agent = TestAgent::new();
        assert_eq!(to_number(&mut agent, &Value::string("42")).unwrap(), 42.0);
        assert_eq!(to_number(&mut agent, &Value::string("0x10")).unwrap(), 16.0);
        assert!(to_number(&mut agent, &Value::string("junk")).unwrap().is_nan());
        assert_eq!(to_number(&mut agent, &Value::string("")).unwrap(), 0.0);
    }

    #[test]
    fn test_add_concatenates_with_strings() {
        let mut agent = TestAgent::new();
        let v = add_values(&mut agent, &Value::string("a"), &Value::Number(1.0)).unwrap();
        assert_eq!(v.as_string().unwrap().as_str(), "a1");
        let v = add_values(&mut agent, &Value::Number(40.0), &Value::Number(2.0)).unwrap();
        assert_eq!(v.as_number(), Some(42.0));
    }

    #[test]
    fn test_bigint_arithmetic() {
        let mut agent = TestAgent::new();
        let two = Value::BigInt(Rc::new(BigInt::from(2)));
        let ten = Value::BigInt(Rc::new(BigInt::from(10)));
        let v = numeric_binary_op(&mut agent, NumericOp::Exp, &two, &ten).unwrap();
        match v {
            Value::BigInt(b) => assert_eq!(*b, BigInt::from(1024)),
            _ => unreachable!(),
        }
        // mixing domains is a TypeError
        assert!(numeric_binary_op(&mut agent, NumericOp::Mul, &two, &Value::Number(3.0)).is_err());
        // BigInt has no >>>
        assert!(numeric_binary_op(&mut agent, NumericOp::UShr, &two, &ten).is_err());
    }

    #[test]
    fn test_int32_wrapping() {
        assert_eq!(f64_to_int32(4294967296.0), 0);
        assert_eq!(f64_to_int32(2147483648.0), -2147483648);
        assert_eq!(f64_to_int32(-1.5), -1);
        assert_eq!(f64_to_uint32(-1.0), 4294967295);
    }

    #[test]
    fn test_abstract_equality() {
        let mut agent = TestAgent::new();
        assert!(equals_abstract(&mut agent, &Value::Null, &Value::Undefined).unwrap());
        assert!(equals_abstract(&mut agent, &Value::Number(1.0), &Value::string("1")).unwrap());
        assert!(equals_abstract(&mut agent, &Value::Boolean(true), &Value::Number(1.0)).unwrap());
        assert!(!equals_abstract(&mut agent, &Value::Null, &Value::Number(0.0)).unwrap());
        let nan = Value::Number(f64::NAN);
        assert!(!equals_abstract(&mut agent, &nan, &nan).unwrap());
    }

    #[test]
    fn test_relational_with_nan() {
        let mut agent = TestAgent::new();
        assert_eq!(
            less_than(&mut agent, &Value::Number(f64::NAN), &Value::Number(1.0)).unwrap(),
            None
        );
        assert_eq!(
            less_than(&mut agent, &Value::string("a"), &Value::string("b")).unwrap(),
            Some(true)
        );
    }

    #[test]
    fn test_string_get_v() {
        let mut agent = TestAgent::new();
        let s = Value::string("abc");
        let len = get_v(&mut agent, &s, &PropertyKey::from_str("length")).unwrap();
        assert_eq!(len.as_number(), Some(3.0));
        let c = get_v(&mut agent, &s, &PropertyKey::Index(1)).unwrap();
        assert_eq!(c.as_string().unwrap().as_str(), "b");
        let past = get_v(&mut agent, &s, &PropertyKey::Index(9)).unwrap();
        assert!(past.is_undefined());
    }

    #[test]
    fn test_get_v_on_nullish_throws() {
        let mut agent = TestAgent::new();
        assert!(get_v(&mut agent, &Value::Undefined, &PropertyKey::from_str("x")).is_err());
        assert!(get_v(&mut agent, &Value::Null, &PropertyKey::from_str("x")).is_err());
    }
}
