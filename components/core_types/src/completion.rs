//! The engine-wide result type for operations that can throw.
//!
//! Every fallible runtime operation returns `Completion<T>`: `Ok` with
//! a value, or `Err(Thrown)` carrying the thrown JavaScript value. The
//! interpreter's dispatch loop layers the third outcome (suspension)
//! on top for the few opcodes that can park a context.

use crate::value::Value;

/// A thrown JavaScript value travelling up the Rust call stack.
#[derive(Clone, Debug)]
pub struct Thrown(pub Value);

/// Result of a throwing engine operation.
pub type Completion<T> = Result<T, Thrown>;

impl Thrown {
    /// The carried value.
    pub fn value(&self) -> &Value {
        &self.0
    }

    /// Consume and return the carried value.
    pub fn into_value(self) -> Value {
        self.0
    }
}

impl From<Value> for Thrown {
    fn from(v: Value) -> Self {
        Thrown(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn may_throw(fail: bool) -> Completion<i32> {
        if fail {
            Err(Thrown(Value::string("boom")))
        } else {
            Ok(1)
        }
    }

    #[test]
    fn test_question_mark_propagates() {
        fn outer() -> Completion<i32> {
            let v = may_throw(false)?;
            Ok(v + 1)
        }
        assert_eq!(outer().unwrap(), 2);
    }

    #[test]
    fn test_thrown_carries_value() {
        let err = may_throw(true).unwrap_err();
        assert_eq!(err.value().as_string().unwrap().as_str(), "boom");
    }
}
