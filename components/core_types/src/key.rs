//! Canonicalized property keys.
//!
//! Every property access funnels through one canonical key form so a
//! property can never be reachable under two spellings: array-index
//! strings become `Index`, everything else stays a string, symbol or
//! private name.

use std::hash::{Hash, Hasher};
use std::rc::Rc;

use crate::string::{JsString, JsStringRef, JsSymbol, JsSymbolRef, PrivateName, PrivateNameRef};
use crate::value::Value;

/// A canonical property key.
#[derive(Clone, Debug)]
pub enum PropertyKey {
    /// Integer index below `u32::MAX` whose canonical decimal form is
    /// the source string.
    Index(u32),
    /// A (interned) string key that is not an array index.
    String(JsStringRef),
    /// A symbol key; identity comparison.
    Symbol(JsSymbolRef),
    /// A private name; identity comparison.
    Private(PrivateNameRef),
}

impl PropertyKey {
    /// Canonicalize a string into a key, detecting index strings.
    pub fn from_string(s: JsStringRef) -> Self {
        match s.as_array_index() {
            Some(i) => PropertyKey::Index(i),
            None => PropertyKey::String(s),
        }
    }

    /// Canonicalize a string slice.
    pub fn from_str(s: &str) -> Self {
        Self::from_string(JsString::from_str(s))
    }

    /// Canonicalize a non-negative integral number when it fits the
    /// index range; falls back to its decimal string form otherwise.
    pub fn from_f64(n: f64) -> Self {
        if n >= 0.0 && n < (u32::MAX as f64) && n.fract() == 0.0 && !(n == 0.0 && n.is_sign_negative()) {
            PropertyKey::Index(n as u32)
        } else {
            Self::from_string(JsString::new(crate::number::format_f64(n)))
        }
    }

    /// The key as a display string (for diagnostics and `own-keys`
    /// string materialization). Symbols and private names render their
    /// description.
    pub fn to_display_string(&self) -> String {
        match self {
            PropertyKey::Index(i) => i.to_string(),
            PropertyKey::String(s) => s.as_str().to_string(),
            PropertyKey::Symbol(s) => s.to_string(),
            PropertyKey::Private(p) => p.description.as_str().to_string(),
        }
    }

    /// Whether this is an integer-index key.
    pub fn is_index(&self) -> bool {
        matches!(self, PropertyKey::Index(_))
    }

    /// Convert the key back to a value (index keys become strings,
    /// which is the observable form in `own-keys` and `for-in`).
    pub fn to_value(&self) -> Value {
        match self {
            PropertyKey::Index(i) => Value::String(JsString::new(i.to_string())),
            PropertyKey::String(s) => Value::String(s.clone()),
            PropertyKey::Symbol(s) => Value::Symbol(s.clone()),
            PropertyKey::Private(p) => Value::PrivateName(p.clone()),
        }
    }
}

impl PartialEq for PropertyKey {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (PropertyKey::Index(a), PropertyKey::Index(b)) => a == b,
            (PropertyKey::String(a), PropertyKey::String(b)) => a.as_str() == b.as_str(),
            (PropertyKey::Symbol(a), PropertyKey::Symbol(b)) => JsSymbol::same(a, b),
            (PropertyKey::Private(a), PropertyKey::Private(b)) => PrivateName::same(a, b),
            _ => false,
        }
    }
}

impl Eq for PropertyKey {}

impl Hash for PropertyKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        match self {
            PropertyKey::Index(i) => {
                0u8.hash(state);
                i.hash(state);
            }
            PropertyKey::String(s) => {
                1u8.hash(state);
                s.as_str().hash(state);
            }
            PropertyKey::Symbol(s) => {
                2u8.hash(state);
                (Rc::as_ptr(s) as usize).hash(state);
            }
            PropertyKey::Private(p) => {
                3u8.hash(state);
                (Rc::as_ptr(p) as usize).hash(state);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_index_string_canonicalizes() {
        assert_eq!(PropertyKey::from_str("7"), PropertyKey::Index(7));
        assert_eq!(PropertyKey::from_str("100000"), PropertyKey::Index(100000));
        assert!(matches!(PropertyKey::from_str("07"), PropertyKey::String(_)));
        assert!(matches!(PropertyKey::from_str("x"), PropertyKey::String(_)));
    }

    #[test]
    fn test_number_key() {
        assert_eq!(PropertyKey::from_f64(3.0), PropertyKey::Index(3));
        assert!(matches!(PropertyKey::from_f64(1.5), PropertyKey::String(_)));
        assert!(matches!(PropertyKey::from_f64(-1.0), PropertyKey::String(_)));
    }

    #[test]
    fn test_string_and_index_forms_are_one_key() {
        // The canonicalization invariant: "42" and 42.0 map to the
        // same key, so obj["42"] and obj[42] address one property.
        assert_eq!(PropertyKey::from_str("42"), PropertyKey::from_f64(42.0));
    }

    #[test]
    fn test_symbol_keys_compare_by_identity() {
        let s1 = JsSymbol::new(None);
        let s2 = JsSymbol::new(None);
        assert_ne!(
            PropertyKey::Symbol(s1.clone()),
            PropertyKey::Symbol(s2)
        );
        assert_eq!(PropertyKey::Symbol(s1.clone()), PropertyKey::Symbol(s1));
    }
}
