//! Reference-counted string, symbol and private-name primitives.
//!
//! These are immutable once created, so plain `Rc` sharing is enough;
//! the collector never needs to trace them. Symbols and private names
//! compare by identity (the allocation), strings by content.

use std::fmt;
use std::rc::Rc;

/// Shared handle to an immutable JavaScript string.
pub type JsStringRef = Rc<JsString>;

/// Shared handle to a symbol. Identity is the allocation itself.
pub type JsSymbolRef = Rc<JsSymbol>;

/// Shared handle to a private name. Identity is the allocation itself.
pub type PrivateNameRef = Rc<PrivateName>;

/// An immutable JavaScript string.
///
/// Stored as UTF-8 internally; `length` and indexed access are exposed
/// in UTF-16 code units to match JavaScript semantics. Strings used as
/// property keys are interned by the runtime's string table so that
/// repeated key lookups share one allocation.
#[derive(Debug, PartialEq, Eq, Hash)]
pub struct JsString {
    text: String,
}

impl JsString {
    /// Wrap an owned Rust string.
    pub fn new(text: String) -> JsStringRef {
        Rc::new(Self { text })
    }

    /// Wrap a string slice.
    pub fn from_str(text: &str) -> JsStringRef {
        Rc::new(Self {
            text: text.to_string(),
        })
    }

    /// The string contents as UTF-8.
    pub fn as_str(&self) -> &str {
        &self.text
    }

    /// Length in UTF-16 code units (the JavaScript `length`).
    pub fn utf16_len(&self) -> usize {
        self.text.encode_utf16().count()
    }

    /// Whether this string is the canonical decimal form of an array
    /// index: no leading zeros, fits in `u32` below `u32::MAX`.
    ///
    /// Returns the parsed index when it is. This is the memoizable
    /// "index string" classification used for property-key
    /// canonicalization.
    pub fn as_array_index(&self) -> Option<u32> {
        let s = &self.text;
        if s.is_empty() || s.len() > 10 {
            return None;
        }
        if s == "0" {
            return Some(0);
        }
        if s.starts_with('0') {
            return None;
        }
        if !s.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        match s.parse::<u32>() {
            Ok(i) if i < u32::MAX => Some(i),
            _ => None,
        }
    }
}

impl fmt::Display for JsString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

/// A JavaScript symbol: unique identity plus an optional description.
#[derive(Debug)]
pub struct JsSymbol {
    /// The `description` slot, if one was supplied.
    pub description: Option<JsStringRef>,
}

impl JsSymbol {
    /// Allocate a fresh symbol with the given description.
    pub fn new(description: Option<JsStringRef>) -> JsSymbolRef {
        Rc::new(Self { description })
    }

    /// Identity comparison: two handles name the same symbol.
    pub fn same(a: &JsSymbolRef, b: &JsSymbolRef) -> bool {
        Rc::ptr_eq(a, b)
    }
}

impl fmt::Display for JsSymbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.description {
            Some(d) => write!(f, "Symbol({})", d),
            None => write!(f, "Symbol()"),
        }
    }
}

/// A private name (`#field`). A separate key class so it can never
/// collide with string or symbol keys; scoped by the private
/// environment the class body creates.
#[derive(Debug)]
pub struct PrivateName {
    /// The source-level spelling, including the `#`.
    pub description: JsStringRef,
}

impl PrivateName {
    /// Allocate a fresh private name.
    pub fn new(description: JsStringRef) -> PrivateNameRef {
        Rc::new(Self { description })
    }

    /// Identity comparison.
    pub fn same(a: &PrivateNameRef, b: &PrivateNameRef) -> bool {
        Rc::ptr_eq(a, b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_array_index_classification() {
        assert_eq!(JsString::from_str("0").as_array_index(), Some(0));
        assert_eq!(JsString::from_str("42").as_array_index(), Some(42));
        assert_eq!(JsString::from_str("100000").as_array_index(), Some(100000));
        assert_eq!(JsString::from_str("01").as_array_index(), None);
        assert_eq!(JsString::from_str("-1").as_array_index(), None);
        assert_eq!(JsString::from_str("1.5").as_array_index(), None);
        assert_eq!(JsString::from_str("").as_array_index(), None);
        assert_eq!(JsString::from_str("4294967295").as_array_index(), None);
    }

    #[test]
    fn test_symbol_identity() {
        let a = JsSymbol::new(Some(JsString::from_str("x")));
        let b = JsSymbol::new(Some(JsString::from_str("x")));
        assert!(JsSymbol::same(&a, &a.clone()));
        assert!(!JsSymbol::same(&a, &b));
    }

    #[test]
    fn test_utf16_len() {
        assert_eq!(JsString::from_str("abc").utf16_len(), 3);
        assert_eq!(JsString::from_str("\u{1F600}").utf16_len(), 2);
    }
}
