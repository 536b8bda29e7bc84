//! Object layout: property storage and the per-kind payloads.
//!
//! Every object carries a prototype link, an extensible flag, a
//! named-property map in insertion order, an element store for
//! integer keys, and an [`ObjectKind`] payload identifying the
//! concrete variant.

use std::collections::{BTreeMap, HashMap};
use std::rc::Rc;

use bytecode_system::BytecodeModule;
use core_types::{ErrorKind, JsStringRef, ObjectId, PrivateNameRef, PropertyKey, Value};

use crate::agent::NativeFn;
use crate::buffer::{ArrayBufferData, TypedArrayData};
use crate::collections::{MapData, SetData};
use crate::context::PrivEnvRef;
use crate::coroutine::GeneratorData;
use crate::promise::PromiseData;

/// A property's value part: plain data or an accessor pair.
#[derive(Debug, Clone)]
pub enum PropertyValue {
    /// Data property
    Data {
        /// Stored value
        value: Value,
        /// Assignable via `set`
        writable: bool,
    },
    /// Accessor property
    Accessor {
        /// Getter function object, if any
        get: Option<ObjectId>,
        /// Setter function object, if any
        set: Option<ObjectId>,
    },
}

/// One own property.
#[derive(Debug, Clone)]
pub struct Property {
    /// Data or accessor payload
    pub value: PropertyValue,
    /// Visible to `for-in` / `Object.keys`
    pub enumerable: bool,
    /// May be deleted or have its attributes changed
    pub configurable: bool,
}

impl Property {
    /// A writable/enumerable/configurable data property.
    pub fn data(value: Value) -> Self {
        Self {
            value: PropertyValue::Data {
                value,
                writable: true,
            },
            enumerable: true,
            configurable: true,
        }
    }

    /// A non-enumerable data property (built-in method style).
    pub fn method(value: Value) -> Self {
        Self {
            value: PropertyValue::Data {
                value,
                writable: true,
            },
            enumerable: false,
            configurable: true,
        }
    }

    /// A read-only, non-enumerable, non-configurable data property.
    pub fn frozen(value: Value) -> Self {
        Self {
            value: PropertyValue::Data {
                value,
                writable: false,
            },
            enumerable: false,
            configurable: false,
        }
    }
}

/// Integer-keyed element storage.
///
/// Dense while at least a quarter of the slots up to the maximum
/// index are live; converts to an ordered sparse map when the spread
/// exceeds four times the element count past index 16, and back when
/// it refills.
#[derive(Debug, Clone)]
pub enum Elements {
    /// Vector indexed directly; `None` is a hole.
    Dense(Vec<Option<Property>>),
    /// Ordered map for sparse arrays.
    Sparse(BTreeMap<u32, Property>),
}

impl Default for Elements {
    fn default() -> Self {
        Elements::Dense(Vec::new())
    }
}

const SPARSE_MIN_INDEX: u32 = 16;

impl Elements {
    /// Number of live elements.
    pub fn count(&self) -> usize {
        match self {
            Elements::Dense(v) => v.iter().filter(|e| e.is_some()).count(),
            Elements::Sparse(m) => m.len(),
        }
    }

    /// Highest live index, if any element exists.
    pub fn max_index(&self) -> Option<u32> {
        match self {
            Elements::Dense(v) => v
                .iter()
                .enumerate()
                .rev()
                .find(|(_, e)| e.is_some())
                .map(|(i, _)| i as u32),
            Elements::Sparse(m) => m.keys().next_back().copied(),
        }
    }

    /// Look up an element.
    pub fn get(&self, index: u32) -> Option<&Property> {
        match self {
            Elements::Dense(v) => v.get(index as usize).and_then(|e| e.as_ref()),
            Elements::Sparse(m) => m.get(&index),
        }
    }

    /// Mutable element access.
    pub fn get_mut(&mut self, index: u32) -> Option<&mut Property> {
        match self {
            Elements::Dense(v) => v.get_mut(index as usize).and_then(|e| e.as_mut()),
            Elements::Sparse(m) => m.get_mut(&index),
        }
    }

    /// Insert or replace an element, then rebalance the
    /// representation.
    pub fn set(&mut self, index: u32, prop: Property) {
        match self {
            Elements::Dense(v) => {
                let i = index as usize;
                if i >= v.len() {
                    v.resize(i + 1, None);
                }
                v[i] = Some(prop);
            }
            Elements::Sparse(m) => {
                m.insert(index, prop);
            }
        }
        self.rebalance();
    }

    /// Remove an element; true when one existed.
    pub fn remove(&mut self, index: u32) -> bool {
        let removed = match self {
            Elements::Dense(v) => {
                let i = index as usize;
                if i < v.len() && v[i].is_some() {
                    v[i] = None;
                    if i + 1 == v.len() {
                        while matches!(v.last(), Some(None)) {
                            v.pop();
                        }
                    }
                    true
                } else {
                    false
                }
            }
            Elements::Sparse(m) => m.remove(&index).is_some(),
        };
        if removed {
            self.rebalance();
        }
        removed
    }

    /// Live indices in ascending order.
    pub fn indices(&self) -> Vec<u32> {
        match self {
            Elements::Dense(v) => v
                .iter()
                .enumerate()
                .filter(|(_, e)| e.is_some())
                .map(|(i, _)| i as u32)
                .collect(),
            Elements::Sparse(m) => m.keys().copied().collect(),
        }
    }

    /// Whether the dense representation is in use.
    pub fn is_dense(&self) -> bool {
        matches!(self, Elements::Dense(_))
    }

    fn rebalance(&mut self) {
        let count = self.count();
        let max = match self.max_index() {
            Some(m) => m,
            None => {
                if !self.is_dense() {
                    *self = Elements::Dense(Vec::new());
                }
                return;
            }
        };
        match self {
            Elements::Dense(v) => {
                if max > SPARSE_MIN_INDEX && (count as u64) * 4 < (max as u64) + 1 {
                    let mut m = BTreeMap::new();
                    for (i, e) in v.drain(..).enumerate() {
                        if let Some(p) = e {
                            m.insert(i as u32, p);
                        }
                    }
                    *self = Elements::Sparse(m);
                }
            }
            Elements::Sparse(m) => {
                if (count as u64) * 4 >= (max as u64) + 1 {
                    let mut v: Vec<Option<Property>> = vec![None; max as usize + 1];
                    for (i, p) in std::mem::take(m) {
                        v[i as usize] = Some(p);
                    }
                    *self = Elements::Dense(v);
                }
            }
        }
    }
}

/// Closure data for a compiled function.
#[derive(Debug, Clone)]
pub struct ScriptFunctionData {
    /// The module the function was compiled into.
    pub module: Rc<BytecodeModule>,
    /// Index into the module's function table.
    pub func_index: u16,
    /// Captured lexical environment.
    pub closure_env: core_types::EnvId,
    /// Home object for `super` references (methods).
    pub home_object: Option<ObjectId>,
    /// Captured private environment (class bodies).
    pub priv_env: Option<PrivEnvRef>,
}

/// Data for a native (built-in) function.
pub struct BuiltinFunctionData {
    /// The Rust entry point.
    pub func: NativeFn,
    /// Function name (the `name` property).
    pub name: JsStringRef,
    /// Declared arity (the `length` property).
    pub length: u8,
    /// Whether `construct` is supported.
    pub constructable: bool,
    /// Values captured at creation; read and written through the
    /// callee handle (promise resolve flags, bound state and such).
    pub captured: Vec<Value>,
}

impl std::fmt::Debug for BuiltinFunctionData {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BuiltinFunctionData")
            .field("name", &self.name.as_str())
            .field("length", &self.length)
            .finish()
    }
}

impl Clone for BuiltinFunctionData {
    fn clone(&self) -> Self {
        Self {
            func: self.func,
            name: self.name.clone(),
            length: self.length,
            constructable: self.constructable,
            captured: self.captured.clone(),
        }
    }
}

/// Data for a bound function exotic object.
#[derive(Debug, Clone)]
pub struct BoundFunctionData {
    /// Wrapped target function.
    pub target: ObjectId,
    /// The bound `this`.
    pub bound_this: Value,
    /// Arguments prepended on every call.
    pub bound_args: Vec<Value>,
}

/// What an array/map/set iterator yields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IterationKind {
    /// Keys only
    Key,
    /// Values only
    Value,
    /// `[key, value]` pairs
    KeyValue,
}

/// Snapshot iterator state for `for-in`.
#[derive(Debug, Clone, Default)]
pub struct KeyListData {
    /// Enumerable string keys, proto chain included, duplicates
    /// removed.
    pub keys: Vec<JsStringRef>,
    /// Next position.
    pub pos: usize,
    /// Enumerated object; keys deleted mid-loop are skipped.
    pub target: Option<ObjectId>,
}

/// One registered finalization cell.
#[derive(Debug, Clone)]
pub struct FinalizationCell {
    /// Weakly-held target.
    pub target: ObjectId,
    /// Value passed to the cleanup callback.
    pub held: Value,
    /// Unregistration token, compared by identity.
    pub token: Option<ObjectId>,
}

/// The concrete object variant.
#[derive(Debug, Clone, Default)]
pub enum ObjectKind {
    /// Plain object
    #[default]
    Ordinary,
    /// Array exotic object; `length` lives here, not in the map.
    Array {
        /// Current length (may exceed the highest live index).
        length: u32,
        /// `length` is still writable.
        length_writable: bool,
    },
    /// Error object
    Error {
        /// Which constructor made it
        kind: ErrorKind,
    },
    /// `arguments` object
    Arguments,
    /// Compiled-function closure
    Function(ScriptFunctionData),
    /// Native function
    Builtin(BuiltinFunctionData),
    /// Bound function
    Bound(BoundFunctionData),
    /// Proxy; fields cleared on revocation.
    Proxy {
        /// Proxied object
        target: Option<ObjectId>,
        /// Trap table
        handler: Option<ObjectId>,
    },
    /// ArrayBuffer with its data block
    ArrayBuffer(ArrayBufferData),
    /// Integer-indexed (typed array) view
    IntegerIndexed(TypedArrayData),
    /// Map; ordered entries
    Map(MapData),
    /// Set; ordered entries
    Set(SetData),
    /// WeakMap; keys held weakly
    WeakMap(MapData),
    /// WeakSet; members held weakly
    WeakSet(SetData),
    /// WeakRef wrapper
    WeakRef {
        /// Cleared by the collector when the target dies.
        target: Option<ObjectId>,
    },
    /// FinalizationRegistry
    FinalizationRegistry {
        /// Cleanup callback
        callback: ObjectId,
        /// Live cells
        cells: Vec<FinalizationCell>,
    },
    /// Promise
    Promise(PromiseData),
    /// Generator, async generator or async-function coroutine
    Generator(GeneratorData),
    /// `for-in` key-list iterator
    KeyList(KeyListData),
    /// Array iterator (`values`/`keys`/`entries`)
    ArrayIterator {
        /// Iterated array
        target: ObjectId,
        /// Next index
        index: u32,
        /// What to yield
        kind: IterationKind,
        /// Exhausted flag
        done: bool,
    },
    /// Map iterator
    MapIterator {
        /// Iterated map
        target: ObjectId,
        /// Next entry slot
        index: usize,
        /// What to yield
        kind: IterationKind,
        /// Exhausted flag
        done: bool,
    },
    /// Set iterator
    SetIterator {
        /// Iterated set
        target: ObjectId,
        /// Next entry slot
        index: usize,
        /// What to yield
        kind: IterationKind,
        /// Exhausted flag
        done: bool,
    },
}

/// A heap object.
#[derive(Debug, Clone, Default)]
pub struct JsObject {
    /// Prototype link, or `None` for a null prototype.
    pub prototype: Option<ObjectId>,
    /// New own properties may be added.
    pub extensible: bool,
    /// Named properties in insertion order.
    props: HashMap<PropertyKey, Property>,
    /// Insertion order of `props` keys.
    order: Vec<PropertyKey>,
    /// Integer-keyed elements.
    pub elements: Elements,
    /// Private class members, keyed by identity.
    pub private: Vec<(PrivateNameRef, Property)>,
    /// Concrete variant payload.
    pub kind: ObjectKind,
    /// Structural version, bumped when the key set, an attribute or
    /// the prototype changes. Property-site caches key on it.
    pub version: u32,
}

impl JsObject {
    /// A fresh ordinary object with the given prototype.
    pub fn ordinary(prototype: Option<ObjectId>) -> Self {
        Self {
            prototype,
            extensible: true,
            kind: ObjectKind::Ordinary,
            ..Default::default()
        }
    }

    /// A fresh object of an arbitrary kind.
    pub fn with_kind(prototype: Option<ObjectId>, kind: ObjectKind) -> Self {
        Self {
            prototype,
            extensible: true,
            kind,
            ..Default::default()
        }
    }

    /// Look up an own property under a canonical key. Index keys read
    /// the element store.
    pub fn own_property(&self, key: &PropertyKey) -> Option<&Property> {
        match key {
            PropertyKey::Index(i) => self.elements.get(*i),
            _ => self.props.get(key),
        }
    }

    /// Mutable own-property lookup.
    pub fn own_property_mut(&mut self, key: &PropertyKey) -> Option<&mut Property> {
        match key {
            PropertyKey::Index(i) => self.elements.get_mut(*i),
            _ => self.props.get_mut(key),
        }
    }

    /// Insert or replace an own property.
    pub fn set_property(&mut self, key: PropertyKey, prop: Property) {
        match key {
            PropertyKey::Index(i) => {
                self.version = self.version.wrapping_add(1);
                self.elements.set(i, prop)
            }
            _ => {
                if self.props.insert(key.clone(), prop).is_none() {
                    self.order.push(key);
                    self.version = self.version.wrapping_add(1);
                }
            }
        }
    }

    /// Remove an own property; true when it existed.
    pub fn remove_property(&mut self, key: &PropertyKey) -> bool {
        let removed = match key {
            PropertyKey::Index(i) => self.elements.remove(*i),
            _ => {
                if self.props.remove(key).is_some() {
                    self.order.retain(|k| k != key);
                    true
                } else {
                    false
                }
            }
        };
        if removed {
            self.version = self.version.wrapping_add(1);
        }
        removed
    }

    /// Own keys in specification order: ascending integer indices,
    /// then string keys in insertion order, then symbols in insertion
    /// order. Private names never appear.
    pub fn own_keys(&self) -> Vec<PropertyKey> {
        let mut keys: Vec<PropertyKey> = self
            .elements
            .indices()
            .into_iter()
            .map(PropertyKey::Index)
            .collect();
        if let ObjectKind::Array { .. } = self.kind {
            keys.push(PropertyKey::from_str("length"));
        }
        keys.extend(
            self.order
                .iter()
                .filter(|k| matches!(k, PropertyKey::String(_)))
                .cloned(),
        );
        keys.extend(
            self.order
                .iter()
                .filter(|k| matches!(k, PropertyKey::Symbol(_)))
                .cloned(),
        );
        keys
    }

    /// Named keys in insertion order (no elements).
    pub fn named_keys(&self) -> &[PropertyKey] {
        &self.order
    }

    /// Look up a private member by name identity.
    pub fn private_member(&self, name: &PrivateNameRef) -> Option<&Property> {
        self.private
            .iter()
            .find(|(n, _)| core_types::PrivateName::same(n, name))
            .map(|(_, p)| p)
    }

    /// Mutable private-member lookup.
    pub fn private_member_mut(&mut self, name: &PrivateNameRef) -> Option<&mut Property> {
        self.private
            .iter_mut()
            .find(|(n, _)| core_types::PrivateName::same(n, name))
            .map(|(_, p)| p)
    }

    /// Whether this object is callable.
    pub fn is_callable(&self) -> bool {
        matches!(
            self.kind,
            ObjectKind::Function(_) | ObjectKind::Builtin(_) | ObjectKind::Bound(_)
        ) || matches!(&self.kind, ObjectKind::Proxy { target: Some(_), .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn prop(n: f64) -> Property {
        Property::data(Value::Number(n))
    }

    #[test]
    fn test_dense_to_sparse_transition() {
        let mut e = Elements::default();
        e.set(0, prop(1.0));
        assert!(e.is_dense());
        e.set(100000, prop(2.0));
        assert!(!e.is_dense(), "widely spread elements should go sparse");
        e.remove(0);
        assert_eq!(e.indices(), vec![100000]);
    }

    #[test]
    fn test_sparse_back_to_dense() {
        let mut e = Elements::default();
        e.set(0, prop(0.0));
        e.set(100000, prop(1.0));
        assert!(!e.is_dense());
        e.remove(100000);
        for i in 0..100u32 {
            e.set(i, prop(i as f64));
        }
        assert!(e.is_dense(), "refilled elements should go dense again");
        assert_eq!(e.count(), 100);
    }

    #[test]
    fn test_small_arrays_stay_dense() {
        let mut e = Elements::default();
        e.set(16, prop(1.0));
        assert!(e.is_dense(), "spread below the threshold index stays dense");
    }

    #[test]
    fn test_own_key_order() {
        let mut o = JsObject::ordinary(None);
        o.set_property(PropertyKey::from_str("b"), prop(1.0));
        o.set_property(PropertyKey::Index(10), prop(2.0));
        o.set_property(PropertyKey::from_str("a"), prop(3.0));
        o.set_property(PropertyKey::Index(2), prop(4.0));
        let keys: Vec<String> = o.own_keys().iter().map(|k| k.to_display_string()).collect();
        assert_eq!(keys, vec!["2", "10", "b", "a"]);
    }

    #[test]
    fn test_replacing_property_keeps_order() {
        let mut o = JsObject::ordinary(None);
        o.set_property(PropertyKey::from_str("x"), prop(1.0));
        o.set_property(PropertyKey::from_str("y"), prop(2.0));
        o.set_property(PropertyKey::from_str("x"), prop(3.0));
        let keys: Vec<String> = o.own_keys().iter().map(|k| k.to_display_string()).collect();
        assert_eq!(keys, vec!["x", "y"]);
    }

    #[test]
    fn test_index_keys_hit_element_store() {
        let mut o = JsObject::ordinary(None);
        o.set_property(PropertyKey::from_str("5"), prop(9.0));
        assert!(o.own_property(&PropertyKey::Index(5)).is_some());
    }
}
