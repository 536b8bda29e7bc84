//! The heap arena: slot storage, allocation, interning and roots.

use std::collections::HashMap;

use core_types::{EnvId, JsString, JsStringRef, JsSymbol, JsSymbolRef, ObjectId, Value};

use crate::env::EnvRecord;
use crate::object::JsObject;

/// Symbols with engine-assigned meaning, minted once per runtime.
#[derive(Debug, Clone)]
pub struct WellKnownSymbols {
    /// `Symbol.iterator`
    pub iterator: JsSymbolRef,
    /// `Symbol.asyncIterator`
    pub async_iterator: JsSymbolRef,
    /// `Symbol.toPrimitive`
    pub to_primitive: JsSymbolRef,
    /// `Symbol.toStringTag`
    pub to_string_tag: JsSymbolRef,
    /// `Symbol.hasInstance`
    pub has_instance: JsSymbolRef,
}

impl WellKnownSymbols {
    fn new() -> Self {
        let mk = |d: &str| JsSymbol::new(Some(JsString::from_str(d)));
        Self {
            iterator: mk("Symbol.iterator"),
            async_iterator: mk("Symbol.asyncIterator"),
            to_primitive: mk("Symbol.toPrimitive"),
            to_string_tag: mk("Symbol.toStringTag"),
            has_instance: mk("Symbol.hasInstance"),
        }
    }
}

const INITIAL_GC_THRESHOLD: usize = 4096;

/// The garbage-collected arena.
///
/// Objects and environments are stored in slot vectors addressed by
/// handle; freed slots go on a free list and are reused. The arena is
/// non-moving, so a handle stays valid for the object's lifetime.
#[derive(Debug)]
pub struct Heap {
    pub(crate) objects: Vec<Option<JsObject>>,
    pub(crate) envs: Vec<Option<EnvRecord>>,
    pub(crate) free_objects: Vec<u32>,
    pub(crate) free_envs: Vec<u32>,
    interned: HashMap<String, JsStringRef>,
    symbol_registry: HashMap<String, JsSymbolRef>,
    /// Well-known symbol instances.
    pub well_known: WellKnownSymbols,
    /// Native value stack: scratch values native code keeps alive
    /// across allocations. Save the length, push freely, restore.
    pub roots: Vec<Value>,
    pub(crate) root_objects: Vec<ObjectId>,
    pub(crate) root_envs: Vec<EnvId>,
    /// Finalization-registry callbacks discovered by the last sweep;
    /// the runtime drains these into host jobs.
    pub pending_finalizations: Vec<(ObjectId, Value)>,
    pub(crate) allocations_since_gc: usize,
    pub(crate) gc_threshold: usize,
    pub(crate) collections: u64,
}

impl Default for Heap {
    fn default() -> Self {
        Self::new()
    }
}

impl Heap {
    /// Floor of the adaptive collection threshold.
    pub(crate) const MIN_GC_THRESHOLD: usize = INITIAL_GC_THRESHOLD;

    /// A fresh, empty heap.
    pub fn new() -> Self {
        Self {
            objects: Vec::new(),
            envs: Vec::new(),
            free_objects: Vec::new(),
            free_envs: Vec::new(),
            interned: HashMap::new(),
            symbol_registry: HashMap::new(),
            well_known: WellKnownSymbols::new(),
            roots: Vec::new(),
            root_objects: Vec::new(),
            root_envs: Vec::new(),
            pending_finalizations: Vec::new(),
            allocations_since_gc: 0,
            gc_threshold: INITIAL_GC_THRESHOLD,
            collections: 0,
        }
    }

    /// Allocate an object slot.
    pub fn alloc_object(&mut self, obj: JsObject) -> ObjectId {
        self.allocations_since_gc += 1;
        match self.free_objects.pop() {
            Some(i) => {
                self.objects[i as usize] = Some(obj);
                ObjectId(i)
            }
            None => {
                let i = self.objects.len() as u32;
                self.objects.push(Some(obj));
                ObjectId(i)
            }
        }
    }

    /// Allocate an environment slot.
    pub fn alloc_env(&mut self, env: EnvRecord) -> EnvId {
        self.allocations_since_gc += 1;
        match self.free_envs.pop() {
            Some(i) => {
                self.envs[i as usize] = Some(env);
                EnvId(i)
            }
            None => {
                let i = self.envs.len() as u32;
                self.envs.push(Some(env));
                EnvId(i)
            }
        }
    }

    /// Read an object. Panics on a stale handle, which indicates an
    /// engine bug (a live reference the collector did not see).
    pub fn object(&self, id: ObjectId) -> &JsObject {
        self.objects[id.index()]
            .as_ref()
            .expect("stale object handle")
    }

    /// Mutate an object.
    pub fn object_mut(&mut self, id: ObjectId) -> &mut JsObject {
        self.objects[id.index()]
            .as_mut()
            .expect("stale object handle")
    }

    /// Read an environment record.
    pub fn env(&self, id: EnvId) -> &EnvRecord {
        self.envs[id.index()].as_ref().expect("stale env handle")
    }

    /// Mutate an environment record.
    pub fn env_mut(&mut self, id: EnvId) -> &mut EnvRecord {
        self.envs[id.index()].as_mut().expect("stale env handle")
    }

    /// Intern a property-key string: equal contents share one
    /// allocation for the runtime's lifetime.
    pub fn intern(&mut self, text: &str) -> JsStringRef {
        if let Some(s) = self.interned.get(text) {
            return s.clone();
        }
        let s = JsString::from_str(text);
        self.interned.insert(text.to_string(), s.clone());
        s
    }

    /// `Symbol.for`: one symbol per key for the whole runtime.
    pub fn symbol_for(&mut self, key: &str) -> JsSymbolRef {
        if let Some(s) = self.symbol_registry.get(key) {
            return s.clone();
        }
        let s = JsSymbol::new(Some(JsString::from_str(key)));
        self.symbol_registry.insert(key.to_string(), s.clone());
        s
    }

    /// `Symbol.keyFor`: the registry key of a registered symbol.
    pub fn symbol_key_for(&self, sym: &JsSymbolRef) -> Option<&str> {
        self.symbol_registry
            .iter()
            .find(|(_, s)| JsSymbol::same(s, sym))
            .map(|(k, _)| k.as_str())
    }

    /// Register an external root the collector always keeps alive.
    pub fn add_root_object(&mut self, id: ObjectId) {
        self.root_objects.push(id);
    }

    /// Register an environment root.
    pub fn add_root_env(&mut self, id: EnvId) {
        self.root_envs.push(id);
    }

    /// Current native value-stack depth, for save/restore.
    pub fn root_mark(&self) -> usize {
        self.roots.len()
    }

    /// Restore the native value stack to a saved depth.
    pub fn root_release(&mut self, mark: usize) {
        self.roots.truncate(mark);
    }

    /// Whether enough allocation has happened that the runtime should
    /// collect at the next safe point.
    pub fn should_collect(&self) -> bool {
        self.allocations_since_gc >= self.gc_threshold
    }

    /// Count of live object slots.
    pub fn live_objects(&self) -> usize {
        self.objects.iter().filter(|s| s.is_some()).count()
    }

    /// Count of live environment slots.
    pub fn live_envs(&self) -> usize {
        self.envs.iter().filter(|s| s.is_some()).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alloc_and_access() {
        let mut heap = Heap::new();
        let id = heap.alloc_object(JsObject::ordinary(None));
        assert!(heap.object(id).extensible);
        heap.object_mut(id).extensible = false;
        assert!(!heap.object(id).extensible);
    }

    #[test]
    fn test_interning_shares_allocation() {
        let mut heap = Heap::new();
        let a = heap.intern("hello");
        let b = heap.intern("hello");
        assert!(std::rc::Rc::ptr_eq(&a, &b));
    }

    #[test]
    fn test_symbol_registry() {
        let mut heap = Heap::new();
        let a = heap.symbol_for("app.key");
        let b = heap.symbol_for("app.key");
        assert!(JsSymbol::same(&a, &b));
        assert_eq!(heap.symbol_key_for(&a), Some("app.key"));
        let fresh = JsSymbol::new(None);
        assert_eq!(heap.symbol_key_for(&fresh), None);
    }

    #[test]
    fn test_root_save_restore() {
        let mut heap = Heap::new();
        let mark = heap.root_mark();
        heap.roots.push(Value::Number(1.0));
        heap.roots.push(Value::Number(2.0));
        assert_eq!(heap.roots.len(), 2);
        heap.root_release(mark);
        assert!(heap.roots.is_empty());
    }
}
