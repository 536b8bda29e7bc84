//! Property-site inline caches.
//!
//! Every property-reference row of a module gets one lazily created
//! slot: the canonical key plus the last seen (receiver, holder)
//! resolution with their structural versions. A hit skips the
//! prototype walk; any shape change on either object bumps its
//! version and misses.
//!
//! The table is keyed by the module allocation's address, so each
//! entry pins its module with a cloned `Rc`: the allocator can never
//! hand that address to another module while the entry exists, and a
//! later lookup for the same address is guaranteed to be the same
//! module (same `prop_refs` table, same slot count). Entries whose
//! module is otherwise dead — one-shot `eval` code, dropped scripts —
//! are evicted at collection time, and resolution slots are dropped
//! after every collection because object ids may be reused.

use std::collections::HashMap;
use std::rc::Rc;

use bytecode_system::BytecodeModule;
use core_types::{ObjectId, PropertyKey};

#[derive(Debug, Clone)]
pub(crate) struct CacheEntry {
    /// Canonical key for the reference's name.
    pub key: PropertyKey,
    /// Last successful data-property resolution.
    pub slot: Option<CacheSlot>,
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct CacheSlot {
    pub receiver: ObjectId,
    pub receiver_version: u32,
    pub holder: ObjectId,
    pub holder_version: u32,
}

/// Cache slots for one module, holding the module alive so the table
/// key (its address) stays unambiguous.
#[derive(Debug)]
struct ModuleCache {
    module: Rc<BytecodeModule>,
    slots: Vec<Option<CacheEntry>>,
}

/// Per-module cache vectors, keyed by the module allocation.
#[derive(Debug, Default)]
pub(crate) struct PropertyCaches {
    modules: HashMap<usize, ModuleCache>,
}

fn module_key(module: &Rc<BytecodeModule>) -> usize {
    Rc::as_ptr(module) as usize
}

impl PropertyCaches {
    /// The canonical key for a property reference, creating the cache
    /// entry on first use.
    pub fn key_for(&mut self, module: &Rc<BytecodeModule>, pref: u16) -> PropertyKey {
        let entry = self.entry_mut(module, pref);
        entry.key.clone()
    }

    pub fn entry_mut(&mut self, module: &Rc<BytecodeModule>, pref: u16) -> &mut CacheEntry {
        let cache = self
            .modules
            .entry(module_key(module))
            .or_insert_with(|| ModuleCache {
                module: module.clone(),
                slots: vec![None; module.prop_refs.len()],
            });
        debug_assert!(
            Rc::ptr_eq(&cache.module, module),
            "module cache key collided with a live module"
        );
        let cell = &mut cache.slots[pref as usize];
        if cell.is_none() {
            let name = &module.prop_refs[pref as usize];
            *cell = Some(CacheEntry {
                key: PropertyKey::from_str(name),
                slot: None,
            });
        }
        cell.as_mut().expect("cache entry just created")
    }

    /// Drop every resolution slot (object ids may have been
    /// recycled).
    pub fn clear_slots(&mut self) {
        for cache in self.modules.values_mut() {
            for entry in cache.slots.iter_mut().flatten() {
                entry.slot = None;
            }
        }
    }

    /// Drop the tables of modules nothing else holds any more, so
    /// churned `eval` code does not accumulate.
    pub fn evict_dead(&mut self) {
        self.modules
            .retain(|_, cache| Rc::strong_count(&cache.module) > 1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn module_with_refs(names: &[&str]) -> Rc<BytecodeModule> {
        let mut m = BytecodeModule::new("cache-test");
        for n in names {
            m.add_prop_ref(n);
        }
        Rc::new(m)
    }

    #[test]
    fn test_entries_are_per_reference() {
        let mut caches = PropertyCaches::default();
        let m = module_with_refs(&["alpha", "beta"]);
        assert_eq!(caches.key_for(&m, 0).to_display_string(), "alpha");
        assert_eq!(caches.key_for(&m, 1).to_display_string(), "beta");
    }

    #[test]
    fn test_reused_address_cannot_alias_a_live_table() {
        let mut caches = PropertyCaches::default();
        // churn modules; each drop would free its allocation if the
        // cache did not pin it
        for round in 0..64 {
            let name = format!("p{}", round);
            let m = module_with_refs(&[name.as_str()]);
            let key = caches.key_for(&m, 0);
            assert_eq!(key.to_display_string(), name);
        }
    }

    #[test]
    fn test_eviction_frees_dead_modules_only() {
        let mut caches = PropertyCaches::default();
        let kept = module_with_refs(&["kept"]);
        caches.key_for(&kept, 0);
        {
            let dropped = module_with_refs(&["dropped"]);
            caches.key_for(&dropped, 0);
        }
        assert_eq!(caches.modules.len(), 2);
        caches.evict_dead();
        assert_eq!(caches.modules.len(), 1);
        // the surviving entry still answers for the live module
        assert_eq!(caches.key_for(&kept, 0).to_display_string(), "kept");
    }

    #[test]
    fn test_clear_slots_keeps_keys() {
        let mut caches = PropertyCaches::default();
        let m = module_with_refs(&["x"]);
        caches.entry_mut(&m, 0).slot = Some(CacheSlot {
            receiver: ObjectId(1),
            receiver_version: 0,
            holder: ObjectId(1),
            holder_version: 0,
        });
        caches.clear_slots();
        let entry = caches.entry_mut(&m, 0);
        assert!(entry.slot.is_none());
        assert_eq!(entry.key.to_display_string(), "x");
    }
}
