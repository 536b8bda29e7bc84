//! Tri-colour mark-sweep collection.
//!
//! Marking seeds from the heap's own roots (native value stack,
//! registered roots) plus whatever the caller contributes through the
//! [`Marker`] (context stack, realm). Grey work is a queue; tracing
//! is per-variant. After the strong pass an ephemeron fixpoint marks
//! weak-map values whose keys survived, then weak references are
//! cleared, dead weak-collection entries dropped, finalization
//! callbacks scheduled, and unmarked slots swept onto the free lists.

use core_types::{EnvId, ObjectId, Value};

use crate::context::ExecutionContext;
use crate::env::{EnvKind, EnvRecord};
use crate::heap::Heap;
use crate::object::{JsObject, ObjectKind, Property, PropertyValue};
use crate::promise::ReactionHandler;

/// Collection statistics returned by [`Heap::collect`].
#[derive(Debug, Clone, Copy)]
pub struct HeapStats {
    /// Objects alive after the sweep.
    pub live_objects: usize,
    /// Environments alive after the sweep.
    pub live_envs: usize,
    /// Objects freed by this collection.
    pub freed_objects: usize,
    /// Total collections run by this heap.
    pub collections: u64,
}

#[derive(Debug, Clone, Copy)]
enum WorkItem {
    Obj(u32),
    Env(u32),
}

/// Grey-set accumulator handed to root providers.
pub struct Marker {
    queue: Vec<WorkItem>,
    obj_marked: Vec<bool>,
    env_marked: Vec<bool>,
}

impl Marker {
    fn new(objects: usize, envs: usize) -> Self {
        Self {
            queue: Vec::new(),
            obj_marked: vec![false; objects],
            env_marked: vec![false; envs],
        }
    }

    /// Mark an object root.
    pub fn mark_object(&mut self, id: ObjectId) {
        let i = id.index();
        if i < self.obj_marked.len() && !self.obj_marked[i] {
            self.obj_marked[i] = true;
            self.queue.push(WorkItem::Obj(id.0));
        }
    }

    /// Mark an environment root.
    pub fn mark_env(&mut self, id: EnvId) {
        let i = id.index();
        if i < self.env_marked.len() && !self.env_marked[i] {
            self.env_marked[i] = true;
            self.queue.push(WorkItem::Env(id.0));
        }
    }

    /// Mark a value root.
    pub fn mark_value(&mut self, v: &Value) {
        if let Value::Object(id) = v {
            self.mark_object(*id);
        }
    }

    /// Mark everything a context keeps alive.
    pub fn mark_context(&mut self, cx: &ExecutionContext) {
        if let Some(f) = cx.function {
            self.mark_object(f);
        }
        for v in &cx.registers {
            self.mark_value(v);
        }
        for v in &cx.args {
            self.mark_value(v);
        }
        self.mark_env(cx.var_env);
        self.mark_env(cx.lex_env);
        for e in &cx.scope_stack {
            self.mark_env(*e);
        }
        match &cx.pending {
            Some(crate::context::PendingCompletion::Throw(v))
            | Some(crate::context::PendingCompletion::Return(v)) => self.mark_value(v),
            None => {}
        }
    }

    fn object_is_marked(&self, id: ObjectId) -> bool {
        self.obj_marked.get(id.index()).copied().unwrap_or(false)
    }
}

fn trace_property(p: &Property, m: &mut Marker) {
    match &p.value {
        PropertyValue::Data { value, .. } => m.mark_value(value),
        PropertyValue::Accessor { get, set } => {
            if let Some(g) = get {
                m.mark_object(*g);
            }
            if let Some(s) = set {
                m.mark_object(*s);
            }
        }
    }
}

fn trace_object(obj: &JsObject, m: &mut Marker) {
    if let Some(proto) = obj.prototype {
        m.mark_object(proto);
    }
    for key in obj.named_keys() {
        if let Some(p) = obj.own_property(key) {
            trace_property(p, m);
        }
    }
    match &obj.elements {
        crate::object::Elements::Dense(v) => {
            for p in v.iter().flatten() {
                trace_property(p, m);
            }
        }
        crate::object::Elements::Sparse(map) => {
            for p in map.values() {
                trace_property(p, m);
            }
        }
    }
    for (_, p) in &obj.private {
        trace_property(p, m);
    }
    match &obj.kind {
        ObjectKind::Ordinary
        | ObjectKind::Array { .. }
        | ObjectKind::Error { .. }
        | ObjectKind::Arguments
        | ObjectKind::ArrayBuffer(_) => {}
        ObjectKind::KeyList(data) => {
            if let Some(t) = data.target {
                m.mark_object(t);
            }
        }
        ObjectKind::Function(f) => {
            m.mark_env(f.closure_env);
            if let Some(h) = f.home_object {
                m.mark_object(h);
            }
        }
        ObjectKind::Builtin(b) => {
            for v in &b.captured {
                m.mark_value(v);
            }
        }
        ObjectKind::Bound(b) => {
            m.mark_object(b.target);
            m.mark_value(&b.bound_this);
            for v in &b.bound_args {
                m.mark_value(v);
            }
        }
        ObjectKind::Proxy { target, handler } => {
            if let Some(t) = target {
                m.mark_object(*t);
            }
            if let Some(h) = handler {
                m.mark_object(*h);
            }
        }
        ObjectKind::IntegerIndexed(t) => m.mark_object(t.buffer),
        ObjectKind::Map(data) => {
            for (k, v) in data.entries.iter().flatten() {
                m.mark_value(k);
                m.mark_value(v);
            }
        }
        ObjectKind::Set(data) => {
            for v in data.entries.iter().flatten() {
                m.mark_value(v);
            }
        }
        // Weak keys and members are not traced here; the ephemeron
        // pass handles weak-map values after the strong graph settles.
        ObjectKind::WeakMap(_) | ObjectKind::WeakSet(_) | ObjectKind::WeakRef { .. } => {}
        ObjectKind::FinalizationRegistry { callback, cells } => {
            m.mark_object(*callback);
            for c in cells {
                m.mark_value(&c.held);
            }
        }
        ObjectKind::Promise(p) => {
            if let Some(v) = &p.result {
                m.mark_value(v);
            }
            for r in p.fulfill_reactions.iter().chain(&p.reject_reactions) {
                if let Some(c) = r.capability {
                    m.mark_object(c);
                }
                match &r.handler {
                    ReactionHandler::Function(f) => m.mark_object(*f),
                    ReactionHandler::Resume { coroutine, .. } => m.mark_object(*coroutine),
                    ReactionHandler::Identity | ReactionHandler::Thrower => {}
                }
            }
        }
        ObjectKind::Generator(g) => {
            if let Some(cx) = &g.context {
                m.mark_context(cx);
            }
            if let Some(c) = g.capability {
                m.mark_object(c);
            }
            for req in &g.queue {
                m.mark_value(&req.value);
                m.mark_object(req.capability);
            }
        }
        ObjectKind::ArrayIterator { target, .. }
        | ObjectKind::MapIterator { target, .. }
        | ObjectKind::SetIterator { target, .. } => m.mark_object(*target),
    }
}

fn trace_env(env: &EnvRecord, m: &mut Marker) {
    if let Some(outer) = env.outer {
        m.mark_env(outer);
    }
    if let Some(decl) = env.decl() {
        for slot in decl.bindings.values() {
            if let Some(v) = &slot.value {
                m.mark_value(v);
            }
        }
    }
    match &env.kind {
        EnvKind::Object(o) => m.mark_object(o.object),
        EnvKind::Global(g) => m.mark_object(g.object),
        EnvKind::Function(f) => {
            if let crate::env::ThisBinding::Initialized(v) = &f.this {
                m.mark_value(v);
            }
            if let Some(h) = f.home_object {
                m.mark_object(h);
            }
            m.mark_value(&f.new_target);
        }
        EnvKind::Module(md) => {
            for (env_id, _) in md.indirect.values() {
                m.mark_env(*env_id);
            }
        }
        EnvKind::Declarative(_) => {}
    }
}

/// A weakly-holdable key is live when it is not a heap object (Rc
/// primitives never die under the collector) or when its object is
/// marked.
fn weak_key_live(v: &Value, m: &Marker) -> bool {
    match v {
        Value::Object(id) => m.object_is_marked(*id),
        _ => true,
    }
}

impl Heap {
    /// Run a full collection. `extra_roots` contributes the caller's
    /// roots (context stack, realm handles) through the marker.
    pub fn collect<F: FnOnce(&mut Marker)>(&mut self, extra_roots: F) -> HeapStats {
        let before = self.live_objects();
        let mut m = Marker::new(self.objects.len(), self.envs.len());

        for v in &self.roots {
            m.mark_value(v);
        }
        for id in &self.root_objects {
            m.mark_object(*id);
        }
        for id in &self.root_envs {
            m.mark_env(*id);
        }
        extra_roots(&mut m);

        self.drain(&mut m);

        // Ephemeron fixpoint: a weak-map value is strong exactly when
        // its key is live. Newly marked values can revive further
        // keys, so iterate to fixpoint.
        loop {
            let mut progressed = false;
            for i in 0..self.objects.len() {
                if !m.obj_marked[i] {
                    continue;
                }
                let Some(obj) = self.objects[i].as_ref() else {
                    continue;
                };
                if let ObjectKind::WeakMap(data) = &obj.kind {
                    for (k, v) in data.entries.iter().flatten() {
                        if weak_key_live(k, &m) {
                            if let Value::Object(vid) = v {
                                if !m.object_is_marked(*vid) {
                                    m.mark_object(*vid);
                                    progressed = true;
                                }
                            }
                        }
                    }
                }
            }
            if !progressed {
                break;
            }
            self.drain(&mut m);
        }

        // Weak processing on the surviving graph.
        let mut finalizations = Vec::new();
        for i in 0..self.objects.len() {
            if !m.obj_marked[i] {
                continue;
            }
            let Some(obj) = self.objects[i].as_mut() else {
                continue;
            };
            match &mut obj.kind {
                ObjectKind::WeakRef { target } => {
                    if let Some(t) = *target {
                        if !m.obj_marked[t.index()] {
                            *target = None;
                        }
                    }
                }
                ObjectKind::WeakMap(data) => {
                    data.retain_keys(|k| weak_key_live(k, &m));
                }
                ObjectKind::WeakSet(data) => {
                    data.retain(|v| weak_key_live(v, &m));
                }
                ObjectKind::FinalizationRegistry { callback, cells } => {
                    let cb = *callback;
                    cells.retain(|cell| {
                        if m.obj_marked[cell.target.index()] {
                            true
                        } else {
                            finalizations.push((cb, cell.held.clone()));
                            false
                        }
                    });
                    for cell in cells.iter_mut() {
                        if let Some(tok) = cell.token {
                            if !m.obj_marked[tok.index()] {
                                cell.token = None;
                            }
                        }
                    }
                }
                _ => {}
            }
        }
        self.pending_finalizations.extend(finalizations);

        // Sweep.
        let mut freed = 0;
        for i in 0..self.objects.len() {
            if self.objects[i].is_some() && !m.obj_marked[i] {
                self.objects[i] = None;
                self.free_objects.push(i as u32);
                freed += 1;
            }
        }
        for i in 0..self.envs.len() {
            if self.envs[i].is_some() && !m.env_marked[i] {
                self.envs[i] = None;
                self.free_envs.push(i as u32);
            }
        }

        let live_objects = before - freed;
        self.collections += 1;
        self.allocations_since_gc = 0;
        self.gc_threshold = (live_objects * 2).max(Heap::MIN_GC_THRESHOLD);

        HeapStats {
            live_objects,
            live_envs: self.live_envs(),
            freed_objects: freed,
            collections: self.collections,
        }
    }

    fn drain(&self, m: &mut Marker) {
        while let Some(item) = m.queue.pop() {
            match item {
                WorkItem::Obj(i) => {
                    if let Some(obj) = self.objects[i as usize].as_ref() {
                        trace_object(obj, m);
                    }
                }
                WorkItem::Env(i) => {
                    if let Some(env) = self.envs[i as usize].as_ref() {
                        trace_env(env, m);
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collections::MapData;
    use crate::object::Property;
    use core_types::PropertyKey;

    fn obj(heap: &mut Heap) -> ObjectId {
        heap.alloc_object(JsObject::ordinary(None))
    }

    #[test]
    fn test_unreachable_object_collected() {
        let mut heap = Heap::new();
        let kept = obj(&mut heap);
        let dropped = obj(&mut heap);
        heap.add_root_object(kept);
        let stats = heap.collect(|_| {});
        assert_eq!(stats.live_objects, 1);
        assert_eq!(stats.freed_objects, 1);
        // the kept object is still readable; the dead slot is gone
        let _ = heap.object(kept);
        assert!(heap.objects[dropped.index()].is_none());
    }

    #[test]
    fn test_cycles_are_collected() {
        let mut heap = Heap::new();
        let a = obj(&mut heap);
        let b = obj(&mut heap);
        heap.object_mut(a)
            .set_property(PropertyKey::from_str("next"), Property::data(Value::Object(b)));
        heap.object_mut(b)
            .set_property(PropertyKey::from_str("next"), Property::data(Value::Object(a)));
        let stats = heap.collect(|_| {});
        assert_eq!(stats.live_objects, 0);
    }

    #[test]
    fn test_property_values_keep_objects_alive() {
        let mut heap = Heap::new();
        let root = obj(&mut heap);
        let child = obj(&mut heap);
        heap.object_mut(root)
            .set_property(PropertyKey::from_str("c"), Property::data(Value::Object(child)));
        heap.add_root_object(root);
        let stats = heap.collect(|_| {});
        assert_eq!(stats.live_objects, 2);
    }

    #[test]
    fn test_weak_ref_cleared_when_target_dies() {
        let mut heap = Heap::new();
        let target = obj(&mut heap);
        let wr = heap.alloc_object(JsObject::with_kind(
            None,
            ObjectKind::WeakRef {
                target: Some(target),
            },
        ));
        heap.add_root_object(wr);
        heap.collect(|_| {});
        match &heap.object(wr).kind {
            ObjectKind::WeakRef { target } => assert!(target.is_none()),
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_weak_ref_keeps_live_target() {
        let mut heap = Heap::new();
        let target = obj(&mut heap);
        let wr = heap.alloc_object(JsObject::with_kind(
            None,
            ObjectKind::WeakRef {
                target: Some(target),
            },
        ));
        heap.add_root_object(wr);
        heap.add_root_object(target);
        heap.collect(|_| {});
        match &heap.object(wr).kind {
            ObjectKind::WeakRef { target } => assert!(target.is_some()),
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_weak_map_entry_dropped_with_key() {
        let mut heap = Heap::new();
        let key = obj(&mut heap);
        let value = obj(&mut heap);
        let mut data = MapData::default();
        data.set(Value::Object(key), Value::Object(value));
        let wm = heap.alloc_object(JsObject::with_kind(None, ObjectKind::WeakMap(data)));
        heap.add_root_object(wm);

        heap.collect(|_| {});
        match &heap.object(wm).kind {
            ObjectKind::WeakMap(d) => assert_eq!(d.size(), 0),
            _ => unreachable!(),
        }
        // the value died with the key
        assert!(heap.objects[value.index()].is_none());
    }

    #[test]
    fn test_weak_map_value_survives_while_key_lives() {
        let mut heap = Heap::new();
        let key = obj(&mut heap);
        let value = obj(&mut heap);
        let mut data = MapData::default();
        data.set(Value::Object(key), Value::Object(value));
        let wm = heap.alloc_object(JsObject::with_kind(None, ObjectKind::WeakMap(data)));
        heap.add_root_object(wm);
        heap.add_root_object(key);

        let stats = heap.collect(|_| {});
        assert_eq!(stats.live_objects, 3);
        match &heap.object(wm).kind {
            ObjectKind::WeakMap(d) => assert_eq!(d.size(), 1),
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_ephemeron_chain() {
        // value of entry 1 is the key of entry 2; both survive only
        // through the chain from the live key.
        let mut heap = Heap::new();
        let k1 = obj(&mut heap);
        let v1 = obj(&mut heap);
        let v2 = obj(&mut heap);
        let mut data = MapData::default();
        data.set(Value::Object(k1), Value::Object(v1));
        data.set(Value::Object(v1), Value::Object(v2));
        let wm = heap.alloc_object(JsObject::with_kind(None, ObjectKind::WeakMap(data)));
        heap.add_root_object(wm);
        heap.add_root_object(k1);

        heap.collect(|_| {});
        match &heap.object(wm).kind {
            ObjectKind::WeakMap(d) => assert_eq!(d.size(), 2),
            _ => unreachable!(),
        }
        assert!(heap.objects[v2.index()].is_some());
    }

    #[test]
    fn test_finalization_registry_schedules_cleanup() {
        let mut heap = Heap::new();
        let target = obj(&mut heap);
        let callback = obj(&mut heap);
        let fr = heap.alloc_object(JsObject::with_kind(
            None,
            ObjectKind::FinalizationRegistry {
                callback,
                cells: vec![crate::object::FinalizationCell {
                    target,
                    held: Value::string("held"),
                    token: None,
                }],
            },
        ));
        heap.add_root_object(fr);
        heap.collect(|_| {});
        assert_eq!(heap.pending_finalizations.len(), 1);
        assert_eq!(heap.pending_finalizations[0].0, callback);
    }

    #[test]
    fn test_env_chain_traced() {
        let mut heap = Heap::new();
        let held = obj(&mut heap);
        let outer = heap.alloc_env(EnvRecord::declarative(None));
        heap.env_mut(outer)
            .decl_mut()
            .unwrap()
            .bindings
            .insert("x".into(), crate::env::BindingSlot {
                value: Some(Value::Object(held)),
                mutable: true,
                deletable: false,
                strict: false,
            });
        let inner = heap.alloc_env(EnvRecord::declarative(Some(outer)));
        heap.add_root_env(inner);
        let stats = heap.collect(|_| {});
        assert_eq!(stats.live_objects, 1);
        assert_eq!(stats.live_envs, 2);
    }
}
