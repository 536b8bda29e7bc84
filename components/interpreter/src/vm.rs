//! The virtual machine: state container, agent seam and job pump.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_runtime::{EventLoop, Job, ModuleRegistry};
use core_types::{Completion, ErrorKind, JsError, ObjectId, PropertyKey, Thrown, Value};
use memory_manager::{
    Agent, AgentErrors, ExecutionContext, Heap, ObjectKind, Reaction, Realm, ResumeKind,
};
use object_model as om;

use crate::cache::PropertyCaches;

/// How deep the context stack may grow before a call fails.
const MAX_CALL_DEPTH: usize = 512;

/// A loader the embedder installs to resolve module specifiers to
/// source text.
pub type ModuleLoader = Box<dyn FnMut(&str, &str) -> Result<String, String>>;

/// The runtime: heap, realm, context stack and job queues.
///
/// One `Vm` is one agent: single-threaded, with its own heap and
/// interned strings. Separate instances share nothing and may live on
/// different threads.
pub struct Vm {
    pub(crate) heap: Heap,
    pub(crate) realm: Realm,
    pub(crate) contexts: Vec<ExecutionContext>,
    pub(crate) jobs: EventLoop,
    pub(crate) caches: PropertyCaches,
    pub(crate) modules: ModuleRegistry,
    pub(crate) module_loader: Option<ModuleLoader>,
    interrupt: Arc<AtomicBool>,
    pub(crate) steps_since_check: u32,
    /// Depth of native frames on the Rust stack. Native code may hold
    /// raw handles in locals, so collection waits until it unwinds.
    pub(crate) native_depth: u32,
}

impl Vm {
    /// A fresh runtime with a populated realm.
    pub fn new() -> Self {
        let mut heap = Heap::new();
        let realm = builtins::create_realm(&mut heap);
        heap.add_root_object(realm.global_object);
        heap.add_root_env(realm.global_env);
        Self {
            heap,
            realm,
            contexts: Vec::new(),
            jobs: EventLoop::new(),
            caches: PropertyCaches::default(),
            modules: ModuleRegistry::new(),
            module_loader: None,
            interrupt: Arc::new(AtomicBool::new(false)),
            steps_since_check: 0,
            native_depth: 0,
        }
    }

    /// The global object handle.
    pub fn global_object(&self) -> ObjectId {
        self.realm.global_object
    }

    /// Define a property on the global object (embedder convenience).
    pub fn define_global(&mut self, name: &str, value: Value) {
        let global = self.realm.global_object;
        self.heap
            .object_mut(global)
            .set_property(PropertyKey::from_str(name), memory_manager::Property::data(value));
    }

    /// Handle the host can set from another thread to interrupt the
    /// running script between two instructions.
    pub fn interrupt_handle(&self) -> Arc<AtomicBool> {
        self.interrupt.clone()
    }

    /// Install the module-source loader.
    pub fn set_module_loader(&mut self, loader: ModuleLoader) {
        self.module_loader = Some(loader);
    }

    /// Read a value's property (embedder convenience).
    pub fn get_property(&mut self, value: &Value, name: &str) -> Result<Value, JsError> {
        let key = PropertyKey::from_str(name);
        om::get_v(self, value, &key).map_err(|t| self.thrown_to_error(t))
    }

    /// Call a callable value (embedder API).
    pub fn call_value(
        &mut self,
        callee: Value,
        this: Value,
        args: &[Value],
    ) -> Result<Value, JsError> {
        let result = self.execute_call(callee, this, args);
        result.map_err(|t| self.thrown_to_error(t))
    }

    /// Coerce to number (embedder API).
    pub fn to_number_value(&mut self, v: &Value) -> Result<f64, JsError> {
        om::to_number(self, v).map_err(|t| self.thrown_to_error(t))
    }

    /// Coerce to string (embedder API).
    pub fn to_string_value(&mut self, v: &Value) -> Result<String, JsError> {
        om::to_string(self, v)
            .map(|s| s.as_str().to_string())
            .map_err(|t| self.thrown_to_error(t))
    }

    // ---- frames ----

    pub(crate) fn top(&self) -> &ExecutionContext {
        self.contexts.last().expect("no running context")
    }

    pub(crate) fn top_mut(&mut self) -> &mut ExecutionContext {
        self.contexts.last_mut().expect("no running context")
    }

    pub(crate) fn check_call_depth(&mut self) -> Completion<()> {
        if self.contexts.len() >= MAX_CALL_DEPTH {
            return self.range_error("maximum call stack size exceeded");
        }
        Ok(())
    }

    // ---- safe points ----

    /// Runs between instructions: collection when the allocator asks
    /// for it, and the host interrupt flag.
    pub(crate) fn safe_point(&mut self) -> Completion<()> {
        self.steps_since_check += 1;
        if self.steps_since_check < 64 {
            return Ok(());
        }
        self.steps_since_check = 0;
        if self.interrupt.swap(false, Ordering::Relaxed) {
            let err = self.make_error(ErrorKind::InternalError, "execution interrupted by host");
            return Err(Thrown(err));
        }
        if self.heap.should_collect() && self.native_depth == 0 {
            self.collect_garbage();
        }
        Ok(())
    }

    /// Stop-the-world collection with the interpreter's roots.
    pub fn collect_garbage(&mut self) -> memory_manager::HeapStats {
        let contexts = &self.contexts;
        let realm = &self.realm;
        let jobs = &self.jobs;
        let stats = self.heap.collect(|m| {
            for cx in contexts {
                m.mark_context(cx);
            }
            m.mark_object(realm.global_object);
            m.mark_env(realm.global_env);
            mark_intrinsics(m, &realm.intrinsics);
            for job in jobs.iter_jobs() {
                mark_job(m, job);
            }
        });
        // object ids may be reused now, and dead modules (one-shot
        // eval code) no longer need their tables
        self.caches.clear_slots();
        self.caches.evict_dead();
        // finalization callbacks discovered by the sweep become host jobs
        let pending = std::mem::take(&mut self.heap.pending_finalizations);
        for (callback, held) in pending {
            self.jobs.enqueue_host_job(Job::Call {
                func: Value::Object(callback),
                args: vec![held],
            });
        }
        stats
    }

    // ---- job pump ----

    /// Drain microtasks, then host jobs one at a time (each followed
    /// by a full microtask drain), until both queues are idle.
    pub fn run_jobs(&mut self) {
        loop {
            while let Some(job) = self.jobs.next_microtask() {
                self.run_job(job);
            }
            match self.jobs.next_host_job() {
                Some(job) => self.run_job(job),
                None => break,
            }
        }
    }

    fn run_job(&mut self, job: Job) {
        let result: Completion<()> = match job {
            Job::PromiseReaction { reaction, argument } => {
                async_runtime::run_reaction(self, reaction, argument)
            }
            Job::PromiseResolveThenable {
                promise,
                thenable,
                then,
            } => async_runtime::run_thenable_job(self, promise, thenable, then),
            Job::ResumeCoroutine {
                coroutine,
                kind,
                value,
            } => self.resume_coroutine(coroutine, kind, value).map(|_| ()),
            Job::Call { func, args } => self.call(func, Value::Undefined, &args).map(|_| ()),
        };
        // an error escaping a job has no user frame to land in
        let _ = result;
    }

    // ---- error plumbing ----

    /// Convert a thrown value into a host-facing error.
    pub fn thrown_to_error(&mut self, thrown: Thrown) -> JsError {
        let value = thrown.into_value();
        if let Some(id) = value.as_object() {
            if let ObjectKind::Error { kind } = self.heap.object(id).kind {
                let message = om::get(self, id, &PropertyKey::from_str("message"), &value)
                    .ok()
                    .and_then(|m| m.as_string().map(|s| s.as_str().to_string()))
                    .unwrap_or_default();
                return JsError::new(kind, message);
            }
        }
        let text = om::to_string(self, &value)
            .map(|s| s.as_str().to_string())
            .unwrap_or_else(|_| format!("{:?}", value));
        JsError::new(ErrorKind::InternalError, format!("uncaught: {}", text))
    }
}

impl Default for Vm {
    fn default() -> Self {
        Self::new()
    }
}

fn mark_job(m: &mut memory_manager::Marker, job: &Job) {
    match job {
        Job::PromiseReaction { reaction, argument } => {
            if let Some(cap) = reaction.capability {
                m.mark_object(cap);
            }
            match &reaction.handler {
                memory_manager::ReactionHandler::Function(f) => m.mark_object(*f),
                memory_manager::ReactionHandler::Resume { coroutine, .. } => {
                    m.mark_object(*coroutine)
                }
                _ => {}
            }
            m.mark_value(argument);
        }
        Job::PromiseResolveThenable {
            promise,
            thenable,
            then,
        } => {
            m.mark_object(*promise);
            m.mark_value(thenable);
            m.mark_value(then);
        }
        Job::ResumeCoroutine {
            coroutine, value, ..
        } => {
            m.mark_object(*coroutine);
            m.mark_value(value);
        }
        Job::Call { func, args } => {
            m.mark_value(func);
            for a in args {
                m.mark_value(a);
            }
        }
    }
}

fn mark_intrinsics(m: &mut memory_manager::Marker, i: &memory_manager::Intrinsics) {
    let all = [
        i.object_prototype,
        i.function_prototype,
        i.array_prototype,
        i.string_prototype,
        i.number_prototype,
        i.boolean_prototype,
        i.symbol_prototype,
        i.bigint_prototype,
        i.error_prototype,
        i.type_error_prototype,
        i.range_error_prototype,
        i.reference_error_prototype,
        i.syntax_error_prototype,
        i.uri_error_prototype,
        i.eval_error_prototype,
        i.map_prototype,
        i.set_prototype,
        i.weak_map_prototype,
        i.weak_set_prototype,
        i.weak_ref_prototype,
        i.finalization_registry_prototype,
        i.promise_prototype,
        i.iterator_prototype,
        i.async_iterator_prototype,
        i.array_iterator_prototype,
        i.map_iterator_prototype,
        i.set_iterator_prototype,
        i.generator_prototype,
        i.async_generator_prototype,
        i.array_buffer_prototype,
        i.typed_array_prototype,
    ];
    for id in all {
        m.mark_object(id);
    }
}

impl Agent for Vm {
    fn heap(&mut self) -> &mut Heap {
        &mut self.heap
    }

    fn heap_ref(&self) -> &Heap {
        &self.heap
    }

    fn realm(&self) -> &Realm {
        &self.realm
    }

    fn call(&mut self, callee: Value, this: Value, args: &[Value]) -> Completion<Value> {
        self.execute_call(callee, this, args)
    }

    fn construct(
        &mut self,
        callee: Value,
        args: &[Value],
        new_target: Value,
    ) -> Completion<Value> {
        self.execute_construct(callee, args, new_target)
    }

    fn enqueue_reaction(&mut self, reaction: Reaction, argument: Value) {
        self.jobs
            .enqueue_microtask(Job::PromiseReaction { reaction, argument });
    }

    fn enqueue_thenable_job(&mut self, promise: ObjectId, thenable: Value, then: Value) {
        self.jobs.enqueue_microtask(Job::PromiseResolveThenable {
            promise,
            thenable,
            then,
        });
    }

    fn enqueue_call_job(&mut self, func: Value, args: Vec<Value>) {
        self.jobs.enqueue_host_job(Job::Call { func, args });
    }

    fn enqueue_resume_job(&mut self, coroutine: ObjectId, kind: ResumeKind, value: Value) {
        self.jobs.enqueue_microtask(Job::ResumeCoroutine {
            coroutine,
            kind,
            value,
        });
    }

    fn resume_coroutine(
        &mut self,
        coroutine: ObjectId,
        kind: ResumeKind,
        value: Value,
    ) -> Completion<Value> {
        crate::generator::resume(self, coroutine, kind, value)
    }

    fn async_generator_request(
        &mut self,
        coroutine: ObjectId,
        kind: ResumeKind,
        value: Value,
    ) -> Completion<Value> {
        crate::generator::async_generator_request(self, coroutine, kind, value)
    }
}
