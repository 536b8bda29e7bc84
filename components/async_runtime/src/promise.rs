//! Promise abstract operations.
//!
//! The data lives on the heap (`memory_manager::PromiseData`); these
//! functions implement settlement, `then` registration and reaction
//! execution over it. Settling never runs user code synchronously:
//! reactions and thenable resolution always go through the agent's
//! job queue.

use core_types::{Completion, JsString, ObjectId, PropertyKey, Thrown, Value};
use memory_manager::{
    Agent, BuiltinFunctionData, JsObject, NativeCallInfo, ObjectKind, PromiseData, PromiseState,
    Reaction, ReactionHandler, ResumeKind,
};
use object_model as om;

fn promise_data_mut<'h>(
    agent: &'h mut dyn Agent,
    promise: ObjectId,
) -> &'h mut PromiseData {
    match &mut agent.heap().object_mut(promise).kind {
        ObjectKind::Promise(p) => p,
        _ => unreachable!("promise operation on non-promise"),
    }
}

fn promise_data<'h>(agent: &'h dyn Agent, promise: ObjectId) -> &'h PromiseData {
    match &agent.heap_ref().object(promise).kind {
        ObjectKind::Promise(p) => p,
        _ => unreachable!("promise operation on non-promise"),
    }
}

/// Allocate a fresh pending promise.
pub fn new_promise(agent: &mut dyn Agent) -> ObjectId {
    let proto = agent.realm().intrinsics.promise_prototype;
    agent
        .heap()
        .alloc_object(JsObject::with_kind(Some(proto), ObjectKind::Promise(PromiseData::default())))
}

/// Whether a value is a promise object.
pub fn is_promise(agent: &dyn Agent, v: &Value) -> bool {
    match v.as_object() {
        Some(id) => matches!(agent.heap_ref().object(id).kind, ObjectKind::Promise(_)),
        None => false,
    }
}

/// `Promise.resolve(value)` without the species dance: an existing
/// promise passes through, anything else gets wrapped.
pub fn promise_resolve_value(agent: &mut dyn Agent, value: Value) -> Completion<ObjectId> {
    if let Some(id) = value.as_object() {
        if matches!(agent.heap_ref().object(id).kind, ObjectKind::Promise(_)) {
            return Ok(id);
        }
    }
    let promise = new_promise(agent);
    resolve_promise(agent, promise, value)?;
    Ok(promise)
}

/// `ResolvePromise`: fulfil directly, or chase a thenable through a
/// job. The promise and value are rooted for the duration, since the
/// `then` lookup may run user code.
pub fn resolve_promise(agent: &mut dyn Agent, promise: ObjectId, value: Value) -> Completion<()> {
    {
        let data = promise_data_mut(agent, promise);
        if data.already_resolved {
            return Ok(());
        }
        data.already_resolved = true;
    }
    let mark = agent.heap().root_mark();
    agent.heap().roots.push(Value::Object(promise));
    agent.heap().roots.push(value.clone());
    let result = resolve_promise_inner(agent, promise, value);
    agent.heap().root_release(mark);
    result
}

fn resolve_promise_inner(
    agent: &mut dyn Agent,
    promise: ObjectId,
    value: Value,
) -> Completion<()> {
    if value.as_object() == Some(promise) {
        let err = agent.make_error(
            core_types::ErrorKind::TypeError,
            "a promise cannot resolve with itself",
        );
        settle(agent, promise, PromiseState::Rejected, err);
        return Ok(());
    }
    if value.is_object() {
        let then = match om::get_v(agent, &value, &PropertyKey::from_str("then")) {
            Ok(t) => t,
            Err(Thrown(reason)) => {
                settle(agent, promise, PromiseState::Rejected, reason);
                return Ok(());
            }
        };
        if om::is_callable(agent, &then) {
            agent.enqueue_thenable_job(promise, value, then);
            return Ok(());
        }
    }
    settle(agent, promise, PromiseState::Fulfilled, value);
    Ok(())
}

/// `RejectPromise`.
pub fn reject_promise(agent: &mut dyn Agent, promise: ObjectId, reason: Value) {
    {
        let data = promise_data_mut(agent, promise);
        if data.already_resolved {
            return;
        }
        data.already_resolved = true;
    }
    settle(agent, promise, PromiseState::Rejected, reason);
}

/// Transition to a settled state and queue the pending reactions in
/// registration order.
pub fn settle(agent: &mut dyn Agent, promise: ObjectId, state: PromiseState, value: Value) {
    let reactions = {
        let data = promise_data_mut(agent, promise);
        if data.is_settled() {
            return;
        }
        data.state = state;
        data.result = Some(value.clone());
        let reactions = match state {
            PromiseState::Fulfilled => std::mem::take(&mut data.fulfill_reactions),
            _ => std::mem::take(&mut data.reject_reactions),
        };
        data.fulfill_reactions.clear();
        data.reject_reactions.clear();
        reactions
    };
    for reaction in reactions {
        agent.enqueue_reaction(reaction, value.clone());
    }
}

/// `PerformPromiseThen`: register reactions, or queue them right away
/// when the promise has already settled.
pub fn perform_then(
    agent: &mut dyn Agent,
    promise: ObjectId,
    on_fulfilled: ReactionHandler,
    on_rejected: ReactionHandler,
    capability: Option<ObjectId>,
) {
    let state = promise_data(agent, promise).state;
    match state {
        PromiseState::Pending => {
            let data = promise_data_mut(agent, promise);
            data.fulfill_reactions.push(Reaction {
                capability,
                handler: on_fulfilled,
            });
            data.reject_reactions.push(Reaction {
                capability,
                handler: on_rejected,
            });
            data.handled = true;
        }
        PromiseState::Fulfilled => {
            let value = promise_data(agent, promise).result.clone().unwrap_or(Value::Undefined);
            promise_data_mut(agent, promise).handled = true;
            agent.enqueue_reaction(
                Reaction {
                    capability,
                    handler: on_fulfilled,
                },
                value,
            );
        }
        PromiseState::Rejected => {
            let value = promise_data(agent, promise).result.clone().unwrap_or(Value::Undefined);
            promise_data_mut(agent, promise).handled = true;
            agent.enqueue_reaction(
                Reaction {
                    capability,
                    handler: on_rejected,
                },
                value,
            );
        }
    }
}

/// Execute one queued promise reaction.
pub fn run_reaction(agent: &mut dyn Agent, reaction: Reaction, argument: Value) -> Completion<()> {
    let outcome: Completion<Value> = match &reaction.handler {
        ReactionHandler::Identity => Ok(argument),
        ReactionHandler::Thrower => Err(Thrown(argument)),
        ReactionHandler::Function(f) => {
            agent.call(Value::Object(*f), Value::Undefined, &[argument])
        }
        ReactionHandler::Resume { coroutine, resume } => {
            let (coroutine, resume) = (*coroutine, *resume);
            agent.resume_coroutine(coroutine, resume, argument)?;
            return Ok(());
        }
    };
    match (outcome, reaction.capability) {
        (Ok(v), Some(cap)) => resolve_promise(agent, cap, v),
        (Err(Thrown(reason)), Some(cap)) => {
            reject_promise(agent, cap, reason);
            Ok(())
        }
        (Ok(_), None) => Ok(()),
        (Err(e), None) => Err(e),
    }
}

/// Execute a queued thenable-resolution job: call `then` with fresh
/// resolving functions for the promise.
pub fn run_thenable_job(
    agent: &mut dyn Agent,
    promise: ObjectId,
    thenable: Value,
    then: Value,
) -> Completion<()> {
    // the promise was flagged resolved when the job was queued; allow
    // the inner settlement through
    promise_data_mut(agent, promise).already_resolved = false;
    let (resolve, reject) = make_resolving_functions(agent, promise);
    match agent.call(then, thenable, &[resolve, reject]) {
        Ok(_) => Ok(()),
        Err(Thrown(reason)) => {
            reject_promise(agent, promise, reason);
            Ok(())
        }
    }
}

fn resolving_fn_target(agent: &dyn Agent, info: &NativeCallInfo<'_>) -> Option<ObjectId> {
    match &agent.heap_ref().object(info.callee).kind {
        ObjectKind::Builtin(b) => b.captured.first().and_then(|v| v.as_object()),
        _ => None,
    }
}

fn native_resolve(agent: &mut dyn Agent, info: &NativeCallInfo<'_>) -> Completion<Value> {
    if let Some(promise) = resolving_fn_target(agent, info) {
        resolve_promise(agent, promise, info.arg(0))?;
    }
    Ok(Value::Undefined)
}

fn native_reject(agent: &mut dyn Agent, info: &NativeCallInfo<'_>) -> Completion<Value> {
    if let Some(promise) = resolving_fn_target(agent, info) {
        reject_promise(agent, promise, info.arg(0));
    }
    Ok(Value::Undefined)
}

/// The paired `resolve`/`reject` functions of a promise capability.
pub fn make_resolving_functions(agent: &mut dyn Agent, promise: ObjectId) -> (Value, Value) {
    let proto = agent.realm().intrinsics.function_prototype;
    let mut make = |agent: &mut dyn Agent, name: &str, func| {
        Value::Object(agent.heap().alloc_object(JsObject::with_kind(
            Some(proto),
            ObjectKind::Builtin(BuiltinFunctionData {
                func,
                name: JsString::from_str(name),
                length: 1,
                constructable: false,
                captured: vec![Value::Object(promise)],
            }),
        )))
    };
    let resolve = make(agent, "resolve", native_resolve as memory_manager::NativeFn);
    let reject = make(agent, "reject", native_reject as memory_manager::NativeFn);
    (resolve, reject)
}

/// Reaction handlers that resume a parked coroutine when the awaited
/// promise settles.
pub fn await_reactions(coroutine: ObjectId) -> (ReactionHandler, ReactionHandler) {
    (
        ReactionHandler::Resume {
            coroutine,
            resume: ResumeKind::Next,
        },
        ReactionHandler::Resume {
            coroutine,
            resume: ResumeKind::Throw,
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    // a tiny agent that records queued reactions
    struct QueueAgent {
        heap: memory_manager::Heap,
        realm: memory_manager::Realm,
        reactions: Vec<(Reaction, Value)>,
    }

    impl QueueAgent {
        fn new() -> Self {
            let mut heap = memory_manager::Heap::new();
            let mut alloc = || heap.alloc_object(JsObject::ordinary(None));
            let intrinsics = memory_manager::Intrinsics {
                object_prototype: alloc(),
                function_prototype: alloc(),
                array_prototype: alloc(),
                string_prototype: alloc(),
                number_prototype: alloc(),
                boolean_prototype: alloc(),
                symbol_prototype: alloc(),
                bigint_prototype: alloc(),
                error_prototype: alloc(),
                type_error_prototype: alloc(),
                range_error_prototype: alloc(),
                reference_error_prototype: alloc(),
                syntax_error_prototype: alloc(),
                uri_error_prototype: alloc(),
                eval_error_prototype: alloc(),
                map_prototype: alloc(),
                set_prototype: alloc(),
                weak_map_prototype: alloc(),
                weak_set_prototype: alloc(),
                weak_ref_prototype: alloc(),
                finalization_registry_prototype: alloc(),
                promise_prototype: alloc(),
                iterator_prototype: alloc(),
                async_iterator_prototype: alloc(),
                array_iterator_prototype: alloc(),
                map_iterator_prototype: alloc(),
                set_iterator_prototype: alloc(),
                generator_prototype: alloc(),
                async_generator_prototype: alloc(),
                array_buffer_prototype: alloc(),
                typed_array_prototype: alloc(),
            };
            let global_object = heap.alloc_object(JsObject::ordinary(None));
            let global_env = heap.alloc_env(memory_manager::EnvRecord::declarative(None));
            Self {
                heap,
                realm: memory_manager::Realm {
                    global_object,
                    global_env,
                    intrinsics,
                },
                reactions: Vec::new(),
            }
        }
    }

    impl Agent for QueueAgent {
        fn heap(&mut self) -> &mut memory_manager::Heap {
            &mut self.heap
        }
        fn heap_ref(&self) -> &memory_manager::Heap {
            &self.heap
        }
        fn realm(&self) -> &memory_manager::Realm {
            &self.realm
        }
        fn call(&mut self, _: Value, _: Value, _: &[Value]) -> Completion<Value> {
            Ok(Value::Undefined)
        }
        fn construct(&mut self, _: Value, _: &[Value], _: Value) -> Completion<Value> {
            Ok(Value::Undefined)
        }
        fn enqueue_reaction(&mut self, reaction: Reaction, argument: Value) {
            self.reactions.push((reaction, argument));
        }
        fn enqueue_thenable_job(&mut self, _: ObjectId, _: Value, _: Value) {}
    }

    #[test]
    fn test_resolve_settles_once() {
        let mut agent = QueueAgent::new();
        let p = new_promise(&mut agent);
        resolve_promise(&mut agent, p, Value::Number(1.0)).unwrap();
        resolve_promise(&mut agent, p, Value::Number(2.0)).unwrap();
        let data = promise_data(&agent, p);
        assert_eq!(data.state, PromiseState::Fulfilled);
        assert_eq!(data.result.as_ref().unwrap().as_number(), Some(1.0));
    }

    #[test]
    fn test_then_on_settled_promise_queues_immediately() {
        let mut agent = QueueAgent::new();
        let p = new_promise(&mut agent);
        resolve_promise(&mut agent, p, Value::Number(42.0)).unwrap();
        perform_then(
            &mut agent,
            p,
            ReactionHandler::Identity,
            ReactionHandler::Thrower,
            None,
        );
        assert_eq!(agent.reactions.len(), 1);
        assert_eq!(agent.reactions[0].1.as_number(), Some(42.0));
    }

    #[test]
    fn test_reactions_queue_in_registration_order() {
        let mut agent = QueueAgent::new();
        let p = new_promise(&mut agent);
        for _ in 0..3 {
            perform_then(
                &mut agent,
                p,
                ReactionHandler::Identity,
                ReactionHandler::Thrower,
                None,
            );
        }
        assert!(agent.reactions.is_empty(), "pending promise must not run");
        resolve_promise(&mut agent, p, Value::Number(1.0)).unwrap();
        assert_eq!(agent.reactions.len(), 3);
    }

    #[test]
    fn test_self_resolution_rejects() {
        let mut agent = QueueAgent::new();
        let p = new_promise(&mut agent);
        resolve_promise(&mut agent, p, Value::Object(p)).unwrap();
        assert_eq!(promise_data(&agent, p).state, PromiseState::Rejected);
    }

    #[test]
    fn test_promise_resolve_value_passthrough() {
        let mut agent = QueueAgent::new();
        let p = new_promise(&mut agent);
        let same = promise_resolve_value(&mut agent, Value::Object(p)).unwrap();
        assert_eq!(same, p);
        let wrapped = promise_resolve_value(&mut agent, Value::Number(1.0)).unwrap();
        assert_ne!(wrapped, p);
    }
}
