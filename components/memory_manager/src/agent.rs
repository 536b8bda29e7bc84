//! The seam between leaf components and the running interpreter.
//!
//! Accessor getters, proxy traps, iterator protocols and native
//! built-ins all need to invoke JavaScript functions; they receive an
//! `&mut dyn Agent` and call back through it. The interpreter is the
//! one implementor.

use core_types::{Completion, ErrorKind, ObjectId, PropertyKey, Thrown, Value};

use crate::coroutine::ResumeKind;
use crate::heap::Heap;
use crate::object::{JsObject, ObjectKind, Property};
use crate::promise::Reaction;
use crate::realm::Realm;

/// Call information handed to a native function.
pub struct NativeCallInfo<'a> {
    /// The built-in function object being invoked; captured state is
    /// read through this handle.
    pub callee: ObjectId,
    /// The `this` argument.
    pub this: Value,
    /// Positional arguments.
    pub args: &'a [Value],
    /// `new.target`, or `undefined` for plain calls.
    pub new_target: Value,
}

impl NativeCallInfo<'_> {
    /// Argument `i`, or `undefined` when missing.
    pub fn arg(&self, i: usize) -> Value {
        self.args.get(i).cloned().unwrap_or(Value::Undefined)
    }
}

/// A native function entry point.
pub type NativeFn = fn(&mut dyn Agent, &NativeCallInfo<'_>) -> Completion<Value>;

/// The interpreter surface leaf components program against.
pub trait Agent {
    /// The heap.
    fn heap(&mut self) -> &mut Heap;

    /// Read-only heap access.
    fn heap_ref(&self) -> &Heap;

    /// The active realm.
    fn realm(&self) -> &Realm;

    /// Invoke a callable value.
    fn call(&mut self, callee: Value, this: Value, args: &[Value]) -> Completion<Value>;

    /// Invoke a constructor.
    fn construct(&mut self, callee: Value, args: &[Value], new_target: Value)
        -> Completion<Value>;

    /// Queue a promise reaction as a microtask.
    fn enqueue_reaction(&mut self, reaction: Reaction, argument: Value);

    /// Queue a resolve-with-thenable microtask.
    fn enqueue_thenable_job(&mut self, promise: ObjectId, thenable: Value, then: Value) {
        let _ = (promise, thenable, then);
        unreachable!("this agent does not schedule jobs");
    }

    /// Queue a plain callback as a host job (finalization callbacks).
    fn enqueue_call_job(&mut self, func: Value, args: Vec<Value>) {
        let _ = (func, args);
        unreachable!("this agent does not schedule jobs");
    }

    /// Queue a coroutine resumption as a microtask.
    fn enqueue_resume_job(&mut self, coroutine: ObjectId, kind: ResumeKind, value: Value) {
        let _ = (coroutine, kind, value);
        unreachable!("this agent does not schedule jobs");
    }

    /// Drive a suspended coroutine one step. For generators the
    /// result is the iterator-result object; for async generators a
    /// promise.
    fn resume_coroutine(
        &mut self,
        coroutine: ObjectId,
        kind: ResumeKind,
        value: Value,
    ) -> Completion<Value> {
        let _ = (coroutine, kind, value);
        self.type_error("this agent cannot run coroutines")
    }

    /// Queue a `next`/`return`/`throw` request on an async generator;
    /// returns the promise settled when the request is served.
    fn async_generator_request(
        &mut self,
        coroutine: ObjectId,
        kind: ResumeKind,
        value: Value,
    ) -> Completion<Value> {
        let _ = (coroutine, kind, value);
        self.type_error("this agent cannot run coroutines")
    }

    /// Build an error object of `kind` without throwing it.
    fn make_error(&mut self, kind: ErrorKind, message: &str) -> Value {
        let proto = self.realm().intrinsics.error_prototype_for(kind);
        let mut obj = JsObject::with_kind(Some(proto), ObjectKind::Error { kind });
        obj.set_property(
            PropertyKey::from_str("message"),
            Property::method(Value::string(message)),
        );
        Value::Object(self.heap().alloc_object(obj))
    }
}

/// Error-throwing helpers for [`Agent`].
///
/// Split out from `Agent` itself (and blanket-implemented below)
/// because these methods are generic over the completion's success
/// type, which would otherwise make `Agent` dyn-incompatible.
pub trait AgentErrors: Agent {
    /// Throw a `TypeError`.
    fn type_error<T>(&mut self, message: &str) -> Completion<T> {
        let err = self.make_error(ErrorKind::TypeError, message);
        Err(Thrown(err))
    }

    /// Throw a `RangeError`.
    fn range_error<T>(&mut self, message: &str) -> Completion<T> {
        let err = self.make_error(ErrorKind::RangeError, message);
        Err(Thrown(err))
    }

    /// Throw a `ReferenceError`.
    fn reference_error<T>(&mut self, message: &str) -> Completion<T> {
        let err = self.make_error(ErrorKind::ReferenceError, message);
        Err(Thrown(err))
    }

    /// Throw a `SyntaxError`.
    fn syntax_error<T>(&mut self, message: &str) -> Completion<T> {
        let err = self.make_error(ErrorKind::SyntaxError, message);
        Err(Thrown(err))
    }
}

impl<A: Agent + ?Sized> AgentErrors for A {}
