//! Coroutine payload shared by generators, async generators and
//! async-function bodies.
//!
//! A coroutine owns its suspended execution context. The state
//! machine and resume protocol are driven by the interpreter; this
//! module defines the states and the request queue.

use std::collections::VecDeque;

use core_types::{ObjectId, Value};

use crate::context::ExecutionContext;

/// Which flavour of coroutine this is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoroutineKind {
    /// `function*`
    Generator,
    /// `async function*`
    AsyncGenerator,
    /// `async function` body (the result promise lives in
    /// [`GeneratorData::capability`]).
    AsyncFunction,
}

/// Generator lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GeneratorState {
    /// Allocated but not yet started (prototype-only instances).
    Undefined,
    /// Created, body not entered.
    SuspendedStart,
    /// Parked at a `yield`.
    SuspendedYield,
    /// Currently running; reentrant resumption is an error.
    Executing,
    /// Async generator bridging a `.return()` value through
    /// `Promise.resolve`.
    AwaitingReturn,
    /// Done; every later `next` answers `{done: true}`.
    Completed,
}

/// How a suspended context is being resumed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResumeKind {
    /// `.next(v)` / fulfilled await
    Next,
    /// `.throw(v)` / rejected await
    Throw,
    /// `.return(v)`; runs finally handlers on the way out
    Return,
}

/// A queued async-generator request.
#[derive(Debug, Clone)]
pub struct AsyncGenRequest {
    /// next/throw/return
    pub kind: ResumeKind,
    /// Argument of the request
    pub value: Value,
    /// Promise settled when the request completes
    pub capability: ObjectId,
}

/// Coroutine payload.
#[derive(Debug, Clone)]
pub struct GeneratorData {
    /// Flavour.
    pub kind: CoroutineKind,
    /// Lifecycle state.
    pub state: GeneratorState,
    /// The parked context; `None` while executing or completed.
    pub context: Option<Box<ExecutionContext>>,
    /// Pending requests, served strictly in FIFO order (async
    /// generators).
    pub queue: VecDeque<AsyncGenRequest>,
    /// Result promise (async functions).
    pub capability: Option<ObjectId>,
}

impl GeneratorData {
    /// A fresh coroutine parked before its first instruction.
    pub fn new(kind: CoroutineKind, context: ExecutionContext) -> Self {
        Self {
            kind,
            state: GeneratorState::SuspendedStart,
            context: Some(Box::new(context)),
            queue: VecDeque::new(),
            capability: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_names_cover_lifecycle() {
        // The full state set of the generator lifecycle table.
        let states = [
            GeneratorState::Undefined,
            GeneratorState::SuspendedStart,
            GeneratorState::SuspendedYield,
            GeneratorState::Executing,
            GeneratorState::AwaitingReturn,
            GeneratorState::Completed,
        ];
        assert_eq!(states.len(), 6);
    }
}
