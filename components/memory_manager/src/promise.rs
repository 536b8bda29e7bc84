//! Promise payload: state, result and reaction records.
//!
//! The abstract operations that drive these fields (resolve, reject,
//! `then`, reaction jobs) live in the interpreter, which owns the job
//! queue; this module only defines the data.

use core_types::{ObjectId, Value};

use crate::coroutine::ResumeKind;

/// The state of a promise. Settled promises never change state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromiseState {
    /// Neither fulfilled nor rejected yet.
    Pending,
    /// Resolved with a value.
    Fulfilled,
    /// Rejected with a reason.
    Rejected,
}

/// What a reaction does with the settlement value.
#[derive(Debug, Clone)]
pub enum ReactionHandler {
    /// Pass the value through unchanged.
    Identity,
    /// Re-throw the value (missing `onRejected`).
    Thrower,
    /// Call a user handler function.
    Function(ObjectId),
    /// Resume a suspended coroutine (`await` continuation).
    Resume {
        /// The generator/async-function coroutine object.
        coroutine: ObjectId,
        /// `Next` on fulfilment, `Throw` on rejection.
        resume: ResumeKind,
    },
}

/// A reaction registered on a promise.
#[derive(Debug, Clone)]
pub struct Reaction {
    /// Derived promise settled from the handler's outcome, when the
    /// reaction came from `then`.
    pub capability: Option<ObjectId>,
    /// Handler to run.
    pub handler: ReactionHandler,
}

/// Promise payload.
#[derive(Debug, Clone)]
pub struct PromiseData {
    /// Current state.
    pub state: PromiseState,
    /// Fulfilment value or rejection reason once settled.
    pub result: Option<Value>,
    /// Reactions waiting on fulfilment.
    pub fulfill_reactions: Vec<Reaction>,
    /// Reactions waiting on rejection.
    pub reject_reactions: Vec<Reaction>,
    /// A rejection handler has been attached.
    pub handled: bool,
    /// Resolve/reject has been called (also set while resolving with
    /// a thenable, before settlement).
    pub already_resolved: bool,
}

impl Default for PromiseData {
    fn default() -> Self {
        Self {
            state: PromiseState::Pending,
            result: None,
            fulfill_reactions: Vec::new(),
            reject_reactions: Vec::new(),
            handled: false,
            already_resolved: false,
        }
    }
}

impl PromiseData {
    /// Whether the promise has settled.
    pub fn is_settled(&self) -> bool {
        self.state != PromiseState::Pending
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_pending() {
        let p = PromiseData::default();
        assert_eq!(p.state, PromiseState::Pending);
        assert!(!p.is_settled());
        assert!(p.result.is_none());
    }
}
