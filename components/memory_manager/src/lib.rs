//! Garbage-collected heap and the runtime data stored in it.
//!
//! The heap is a non-moving arena: objects and environment records
//! live in slot vectors and are addressed by the index handles from
//! `core_types`. Collection is a stop-the-world tri-colour mark-sweep
//! run between two bytecode instructions, so native code never holds
//! a raw pointer across a safe point — everything goes through
//! handles.
//!
//! This crate also defines the data layout of every heap variant
//! (objects with their property storage, environment records,
//! suspended execution contexts, promises, coroutines, collections,
//! buffers) and the [`Agent`] trait through which leaf components
//! call back into the running interpreter.

#![warn(clippy::all)]
#![deny(unsafe_code)]

mod agent;
mod buffer;
mod collections;
mod context;
mod coroutine;
mod env;
mod gc;
mod heap;
mod object;
mod promise;
mod realm;

pub use agent::{Agent, AgentErrors, NativeCallInfo, NativeFn};
pub use buffer::{ArrayBufferData, DataBlock, ElementType, TypedArrayData};
pub use collections::{HashableValue, MapData, SetData};
pub use context::{ExecutionContext, PendingCompletion, PrivEnv, PrivEnvRef};
pub use coroutine::{AsyncGenRequest, CoroutineKind, GeneratorData, GeneratorState, ResumeKind};
pub use env::{BindingSlot, DeclarativeEnv, EnvKind, EnvRecord, FunctionEnv, GlobalEnv, ModuleEnv, ObjectEnv, ThisBinding};
pub use gc::{HeapStats, Marker};
pub use heap::{Heap, WellKnownSymbols};
pub use object::{
    BoundFunctionData, BuiltinFunctionData, Elements, FinalizationCell, IterationKind, JsObject,
    KeyListData, ObjectKind, Property, PropertyValue, ScriptFunctionData,
};
pub use promise::{PromiseData, PromiseState, Reaction, ReactionHandler};
pub use realm::{Intrinsics, Realm};
