//! The bytecode interpreter.
//!
//! [`Vm`] owns the heap, the realm, the context stack and the job
//! queues; it is the one implementor of the `Agent` seam everything
//! else calls back through. The dispatch loop executes instructions
//! straight from the module's byte buffer, unwinds exceptions through
//! the try-region table, and parks whole frames on `yield`/`await`
//! for the coroutine machinery to resume.

#![warn(clippy::all)]
#![deny(unsafe_code)]

mod cache;
mod calls;
mod dispatch;
mod generator;
mod script;
mod vm;

pub use vm::Vm;
