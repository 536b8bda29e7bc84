//! Core JavaScript value types shared by every engine component.
//!
//! This crate provides the foundational types for the Ferrite runtime:
//! the tagged [`Value`] representation, heap handles, property keys,
//! the ok-or-thrown [`Completion`] result, and source locations.
//!
//! # Overview
//!
//! - [`Value`] - Tagged representation of JavaScript values
//! - [`PropertyKey`] - Canonicalized property keys (index/string/symbol/private)
//! - [`Completion`] - result type used engine-wide for throwing operations
//! - [`JsError`] - Host-level errors with kind and source position
//! - [`SourcePosition`] / [`StackFrame`] - Source code locations
//!
//! Strings, symbols, big integers and private names are immutable leaf
//! primitives shared by reference counting; objects and environment
//! records live in the garbage-collected arena and are addressed by
//! [`ObjectId`] / [`EnvId`] handles.

#![warn(clippy::all)]
#![deny(unsafe_code)]

mod completion;
mod error;
mod handle;
mod key;
mod number;
mod source;
mod string;
mod value;

pub use completion::{Completion, Thrown};
pub use error::{ErrorKind, JsError};
pub use handle::{EnvId, ObjectId};
pub use key::PropertyKey;
pub use number::{format_f64, parse_number_literal};
pub use source::{SourcePosition, StackFrame};
pub use string::{JsString, JsStringRef, JsSymbol, JsSymbolRef, PrivateName, PrivateNameRef};
pub use value::Value;
