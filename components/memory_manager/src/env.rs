//! Environment-record storage.
//!
//! The five record kinds of the lexical chain. Only the data lives
//! here; the binding operations (lookup, initialization, the global
//! declaration checks) are in the `environments` crate.

use std::collections::{HashMap, HashSet};

use core_types::{EnvId, ObjectId, Value};

/// One binding slot of a declarative record.
#[derive(Debug, Clone)]
pub struct BindingSlot {
    /// `None` until initialized: reads fail with a reference error
    /// (the temporal dead zone).
    pub value: Option<Value>,
    /// Assignable after initialization.
    pub mutable: bool,
    /// Removable by `delete` (function-scope `var` in sloppy eval).
    pub deletable: bool,
    /// Assignment failures throw even in sloppy callers.
    pub strict: bool,
}

impl BindingSlot {
    /// An uninitialized `let`-style mutable binding.
    pub fn mutable() -> Self {
        Self {
            value: None,
            mutable: true,
            deletable: false,
            strict: false,
        }
    }

    /// An uninitialized `const`-style immutable binding.
    pub fn immutable(strict: bool) -> Self {
        Self {
            value: None,
            mutable: false,
            deletable: false,
            strict,
        }
    }

    /// A `var`-style binding, already initialized to `undefined`.
    pub fn var() -> Self {
        Self {
            value: Some(Value::Undefined),
            mutable: true,
            deletable: false,
            strict: false,
        }
    }
}

/// Bindings map shared by every declarative-flavoured record.
#[derive(Debug, Clone, Default)]
pub struct DeclarativeEnv {
    /// Name → slot.
    pub bindings: HashMap<String, BindingSlot>,
}

/// State of a function record's `this` slot.
#[derive(Debug, Clone)]
pub enum ThisBinding {
    /// Arrow function: delegate outward.
    Lexical,
    /// Derived constructor before `super()` returns.
    Uninitialized,
    /// Bound value.
    Initialized(Value),
}

/// Function environment record: declarative plus `this`, home object
/// and `new.target`.
#[derive(Debug, Clone)]
pub struct FunctionEnv {
    /// Bindings of the function scope.
    pub decl: DeclarativeEnv,
    /// `this` slot.
    pub this: ThisBinding,
    /// Home object for `super` references.
    pub home_object: Option<ObjectId>,
    /// `new.target` of the activation.
    pub new_target: Value,
}

/// Object environment record: bindings delegate to an object.
#[derive(Debug, Clone)]
pub struct ObjectEnv {
    /// Backing object.
    pub object: ObjectId,
    /// Created by `with`; affects unscopable handling.
    pub with_env: bool,
}

/// Global environment record: a declarative part for lexical
/// declarations paired with an object part for `var` and function
/// declarations.
#[derive(Debug, Clone)]
pub struct GlobalEnv {
    /// Lexical (`let`/`const`/`class`) bindings.
    pub decl: DeclarativeEnv,
    /// The global object backing `var` bindings.
    pub object: ObjectId,
    /// Names created as global `var`/function bindings.
    pub var_names: HashSet<String>,
}

/// Module environment record: declarative plus indirect import
/// bindings that read the exporting module's slot.
#[derive(Debug, Clone)]
pub struct ModuleEnv {
    /// Local bindings.
    pub decl: DeclarativeEnv,
    /// Import name → (exporting module's environment, exported local
    /// name).
    pub indirect: HashMap<String, (EnvId, String)>,
}

/// The record variants.
#[derive(Debug, Clone)]
pub enum EnvKind {
    /// Block and catch scopes.
    Declarative(DeclarativeEnv),
    /// Function activation scopes.
    Function(FunctionEnv),
    /// Object-backed (`with`) scopes.
    Object(ObjectEnv),
    /// The global scope pair.
    Global(GlobalEnv),
    /// Module top-level scopes.
    Module(ModuleEnv),
}

/// An environment record with its outer link.
#[derive(Debug, Clone)]
pub struct EnvRecord {
    /// Enclosing environment; `None` terminates the chain.
    pub outer: Option<EnvId>,
    /// Record payload.
    pub kind: EnvKind,
}

impl EnvRecord {
    /// A block scope.
    pub fn declarative(outer: Option<EnvId>) -> Self {
        Self {
            outer,
            kind: EnvKind::Declarative(DeclarativeEnv::default()),
        }
    }

    /// A function scope.
    pub fn function(outer: EnvId, this: ThisBinding, home_object: Option<ObjectId>, new_target: Value) -> Self {
        Self {
            outer: Some(outer),
            kind: EnvKind::Function(FunctionEnv {
                decl: DeclarativeEnv::default(),
                this,
                home_object,
                new_target,
            }),
        }
    }

    /// The declarative part of this record, when it has one.
    pub fn decl(&self) -> Option<&DeclarativeEnv> {
        match &self.kind {
            EnvKind::Declarative(d) => Some(d),
            EnvKind::Function(f) => Some(&f.decl),
            EnvKind::Global(g) => Some(&g.decl),
            EnvKind::Module(m) => Some(&m.decl),
            EnvKind::Object(_) => None,
        }
    }

    /// Mutable access to the declarative part.
    pub fn decl_mut(&mut self) -> Option<&mut DeclarativeEnv> {
        match &mut self.kind {
            EnvKind::Declarative(d) => Some(d),
            EnvKind::Function(f) => Some(&mut f.decl),
            EnvKind::Global(g) => Some(&mut g.decl),
            EnvKind::Module(m) => Some(&mut m.decl),
            EnvKind::Object(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_var_slot_is_initialized() {
        assert!(BindingSlot::var().value.is_some());
        assert!(BindingSlot::mutable().value.is_none());
    }

    #[test]
    fn test_decl_accessor_covers_kinds() {
        let d = EnvRecord::declarative(None);
        assert!(d.decl().is_some());
        let f = EnvRecord::function(
            EnvId(0),
            ThisBinding::Initialized(Value::Undefined),
            None,
            Value::Undefined,
        );
        assert!(f.decl().is_some());
        let o = EnvRecord {
            outer: None,
            kind: EnvKind::Object(ObjectEnv {
                object: ObjectId(0),
                with_env: false,
            }),
        };
        assert!(o.decl().is_none());
    }
}
