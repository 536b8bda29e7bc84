//! The realm: global object, global environment and intrinsics.

use core_types::{EnvId, ErrorKind, ObjectId};

/// Handles to the intrinsic objects a realm is born with. Populated
/// once by the realm bootstrap and read-only afterwards.
#[derive(Debug, Clone)]
pub struct Intrinsics {
    /// `Object.prototype`
    pub object_prototype: ObjectId,
    /// `Function.prototype`
    pub function_prototype: ObjectId,
    /// `Array.prototype`
    pub array_prototype: ObjectId,
    /// `String.prototype`
    pub string_prototype: ObjectId,
    /// `Number.prototype`
    pub number_prototype: ObjectId,
    /// `Boolean.prototype`
    pub boolean_prototype: ObjectId,
    /// `Symbol.prototype`
    pub symbol_prototype: ObjectId,
    /// `BigInt.prototype`
    pub bigint_prototype: ObjectId,
    /// `Error.prototype`
    pub error_prototype: ObjectId,
    /// `TypeError.prototype`
    pub type_error_prototype: ObjectId,
    /// `RangeError.prototype`
    pub range_error_prototype: ObjectId,
    /// `ReferenceError.prototype`
    pub reference_error_prototype: ObjectId,
    /// `SyntaxError.prototype`
    pub syntax_error_prototype: ObjectId,
    /// `URIError.prototype`
    pub uri_error_prototype: ObjectId,
    /// `EvalError.prototype`
    pub eval_error_prototype: ObjectId,
    /// `Map.prototype`
    pub map_prototype: ObjectId,
    /// `Set.prototype`
    pub set_prototype: ObjectId,
    /// `WeakMap.prototype`
    pub weak_map_prototype: ObjectId,
    /// `WeakSet.prototype`
    pub weak_set_prototype: ObjectId,
    /// `WeakRef.prototype`
    pub weak_ref_prototype: ObjectId,
    /// `FinalizationRegistry.prototype`
    pub finalization_registry_prototype: ObjectId,
    /// `Promise.prototype`
    pub promise_prototype: ObjectId,
    /// `%IteratorPrototype%`
    pub iterator_prototype: ObjectId,
    /// `%AsyncIteratorPrototype%`
    pub async_iterator_prototype: ObjectId,
    /// `%ArrayIteratorPrototype%`
    pub array_iterator_prototype: ObjectId,
    /// `%MapIteratorPrototype%`
    pub map_iterator_prototype: ObjectId,
    /// `%SetIteratorPrototype%`
    pub set_iterator_prototype: ObjectId,
    /// `%GeneratorPrototype%`
    pub generator_prototype: ObjectId,
    /// `%AsyncGeneratorPrototype%`
    pub async_generator_prototype: ObjectId,
    /// `ArrayBuffer.prototype`
    pub array_buffer_prototype: ObjectId,
    /// Shared prototype of the typed-array views
    pub typed_array_prototype: ObjectId,
}

impl Intrinsics {
    /// The prototype used by errors of `kind`.
    pub fn error_prototype_for(&self, kind: ErrorKind) -> ObjectId {
        match kind {
            ErrorKind::TypeError => self.type_error_prototype,
            ErrorKind::RangeError => self.range_error_prototype,
            ErrorKind::ReferenceError => self.reference_error_prototype,
            ErrorKind::SyntaxError => self.syntax_error_prototype,
            ErrorKind::URIError => self.uri_error_prototype,
            ErrorKind::EvalError => self.eval_error_prototype,
            ErrorKind::InternalError => self.error_prototype,
        }
    }
}

/// A realm: one global scope with its intrinsics.
#[derive(Debug, Clone)]
pub struct Realm {
    /// The global object.
    pub global_object: ObjectId,
    /// The global environment record.
    pub global_env: EnvId,
    /// Intrinsic table.
    pub intrinsics: Intrinsics,
}
