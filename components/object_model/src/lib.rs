//! The object protocol: the nine essential internal methods and the
//! coercion operations built on them.
//!
//! Every property access in the engine funnels through [`protocol`],
//! which dispatches on the object's kind: the ordinary algorithms,
//! the array variant with its `length` coupling, integer-indexed
//! views over buffers, and proxies with their trap invariants.
//! Accessor getters, setters and proxy traps re-enter the running
//! interpreter through the `Agent` seam.

#![warn(clippy::all)]
#![deny(unsafe_code)]

mod array;
mod descriptor;
mod operations;
mod ordinary;
mod protocol;
mod proxy;
#[cfg(test)]
mod test_agent;
mod typed_array;

pub use descriptor::PropertyDescriptor;
pub use operations::{
    add_values, array_create, create_data_property, equals_abstract, f64_to_int32, f64_to_uint32,
    get_iterator, get_method, get_v, instance_of, is_callable, iterator_close, iterator_next,
    less_than, numeric_binary_op, numeric_bit_not, numeric_increment, numeric_negate, to_boolean,
    to_int32, to_number, to_numeric, to_object_or_throw, to_primitive, to_property_key, to_string,
    to_uint32, type_of_value, IteratorRecord, Numeric, NumericOp, PrimitiveHint,
};
pub use ordinary::validate_descriptor;
pub use protocol::{
    define_own_property, delete_property, get, get_own_property, get_prototype_of, has_property,
    is_extensible, own_property_keys, prevent_extensions, set, set_prototype_of,
};
pub use proxy::{descriptor_from_object, descriptor_to_object};
