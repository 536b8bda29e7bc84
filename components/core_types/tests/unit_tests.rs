//! Test runner for the unit test modules.

#[path = "unit/test_value.rs"]
mod test_value;

#[path = "unit/test_roundtrip.rs"]
mod test_roundtrip;
