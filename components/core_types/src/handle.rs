//! Handles into the garbage-collected arena.
//!
//! Objects and environment records are addressed by index handles
//! rather than references, so the collector can move through the whole
//! graph without borrow gymnastics and native code never holds raw
//! pointers into the heap.

use std::fmt;

/// Handle to a heap-allocated JavaScript object.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId(pub u32);

/// Handle to a heap-allocated environment record.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct EnvId(pub u32);

impl fmt::Debug for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "obj#{}", self.0)
    }
}

impl fmt::Debug for EnvId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "env#{}", self.0)
    }
}

impl ObjectId {
    /// Index into the heap's object slots.
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl EnvId {
    /// Index into the heap's environment slots.
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handle_debug_format() {
        assert_eq!(format!("{:?}", ObjectId(3)), "obj#3");
        assert_eq!(format!("{:?}", EnvId(7)), "env#7");
    }
}
