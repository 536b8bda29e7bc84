//! Reference-counted data blocks and the buffer-view payloads.
//!
//! Data blocks live outside the GC arena because they may be shared
//! across agents or owned by the embedder; the sweeper drops the
//! engine's reference but never frees externally owned storage.

use std::cell::RefCell;
use std::rc::Rc;

/// Raw backing storage for array buffers.
#[derive(Debug)]
pub struct DataBlock {
    bytes: RefCell<Vec<u8>>,
    /// Owned by the embedder; contents outlive the engine's interest.
    pub external: bool,
}

impl DataBlock {
    /// Allocate a zero-filled block.
    pub fn new(len: usize) -> Rc<Self> {
        Rc::new(Self {
            bytes: RefCell::new(vec![0; len]),
            external: false,
        })
    }

    /// Wrap embedder-provided contents.
    pub fn external(bytes: Vec<u8>) -> Rc<Self> {
        Rc::new(Self {
            bytes: RefCell::new(bytes),
            external: true,
        })
    }

    /// Block length in bytes.
    pub fn len(&self) -> usize {
        self.bytes.borrow().len()
    }

    /// Whether the block is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Read a byte range; `None` when out of bounds.
    pub fn read(&self, offset: usize, len: usize) -> Option<Vec<u8>> {
        let b = self.bytes.borrow();
        b.get(offset..offset + len).map(|s| s.to_vec())
    }

    /// Write a byte range; false when out of bounds.
    pub fn write(&self, offset: usize, data: &[u8]) -> bool {
        let mut b = self.bytes.borrow_mut();
        match b.get_mut(offset..offset + data.len()) {
            Some(s) => {
                s.copy_from_slice(data);
                true
            }
            None => false,
        }
    }
}

/// ArrayBuffer payload.
#[derive(Debug, Clone)]
pub struct ArrayBufferData {
    /// Backing block; `None` once detached.
    pub block: Option<Rc<DataBlock>>,
    /// Byte length at construction.
    pub byte_length: usize,
    /// Shared buffers may not be detached.
    pub shared: bool,
}

impl ArrayBufferData {
    /// Whether the buffer has been detached.
    pub fn is_detached(&self) -> bool {
        self.block.is_none()
    }
}

/// Element type of an integer-indexed view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElementType {
    /// 8-bit signed
    Int8,
    /// 8-bit unsigned
    Uint8,
    /// 8-bit unsigned, clamped stores
    Uint8Clamped,
    /// 16-bit signed
    Int16,
    /// 16-bit unsigned
    Uint16,
    /// 32-bit signed
    Int32,
    /// 32-bit unsigned
    Uint32,
    /// 32-bit float
    Float32,
    /// 64-bit float
    Float64,
}

impl ElementType {
    /// Bytes per element.
    pub fn size(self) -> usize {
        match self {
            ElementType::Int8 | ElementType::Uint8 | ElementType::Uint8Clamped => 1,
            ElementType::Int16 | ElementType::Uint16 => 2,
            ElementType::Int32 | ElementType::Uint32 | ElementType::Float32 => 4,
            ElementType::Float64 => 8,
        }
    }
}

/// Integer-indexed (typed array) view payload.
#[derive(Debug, Clone)]
pub struct TypedArrayData {
    /// Viewed buffer object.
    pub buffer: core_types::ObjectId,
    /// Element type.
    pub element_type: ElementType,
    /// View offset in bytes.
    pub byte_offset: usize,
    /// Number of elements.
    pub length: usize,
}

impl TypedArrayData {
    /// Read element `index` from `block`, honouring offset and
    /// element type. `None` when out of range.
    pub fn read_element(&self, block: &DataBlock, index: usize) -> Option<f64> {
        if index >= self.length {
            return None;
        }
        let size = self.element_type.size();
        let bytes = block.read(self.byte_offset + index * size, size)?;
        Some(match self.element_type {
            ElementType::Int8 => bytes[0] as i8 as f64,
            ElementType::Uint8 | ElementType::Uint8Clamped => bytes[0] as f64,
            ElementType::Int16 => i16::from_le_bytes([bytes[0], bytes[1]]) as f64,
            ElementType::Uint16 => u16::from_le_bytes([bytes[0], bytes[1]]) as f64,
            ElementType::Int32 => {
                i32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as f64
            }
            ElementType::Uint32 => {
                u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as f64
            }
            ElementType::Float32 => {
                f32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as f64
            }
            ElementType::Float64 => f64::from_le_bytes(bytes.try_into().ok()?),
        })
    }

    /// Store `value` at element `index` with the type's conversion.
    /// Out-of-range stores are silently ignored.
    pub fn write_element(&self, block: &DataBlock, index: usize, value: f64) {
        if index >= self.length {
            return;
        }
        let size = self.element_type.size();
        let offset = self.byte_offset + index * size;
        let to_int = |v: f64| -> i64 {
            if v.is_nan() || v.is_infinite() {
                0
            } else {
                v.trunc() as i64
            }
        };
        match self.element_type {
            ElementType::Int8 => {
                block.write(offset, &[(to_int(value) as i8) as u8]);
            }
            ElementType::Uint8 => {
                block.write(offset, &[to_int(value) as u8]);
            }
            ElementType::Uint8Clamped => {
                let clamped = if value.is_nan() {
                    0.0
                } else {
                    value.round().clamp(0.0, 255.0)
                };
                block.write(offset, &[clamped as u8]);
            }
            ElementType::Int16 => {
                block.write(offset, &(to_int(value) as i16).to_le_bytes());
            }
            ElementType::Uint16 => {
                block.write(offset, &(to_int(value) as u16).to_le_bytes());
            }
            ElementType::Int32 => {
                block.write(offset, &(to_int(value) as i32).to_le_bytes());
            }
            ElementType::Uint32 => {
                block.write(offset, &(to_int(value) as u32).to_le_bytes());
            }
            ElementType::Float32 => {
                block.write(offset, &(value as f32).to_le_bytes());
            }
            ElementType::Float64 => {
                block.write(offset, &value.to_le_bytes());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_types::ObjectId;

    fn view(block_len: usize, ty: ElementType, len: usize) -> (Rc<DataBlock>, TypedArrayData) {
        let block = DataBlock::new(block_len);
        let ta = TypedArrayData {
            buffer: ObjectId(0),
            element_type: ty,
            byte_offset: 0,
            length: len,
        };
        (block, ta)
    }

    #[test]
    fn test_int32_roundtrip() {
        let (block, ta) = view(16, ElementType::Int32, 4);
        ta.write_element(&block, 1, -5.0);
        assert_eq!(ta.read_element(&block, 1), Some(-5.0));
    }

    #[test]
    fn test_out_of_range_write_ignored() {
        let (block, ta) = view(4, ElementType::Int32, 1);
        ta.write_element(&block, 9, 1.0);
        assert_eq!(ta.read_element(&block, 0), Some(0.0));
    }

    #[test]
    fn test_uint8_clamped() {
        let (block, ta) = view(4, ElementType::Uint8Clamped, 4);
        ta.write_element(&block, 0, 300.0);
        ta.write_element(&block, 1, -10.0);
        ta.write_element(&block, 2, f64::NAN);
        assert_eq!(ta.read_element(&block, 0), Some(255.0));
        assert_eq!(ta.read_element(&block, 1), Some(0.0));
        assert_eq!(ta.read_element(&block, 2), Some(0.0));
    }

    #[test]
    fn test_nan_wraps_to_zero_for_ints() {
        let (block, ta) = view(4, ElementType::Int32, 1);
        ta.write_element(&block, 0, f64::NAN);
        assert_eq!(ta.read_element(&block, 0), Some(0.0));
    }
}
