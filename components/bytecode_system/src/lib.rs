//! Bytecode model for the Ferrite register VM.
//!
//! A compiled script or module is a [`BytecodeModule`]: a flat byte
//! buffer of variable-length instructions plus the side tables the
//! runtime needs to resolve operands (constants, binding names,
//! property references, scope groups, nested functions, private
//! names) and to unwind exceptions (try regions) and report lines
//! (line table).
//!
//! Instructions carry a 1-byte opcode followed by fixed-width
//! little-endian operands of five kinds:
//!
//! | operand kind  | width | meaning                              |
//! |---------------|-------|--------------------------------------|
//! | label         | 2     | signed branch offset, relative       |
//! | register      | 1     | read/write slot in the register file |
//! | small index   | 1     | argument/element index               |
//! | table index   | 2     | index into a module side table       |
//! | property ref  | 2     | index into the property-ref table    |

#![warn(clippy::all)]
#![deny(unsafe_code)]

mod constant;
mod disasm;
mod module;
mod opcode;
mod serialize;

pub use constant::Constant;
pub use disasm::disassemble;
pub use module::{
    Binding, BindingFlags, BindingRef, BytecodeModule, ExportEntry, FuncDecl, FunctionFlags,
    FunctionInfo, Group, ImportEntry, LineEntry, PrivateEnvInfo, TryRegion, TryRegionKind,
    NO_GROUP,
};
pub use opcode::{decode_instr, encode_instr, Instr, Label, Operand, Reg, TableKind};
