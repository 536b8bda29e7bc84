//! Instruction set and byte-level encoding.
//!
//! Every instruction is declared once in the [`define_instrs!`] table
//! with its opcode byte, mnemonic and operand signature; the enum,
//! encoder, decoder and operand metadata are all derived from that
//! single definition.
//!
//! Branch labels are signed 16-bit offsets relative to the end of the
//! branching instruction.

use std::fmt;

/// A register operand: an index into the frame's register file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Reg(pub u8);

/// A resolved branch offset, relative to the end of the instruction.
pub type Label = i16;

/// Which side table a 16-bit table operand resolves against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableKind {
    /// Constant pool
    Const,
    /// Binding-reference table (binding names)
    BindingRef,
    /// Property-reference table
    PropRef,
    /// Binding-group table
    BindingGroup,
    /// Function-declaration-group table
    FuncGroup,
    /// Nested-function table
    Function,
    /// Private-name table
    PrivateName,
    /// Private-environment table
    PrivateEnv,
}

/// A decoded operand, for the disassembler.
#[derive(Debug, Clone, Copy)]
pub enum Operand {
    /// Register slot
    Reg(Reg),
    /// Small unsigned immediate (argument counts, element indices)
    Small(u8),
    /// Small signed immediate
    Imm(i8),
    /// Branch offset
    Label(Label),
    /// Index into a module side table
    Table(TableKind, u16),
}

mod kind {
    //! Operand kind markers used by the instruction table.
    pub(super) type ReprReg = super::Reg;
    pub(super) type ReprSml = u8;
    pub(super) type ReprImm = i8;
    pub(super) type ReprLbl = super::Label;
    pub(super) type ReprTbl = u16;
}

macro_rules! op_repr {
    (reg) => { kind::ReprReg };
    (sml) => { kind::ReprSml };
    (imm) => { kind::ReprImm };
    (lbl) => { kind::ReprLbl };
    (cst) => { kind::ReprTbl };
    (brf) => { kind::ReprTbl };
    (prf) => { kind::ReprTbl };
    (grp) => { kind::ReprTbl };
    (fng) => { kind::ReprTbl };
    (fun) => { kind::ReprTbl };
    (pvn) => { kind::ReprTbl };
    (pve) => { kind::ReprTbl };
}

macro_rules! op_width {
    (reg) => { 1usize };
    (sml) => { 1usize };
    (imm) => { 1usize };
    (lbl) => { 2usize };
    (cst) => { 2usize };
    (brf) => { 2usize };
    (prf) => { 2usize };
    (grp) => { 2usize };
    (fng) => { 2usize };
    (fun) => { 2usize };
    (pvn) => { 2usize };
    (pve) => { 2usize };
}

macro_rules! op_encode {
    ($buf:ident, reg, $v:expr) => { $buf.push($v.0) };
    ($buf:ident, sml, $v:expr) => { $buf.push($v) };
    ($buf:ident, imm, $v:expr) => { $buf.push($v as u8) };
    ($buf:ident, lbl, $v:expr) => { $buf.extend_from_slice(&$v.to_le_bytes()) };
    ($buf:ident, cst, $v:expr) => { $buf.extend_from_slice(&$v.to_le_bytes()) };
    ($buf:ident, brf, $v:expr) => { $buf.extend_from_slice(&$v.to_le_bytes()) };
    ($buf:ident, prf, $v:expr) => { $buf.extend_from_slice(&$v.to_le_bytes()) };
    ($buf:ident, grp, $v:expr) => { $buf.extend_from_slice(&$v.to_le_bytes()) };
    ($buf:ident, fng, $v:expr) => { $buf.extend_from_slice(&$v.to_le_bytes()) };
    ($buf:ident, fun, $v:expr) => { $buf.extend_from_slice(&$v.to_le_bytes()) };
    ($buf:ident, pvn, $v:expr) => { $buf.extend_from_slice(&$v.to_le_bytes()) };
    ($buf:ident, pve, $v:expr) => { $buf.extend_from_slice(&$v.to_le_bytes()) };
}

macro_rules! op_decode {
    ($code:ident, $at:ident, reg) => {{
        let v = Reg($code[$at]);
        $at += 1;
        v
    }};
    ($code:ident, $at:ident, sml) => {{
        let v = $code[$at];
        $at += 1;
        v
    }};
    ($code:ident, $at:ident, imm) => {{
        let v = $code[$at] as i8;
        $at += 1;
        v
    }};
    ($code:ident, $at:ident, lbl) => {{
        let v = i16::from_le_bytes([$code[$at], $code[$at + 1]]);
        $at += 2;
        v
    }};
    ($code:ident, $at:ident, $_other:ident) => {{
        let v = u16::from_le_bytes([$code[$at], $code[$at + 1]]);
        $at += 2;
        v
    }};
}

macro_rules! op_operand {
    (reg, $v:expr) => { Operand::Reg($v) };
    (sml, $v:expr) => { Operand::Small($v) };
    (imm, $v:expr) => { Operand::Imm($v) };
    (lbl, $v:expr) => { Operand::Label($v) };
    (cst, $v:expr) => { Operand::Table(TableKind::Const, $v) };
    (brf, $v:expr) => { Operand::Table(TableKind::BindingRef, $v) };
    (prf, $v:expr) => { Operand::Table(TableKind::PropRef, $v) };
    (grp, $v:expr) => { Operand::Table(TableKind::BindingGroup, $v) };
    (fng, $v:expr) => { Operand::Table(TableKind::FuncGroup, $v) };
    (fun, $v:expr) => { Operand::Table(TableKind::Function, $v) };
    (pvn, $v:expr) => { Operand::Table(TableKind::PrivateName, $v) };
    (pve, $v:expr) => { Operand::Table(TableKind::PrivateEnv, $v) };
}

macro_rules! define_instrs {
    ( $( $tag:literal $name:ident $mnemonic:literal { $( $field:ident : $fk:ident ),* } ),+ $(,)? ) => {
        /// A decoded bytecode instruction.
        ///
        /// The serialized form is the opcode byte followed by each
        /// operand in declaration order, little-endian.
        #[derive(Debug, Clone, PartialEq)]
        pub enum Instr {
            $(
                #[allow(missing_docs)]
                $name { $( $field: op_repr!($fk) ),* },
            )+
        }

        impl Instr {
            /// The opcode byte.
            pub fn tag(&self) -> u8 {
                match self {
                    $( Instr::$name { .. } => $tag, )+
                }
            }

            /// The mnemonic used by the disassembler.
            pub fn mnemonic(&self) -> &'static str {
                match self {
                    $( Instr::$name { .. } => $mnemonic, )+
                }
            }

            /// Encoded width in bytes, including the opcode byte.
            pub fn width(&self) -> usize {
                match self {
                    $( Instr::$name { .. } => 1usize $( + op_width!($fk) )*, )+
                }
            }

            /// Operand list with table-kind information, for the
            /// disassembler.
            pub fn operands(&self) -> Vec<Operand> {
                match self {
                    $(
                        #[allow(unused_variables)]
                        Instr::$name { $( $field ),* } => {
                            vec![ $( op_operand!($fk, *$field) ),* ]
                        }
                    )+
                }
            }
        }

        /// Append the encoded form of `instr` to `buf`.
        pub fn encode_instr(buf: &mut Vec<u8>, instr: &Instr) {
            match instr {
                $(
                    #[allow(unused_variables)]
                    Instr::$name { $( $field ),* } => {
                        buf.push($tag);
                        $( op_encode!(buf, $fk, *$field); )*
                    }
                )+
            }
        }

        /// Decode the instruction at `offset`. Returns the instruction
        /// and the offset of the next one, or `None` for an unknown
        /// opcode byte or a truncated buffer.
        pub fn decode_instr(code: &[u8], offset: usize) -> Option<(Instr, usize)> {
            let tag = *code.get(offset)?;
            let mut at = offset + 1;
            let instr = match tag {
                $(
                    $tag => {
                        let need = 0usize $( + op_width!($fk) )*;
                        if at + need > code.len() {
                            return None;
                        }
                        Instr::$name {
                            $( $field: op_decode!(code, at, $fk) ),*
                        }
                    }
                )+
                _ => return None,
            };
            Some((instr, at))
        }
    };
}

define_instrs! {
    // Constants and moves
    0x01 LoadConst "load_const" { dst: reg, idx: cst },
    0x02 LoadUndefined "load_undefined" { dst: reg },
    0x03 LoadNull "load_null" { dst: reg },
    0x04 LoadTrue "load_true" { dst: reg },
    0x05 LoadFalse "load_false" { dst: reg },
    0x06 LoadSmallInt "load_small_int" { dst: reg, value: imm },
    0x07 Move "move" { dst: reg, src: reg },

    // Bindings and scopes
    0x08 LoadBinding "load_binding" { dst: reg, bref: brf },
    0x09 StoreBinding "store_binding" { bref: brf, src: reg },
    0x0a InitBinding "init_binding" { bref: brf, src: reg },
    0x0b DeleteBinding "delete_binding" { dst: reg, bref: brf },
    0x0c TypeofBinding "typeof_binding" { dst: reg, bref: brf },
    0x0d PushScope "push_scope" { group: grp },
    0x0e PopScope "pop_scope" {},
    0x0f InstantiateFunctions "instantiate_functions" { group: fng },
    0x10 LoadThis "load_this" { dst: reg },
    0x11 LoadNewTarget "load_new_target" { dst: reg },

    // Properties
    0x12 GetProp "get_prop" { dst: reg, obj: reg, pref: prf },
    0x13 SetProp "set_prop" { obj: reg, pref: prf, src: reg },
    0x14 DefineProp "define_prop" { obj: reg, pref: prf, src: reg },
    0x15 GetElem "get_elem" { dst: reg, obj: reg, key: reg },
    0x16 SetElem "set_elem" { obj: reg, key: reg, src: reg },
    0x17 DefineElem "define_elem" { obj: reg, key: reg, src: reg },
    0x18 DeleteProp "delete_prop" { dst: reg, obj: reg, pref: prf },
    0x19 DeleteElem "delete_elem" { dst: reg, obj: reg, key: reg },
    0x1a GetPrivate "priv_get" { dst: reg, obj: reg, pname: pvn },
    0x1b SetPrivate "priv_set" { obj: reg, pname: pvn, src: reg },
    0x1c DefinePrivateField "priv_field_add" { obj: reg, pname: pvn, src: reg },
    0x1d HasPrivate "has_priv" { dst: reg, obj: reg, pname: pvn },
    0x1e DefineMethod "define_method" { obj: reg, key: reg, func: reg, kind: sml },
    0x1f DefinePrivateMethod "priv_method_add" { obj: reg, pname: pvn, func: reg, kind: sml },

    // Calls
    0x20 Call "call" { dst: reg, func: reg, this: reg, argv: reg, argc: sml },
    0x21 CallVarargs "call_varargs" { dst: reg, func: reg, this: reg, args: reg },
    0x22 TailCall "tail_call" { func: reg, this: reg, argv: reg, argc: sml },
    0x23 Construct "construct" { dst: reg, func: reg, argv: reg, argc: sml },
    0x24 ConstructVarargs "construct_varargs" { dst: reg, func: reg, args: reg },
    0x25 SuperCall "super_call" { dst: reg, argv: reg, argc: sml },
    0x26 GetSuperProp "get_super_prop" { dst: reg, key: reg },
    0x27 Return "return" { src: reg },

    // Binary operators
    0x28 Add "add" { dst: reg, lhs: reg, rhs: reg },
    0x29 Sub "sub" { dst: reg, lhs: reg, rhs: reg },
    0x2a Mul "mul" { dst: reg, lhs: reg, rhs: reg },
    0x2b Div "div" { dst: reg, lhs: reg, rhs: reg },
    0x2c Mod "mod" { dst: reg, lhs: reg, rhs: reg },
    0x2d Exp "exp" { dst: reg, lhs: reg, rhs: reg },
    0x2e BitAnd "bit_and" { dst: reg, lhs: reg, rhs: reg },
    0x2f BitOr "bit_or" { dst: reg, lhs: reg, rhs: reg },
    0x30 BitXor "bit_xor" { dst: reg, lhs: reg, rhs: reg },
    0x31 Shl "shl" { dst: reg, lhs: reg, rhs: reg },
    0x32 Shr "shr" { dst: reg, lhs: reg, rhs: reg },
    0x33 UShr "ushr" { dst: reg, lhs: reg, rhs: reg },
    0x34 Eq "eq" { dst: reg, lhs: reg, rhs: reg },
    0x35 Ne "ne" { dst: reg, lhs: reg, rhs: reg },
    0x36 StrictEq "strict_eq" { dst: reg, lhs: reg, rhs: reg },
    0x37 StrictNe "strict_ne" { dst: reg, lhs: reg, rhs: reg },
    0x38 Lt "lt" { dst: reg, lhs: reg, rhs: reg },
    0x39 Le "le" { dst: reg, lhs: reg, rhs: reg },
    0x3a Gt "gt" { dst: reg, lhs: reg, rhs: reg },
    0x3b Ge "ge" { dst: reg, lhs: reg, rhs: reg },
    0x3c InstanceOf "instance_of" { dst: reg, lhs: reg, rhs: reg },
    0x3d In "in" { dst: reg, key: reg, obj: reg },

    // Unary operators
    0x3e Neg "neg" { dst: reg, src: reg },
    0x3f ToNumber "to_number" { dst: reg, src: reg },
    0x40 BitNot "bit_not" { dst: reg, src: reg },
    0x41 Not "not" { dst: reg, src: reg },
    0x42 TypeOf "type_of" { dst: reg, src: reg },
    0x43 Inc "inc" { dst: reg, src: reg },
    0x44 Dec "dec" { dst: reg, src: reg },

    // Branches
    0x45 Jump "jump" { off: lbl },
    0x46 JumpIfTrue "jump_if_true" { cond: reg, off: lbl },
    0x47 JumpIfFalse "jump_if_false" { cond: reg, off: lbl },
    0x48 JumpIfUndefined "jump_if_undefined" { src: reg, off: lbl },
    0x49 JumpIfNullish "jump_if_nullish" { src: reg, off: lbl },

    // Literals
    0x4a NewObject "new_object" { dst: reg },
    0x4b NewArray "new_array" { dst: reg },
    0x4c ArrayPush "array_push" { arr: reg, src: reg },
    0x4d ArrayHole "array_hole" { arr: reg },
    0x4e ArraySpread "array_spread" { arr: reg, src: reg },
    0x4f CopyDataProps "copy_data_props" { obj: reg, src: reg, excl_start: reg, excl_count: sml },
    0x50 NewClosure "new_closure" { dst: reg, func: fun },

    // Iteration
    0x51 GetIterator "get_iterator" { dst: reg, src: reg },
    0x52 IteratorNext "iterator_next" { dst: reg, iter: reg },
    0x53 ForOfNext "for_of_next" { dst: reg, iter: reg, off: lbl },
    0x54 IteratorClose "iterator_close" { iter: reg },
    0x55 ForInInit "for_in_init" { dst: reg, src: reg },
    0x56 ForInNext "for_in_next" { dst: reg, iter: reg, off: lbl },
    0x57 GetAsyncIterator "get_async_iterator" { dst: reg, src: reg },

    // Exceptions
    0x58 Throw "throw" { src: reg },
    0x59 FinallyEnd "finally_end" {},

    // Suspension points
    0x5a Yield "yield" { dst: reg, src: reg },
    0x5b Await "await" { dst: reg, src: reg },
    0x5c AsyncForStep "async_for_step" { dst: reg, src: reg },

    // Classes and private environments
    0x5d PushPrivateEnv "push_priv_env" { penv: pve },
    0x5e PopPrivateEnv "pop_priv_env" {},
    0x5f SetPrototype "set_prototype" { obj: reg, proto: reg },
    0x60 SetHomeObject "set_home_object" { func: reg, obj: reg },

    // Arguments
    0x61 Arguments "arguments" { dst: reg },
    0x62 LoadArg "load_arg" { dst: reg, index: sml },
    0x63 RestArgs "rest_args" { dst: reg, index: sml },

    // Misc
    0x64 Eval "eval" { dst: reg, src: reg },
    0x65 Debugger "debugger" {},
    0x66 ToNumeric "to_numeric" { dst: reg, src: reg },
}

impl fmt::Display for Instr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.mnemonic())?;
        for op in self.operands() {
            match op {
                Operand::Reg(r) => write!(f, " r{}", r.0)?,
                Operand::Small(v) => write!(f, " {}", v)?,
                Operand::Imm(v) => write!(f, " {}", v)?,
                Operand::Label(off) => write!(f, " {:+}", off)?,
                Operand::Table(_, idx) => write!(f, " [{}]", idx)?,
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_decode_roundtrip() {
        let instrs = vec![
            Instr::LoadConst { dst: Reg(0), idx: 513 },
            Instr::LoadSmallInt { dst: Reg(1), value: -5 },
            Instr::Add { dst: Reg(2), lhs: Reg(0), rhs: Reg(1) },
            Instr::Jump { off: -7 },
            Instr::Call { dst: Reg(0), func: Reg(3), this: Reg(4), argv: Reg(5), argc: 2 },
            Instr::Return { src: Reg(2) },
        ];
        let mut buf = Vec::new();
        for i in &instrs {
            encode_instr(&mut buf, i);
        }
        let mut at = 0;
        let mut out = Vec::new();
        while at < buf.len() {
            let (i, next) = decode_instr(&buf, at).expect("decodes");
            assert_eq!(next - at, i.width());
            out.push(i);
            at = next;
        }
        assert_eq!(instrs, out);
    }

    #[test]
    fn test_unknown_opcode_rejected() {
        assert!(decode_instr(&[0xff], 0).is_none());
    }

    #[test]
    fn test_truncated_operand_rejected() {
        // load_const needs 3 operand bytes
        assert!(decode_instr(&[0x01, 0x00], 0).is_none());
    }

    #[test]
    fn test_label_is_signed() {
        let mut buf = Vec::new();
        encode_instr(&mut buf, &Instr::Jump { off: -300 });
        let (i, _) = decode_instr(&buf, 0).unwrap();
        assert_eq!(i, Instr::Jump { off: -300 });
    }

    #[test]
    fn test_display() {
        let i = Instr::GetProp { dst: Reg(1), obj: Reg(2), pref: 7 };
        assert_eq!(i.to_string(), "get_prop r1 r2 [7]");
    }
}
