//! The compiled bytecode module and its side tables.
//!
//! One `BytecodeModule` holds everything the runtime needs to execute
//! a script or module: the instruction buffer, the constant pool, the
//! binding and property-reference tables the operands index into, the
//! scope groups used by `push_scope`/`instantiate_functions`, nested
//! function metadata, private names, the try-region table and a line
//! table.

use crate::constant::Constant;
use crate::opcode::Reg;

/// Binding attribute bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BindingFlags(pub u8);

impl BindingFlags {
    /// Immutable binding (`const`); assignment throws.
    pub const CONST: u8 = 1;
    /// Var-style binding: initialized to `undefined` at scope push
    /// instead of entering the dead zone.
    pub const VAR: u8 = 2;
    /// Seeded from the enclosing environment at scope push (loop
    /// per-iteration copies).
    pub const INHERIT: u8 = 4;
    /// Binding participates in strict-mode assignment checks.
    pub const STRICT: u8 = 8;

    /// Whether a flag bit is set.
    pub fn has(self, bit: u8) -> bool {
        self.0 & bit != 0
    }
}

/// A row of the binding-reference table: the name an instruction
/// operand resolves through the environment chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindingRef {
    /// Binding name
    pub name: String,
}

/// A row of the binding table: one declared binding inside some
/// lexical scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Binding {
    /// Index into the binding-reference table (the name).
    pub bref: u16,
    /// Attribute bits.
    pub flags: BindingFlags,
}

/// A contiguous range into the binding or function-declaration table;
/// one group per lexical scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Group {
    /// First row index
    pub start: u32,
    /// Number of rows
    pub len: u32,
}

/// A function declaration to instantiate when its scope is entered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FuncDecl {
    /// Index into the nested-function table
    pub func: u16,
    /// Binding (by reference-table index) receiving the closure
    pub bref: u16,
}

/// Per-function flag bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FunctionFlags(pub u16);

impl FunctionFlags {
    /// Strict-mode code.
    pub const STRICT: u16 = 1 << 0;
    /// Arrow function: no own `this`, `arguments` or `new.target`.
    pub const ARROW: u16 = 1 << 1;
    /// Method shorthand; can use `super` property access.
    pub const METHOD: u16 = 1 << 2;
    /// Class constructor; must be invoked with `new`.
    pub const CLASS_CTOR: u16 = 1 << 3;
    /// Derived class constructor; `this` is uninitialized until
    /// `super()` returns.
    pub const DERIVED_CTOR: u16 = 1 << 4;
    /// Generator function.
    pub const GENERATOR: u16 = 1 << 5;
    /// Async function.
    pub const ASYNC: u16 = 1 << 6;
    /// Has parameter default/rest expressions.
    pub const PARAM_EXPRS: u16 = 1 << 7;
    /// Body references `arguments`.
    pub const NEEDS_ARGUMENTS: u16 = 1 << 8;
    /// Needs a home object for `super` references.
    pub const NEEDS_HOME: u16 = 1 << 9;

    /// Whether a flag bit is set.
    pub fn has(self, bit: u16) -> bool {
        self.0 & bit != 0
    }
}

/// Sentinel for "no group" in [`FunctionInfo`].
pub const NO_GROUP: u16 = u16::MAX;

/// Metadata for one compiled function.
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionInfo {
    /// Function name; empty for anonymous functions.
    pub name: String,
    /// Declared parameter count (the `length` property).
    pub param_count: u8,
    /// Flag bits.
    pub flags: FunctionFlags,
    /// Byte offset of the first instruction.
    pub code_start: u32,
    /// Length of the function's code in bytes.
    pub code_len: u32,
    /// Register-file size.
    pub register_count: u16,
    /// Binding group for the function's top-level scope, or
    /// [`NO_GROUP`].
    pub scope_group: u16,
    /// Function-declaration group instantiated at entry, or
    /// [`NO_GROUP`].
    pub func_group: u16,
    /// Source line of the function header.
    pub line: u32,
}

/// Kind of a try region: a catch handler receiving the thrown value,
/// or a finally handler that re-raises the pending completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TryRegionKind {
    /// Catch clause; the thrown value lands in the register.
    Catch(Reg),
    /// Finally block compiled as an any-completion handler.
    Finally,
}

/// One row of the try-region table. Regions are searched innermost
/// first (the emitter appends inner regions before outer ones).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TryRegion {
    /// First protected byte offset (inclusive).
    pub start: u32,
    /// Last protected byte offset (exclusive).
    pub end: u32,
    /// Handler entry offset.
    pub handler: u32,
    /// Catch or finally.
    pub kind: TryRegionKind,
    /// Lexical-scope depth at region entry; unwinding pops back to it.
    pub scope_depth: u16,
    /// Private-environment depth at region entry.
    pub priv_depth: u16,
}

/// Private names declared by one class body, as indices into the
/// private-name table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrivateEnvInfo {
    /// Private-name table indices introduced by this environment.
    pub names: Vec<u16>,
}

/// One `import` binding of a module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportEntry {
    /// Requested module specifier.
    pub specifier: String,
    /// Name exported by the requested module; `"*"` for a namespace
    /// import, `"default"` for the default binding.
    pub import_name: String,
    /// Local binding name.
    pub local: String,
}

/// One `export` of a module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportEntry {
    /// Local binding being exported.
    pub local: String,
    /// Name seen by importers.
    pub export_name: String,
}

/// A line-table row: instructions at or after `offset` (until the
/// next row) come from `line`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineEntry {
    /// Code byte offset
    pub offset: u32,
    /// 1-based source line
    pub line: u32,
}

/// A compiled script or module.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BytecodeModule {
    /// Source name for diagnostics (file path or `<eval>`).
    pub source_name: String,
    /// True for module code (imports/exports, top-level await).
    pub is_module: bool,
    /// Constant pool.
    pub constants: Vec<Constant>,
    /// Binding table (rows grouped by [`BytecodeModule::binding_groups`]).
    pub bindings: Vec<Binding>,
    /// Binding-reference table (names).
    pub binding_refs: Vec<BindingRef>,
    /// Property-reference table: one row per static property site.
    /// The runtime attaches an inline-cache slot to each row.
    pub prop_refs: Vec<String>,
    /// Binding groups, one per lexical scope.
    pub binding_groups: Vec<Group>,
    /// Function declarations (rows grouped by
    /// [`BytecodeModule::func_groups`]).
    pub func_decls: Vec<FuncDecl>,
    /// Function-declaration groups.
    pub func_groups: Vec<Group>,
    /// Private-name table.
    pub private_names: Vec<String>,
    /// Private-environment table.
    pub private_envs: Vec<PrivateEnvInfo>,
    /// Function metadata; index 0 is the top-level function.
    pub functions: Vec<FunctionInfo>,
    /// Instruction buffer.
    pub code: Vec<u8>,
    /// Try-region table.
    pub try_regions: Vec<TryRegion>,
    /// Line table, sorted by offset.
    pub line_table: Vec<LineEntry>,
    /// Import bindings (modules only).
    pub imports: Vec<ImportEntry>,
    /// Export entries (modules only).
    pub exports: Vec<ExportEntry>,
}

impl BytecodeModule {
    /// Create an empty module.
    pub fn new(source_name: impl Into<String>) -> Self {
        Self {
            source_name: source_name.into(),
            ..Default::default()
        }
    }

    /// Intern a constant, reusing an existing pool slot when one
    /// matches bit-for-bit.
    pub fn add_constant(&mut self, c: Constant) -> u16 {
        for (i, existing) in self.constants.iter().enumerate() {
            let same = match (existing, &c) {
                (Constant::Number(a), Constant::Number(b)) => a.to_bits() == b.to_bits(),
                (a, b) => a == b,
            };
            if same {
                return i as u16;
            }
        }
        let idx = self.constants.len() as u16;
        self.constants.push(c);
        idx
    }

    /// Intern a binding-reference row for `name`.
    pub fn add_binding_ref(&mut self, name: &str) -> u16 {
        for (i, r) in self.binding_refs.iter().enumerate() {
            if r.name == name {
                return i as u16;
            }
        }
        let idx = self.binding_refs.len() as u16;
        self.binding_refs.push(BindingRef {
            name: name.to_string(),
        });
        idx
    }

    /// Add a property-reference row. Every static source site gets its
    /// own row so each carries its own cache slot.
    pub fn add_prop_ref(&mut self, name: &str) -> u16 {
        let idx = self.prop_refs.len() as u16;
        self.prop_refs.push(name.to_string());
        idx
    }

    /// The source line for a code offset.
    pub fn line_for_offset(&self, offset: u32) -> u32 {
        match self
            .line_table
            .binary_search_by_key(&offset, |e| e.offset)
        {
            Ok(i) => self.line_table[i].line,
            Err(0) => 0,
            Err(i) => self.line_table[i - 1].line,
        }
    }

    /// Innermost try region covering `offset` within the given
    /// function, filtered by whether catch handlers apply.
    pub fn find_region(
        &self,
        offset: u32,
        include_catch: bool,
        skip_above: Option<usize>,
    ) -> Option<(usize, &TryRegion)> {
        let limit = skip_above.unwrap_or(self.try_regions.len());
        self.try_regions[..limit]
            .iter()
            .enumerate()
            .filter(|(_, r)| r.start <= offset && offset < r.end)
            .filter(|(_, r)| include_catch || matches!(r.kind, TryRegionKind::Finally))
            .min_by_key(|(_, r)| r.end - r.start)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constant_interning() {
        let mut m = BytecodeModule::new("test");
        let a = m.add_constant(Constant::Number(1.0));
        let b = m.add_constant(Constant::Number(1.0));
        let c = m.add_constant(Constant::Number(2.0));
        assert_eq!(a, b);
        assert_ne!(a, c);
        // -0.0 and +0.0 must not share a slot
        let z = m.add_constant(Constant::Number(0.0));
        let nz = m.add_constant(Constant::Number(-0.0));
        assert_ne!(z, nz);
    }

    #[test]
    fn test_binding_ref_interning() {
        let mut m = BytecodeModule::new("test");
        assert_eq!(m.add_binding_ref("x"), m.add_binding_ref("x"));
        assert_ne!(m.add_binding_ref("x"), m.add_binding_ref("y"));
    }

    #[test]
    fn test_prop_refs_not_shared() {
        // every source site gets its own cache slot
        let mut m = BytecodeModule::new("test");
        assert_ne!(m.add_prop_ref("x"), m.add_prop_ref("x"));
    }

    #[test]
    fn test_line_lookup() {
        let mut m = BytecodeModule::new("test");
        m.line_table = vec![
            LineEntry { offset: 0, line: 1 },
            LineEntry { offset: 10, line: 3 },
            LineEntry { offset: 25, line: 4 },
        ];
        assert_eq!(m.line_for_offset(0), 1);
        assert_eq!(m.line_for_offset(9), 1);
        assert_eq!(m.line_for_offset(10), 3);
        assert_eq!(m.line_for_offset(100), 4);
    }

    #[test]
    fn test_innermost_region_wins() {
        let mut m = BytecodeModule::new("test");
        m.try_regions = vec![
            TryRegion {
                start: 0,
                end: 100,
                handler: 100,
                kind: TryRegionKind::Finally,
                scope_depth: 0,
                priv_depth: 0,
            },
            TryRegion {
                start: 10,
                end: 50,
                handler: 60,
                kind: TryRegionKind::Catch(Reg(3)),
                scope_depth: 0,
                priv_depth: 0,
            },
        ];
        let (idx, r) = m.find_region(20, true, None).unwrap();
        assert_eq!(idx, 1);
        assert!(matches!(r.kind, TryRegionKind::Catch(_)));
        // return-unwinding skips catch handlers
        let (_, r) = m.find_region(20, false, None).unwrap();
        assert!(matches!(r.kind, TryRegionKind::Finally));
    }
}
