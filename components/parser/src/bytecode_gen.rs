//! AST → bytecode lowering.
//!
//! One `FnState` per function being compiled: a local code buffer,
//! stack-disciplined temporary registers, loop and finally tracking.
//! Named bindings always resolve through the environment chain, so
//! registers only ever hold expression temporaries; every register
//! read is preceded by a write in the same function, every branch
//! stays inside the function, and scope pushes and pops are matched
//! on every path.

use bytecode_system::{
    encode_instr, Binding, BindingFlags, BytecodeModule, Constant, ExportEntry, FuncDecl,
    FunctionFlags, FunctionInfo, Group, ImportEntry, Instr, LineEntry, PrivateEnvInfo, Reg,
    TryRegion, TryRegionKind, NO_GROUP,
};

use crate::ast::*;
use crate::error::ParseError;
use crate::scope;

/// Compile a parsed program into a bytecode module. Function 0 is the
/// top level.
pub fn compile(program: &Program, source_name: &str) -> Result<BytecodeModule, ParseError> {
    let mut c = Compiler {
        module: BytecodeModule::new(source_name),
        priv_names: Vec::new(),
    };
    c.module.is_module = program.is_module;
    c.collect_module_entries(program);

    // reserve the top-level slot so nested functions index from 1
    c.module.functions.push(placeholder_info());
    let mut f = FnState::new(!program.is_module);
    c.compile_top_level(&mut f, program)?;
    let info = c.finish_function(f, String::new(), 0, top_level_flags(program), 1)?;
    c.module.functions[0] = info;
    Ok(c.module)
}

fn top_level_flags(program: &Program) -> FunctionFlags {
    let mut flags = 0;
    if program.is_module {
        flags |= FunctionFlags::STRICT | FunctionFlags::ASYNC;
    }
    FunctionFlags(flags)
}

fn placeholder_info() -> FunctionInfo {
    FunctionInfo {
        name: String::new(),
        param_count: 0,
        flags: FunctionFlags(0),
        code_start: 0,
        code_len: 0,
        register_count: 0,
        scope_group: NO_GROUP,
        func_group: NO_GROUP,
        line: 0,
    }
}

/// How a pattern writes its names.
#[derive(Clone, Copy, PartialEq, Eq)]
enum BindMode {
    /// Declaration: `initialize-binding`.
    Declare,
    /// Assignment: `set-mutable-binding`.
    Store,
}

struct LoopCtx {
    label: Option<String>,
    is_loop: bool,
    /// Scope depth a `break` unwinds to (outside any per-iteration
    /// scope).
    break_scope_depth: u16,
    /// Scope depth a `continue` unwinds to (inside the per-iteration
    /// scope).
    continue_scope_depth: u16,
    finally_depth: usize,
    break_patches: Vec<usize>,
    continue_patches: Vec<usize>,
}

struct FnState<'a> {
    code: Vec<u8>,
    lines: Vec<LineEntry>,
    regions: Vec<TryRegion>,
    next_reg: u16,
    max_reg: u16,
    scope_depth: u16,
    priv_depth: u16,
    loops: Vec<LoopCtx>,
    finallies: Vec<(&'a [Stmt], u16)>,
    /// Expression statements record their value into r0.
    record_completion: bool,
    in_derived_ctor: bool,
    current_line: u32,
    /// Fields initialized by this constructor, compiled after
    /// `super()` (derived) or at entry (base).
    instance_fields: Vec<&'a ClassMember>,
}

impl<'a> FnState<'a> {
    fn new(record_completion: bool) -> Self {
        Self {
            code: Vec::new(),
            lines: Vec::new(),
            regions: Vec::new(),
            next_reg: 0,
            max_reg: 0,
            scope_depth: 0,
            priv_depth: 0,
            loops: Vec::new(),
            finallies: Vec::new(),
            record_completion,
            in_derived_ctor: false,
            current_line: 0,
            instance_fields: Vec::new(),
        }
    }
}

struct Compiler {
    module: BytecodeModule,
    /// Private-name scopes currently open, innermost last; each maps
    /// source names to private-name table indices.
    priv_names: Vec<Vec<(String, u16)>>,
}

type CResult<T> = Result<T, ParseError>;

impl Compiler {
    fn err<T>(&self, msg: impl Into<String>, line: u32) -> CResult<T> {
        Err(ParseError::new(msg, line, 0))
    }

    // ---- emitter helpers ----

    fn emit(&mut self, f: &mut FnState<'_>, instr: Instr) {
        encode_instr(&mut f.code, &instr);
    }

    fn mark_line(&mut self, f: &mut FnState<'_>, line: u32) {
        if line != 0 && line != f.current_line {
            f.current_line = line;
            let offset = f.code.len() as u32;
            f.lines.push(LineEntry { offset, line });
        }
    }

    fn here(&self, f: &FnState<'_>) -> usize {
        f.code.len()
    }

    /// Emit a branch with a placeholder offset; returns the patch
    /// site (the label operand is always the final operand).
    fn emit_jump(&mut self, f: &mut FnState<'_>, instr: Instr) -> usize {
        encode_instr(&mut f.code, &instr);
        f.code.len() - 2
    }

    fn patch_jump(&self, f: &mut FnState<'_>, patch: usize) {
        let target = f.code.len() as i64;
        let from = (patch + 2) as i64;
        let off = (target - from) as i16;
        f.code[patch..patch + 2].copy_from_slice(&off.to_le_bytes());
    }

    fn patch_jump_to(&self, f: &mut FnState<'_>, patch: usize, target: usize) {
        let from = (patch + 2) as i64;
        let off = (target as i64 - from) as i16;
        f.code[patch..patch + 2].copy_from_slice(&off.to_le_bytes());
    }

    fn jump_back(&mut self, f: &mut FnState<'_>, target: usize) {
        let patch = self.emit_jump(f, Instr::Jump { off: 0 });
        self.patch_jump_to(f, patch, target);
    }

    fn alloc(&mut self, f: &mut FnState<'_>) -> CResult<Reg> {
        if f.next_reg >= 255 {
            return self.err("expression too complex (out of registers)", f.current_line);
        }
        let r = Reg(f.next_reg as u8);
        f.next_reg += 1;
        f.max_reg = f.max_reg.max(f.next_reg);
        Ok(r)
    }

    fn reg_mark(&self, f: &FnState<'_>) -> u16 {
        f.next_reg
    }

    fn reg_reset(&self, f: &mut FnState<'_>, mark: u16) {
        f.next_reg = mark;
    }

    fn bref(&mut self, name: &str) -> u16 {
        self.module.add_binding_ref(name)
    }

    fn const_num(&mut self, f: &mut FnState<'_>, dst: Reg, n: f64) {
        if n.fract() == 0.0 && (-128.0..=127.0).contains(&n) && !(n == 0.0 && n.is_sign_negative())
        {
            self.emit(f, Instr::LoadSmallInt { dst, value: n as i8 });
        } else {
            let idx = self.module.add_constant(Constant::Number(n));
            self.emit(f, Instr::LoadConst { dst, idx });
        }
    }

    fn const_str(&mut self, f: &mut FnState<'_>, dst: Reg, s: &str) {
        let idx = self.module.add_constant(Constant::String(s.to_string()));
        self.emit(f, Instr::LoadConst { dst, idx });
    }

    fn make_group(&mut self, entries: &[(String, u8)]) -> u16 {
        let start = self.module.bindings.len() as u32;
        for (name, flags) in entries {
            let bref = self.bref(name);
            self.module.bindings.push(Binding {
                bref,
                flags: BindingFlags(*flags),
            });
        }
        let idx = self.module.binding_groups.len() as u16;
        self.module.binding_groups.push(Group {
            start,
            len: entries.len() as u32,
        });
        idx
    }

    fn resolve_private(&self, name: &str, line: u32) -> CResult<u16> {
        for scope in self.priv_names.iter().rev() {
            if let Some((_, idx)) = scope.iter().find(|(n, _)| n == name) {
                return Ok(*idx);
            }
        }
        self.err(format!("private name '#{}' is not defined", name), line)
    }

    // ---- module entry collection ----

    fn collect_module_entries(&mut self, program: &Program) {
        if !program.is_module {
            return;
        }
        for stmt in &program.body {
            match stmt {
                Stmt::Import { entries, specifier } => {
                    for (import_name, local) in entries {
                        self.module.imports.push(ImportEntry {
                            specifier: specifier.clone(),
                            import_name: import_name.clone(),
                            local: local.clone(),
                        });
                    }
                    if entries.is_empty() {
                        self.module.imports.push(ImportEntry {
                            specifier: specifier.clone(),
                            import_name: String::new(),
                            local: String::new(),
                        });
                    }
                }
                Stmt::ExportNamed(specs) => {
                    for (local, exported) in specs {
                        self.module.exports.push(ExportEntry {
                            local: local.clone(),
                            export_name: exported.clone(),
                        });
                    }
                }
                Stmt::ExportDefault(_) => {
                    self.module.exports.push(ExportEntry {
                        local: "*default*".to_string(),
                        export_name: "default".to_string(),
                    });
                }
                Stmt::ExportDecl(inner) => {
                    let mut names = Vec::new();
                    match inner.as_ref() {
                        Stmt::VarDecl { decls, .. } => {
                            for d in decls {
                                scope::pattern_names(&d.pattern, &mut names);
                            }
                        }
                        Stmt::FunctionDecl { name, .. } | Stmt::ClassDecl { name, .. } => {
                            names.push(name.clone());
                        }
                        _ => {}
                    }
                    for n in names {
                        self.module.exports.push(ExportEntry {
                            local: n.clone(),
                            export_name: n,
                        });
                    }
                }
                _ => {}
            }
        }
    }

    // ---- function compilation ----

    fn finish_function(
        &mut self,
        f: FnState<'_>,
        name: String,
        param_count: u8,
        flags: FunctionFlags,
        line: u32,
    ) -> CResult<FunctionInfo> {
        let code_start = self.module.code.len() as u32;
        let code_len = f.code.len() as u32;
        self.module.code.extend_from_slice(&f.code);
        for mut region in f.regions {
            region.start += code_start;
            region.end += code_start;
            region.handler += code_start;
            self.module.try_regions.push(region);
        }
        for entry in f.lines {
            self.module.line_table.push(LineEntry {
                offset: entry.offset + code_start,
                line: entry.line,
            });
        }
        Ok(FunctionInfo {
            name,
            param_count,
            flags,
            code_start,
            code_len,
            register_count: f.max_reg.max(1),
            scope_group: NO_GROUP,
            func_group: NO_GROUP,
            line,
        })
    }

    /// Compile a nested function literal; returns its table index.
    fn compile_function(
        &mut self,
        func: &FunctionExpr,
        extra_flags: u16,
        instance_fields: Vec<&ClassMember>,
    ) -> CResult<u16> {
        let index = self.module.functions.len();
        if index > u16::MAX as usize {
            return self.err("too many functions", func.line);
        }
        self.module.functions.push(placeholder_info());

        let mut flags = extra_flags;
        if func.is_arrow {
            flags |= FunctionFlags::ARROW;
        }
        if func.is_async {
            flags |= FunctionFlags::ASYNC;
        }
        if func.is_generator {
            flags |= FunctionFlags::GENERATOR;
        }
        if func.params.iter().any(|p| p.default.is_some() || p.rest) {
            flags |= FunctionFlags::PARAM_EXPRS;
        }
        if !func.is_arrow {
            flags |= FunctionFlags::NEEDS_ARGUMENTS;
        }

        let mut f = FnState::new(false);
        f.in_derived_ctor = (flags & FunctionFlags::DERIVED_CTOR) != 0;
        f.instance_fields = instance_fields;

        // the function scope: params, hoisted vars, body lexicals and
        // declared functions, all living in the activation record
        let mut entries: Vec<(String, u8)> = Vec::new();
        let mut param_names = Vec::new();
        for p in &func.params {
            scope::pattern_names(&p.pattern, &mut param_names);
        }
        for n in &param_names {
            entries.push((n.clone(), BindingFlags::VAR));
        }
        if (flags & FunctionFlags::NEEDS_ARGUMENTS) != 0 && !param_names.iter().any(|n| n == "arguments")
        {
            entries.push(("arguments".to_string(), BindingFlags::VAR));
        }
        for n in scope::hoisted_var_names(&func.body) {
            if !entries.iter().any(|(e, _)| *e == n) {
                entries.push((n, BindingFlags::VAR));
            }
        }
        let body_fns = scope::function_decls(&func.body);
        for (name, _) in &body_fns {
            if !entries.iter().any(|(e, _)| e == *name) {
                entries.push(((*name).clone(), BindingFlags::VAR));
            }
        }
        for (name, is_const) in scope::lexical_decl_names(&func.body) {
            let flag = if is_const { BindingFlags::CONST } else { 0 };
            entries.push((name, flag));
        }
        let scope_group = self.make_group(&entries);
        let func_group = self.compile_func_decl_group(&body_fns)?;

        // prologue: arguments object, parameter binding
        if (flags & FunctionFlags::NEEDS_ARGUMENTS) != 0 && !param_names.iter().any(|n| n == "arguments")
        {
            let mark = self.reg_mark(&f);
            let r = self.alloc(&mut f)?;
            self.emit(&mut f, Instr::Arguments { dst: r });
            let bref = self.bref("arguments");
            self.emit(&mut f, Instr::InitBinding { bref, src: r });
            self.reg_reset(&mut f, mark);
        }
        let mut simple_params: u8 = 0;
        let mut counting = true;
        for (i, p) in func.params.iter().enumerate() {
            if p.rest || p.default.is_some() {
                counting = false;
            }
            if counting {
                simple_params += 1;
            }
            let mark = self.reg_mark(&f);
            let r = self.alloc(&mut f)?;
            if p.rest {
                self.emit(&mut f, Instr::RestArgs { dst: r, index: i as u8 });
            } else {
                self.emit(&mut f, Instr::LoadArg { dst: r, index: i as u8 });
                if let Some(default) = &p.default {
                    let skip = self.emit_jump(
                        &mut f,
                        Instr::JumpIfUndefined { src: r, off: 0 },
                    );
                    let done = self.emit_jump(&mut f, Instr::Jump { off: 0 });
                    self.patch_jump(&mut f, skip);
                    self.compile_expr(&mut f, default, r)?;
                    self.patch_jump(&mut f, done);
                }
            }
            self.bind_pattern(&mut f, &p.pattern, r, BindMode::Declare)?;
            self.reg_reset(&mut f, mark);
        }

        // base-class constructors initialize fields on entry
        if (flags & FunctionFlags::CLASS_CTOR) != 0
            && (flags & FunctionFlags::DERIVED_CTOR) == 0
            && !f.instance_fields.is_empty()
        {
            self.compile_instance_fields(&mut f)?;
        }

        for stmt in &func.body {
            self.compile_stmt(&mut f, stmt)?;
        }

        // implicit return
        let mark = self.reg_mark(&f);
        let r = self.alloc(&mut f)?;
        if (flags & FunctionFlags::CLASS_CTOR) != 0 {
            self.emit(&mut f, Instr::LoadThis { dst: r });
        } else {
            self.emit(&mut f, Instr::LoadUndefined { dst: r });
        }
        self.emit(&mut f, Instr::Return { src: r });
        self.reg_reset(&mut f, mark);

        let name = func.name.clone().unwrap_or_default();
        let mut info =
            self.finish_function(f, name, simple_params, FunctionFlags(flags), func.line)?;
        info.scope_group = scope_group;
        info.func_group = func_group;
        self.module.functions[index] = info;
        Ok(index as u16)
    }

    fn compile_func_decl_group(
        &mut self,
        decls: &[(&String, &FunctionExpr)],
    ) -> CResult<u16> {
        if decls.is_empty() {
            return Ok(NO_GROUP);
        }
        let mut rows = Vec::new();
        for (name, func) in decls {
            let idx = self.compile_function(func, 0, Vec::new())?;
            let bref = self.bref(name);
            rows.push(FuncDecl { func: idx, bref });
        }
        let start = self.module.func_decls.len() as u32;
        self.module.func_decls.extend(rows.iter().copied());
        let group = self.module.func_groups.len() as u16;
        self.module.func_groups.push(Group {
            start,
            len: rows.len() as u32,
        });
        Ok(group)
    }

    /// Top-level code. For scripts the var/function declarations are
    /// bound by global declaration instantiation at evaluation time;
    /// only lexicals get scope rows without the VAR flag. Modules use
    /// the ordinary function layout.
    fn compile_top_level<'a>(&mut self, f: &mut FnState<'a>, program: &'a Program) -> CResult<()> {
        let mut entries: Vec<(String, u8)> = Vec::new();
        for (name, is_const) in scope::lexical_decl_names(&program.body) {
            let flag = if is_const { BindingFlags::CONST } else { 0 };
            entries.push((name, flag));
        }
        if program.is_module {
            for n in scope::hoisted_var_names(&program.body) {
                entries.push((n, BindingFlags::VAR));
            }
            if program
                .body
                .iter()
                .any(|s| matches!(s, Stmt::ExportDefault(_)))
            {
                entries.push(("*default*".to_string(), 0));
            }
        } else {
            // script: record vars with the VAR flag so evaluation can
            // route them to the global object
            for n in scope::hoisted_var_names(&program.body) {
                entries.push((n, BindingFlags::VAR));
            }
        }
        let body_fns = scope::function_decls(&program.body);
        if program.is_module {
            for (name, _) in &body_fns {
                entries.push(((*name).clone(), BindingFlags::VAR));
            }
        }
        let scope_group = self.make_group(&entries);
        let func_group = self.compile_func_decl_group(&body_fns)?;

        // completion value lives in r0
        let r0 = self.alloc(f)?;
        self.emit(f, Instr::LoadUndefined { dst: r0 });

        for stmt in &program.body {
            self.compile_stmt(f, stmt)?;
        }
        self.emit(f, Instr::Return { src: r0 });

        // stash on the reserved top-level slot
        self.module.functions[0].scope_group = scope_group;
        self.module.functions[0].func_group = func_group;
        Ok(())
    }

    fn compile_instance_fields(&mut self, f: &mut FnState<'_>) -> CResult<()> {
        let fields = std::mem::take(&mut f.instance_fields);
        let mark = self.reg_mark(f);
        let r_this = self.alloc(f)?;
        self.emit(f, Instr::LoadThis { dst: r_this });
        for member in &fields {
            let r_v = self.alloc(f)?;
            match &member.kind {
                ClassMemberKind::Field(Some(init)) => self.compile_expr(f, init, r_v)?,
                ClassMemberKind::Field(None) => self.emit(f, Instr::LoadUndefined { dst: r_v }),
                _ => continue,
            }
            match &member.key {
                PropKey::Private(name) => {
                    let pname = self.resolve_private(name, f.current_line)?;
                    self.emit(
                        f,
                        Instr::DefinePrivateField {
                            obj: r_this,
                            pname,
                            src: r_v,
                        },
                    );
                }
                key => {
                    let r_k = self.alloc(f)?;
                    self.compile_prop_key(f, key, r_k)?;
                    self.emit(
                        f,
                        Instr::DefineElem {
                            obj: r_this,
                            key: r_k,
                            src: r_v,
                        },
                    );
                }
            }
            self.reg_reset(f, mark + 1);
        }
        self.reg_reset(f, mark);
        f.instance_fields = fields;
        Ok(())
    }

    fn compile_prop_key<'a>(&mut self, f: &mut FnState<'a>, key: &'a PropKey, dst: Reg) -> CResult<()> {
        match key {
            PropKey::Ident(n) | PropKey::Str(n) => self.const_str(f, dst, n),
            PropKey::Num(n) => self.const_num(f, dst, *n),
            PropKey::Computed(e) => self.compile_expr(f, e, dst)?,
            PropKey::Private(_) => {
                return self.err("private name not valid here", f.current_line)
            }
        }
        Ok(())
    }

    // ---- statements ----

    fn compile_stmt<'a>(&mut self, f: &mut FnState<'a>, stmt: &'a Stmt) -> CResult<()> {
        match stmt {
            Stmt::Empty | Stmt::FunctionDecl { .. } | Stmt::Import { .. }
            | Stmt::ExportNamed(_) => Ok(()),
            Stmt::Debugger => {
                self.emit(f, Instr::Debugger {});
                Ok(())
            }
            Stmt::Expr { expr, line } => {
                self.mark_line(f, *line);
                let mark = self.reg_mark(f);
                if f.record_completion {
                    let r = self.alloc(f)?;
                    self.compile_expr(f, expr, r)?;
                    self.emit(f, Instr::Move { dst: Reg(0), src: r });
                } else {
                    let r = self.alloc(f)?;
                    self.compile_expr(f, expr, r)?;
                }
                self.reg_reset(f, mark);
                Ok(())
            }
            Stmt::VarDecl { kind, decls, line } => {
                self.mark_line(f, *line);
                for d in decls {
                    let mark = self.reg_mark(f);
                    let mode = BindMode::Declare;
                    match (&d.init, kind) {
                        (Some(init), _) => {
                            let r = self.alloc(f)?;
                            self.compile_expr(f, init, r)?;
                            if *kind == DeclKind::Var {
                                // var assignment over the hoisted slot
                                self.bind_pattern(f, &d.pattern, r, BindMode::Store)?;
                            } else {
                                self.bind_pattern(f, &d.pattern, r, mode)?;
                            }
                        }
                        (None, DeclKind::Let) => {
                            let r = self.alloc(f)?;
                            self.emit(f, Instr::LoadUndefined { dst: r });
                            self.bind_pattern(f, &d.pattern, r, mode)?;
                        }
                        (None, _) => {}
                    }
                    self.reg_reset(f, mark);
                }
                Ok(())
            }
            Stmt::ClassDecl { name, class } => {
                let mark = self.reg_mark(f);
                let r = self.alloc(f)?;
                self.compile_class(f, class, r)?;
                let bref = self.bref(name);
                self.emit(f, Instr::InitBinding { bref, src: r });
                self.reg_reset(f, mark);
                Ok(())
            }
            Stmt::Return { arg, line } => {
                self.mark_line(f, *line);
                let mark = self.reg_mark(f);
                let r = self.alloc(f)?;
                match arg {
                    Some(e) => self.compile_expr(f, e, r)?,
                    None => self.emit(f, Instr::LoadUndefined { dst: r }),
                }
                // run enclosing finally blocks before leaving; each is
                // compiled with the inner entries masked off so a
                // return inside a finally cannot re-enter it
                let saved = f.finallies.clone();
                for i in (0..saved.len()).rev() {
                    let (stmts, _) = saved[i];
                    f.finallies.truncate(i);
                    for s in stmts {
                        self.compile_stmt(f, s)?;
                    }
                }
                f.finallies = saved;
                self.emit(f, Instr::Return { src: r });
                self.reg_reset(f, mark);
                Ok(())
            }
            Stmt::Block(body) => self.compile_block(f, body),
            Stmt::If {
                test,
                consequent,
                alternate,
            } => {
                let mark = self.reg_mark(f);
                let r = self.alloc(f)?;
                self.compile_expr(f, test, r)?;
                let else_patch = self.emit_jump(f, Instr::JumpIfFalse { cond: r, off: 0 });
                self.reg_reset(f, mark);
                self.compile_stmt(f, consequent)?;
                match alternate {
                    Some(alt) => {
                        let end_patch = self.emit_jump(f, Instr::Jump { off: 0 });
                        self.patch_jump(f, else_patch);
                        self.compile_stmt(f, alt)?;
                        self.patch_jump(f, end_patch);
                    }
                    None => self.patch_jump(f, else_patch),
                }
                Ok(())
            }
            Stmt::While { test, body } => self.compile_while(f, None, test, body),
            Stmt::DoWhile { body, test } => self.compile_do_while(f, None, body, test),
            Stmt::For {
                init,
                test,
                update,
                body,
            } => self.compile_for(f, None, init, test, update, body),
            Stmt::ForIn { left, right, body } => {
                self.compile_for_in_of(f, None, left, right, body, IterMode::In)
            }
            Stmt::ForOf {
                left,
                right,
                body,
                is_await,
            } => {
                let mode = if *is_await { IterMode::AwaitOf } else { IterMode::Of };
                self.compile_for_in_of(f, None, left, right, body, mode)
            }
            Stmt::Labeled { label, body } => match body.as_ref() {
                Stmt::While { test, body } => {
                    self.compile_while(f, Some(label.clone()), test, body)
                }
                Stmt::DoWhile { body, test } => {
                    self.compile_do_while(f, Some(label.clone()), body, test)
                }
                Stmt::For {
                    init,
                    test,
                    update,
                    body,
                } => self.compile_for(f, Some(label.clone()), init, test, update, body),
                Stmt::ForIn { left, right, body } => {
                    self.compile_for_in_of(f, Some(label.clone()), left, right, body, IterMode::In)
                }
                Stmt::ForOf {
                    left,
                    right,
                    body,
                    is_await,
                } => {
                    let mode = if *is_await { IterMode::AwaitOf } else { IterMode::Of };
                    self.compile_for_in_of(f, Some(label.clone()), left, right, body, mode)
                }
                other => {
                    // labelled block: breakable, not continuable
                    f.loops.push(LoopCtx {
                        label: Some(label.clone()),
                        is_loop: false,
                        break_scope_depth: f.scope_depth,
                        continue_scope_depth: f.scope_depth,
                        finally_depth: f.finallies.len(),
                        break_patches: Vec::new(),
                        continue_patches: Vec::new(),
                    });
                    self.compile_stmt(f, other)?;
                    let ctx = f.loops.pop().expect("label context");
                    for p in ctx.break_patches {
                        self.patch_jump(f, p);
                    }
                    Ok(())
                }
            },
            Stmt::Break { label } => self.compile_break_continue(f, label.as_deref(), true),
            Stmt::Continue { label } => self.compile_break_continue(f, label.as_deref(), false),
            Stmt::Throw { arg, line } => {
                self.mark_line(f, *line);
                let mark = self.reg_mark(f);
                let r = self.alloc(f)?;
                self.compile_expr(f, arg, r)?;
                self.emit(f, Instr::Throw { src: r });
                self.reg_reset(f, mark);
                Ok(())
            }
            Stmt::Try {
                block,
                handler,
                finalizer,
            } => self.compile_try(f, block, handler, finalizer),
            Stmt::Switch { disc, cases } => self.compile_switch(f, disc, cases),
            Stmt::ExportDecl(inner) => self.compile_stmt(f, inner),
            Stmt::ExportDefault(expr) => {
                let mark = self.reg_mark(f);
                let r = self.alloc(f)?;
                self.compile_expr(f, expr, r)?;
                let bref = self.bref("*default*");
                self.emit(f, Instr::InitBinding { bref, src: r });
                self.reg_reset(f, mark);
                Ok(())
            }
        }
    }

    fn compile_block<'a>(&mut self, f: &mut FnState<'a>, body: &'a [Stmt]) -> CResult<()> {
        let lexicals = scope::lexical_decl_names(body);
        let fns = scope::function_decls(body);
        let scoped = !lexicals.is_empty() || !fns.is_empty();
        if scoped {
            let mut entries: Vec<(String, u8)> = Vec::new();
            for (name, _) in &fns {
                entries.push(((*name).clone(), BindingFlags::VAR));
            }
            for (name, is_const) in lexicals {
                let flag = if is_const { BindingFlags::CONST } else { 0 };
                entries.push((name, flag));
            }
            let group = self.make_group(&entries);
            self.emit(f, Instr::PushScope { group });
            f.scope_depth += 1;
            let func_group = self.compile_func_decl_group(&fns)?;
            if func_group != NO_GROUP {
                self.emit(f, Instr::InstantiateFunctions { group: func_group });
            }
        }
        for stmt in body {
            self.compile_stmt(f, stmt)?;
        }
        if scoped {
            self.emit(f, Instr::PopScope {});
            f.scope_depth -= 1;
        }
        Ok(())
    }

    fn compile_break_continue(
        &mut self,
        f: &mut FnState<'_>,
        label: Option<&str>,
        is_break: bool,
    ) -> CResult<()> {
        let idx = f
            .loops
            .iter()
            .rposition(|l| match label {
                Some(lbl) => l.label.as_deref() == Some(lbl),
                None => l.is_loop,
            })
            .ok_or_else(|| {
                ParseError::new(
                    if is_break {
                        "illegal break"
                    } else {
                        "illegal continue"
                    },
                    f.current_line,
                    0,
                )
            })?;
        if !is_break && !f.loops[idx].is_loop {
            return self.err("cannot continue a non-loop label", f.current_line);
        }
        // run finally blocks entered since the loop
        let finally_depth = f.loops[idx].finally_depth;
        let saved = f.finallies.clone();
        for i in (finally_depth..saved.len()).rev() {
            let (stmts, _) = saved[i];
            f.finallies.truncate(i);
            for s in stmts {
                self.compile_stmt(f, s)?;
            }
        }
        f.finallies = saved;
        // pop scopes entered since the loop
        let target_depth = if is_break {
            f.loops[idx].break_scope_depth
        } else {
            f.loops[idx].continue_scope_depth
        };
        for _ in target_depth..f.scope_depth {
            self.emit(f, Instr::PopScope {});
        }
        let patch = self.emit_jump(f, Instr::Jump { off: 0 });
        if is_break {
            f.loops[idx].break_patches.push(patch);
        } else {
            f.loops[idx].continue_patches.push(patch);
        }
        Ok(())
    }

    fn push_loop(
        &mut self,
        f: &mut FnState<'_>,
        label: Option<String>,
        break_scope_depth: u16,
    ) {
        f.loops.push(LoopCtx {
            label,
            is_loop: true,
            break_scope_depth,
            continue_scope_depth: f.scope_depth,
            finally_depth: f.finallies.len(),
            break_patches: Vec::new(),
            continue_patches: Vec::new(),
        });
    }

    fn pop_loop(
        &mut self,
        f: &mut FnState<'_>,
        continue_target: usize,
    ) -> Vec<usize> {
        let ctx = f.loops.pop().expect("loop context");
        for p in ctx.continue_patches {
            self.patch_jump_to(f, p, continue_target);
        }
        ctx.break_patches
    }

    fn compile_while<'a>(
        &mut self,
        f: &mut FnState<'a>,
        label: Option<String>,
        test: &'a Expr,
        body: &'a Stmt,
    ) -> CResult<()> {
        let start = self.here(f);
        let mark = self.reg_mark(f);
        let r = self.alloc(f)?;
        self.compile_expr(f, test, r)?;
        let exit = self.emit_jump(f, Instr::JumpIfFalse { cond: r, off: 0 });
        self.reg_reset(f, mark);
        self.push_loop(f, label, f.scope_depth);
        self.compile_stmt(f, body)?;
        self.jump_back(f, start);
        let breaks = self.pop_loop(f, start);
        self.patch_jump(f, exit);
        for p in breaks {
            self.patch_jump(f, p);
        }
        Ok(())
    }

    fn compile_do_while<'a>(
        &mut self,
        f: &mut FnState<'a>,
        label: Option<String>,
        body: &'a Stmt,
        test: &'a Expr,
    ) -> CResult<()> {
        let start = self.here(f);
        self.push_loop(f, label, f.scope_depth);
        self.compile_stmt(f, body)?;
        let test_at = self.here(f);
        let mark = self.reg_mark(f);
        let r = self.alloc(f)?;
        self.compile_expr(f, test, r)?;
        let exit = self.emit_jump(f, Instr::JumpIfFalse { cond: r, off: 0 });
        self.reg_reset(f, mark);
        self.jump_back(f, start);
        let breaks = self.pop_loop(f, test_at);
        self.patch_jump(f, exit);
        for p in breaks {
            self.patch_jump(f, p);
        }
        Ok(())
    }

    fn compile_for<'a>(
        &mut self,
        f: &mut FnState<'a>,
        label: Option<String>,
        init: &'a Option<ForInit>,
        test: &'a Option<Expr>,
        update: &'a Option<Expr>,
        body: &'a Stmt,
    ) -> CResult<()> {
        // lexical loop variables live in their own scope; each
        // iteration gets a fresh copy seeded from the previous one
        let mut loop_vars: Vec<String> = Vec::new();
        let mut outer_pushed = false;
        let mut lexical_const = false;
        match init {
            Some(ForInit::VarDecl { kind, decls }) => {
                lexical_const = *kind == DeclKind::Const;
                if *kind != DeclKind::Var {
                    for d in decls {
                        scope::pattern_names(&d.pattern, &mut loop_vars);
                    }
                    let entries: Vec<(String, u8)> = loop_vars
                        .iter()
                        .map(|n| (n.clone(), 0u8))
                        .collect();
                    let group = self.make_group(&entries);
                    self.emit(f, Instr::PushScope { group });
                    f.scope_depth += 1;
                    outer_pushed = true;
                }
                for d in decls {
                    let mark = self.reg_mark(f);
                    let r = self.alloc(f)?;
                    match &d.init {
                        Some(e) => self.compile_expr(f, e, r)?,
                        None => self.emit(f, Instr::LoadUndefined { dst: r }),
                    }
                    let mode = if *kind == DeclKind::Var {
                        BindMode::Store
                    } else {
                        BindMode::Declare
                    };
                    self.bind_pattern(f, &d.pattern, r, mode)?;
                    self.reg_reset(f, mark);
                }
            }
            Some(ForInit::Expr(e)) => {
                let mark = self.reg_mark(f);
                let r = self.alloc(f)?;
                self.compile_expr(f, e, r)?;
                self.reg_reset(f, mark);
            }
            None => {}
        }

        let per_iteration = outer_pushed && !loop_vars.is_empty() && !lexical_const;
        let iter_group = if per_iteration {
            let entries: Vec<(String, u8)> = loop_vars
                .iter()
                .map(|n| (n.clone(), BindingFlags::INHERIT))
                .collect();
            Some(self.make_group(&entries))
        } else {
            None
        };

        let start = self.here(f);
        if let Some(group) = iter_group {
            self.emit(f, Instr::PushScope { group });
            f.scope_depth += 1;
        }
        let exit = match test {
            Some(t) => {
                let mark = self.reg_mark(f);
                let r = self.alloc(f)?;
                self.compile_expr(f, t, r)?;
                let p = self.emit_jump(f, Instr::JumpIfFalse { cond: r, off: 0 });
                self.reg_reset(f, mark);
                Some(p)
            }
            None => None,
        };

        let break_depth = f.scope_depth - if iter_group.is_some() { 1 } else { 0 };
        self.push_loop(f, label, break_depth);
        self.compile_stmt(f, body)?;
        let continue_at = self.here(f);
        if let Some(u) = update {
            let mark = self.reg_mark(f);
            let r = self.alloc(f)?;
            self.compile_expr(f, u, r)?;
            self.reg_reset(f, mark);
        }
        if iter_group.is_some() {
            // carry the loop variables into the next iteration
            let mark = self.reg_mark(f);
            let mut regs = Vec::new();
            for name in &loop_vars {
                let r = self.alloc(f)?;
                let bref = self.bref(name);
                self.emit(f, Instr::LoadBinding { dst: r, bref });
                regs.push((r, bref));
            }
            self.emit(f, Instr::PopScope {});
            f.scope_depth -= 1;
            for (r, bref) in regs {
                self.emit(f, Instr::StoreBinding { bref, src: r });
            }
            self.reg_reset(f, mark);
        }
        self.jump_back(f, start);

        let breaks = self.pop_loop(f, continue_at);
        // the test-failure path still holds the per-iteration scope;
        // break jumps popped it during unwinding
        if let Some(p) = exit {
            self.patch_jump(f, p);
            if iter_group.is_some() {
                self.emit(f, Instr::PopScope {});
            }
        }
        for p in breaks {
            self.patch_jump(f, p);
        }
        if outer_pushed {
            self.emit(f, Instr::PopScope {});
            f.scope_depth -= 1;
        }
        Ok(())
    }

    fn compile_for_in_of<'a>(
        &mut self,
        f: &mut FnState<'a>,
        label: Option<String>,
        left: &'a ForTarget,
        right: &'a Expr,
        body: &'a Stmt,
        mode: IterMode,
    ) -> CResult<()> {
        let mark = self.reg_mark(f);
        let r_src = self.alloc(f)?;
        self.compile_expr(f, right, r_src)?;
        let r_iter = self.alloc(f)?;
        match mode {
            IterMode::In => self.emit(f, Instr::ForInInit { dst: r_iter, src: r_src }),
            IterMode::Of => self.emit(f, Instr::GetIterator { dst: r_iter, src: r_src }),
            IterMode::AwaitOf => {
                self.emit(f, Instr::GetAsyncIterator { dst: r_iter, src: r_src })
            }
        }

        let start = self.here(f);
        let r_v = self.alloc(f)?;
        let exit = match mode {
            IterMode::In => self.emit_jump(f, Instr::ForInNext { dst: r_v, iter: r_iter, off: 0 }),
            IterMode::Of => self.emit_jump(f, Instr::ForOfNext { dst: r_v, iter: r_iter, off: 0 }),
            IterMode::AwaitOf => {
                // call next(), await the result, then unpack it
                let r_res = self.alloc(f)?;
                self.emit(f, Instr::IteratorNext { dst: r_res, iter: r_iter });
                self.emit(f, Instr::AsyncForStep { dst: r_res, src: r_res });
                let done_ref = self.module.add_prop_ref("done");
                let value_ref = self.module.add_prop_ref("value");
                let r_d = self.alloc(f)?;
                self.emit(
                    f,
                    Instr::GetProp {
                        dst: r_d,
                        obj: r_res,
                        pref: done_ref,
                    },
                );
                let p = self.emit_jump(f, Instr::JumpIfTrue { cond: r_d, off: 0 });
                self.emit(
                    f,
                    Instr::GetProp {
                        dst: r_v,
                        obj: r_res,
                        pref: value_ref,
                    },
                );
                p
            }
        };

        // fresh per-iteration scope for lexical targets
        let depth_outside = f.scope_depth;
        let mut pushed = false;
        match left {
            ForTarget::Decl { kind, pattern } => {
                if *kind != DeclKind::Var {
                    let mut names = Vec::new();
                    scope::pattern_names(pattern, &mut names);
                    let entries: Vec<(String, u8)> = names
                        .iter()
                        .map(|n| {
                            let flag = if *kind == DeclKind::Const { BindingFlags::CONST } else { 0 };
                            (n.clone(), flag)
                        })
                        .collect();
                    let group = self.make_group(&entries);
                    self.emit(f, Instr::PushScope { group });
                    f.scope_depth += 1;
                    pushed = true;
                }
                let bind_mode = if *kind == DeclKind::Var {
                    BindMode::Store
                } else {
                    BindMode::Declare
                };
                self.bind_pattern(f, pattern, r_v, bind_mode)?;
            }
            ForTarget::Assign(target) => {
                self.store_target(f, target, r_v)?;
            }
        }

        self.push_loop(f, label, depth_outside);
        self.compile_stmt(f, body)?;
        let continue_at = self.here(f);
        if pushed {
            self.emit(f, Instr::PopScope {});
            f.scope_depth -= 1;
        }
        self.jump_back(f, start);
        let breaks = self.pop_loop(f, continue_at);
        if breaks.is_empty() {
            self.patch_jump(f, exit);
        } else {
            // breaks land on an iterator-close path; normal
            // exhaustion skips it
            for p in breaks {
                self.patch_jump(f, p);
            }
            if matches!(mode, IterMode::Of | IterMode::AwaitOf) {
                self.emit(f, Instr::IteratorClose { iter: r_iter });
            }
            self.patch_jump(f, exit);
        }
        self.reg_reset(f, mark);
        Ok(())
    }

    fn compile_try<'a>(
        &mut self,
        f: &mut FnState<'a>,
        block: &'a [Stmt],
        handler: &'a Option<CatchClause>,
        finalizer: &'a Option<Vec<Stmt>>,
    ) -> CResult<()> {
        let outer_start = self.here(f) as u32;
        let entry_scope_depth = f.scope_depth;
        let entry_priv_depth = f.priv_depth;

        // the exception register stays reserved for the handlers
        let r_exc = self.alloc(f)?;

        if let Some(fin) = finalizer {
            f.finallies.push((fin.as_slice(), entry_scope_depth));
        }

        let try_start = self.here(f) as u32;
        self.compile_block(f, block)?;
        let try_end = self.here(f) as u32;

        let mut catch_section_end = try_end;
        if let Some(catch) = handler {
            let after = self.emit_jump(f, Instr::Jump { off: 0 });
            let handler_at = self.here(f) as u32;
            // catch scope with the parameter binding
            if let Some(param) = &catch.param {
                let mut names = Vec::new();
                scope::pattern_names(param, &mut names);
                let entries: Vec<(String, u8)> =
                    names.iter().map(|n| (n.clone(), 0u8)).collect();
                let group = self.make_group(&entries);
                self.emit(f, Instr::PushScope { group });
                f.scope_depth += 1;
                self.bind_pattern(f, param, r_exc, BindMode::Declare)?;
                self.compile_block_in_current_scope(f, &catch.body)?;
                self.emit(f, Instr::PopScope {});
                f.scope_depth -= 1;
            } else {
                self.compile_block(f, &catch.body)?;
            }
            f.regions.push(TryRegion {
                start: try_start,
                end: try_end,
                handler: handler_at,
                kind: TryRegionKind::Catch(r_exc),
                scope_depth: entry_scope_depth,
                priv_depth: entry_priv_depth,
            });
            self.patch_jump(f, after);
            catch_section_end = self.here(f) as u32;
        }

        if let Some(fin) = finalizer {
            f.finallies.pop();
            // normal path runs the finally inline
            for s in fin {
                self.compile_stmt(f, s)?;
            }
            let after = self.emit_jump(f, Instr::Jump { off: 0 });
            // abrupt path: the region handler re-raises when done
            let handler_at = self.here(f) as u32;
            for s in fin {
                self.compile_stmt(f, s)?;
            }
            self.emit(f, Instr::FinallyEnd {});
            f.regions.push(TryRegion {
                start: outer_start,
                end: catch_section_end,
                handler: handler_at,
                kind: TryRegionKind::Finally,
                scope_depth: entry_scope_depth,
                priv_depth: entry_priv_depth,
            });
            self.patch_jump(f, after);
        }
        Ok(())
    }

    /// Block statements without opening a new scope (catch bodies
    /// share the parameter scope).
    fn compile_block_in_current_scope<'a>(
        &mut self,
        f: &mut FnState<'a>,
        body: &'a [Stmt],
    ) -> CResult<()> {
        let fns = scope::function_decls(body);
        let func_group = self.compile_func_decl_group(&fns)?;
        if func_group != NO_GROUP {
            self.emit(f, Instr::InstantiateFunctions { group: func_group });
        }
        for stmt in body {
            self.compile_stmt(f, stmt)?;
        }
        Ok(())
    }

    fn compile_switch<'a>(
        &mut self,
        f: &mut FnState<'a>,
        disc: &'a Expr,
        cases: &'a [SwitchCase],
    ) -> CResult<()> {
        let mark = self.reg_mark(f);
        let r_disc = self.alloc(f)?;
        self.compile_expr(f, disc, r_disc)?;

        f.loops.push(LoopCtx {
            label: None,
            is_loop: false,
            break_scope_depth: f.scope_depth,
            continue_scope_depth: f.scope_depth,
            finally_depth: f.finallies.len(),
            break_patches: Vec::new(),
            continue_patches: Vec::new(),
        });

        // the case bodies share one scope for their lexicals
        let mut all_stmts: Vec<&Stmt> = Vec::new();
        for c in cases {
            all_stmts.extend(c.body.iter());
        }
        let owned: Vec<Stmt> = all_stmts.iter().map(|s| (*s).clone()).collect();
        let lexicals = scope::lexical_decl_names(&owned);
        let scoped = !lexicals.is_empty();
        if scoped {
            let entries: Vec<(String, u8)> = lexicals
                .into_iter()
                .map(|(n, c)| (n, if c { BindingFlags::CONST } else { 0 }))
                .collect();
            let group = self.make_group(&entries);
            self.emit(f, Instr::PushScope { group });
            f.scope_depth += 1;
        }

        // dispatch: test each case in order, remember body entries
        let mut body_patches: Vec<usize> = Vec::new();
        let mut default_index: Option<usize> = None;
        for (i, c) in cases.iter().enumerate() {
            match &c.test {
                Some(test) => {
                    let m2 = self.reg_mark(f);
                    let r_t = self.alloc(f)?;
                    self.compile_expr(f, test, r_t)?;
                    let r_c = self.alloc(f)?;
                    self.emit(
                        f,
                        Instr::StrictEq {
                            dst: r_c,
                            lhs: r_disc,
                            rhs: r_t,
                        },
                    );
                    let p = self.emit_jump(f, Instr::JumpIfTrue { cond: r_c, off: 0 });
                    body_patches.push(p);
                    self.reg_reset(f, m2);
                }
                None => {
                    default_index = Some(i);
                    body_patches.push(usize::MAX);
                }
            }
        }
        let to_default_or_end = self.emit_jump(f, Instr::Jump { off: 0 });

        // bodies, in order, with fallthrough
        let mut body_offsets: Vec<usize> = Vec::new();
        for c in cases {
            body_offsets.push(self.here(f));
            for s in &c.body {
                self.compile_stmt(f, s)?;
            }
        }
        for (i, p) in body_patches.iter().enumerate() {
            if *p != usize::MAX {
                self.patch_jump_to(f, *p, body_offsets[i]);
            }
        }
        match default_index {
            Some(i) => self.patch_jump_to(f, to_default_or_end, body_offsets[i]),
            None => self.patch_jump(f, to_default_or_end),
        }

        if scoped {
            self.emit(f, Instr::PopScope {});
            f.scope_depth -= 1;
        }
        let ctx = f.loops.pop().expect("switch context");
        for p in ctx.break_patches {
            self.patch_jump(f, p);
        }
        self.reg_reset(f, mark);
        Ok(())
    }

    // ---- patterns and targets ----

    fn bind_name(
        &mut self,
        f: &mut FnState<'_>,
        name: &str,
        src: Reg,
        mode: BindMode,
    ) {
        let bref = self.bref(name);
        match mode {
            BindMode::Declare => self.emit(f, Instr::InitBinding { bref, src }),
            BindMode::Store => self.emit(f, Instr::StoreBinding { bref, src }),
        }
    }

    fn bind_pattern<'a>(
        &mut self,
        f: &mut FnState<'a>,
        pattern: &'a Pattern,
        value: Reg,
        mode: BindMode,
    ) -> CResult<()> {
        match pattern {
            Pattern::Ident(name) => {
                self.bind_name(f, name, value, mode);
                Ok(())
            }
            Pattern::Array { elements, rest } => {
                let mark = self.reg_mark(f);
                let r_iter = self.alloc(f)?;
                self.emit(f, Instr::GetIterator { dst: r_iter, src: value });
                let done_ref = self.module.add_prop_ref("done");
                let value_ref = self.module.add_prop_ref("value");
                for el in elements {
                    let m2 = self.reg_mark(f);
                    let r_res = self.alloc(f)?;
                    self.emit(f, Instr::IteratorNext { dst: r_res, iter: r_iter });
                    let r_d = self.alloc(f)?;
                    self.emit(
                        f,
                        Instr::GetProp {
                            dst: r_d,
                            obj: r_res,
                            pref: done_ref,
                        },
                    );
                    let r_v = self.alloc(f)?;
                    self.emit(f, Instr::LoadUndefined { dst: r_v });
                    let skip = self.emit_jump(f, Instr::JumpIfTrue { cond: r_d, off: 0 });
                    self.emit(
                        f,
                        Instr::GetProp {
                            dst: r_v,
                            obj: r_res,
                            pref: value_ref,
                        },
                    );
                    self.patch_jump(f, skip);
                    if let Some(el) = el {
                        if let Some(default) = &el.default {
                            let have = self.emit_jump(f, Instr::JumpIfUndefined { src: r_v, off: 0 });
                            let done = self.emit_jump(f, Instr::Jump { off: 0 });
                            self.patch_jump(f, have);
                            self.compile_expr(f, default, r_v)?;
                            self.patch_jump(f, done);
                        }
                        self.bind_pattern(f, &el.pattern, r_v, mode)?;
                    }
                    self.reg_reset(f, m2);
                }
                if let Some(rest) = rest {
                    let r_arr = self.alloc(f)?;
                    self.emit(f, Instr::NewArray { dst: r_arr });
                    let loop_start = self.here(f);
                    let r_v = self.alloc(f)?;
                    let exit = self.emit_jump(
                        f,
                        Instr::ForOfNext {
                            dst: r_v,
                            iter: r_iter,
                            off: 0,
                        },
                    );
                    self.emit(f, Instr::ArrayPush { arr: r_arr, src: r_v });
                    self.jump_back(f, loop_start);
                    self.patch_jump(f, exit);
                    self.bind_pattern(f, rest, r_arr, mode)?;
                } else {
                    self.emit(f, Instr::IteratorClose { iter: r_iter });
                }
                self.reg_reset(f, mark);
                Ok(())
            }
            Pattern::Object { props, rest } => {
                let mark = self.reg_mark(f);
                if rest.is_some() {
                    // excluded keys must sit in one contiguous run
                    let mut key_regs = Vec::with_capacity(props.len());
                    for p in props {
                        let r_k = self.alloc(f)?;
                        self.compile_prop_key(f, &p.key, r_k)?;
                        key_regs.push(r_k);
                    }
                    for (p, r_k) in props.iter().zip(&key_regs) {
                        let m2 = self.reg_mark(f);
                        let r_v = self.alloc(f)?;
                        self.emit(
                            f,
                            Instr::GetElem {
                                dst: r_v,
                                obj: value,
                                key: *r_k,
                            },
                        );
                        if let Some(default) = &p.default {
                            let have =
                                self.emit_jump(f, Instr::JumpIfUndefined { src: r_v, off: 0 });
                            let done = self.emit_jump(f, Instr::Jump { off: 0 });
                            self.patch_jump(f, have);
                            self.compile_expr(f, default, r_v)?;
                            self.patch_jump(f, done);
                        }
                        self.bind_pattern(f, &p.value, r_v, mode)?;
                        self.reg_reset(f, m2);
                    }
                    let rest = rest.as_ref().expect("rest checked above");
                    let r_obj = self.alloc(f)?;
                    self.emit(f, Instr::NewObject { dst: r_obj });
                    let excl_start = key_regs.first().copied().unwrap_or(Reg(0));
                    self.emit(
                        f,
                        Instr::CopyDataProps {
                            obj: r_obj,
                            src: value,
                            excl_start,
                            excl_count: key_regs.len() as u8,
                        },
                    );
                    self.bind_pattern(f, rest, r_obj, mode)?;
                } else {
                    for p in props {
                        let m2 = self.reg_mark(f);
                        let r_k = self.alloc(f)?;
                        self.compile_prop_key(f, &p.key, r_k)?;
                        let r_v = self.alloc(f)?;
                        self.emit(
                            f,
                            Instr::GetElem {
                                dst: r_v,
                                obj: value,
                                key: r_k,
                            },
                        );
                        if let Some(default) = &p.default {
                            let have =
                                self.emit_jump(f, Instr::JumpIfUndefined { src: r_v, off: 0 });
                            let done = self.emit_jump(f, Instr::Jump { off: 0 });
                            self.patch_jump(f, have);
                            self.compile_expr(f, default, r_v)?;
                            self.patch_jump(f, done);
                        }
                        self.bind_pattern(f, &p.value, r_v, mode)?;
                        self.reg_reset(f, m2);
                    }
                }
                self.reg_reset(f, mark);
                Ok(())
            }
        }
    }

    fn store_target<'a>(
        &mut self,
        f: &mut FnState<'a>,
        target: &'a AssignTarget,
        src: Reg,
    ) -> CResult<()> {
        match target {
            AssignTarget::Ident(name) => {
                self.bind_name(f, name, src, BindMode::Store);
                Ok(())
            }
            AssignTarget::Member { obj, prop } => {
                let mark = self.reg_mark(f);
                let r_obj = self.alloc(f)?;
                self.compile_expr(f, obj, r_obj)?;
                match prop {
                    MemberProp::Ident(name) => {
                        let pref = self.module.add_prop_ref(name);
                        self.emit(f, Instr::SetProp { obj: r_obj, pref, src });
                    }
                    MemberProp::Computed(key) => {
                        let r_k = self.alloc(f)?;
                        self.compile_expr(f, key, r_k)?;
                        self.emit(
                            f,
                            Instr::SetElem {
                                obj: r_obj,
                                key: r_k,
                                src,
                            },
                        );
                    }
                    MemberProp::Private(name) => {
                        let pname = self.resolve_private(name, f.current_line)?;
                        self.emit(f, Instr::SetPrivate { obj: r_obj, pname, src });
                    }
                }
                self.reg_reset(f, mark);
                Ok(())
            }
            AssignTarget::Pattern(pattern) => self.bind_pattern(f, pattern, src, BindMode::Store),
        }
    }

    fn load_target<'a>(
        &mut self,
        f: &mut FnState<'a>,
        target: &'a AssignTarget,
        dst: Reg,
    ) -> CResult<()> {
        match target {
            AssignTarget::Ident(name) => {
                let bref = self.bref(name);
                self.emit(f, Instr::LoadBinding { dst, bref });
                Ok(())
            }
            AssignTarget::Member { obj, prop } => {
                let mark = self.reg_mark(f);
                let r_obj = self.alloc(f)?;
                self.compile_expr(f, obj, r_obj)?;
                match prop {
                    MemberProp::Ident(name) => {
                        let pref = self.module.add_prop_ref(name);
                        self.emit(
                            f,
                            Instr::GetProp {
                                dst,
                                obj: r_obj,
                                pref,
                            },
                        );
                    }
                    MemberProp::Computed(key) => {
                        let r_k = self.alloc(f)?;
                        self.compile_expr(f, key, r_k)?;
                        self.emit(
                            f,
                            Instr::GetElem {
                                dst,
                                obj: r_obj,
                                key: r_k,
                            },
                        );
                    }
                    MemberProp::Private(name) => {
                        let pname = self.resolve_private(name, f.current_line)?;
                        self.emit(f, Instr::GetPrivate { dst, obj: r_obj, pname });
                    }
                }
                self.reg_reset(f, mark);
                Ok(())
            }
            AssignTarget::Pattern(_) => self.err("cannot read a destructuring target", f.current_line),
        }
    }

    // ---- expressions ----

    fn compile_expr<'a>(&mut self, f: &mut FnState<'a>, expr: &'a Expr, dst: Reg) -> CResult<()> {
        match expr {
            Expr::Number(n) => {
                self.const_num(f, dst, *n);
                Ok(())
            }
            Expr::BigIntLit(b) => {
                let idx = self.module.add_constant(Constant::BigInt(b.clone()));
                self.emit(f, Instr::LoadConst { dst, idx });
                Ok(())
            }
            Expr::Str(s) => {
                self.const_str(f, dst, s);
                Ok(())
            }
            Expr::Bool(true) => {
                self.emit(f, Instr::LoadTrue { dst });
                Ok(())
            }
            Expr::Bool(false) => {
                self.emit(f, Instr::LoadFalse { dst });
                Ok(())
            }
            Expr::Null => {
                self.emit(f, Instr::LoadNull { dst });
                Ok(())
            }
            Expr::This => {
                self.emit(f, Instr::LoadThis { dst });
                Ok(())
            }
            Expr::Ident(name) if name == "new.target" => {
                self.emit(f, Instr::LoadNewTarget { dst });
                Ok(())
            }
            Expr::Ident(name) => {
                let bref = self.bref(name);
                self.emit(f, Instr::LoadBinding { dst, bref });
                Ok(())
            }
            Expr::Template { quasis, exprs } => {
                self.const_str(f, dst, &quasis[0]);
                let mark = self.reg_mark(f);
                for (i, e) in exprs.iter().enumerate() {
                    let r = self.alloc(f)?;
                    self.compile_expr(f, e, r)?;
                    self.emit(f, Instr::Add { dst, lhs: dst, rhs: r });
                    if !quasis[i + 1].is_empty() {
                        self.const_str(f, r, &quasis[i + 1]);
                        self.emit(f, Instr::Add { dst, lhs: dst, rhs: r });
                    }
                    self.reg_reset(f, mark);
                }
                Ok(())
            }
            Expr::Array(elements) => {
                self.emit(f, Instr::NewArray { dst });
                let mark = self.reg_mark(f);
                for el in elements {
                    match el {
                        ArrayLitElem::Hole => self.emit(f, Instr::ArrayHole { arr: dst }),
                        ArrayLitElem::Item(e) => {
                            let r = self.alloc(f)?;
                            self.compile_expr(f, e, r)?;
                            self.emit(f, Instr::ArrayPush { arr: dst, src: r });
                            self.reg_reset(f, mark);
                        }
                        ArrayLitElem::Spread(e) => {
                            let r = self.alloc(f)?;
                            self.compile_expr(f, e, r)?;
                            self.emit(f, Instr::ArraySpread { arr: dst, src: r });
                            self.reg_reset(f, mark);
                        }
                    }
                }
                Ok(())
            }
            Expr::Object(props) => self.compile_object_literal(f, props, dst),
            Expr::Function(func) => {
                let idx = self.compile_function(func, 0, Vec::new())?;
                self.emit(f, Instr::NewClosure { dst, func: idx });
                Ok(())
            }
            Expr::Class(class) => self.compile_class(f, class, dst),
            Expr::Unary { op, arg } => self.compile_unary(f, *op, arg, dst),
            Expr::Update {
                delta,
                prefix,
                target,
            } => {
                let mark = self.reg_mark(f);
                let r_old = self.alloc(f)?;
                self.load_target(f, target, r_old)?;
                if *prefix {
                    let instr = if *delta > 0 {
                        Instr::Inc { dst, src: r_old }
                    } else {
                        Instr::Dec { dst, src: r_old }
                    };
                    self.emit(f, instr);
                    self.store_target(f, target, dst)?;
                } else {
                    self.emit(f, Instr::ToNumeric { dst, src: r_old });
                    let r_new = self.alloc(f)?;
                    let instr = if *delta > 0 {
                        Instr::Inc { dst: r_new, src: dst }
                    } else {
                        Instr::Dec { dst: r_new, src: dst }
                    };
                    self.emit(f, instr);
                    self.store_target(f, target, r_new)?;
                }
                self.reg_reset(f, mark);
                Ok(())
            }
            Expr::Binary { op, left, right } => {
                let mark = self.reg_mark(f);
                let r_l = self.alloc(f)?;
                self.compile_expr(f, left, r_l)?;
                let r_r = self.alloc(f)?;
                self.compile_expr(f, right, r_r)?;
                let instr = binary_instr(*op, dst, r_l, r_r);
                self.emit(f, instr);
                self.reg_reset(f, mark);
                Ok(())
            }
            Expr::Logical { op, left, right } => {
                self.compile_expr(f, left, dst)?;
                let patch = match op {
                    LogicalOp::And => self.emit_jump(f, Instr::JumpIfFalse { cond: dst, off: 0 }),
                    LogicalOp::Or => self.emit_jump(f, Instr::JumpIfTrue { cond: dst, off: 0 }),
                    LogicalOp::Nullish => {
                        let to_rhs = self.emit_jump(f, Instr::JumpIfNullish { src: dst, off: 0 });
                        let end = self.emit_jump(f, Instr::Jump { off: 0 });
                        self.patch_jump(f, to_rhs);
                        self.compile_expr(f, right, dst)?;
                        self.patch_jump(f, end);
                        return Ok(());
                    }
                };
                self.compile_expr(f, right, dst)?;
                self.patch_jump(f, patch);
                Ok(())
            }
            Expr::Assign { op, target, value } => {
                match op {
                    AssignOp::Assign => {
                        self.compile_expr(f, value, dst)?;
                        self.store_target(f, target, dst)?;
                    }
                    AssignOp::Binary(bin) => {
                        let mark = self.reg_mark(f);
                        let r_old = self.alloc(f)?;
                        self.load_target(f, target, r_old)?;
                        let r_val = self.alloc(f)?;
                        self.compile_expr(f, value, r_val)?;
                        let instr = binary_instr(*bin, dst, r_old, r_val);
                        self.emit(f, instr);
                        self.store_target(f, target, dst)?;
                        self.reg_reset(f, mark);
                    }
                    AssignOp::And | AssignOp::Or | AssignOp::Nullish => {
                        self.load_target(f, target, dst)?;
                        let skip = match op {
                            AssignOp::And => {
                                self.emit_jump(f, Instr::JumpIfFalse { cond: dst, off: 0 })
                            }
                            AssignOp::Or => {
                                self.emit_jump(f, Instr::JumpIfTrue { cond: dst, off: 0 })
                            }
                            _ => {
                                let to_rhs =
                                    self.emit_jump(f, Instr::JumpIfNullish { src: dst, off: 0 });
                                let end = self.emit_jump(f, Instr::Jump { off: 0 });
                                self.patch_jump(f, to_rhs);
                                self.compile_expr(f, value, dst)?;
                                self.store_target(f, target, dst)?;
                                self.patch_jump(f, end);
                                return Ok(());
                            }
                        };
                        self.compile_expr(f, value, dst)?;
                        self.store_target(f, target, dst)?;
                        self.patch_jump(f, skip);
                    }
                }
                Ok(())
            }
            Expr::Cond { test, cons, alt } => {
                let mark = self.reg_mark(f);
                let r_t = self.alloc(f)?;
                self.compile_expr(f, test, r_t)?;
                let to_alt = self.emit_jump(f, Instr::JumpIfFalse { cond: r_t, off: 0 });
                self.reg_reset(f, mark);
                self.compile_expr(f, cons, dst)?;
                let end = self.emit_jump(f, Instr::Jump { off: 0 });
                self.patch_jump(f, to_alt);
                self.compile_expr(f, alt, dst)?;
                self.patch_jump(f, end);
                Ok(())
            }
            Expr::Call { callee, args, line } => self.compile_call(f, callee, args, *line, dst),
            Expr::New { callee, args } => {
                let mark = self.reg_mark(f);
                let r_f = self.alloc(f)?;
                self.compile_expr(f, callee, r_f)?;
                if args.iter().any(|a| matches!(a, CallArg::Spread(_))) {
                    let r_args = self.alloc(f)?;
                    self.compile_spread_args(f, args, r_args)?;
                    self.emit(
                        f,
                        Instr::ConstructVarargs {
                            dst,
                            func: r_f,
                            args: r_args,
                        },
                    );
                } else {
                    let (argv, argc) = self.compile_plain_args(f, args)?;
                    self.emit(
                        f,
                        Instr::Construct {
                            dst,
                            func: r_f,
                            argv,
                            argc,
                        },
                    );
                }
                self.reg_reset(f, mark);
                Ok(())
            }
            Expr::Member { obj, prop } => {
                let mark = self.reg_mark(f);
                let r_obj = self.alloc(f)?;
                self.compile_expr(f, obj, r_obj)?;
                match prop {
                    MemberProp::Ident(name) => {
                        let pref = self.module.add_prop_ref(name);
                        self.emit(
                            f,
                            Instr::GetProp {
                                dst,
                                obj: r_obj,
                                pref,
                            },
                        );
                    }
                    MemberProp::Computed(key) => {
                        let r_k = self.alloc(f)?;
                        self.compile_expr(f, key, r_k)?;
                        self.emit(
                            f,
                            Instr::GetElem {
                                dst,
                                obj: r_obj,
                                key: r_k,
                            },
                        );
                    }
                    MemberProp::Private(name) => {
                        let pname = self.resolve_private(name, f.current_line)?;
                        self.emit(f, Instr::GetPrivate { dst, obj: r_obj, pname });
                    }
                }
                self.reg_reset(f, mark);
                Ok(())
            }
            Expr::SuperCall(args) => {
                let mark = self.reg_mark(f);
                if args.iter().any(|a| matches!(a, CallArg::Spread(_))) {
                    return self.err("spread in super() is not supported", f.current_line);
                }
                let (argv, argc) = self.compile_plain_args(f, args)?;
                self.emit(f, Instr::SuperCall { dst, argv, argc });
                self.reg_reset(f, mark);
                // field initializers run once this is bound
                if f.in_derived_ctor && !f.instance_fields.is_empty() {
                    self.compile_instance_fields(f)?;
                }
                Ok(())
            }
            Expr::SuperMember(prop) => {
                let mark = self.reg_mark(f);
                let r_k = self.alloc(f)?;
                match prop {
                    MemberProp::Ident(name) => self.const_str(f, r_k, name),
                    MemberProp::Computed(key) => self.compile_expr(f, key, r_k)?,
                    MemberProp::Private(_) => {
                        return self.err("super private access is not valid", f.current_line)
                    }
                }
                self.emit(f, Instr::GetSuperProp { dst, key: r_k });
                self.reg_reset(f, mark);
                Ok(())
            }
            Expr::Yield { arg, delegate } => {
                let mark = self.reg_mark(f);
                let r = self.alloc(f)?;
                match arg {
                    Some(e) => self.compile_expr(f, e, r)?,
                    None => self.emit(f, Instr::LoadUndefined { dst: r }),
                }
                if *delegate {
                    // yield*: drain the operand's iterator
                    let r_iter = self.alloc(f)?;
                    self.emit(f, Instr::GetIterator { dst: r_iter, src: r });
                    let loop_start = self.here(f);
                    let r_v = self.alloc(f)?;
                    let exit = self.emit_jump(
                        f,
                        Instr::ForOfNext {
                            dst: r_v,
                            iter: r_iter,
                            off: 0,
                        },
                    );
                    self.emit(f, Instr::Yield { dst: r_v, src: r_v });
                    self.jump_back(f, loop_start);
                    self.patch_jump(f, exit);
                    self.emit(f, Instr::LoadUndefined { dst });
                } else {
                    self.emit(f, Instr::Yield { dst, src: r });
                }
                self.reg_reset(f, mark);
                Ok(())
            }
            Expr::Await(arg) => {
                let mark = self.reg_mark(f);
                let r = self.alloc(f)?;
                self.compile_expr(f, arg, r)?;
                self.emit(f, Instr::Await { dst, src: r });
                self.reg_reset(f, mark);
                Ok(())
            }
            Expr::Sequence(exprs) => {
                for (i, e) in exprs.iter().enumerate() {
                    if i + 1 == exprs.len() {
                        self.compile_expr(f, e, dst)?;
                    } else {
                        let mark = self.reg_mark(f);
                        let r = self.alloc(f)?;
                        self.compile_expr(f, e, r)?;
                        self.reg_reset(f, mark);
                    }
                }
                Ok(())
            }
        }
    }

    fn compile_unary<'a>(
        &mut self,
        f: &mut FnState<'a>,
        op: UnaryOp,
        arg: &'a Expr,
        dst: Reg,
    ) -> CResult<()> {
        // delete and typeof see through to the reference
        match (op, arg) {
            (UnaryOp::Delete, Expr::Member { obj, prop }) => {
                let mark = self.reg_mark(f);
                let r_obj = self.alloc(f)?;
                self.compile_expr(f, obj, r_obj)?;
                match prop {
                    MemberProp::Ident(name) => {
                        let pref = self.module.add_prop_ref(name);
                        self.emit(
                            f,
                            Instr::DeleteProp {
                                dst,
                                obj: r_obj,
                                pref,
                            },
                        );
                    }
                    MemberProp::Computed(key) => {
                        let r_k = self.alloc(f)?;
                        self.compile_expr(f, key, r_k)?;
                        self.emit(
                            f,
                            Instr::DeleteElem {
                                dst,
                                obj: r_obj,
                                key: r_k,
                            },
                        );
                    }
                    MemberProp::Private(_) => {
                        return self.err("cannot delete a private member", f.current_line)
                    }
                }
                self.reg_reset(f, mark);
                return Ok(());
            }
            (UnaryOp::Delete, Expr::Ident(name)) => {
                let bref = self.bref(name);
                self.emit(f, Instr::DeleteBinding { dst, bref });
                return Ok(());
            }
            (UnaryOp::TypeOf, Expr::Ident(name)) if name != "new.target" => {
                let bref = self.bref(name);
                self.emit(f, Instr::TypeofBinding { dst, bref });
                return Ok(());
            }
            _ => {}
        }
        let mark = self.reg_mark(f);
        let r = self.alloc(f)?;
        self.compile_expr(f, arg, r)?;
        let instr = match op {
            UnaryOp::Neg => Instr::Neg { dst, src: r },
            UnaryOp::Plus => Instr::ToNumber { dst, src: r },
            UnaryOp::Not => Instr::Not { dst, src: r },
            UnaryOp::BitNot => Instr::BitNot { dst, src: r },
            UnaryOp::TypeOf => Instr::TypeOf { dst, src: r },
            UnaryOp::Void => Instr::LoadUndefined { dst },
            UnaryOp::Delete => Instr::LoadTrue { dst },
        };
        self.emit(f, instr);
        self.reg_reset(f, mark);
        Ok(())
    }

    fn compile_object_literal<'a>(
        &mut self,
        f: &mut FnState<'a>,
        props: &'a [ObjectLitProp],
        dst: Reg,
    ) -> CResult<()> {
        self.emit(f, Instr::NewObject { dst });
        let mark = self.reg_mark(f);
        for p in props {
            match p {
                ObjectLitProp::KeyValue { key, value } => match key {
                    PropKey::Ident(name) | PropKey::Str(name) => {
                        let r = self.alloc(f)?;
                        self.compile_expr(f, value, r)?;
                        let pref = self.module.add_prop_ref(name);
                        self.emit(f, Instr::DefineProp { obj: dst, pref, src: r });
                    }
                    _ => {
                        let r_k = self.alloc(f)?;
                        self.compile_prop_key(f, key, r_k)?;
                        let r_v = self.alloc(f)?;
                        self.compile_expr(f, value, r_v)?;
                        self.emit(
                            f,
                            Instr::DefineElem {
                                obj: dst,
                                key: r_k,
                                src: r_v,
                            },
                        );
                    }
                },
                ObjectLitProp::Shorthand(name) => {
                    let r = self.alloc(f)?;
                    let bref = self.bref(name);
                    self.emit(f, Instr::LoadBinding { dst: r, bref });
                    let pref = self.module.add_prop_ref(name);
                    self.emit(f, Instr::DefineProp { obj: dst, pref, src: r });
                }
                ObjectLitProp::Method { key, kind, func } => {
                    let flags = FunctionFlags::METHOD | FunctionFlags::NEEDS_HOME;
                    let idx = self.compile_function(func, flags, Vec::new())?;
                    let r_m = self.alloc(f)?;
                    self.emit(f, Instr::NewClosure { dst: r_m, func: idx });
                    let r_k = self.alloc(f)?;
                    self.compile_prop_key(f, key, r_k)?;
                    self.emit(
                        f,
                        Instr::DefineMethod {
                            obj: dst,
                            key: r_k,
                            func: r_m,
                            kind: method_kind_bits(*kind, false),
                        },
                    );
                }
                ObjectLitProp::Spread(e) => {
                    let r = self.alloc(f)?;
                    self.compile_expr(f, e, r)?;
                    self.emit(
                        f,
                        Instr::CopyDataProps {
                            obj: dst,
                            src: r,
                            excl_start: Reg(0),
                            excl_count: 0,
                        },
                    );
                }
            }
            self.reg_reset(f, mark);
        }
        Ok(())
    }

    fn compile_plain_args<'a>(
        &mut self,
        f: &mut FnState<'a>,
        args: &'a [CallArg],
    ) -> CResult<(Reg, u8)> {
        if args.len() > 255 {
            return self.err("too many arguments", f.current_line);
        }
        let argv = Reg(f.next_reg as u8);
        for a in args {
            let r = self.alloc(f)?;
            match a {
                CallArg::Normal(e) => self.compile_expr(f, e, r)?,
                CallArg::Spread(_) => unreachable!("spread handled by varargs path"),
            }
        }
        Ok((argv, args.len() as u8))
    }

    fn compile_spread_args<'a>(
        &mut self,
        f: &mut FnState<'a>,
        args: &'a [CallArg],
        dst: Reg,
    ) -> CResult<()> {
        self.emit(f, Instr::NewArray { dst });
        let mark = self.reg_mark(f);
        for a in args {
            let r = self.alloc(f)?;
            match a {
                CallArg::Normal(e) => {
                    self.compile_expr(f, e, r)?;
                    self.emit(f, Instr::ArrayPush { arr: dst, src: r });
                }
                CallArg::Spread(e) => {
                    self.compile_expr(f, e, r)?;
                    self.emit(f, Instr::ArraySpread { arr: dst, src: r });
                }
            }
            self.reg_reset(f, mark);
        }
        Ok(())
    }

    fn compile_call<'a>(
        &mut self,
        f: &mut FnState<'a>,
        callee: &'a Expr,
        args: &'a [CallArg],
        line: u32,
        dst: Reg,
    ) -> CResult<()> {
        self.mark_line(f, line);
        // indirect eval
        if let Expr::Ident(name) = callee {
            if name == "eval" {
                let mark = self.reg_mark(f);
                let r = self.alloc(f)?;
                match args.first() {
                    Some(CallArg::Normal(e)) => self.compile_expr(f, e, r)?,
                    _ => self.emit(f, Instr::LoadUndefined { dst: r }),
                }
                self.emit(f, Instr::Eval { dst, src: r });
                self.reg_reset(f, mark);
                return Ok(());
            }
        }

        let mark = self.reg_mark(f);
        let r_this = self.alloc(f)?;
        let r_f = self.alloc(f)?;
        match callee {
            Expr::Member { obj, prop } => {
                self.compile_expr(f, obj, r_this)?;
                match prop {
                    MemberProp::Ident(name) => {
                        let pref = self.module.add_prop_ref(name);
                        self.emit(
                            f,
                            Instr::GetProp {
                                dst: r_f,
                                obj: r_this,
                                pref,
                            },
                        );
                    }
                    MemberProp::Computed(key) => {
                        let r_k = self.alloc(f)?;
                        self.compile_expr(f, key, r_k)?;
                        self.emit(
                            f,
                            Instr::GetElem {
                                dst: r_f,
                                obj: r_this,
                                key: r_k,
                            },
                        );
                        self.reg_reset(f, mark + 2);
                    }
                    MemberProp::Private(name) => {
                        let pname = self.resolve_private(name, f.current_line)?;
                        self.emit(
                            f,
                            Instr::GetPrivate {
                                dst: r_f,
                                obj: r_this,
                                pname,
                            },
                        );
                    }
                }
            }
            Expr::SuperMember(prop) => {
                self.emit(f, Instr::LoadThis { dst: r_this });
                let r_k = self.alloc(f)?;
                match prop {
                    MemberProp::Ident(name) => self.const_str(f, r_k, name),
                    MemberProp::Computed(key) => self.compile_expr(f, key, r_k)?,
                    MemberProp::Private(_) => {
                        return self.err("super private access is not valid", f.current_line)
                    }
                }
                self.emit(f, Instr::GetSuperProp { dst: r_f, key: r_k });
                self.reg_reset(f, mark + 2);
            }
            other => {
                self.emit(f, Instr::LoadUndefined { dst: r_this });
                self.compile_expr(f, other, r_f)?;
            }
        }

        if args.iter().any(|a| matches!(a, CallArg::Spread(_))) {
            let r_args = self.alloc(f)?;
            self.compile_spread_args(f, args, r_args)?;
            self.emit(
                f,
                Instr::CallVarargs {
                    dst,
                    func: r_f,
                    this: r_this,
                    args: r_args,
                },
            );
        } else {
            let (argv, argc) = self.compile_plain_args(f, args)?;
            self.emit(
                f,
                Instr::Call {
                    dst,
                    func: r_f,
                    this: r_this,
                    argv,
                    argc,
                },
            );
        }
        self.reg_reset(f, mark);
        Ok(())
    }

    fn compile_class<'a>(
        &mut self,
        f: &mut FnState<'a>,
        class: &'a ClassExpr,
        dst: Reg,
    ) -> CResult<()> {
        // open the private-name scope of the class body
        let mut priv_scope = Vec::new();
        for m in &class.members {
            if let PropKey::Private(name) = &m.key {
                let idx = self.module.private_names.len() as u16;
                self.module.private_names.push(name.clone());
                priv_scope.push((name.clone(), idx));
            }
        }
        let has_priv = !priv_scope.is_empty();
        let penv = if has_priv {
            let names = priv_scope.iter().map(|(_, i)| *i).collect();
            let idx = self.module.private_envs.len() as u16;
            self.module.private_envs.push(PrivateEnvInfo { names });
            self.priv_names.push(priv_scope);
            Some(idx)
        } else {
            None
        };
        if let Some(penv) = penv {
            self.emit(f, Instr::PushPrivateEnv { penv });
            f.priv_depth += 1;
        }

        let mark = self.reg_mark(f);
        let r_heritage = if let Some(sup) = &class.superclass {
            let r = self.alloc(f)?;
            self.compile_expr(f, sup, r)?;
            Some(r)
        } else {
            None
        };

        // constructor
        let instance_fields: Vec<&ClassMember> = class
            .members
            .iter()
            .filter(|m| matches!(m.kind, ClassMemberKind::Field(_)) && !m.is_static)
            .collect();
        let mut ctor_flags = FunctionFlags::CLASS_CTOR | FunctionFlags::NEEDS_HOME;
        if class.superclass.is_some() {
            ctor_flags |= FunctionFlags::DERIVED_CTOR;
        }
        let ctor_ast;
        let ctor_func = match class
            .members
            .iter()
            .find_map(|m| match &m.kind {
                ClassMemberKind::Constructor(func) => Some(func),
                _ => None,
            }) {
            Some(func) => func,
            None => {
                ctor_ast = default_constructor(class);
                &ctor_ast
            }
        };
        let ctor_idx = self.compile_function(ctor_func, ctor_flags, instance_fields)?;
        let r_ctor = self.alloc(f)?;
        self.emit(f, Instr::NewClosure { dst: r_ctor, func: ctor_idx });

        // wire the prototype chain
        let proto_ref = self.module.add_prop_ref("prototype");
        let r_proto = self.alloc(f)?;
        self.emit(
            f,
            Instr::GetProp {
                dst: r_proto,
                obj: r_ctor,
                pref: proto_ref,
            },
        );
        if let Some(r_h) = r_heritage {
            let r_hp = self.alloc(f)?;
            let hp_ref = self.module.add_prop_ref("prototype");
            self.emit(
                f,
                Instr::GetProp {
                    dst: r_hp,
                    obj: r_h,
                    pref: hp_ref,
                },
            );
            self.emit(f, Instr::SetPrototype { obj: r_proto, proto: r_hp });
            self.emit(f, Instr::SetPrototype { obj: r_ctor, proto: r_h });
        }
        self.emit(f, Instr::SetHomeObject { func: r_ctor, obj: r_proto });

        // methods and static fields
        for m in &class.members {
            match &m.kind {
                ClassMemberKind::Constructor(_) => {}
                ClassMemberKind::Method { kind, func } => {
                    let flags = FunctionFlags::METHOD | FunctionFlags::NEEDS_HOME;
                    let idx = self.compile_function(func, flags, Vec::new())?;
                    let target = if m.is_static { r_ctor } else { r_proto };
                    let m2 = self.reg_mark(f);
                    let r_m = self.alloc(f)?;
                    self.emit(f, Instr::NewClosure { dst: r_m, func: idx });
                    match &m.key {
                        PropKey::Private(name) => {
                            let pname = self.resolve_private(name, f.current_line)?;
                            self.emit(
                                f,
                                Instr::DefinePrivateMethod {
                                    obj: target,
                                    pname,
                                    func: r_m,
                                    kind: method_kind_bits(*kind, true),
                                },
                            );
                        }
                        key => {
                            let r_k = self.alloc(f)?;
                            self.compile_prop_key(f, key, r_k)?;
                            self.emit(
                                f,
                                Instr::DefineMethod {
                                    obj: target,
                                    key: r_k,
                                    func: r_m,
                                    kind: method_kind_bits(*kind, true),
                                },
                            );
                        }
                    }
                    self.reg_reset(f, m2);
                }
                ClassMemberKind::Field(init) if m.is_static => {
                    let m2 = self.reg_mark(f);
                    let r_v = self.alloc(f)?;
                    match init {
                        Some(e) => self.compile_expr(f, e, r_v)?,
                        None => self.emit(f, Instr::LoadUndefined { dst: r_v }),
                    }
                    match &m.key {
                        PropKey::Private(name) => {
                            let pname = self.resolve_private(name, f.current_line)?;
                            self.emit(
                                f,
                                Instr::DefinePrivateField {
                                    obj: r_ctor,
                                    pname,
                                    src: r_v,
                                },
                            );
                        }
                        key => {
                            let r_k = self.alloc(f)?;
                            self.compile_prop_key(f, key, r_k)?;
                            self.emit(
                                f,
                                Instr::DefineElem {
                                    obj: r_ctor,
                                    key: r_k,
                                    src: r_v,
                                },
                            );
                        }
                    }
                    self.reg_reset(f, m2);
                }
                ClassMemberKind::Field(_) => {}
            }
        }

        self.emit(f, Instr::Move { dst, src: r_ctor });
        self.reg_reset(f, mark);
        if penv.is_some() {
            self.emit(f, Instr::PopPrivateEnv {});
            f.priv_depth -= 1;
            self.priv_names.pop();
        }
        Ok(())
    }
}

/// `kind` operand bits for `define_method`: low bits are the method
/// kind, bit 2 marks a non-enumerable (class) definition.
fn method_kind_bits(kind: MethodKind, class_member: bool) -> u8 {
    let base = match kind {
        MethodKind::Method => 0,
        MethodKind::Get => 1,
        MethodKind::Set => 2,
    };
    if class_member {
        base | 4
    } else {
        base
    }
}

fn binary_instr(op: BinaryOp, dst: Reg, lhs: Reg, rhs: Reg) -> Instr {
    match op {
        BinaryOp::Add => Instr::Add { dst, lhs, rhs },
        BinaryOp::Sub => Instr::Sub { dst, lhs, rhs },
        BinaryOp::Mul => Instr::Mul { dst, lhs, rhs },
        BinaryOp::Div => Instr::Div { dst, lhs, rhs },
        BinaryOp::Mod => Instr::Mod { dst, lhs, rhs },
        BinaryOp::Exp => Instr::Exp { dst, lhs, rhs },
        BinaryOp::Eq => Instr::Eq { dst, lhs, rhs },
        BinaryOp::Ne => Instr::Ne { dst, lhs, rhs },
        BinaryOp::StrictEq => Instr::StrictEq { dst, lhs, rhs },
        BinaryOp::StrictNe => Instr::StrictNe { dst, lhs, rhs },
        BinaryOp::Lt => Instr::Lt { dst, lhs, rhs },
        BinaryOp::Le => Instr::Le { dst, lhs, rhs },
        BinaryOp::Gt => Instr::Gt { dst, lhs, rhs },
        BinaryOp::Ge => Instr::Ge { dst, lhs, rhs },
        BinaryOp::BitAnd => Instr::BitAnd { dst, lhs, rhs },
        BinaryOp::BitOr => Instr::BitOr { dst, lhs, rhs },
        BinaryOp::BitXor => Instr::BitXor { dst, lhs, rhs },
        BinaryOp::Shl => Instr::Shl { dst, lhs, rhs },
        BinaryOp::Shr => Instr::Shr { dst, lhs, rhs },
        BinaryOp::UShr => Instr::UShr { dst, lhs, rhs },
        BinaryOp::InstanceOf => Instr::InstanceOf { dst, lhs, rhs },
        BinaryOp::In => Instr::In { dst, key: lhs, obj: rhs },
    }
}

/// Synthesized default constructor: empty for base classes,
/// argument-forwarding `super(...)` for derived ones.
fn default_constructor(class: &ClassExpr) -> FunctionExpr {
    let body = if class.superclass.is_some() {
        vec![Stmt::Expr {
            expr: Expr::SuperCall(vec![CallArg::Spread(Expr::Ident("arguments".to_string()))]),
            line: 0,
        }]
    } else {
        Vec::new()
    };
    FunctionExpr {
        name: class.name.clone(),
        params: Vec::new(),
        body,
        is_arrow: false,
        is_async: false,
        is_generator: false,
        line: 0,
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum IterMode {
    In,
    Of,
    AwaitOf,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_script;
    use bytecode_system::disassemble;

    fn compile_src(src: &str) -> BytecodeModule {
        let program = parse_script(src).unwrap();
        compile(&program, "test.js").unwrap()
    }

    #[test]
    fn test_simple_script_compiles() {
        let m = compile_src("let s=0;for(let i=1;i<=100;i++)s+=i;s");
        assert_eq!(m.functions.len(), 1);
        assert!(m.functions[0].register_count >= 1);
        let text = disassemble(&m);
        assert!(text.contains("push_scope"));
        assert!(text.contains("jump_if_false"));
        assert!(text.contains("return"));
    }

    #[test]
    fn test_nested_function_gets_table_entry() {
        let m = compile_src("function add(a, b) { return a + b; } add(1, 2)");
        assert_eq!(m.functions.len(), 2);
        assert_eq!(m.functions[1].name, "add");
        assert_eq!(m.functions[1].param_count, 2);
        assert_eq!(m.func_decls.len(), 1);
    }

    #[test]
    fn test_generator_flag_set() {
        let m = compile_src("function*g(){yield 1;yield 2}");
        assert!(m.functions[1].flags.has(FunctionFlags::GENERATOR));
        let text = disassemble(&m);
        assert!(text.contains("yield"));
    }

    #[test]
    fn test_async_flag_and_await() {
        let m = compile_src("async function f(){return await 41+1}");
        assert!(m.functions[1].flags.has(FunctionFlags::ASYNC));
        let text = disassemble(&m);
        assert!(text.contains("await"));
    }

    #[test]
    fn test_try_region_emitted() {
        let m = compile_src("try{throw {x:7}}catch(e){e.x}");
        assert_eq!(m.try_regions.len(), 1);
        let r = &m.try_regions[0];
        assert!(matches!(r.kind, TryRegionKind::Catch(_)));
        assert!(r.start < r.end);
        assert!(r.handler >= r.end);
    }

    #[test]
    fn test_finally_region_emitted() {
        let m = compile_src("try{a()}finally{b()}");
        assert!(m
            .try_regions
            .iter()
            .any(|r| matches!(r.kind, TryRegionKind::Finally)));
        let text = disassemble(&m);
        assert!(text.contains("finally_end"));
    }

    #[test]
    fn test_branches_stay_in_function() {
        let m = compile_src(
            "function f(n){let t=0;for(let i=0;i<n;i++){if(i%2){t+=i}else{t-=i}}return t}",
        );
        for (idx, func) in m.functions.iter().enumerate() {
            let start = func.code_start as usize;
            let end = start + func.code_len as usize;
            let mut at = start;
            while at < end {
                let (instr, next) = bytecode_system::decode_instr(&m.code, at).unwrap();
                for op in instr.operands() {
                    if let bytecode_system::Operand::Label(off) = op {
                        let target = (next as i64 + off as i64) as usize;
                        assert!(
                            target >= start && target < end,
                            "branch leaves function {} at {}",
                            idx,
                            at
                        );
                    }
                }
                at = next;
            }
        }
    }

    #[test]
    fn test_scope_push_pop_balance() {
        let m = compile_src("{let a=1;{let b=2;{let c=3;a+b+c}}}");
        let mut depth: i32 = 0;
        let mut at = 0;
        let f = &m.functions[0];
        let end = (f.code_start + f.code_len) as usize;
        while at < end {
            let (instr, next) = bytecode_system::decode_instr(&m.code, at).unwrap();
            match instr {
                Instr::PushScope { .. } => depth += 1,
                Instr::PopScope {} => {
                    depth -= 1;
                    assert!(depth >= 0, "pop without push at {}", at);
                }
                _ => {}
            }
            at = next;
        }
        assert_eq!(depth, 0);
    }

    #[test]
    fn test_class_with_private_names() {
        let m = compile_src(
            "class C { #n = 1; get value(){ return this.#n; } static make(){ return new C(); } }",
        );
        assert_eq!(m.private_names, vec!["n"]);
        assert_eq!(m.private_envs.len(), 1);
        let text = disassemble(&m);
        assert!(text.contains("push_priv_env"));
        assert!(text.contains("priv_field_add"));
    }

    #[test]
    fn test_destructuring_compiles() {
        let m = compile_src("let {a, b: [c, d = 2], ...rest} = obj; [a, c] = [c, a];");
        let text = disassemble(&m);
        assert!(text.contains("get_iterator"));
        assert!(text.contains("copy_data_props"));
    }

    #[test]
    fn test_spread_call_uses_varargs() {
        let m = compile_src("f(...xs, 1)");
        let text = disassemble(&m);
        assert!(text.contains("call_varargs"));
        assert!(text.contains("array_spread"));
    }

    #[test]
    fn test_script_vars_marked_for_global_binding() {
        let m = compile_src("var x = 1; let y = 2;");
        let group = m.functions[0].scope_group as usize;
        let g = m.binding_groups[group];
        let rows: Vec<_> = m.bindings[g.start as usize..(g.start + g.len) as usize].to_vec();
        let var_rows: Vec<&str> = rows
            .iter()
            .filter(|b| b.flags.has(BindingFlags::VAR))
            .map(|b| m.binding_refs[b.bref as usize].name.as_str())
            .collect();
        assert_eq!(var_rows, vec!["x"]);
    }

    #[test]
    fn test_for_in_and_of() {
        let m = compile_src("for (const k in o) { k; } for (const v of xs) { v; }");
        let text = disassemble(&m);
        assert!(text.contains("for_in_init"));
        assert!(text.contains("for_in_next"));
        assert!(text.contains("get_iterator"));
        assert!(text.contains("for_of_next"));
    }

    #[test]
    fn test_labelled_break_targets_outer_loop() {
        compile_src("outer: for(let i=0;i<3;i++){ for(let j=0;j<3;j++){ if (j) break outer; } }");
    }
}
