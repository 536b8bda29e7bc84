//! Binary serialization of bytecode modules.
//!
//! Layout: an 8-byte header (`b"FEBC"`, version, flags, reserved)
//! followed by length-prefixed sections in a fixed order: constants,
//! bindings, binding-references, property-references, binding-groups,
//! function-declarations, function-declaration-groups, private-names,
//! private-environments, functions, code, line-info, try-regions,
//! imports, exports. All integers are little-endian.

use crate::constant::Constant;
use crate::module::{
    Binding, BindingFlags, BindingRef, BytecodeModule, ExportEntry, FuncDecl, FunctionFlags,
    FunctionInfo, Group, ImportEntry, LineEntry, PrivateEnvInfo, TryRegion, TryRegionKind,
};
use crate::opcode::Reg;

const MAGIC: &[u8; 4] = b"FEBC";
const VERSION: u8 = 1;

struct Writer {
    buf: Vec<u8>,
}

impl Writer {
    fn u8(&mut self, v: u8) {
        self.buf.push(v);
    }
    fn u16(&mut self, v: u16) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }
    fn u32(&mut self, v: u32) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }
    fn str(&mut self, s: &str) {
        self.u32(s.len() as u32);
        self.buf.extend_from_slice(s.as_bytes());
    }
}

struct Reader<'a> {
    buf: &'a [u8],
    at: usize,
}

impl<'a> Reader<'a> {
    fn u8(&mut self) -> Result<u8, String> {
        let v = *self.buf.get(self.at).ok_or("unexpected end of input")?;
        self.at += 1;
        Ok(v)
    }
    fn u16(&mut self) -> Result<u16, String> {
        let b = self
            .buf
            .get(self.at..self.at + 2)
            .ok_or("unexpected end of input")?;
        self.at += 2;
        Ok(u16::from_le_bytes(b.try_into().unwrap()))
    }
    fn u32(&mut self) -> Result<u32, String> {
        let b = self
            .buf
            .get(self.at..self.at + 4)
            .ok_or("unexpected end of input")?;
        self.at += 4;
        Ok(u32::from_le_bytes(b.try_into().unwrap()))
    }
    fn str(&mut self) -> Result<String, String> {
        let len = self.u32()? as usize;
        let b = self
            .buf
            .get(self.at..self.at + len)
            .ok_or("unexpected end of input")?;
        self.at += len;
        String::from_utf8(b.to_vec()).map_err(|e| format!("invalid utf-8: {}", e))
    }
    fn bytes(&mut self, len: usize) -> Result<&'a [u8], String> {
        let b = self
            .buf
            .get(self.at..self.at + len)
            .ok_or("unexpected end of input")?;
        self.at += len;
        Ok(b)
    }
}

impl BytecodeModule {
    /// Serialize the module to its binary form.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut w = Writer { buf: Vec::new() };
        w.buf.extend_from_slice(MAGIC);
        w.u8(VERSION);
        w.u8(if self.is_module { 1 } else { 0 });
        w.u16(0); // reserved
        w.str(&self.source_name);

        w.u32(self.constants.len() as u32);
        for c in &self.constants {
            c.write(&mut w.buf);
        }

        w.u32(self.bindings.len() as u32);
        for b in &self.bindings {
            w.u16(b.bref);
            w.u8(b.flags.0);
        }

        w.u32(self.binding_refs.len() as u32);
        for r in &self.binding_refs {
            w.str(&r.name);
        }

        w.u32(self.prop_refs.len() as u32);
        for p in &self.prop_refs {
            w.str(p);
        }

        w.u32(self.binding_groups.len() as u32);
        for g in &self.binding_groups {
            w.u32(g.start);
            w.u32(g.len);
        }

        w.u32(self.func_decls.len() as u32);
        for d in &self.func_decls {
            w.u16(d.func);
            w.u16(d.bref);
        }

        w.u32(self.func_groups.len() as u32);
        for g in &self.func_groups {
            w.u32(g.start);
            w.u32(g.len);
        }

        w.u32(self.private_names.len() as u32);
        for n in &self.private_names {
            w.str(n);
        }

        w.u32(self.private_envs.len() as u32);
        for e in &self.private_envs {
            w.u32(e.names.len() as u32);
            for n in &e.names {
                w.u16(*n);
            }
        }

        w.u32(self.functions.len() as u32);
        for f in &self.functions {
            w.str(&f.name);
            w.u8(f.param_count);
            w.u16(f.flags.0);
            w.u32(f.code_start);
            w.u32(f.code_len);
            w.u16(f.register_count);
            w.u16(f.scope_group);
            w.u16(f.func_group);
            w.u32(f.line);
        }

        w.u32(self.code.len() as u32);
        w.buf.extend_from_slice(&self.code);

        w.u32(self.line_table.len() as u32);
        for e in &self.line_table {
            w.u32(e.offset);
            w.u32(e.line);
        }

        w.u32(self.try_regions.len() as u32);
        for r in &self.try_regions {
            w.u32(r.start);
            w.u32(r.end);
            w.u32(r.handler);
            match r.kind {
                TryRegionKind::Catch(reg) => {
                    w.u8(0);
                    w.u8(reg.0);
                }
                TryRegionKind::Finally => {
                    w.u8(1);
                    w.u8(0);
                }
            }
            w.u16(r.scope_depth);
            w.u16(r.priv_depth);
        }

        w.u32(self.imports.len() as u32);
        for i in &self.imports {
            w.str(&i.specifier);
            w.str(&i.import_name);
            w.str(&i.local);
        }

        w.u32(self.exports.len() as u32);
        for e in &self.exports {
            w.str(&e.local);
            w.str(&e.export_name);
        }

        w.buf
    }

    /// Deserialize a module from its binary form.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, String> {
        let mut r = Reader { buf: bytes, at: 0 };
        if r.bytes(4)? != MAGIC {
            return Err("bad magic number".to_string());
        }
        let version = r.u8()?;
        if version != VERSION {
            return Err(format!("unsupported bytecode version {}", version));
        }
        let is_module = r.u8()? != 0;
        r.u16()?; // reserved
        let source_name = r.str()?;

        let mut m = BytecodeModule::new(source_name);
        m.is_module = is_module;

        let n = r.u32()?;
        for _ in 0..n {
            let (c, next) = Constant::read(r.buf, r.at)?;
            r.at = next;
            m.constants.push(c);
        }

        let n = r.u32()?;
        for _ in 0..n {
            m.bindings.push(Binding {
                bref: r.u16()?,
                flags: BindingFlags(r.u8()?),
            });
        }

        let n = r.u32()?;
        for _ in 0..n {
            m.binding_refs.push(BindingRef { name: r.str()? });
        }

        let n = r.u32()?;
        for _ in 0..n {
            m.prop_refs.push(r.str()?);
        }

        let n = r.u32()?;
        for _ in 0..n {
            m.binding_groups.push(Group {
                start: r.u32()?,
                len: r.u32()?,
            });
        }

        let n = r.u32()?;
        for _ in 0..n {
            m.func_decls.push(FuncDecl {
                func: r.u16()?,
                bref: r.u16()?,
            });
        }

        let n = r.u32()?;
        for _ in 0..n {
            m.func_groups.push(Group {
                start: r.u32()?,
                len: r.u32()?,
            });
        }

        let n = r.u32()?;
        for _ in 0..n {
            m.private_names.push(r.str()?);
        }

        let n = r.u32()?;
        for _ in 0..n {
            let count = r.u32()?;
            let mut names = Vec::with_capacity(count as usize);
            for _ in 0..count {
                names.push(r.u16()?);
            }
            m.private_envs.push(PrivateEnvInfo { names });
        }

        let n = r.u32()?;
        for _ in 0..n {
            m.functions.push(FunctionInfo {
                name: r.str()?,
                param_count: r.u8()?,
                flags: FunctionFlags(r.u16()?),
                code_start: r.u32()?,
                code_len: r.u32()?,
                register_count: r.u16()?,
                scope_group: r.u16()?,
                func_group: r.u16()?,
                line: r.u32()?,
            });
        }

        let n = r.u32()? as usize;
        m.code = r.bytes(n)?.to_vec();

        let n = r.u32()?;
        for _ in 0..n {
            m.line_table.push(LineEntry {
                offset: r.u32()?,
                line: r.u32()?,
            });
        }

        let n = r.u32()?;
        for _ in 0..n {
            let start = r.u32()?;
            let end = r.u32()?;
            let handler = r.u32()?;
            let kind_tag = r.u8()?;
            let reg = r.u8()?;
            let kind = match kind_tag {
                0 => TryRegionKind::Catch(Reg(reg)),
                1 => TryRegionKind::Finally,
                t => return Err(format!("unknown try-region kind {}", t)),
            };
            m.try_regions.push(TryRegion {
                start,
                end,
                handler,
                kind,
                scope_depth: r.u16()?,
                priv_depth: r.u16()?,
            });
        }

        let n = r.u32()?;
        for _ in 0..n {
            m.imports.push(ImportEntry {
                specifier: r.str()?,
                import_name: r.str()?,
                local: r.str()?,
            });
        }

        let n = r.u32()?;
        for _ in 0..n {
            m.exports.push(ExportEntry {
                local: r.str()?,
                export_name: r.str()?,
            });
        }

        Ok(m)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::opcode::{encode_instr, Instr};

    fn sample_module() -> BytecodeModule {
        let mut m = BytecodeModule::new("sample.js");
        let k = m.add_constant(Constant::Number(41.0));
        let pref = m.add_prop_ref("x");
        let bref = m.add_binding_ref("a");
        m.bindings.push(Binding {
            bref,
            flags: BindingFlags(BindingFlags::CONST),
        });
        m.binding_groups.push(Group { start: 0, len: 1 });
        let mut code = Vec::new();
        encode_instr(&mut code, &Instr::LoadConst { dst: Reg(0), idx: k });
        encode_instr(
            &mut code,
            &Instr::GetProp {
                dst: Reg(1),
                obj: Reg(0),
                pref,
            },
        );
        encode_instr(&mut code, &Instr::Return { src: Reg(1) });
        let code_len = code.len() as u32;
        m.code = code;
        m.functions.push(FunctionInfo {
            name: String::new(),
            param_count: 0,
            flags: FunctionFlags(0),
            code_start: 0,
            code_len,
            register_count: 2,
            scope_group: 0,
            func_group: crate::module::NO_GROUP,
            line: 1,
        });
        m.line_table.push(LineEntry { offset: 0, line: 1 });
        m.try_regions.push(TryRegion {
            start: 0,
            end: code_len,
            handler: code_len,
            kind: TryRegionKind::Catch(Reg(1)),
            scope_depth: 0,
            priv_depth: 0,
        });
        m
    }

    #[test]
    fn test_module_roundtrip() {
        let m = sample_module();
        let bytes = m.to_bytes();
        let restored = BytecodeModule::from_bytes(&bytes).unwrap();
        assert_eq!(m, restored);
    }

    #[test]
    fn test_bad_magic() {
        assert!(BytecodeModule::from_bytes(b"NOPE....").is_err());
    }

    #[test]
    fn test_bad_version() {
        let mut bytes = sample_module().to_bytes();
        bytes[4] = 99;
        let err = BytecodeModule::from_bytes(&bytes).unwrap_err();
        assert!(err.contains("version"));
    }

    #[test]
    fn test_truncation_detected() {
        let bytes = sample_module().to_bytes();
        assert!(BytecodeModule::from_bytes(&bytes[..bytes.len() - 3]).is_err());
    }
}
