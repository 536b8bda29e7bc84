//! Bytecode disassembler.
//!
//! Prints one instruction per line with its byte offset, mnemonic and
//! operands resolved against the module's side tables: binding and
//! property references show their name, constants their literal,
//! labels their absolute target offset.

use std::fmt::Write;

use crate::constant::Constant;
use crate::module::{BytecodeModule, FunctionInfo, NO_GROUP};
use crate::opcode::{decode_instr, Operand, TableKind};

/// Disassemble every function of `module` into a printable listing.
pub fn disassemble(module: &BytecodeModule) -> String {
    let mut out = String::new();
    for (i, f) in module.functions.iter().enumerate() {
        disassemble_function(module, i, f, &mut out);
        out.push('\n');
    }
    out
}

fn disassemble_function(module: &BytecodeModule, index: usize, f: &FunctionInfo, out: &mut String) {
    let name = if f.name.is_empty() { "<anonymous>" } else { &f.name };
    let _ = writeln!(
        out,
        "function #{} {} (params {}, registers {}, line {})",
        index, name, f.param_count, f.register_count, f.line
    );
    if f.scope_group != NO_GROUP {
        let _ = writeln!(out, "  scope group [{}]", f.scope_group);
    }

    let start = f.code_start as usize;
    let end = start + f.code_len as usize;
    let mut at = start;
    while at < end {
        let Some((instr, next)) = decode_instr(&module.code, at) else {
            let _ = writeln!(out, "  {:05}  <bad opcode {:#04x}>", at, module.code[at]);
            break;
        };
        let _ = write!(out, "  {:05}  {:<22}", at, instr.mnemonic());
        let mut first = true;
        for op in instr.operands() {
            if !first {
                let _ = write!(out, ", ");
            } else {
                let _ = write!(out, " ");
            }
            first = false;
            let _ = match op {
                Operand::Reg(r) => write!(out, "r{}", r.0),
                Operand::Small(v) => write!(out, "{}", v),
                Operand::Imm(v) => write!(out, "{}", v),
                Operand::Label(off) => {
                    let target = (next as i64 + off as i64) as usize;
                    write!(out, "-> {:05}", target)
                }
                Operand::Table(kind, idx) => write!(out, "{}", resolve(module, kind, idx)),
            };
        }
        let _ = writeln!(out);
        at = next;
    }

    for r in module
        .try_regions
        .iter()
        .filter(|r| (r.start as usize) >= start && (r.start as usize) < end)
    {
        let _ = writeln!(
            out,
            "  try [{:05}, {:05}) -> {:05} ({:?})",
            r.start, r.end, r.handler, r.kind
        );
    }
}

fn resolve(module: &BytecodeModule, kind: TableKind, idx: u16) -> String {
    let i = idx as usize;
    match kind {
        TableKind::Const => match module.constants.get(i) {
            Some(Constant::Number(n)) => format!("{}", n),
            Some(Constant::String(s)) => format!("{:?}", s),
            Some(Constant::BigInt(b)) => format!("{}n", b),
            None => format!("<const {}?>", idx),
        },
        TableKind::BindingRef => module
            .binding_refs
            .get(i)
            .map(|r| r.name.clone())
            .unwrap_or_else(|| format!("<bref {}?>", idx)),
        TableKind::PropRef => module
            .prop_refs
            .get(i)
            .map(|n| format!(".{}", n))
            .unwrap_or_else(|| format!("<pref {}?>", idx)),
        TableKind::BindingGroup => format!("scope[{}]", idx),
        TableKind::FuncGroup => format!("fgroup[{}]", idx),
        TableKind::Function => match module.functions.get(i) {
            Some(f) if !f.name.is_empty() => format!("fn {}", f.name),
            _ => format!("fn #{}", idx),
        },
        TableKind::PrivateName => module
            .private_names
            .get(i)
            .cloned()
            .unwrap_or_else(|| format!("<priv {}?>", idx)),
        TableKind::PrivateEnv => format!("penv[{}]", idx),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::module::{FunctionFlags, FunctionInfo};
    use crate::opcode::{encode_instr, Instr, Reg};

    #[test]
    fn test_disassembly_resolves_operands() {
        let mut m = BytecodeModule::new("t");
        let k = m.add_constant(Constant::String("hi".to_string()));
        let p = m.add_prop_ref("length");
        let mut code = Vec::new();
        encode_instr(&mut code, &Instr::LoadConst { dst: Reg(0), idx: k });
        encode_instr(
            &mut code,
            &Instr::GetProp {
                dst: Reg(1),
                obj: Reg(0),
                pref: p,
            },
        );
        encode_instr(&mut code, &Instr::Return { src: Reg(1) });
        let code_len = code.len() as u32;
        m.code = code;
        m.functions.push(FunctionInfo {
            name: "main".to_string(),
            param_count: 0,
            flags: FunctionFlags(0),
            code_start: 0,
            code_len,
            register_count: 2,
            scope_group: NO_GROUP,
            func_group: NO_GROUP,
            line: 1,
        });

        let text = disassemble(&m);
        assert!(text.contains("function #0 main"));
        assert!(text.contains("load_const"));
        assert!(text.contains("\"hi\""));
        assert!(text.contains(".length"));
    }

    #[test]
    fn test_label_targets_absolute() {
        let mut m = BytecodeModule::new("t");
        let mut code = Vec::new();
        // 0: jump +3  (target = 3 + 3 = 6... instruction is 3 bytes)
        encode_instr(&mut code, &Instr::Jump { off: 3 });
        let code_len = code.len() as u32;
        m.code = code;
        m.functions.push(FunctionInfo {
            name: String::new(),
            param_count: 0,
            flags: FunctionFlags(0),
            code_start: 0,
            code_len,
            register_count: 0,
            scope_group: NO_GROUP,
            func_group: NO_GROUP,
            line: 1,
        });
        let text = disassemble(&m);
        assert!(text.contains("-> 00006"), "got: {}", text);
    }
}
