//! Unit tests for the bytecode model crossing module boundaries.

use bytecode_system::{
    decode_instr, disassemble, encode_instr, Binding, BindingFlags, BytecodeModule, Constant,
    FunctionFlags, FunctionInfo, Group, Instr, LineEntry, Reg, NO_GROUP,
};

fn tiny_module() -> BytecodeModule {
    let mut m = BytecodeModule::new("tiny.js");
    let one = m.add_constant(Constant::Number(1.0));
    let bref = m.add_binding_ref("s");
    m.bindings.push(Binding {
        bref,
        flags: BindingFlags(0),
    });
    m.binding_groups.push(Group { start: 0, len: 1 });

    let mut code = Vec::new();
    encode_instr(&mut code, &Instr::PushScope { group: 0 });
    encode_instr(&mut code, &Instr::LoadConst { dst: Reg(0), idx: one });
    encode_instr(&mut code, &Instr::InitBinding { bref, src: Reg(0) });
    encode_instr(&mut code, &Instr::LoadBinding { dst: Reg(1), bref });
    encode_instr(&mut code, &Instr::PopScope {});
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
        scope_group: NO_GROUP,
        func_group: NO_GROUP,
        line: 1,
    });
    m.line_table.push(LineEntry { offset: 0, line: 1 });
    m
}

#[test]
fn test_full_module_serialization_roundtrip() {
    let m = tiny_module();
    let restored = BytecodeModule::from_bytes(&m.to_bytes()).unwrap();
    assert_eq!(m, restored);

    // the restored code still decodes instruction by instruction
    let mut at = 0;
    let mut count = 0;
    while at < restored.code.len() {
        let (_, next) = decode_instr(&restored.code, at).expect("valid instruction");
        at = next;
        count += 1;
    }
    assert_eq!(count, 6);
}

#[test]
fn test_disassembly_of_roundtripped_module() {
    let m = tiny_module();
    let restored = BytecodeModule::from_bytes(&m.to_bytes()).unwrap();
    let text = disassemble(&restored);
    assert!(text.contains("push_scope"));
    assert!(text.contains("init_binding"));
    // binding operands resolve to the binding name
    assert!(text.contains(" s"));
}

#[test]
fn test_every_instruction_width_matches_encoding() {
    let samples = vec![
        Instr::LoadUndefined { dst: Reg(0) },
        Instr::LoadSmallInt { dst: Reg(0), value: 7 },
        Instr::Move { dst: Reg(1), src: Reg(0) },
        Instr::PushScope { group: 2 },
        Instr::PopScope {},
        Instr::GetProp { dst: Reg(0), obj: Reg(1), pref: 3 },
        Instr::Call { dst: Reg(0), func: Reg(1), this: Reg(2), argv: Reg(3), argc: 1 },
        Instr::Jump { off: -2 },
        Instr::JumpIfFalse { cond: Reg(0), off: 10 },
        Instr::NewClosure { dst: Reg(0), func: 1 },
        Instr::ForOfNext { dst: Reg(0), iter: Reg(1), off: 9 },
        Instr::Yield { dst: Reg(0), src: Reg(1) },
        Instr::Await { dst: Reg(0), src: Reg(1) },
        Instr::Throw { src: Reg(0) },
        Instr::FinallyEnd {},
        Instr::Debugger {},
    ];
    for instr in samples {
        let mut buf = Vec::new();
        encode_instr(&mut buf, &instr);
        assert_eq!(buf.len(), instr.width(), "width mismatch for {:?}", instr);
        let (decoded, next) = decode_instr(&buf, 0).unwrap();
        assert_eq!(decoded, instr);
        assert_eq!(next, buf.len());
    }
}
