//! Interpreter over hand-assembled and recompiled bytecode: the
//! serialized form stays executable.

use std::rc::Rc;

use bytecode_system::BytecodeModule;
use interpreter::Vm;

#[test]
fn test_deserialized_module_executes_identically() {
    let source = "function fib(n){ return n < 2 ? n : fib(n-1) + fib(n-2) } fib(12)";
    let compiled = parser::compile_script(source, "fib.js").unwrap();
    let bytes = compiled.to_bytes();

    let mut vm = Vm::new();
    let direct = vm.evaluate_compiled_script(Rc::new(compiled)).unwrap();

    let restored = BytecodeModule::from_bytes(&bytes).unwrap();
    let mut vm2 = Vm::new();
    let via_bytes = vm2.evaluate_compiled_script(Rc::new(restored)).unwrap();

    assert_eq!(direct.as_number(), Some(144.0));
    assert_eq!(via_bytes.as_number(), Some(144.0));
}

#[test]
fn test_branches_and_scopes_survive_round_trip() {
    let source = "\
        let acc = 0;\
        for (let i = 0; i < 10; i++) {\
            if (i % 2 === 0) { acc += i } else { acc -= 1 }\
        }\
        acc";
    let compiled = parser::compile_script(source, "loop.js").unwrap();
    let restored = BytecodeModule::from_bytes(&compiled.to_bytes()).unwrap();
    let mut vm = Vm::new();
    let v = vm.evaluate_compiled_script(Rc::new(restored)).unwrap();
    assert_eq!(v.as_number(), Some(15.0));
}

#[test]
fn test_corrupt_code_is_an_internal_error_not_a_panic() {
    let compiled = parser::compile_script("1 + 1", "ok.js").unwrap();
    let mut broken = compiled.clone();
    // stomp the opcode stream
    for b in broken.code.iter_mut() {
        *b = 0xff;
    }
    let mut vm = Vm::new();
    let err = vm.evaluate_compiled_script(Rc::new(broken));
    assert!(err.is_err());
}
