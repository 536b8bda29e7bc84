//! Parser → bytecode integration: table layout, serialization and
//! disassembly of compiled programs.

use bytecode_system::{disassemble, BytecodeModule, FunctionFlags};

fn compile(src: &str) -> BytecodeModule {
    parser::compile_script(src, "it.js").expect("compiles")
}

#[test]
fn test_tables_reference_each_other_consistently() {
    let m = compile(
        "function outer(a){ let x = a + 1; function inner(){ return x } return inner() }\
         outer(1)",
    );
    // every binding row points at a real reference row
    for b in &m.bindings {
        assert!((b.bref as usize) < m.binding_refs.len());
    }
    // every group covers real rows
    for g in &m.binding_groups {
        assert!((g.start + g.len) as usize <= m.bindings.len());
    }
    for g in &m.func_groups {
        assert!((g.start + g.len) as usize <= m.func_decls.len());
    }
    // every declared function exists
    for d in &m.func_decls {
        assert!((d.func as usize) < m.functions.len());
    }
    // code ranges are disjoint and inside the buffer
    for f in &m.functions {
        assert!(((f.code_start + f.code_len) as usize) <= m.code.len());
    }
}

#[test]
fn test_serialized_form_round_trips_through_disassembly() {
    let m = compile(
        "class Point { #x = 0; constructor(x){ this.#x = x } get x(){ return this.#x } }\
         try { new Point(3).x } catch (e) { e }",
    );
    let restored = BytecodeModule::from_bytes(&m.to_bytes()).expect("deserializes");
    assert_eq!(m, restored);
    assert_eq!(disassemble(&m), disassemble(&restored));
}

#[test]
fn test_generator_and_async_flags_travel_through_serialization() {
    let m = compile("async function a(){await 0} function* g(){yield 0} async function* ag(){yield 0}");
    let restored = BytecodeModule::from_bytes(&m.to_bytes()).unwrap();
    let count = |flag: u16| {
        restored
            .functions
            .iter()
            .filter(|f| f.flags.has(flag))
            .count()
    };
    assert_eq!(count(FunctionFlags::ASYNC), 2);
    assert_eq!(count(FunctionFlags::GENERATOR), 2);
}

#[test]
fn test_try_regions_nest_innermost_first_by_span() {
    let m = compile(
        "try { try { risky() } catch (inner) { handle(inner) } } finally { cleanup() }",
    );
    let catch_region = m
        .try_regions
        .iter()
        .find(|r| matches!(r.kind, bytecode_system::TryRegionKind::Catch(_)))
        .expect("catch region");
    let finally_region = m
        .try_regions
        .iter()
        .find(|r| matches!(r.kind, bytecode_system::TryRegionKind::Finally))
        .expect("finally region");
    let catch_span = catch_region.end - catch_region.start;
    let finally_span = finally_region.end - finally_region.start;
    assert!(catch_span < finally_span);
    assert!(finally_region.start <= catch_region.start);
}

#[test]
fn test_private_name_tables() {
    let m = compile("class A { #a; #b(){ return 1 } } class B { #a; }");
    assert_eq!(m.private_names.len(), 3);
    assert_eq!(m.private_envs.len(), 2);
    assert_eq!(m.private_envs[0].names.len(), 2);
    assert_eq!(m.private_envs[1].names.len(), 1);
}
