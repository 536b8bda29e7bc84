//! Front-end pipeline tests: source → AST → bytecode module.

use bytecode_system::{disassemble, BytecodeModule, FunctionFlags};
use parser::{compile_script, parse_script};

fn compile(src: &str) -> BytecodeModule {
    compile_script(src, "test.js").unwrap_or_else(|e| panic!("compile failed for {:?}: {}", src, e))
}

#[test]
fn test_end_to_end_scenarios_compile() {
    for src in [
        "let s=0;for(let i=1;i<=100;i++)s+=i;s",
        "function*g(){yield 1;yield 2}let a=[...g()];a",
        "async function f(){return await 41+1}",
        "const m=new Map([[1,'a'],[2,'b']]);[...m.values()].join(',')",
        "try{throw {x:7}}catch(e){e.x}",
        "const p=new Proxy({},{ get(_,k){return k.toUpperCase()}}); p.hello",
    ] {
        let m = compile(src);
        assert!(!m.code.is_empty());
        assert!(!m.functions.is_empty());
    }
}

#[test]
fn test_compiled_module_survives_serialization() {
    let m = compile("function f(a,b){return a*b} f(6, 7)");
    let restored = BytecodeModule::from_bytes(&m.to_bytes()).unwrap();
    assert_eq!(m, restored);
    assert_eq!(disassemble(&m), disassemble(&restored));
}

#[test]
fn test_parse_error_surfaces() {
    assert!(compile_script("let = ;", "bad.js").is_err());
    assert!(compile_script("function (", "bad.js").is_err());
}

#[test]
fn test_function_metadata() {
    let m = compile("const f = (a, b = 1, ...rest) => a; class C { m(){} }");
    // arrow, default ctor is not synthesized for method-only classes
    let arrow = m
        .functions
        .iter()
        .find(|f| f.flags.has(FunctionFlags::ARROW))
        .expect("arrow function compiled");
    assert_eq!(arrow.param_count, 1);
    assert!(arrow.flags.has(FunctionFlags::PARAM_EXPRS));
    let method = m
        .functions
        .iter()
        .find(|f| f.name == "m")
        .expect("method compiled");
    assert!(method.flags.has(FunctionFlags::METHOD));
}

#[test]
fn test_line_table_monotonic() {
    let m = compile("let a = 1;\nlet b = 2;\nfunction f() {\n  return a + b;\n}\nf();");
    for f in &m.functions {
        let start = f.code_start;
        let end = start + f.code_len;
        let entries: Vec<_> = m
            .line_table
            .iter()
            .filter(|e| e.offset >= start && e.offset < end)
            .collect();
        for pair in entries.windows(2) {
            assert!(pair[0].offset <= pair[1].offset);
        }
    }
}

#[test]
fn test_parse_only() {
    let program = parse_script("a ?? b?.x").err();
    // optional chaining is outside the subset; nullish is inside
    assert!(program.is_some() || parse_script("a ?? b").is_ok());
}
