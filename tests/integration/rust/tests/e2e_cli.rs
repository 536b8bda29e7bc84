//! CLI-level behaviour through the `Runtime` facade: files, exit-code
//! classification, modules.

use std::io::Write;

use js_cli::{exit_codes, Runtime};

fn write_temp(dir: &tempfile::TempDir, name: &str, contents: &str) -> String {
    let path = dir.path().join(name);
    let mut f = std::fs::File::create(&path).unwrap();
    f.write_all(contents.as_bytes()).unwrap();
    path.to_string_lossy().to_string()
}

#[test]
fn test_execute_script_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_temp(&dir, "sum.js", "let s=0;for(let i=1;i<=100;i++)s+=i;s");
    let mut rt = Runtime::new();
    let v = rt.execute_file(&path).unwrap();
    assert_eq!(v.as_number(), Some(5050.0));
}

#[test]
fn test_missing_file_is_internal_error_code() {
    let mut rt = Runtime::new();
    let err = rt.execute_file("/definitely/not/here.js").unwrap_err();
    assert_eq!(err.exit_code(), exit_codes::INTERNAL_ERROR);
}

#[test]
fn test_parse_error_exit_code() {
    let mut rt = Runtime::new();
    let err = rt.execute_script("function (", "bad.js").unwrap_err();
    assert_eq!(err.exit_code(), exit_codes::PARSE_ERROR);
}

#[test]
fn test_runtime_error_exit_code() {
    let mut rt = Runtime::new();
    let err = rt.execute_script("undefinedFn()", "bad.js").unwrap_err();
    assert_eq!(err.exit_code(), exit_codes::RUNTIME_ERROR);
}

#[test]
fn test_module_file_with_relative_import() {
    let dir = tempfile::tempdir().unwrap();
    write_temp(&dir, "lib.js", "export const triple = x => x * 3;");
    let main = write_temp(
        &dir,
        "main.mjs",
        "import {triple} from './lib'; triple(14)",
    );
    let mut rt = Runtime::new();
    let v = rt.execute_file(&main).unwrap();
    assert_eq!(v.as_number(), Some(42.0));
}

#[test]
fn test_print_bytecode_mode_still_evaluates() {
    let mut rt = Runtime::new().with_print_bytecode(true);
    let v = rt.execute_script("2 + 2", "pb.js").unwrap();
    assert_eq!(v.as_number(), Some(4.0));
}
