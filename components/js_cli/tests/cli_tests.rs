//! CLI argument-parsing tests.

use clap::Parser;
use js_cli::Cli;

#[test]
fn cli_parse_no_args() {
    let cli = Cli::try_parse_from(["ferrite-js"]).unwrap();
    assert_eq!(cli.file, None);
    assert_eq!(cli.eval, None);
    assert!(!cli.repl);
    assert!(!cli.module);
    assert!(!cli.print_bytecode);
}

#[test]
fn cli_parse_positional_file() {
    let cli = Cli::try_parse_from(["ferrite-js", "script.js"]).unwrap();
    assert_eq!(cli.file, Some("script.js".to_string()));
}

#[test]
fn cli_parse_eval() {
    let cli = Cli::try_parse_from(["ferrite-js", "--eval", "1+1"]).unwrap();
    assert_eq!(cli.eval, Some("1+1".to_string()));
    let cli = Cli::try_parse_from(["ferrite-js", "-e", "1+1"]).unwrap();
    assert_eq!(cli.eval, Some("1+1".to_string()));
}

#[test]
fn cli_parse_flags() {
    let cli =
        Cli::try_parse_from(["ferrite-js", "--repl", "--module", "--print-bytecode"]).unwrap();
    assert!(cli.repl);
    assert!(cli.module);
    assert!(cli.print_bytecode);
}
