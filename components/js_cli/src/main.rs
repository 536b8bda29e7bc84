//! Ferrite JavaScript engine CLI.
//!
//! Exit codes: 0 success, 1 parse error, 2 uncaught runtime error,
//! 3 internal error.

use clap::Parser;
use js_cli::{Cli, CliError, Runtime};

fn main() {
    let cli = Cli::parse();
    let mut runtime = Runtime::new().with_print_bytecode(cli.print_bytecode);

    let result = if let Some(code) = &cli.eval {
        if cli.module {
            runtime.execute_module(code, "<eval>")
        } else {
            runtime.execute_script(code, "<eval>")
        }
        .map(Some)
    } else if let Some(file) = &cli.file {
        if cli.module {
            runtime.execute_module_file(file)
        } else {
            runtime.execute_file(file)
        }
        .map(Some)
    } else if cli.repl {
        runtime.repl().map(|_| None)
    } else {
        println!("ferrite-js: a JavaScript engine");
        println!();
        println!("Usage:");
        println!("  ferrite-js <FILE>            Execute a script file (.mjs runs as a module)");
        println!("  ferrite-js --eval <CODE>     Evaluate inline code");
        println!("  ferrite-js --module ...      Treat the input as a module");
        println!("  ferrite-js --repl            Start the interactive REPL");
        println!();
        println!("Run 'ferrite-js --help' for all options.");
        return;
    };

    match result {
        Ok(Some(value)) => {
            if !value.is_undefined() {
                println!("{}", runtime.display_value(&value));
            }
        }
        Ok(None) => {}
        Err(error) => {
            match &error {
                CliError::Uncaught(e) => eprintln!("Uncaught {}", e),
                other => eprintln!("{}", other),
            }
            std::process::exit(error.exit_code());
        }
    }
}
