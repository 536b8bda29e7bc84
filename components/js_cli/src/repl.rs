//! Interactive REPL over a persistent runtime.

use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;

use crate::error::{CliError, CliResult};
use crate::runtime::Runtime;

/// Run the read-eval-print loop until EOF or `.exit`.
pub fn run_repl(runtime: &mut Runtime) -> CliResult<()> {
    let mut editor = DefaultEditor::new()?;
    println!("ferrite-js (interactive). Type .exit to quit.");
    let mut line_no = 0u32;
    loop {
        match editor.readline("> ") {
            Ok(line) => {
                let trimmed = line.trim();
                if trimmed.is_empty() {
                    continue;
                }
                if trimmed == ".exit" {
                    return Ok(());
                }
                let _ = editor.add_history_entry(&line);
                line_no += 1;
                let name = format!("<repl:{}>", line_no);
                match runtime.execute_script(&line, &name) {
                    Ok(value) => {
                        if !value.is_undefined() {
                            println!("{}", runtime.display_value(&value));
                        }
                    }
                    Err(CliError::Parse(message)) => eprintln!("SyntaxError: {}", message),
                    Err(CliError::Uncaught(err)) => eprintln!("Uncaught {}", err),
                    Err(other) => return Err(other),
                }
            }
            Err(ReadlineError::Interrupted) => continue,
            Err(ReadlineError::Eof) => return Ok(()),
            Err(e) => return Err(e.into()),
        }
    }
}
