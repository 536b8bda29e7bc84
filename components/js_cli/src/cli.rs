//! Command-line arguments.

use clap::Parser;

/// Ferrite JavaScript engine.
#[derive(Parser, Debug)]
#[command(name = "ferrite-js", version, about = "Ferrite JavaScript engine")]
pub struct Cli {
    /// Script file to execute.
    pub file: Option<String>,

    /// Evaluate inline code instead of a file.
    #[arg(short, long)]
    pub eval: Option<String>,

    /// Treat the input as a module (imports, top-level await).
    #[arg(short, long)]
    pub module: bool,

    /// Print the compiled bytecode before running.
    #[arg(long)]
    pub print_bytecode: bool,

    /// Start the interactive REPL.
    #[arg(short, long)]
    pub repl: bool,
}
