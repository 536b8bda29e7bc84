//! CLI front end: argument parsing, runtime orchestration and the
//! REPL.

#![warn(clippy::all)]
#![deny(unsafe_code)]

mod cli;
mod error;
mod repl;
mod runtime;

pub use cli::Cli;
pub use error::{CliError, CliResult};
pub use runtime::Runtime;

/// Process exit codes of the CLI.
pub mod exit_codes {
    /// Evaluation reached a terminal value.
    pub const SUCCESS: i32 = 0;
    /// The source did not parse.
    pub const PARSE_ERROR: i32 = 1;
    /// An uncaught error escaped the script.
    pub const RUNTIME_ERROR: i32 = 2;
    /// The engine itself failed.
    pub const INTERNAL_ERROR: i32 = 3;
}
