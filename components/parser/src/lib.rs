//! Front end: lexer, parser and the AST → bytecode compiler.
//!
//! `parse_script`/`parse_module` turn a source string into an AST;
//! [`compile`] lowers it into a [`bytecode_system::BytecodeModule`]
//! with its binding groups, function-declaration groups, property
//! references and try regions filled in.

#![warn(clippy::all)]
#![deny(unsafe_code)]

mod ast;
mod bytecode_gen;
mod error;
mod lexer;
#[allow(clippy::module_inception)]
mod parser;
mod scope;

pub use ast::*;
pub use bytecode_gen::compile;
pub use error::ParseError;
pub use lexer::{Lexer, Token, TokenKind};
pub use parser::{parse_module, parse_script};

use bytecode_system::BytecodeModule;

/// Parse and compile a script in one step.
pub fn compile_script(source: &str, source_name: &str) -> Result<BytecodeModule, ParseError> {
    let program = parse_script(source)?;
    compile(&program, source_name)
}

/// Parse and compile a module in one step.
pub fn compile_module(source: &str, source_name: &str) -> Result<BytecodeModule, ParseError> {
    let program = parse_module(source)?;
    compile(&program, source_name)
}
