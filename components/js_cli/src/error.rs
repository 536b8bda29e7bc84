//! Error types for the CLI.

use core_types::{ErrorKind, JsError};
use thiserror::Error;

/// CLI-level failures, mapped onto process exit codes.
#[derive(Debug, Error)]
pub enum CliError {
    /// The source did not parse.
    #[error("syntax error: {0}")]
    Parse(String),

    /// An uncaught JavaScript error escaped the script.
    #[error("uncaught {0}")]
    Uncaught(JsError),

    /// File I/O failure.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// REPL line-editor failure.
    #[error("repl error: {0}")]
    Repl(#[from] rustyline::error::ReadlineError),

    /// Engine-internal failure.
    #[error("internal error: {0}")]
    Internal(String),
}

impl CliError {
    /// Classify a runtime error by its kind.
    pub fn from_js_error(err: JsError) -> Self {
        match err.kind {
            ErrorKind::SyntaxError => CliError::Parse(err.to_string()),
            ErrorKind::InternalError => CliError::Internal(err.to_string()),
            _ => CliError::Uncaught(err),
        }
    }

    /// The process exit code for this failure.
    pub fn exit_code(&self) -> i32 {
        match self {
            CliError::Parse(_) => crate::exit_codes::PARSE_ERROR,
            CliError::Uncaught(_) => crate::exit_codes::RUNTIME_ERROR,
            CliError::Io(_) | CliError::Repl(_) | CliError::Internal(_) => {
                crate::exit_codes::INTERNAL_ERROR
            }
        }
    }
}

/// Result type for CLI operations.
pub type CliResult<T> = Result<T, CliError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes() {
        assert_eq!(CliError::Parse("x".into()).exit_code(), 1);
        assert_eq!(
            CliError::Uncaught(JsError::new(ErrorKind::TypeError, "x")).exit_code(),
            2
        );
        assert_eq!(CliError::Internal("x".into()).exit_code(), 3);
    }

    #[test]
    fn test_js_error_classification() {
        let parse = CliError::from_js_error(JsError::new(ErrorKind::SyntaxError, "bad"));
        assert!(matches!(parse, CliError::Parse(_)));
        let runtime = CliError::from_js_error(JsError::new(ErrorKind::RangeError, "deep"));
        assert!(matches!(runtime, CliError::Uncaught(_)));
    }
}
