//! Centralised error hierarchy for the **treelox interpreter**.
//!
//! Two disjoint families live here:
//!
//! * *static* errors, raised by the scanner, parser and resolver before any
//!   code runs ([`LoxError::Lex`], [`LoxError::Parse`], [`LoxError::Resolve`],
//!   collected into [`LoxError::Static`]);
//! * *run-time* errors, raised by the evaluator ([`RuntimeError`]).
//!
//! `return`, `break` and `continue` are **not** errors and never appear here;
//! see [`crate::interpreter::Completion`].
//!
//! The module **does not** print diagnostics itself.

use std::io;
use thiserror::Error;

use log::info;

/// Canonical error type used throughout the interpreter.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum LoxError {
    /// Lexical (scanner) error with source line information.
    #[error("[line {line}] Error: {message}")]
    Lex {
        /// Human‑readable description.
        message: String,

        /// 1‑based line where the error occurred.
        line: usize,
    },

    /// Syntactic (parser) error.
    #[error("[line {line}] Error{location}: {message}")]
    Parse {
        message: String,
        /// ` at 'lexeme'` / ` at end`, empty when unknown.
        location: String,
        line: usize,
    },

    /// Static‑analysis (resolver) failure.
    #[error("[line {line}] Error at '{lexeme}': {message}")]
    Resolve {
        message: String,
        lexeme: String,
        line: usize,
    },

    /// Every static error reported by one front-end pass.
    #[error("{}", join_lines(.0))]
    Static(Vec<LoxError>),

    /// Runtime evaluation error.
    #[error(transparent)]
    Runtime(#[from] RuntimeError),

    /// Wrapper around `std::io::Error` (transparent).  Enables `?` on I/O ops.
    #[error(transparent)]
    Io(#[from] io::Error),

    /// UTF‑8 decoding failure when ingesting external text.
    #[error(transparent)]
    Utf8(#[from] std::string::FromUtf8Error),
}

impl LoxError {
    /// Helper constructor for the **scanner**.
    pub fn lex<S: Into<String>>(line: usize, msg: S) -> Self {
        let message: String = msg.into();

        info!("Creating Lex error: line={}, msg={}", line, message);

        LoxError::Lex { message, line }
    }

    /// Helper constructor for the **parser**.
    pub fn parse<S: Into<String>, L: Into<String>>(line: usize, location: L, msg: S) -> Self {
        let message: String = msg.into();

        info!("Creating Parse error: line={}, msg={}", line, message);

        LoxError::Parse {
            message,
            location: location.into(),
            line,
        }
    }

    /// Helper constructor for the **resolver**.
    pub fn resolve<S: Into<String>>(line: usize, lexeme: &str, msg: S) -> Self {
        let message: String = msg.into();

        info!("Creating Resolve error: line={}, msg={}", line, message);

        LoxError::Resolve {
            message,
            lexeme: lexeme.to_string(),
            line,
        }
    }

    /// True for errors that stop a program before it starts executing.
    pub fn is_static(&self) -> bool {
        matches!(
            self,
            LoxError::Lex { .. }
                | LoxError::Parse { .. }
                | LoxError::Resolve { .. }
                | LoxError::Static(_)
        )
    }

    /// Process exit status following the `sysexits.h` convention.
    pub fn exit_code(&self) -> i32 {
        match self {
            LoxError::Runtime(_) => 70,
            LoxError::Io(_) | LoxError::Utf8(_) => 74,
            _ => 65,
        }
    }
}

fn join_lines(errors: &[LoxError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("\n")
}

/// Failures raised while executing a resolved program.
///
/// Every user-facing variant carries the line of the offending token.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum RuntimeError {
    #[error("{message}\n[line {line}]")]
    TypeMismatch { message: &'static str, line: usize },

    #[error("Division by zero.\n[line {line}]")]
    DivisionByZero { line: usize },

    #[error("Undefined variable '{name}'.\n[line {line}]")]
    UndefinedVariable { name: String, line: usize },

    #[error("Undefined property '{name}'.\n[line {line}]")]
    UndefinedProperty { name: String, line: usize },

    #[error("Can only call functions and classes.\n[line {line}]")]
    NotCallable { line: usize },

    #[error("Superclass must be a class.\n[line {line}]")]
    NotAClass { line: usize },

    #[error("Expected {expected} arguments but got {got}.\n[line {line}]")]
    ArityMismatch {
        expected: usize,
        got: usize,
        line: usize,
    },

    #[error("Only instances have properties.\n[line {line}]")]
    NoProperties { line: usize },

    #[error("Only instances have fields.\n[line {line}]")]
    NoFields { line: usize },

    /// A host-provided function reported a failure.
    #[error("{name}: {message}\n[line {line}]")]
    Native {
        name: String,
        message: String,
        line: usize,
    },

    /// Writing `print` output failed.
    #[error("Failed to write output: {0}")]
    Output(#[from] io::Error),

    /// Resolver and evaluator disagree about the shape of the scope chain.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl RuntimeError {
    pub fn type_mismatch(message: &'static str, line: usize) -> Self {
        RuntimeError::TypeMismatch { message, line }
    }

    pub fn undefined_variable(name: &str, line: usize) -> Self {
        RuntimeError::UndefinedVariable {
            name: name.to_string(),
            line,
        }
    }

    pub fn internal<S: Into<String>>(msg: S) -> Self {
        RuntimeError::Internal(msg.into())
    }

    /// Source line of the offending token, when the error has one.
    pub fn line(&self) -> Option<usize> {
        match self {
            RuntimeError::TypeMismatch { line, .. }
            | RuntimeError::DivisionByZero { line }
            | RuntimeError::UndefinedVariable { line, .. }
            | RuntimeError::UndefinedProperty { line, .. }
            | RuntimeError::NotCallable { line }
            | RuntimeError::NotAClass { line }
            | RuntimeError::ArityMismatch { line, .. }
            | RuntimeError::NoProperties { line }
            | RuntimeError::NoFields { line }
            | RuntimeError::Native { line, .. } => Some(*line),
            RuntimeError::Output(_) | RuntimeError::Internal(_) => None,
        }
    }
}

/// Crate‑wide `Result` alias.
pub type Result<T> = std::result::Result<T, LoxError>;

/// Result alias for the evaluator.
pub type RuntimeResult<T> = std::result::Result<T, RuntimeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn static_errors_exit_with_65_and_runtime_with_70() {
        let parse = LoxError::parse(3, " at ';'", "Expected expression");
        assert!(parse.is_static());
        assert_eq!(parse.exit_code(), 65);

        let runtime: LoxError = RuntimeError::DivisionByZero { line: 1 }.into();
        assert!(!runtime.is_static());
        assert_eq!(runtime.exit_code(), 70);
    }

    #[test]
    fn collected_errors_print_one_per_line() {
        let err = LoxError::Static(vec![
            LoxError::resolve(1, "x", "Already a variable with this name in this scope."),
            LoxError::resolve(4, "return", "Can't return from top-level code."),
        ]);

        assert_eq!(
            err.to_string(),
            "[line 1] Error at 'x': Already a variable with this name in this scope.\n\
             [line 4] Error at 'return': Can't return from top-level code."
        );
    }

    #[test]
    fn runtime_errors_report_their_line() {
        let err = RuntimeError::undefined_variable("ghost", 7);
        assert_eq!(err.line(), Some(7));
        assert_eq!(err.to_string(), "Undefined variable 'ghost'.\n[line 7]");
        assert_eq!(RuntimeError::internal("desync").line(), None);
    }
}
