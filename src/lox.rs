//! One interpreter session: scan → parse → resolve → interpret.
//!
//! A [`Lox`] owns a single [`Interpreter`], so globals defined by one call
//! to [`Lox::run`] or [`Lox::run_line`] stay visible to the next.

use std::fs;
use std::io::Write;
use std::path::Path;

use log::{debug, info};

use crate::error::{LoxError, Result};
use crate::interpreter::Interpreter;
use crate::parser::{Parser, ReplInput};
use crate::resolver::Resolver;
use crate::scanner::Scanner;
use crate::token::Token;

pub struct Lox {
    interpreter: Interpreter,
}

impl Default for Lox {
    fn default() -> Self {
        Self::new()
    }
}

impl Lox {
    /// Session printing to stdout.
    pub fn new() -> Self {
        Self {
            interpreter: Interpreter::new(),
        }
    }

    /// Session printing to `out`.
    pub fn with_output<W: Write + 'static>(out: W) -> Self {
        Self {
            interpreter: Interpreter::with_output(out),
        }
    }

    /// Runs a whole program.
    pub fn run(&mut self, source: &str) -> Result<()> {
        let tokens = scan(source)?;
        let statements = Parser::new(&tokens).parse().map_err(LoxError::Static)?;
        info!("Parsed {} statements", statements.len());

        let locals = Resolver::new()
            .resolve(&statements)
            .map_err(LoxError::Static)?;

        self.interpreter.interpret(&statements, locals)?;
        Ok(())
    }

    /// Evaluates a source holding exactly one expression.
    pub fn evaluate(&mut self, source: &str) -> Result<String> {
        let tokens = scan(source)?;
        let expr = Parser::new(&tokens)
            .parse_expression()
            .map_err(LoxError::Static)?;

        let locals = Resolver::new()
            .resolve_expression(&expr)
            .map_err(LoxError::Static)?;

        Ok(self.interpreter.evaluate_to_string(&expr, locals)?)
    }

    /// Runs one REPL input.  A bare expression yields its printable value;
    /// statements yield `None`.
    pub fn run_line(&mut self, line: &str) -> Result<Option<String>> {
        let tokens = scan(line)?;

        match Parser::new(&tokens).parse_repl().map_err(LoxError::Static)? {
            ReplInput::Expression(expr) => {
                debug!("Echoing bare expression");
                let locals = Resolver::new()
                    .resolve_expression(&expr)
                    .map_err(LoxError::Static)?;

                Ok(Some(self.interpreter.evaluate_to_string(&expr, locals)?))
            }

            ReplInput::Statements(statements) => {
                let locals = Resolver::new()
                    .resolve(&statements)
                    .map_err(LoxError::Static)?;

                self.interpreter.interpret(&statements, locals)?;
                Ok(None)
            }
        }
    }
}

fn scan(source: &str) -> Result<Vec<Token<'_>>> {
    Scanner::new(source).scan_all().map_err(LoxError::Static)
}

/// Loads a script.  Unreadable files and non-UTF-8 bytes are I/O failures
/// (exit status 74), not language errors.
pub fn read_source(path: &Path) -> Result<String> {
    debug!("Loading script {}", path.display());

    let raw = fs::read(path)?;
    info!("Loaded {} bytes from {}", raw.len(), path.display());

    Ok(String::from_utf8(raw)?)
}
