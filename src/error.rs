//! Pipeline-level error type
//!
//! Each variant wraps the error of one stage; `Display` names the stage.

use crate::astc::SerializationError;
use crate::codegen::{CodegenError, ExecError, ImageError};
use crate::interpreter::RuntimeError;
use crate::parser::ast::SourceLocation;
use crate::parser::lexer::LexError;
use crate::parser::ParseError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CompileError {
    /// Every lexical diagnostic of the source, in order
    #[error("lexing failed with {} error(s): {}", .0.len(), join_lex_errors(.0))]
    Lex(Vec<LexError>),

    #[error("parsing failed: {0}")]
    Parse(#[from] ParseError),

    #[error("serialization failed: {0}")]
    Serialization(#[from] SerializationError),

    #[error("code generation failed: {0}")]
    Codegen(#[from] CodegenError),

    #[error("runtime error: {0}")]
    Runtime(#[from] RuntimeError),

    #[error("runtime image: {0}")]
    Image(#[from] ImageError),

    #[error("native execution failed: {0}")]
    Exec(#[from] ExecError),
}

fn join_lex_errors(errors: &[LexError]) -> String {
    errors.iter().map(|e| e.to_string()).collect::<Vec<_>>().join("; ")
}

impl CompileError {
    /// The stage that failed
    pub fn stage(&self) -> &'static str {
        match self {
            CompileError::Lex(_) => "lexer",
            CompileError::Parse(_) => "parser",
            CompileError::Serialization(_) => "serializer",
            CompileError::Codegen(_) => "codegen",
            CompileError::Runtime(_) => "interpreter",
            CompileError::Image(_) | CompileError::Exec(_) => "native",
        }
    }

    /// Source location of the failure, when the stage knows it
    pub fn location(&self) -> Option<SourceLocation> {
        match self {
            CompileError::Lex(errors) => errors.first().map(|e| e.location),
            CompileError::Parse(e) => Some(e.location),
            CompileError::Codegen(e) => e.location(),
            CompileError::Runtime(e) => e.location(),
            CompileError::Serialization(_) | CompileError::Image(_) | CompileError::Exec(_) => None,
        }
    }
}
