//! Code generation error types

use crate::parser::ast::SourceLocation;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodegenError {
    #[error("Unsupported construct in native code: {construct} at {location}")]
    UnsupportedConstruct {
        construct: String,
        location: SourceLocation,
    },

    #[error("Undefined variable '{name}' at {location}")]
    UndefinedVariable {
        name: String,
        location: SourceLocation,
    },

    #[error("Call to undefined function '{name}' at {location}")]
    UndefinedFunction {
        name: String,
        location: SourceLocation,
    },

    #[error("Function '{function}' expects {expected} argument(s), got {got} at {location}")]
    ArgumentCountMismatch {
        function: String,
        expected: usize,
        got: usize,
        location: SourceLocation,
    },

    #[error("'{statement}' outside of a loop at {location}")]
    StrayControl {
        statement: &'static str,
        location: SourceLocation,
    },

    #[error("Label '{label}' is bound twice")]
    DuplicateLabel { label: String },

    #[error("Label '{label}' is referenced but never bound")]
    UnboundLabel { label: String },

    #[error("Displacement to '{label}' does not fit in 32 bits")]
    DisplacementOverflow { label: String },

    #[error("Stack frame of '{function}' exceeds the addressable size")]
    FrameTooLarge { function: String },

    #[error("No entry point '{name}' in the compiled program")]
    NoEntryPoint { name: String },

    #[error("Cannot start code generator thread: {message}")]
    HostThread { message: String },
}

impl CodegenError {
    pub fn location(&self) -> Option<SourceLocation> {
        match self {
            CodegenError::UnsupportedConstruct { location, .. }
            | CodegenError::UndefinedVariable { location, .. }
            | CodegenError::UndefinedFunction { location, .. }
            | CodegenError::ArgumentCountMismatch { location, .. }
            | CodegenError::StrayControl { location, .. } => Some(*location),
            CodegenError::DuplicateLabel { .. }
            | CodegenError::UnboundLabel { .. }
            | CodegenError::DisplacementOverflow { .. }
            | CodegenError::FrameTooLarge { .. }
            | CodegenError::NoEntryPoint { .. }
            | CodegenError::HostThread { .. } => None,
        }
    }

    pub(crate) fn unsupported(construct: impl Into<String>, location: SourceLocation) -> Self {
        CodegenError::UnsupportedConstruct {
            construct: construct.into(),
            location,
        }
    }
}
