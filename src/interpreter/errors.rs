//! Runtime error types for the interpreter
//!
//! This module defines [`RuntimeError`], which represents all errors that can occur
//! during program execution (as opposed to parse errors or system errors).
//!
//! All runtime errors are fatal - they halt execution and are returned to the caller.
//! [`RuntimeError::ProgramExit`] is the one exception: it carries the status passed to
//! `exit()` and is turned back into a normal result by [`super::Interpreter::run`].

use crate::memory::layout::LayoutError;
use crate::memory::value::Address;
use crate::memory::MemoryError;
use crate::parser::ast::SourceLocation;
use thiserror::Error;

/// Runtime errors that can occur during execution
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RuntimeError {
    #[error("Undefined variable '{name}' at {location}")]
    UndefinedVariable {
        name: String,
        location: SourceLocation,
    },

    #[error("Undefined function '{name}' at {location}")]
    UndefinedFunction {
        name: String,
        location: SourceLocation,
    },

    #[error("Type error at {location}: {message}")]
    TypeError {
        message: String,
        location: SourceLocation,
    },

    #[error("'{record}' has no member named '{field}' at {location}")]
    UnknownField {
        record: String,
        field: String,
        location: SourceLocation,
    },

    #[error("Unknown type '{name}' at {location}")]
    UnknownType {
        name: String,
        location: SourceLocation,
    },

    #[error("Called object is not a function at {location}")]
    NotCallable { location: SourceLocation },

    #[error("Unsupported: {construct} at {location}")]
    Unsupported {
        construct: String,
        location: SourceLocation,
    },

    #[error("Division by zero at {location}")]
    DivisionByZero { location: SourceLocation },

    #[error("Stack overflow: call depth limit of {depth} reached at {location}")]
    StackOverflow {
        depth: usize,
        location: SourceLocation,
    },

    #[error("Function '{function}' expects {expected} argument(s), got {got} at {location}")]
    ArgumentCountMismatch {
        function: String,
        expected: usize,
        got: usize,
        location: SourceLocation,
    },

    #[error("Read from uninitialized {name} at {location}")]
    UninitializedRead {
        name: String,
        location: SourceLocation,
    },

    #[error("Null pointer dereference at {location}")]
    NullDereference { location: SourceLocation },

    #[error("Invalid pointer 0x{address:x} at {location}: {message}")]
    InvalidPointer {
        address: Address,
        message: String,
        location: SourceLocation,
    },

    #[error("Use after free: address 0x{address:x} at {location}")]
    UseAfterFree {
        address: Address,
        location: SourceLocation,
    },

    #[error("Double free of address 0x{address:x} at {location}")]
    DoubleFree {
        address: Address,
        location: SourceLocation,
    },

    #[error("Invalid free of address 0x{address:x} at {location}")]
    InvalidFree {
        address: Address,
        location: SourceLocation,
    },

    #[error("Out of memory: requested {requested} cells, limit is {limit} at {location}")]
    OutOfMemory {
        requested: usize,
        limit: usize,
        location: SourceLocation,
    },

    #[error("Attempted to modify const object '{name}' at {location}")]
    ConstModification {
        name: String,
        location: SourceLocation,
    },

    #[error("Invalid printf format at {location}: {message}")]
    InvalidPrintfFormat {
        message: String,
        location: SourceLocation,
    },

    #[error("Reached 'unreachable' at {location}")]
    Unreachable { location: SourceLocation },

    #[error("'{statement}' outside of a loop or switch at {location}")]
    StrayControl {
        statement: &'static str,
        location: SourceLocation,
    },

    #[error("No '{name}' function found")]
    NoEntryPoint { name: String },

    #[error("Program exited with status {code}")]
    ProgramExit { code: i64 },

    #[error("Cannot start interpreter thread: {message}")]
    HostThread { message: String },
}

impl RuntimeError {
    pub fn location(&self) -> Option<SourceLocation> {
        match self {
            RuntimeError::UndefinedVariable { location, .. }
            | RuntimeError::UndefinedFunction { location, .. }
            | RuntimeError::TypeError { location, .. }
            | RuntimeError::UnknownField { location, .. }
            | RuntimeError::UnknownType { location, .. }
            | RuntimeError::NotCallable { location }
            | RuntimeError::Unsupported { location, .. }
            | RuntimeError::DivisionByZero { location }
            | RuntimeError::StackOverflow { location, .. }
            | RuntimeError::ArgumentCountMismatch { location, .. }
            | RuntimeError::UninitializedRead { location, .. }
            | RuntimeError::NullDereference { location }
            | RuntimeError::InvalidPointer { location, .. }
            | RuntimeError::UseAfterFree { location, .. }
            | RuntimeError::DoubleFree { location, .. }
            | RuntimeError::InvalidFree { location, .. }
            | RuntimeError::OutOfMemory { location, .. }
            | RuntimeError::ConstModification { location, .. }
            | RuntimeError::InvalidPrintfFormat { location, .. }
            | RuntimeError::Unreachable { location }
            | RuntimeError::StrayControl { location, .. } => Some(*location),
            RuntimeError::NoEntryPoint { .. }
            | RuntimeError::ProgramExit { .. }
            | RuntimeError::HostThread { .. } => None,
        }
    }

    pub(crate) fn type_error(message: impl Into<String>, location: SourceLocation) -> Self {
        RuntimeError::TypeError {
            message: message.into(),
            location,
        }
    }

    pub(crate) fn unsupported(construct: impl Into<String>, location: SourceLocation) -> Self {
        RuntimeError::Unsupported {
            construct: construct.into(),
            location,
        }
    }

    /// Attach a source location to a memory fault
    pub(crate) fn from_memory(err: MemoryError, location: SourceLocation) -> Self {
        match err {
            MemoryError::NullDereference => RuntimeError::NullDereference { location },
            MemoryError::InvalidAddress { address } => RuntimeError::InvalidPointer {
                address,
                message: "address does not refer to live memory".to_string(),
                location,
            },
            MemoryError::OutOfBounds {
                address,
                block,
                size,
            } => RuntimeError::InvalidPointer {
                address,
                message: format!("outside the {}-cell block at 0x{:x}", size, block),
                location,
            },
            MemoryError::UseAfterFree { address } => {
                RuntimeError::UseAfterFree { address, location }
            }
            MemoryError::DoubleFree { address } => RuntimeError::DoubleFree { address, location },
            MemoryError::InvalidFree { address } => {
                RuntimeError::InvalidFree { address, location }
            }
            MemoryError::OutOfMemory { requested, limit }
            | MemoryError::StackExhausted { requested, limit } => RuntimeError::OutOfMemory {
                requested,
                limit,
                location,
            },
        }
    }

    pub(crate) fn from_layout(err: LayoutError, location: SourceLocation) -> Self {
        match err {
            LayoutError::UnknownType { name } => RuntimeError::UnknownType { name, location },
            LayoutError::UnknownField { record, field } => RuntimeError::UnknownField {
                record,
                field,
                location,
            },
            other => RuntimeError::type_error(other.to_string(), location),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_faults_keep_location() {
        let loc = SourceLocation::new(3, 7);
        let err = RuntimeError::from_memory(MemoryError::DoubleFree { address: 0x10 }, loc);
        assert_eq!(err, RuntimeError::DoubleFree { address: 0x10, location: loc });
        assert_eq!(err.location(), Some(loc));
        assert_eq!(err.to_string(), "Double free of address 0x10 at 3:7");
    }

    #[test]
    fn test_exit_has_no_location() {
        assert_eq!(RuntimeError::ProgramExit { code: 2 }.location(), None);
    }
}
