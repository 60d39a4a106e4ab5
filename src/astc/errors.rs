//! Serialization error types
//!
//! Every decoding failure names the byte offset where it was detected. For
//! file-level errors the offset is relative to the start of the file, for
//! payload errors relative to the start of the payload.

use thiserror::Error;

/// Nesting deeper than this is rejected while decoding
pub const MAX_DEPTH: usize = 1024;

#[derive(Debug, Error)]
pub enum SerializationError {
    #[error("unexpected end of input at byte {offset}: needed {needed} more byte(s)")]
    UnexpectedEof { offset: usize, needed: usize },

    #[error("unknown node tag {tag:#06x} at byte {offset}")]
    UnknownTag { tag: u16, offset: usize },

    #[error("invalid {what} code {value} at byte {offset}")]
    InvalidDiscriminant {
        what: &'static str,
        value: u8,
        offset: usize,
    },

    #[error("invalid presence flag {value} at byte {offset} (expected 0 or 1)")]
    BadPresenceFlag { value: u8, offset: usize },

    #[error("invalid UTF-8 in string at byte {offset}")]
    InvalidUtf8 { offset: usize },

    #[error("{count} trailing byte(s) after the root node at byte {offset}")]
    TrailingBytes { offset: usize, count: usize },

    #[error("nesting deeper than {limit} levels at byte {offset}")]
    DepthLimitExceeded { limit: usize, offset: usize },

    #[error("{what} length {len} does not fit the format")]
    LengthOverflow { what: &'static str, len: usize },

    #[error("bad magic {found:?} (expected {expected:?})")]
    BadMagic { expected: [u8; 4], found: [u8; 4] },

    #[error("unsupported format version {found} (expected {expected})")]
    UnsupportedVersion { expected: u32, found: u32 },

    #[error("payload size mismatch: header says {declared} byte(s), {actual} available")]
    PayloadSizeMismatch { declared: u32, actual: usize },

    #[error("entry point {entry:#x} does not address a function node")]
    InvalidEntryPoint { entry: u32 },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl SerializationError {
    /// Byte offset the error was detected at, when it has one
    pub fn offset(&self) -> Option<usize> {
        match self {
            SerializationError::UnexpectedEof { offset, .. }
            | SerializationError::UnknownTag { offset, .. }
            | SerializationError::InvalidDiscriminant { offset, .. }
            | SerializationError::BadPresenceFlag { offset, .. }
            | SerializationError::InvalidUtf8 { offset }
            | SerializationError::TrailingBytes { offset, .. }
            | SerializationError::DepthLimitExceeded { offset, .. } => Some(*offset),
            SerializationError::LengthOverflow { .. }
            | SerializationError::BadMagic { .. }
            | SerializationError::UnsupportedVersion { .. }
            | SerializationError::PayloadSizeMismatch { .. }
            | SerializationError::InvalidEntryPoint { .. }
            | SerializationError::Io(_) => None,
        }
    }
}
