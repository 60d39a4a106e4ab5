//! ASTC: the binary form of the AST
//!
//! - [`tags`]: the canonical tag of every node kind and payload codes
//! - [`writer`]: tree → bytes
//! - [`reader`]: bytes → tree
//! - [`file`]: the `ASTC` module container and atomic file I/O
//! - [`errors`]: [`SerializationError`]
//!
//! `deserialize(&serialize(&node)?)? == node` holds for every tree whose
//! nesting stays within [`errors::MAX_DEPTH`].

pub mod errors;
pub mod file;
pub mod reader;
pub mod tags;
pub mod writer;

pub use errors::SerializationError;
pub use file::{decode_module, encode_module, load_astc, save_astc, AstcHeader, AstcModule};
pub use reader::deserialize;
pub use writer::serialize;
