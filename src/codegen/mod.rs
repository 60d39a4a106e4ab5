//! Native x86-64 backend
//!
//! - [`buffer`]: code buffer, labels and relocation fixups
//! - [`x86`]: instruction encodings
//! - [`generator`]: AST → machine code for the integer subset
//! - [`image`]: the `RTME` runtime image container
//! - [`exec`]: running generated code in-process
//! - [`errors`]: [`CodegenError`]

pub mod buffer;
pub mod errors;
pub mod exec;
pub mod generator;
pub mod image;
pub mod x86;

pub use errors::CodegenError;
pub use exec::{execute, native_execution_supported, ExecError};
pub use generator::{compile_program, CodeGenerator, CompiledProgram};
pub use image::{ImageError, RuntimeImage};
