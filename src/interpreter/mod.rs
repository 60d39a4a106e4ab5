//! Tree-walking interpreter
//!
//! This module provides the execution backend that walks the ASTC tree:
//! - [`engine`]: Interpreter state, program loading and function calls
//! - [`statements`], [`loops`], [`jumps`]: statement execution
//! - [`expressions`], [`ops`]: expression evaluation
//! - [`memory_ops`]: lvalues, loads and stores over the cell memory
//! - [`type_system`]: static types of expressions and value conversion
//! - [`builtins`]: `printf`, `malloc` and the other library functions
//! - [`wasm`]: folded WASM-form instructions
//! - [`errors`]: Runtime error types
//!
//! # Execution Model
//!
//! Statements return a control signal (normal, return, break, continue)
//! that the enclosing loop, switch or call consumes. Every runtime fault is
//! a typed [`RuntimeError`] carrying the source location where it happened.

pub mod builtins;
pub mod constants;
pub mod engine;
pub mod errors;
pub mod expressions;
pub mod jumps;
pub mod loops;
pub mod memory_ops;
pub mod ops;
pub mod statements;
pub mod type_system;
pub mod wasm;

pub use engine::{FunctionDef, Interpreter, InterpreterConfig};
pub use errors::RuntimeError;
