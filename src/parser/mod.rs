//! C source front end
//!
//! This module transforms C source text into the ASTC tree:
//! - [`lexer`]: Tokenization (source text → tokens)
//! - [`parse`]: Parser struct, error type and helpers (tokens → AST)
//! - [`ast`]: AST node definitions
//! - [`wasm`]: WASM-form instruction nodes
//!
//! # Supported C Subset
//!
//! - Types: `void`, `_Bool`, `char`, `short`, `int`, `long`, `float`, `double`,
//!   `signed`/`unsigned`, pointers, arrays, `struct`, `union`, `enum`, `typedef`
//! - Statements: declarations, control flow (`if`, `while`, `do`, `for`, `switch`),
//!   `return`, `break`, `continue`
//! - Expressions: arithmetic, logical, bitwise, assignment, ternary, casts,
//!   `sizeof`, calls, subscripts, member access
//! - No preprocessor (`#` lines are skipped), no `goto`
//!
//! # Parser Implementation
//!
//! Hand-written recursive descent parser with precedence climbing for binary operators.
//! No external parser generator dependencies.

pub mod ast;
mod declarations;
pub mod expressions;
pub mod lexer;
pub mod parse;
mod statements;
pub mod wasm;

pub use parse::{parse_source, ParseError, Parser};
