//! Operator evaluation
//!
//! - [`access`]: subscripts and member access
//! - [`assign`]: `=` and compound assignment
//! - [`binary`]: arithmetic, comparison, logical and pointer arithmetic
//! - [`unary`]: negation, increment/decrement, address-of and dereference
//!
//! Everything here is an `impl Interpreter` block.

pub mod access;
pub mod assign;
pub mod binary;
pub mod unary;
