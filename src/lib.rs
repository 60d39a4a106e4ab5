//! # Introduction
//!
//! `astcc` compiles a subset of C into ASTC, a tagged binary form of the
//! abstract syntax tree, and executes it on one of two backends: a
//! tree-walking interpreter or native x86-64 code emitted in process.
//!
//! ## Execution pipeline
//!
//! ```text
//! Source → Lexer → Parser → AST ─┬→ ASTC bytes (file container)
//!                                ├→ Interpreter → status + output
//!                                └→ Code generator → RTME image → native call
//! ```
//!
//! 1. [`parser`] tokenises the source and builds the AST.
//! 2. [`astc`] serializes the AST to bytes and back; the two are inverses.
//! 3. [`interpreter`] walks the AST over the cell model in [`memory`].
//! 4. [`codegen`] emits machine code with labels and backpatched jumps,
//!    wraps it in an RTME image and runs it on supported hosts.
//! 5. [`pipeline`] ties the stages together under one [`config::PipelineOptions`];
//!    [`error::CompileError`] names the stage that failed.
//!
//! The recursive stages run on a thread with a large stack ([`stage`]), so
//! their nesting and call-depth limits are reported as errors instead of
//! exhausting the caller's stack.
//!
//! ## Supported C subset
//!
//! Types: integers of every width, `float`/`double`, pointers, arrays,
//! structs, unions, enums, typedefs.
//! Control flow: `if/else`, `while`, `for`, `do-while`, `switch/case`,
//! `break`, `continue`, `return`.
//! Built-ins: `printf`, `putchar`, `puts`, `malloc`, `calloc`, `free`, `abs`, `exit`.
//! The native backend handles the integer, non-pointer part of the language.

pub mod astc;
pub mod codegen;
pub mod config;
pub mod error;
pub mod interpreter;
pub mod logger;
pub mod memory;
pub mod parser;
pub mod pipeline;
pub mod stage;

pub use config::PipelineOptions;
pub use error::CompileError;
pub use pipeline::{Backend, Pipeline, RunOutcome};
