//! The compilation pipeline
//!
//! ```text
//! source ─ lex ─ parse ─ AST ─┬─ serialize ─ ASTC bytes
//!                             ├─ interpret ─ status + output
//!                             └─ codegen ─ machine code ─ RTME image / execution
//! ```
//!
//! One [`Pipeline`] value holds the options; each method runs the stages it
//! needs and stops at the first failing one.

use crate::astc::{self, AstcModule};
use crate::codegen::{self, CompiledProgram, ExecError, RuntimeImage};
use crate::config::PipelineOptions;
use crate::error::CompileError;
use crate::interpreter::Interpreter;
use crate::parser::ast::AstNode;
use crate::parser::lexer::{lex_errors, Lexer, Token};
use crate::parser::Parser;
use crate::stage;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Execution backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    #[default]
    Interpreter,
    Native,
}

/// Result of running a program
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOutcome {
    /// Return value of the entry function (or the `exit` status)
    pub status: i64,
    /// Text the program printed; always empty for native runs
    pub output: String,
}

#[derive(Debug, Clone, Default)]
pub struct Pipeline {
    options: PipelineOptions,
}

impl Pipeline {
    pub fn new(options: PipelineOptions) -> Self {
        Pipeline { options }
    }

    pub fn options(&self) -> &PipelineOptions {
        &self.options
    }

    /// Lex `source`; every lexical error is reported together
    pub fn tokenize(&self, source: &str) -> Result<Vec<Token>, CompileError> {
        let tokens = Lexer::new(source, &self.options.source_name).tokenize();
        let errors = lex_errors(&tokens);
        if !errors.is_empty() {
            for error in &errors {
                tracing::warn!(%error, "lexical error");
            }
            return Err(CompileError::Lex(errors));
        }
        tracing::debug!(tokens = tokens.len(), source = %self.options.source_name, "lexed source");
        Ok(tokens)
    }

    pub fn parse(&self, source: &str) -> Result<AstNode, CompileError> {
        let tokens = self.tokenize(source)?;
        Ok(Parser::from_tokens(tokens).parse_program()?)
    }

    /// Encode a translation unit as an ASTC module
    pub fn serialize(&self, unit: &AstNode) -> Result<Vec<u8>, CompileError> {
        let bytes = astc::encode_module(unit, &self.options.entry_point)?;
        tracing::debug!(bytes = bytes.len(), "serialized unit");
        Ok(bytes)
    }

    pub fn deserialize(&self, bytes: &[u8]) -> Result<AstcModule, CompileError> {
        Ok(astc::decode_module(bytes)?)
    }

    /// Parse `source` and write it to `path` as an ASTC module
    pub fn compile_to_file(&self, source: &str, path: &Path) -> Result<AstNode, CompileError> {
        let unit = self.parse(source)?;
        astc::file::save_astc_with_entry(path, &unit, &self.options.entry_point)?;
        Ok(unit)
    }

    pub fn load_module(&self, path: &Path) -> Result<AstcModule, CompileError> {
        Ok(astc::load_astc(path)?)
    }

    pub fn interpret(&self, unit: &AstNode) -> Result<RunOutcome, CompileError> {
        let mut interpreter = Interpreter::new(unit, self.options.interpreter_config());
        let status = interpreter.run()?;
        tracing::debug!(status, "interpreter finished");
        Ok(RunOutcome {
            status,
            output: interpreter.take_output(),
        })
    }

    /// Like [`Pipeline::interpret`], but hands back the output even on failure
    pub fn interpret_with_output(&self, unit: &AstNode) -> (Result<i64, CompileError>, String) {
        let mut interpreter = Interpreter::new(unit, self.options.interpreter_config());
        let result = interpreter.run().map_err(CompileError::from);
        (result, interpreter.take_output())
    }

    pub fn codegen(&self, unit: &AstNode) -> Result<CompiledProgram, CompileError> {
        Ok(codegen::compile_program(unit, &self.options.entry_point)?)
    }

    pub fn runtime_image(&self, unit: &AstNode) -> Result<RuntimeImage, CompileError> {
        let program = self.codegen(unit)?;
        Ok(RuntimeImage::from_program(&program)?)
    }

    /// Compile to machine code and run it in this process, on a stage thread
    pub fn run_native(&self, unit: &AstNode) -> Result<RunOutcome, CompileError> {
        let image = self.runtime_image(unit)?;
        // SAFETY: the image holds code the generator just produced
        let status = stage::run_staged(|| unsafe { codegen::execute(&image) }).map_err(|source| ExecError::Os {
            call: "spawn",
            source,
        })??;
        Ok(RunOutcome {
            status,
            output: String::new(),
        })
    }

    pub fn run(&self, unit: &AstNode, backend: Backend) -> Result<RunOutcome, CompileError> {
        match backend {
            Backend::Interpreter => self.interpret(unit),
            Backend::Native => self.run_native(unit),
        }
    }

    /// Parse and run `source` in one go
    pub fn run_source(&self, source: &str, backend: Backend) -> Result<RunOutcome, CompileError> {
        let unit = self.parse(source)?;
        self.run(&unit, backend)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_lex_errors_are_reported() {
        let pipeline = Pipeline::default();
        match pipeline.parse("int main() { return @ + $; }") {
            Err(CompileError::Lex(errors)) => assert_eq!(errors.len(), 2),
            other => panic!("expected lexical errors, got {:?}", other),
        }
    }

    #[test]
    fn test_stage_names() {
        let pipeline = Pipeline::default();
        let err = pipeline.parse("int main( { }").unwrap_err();
        assert_eq!(err.stage(), "parser");
        assert!(err.to_string().starts_with("parsing failed"));

        let err = pipeline.run_source("int main() { return 1 / 0; }", Backend::Interpreter).unwrap_err();
        assert_eq!(err.stage(), "interpreter");
        assert_eq!(err.location().map(|l| l.line), Some(1));
    }

    #[test]
    fn test_interpret_captures_output() {
        let pipeline = Pipeline::default();
        let outcome = pipeline
            .run_source("int main() { printf(\"%d\\n\", 6 * 7); return 3; }", Backend::Interpreter)
            .unwrap();
        assert_eq!(outcome, RunOutcome { status: 3, output: "42\n".to_string() });
    }

    #[test]
    fn test_serialized_module_runs_the_same() {
        let pipeline = Pipeline::default();
        let unit = pipeline.parse("int sq(int x) { return x * x; } int main() { return sq(9); }").unwrap();
        let module = pipeline.deserialize(&pipeline.serialize(&unit).unwrap()).unwrap();
        assert_eq!(module.unit, unit);
        assert_eq!(pipeline.interpret(&module.unit).unwrap().status, 81);
    }

    #[test]
    fn test_custom_entry_point() {
        let options = PipelineOptions {
            entry_point: "start".to_string(),
            ..PipelineOptions::default()
        };
        let pipeline = Pipeline::new(options);
        assert_eq!(pipeline.run_source("int start() { return 5; }", Backend::Interpreter).unwrap().status, 5);
        let program = pipeline.codegen(&pipeline.parse("int start() { return 5; }").unwrap()).unwrap();
        assert_eq!(program.symbols["start"], program.entry_offset);
    }
}
