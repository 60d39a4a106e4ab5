//! Loop statement execution (`while`, `do-while`, `for`).
//!
//! Adds `impl Interpreter` methods for the three loop forms supported by the
//! C subset. `break` and `continue` are turned into a `LoopBodyResult` so
//! the loop driver can react without inspecting the signal itself.
//!
//! `return` inside a loop body yields `LoopBodyResult::Exit`, which makes the
//! loop unwind immediately and hand the returned value to the caller.

use crate::interpreter::engine::{ControlSignal, Interpreter};
use crate::interpreter::errors::RuntimeError;
use crate::memory::value::Value;
use crate::parser::ast::AstNode;

/// How a loop body ended
pub(crate) enum LoopBodyResult {
    /// Body completed normally or via `continue`; the loop should iterate again.
    Continue,
    /// `break` was encountered; the loop should exit cleanly.
    Break,
    /// `return` was executed; the loop unwinds and propagates the value.
    Exit(Value),
}

impl Interpreter {
    /// Executes one iteration of a loop body.
    pub(crate) fn execute_loop_body(&mut self, body: &AstNode) -> Result<LoopBodyResult, RuntimeError> {
        Ok(match self.execute_statement(body)? {
            ControlSignal::Normal | ControlSignal::Continue => LoopBodyResult::Continue,
            ControlSignal::Break => LoopBodyResult::Break,
            ControlSignal::Return(value) => LoopBodyResult::Exit(value),
        })
    }

    fn loop_condition(&mut self, condition: &AstNode) -> Result<bool, RuntimeError> {
        let value = self.evaluate_expr(condition)?;
        Self::value_to_bool(&value, condition.location)
    }

    /// Executes a `while (condition) body` loop.
    pub(crate) fn execute_while(
        &mut self,
        condition: &AstNode,
        body: &AstNode,
    ) -> Result<ControlSignal, RuntimeError> {
        while self.loop_condition(condition)? {
            match self.execute_loop_body(body)? {
                LoopBodyResult::Exit(value) => return Ok(ControlSignal::Return(value)),
                LoopBodyResult::Break => break,
                LoopBodyResult::Continue => continue,
            }
        }
        Ok(ControlSignal::Normal)
    }

    /// Executes a `do body while (condition)` loop.
    ///
    /// The body always runs at least once; the condition is checked after each
    /// iteration, `continue` included.
    pub(crate) fn execute_do_while(
        &mut self,
        body: &AstNode,
        condition: &AstNode,
    ) -> Result<ControlSignal, RuntimeError> {
        loop {
            match self.execute_loop_body(body)? {
                LoopBodyResult::Exit(value) => return Ok(ControlSignal::Return(value)),
                LoopBodyResult::Break => break,
                LoopBodyResult::Continue => {}
            }
            if !self.loop_condition(condition)? {
                break;
            }
        }
        Ok(ControlSignal::Normal)
    }

    /// Executes a `for (init; condition; increment) body` loop.
    ///
    /// Variables declared by `init` live in a scope wrapping the whole loop. A
    /// missing condition loops until `break` or `return`.
    pub(crate) fn execute_for(
        &mut self,
        init: Option<&AstNode>,
        condition: Option<&AstNode>,
        increment: Option<&AstNode>,
        body: &AstNode,
    ) -> Result<ControlSignal, RuntimeError> {
        self.enter_scope();
        let result = self.run_for(init, condition, increment, body);
        self.exit_scope();
        result
    }

    fn run_for(
        &mut self,
        init: Option<&AstNode>,
        condition: Option<&AstNode>,
        increment: Option<&AstNode>,
        body: &AstNode,
    ) -> Result<ControlSignal, RuntimeError> {
        if let Some(init) = init {
            self.execute_statement(init)?;
        }

        loop {
            if let Some(cond) = condition {
                if !self.loop_condition(cond)? {
                    break;
                }
            }

            match self.execute_loop_body(body)? {
                LoopBodyResult::Exit(value) => return Ok(ControlSignal::Return(value)),
                LoopBodyResult::Break => break,
                LoopBodyResult::Continue => {}
            }

            if let Some(inc) = increment {
                self.evaluate_expr(inc)?;
            }
        }
        Ok(ControlSignal::Normal)
    }
}
