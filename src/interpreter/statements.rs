//! Statement execution implementation
//!
//! This module handles the execution of all C statement types, including:
//!
//! - Variable declarations and initializations
//! - Local struct, union, enum and typedef declarations
//! - Control flow (if/else, while, for, do-while, switch/case)
//! - Blocks and compound statements
//! - Expression statements
//!
//! # Implementation
//!
//! All statement execution methods are implemented as `pub(crate)` methods
//! on the [`Interpreter`] struct, allowing them to access and modify the
//! interpreter's state (memory, types, output, etc.).
//!
//! # Control Flow
//!
//! Every statement yields a [`ControlSignal`]. A block stops at the first
//! signal other than `Normal` and hands it to its caller; loops consume
//! `Break`/`Continue` (see `loops.rs`) and `Return` travels up to the call.

use crate::interpreter::engine::{ControlSignal, Interpreter};
use crate::interpreter::errors::RuntimeError;
use crate::parser::ast::*;

impl Interpreter {
    pub(crate) fn execute_statement(&mut self, stmt: &AstNode) -> Result<ControlSignal, RuntimeError> {
        let location = stmt.location;
        match &stmt.kind {
            NodeKind::Compound { statements } => {
                self.enter_scope();
                let signal = self.execute_block(statements);
                self.exit_scope();
                signal
            }
            NodeKind::DeclStmt { declarations } => {
                for decl in declarations {
                    self.execute_statement(decl)?;
                }
                Ok(ControlSignal::Normal)
            }
            NodeKind::VarDecl {
                name,
                var_type,
                init,
            } => {
                self.execute_var_decl(name, var_type, init.as_deref(), location)?;
                Ok(ControlSignal::Normal)
            }
            NodeKind::StructDecl { .. }
            | NodeKind::UnionDecl { .. }
            | NodeKind::EnumDecl { .. }
            | NodeKind::TypedefDecl { .. } => {
                self.register_type_decl(stmt)?;
                Ok(ControlSignal::Normal)
            }
            NodeKind::If {
                condition,
                then_branch,
                else_branch,
            } => self.execute_if(condition, then_branch, else_branch.as_deref()),
            NodeKind::While { condition, body } => self.execute_while(condition, body),
            NodeKind::DoWhile { body, condition } => self.execute_do_while(body, condition),
            NodeKind::For {
                init,
                condition,
                increment,
                body,
            } => self.execute_for(
                init.as_deref(),
                condition.as_deref(),
                increment.as_deref(),
                body,
            ),
            NodeKind::Switch { expr, cases } => self.execute_switch(expr, cases),
            NodeKind::Return { expr } => self.execute_return(expr.as_deref()),
            NodeKind::Break => Ok(ControlSignal::Break),
            NodeKind::Continue => Ok(ControlSignal::Continue),
            NodeKind::ExprStmt { expr } => {
                self.evaluate_expr(expr)?;
                Ok(ControlSignal::Normal)
            }
            NodeKind::Empty => Ok(ControlSignal::Normal),
            NodeKind::FunctionDecl { name, .. } => Err(RuntimeError::unsupported(
                format!("nested function '{}'", name),
                location,
            )),
            NodeKind::TranslationUnit { .. } => {
                Err(RuntimeError::unsupported("nested translation unit", location))
            }
            // Bare expressions (e.g. WASM-form instructions) used as statements
            _ => {
                self.evaluate_expr(stmt)?;
                Ok(ControlSignal::Normal)
            }
        }
    }

    /// Run statements in order, stopping at the first non-`Normal` signal
    pub(crate) fn execute_block(&mut self, statements: &[AstNode]) -> Result<ControlSignal, RuntimeError> {
        for stmt in statements {
            let signal = self.execute_statement(stmt)?;
            if signal != ControlSignal::Normal {
                return Ok(signal);
            }
        }
        Ok(ControlSignal::Normal)
    }

    pub(crate) fn execute_var_decl(
        &mut self,
        name: &str,
        var_type: &Type,
        init: Option<&AstNode>,
        location: SourceLocation,
    ) -> Result<(), RuntimeError> {
        let resolved = self.complete_declared_type(var_type, init, location)?;
        // The initializer cannot see the variable it initializes
        let initial = match init {
            Some(expr) if !resolved.is_array() => Some(self.evaluate_expr(expr)?),
            _ => None,
        };
        let address = self.declare_local(name, resolved.clone(), location)?;

        match (init, initial) {
            (_, Some(value)) => self.initialize_value(address, &resolved, value, location),
            (Some(expr), None) => self.initialize(address, &resolved, expr, location),
            (None, None) => Ok(()),
        }
    }

    pub(crate) fn execute_if(
        &mut self,
        condition: &AstNode,
        then_branch: &AstNode,
        else_branch: Option<&AstNode>,
    ) -> Result<ControlSignal, RuntimeError> {
        let cond_val = self.evaluate_expr(condition)?;
        if Self::value_to_bool(&cond_val, condition.location)? {
            self.execute_statement(then_branch)
        } else if let Some(else_branch) = else_branch {
            self.execute_statement(else_branch)
        } else {
            Ok(ControlSignal::Normal)
        }
    }
}
