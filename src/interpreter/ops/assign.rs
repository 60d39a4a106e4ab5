//! Assignment evaluation (`=` and compound assignment)
//!
//! The target is resolved to a [`Place`] before the right-hand side is
//! evaluated. The value of an assignment expression is the value stored,
//! after conversion to the target's type.

use crate::interpreter::engine::Interpreter;
use crate::interpreter::errors::RuntimeError;
use crate::interpreter::memory_ops::Place;
use crate::memory::value::Value;
use crate::parser::ast::*;

impl Interpreter {
    pub(crate) fn evaluate_assignment(
        &mut self,
        op: Option<BinOp>,
        target: &AstNode,
        value: &AstNode,
        location: SourceLocation,
    ) -> Result<Value, RuntimeError> {
        let place = self.place_of(target)?;
        let rhs = self.evaluate_expr(value)?;

        let new_value = match op {
            None => rhs,
            Some(op) => self.compound_value(&place, op, rhs, location)?,
        };
        self.store(&place, new_value, location)
    }

    /// `target op= rhs`: read the target once and combine
    fn compound_value(
        &mut self,
        place: &Place,
        op: BinOp,
        rhs: Value,
        location: SourceLocation,
    ) -> Result<Value, RuntimeError> {
        let current = self.load(place, location)?;
        match (current, rhs) {
            (Value::Pointer(addr), Value::Int(n)) if matches!(op, BinOp::Add | BinOp::Sub) => {
                let stride = self
                    .types
                    .pointee_stride(&place.ty)
                    .map_err(|e| RuntimeError::from_layout(e, location))?;
                let delta = if op == BinOp::Sub { n.wrapping_neg() } else { n };
                Ok(Value::Pointer(Self::offset_address(addr, delta, stride as i64)))
            }
            (current, rhs) => Self::apply_binary(op, current, rhs, location),
        }
    }
}
