//! Unary operator evaluation

use crate::interpreter::engine::Interpreter;
use crate::interpreter::errors::RuntimeError;
use crate::memory::value::Value;
use crate::parser::ast::*;

impl Interpreter {
    pub(crate) fn evaluate_unary_op(
        &mut self,
        op: UnOp,
        operand: &AstNode,
        location: SourceLocation,
    ) -> Result<Value, RuntimeError> {
        use UnOp::*;

        match op {
            Neg => self.evaluate_neg_op(operand, location),
            Not => {
                let val = self.evaluate_expr(operand)?;
                let b = Self::value_to_bool(&val, location)?;
                Ok(Value::Int(if b { 0 } else { 1 }))
            }
            BitNot => match self.evaluate_expr(operand)? {
                Value::Int(n) => Ok(Value::Int(!n)),
                other => Err(RuntimeError::type_error(
                    format!("invalid operand to '~' ({})", other.kind_name()),
                    location,
                )),
            },
            PreInc | PreDec | PostInc | PostDec => self.evaluate_inc_dec_op(op, operand, location),
            Deref => {
                let place = self.deref_place(operand, location)?;
                self.load(&place, location)
            }
            AddrOf => {
                let place = self.place_of(operand)?;
                Ok(Value::Pointer(place.address))
            }
        }
    }

    fn evaluate_neg_op(&mut self, operand: &AstNode, location: SourceLocation) -> Result<Value, RuntimeError> {
        match self.evaluate_expr(operand)? {
            Value::Int(n) => Ok(Value::Int(n.wrapping_neg())),
            Value::Float(x) => Ok(Value::Float(-x)),
            other => Err(RuntimeError::type_error(
                format!("invalid operand to unary '-' ({})", other.kind_name()),
                location,
            )),
        }
    }

    /// `++`/`--` in both forms; pointers step by their pointee size
    fn evaluate_inc_dec_op(
        &mut self,
        op: UnOp,
        operand: &AstNode,
        location: SourceLocation,
    ) -> Result<Value, RuntimeError> {
        let place = self.place_of(operand)?;
        let current = self.load(&place, location)?;
        let delta: i64 = if matches!(op, UnOp::PreInc | UnOp::PostInc) { 1 } else { -1 };

        let updated = match current {
            Value::Pointer(addr) => {
                let stride = self
                    .types
                    .pointee_stride(&place.ty)
                    .map_err(|e| RuntimeError::from_layout(e, location))?;
                Value::Pointer(Self::offset_address(addr, delta, stride as i64))
            }
            Value::Float(x) => Value::Float(x + delta as f64),
            Value::Int(n) => Value::Int(n.wrapping_add(delta)),
            Value::Uninitialized => {
                return Err(RuntimeError::UninitializedRead {
                    name: place.label,
                    location,
                })
            }
        };

        let stored = self.store(&place, updated, location)?;
        match op {
            UnOp::PreInc | UnOp::PreDec => Ok(stored),
            _ => Ok(current),
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::interpreter::{Interpreter, InterpreterConfig, RuntimeError};
    use crate::parser::parse_source;

    fn run(source: &str) -> Result<i64, RuntimeError> {
        let unit = parse_source(source, "unary.c").unwrap();
        Interpreter::new(&unit, InterpreterConfig::default()).run()
    }

    #[test]
    fn test_prefix_and_postfix() {
        assert_eq!(run("int main() { int i = 5; int a = i++; int b = ++i; return a * 10 + b; }"), Ok(57));
        assert_eq!(run("int main() { int i = 5; int a = i--; return a - --i; }"), Ok(2));
    }

    #[test]
    fn test_pointer_increment_walks_array() {
        let source = "int main() { int a[3]; a[0] = 1; a[1] = 2; a[2] = 3; int *p = a; p++; ++p; return *p + *(p - 1); }";
        assert_eq!(run(source), Ok(5));
    }

    #[test]
    fn test_char_increment_wraps() {
        assert_eq!(run("int main() { char c = 127; c++; return c; }"), Ok(-128));
    }

    #[test]
    fn test_logical_and_bitwise_not() {
        assert_eq!(run("int main() { return !0 + !5 + ~0; }"), Ok(0));
    }
}
