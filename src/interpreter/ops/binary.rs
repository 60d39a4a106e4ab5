use crate::interpreter::engine::Interpreter;
use crate::interpreter::errors::RuntimeError;
use crate::memory::value::{Address, Value};
use crate::parser::ast::{AstNode, BinOp, SourceLocation};

impl Interpreter {
    pub(crate) fn evaluate_binary_op(
        &mut self,
        op: BinOp,
        left: &AstNode,
        right: &AstNode,
        location: SourceLocation,
    ) -> Result<Value, RuntimeError> {
        // Logical operators short-circuit
        match op {
            BinOp::And => {
                let l = self.evaluate_expr(left)?;
                if !Self::value_to_bool(&l, left.location)? {
                    return Ok(Value::Int(0));
                }
                let r = self.evaluate_expr(right)?;
                return Ok(Value::Int(Self::value_to_bool(&r, right.location)? as i64));
            }
            BinOp::Or => {
                let l = self.evaluate_expr(left)?;
                if Self::value_to_bool(&l, left.location)? {
                    return Ok(Value::Int(1));
                }
                let r = self.evaluate_expr(right)?;
                return Ok(Value::Int(Self::value_to_bool(&r, right.location)? as i64));
            }
            _ => {}
        }

        let left_val = self.evaluate_expr(left)?;
        let right_val = self.evaluate_expr(right)?;

        if matches!(op, BinOp::Add | BinOp::Sub) && (left_val.is_pointer() || right_val.is_pointer()) {
            return self.pointer_arithmetic(op, left, right, left_val, right_val, location);
        }
        Self::apply_binary(op, left_val, right_val, location)
    }

    /// Cells one step of a pointer expression moves
    pub(crate) fn pointer_stride(&self, pointer_expr: &AstNode) -> Result<i64, RuntimeError> {
        let ty = self.infer_expr_type(pointer_expr)?.decayed();
        self.types
            .pointee_stride(&ty)
            .map(|s| s as i64)
            .map_err(|e| RuntimeError::from_layout(e, pointer_expr.location))
    }

    /// `p + n`, `n + p`, `p - n` scale by the pointee size; `p - q` counts elements
    fn pointer_arithmetic(
        &self,
        op: BinOp,
        left: &AstNode,
        right: &AstNode,
        left_val: Value,
        right_val: Value,
        location: SourceLocation,
    ) -> Result<Value, RuntimeError> {
        match (left_val, right_val) {
            (Value::Pointer(a), Value::Pointer(b)) if op == BinOp::Sub => {
                let stride = self.pointer_stride(left)?;
                Ok(Value::Int((a as i64).wrapping_sub(b as i64) / stride))
            }
            (Value::Pointer(addr), Value::Int(n)) => {
                let stride = self.pointer_stride(left)?;
                let delta = if op == BinOp::Sub { n.wrapping_neg() } else { n };
                Ok(Value::Pointer(Self::offset_address(addr, delta, stride)))
            }
            (Value::Int(n), Value::Pointer(addr)) if op == BinOp::Add => {
                let stride = self.pointer_stride(right)?;
                Ok(Value::Pointer(Self::offset_address(addr, n, stride)))
            }
            (l, r) => Err(RuntimeError::type_error(
                format!(
                    "invalid operands to '{}' ({} and {})",
                    op.symbol(),
                    l.kind_name(),
                    r.kind_name()
                ),
                location,
            )),
        }
    }

    pub(crate) fn offset_address(addr: Address, count: i64, stride: i64) -> Address {
        (addr as i64).wrapping_add(count.wrapping_mul(stride)) as Address
    }

    /// Arithmetic, bitwise and comparison operators on scalar values.
    /// Integers wrap; a floating operand promotes the operation to `f64`.
    pub(crate) fn apply_binary(
        op: BinOp,
        left: Value,
        right: Value,
        location: SourceLocation,
    ) -> Result<Value, RuntimeError> {
        if left.is_float() || right.is_float() {
            return Self::apply_float(op, left, right, location);
        }

        let (Some(a), Some(b)) = (left.as_int(), right.as_int()) else {
            return Err(RuntimeError::type_error(
                format!(
                    "invalid operands to '{}' ({} and {})",
                    op.symbol(),
                    left.kind_name(),
                    right.kind_name()
                ),
                location,
            ));
        };

        let result = match op {
            BinOp::Add => a.wrapping_add(b),
            BinOp::Sub => a.wrapping_sub(b),
            BinOp::Mul => a.wrapping_mul(b),
            BinOp::Div | BinOp::Mod if b == 0 => {
                return Err(RuntimeError::DivisionByZero { location })
            }
            BinOp::Div => a.wrapping_div(b),
            BinOp::Mod => a.wrapping_rem(b),
            BinOp::BitAnd => a & b,
            BinOp::BitOr => a | b,
            BinOp::BitXor => a ^ b,
            BinOp::Shl => a.wrapping_shl((b & 63) as u32),
            BinOp::Shr => a.wrapping_shr((b & 63) as u32),
            BinOp::Eq => (a == b) as i64,
            BinOp::Ne => (a != b) as i64,
            BinOp::Lt => (a < b) as i64,
            BinOp::Le => (a <= b) as i64,
            BinOp::Gt => (a > b) as i64,
            BinOp::Ge => (a >= b) as i64,
            BinOp::And => (a != 0 && b != 0) as i64,
            BinOp::Or => (a != 0 || b != 0) as i64,
        };
        Ok(Value::Int(result))
    }

    fn apply_float(op: BinOp, left: Value, right: Value, location: SourceLocation) -> Result<Value, RuntimeError> {
        let (Some(a), Some(b)) = (left.as_float(), right.as_float()) else {
            return Err(RuntimeError::type_error(
                format!(
                    "invalid operands to '{}' ({} and {})",
                    op.symbol(),
                    left.kind_name(),
                    right.kind_name()
                ),
                location,
            ));
        };
        Ok(match op {
            BinOp::Add => Value::Float(a + b),
            BinOp::Sub => Value::Float(a - b),
            BinOp::Mul => Value::Float(a * b),
            BinOp::Div => Value::Float(a / b),
            BinOp::Eq => Value::Int((a == b) as i64),
            BinOp::Ne => Value::Int((a != b) as i64),
            BinOp::Lt => Value::Int((a < b) as i64),
            BinOp::Le => Value::Int((a <= b) as i64),
            BinOp::Gt => Value::Int((a > b) as i64),
            BinOp::Ge => Value::Int((a >= b) as i64),
            BinOp::And => Value::Int((a != 0.0 && b != 0.0) as i64),
            BinOp::Or => Value::Int((a != 0.0 || b != 0.0) as i64),
            BinOp::Mod | BinOp::BitAnd | BinOp::BitOr | BinOp::BitXor | BinOp::Shl | BinOp::Shr => {
                return Err(RuntimeError::type_error(
                    format!("invalid operands to '{}' (floating point)", op.symbol()),
                    location,
                ))
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn apply(op: BinOp, a: Value, b: Value) -> Result<Value, RuntimeError> {
        Interpreter::apply_binary(op, a, b, SourceLocation::default())
    }

    #[test]
    fn test_integer_arithmetic_wraps() {
        assert_eq!(apply(BinOp::Add, Value::Int(i64::MAX), Value::Int(1)), Ok(Value::Int(i64::MIN)));
        assert_eq!(apply(BinOp::Div, Value::Int(i64::MIN), Value::Int(-1)), Ok(Value::Int(i64::MIN)));
        assert_eq!(apply(BinOp::Mod, Value::Int(-7), Value::Int(3)), Ok(Value::Int(-1)));
        assert_eq!(apply(BinOp::Shr, Value::Int(-8), Value::Int(1)), Ok(Value::Int(-4)));
    }

    #[test]
    fn test_division_by_zero() {
        assert!(matches!(
            apply(BinOp::Div, Value::Int(1), Value::Int(0)),
            Err(RuntimeError::DivisionByZero { .. })
        ));
        assert!(matches!(
            apply(BinOp::Mod, Value::Int(1), Value::Int(0)),
            Err(RuntimeError::DivisionByZero { .. })
        ));
    }

    #[test]
    fn test_float_promotion() {
        assert_eq!(apply(BinOp::Mul, Value::Int(3), Value::Float(0.5)), Ok(Value::Float(1.5)));
        assert_eq!(apply(BinOp::Lt, Value::Float(0.1), Value::Int(1)), Ok(Value::Int(1)));
        assert!(apply(BinOp::Mod, Value::Float(1.0), Value::Int(2)).is_err());
    }
}
