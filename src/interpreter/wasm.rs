//! Evaluation of folded WASM-form instructions
//!
//! Integer instructions follow WASM semantics on top of the 64-bit cell
//! values: `i32` operations truncate their operands and sign-extend the
//! result, `*_u` variants reinterpret as unsigned. Locals are addressed by
//! name and share storage with C variables in scope.

use crate::interpreter::engine::Interpreter;
use crate::interpreter::errors::RuntimeError;
use crate::memory::value::Value;
use crate::parser::ast::{AstNode, NodeKind, SourceLocation};
use crate::parser::wasm::{WasmImmediate, WasmInstr, WasmOp};

impl Interpreter {
    pub(crate) fn evaluate_wasm(&mut self, instr: &WasmInstr, location: SourceLocation) -> Result<Value, RuntimeError> {
        use WasmOp::*;

        match instr.op {
            Nop => Ok(Value::Int(0)),
            Unreachable => Err(RuntimeError::Unreachable { location }),
            Drop => {
                self.evaluate_expr(Self::wasm_operand(instr, 0, location)?)?;
                Ok(Value::Int(0))
            }
            Select => {
                let a = self.evaluate_expr(Self::wasm_operand(instr, 0, location)?)?;
                let b = self.evaluate_expr(Self::wasm_operand(instr, 1, location)?)?;
                let cond = self.wasm_int(instr, 2, location)?;
                Ok(if cond as i32 != 0 { a } else { b })
            }

            I32Const | I64Const | F32Const | F64Const => match (&instr.op, &instr.immediate) {
                (I32Const, WasmImmediate::I32(n)) => Ok(Value::Int(*n as i64)),
                (I64Const, WasmImmediate::I64(n)) => Ok(Value::Int(*n)),
                (F32Const, WasmImmediate::F32(x)) => Ok(Value::Float(*x as f64)),
                (F64Const, WasmImmediate::F64(x)) => Ok(Value::Float(*x)),
                (op, imm) => Err(RuntimeError::type_error(
                    format!("{} has a mismatched immediate {:?}", op.name(), imm),
                    location,
                )),
            },

            LocalGet | LocalSet | LocalTee => self.evaluate_local(instr, location),

            I32Eqz => Ok(Self::flag(self.wasm_int(instr, 0, location)? as i32 == 0)),
            I64Eqz => Ok(Self::flag(self.wasm_int(instr, 0, location)? == 0)),

            I32Clz | I32Ctz | I32Popcnt | I64Clz | I64Ctz | I64Popcnt => {
                let n = self.wasm_int(instr, 0, location)?;
                let result = match instr.op {
                    I32Clz => (n as u32).leading_zeros() as i64,
                    I32Ctz => (n as u32).trailing_zeros() as i64,
                    I32Popcnt => (n as u32).count_ones() as i64,
                    I64Clz => n.leading_zeros() as i64,
                    I64Ctz => n.trailing_zeros() as i64,
                    _ => n.count_ones() as i64,
                };
                Ok(Value::Int(result))
            }

            I32WrapI64 => Ok(Value::Int(self.wasm_int(instr, 0, location)? as i32 as i64)),
            I64ExtendI32S => Ok(Value::Int(self.wasm_int(instr, 0, location)? as i32 as i64)),
            I64ExtendI32U => Ok(Value::Int(self.wasm_int(instr, 0, location)? as u32 as i64)),

            op if Self::is_i32_binary(op) => {
                let a = self.wasm_int(instr, 0, location)? as i32;
                let b = self.wasm_int(instr, 1, location)? as i32;
                Self::i32_binary(op, a, b, location)
            }
            op if Self::is_i64_binary(op) => {
                let a = self.wasm_int(instr, 0, location)?;
                let b = self.wasm_int(instr, 1, location)?;
                Self::i64_binary(op, a, b, location)
            }

            op => Err(RuntimeError::unsupported(
                format!("WASM instruction '{}'", op.name()),
                location,
            )),
        }
    }

    fn wasm_operand(instr: &WasmInstr, index: usize, location: SourceLocation) -> Result<&AstNode, RuntimeError> {
        instr.operands.get(index).ok_or_else(|| {
            RuntimeError::type_error(
                format!("{} is missing operand {}", instr.op.name(), index + 1),
                location,
            )
        })
    }

    fn wasm_int(&mut self, instr: &WasmInstr, index: usize, location: SourceLocation) -> Result<i64, RuntimeError> {
        let operand = Self::wasm_operand(instr, index, location)?;
        match self.evaluate_expr(operand)? {
            Value::Int(n) => Ok(n),
            Value::Pointer(addr) => Ok(addr as i64),
            other => Err(RuntimeError::type_error(
                format!("{} expects an integer operand, got {}", instr.op.name(), other.kind_name()),
                location,
            )),
        }
    }

    fn evaluate_local(&mut self, instr: &WasmInstr, location: SourceLocation) -> Result<Value, RuntimeError> {
        let WasmImmediate::Name(name) = &instr.immediate else {
            return Err(RuntimeError::unsupported(
                format!("{} without a local name", instr.op.name()),
                location,
            ));
        };
        let target = AstNode::new(NodeKind::Identifier(name.clone()), location);
        let place = self.place_of(&target)?;
        if instr.op == WasmOp::LocalGet {
            return self.load(&place, location);
        }

        let value = self.evaluate_expr(Self::wasm_operand(instr, 0, location)?)?;
        let stored = self.store(&place, value, location)?;
        Ok(if instr.op == WasmOp::LocalTee {
            stored
        } else {
            Value::Int(0)
        })
    }

    fn flag(b: bool) -> Value {
        Value::Int(b as i64)
    }

    fn is_i32_binary(op: WasmOp) -> bool {
        (WasmOp::I32Eq.code()..=WasmOp::I32GeU.code()).contains(&op.code())
            || (WasmOp::I32Add.code()..=WasmOp::I32Rotr.code()).contains(&op.code())
    }

    fn is_i64_binary(op: WasmOp) -> bool {
        (WasmOp::I64Eq.code()..=WasmOp::I64GeU.code()).contains(&op.code())
            || (WasmOp::I64Add.code()..=WasmOp::I64Rotr.code()).contains(&op.code())
    }

    fn i32_binary(op: WasmOp, a: i32, b: i32, location: SourceLocation) -> Result<Value, RuntimeError> {
        use WasmOp::*;

        let (ua, ub) = (a as u32, b as u32);
        let result = match op {
            I32Eq => return Ok(Self::flag(a == b)),
            I32Ne => return Ok(Self::flag(a != b)),
            I32LtS => return Ok(Self::flag(a < b)),
            I32LtU => return Ok(Self::flag(ua < ub)),
            I32GtS => return Ok(Self::flag(a > b)),
            I32GtU => return Ok(Self::flag(ua > ub)),
            I32LeS => return Ok(Self::flag(a <= b)),
            I32LeU => return Ok(Self::flag(ua <= ub)),
            I32GeS => return Ok(Self::flag(a >= b)),
            I32GeU => return Ok(Self::flag(ua >= ub)),
            I32DivS | I32DivU | I32RemS | I32RemU if b == 0 => {
                return Err(RuntimeError::DivisionByZero { location })
            }
            I32Add => a.wrapping_add(b),
            I32Sub => a.wrapping_sub(b),
            I32Mul => a.wrapping_mul(b),
            I32DivS => a.wrapping_div(b),
            I32DivU => (ua / ub) as i32,
            I32RemS => a.wrapping_rem(b),
            I32RemU => (ua % ub) as i32,
            I32And => a & b,
            I32Or => a | b,
            I32Xor => a ^ b,
            I32Shl => a.wrapping_shl(ub),
            I32ShrS => a.wrapping_shr(ub),
            I32ShrU => ua.wrapping_shr(ub) as i32,
            I32Rotl => ua.rotate_left(ub % 32) as i32,
            I32Rotr => ua.rotate_right(ub % 32) as i32,
            other => {
                return Err(RuntimeError::unsupported(
                    format!("WASM instruction '{}'", other.name()),
                    location,
                ))
            }
        };
        Ok(Value::Int(result as i64))
    }

    fn i64_binary(op: WasmOp, a: i64, b: i64, location: SourceLocation) -> Result<Value, RuntimeError> {
        use WasmOp::*;

        let (ua, ub) = (a as u64, b as u64);
        let result = match op {
            I64Eq => return Ok(Self::flag(a == b)),
            I64Ne => return Ok(Self::flag(a != b)),
            I64LtS => return Ok(Self::flag(a < b)),
            I64LtU => return Ok(Self::flag(ua < ub)),
            I64GtS => return Ok(Self::flag(a > b)),
            I64GtU => return Ok(Self::flag(ua > ub)),
            I64LeS => return Ok(Self::flag(a <= b)),
            I64LeU => return Ok(Self::flag(ua <= ub)),
            I64GeS => return Ok(Self::flag(a >= b)),
            I64GeU => return Ok(Self::flag(ua >= ub)),
            I64DivS | I64DivU | I64RemS | I64RemU if b == 0 => {
                return Err(RuntimeError::DivisionByZero { location })
            }
            I64Add => a.wrapping_add(b),
            I64Sub => a.wrapping_sub(b),
            I64Mul => a.wrapping_mul(b),
            I64DivS => a.wrapping_div(b),
            I64DivU => (ua / ub) as i64,
            I64RemS => a.wrapping_rem(b),
            I64RemU => (ua % ub) as i64,
            I64And => a & b,
            I64Or => a | b,
            I64Xor => a ^ b,
            I64Shl => a.wrapping_shl(ub as u32),
            I64ShrS => a.wrapping_shr(ub as u32),
            I64ShrU => ua.wrapping_shr(ub as u32) as i64,
            I64Rotl => ua.rotate_left((ub % 64) as u32) as i64,
            I64Rotr => ua.rotate_right((ub % 64) as u32) as i64,
            other => {
                return Err(RuntimeError::unsupported(
                    format!("WASM instruction '{}'", other.name()),
                    location,
                ))
            }
        };
        Ok(Value::Int(result))
    }
}

#[cfg(test)]
mod tests {
    use crate::interpreter::{Interpreter, InterpreterConfig, RuntimeError};
    use crate::memory::value::Value;
    use crate::parser::ast::{AstNode, NodeKind, SourceLocation};
    use crate::parser::parse_source;
    use crate::parser::wasm::{WasmImmediate, WasmInstr, WasmOp};

    fn wasm(op: WasmOp, immediate: WasmImmediate, operands: Vec<AstNode>) -> AstNode {
        AstNode::new(
            NodeKind::Wasm(WasmInstr::new(op, immediate, operands)),
            SourceLocation::default(),
        )
    }

    fn i32c(n: i32) -> AstNode {
        wasm(WasmOp::I32Const, WasmImmediate::I32(n), vec![])
    }

    fn eval(node: &AstNode) -> Result<Value, RuntimeError> {
        let unit = parse_source("int main() { return 0; }", "wasm.c").unwrap();
        let mut interp = Interpreter::new(&unit, InterpreterConfig::default());
        interp.evaluate_expr(node)
    }

    #[test]
    fn test_i32_arithmetic_wraps_to_32_bits() {
        let add = wasm(WasmOp::I32Add, WasmImmediate::None, vec![i32c(i32::MAX), i32c(1)]);
        assert_eq!(eval(&add), Ok(Value::Int(i32::MIN as i64)));
        let div = wasm(WasmOp::I32DivU, WasmImmediate::None, vec![i32c(-2), i32c(2)]);
        assert_eq!(eval(&div), Ok(Value::Int(i32::MAX as i64)));
    }

    #[test]
    fn test_comparisons_and_select() {
        let lt_u = wasm(WasmOp::I32LtU, WasmImmediate::None, vec![i32c(-1), i32c(1)]);
        assert_eq!(eval(&lt_u), Ok(Value::Int(0)));
        let select = wasm(WasmOp::Select, WasmImmediate::None, vec![i32c(7), i32c(9), i32c(0)]);
        assert_eq!(eval(&select), Ok(Value::Int(9)));
        let eqz = wasm(WasmOp::I64Eqz, WasmImmediate::None, vec![wasm(WasmOp::I64Const, WasmImmediate::I64(0), vec![])]);
        assert_eq!(eval(&eqz), Ok(Value::Int(1)));
    }

    #[test]
    fn test_traps() {
        let unreachable = wasm(WasmOp::Unreachable, WasmImmediate::None, vec![]);
        assert!(matches!(eval(&unreachable), Err(RuntimeError::Unreachable { .. })));
        let rem = wasm(WasmOp::I64RemS, WasmImmediate::None, vec![AstNode::int(1), AstNode::int(0)]);
        assert!(matches!(eval(&rem), Err(RuntimeError::DivisionByZero { .. })));
        let load = wasm(WasmOp::I32Load, WasmImmediate::Index(0), vec![i32c(0)]);
        assert!(matches!(eval(&load), Err(RuntimeError::Unsupported { .. })));
    }

    #[test]
    fn test_locals_share_c_variables() {
        let unit = parse_source("int counter = 5; int main() { return counter; }", "wasm.c").unwrap();
        let mut interp = Interpreter::new(&unit, InterpreterConfig::default());
        interp.prepare().unwrap();
        let tee = wasm(
            WasmOp::LocalTee,
            WasmImmediate::Name("counter".to_string()),
            vec![wasm(
                WasmOp::I32Mul,
                WasmImmediate::None,
                vec![wasm(WasmOp::LocalGet, WasmImmediate::Name("counter".to_string()), vec![]), i32c(3)],
            )],
        );
        assert_eq!(interp.evaluate_expr(&tee), Ok(Value::Int(15)));
        assert_eq!(interp.run(), Ok(15));
    }
}
