//! Type inference and value conversion
//!
//! This module provides type inference for expressions, which is necessary for:
//!
//! - `sizeof(expr)`: Computing the size of an expression's result type
//! - Pointer arithmetic: Computing correct offsets based on pointed-to type
//! - Member access through `->`: Finding the record a pointer refers to
//!
//! # Type Inference Rules
//!
//! - Integer and character literals are `int`, floating literals `double`
//! - String literals are `char[len + 1]`
//! - Variables are looked up in the current stack frame, then globals
//! - Arithmetic promotes to `double` when either side is floating, to `long`
//!   when either side is `long`, and to `int` otherwise
//! - Pointer dereference yields the pointed-to type
//! - Struct member access yields the field's type
//!
//! Inference never evaluates the expression, so `sizeof(i++)` has no effect.

use crate::interpreter::builtins::builtin_return_type;
use crate::interpreter::engine::Interpreter;
use crate::interpreter::errors::RuntimeError;
use crate::memory::value::Value;
use crate::parser::ast::*;
use crate::parser::wasm::WasmOp;

impl Interpreter {
    /// Infer the (typedef-resolved) type of an expression
    pub(crate) fn infer_expr_type(&self, expr: &AstNode) -> Result<Type, RuntimeError> {
        let location = expr.location;
        match &expr.kind {
            NodeKind::IntLiteral(_) | NodeKind::CharLiteral(_) => Ok(Type::int()),

            NodeKind::FloatLiteral(_) => Ok(Type::new(BaseType::Double)),

            NodeKind::StringLiteral(s) => {
                Ok(Type::new(BaseType::Char).with_array(Some(s.len() as u32 + 1)))
            }

            NodeKind::Identifier(name) => {
                if let Some(var) = self.lookup_var(name) {
                    Ok(var.var_type)
                } else if self.constants.contains_key(name) {
                    Ok(Type::int())
                } else {
                    Err(RuntimeError::UndefinedVariable {
                        name: name.clone(),
                        location,
                    })
                }
            }

            NodeKind::Binary { op, left, right } => {
                if op.is_comparison() || matches!(op, BinOp::And | BinOp::Or) {
                    return Ok(Type::int());
                }
                let left_type = self.infer_expr_type(left)?.decayed();
                let right_type = self.infer_expr_type(right)?.decayed();
                match (op, left_type.is_pointer(), right_type.is_pointer()) {
                    (BinOp::Sub, true, true) => Ok(Type::new(BaseType::Long)),
                    (BinOp::Add | BinOp::Sub, true, _) => Ok(left_type),
                    (BinOp::Add, false, true) => Ok(right_type),
                    (BinOp::Shl | BinOp::Shr, _, _) => Ok(Self::promoted(&left_type, &left_type)),
                    _ => Ok(Self::promoted(&left_type, &right_type)),
                }
            }

            NodeKind::Unary { op, operand } => {
                let operand_type = self.infer_expr_type(operand)?;
                match op {
                    UnOp::Not => Ok(Type::int()),
                    UnOp::Deref => operand_type.decayed().element_type().ok_or_else(|| {
                        RuntimeError::type_error(
                            format!("cannot dereference a value of type '{}'", operand_type),
                            location,
                        )
                    }),
                    // `&arr` yields the address of the first element
                    UnOp::AddrOf if operand_type.is_array() => Ok(operand_type.decayed()),
                    UnOp::AddrOf => Ok(operand_type.with_pointer()),
                    UnOp::Neg | UnOp::BitNot => Ok(Self::promoted(&operand_type, &operand_type)),
                    UnOp::PreInc | UnOp::PreDec | UnOp::PostInc | UnOp::PostDec => {
                        Ok(operand_type)
                    }
                }
            }

            NodeKind::Assign { target, .. } => self.infer_expr_type(target),

            NodeKind::Ternary {
                then_expr,
                else_expr,
                ..
            } => {
                let then_type = self.infer_expr_type(then_expr)?.decayed();
                let else_type = self.infer_expr_type(else_expr)?.decayed();
                if then_type.is_pointer() || !(then_type.is_integral() || then_type.is_floating()) {
                    Ok(then_type)
                } else if else_type.is_pointer() {
                    Ok(else_type)
                } else {
                    Ok(Self::promoted(&then_type, &else_type))
                }
            }

            NodeKind::Call { callee, .. } => {
                let NodeKind::Identifier(name) = &callee.kind else {
                    return Err(RuntimeError::NotCallable { location });
                };
                if let Some(func) = self.functions.get(name) {
                    self.resolve_type(&func.return_type, location)
                } else if let Some(ret) = self.prototypes.get(name) {
                    self.resolve_type(ret, location)
                } else {
                    builtin_return_type(name).ok_or_else(|| RuntimeError::UndefinedFunction {
                        name: name.clone(),
                        location,
                    })
                }
            }

            NodeKind::Index { array, .. } => {
                let array_type = self.infer_expr_type(array)?;
                array_type.element_type().ok_or_else(|| {
                    RuntimeError::type_error(
                        format!("subscripted value of type '{}' is not an array or pointer", array_type),
                        location,
                    )
                })
            }

            NodeKind::Member { object, member } => {
                let object_type = self.infer_expr_type(object)?;
                self.field_of(&object_type, member, location).map(|(_, ty)| ty)
            }

            NodeKind::PtrMember { object, member } => {
                let pointer_type = self.infer_expr_type(object)?.decayed();
                let record = pointer_type.element_type().ok_or_else(|| {
                    RuntimeError::type_error(
                        format!("'->' applied to non-pointer type '{}'", pointer_type),
                        location,
                    )
                })?;
                self.field_of(&record, member, location).map(|(_, ty)| ty)
            }

            NodeKind::Cast { target_type, .. } => self.resolve_type(target_type, location),

            NodeKind::SizeofType(_) | NodeKind::SizeofExpr(_) => {
                Ok(Type::new(BaseType::Long).with_unsigned())
            }

            NodeKind::Wasm(instr) => Ok(match instr.op {
                WasmOp::I64Const | WasmOp::I64Add | WasmOp::I64Sub | WasmOp::I64Mul => {
                    Type::new(BaseType::Long)
                }
                WasmOp::F32Const => Type::new(BaseType::Float),
                WasmOp::F64Const => Type::new(BaseType::Double),
                _ => Type::int(),
            }),

            other => Err(RuntimeError::type_error(
                format!("{} has no value", other.name()),
                location,
            )),
        }
    }

    /// Usual arithmetic conversions, collapsed to int/long/double
    fn promoted(left: &Type, right: &Type) -> Type {
        if left.is_floating() || right.is_floating() {
            Type::new(BaseType::Double)
        } else if left.base == BaseType::Long || right.base == BaseType::Long {
            Type::new(BaseType::Long)
        } else {
            Type::int()
        }
    }

    /// Convert a value for storage in (or a cast to) `ty`
    pub(crate) fn convert_to_type(
        &self,
        value: Value,
        ty: &Type,
        location: SourceLocation,
    ) -> Result<Value, RuntimeError> {
        let resolved = self.resolve_type(ty, location)?;
        if value.is_float() && resolved.pointer_depth > 0 {
            return Err(RuntimeError::type_error(
                format!("cannot convert a floating value to '{}'", resolved),
                location,
            ));
        }
        Ok(Self::coerce(value, &resolved))
    }

    /// Apply C conversion rules for a resolved scalar type. Integers are 64-bit;
    /// `char` and `short` truncate, `_Bool` normalizes to 0/1.
    pub(crate) fn coerce(value: Value, ty: &Type) -> Value {
        if !value.is_initialized() || ty.is_array() {
            return value;
        }
        if ty.pointer_depth > 0 {
            return value.as_pointer().map_or(value, Value::Pointer);
        }
        let int = match value {
            Value::Float(x) => x as i64,
            other => other.as_int().unwrap_or(0),
        };
        match &ty.base {
            BaseType::Float => Value::Float(value.as_float().unwrap_or(int as f64) as f32 as f64),
            BaseType::Double => Value::Float(value.as_float().unwrap_or(int as f64)),
            BaseType::Bool => Value::Int((value.truthy() == Some(true)) as i64),
            BaseType::Char if ty.is_unsigned => Value::Int(int as u8 as i64),
            BaseType::Char => Value::Int(int as i8 as i64),
            BaseType::Short if ty.is_unsigned => Value::Int(int as u16 as i64),
            BaseType::Short => Value::Int(int as i16 as i64),
            BaseType::Int | BaseType::Long | BaseType::Enum(_) => Value::Int(int),
            BaseType::Void => Value::Int(0),
            // Records travel as the address of their first cell
            BaseType::Struct(_) | BaseType::Union(_) | BaseType::Named(_) => value,
        }
    }

    /// Convert a value to a boolean (for conditionals)
    #[inline]
    pub(crate) fn value_to_bool(val: &Value, location: SourceLocation) -> Result<bool, RuntimeError> {
        val.truthy().ok_or_else(|| RuntimeError::UninitializedRead {
            name: "value in condition".to_string(),
            location,
        })
    }
}
