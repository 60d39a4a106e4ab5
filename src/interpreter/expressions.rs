//! Expression evaluation implementation
//!
//! This module handles evaluation of all C expression types, including:
//!
//! - Literals (integers, floats, characters, strings)
//! - Variables, enumerators and identifiers
//! - Function calls (user functions first, then built-ins)
//! - Conditional expressions, casts and the sizeof operator
//!
//! Operators live in `ops/` (binary, unary, assignment, subscript and member
//! access) and WASM-form instructions in `wasm.rs`.
//!
//! # Semantics
//!
//! Integer arithmetic is 64-bit and wraps on overflow. Reading an aggregate
//! (array, struct, union) yields the address of its first cell.

use crate::interpreter::engine::Interpreter;
use crate::interpreter::errors::RuntimeError;
use crate::memory::value::Value;
use crate::parser::ast::*;

impl Interpreter {
    /// Evaluate an expression and return its value
    pub(crate) fn evaluate_expr(&mut self, expr: &AstNode) -> Result<Value, RuntimeError> {
        let location = expr.location;

        match &expr.kind {
            NodeKind::IntLiteral(n) => Ok(Value::Int(*n)),

            NodeKind::FloatLiteral(x) => Ok(Value::Float(*x)),

            NodeKind::CharLiteral(c) => Ok(Value::Int(*c as i8 as i64)),

            NodeKind::StringLiteral(s) => self.intern_string(s, location).map(Value::Pointer),

            NodeKind::Identifier(name) => self.evaluate_identifier(name, location),

            NodeKind::Binary { op, left, right } => {
                self.evaluate_binary_op(*op, left, right, location)
            }

            NodeKind::Unary { op, operand } => self.evaluate_unary_op(*op, operand, location),

            NodeKind::Assign { op, target, value } => {
                self.evaluate_assignment(*op, target, value, location)
            }

            NodeKind::Ternary {
                condition,
                then_expr,
                else_expr,
            } => {
                let cond = self.evaluate_expr(condition)?;
                if Self::value_to_bool(&cond, condition.location)? {
                    self.evaluate_expr(then_expr)
                } else {
                    self.evaluate_expr(else_expr)
                }
            }

            NodeKind::Call { callee, args } => self.evaluate_call(callee, args, location),

            NodeKind::Index { array, index } => {
                let place = self.index_place(array, index, location)?;
                self.load(&place, location)
            }

            NodeKind::Member { object, member } => {
                let place = self.member_place(object, member, false, location)?;
                self.load(&place, location)
            }

            NodeKind::PtrMember { object, member } => {
                let place = self.member_place(object, member, true, location)?;
                self.load(&place, location)
            }

            NodeKind::Cast { target_type, expr } => {
                let value = self.evaluate_expr(expr)?;
                let target = self.resolve_type(target_type, location)?;
                if target.base == BaseType::Void && target.pointer_depth == 0 {
                    return Ok(Value::Int(0));
                }
                if self.is_aggregate(&target, location)? {
                    return Err(RuntimeError::type_error(
                        format!("cannot cast to '{}'", target),
                        location,
                    ));
                }
                self.convert_to_type(value, &target, location)
            }

            NodeKind::SizeofType(ty) => {
                let resolved = self.resolve_type(ty, location)?;
                self.sizeof(&resolved, location)
            }

            NodeKind::SizeofExpr(inner) => {
                let ty = self.infer_expr_type(inner)?;
                self.sizeof(&ty, location)
            }

            NodeKind::Wasm(instr) => self.evaluate_wasm(instr, location),

            other => Err(RuntimeError::unsupported(
                format!("{} in expression position", other.name()),
                location,
            )),
        }
    }

    fn evaluate_identifier(&mut self, name: &str, location: SourceLocation) -> Result<Value, RuntimeError> {
        if let Some(var) = self.lookup_var(name) {
            let place = crate::interpreter::memory_ops::Place {
                address: var.address,
                ty: var.var_type,
                label: format!("variable '{}'", name),
            };
            return self.load(&place, location);
        }
        if let Some(&value) = self.constants.get(name) {
            return Ok(Value::Int(value));
        }
        if self.functions.contains_key(name) || self.prototypes.contains_key(name) {
            return Err(RuntimeError::unsupported(
                format!("function '{}' used as a value", name),
                location,
            ));
        }
        Err(RuntimeError::UndefinedVariable {
            name: name.to_string(),
            location,
        })
    }

    fn sizeof(&self, ty: &Type, location: SourceLocation) -> Result<Value, RuntimeError> {
        self.types
            .byte_size(ty)
            .map(|size| Value::Int(size as i64))
            .map_err(|e| RuntimeError::from_layout(e, location))
    }

    /// Evaluate a call: arguments left to right, then the user function or built-in
    fn evaluate_call(
        &mut self,
        callee: &AstNode,
        args: &[AstNode],
        location: SourceLocation,
    ) -> Result<Value, RuntimeError> {
        let NodeKind::Identifier(name) = &callee.kind else {
            return Err(RuntimeError::NotCallable { location });
        };
        if self.lookup_var(name).is_some() {
            return Err(RuntimeError::NotCallable { location });
        }

        let mut arg_values = Vec::with_capacity(args.len());
        for arg in args {
            arg_values.push(self.evaluate_expr(arg)?);
        }

        if let Some(func) = self.functions.get(name).cloned() {
            return self.call_user_function(&func, arg_values, location);
        }
        if let Some(result) = self.call_builtin(name, &arg_values, location) {
            return result;
        }
        Err(RuntimeError::UndefinedFunction {
            name: name.clone(),
            location,
        })
    }
}

#[cfg(test)]
mod tests {
    use crate::interpreter::{Interpreter, InterpreterConfig, RuntimeError};
    use crate::memory::value::Value;
    use crate::parser::parse_source;

    fn interpreter(source: &str) -> Interpreter {
        let unit = parse_source(source, "expr.c").unwrap();
        Interpreter::new(&unit, InterpreterConfig::default())
    }

    fn run(source: &str) -> Result<i64, RuntimeError> {
        interpreter(source).run()
    }

    #[test]
    fn test_precedence() {
        assert_eq!(run("int main() { return 1 + 2 * 3; }"), Ok(7));
    }

    #[test]
    fn test_recursion() {
        let source = "int fact(int n) { if (n <= 1) return 1; return n * fact(n - 1); } int main() { return fact(5); }";
        assert_eq!(run(source), Ok(120));
    }

    #[test]
    fn test_prototype_resolves_to_later_definition() {
        let source = "int twice(int x); int main() { return twice(21); } int twice(int x) { return x * 2; }";
        assert_eq!(run(source), Ok(42));
    }

    #[test]
    fn test_call_errors() {
        let err = run("int f(int a) { return a; } int main() { return f(1, 2); }").unwrap_err();
        assert!(matches!(err, RuntimeError::ArgumentCountMismatch { expected: 1, got: 2, .. }));

        let err = run("int main() { return nothing(); }").unwrap_err();
        assert!(matches!(err, RuntimeError::UndefinedFunction { ref name, .. } if name == "nothing"));

        let err = run("int main() { int f = 1; return f(); }").unwrap_err();
        assert!(matches!(err, RuntimeError::NotCallable { .. }));
    }

    #[test]
    fn test_call_depth_limit() {
        let unit = parse_source("int down(int n) { return down(n + 1); } int main() { return down(0); }", "deep.c").unwrap();
        let config = InterpreterConfig {
            max_call_depth: 64,
            ..InterpreterConfig::default()
        };
        let err = Interpreter::new(&unit, config).run().unwrap_err();
        assert!(matches!(err, RuntimeError::StackOverflow { depth: 64, .. }));
    }

    #[test]
    fn test_sizeof_does_not_evaluate() {
        let source = "int main() { int i = 0; long n = sizeof(i++); return n * 10 + i; }";
        assert_eq!(run(source), Ok(40));
    }

    #[test]
    fn test_globals_and_casts() {
        let source = "int counter; double half = 0.5; int bump() { counter += 1; return counter; } int main() { bump(); bump(); return counter + (int)(half * 8); }";
        assert_eq!(run(source), Ok(6));
    }

    #[test]
    fn test_call_function_with_arguments() {
        let mut interp = interpreter("int add(int a, int b) { return a + b; }");
        let result = interp.call_function("add", vec![Value::Int(40), Value::Int(2)]);
        assert_eq!(result, Ok(Value::Int(42)));
    }

    #[test]
    fn test_missing_entry_point() {
        let err = run("int helper() { return 1; }").unwrap_err();
        assert_eq!(err, RuntimeError::NoEntryPoint { name: "main".into() });
    }
}
