//! Memory operations: lvalues, loads, stores and strings
//!
//! This module provides memory-related operations for the interpreter:
//!
//! - Lvalue resolution: turning `x`, `*p`, `a[i]`, `s.f` and `p->f` into a
//!   [`Place`] (cell address plus declared type)
//! - Loads with the declared type's conversion and uninitialized-read detection
//! - Stores with const checking, truncation and struct copies
//! - String literal interning and C string reading
//!
//! # Memory Layout
//!
//! - Scalars: one cell each
//! - Arrays: elements stored contiguously, row-major
//! - Structs: fields laid out sequentially without padding; unions overlap
//! - Aggregates are never loaded as a whole; reading one yields the address
//!   of its first cell, which is also how arrays decay to pointers

use crate::interpreter::engine::Interpreter;
use crate::interpreter::errors::RuntimeError;
use crate::memory::value::{Address, Value};
use crate::parser::ast::*;

/// A resolved lvalue
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Place {
    pub address: Address,
    pub ty: Type,
    /// How the object is named in diagnostics
    pub label: String,
}

impl Interpreter {
    /// Resolve an lvalue expression to the memory it designates
    pub(crate) fn place_of(&mut self, expr: &AstNode) -> Result<Place, RuntimeError> {
        let location = expr.location;
        match &expr.kind {
            NodeKind::Identifier(name) => {
                if let Some(var) = self.lookup_var(name) {
                    return Ok(Place {
                        address: var.address,
                        ty: var.var_type,
                        label: format!("variable '{}'", name),
                    });
                }
                if self.constants.contains_key(name) {
                    Err(RuntimeError::type_error(
                        format!("enumerator '{}' is not an lvalue", name),
                        location,
                    ))
                } else {
                    Err(RuntimeError::UndefinedVariable {
                        name: name.clone(),
                        location,
                    })
                }
            }
            NodeKind::Unary {
                op: UnOp::Deref,
                operand,
            } => self.deref_place(operand, location),
            NodeKind::Index { array, index } => self.index_place(array, index, location),
            NodeKind::Member { object, member } => {
                self.member_place(object, member, false, location)
            }
            NodeKind::PtrMember { object, member } => {
                self.member_place(object, member, true, location)
            }
            NodeKind::StringLiteral(s) => {
                let address = self.intern_string(s, location)?;
                Ok(Place {
                    address,
                    ty: Type::new(BaseType::Char).with_array(Some(s.len() as u32 + 1)),
                    label: "string literal".to_string(),
                })
            }
            other => Err(RuntimeError::type_error(
                format!("{} is not an lvalue", other.name()),
                location,
            )),
        }
    }

    /// The object `*operand` designates
    pub(crate) fn deref_place(&mut self, operand: &AstNode, location: SourceLocation) -> Result<Place, RuntimeError> {
        let pointer_type = self.infer_expr_type(operand)?.decayed();
        let ty = pointer_type.element_type().ok_or_else(|| {
            RuntimeError::type_error(
                format!("cannot dereference a value of type '{}'", pointer_type),
                location,
            )
        })?;
        let value = self.evaluate_expr(operand)?;
        let address = self.pointer_value(value, location)?;
        Ok(Place {
            address,
            ty,
            label: format!("memory at 0x{:x}", address),
        })
    }

    /// Address held by a pointer value; null faults
    pub(crate) fn pointer_value(&self, value: Value, location: SourceLocation) -> Result<Address, RuntimeError> {
        match value {
            Value::Pointer(0) | Value::Int(0) => Err(RuntimeError::NullDereference { location }),
            Value::Pointer(addr) => Ok(addr),
            Value::Int(n) => Ok(n as Address),
            other => Err(RuntimeError::type_error(
                format!("expected a pointer, got {}", other.kind_name()),
                location,
            )),
        }
    }

    /// Read the value stored at a place, converted to its declared type
    pub(crate) fn load(&self, place: &Place, location: SourceLocation) -> Result<Value, RuntimeError> {
        if self.is_aggregate(&place.ty, location)? {
            return Ok(Value::Pointer(place.address));
        }
        let raw = self
            .memory
            .read(place.address)
            .map_err(|e| RuntimeError::from_memory(e, location))?;
        if !raw.is_initialized() {
            return Err(RuntimeError::UninitializedRead {
                name: place.label.clone(),
                location,
            });
        }
        Ok(Self::coerce(raw, &place.ty))
    }

    /// Assign to a place; returns the value actually stored
    pub(crate) fn store(&mut self, place: &Place, value: Value, location: SourceLocation) -> Result<Value, RuntimeError> {
        if place.ty.is_const && place.ty.pointer_depth == 0 {
            return Err(RuntimeError::ConstModification {
                name: place.label.clone(),
                location,
            });
        }
        self.write_value(place.address, &place.ty, value, location)
    }

    /// Write without the const check (declarations, parameters)
    fn write_value(
        &mut self,
        address: Address,
        ty: &Type,
        value: Value,
        location: SourceLocation,
    ) -> Result<Value, RuntimeError> {
        if ty.is_array() {
            return Err(RuntimeError::type_error(
                format!("array type '{}' is not assignable", ty),
                location,
            ));
        }
        if self.is_aggregate(ty, location)? {
            // Struct and union assignment copies every cell
            let source = self.pointer_value(value, location)?;
            let count = self.cell_count(ty, location)?;
            self.memory
                .copy(address, source, count)
                .map_err(|e| RuntimeError::from_memory(e, location))?;
            return Ok(value);
        }
        let converted = self.convert_to_type(value, ty, location)?;
        self.memory
            .write(address, converted)
            .map_err(|e| RuntimeError::from_memory(e, location))?;
        Ok(converted)
    }

    /// Initialize a freshly declared object from its initializer expression
    pub(crate) fn initialize(
        &mut self,
        address: Address,
        ty: &Type,
        init: &AstNode,
        location: SourceLocation,
    ) -> Result<(), RuntimeError> {
        if !ty.is_array() {
            let value = self.evaluate_expr(init)?;
            return self.initialize_value(address, ty, value, location);
        }

        let is_char_array = ty.array_dims.len() == 1
            && ty.pointer_depth == 0
            && ty.base == BaseType::Char;
        match (&init.kind, ty.array_dims[0]) {
            (NodeKind::StringLiteral(s), Some(len)) if is_char_array => {
                // Copy the bytes and pad with NULs; a literal that fills the array exactly drops its NUL
                let bytes = s.as_bytes();
                for i in 0..len as usize {
                    let byte = bytes.get(i).copied().unwrap_or(0);
                    self.memory
                        .write(address + i as Address, Value::Int(byte as i8 as i64))
                        .map_err(|e| RuntimeError::from_memory(e, location))?;
                }
                Ok(())
            }
            _ => Err(RuntimeError::type_error(
                format!("cannot initialize array of type '{}' from {}", ty, init.kind.name()),
                location,
            )),
        }
    }

    pub(crate) fn initialize_value(
        &mut self,
        address: Address,
        ty: &Type,
        value: Value,
        location: SourceLocation,
    ) -> Result<(), RuntimeError> {
        self.write_value(address, ty, value, location).map(|_| ())
    }

    /// Address of the interned, NUL-terminated copy of a string literal
    pub(crate) fn intern_string(&mut self, s: &str, location: SourceLocation) -> Result<Address, RuntimeError> {
        if let Some(&address) = self.strings.get(s) {
            return Ok(address);
        }
        let bytes = s.as_bytes();
        let address = self
            .memory
            .heap
            .allocate(bytes.len() + 1, Value::Int(0))
            .map_err(|e| RuntimeError::from_memory(e, location))?;
        for (i, &byte) in bytes.iter().enumerate() {
            self.memory
                .write(address + i as Address, Value::Int(byte as i8 as i64))
                .map_err(|e| RuntimeError::from_memory(e, location))?;
        }
        self.strings.insert(s.to_string(), address);
        Ok(address)
    }

    /// Read a NUL-terminated string of char cells
    pub(crate) fn read_c_string(&self, address: Address, location: SourceLocation) -> Result<String, RuntimeError> {
        let mut bytes = Vec::new();
        let mut cursor = address;
        loop {
            let cell = self
                .memory
                .read(cursor)
                .map_err(|e| RuntimeError::from_memory(e, location))?;
            match cell {
                Value::Int(0) => break,
                Value::Int(n) => bytes.push(n as u8),
                Value::Uninitialized => {
                    return Err(RuntimeError::UninitializedRead {
                        name: format!("string byte at 0x{:x}", cursor),
                        location,
                    })
                }
                other => {
                    return Err(RuntimeError::type_error(
                        format!("string contains a {} cell", other.kind_name()),
                        location,
                    ))
                }
            }
            cursor += 1;
        }
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }
}

#[cfg(test)]
mod tests {
    use crate::interpreter::{Interpreter, InterpreterConfig, RuntimeError};
    use crate::parser::parse_source;

    fn run(source: &str) -> Result<i64, RuntimeError> {
        let unit = parse_source(source, "memory.c").unwrap();
        Interpreter::new(&unit, InterpreterConfig::default()).run()
    }

    #[test]
    fn test_pointer_write_through() {
        assert_eq!(run("int main() { int x = 1; int *p = &x; *p = 42; return x; }"), Ok(42));
    }

    #[test]
    fn test_struct_fields_and_copy() {
        let source = "
            struct Point { int x; int y; };
            int main() {
                struct Point a; a.x = 3; a.y = 4;
                struct Point b = a;
                b.x = 10;
                struct Point *p = &b;
                return a.x + p->x + p->y;
            }";
        assert_eq!(run(source), Ok(17));
    }

    #[test]
    fn test_char_array_from_string() {
        let source = "int main() { char s[] = \"hey\"; return sizeof(s) * 100 + s[1] - 'e' + s[3]; }";
        assert_eq!(run(source), Ok(400));
    }

    #[test]
    fn test_const_assignment_is_rejected() {
        let err = run("int main() { const int k = 1; k = 2; return k; }").unwrap_err();
        assert!(matches!(err, RuntimeError::ConstModification { ref name, .. } if name == "variable 'k'"));
    }

    #[test]
    fn test_null_dereference() {
        let err = run("int main() { int *p = 0; return *p; }").unwrap_err();
        assert!(matches!(err, RuntimeError::NullDereference { .. }));
    }

    #[test]
    fn test_two_dimensional_array() {
        let source = "int main() { int m[2][3]; for (int i = 0; i < 2; i++) for (int j = 0; j < 3; j++) m[i][j] = i * 3 + j; return m[1][2]; }";
        assert_eq!(run(source), Ok(5));
    }

    #[test]
    fn test_union_members_overlap() {
        let source = "union U { int i; char c; }; int main() { union U u; u.i = 65; return u.c; }";
        assert_eq!(run(source), Ok(65));
    }
}
