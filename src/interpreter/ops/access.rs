//! Subscript and member access
//!
//! `a[i]` scales the index by the element's cell count; `s.f` and `p->f` add
//! the field's cell offset to the record's address. Both produce a [`Place`],
//! so the same code serves reads, writes and `&`.

use crate::interpreter::engine::Interpreter;
use crate::interpreter::errors::RuntimeError;
use crate::interpreter::memory_ops::Place;
use crate::memory::value::{Address, Value};
use crate::parser::ast::*;

impl Interpreter {
    pub(crate) fn index_place(
        &mut self,
        array: &AstNode,
        index: &AstNode,
        location: SourceLocation,
    ) -> Result<Place, RuntimeError> {
        let array_type = self.infer_expr_type(array)?;
        let ty = array_type.element_type().ok_or_else(|| {
            RuntimeError::type_error(
                format!("subscripted value of type '{}' is not an array or pointer", array_type),
                location,
            )
        })?;
        let base = self.evaluate_expr(array)?;
        let base = self.pointer_value(base, location)?;
        let index_val = self.evaluate_expr(index)?;
        let offset = match index_val {
            Value::Int(n) => n,
            other => {
                return Err(RuntimeError::type_error(
                    format!("array subscript is not an integer ({})", other.kind_name()),
                    index.location,
                ))
            }
        };
        let stride = self.cell_count(&ty, location)?.max(1) as i64;
        let address = (base as i64)
            .checked_add(offset.wrapping_mul(stride))
            .filter(|a| *a > 0)
            .ok_or(RuntimeError::InvalidPointer {
                address: base,
                message: format!("index {} leaves the address space", offset),
                location,
            })? as Address;

        let label = match &array.kind {
            NodeKind::Identifier(name) => format!("'{}[{}]'", name, offset),
            _ => format!("array element at 0x{:x}", address),
        };
        Ok(Place { address, ty, label })
    }

    pub(crate) fn member_place(
        &mut self,
        object: &AstNode,
        member: &str,
        through_pointer: bool,
        location: SourceLocation,
    ) -> Result<Place, RuntimeError> {
        let (base, record) = if through_pointer {
            let pointer_type = self.infer_expr_type(object)?.decayed();
            let record = pointer_type.element_type().ok_or_else(|| {
                RuntimeError::type_error(
                    format!("'->' applied to non-pointer type '{}'", pointer_type),
                    location,
                )
            })?;
            let value = self.evaluate_expr(object)?;
            (self.pointer_value(value, location)?, record)
        } else {
            let place = self.place_of(object)?;
            (place.address, place.ty)
        };

        let (offset, mut ty) = self.field_of(&record, member, location)?;
        ty.is_const |= record.is_const;
        Ok(Place {
            address: base + offset as Address,
            ty,
            label: format!("member '{}'", member),
        })
    }

    pub(crate) fn field_of(
        &self,
        record: &Type,
        member: &str,
        location: SourceLocation,
    ) -> Result<(usize, Type), RuntimeError> {
        self.types
            .field(record, member)
            .map_err(|e| RuntimeError::from_layout(e, location))
    }
}

#[cfg(test)]
mod tests {
    use crate::interpreter::{Interpreter, InterpreterConfig, RuntimeError};
    use crate::parser::parse_source;

    fn run(source: &str) -> Result<i64, RuntimeError> {
        let unit = parse_source(source, "access.c").unwrap();
        Interpreter::new(&unit, InterpreterConfig::default()).run()
    }

    #[test]
    fn test_linked_list_on_heap() {
        let source = "
            typedef struct Node { int value; struct Node *next; } Node;
            Node *push(Node *head, int value) {
                Node *n = (Node *)malloc(sizeof(Node));
                n->value = value;
                n->next = head;
                return n;
            }
            int main() {
                Node *list = NULL;
                for (int i = 1; i <= 4; i++) list = push(list, i);
                int sum = 0;
                while (list) { Node *next = list->next; sum = sum * 10 + list->value; free(list); list = next; }
                return sum;
            }";
        assert_eq!(run(source), Ok(4321));
    }

    #[test]
    fn test_array_of_structs() {
        let source = "
            struct P { int x; int y[2]; };
            int main() {
                struct P ps[3];
                for (int i = 0; i < 3; i++) { ps[i].x = i; ps[i].y[0] = i * 10; ps[i].y[1] = i * 100; }
                return ps[2].x + ps[1].y[1] + (&ps[2])->y[0];
            }";
        assert_eq!(run(source), Ok(122));
    }

    #[test]
    fn test_unknown_member() {
        let err = run("struct S { int a; }; int main() { struct S s; s.a = 1; return s.b; }").unwrap_err();
        assert!(matches!(err, RuntimeError::UnknownField { ref field, .. } if field == "b"));
    }

    #[test]
    fn test_heap_overrun_is_detected() {
        let err = run("int main() { int *p = malloc(2); p[2] = 1; return 0; }").unwrap_err();
        assert!(matches!(err, RuntimeError::InvalidPointer { .. }));
    }
}
