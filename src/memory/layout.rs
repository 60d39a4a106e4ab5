//! Type layout: record and typedef tables, sizes and field offsets
//!
//! Two size measures exist side by side:
//! - **cells**: how much interpreter memory an object occupies. Every scalar
//!   is one cell; arrays multiply, structs sum their fields, unions take
//!   their largest field. Pointer arithmetic is scaled in cells.
//! - **bytes**: what `sizeof` reports, using fixed platform-independent sizes
//!   (`char` 1, `short` 2, `int`/`float`/`enum` 4, `long`/`double`/pointers 8;
//!   no padding).

use crate::parser::ast::{BaseType, Field, Type};
use rustc_hash::FxHashMap;
use thiserror::Error;

/// Typedef chains and record nesting deeper than this are rejected
const MAX_TYPE_NESTING: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LayoutError {
    #[error("unknown type '{name}'")]
    UnknownType { name: String },

    #[error("incomplete type '{ty}'")]
    IncompleteType { ty: String },

    #[error("type '{ty}' nests too deeply or contains itself")]
    TooDeep { ty: String },

    #[error("'{record}' has no member named '{field}'")]
    UnknownField { record: String, field: String },

    #[error("'{ty}' is not a struct or union")]
    NotARecord { ty: String },

    #[error("pointer to array typedef '{name}' is not supported")]
    PointerToArray { name: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct RecordDef {
    pub fields: Vec<Field>,
    pub is_union: bool,
}

/// Struct, union and typedef definitions visible to a program
#[derive(Debug, Clone, Default)]
pub struct TypeTable {
    structs: FxHashMap<String, RecordDef>,
    unions: FxHashMap<String, RecordDef>,
    typedefs: FxHashMap<String, Type>,
}

impl TypeTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn define_struct(&mut self, name: &str, fields: Vec<Field>) {
        self.structs.insert(
            name.to_string(),
            RecordDef {
                fields,
                is_union: false,
            },
        );
    }

    pub fn define_union(&mut self, name: &str, fields: Vec<Field>) {
        self.unions.insert(
            name.to_string(),
            RecordDef {
                fields,
                is_union: true,
            },
        );
    }

    pub fn define_typedef(&mut self, name: &str, target: Type) {
        self.typedefs.insert(name.to_string(), target);
    }

    /// Look up the record a (resolved) struct or union type refers to
    pub fn record(&self, ty: &Type) -> Result<&RecordDef, LayoutError> {
        let (map, name) = match &ty.base {
            BaseType::Struct(name) => (&self.structs, name),
            BaseType::Union(name) => (&self.unions, name),
            _ => return Err(LayoutError::NotARecord { ty: ty.to_string() }),
        };
        map.get(name).ok_or_else(|| LayoutError::IncompleteType {
            ty: ty.to_string(),
        })
    }

    /// Replace typedef names by their definitions
    pub fn resolve(&self, ty: &Type) -> Result<Type, LayoutError> {
        self.resolve_nested(ty, 0)
    }

    fn resolve_nested(&self, ty: &Type, depth: usize) -> Result<Type, LayoutError> {
        let BaseType::Named(name) = &ty.base else {
            return Ok(ty.clone());
        };
        if depth >= MAX_TYPE_NESTING {
            return Err(LayoutError::TooDeep { ty: name.clone() });
        }
        let target = self
            .typedefs
            .get(name)
            .ok_or_else(|| LayoutError::UnknownType { name: name.clone() })?;
        let target = self.resolve_nested(target, depth + 1)?;

        if ty.pointer_depth > 0 && target.is_array() {
            return Err(LayoutError::PointerToArray { name: name.clone() });
        }
        let mut resolved = target;
        resolved.is_const |= ty.is_const;
        resolved.is_unsigned |= ty.is_unsigned;
        resolved.pointer_depth += ty.pointer_depth;
        // Dimensions of the declarator are outermost
        let mut dims = ty.array_dims.clone();
        dims.extend(resolved.array_dims);
        resolved.array_dims = dims;
        Ok(resolved)
    }

    /// Cells occupied by an object of type `ty`
    pub fn cell_count(&self, ty: &Type) -> Result<usize, LayoutError> {
        self.measure(ty, 0, 1, |_| 1)
    }

    /// `sizeof` in bytes
    pub fn byte_size(&self, ty: &Type) -> Result<usize, LayoutError> {
        self.measure(ty, 0, 8, scalar_bytes)
    }

    fn measure(
        &self,
        ty: &Type,
        depth: usize,
        pointer_size: usize,
        scalar: fn(&BaseType) -> usize,
    ) -> Result<usize, LayoutError> {
        if depth >= MAX_TYPE_NESTING {
            return Err(LayoutError::TooDeep { ty: ty.to_string() });
        }
        let ty = self.resolve(ty)?;

        let element = if ty.pointer_depth > 0 {
            pointer_size
        } else {
            match &ty.base {
                BaseType::Struct(_) | BaseType::Union(_) => {
                    let record = self.record(&ty)?;
                    let sizes = record
                        .fields
                        .iter()
                        .map(|f| self.measure(&f.field_type, depth + 1, pointer_size, scalar))
                        .collect::<Result<Vec<_>, _>>()?;
                    if record.is_union {
                        sizes.into_iter().max().unwrap_or(0)
                    } else {
                        sizes.into_iter().sum()
                    }
                }
                base => scalar(base),
            }
        };

        ty.array_dims.iter().try_fold(element, |size, dim| match dim {
            Some(n) => Ok(size * *n as usize),
            None => Err(LayoutError::IncompleteType { ty: ty.to_string() }),
        })
    }

    /// Cell offset and type of `field` inside the record type `ty`
    pub fn field(&self, ty: &Type, field: &str) -> Result<(usize, Type), LayoutError> {
        let ty = self.resolve(ty)?;
        let record = self.record(&ty)?;
        let mut offset = 0;
        for f in &record.fields {
            if f.name == field {
                return Ok((offset, self.resolve(&f.field_type)?));
            }
            if !record.is_union {
                offset += self.cell_count(&f.field_type)?;
            }
        }
        Err(LayoutError::UnknownField {
            record: ty.to_string(),
            field: field.to_string(),
        })
    }

    /// Cells one step of pointer arithmetic moves on a pointer of type `ptr`
    pub fn pointee_stride(&self, ptr: &Type) -> Result<usize, LayoutError> {
        let ptr = self.resolve(ptr)?;
        match ptr.element_type() {
            Some(elem) => Ok(self.cell_count(&elem)?.max(1)),
            None => Ok(1),
        }
    }

    /// Whether values of `ty` live in memory as a block of cells rather than as one value
    pub fn is_aggregate(&self, ty: &Type) -> Result<bool, LayoutError> {
        let ty = self.resolve(ty)?;
        Ok(ty.is_array()
            || (ty.pointer_depth == 0 && matches!(ty.base, BaseType::Struct(_) | BaseType::Union(_))))
    }
}

fn scalar_bytes(base: &BaseType) -> usize {
    match base {
        BaseType::Void | BaseType::Bool | BaseType::Char => 1,
        BaseType::Short => 2,
        BaseType::Int | BaseType::Float | BaseType::Enum(_) => 4,
        BaseType::Long | BaseType::Double => 8,
        // Records are measured field by field and names are resolved first
        BaseType::Struct(_) | BaseType::Union(_) | BaseType::Named(_) => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn field(name: &str, ty: Type) -> Field {
        Field {
            name: name.into(),
            field_type: ty,
        }
    }

    fn table() -> TypeTable {
        let mut t = TypeTable::new();
        t.define_struct(
            "Point",
            vec![field("x", Type::int()), field("y", Type::new(BaseType::Char))],
        );
        t.define_struct(
            "Line",
            vec![
                field("a", Type::new(BaseType::Struct("Point".into()))),
                field("tag", Type::new(BaseType::Char).with_array(Some(3))),
                field("next", Type::new(BaseType::Struct("Line".into())).with_pointer()),
            ],
        );
        t.define_union(
            "U",
            vec![field("i", Type::new(BaseType::Long)), field("p", Type::new(BaseType::Struct("Point".into())))],
        );
        t.define_typedef("Vec3", Type::new(BaseType::Double).with_array(Some(3)));
        t.define_typedef("Alias", Type::new(BaseType::Named("Vec3".into())));
        t
    }

    #[test]
    fn test_cell_counts() {
        let t = table();
        assert_eq!(t.cell_count(&Type::int()).unwrap(), 1);
        assert_eq!(t.cell_count(&Type::new(BaseType::Struct("Line".into()))).unwrap(), 2 + 3 + 1);
        assert_eq!(t.cell_count(&Type::new(BaseType::Union("U".into()))).unwrap(), 2);
        assert_eq!(t.cell_count(&Type::int().with_array(Some(2)).with_array(Some(5))).unwrap(), 10);
    }

    #[test]
    fn test_byte_sizes() {
        let t = table();
        assert_eq!(t.byte_size(&Type::new(BaseType::Char)).unwrap(), 1);
        assert_eq!(t.byte_size(&Type::new(BaseType::Struct("Point".into()))).unwrap(), 5);
        assert_eq!(t.byte_size(&Type::new(BaseType::Union("U".into()))).unwrap(), 8);
        assert_eq!(t.byte_size(&Type::new(BaseType::Named("Alias".into()))).unwrap(), 24);
        assert_eq!(t.byte_size(&Type::new(BaseType::Char).with_pointer()).unwrap(), 8);
    }

    #[test]
    fn test_field_offsets() {
        let t = table();
        let line = Type::new(BaseType::Struct("Line".into()));
        assert_eq!(t.field(&line, "tag").unwrap().0, 2);
        assert_eq!(t.field(&line, "next").unwrap().0, 5);
        let u = Type::new(BaseType::Union("U".into()));
        assert_eq!(t.field(&u, "p").unwrap().0, 0);
        assert!(matches!(t.field(&line, "nope"), Err(LayoutError::UnknownField { .. })));
    }

    #[test]
    fn test_typedef_resolution_composes_declarators() {
        let t = table();
        let ty = Type::new(BaseType::Named("Alias".into())).with_array(Some(2));
        let resolved = t.resolve(&ty).unwrap();
        assert_eq!(resolved.base, BaseType::Double);
        assert_eq!(resolved.array_dims, vec![Some(2), Some(3)]);
        assert!(matches!(
            t.resolve(&Type::new(BaseType::Named("Missing".into()))),
            Err(LayoutError::UnknownType { .. })
        ));
    }

    #[test]
    fn test_self_containing_struct_is_rejected() {
        let mut t = TypeTable::new();
        t.define_struct("Bad", vec![field("inner", Type::new(BaseType::Struct("Bad".into())))]);
        assert!(matches!(
            t.cell_count(&Type::new(BaseType::Struct("Bad".into()))),
            Err(LayoutError::TooDeep { .. })
        ));
    }
}
