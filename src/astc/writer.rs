//! ASTC encoder
//!
//! Pre-order: every node is written as `u16 tag, u32 line, u32 column`
//! followed by its payload. All integers are little-endian.

use super::errors::{SerializationError, MAX_DEPTH};
use super::tags::*;
use crate::parser::ast::*;
use crate::parser::wasm::WasmImmediate;
use crate::stage;

/// Streaming node encoder over an owned byte buffer
#[derive(Debug, Default)]
pub struct AstWriter {
    buf: Vec<u8>,
    depth: usize,
    /// Payload offset of every function definition written so far
    functions: Vec<(String, u32)>,
}

impl AstWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Offset of the named function definition, if one was written
    pub fn function_offset(&self, name: &str) -> Option<u32> {
        self.functions
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, offset)| *offset)
    }

    fn u8(&mut self, v: u8) {
        self.buf.push(v);
    }

    fn u16(&mut self, v: u16) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    fn u32(&mut self, v: u32) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    fn i64(&mut self, v: i64) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    fn count(&mut self, what: &'static str, len: usize) -> Result<(), SerializationError> {
        let len = u32::try_from(len).map_err(|_| SerializationError::LengthOverflow { what, len })?;
        self.u32(len);
        Ok(())
    }

    fn string(&mut self, s: &str) -> Result<(), SerializationError> {
        self.count("string", s.len())?;
        self.buf.extend_from_slice(s.as_bytes());
        Ok(())
    }

    fn flag(&mut self, present: bool) {
        self.u8(present as u8);
    }

    fn opt_node(&mut self, node: Option<&AstNode>) -> Result<(), SerializationError> {
        self.flag(node.is_some());
        match node {
            Some(node) => self.write_node(node),
            None => Ok(()),
        }
    }

    fn nodes(&mut self, nodes: &[AstNode]) -> Result<(), SerializationError> {
        self.count("node list", nodes.len())?;
        nodes.iter().try_for_each(|n| self.write_node(n))
    }

    pub fn write_type(&mut self, ty: &Type) -> Result<(), SerializationError> {
        self.u8(base_type_code(&ty.base));
        match &ty.base {
            BaseType::Struct(name)
            | BaseType::Union(name)
            | BaseType::Enum(name)
            | BaseType::Named(name) => self.string(name)?,
            _ => {}
        }
        let mut flags = 0;
        if ty.is_const {
            flags |= TYPE_FLAG_CONST;
        }
        if ty.is_unsigned {
            flags |= TYPE_FLAG_UNSIGNED;
        }
        self.u8(flags);
        self.u32(ty.pointer_depth);
        self.count("array dimension list", ty.array_dims.len())?;
        for dim in &ty.array_dims {
            self.flag(dim.is_some());
            if let Some(n) = dim {
                self.u32(*n);
            }
        }
        Ok(())
    }

    fn immediate(&mut self, imm: &WasmImmediate) -> Result<(), SerializationError> {
        match imm {
            WasmImmediate::None => self.u8(IMM_NONE),
            WasmImmediate::I32(v) => {
                self.u8(IMM_I32);
                self.buf.extend_from_slice(&v.to_le_bytes());
            }
            WasmImmediate::I64(v) => {
                self.u8(IMM_I64);
                self.i64(*v);
            }
            WasmImmediate::F32(v) => {
                self.u8(IMM_F32);
                self.u32(v.to_bits());
            }
            WasmImmediate::F64(v) => {
                self.u8(IMM_F64);
                self.buf.extend_from_slice(&v.to_bits().to_le_bytes());
            }
            WasmImmediate::Index(v) => {
                self.u8(IMM_INDEX);
                self.u32(*v);
            }
            WasmImmediate::Name(name) => {
                self.u8(IMM_NAME);
                self.string(name)?;
            }
        }
        Ok(())
    }

    /// Append one node and its whole subtree
    pub fn write_node(&mut self, node: &AstNode) -> Result<(), SerializationError> {
        if self.depth >= MAX_DEPTH {
            return Err(SerializationError::DepthLimitExceeded {
                limit: MAX_DEPTH,
                offset: self.buf.len(),
            });
        }
        self.depth += 1;
        let result = self.write_node_inner(node);
        self.depth -= 1;
        result
    }

    fn write_node_inner(&mut self, node: &AstNode) -> Result<(), SerializationError> {
        let start = self.buf.len();
        self.u16(node.kind.tag());
        self.u32(node.location.line);
        self.u32(node.location.column);

        match &node.kind {
            NodeKind::TranslationUnit { declarations } => self.nodes(declarations)?,
            NodeKind::FunctionDecl {
                name,
                return_type,
                params,
                body,
            } => {
                if body.is_some() {
                    let offset = u32::try_from(start).map_err(|_| SerializationError::LengthOverflow {
                        what: "payload",
                        len: start,
                    })?;
                    self.functions.push((name.clone(), offset));
                }
                self.string(name)?;
                self.write_type(return_type)?;
                self.count("parameter list", params.len())?;
                for param in params {
                    self.string(&param.name)?;
                    self.write_type(&param.param_type)?;
                }
                self.opt_node(body.as_deref())?;
            }
            NodeKind::VarDecl {
                name,
                var_type,
                init,
            } => {
                self.string(name)?;
                self.write_type(var_type)?;
                self.opt_node(init.as_deref())?;
            }
            NodeKind::StructDecl { name, fields } | NodeKind::UnionDecl { name, fields } => {
                self.string(name)?;
                self.count("field list", fields.len())?;
                for field in fields {
                    self.string(&field.name)?;
                    self.write_type(&field.field_type)?;
                }
            }
            NodeKind::EnumDecl { name, constants } => {
                self.string(name)?;
                self.count("enumerator list", constants.len())?;
                for constant in constants {
                    self.string(&constant.name)?;
                    self.opt_node(constant.value.as_deref())?;
                }
            }
            NodeKind::TypedefDecl { name, target } => {
                self.string(name)?;
                self.write_type(target)?;
            }
            NodeKind::Compound { statements } => self.nodes(statements)?,
            NodeKind::DeclStmt { declarations } => self.nodes(declarations)?,
            NodeKind::If {
                condition,
                then_branch,
                else_branch,
            } => {
                self.write_node(condition)?;
                self.write_node(then_branch)?;
                self.opt_node(else_branch.as_deref())?;
            }
            NodeKind::While { condition, body } => {
                self.write_node(condition)?;
                self.write_node(body)?;
            }
            NodeKind::DoWhile { body, condition } => {
                self.write_node(body)?;
                self.write_node(condition)?;
            }
            NodeKind::For {
                init,
                condition,
                increment,
                body,
            } => {
                self.opt_node(init.as_deref())?;
                self.opt_node(condition.as_deref())?;
                self.opt_node(increment.as_deref())?;
                self.write_node(body)?;
            }
            NodeKind::Switch { expr, cases } => {
                self.write_node(expr)?;
                self.count("case list", cases.len())?;
                for case in cases {
                    self.u32(case.location.line);
                    self.u32(case.location.column);
                    self.opt_node(case.value.as_deref())?;
                    self.nodes(&case.body)?;
                }
            }
            NodeKind::Return { expr } => self.opt_node(expr.as_deref())?,
            NodeKind::Break | NodeKind::Continue | NodeKind::Empty => {}
            NodeKind::ExprStmt { expr } => self.write_node(expr)?,
            NodeKind::Identifier(name) => self.string(name)?,
            NodeKind::IntLiteral(n) => self.i64(*n),
            NodeKind::FloatLiteral(x) => self.buf.extend_from_slice(&x.to_bits().to_le_bytes()),
            NodeKind::CharLiteral(c) => self.u8(*c),
            NodeKind::StringLiteral(s) => self.string(s)?,
            NodeKind::Binary { op, left, right } => {
                self.u8(binop_code(*op));
                self.write_node(left)?;
                self.write_node(right)?;
            }
            NodeKind::Unary { op, operand } => {
                self.u8(unop_code(*op));
                self.write_node(operand)?;
            }
            NodeKind::Assign { op, target, value } => {
                self.flag(op.is_some());
                if let Some(op) = op {
                    self.u8(binop_code(*op));
                }
                self.write_node(target)?;
                self.write_node(value)?;
            }
            NodeKind::Ternary {
                condition,
                then_expr,
                else_expr,
            } => {
                self.write_node(condition)?;
                self.write_node(then_expr)?;
                self.write_node(else_expr)?;
            }
            NodeKind::Call { callee, args } => {
                self.write_node(callee)?;
                self.nodes(args)?;
            }
            NodeKind::Index { array, index } => {
                self.write_node(array)?;
                self.write_node(index)?;
            }
            NodeKind::Member { object, member } | NodeKind::PtrMember { object, member } => {
                self.write_node(object)?;
                self.string(member)?;
            }
            NodeKind::Cast { target_type, expr } => {
                self.write_type(target_type)?;
                self.write_node(expr)?;
            }
            NodeKind::SizeofType(ty) => self.write_type(ty)?,
            NodeKind::SizeofExpr(expr) => self.write_node(expr)?,
            NodeKind::Wasm(instr) => {
                self.immediate(&instr.immediate)?;
                self.nodes(&instr.operands)?;
            }
        }
        Ok(())
    }
}

/// Encode a whole tree
pub fn serialize(node: &AstNode) -> Result<Vec<u8>, SerializationError> {
    stage::run_staged(|| -> Result<Vec<u8>, SerializationError> {
        let mut writer = AstWriter::new();
        writer.write_node(node)?;
        tracing::debug!(bytes = writer.len(), "serialized AST");
        Ok(writer.into_bytes())
    })?
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_header_layout() {
        let node = AstNode::new(NodeKind::IntLiteral(-2), SourceLocation::new(3, 7));
        let bytes = serialize(&node).unwrap();
        assert_eq!(&bytes[0..2], &INT_LITERAL.to_le_bytes());
        assert_eq!(&bytes[2..6], &3u32.to_le_bytes());
        assert_eq!(&bytes[6..10], &7u32.to_le_bytes());
        assert_eq!(&bytes[10..], &(-2i64).to_le_bytes());
    }

    #[test]
    fn test_string_and_presence_flag() {
        let loc = SourceLocation::new(1, 1);
        let node = AstNode::new(NodeKind::Return { expr: None }, loc);
        assert_eq!(serialize(&node).unwrap().len(), 10 + 1);

        let ident = AstNode::new(NodeKind::Identifier("abc".into()), loc);
        let bytes = serialize(&ident).unwrap();
        assert_eq!(&bytes[10..14], &3u32.to_le_bytes());
        assert_eq!(&bytes[14..], b"abc");
    }

    #[test]
    fn test_function_offsets_are_recorded() {
        let loc = SourceLocation::new(1, 1);
        let func = |name: &str, body: bool| {
            AstNode::new(
                NodeKind::FunctionDecl {
                    name: name.into(),
                    return_type: Type::int(),
                    params: vec![],
                    body: body.then(|| AstNode::new(NodeKind::Compound { statements: vec![] }, loc).boxed()),
                },
                loc,
            )
        };
        let unit = AstNode::new(
            NodeKind::TranslationUnit {
                declarations: vec![func("main", false), func("helper", true), func("main", true)],
            },
            loc,
        );
        let mut writer = AstWriter::new();
        writer.write_node(&unit).unwrap();
        // unit header and count, then the prototype of main:
        // header, name, int type, param count, body flag
        let helper = writer.function_offset("helper").unwrap();
        assert_eq!(helper, 14 + 10 + (4 + 4) + 10 + 4 + 1);
        let main = writer.function_offset("main").unwrap();
        assert!(main > helper);
        assert!(writer.function_offset("missing").is_none());
    }
}
