//! ASTC decoder
//!
//! Mirrors [`super::writer`]. Decoding either rebuilds the complete tree or
//! fails with a [`SerializationError`]; no partial tree escapes.

use super::errors::{SerializationError, MAX_DEPTH};
use super::tags::*;
use crate::parser::ast::*;
use crate::parser::wasm::{WasmImmediate, WasmInstr, WasmOp};
use crate::stage;

/// Cursor over an encoded byte slice
pub struct AstReader<'a> {
    data: &'a [u8],
    pos: usize,
    depth: usize,
}

impl<'a> AstReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        AstReader {
            data,
            pos: 0,
            depth: 0,
        }
    }

    /// Start reading at `offset` instead of the beginning
    pub fn at(data: &'a [u8], offset: usize) -> Self {
        AstReader {
            data,
            pos: offset,
            depth: 0,
        }
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn remaining(&self) -> usize {
        self.data.len().saturating_sub(self.pos)
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], SerializationError> {
        if self.remaining() < n {
            return Err(SerializationError::UnexpectedEof {
                offset: self.pos,
                needed: n - self.remaining(),
            });
        }
        let bytes = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(bytes)
    }

    fn array<const N: usize>(&mut self) -> Result<[u8; N], SerializationError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    fn u8(&mut self) -> Result<u8, SerializationError> {
        Ok(self.take(1)?[0])
    }

    pub fn u16(&mut self) -> Result<u16, SerializationError> {
        Ok(u16::from_le_bytes(self.array()?))
    }

    fn u32(&mut self) -> Result<u32, SerializationError> {
        Ok(u32::from_le_bytes(self.array()?))
    }

    fn i64(&mut self) -> Result<i64, SerializationError> {
        Ok(i64::from_le_bytes(self.array()?))
    }

    fn count(&mut self) -> Result<usize, SerializationError> {
        Ok(self.u32()? as usize)
    }

    fn string(&mut self) -> Result<String, SerializationError> {
        let len = self.count()?;
        let offset = self.pos;
        let bytes = self.take(len)?;
        String::from_utf8(bytes.to_vec()).map_err(|_| SerializationError::InvalidUtf8 { offset })
    }

    fn flag(&mut self) -> Result<bool, SerializationError> {
        let offset = self.pos;
        match self.u8()? {
            0 => Ok(false),
            1 => Ok(true),
            value => Err(SerializationError::BadPresenceFlag { value, offset }),
        }
    }

    fn opt_node(&mut self) -> Result<Option<Box<AstNode>>, SerializationError> {
        if self.flag()? {
            Ok(Some(Box::new(self.read_node()?)))
        } else {
            Ok(None)
        }
    }

    fn node(&mut self) -> Result<Box<AstNode>, SerializationError> {
        Ok(Box::new(self.read_node()?))
    }

    fn nodes(&mut self) -> Result<Vec<AstNode>, SerializationError> {
        let count = self.count()?;
        // Every node is at least a header long; cap the reservation by what is left
        let mut nodes = Vec::with_capacity(count.min(self.remaining() / 10));
        for _ in 0..count {
            nodes.push(self.read_node()?);
        }
        Ok(nodes)
    }

    fn discriminant(&mut self) -> Result<(u8, usize), SerializationError> {
        let offset = self.pos;
        Ok((self.u8()?, offset))
    }

    fn binop(&mut self) -> Result<BinOp, SerializationError> {
        let (value, offset) = self.discriminant()?;
        binop_from_code(value).ok_or(SerializationError::InvalidDiscriminant {
            what: "binary operator",
            value,
            offset,
        })
    }

    fn unop(&mut self) -> Result<UnOp, SerializationError> {
        let (value, offset) = self.discriminant()?;
        unop_from_code(value).ok_or(SerializationError::InvalidDiscriminant {
            what: "unary operator",
            value,
            offset,
        })
    }

    pub fn read_type(&mut self) -> Result<Type, SerializationError> {
        let (code, offset) = self.discriminant()?;
        let base = match code {
            0 => BaseType::Void,
            1 => BaseType::Bool,
            2 => BaseType::Char,
            3 => BaseType::Short,
            4 => BaseType::Int,
            5 => BaseType::Long,
            6 => BaseType::Float,
            7 => BaseType::Double,
            8 => BaseType::Struct(self.string()?),
            9 => BaseType::Union(self.string()?),
            10 => BaseType::Enum(self.string()?),
            11 => BaseType::Named(self.string()?),
            value => {
                return Err(SerializationError::InvalidDiscriminant {
                    what: "base type",
                    value,
                    offset,
                })
            }
        };
        let flags_offset = self.pos;
        let flags = self.u8()?;
        if flags & !(TYPE_FLAG_CONST | TYPE_FLAG_UNSIGNED) != 0 {
            return Err(SerializationError::InvalidDiscriminant {
                what: "type flags",
                value: flags,
                offset: flags_offset,
            });
        }
        let pointer_depth = self.u32()?;
        let dims = self.count()?;
        let mut array_dims = Vec::with_capacity(dims.min(self.remaining()));
        for _ in 0..dims {
            array_dims.push(if self.flag()? { Some(self.u32()?) } else { None });
        }
        Ok(Type {
            base,
            is_const: flags & TYPE_FLAG_CONST != 0,
            is_unsigned: flags & TYPE_FLAG_UNSIGNED != 0,
            pointer_depth,
            array_dims,
        })
    }

    fn immediate(&mut self) -> Result<WasmImmediate, SerializationError> {
        let (code, offset) = self.discriminant()?;
        Ok(match code {
            IMM_NONE => WasmImmediate::None,
            IMM_I32 => WasmImmediate::I32(i32::from_le_bytes(self.array()?)),
            IMM_I64 => WasmImmediate::I64(self.i64()?),
            IMM_F32 => WasmImmediate::F32(f32::from_bits(self.u32()?)),
            IMM_F64 => WasmImmediate::F64(f64::from_bits(u64::from_le_bytes(self.array()?))),
            IMM_INDEX => WasmImmediate::Index(self.u32()?),
            IMM_NAME => WasmImmediate::Name(self.string()?),
            value => {
                return Err(SerializationError::InvalidDiscriminant {
                    what: "immediate",
                    value,
                    offset,
                })
            }
        })
    }

    /// Decode one node and its whole subtree
    pub fn read_node(&mut self) -> Result<AstNode, SerializationError> {
        if self.depth >= MAX_DEPTH {
            return Err(SerializationError::DepthLimitExceeded {
                limit: MAX_DEPTH,
                offset: self.pos,
            });
        }
        self.depth += 1;
        let result = self.read_node_inner();
        self.depth -= 1;
        result
    }

    fn read_node_inner(&mut self) -> Result<AstNode, SerializationError> {
        let tag_offset = self.pos;
        let tag = self.u16()?;
        let line = self.u32()?;
        let column = self.u32()?;

        let kind = match tag {
            TRANSLATION_UNIT => NodeKind::TranslationUnit {
                declarations: self.nodes()?,
            },
            FUNCTION_DECL => {
                let name = self.string()?;
                let return_type = self.read_type()?;
                let count = self.count()?;
                let mut params = Vec::with_capacity(count.min(self.remaining()));
                for _ in 0..count {
                    params.push(Param {
                        name: self.string()?,
                        param_type: self.read_type()?,
                    });
                }
                NodeKind::FunctionDecl {
                    name,
                    return_type,
                    params,
                    body: self.opt_node()?,
                }
            }
            VAR_DECL => NodeKind::VarDecl {
                name: self.string()?,
                var_type: self.read_type()?,
                init: self.opt_node()?,
            },
            STRUCT_DECL | UNION_DECL => {
                let name = self.string()?;
                let count = self.count()?;
                let mut fields = Vec::with_capacity(count.min(self.remaining()));
                for _ in 0..count {
                    fields.push(Field {
                        name: self.string()?,
                        field_type: self.read_type()?,
                    });
                }
                if tag == STRUCT_DECL {
                    NodeKind::StructDecl { name, fields }
                } else {
                    NodeKind::UnionDecl { name, fields }
                }
            }
            ENUM_DECL => {
                let name = self.string()?;
                let count = self.count()?;
                let mut constants = Vec::with_capacity(count.min(self.remaining()));
                for _ in 0..count {
                    constants.push(EnumConstant {
                        name: self.string()?,
                        value: self.opt_node()?,
                    });
                }
                NodeKind::EnumDecl { name, constants }
            }
            TYPEDEF_DECL => NodeKind::TypedefDecl {
                name: self.string()?,
                target: self.read_type()?,
            },
            COMPOUND => NodeKind::Compound {
                statements: self.nodes()?,
            },
            DECL_STMT => NodeKind::DeclStmt {
                declarations: self.nodes()?,
            },
            IF => NodeKind::If {
                condition: self.node()?,
                then_branch: self.node()?,
                else_branch: self.opt_node()?,
            },
            WHILE => NodeKind::While {
                condition: self.node()?,
                body: self.node()?,
            },
            DO_WHILE => NodeKind::DoWhile {
                body: self.node()?,
                condition: self.node()?,
            },
            FOR => NodeKind::For {
                init: self.opt_node()?,
                condition: self.opt_node()?,
                increment: self.opt_node()?,
                body: self.node()?,
            },
            SWITCH => {
                let expr = self.node()?;
                let count = self.count()?;
                let mut cases = Vec::with_capacity(count.min(self.remaining()));
                for _ in 0..count {
                    let location = SourceLocation::new(self.u32()?, self.u32()?);
                    cases.push(SwitchCase {
                        value: self.opt_node()?,
                        body: self.nodes()?,
                        location,
                    });
                }
                NodeKind::Switch { expr, cases }
            }
            RETURN => NodeKind::Return {
                expr: self.opt_node()?,
            },
            BREAK => NodeKind::Break,
            CONTINUE => NodeKind::Continue,
            EMPTY => NodeKind::Empty,
            EXPR_STMT => NodeKind::ExprStmt { expr: self.node()? },
            IDENTIFIER => NodeKind::Identifier(self.string()?),
            INT_LITERAL => NodeKind::IntLiteral(self.i64()?),
            FLOAT_LITERAL => NodeKind::FloatLiteral(f64::from_bits(u64::from_le_bytes(self.array()?))),
            CHAR_LITERAL => NodeKind::CharLiteral(self.u8()?),
            STRING_LITERAL => NodeKind::StringLiteral(self.string()?),
            BINARY => NodeKind::Binary {
                op: self.binop()?,
                left: self.node()?,
                right: self.node()?,
            },
            UNARY => NodeKind::Unary {
                op: self.unop()?,
                operand: self.node()?,
            },
            ASSIGN => {
                let op = if self.flag()? { Some(self.binop()?) } else { None };
                NodeKind::Assign {
                    op,
                    target: self.node()?,
                    value: self.node()?,
                }
            }
            TERNARY => NodeKind::Ternary {
                condition: self.node()?,
                then_expr: self.node()?,
                else_expr: self.node()?,
            },
            CALL => NodeKind::Call {
                callee: self.node()?,
                args: self.nodes()?,
            },
            INDEX => NodeKind::Index {
                array: self.node()?,
                index: self.node()?,
            },
            MEMBER => NodeKind::Member {
                object: self.node()?,
                member: self.string()?,
            },
            PTR_MEMBER => NodeKind::PtrMember {
                object: self.node()?,
                member: self.string()?,
            },
            CAST => NodeKind::Cast {
                target_type: self.read_type()?,
                expr: self.node()?,
            },
            SIZEOF_TYPE => NodeKind::SizeofType(self.read_type()?),
            SIZEOF_EXPR => NodeKind::SizeofExpr(self.node()?),
            other => match WasmOp::from_code(other) {
                Some(op) => {
                    let immediate = self.immediate()?;
                    NodeKind::Wasm(WasmInstr::new(op, immediate, self.nodes()?))
                }
                None => {
                    return Err(SerializationError::UnknownTag {
                        tag: other,
                        offset: tag_offset,
                    })
                }
            },
        };

        Ok(AstNode::new(kind, SourceLocation::new(line, column)))
    }
}

/// Decode a buffer that holds exactly one tree
pub fn deserialize(bytes: &[u8]) -> Result<AstNode, SerializationError> {
    stage::run_staged(|| -> Result<AstNode, SerializationError> {
        let mut reader = AstReader::new(bytes);
        let node = reader.read_node()?;
        if reader.remaining() > 0 {
            return Err(SerializationError::TrailingBytes {
                offset: reader.position(),
                count: reader.remaining(),
            });
        }
        Ok(node)
    })?
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::astc::writer::serialize;
    use crate::parser::parse::parse_source;

    const PROGRAM: &str = r#"
        typedef unsigned long size;
        struct Point { int x; int y; };
        union Bits { int i; char c[4]; };
        enum Mode { OFF, ON = 3 };
        int table[2][3];
        const char *name = "astc" "file";
        int add(int a, int b) { return a + b; }
        int main(void) {
            struct Point p;
            struct Point *pp = &p;
            double d = 1.5e3;
            int i, total = 0;
            p.x = 'x'; pp->y = -1;
            for (i = 0; i < 10; i++) { if (i % 2) continue; total += i; }
            do { total--; } while (total > 100);
            while (0) break;
            switch (total) { case 1: total = 2; break; default: ; }
            total = total ? (int)d : sizeof(size) + sizeof total;
            return add(total, table[1][2]);
        }
    "#;

    #[test]
    fn test_parsed_program_round_trips() {
        let unit = parse_source(PROGRAM, "prog.c").unwrap();
        let bytes = serialize(&unit).unwrap();
        assert_eq!(deserialize(&bytes).unwrap(), unit);
    }

    #[test]
    fn test_truncated_input_names_offset() {
        let unit = parse_source("int main() { return 1; }", "t.c").unwrap();
        let bytes = serialize(&unit).unwrap();
        for cut in [0, 1, 9, bytes.len() / 2, bytes.len() - 1] {
            match deserialize(&bytes[..cut]) {
                Err(SerializationError::UnexpectedEof { offset, .. }) => assert!(offset <= cut),
                other => panic!("cut at {}: unexpected {:?}", cut, other),
            }
        }
    }

    #[test]
    fn test_unknown_tag() {
        let mut bytes = serialize(&AstNode::int(1)).unwrap();
        bytes[0..2].copy_from_slice(&0x0300u16.to_le_bytes());
        assert!(matches!(
            deserialize(&bytes),
            Err(SerializationError::UnknownTag { tag: 0x0300, offset: 0 })
        ));
    }

    #[test]
    fn test_bad_presence_flag() {
        let node = AstNode::new(NodeKind::Return { expr: None }, SourceLocation::new(1, 1));
        let mut bytes = serialize(&node).unwrap();
        bytes[10] = 7;
        assert!(matches!(
            deserialize(&bytes),
            Err(SerializationError::BadPresenceFlag { value: 7, offset: 10 })
        ));
    }

    #[test]
    fn test_invalid_operator_code() {
        let node = AstNode::new(
            NodeKind::Binary {
                op: BinOp::Add,
                left: AstNode::int(1).boxed(),
                right: AstNode::int(2).boxed(),
            },
            SourceLocation::new(1, 1),
        );
        let mut bytes = serialize(&node).unwrap();
        bytes[10] = 200;
        assert!(matches!(
            deserialize(&bytes),
            Err(SerializationError::InvalidDiscriminant { value: 200, offset: 10, .. })
        ));
    }

    #[test]
    fn test_invalid_utf8() {
        let node = AstNode::new(NodeKind::Identifier("ab".into()), SourceLocation::new(1, 1));
        let mut bytes = serialize(&node).unwrap();
        bytes[14] = 0xFF;
        assert!(matches!(
            deserialize(&bytes),
            Err(SerializationError::InvalidUtf8 { offset: 14 })
        ));
    }

    #[test]
    fn test_trailing_bytes() {
        let mut bytes = serialize(&AstNode::int(5)).unwrap();
        bytes.extend_from_slice(&[0, 0]);
        assert!(matches!(
            deserialize(&bytes),
            Err(SerializationError::TrailingBytes { offset: 18, count: 2 })
        ));
    }

    #[test]
    fn test_depth_limit() {
        let mut node = AstNode::int(0);
        for _ in 0..MAX_DEPTH {
            node = AstNode::new(
                NodeKind::Unary {
                    op: UnOp::Neg,
                    operand: node.boxed(),
                },
                SourceLocation::new(1, 1),
            );
        }
        assert!(matches!(
            serialize(&node),
            Err(SerializationError::DepthLimitExceeded { .. })
        ));

        // Hand-build an over-deep stream: MAX_DEPTH + 1 negations, then a literal
        let mut bytes = Vec::new();
        for _ in 0..=MAX_DEPTH {
            bytes.extend_from_slice(&UNARY.to_le_bytes());
            bytes.extend_from_slice(&[0; 8]);
            bytes.push(unop_code(UnOp::Neg));
        }
        assert!(matches!(
            deserialize(&bytes),
            Err(SerializationError::DepthLimitExceeded { limit: MAX_DEPTH, .. })
        ));
    }
}
