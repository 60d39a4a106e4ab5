//! The canonical tag space of serialized nodes
//!
//! | range              | kinds                                            |
//! |--------------------|--------------------------------------------------|
//! | `0x0000..=0x00FF`  | WASM instructions (their binary opcode)          |
//! | `0x0100..=0x010A`  | WASM module items                                |
//! | `0x0200..`         | C declarations                                   |
//! | `0x0220..`         | C statements                                     |
//! | `0x0240..`         | C expressions                                    |
//! | `0xFC08..=0xFC11`  | prefixed WASM memory/table instructions          |
//!
//! Operators and base types inside payloads use their own one-byte codes.

use crate::parser::ast::{BaseType, BinOp, NodeKind, UnOp};

// Declarations
pub const TRANSLATION_UNIT: u16 = 0x0200;
pub const FUNCTION_DECL: u16 = 0x0201;
pub const VAR_DECL: u16 = 0x0202;
pub const STRUCT_DECL: u16 = 0x0203;
pub const UNION_DECL: u16 = 0x0204;
pub const ENUM_DECL: u16 = 0x0205;
pub const TYPEDEF_DECL: u16 = 0x0206;

// Statements
pub const COMPOUND: u16 = 0x0220;
pub const IF: u16 = 0x0221;
pub const WHILE: u16 = 0x0222;
pub const DO_WHILE: u16 = 0x0223;
pub const FOR: u16 = 0x0224;
pub const SWITCH: u16 = 0x0225;
pub const RETURN: u16 = 0x0226;
pub const BREAK: u16 = 0x0227;
pub const CONTINUE: u16 = 0x0228;
pub const EXPR_STMT: u16 = 0x0229;
pub const EMPTY: u16 = 0x022A;
pub const DECL_STMT: u16 = 0x022B;

// Expressions
pub const IDENTIFIER: u16 = 0x0240;
pub const INT_LITERAL: u16 = 0x0241;
pub const FLOAT_LITERAL: u16 = 0x0242;
pub const CHAR_LITERAL: u16 = 0x0243;
pub const STRING_LITERAL: u16 = 0x0244;
pub const BINARY: u16 = 0x0245;
pub const UNARY: u16 = 0x0246;
pub const ASSIGN: u16 = 0x0247;
pub const TERNARY: u16 = 0x0248;
pub const CALL: u16 = 0x0249;
pub const INDEX: u16 = 0x024A;
pub const MEMBER: u16 = 0x024B;
pub const PTR_MEMBER: u16 = 0x024C;
pub const CAST: u16 = 0x024D;
pub const SIZEOF_TYPE: u16 = 0x024E;
pub const SIZEOF_EXPR: u16 = 0x024F;

impl NodeKind {
    /// Serialized tag of this kind
    pub fn tag(&self) -> u16 {
        match self {
            NodeKind::TranslationUnit { .. } => TRANSLATION_UNIT,
            NodeKind::FunctionDecl { .. } => FUNCTION_DECL,
            NodeKind::VarDecl { .. } => VAR_DECL,
            NodeKind::StructDecl { .. } => STRUCT_DECL,
            NodeKind::UnionDecl { .. } => UNION_DECL,
            NodeKind::EnumDecl { .. } => ENUM_DECL,
            NodeKind::TypedefDecl { .. } => TYPEDEF_DECL,
            NodeKind::Compound { .. } => COMPOUND,
            NodeKind::DeclStmt { .. } => DECL_STMT,
            NodeKind::If { .. } => IF,
            NodeKind::While { .. } => WHILE,
            NodeKind::DoWhile { .. } => DO_WHILE,
            NodeKind::For { .. } => FOR,
            NodeKind::Switch { .. } => SWITCH,
            NodeKind::Return { .. } => RETURN,
            NodeKind::Break => BREAK,
            NodeKind::Continue => CONTINUE,
            NodeKind::ExprStmt { .. } => EXPR_STMT,
            NodeKind::Empty => EMPTY,
            NodeKind::Identifier(_) => IDENTIFIER,
            NodeKind::IntLiteral(_) => INT_LITERAL,
            NodeKind::FloatLiteral(_) => FLOAT_LITERAL,
            NodeKind::CharLiteral(_) => CHAR_LITERAL,
            NodeKind::StringLiteral(_) => STRING_LITERAL,
            NodeKind::Binary { .. } => BINARY,
            NodeKind::Unary { .. } => UNARY,
            NodeKind::Assign { .. } => ASSIGN,
            NodeKind::Ternary { .. } => TERNARY,
            NodeKind::Call { .. } => CALL,
            NodeKind::Index { .. } => INDEX,
            NodeKind::Member { .. } => MEMBER,
            NodeKind::PtrMember { .. } => PTR_MEMBER,
            NodeKind::Cast { .. } => CAST,
            NodeKind::SizeofType(_) => SIZEOF_TYPE,
            NodeKind::SizeofExpr(_) => SIZEOF_EXPR,
            NodeKind::Wasm(instr) => instr.op.code(),
        }
    }
}

pub fn binop_code(op: BinOp) -> u8 {
    match op {
        BinOp::Add => 0,
        BinOp::Sub => 1,
        BinOp::Mul => 2,
        BinOp::Div => 3,
        BinOp::Mod => 4,
        BinOp::Eq => 5,
        BinOp::Ne => 6,
        BinOp::Lt => 7,
        BinOp::Le => 8,
        BinOp::Gt => 9,
        BinOp::Ge => 10,
        BinOp::And => 11,
        BinOp::Or => 12,
        BinOp::BitAnd => 13,
        BinOp::BitOr => 14,
        BinOp::BitXor => 15,
        BinOp::Shl => 16,
        BinOp::Shr => 17,
    }
}

pub fn binop_from_code(code: u8) -> Option<BinOp> {
    Some(match code {
        0 => BinOp::Add,
        1 => BinOp::Sub,
        2 => BinOp::Mul,
        3 => BinOp::Div,
        4 => BinOp::Mod,
        5 => BinOp::Eq,
        6 => BinOp::Ne,
        7 => BinOp::Lt,
        8 => BinOp::Le,
        9 => BinOp::Gt,
        10 => BinOp::Ge,
        11 => BinOp::And,
        12 => BinOp::Or,
        13 => BinOp::BitAnd,
        14 => BinOp::BitOr,
        15 => BinOp::BitXor,
        16 => BinOp::Shl,
        17 => BinOp::Shr,
        _ => return None,
    })
}

pub fn unop_code(op: UnOp) -> u8 {
    match op {
        UnOp::Neg => 0,
        UnOp::Not => 1,
        UnOp::BitNot => 2,
        UnOp::PreInc => 3,
        UnOp::PreDec => 4,
        UnOp::PostInc => 5,
        UnOp::PostDec => 6,
        UnOp::Deref => 7,
        UnOp::AddrOf => 8,
    }
}

pub fn unop_from_code(code: u8) -> Option<UnOp> {
    Some(match code {
        0 => UnOp::Neg,
        1 => UnOp::Not,
        2 => UnOp::BitNot,
        3 => UnOp::PreInc,
        4 => UnOp::PreDec,
        5 => UnOp::PostInc,
        6 => UnOp::PostDec,
        7 => UnOp::Deref,
        8 => UnOp::AddrOf,
        _ => return None,
    })
}

/// Base type code; named bases are followed by their name string
pub fn base_type_code(base: &BaseType) -> u8 {
    match base {
        BaseType::Void => 0,
        BaseType::Bool => 1,
        BaseType::Char => 2,
        BaseType::Short => 3,
        BaseType::Int => 4,
        BaseType::Long => 5,
        BaseType::Float => 6,
        BaseType::Double => 7,
        BaseType::Struct(_) => 8,
        BaseType::Union(_) => 9,
        BaseType::Enum(_) => 10,
        BaseType::Named(_) => 11,
    }
}

pub const TYPE_FLAG_CONST: u8 = 0x01;
pub const TYPE_FLAG_UNSIGNED: u8 = 0x02;

// WasmImmediate discriminants
pub const IMM_NONE: u8 = 0;
pub const IMM_I32: u8 = 1;
pub const IMM_I64: u8 = 2;
pub const IMM_F32: u8 = 3;
pub const IMM_F64: u8 = 4;
pub const IMM_INDEX: u8 = 5;
pub const IMM_NAME: u8 = 6;
