//! AST node model shared by every stage after parsing
//!
//! A node is a [`SourceLocation`] plus one [`NodeKind`] variant. Each node owns
//! its children through `Box`/`Vec`, so the tree has no back-edges and dropping
//! the root releases everything exactly once.
//!
//! The serialized tag of each kind lives in [`crate::astc::tags`]; WASM-form
//! nodes reuse their WASM opcode as tag (see [`super::wasm::WasmOp`]).

use super::wasm::WasmInstr;
use std::fmt;

/// Source location information for error reporting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct SourceLocation {
    pub line: u32,
    pub column: u32,
}

impl SourceLocation {
    pub fn new(line: u32, column: u32) -> Self {
        Self { line, column }
    }
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// Base types of the C subset
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum BaseType {
    Void,
    Bool,
    Char,
    Short,
    Int,
    Long,
    Float,
    Double,
    Struct(String),
    Union(String),
    Enum(String),
    /// A typedef name, resolved by the consumer
    Named(String),
}

/// Type descriptor: base type with qualifiers, pointer depth and array dimensions
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Type {
    pub base: BaseType,
    pub is_const: bool,
    pub is_unsigned: bool,
    pub pointer_depth: u32,              // 0 = not pointer, 1 = *, 2 = **, etc.
    pub array_dims: Vec<Option<u32>>,    // None for unsized dimension (function params)
}

impl Type {
    pub fn new(base: BaseType) -> Self {
        Type {
            base,
            is_const: false,
            is_unsigned: false,
            pointer_depth: 0,
            array_dims: Vec::new(),
        }
    }

    pub fn int() -> Self {
        Type::new(BaseType::Int)
    }

    pub fn with_unsigned(mut self) -> Self {
        self.is_unsigned = true;
        self
    }

    pub fn with_pointer(mut self) -> Self {
        self.pointer_depth += 1;
        self
    }

    pub fn with_array(mut self, size: Option<u32>) -> Self {
        self.array_dims.push(size);
        self
    }

    pub fn is_pointer(&self) -> bool {
        self.pointer_depth > 0 && self.array_dims.is_empty()
    }

    pub fn is_array(&self) -> bool {
        !self.array_dims.is_empty()
    }

    pub fn is_floating(&self) -> bool {
        self.pointer_depth == 0
            && self.array_dims.is_empty()
            && matches!(self.base, BaseType::Float | BaseType::Double)
    }

    /// Integer-like scalar: chars, ints, bools and enums
    pub fn is_integral(&self) -> bool {
        self.pointer_depth == 0
            && self.array_dims.is_empty()
            && matches!(
                self.base,
                BaseType::Bool
                    | BaseType::Char
                    | BaseType::Short
                    | BaseType::Int
                    | BaseType::Long
                    | BaseType::Enum(_)
            )
    }

    /// The type obtained by dereferencing a pointer or indexing an array once
    pub fn element_type(&self) -> Option<Type> {
        let mut elem = self.clone();
        if !elem.array_dims.is_empty() {
            elem.array_dims.remove(0);
            Some(elem)
        } else if elem.pointer_depth > 0 {
            elem.pointer_depth -= 1;
            Some(elem)
        } else {
            None
        }
    }

    /// Array-to-pointer decay
    pub fn decayed(&self) -> Type {
        match self.element_type() {
            Some(elem) if self.is_array() => elem.with_pointer(),
            _ => self.clone(),
        }
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_const {
            write!(f, "const ")?;
        }
        if self.is_unsigned {
            write!(f, "unsigned ")?;
        }
        match &self.base {
            BaseType::Void => write!(f, "void")?,
            BaseType::Bool => write!(f, "_Bool")?,
            BaseType::Char => write!(f, "char")?,
            BaseType::Short => write!(f, "short")?,
            BaseType::Int => write!(f, "int")?,
            BaseType::Long => write!(f, "long")?,
            BaseType::Float => write!(f, "float")?,
            BaseType::Double => write!(f, "double")?,
            BaseType::Struct(name) => write!(f, "struct {}", name)?,
            BaseType::Union(name) => write!(f, "union {}", name)?,
            BaseType::Enum(name) => write!(f, "enum {}", name)?,
            BaseType::Named(name) => write!(f, "{}", name)?,
        }
        for _ in 0..self.pointer_depth {
            write!(f, "*")?;
        }
        for dim in &self.array_dims {
            match dim {
                Some(n) => write!(f, "[{}]", n)?,
                None => write!(f, "[]")?,
            }
        }
        Ok(())
    }
}

/// Binary operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinOp {
    // Arithmetic
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    // Comparison
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    // Logical
    And,
    Or,
    // Bitwise
    BitAnd,
    BitOr,
    BitXor,
    Shl,
    Shr,
}

impl BinOp {
    pub fn symbol(self) -> &'static str {
        match self {
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::Mul => "*",
            BinOp::Div => "/",
            BinOp::Mod => "%",
            BinOp::Eq => "==",
            BinOp::Ne => "!=",
            BinOp::Lt => "<",
            BinOp::Le => "<=",
            BinOp::Gt => ">",
            BinOp::Ge => ">=",
            BinOp::And => "&&",
            BinOp::Or => "||",
            BinOp::BitAnd => "&",
            BinOp::BitOr => "|",
            BinOp::BitXor => "^",
            BinOp::Shl => "<<",
            BinOp::Shr => ">>",
        }
    }

    pub fn is_comparison(self) -> bool {
        matches!(
            self,
            BinOp::Eq | BinOp::Ne | BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge
        )
    }
}

/// Unary operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnOp {
    Neg,     // -x
    Not,     // !x
    BitNot,  // ~x
    PreInc,  // ++x
    PreDec,  // --x
    PostInc, // x++
    PostDec, // x--
    Deref,   // *x
    AddrOf,  // &x
}

/// Function parameter
#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    pub name: String,
    pub param_type: Type,
}

/// Struct or union field
#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    pub name: String,
    pub field_type: Type,
}

/// One enumerator, optionally with an explicit value expression
#[derive(Debug, Clone, PartialEq)]
pub struct EnumConstant {
    pub name: String,
    pub value: Option<Box<AstNode>>,
}

/// A `case` (with value) or `default` (without) arm of a switch
#[derive(Debug, Clone, PartialEq)]
pub struct SwitchCase {
    pub value: Option<Box<AstNode>>,
    pub body: Vec<AstNode>,
    pub location: SourceLocation,
}

/// A single AST node
#[derive(Debug, Clone, PartialEq)]
pub struct AstNode {
    pub location: SourceLocation,
    pub kind: NodeKind,
}

impl AstNode {
    pub fn new(kind: NodeKind, location: SourceLocation) -> Self {
        AstNode { location, kind }
    }

    pub fn location(&self) -> SourceLocation {
        self.location
    }

    /// Shorthand used by tests and tooling that build trees by hand
    pub fn int(value: i64) -> Self {
        AstNode::new(NodeKind::IntLiteral(value), SourceLocation::default())
    }

    pub fn boxed(self) -> Box<AstNode> {
        Box::new(self)
    }

    /// Folds integer constant expressions built from literals (array sizes, enumerators)
    pub fn constant_value(&self) -> Option<i64> {
        self.constant_value_with(&|_| None)
    }

    /// Like [`AstNode::constant_value`], resolving identifiers through `lookup`
    pub fn constant_value_with(&self, lookup: &dyn Fn(&str) -> Option<i64>) -> Option<i64> {
        match &self.kind {
            NodeKind::IntLiteral(n) => Some(*n),
            NodeKind::CharLiteral(c) => Some(*c as i8 as i64),
            NodeKind::Identifier(name) => lookup(name),
            NodeKind::Unary { op, operand } => {
                let v = operand.constant_value_with(lookup)?;
                match op {
                    UnOp::Neg => Some(v.wrapping_neg()),
                    UnOp::Not => Some((v == 0) as i64),
                    UnOp::BitNot => Some(!v),
                    _ => None,
                }
            }
            NodeKind::Binary { op, left, right } => {
                let (l, r) = (left.constant_value_with(lookup)?, right.constant_value_with(lookup)?);
                let value = match op {
                    BinOp::Add => l.wrapping_add(r),
                    BinOp::Sub => l.wrapping_sub(r),
                    BinOp::Mul => l.wrapping_mul(r),
                    BinOp::Div => l.checked_div(r)?,
                    BinOp::Mod => l.checked_rem(r)?,
                    BinOp::Shl => l.wrapping_shl(r as u32),
                    BinOp::Shr => l.wrapping_shr(r as u32),
                    BinOp::BitAnd => l & r,
                    BinOp::BitOr => l | r,
                    BinOp::BitXor => l ^ r,
                    BinOp::Eq => (l == r) as i64,
                    BinOp::Ne => (l != r) as i64,
                    BinOp::Lt => (l < r) as i64,
                    BinOp::Le => (l <= r) as i64,
                    BinOp::Gt => (l > r) as i64,
                    BinOp::Ge => (l >= r) as i64,
                    BinOp::And => (l != 0 && r != 0) as i64,
                    BinOp::Or => (l != 0 || r != 0) as i64,
                };
                Some(value)
            }
            _ => None,
        }
    }
}

/// All node kinds: C declarations, statements, expressions and WASM-form instructions
#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    // Declarations
    TranslationUnit {
        declarations: Vec<AstNode>,
    },
    FunctionDecl {
        name: String,
        return_type: Type,
        params: Vec<Param>,
        /// `None` for a prototype; otherwise a `Compound` node
        body: Option<Box<AstNode>>,
    },
    VarDecl {
        name: String,
        var_type: Type,
        init: Option<Box<AstNode>>,
    },
    StructDecl {
        name: String,
        fields: Vec<Field>,
    },
    UnionDecl {
        name: String,
        fields: Vec<Field>,
    },
    EnumDecl {
        name: String,
        constants: Vec<EnumConstant>,
    },
    TypedefDecl {
        name: String,
        target: Type,
    },

    // Statements
    Compound {
        statements: Vec<AstNode>,
    },
    /// Several declarations from one declaration statement, in the enclosing scope
    DeclStmt {
        declarations: Vec<AstNode>,
    },
    If {
        condition: Box<AstNode>,
        then_branch: Box<AstNode>,
        else_branch: Option<Box<AstNode>>,
    },
    While {
        condition: Box<AstNode>,
        body: Box<AstNode>,
    },
    DoWhile {
        body: Box<AstNode>,
        condition: Box<AstNode>,
    },
    For {
        init: Option<Box<AstNode>>,
        condition: Option<Box<AstNode>>,
        increment: Option<Box<AstNode>>,
        body: Box<AstNode>,
    },
    Switch {
        expr: Box<AstNode>,
        cases: Vec<SwitchCase>,
    },
    Return {
        expr: Option<Box<AstNode>>,
    },
    Break,
    Continue,
    ExprStmt {
        expr: Box<AstNode>,
    },
    Empty,

    // Expressions
    Identifier(String),
    IntLiteral(i64),
    FloatLiteral(f64),
    CharLiteral(u8),
    StringLiteral(String),
    Binary {
        op: BinOp,
        left: Box<AstNode>,
        right: Box<AstNode>,
    },
    Unary {
        op: UnOp,
        operand: Box<AstNode>,
    },
    /// `target = value`, or `target op= value` when `op` is set
    Assign {
        op: Option<BinOp>,
        target: Box<AstNode>,
        value: Box<AstNode>,
    },
    Ternary {
        condition: Box<AstNode>,
        then_expr: Box<AstNode>,
        else_expr: Box<AstNode>,
    },
    Call {
        callee: Box<AstNode>,
        args: Vec<AstNode>,
    },
    Index {
        array: Box<AstNode>,
        index: Box<AstNode>,
    },
    Member {
        object: Box<AstNode>,
        member: String,
    },
    PtrMember {
        object: Box<AstNode>,
        member: String,
    },
    Cast {
        target_type: Type,
        expr: Box<AstNode>,
    },
    SizeofType(Type),
    SizeofExpr(Box<AstNode>),

    // WASM-form instruction (folded operands)
    Wasm(WasmInstr),
}

impl NodeKind {
    /// Human-readable name of the kind, used in diagnostics
    pub fn name(&self) -> &'static str {
        match self {
            NodeKind::TranslationUnit { .. } => "translation unit",
            NodeKind::FunctionDecl { .. } => "function declaration",
            NodeKind::VarDecl { .. } => "variable declaration",
            NodeKind::StructDecl { .. } => "struct declaration",
            NodeKind::UnionDecl { .. } => "union declaration",
            NodeKind::EnumDecl { .. } => "enum declaration",
            NodeKind::TypedefDecl { .. } => "typedef",
            NodeKind::Compound { .. } => "compound statement",
            NodeKind::DeclStmt { .. } => "declaration statement",
            NodeKind::If { .. } => "if statement",
            NodeKind::While { .. } => "while loop",
            NodeKind::DoWhile { .. } => "do-while loop",
            NodeKind::For { .. } => "for loop",
            NodeKind::Switch { .. } => "switch statement",
            NodeKind::Return { .. } => "return statement",
            NodeKind::Break => "break",
            NodeKind::Continue => "continue",
            NodeKind::ExprStmt { .. } => "expression statement",
            NodeKind::Empty => "empty statement",
            NodeKind::Identifier(_) => "identifier",
            NodeKind::IntLiteral(_) => "integer literal",
            NodeKind::FloatLiteral(_) => "floating-point literal",
            NodeKind::CharLiteral(_) => "character literal",
            NodeKind::StringLiteral(_) => "string literal",
            NodeKind::Binary { .. } => "binary expression",
            NodeKind::Unary { .. } => "unary expression",
            NodeKind::Assign { .. } => "assignment",
            NodeKind::Ternary { .. } => "conditional expression",
            NodeKind::Call { .. } => "function call",
            NodeKind::Index { .. } => "array subscript",
            NodeKind::Member { .. } => "member access",
            NodeKind::PtrMember { .. } => "pointer member access",
            NodeKind::Cast { .. } => "cast",
            NodeKind::SizeofType(_) => "sizeof type",
            NodeKind::SizeofExpr(_) => "sizeof expression",
            NodeKind::Wasm(instr) => instr.op.name(),
        }
    }
}

/// Finds a function definition (with body) by name in a translation unit
pub fn find_function<'a>(unit: &'a AstNode, name: &str) -> Option<&'a AstNode> {
    match &unit.kind {
        NodeKind::TranslationUnit { declarations } => declarations.iter().find(|decl| {
            matches!(&decl.kind, NodeKind::FunctionDecl { name: n, body: Some(_), .. } if n == name)
        }),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_element_type_of_array_and_pointer() {
        let arr = Type::int().with_array(Some(3)).with_array(Some(4));
        let row = arr.element_type().unwrap();
        assert_eq!(row.array_dims, vec![Some(4)]);
        assert_eq!(row.element_type().unwrap(), Type::int());

        let ptr = Type::new(BaseType::Char).with_pointer();
        assert_eq!(ptr.element_type().unwrap(), Type::new(BaseType::Char));
        assert!(Type::int().element_type().is_none());
    }

    #[test]
    fn test_array_decays_to_pointer() {
        let arr = Type::int().with_array(Some(5));
        let decayed = arr.decayed();
        assert!(decayed.is_pointer());
        assert_eq!(decayed.to_string(), "int*");
    }

    #[test]
    fn test_find_function_skips_prototypes() {
        let loc = SourceLocation::new(1, 1);
        let proto = AstNode::new(
            NodeKind::FunctionDecl {
                name: "main".into(),
                return_type: Type::int(),
                params: vec![],
                body: None,
            },
            loc,
        );
        let def = AstNode::new(
            NodeKind::FunctionDecl {
                name: "main".into(),
                return_type: Type::int(),
                params: vec![],
                body: Some(AstNode::new(NodeKind::Compound { statements: vec![] }, loc).boxed()),
            },
            SourceLocation::new(2, 1),
        );
        let unit = AstNode::new(
            NodeKind::TranslationUnit {
                declarations: vec![proto, def],
            },
            loc,
        );
        let found = find_function(&unit, "main").unwrap();
        assert_eq!(found.location.line, 2);
    }
}
