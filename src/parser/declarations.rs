//! Declaration parsing implementation
//!
//! This module handles parsing of declarations:
//!
//! - Function definitions and prototypes: `type name(params) { ... }` / `type name(params);`
//! - Variables, several declarators per declaration: `int a, *b = 0, c[4];`
//! - Record definitions: `struct Name { ... };`, `union Name { ... };`
//! - Enumerations: `enum Color { RED, GREEN = 4 };`
//! - Type aliases: `typedef unsigned long size_t;`
//!
//! # Grammar
//!
//! ```text
//! declaration ::= specifiers (declarator ("=" expr)? ("," declarator ("=" expr)?)*)? ";"
//!               | specifiers declarator "(" params ")" (block | ";")
//! specifiers  ::= (qualifier | storage | type_keyword | record | enum | typedef_name)+
//! declarator  ::= "*"* identifier ("[" const_expr? "]")*
//! ```
//!
//! All parsing methods are implemented as `pub(crate)` methods on the [`Parser`] struct.

use crate::parser::ast::*;
use crate::parser::lexer::TokenKind;
use crate::parser::parse::{ParseError, Parser};

impl Parser {
    /// Parse a top-level declaration; one source declaration may yield several nodes
    pub(crate) fn parse_top_level_declaration(&mut self) -> Result<Vec<AstNode>, ParseError> {
        if self.match_token(&TokenKind::Typedef) {
            return self.parse_typedef();
        }

        let mut nodes = Vec::new();
        let base = self.parse_declaration_specifiers(&mut nodes)?;

        if self.match_token(&TokenKind::Semicolon) {
            return Ok(nodes);
        }

        loop {
            let (var_type, name, loc) = self.parse_declarator(&base, false)?;

            if self.check(&TokenKind::LParen) {
                if !nodes.iter().all(|n| is_type_definition(n)) || var_type.is_array() {
                    return Err(ParseError::new("Unexpected function declarator", loc));
                }
                nodes.push(self.parse_function_rest(name, var_type, loc)?);
                return Ok(nodes);
            }

            nodes.push(self.parse_var_decl_rest(name, var_type, loc)?);

            if !self.match_token(&TokenKind::Comma) {
                break;
            }
        }

        self.expect_semicolon("after declaration")?;
        Ok(nodes)
    }

    /// Parse a declaration inside a function body (after `for (` too).
    /// Consumes the trailing `;`.
    pub(crate) fn parse_local_declaration(&mut self) -> Result<AstNode, ParseError> {
        let loc = self.current_location();
        let mut nodes = if self.match_token(&TokenKind::Typedef) {
            self.parse_typedef()?
        } else {
            let mut nodes = Vec::new();
            let base = self.parse_declaration_specifiers(&mut nodes)?;
            if !self.check(&TokenKind::Semicolon) {
                loop {
                    let (var_type, name, var_loc) = self.parse_declarator(&base, false)?;
                    if self.check(&TokenKind::LParen) {
                        return Err(self.error_here("Nested function declarations are not supported"));
                    }
                    nodes.push(self.parse_var_decl_rest(name, var_type, var_loc)?);
                    if !self.match_token(&TokenKind::Comma) {
                        break;
                    }
                }
            }
            self.expect_semicolon("after declaration")?;
            nodes
        };

        Ok(match nodes.len() {
            0 => AstNode::new(NodeKind::Empty, loc),
            1 => nodes.remove(0),
            _ => AstNode::new(NodeKind::DeclStmt { declarations: nodes }, loc),
        })
    }

    /// Parse `typedef specifiers declarator (, declarator)* ;` (after the keyword)
    fn parse_typedef(&mut self) -> Result<Vec<AstNode>, ParseError> {
        let mut nodes = Vec::new();
        let base = self.parse_declaration_specifiers(&mut nodes)?;

        loop {
            let (target, name, loc) = self.parse_declarator(&base, false)?;
            self.typedefs.insert(name.clone());
            nodes.push(AstNode::new(NodeKind::TypedefDecl { name, target }, loc));
            if !self.match_token(&TokenKind::Comma) {
                break;
            }
        }

        self.expect_semicolon("after typedef")?;
        Ok(nodes)
    }

    fn parse_var_decl_rest(
        &mut self,
        name: String,
        var_type: Type,
        loc: SourceLocation,
    ) -> Result<AstNode, ParseError> {
        if var_type.base == BaseType::Void && var_type.pointer_depth == 0 {
            return Err(ParseError::new(
                format!("Variable '{}' declared void", name),
                loc,
            ));
        }
        let init = if self.match_token(&TokenKind::Eq) {
            if self.check(&TokenKind::LBrace) {
                return Err(self.error_here("Initializer lists are not supported"));
            }
            Some(Box::new(self.parse_expression()?))
        } else {
            None
        };
        Ok(AstNode::new(NodeKind::VarDecl { name, var_type, init }, loc))
    }

    /// Parse the parameter list and body (or `;`) of a function declarator
    fn parse_function_rest(
        &mut self,
        name: String,
        return_type: Type,
        loc: SourceLocation,
    ) -> Result<AstNode, ParseError> {
        self.expect_token(&TokenKind::LParen, "Expected '(' after function name")?;
        let params = self.parse_parameter_list()?;
        self.expect_rparen("after parameters")?;

        let body = if self.match_token(&TokenKind::Semicolon) {
            None
        } else if self.check(&TokenKind::LBrace) {
            Some(Box::new(self.parse_compound_statement()?))
        } else {
            return Err(self.error_here(format!(
                "Expected '{{' or ';' after function declarator, found {}",
                self.peek()
            )));
        };

        Ok(AstNode::new(
            NodeKind::FunctionDecl {
                name,
                return_type,
                params,
                body,
            },
            loc,
        ))
    }

    /// Parse parameter list: (type name, type name, ...)
    pub(crate) fn parse_parameter_list(&mut self) -> Result<Vec<Param>, ParseError> {
        let mut params = Vec::new();

        if self.check(&TokenKind::RParen) {
            return Ok(params);
        }

        // Special case: (void) means no parameters in C
        if self.check(&TokenKind::Void) && self.check_ahead(1, &TokenKind::RParen) {
            self.advance();
            return Ok(params);
        }

        loop {
            if self.match_token(&TokenKind::Ellipsis) {
                // Variadic tail: extra arguments are accepted and evaluated by callers
                break;
            }
            let mut definitions = Vec::new();
            let base = self.parse_declaration_specifiers(&mut definitions)?;
            if !definitions.is_empty() {
                return Err(self.error_here("Type definitions are not allowed in parameter lists"));
            }
            let (param_type, name, _) = self.parse_declarator(&base, true)?;
            params.push(Param {
                name,
                param_type: param_type.decayed(),
            });

            if !self.match_token(&TokenKind::Comma) {
                break;
            }
        }

        Ok(params)
    }

    /// Parse declaration specifiers into a base type. Record and enum bodies
    /// met on the way are appended to `definitions` (innermost first).
    pub(crate) fn parse_declaration_specifiers(
        &mut self,
        definitions: &mut Vec<AstNode>,
    ) -> Result<Type, ParseError> {
        let start = self.current_location();
        let mut base: Option<BaseType> = None;
        let mut is_const = false;
        let mut is_unsigned = false;
        let mut is_signed = false;
        let mut saw_short = false;
        let mut long_count = 0u32;

        loop {
            let kind = self.peek().kind.clone();
            match kind {
                TokenKind::Const => is_const = true,
                TokenKind::Volatile | TokenKind::Static | TokenKind::Extern => {}
                TokenKind::Unsigned => is_unsigned = true,
                TokenKind::Signed => is_signed = true,
                TokenKind::Short => saw_short = true,
                TokenKind::Long => long_count += 1,
                TokenKind::Int
                | TokenKind::Char
                | TokenKind::Void
                | TokenKind::Float
                | TokenKind::Double
                | TokenKind::Bool
                    if base.is_none() =>
                {
                    base = Some(match kind {
                        TokenKind::Int => BaseType::Int,
                        TokenKind::Char => BaseType::Char,
                        TokenKind::Void => BaseType::Void,
                        TokenKind::Float => BaseType::Float,
                        TokenKind::Double => BaseType::Double,
                        _ => BaseType::Bool,
                    });
                }
                TokenKind::Struct | TokenKind::Union if base.is_none() => {
                    self.advance();
                    base = Some(self.parse_record_specifier(kind == TokenKind::Union, definitions)?);
                    continue;
                }
                TokenKind::Enum if base.is_none() => {
                    self.advance();
                    base = Some(self.parse_enum_specifier(definitions)?);
                    continue;
                }
                TokenKind::Identifier(ref name)
                    if base.is_none()
                        && !saw_short
                        && long_count == 0
                        && !is_signed
                        && !is_unsigned
                        && self.typedefs.contains(name) =>
                {
                    base = Some(BaseType::Named(name.clone()));
                }
                _ => break,
            }
            self.advance();
        }

        let base = match (base, saw_short, long_count) {
            (None | Some(BaseType::Int), true, _) => BaseType::Short,
            (None | Some(BaseType::Int), false, 1..) => BaseType::Long,
            (Some(BaseType::Double), false, _) => BaseType::Double,
            (Some(base), false, 0) => base,
            (None, false, 0) if is_signed || is_unsigned => BaseType::Int,
            (None, false, 0) => {
                return Err(ParseError::new(
                    format!("Expected type, found {}", self.peek()),
                    start,
                ));
            }
            (Some(other), _, _) => {
                return Err(ParseError::new(
                    format!("Invalid type specifier combination with {:?}", other),
                    start,
                ));
            }
        };

        let mut ty = Type::new(base);
        ty.is_const = is_const;
        ty.is_unsigned = is_unsigned;
        Ok(ty)
    }

    /// Parse `[name] [{ fields }]` after `struct`/`union`
    fn parse_record_specifier(
        &mut self,
        is_union: bool,
        definitions: &mut Vec<AstNode>,
    ) -> Result<BaseType, ParseError> {
        let loc = self.previous_location();
        let name = match &self.peek().kind {
            TokenKind::Identifier(name) => {
                let name = name.clone();
                self.advance();
                Some(name)
            }
            _ => None,
        };

        if !self.match_token(&TokenKind::LBrace) {
            let name = name.ok_or_else(|| self.error_here("Expected record name or '{'"))?;
            return Ok(if is_union {
                BaseType::Union(name)
            } else {
                BaseType::Struct(name)
            });
        }

        let name = match name {
            Some(name) => name,
            None => self.next_anonymous_name(),
        };

        let mut fields = Vec::new();
        while !self.check(&TokenKind::RBrace) {
            if self.is_at_end() {
                return Err(self.error_here("Unterminated record definition"));
            }
            let base = self.parse_declaration_specifiers(definitions)?;
            loop {
                let (field_type, field_name, field_loc) = self.parse_declarator(&base, false)?;
                if fields.iter().any(|f: &Field| f.name == field_name) {
                    return Err(ParseError::new(
                        format!("Duplicate member '{}'", field_name),
                        field_loc,
                    ));
                }
                fields.push(Field {
                    name: field_name,
                    field_type,
                });
                if !self.match_token(&TokenKind::Comma) {
                    break;
                }
            }
            self.expect_semicolon("after record member")?;
        }
        self.expect_token(&TokenKind::RBrace, "Expected '}' after record members")?;

        let kind = if is_union {
            NodeKind::UnionDecl {
                name: name.clone(),
                fields,
            }
        } else {
            NodeKind::StructDecl {
                name: name.clone(),
                fields,
            }
        };
        definitions.push(AstNode::new(kind, loc));

        Ok(if is_union {
            BaseType::Union(name)
        } else {
            BaseType::Struct(name)
        })
    }

    /// Parse `[name] [{ A, B = expr, ... }]` after `enum`
    fn parse_enum_specifier(&mut self, definitions: &mut Vec<AstNode>) -> Result<BaseType, ParseError> {
        let loc = self.previous_location();
        let name = match &self.peek().kind {
            TokenKind::Identifier(name) => {
                let name = name.clone();
                self.advance();
                Some(name)
            }
            _ => None,
        };

        if !self.match_token(&TokenKind::LBrace) {
            let name = name.ok_or_else(|| self.error_here("Expected enum name or '{'"))?;
            return Ok(BaseType::Enum(name));
        }
        let name = match name {
            Some(name) => name,
            None => self.next_anonymous_name(),
        };

        let mut constants = Vec::new();
        while !self.check(&TokenKind::RBrace) {
            let constant = self.expect_identifier()?;
            let value = if self.match_token(&TokenKind::Eq) {
                Some(Box::new(self.parse_conditional_expression()?))
            } else {
                None
            };
            constants.push(EnumConstant {
                name: constant,
                value,
            });
            if !self.match_token(&TokenKind::Comma) {
                break;
            }
        }
        self.expect_token(&TokenKind::RBrace, "Expected '}' after enumerators")?;

        definitions.push(AstNode::new(
            NodeKind::EnumDecl {
                name: name.clone(),
                constants,
            },
            loc,
        ));
        Ok(BaseType::Enum(name))
    }

    /// Parse `"*"* identifier ("[" size? "]")*`. With `allow_abstract`, the
    /// identifier may be omitted (prototype parameters, type names).
    pub(crate) fn parse_declarator(
        &mut self,
        base: &Type,
        allow_abstract: bool,
    ) -> Result<(Type, String, SourceLocation), ParseError> {
        let mut ty = base.clone();
        while self.match_token(&TokenKind::Star) {
            ty.pointer_depth += 1;
            while self.match_token(&TokenKind::Const) || self.match_token(&TokenKind::Volatile) {}
        }

        let loc = self.current_location();
        let name = match &self.peek().kind {
            TokenKind::Identifier(name) => {
                let name = name.clone();
                self.advance();
                name
            }
            _ if allow_abstract => String::new(),
            _ => {
                return Err(self.error_here(format!(
                    "Expected identifier in declarator, found {}",
                    self.peek()
                )));
            }
        };

        self.parse_array_suffixes(&mut ty)?;
        Ok((ty, name, loc))
    }

    /// Parse a type name as used by casts and `sizeof(type)`
    pub(crate) fn parse_type_name(&mut self) -> Result<Type, ParseError> {
        let mut definitions = Vec::new();
        let base = self.parse_declaration_specifiers(&mut definitions)?;
        if !definitions.is_empty() {
            return Err(self.error_here("Type definitions are not allowed in a type name"));
        }
        let (ty, name, loc) = self.parse_declarator(&base, true)?;
        if !name.is_empty() {
            return Err(ParseError::new(format!("Unexpected identifier '{}' in type name", name), loc));
        }
        Ok(ty)
    }

    fn parse_array_suffixes(&mut self, ty: &mut Type) -> Result<(), ParseError> {
        while self.match_token(&TokenKind::LBracket) {
            if self.match_token(&TokenKind::RBracket) {
                // Unsized array []
                ty.array_dims.push(None);
                continue;
            }
            let size_loc = self.current_location();
            let size_expr = self.parse_conditional_expression()?;
            let size = size_expr
                .constant_value()
                .filter(|n| *n > 0)
                .and_then(|n| u32::try_from(n).ok())
                .ok_or_else(|| {
                    ParseError::new("Array size must be a positive constant integer", size_loc)
                })?;
            ty.array_dims.push(Some(size));
            self.expect_token(&TokenKind::RBracket, "Expected ']' after array size")?;
        }
        Ok(())
    }
}

fn is_type_definition(node: &AstNode) -> bool {
    matches!(
        node.kind,
        NodeKind::StructDecl { .. } | NodeKind::UnionDecl { .. } | NodeKind::EnumDecl { .. }
    )
}
