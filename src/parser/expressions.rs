//! Expression parsing implementation
//!
//! This module handles parsing of C expressions using precedence climbing
//! for binary operators and recursive descent for other expression forms.
//!
//! # Supported Expressions
//!
//! - Literals: integers, floats, characters, strings (adjacent strings concatenate)
//! - Identifiers and variables
//! - Binary operators: arithmetic, comparison, logical, bitwise
//! - Assignment: `=` and the compound forms `+= -= *= /= %= &= |= ^= <<= >>=`
//! - Unary operators: `-`, `+`, `!`, `~`, `&`, `*`, `++`, `--`
//! - Postfix: `[]`, `.`, `->`, `()`, `++`, `--`
//! - Ternary: `? :`
//! - Type casts: `(type)expr`
//! - `sizeof` operator
//!
//! # Precedence
//!
//! Every infix operator has one entry in [`infix_operator`]: a precedence
//! (higher binds tighter) and an associativity. Assignment and `?:` are
//! right-associative, everything else left-associative.
//!
//! All parsing methods are implemented as `pub(crate)` methods on the [`Parser`] struct.

use crate::parser::ast::*;
use crate::parser::lexer::TokenKind;
use crate::parser::parse::{ParseError, Parser};

/// Operator associativity
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Assoc {
    Left,
    Right,
}

/// What an infix operator builds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Infix {
    /// `=` (None) or a compound assignment
    Assign(Option<BinOp>),
    /// `? :`
    Conditional,
    Binary(BinOp),
}

pub const PREC_ASSIGN: u8 = 1;
pub const PREC_TERNARY: u8 = 2;

/// The precedence table
pub fn infix_operator(kind: &TokenKind) -> Option<(u8, Assoc, Infix)> {
    use Assoc::*;
    let entry = match kind {
        TokenKind::Eq => (PREC_ASSIGN, Right, Infix::Assign(None)),
        TokenKind::PlusEq => (PREC_ASSIGN, Right, Infix::Assign(Some(BinOp::Add))),
        TokenKind::MinusEq => (PREC_ASSIGN, Right, Infix::Assign(Some(BinOp::Sub))),
        TokenKind::StarEq => (PREC_ASSIGN, Right, Infix::Assign(Some(BinOp::Mul))),
        TokenKind::SlashEq => (PREC_ASSIGN, Right, Infix::Assign(Some(BinOp::Div))),
        TokenKind::PercentEq => (PREC_ASSIGN, Right, Infix::Assign(Some(BinOp::Mod))),
        TokenKind::AmpEq => (PREC_ASSIGN, Right, Infix::Assign(Some(BinOp::BitAnd))),
        TokenKind::PipeEq => (PREC_ASSIGN, Right, Infix::Assign(Some(BinOp::BitOr))),
        TokenKind::CaretEq => (PREC_ASSIGN, Right, Infix::Assign(Some(BinOp::BitXor))),
        TokenKind::LtLtEq => (PREC_ASSIGN, Right, Infix::Assign(Some(BinOp::Shl))),
        TokenKind::GtGtEq => (PREC_ASSIGN, Right, Infix::Assign(Some(BinOp::Shr))),
        TokenKind::Question => (PREC_TERNARY, Right, Infix::Conditional),
        TokenKind::OrOr => (3, Left, Infix::Binary(BinOp::Or)),
        TokenKind::AndAnd => (4, Left, Infix::Binary(BinOp::And)),
        TokenKind::Pipe => (5, Left, Infix::Binary(BinOp::BitOr)),
        TokenKind::Caret => (6, Left, Infix::Binary(BinOp::BitXor)),
        TokenKind::Amp => (7, Left, Infix::Binary(BinOp::BitAnd)),
        TokenKind::EqEq => (8, Left, Infix::Binary(BinOp::Eq)),
        TokenKind::NotEq => (8, Left, Infix::Binary(BinOp::Ne)),
        TokenKind::Lt => (9, Left, Infix::Binary(BinOp::Lt)),
        TokenKind::Le => (9, Left, Infix::Binary(BinOp::Le)),
        TokenKind::Gt => (9, Left, Infix::Binary(BinOp::Gt)),
        TokenKind::Ge => (9, Left, Infix::Binary(BinOp::Ge)),
        TokenKind::LtLt => (10, Left, Infix::Binary(BinOp::Shl)),
        TokenKind::GtGt => (10, Left, Infix::Binary(BinOp::Shr)),
        TokenKind::Plus => (11, Left, Infix::Binary(BinOp::Add)),
        TokenKind::Minus => (11, Left, Infix::Binary(BinOp::Sub)),
        TokenKind::Star => (12, Left, Infix::Binary(BinOp::Mul)),
        TokenKind::Slash => (12, Left, Infix::Binary(BinOp::Div)),
        TokenKind::Percent => (12, Left, Infix::Binary(BinOp::Mod)),
        _ => return None,
    };
    Some(entry)
}

fn is_lvalue(node: &AstNode) -> bool {
    match &node.kind {
        NodeKind::Identifier(_)
        | NodeKind::Index { .. }
        | NodeKind::Member { .. }
        | NodeKind::PtrMember { .. } => true,
        NodeKind::Unary { op, .. } => *op == UnOp::Deref,
        _ => false,
    }
}

impl Parser {
    /// Parse expression (top-level entry point, includes assignment)
    pub(crate) fn parse_expression(&mut self) -> Result<AstNode, ParseError> {
        self.parse_binary_expression(PREC_ASSIGN)
    }

    /// Parse an expression without assignment (case labels, array sizes, enumerators)
    pub(crate) fn parse_conditional_expression(&mut self) -> Result<AstNode, ParseError> {
        self.parse_binary_expression(PREC_TERNARY)
    }

    /// Precedence climbing: fold every operator whose precedence is at least `min_prec`
    pub(crate) fn parse_binary_expression(&mut self, min_prec: u8) -> Result<AstNode, ParseError> {
        let mut left = self.parse_unary()?;

        while let Some((prec, assoc, infix)) = infix_operator(&self.peek().kind) {
            if prec < min_prec {
                break;
            }
            self.advance();
            let loc = self.previous_location();
            let next_min = match assoc {
                Assoc::Left => prec + 1,
                Assoc::Right => prec,
            };

            left = match infix {
                Infix::Assign(op) => {
                    if !is_lvalue(&left) {
                        return Err(ParseError::new(
                            format!("Invalid assignment target: {}", left.kind.name()),
                            loc,
                        ));
                    }
                    let value = self.parse_binary_expression(next_min)?;
                    AstNode::new(
                        NodeKind::Assign {
                            op,
                            target: Box::new(left),
                            value: Box::new(value),
                        },
                        loc,
                    )
                }
                Infix::Conditional => {
                    let then_expr = self.parse_expression()?;
                    self.expect_token(&TokenKind::Colon, "Expected ':' in ternary expression")?;
                    let else_expr = self.parse_binary_expression(next_min)?;
                    AstNode::new(
                        NodeKind::Ternary {
                            condition: Box::new(left),
                            then_expr: Box::new(then_expr),
                            else_expr: Box::new(else_expr),
                        },
                        loc,
                    )
                }
                Infix::Binary(op) => {
                    let right = self.parse_binary_expression(next_min)?;
                    AstNode::new(
                        NodeKind::Binary {
                            op,
                            left: Box::new(left),
                            right: Box::new(right),
                        },
                        loc,
                    )
                }
            };
        }

        Ok(left)
    }

    /// Parse unary operators, casts and `sizeof`
    fn parse_unary(&mut self) -> Result<AstNode, ParseError> {
        let loc = self.current_location();

        let prefix = match self.peek().kind {
            TokenKind::Minus => Some(UnOp::Neg),
            TokenKind::Bang => Some(UnOp::Not),
            TokenKind::Tilde => Some(UnOp::BitNot),
            TokenKind::Star => Some(UnOp::Deref),
            TokenKind::Amp => Some(UnOp::AddrOf),
            TokenKind::PlusPlus => Some(UnOp::PreInc),
            TokenKind::MinusMinus => Some(UnOp::PreDec),
            _ => None,
        };

        if let Some(op) = prefix {
            self.advance();
            let operand = self.parse_unary()?;
            if matches!(op, UnOp::PreInc | UnOp::PreDec | UnOp::AddrOf) && !is_lvalue(&operand) {
                return Err(ParseError::new(
                    format!("Operand of '{}' must be an lvalue", self.describe_unary(op)),
                    loc,
                ));
            }
            return Ok(AstNode::new(
                NodeKind::Unary {
                    op,
                    operand: Box::new(operand),
                },
                loc,
            ));
        }

        if self.match_token(&TokenKind::Plus) {
            // Unary plus is the identity on arithmetic operands
            return self.parse_unary();
        }

        if self.match_token(&TokenKind::Sizeof) {
            let parenthesized_type = self.check(&TokenKind::LParen)
                && self
                    .peek_ahead(1)
                    .is_some_and(|t| self.is_type_start(&t.kind));
            if parenthesized_type {
                self.advance();
                let ty = self.parse_type_name()?;
                self.expect_rparen("after sizeof type")?;
                return Ok(AstNode::new(NodeKind::SizeofType(ty), loc));
            }
            let operand = self.parse_unary()?;
            return Ok(AstNode::new(NodeKind::SizeofExpr(Box::new(operand)), loc));
        }

        // Cast: '(' type-name ')' unary
        let is_cast = self.check(&TokenKind::LParen)
            && self
                .peek_ahead(1)
                .is_some_and(|t| self.is_type_start(&t.kind));
        if is_cast {
            self.advance();
            let target_type = self.parse_type_name()?;
            self.expect_rparen("after cast type")?;
            let expr = self.parse_unary()?;
            return Ok(AstNode::new(
                NodeKind::Cast {
                    target_type,
                    expr: Box::new(expr),
                },
                loc,
            ));
        }

        self.parse_postfix()
    }

    fn describe_unary(&self, op: UnOp) -> &'static str {
        match op {
            UnOp::PreInc | UnOp::PostInc => "++",
            UnOp::PreDec | UnOp::PostDec => "--",
            UnOp::AddrOf => "&",
            UnOp::Deref => "*",
            UnOp::Neg => "-",
            UnOp::Not => "!",
            UnOp::BitNot => "~",
        }
    }

    /// Parse postfix chains: calls, subscripts, member access, `++`/`--`
    fn parse_postfix(&mut self) -> Result<AstNode, ParseError> {
        let mut expr = self.parse_primary()?;

        loop {
            let loc = self.current_location();
            if self.match_token(&TokenKind::LParen) {
                let args = self.parse_argument_list()?;
                self.expect_rparen("after arguments")?;
                expr = AstNode::new(
                    NodeKind::Call {
                        callee: Box::new(expr),
                        args,
                    },
                    loc,
                );
            } else if self.match_token(&TokenKind::LBracket) {
                let index = self.parse_expression()?;
                self.expect_token(&TokenKind::RBracket, "Expected ']' after index")?;
                expr = AstNode::new(
                    NodeKind::Index {
                        array: Box::new(expr),
                        index: Box::new(index),
                    },
                    loc,
                );
            } else if self.match_token(&TokenKind::Dot) {
                let member = self.expect_identifier()?;
                expr = AstNode::new(
                    NodeKind::Member {
                        object: Box::new(expr),
                        member,
                    },
                    loc,
                );
            } else if self.match_token(&TokenKind::Arrow) {
                let member = self.expect_identifier()?;
                expr = AstNode::new(
                    NodeKind::PtrMember {
                        object: Box::new(expr),
                        member,
                    },
                    loc,
                );
            } else if self.check(&TokenKind::PlusPlus) || self.check(&TokenKind::MinusMinus) {
                let op = if self.check(&TokenKind::PlusPlus) {
                    UnOp::PostInc
                } else {
                    UnOp::PostDec
                };
                if !is_lvalue(&expr) {
                    return Err(self.error_here(format!(
                        "Operand of '{}' must be an lvalue",
                        self.describe_unary(op)
                    )));
                }
                self.advance();
                expr = AstNode::new(
                    NodeKind::Unary {
                        op,
                        operand: Box::new(expr),
                    },
                    loc,
                );
            } else {
                break;
            }
        }

        Ok(expr)
    }

    /// Parse function call arguments (after the opening parenthesis)
    fn parse_argument_list(&mut self) -> Result<Vec<AstNode>, ParseError> {
        let mut args = Vec::new();

        if self.check(&TokenKind::RParen) {
            return Ok(args);
        }

        loop {
            args.push(self.parse_expression()?);
            if !self.match_token(&TokenKind::Comma) {
                break;
            }
        }

        Ok(args)
    }

    /// Parse primary expressions: literals, identifiers, parenthesized expressions
    fn parse_primary(&mut self) -> Result<AstNode, ParseError> {
        let loc = self.current_location();
        let kind = self.peek().kind.clone();

        let node = match kind {
            TokenKind::IntLiteral(n) => {
                self.advance();
                NodeKind::IntLiteral(n)
            }
            TokenKind::FloatLiteral(x) => {
                self.advance();
                NodeKind::FloatLiteral(x)
            }
            TokenKind::CharLiteral(c) => {
                self.advance();
                NodeKind::CharLiteral(c)
            }
            TokenKind::StringLiteral(mut text) => {
                self.advance();
                // Adjacent string literals concatenate
                while let TokenKind::StringLiteral(next) = &self.peek().kind {
                    text.push_str(next);
                    self.advance();
                }
                NodeKind::StringLiteral(text)
            }
            TokenKind::Identifier(name) if name == "NULL" => {
                self.advance();
                NodeKind::Cast {
                    target_type: Type::new(BaseType::Void).with_pointer(),
                    expr: Box::new(AstNode::new(NodeKind::IntLiteral(0), loc)),
                }
            }
            TokenKind::Identifier(name) => {
                self.advance();
                NodeKind::Identifier(name)
            }
            TokenKind::LParen => {
                self.advance();
                let expr = self.parse_expression()?;
                self.expect_rparen("after expression")?;
                return Ok(expr);
            }
            other => {
                return Err(self.error_here(format!("Expected expression, found {}", other)));
            }
        };

        Ok(AstNode::new(node, loc))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn expr(source: &str) -> AstNode {
        let mut parser = Parser::new(source).unwrap();
        parser.parse_standalone_expression().unwrap()
    }

    fn render(node: &AstNode) -> String {
        match &node.kind {
            NodeKind::IntLiteral(n) => n.to_string(),
            NodeKind::Identifier(name) => name.clone(),
            NodeKind::Binary { op, left, right } => {
                format!("({} {} {})", render(left), op.symbol(), render(right))
            }
            NodeKind::Assign { op, target, value } => format!(
                "({} {}= {})",
                render(target),
                op.map(|o| o.symbol()).unwrap_or(""),
                render(value)
            ),
            NodeKind::Ternary { condition, then_expr, else_expr } => format!(
                "({} ? {} : {})",
                render(condition),
                render(then_expr),
                render(else_expr)
            ),
            NodeKind::Unary { op, operand } => format!("({:?} {})", op, render(operand)),
            NodeKind::Call { callee, args } => format!(
                "{}({})",
                render(callee),
                args.iter().map(render).collect::<Vec<_>>().join(", ")
            ),
            NodeKind::Index { array, index } => format!("{}[{}]", render(array), render(index)),
            NodeKind::PtrMember { object, member } => format!("{}->{}", render(object), member),
            NodeKind::Member { object, member } => format!("{}.{}", render(object), member),
            NodeKind::Cast { target_type, expr } => format!("(({}) {})", target_type, render(expr)),
            NodeKind::SizeofType(ty) => format!("sizeof({})", ty),
            other => other.name().to_string(),
        }
    }

    #[test]
    fn test_multiplication_binds_tighter() {
        assert_eq!(render(&expr("1+2*3")), "(1 + (2 * 3))");
    }

    #[test]
    fn test_left_associative_subtraction() {
        assert_eq!(render(&expr("10 - 4 - 3")), "((10 - 4) - 3)");
        assert_eq!(render(&expr("a << 1 << 2")), "((a << 1) << 2)");
    }

    #[test]
    fn test_assignment_is_right_associative() {
        assert_eq!(render(&expr("a = b += 2")), "(a = (b += 2))");
    }

    #[test]
    fn test_ternary_nests_to_the_right() {
        assert_eq!(
            render(&expr("a ? 1 : b ? 2 : 3")),
            "(a ? 1 : (b ? 2 : 3))"
        );
        assert_eq!(render(&expr("x = c ? 1 : 2")), "(x = (c ? 1 : 2))");
    }

    #[test]
    fn test_full_precedence_ladder() {
        assert_eq!(
            render(&expr("a || b && c | d ^ e & f == g < h << i + j * k")),
            "(a || (b && (c | (d ^ (e & (f == (g < (h << (i + (j * k))))))))))"
        );
    }

    #[test]
    fn test_postfix_chains() {
        assert_eq!(render(&expr("f(1, x)[2]->next.val")), "f(1, x)[2]->next.val");
        assert_eq!(render(&expr("-x++")), "(Neg (PostInc x))");
    }

    #[test]
    fn test_cast_and_sizeof() {
        assert_eq!(render(&expr("(char*)p")), "((char*) p)");
        assert_eq!(render(&expr("sizeof(int*)")), "sizeof(int*)");
        assert_eq!(render(&expr("NULL")), "((void*) 0)");
        assert!(matches!(expr("sizeof x").kind, NodeKind::SizeofExpr(_)));
        assert!(matches!(expr("sizeof (x)").kind, NodeKind::SizeofExpr(_)));
    }

    #[test]
    fn test_adjacent_strings_concatenate() {
        assert_eq!(
            expr("\"ab\" \"cd\"").kind,
            NodeKind::StringLiteral("abcd".to_string())
        );
    }

    #[test]
    fn test_invalid_assignment_target() {
        let mut parser = Parser::new("1 = 2").unwrap();
        let err = parser.parse_standalone_expression().unwrap_err();
        assert_eq!(err.message, "Invalid assignment target: integer literal");
        assert_eq!(err.location, SourceLocation::new(1, 3));
    }

    #[test]
    fn test_missing_operand() {
        let mut parser = Parser::new("1 + ;").unwrap();
        let err = parser.parse_standalone_expression().unwrap_err();
        assert_eq!(err.message, "Expected expression, found ';'");
    }
}
