//! Statement parsing implementation
//!
//! This module handles parsing of all C statement types:
//!
//! - Local declarations: `int x = 42, *p;`
//! - Control flow: `if`, `while`, `for`, `do-while`, `switch`
//! - Jump statements: `return`, `break`, `continue`
//! - Compound statements: `{ ... }`
//! - Expression statements: function calls, assignments
//!
//! # Grammar
//!
//! ```text
//! statement ::= declaration | if_stmt | while_stmt | for_stmt
//!             | do_while_stmt | switch_stmt | return_stmt
//!             | break_stmt | continue_stmt | block | expr_stmt | ";"
//! ```
//!
//! `else` binds to the nearest unmatched `if`.
//!
//! All parsing methods are implemented as `pub(crate)` methods on the [`Parser`] struct.

use crate::parser::ast::*;
use crate::parser::lexer::TokenKind;
use crate::parser::parse::{ParseError, Parser};

impl Parser {
    /// Parse `{ statement* }` into a `Compound` node
    pub(crate) fn parse_compound_statement(&mut self) -> Result<AstNode, ParseError> {
        let loc = self.current_location();
        self.expect_token(&TokenKind::LBrace, "Expected '{'")?;
        let statements = self.parse_block_statements()?;
        self.expect_token(&TokenKind::RBrace, "Expected '}' after block")?;
        Ok(AstNode::new(NodeKind::Compound { statements }, loc))
    }

    /// Parse block statements (inside braces, excluding the braces themselves)
    pub(crate) fn parse_block_statements(&mut self) -> Result<Vec<AstNode>, ParseError> {
        let mut statements = Vec::new();

        while !self.check(&TokenKind::RBrace) && !self.is_at_end() {
            statements.push(self.parse_statement()?);
        }

        Ok(statements)
    }

    /// Parse a statement
    pub(crate) fn parse_statement(&mut self) -> Result<AstNode, ParseError> {
        let loc = self.current_location();

        // Check for keywords first
        if self.match_token(&TokenKind::Return) {
            return self.parse_return_statement();
        }

        if self.match_token(&TokenKind::If) {
            return self.parse_if_statement();
        }

        if self.match_token(&TokenKind::While) {
            return self.parse_while_statement();
        }

        if self.match_token(&TokenKind::Do) {
            return self.parse_do_while_statement();
        }

        if self.match_token(&TokenKind::For) {
            return self.parse_for_statement();
        }

        if self.match_token(&TokenKind::Switch) {
            return self.parse_switch_statement();
        }

        if self.match_token(&TokenKind::Break) {
            self.expect_semicolon("after 'break'")?;
            return Ok(AstNode::new(NodeKind::Break, loc));
        }

        if self.match_token(&TokenKind::Continue) {
            self.expect_semicolon("after 'continue'")?;
            return Ok(AstNode::new(NodeKind::Continue, loc));
        }

        if self.check(&TokenKind::Goto) {
            return Err(self.error_here("'goto' is not supported"));
        }

        if self.check(&TokenKind::Case) || self.check(&TokenKind::Default) {
            return Err(self.error_here(format!("{} label outside of switch", self.peek())));
        }

        if self.check(&TokenKind::LBrace) {
            return self.parse_compound_statement();
        }

        if self.match_token(&TokenKind::Semicolon) {
            return Ok(AstNode::new(NodeKind::Empty, loc));
        }

        if self.at_type_start() {
            return self.parse_local_declaration();
        }

        // Otherwise, it's an expression statement
        let expr = self.parse_expression()?;
        self.expect_semicolon("after expression")?;
        Ok(AstNode::new(
            NodeKind::ExprStmt {
                expr: Box::new(expr),
            },
            loc,
        ))
    }

    /// Parse return statement
    fn parse_return_statement(&mut self) -> Result<AstNode, ParseError> {
        let loc = self.previous_location();

        let expr = if self.check(&TokenKind::Semicolon) {
            None
        } else {
            Some(Box::new(self.parse_expression()?))
        };

        self.expect_semicolon("after return")?;

        Ok(AstNode::new(NodeKind::Return { expr }, loc))
    }

    /// Parse if statement
    fn parse_if_statement(&mut self) -> Result<AstNode, ParseError> {
        let loc = self.previous_location();

        self.expect_token(&TokenKind::LParen, "Expected '(' after 'if'")?;
        let condition = Box::new(self.parse_expression()?);
        self.expect_rparen("after if condition")?;

        let then_branch = Box::new(self.parse_statement()?);

        let else_branch = if self.match_token(&TokenKind::Else) {
            Some(Box::new(self.parse_statement()?))
        } else {
            None
        };

        Ok(AstNode::new(
            NodeKind::If {
                condition,
                then_branch,
                else_branch,
            },
            loc,
        ))
    }

    /// Parse while statement
    fn parse_while_statement(&mut self) -> Result<AstNode, ParseError> {
        let loc = self.previous_location();

        self.expect_token(&TokenKind::LParen, "Expected '(' after 'while'")?;
        let condition = Box::new(self.parse_expression()?);
        self.expect_rparen("after while condition")?;

        let body = Box::new(self.parse_statement()?);

        Ok(AstNode::new(NodeKind::While { condition, body }, loc))
    }

    /// Parse do-while statement
    fn parse_do_while_statement(&mut self) -> Result<AstNode, ParseError> {
        let loc = self.previous_location();

        let body = Box::new(self.parse_statement()?);

        self.expect_token(&TokenKind::While, "Expected 'while' after do body")?;
        self.expect_token(&TokenKind::LParen, "Expected '(' after 'while'")?;
        let condition = Box::new(self.parse_expression()?);
        self.expect_rparen("after do-while condition")?;
        self.expect_semicolon("after do-while")?;

        Ok(AstNode::new(NodeKind::DoWhile { body, condition }, loc))
    }

    /// Parse for statement
    fn parse_for_statement(&mut self) -> Result<AstNode, ParseError> {
        let loc = self.previous_location();

        self.expect_token(&TokenKind::LParen, "Expected '(' after 'for'")?;

        // Init (optional)
        let init = if self.match_token(&TokenKind::Semicolon) {
            None
        } else if self.at_type_start() {
            // Declaration includes semicolon, so don't expect another
            Some(Box::new(self.parse_local_declaration()?))
        } else {
            let init_loc = self.current_location();
            let expr = self.parse_expression()?;
            self.expect_semicolon("after for init")?;
            Some(Box::new(AstNode::new(
                NodeKind::ExprStmt {
                    expr: Box::new(expr),
                },
                init_loc,
            )))
        };

        // Condition (optional)
        let condition = if self.check(&TokenKind::Semicolon) {
            None
        } else {
            Some(Box::new(self.parse_expression()?))
        };
        self.expect_semicolon("after for condition")?;

        // Increment (optional)
        let increment = if self.check(&TokenKind::RParen) {
            None
        } else {
            Some(Box::new(self.parse_expression()?))
        };

        self.expect_rparen("after for clauses")?;

        let body = Box::new(self.parse_statement()?);

        Ok(AstNode::new(
            NodeKind::For {
                init,
                condition,
                increment,
                body,
            },
            loc,
        ))
    }

    /// Parse switch statement
    fn parse_switch_statement(&mut self) -> Result<AstNode, ParseError> {
        let loc = self.previous_location();

        self.expect_token(&TokenKind::LParen, "Expected '(' after 'switch'")?;
        let expr = Box::new(self.parse_expression()?);
        self.expect_rparen("after switch expression")?;
        self.expect_token(&TokenKind::LBrace, "Expected '{' before switch body")?;

        let mut cases: Vec<SwitchCase> = Vec::new();

        while !self.check(&TokenKind::RBrace) && !self.is_at_end() {
            let case_loc = self.current_location();
            let value = if self.match_token(&TokenKind::Case) {
                let value = self.parse_conditional_expression()?;
                self.expect_token(&TokenKind::Colon, "Expected ':' after case value")?;
                Some(Box::new(value))
            } else if self.match_token(&TokenKind::Default) {
                if cases.iter().any(|c| c.value.is_none()) {
                    return Err(ParseError::new(
                        "Multiple default labels in one switch",
                        case_loc,
                    ));
                }
                self.expect_token(&TokenKind::Colon, "Expected ':' after 'default'")?;
                None
            } else {
                return Err(self.error_here(format!(
                    "Expected 'case' or 'default' in switch body, found {}",
                    self.peek()
                )));
            };

            let mut body = Vec::new();
            while !self.check(&TokenKind::Case)
                && !self.check(&TokenKind::Default)
                && !self.check(&TokenKind::RBrace)
                && !self.is_at_end()
            {
                body.push(self.parse_statement()?);
            }

            cases.push(SwitchCase {
                value,
                body,
                location: case_loc,
            });
        }

        self.expect_token(&TokenKind::RBrace, "Expected '}' after switch body")?;

        Ok(AstNode::new(NodeKind::Switch { expr, cases }, loc))
    }
}
