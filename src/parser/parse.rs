//! Main parser coordinator
//!
//! This module provides the [`Parser`] struct and core parsing infrastructure,
//! including the error type, helper methods, and the main parse entry point.
//!
//! # Parser Architecture
//!
//! The Parser uses a recursive descent approach with the following organization:
//! - This module: Parser struct, helper methods, and coordination
//! - `declarations`: declaration specifiers, declarators, functions, records, typedefs
//! - `statements`: statements (if, while, for, switch, ...)
//! - `expressions`: expressions with precedence climbing
//!
//! Parser methods are split across multiple files using `impl Parser` blocks.
//!
//! # Error policy
//!
//! Parsing is fail-fast: the first grammar violation becomes a [`ParseError`]
//! that every production propagates unchanged with `?`. There is no recovery.

use crate::parser::ast::*;
use crate::parser::lexer::{lex_errors, Lexer, Token, TokenKind};
use crate::stage;
use rustc_hash::FxHashSet;
use std::sync::Arc;
use thiserror::Error;

/// Parser error type
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Parse error at line {}, column {}: {message}", .location.line, .location.column)]
pub struct ParseError {
    pub message: String,
    pub location: SourceLocation,
}

impl ParseError {
    pub fn new(message: impl Into<String>, location: SourceLocation) -> Self {
        ParseError {
            message: message.into(),
            location,
        }
    }
}

/// Recursive descent parser for the C subset
pub struct Parser {
    pub(crate) tokens: Vec<Token>,
    pub(crate) position: usize,
    /// Names introduced by `typedef`, accepted as type names from then on
    pub(crate) typedefs: FxHashSet<String>,
    anonymous_records: usize,
}

impl Parser {
    /// Lex and prepare `source`. The first lexical error, if any, is returned as a parse error.
    pub fn new(source: &str) -> Result<Self, ParseError> {
        Self::with_source_name(source, "<input>")
    }

    pub fn with_source_name(source: &str, source_name: &str) -> Result<Self, ParseError> {
        let tokens = Lexer::new(source, source_name).tokenize();
        if let Some(err) = lex_errors(&tokens).into_iter().next() {
            return Err(ParseError::new(err.message, err.location));
        }
        Ok(Self::from_tokens(tokens))
    }

    /// Build a parser over an existing token stream
    pub fn from_tokens(mut tokens: Vec<Token>) -> Self {
        if !matches!(tokens.last(), Some(Token { kind: TokenKind::Eof, .. })) {
            let (location, source_name) = tokens
                .last()
                .map(|t| (t.location, Arc::clone(&t.source_name)))
                .unwrap_or_else(|| (SourceLocation::new(1, 1), Arc::from("<input>")));
            tokens.push(Token {
                kind: TokenKind::Eof,
                text: String::new(),
                location,
                source_name,
            });
        }
        Self {
            tokens,
            position: 0,
            typedefs: FxHashSet::default(),
            anonymous_records: 0,
        }
    }

    /// Parse the entire program into a `TranslationUnit` node
    pub fn parse_program(&mut self) -> Result<AstNode, ParseError> {
        let location = self.current_location();
        stage::run_staged(|| self.parse_translation_unit()).map_err(|err| {
            ParseError::new(format!("cannot start parser thread: {}", err), location)
        })?
    }

    fn parse_translation_unit(&mut self) -> Result<AstNode, ParseError> {
        let location = self.current_location();
        let mut declarations = Vec::new();

        while !self.is_at_end() {
            declarations.extend(self.parse_top_level_declaration()?);
        }

        tracing::debug!(declarations = declarations.len(), "parsed translation unit");
        Ok(AstNode::new(
            NodeKind::TranslationUnit { declarations },
            location,
        ))
    }

    /// Parse a single standalone expression (used by tooling and tests)
    pub fn parse_standalone_expression(&mut self) -> Result<AstNode, ParseError> {
        let expr = self.parse_expression()?;
        if !self.is_at_end() {
            return Err(self.error_here(format!("Unexpected {} after expression", self.peek())));
        }
        Ok(expr)
    }

    // ===== Helper methods =====

    pub(crate) fn next_anonymous_name(&mut self) -> String {
        self.anonymous_records += 1;
        format!("<anonymous#{}>", self.anonymous_records)
    }

    /// Whether `kind` can start a declaration (type keyword, qualifier or typedef name)
    pub(crate) fn is_type_start(&self, kind: &TokenKind) -> bool {
        match kind {
            TokenKind::Int
            | TokenKind::Char
            | TokenKind::Void
            | TokenKind::Short
            | TokenKind::Long
            | TokenKind::Float
            | TokenKind::Double
            | TokenKind::Signed
            | TokenKind::Unsigned
            | TokenKind::Bool
            | TokenKind::Struct
            | TokenKind::Union
            | TokenKind::Enum
            | TokenKind::Const
            | TokenKind::Volatile
            | TokenKind::Static
            | TokenKind::Extern
            | TokenKind::Typedef => true,
            TokenKind::Identifier(name) => self.typedefs.contains(name),
            _ => false,
        }
    }

    pub(crate) fn at_type_start(&self) -> bool {
        self.is_type_start(&self.peek().kind)
    }

    pub(crate) fn match_token(&mut self, kind: &TokenKind) -> bool {
        if self.check(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    pub(crate) fn check(&self, kind: &TokenKind) -> bool {
        std::mem::discriminant(&self.peek().kind) == std::mem::discriminant(kind)
    }

    pub(crate) fn check_ahead(&self, n: usize, kind: &TokenKind) -> bool {
        self.peek_ahead(n)
            .is_some_and(|t| std::mem::discriminant(&t.kind) == std::mem::discriminant(kind))
    }

    pub(crate) fn advance(&mut self) -> &Token {
        if !self.is_at_end() {
            self.position += 1;
        }
        self.previous()
    }

    pub(crate) fn is_at_end(&self) -> bool {
        matches!(self.peek().kind, TokenKind::Eof)
    }

    pub(crate) fn peek(&self) -> &Token {
        let last = self.tokens.len() - 1;
        &self.tokens[self.position.min(last)]
    }

    pub(crate) fn peek_ahead(&self, n: usize) -> Option<&Token> {
        self.tokens.get(self.position + n)
    }

    pub(crate) fn previous(&self) -> &Token {
        &self.tokens[self.position.saturating_sub(1)]
    }

    pub(crate) fn previous_location(&self) -> SourceLocation {
        self.previous().location()
    }

    pub(crate) fn current_location(&self) -> SourceLocation {
        self.peek().location()
    }

    pub(crate) fn error_here(&self, message: impl Into<String>) -> ParseError {
        ParseError::new(message, self.current_location())
    }

    pub(crate) fn expect_token(&mut self, kind: &TokenKind, message: &str) -> Result<(), ParseError> {
        if self.check(kind) {
            self.advance();
            Ok(())
        } else {
            Err(self.error_here(format!("{}, found {}", message, self.peek())))
        }
    }

    pub(crate) fn expect_semicolon(&mut self, ctx: &str) -> Result<(), ParseError> {
        self.expect_token(&TokenKind::Semicolon, &format!("Expected ';' {ctx}"))
    }

    pub(crate) fn expect_rparen(&mut self, ctx: &str) -> Result<(), ParseError> {
        self.expect_token(&TokenKind::RParen, &format!("Expected ')' {ctx}"))
    }

    pub(crate) fn expect_identifier(&mut self) -> Result<String, ParseError> {
        if let TokenKind::Identifier(name) = &self.peek().kind {
            let name = name.clone();
            self.advance();
            Ok(name)
        } else {
            Err(self.error_here(format!("Expected identifier, found {}", self.peek())))
        }
    }
}

/// Parse `source` into a translation unit in one call
pub fn parse_source(source: &str, source_name: &str) -> Result<AstNode, ParseError> {
    Parser::with_source_name(source, source_name)?.parse_program()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(source: &str) -> Vec<AstNode> {
        let mut parser = Parser::new(source).unwrap();
        match parser.parse_program().unwrap().kind {
            NodeKind::TranslationUnit { declarations } => declarations,
            other => panic!("Expected translation unit, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_simple_function() {
        let decls = parse("int main() { return 0; }");

        assert_eq!(decls.len(), 1);
        match &decls[0].kind {
            NodeKind::FunctionDecl {
                name,
                params,
                return_type,
                body,
            } => {
                assert_eq!(name, "main");
                assert!(params.is_empty());
                assert_eq!(return_type.base, BaseType::Int);
                match &body.as_ref().unwrap().kind {
                    NodeKind::Compound { statements } => assert_eq!(statements.len(), 1),
                    other => panic!("Expected compound body, got {:?}", other),
                }
            }
            _ => panic!("Expected function definition"),
        }
    }

    #[test]
    fn test_parse_struct_and_globals() {
        let decls = parse("struct Point { int x; int y; }; int a, *b = 0;");

        assert_eq!(decls.len(), 3);
        match &decls[0].kind {
            NodeKind::StructDecl { name, fields } => {
                assert_eq!(name, "Point");
                assert_eq!(fields.len(), 2);
            }
            _ => panic!("Expected struct definition"),
        }
        match &decls[2].kind {
            NodeKind::VarDecl { name, var_type, init } => {
                assert_eq!(name, "b");
                assert_eq!(var_type.pointer_depth, 1);
                assert!(init.is_some());
            }
            _ => panic!("Expected variable declaration"),
        }
    }

    #[test]
    fn test_lex_error_surfaces_as_parse_error() {
        let err = Parser::new("int main() { return \"oops; }").err().unwrap();
        assert_eq!(err.message, "Unterminated string literal");
        assert_eq!(err.location, SourceLocation::new(1, 21));
    }

    #[test]
    fn test_first_error_aborts_parse() {
        let err = parse_source("int main() { int x = ; return 0; }", "bad.c").unwrap_err();
        assert!(err.message.starts_with("Expected expression"), "{}", err);
        assert_eq!(err.location, SourceLocation::new(1, 22));
        assert!(err.to_string().starts_with("Parse error at line 1, column 22"));
    }
}
