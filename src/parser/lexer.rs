//! Lexer (tokenizer) for C source code
//!
//! Converts already-preprocessed source text into a flat [`Token`] stream
//! consumed by the parser. Left-over `#` directive lines are skipped.
//!
//! Lexing never aborts: a malformed literal, an unterminated comment or an
//! unknown character becomes a single [`TokenKind::Error`] token carrying the
//! diagnostic, and scanning resumes after it. [`lex_errors`] collects them.

use super::ast::SourceLocation;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Token classification. Literal variants carry their decoded value.
#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    // Literals
    IntLiteral(i64),
    FloatLiteral(f64),
    CharLiteral(u8),
    StringLiteral(String),

    // Identifiers
    Identifier(String),

    // Keywords
    Int,
    Char,
    Void,
    Short,
    Long,
    Float,
    Double,
    Signed,
    Unsigned,
    Bool,
    Struct,
    Union,
    Enum,
    Typedef,
    Const,
    Volatile,
    Static,
    Extern,
    If,
    Else,
    While,
    Do,
    For,
    Switch,
    Case,
    Default,
    Break,
    Continue,
    Return,
    Goto,
    Sizeof,

    // Arithmetic
    Plus,    // +
    Minus,   // -
    Star,    // *
    Slash,   // /
    Percent, // %

    // Comparison
    EqEq,  // ==
    NotEq, // !=
    Lt,    // <
    Le,    // <=
    Gt,    // >
    Ge,    // >=

    // Logical
    AndAnd, // &&
    OrOr,   // ||
    Bang,   // !

    // Bitwise
    Amp,   // &
    Pipe,  // |
    Caret, // ^
    Tilde, // ~
    LtLt,  // <<
    GtGt,  // >>

    // Assignment
    Eq,        // =
    PlusEq,    // +=
    MinusEq,   // -=
    StarEq,    // *=
    SlashEq,   // /=
    PercentEq, // %=
    AmpEq,     // &=
    PipeEq,    // |=
    CaretEq,   // ^=
    LtLtEq,    // <<=
    GtGtEq,    // >>=

    // Increment/Decrement
    PlusPlus,   // ++
    MinusMinus, // --

    // Member access
    Dot,   // .
    Arrow, // ->

    Ellipsis, // ...

    // Ternary
    Question, // ?
    Colon,    // :

    // Punctuation
    LParen,    // (
    RParen,    // )
    LBrace,    // {
    RBrace,    // }
    LBracket,  // [
    RBracket,  // ]
    Semicolon, // ;
    Comma,     // ,

    /// Lexical error; the payload is the diagnostic message
    Error(String),

    Eof,
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenKind::IntLiteral(n) => write!(f, "int literal {}", n),
            TokenKind::FloatLiteral(x) => write!(f, "float literal {}", x),
            TokenKind::CharLiteral(c) => {
                if c.is_ascii_graphic() || *c == b' ' {
                    write!(f, "char literal '{}'", *c as char)
                } else {
                    write!(f, "char literal '\\x{:02x}'", c)
                }
            }
            TokenKind::StringLiteral(s) => write!(f, "string literal {:?}", s),
            TokenKind::Identifier(s) => write!(f, "identifier '{}'", s),
            TokenKind::Error(message) => write!(f, "invalid token ({})", message),
            TokenKind::Eof => write!(f, "end of file"),
            other => match other.fixed_spelling() {
                Some(text) => write!(f, "'{}'", text),
                None => write!(f, "{:?}", other),
            },
        }
    }
}

impl TokenKind {
    /// Spelling of keyword and punctuator tokens
    pub fn fixed_spelling(&self) -> Option<&'static str> {
        let text = match self {
            TokenKind::Int => "int",
            TokenKind::Char => "char",
            TokenKind::Void => "void",
            TokenKind::Short => "short",
            TokenKind::Long => "long",
            TokenKind::Float => "float",
            TokenKind::Double => "double",
            TokenKind::Signed => "signed",
            TokenKind::Unsigned => "unsigned",
            TokenKind::Bool => "_Bool",
            TokenKind::Struct => "struct",
            TokenKind::Union => "union",
            TokenKind::Enum => "enum",
            TokenKind::Typedef => "typedef",
            TokenKind::Const => "const",
            TokenKind::Volatile => "volatile",
            TokenKind::Static => "static",
            TokenKind::Extern => "extern",
            TokenKind::If => "if",
            TokenKind::Else => "else",
            TokenKind::While => "while",
            TokenKind::Do => "do",
            TokenKind::For => "for",
            TokenKind::Switch => "switch",
            TokenKind::Case => "case",
            TokenKind::Default => "default",
            TokenKind::Break => "break",
            TokenKind::Continue => "continue",
            TokenKind::Return => "return",
            TokenKind::Goto => "goto",
            TokenKind::Sizeof => "sizeof",
            TokenKind::Plus => "+",
            TokenKind::Minus => "-",
            TokenKind::Star => "*",
            TokenKind::Slash => "/",
            TokenKind::Percent => "%",
            TokenKind::EqEq => "==",
            TokenKind::NotEq => "!=",
            TokenKind::Lt => "<",
            TokenKind::Le => "<=",
            TokenKind::Gt => ">",
            TokenKind::Ge => ">=",
            TokenKind::AndAnd => "&&",
            TokenKind::OrOr => "||",
            TokenKind::Bang => "!",
            TokenKind::Amp => "&",
            TokenKind::Pipe => "|",
            TokenKind::Caret => "^",
            TokenKind::Tilde => "~",
            TokenKind::LtLt => "<<",
            TokenKind::GtGt => ">>",
            TokenKind::Eq => "=",
            TokenKind::PlusEq => "+=",
            TokenKind::MinusEq => "-=",
            TokenKind::StarEq => "*=",
            TokenKind::SlashEq => "/=",
            TokenKind::PercentEq => "%=",
            TokenKind::AmpEq => "&=",
            TokenKind::PipeEq => "|=",
            TokenKind::CaretEq => "^=",
            TokenKind::LtLtEq => "<<=",
            TokenKind::GtGtEq => ">>=",
            TokenKind::PlusPlus => "++",
            TokenKind::MinusMinus => "--",
            TokenKind::Dot => ".",
            TokenKind::Arrow => "->",
            TokenKind::Ellipsis => "...",
            TokenKind::Question => "?",
            TokenKind::Colon => ":",
            TokenKind::LParen => "(",
            TokenKind::RParen => ")",
            TokenKind::LBrace => "{",
            TokenKind::RBrace => "}",
            TokenKind::LBracket => "[",
            TokenKind::RBracket => "]",
            TokenKind::Semicolon => ";",
            TokenKind::Comma => ",",
            _ => return None,
        };
        Some(text)
    }
}

fn keyword(ident: &str) -> Option<TokenKind> {
    let kind = match ident {
        "int" => TokenKind::Int,
        "char" => TokenKind::Char,
        "void" => TokenKind::Void,
        "short" => TokenKind::Short,
        "long" => TokenKind::Long,
        "float" => TokenKind::Float,
        "double" => TokenKind::Double,
        "signed" => TokenKind::Signed,
        "unsigned" => TokenKind::Unsigned,
        "_Bool" => TokenKind::Bool,
        "struct" => TokenKind::Struct,
        "union" => TokenKind::Union,
        "enum" => TokenKind::Enum,
        "typedef" => TokenKind::Typedef,
        "const" => TokenKind::Const,
        "volatile" => TokenKind::Volatile,
        "static" => TokenKind::Static,
        "extern" => TokenKind::Extern,
        "if" => TokenKind::If,
        "else" => TokenKind::Else,
        "while" => TokenKind::While,
        "do" => TokenKind::Do,
        "for" => TokenKind::For,
        "switch" => TokenKind::Switch,
        "case" => TokenKind::Case,
        "default" => TokenKind::Default,
        "break" => TokenKind::Break,
        "continue" => TokenKind::Continue,
        "return" => TokenKind::Return,
        "goto" => TokenKind::Goto,
        "sizeof" => TokenKind::Sizeof,
        _ => return None,
    };
    Some(kind)
}

/// A lexed token with its raw text and position
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub text: String,
    pub location: SourceLocation,
    pub source_name: Arc<str>,
}

impl Token {
    pub fn location(&self) -> SourceLocation {
        self.location
    }

    pub fn is_error(&self) -> bool {
        matches!(self.kind, TokenKind::Error(_))
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.kind)
    }
}

/// A lexical diagnostic extracted from an error token
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{source_name}:{location}: {message}")]
pub struct LexError {
    pub message: String,
    pub location: SourceLocation,
    pub source_name: String,
}

/// Collects the diagnostics carried by error tokens, in source order
pub fn lex_errors(tokens: &[Token]) -> Vec<LexError> {
    tokens
        .iter()
        .filter_map(|token| match &token.kind {
            TokenKind::Error(message) => Some(LexError {
                message: message.clone(),
                location: token.location,
                source_name: token.source_name.to_string(),
            }),
            _ => None,
        })
        .collect()
}

/// Lexer for C source code
pub struct Lexer {
    input: Vec<char>,
    position: usize,
    line: u32,
    column: u32,
    source_name: Arc<str>,
}

impl Lexer {
    /// Create a new lexer for the given source string and logical file name.
    pub fn new(input: &str, source_name: &str) -> Self {
        Self {
            input: input.chars().collect(),
            position: 0,
            line: 1,
            column: 1,
            source_name: Arc::from(source_name),
        }
    }

    /// Tokenize the entire input. The last token is always [`TokenKind::Eof`].
    pub fn tokenize(&mut self) -> Vec<Token> {
        let mut tokens = Vec::new();

        loop {
            if let Some(error) = self.skip_whitespace_and_comments() {
                tokens.push(error);
            }

            if self.is_at_end() {
                let loc = self.current_location();
                tokens.push(self.make_token(TokenKind::Eof, self.position, loc));
                break;
            }

            if self.peek() == Some('#') {
                self.skip_preprocessor_directive();
                continue;
            }

            tokens.push(self.next_token());
        }

        let errors = tokens.iter().filter(|t| t.is_error()).count();
        if errors > 0 {
            tracing::warn!(file = %self.source_name, errors, "lexical errors");
        }
        tracing::debug!(file = %self.source_name, count = tokens.len(), "tokenized");
        tokens
    }

    fn make_token(&self, kind: TokenKind, start: usize, location: SourceLocation) -> Token {
        Token {
            kind,
            text: self.input[start..self.position].iter().collect(),
            location,
            source_name: Arc::clone(&self.source_name),
        }
    }

    /// Consume `next` if it follows, yielding `long`, else `short`
    fn either(&mut self, next: char, long: TokenKind, short: TokenKind) -> TokenKind {
        if self.peek() == Some(next) {
            self.advance();
            long
        } else {
            short
        }
    }

    /// Get next token
    fn next_token(&mut self) -> Token {
        let start = self.position;
        let loc = self.current_location();
        let Some(ch) = self.advance() else {
            return self.make_token(TokenKind::Eof, start, loc);
        };

        let kind = match ch {
            '"' => self.string_literal(),
            '\'' => self.char_literal(),
            '0'..='9' => self.number_literal(ch),
            '.' if self.peek().is_some_and(|c| c.is_ascii_digit()) => self.number_literal(ch),
            'a'..='z' | 'A'..='Z' | '_' => self.identifier_or_keyword(ch),

            '+' => match self.peek() {
                Some('+') => {
                    self.advance();
                    TokenKind::PlusPlus
                }
                _ => self.either('=', TokenKind::PlusEq, TokenKind::Plus),
            },
            '-' => match self.peek() {
                Some('-') => {
                    self.advance();
                    TokenKind::MinusMinus
                }
                Some('>') => {
                    self.advance();
                    TokenKind::Arrow
                }
                _ => self.either('=', TokenKind::MinusEq, TokenKind::Minus),
            },
            '*' => self.either('=', TokenKind::StarEq, TokenKind::Star),
            '/' => self.either('=', TokenKind::SlashEq, TokenKind::Slash),
            '%' => self.either('=', TokenKind::PercentEq, TokenKind::Percent),
            '=' => self.either('=', TokenKind::EqEq, TokenKind::Eq),
            '!' => self.either('=', TokenKind::NotEq, TokenKind::Bang),
            '^' => self.either('=', TokenKind::CaretEq, TokenKind::Caret),
            '<' => match self.peek() {
                Some('<') => {
                    self.advance();
                    self.either('=', TokenKind::LtLtEq, TokenKind::LtLt)
                }
                _ => self.either('=', TokenKind::Le, TokenKind::Lt),
            },
            '>' => match self.peek() {
                Some('>') => {
                    self.advance();
                    self.either('=', TokenKind::GtGtEq, TokenKind::GtGt)
                }
                _ => self.either('=', TokenKind::Ge, TokenKind::Gt),
            },
            '&' => match self.peek() {
                Some('&') => {
                    self.advance();
                    TokenKind::AndAnd
                }
                _ => self.either('=', TokenKind::AmpEq, TokenKind::Amp),
            },
            '|' => match self.peek() {
                Some('|') => {
                    self.advance();
                    TokenKind::OrOr
                }
                _ => self.either('=', TokenKind::PipeEq, TokenKind::Pipe),
            },
            '.' => {
                if self.peek() == Some('.') && self.peek_ahead(1) == Some('.') {
                    self.advance();
                    self.advance();
                    TokenKind::Ellipsis
                } else {
                    TokenKind::Dot
                }
            }
            '~' => TokenKind::Tilde,
            '?' => TokenKind::Question,
            ':' => TokenKind::Colon,
            '(' => TokenKind::LParen,
            ')' => TokenKind::RParen,
            '{' => TokenKind::LBrace,
            '}' => TokenKind::RBrace,
            '[' => TokenKind::LBracket,
            ']' => TokenKind::RBracket,
            ';' => TokenKind::Semicolon,
            ',' => TokenKind::Comma,

            _ => TokenKind::Error(format!("Unexpected character: '{}'", ch)),
        };

        self.make_token(kind, start, loc)
    }

    /// Parse string literal. An unterminated literal stops at the end of the line.
    fn string_literal(&mut self) -> TokenKind {
        let mut string = String::new();
        let mut error: Option<String> = None;

        loop {
            match self.peek() {
                None | Some('\n') => {
                    return TokenKind::Error("Unterminated string literal".to_string());
                }
                Some('"') => {
                    self.advance(); // consume closing quote
                    break;
                }
                Some('\\') => {
                    self.advance();
                    match self.escape_sequence() {
                        Ok(c) => string.push(c),
                        Err(message) => {
                            error.get_or_insert(message);
                        }
                    }
                }
                Some(ch) => {
                    string.push(ch);
                    self.advance();
                }
            }
        }

        match error {
            Some(message) => TokenKind::Error(message),
            None => TokenKind::StringLiteral(string),
        }
    }

    /// Parse character literal
    fn char_literal(&mut self) -> TokenKind {
        let value = match self.peek() {
            None | Some('\n') => {
                return TokenKind::Error("Unterminated character literal".to_string());
            }
            Some('\'') => {
                self.advance();
                return TokenKind::Error("Empty character literal".to_string());
            }
            Some('\\') => {
                self.advance();
                self.escape_sequence()
            }
            Some(ch) => {
                self.advance();
                Ok(ch)
            }
        };

        if self.peek() != Some('\'') {
            // Resynchronise on the closing quote if it is on this line
            while let Some(ch) = self.peek() {
                if ch == '\n' {
                    return TokenKind::Error("Unterminated character literal".to_string());
                }
                self.advance();
                if ch == '\'' {
                    return TokenKind::Error("Multi-character character literal".to_string());
                }
            }
            return TokenKind::Error("Unterminated character literal".to_string());
        }
        self.advance(); // closing quote

        match value {
            Ok(c) if (c as u32) <= 0xFF => TokenKind::CharLiteral(c as u32 as u8),
            Ok(c) => TokenKind::Error(format!("Character '{}' does not fit in a char", c)),
            Err(message) => TokenKind::Error(message),
        }
    }

    /// Decode the escape sequence following a consumed backslash
    fn escape_sequence(&mut self) -> Result<char, String> {
        let Some(escaped) = self.peek() else {
            return Err("Unexpected end of file in escape sequence".to_string());
        };
        if escaped == '\n' {
            return Err("Unexpected end of line in escape sequence".to_string());
        }
        self.advance();

        let value = match escaped {
            'n' => '\n',
            't' => '\t',
            'r' => '\r',
            'a' => '\x07',
            'b' => '\x08',
            'f' => '\x0c',
            'v' => '\x0b',
            '\\' => '\\',
            '\'' => '\'',
            '"' => '"',
            '?' => '?',
            '0'..='7' => {
                let mut code = escaped.to_digit(8).unwrap_or(0);
                for _ in 0..2 {
                    match self.peek().and_then(|c| c.to_digit(8)) {
                        Some(d) => {
                            code = code * 8 + d;
                            self.advance();
                        }
                        None => break,
                    }
                }
                if code > 0xFF {
                    return Err(format!("Octal escape sequence out of range: \\{:o}", code));
                }
                char::from(code as u8)
            }
            'x' => {
                let mut code: u32 = 0;
                let mut digits = 0;
                while let Some(d) = self.peek().and_then(|c| c.to_digit(16)) {
                    if digits == 2 {
                        break;
                    }
                    code = code * 16 + d;
                    digits += 1;
                    self.advance();
                }
                if digits == 0 {
                    return Err("Incomplete hex escape sequence".to_string());
                }
                char::from(code as u8)
            }
            other => return Err(format!("Unknown escape sequence: \\{}", other)),
        };
        Ok(value)
    }

    /// Parse numeric literal: decimal, octal, hex integers and decimal floats
    fn number_literal(&mut self, first: char) -> TokenKind {
        let mut digits = String::new();
        digits.push(first);

        if first == '0' && matches!(self.peek(), Some('x') | Some('X')) {
            self.advance();
            digits.clear();
            while let Some(ch) = self.peek().filter(|c| c.is_ascii_hexdigit()) {
                digits.push(ch);
                self.advance();
            }
            if digits.is_empty() {
                return self.bad_number("Hex literal has no digits");
            }
            self.integer_suffix();
            if self.peek().is_some_and(|c| c.is_ascii_alphanumeric() || c == '_') {
                return self.bad_number("Invalid hex literal");
            }
            return match u64::from_str_radix(&digits, 16) {
                Ok(value) => TokenKind::IntLiteral(value as i64),
                Err(_) => TokenKind::Error(format!("Integer literal out of range: 0x{}", digits)),
            };
        }

        let mut is_float = first == '.';
        while let Some(ch) = self.peek() {
            if ch.is_ascii_digit() {
                digits.push(ch);
                self.advance();
            } else if ch == '.' && !is_float {
                is_float = true;
                digits.push(ch);
                self.advance();
            } else {
                break;
            }
        }

        if matches!(self.peek(), Some('e') | Some('E')) {
            let sign_ok = match self.peek_ahead(1) {
                Some('+') | Some('-') => self.peek_ahead(2).is_some_and(|c| c.is_ascii_digit()),
                Some(c) => c.is_ascii_digit(),
                None => false,
            };
            if sign_ok {
                is_float = true;
                digits.push('e');
                self.advance();
                if let Some(sign) = self.peek().filter(|c| *c == '+' || *c == '-') {
                    digits.push(sign);
                    self.advance();
                }
                while let Some(ch) = self.peek().filter(|c| c.is_ascii_digit()) {
                    digits.push(ch);
                    self.advance();
                }
            }
        }

        if is_float {
            if matches!(self.peek(), Some('f') | Some('F') | Some('l') | Some('L')) {
                self.advance();
            }
            if self.peek().is_some_and(|c| c.is_ascii_alphanumeric() || c == '_') {
                return self.bad_number("Invalid floating-point literal");
            }
            if digits.starts_with('.') {
                digits.insert(0, '0');
            }
            return match digits.parse::<f64>() {
                Ok(value) => TokenKind::FloatLiteral(value),
                Err(_) => TokenKind::Error(format!("Invalid floating-point literal: {}", digits)),
            };
        }

        self.integer_suffix();
        if self.peek().is_some_and(|c| c.is_ascii_alphanumeric() || c == '_') {
            return self.bad_number("Invalid integer literal");
        }

        let (radix, body) = if digits.len() > 1 && digits.starts_with('0') {
            (8, &digits[1..])
        } else {
            (10, digits.as_str())
        };
        match u64::from_str_radix(body, radix) {
            Ok(value) => TokenKind::IntLiteral(value as i64),
            Err(_) if radix == 8 => TokenKind::Error(format!("Invalid octal literal: {}", digits)),
            Err(_) => TokenKind::Error(format!("Integer literal out of range: {}", digits)),
        }
    }

    fn integer_suffix(&mut self) {
        while matches!(self.peek(), Some('u') | Some('U') | Some('l') | Some('L')) {
            self.advance();
        }
    }

    /// Swallow the rest of a malformed number so it yields one error token
    fn bad_number(&mut self, message: &str) -> TokenKind {
        while self.peek().is_some_and(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.') {
            self.advance();
        }
        TokenKind::Error(message.to_string())
    }

    /// Parse identifier or keyword
    fn identifier_or_keyword(&mut self, first_char: char) -> TokenKind {
        let mut ident = String::new();
        ident.push(first_char);

        while let Some(ch) = self.peek() {
            if ch.is_ascii_alphanumeric() || ch == '_' {
                ident.push(ch);
                self.advance();
            } else {
                break;
            }
        }

        keyword(&ident).unwrap_or(TokenKind::Identifier(ident))
    }

    /// Skip whitespace and comments; an unterminated block comment yields an error token
    fn skip_whitespace_and_comments(&mut self) -> Option<Token> {
        loop {
            match self.peek() {
                Some(' ') | Some('\t') | Some('\r') | Some('\n') | Some('\x0c') | Some('\x0b') => {
                    self.advance();
                }
                Some('/') => {
                    if self.peek_ahead(1) == Some('/') {
                        self.skip_line_comment();
                    } else if self.peek_ahead(1) == Some('*') {
                        if let Some(error) = self.skip_block_comment() {
                            return Some(error);
                        }
                    } else {
                        break;
                    }
                }
                _ => break,
            }
        }
        None
    }

    /// Skip single-line comment (// ...)
    fn skip_line_comment(&mut self) {
        while let Some(ch) = self.peek() {
            if ch == '\n' {
                break;
            }
            self.advance();
        }
    }

    /// Skip multi-line comment (/* ... */)
    fn skip_block_comment(&mut self) -> Option<Token> {
        let start = self.position;
        let start_loc = self.current_location();
        self.advance(); // skip '/'
        self.advance(); // skip '*'

        while !self.is_at_end() {
            if self.peek() == Some('*') && self.peek_ahead(1) == Some('/') {
                self.advance();
                self.advance();
                return None;
            }
            self.advance();
        }

        Some(self.make_token(
            TokenKind::Error("Unterminated block comment".to_string()),
            start,
            start_loc,
        ))
    }

    /// Skip a left-over preprocessor line (#include, #define...)
    fn skip_preprocessor_directive(&mut self) {
        while let Some(ch) = self.peek() {
            self.advance();
            if ch == '\n' {
                break;
            }
        }
    }

    /// Peek at current character without consuming
    fn peek(&self) -> Option<char> {
        self.input.get(self.position).copied()
    }

    /// Peek ahead n characters
    fn peek_ahead(&self, n: usize) -> Option<char> {
        self.input.get(self.position + n).copied()
    }

    /// Advance to next character
    fn advance(&mut self) -> Option<char> {
        let ch = *self.input.get(self.position)?;
        self.position += 1;

        if ch == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }

        Some(ch)
    }

    fn is_at_end(&self) -> bool {
        self.position >= self.input.len()
    }

    fn current_location(&self) -> SourceLocation {
        SourceLocation::new(self.line, self.column)
    }
}

/// Convenience wrapper: tokenize `source` in one call
pub fn tokenize(source: &str, source_name: &str) -> Vec<Token> {
    Lexer::new(source, source_name).tokenize()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<TokenKind> {
        tokenize(source, "test.c").into_iter().map(|t| t.kind).collect()
    }

    #[test]
    fn test_simple_tokens() {
        let tokens = kinds("int main() { return 0; }");

        assert_eq!(
            tokens,
            vec![
                TokenKind::Int,
                TokenKind::Identifier("main".into()),
                TokenKind::LParen,
                TokenKind::RParen,
                TokenKind::LBrace,
                TokenKind::Return,
                TokenKind::IntLiteral(0),
                TokenKind::Semicolon,
                TokenKind::RBrace,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_maximal_munch() {
        let tokens = kinds("a<<=b>>=c->d...e&&f||g!=h++ --");
        assert!(tokens.contains(&TokenKind::LtLtEq));
        assert!(tokens.contains(&TokenKind::GtGtEq));
        assert!(tokens.contains(&TokenKind::Arrow));
        assert!(tokens.contains(&TokenKind::Ellipsis));
        assert!(tokens.contains(&TokenKind::AndAnd));
        assert!(tokens.contains(&TokenKind::OrOr));
        assert!(tokens.contains(&TokenKind::NotEq));
        assert!(tokens.contains(&TokenKind::PlusPlus));
        assert!(tokens.contains(&TokenKind::MinusMinus));
        assert!(!tokens.contains(&TokenKind::Lt));
    }

    #[test]
    fn test_comments_and_locations() {
        let tokens = tokenize("int x; // comment\nint y; /* block\ncomment */ int z;", "t.c");

        assert_eq!(tokens[3].kind, TokenKind::Int);
        assert_eq!(tokens[3].location, SourceLocation::new(2, 1));
        assert_eq!(tokens[6].kind, TokenKind::Int);
        assert_eq!(tokens[6].location, SourceLocation::new(3, 12));
        assert_eq!(tokens[7].text, "z");
        assert_eq!(&*tokens[7].source_name, "t.c");
    }

    #[test]
    fn test_string_literal_escapes() {
        let tokens = kinds(r#""hello\n\x41\101\tworld""#);
        assert_eq!(tokens[0], TokenKind::StringLiteral("hello\nAA\tworld".into()));
    }

    #[test]
    fn test_numeric_literals() {
        let tokens = kinds("42 0x1F 017 3.5 1e3 .25f 10UL");
        assert_eq!(tokens[0], TokenKind::IntLiteral(42));
        assert_eq!(tokens[1], TokenKind::IntLiteral(31));
        assert_eq!(tokens[2], TokenKind::IntLiteral(15));
        assert_eq!(tokens[3], TokenKind::FloatLiteral(3.5));
        assert_eq!(tokens[4], TokenKind::FloatLiteral(1000.0));
        assert_eq!(tokens[5], TokenKind::FloatLiteral(0.25));
        assert_eq!(tokens[6], TokenKind::IntLiteral(10));
    }

    #[test]
    fn test_char_literals() {
        let tokens = kinds(r"'a' '\n' '\0' '\x7f'");
        assert_eq!(tokens[0], TokenKind::CharLiteral(b'a'));
        assert_eq!(tokens[1], TokenKind::CharLiteral(b'\n'));
        assert_eq!(tokens[2], TokenKind::CharLiteral(0));
        assert_eq!(tokens[3], TokenKind::CharLiteral(0x7f));
    }

    #[test]
    fn test_unterminated_string_yields_one_error() {
        let tokens = tokenize("char *s = \"abc;\nint x = 1;", "t.c");

        let errors = lex_errors(&tokens);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].message, "Unterminated string literal");
        assert_eq!(errors[0].location, SourceLocation::new(1, 11));
        assert_eq!(tokens.last().unwrap().kind, TokenKind::Eof);
        // Lexing resumed on the next line
        assert!(tokens.iter().any(|t| t.kind == TokenKind::IntLiteral(1)));
    }

    #[test]
    fn test_multiple_errors_in_one_pass() {
        let tokens = tokenize("int a = 3 @ 4; char c = 'ab'; int d = 09; /* open", "t.c");
        let errors = lex_errors(&tokens);
        let messages: Vec<_> = errors.iter().map(|e| e.message.as_str()).collect();
        assert_eq!(
            messages,
            vec![
                "Unexpected character: '@'",
                "Multi-character character literal",
                "Invalid octal literal: 09",
                "Unterminated block comment",
            ]
        );
        assert_eq!(tokens.last().unwrap().kind, TokenKind::Eof);
    }

    #[test]
    fn test_bad_escape_is_single_error() {
        let tokens = kinds(r#""a\qb" x"#);
        assert_eq!(tokens[0], TokenKind::Error("Unknown escape sequence: \\q".into()));
        assert_eq!(tokens[1], TokenKind::Identifier("x".into()));
    }

    #[test]
    fn test_preprocessor_skip() {
        let tokens = kinds("#include <stdio.h>\nint x;");
        assert_eq!(tokens[0], TokenKind::Int);
        assert_eq!(tokens[1], TokenKind::Identifier("x".into()));
    }
}
