//! Recursive descent parser for Loom script.
//!
//! Statement terminators are optional: a statement ends at `;`, at a `}`,
//! at end of input, or wherever the expression grammar stops. `return`
//! followed by a line break returns `undefined`.

mod expr;
pub mod guards;
mod stmt;

use crate::syntax::ast::Program;
use crate::syntax::lexer::{LexError, Lexer};
use crate::syntax::token::{Span, Spanned, Token};
use guards::{LoopGuard, MAX_PARSE_DEPTH};

/// Category of a parse error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseErrorKind {
    UnexpectedToken,
    InvalidSyntax,
    LimitExceeded,
}

/// Parse error with location.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{message} at {}:{}", span.line, span.column)]
pub struct ParseError {
    pub kind: ParseErrorKind,
    pub span: Span,
    pub message: String,
}

impl ParseError {
    pub fn unexpected(found: &Token, expected: &str, span: Span) -> Self {
        Self {
            kind: ParseErrorKind::UnexpectedToken,
            span,
            message: format!("Expected {}, found '{}'", expected, found),
        }
    }

    pub fn invalid(message: impl Into<String>, span: Span) -> Self {
        Self {
            kind: ParseErrorKind::InvalidSyntax,
            span,
            message: message.into(),
        }
    }

    pub fn limit_exceeded(message: impl Into<String>, span: Span) -> Self {
        Self {
            kind: ParseErrorKind::LimitExceeded,
            span,
            message: message.into(),
        }
    }
}

/// Any failure turning source text into a [`Program`].
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SyntaxError {
    #[error("{}", .0.first().map(|e| e.to_string()).unwrap_or_default())]
    Lex(Vec<LexError>),

    #[error(transparent)]
    Parse(#[from] ParseError),
}

impl SyntaxError {
    /// Line and column of the first error.
    pub fn position(&self) -> (u32, u32) {
        let span = match self {
            SyntaxError::Lex(errors) => errors.first().map(|e| *e.span()).unwrap_or_default(),
            SyntaxError::Parse(err) => err.span,
        };
        (span.line, span.column)
    }
}

/// Lex and parse `source`.
pub fn parse(source: &str) -> Result<Program, SyntaxError> {
    let tokens = Lexer::new(source).tokenize().map_err(SyntaxError::Lex)?;
    Ok(Parser::new(tokens).parse_program()?)
}

pub struct Parser {
    tokens: Vec<Spanned>,
    pos: usize,
    depth: usize,
    specifiers: Vec<String>,
    mentions_exports: bool,
}

impl Parser {
    /// Create a parser over a token stream. A trailing [`Token::Eof`] is
    /// appended if missing.
    pub fn new(mut tokens: Vec<Spanned>) -> Self {
        if !matches!(tokens.last().map(|t| &t.token), Some(Token::Eof)) {
            let span = tokens.last().map(|t| Span::new(t.span.end, t.span.end, t.span.line, t.span.column)).unwrap_or_default();
            tokens.push(Spanned {
                token: Token::Eof,
                span,
                newline_before: false,
            });
        }
        Self {
            tokens,
            pos: 0,
            depth: 0,
            specifiers: Vec::new(),
            mentions_exports: false,
        }
    }

    pub fn parse_program(mut self) -> Result<Program, ParseError> {
        let mut body = Vec::new();
        let mut guard = LoopGuard::new("program");
        while !self.at_end() {
            guard.check()?;
            body.push(stmt::parse_statement(&mut self)?);
        }
        Ok(Program {
            body,
            specifiers: self.specifiers,
            mentions_exports: self.mentions_exports,
        })
    }

    // ========================================================================
    // Token access
    // ========================================================================

    pub(crate) fn current(&self) -> &Token {
        &self.tokens[self.pos].token
    }

    pub(crate) fn current_span(&self) -> Span {
        self.tokens[self.pos].span
    }

    pub(crate) fn peek_at(&self, offset: usize) -> &Token {
        let idx = (self.pos + offset).min(self.tokens.len() - 1);
        &self.tokens[idx].token
    }

    /// A line break precedes the current token.
    pub(crate) fn newline_before(&self) -> bool {
        self.tokens[self.pos].newline_before
    }

    pub(crate) fn at_end(&self) -> bool {
        matches!(self.current(), Token::Eof)
    }

    pub(crate) fn advance(&mut self) -> Token {
        let token = self.tokens[self.pos].token.clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        token
    }

    pub(crate) fn check(&self, token: &Token) -> bool {
        self.current() == token
    }

    pub(crate) fn eat(&mut self, token: &Token) -> bool {
        if self.check(token) {
            self.advance();
            true
        } else {
            false
        }
    }

    pub(crate) fn expect(&mut self, token: &Token) -> Result<Span, ParseError> {
        if self.check(token) {
            let span = self.current_span();
            self.advance();
            Ok(span)
        } else {
            Err(ParseError::unexpected(
                self.current(),
                &format!("'{}'", token),
                self.current_span(),
            ))
        }
    }

    pub(crate) fn expect_identifier(&mut self) -> Result<String, ParseError> {
        match self.current().clone() {
            Token::Identifier(name) => {
                self.advance();
                Ok(name)
            }
            other => Err(ParseError::unexpected(&other, "identifier", self.current_span())),
        }
    }

    /// An identifier or a keyword, as allowed after `.`, in object keys and
    /// in import/export specifier lists.
    pub(crate) fn expect_name(&mut self) -> Result<String, ParseError> {
        if let Some(word) = self.current().keyword_text() {
            self.advance();
            return Ok(word.to_string());
        }
        self.expect_identifier()
    }

    pub(crate) fn expect_string(&mut self) -> Result<String, ParseError> {
        match self.current().clone() {
            Token::String(s) => {
                self.advance();
                Ok(s)
            }
            other => Err(ParseError::unexpected(&other, "string literal", self.current_span())),
        }
    }

    /// Consume an optional `;`.
    pub(crate) fn end_statement(&mut self) {
        self.eat(&Token::Semicolon);
    }

    // ========================================================================
    // Bookkeeping
    // ========================================================================

    pub(crate) fn record_specifier(&mut self, specifier: &str) {
        self.specifiers.push(specifier.to_string());
    }

    pub(crate) fn note_identifier(&mut self, name: &str) {
        if name == "exports" {
            self.mentions_exports = true;
        }
    }

    pub(crate) fn enter(&mut self, what: &str) -> Result<(), ParseError> {
        self.depth += 1;
        if self.depth > MAX_PARSE_DEPTH {
            self.depth -= 1;
            return Err(ParseError::limit_exceeded(
                format!("Maximum nesting depth ({}) exceeded in {}", MAX_PARSE_DEPTH, what),
                self.current_span(),
            ));
        }
        Ok(())
    }

    pub(crate) fn leave(&mut self) {
        self.depth -= 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::syntax::ast::*;

    #[test]
    fn test_specifiers_in_source_order() {
        let program = parse(
            r#"
            import a from "./a"
            export * from "./b"
            const c = require("./c")
            export { d } from "lib"
            "#,
        )
        .unwrap();
        assert_eq!(program.specifiers, vec!["./a", "./b", "./c", "lib"]);
        assert!(program.has_module_syntax());
        assert!(!program.mentions_exports);
    }

    #[test]
    fn test_mentions_exports() {
        let program = parse("exports.x = 1").unwrap();
        assert!(program.mentions_exports);
        assert!(!program.has_module_syntax());
    }

    #[test]
    fn test_optional_semicolons() {
        let program = parse("let a = 1\nlet b = a\nb").unwrap();
        assert_eq!(program.body.len(), 3);
    }

    #[test]
    fn test_return_before_newline_has_no_value() {
        let program = parse("return\n42").unwrap();
        assert!(matches!(program.body[0], Stmt::Return(None)));
        assert_eq!(program.body.len(), 2);
    }

    #[test]
    fn test_nesting_limit() {
        let source = format!("x = {}1{}", "(".repeat(200), ")".repeat(200));
        let err = parse(&source).unwrap_err();
        match err {
            SyntaxError::Parse(e) => assert_eq!(e.kind, ParseErrorKind::LimitExceeded),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_error_position() {
        let err = parse("let = 3").unwrap_err();
        assert_eq!(err.position(), (1, 5));
    }
}
