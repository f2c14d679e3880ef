//! Lexer for grammar files.

use logos::Logos;

#[derive(Logos, Debug, Clone, PartialEq)]
enum LogosToken {
    #[regex(r"[ \t\r\n\f]+", logos::skip)]
    Whitespace,

    #[regex(r"//[^\n]*", logos::skip)]
    LineComment,

    #[token("/*", lex_block_comment)]
    BlockComment,

    #[regex(r"@[A-Za-z][A-Za-z0-9_]*")]
    At,

    #[regex(r"[A-Za-z_][A-Za-z0-9_\-]*")]
    Name,

    #[regex(r#""([^"\\\n]|\\[^\n])*""#)]
    #[regex(r#"'([^'\\\n]|\\[^\n])*'"#)]
    Str,

    #[regex(r"[\$!]\[([^\]\\]|\\.)*\]")]
    CharSet,

    #[token("{")]
    LeftBrace,
    #[token("}")]
    RightBrace,
    #[token("(")]
    LeftParen,
    #[token(")")]
    RightParen,
    #[token("[")]
    LeftBracket,
    #[token("]")]
    RightBracket,
    #[token("<")]
    Less,
    #[token(">")]
    Greater,
    #[token(",")]
    Comma,
    #[token("=")]
    Equal,
    #[token("|")]
    Pipe,
    #[token("*")]
    Star,
    #[token("+")]
    Plus,
    #[token("?")]
    Question,
    #[token("!")]
    Bang,
    #[token("~")]
    Tilde,
    #[token(";")]
    Semicolon,
    #[token(".")]
    Dot,
}

fn lex_block_comment(lex: &mut logos::Lexer<LogosToken>) -> logos::Skip {
    let remainder = lex.remainder();
    match remainder.find("*/") {
        Some(end) => lex.bump(end + 2),
        None => lex.bump(remainder.len()),
    }
    logos::Skip
}

/// Grammar token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Tok {
    /// `@word`, without the `@`
    At(String),
    Name(String),
    /// String literal, without its quotes
    Str(String),
    CharSet,
    LeftBrace,
    RightBrace,
    LeftParen,
    RightParen,
    LeftBracket,
    RightBracket,
    Less,
    Greater,
    Comma,
    Equal,
    Pipe,
    Star,
    Plus,
    Question,
    Bang,
    Tilde,
    Semicolon,
    Dot,
    Eof,
}

/// 1-based source position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub(crate) struct Pos {
    pub line: usize,
    pub column: usize,
}

impl std::fmt::Display for Pos {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Lexeme {
    pub tok: Tok,
    pub pos: Pos,
}

fn position(source: &str, offset: usize) -> Pos {
    let before = &source[..offset];
    let line = before.matches('\n').count() + 1;
    let line_start = before.rfind('\n').map(|i| i + 1).unwrap_or(0);
    Pos {
        line,
        column: before[line_start..].chars().count() + 1,
    }
}

/// Tokenize a grammar file. The result always ends with [`Tok::Eof`].
pub(crate) fn tokenize(source: &str) -> Result<Vec<Lexeme>, String> {
    let mut lexemes = Vec::new();
    let mut lexer = LogosToken::lexer(source);
    while let Some(result) = lexer.next() {
        let span = lexer.span();
        let pos = position(source, span.start);
        let slice = lexer.slice();
        let tok = match result {
            Ok(token) => convert(token, slice),
            Err(()) => {
                let ch = source[span.start..].chars().next().unwrap_or('?');
                return Err(format!("Unexpected character '{}' ({})", ch, pos));
            }
        };
        lexemes.push(Lexeme { tok, pos });
    }
    lexemes.push(Lexeme {
        tok: Tok::Eof,
        pos: position(source, source.len()),
    });
    Ok(lexemes)
}

fn convert(token: LogosToken, slice: &str) -> Tok {
    match token {
        LogosToken::At => Tok::At(slice[1..].to_string()),
        LogosToken::Name => Tok::Name(slice.to_string()),
        LogosToken::Str => Tok::Str(slice[1..slice.len() - 1].to_string()),
        LogosToken::CharSet => Tok::CharSet,
        LogosToken::LeftBrace => Tok::LeftBrace,
        LogosToken::RightBrace => Tok::RightBrace,
        LogosToken::LeftParen => Tok::LeftParen,
        LogosToken::RightParen => Tok::RightParen,
        LogosToken::LeftBracket => Tok::LeftBracket,
        LogosToken::RightBracket => Tok::RightBracket,
        LogosToken::Less => Tok::Less,
        LogosToken::Greater => Tok::Greater,
        LogosToken::Comma => Tok::Comma,
        LogosToken::Equal => Tok::Equal,
        LogosToken::Pipe => Tok::Pipe,
        LogosToken::Star => Tok::Star,
        LogosToken::Plus => Tok::Plus,
        LogosToken::Question => Tok::Question,
        LogosToken::Bang => Tok::Bang,
        LogosToken::Tilde => Tok::Tilde,
        LogosToken::Semicolon => Tok::Semicolon,
        LogosToken::Dot => Tok::Dot,
        // skipped by logos
        LogosToken::Whitespace | LogosToken::LineComment | LogosToken::BlockComment => Tok::Eof,
    }
}
