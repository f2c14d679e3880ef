//! Token definitions for Loom script.
//!
//! Tokens carry their span plus a flag telling whether a line break
//! separates them from the previous token. Statement terminators are
//! optional, so the type-stripping pass uses that flag to find the end of
//! `type` aliases written without a semicolon.

use std::fmt;

/// A token of Loom script.
#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    // Module keywords
    Import,
    Export,
    From,
    As,
    Default,

    // Declarations
    Const,
    Let,
    Var,
    Function,

    // Control flow
    Return,
    If,
    Else,

    // Operators spelled as words
    New,
    Typeof,

    // Literals
    True,
    False,
    Null,
    Undefined,
    Number(f64),
    String(String),
    Identifier(String),

    // Delimiters
    LeftBrace,
    RightBrace,
    LeftParen,
    RightParen,
    LeftBracket,
    RightBracket,
    Comma,
    Semicolon,
    Colon,
    Dot,
    Ellipsis,
    Question,
    Arrow,

    // Operators
    Equal,
    EqualEqual,
    EqualEqualEqual,
    BangEqual,
    BangEqualEqual,
    Less,
    LessEqual,
    Greater,
    GreaterEqual,
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Bang,
    AmpAmp,
    PipePipe,
    QuestionQuestion,
    Pipe,
    Amp,

    /// End of input
    Eof,
}

impl Token {
    /// Words that may be used as property names and import/export names
    /// even though they are keywords.
    pub fn keyword_text(&self) -> Option<&'static str> {
        Some(match self {
            Token::Import => "import",
            Token::Export => "export",
            Token::From => "from",
            Token::As => "as",
            Token::Default => "default",
            Token::Const => "const",
            Token::Let => "let",
            Token::Var => "var",
            Token::Function => "function",
            Token::Return => "return",
            Token::If => "if",
            Token::Else => "else",
            Token::New => "new",
            Token::Typeof => "typeof",
            Token::True => "true",
            Token::False => "false",
            Token::Null => "null",
            Token::Undefined => "undefined",
            _ => return None,
        })
    }

    /// Whether an expression can end with this token.
    ///
    /// Used by the type-stripping pass to tell a postfix `!` or an `as`
    /// cast apart from their prefix/keyword uses.
    pub fn ends_expression(&self) -> bool {
        matches!(
            self,
            Token::Identifier(_)
                | Token::Number(_)
                | Token::String(_)
                | Token::True
                | Token::False
                | Token::Null
                | Token::Undefined
                | Token::RightParen
                | Token::RightBracket
                | Token::RightBrace
        )
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(word) = self.keyword_text() {
            return write!(f, "{}", word);
        }
        match self {
            Token::Number(n) => write!(f, "{}", n),
            Token::String(s) => write!(f, "{:?}", s),
            Token::Identifier(name) => write!(f, "{}", name),
            Token::LeftBrace => write!(f, "{{"),
            Token::RightBrace => write!(f, "}}"),
            Token::LeftParen => write!(f, "("),
            Token::RightParen => write!(f, ")"),
            Token::LeftBracket => write!(f, "["),
            Token::RightBracket => write!(f, "]"),
            Token::Comma => write!(f, ","),
            Token::Semicolon => write!(f, ";"),
            Token::Colon => write!(f, ":"),
            Token::Dot => write!(f, "."),
            Token::Ellipsis => write!(f, "..."),
            Token::Question => write!(f, "?"),
            Token::Arrow => write!(f, "=>"),
            Token::Equal => write!(f, "="),
            Token::EqualEqual => write!(f, "=="),
            Token::EqualEqualEqual => write!(f, "==="),
            Token::BangEqual => write!(f, "!="),
            Token::BangEqualEqual => write!(f, "!=="),
            Token::Less => write!(f, "<"),
            Token::LessEqual => write!(f, "<="),
            Token::Greater => write!(f, ">"),
            Token::GreaterEqual => write!(f, ">="),
            Token::Plus => write!(f, "+"),
            Token::Minus => write!(f, "-"),
            Token::Star => write!(f, "*"),
            Token::Slash => write!(f, "/"),
            Token::Percent => write!(f, "%"),
            Token::Bang => write!(f, "!"),
            Token::AmpAmp => write!(f, "&&"),
            Token::PipePipe => write!(f, "||"),
            Token::QuestionQuestion => write!(f, "??"),
            Token::Pipe => write!(f, "|"),
            Token::Amp => write!(f, "&"),
            Token::Eof => write!(f, "end of input"),
            _ => unreachable!("keywords are handled above"),
        }
    }
}

/// Source location of a token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Span {
    /// Byte offset of the first character
    pub start: usize,
    /// Byte offset one past the last character
    pub end: usize,
    /// 1-based line
    pub line: u32,
    /// 1-based column
    pub column: u32,
}

impl Span {
    pub fn new(start: usize, end: usize, line: u32, column: u32) -> Self {
        Self {
            start,
            end,
            line,
            column,
        }
    }
}

/// A token together with its location.
#[derive(Debug, Clone, PartialEq)]
pub struct Spanned {
    pub token: Token,
    pub span: Span,
    /// A line break occurs between the previous token and this one.
    pub newline_before: bool,
}
