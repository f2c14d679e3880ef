//! Lexer for Loom script.
//!
//! Built on logos. The logos token enum is internal; its output is
//! converted to [`Token`] with a [`Span`] computed from a line-start table.

use crate::syntax::token::{Span, Spanned, Token};
use logos::Logos;

#[derive(Logos, Debug, Clone, PartialEq)]
enum LogosToken {
    #[regex(r"[ \t\r\n\f]+", logos::skip)]
    Whitespace,

    #[regex(r"//[^\n]*", logos::skip)]
    LineComment,

    #[token("/*", lex_block_comment)]
    BlockComment,

    #[token("import")]
    Import,
    #[token("export")]
    Export,
    #[token("from")]
    From,
    #[token("as")]
    As,
    #[token("default")]
    Default,
    #[token("const")]
    Const,
    #[token("let")]
    Let,
    #[token("var")]
    Var,
    #[token("function")]
    Function,
    #[token("return")]
    Return,
    #[token("if")]
    If,
    #[token("else")]
    Else,
    #[token("new")]
    New,
    #[token("typeof")]
    Typeof,
    #[token("true")]
    True,
    #[token("false")]
    False,
    #[token("null")]
    Null,
    #[token("undefined")]
    Undefined,

    #[regex(r"0[xX][0-9a-fA-F]+", parse_hex)]
    HexNumber(f64),

    #[regex(r"[0-9]+(\.[0-9]+)?([eE][+-]?[0-9]+)?", parse_number)]
    #[regex(r"\.[0-9]+([eE][+-]?[0-9]+)?", parse_number)]
    Number(f64),

    // Raw text including quotes; escapes are decoded during conversion.
    #[regex(r#""([^"\\\n]|\\[^\n])*""#)]
    #[regex(r#"'([^'\\\n]|\\[^\n])*'"#)]
    String,

    #[regex(r"[A-Za-z_$][A-Za-z0-9_$]*")]
    Identifier,

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
    #[token(",")]
    Comma,
    #[token(";")]
    Semicolon,
    #[token(":")]
    Colon,
    #[token(".")]
    Dot,
    #[token("...")]
    Ellipsis,
    #[token("?")]
    Question,
    #[token("=>")]
    Arrow,
    #[token("=")]
    Equal,
    #[token("==")]
    EqualEqual,
    #[token("===")]
    EqualEqualEqual,
    #[token("!=")]
    BangEqual,
    #[token("!==")]
    BangEqualEqual,
    #[token("<")]
    Less,
    #[token("<=")]
    LessEqual,
    #[token(">")]
    Greater,
    #[token(">=")]
    GreaterEqual,
    #[token("+")]
    Plus,
    #[token("-")]
    Minus,
    #[token("*")]
    Star,
    #[token("/")]
    Slash,
    #[token("%")]
    Percent,
    #[token("!")]
    Bang,
    #[token("&&")]
    AmpAmp,
    #[token("||")]
    PipePipe,
    #[token("??")]
    QuestionQuestion,
    #[token("|")]
    Pipe,
    #[token("&")]
    Amp,
}

fn lex_block_comment(lex: &mut logos::Lexer<LogosToken>) -> logos::Skip {
    let remainder = lex.remainder();
    match remainder.find("*/") {
        Some(end) => lex.bump(end + 2),
        None => lex.bump(remainder.len()),
    }
    logos::Skip
}

fn parse_hex(lex: &mut logos::Lexer<LogosToken>) -> Option<f64> {
    u64::from_str_radix(&lex.slice()[2..], 16)
        .ok()
        .map(|n| n as f64)
}

fn parse_number(lex: &mut logos::Lexer<LogosToken>) -> Option<f64> {
    lex.slice().parse().ok()
}

/// Lexer error types.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum LexError {
    #[error("Unexpected character '{char}' at {}:{}", span.line, span.column)]
    UnexpectedCharacter { char: char, span: Span },

    #[error("Unterminated string literal at {}:{}", span.line, span.column)]
    UnterminatedString { span: Span },

    #[error("Invalid escape sequence '{escape}' at {}:{}", span.line, span.column)]
    InvalidEscape { escape: String, span: Span },
}

impl LexError {
    pub fn span(&self) -> &Span {
        match self {
            LexError::UnexpectedCharacter { span, .. }
            | LexError::UnterminatedString { span }
            | LexError::InvalidEscape { span, .. } => span,
        }
    }

    /// A hint for fixing this error
    pub fn hint(&self) -> Option<String> {
        match self {
            LexError::UnterminatedString { .. } => {
                Some("Add a closing quote to terminate the string".to_string())
            }
            LexError::InvalidEscape { .. } => Some(
                "Valid escapes are \\n \\r \\t \\\\ \\' \\\" \\0 \\xHH \\uHHHH \\u{H..}".to_string(),
            ),
            LexError::UnexpectedCharacter { .. } => None,
        }
    }
}

/// Byte offsets at which each line starts.
struct LineIndex {
    starts: Vec<usize>,
}

impl LineIndex {
    fn new(source: &str) -> Self {
        let mut starts = vec![0];
        starts.extend(
            source
                .bytes()
                .enumerate()
                .filter(|(_, b)| *b == b'\n')
                .map(|(i, _)| i + 1),
        );
        Self { starts }
    }

    fn span(&self, source: &str, start: usize, end: usize) -> Span {
        let line = match self.starts.binary_search(&start) {
            Ok(line) => line,
            Err(next) => next - 1,
        };
        let column = source[self.starts[line]..start].chars().count() + 1;
        Span::new(start, end, line as u32 + 1, column as u32)
    }
}

/// Lexer for Loom script source text.
pub struct Lexer<'a> {
    source: &'a str,
    lines: LineIndex,
}

impl<'a> Lexer<'a> {
    pub fn new(source: &'a str) -> Self {
        Self {
            source,
            lines: LineIndex::new(source),
        }
    }

    /// Tokenize the whole source. The returned stream always ends with
    /// [`Token::Eof`].
    pub fn tokenize(self) -> Result<Vec<Spanned>, Vec<LexError>> {
        let mut tokens = Vec::new();
        let mut errors = Vec::new();
        let mut lex = LogosToken::lexer(self.source);
        let mut prev_end = 0;

        while let Some(result) = lex.next() {
            let range = lex.span();
            let span = self.lines.span(self.source, range.start, range.end);
            let newline_before = self.source[prev_end..range.start].contains('\n');
            prev_end = range.end;

            let token = match result {
                Ok(kind) => match self.convert(kind, lex.slice(), span) {
                    Ok(token) => token,
                    Err(err) => {
                        errors.push(err);
                        continue;
                    }
                },
                Err(()) => {
                    let slice = lex.slice();
                    let first = slice.chars().next().unwrap_or('\0');
                    errors.push(if first == '"' || first == '\'' {
                        LexError::UnterminatedString { span }
                    } else {
                        LexError::UnexpectedCharacter { char: first, span }
                    });
                    continue;
                }
            };

            tokens.push(Spanned {
                token,
                span,
                newline_before,
            });
        }

        if !errors.is_empty() {
            return Err(errors);
        }

        let end = self.source.len();
        tokens.push(Spanned {
            token: Token::Eof,
            span: self.lines.span(self.source, end, end),
            newline_before: self.source[prev_end..].contains('\n'),
        });
        Ok(tokens)
    }

    fn convert(&self, kind: LogosToken, slice: &str, span: Span) -> Result<Token, LexError> {
        Ok(match kind {
            LogosToken::Import => Token::Import,
            LogosToken::Export => Token::Export,
            LogosToken::From => Token::From,
            LogosToken::As => Token::As,
            LogosToken::Default => Token::Default,
            LogosToken::Const => Token::Const,
            LogosToken::Let => Token::Let,
            LogosToken::Var => Token::Var,
            LogosToken::Function => Token::Function,
            LogosToken::Return => Token::Return,
            LogosToken::If => Token::If,
            LogosToken::Else => Token::Else,
            LogosToken::New => Token::New,
            LogosToken::Typeof => Token::Typeof,
            LogosToken::True => Token::True,
            LogosToken::False => Token::False,
            LogosToken::Null => Token::Null,
            LogosToken::Undefined => Token::Undefined,
            LogosToken::HexNumber(n) | LogosToken::Number(n) => Token::Number(n),
            LogosToken::String => Token::String(unescape(&slice[1..slice.len() - 1], span)?),
            LogosToken::Identifier => Token::Identifier(slice.to_string()),
            LogosToken::LeftBrace => Token::LeftBrace,
            LogosToken::RightBrace => Token::RightBrace,
            LogosToken::LeftParen => Token::LeftParen,
            LogosToken::RightParen => Token::RightParen,
            LogosToken::LeftBracket => Token::LeftBracket,
            LogosToken::RightBracket => Token::RightBracket,
            LogosToken::Comma => Token::Comma,
            LogosToken::Semicolon => Token::Semicolon,
            LogosToken::Colon => Token::Colon,
            LogosToken::Dot => Token::Dot,
            LogosToken::Ellipsis => Token::Ellipsis,
            LogosToken::Question => Token::Question,
            LogosToken::Arrow => Token::Arrow,
            LogosToken::Equal => Token::Equal,
            LogosToken::EqualEqual => Token::EqualEqual,
            LogosToken::EqualEqualEqual => Token::EqualEqualEqual,
            LogosToken::BangEqual => Token::BangEqual,
            LogosToken::BangEqualEqual => Token::BangEqualEqual,
            LogosToken::Less => Token::Less,
            LogosToken::LessEqual => Token::LessEqual,
            LogosToken::Greater => Token::Greater,
            LogosToken::GreaterEqual => Token::GreaterEqual,
            LogosToken::Plus => Token::Plus,
            LogosToken::Minus => Token::Minus,
            LogosToken::Star => Token::Star,
            LogosToken::Slash => Token::Slash,
            LogosToken::Percent => Token::Percent,
            LogosToken::Bang => Token::Bang,
            LogosToken::AmpAmp => Token::AmpAmp,
            LogosToken::PipePipe => Token::PipePipe,
            LogosToken::QuestionQuestion => Token::QuestionQuestion,
            LogosToken::Pipe => Token::Pipe,
            LogosToken::Amp => Token::Amp,
            LogosToken::Whitespace | LogosToken::LineComment | LogosToken::BlockComment => {
                return Err(LexError::UnexpectedCharacter {
                    char: slice.chars().next().unwrap_or(' '),
                    span,
                })
            }
        })
    }
}

fn unescape(raw: &str, span: Span) -> Result<String, LexError> {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars().peekable();

    let invalid = |escape: String| LexError::InvalidEscape { escape, span };

    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('t') => out.push('\t'),
            Some('\\') => out.push('\\'),
            Some('\'') => out.push('\''),
            Some('"') => out.push('"'),
            Some('0') => out.push('\0'),
            Some('x') => {
                let hex: String = chars.by_ref().take(2).collect();
                let code = u32::from_str_radix(&hex, 16).map_err(|_| invalid(format!("\\x{}", hex)))?;
                out.push(char::from_u32(code).ok_or_else(|| invalid(format!("\\x{}", hex)))?);
            }
            Some('u') => {
                let hex: String = if chars.peek() == Some(&'{') {
                    chars.next();
                    let hex: String = chars.by_ref().take_while(|c| *c != '}').collect();
                    hex
                } else {
                    chars.by_ref().take(4).collect()
                };
                let code = u32::from_str_radix(&hex, 16).map_err(|_| invalid(format!("\\u{}", hex)))?;
                out.push(char::from_u32(code).ok_or_else(|| invalid(format!("\\u{}", hex)))?);
            }
            Some(other) => out.push(other),
            None => return Err(invalid("\\".to_string())),
        }
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<Token> {
        Lexer::new(source)
            .tokenize()
            .unwrap()
            .into_iter()
            .map(|t| t.token)
            .collect()
    }

    #[test]
    fn test_keywords_and_identifiers() {
        assert_eq!(
            kinds("import exports from 'x'"),
            vec![
                Token::Import,
                Token::Identifier("exports".into()),
                Token::From,
                Token::String("x".into()),
                Token::Eof,
            ]
        );
    }

    #[test]
    fn test_longest_match_operators() {
        assert_eq!(
            kinds("a === b !== c => ...d ?? e"),
            vec![
                Token::Identifier("a".into()),
                Token::EqualEqualEqual,
                Token::Identifier("b".into()),
                Token::BangEqualEqual,
                Token::Identifier("c".into()),
                Token::Arrow,
                Token::Ellipsis,
                Token::Identifier("d".into()),
                Token::QuestionQuestion,
                Token::Identifier("e".into()),
                Token::Eof,
            ]
        );
    }

    #[test]
    fn test_numbers() {
        assert_eq!(
            kinds("1 2.5 0x10 1e3 .5"),
            vec![
                Token::Number(1.0),
                Token::Number(2.5),
                Token::Number(16.0),
                Token::Number(1000.0),
                Token::Number(0.5),
                Token::Eof,
            ]
        );
    }

    #[test]
    fn test_string_escapes() {
        assert_eq!(
            kinds(r#""a\n\x41B\u{43}\"""#),
            vec![Token::String("a\nABC\"".into()), Token::Eof]
        );
    }

    #[test]
    fn test_comments_skipped() {
        assert_eq!(
            kinds("a // line\n/* block\n */ b"),
            vec![
                Token::Identifier("a".into()),
                Token::Identifier("b".into()),
                Token::Eof,
            ]
        );
    }

    #[test]
    fn test_newline_flag_and_position() {
        let tokens = Lexer::new("a\n  b c").tokenize().unwrap();
        assert!(!tokens[0].newline_before);
        assert!(tokens[1].newline_before);
        assert_eq!((tokens[1].span.line, tokens[1].span.column), (2, 3));
        assert!(!tokens[2].newline_before);
    }

    #[test]
    fn test_unterminated_string() {
        let errors = Lexer::new("x = 'abc").tokenize().unwrap_err();
        assert!(matches!(errors[0], LexError::UnterminatedString { .. }));
    }

    #[test]
    fn test_unexpected_character() {
        let errors = Lexer::new("a # b").tokenize().unwrap_err();
        assert_eq!(
            errors[0],
            LexError::UnexpectedCharacter {
                char: '#',
                span: Span::new(2, 3, 1, 3)
            }
        );
    }
}
