//! Loom script front end: lexer, parser and the type-stripping transform.
//!
//! ```ignore
//! use loom_engine::syntax::{parse_source, SourceKind};
//!
//! let program = parse_source("export const a: number = 1", SourceKind::Typed)?;
//! assert_eq!(program.body.len(), 1);
//! ```

pub mod ast;
pub mod lexer;
pub mod parser;
pub mod token;
pub mod transform;

pub use ast::Program;
pub use lexer::{LexError, Lexer};
pub use parser::{parse, ParseError, Parser, SyntaxError};
pub use token::{Span, Spanned, Token};

use std::sync::Arc;

/// How a loaded source is turned into a module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SourceKind {
    /// Loom script, no transform
    Script,
    /// Loom script with type annotations to strip
    Typed,
    /// Plain text; the module's default export is the text itself
    Text,
}

impl SourceKind {
    /// Pick the kind from a file path's extension.
    pub fn from_path(path: &str) -> Self {
        let name = path.rsplit('/').next().unwrap_or(path);
        match name.rsplit_once('.').map(|(_, ext)| ext) {
            Some("ts") | Some("tsx") | Some("mts") => SourceKind::Typed,
            Some("txt") | Some("md") => SourceKind::Text,
            _ => SourceKind::Script,
        }
    }
}

/// Parse `source` according to its kind.
pub fn parse_source(source: &str, kind: SourceKind) -> Result<Program, SyntaxError> {
    match kind {
        SourceKind::Script => parse(source),
        SourceKind::Typed => {
            let tokens = Lexer::new(source).tokenize().map_err(SyntaxError::Lex)?;
            let stripped = transform::strip_types(tokens);
            Ok(Parser::new(stripped).parse_program()?)
        }
        SourceKind::Text => Ok(text_module(source)),
    }
}

fn text_module(text: &str) -> Program {
    use ast::{ExportDecl, Expr, Stmt};
    Program {
        body: vec![Stmt::Export(ExportDecl::Default(Expr::String(Arc::from(text))))],
        specifiers: Vec::new(),
        mentions_exports: false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_from_path() {
        assert_eq!(SourceKind::from_path("/a/b.ts"), SourceKind::Typed);
        assert_eq!(SourceKind::from_path("/a/b.js"), SourceKind::Script);
        assert_eq!(SourceKind::from_path("/notes.md"), SourceKind::Text);
        assert_eq!(SourceKind::from_path("/dir.ts/file"), SourceKind::Script);
    }

    #[test]
    fn test_typed_source_parses_after_strip() {
        let program = parse_source(
            "interface I { x: number }\nexport function f(a: I): number { return a.x }",
            SourceKind::Typed,
        )
        .unwrap();
        assert_eq!(program.body.len(), 1);
    }

    #[test]
    fn test_text_module() {
        let program = parse_source("hello", SourceKind::Text).unwrap();
        assert!(program.has_module_syntax());
    }
}
