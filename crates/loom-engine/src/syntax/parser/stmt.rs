//! Statement parsing

use super::guards::LoopGuard;
use super::{expr, ParseError, Parser};
use crate::syntax::ast::*;
use crate::syntax::token::Token;
use std::sync::Arc;

/// Parse a statement.
pub fn parse_statement(parser: &mut Parser) -> Result<Stmt, ParseError> {
    parser.enter("statement")?;
    let result = parse_statement_inner(parser);
    parser.leave();
    result
}

fn parse_statement_inner(parser: &mut Parser) -> Result<Stmt, ParseError> {
    match parser.current() {
        Token::Semicolon => {
            parser.advance();
            Ok(Stmt::Empty)
        }
        Token::Import => parse_import(parser),
        Token::Export => parse_export(parser),
        Token::Const | Token::Let | Token::Var => {
            let (kind, decls) = parse_var_declaration(parser)?;
            parser.end_statement();
            Ok(Stmt::Var { kind, decls })
        }
        Token::Function if matches!(parser.peek_at(1), Token::Identifier(_)) => {
            Ok(Stmt::Function(parse_function_declaration(parser)?))
        }
        Token::Return => parse_return(parser),
        Token::If => parse_if(parser),
        Token::LeftBrace => Ok(Stmt::Block(parse_block(parser)?)),
        _ => {
            let expression = expr::parse_expression(parser)?;
            parser.end_statement();
            Ok(Stmt::Expr(expression))
        }
    }
}

/// Parse `{ stmt* }`.
pub fn parse_block(parser: &mut Parser) -> Result<Vec<Stmt>, ParseError> {
    parser.expect(&Token::LeftBrace)?;
    let mut body = Vec::new();
    let mut guard = LoopGuard::new("block");
    while !parser.check(&Token::RightBrace) && !parser.at_end() {
        guard.check()?;
        body.push(parse_statement(parser)?);
    }
    parser.expect(&Token::RightBrace)?;
    Ok(body)
}

fn parse_var_declaration(parser: &mut Parser) -> Result<(VarKind, Vec<Declarator>), ParseError> {
    let kind = match parser.advance() {
        Token::Const => VarKind::Const,
        Token::Let => VarKind::Let,
        _ => VarKind::Var,
    };

    let mut decls = Vec::new();
    let mut guard = LoopGuard::new("declarators");
    loop {
        guard.check()?;
        let span = parser.current_span();
        let name = parser.expect_identifier()?;
        parser.note_identifier(&name);
        let init = if parser.eat(&Token::Equal) {
            Some(expr::parse_assignment(parser)?)
        } else if kind == VarKind::Const {
            return Err(ParseError::invalid(
                format!("Missing initializer in const declaration '{}'", name),
                span,
            ));
        } else {
            None
        };
        decls.push(Declarator { name, init });
        if !parser.eat(&Token::Comma) {
            break;
        }
    }
    Ok((kind, decls))
}

fn parse_function_declaration(parser: &mut Parser) -> Result<Arc<Function>, ParseError> {
    parser.expect(&Token::Function)?;
    let name = parser.expect_identifier()?;
    let params = expr::parse_params(parser)?;
    let body = parse_block(parser)?;
    Ok(Arc::new(Function {
        name: Some(name),
        params,
        body: FunctionBody::Block(body),
    }))
}

fn parse_return(parser: &mut Parser) -> Result<Stmt, ParseError> {
    parser.expect(&Token::Return)?;
    let bare = parser.newline_before()
        || matches!(
            parser.current(),
            Token::Semicolon | Token::RightBrace | Token::Eof
        );
    let value = if bare {
        None
    } else {
        Some(expr::parse_expression(parser)?)
    };
    parser.end_statement();
    Ok(Stmt::Return(value))
}

fn parse_if(parser: &mut Parser) -> Result<Stmt, ParseError> {
    parser.expect(&Token::If)?;
    parser.expect(&Token::LeftParen)?;
    let test = expr::parse_expression(parser)?;
    parser.expect(&Token::RightParen)?;
    let consequent = Box::new(parse_statement(parser)?);
    let alternate = if parser.eat(&Token::Else) {
        Some(Box::new(parse_statement(parser)?))
    } else {
        None
    };
    Ok(Stmt::If {
        test,
        consequent,
        alternate,
    })
}

// ============================================================================
// Module syntax
// ============================================================================

fn parse_import(parser: &mut Parser) -> Result<Stmt, ParseError> {
    parser.expect(&Token::Import)?;

    // import "side-effect"
    if let Token::String(source) = parser.current().clone() {
        parser.advance();
        parser.record_specifier(&source);
        parser.end_statement();
        return Ok(Stmt::Import(ImportDecl {
            source,
            ..Default::default()
        }));
    }

    let mut decl = ImportDecl::default();

    if let Token::Identifier(name) = parser.current().clone() {
        parser.advance();
        decl.default = Some(name);
        if !parser.eat(&Token::Comma) {
            return finish_import(parser, decl);
        }
    }

    match parser.current() {
        Token::Star => {
            parser.advance();
            parser.expect(&Token::As)?;
            decl.namespace = Some(parser.expect_identifier()?);
        }
        Token::LeftBrace => {
            decl.named = parse_specifier_list(parser)?
                .into_iter()
                .map(|(imported, local)| ImportSpec { imported, local })
                .collect();
        }
        other => {
            return Err(ParseError::unexpected(
                other,
                "import clause",
                parser.current_span(),
            ))
        }
    }

    finish_import(parser, decl)
}

fn finish_import(parser: &mut Parser, mut decl: ImportDecl) -> Result<Stmt, ParseError> {
    parser.expect(&Token::From)?;
    decl.source = parser.expect_string()?;
    parser.record_specifier(&decl.source);
    parser.end_statement();
    Ok(Stmt::Import(decl))
}

/// Parse `{ a, b as c, }` returning `(name, alias)` pairs.
fn parse_specifier_list(parser: &mut Parser) -> Result<Vec<(String, String)>, ParseError> {
    parser.expect(&Token::LeftBrace)?;
    let mut specs = Vec::new();
    let mut guard = LoopGuard::new("specifiers");
    while !parser.check(&Token::RightBrace) {
        guard.check()?;
        let name = parser.expect_name()?;
        let alias = if parser.eat(&Token::As) {
            parser.expect_name()?
        } else {
            name.clone()
        };
        specs.push((name, alias));
        if !parser.eat(&Token::Comma) {
            break;
        }
    }
    parser.expect(&Token::RightBrace)?;
    Ok(specs)
}

fn parse_export(parser: &mut Parser) -> Result<Stmt, ParseError> {
    parser.expect(&Token::Export)?;

    let decl = match parser.current() {
        Token::Const | Token::Let | Token::Var => {
            let (kind, decls) = parse_var_declaration(parser)?;
            parser.end_statement();
            ExportDecl::Var { kind, decls }
        }
        Token::Function => ExportDecl::Function(parse_function_declaration(parser)?),
        Token::Default => {
            parser.advance();
            let value = expr::parse_assignment(parser)?;
            parser.end_statement();
            ExportDecl::Default(value)
        }
        Token::Star => {
            parser.advance();
            let alias = if parser.eat(&Token::As) {
                Some(parser.expect_name()?)
            } else {
                None
            };
            parser.expect(&Token::From)?;
            let source = parser.expect_string()?;
            parser.record_specifier(&source);
            parser.end_statement();
            ExportDecl::All { source, alias }
        }
        Token::LeftBrace => {
            let specs: Vec<ExportSpec> = parse_specifier_list(parser)?
                .into_iter()
                .map(|(local, exported)| ExportSpec { local, exported })
                .collect();
            if parser.eat(&Token::From) {
                let source = parser.expect_string()?;
                parser.record_specifier(&source);
                parser.end_statement();
                ExportDecl::From { source, specs }
            } else {
                parser.end_statement();
                ExportDecl::Named(specs)
            }
        }
        other => {
            return Err(ParseError::unexpected(
                other,
                "declaration after 'export'",
                parser.current_span(),
            ))
        }
    };

    Ok(Stmt::Export(decl))
}

#[cfg(test)]
mod tests {
    use crate::syntax::ast::*;
    use crate::syntax::parser::parse;

    #[test]
    fn test_import_forms() {
        let program = parse(
            r#"import d, { a, b as c } from "m"; import * as ns from "n"; import "side""#,
        )
        .unwrap();
        match &program.body[0] {
            Stmt::Import(decl) => {
                assert_eq!(decl.source, "m");
                assert_eq!(decl.default.as_deref(), Some("d"));
                assert_eq!(
                    decl.named,
                    vec![
                        ImportSpec { imported: "a".into(), local: "a".into() },
                        ImportSpec { imported: "b".into(), local: "c".into() },
                    ]
                );
            }
            other => panic!("unexpected {:?}", other),
        }
        match &program.body[1] {
            Stmt::Import(decl) => assert_eq!(decl.namespace.as_deref(), Some("ns")),
            other => panic!("unexpected {:?}", other),
        }
        match &program.body[2] {
            Stmt::Import(decl) => {
                assert_eq!(decl.source, "side");
                assert!(decl.default.is_none() && decl.named.is_empty());
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_export_forms() {
        let program = parse(
            r#"
            export const a = 1, b = 2
            export function f() {}
            export default f
            export { a as x, b }
            export { y as default } from "./y"
            export * as ns from "./ns"
            "#,
        )
        .unwrap();
        assert_eq!(program.body.len(), 6);
        assert!(matches!(&program.body[0], Stmt::Export(ExportDecl::Var { decls, .. }) if decls.len() == 2));
        assert!(matches!(&program.body[1], Stmt::Export(ExportDecl::Function(_))));
        assert!(matches!(&program.body[2], Stmt::Export(ExportDecl::Default(_))));
        assert!(matches!(&program.body[3], Stmt::Export(ExportDecl::Named(specs)) if specs[0].exported == "x"));
        assert!(matches!(&program.body[4], Stmt::Export(ExportDecl::From { specs, .. }) if specs[0].exported == "default"));
        assert!(matches!(&program.body[5], Stmt::Export(ExportDecl::All { alias: Some(ns), .. }) if ns == "ns"));
    }

    #[test]
    fn test_const_requires_initializer() {
        assert!(parse("const a").is_err());
        assert!(parse("let a").is_ok());
    }

    #[test]
    fn test_if_else_chain() {
        let program = parse("if (a) { b } else if (c) d; else e").unwrap();
        match &program.body[0] {
            Stmt::If { alternate: Some(alt), .. } => {
                assert!(matches!(**alt, Stmt::If { alternate: Some(_), .. }))
            }
            other => panic!("unexpected {:?}", other),
        }
    }
}
