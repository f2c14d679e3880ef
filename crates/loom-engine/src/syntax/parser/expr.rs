//! Expression parsing (precedence climbing by hand, lowest first)

use super::guards::LoopGuard;
use super::{stmt, ParseError, Parser};
use crate::syntax::ast::*;
use crate::syntax::token::Token;
use std::sync::Arc;

pub fn parse_expression(parser: &mut Parser) -> Result<Expr, ParseError> {
    parse_assignment(parser)
}

pub fn parse_assignment(parser: &mut Parser) -> Result<Expr, ParseError> {
    parser.enter("expression")?;
    let result = parse_assignment_inner(parser);
    parser.leave();
    result
}

fn parse_assignment_inner(parser: &mut Parser) -> Result<Expr, ParseError> {
    if arrow_ahead(parser) {
        return parse_arrow(parser);
    }

    let span = parser.current_span();
    let left = parse_conditional(parser)?;
    if !parser.check(&Token::Equal) {
        return Ok(left);
    }
    if !matches!(left, Expr::Ident(_) | Expr::Member { .. } | Expr::Index { .. }) {
        return Err(ParseError::invalid("Invalid assignment target", span));
    }
    parser.advance();
    let value = parse_assignment(parser)?;
    Ok(Expr::Assign {
        target: Box::new(left),
        value: Box::new(value),
    })
}

fn parse_conditional(parser: &mut Parser) -> Result<Expr, ParseError> {
    let test = parse_nullish(parser)?;
    if !parser.eat(&Token::Question) {
        return Ok(test);
    }
    let consequent = parse_assignment(parser)?;
    parser.expect(&Token::Colon)?;
    let alternate = parse_assignment(parser)?;
    Ok(Expr::Conditional {
        test: Box::new(test),
        consequent: Box::new(consequent),
        alternate: Box::new(alternate),
    })
}

fn parse_nullish(parser: &mut Parser) -> Result<Expr, ParseError> {
    let mut left = parse_or(parser)?;
    while parser.eat(&Token::QuestionQuestion) {
        let right = parse_or(parser)?;
        left = logical(LogicalOp::Nullish, left, right);
    }
    Ok(left)
}

fn parse_or(parser: &mut Parser) -> Result<Expr, ParseError> {
    let mut left = parse_and(parser)?;
    while parser.eat(&Token::PipePipe) {
        let right = parse_and(parser)?;
        left = logical(LogicalOp::Or, left, right);
    }
    Ok(left)
}

fn parse_and(parser: &mut Parser) -> Result<Expr, ParseError> {
    let mut left = parse_bit_or(parser)?;
    while parser.eat(&Token::AmpAmp) {
        let right = parse_bit_or(parser)?;
        left = logical(LogicalOp::And, left, right);
    }
    Ok(left)
}

fn parse_bit_or(parser: &mut Parser) -> Result<Expr, ParseError> {
    let mut left = parse_bit_and(parser)?;
    while parser.eat(&Token::Pipe) {
        let right = parse_bit_and(parser)?;
        left = binary(BinaryOp::BitOr, left, right);
    }
    Ok(left)
}

fn parse_bit_and(parser: &mut Parser) -> Result<Expr, ParseError> {
    let mut left = parse_equality(parser)?;
    while parser.eat(&Token::Amp) {
        let right = parse_equality(parser)?;
        left = binary(BinaryOp::BitAnd, left, right);
    }
    Ok(left)
}

fn parse_equality(parser: &mut Parser) -> Result<Expr, ParseError> {
    let mut left = parse_relational(parser)?;
    loop {
        let op = match parser.current() {
            Token::EqualEqual => BinaryOp::Eq,
            Token::BangEqual => BinaryOp::NotEq,
            Token::EqualEqualEqual => BinaryOp::StrictEq,
            Token::BangEqualEqual => BinaryOp::StrictNotEq,
            _ => return Ok(left),
        };
        parser.advance();
        let right = parse_relational(parser)?;
        left = binary(op, left, right);
    }
}

fn parse_relational(parser: &mut Parser) -> Result<Expr, ParseError> {
    let mut left = parse_additive(parser)?;
    loop {
        let op = match parser.current() {
            Token::Less => BinaryOp::Lt,
            Token::LessEqual => BinaryOp::LtEq,
            Token::Greater => BinaryOp::Gt,
            Token::GreaterEqual => BinaryOp::GtEq,
            _ => return Ok(left),
        };
        parser.advance();
        let right = parse_additive(parser)?;
        left = binary(op, left, right);
    }
}

fn parse_additive(parser: &mut Parser) -> Result<Expr, ParseError> {
    let mut left = parse_multiplicative(parser)?;
    loop {
        let op = match parser.current() {
            Token::Plus => BinaryOp::Add,
            Token::Minus => BinaryOp::Sub,
            _ => return Ok(left),
        };
        parser.advance();
        let right = parse_multiplicative(parser)?;
        left = binary(op, left, right);
    }
}

fn parse_multiplicative(parser: &mut Parser) -> Result<Expr, ParseError> {
    let mut left = parse_unary(parser)?;
    loop {
        let op = match parser.current() {
            Token::Star => BinaryOp::Mul,
            Token::Slash => BinaryOp::Div,
            Token::Percent => BinaryOp::Rem,
            _ => return Ok(left),
        };
        parser.advance();
        let right = parse_unary(parser)?;
        left = binary(op, left, right);
    }
}

fn parse_unary(parser: &mut Parser) -> Result<Expr, ParseError> {
    let op = match parser.current() {
        Token::Bang => UnaryOp::Not,
        Token::Minus => UnaryOp::Neg,
        Token::Plus => UnaryOp::Plus,
        Token::Typeof => UnaryOp::Typeof,
        _ => return parse_postfix(parser),
    };
    parser.advance();
    parser.enter("unary expression")?;
    let arg = parse_unary(parser);
    parser.leave();
    Ok(Expr::Unary {
        op,
        arg: Box::new(arg?),
    })
}

fn parse_postfix(parser: &mut Parser) -> Result<Expr, ParseError> {
    let mut expr = if parser.check(&Token::New) {
        parse_new(parser)?
    } else {
        parse_primary(parser)?
    };

    let mut guard = LoopGuard::new("postfix");
    loop {
        guard.check()?;
        match parser.current() {
            Token::Dot => {
                parser.advance();
                let property = parser.expect_name()?;
                expr = Expr::Member {
                    object: Box::new(expr),
                    property,
                };
            }
            Token::LeftBracket => {
                parser.advance();
                let index = parse_expression(parser)?;
                parser.expect(&Token::RightBracket)?;
                expr = Expr::Index {
                    object: Box::new(expr),
                    index: Box::new(index),
                };
            }
            Token::LeftParen => {
                let args = parse_arguments(parser)?;
                expr = make_call(parser, expr, args);
            }
            _ => return Ok(expr),
        }
    }
}

/// `new Callee(args)` is treated as a plain call of `Callee`.
fn parse_new(parser: &mut Parser) -> Result<Expr, ParseError> {
    parser.expect(&Token::New)?;
    let mut callee = parse_primary(parser)?;
    let mut guard = LoopGuard::new("new callee");
    while parser.eat(&Token::Dot) {
        guard.check()?;
        let property = parser.expect_name()?;
        callee = Expr::Member {
            object: Box::new(callee),
            property,
        };
    }
    let args = if parser.check(&Token::LeftParen) {
        parse_arguments(parser)?
    } else {
        Vec::new()
    };
    Ok(Expr::Call {
        callee: Box::new(callee),
        args,
    })
}

fn make_call(parser: &mut Parser, callee: Expr, args: Vec<Element>) -> Expr {
    if let (Expr::Ident(name), [Element::Expr(Expr::String(spec))]) = (&callee, args.as_slice()) {
        if name == "require" {
            parser.record_specifier(spec);
            return Expr::Require(spec.to_string());
        }
    }
    Expr::Call {
        callee: Box::new(callee),
        args,
    }
}

fn parse_arguments(parser: &mut Parser) -> Result<Vec<Element>, ParseError> {
    parser.expect(&Token::LeftParen)?;
    let args = parse_elements(parser, &Token::RightParen)?;
    parser.expect(&Token::RightParen)?;
    Ok(args)
}

/// Comma separated expressions with optional `...spread`, up to `close`.
fn parse_elements(parser: &mut Parser, close: &Token) -> Result<Vec<Element>, ParseError> {
    let mut elements = Vec::new();
    let mut guard = LoopGuard::new("elements");
    while !parser.check(close) {
        guard.check()?;
        if parser.eat(&Token::Ellipsis) {
            elements.push(Element::Spread(parse_assignment(parser)?));
        } else {
            elements.push(Element::Expr(parse_assignment(parser)?));
        }
        if !parser.eat(&Token::Comma) {
            break;
        }
    }
    Ok(elements)
}

fn parse_primary(parser: &mut Parser) -> Result<Expr, ParseError> {
    let span = parser.current_span();
    match parser.advance() {
        Token::Number(n) => Ok(Expr::Number(n)),
        Token::String(s) => Ok(Expr::String(Arc::from(s))),
        Token::True => Ok(Expr::Bool(true)),
        Token::False => Ok(Expr::Bool(false)),
        Token::Null => Ok(Expr::Null),
        Token::Undefined => Ok(Expr::Undefined),
        Token::Identifier(name) => {
            parser.note_identifier(&name);
            Ok(Expr::Ident(name))
        }
        Token::LeftParen => {
            let inner = parse_expression(parser)?;
            parser.expect(&Token::RightParen)?;
            Ok(inner)
        }
        Token::LeftBracket => {
            let elements = parse_elements(parser, &Token::RightBracket)?;
            parser.expect(&Token::RightBracket)?;
            Ok(Expr::Array(elements))
        }
        Token::LeftBrace => parse_object(parser),
        Token::Function => {
            let name = match parser.current().clone() {
                Token::Identifier(name) => {
                    parser.advance();
                    Some(name)
                }
                _ => None,
            };
            let params = parse_params(parser)?;
            let body = stmt::parse_block(parser)?;
            Ok(Expr::Function(Arc::new(Function {
                name,
                params,
                body: FunctionBody::Block(body),
            })))
        }
        other => Err(ParseError::unexpected(&other, "expression", span)),
    }
}

/// Object literal; the opening brace is already consumed.
fn parse_object(parser: &mut Parser) -> Result<Expr, ParseError> {
    let mut props = Vec::new();
    let mut guard = LoopGuard::new("object literal");
    while !parser.check(&Token::RightBrace) {
        guard.check()?;
        if parser.eat(&Token::Ellipsis) {
            props.push(ObjectProp::Spread(parse_assignment(parser)?));
        } else {
            let span = parser.current_span();
            let (key, shorthand) = match parser.current().clone() {
                Token::String(s) => {
                    parser.advance();
                    (PropKey::Static(s), None)
                }
                Token::Number(n) => {
                    parser.advance();
                    (PropKey::Static(format_number_key(n)), None)
                }
                Token::LeftBracket => {
                    parser.advance();
                    let key = parse_assignment(parser)?;
                    parser.expect(&Token::RightBracket)?;
                    (PropKey::Computed(key), None)
                }
                Token::Identifier(name) => {
                    parser.advance();
                    (PropKey::Static(name.clone()), Some(name))
                }
                _ => {
                    let name = parser.expect_name()?;
                    (PropKey::Static(name), None)
                }
            };

            let value = if parser.eat(&Token::Colon) {
                parse_assignment(parser)?
            } else if parser.check(&Token::LeftParen) {
                // method shorthand
                let params = parse_params(parser)?;
                let body = stmt::parse_block(parser)?;
                let name = match &key {
                    PropKey::Static(s) => Some(s.clone()),
                    PropKey::Computed(_) => None,
                };
                Expr::Function(Arc::new(Function {
                    name,
                    params,
                    body: FunctionBody::Block(body),
                }))
            } else if let Some(name) = shorthand {
                parser.note_identifier(&name);
                Expr::Ident(name)
            } else {
                return Err(ParseError::unexpected(parser.current(), "':'", span));
            };
            props.push(ObjectProp::KeyValue(key, value));
        }
        if !parser.eat(&Token::Comma) {
            break;
        }
    }
    parser.expect(&Token::RightBrace)?;
    Ok(Expr::Object(props))
}

fn format_number_key(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        n.to_string()
    }
}

/// Parse `(a, b = 1, ...rest)`.
pub fn parse_params(parser: &mut Parser) -> Result<Vec<Param>, ParseError> {
    parser.expect(&Token::LeftParen)?;
    let mut params = Vec::new();
    let mut guard = LoopGuard::new("parameters");
    while !parser.check(&Token::RightParen) {
        guard.check()?;
        let rest = parser.eat(&Token::Ellipsis);
        let name = parser.expect_identifier()?;
        let default = if parser.eat(&Token::Equal) {
            Some(parse_assignment(parser)?)
        } else {
            None
        };
        params.push(Param {
            name,
            default,
            rest,
        });
        if !parser.eat(&Token::Comma) {
            break;
        }
    }
    parser.expect(&Token::RightParen)?;
    Ok(params)
}

// ============================================================================
// Arrow functions
// ============================================================================

/// Whether the upcoming tokens start an arrow function: `x =>` or a
/// balanced `( .. )` followed by `=>`.
fn arrow_ahead(parser: &Parser) -> bool {
    match parser.current() {
        Token::Identifier(_) => matches!(parser.peek_at(1), Token::Arrow),
        Token::LeftParen => {
            let mut depth = 0usize;
            let mut offset = 0;
            loop {
                match parser.peek_at(offset) {
                    Token::LeftParen | Token::LeftBracket | Token::LeftBrace => depth += 1,
                    Token::RightParen | Token::RightBracket | Token::RightBrace => {
                        depth -= 1;
                        if depth == 0 {
                            return matches!(parser.peek_at(offset + 1), Token::Arrow);
                        }
                    }
                    Token::Eof => return false,
                    _ => {}
                }
                offset += 1;
            }
        }
        _ => false,
    }
}

fn parse_arrow(parser: &mut Parser) -> Result<Expr, ParseError> {
    let params = if let Token::Identifier(name) = parser.current().clone() {
        parser.advance();
        vec![Param {
            name,
            default: None,
            rest: false,
        }]
    } else {
        parse_params(parser)?
    };
    parser.expect(&Token::Arrow)?;
    let body = if parser.check(&Token::LeftBrace) {
        FunctionBody::Block(stmt::parse_block(parser)?)
    } else {
        FunctionBody::Expr(parse_assignment(parser)?)
    };
    Ok(Expr::Function(Arc::new(Function {
        name: None,
        params,
        body,
    })))
}

fn binary(op: BinaryOp, left: Expr, right: Expr) -> Expr {
    Expr::Binary {
        op,
        left: Box::new(left),
        right: Box::new(right),
    }
}

fn logical(op: LogicalOp, left: Expr, right: Expr) -> Expr {
    Expr::Logical {
        op,
        left: Box::new(left),
        right: Box::new(right),
    }
}

#[cfg(test)]
mod tests {
    use crate::syntax::ast::*;
    use crate::syntax::parser::parse;

    fn expr(source: &str) -> Expr {
        match parse(source).unwrap().body.into_iter().next() {
            Some(Stmt::Expr(e)) => e,
            other => panic!("expected expression statement, got {:?}", other),
        }
    }

    #[test]
    fn test_precedence() {
        match expr("1 + 2 * 3") {
            Expr::Binary { op: BinaryOp::Add, right, .. } => {
                assert!(matches!(*right, Expr::Binary { op: BinaryOp::Mul, .. }))
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_assignment_is_right_associative() {
        match expr("a = b = 1") {
            Expr::Assign { value, .. } => assert!(matches!(*value, Expr::Assign { .. })),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_invalid_assignment_target() {
        assert!(parse("1 = 2").is_err());
    }

    #[test]
    fn test_arrow_forms() {
        assert!(matches!(expr("x => x + 1"), Expr::Function(f) if f.params.len() == 1));
        assert!(matches!(expr("(a, b) => { return a }"), Expr::Function(f) if f.params.len() == 2));
        assert!(matches!(expr("() => ({})"), Expr::Function(f) if matches!(f.body, FunctionBody::Expr(Expr::Object(_)))));
        assert!(matches!(expr("(a)"), Expr::Ident(_)));
    }

    #[test]
    fn test_require_literal() {
        assert!(matches!(expr("require('x')"), Expr::Require(s) if s == "x"));
        assert!(matches!(expr("require(name)"), Expr::Call { .. }));
    }

    #[test]
    fn test_new_is_call() {
        match expr("new a.B(1, 2)") {
            Expr::Call { callee, args } => {
                assert!(matches!(*callee, Expr::Member { .. }));
                assert_eq!(args.len(), 2);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_object_literal_keys() {
        match expr("({a: 1, b, 'c-d': 2, [k]: 3, ...rest, m() { return 1 }, default: 4})") {
            Expr::Object(props) => assert_eq!(props.len(), 7),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_keyword_property_names() {
        assert!(matches!(expr("a.default.new"), Expr::Member { property, .. } if property == "new"));
    }

    #[test]
    fn test_conditional() {
        assert!(matches!(expr("a ? b : c"), Expr::Conditional { .. }));
    }
}
