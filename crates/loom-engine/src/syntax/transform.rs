//! Type stripping for typed sources.
//!
//! Works on the token stream rather than the AST: type syntax is removed
//! and the remaining tokens are parsed as plain Loom script. Removed:
//!
//! - `interface X { .. }` and `type X = ..` declarations (also exported)
//! - `import type ..` and `export type { .. }` statements
//! - `: T` annotations on declarators, parameters and return types
//! - generic parameter lists on function declarations
//! - type arguments at call sites, `f<T>(..)` and `new C<T>(..)`
//! - `as T` / `satisfies T` casts and postfix non-null `!`
//! - `?` on optional parameters

use crate::syntax::token::{Spanned, Token};

#[derive(Debug, Clone, Copy)]
enum Group {
    Paren { params: bool },
    Brace { specifiers: bool },
    Bracket,
}

fn is_word(token: &Token, word: &str) -> bool {
    matches!(token, Token::Identifier(name) if name == word)
}

/// Strip type syntax from a token stream ending with `Eof`.
pub fn strip_types(tokens: Vec<Spanned>) -> Vec<Spanned> {
    Stripper::new(tokens).run()
}

struct Stripper {
    input: Vec<Spanned>,
    out: Vec<Spanned>,
    groups: Vec<Group>,
    /// Group depth of the `const|let|var` whose declarators are open.
    declaration: Option<usize>,
    /// Current statement started with `import` or `export`.
    module_statement: bool,
    pending_newline: bool,
}

impl Stripper {
    fn new(input: Vec<Spanned>) -> Self {
        Self {
            out: Vec::with_capacity(input.len()),
            input,
            groups: Vec::new(),
            declaration: None,
            module_statement: false,
            pending_newline: false,
        }
    }

    fn token(&self, i: usize) -> &Token {
        let idx = i.min(self.input.len() - 1);
        &self.input[idx].token
    }

    fn last(&self, back: usize) -> Option<&Token> {
        self.out.len().checked_sub(back + 1).map(|i| &self.out[i].token)
    }

    fn at_statement_start(&self, i: usize) -> bool {
        self.input[i].newline_before
            || matches!(
                self.last(0),
                None | Some(Token::Semicolon) | Some(Token::RightBrace) | Some(Token::LeftBrace)
            )
    }

    /// Drop `input[from..to]`, remembering any line break it contained.
    fn drop_range(&mut self, from: usize, to: usize) -> usize {
        let to = to.min(self.input.len() - 1);
        if self.input[from..to].iter().any(|t| t.newline_before) {
            self.pending_newline = true;
        }
        to
    }

    fn keep(&mut self, i: usize) {
        let mut token = self.input[i].clone();
        if self.pending_newline {
            token.newline_before = true;
            self.pending_newline = false;
        }
        self.out.push(token);
    }

    fn run(mut self) -> Vec<Spanned> {
        let mut i = 0;
        while i < self.input.len() {
            i = self.step(i);
        }
        self.out
    }

    /// Process the token at `i`, returning the index of the next token.
    fn step(&mut self, i: usize) -> usize {
        let token = self.token(i).clone();

        if self.input[i].newline_before && self.groups.len() <= self.declaration.unwrap_or(0) {
            if !matches!(self.last(0), Some(Token::Comma) | Some(Token::Equal)) {
                self.declaration = None;
            }
        }
        if self.input[i].newline_before && self.groups.is_empty() {
            self.module_statement = false;
        }

        match token {
            Token::Eof => {
                self.keep(i);
                return i + 1;
            }
            Token::Semicolon => {
                if self.declaration == Some(self.groups.len()) {
                    self.declaration = None;
                }
                if self.groups.is_empty() {
                    self.module_statement = false;
                }
            }
            Token::Import => {
                if is_word(self.token(i + 1), "type")
                    && !matches!(self.token(i + 2), Token::From | Token::Comma)
                {
                    return self.skip_import_type(i);
                }
                self.module_statement = true;
            }
            Token::Export => {
                if is_word(self.token(i + 1), "type") && matches!(self.token(i + 2), Token::LeftBrace) {
                    return self.skip_export_type(i);
                }
                let next = self.token(i + 1);
                if (is_word(next, "type") || is_word(next, "interface"))
                    && matches!(self.token(i + 2), Token::Identifier(_))
                {
                    // Let the declaration rule below drop the rest.
                    let end = self.drop_range(i, i + 1);
                    return self.skip_type_declaration(end).unwrap_or(end);
                }
                self.module_statement = true;
            }
            Token::Const | Token::Let | Token::Var => {
                self.declaration = Some(self.groups.len());
            }
            Token::Identifier(ref name) if name == "type" || name == "interface" => {
                if self.at_statement_start(i) {
                    if let Some(next) = self.skip_type_declaration(i) {
                        return next;
                    }
                }
            }
            Token::Identifier(ref name) if name == "satisfies" => {
                if self.ends_expression() {
                    let end = skip_type(&self.input, i + 1);
                    return self.drop_range(i, end);
                }
            }
            Token::As => {
                let in_specifiers = matches!(self.groups.last(), Some(Group::Brace { specifiers: true }));
                if !in_specifiers && self.ends_expression() {
                    let end = skip_type(&self.input, i + 1);
                    return self.drop_range(i, end);
                }
            }
            Token::Bang => {
                if !self.input[i].newline_before && self.ends_expression() {
                    return self.drop_range(i, i + 1);
                }
            }
            Token::Question => {
                if self.in_params()
                    && matches!(self.last(0), Some(Token::Identifier(_)))
                    && matches!(
                        self.token(i + 1),
                        Token::Colon | Token::Comma | Token::RightParen | Token::Equal
                    )
                {
                    return self.drop_range(i, i + 1);
                }
            }
            Token::Colon => {
                if self.annotation_position() {
                    let end = skip_type(&self.input, i + 1);
                    return self.drop_range(i, end);
                }
            }
            Token::Less if matches!(self.last(0), Some(Token::Identifier(_))) => {
                // function name<T, U>(..)
                if matches!(self.last(1), Some(Token::Function)) {
                    let end = skip_angle(&self.input, i);
                    return self.drop_range(i, end);
                }
                if let Some(end) = call_type_arguments(&self.input, i) {
                    return self.drop_range(i, end);
                }
            }
            Token::LeftParen => {
                let params = self.opens_params(i);
                self.keep(i);
                self.groups.push(Group::Paren { params });
                return i + 1;
            }
            Token::LeftBrace => {
                let specifiers = matches!(self.last(0), Some(Token::Import) | Some(Token::Export))
                    || (self.module_statement
                        && self.groups.is_empty()
                        && matches!(self.last(0), Some(Token::Comma)));
                self.keep(i);
                self.groups.push(Group::Brace { specifiers });
                return i + 1;
            }
            Token::LeftBracket => {
                self.keep(i);
                self.groups.push(Group::Bracket);
                return i + 1;
            }
            Token::RightParen => {
                let closing = self.groups.pop();
                self.keep(i);
                if let Some(Group::Paren { params: true }) = closing {
                    if matches!(self.token(i + 1), Token::Colon) {
                        let end = skip_type(&self.input, i + 2);
                        return self.drop_range(i + 1, end);
                    }
                }
                return i + 1;
            }
            Token::RightBrace | Token::RightBracket => {
                self.groups.pop();
            }
            _ => {}
        }

        self.keep(i);
        i + 1
    }

    fn ends_expression(&self) -> bool {
        self.last(0).map(Token::ends_expression).unwrap_or(false)
    }

    fn in_params(&self) -> bool {
        matches!(self.groups.last(), Some(Group::Paren { params: true }))
    }

    fn annotation_position(&self) -> bool {
        // (a: T, b?: U) -- the `?` has already been dropped
        if self.in_params() {
            return matches!(self.last(0), Some(Token::Identifier(_)))
                && matches!(self.last(1), Some(Token::LeftParen) | Some(Token::Comma) | Some(Token::Ellipsis));
        }
        // let a: T = .., b: U
        if self.declaration == Some(self.groups.len()) {
            return matches!(self.last(0), Some(Token::Identifier(_)))
                && matches!(
                    self.last(1),
                    Some(Token::Const) | Some(Token::Let) | Some(Token::Var) | Some(Token::Comma)
                );
        }
        false
    }

    /// Decide whether the `(` at `i` opens a parameter list.
    fn opens_params(&self, i: usize) -> bool {
        match (self.last(0), self.last(1)) {
            (Some(Token::Function), _) => return true,
            (Some(Token::Identifier(_)), Some(Token::Function)) => return true,
            _ => {}
        }

        let close = skip_balanced(&self.input, i);
        match self.token(close) {
            Token::Arrow => return true,
            Token::Colon => {
                let after = skip_type(&self.input, close + 1);
                if matches!(self.token(after), Token::Arrow) {
                    return true;
                }
                // object method shorthand with a return type: m(): T { .. }
                let method = matches!(self.last(0), Some(Token::Identifier(_)))
                    && matches!(self.last(1), Some(Token::LeftBrace) | Some(Token::Comma))
                    && matches!(self.groups.last(), Some(Group::Brace { specifiers: false }));
                if method && matches!(self.token(after), Token::LeftBrace) {
                    return true;
                }
            }
            _ => {}
        }

        // `(name:` or `, name?:` at the top level of the group
        let mut depth = 0usize;
        let mut j = i;
        while j < close {
            match self.token(j) {
                Token::LeftParen | Token::LeftBracket | Token::LeftBrace => depth += 1,
                Token::RightParen | Token::RightBracket | Token::RightBrace => depth = depth.saturating_sub(1),
                Token::Identifier(_) if depth == 1 => {
                    let starts_item = matches!(self.token(j - 1), Token::LeftParen | Token::Comma | Token::Ellipsis);
                    let annotated = matches!(self.token(j + 1), Token::Colon)
                        || (matches!(self.token(j + 1), Token::Question)
                            && matches!(self.token(j + 2), Token::Colon | Token::Comma | Token::RightParen));
                    if starts_item && annotated {
                        return true;
                    }
                }
                _ => {}
            }
            j += 1;
        }
        false
    }

    /// `type X<..> = T;` or `interface X<..> extends .. { .. }` starting at
    /// `i`. Returns `None` when the tokens do not form such a declaration.
    fn skip_type_declaration(&mut self, i: usize) -> Option<usize> {
        let is_type = is_word(self.token(i), "type");
        if !matches!(self.token(i + 1), Token::Identifier(_)) {
            return None;
        }
        let mut j = i + 2;
        if matches!(self.token(j), Token::Less) {
            j = skip_angle(&self.input, j);
        }
        if is_type {
            if !matches!(self.token(j), Token::Equal) {
                return None;
            }
            j = skip_type(&self.input, j + 1);
            if matches!(self.token(j), Token::Semicolon) {
                j += 1;
            }
        } else {
            while !matches!(self.token(j), Token::LeftBrace | Token::Eof) {
                j += 1;
            }
            j = skip_balanced(&self.input, j);
        }
        Some(self.drop_range(i, j))
    }

    fn skip_import_type(&mut self, i: usize) -> usize {
        let mut j = i;
        while !matches!(self.token(j), Token::From | Token::Eof) {
            j += 1;
        }
        j += 2; // from "module"
        if matches!(self.token(j), Token::Semicolon) {
            j += 1;
        }
        self.drop_range(i, j)
    }

    fn skip_export_type(&mut self, i: usize) -> usize {
        let mut j = skip_balanced(&self.input, i + 2);
        if matches!(self.token(j), Token::From) {
            j += 2;
        }
        if matches!(self.token(j), Token::Semicolon) {
            j += 1;
        }
        self.drop_range(i, j)
    }
}

// ============================================================================
// Type skipping
// ============================================================================

/// Index just past the balanced group opening at `i`.
fn skip_balanced(tokens: &[Spanned], i: usize) -> usize {
    let mut depth = 0usize;
    let mut j = i;
    while j < tokens.len() {
        match tokens[j].token {
            Token::LeftParen | Token::LeftBracket | Token::LeftBrace => depth += 1,
            Token::RightParen | Token::RightBracket | Token::RightBrace => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return j + 1;
                }
            }
            Token::Eof => return j,
            _ => {}
        }
        j += 1;
    }
    tokens.len() - 1
}

/// Index just past the `<..>` group opening at `i`.
fn skip_angle(tokens: &[Spanned], i: usize) -> usize {
    let mut depth = 0usize;
    let mut j = i;
    while j < tokens.len() {
        match tokens[j].token {
            Token::Less => depth += 1,
            Token::Greater => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return j + 1;
                }
            }
            Token::LeftParen | Token::LeftBracket | Token::LeftBrace => {
                j = skip_balanced(tokens, j);
                continue;
            }
            Token::Eof | Token::Semicolon => return j,
            _ => {}
        }
        j += 1;
    }
    tokens.len() - 1
}

/// End of a `<..>` run at `i` that holds only type syntax and is directly
/// followed by `(`. A comparison such as `a < b` never qualifies.
fn call_type_arguments(tokens: &[Spanned], i: usize) -> Option<usize> {
    let end = skip_angle(tokens, i);
    if end <= i + 2 || !matches!(tokens[end - 1].token, Token::Greater) {
        return None;
    }
    let call = tokens.get(end)?;
    if !matches!(call.token, Token::LeftParen) || call.newline_before {
        return None;
    }
    let types_only = tokens[i + 1..end - 1].iter().all(|t| {
        matches!(
            t.token,
            Token::Identifier(_)
                | Token::String(_)
                | Token::Number(_)
                | Token::Less
                | Token::Greater
                | Token::Comma
                | Token::Dot
                | Token::Pipe
                | Token::Amp
                | Token::Question
                | Token::Colon
                | Token::Arrow
                | Token::Ellipsis
                | Token::LeftParen
                | Token::RightParen
                | Token::LeftBracket
                | Token::RightBracket
                | Token::LeftBrace
                | Token::RightBrace
                | Token::Typeof
                | Token::Null
                | Token::Undefined
                | Token::True
                | Token::False
        )
    });
    types_only.then_some(end)
}

/// Index just past the type expression starting at `i`.
pub(crate) fn skip_type(tokens: &[Spanned], i: usize) -> usize {
    let at = |j: usize| &tokens[j.min(tokens.len() - 1)].token;
    let mut j = i;
    if matches!(at(j), Token::Pipe | Token::Amp) {
        j += 1;
    }
    loop {
        j = skip_type_operand(tokens, j);
        if matches!(at(j), Token::Pipe | Token::Amp) {
            j += 1;
        } else {
            return j;
        }
    }
}

fn skip_type_operand(tokens: &[Spanned], i: usize) -> usize {
    let at = |j: usize| &tokens[j.min(tokens.len() - 1)].token;
    let mut j = i;

    while matches!(at(j), Token::Typeof)
        || is_word(at(j), "keyof")
        || is_word(at(j), "readonly")
        || is_word(at(j), "unique")
    {
        j += 1;
    }

    match at(j) {
        Token::LeftParen => {
            j = skip_balanced(tokens, j);
            if matches!(at(j), Token::Arrow) {
                return skip_type(tokens, j + 1);
            }
        }
        Token::Less => {
            // <T>(a: T) => T
            j = skip_angle(tokens, j);
            return skip_type_operand(tokens, j);
        }
        Token::LeftBracket | Token::LeftBrace => j = skip_balanced(tokens, j),
        Token::Minus if matches!(at(j + 1), Token::Number(_)) => j += 2,
        Token::Identifier(_) | Token::String(_) | Token::Number(_) => {
            j += 1;
            while matches!(at(j), Token::Dot) && !matches!(at(j + 1), Token::Eof) {
                j += 2;
            }
            if matches!(at(j), Token::Less) {
                j = skip_angle(tokens, j);
            }
        }
        token if token.keyword_text().is_some() => j += 1,
        _ => return j,
    }

    // T[] and T["key"]
    while matches!(at(j), Token::LeftBracket) {
        j = skip_balanced(tokens, j);
    }
    j
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::syntax::lexer::Lexer;

    fn strip(source: &str) -> String {
        let tokens = Lexer::new(source).tokenize().unwrap();
        strip_types(tokens)
            .into_iter()
            .filter(|t| t.token != Token::Eof)
            .map(|t| t.token.to_string())
            .collect::<Vec<_>>()
            .join(" ")
    }

    #[test]
    fn test_declarator_annotations() {
        assert_eq!(strip("let a: number = 1, b: string"), "let a = 1 , b");
        assert_eq!(strip("const m: Map<string, X[]> = f()"), "const m = f ( )");
    }

    #[test]
    fn test_parameter_and_return_annotations() {
        assert_eq!(
            strip("function f(a: A, b?: B | null): R { return a }"),
            "function f ( a , b ) { return a }"
        );
        assert_eq!(strip("const g = (x: number): number => x"), "const g = ( x ) => x");
    }

    #[test]
    fn test_generic_function() {
        assert_eq!(strip("function id<T>(x: T): T { return x }"), "function id ( x ) { return x }");
    }

    #[test]
    fn test_call_type_arguments() {
        assert_eq!(strip("const r = id<number>(3)"), "const r = id ( 3 )");
        assert_eq!(
            strip("const p = new NodeProp<Map<string, number[]>>({ perNode: true })"),
            "const p = new NodeProp ( { perNode : true } )"
        );
        assert_eq!(strip("f<A | B, { x: C }>()"), "f ( )");
    }

    #[test]
    fn test_comparisons_are_not_type_arguments() {
        assert_eq!(strip("const a = b < c"), "const a = b < c");
        assert_eq!(strip("if (i < n + 1 && m > (k)) {}"), "if ( i < n + 1 && m > ( k ) ) { }");
        assert_eq!(strip("x = a < b\n(c)"), "x = a < b ( c )");
    }

    #[test]
    fn test_declarations_removed() {
        assert_eq!(strip("interface P { a: number }\nlet x = 1"), "let x = 1");
        assert_eq!(strip("type A = B | C;\nx"), "x");
        assert_eq!(strip("type A = { a: 1 }\nx"), "x");
        assert_eq!(strip("export type A = string\nexport interface I {}\nexport const a = 1"), "export const a = 1");
    }

    #[test]
    fn test_type_only_imports_and_exports() {
        assert_eq!(strip("import type { A } from './a'\nimport b from './b'"), "import b from \"./b\"");
        assert_eq!(strip("export type { A } from './a';x"), "x");
    }

    #[test]
    fn test_casts_and_non_null() {
        assert_eq!(strip("const a = b as unknown as C"), "const a = b");
        assert_eq!(strip("f(x!.y)"), "f ( x . y )");
        assert_eq!(strip("const c = [1] as const"), "const c = [ 1 ]");
        assert_eq!(strip("!a"), "! a");
    }

    #[test]
    fn test_specifier_aliases_survive() {
        assert_eq!(strip("import { a as b } from 'm'"), "import { a as b } from \"m\"");
        assert_eq!(strip("export { a as default }"), "export { a as default }");
        assert_eq!(strip("import * as ns from 'm'"), "import * as ns from \"m\"");
    }

    #[test]
    fn test_plain_code_untouched() {
        let source = "const o = { a: 1, b: c ? d : e }\nf(a ? b : c)";
        assert_eq!(strip(source), "const o = { a : 1 , b : c ? d : e } f ( a ? b : c )");
    }

    #[test]
    fn test_identifier_named_type() {
        assert_eq!(strip("let type = 1\ntype = 2"), "let type = 1 type = 2");
    }
}
