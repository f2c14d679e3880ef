//! Term compiler
//!
//! Reads a Lezer-style grammar, checks its declarations and assigns term
//! ids, then emits two Loom script modules: the parser module, which hands
//! the parse tables to `LRParser.deserialize` from the parser runtime and
//! wires the grammar's external hooks, and the terms module, which exports
//! one constant per named term.
//!
//! Term ids: `⚠` (the error term) is 0, then named rules (top rules
//! included) in definition order, then named tokens, then external terms.
//! Names starting with a lowercase letter are hidden and get no id; so do
//! template rules.
//!
//! External hooks are never called here. They are imported by the parser
//! module and only run when that module is executed.

mod lexer;

use crate::compiler::{CompileReport, GrammarCompiler};
use lexer::{tokenize, Lexeme, Pos, Tok};
use rustc_hash::{FxHashMap, FxHashSet};
use std::fmt::Write as _;

/// Module the generated parser imports `LRParser` from.
pub const PARSER_RUNTIME: &str = "@lezer/lr";

const HEADER: &str = "// Generated by the Loom term compiler";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DefKind {
    Top,
    Rule,
    Token,
    External,
}

impl DefKind {
    fn describe(self) -> &'static str {
        match self {
            DefKind::Top | DefKind::Rule => "rule",
            DefKind::Token => "token",
            DefKind::External => "external term",
        }
    }
}

#[derive(Debug, Clone)]
struct Definition {
    name: String,
    kind: DefKind,
    params: Vec<String>,
    pos: Pos,
}

#[derive(Debug, Clone)]
struct Reference {
    name: String,
    pos: Pos,
    /// Definition whose body contains the reference
    owner: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum HookKind {
    Tokenizer,
    Specializer,
    Extender,
    Prop,
    PropSource,
    Context,
}

#[derive(Debug, Clone)]
struct Hook {
    kind: HookKind,
    /// Name exported by the hook's module
    name: String,
    /// Local binding in the parser module
    local: String,
    module: String,
    /// Token a specializer or extender applies to
    token: Option<String>,
}

#[derive(Debug, Default)]
struct Declarations {
    defs: Vec<Definition>,
    refs: Vec<Reference>,
    hooks: Vec<Hook>,
    tops: Vec<String>,
    skipped: Vec<String>,
    dialects: Vec<String>,
}

// ============================================================================
// Declaration reader
// ============================================================================

struct Reader<'a> {
    toks: &'a [Lexeme],
    at: usize,
    decls: Declarations,
}

fn error_at(message: impl std::fmt::Display, pos: Pos) -> String {
    format!("{} ({})", message, pos)
}

impl<'a> Reader<'a> {
    fn new(toks: &'a [Lexeme]) -> Self {
        Self {
            toks,
            at: 0,
            decls: Declarations::default(),
        }
    }

    fn peek(&self) -> &Tok {
        &self.toks[self.at.min(self.toks.len() - 1)].tok
    }

    fn pos(&self) -> Pos {
        self.toks[self.at.min(self.toks.len() - 1)].pos
    }

    fn advance(&mut self) -> Tok {
        let tok = self.peek().clone();
        if self.at < self.toks.len() - 1 {
            self.at += 1;
        }
        tok
    }

    fn eat(&mut self, tok: &Tok) -> bool {
        if self.peek() == tok {
            self.advance();
            true
        } else {
            false
        }
    }

    fn unexpected(&self) -> String {
        match self.peek() {
            Tok::Eof => error_at("Unexpected end of file", self.pos()),
            tok => error_at(format!("Unexpected token {:?}", tok), self.pos()),
        }
    }

    fn expect(&mut self, tok: &Tok) -> Result<(), String> {
        if self.eat(tok) {
            Ok(())
        } else {
            Err(self.unexpected())
        }
    }

    fn expect_name(&mut self) -> Result<(String, Pos), String> {
        let pos = self.pos();
        match self.peek().clone() {
            Tok::Name(name) => {
                self.advance();
                Ok((name, pos))
            }
            _ => Err(self.unexpected()),
        }
    }

    fn expect_word(&mut self, word: &str) -> Result<(), String> {
        match self.peek() {
            Tok::Name(name) if name == word => {
                self.advance();
                Ok(())
            }
            _ => Err(error_at(format!("Expected '{}'", word), self.pos())),
        }
    }

    fn expect_str(&mut self) -> Result<String, String> {
        match self.peek().clone() {
            Tok::Str(s) => {
                self.advance();
                Ok(s)
            }
            _ => Err(self.unexpected()),
        }
    }

    fn define(&mut self, name: String, kind: DefKind, params: Vec<String>, pos: Pos) {
        self.decls.defs.push(Definition {
            name,
            kind,
            params,
            pos,
        });
    }

    fn read(mut self) -> Result<Declarations, String> {
        loop {
            let pos = self.pos();
            match self.peek().clone() {
                Tok::Eof => return Ok(self.decls),
                Tok::At(word) => {
                    self.advance();
                    self.directive(&word, pos)?;
                }
                Tok::Name(_) => self.definition(DefKind::Rule)?,
                _ => return Err(self.unexpected()),
            }
        }
    }

    fn directive(&mut self, word: &str, pos: Pos) -> Result<(), String> {
        match word {
            "top" => {
                let (name, pos) = self.expect_name()?;
                self.skip_props()?;
                self.body(Some(&name), &[])?;
                self.decls.tops.push(name.clone());
                self.define(name, DefKind::Top, Vec::new(), pos);
            }
            "tokens" => self.token_block()?,
            "local" => {
                self.expect_word("tokens")?;
                self.token_block()?;
            }
            "skip" => {
                let names = self.body(None, &[])?;
                self.decls.skipped.extend(names);
                if self.peek() == &Tok::LeftBrace {
                    self.rule_block()?;
                }
            }
            "precedence" => {
                self.skip_group(&Tok::LeftBrace, &Tok::RightBrace)?;
            }
            "external" => self.external()?,
            "context" => {
                let (name, _) = self.expect_name()?;
                self.expect_word("from")?;
                let module = self.expect_str()?;
                self.hook(HookKind::Context, name.clone(), name, module, None);
            }
            "dialects" => {
                self.expect(&Tok::LeftBrace)?;
                while !self.eat(&Tok::RightBrace) {
                    let (name, _) = self.expect_name()?;
                    self.decls.dialects.push(name);
                    if !self.eat(&Tok::Comma) {
                        self.expect(&Tok::RightBrace)?;
                        break;
                    }
                }
            }
            "detectDelim" => {}
            other => return Err(error_at(format!("Unknown directive '@{}'", other), pos)),
        }
        Ok(())
    }

    /// `name<params>[props] { body }`
    fn definition(&mut self, kind: DefKind) -> Result<(), String> {
        let (name, pos) = self.expect_name()?;
        let mut params = Vec::new();
        if self.eat(&Tok::Less) {
            while !self.eat(&Tok::Greater) {
                params.push(self.expect_name()?.0);
                if !self.eat(&Tok::Comma) {
                    self.expect(&Tok::Greater)?;
                    break;
                }
            }
        }
        self.skip_props()?;
        self.body(Some(&name), &params)?;
        self.define(name, kind, params, pos);
        Ok(())
    }

    /// Read a braced body, recording references. Returns the names
    /// referenced at any depth.
    fn body(&mut self, owner: Option<&str>, params: &[String]) -> Result<Vec<String>, String> {
        let start = self.pos();
        self.expect(&Tok::LeftBrace)?;
        let mut names = Vec::new();
        // open braces and parens, innermost last
        let mut groups: Vec<(Tok, Pos)> = vec![(Tok::LeftBrace, start)];
        let mut previous = Tok::LeftBrace;
        loop {
            let pos = self.pos();
            let tok = self.advance();
            match &tok {
                Tok::Eof => return Err(error_at("Unterminated block", start)),
                Tok::LeftBrace | Tok::LeftParen => groups.push((tok.clone(), pos)),
                Tok::RightBrace => match groups.pop() {
                    Some((Tok::LeftBrace, _)) if groups.is_empty() => return Ok(names),
                    Some((Tok::LeftBrace, _)) => {}
                    Some((_, open)) => return Err(error_at("Unclosed '('", open)),
                    None => return Err(error_at("Unexpected '}'", pos)),
                },
                Tok::RightParen => match groups.last() {
                    Some((Tok::LeftParen, _)) => {
                        groups.pop();
                    }
                    _ => return Err(error_at("Unexpected ')'", pos)),
                },
                Tok::LeftBracket => {
                    self.at -= 1;
                    self.skip_group(&Tok::LeftBracket, &Tok::RightBracket)?;
                }
                // !precedence and ~ambiguity markers
                Tok::Name(_) if matches!(previous, Tok::Bang | Tok::Tilde) => {}
                Tok::Name(name) if params.contains(name) => {}
                Tok::Name(name) => {
                    names.push(name.clone());
                    self.decls.refs.push(Reference {
                        name: name.clone(),
                        pos,
                        owner: owner.map(str::to_string),
                    });
                }
                _ => {}
            }
            previous = tok;
        }
    }

    fn token_block(&mut self) -> Result<(), String> {
        let start = self.pos();
        self.expect(&Tok::LeftBrace)?;
        loop {
            match self.peek().clone() {
                Tok::RightBrace => {
                    self.advance();
                    return Ok(());
                }
                Tok::Eof => return Err(error_at("Unterminated @tokens block", start)),
                Tok::At(word) => {
                    self.advance();
                    match word.as_str() {
                        "precedence" | "conflict" => {
                            self.body(None, &[])?;
                        }
                        _ if self.peek() == &Tok::LeftBrace => {
                            self.skip_group(&Tok::LeftBrace, &Tok::RightBrace)?;
                        }
                        _ => {}
                    }
                }
                Tok::Name(_) => self.definition(DefKind::Token)?,
                // literal token with props: "(" [@name=Open]
                Tok::Str(_) => {
                    self.advance();
                    self.skip_props()?;
                    if self.peek() == &Tok::LeftBrace {
                        self.body(None, &[])?;
                    }
                }
                _ => return Err(self.unexpected()),
            }
        }
    }

    /// Rules scoped to a `@skip {} { .. }` block.
    fn rule_block(&mut self) -> Result<(), String> {
        let start = self.pos();
        self.expect(&Tok::LeftBrace)?;
        loop {
            match self.peek() {
                Tok::RightBrace => {
                    self.advance();
                    return Ok(());
                }
                Tok::Eof => return Err(error_at("Unterminated @skip block", start)),
                Tok::Name(_) => self.definition(DefKind::Rule)?,
                _ => return Err(self.unexpected()),
            }
        }
    }

    fn external(&mut self) -> Result<(), String> {
        let (kind, pos) = self.expect_name()?;
        match kind.as_str() {
            "tokens" => {
                let (name, _) = self.expect_name()?;
                self.expect_word("from")?;
                let module = self.expect_str()?;
                self.hook(HookKind::Tokenizer, name.clone(), name, module, None);
                self.term_list()?;
            }
            "specialize" | "extend" => {
                let token = self.body(None, &[])?.into_iter().next();
                let (name, _) = self.expect_name()?;
                self.expect_word("from")?;
                let module = self.expect_str()?;
                let kind = if kind == "specialize" {
                    HookKind::Specializer
                } else {
                    HookKind::Extender
                };
                self.hook(kind, name.clone(), name, module, token);
                if self.peek() == &Tok::LeftBrace {
                    self.term_list()?;
                }
            }
            "prop" => {
                let (name, _) = self.expect_name()?;
                let local = match self.peek() {
                    Tok::Name(word) if word == "as" => {
                        self.advance();
                        self.expect_name()?.0
                    }
                    _ => name.clone(),
                };
                self.expect_word("from")?;
                let module = self.expect_str()?;
                self.hook(HookKind::Prop, name, local, module, None);
            }
            "propSource" => {
                let (name, _) = self.expect_name()?;
                self.expect_word("from")?;
                let module = self.expect_str()?;
                self.hook(HookKind::PropSource, name.clone(), name, module, None);
            }
            other => return Err(error_at(format!("Unknown external kind '{}'", other), pos)),
        }
        Ok(())
    }

    fn hook(&mut self, kind: HookKind, name: String, local: String, module: String, token: Option<String>) {
        self.decls.hooks.push(Hook {
            kind,
            name,
            local,
            module,
            token,
        });
    }

    /// `{ a, b[props], c }` defining external terms.
    fn term_list(&mut self) -> Result<(), String> {
        self.expect(&Tok::LeftBrace)?;
        while !self.eat(&Tok::RightBrace) {
            let (name, pos) = self.expect_name()?;
            self.skip_props()?;
            self.define(name, DefKind::External, Vec::new(), pos);
            if !self.eat(&Tok::Comma) {
                self.expect(&Tok::RightBrace)?;
                break;
            }
        }
        Ok(())
    }

    fn skip_props(&mut self) -> Result<(), String> {
        while self.peek() == &Tok::LeftBracket {
            self.skip_group(&Tok::LeftBracket, &Tok::RightBracket)?;
        }
        Ok(())
    }

    fn skip_group(&mut self, open: &Tok, close: &Tok) -> Result<(), String> {
        let start = self.pos();
        self.expect(open)?;
        let mut depth = 1usize;
        while depth > 0 {
            match self.advance() {
                Tok::Eof => return Err(error_at("Unterminated block", start)),
                tok if &tok == open => depth += 1,
                tok if &tok == close => depth -= 1,
                _ => {}
            }
        }
        Ok(())
    }
}

// ============================================================================
// Checks and term assignment
// ============================================================================

fn is_named(name: &str) -> bool {
    name.chars().next().is_some_and(|c| c.is_ascii_uppercase())
}

fn check(decls: &Declarations) -> Result<Vec<String>, String> {
    if decls.tops.is_empty() {
        return Err("Missing @top declaration".to_string());
    }

    let mut defined: FxHashMap<&str, &Definition> = FxHashMap::default();
    for def in &decls.defs {
        if defined.insert(def.name.as_str(), def).is_some() {
            return Err(error_at(
                format!("Duplicate definition of {} '{}'", def.kind.describe(), def.name),
                def.pos,
            ));
        }
    }

    for reference in &decls.refs {
        if !defined.contains_key(reference.name.as_str()) {
            return Err(error_at(format!("Undefined rule '{}'", reference.name), reference.pos));
        }
    }

    let used: FxHashSet<&str> = decls
        .refs
        .iter()
        .filter(|r| r.owner.as_deref() != Some(r.name.as_str()))
        .map(|r| r.name.as_str())
        .collect();
    let warnings = decls
        .defs
        .iter()
        .filter(|def| matches!(def.kind, DefKind::Rule | DefKind::Token))
        .filter(|def| !used.contains(def.name.as_str()))
        .map(|def| format!("Unused {} '{}' ({})", def.kind.describe(), def.name, def.pos))
        .collect();
    Ok(warnings)
}

/// Named terms in id order; index 0 is the error term.
fn assign_terms(decls: &Declarations) -> Vec<String> {
    let mut terms = vec!["⚠".to_string()];
    let named = |def: &&Definition| def.params.is_empty() && (def.kind == DefKind::Top || is_named(&def.name));
    for kind in [DefKind::Rule, DefKind::Token] {
        terms.extend(
            decls
                .defs
                .iter()
                .filter(|def| def.kind == kind || (kind == DefKind::Rule && def.kind == DefKind::Top))
                .filter(named)
                .map(|def| def.name.clone()),
        );
    }
    terms.extend(
        decls
            .defs
            .iter()
            .filter(|def| def.kind == DefKind::External)
            .map(|def| def.name.clone()),
    );
    terms
}

// ============================================================================
// Emission
// ============================================================================

fn quote(text: &str) -> String {
    serde_json::Value::String(text.to_string()).to_string()
}

fn emit_terms(terms: &[String]) -> String {
    let mut out = format!("{}\n", HEADER);
    if terms.len() > 1 {
        out.push_str("export const\n");
        let lines: Vec<String> = terms
            .iter()
            .enumerate()
            .skip(1)
            .map(|(id, name)| format!("  {} = {}", name, id))
            .collect();
        out.push_str(&lines.join(",\n"));
        out.push('\n');
    }
    out
}

fn emit_parser(decls: &Declarations, terms: &[String], runtime: &str) -> String {
    let id_of = |name: &str| terms.iter().position(|t| t == name);
    let mut out = format!("{}\nimport {{LRParser}} from {}\n", HEADER, quote(runtime));

    let mut imported: FxHashSet<&str> = FxHashSet::default();
    for hook in &decls.hooks {
        if !imported.insert(hook.local.as_str()) {
            continue;
        }
        if hook.local == hook.name {
            let _ = writeln!(out, "import {{{}}} from {}", hook.name, quote(&hook.module));
        } else {
            let _ = writeln!(out, "import {{{} as {}}} from {}", hook.name, hook.local, quote(&hook.module));
        }
    }

    let hooks_of = |kind: HookKind| decls.hooks.iter().filter(move |h| h.kind == kind);

    let mut fields: Vec<String> = vec![
        "version: 14".to_string(),
        format!("nodeNames: {}", quote(&terms.join(" "))),
        format!("maxTerm: {}", terms.len() - 1),
    ];

    let tops: Vec<String> = decls
        .tops
        .iter()
        .enumerate()
        .filter_map(|(state, name)| id_of(name).map(|id| format!("{}: [{}, {}]", quote(name), state, id)))
        .collect();
    fields.push(format!("topRules: {{{}}}", tops.join(", ")));

    let mut skipped = vec!["0".to_string()];
    skipped.extend(
        decls
            .skipped
            .iter()
            .filter_map(|name| id_of(name))
            .map(|id| id.to_string()),
    );
    skipped.dedup();
    fields.push(format!("skippedNodes: [{}]", skipped.join(", ")));

    let tokenizers: Vec<&str> = hooks_of(HookKind::Tokenizer).map(|h| h.local.as_str()).collect();
    if !tokenizers.is_empty() {
        fields.push(format!("tokenizers: [{}]", tokenizers.join(", ")));
    }
    let specialized: Vec<String> = decls
        .hooks
        .iter()
        .filter(|h| matches!(h.kind, HookKind::Specializer | HookKind::Extender))
        .map(|h| {
            format!(
                "{{token: {}, get: {}, extend: {}}}",
                quote(h.token.as_deref().unwrap_or("")),
                h.local,
                h.kind == HookKind::Extender
            )
        })
        .collect();
    if !specialized.is_empty() {
        fields.push(format!("specialized: [{}]", specialized.join(", ")));
    }
    if let Some(context) = hooks_of(HookKind::Context).next() {
        fields.push(format!("context: {}", context.local));
    }
    let props: Vec<&str> = hooks_of(HookKind::Prop).map(|h| h.local.as_str()).collect();
    if !props.is_empty() {
        fields.push(format!("nodeProps: [{}]", props.join(", ")));
    }
    let sources: Vec<&str> = hooks_of(HookKind::PropSource).map(|h| h.local.as_str()).collect();
    if !sources.is_empty() {
        fields.push(format!("propSources: [{}]", sources.join(", ")));
    }
    if !decls.dialects.is_empty() {
        let dialects: Vec<String> = decls
            .dialects
            .iter()
            .enumerate()
            .map(|(i, name)| format!("{}: {}", name, i))
            .collect();
        fields.push(format!("dialects: {{{}}}", dialects.join(", ")));
    }

    out.push_str("export const parser = LRParser.deserialize({\n");
    out.push_str(&fields.iter().map(|f| format!("  {}", f)).collect::<Vec<_>>().join(",\n"));
    out.push_str("\n})\n");
    out
}

// ============================================================================
// Compiler
// ============================================================================

/// The default [`GrammarCompiler`].
#[derive(Debug, Clone)]
pub struct TermCompiler {
    runtime_module: String,
}

impl Default for TermCompiler {
    fn default() -> Self {
        Self {
            runtime_module: PARSER_RUNTIME.to_string(),
        }
    }
}

impl TermCompiler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Import `LRParser` from `module` instead of [`PARSER_RUNTIME`].
    pub fn with_runtime_module(module: impl Into<String>) -> Self {
        Self {
            runtime_module: module.into(),
        }
    }
}

impl GrammarCompiler for TermCompiler {
    fn compile(&self, grammar: &str) -> Result<CompileReport, String> {
        let toks = tokenize(grammar)?;
        let decls = Reader::new(&toks).read()?;
        let warnings = check(&decls)?;
        let terms = assign_terms(&decls);
        Ok(CompileReport {
            parser: emit_parser(&decls, &terms, &self.runtime_module),
            terms: emit_terms(&terms),
            warnings,
        })
    }
}
