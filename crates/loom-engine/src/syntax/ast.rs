//! Abstract syntax tree for Loom script.
//!
//! Function bodies are held behind `Arc` so closures created at run time
//! share the parsed tree instead of copying it.

use std::sync::Arc;

/// A parsed module or script.
#[derive(Debug, Clone, Default)]
pub struct Program {
    pub body: Vec<Stmt>,
    /// Module specifiers in source order: import/export-from sources and
    /// `require("lit")` arguments. May contain duplicates.
    pub specifiers: Vec<String>,
    /// The identifier `exports` appears somewhere in the source.
    pub mentions_exports: bool,
}

impl Program {
    /// Whether the module uses `import`/`export` statements.
    pub fn has_module_syntax(&self) -> bool {
        self.body
            .iter()
            .any(|s| matches!(s, Stmt::Import(_) | Stmt::Export(_)))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VarKind {
    Const,
    Let,
    Var,
}

#[derive(Debug, Clone)]
pub struct Declarator {
    pub name: String,
    pub init: Option<Expr>,
}

#[derive(Debug, Clone)]
pub enum Stmt {
    Import(ImportDecl),
    Export(ExportDecl),
    Var { kind: VarKind, decls: Vec<Declarator> },
    Function(Arc<Function>),
    Return(Option<Expr>),
    If {
        test: Expr,
        consequent: Box<Stmt>,
        alternate: Option<Box<Stmt>>,
    },
    Block(Vec<Stmt>),
    Expr(Expr),
    Empty,
}

#[derive(Debug, Clone, Default)]
pub struct ImportDecl {
    pub source: String,
    pub default: Option<String>,
    pub namespace: Option<String>,
    pub named: Vec<ImportSpec>,
}

/// `imported as local`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportSpec {
    pub imported: String,
    pub local: String,
}

/// `local as exported`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportSpec {
    pub local: String,
    pub exported: String,
}

#[derive(Debug, Clone)]
pub enum ExportDecl {
    Var { kind: VarKind, decls: Vec<Declarator> },
    Function(Arc<Function>),
    Default(Expr),
    /// `export { a, b as c }`
    Named(Vec<ExportSpec>),
    /// `export { a as b } from "s"`
    From { source: String, specs: Vec<ExportSpec> },
    /// `export * from "s"` or `export * as ns from "s"`
    All { source: String, alias: Option<String> },
}

#[derive(Debug, Clone)]
pub struct Param {
    pub name: String,
    pub default: Option<Expr>,
    pub rest: bool,
}

#[derive(Debug, Clone)]
pub enum FunctionBody {
    Block(Vec<Stmt>),
    /// Concise arrow body
    Expr(Expr),
}

#[derive(Debug, Clone)]
pub struct Function {
    pub name: Option<String>,
    pub params: Vec<Param>,
    pub body: FunctionBody,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Not,
    Neg,
    Plus,
    Typeof,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Eq,
    NotEq,
    StrictEq,
    StrictNotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    BitOr,
    BitAnd,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogicalOp {
    And,
    Or,
    Nullish,
}

#[derive(Debug, Clone)]
pub enum PropKey {
    Static(String),
    Computed(Expr),
}

#[derive(Debug, Clone)]
pub enum ObjectProp {
    KeyValue(PropKey, Expr),
    Spread(Expr),
}

#[derive(Debug, Clone)]
pub enum Element {
    Expr(Expr),
    Spread(Expr),
}

#[derive(Debug, Clone)]
pub enum Expr {
    Number(f64),
    String(Arc<str>),
    Bool(bool),
    Null,
    Undefined,
    Ident(String),
    Array(Vec<Element>),
    Object(Vec<ObjectProp>),
    Function(Arc<Function>),
    Unary {
        op: UnaryOp,
        arg: Box<Expr>,
    },
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Logical {
        op: LogicalOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Assign {
        target: Box<Expr>,
        value: Box<Expr>,
    },
    Conditional {
        test: Box<Expr>,
        consequent: Box<Expr>,
        alternate: Box<Expr>,
    },
    Call {
        callee: Box<Expr>,
        args: Vec<Element>,
    },
    Member {
        object: Box<Expr>,
        property: String,
    },
    Index {
        object: Box<Expr>,
        index: Box<Expr>,
    },
    /// `require("lit")`
    Require(String),
}
