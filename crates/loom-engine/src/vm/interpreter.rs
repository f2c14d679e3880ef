//! Tree-walking interpreter for Loom script.

use super::error::ExecError;
use super::scope::{Scope, ScopeKind};
use super::value::{Closure, Value};
use crate::syntax::ast::*;
use std::sync::Arc;

/// Maximum nesting of script function calls.
pub const MAX_CALL_DEPTH: usize = 128;

/// Statement completion.
enum Flow {
    Normal,
    Return(Value),
}

#[derive(Default)]
pub struct Interpreter {
    depth: usize,
}

impl Interpreter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run a module or script body directly in `scope`. Returns the value
    /// of a top-level `return`, if one was executed.
    pub fn run_body(&mut self, body: &[Stmt], scope: &Arc<Scope>) -> Result<Option<Value>, ExecError> {
        self.hoist(body, scope)?;
        match self.exec_list(body, scope)? {
            Flow::Return(value) => Ok(Some(value)),
            Flow::Normal => Ok(None),
        }
    }

    /// Call a script or host function.
    pub fn call(&mut self, func: &Value, this: &Value, args: &[Value]) -> Result<Value, ExecError> {
        self.call_value(func, this, args, || "value".to_string())
    }

    // ========================================================================
    // Statements
    // ========================================================================

    /// Declare function declarations before the body runs.
    fn hoist(&mut self, body: &[Stmt], scope: &Arc<Scope>) -> Result<(), ExecError> {
        for stmt in body {
            if let Stmt::Function(function) | Stmt::Export(ExportDecl::Function(function)) = stmt {
                if let Some(name) = &function.name {
                    let value = Value::Function(Arc::new(Closure {
                        function: function.clone(),
                        env: scope.clone(),
                    }));
                    scope.declare(name, value, true);
                }
            }
        }
        Ok(())
    }

    fn exec_list(&mut self, body: &[Stmt], scope: &Arc<Scope>) -> Result<Flow, ExecError> {
        for stmt in body {
            if let Flow::Return(value) = self.exec(stmt, scope)? {
                return Ok(Flow::Return(value));
            }
        }
        Ok(Flow::Normal)
    }

    fn exec(&mut self, stmt: &Stmt, scope: &Arc<Scope>) -> Result<Flow, ExecError> {
        match stmt {
            Stmt::Import(_) | Stmt::Function(_) | Stmt::Empty => {}
            Stmt::Export(decl) => self.exec_export(decl, scope)?,
            Stmt::Var { kind, decls } => self.exec_var(*kind, decls, scope)?,
            Stmt::Return(value) => {
                let value = match value {
                    Some(expr) => self.eval(expr, scope)?,
                    None => Value::Undefined,
                };
                return Ok(Flow::Return(value));
            }
            Stmt::If {
                test,
                consequent,
                alternate,
            } => {
                if self.eval(test, scope)?.is_truthy() {
                    return self.exec(consequent, scope);
                } else if let Some(alternate) = alternate {
                    return self.exec(alternate, scope);
                }
            }
            Stmt::Block(body) => {
                let block = Scope::child(scope, ScopeKind::Block);
                self.hoist(body, &block)?;
                return self.exec_list(body, &block);
            }
            Stmt::Expr(expr) => {
                self.eval(expr, scope)?;
            }
        }
        Ok(Flow::Normal)
    }

    fn exec_var(&mut self, kind: VarKind, decls: &[Declarator], scope: &Arc<Scope>) -> Result<(), ExecError> {
        // `var` is scoped to the enclosing function or module
        let target = if kind == VarKind::Var {
            var_scope(scope)
        } else {
            scope.clone()
        };
        for decl in decls {
            let value = match &decl.init {
                Some(init) => self.eval(init, scope)?,
                None if kind == VarKind::Var && target.has_own(&decl.name) => continue,
                None => Value::Undefined,
            };
            target.declare(&decl.name, value, kind != VarKind::Const);
        }
        Ok(())
    }

    fn exec_export(&mut self, decl: &ExportDecl, scope: &Arc<Scope>) -> Result<(), ExecError> {
        match decl {
            ExportDecl::Var { kind, decls } => {
                self.exec_var(*kind, decls, scope)?;
                for d in decls {
                    let value = scope.lookup(&d.name)?;
                    export_value(scope, &d.name, value)?;
                }
            }
            ExportDecl::Default(expr) => {
                let value = self.eval(expr, scope)?;
                export_value(scope, "default", value)?;
            }
            // The binding itself was hoisted.
            ExportDecl::Function(function) => {
                if let Some(name) = &function.name {
                    let value = scope.lookup(name)?;
                    export_value(scope, name, value)?;
                }
            }
            // Applied by the module executor around the body.
            ExportDecl::Named(_)
            | ExportDecl::From { .. }
            | ExportDecl::All { .. } => {}
        }
        Ok(())
    }

    // ========================================================================
    // Expressions
    // ========================================================================

    pub fn eval(&mut self, expr: &Expr, scope: &Arc<Scope>) -> Result<Value, ExecError> {
        match expr {
            Expr::Number(n) => Ok(Value::Number(*n)),
            Expr::String(s) => Ok(Value::String(s.clone())),
            Expr::Bool(b) => Ok(Value::Bool(*b)),
            Expr::Null => Ok(Value::Null),
            Expr::Undefined => Ok(Value::Undefined),
            Expr::Ident(name) => scope.lookup(name),
            Expr::Array(elements) => Ok(Value::array(self.eval_elements(elements, scope)?)),
            Expr::Object(props) => self.eval_object(props, scope),
            Expr::Function(function) => Ok(Value::Function(Arc::new(Closure {
                function: function.clone(),
                env: scope.clone(),
            }))),
            Expr::Unary { op, arg } => self.eval_unary(*op, arg, scope),
            Expr::Binary { op, left, right } => {
                let left = self.eval(left, scope)?;
                let right = self.eval(right, scope)?;
                Ok(binary(*op, &left, &right))
            }
            Expr::Logical { op, left, right } => {
                let left = self.eval(left, scope)?;
                let short_circuit = match op {
                    LogicalOp::And => !left.is_truthy(),
                    LogicalOp::Or => left.is_truthy(),
                    LogicalOp::Nullish => !left.is_nullish(),
                };
                if short_circuit {
                    Ok(left)
                } else {
                    self.eval(right, scope)
                }
            }
            Expr::Assign { target, value } => {
                let value = self.eval(value, scope)?;
                match target.as_ref() {
                    Expr::Ident(name) => scope.assign(name, value.clone())?,
                    Expr::Member { object, property } => {
                        self.eval(object, scope)?.set(property, value.clone())?
                    }
                    Expr::Index { object, index } => {
                        let object = self.eval(object, scope)?;
                        let key = self.eval(index, scope)?.to_display_string();
                        object.set(&key, value.clone())?
                    }
                    _ => return Err(ExecError::native("Invalid assignment target")),
                }
                Ok(value)
            }
            Expr::Conditional {
                test,
                consequent,
                alternate,
            } => {
                if self.eval(test, scope)?.is_truthy() {
                    self.eval(consequent, scope)
                } else {
                    self.eval(alternate, scope)
                }
            }
            Expr::Call { callee, args } => self.eval_call(callee, args, scope),
            Expr::Member { object, property } => self.eval(object, scope)?.get(property),
            Expr::Index { object, index } => {
                let object = self.eval(object, scope)?;
                let key = self.eval(index, scope)?.to_display_string();
                object.get(&key)
            }
            Expr::Require(specifier) => {
                let target = scope.context().and_then(|ctx| ctx.require_target(specifier));
                match target {
                    Some(source) => source.exports(),
                    None => Err(ExecError::UnresolvedImport {
                        specifier: specifier.clone(),
                    }),
                }
            }
        }
    }

    fn eval_unary(&mut self, op: UnaryOp, arg: &Expr, scope: &Arc<Scope>) -> Result<Value, ExecError> {
        if op == UnaryOp::Typeof {
            // typeof on an undeclared name is not an error
            let value = match self.eval(arg, scope) {
                Err(ExecError::UndefinedVariable { .. }) => Value::Undefined,
                other => other?,
            };
            return Ok(Value::string(value.type_of()));
        }
        let value = self.eval(arg, scope)?;
        Ok(match op {
            UnaryOp::Not => Value::Bool(!value.is_truthy()),
            UnaryOp::Neg => Value::Number(-value.to_number()),
            UnaryOp::Plus => Value::Number(value.to_number()),
            UnaryOp::Typeof => unreachable!("handled above"),
        })
    }

    fn eval_elements(&mut self, elements: &[Element], scope: &Arc<Scope>) -> Result<Vec<Value>, ExecError> {
        let mut items = Vec::with_capacity(elements.len());
        for element in elements {
            match element {
                Element::Expr(expr) => items.push(self.eval(expr, scope)?),
                Element::Spread(expr) => {
                    let spread = self.eval(expr, scope)?;
                    match &spread {
                        Value::Array(inner) => items.extend(inner.read().iter().cloned()),
                        Value::String(s) => items.extend(s.chars().map(|c| Value::string(c.to_string()))),
                        other => {
                            return Err(ExecError::native(format!(
                                "{} is not iterable",
                                other.type_of()
                            )))
                        }
                    }
                }
            }
        }
        Ok(items)
    }

    fn eval_object(&mut self, props: &[ObjectProp], scope: &Arc<Scope>) -> Result<Value, ExecError> {
        let object = Value::new_object();
        for prop in props {
            match prop {
                ObjectProp::KeyValue(key, value) => {
                    let key = match key {
                        PropKey::Static(name) => name.clone(),
                        PropKey::Computed(expr) => self.eval(expr, scope)?.to_display_string(),
                    };
                    let value = self.eval(value, scope)?;
                    object.set(&key, value)?;
                }
                ObjectProp::Spread(expr) => {
                    let source = self.eval(expr, scope)?;
                    for key in source.keys() {
                        object.set(&key, source.get(&key)?)?;
                    }
                }
            }
        }
        Ok(object)
    }

    fn eval_call(&mut self, callee: &Expr, args: &[Element], scope: &Arc<Scope>) -> Result<Value, ExecError> {
        let (this, func) = match callee {
            Expr::Member { object, property } => {
                let this = self.eval(object, scope)?;
                let func = this.get(property)?;
                (this, func)
            }
            Expr::Index { object, index } => {
                let this = self.eval(object, scope)?;
                let key = self.eval(index, scope)?.to_display_string();
                let func = this.get(&key)?;
                (this, func)
            }
            other => (Value::Undefined, self.eval(other, scope)?),
        };
        let args = self.eval_elements(args, scope)?;
        self.call_value(&func, &this, &args, || describe(callee))
    }

    fn call_value(
        &mut self,
        func: &Value,
        this: &Value,
        args: &[Value],
        what: impl FnOnce() -> String,
    ) -> Result<Value, ExecError> {
        match func {
            Value::Native(native) => (native.func)(this, args),
            Value::Function(closure) => {
                if self.depth >= MAX_CALL_DEPTH {
                    return Err(ExecError::StackOverflow {
                        depth: MAX_CALL_DEPTH,
                    });
                }
                self.depth += 1;
                let result = self.call_closure(closure, args);
                self.depth -= 1;
                result
            }
            _ => Err(ExecError::NotCallable { what: what() }),
        }
    }

    fn call_closure(&mut self, closure: &Closure, args: &[Value]) -> Result<Value, ExecError> {
        let function = &closure.function;
        let scope = Scope::child(&closure.env, ScopeKind::Function);

        for (i, param) in function.params.iter().enumerate() {
            let value = if param.rest {
                Value::array(args.iter().skip(i).cloned().collect())
            } else {
                match (args.get(i), &param.default) {
                    (Some(Value::Undefined) | None, Some(default)) => self.eval(default, &scope)?,
                    (Some(value), _) => value.clone(),
                    (None, None) => Value::Undefined,
                }
            };
            scope.declare(&param.name, value, true);
        }

        match &function.body {
            FunctionBody::Expr(expr) => self.eval(expr, &scope),
            FunctionBody::Block(body) => {
                self.hoist(body, &scope)?;
                match self.exec_list(body, &scope)? {
                    Flow::Return(value) => Ok(value),
                    Flow::Normal => Ok(Value::Undefined),
                }
            }
        }
    }
}

fn var_scope(scope: &Arc<Scope>) -> Arc<Scope> {
    let mut current = scope.clone();
    while current.kind() == ScopeKind::Block {
        match current.parent_scope() {
            Some(parent) => current = parent,
            None => break,
        }
    }
    current
}

/// Write `exports[name]` through the module's current `exports` binding.
pub(crate) fn export_value(scope: &Arc<Scope>, name: &str, value: Value) -> Result<(), ExecError> {
    scope.lookup("exports")?.set(name, value)
}

fn binary(op: BinaryOp, left: &Value, right: &Value) -> Value {
    match op {
        BinaryOp::Add => {
            let stringy = |v: &Value| {
                matches!(v, Value::String(_) | Value::Array(_) | Value::Object(_) | Value::Opaque(_))
            };
            if stringy(left) || stringy(right) {
                let mut s = left.to_display_string();
                s.push_str(&right.to_display_string());
                Value::from(s)
            } else {
                Value::Number(left.to_number() + right.to_number())
            }
        }
        BinaryOp::Sub => Value::Number(left.to_number() - right.to_number()),
        BinaryOp::Mul => Value::Number(left.to_number() * right.to_number()),
        BinaryOp::Div => Value::Number(left.to_number() / right.to_number()),
        BinaryOp::Rem => Value::Number(left.to_number() % right.to_number()),
        BinaryOp::Eq => Value::Bool(left.loose_equals(right)),
        BinaryOp::NotEq => Value::Bool(!left.loose_equals(right)),
        BinaryOp::StrictEq => Value::Bool(left.strict_equals(right)),
        BinaryOp::StrictNotEq => Value::Bool(!left.strict_equals(right)),
        BinaryOp::Lt | BinaryOp::LtEq | BinaryOp::Gt | BinaryOp::GtEq => {
            let ordering = match (left, right) {
                (Value::String(a), Value::String(b)) => Some(a.as_ref().cmp(b.as_ref())),
                _ => left.to_number().partial_cmp(&right.to_number()),
            };
            Value::Bool(match ordering {
                None => false,
                Some(ord) => match op {
                    BinaryOp::Lt => ord.is_lt(),
                    BinaryOp::LtEq => ord.is_le(),
                    BinaryOp::Gt => ord.is_gt(),
                    _ => ord.is_ge(),
                },
            })
        }
        BinaryOp::BitOr => Value::Number(f64::from(to_int32(left) | to_int32(right))),
        BinaryOp::BitAnd => Value::Number(f64::from(to_int32(left) & to_int32(right))),
    }
}

fn to_int32(value: &Value) -> i32 {
    let n = value.to_number();
    if n.is_finite() {
        n.trunc().rem_euclid(4_294_967_296.0) as u32 as i32
    } else {
        0
    }
}

/// Source-like name of a callee for error messages.
fn describe(expr: &Expr) -> String {
    match expr {
        Expr::Ident(name) => name.clone(),
        Expr::Member { object, property } => format!("{}.{}", describe(object), property),
        Expr::Call { callee, .. } => format!("{}(...)", describe(callee)),
        _ => "expression".to_string(),
    }
}
