//! Lexical scopes and import bindings.

use super::error::ExecError;
use super::value::Value;
use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeKind {
    Global,
    Module,
    Function,
    Block,
}

/// Where an import binding reads from.
#[derive(Clone)]
pub enum ImportSource {
    /// Another module of the same bundle; read through its `exports`
    /// binding at access time.
    Module(Arc<Scope>),
    /// A value supplied by the host.
    External(Value),
}

impl ImportSource {
    /// The exports value as seen by `require` and namespace imports.
    pub fn exports(&self) -> Result<Value, ExecError> {
        match self {
            ImportSource::Module(scope) => scope.lookup("exports"),
            ImportSource::External(value) => Ok(value.clone()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImportName {
    Named(String),
    Default,
    Namespace,
}

#[derive(Clone)]
pub struct ImportBinding {
    pub source: ImportSource,
    pub name: ImportName,
}

impl ImportBinding {
    pub fn read(&self) -> Result<Value, ExecError> {
        let exports = self.source.exports()?;
        match (&self.name, &self.source) {
            (ImportName::Namespace, _) => Ok(exports),
            (ImportName::Named(name), _) => exports.get(name),
            (ImportName::Default, ImportSource::Module(_)) => exports.get("default"),
            // Host modules without a default export are their own default.
            (ImportName::Default, ImportSource::External(_)) => {
                if exports.is_nullish() {
                    return Ok(exports);
                }
                match exports.get("default")? {
                    Value::Undefined => Ok(exports),
                    value => Ok(value),
                }
            }
        }
    }
}

#[derive(Clone)]
pub enum Binding {
    Value { value: Value, mutable: bool },
    Import(ImportBinding),
}

/// Per-module data reachable from every scope nested in the module.
pub struct ModuleContext {
    pub path: String,
    /// `require` targets by literal specifier
    requires: RwLock<FxHashMap<String, ImportSource>>,
}

impl ModuleContext {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            requires: RwLock::new(FxHashMap::default()),
        }
    }

    pub fn bind_require(&self, specifier: &str, source: ImportSource) {
        self.requires.write().insert(specifier.to_string(), source);
    }

    pub fn require_target(&self, specifier: &str) -> Option<ImportSource> {
        self.requires.read().get(specifier).cloned()
    }
}

pub struct Scope {
    kind: ScopeKind,
    bindings: RwLock<FxHashMap<String, Binding>>,
    parent: Option<Arc<Scope>>,
    module: Option<Arc<ModuleContext>>,
}

impl Scope {
    /// The root scope holding the global prelude.
    pub fn global() -> Arc<Self> {
        let scope = Self {
            kind: ScopeKind::Global,
            bindings: RwLock::new(FxHashMap::default()),
            parent: None,
            module: None,
        };
        for (name, value) in super::builtins::globals() {
            scope.declare(name, value, false);
        }
        Arc::new(scope)
    }

    pub fn module(parent: &Arc<Scope>, context: ModuleContext) -> Arc<Self> {
        Arc::new(Self {
            kind: ScopeKind::Module,
            bindings: RwLock::new(FxHashMap::default()),
            parent: Some(parent.clone()),
            module: Some(Arc::new(context)),
        })
    }

    pub fn child(parent: &Arc<Scope>, kind: ScopeKind) -> Arc<Self> {
        Arc::new(Self {
            kind,
            bindings: RwLock::new(FxHashMap::default()),
            parent: Some(parent.clone()),
            module: None,
        })
    }

    pub fn kind(&self) -> ScopeKind {
        self.kind
    }

    pub fn parent_scope(&self) -> Option<Arc<Scope>> {
        self.parent.clone()
    }

    pub fn declare(&self, name: &str, value: Value, mutable: bool) {
        self.bindings
            .write()
            .insert(name.to_string(), Binding::Value { value, mutable });
    }

    pub fn declare_import(&self, name: &str, binding: ImportBinding) {
        self.bindings
            .write()
            .insert(name.to_string(), Binding::Import(binding));
    }

    pub fn has_own(&self, name: &str) -> bool {
        self.bindings.read().contains_key(name)
    }

    pub fn lookup(&self, name: &str) -> Result<Value, ExecError> {
        let binding = self.bindings.read().get(name).cloned();
        match binding {
            Some(Binding::Value { value, .. }) => Ok(value),
            Some(Binding::Import(import)) => import.read(),
            None => match &self.parent {
                Some(parent) => parent.lookup(name),
                None => Err(ExecError::UndefinedVariable {
                    name: name.to_string(),
                }),
            },
        }
    }

    /// Assign to an existing binding; an undeclared name is created in the
    /// enclosing module scope.
    pub fn assign(self: &Arc<Self>, name: &str, value: Value) -> Result<(), ExecError> {
        let mut scope = self.clone();
        loop {
            {
                let mut bindings = scope.bindings.write();
                match bindings.get_mut(name) {
                    Some(Binding::Value { value: slot, mutable: true }) => {
                        *slot = value;
                        return Ok(());
                    }
                    Some(_) => {
                        return Err(ExecError::ConstAssignment {
                            name: name.to_string(),
                        })
                    }
                    None => {}
                }
            }
            match &scope.parent {
                Some(parent) if scope.kind != ScopeKind::Module => scope = parent.clone(),
                _ => break,
            }
        }

        // Not found below the module scope: a global of the prelude is
        // shadowed rather than overwritten.
        self.module_scope().declare(name, value, true);
        Ok(())
    }

    /// The nearest module scope, or the outermost scope.
    pub fn module_scope(self: &Arc<Self>) -> Arc<Scope> {
        let mut scope = self.clone();
        while scope.kind != ScopeKind::Module {
            match &scope.parent {
                Some(parent) => scope = parent.clone(),
                None => break,
            }
        }
        scope
    }

    pub fn context(&self) -> Option<Arc<ModuleContext>> {
        match &self.module {
            Some(ctx) => Some(ctx.clone()),
            None => self.parent.as_ref().and_then(|p| p.context()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn module_scope() -> Arc<Scope> {
        Scope::module(
            &Scope::global(),
            ModuleContext::new("/m.js"),
        )
    }

    #[test]
    fn test_assign_undeclared_goes_to_module() {
        let module = module_scope();
        let func = Scope::child(&module, ScopeKind::Function);
        let block = Scope::child(&func, ScopeKind::Block);
        block.assign("x", Value::Number(1.0)).unwrap();
        assert!(module.has_own("x"));
        assert!(!func.has_own("x"));
    }

    #[test]
    fn test_const_assignment() {
        let module = module_scope();
        module.declare("c", Value::Null, false);
        assert_eq!(
            module.assign("c", Value::Null).unwrap_err(),
            ExecError::ConstAssignment { name: "c".into() }
        );
    }

    #[test]
    fn test_import_reads_live_exports() {
        let producer = module_scope();
        producer.declare("exports", Value::new_object(), true);
        let consumer = module_scope();
        consumer.declare_import(
            "a",
            ImportBinding {
                source: ImportSource::Module(producer.clone()),
                name: ImportName::Named("a".into()),
            },
        );
        assert!(matches!(consumer.lookup("a").unwrap(), Value::Undefined));
        producer.lookup("exports").unwrap().set("a", Value::Number(2.0)).unwrap();
        assert_eq!(consumer.lookup("a").unwrap().as_number(), Some(2.0));
    }

    #[test]
    fn test_external_default_falls_back_to_value() {
        let external = Value::object([("x", Value::Number(1.0))]);
        let binding = ImportBinding {
            source: ImportSource::External(external.clone()),
            name: ImportName::Default,
        };
        assert!(binding.read().unwrap().strict_equals(&external));

        let with_default = Value::object([("default", Value::Number(5.0))]);
        let binding = ImportBinding {
            source: ImportSource::External(with_default),
            name: ImportName::Default,
        };
        assert_eq!(binding.read().unwrap().as_number(), Some(5.0));
    }

    #[test]
    fn test_null_external_named_import_errors_on_read() {
        let binding = ImportBinding {
            source: ImportSource::External(Value::Null),
            name: ImportName::Named("LRParser".into()),
        };
        assert!(matches!(
            binding.read(),
            Err(ExecError::NullDereference { .. })
        ));
    }

    #[test]
    fn test_context_visible_from_nested_scope() {
        let module = module_scope();
        let inner = Scope::child(&Scope::child(&module, ScopeKind::Function), ScopeKind::Block);
        assert_eq!(inner.context().unwrap().path, "/m.js");
    }
}
