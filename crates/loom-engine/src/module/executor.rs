//! Bundle execution
//!
//! Instantiates one scope per bundled module, binds imports live against
//! the exporting module (or the host value of an external), then evaluates
//! depth-first with dependencies first. Cycles see whatever the other side
//! has exported so far.

use super::error::BuildError;
use super::linker::{Bundle, BundledModule, Link};
use crate::syntax::ast::{ExportDecl, ImportDecl, Stmt};
use crate::vm::interpreter::export_value;
use crate::vm::{ExecError, ImportBinding, ImportName, ImportSource, Interpreter, ModuleContext, Scope, Value};
use std::sync::Arc;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Unvisited,
    Evaluating,
    Evaluated,
}

/// Run a linked bundle and return the entry module's `exports`.
pub fn execute(bundle: &Bundle) -> Result<Value, BuildError> {
    let mut executor = Executor::new(bundle);
    executor.instantiate().map_err(|(path, source)| BuildError::Exec { path, source })?;
    executor.evaluate(bundle.entry)?;

    let entry = &executor.scopes[bundle.entry];
    entry.lookup("exports").map_err(|source| BuildError::Exec {
        path: bundle.modules[bundle.entry].path.clone(),
        source,
    })
}

struct Executor<'a> {
    bundle: &'a Bundle,
    scopes: Vec<Arc<Scope>>,
    states: Vec<State>,
    interpreter: Interpreter,
}

impl<'a> Executor<'a> {
    fn new(bundle: &'a Bundle) -> Self {
        let global = Scope::global();
        let scopes = bundle
            .modules
            .iter()
            .map(|module| {
                let scope = Scope::module(&global, ModuleContext::new(module.path.clone()));
                scope.declare("exports", Value::new_object(), true);
                scope
            })
            .collect();
        Self {
            bundle,
            scopes,
            states: vec![State::Unvisited; bundle.modules.len()],
            interpreter: Interpreter::new(),
        }
    }

    fn source_for(&self, link: &Link) -> ImportSource {
        match link {
            Link::Module(id) => ImportSource::Module(self.scopes[*id].clone()),
            Link::External(name) => {
                ImportSource::External(self.bundle.externals.get(name).cloned().unwrap_or(Value::Null))
            }
        }
    }

    /// Bind `require` targets and import declarations of every module.
    fn instantiate(&self) -> Result<(), (String, ExecError)> {
        for module in &self.bundle.modules {
            let scope = &self.scopes[module.id];
            let Some(context) = scope.context() else { continue };
            for (specifier, link) in &module.links {
                context.bind_require(specifier, self.source_for(link));
            }
            for stmt in &module.program.body {
                if let Stmt::Import(decl) = stmt {
                    let source = self.link_source(module, &decl.source)?;
                    bind_import(scope, decl, source);
                }
            }
        }
        Ok(())
    }

    fn link_source(&self, module: &BundledModule, specifier: &str) -> Result<ImportSource, (String, ExecError)> {
        match module.links.get(specifier) {
            Some(link) => Ok(self.source_for(link)),
            None => Err((
                module.path.clone(),
                ExecError::UnresolvedImport {
                    specifier: specifier.to_string(),
                },
            )),
        }
    }

    fn evaluate(&mut self, id: usize) -> Result<(), BuildError> {
        if self.states[id] != State::Unvisited {
            return Ok(());
        }
        self.states[id] = State::Evaluating;

        let bundle = self.bundle;
        let module = &bundle.modules[id];
        for &dep in &module.dependencies {
            self.evaluate(dep)?;
        }

        debug!(module = %module.path, "evaluating");
        let wrap = |source: ExecError| BuildError::Exec {
            path: module.path.clone(),
            source,
        };
        let scope = self.scopes[id].clone();

        self.apply_reexports(module, &scope).map_err(|(_, err)| wrap(err))?;
        self.interpreter.run_body(&module.program.body, &scope).map_err(wrap)?;
        apply_export_lists(module, &scope).map_err(wrap)?;

        self.states[id] = State::Evaluated;
        Ok(())
    }

    fn apply_reexports(&self, module: &BundledModule, scope: &Arc<Scope>) -> Result<(), (String, ExecError)> {
        for stmt in &module.program.body {
            let Stmt::Export(decl) = stmt else { continue };
            match decl {
                ExportDecl::From { source, specs } => {
                    let source = self.link_source(module, source)?;
                    for spec in specs {
                        let name = match spec.local.as_str() {
                            "default" => ImportName::Default,
                            local => ImportName::Named(local.to_string()),
                        };
                        let binding = ImportBinding {
                            source: source.clone(),
                            name,
                        };
                        let value = binding.read().map_err(|e| (module.path.clone(), e))?;
                        export_value(scope, &spec.exported, value).map_err(|e| (module.path.clone(), e))?;
                    }
                }
                ExportDecl::All { source, alias } => {
                    let exports = self
                        .link_source(module, source)?
                        .exports()
                        .map_err(|e| (module.path.clone(), e))?;
                    let result = match alias {
                        Some(alias) => export_value(scope, alias, exports),
                        None => copy_exports(scope, &exports),
                    };
                    result.map_err(|e| (module.path.clone(), e))?;
                }
                _ => {}
            }
        }
        Ok(())
    }
}

fn bind_import(scope: &Scope, decl: &ImportDecl, source: ImportSource) {
    if let Some(local) = &decl.default {
        scope.declare_import(
            local,
            ImportBinding {
                source: source.clone(),
                name: ImportName::Default,
            },
        );
    }
    if let Some(local) = &decl.namespace {
        scope.declare_import(
            local,
            ImportBinding {
                source: source.clone(),
                name: ImportName::Namespace,
            },
        );
    }
    for spec in &decl.named {
        let name = match spec.imported.as_str() {
            "default" => ImportName::Default,
            imported => ImportName::Named(imported.to_string()),
        };
        scope.declare_import(
            &spec.local,
            ImportBinding {
                source: source.clone(),
                name,
            },
        );
    }
}

/// `export * from`: every name except `default`, without overriding names
/// the module already exports.
fn copy_exports(scope: &Arc<Scope>, from: &Value) -> Result<(), ExecError> {
    if from.is_nullish() {
        return Ok(());
    }
    let exports = scope.lookup("exports")?;
    let present = exports.keys();
    for key in from.keys() {
        if key == "default" || present.contains(&key) {
            continue;
        }
        exports.set(&key, from.get(&key)?)?;
    }
    Ok(())
}

fn apply_export_lists(module: &BundledModule, scope: &Arc<Scope>) -> Result<(), ExecError> {
    for stmt in &module.program.body {
        if let Stmt::Export(ExportDecl::Named(specs)) = stmt {
            for spec in specs {
                let value = scope.lookup(&spec.local)?;
                export_value(scope, &spec.exported, value)?;
            }
        }
    }
    Ok(())
}
