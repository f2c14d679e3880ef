//! Bundling pass
//!
//! Gives every internal module a dense id (dependency post-order from the
//! entry) and rewrites each reference to either an in-bundle link or an
//! external name. Named imports from modules whose export set is known
//! statically are checked here.

use super::error::LinkError;
use super::graph::{ModuleGraph, ModuleRecord};
use crate::syntax::ast::{ExportDecl, Program, Stmt};
use crate::vm::Value;
use rustc_hash::{FxHashMap, FxHashSet};

/// Where a reference points after linking.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Link {
    Module(usize),
    External(String),
}

#[derive(Debug, Clone)]
pub struct BundledModule {
    pub id: usize,
    pub path: String,
    pub program: Program,
    /// Link per specifier
    pub links: FxHashMap<String, Link>,
    /// Internal dependencies in source order
    pub dependencies: Vec<usize>,
}

/// The linked internal modules of one build plus the externals they use.
#[derive(Debug)]
pub struct Bundle {
    pub modules: Vec<BundledModule>,
    pub entry: usize,
    pub externals: FxHashMap<String, Value>,
}

impl Bundle {
    pub fn module(&self, path: &str) -> Option<&BundledModule> {
        self.modules.iter().find(|m| m.path == path)
    }
}

/// Link a discovered graph into a bundle.
pub fn link(graph: ModuleGraph) -> Result<Bundle, LinkError> {
    let ModuleGraph {
        entry,
        mut modules,
        externals,
    } = graph;

    // Dense ids in dependency post-order
    let mut order: Vec<String> = Vec::with_capacity(modules.len());
    let mut visited: FxHashSet<String> = FxHashSet::default();
    post_order(&entry, &modules, &mut visited, &mut order);
    let ids: FxHashMap<String, usize> = order
        .iter()
        .enumerate()
        .map(|(id, path)| (path.clone(), id))
        .collect();

    check_exports(&modules)?;

    let mut bundled = Vec::with_capacity(order.len());
    for (id, path) in order.iter().enumerate() {
        let Some(record) = modules.remove(path) else {
            continue;
        };
        let mut links = FxHashMap::default();
        let mut dependencies = Vec::new();
        for (specifier, target) in &record.references {
            let link = match ids.get(target) {
                Some(&dep) => {
                    if !dependencies.contains(&dep) {
                        dependencies.push(dep);
                    }
                    Link::Module(dep)
                }
                None => Link::External(target.clone()),
            };
            links.insert(specifier.clone(), link);
        }
        bundled.push(BundledModule {
            id,
            path: record.path,
            program: record.program,
            links,
            dependencies,
        });
    }

    let entry = ids.get(&entry).copied().unwrap_or(0);
    Ok(Bundle {
        modules: bundled,
        entry,
        externals,
    })
}

fn post_order(
    path: &str,
    modules: &FxHashMap<String, ModuleRecord>,
    visited: &mut FxHashSet<String>,
    order: &mut Vec<String>,
) {
    if !visited.insert(path.to_string()) {
        return;
    }
    let Some(record) = modules.get(path) else {
        return;
    };
    for (_, target) in &record.references {
        if modules.contains_key(target) {
            post_order(target, modules, visited, order);
        }
    }
    order.push(path.to_string());
}

// ============================================================================
// Static export check
// ============================================================================

/// Names a module exports, or `None` when the set is not statically closed
/// (CommonJS style `exports` usage, or `export *` from an external).
fn export_names(
    path: &str,
    modules: &FxHashMap<String, ModuleRecord>,
    memo: &mut FxHashMap<String, Option<FxHashSet<String>>>,
    visiting: &mut FxHashSet<String>,
) -> Option<FxHashSet<String>> {
    if let Some(known) = memo.get(path) {
        return known.clone();
    }
    let record = modules.get(path)?;
    let program = &record.program;
    if !program.has_module_syntax() || program.mentions_exports {
        memo.insert(path.to_string(), None);
        return None;
    }
    // `export *` cycles are not resolved statically
    if !visiting.insert(path.to_string()) {
        return None;
    }

    let mut names = FxHashSet::default();
    let mut closed = true;
    for stmt in &program.body {
        let Stmt::Export(decl) = stmt else { continue };
        match decl {
            ExportDecl::Var { decls, .. } => names.extend(decls.iter().map(|d| d.name.clone())),
            ExportDecl::Function(f) => names.extend(f.name.clone()),
            ExportDecl::Default(_) => {
                names.insert("default".to_string());
            }
            ExportDecl::Named(specs) | ExportDecl::From { specs, .. } => {
                names.extend(specs.iter().map(|s| s.exported.clone()))
            }
            ExportDecl::All { alias: Some(alias), .. } => {
                names.insert(alias.clone());
            }
            ExportDecl::All { source, alias: None } => {
                let inner = record
                    .target_of(source)
                    .and_then(|target| export_names(target, modules, memo, visiting));
                match inner {
                    Some(inner) => names.extend(inner.into_iter().filter(|n| n != "default")),
                    None => closed = false,
                }
            }
        }
    }
    visiting.remove(path);

    let result = closed.then_some(names);
    memo.insert(path.to_string(), result.clone());
    result
}

fn check_exports(modules: &FxHashMap<String, ModuleRecord>) -> Result<(), LinkError> {
    let mut memo = FxHashMap::default();
    let mut paths: Vec<&String> = modules.keys().collect();
    paths.sort();

    for path in paths {
        let record = &modules[path];
        for stmt in &record.program.body {
            let (source, required): (&str, Vec<&str>) = match stmt {
                Stmt::Import(decl) => {
                    let mut required: Vec<&str> = decl.named.iter().map(|s| s.imported.as_str()).collect();
                    if decl.default.is_some() {
                        required.push("default");
                    }
                    (decl.source.as_str(), required)
                }
                Stmt::Export(ExportDecl::From { source, specs }) => {
                    (source.as_str(), specs.iter().map(|s| s.local.as_str()).collect())
                }
                _ => continue,
            };
            if required.is_empty() {
                continue;
            }
            let Some(target) = record.target_of(source) else { continue };
            let mut visiting = FxHashSet::default();
            let Some(available) = export_names(target, modules, &mut memo, &mut visiting) else {
                continue;
            };
            if let Some(missing) = required.into_iter().find(|name| !available.contains(*name)) {
                return Err(LinkError::MissingExport {
                    module: target.to_string(),
                    name: missing.to_string(),
                    importer: record.path.clone(),
                });
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::module::graph::walk;
    use crate::module::resolution::Resolution;
    use crate::syntax::SourceKind;

    async fn bundle(files: &'static [(&'static str, &'static str)]) -> Result<Bundle, LinkError> {
        let policy = move |path: &str| match files.iter().find(|(p, _)| *p == path) {
            Some((_, text)) => Resolution::loaded(*text, SourceKind::Script),
            None => Resolution::external_value(Value::Null),
        };
        link(walk("/index.js", &policy).await.unwrap())
    }

    #[tokio::test]
    async fn test_ids_in_post_order() {
        let bundle = bundle(&[
            ("/index.js", "import './a.js'\nimport 'ext'"),
            ("/a.js", "import './b.js'"),
            ("/b.js", ""),
        ])
        .await
        .unwrap();
        let paths: Vec<&str> = bundle.modules.iter().map(|m| m.path.as_str()).collect();
        assert_eq!(paths, vec!["/b.js", "/a.js", "/index.js"]);
        assert_eq!(bundle.entry, 2);
        let entry = &bundle.modules[2];
        assert_eq!(entry.links["./a.js"], Link::Module(1));
        assert_eq!(entry.links["ext"], Link::External("ext".into()));
    }

    #[tokio::test]
    async fn test_missing_named_export() {
        let err = bundle(&[
            ("/index.js", "import { nope } from './a.js'"),
            ("/a.js", "export const yes = 1"),
        ])
        .await
        .unwrap_err();
        assert_eq!(
            err,
            LinkError::MissingExport {
                module: "/a.js".into(),
                name: "nope".into(),
                importer: "/index.js".into(),
            }
        );
    }

    #[tokio::test]
    async fn test_star_reexport_counts() {
        bundle(&[
            ("/index.js", "import { deep } from './a.js'"),
            ("/a.js", "export * from './b.js'"),
            ("/b.js", "export function deep() {}"),
        ])
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn test_commonjs_modules_are_not_checked() {
        bundle(&[
            ("/index.js", "import { anything } from './a.js'"),
            ("/a.js", "exports.anything = 1"),
        ])
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn test_cycle_is_linked() {
        let bundle = bundle(&[
            ("/index.js", "import { b } from './b.js'\nexport const a = 1"),
            ("/b.js", "import { a } from './index.js'\nexport const b = 2"),
        ])
        .await
        .unwrap();
        assert_eq!(bundle.modules.len(), 2);
    }
}
