//! Module graph discovery
//!
//! Starting from the entry, every loaded module is parsed and its
//! references are mapped through [`resolve_path`] and handed to the policy.
//! Loads run concurrently; externals are collected and awaited together
//! once the internal graph is complete.

use super::error::BuildError;
use super::path::resolve_path;
use super::resolution::{LoadedSource, Resolution, ResolveError, ResolvePolicy};
use crate::syntax::{parse_source, Program, SourceKind};
use crate::vm::Value;
use futures::future::{join_all, BoxFuture, FutureExt};
use futures::stream::{FuturesUnordered, StreamExt};
use rustc_hash::{FxHashMap, FxHashSet};
use tracing::{debug, warn};

/// A loaded and parsed module.
#[derive(Debug, Clone)]
pub struct ModuleRecord {
    pub path: String,
    pub kind: SourceKind,
    pub program: Program,
    /// `(specifier, resolved target)` per distinct specifier, in source order
    pub references: Vec<(String, String)>,
}

impl ModuleRecord {
    pub fn target_of(&self, specifier: &str) -> Option<&str> {
        self.references
            .iter()
            .find(|(spec, _)| spec == specifier)
            .map(|(_, target)| target.as_str())
    }
}

/// Everything a build discovered.
#[derive(Debug)]
pub struct ModuleGraph {
    pub entry: String,
    pub modules: FxHashMap<String, ModuleRecord>,
    /// Settled externals; failed ones are `null`
    pub externals: FxHashMap<String, Value>,
}

type PendingLoad = BoxFuture<'static, (String, Result<LoadedSource, ResolveError>)>;
type PendingExternal = BoxFuture<'static, Result<Value, ResolveError>>;

/// Discover the module graph reachable from `entry`.
///
/// The policy is asked exactly once per distinct target.
pub async fn walk(entry: &str, policy: &dyn ResolvePolicy) -> Result<ModuleGraph, BuildError> {
    let mut seen: FxHashSet<String> = FxHashSet::default();
    let mut pending: FuturesUnordered<PendingLoad> = FuturesUnordered::new();
    let mut externals: Vec<(String, PendingExternal)> = Vec::new();
    let mut modules = FxHashMap::default();

    seen.insert(entry.to_string());
    match policy.resolve(entry) {
        Resolution::External(_) => {
            return Err(BuildError::ExternalEntry {
                path: entry.to_string(),
            })
        }
        Resolution::Load(load) => pending.push(tag(entry.to_string(), load)),
    }

    while let Some((path, result)) = pending.next().await {
        let source = result.map_err(|source| BuildError::Unresolved {
            path: path.clone(),
            source,
        })?;
        let program = parse_source(&source.contents, source.kind).map_err(|source| BuildError::Syntax {
            path: path.clone(),
            source,
        })?;

        let mut references: Vec<(String, String)> = Vec::new();
        for specifier in &program.specifiers {
            if references.iter().any(|(s, _)| s == specifier) {
                continue;
            }
            let target = resolve_path(&path, specifier);
            references.push((specifier.clone(), target.clone()));

            if !seen.insert(target.clone()) {
                continue;
            }
            match policy.resolve(&target) {
                Resolution::Load(load) => {
                    debug!(importer = %path, target = %target, "internal module");
                    pending.push(tag(target, load));
                }
                Resolution::External(value) => {
                    debug!(importer = %path, target = %target, "external module");
                    externals.push((target, value));
                }
            }
        }

        modules.insert(
            path.clone(),
            ModuleRecord {
                path,
                kind: source.kind,
                program,
                references,
            },
        );
    }

    let externals = settle_externals(externals).await;

    Ok(ModuleGraph {
        entry: entry.to_string(),
        modules,
        externals,
    })
}

fn tag(path: String, load: BoxFuture<'static, Result<LoadedSource, ResolveError>>) -> PendingLoad {
    load.map(move |result| (path, result)).boxed()
}

/// Await all externals together. A failed external becomes `null`; the
/// failure only shows once a module dereferences it.
pub(crate) async fn settle_externals(externals: Vec<(String, PendingExternal)>) -> FxHashMap<String, Value> {
    let (names, futures): (Vec<_>, Vec<_>) = externals.into_iter().unzip();
    let results = join_all(futures).await;
    names
        .into_iter()
        .zip(results)
        .map(|(name, result)| {
            let value = result.unwrap_or_else(|err| {
                warn!(module = %name, error = %err, "external module unavailable, using null");
                Value::Null
            });
            (name, value)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::Arc;

    fn files(entries: &[(&'static str, &'static str)]) -> impl Fn(&str) -> Resolution + Send + Sync {
        let map: FxHashMap<&'static str, &'static str> = entries.iter().copied().collect();
        move |path: &str| match map.get(path) {
            Some(text) => Resolution::loaded(*text, SourceKind::from_path(path)),
            None if path.starts_with('/') => Resolution::not_found(path),
            None => Resolution::external_value(Value::string(path)),
        }
    }

    #[tokio::test]
    async fn test_walk_collects_modules_and_externals() {
        let policy = files(&[
            ("/index.js", "import a from './a.js'\nimport lr from 'lib'"),
            ("/a.js", "export default require('./b.js')"),
            ("/b.js", "module = 1"),
        ]);
        let graph = walk("/index.js", &policy).await.unwrap();
        assert_eq!(graph.modules.len(), 3);
        assert_eq!(graph.externals.get("lib").and_then(|v| v.as_str().map(String::from)), Some("lib".into()));
        assert_eq!(graph.modules["/a.js"].target_of("./b.js"), Some("/b.js"));
    }

    #[tokio::test]
    async fn test_policy_called_once_per_target() {
        let calls = Arc::new(Mutex::new(Vec::<String>::new()));
        let inner = files(&[
            ("/index.js", "import './a.js'\nimport './b.js'\nimport 'x'"),
            ("/a.js", "import './b.js'\nimport 'x'\nimport '/index.js'"),
            ("/b.js", "import './a.js'"),
        ]);
        let log = calls.clone();
        let policy = move |path: &str| {
            log.lock().push(path.to_string());
            inner(path)
        };
        walk("/index.js", &policy).await.unwrap();
        let mut calls = calls.lock().clone();
        calls.sort();
        assert_eq!(calls, vec!["/a.js", "/b.js", "/index.js", "x"]);
    }

    #[tokio::test]
    async fn test_missing_internal_names_path() {
        let policy = files(&[("/index.js", "import './missing.js'")]);
        let err = walk("/index.js", &policy).await.unwrap_err();
        assert_eq!(
            err,
            BuildError::Unresolved {
                path: "/missing.js".into(),
                source: ResolveError::not_found("/missing.js"),
            }
        );
    }

    #[tokio::test]
    async fn test_failed_external_becomes_null() {
        let policy = |path: &str| -> Resolution {
            if path == "/index.js" {
                Resolution::Load(futures::future::ready(Ok(LoadedSource::new("import 'gone'", SourceKind::Script))).boxed())
            } else {
                Resolution::external(futures::future::ready(Err(ResolveError::failed(path, "offline"))))
            }
        };
        let graph = walk("/index.js", &policy).await.unwrap();
        assert!(matches!(graph.externals["gone"], Value::Null));
    }

    #[tokio::test]
    async fn test_external_entry_rejected() {
        let policy = |_: &str| Resolution::external_value(Value::Null);
        let err = walk("lib", &policy).await.unwrap_err();
        assert_eq!(err, BuildError::ExternalEntry { path: "lib".into() });
    }

    #[tokio::test]
    async fn test_syntax_error_names_module() {
        let policy = files(&[("/index.js", "let = ")]);
        match walk("/index.js", &policy).await.unwrap_err() {
            BuildError::Syntax { path, .. } => assert_eq!(path, "/index.js"),
            other => panic!("unexpected {:?}", other),
        }
    }
}
