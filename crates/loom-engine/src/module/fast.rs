//! Fast strategy for prebuilt snapshots.
//!
//! A snapshot is already a single script, so nothing is bundled: bare
//! `require("...")` names are found textually, resolved together, and the
//! text runs once with those values bound.

use super::error::BuildError;
use super::graph::settle_externals;
use super::resolution::{Resolution, ResolvePolicy};
use crate::syntax::{parse_source, SourceKind};
use crate::vm::{ImportSource, Interpreter, ModuleContext, Scope, Value};
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

static ASSIGNS_EXPORTS: Lazy<Regex> = Lazy::new(|| Regex::new(r"exports\s*=").expect("valid regex"));

static REQUIRE_CALL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"require\(['"]([^'"]+)['"]\)"#).expect("valid regex"));

/// Wrap snapshot text so that running it returns its exports.
fn wrap(contents: &str) -> String {
    let mut script = String::with_capacity(contents.len() + 48);
    if !ASSIGNS_EXPORTS.is_match(contents) {
        script.push_str("var exports = {};\n");
    }
    script.push_str(contents);
    script.push_str("\nreturn exports;");
    script
}

/// Distinct `require` names in order of first appearance.
fn required_names(contents: &str) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    for capture in REQUIRE_CALL.captures_iter(contents) {
        let name = &capture[1];
        if !names.iter().any(|n| n == name) {
            names.push(name.to_string());
        }
    }
    names
}

pub async fn build_fast(entry: &str, policy: &dyn ResolvePolicy) -> Result<Value, BuildError> {
    let source = match policy.resolve(entry) {
        Resolution::External(_) => return Ok(Value::Null),
        Resolution::Load(load) => load.await.map_err(|source| BuildError::Unresolved {
            path: entry.to_string(),
            source,
        })?,
    };

    let mut externals = Vec::new();
    for name in required_names(&source.contents) {
        match policy.resolve(&name) {
            Resolution::External(value) => externals.push((name, value)),
            Resolution::Load(_) => debug!(name = %name, "snapshot reference is not external, left unbound"),
        }
    }
    let externals = settle_externals(externals).await;

    let kind = match source.kind {
        SourceKind::Typed => SourceKind::Typed,
        SourceKind::Script | SourceKind::Text => SourceKind::Script,
    };
    let program = parse_source(&wrap(&source.contents), kind).map_err(|source| BuildError::Syntax {
        path: entry.to_string(),
        source,
    })?;

    let scope = Scope::module(&Scope::global(), ModuleContext::new(entry));
    if let Some(context) = scope.context() {
        for (name, value) in externals {
            context.bind_require(&name, ImportSource::External(value));
        }
    }

    let result = Interpreter::new()
        .run_body(&program.body, &scope)
        .map_err(|source| BuildError::Exec {
            path: entry.to_string(),
            source,
        })?;
    Ok(result.unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_wrap_declares_exports_when_missing() {
        assert_eq!(wrap("exports.a = 1"), "var exports = {};\nexports.a = 1\nreturn exports;");
        assert_eq!(wrap("exports = {a: 1}"), "exports = {a: 1}\nreturn exports;");
    }

    #[test]
    fn test_required_names_are_distinct() {
        let names = required_names(r#"require("a"); require('b'); require("a"); require(x)"#);
        assert_eq!(names, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_snapshot_with_external() {
        let policy = |path: &str| match path {
            "/prebuilt.js" => Resolution::loaded(
                "var lr = require('lib')\nexports.kind = lr.kind\nexports.n = 3",
                SourceKind::Script,
            ),
            _ => Resolution::external_value(Value::object([("kind", Value::string("lr"))])),
        };
        let value = build_fast("/prebuilt.js", &policy).await.unwrap();
        assert_eq!(value.to_json(), json!({"kind": "lr", "n": 3.0}));
    }

    #[tokio::test]
    async fn test_external_entry_is_null() {
        let policy = |_: &str| Resolution::external_value(Value::Bool(true));
        assert!(matches!(build_fast("lib", &policy).await.unwrap(), Value::Null));
    }

    #[tokio::test]
    async fn test_missing_external_is_null_until_used() {
        let policy = |path: &str| match path {
            "/p.js" => Resolution::loaded("var lr = require('gone')\nexports.ok = lr === null", SourceKind::Script),
            _ => Resolution::external(futures::future::ready(Err(
                crate::module::resolution::ResolveError::not_found(path),
            ))),
        };
        let value = build_fast("/p.js", &policy).await.unwrap();
        assert_eq!(value.to_json(), json!({"ok": true}));
    }
}
