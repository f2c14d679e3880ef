//! Integration tests for the build engine
//!
//! Exercises both strategies end to end through a resolution policy backed
//! by an in-memory file table.

use loom_engine::{build, BuildError, ExecError, Resolution, ResolveError, SourceKind, Strategy, Value};
use serde_json::json;
use std::collections::HashMap;

/// Policy over a fixed file table; bare names come from `externals`, and a
/// bare name missing there fails to resolve.
fn table(
    files: &[(&'static str, &'static str)],
    externals: &[(&'static str, Value)],
) -> impl Fn(&str) -> Resolution + Send + Sync {
    let files: HashMap<&'static str, &'static str> = files.iter().copied().collect();
    let externals: HashMap<&'static str, Value> = externals.iter().cloned().collect();
    move |path: &str| {
        if path.starts_with('/') {
            return match files.get(path) {
                Some(text) => Resolution::loaded(*text, SourceKind::from_path(path)),
                None => Resolution::not_found(path),
            };
        }
        match externals.get(path) {
            Some(value) => Resolution::external_value(value.clone()),
            None => Resolution::external(futures::future::ready(Err(ResolveError::failed(path, "offline")))),
        }
    }
}

// ============================================================================
// Full strategy
// ============================================================================

#[tokio::test]
async fn test_nested_relative_imports() {
    let policy = table(
        &[
            ("/src/index.js", "import { helper } from './lib/util.js'\nexport const value = helper(20)"),
            ("/src/lib/util.js", "import { base } from '../../shared.js'\nexport const helper = n => n + base"),
            ("/shared.js", "export const base = 22"),
        ],
        &[],
    );
    let exports = build("/src/index.js", &policy, Strategy::Full).await.unwrap();
    assert_eq!(exports.to_json(), json!({"value": 42.0}));
}

#[tokio::test]
async fn test_typed_sources_are_stripped() {
    let policy = table(
        &[(
            "/index.ts",
            "interface Point { x: number }\n\
             type Id = string\n\
             export const origin: Point = { x: 0 } as Point\n\
             export function shift(p: Point, by: number = 1): Point { return { x: p.x + by } }\n\
             export const moved = shift(origin, 3)",
        )],
        &[],
    );
    let exports = build("/index.ts", &policy, Strategy::Full).await.unwrap();
    assert_eq!(exports.get("moved").unwrap().to_json(), json!({"x": 3.0}));
}

#[tokio::test]
async fn test_call_site_type_arguments_are_stripped() {
    let policy = table(
        &[(
            "/index.ts",
            "function id<T>(x: T): T { return x }\n\
             function box<T>(value: T) { return { value } }\n\
             export const r = id<number>(3)\n\
             export const b = box<Array<string>>(['a'])",
        )],
        &[],
    );
    let exports = build("/index.ts", &policy, Strategy::Full).await.unwrap();
    assert_eq!(exports.to_json(), json!({"r": 3.0, "b": {"value": ["a"]}}));
}

#[tokio::test]
async fn test_text_sources_export_their_text() {
    let policy = table(
        &[
            ("/index.js", "import notes from './notes.txt'\nexport const upper = notes.toUpperCase()"),
            ("/notes.txt", "hello"),
        ],
        &[],
    );
    let exports = build("/index.js", &policy, Strategy::Full).await.unwrap();
    assert_eq!(exports.to_json(), json!({"upper": "HELLO"}));
}

#[tokio::test]
async fn test_missing_internal_import_names_path() {
    let policy = table(&[("/index.js", "import { x } from './gone.js'")], &[]);
    let err = build("/index.js", &policy, Strategy::Full).await.unwrap_err();
    assert_eq!(err.path(), "/gone.js");
    assert!(matches!(
        err,
        BuildError::Unresolved {
            source: ResolveError::NotFound { .. },
            ..
        }
    ));
}

#[tokio::test]
async fn test_missing_external_only_fails_on_use() {
    let unused = table(
        &[("/index.js", "import { LRParser } from '@lezer/lr'\nexport const ok = true")],
        &[],
    );
    let exports = build("/index.js", &unused, Strategy::Full).await.unwrap();
    assert_eq!(exports.to_json(), json!({"ok": true}));

    let used = table(
        &[("/index.js", "import { LRParser } from '@lezer/lr'\nexport const p = LRParser.deserialize({})")],
        &[],
    );
    match build("/index.js", &used, Strategy::Full).await.unwrap_err() {
        BuildError::Exec { path, source } => {
            assert_eq!(path, "/index.js");
            assert!(matches!(source, ExecError::NullDereference { .. }));
        }
        other => panic!("unexpected {:?}", other),
    }
}

#[tokio::test]
async fn test_oversized_array_write_is_an_exec_error() {
    for text in [
        "const a = []\na[1e15] = 1\nexport const n = a.length",
        "const a = [1, 2]\na.length = 1e18\nexport const n = a.length",
    ] {
        let policy = table(&[("/index.js", text)], &[]);
        match build("/index.js", &policy, Strategy::Full).await.unwrap_err() {
            BuildError::Exec { path, source } => {
                assert_eq!(path, "/index.js");
                assert!(matches!(source, ExecError::InvalidArrayLength { .. }));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    let policy = table(&[("/index.js", "const a = []\na[3] = 'x'\nexport const n = a.length")], &[]);
    let exports = build("/index.js", &policy, Strategy::Full).await.unwrap();
    assert_eq!(exports.to_json(), json!({"n": 4.0}));
}

#[tokio::test]
async fn test_external_values_are_linked() {
    let lib = Value::object([
        ("version", Value::string("1.0")),
        ("default", Value::string("main")),
    ]);
    let policy = table(
        &[(
            "/index.js",
            "import main, { version } from 'lib'\nimport * as all from 'lib'\nexport const out = [main, version, all.version]",
        )],
        &[("lib", lib)],
    );
    let exports = build("/index.js", &policy, Strategy::Full).await.unwrap();
    assert_eq!(exports.to_json(), json!({"out": ["main", "1.0", "1.0"]}));
}

#[tokio::test]
async fn test_missing_named_export_fails_link() {
    let policy = table(
        &[
            ("/index.js", "import { nope } from './a.js'"),
            ("/a.js", "export const yes = 1"),
        ],
        &[],
    );
    let err = build("/index.js", &policy, Strategy::Full).await.unwrap_err();
    assert!(matches!(err, BuildError::Link(_)));
}

// ============================================================================
// Fast strategy
// ============================================================================

#[tokio::test]
async fn test_fast_matches_full_without_externals() {
    let source = "exports.name = 'json'\nexports.nested = { list: [1, 2, 3], flag: true }\nexports.sum = 1 + 2";
    let policy = table(&[("/prebuilt.js", source)], &[]);
    let full = build("/prebuilt.js", &policy, Strategy::Full).await.unwrap();
    let fast = build("/prebuilt.js", &policy, Strategy::Fast).await.unwrap();
    assert_eq!(full.to_json(), fast.to_json());
}

#[tokio::test]
async fn test_fast_binds_externals() {
    let policy = table(
        &[("/prebuilt.js", "var lib = require('lib')\nexports.v = lib.version")],
        &[("lib", Value::object([("version", Value::Number(2.0))]))],
    );
    let exports = build("/prebuilt.js", &policy, Strategy::Fast).await.unwrap();
    assert_eq!(exports.to_json(), json!({"v": 2.0}));
}
