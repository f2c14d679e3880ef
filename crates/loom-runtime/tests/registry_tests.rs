//! Integration tests for the language registry
//!
//! Covers lazy creation, single-flight file fetches, module lookups by
//! role and imports between registered languages.

use futures::future::join_all;
use loom_runtime::sources::{assemble, SourceTree};
use loom_runtime::{LanguageOption, LanguageRegistry, Role, Runtime, RuntimeConfig, SrcFile, UnitFiles};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

fn registry() -> Arc<LanguageRegistry> {
    let mut config = RuntimeConfig::default();
    config.grammar.use_worker = false;
    LanguageRegistry::new(Runtime::new(config).unwrap())
}

fn base_files() -> UnitFiles {
    UnitFiles::new(vec![
        SrcFile::new("/config.ts", "export const greet = (name) => 'hi ' + name").entry_of(Role::Index),
        SrcFile::new("/parser.ts", "export const kind = 'parser'").entry_of(Role::Parser),
        SrcFile::new("/support.ts", "export const kind = 'support'").entry_of(Role::Support),
    ])
}

#[tokio::test]
async fn test_files_fetched_once_under_contention() {
    let registry = registry();
    let fetches = Arc::new(AtomicUsize::new(0));
    let counter = fetches.clone();
    registry
        .push(LanguageOption::new("Base", "base", move || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(10)).await;
                Ok(base_files())
            }
        }))
        .unwrap();

    let requests = (0..8).map(|_| registry.get("base", true));
    let languages: Vec<_> = join_all(requests)
        .await
        .into_iter()
        .map(|r| r.unwrap().unwrap())
        .collect();

    assert_eq!(fetches.load(Ordering::SeqCst), 1);
    assert!(languages.iter().all(|l| Arc::ptr_eq(l, &languages[0])));
    assert_eq!(languages[0].builds_started(), 1);
    assert_eq!(languages[0].option().unwrap().label, "Base");
}

#[tokio::test]
async fn test_get_without_initial_build() {
    let registry = registry();
    registry.push(LanguageOption::from_files("Base", "base", base_files())).unwrap();
    let lang = registry.get("base", false).await.unwrap().unwrap();
    assert_eq!(lang.builds_started(), 0);
    assert!(lang.exports(Role::Index).is_none());
}

#[tokio::test]
async fn test_module_lookup_by_role() {
    let registry = registry();
    registry
        .push(
            LanguageOption::from_files("Base", "base", base_files())
                .parser_module("base-parser")
                .support_module("base-support"),
        )
        .unwrap();

    let parser = registry.module("base-parser").await.unwrap().unwrap();
    assert_eq!(parser.get("kind").unwrap().as_str(), Some("parser"));
    let support = registry.module("base-support").await.unwrap().unwrap();
    assert_eq!(support.get("kind").unwrap().as_str(), Some("support"));
    let index = registry.module("base").await.unwrap().unwrap();
    assert!(index.get("greet").unwrap().is_callable());
}

#[tokio::test]
async fn test_languages_import_each_other() {
    let registry = registry();
    registry
        .push(LanguageOption::from_files("Base", "base", base_files()).parser_module("base-parser"))
        .unwrap();
    registry
        .push(LanguageOption::from_files(
            "App",
            "app",
            UnitFiles::new(vec![SrcFile::new(
                "/config.ts",
                "import { greet } from 'base'\nimport { kind } from 'base-parser'\n\
                 export const message = greet('loom') + ' from ' + kind",
            )
            .entry_of(Role::Index)]),
        ))
        .unwrap();

    let app = registry.get("app", true).await.unwrap().unwrap();
    let message = app.exports(Role::Index).unwrap().get("message").unwrap();
    assert_eq!(message.as_str(), Some("hi loom from parser"));

    // the imported language was created and built on demand
    let base = registry.get("base", false).await.unwrap().unwrap();
    assert_eq!(base.builds_started(), 1);
}

#[tokio::test]
async fn test_assembled_unit_builds() {
    let tree = SourceTree::new(vec![
        SrcFile::new("/src/index.ts", "export const support = 'from tree'"),
        SrcFile::new("/src/helpers.ts", "export const unused = 0"),
        SrcFile::new("/src/syntax.grammar", "@top Doc { Word* }\n@tokens { Word { $[a-z]+ } }"),
    ]);
    let files = assemble(
        tree,
        None,
        "export { parser } from './src/syntax.grammar'\nexport { support } from './src/index'",
        "example",
    );

    let registry = registry();
    registry.push(LanguageOption::from_files("Example", "example", files)).unwrap();
    let lang = registry.get("example", true).await.unwrap().unwrap();

    assert!(lang.error(Role::Parser).is_none(), "{:?}", lang.error(Role::Parser));
    assert_eq!(lang.support().unwrap().as_str(), Some("from tree"));
    assert!(lang.parser().unwrap().get("configure").unwrap().is_callable());
}
