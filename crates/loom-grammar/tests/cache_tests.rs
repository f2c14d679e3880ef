//! Integration tests for the grammar cache
//!
//! Covers request deduplication, bounded growth under many distinct
//! grammars, cached warnings, the worker/inline equivalence and the inline
//! fallback once the worker is gone.

use futures::future::join_all;
use loom_grammar::{CacheConfig, CompileReport, GrammarCache, GrammarCompiler, GrammarError, TermCompiler};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Counts calls and takes a little time, so concurrent requests overlap.
struct SlowCounting {
    calls: Arc<AtomicUsize>,
}

impl GrammarCompiler for SlowCounting {
    fn compile(&self, grammar: &str) -> Result<CompileReport, String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        std::thread::sleep(Duration::from_millis(20));
        Ok(CompileReport {
            parser: format!("parser for {}", grammar),
            terms: String::new(),
            warnings: Vec::new(),
        })
    }
}

fn config(use_worker: bool) -> CacheConfig {
    CacheConfig {
        seed: Some(42),
        use_worker,
        ..CacheConfig::default()
    }
}

#[tokio::test]
async fn test_concurrent_requests_dispatch_once() {
    let calls = Arc::new(AtomicUsize::new(0));
    let cache = GrammarCache::with_compiler(config(true), Arc::new(SlowCounting { calls: calls.clone() }));

    let handles: Vec<_> = (0..16).map(|_| cache.compile("@top Same { \"s\" }")).collect();
    let results = join_all(handles).await;

    assert!(results.iter().all(|r| r.as_ref().map(|o| o.parser.as_str()) == Ok("parser for @top Same { \"s\" }")));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(cache.dispatches(), 1);
}

#[tokio::test]
async fn test_many_distinct_grammars_stay_bounded() {
    let cache = GrammarCache::new(config(false));
    for i in 0..400 {
        cache
            .compile(&format!("@top Rule{} {{ \"t{}\" }}", i, i))
            .await
            .unwrap();
        assert!(cache.len() <= 129, "{} entries after {} requests", cache.len(), i + 1);
    }
    assert_eq!(cache.dispatches(), 400);
}

#[tokio::test]
async fn test_handle_survives_eviction() {
    let cache = GrammarCache::new(config(false));
    let early = cache.compile("@top Early { \"e\" }");
    let first = early.clone().await.unwrap();

    for i in 0..300 {
        cache.compile(&format!("@top Filler{} {{ \"f\" }}", i)).await.unwrap();
    }

    assert_eq!(early.await.unwrap(), first);
}

#[tokio::test]
async fn test_warnings_are_cached_as_failure() {
    let cache = GrammarCache::new(config(true));
    let grammar = "@top T { \"a\" }\nleftover { \"b\" }";

    let first = cache.compile(grammar).await.unwrap_err();
    assert_eq!(first, GrammarError::Warnings(vec!["Unused rule 'leftover' (2:1)".to_string()]));

    let second = cache.compile(grammar).await.unwrap_err();
    assert_eq!(second, first);
    assert_eq!(cache.dispatches(), 1);
}

#[tokio::test]
async fn test_compile_errors_are_cached() {
    let cache = GrammarCache::new(config(true));
    let err = cache.compile("@top T { undefinedThing }").await.unwrap_err();
    assert!(matches!(err, GrammarError::Compile(ref m) if m.contains("undefinedThing")));
    assert!(cache.compile("@top T { undefinedThing }").await.is_err());
    assert_eq!(cache.dispatches(), 1);
}

#[tokio::test]
async fn test_worker_and_inline_agree() {
    let grammar = r#"
        @top Program { item* }
        item { Word | Number }
        @tokens {
          Word { $[a-z]+ }
          Number { $[0-9]+ }
        }
    "#;
    let worker = GrammarCache::new(config(true)).compile(grammar).await.unwrap();
    let inline = GrammarCache::new(config(false)).compile(grammar).await.unwrap();
    assert_eq!(worker, inline);

    let direct = TermCompiler::new().compile(grammar).unwrap().into_output().unwrap();
    assert_eq!(worker, direct);
}

#[tokio::test]
async fn test_closed_worker_falls_back_inline() {
    let grammar = "@top Doc { Word* }\n@tokens { Word { $[a-z]+ } }";
    let cache = GrammarCache::new(config(true));
    cache.close_worker();

    let output = cache.compile(grammar).await.unwrap();
    let inline = GrammarCache::new(config(false)).compile(grammar).await.unwrap();
    assert_eq!(output, inline);
    assert_eq!(cache.dispatches(), 1);

    // still cached, still one dispatch
    assert_eq!(cache.compile(grammar).await.unwrap(), inline);
    assert_eq!(cache.dispatches(), 1);
}
