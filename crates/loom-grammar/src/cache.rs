//! Grammar compiler cache
//!
//! Maps exact grammar text to a shared pending result, so that any number
//! of concurrent requests for the same grammar cause one dispatch and all
//! observe the same outcome, failures included.
//!
//! The cache is bounded loosely: once it holds more than
//! `cache_capacity` entries, every settled entry independently survives
//! with `retain_probability` before the next one is inserted. Pending
//! entries always survive, and handles already given out stay valid.

use crate::compiler::{CompileReport, GrammarCompiler, GrammarOutput};
use crate::error::GrammarError;
use crate::term::TermCompiler;
use crate::worker::{run_compiler, Worker};
use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rustc_hash::FxHashMap;
use serde::Deserialize;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

/// Shared handle to one grammar's compilation.
pub type SharedGrammar = Shared<BoxFuture<'static, Result<GrammarOutput, GrammarError>>>;

fn default_capacity() -> usize {
    128
}

fn default_retain_probability() -> f64 {
    0.5
}

fn default_use_worker() -> bool {
    true
}

/// Cache settings, the `[grammar]` section of the runtime config.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CacheConfig {
    /// Entry count above which eviction runs
    #[serde(default = "default_capacity")]
    pub cache_capacity: usize,

    /// Chance for a settled entry to survive one eviction pass
    #[serde(default = "default_retain_probability")]
    pub retain_probability: f64,

    /// Seed for the eviction RNG; entropy when absent
    #[serde(default)]
    pub seed: Option<u64>,

    /// Compile on the worker thread instead of inline
    #[serde(default = "default_use_worker")]
    pub use_worker: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            cache_capacity: default_capacity(),
            retain_probability: default_retain_probability(),
            seed: None,
            use_worker: default_use_worker(),
        }
    }
}

pub struct GrammarCache {
    entries: Mutex<FxHashMap<String, SharedGrammar>>,
    rng: Mutex<StdRng>,
    config: CacheConfig,
    compiler: Arc<dyn GrammarCompiler>,
    worker: Option<Worker>,
    dispatches: AtomicUsize,
}

impl GrammarCache {
    /// A cache backed by the default [`TermCompiler`].
    pub fn new(config: CacheConfig) -> Self {
        Self::with_compiler(config, Arc::new(TermCompiler::new()))
    }

    pub fn with_compiler(config: CacheConfig, compiler: Arc<dyn GrammarCompiler>) -> Self {
        let worker = if config.use_worker {
            match Worker::spawn(compiler.clone()) {
                Ok(worker) => Some(worker),
                Err(err) => {
                    warn!(error = %err, "could not start grammar worker, compiling inline");
                    None
                }
            }
        } else {
            None
        };
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            entries: Mutex::new(FxHashMap::default()),
            rng: Mutex::new(rng),
            config,
            compiler,
            worker,
            dispatches: AtomicUsize::new(0),
        }
    }

    /// Shared handle to the compilation of `grammar`, dispatching it if no
    /// entry exists.
    pub fn compile(&self, grammar: &str) -> SharedGrammar {
        let mut entries = self.entries.lock();
        if let Some(entry) = entries.get(grammar) {
            return entry.clone();
        }
        if entries.len() > self.config.cache_capacity {
            self.evict(&mut entries);
        }
        let entry = self.dispatch(grammar).shared();
        entries.insert(grammar.to_string(), entry.clone());
        entry
    }

    /// Resident entries.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Compilations started so far.
    pub fn dispatches(&self) -> usize {
        self.dispatches.load(Ordering::Relaxed)
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Shut the compile worker down. Requests still waiting on it, and
    /// every later dispatch, compile inline instead.
    pub fn close_worker(&self) {
        if let Some(worker) = &self.worker {
            worker.close();
        }
    }

    fn evict(&self, entries: &mut FxHashMap<String, SharedGrammar>) {
        let before = entries.len();
        let retain = self.config.retain_probability.clamp(0.0, 1.0);
        let mut rng = self.rng.lock();
        entries.retain(|_, entry| entry.peek().is_none() || rng.gen_bool(retain));
        debug!(before, after = entries.len(), "grammar cache eviction");
    }

    fn dispatch(&self, grammar: &str) -> BoxFuture<'static, Result<GrammarOutput, GrammarError>> {
        self.dispatches.fetch_add(1, Ordering::Relaxed);
        debug!(bytes = grammar.len(), "dispatching grammar");

        let compiler = self.compiler.clone();
        let grammar = grammar.to_string();
        let submitted = self.worker.as_ref().map(|worker| worker.submit(&grammar));

        match submitted {
            Some(Ok(reply)) => async move {
                let report = match reply.await {
                    Ok(result) => result?,
                    Err(_) => {
                        warn!("grammar worker went away, compiling inline");
                        compile_inline(compiler.as_ref(), &grammar)?
                    }
                };
                report.into_output()
            }
            .boxed(),
            submitted => {
                if let Some(Err(err)) = submitted {
                    warn!(error = %err, "grammar worker unavailable, compiling inline");
                }
                async move { compile_inline(compiler.as_ref(), &grammar)?.into_output() }.boxed()
            }
        }
    }
}

fn compile_inline(compiler: &dyn GrammarCompiler, grammar: &str) -> Result<CompileReport, GrammarError> {
    run_compiler(compiler, grammar).map_err(GrammarError::Compile)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn inline(seed: u64) -> CacheConfig {
        CacheConfig {
            seed: Some(seed),
            use_worker: false,
            ..CacheConfig::default()
        }
    }

    #[tokio::test]
    async fn test_same_text_shares_entry() {
        let cache = GrammarCache::new(inline(1));
        let a = cache.compile("@top T { \"a\" }");
        let b = cache.compile("@top T { \"a\" }");
        assert_eq!(a.await, b.await);
        assert_eq!(cache.dispatches(), 1);
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn test_eviction_keeps_pending_entries() {
        let cache = GrammarCache::new(CacheConfig {
            cache_capacity: 2,
            retain_probability: 0.0,
            ..inline(3)
        });
        // never polled, so still pending
        let _pending = cache.compile("@top A { \"a\" }");
        for name in ["B", "C", "D"] {
            cache.compile(&format!("@top {} {{ \"x\" }}", name)).await.unwrap();
        }
        // B and C were settled when D came in
        assert_eq!(cache.len(), 2);
        let _again = cache.compile("@top A { \"a\" }");
        assert_eq!(cache.dispatches(), 4);
    }

    #[tokio::test]
    async fn test_worker_closed_mid_request_compiles_inline() {
        let (release, gate) = crossbeam::channel::bounded::<()>(1);
        let compiler = move |grammar: &str| -> Result<CompileReport, String> {
            // only the worker thread is held back
            if std::thread::current().name() == Some("loom-grammar-worker") {
                let _ = gate.recv();
            }
            Ok(CompileReport {
                parser: format!("parser for {}", grammar),
                ..CompileReport::default()
            })
        };
        let cache = GrammarCache::with_compiler(
            CacheConfig {
                use_worker: true,
                ..inline(5)
            },
            Arc::new(compiler),
        );

        let handle = cache.compile("held");
        cache.close_worker();
        let output = handle.await.unwrap();
        release.send(()).unwrap();

        assert_eq!(output.parser, "parser for held");
        assert_eq!(cache.dispatches(), 1);
    }

    #[test]
    fn test_config_defaults() {
        let config: CacheConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, CacheConfig::default());
        assert_eq!(config.cache_capacity, 128);
        assert!(config.use_worker);
    }
}
