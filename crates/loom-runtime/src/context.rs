//! State shared by every language of one runtime.

use crate::config::RuntimeConfig;
use crate::error::ConfigError;
use crate::externals::ExternalTable;
use loom_grammar::{GrammarCache, GrammarCompiler};
use regex::Regex;
use std::sync::Arc;

/// Configuration, the grammar cache and the static externals.
pub struct Runtime {
    config: RuntimeConfig,
    grammars: Arc<GrammarCache>,
    externals: Arc<ExternalTable>,
    terms: Regex,
}

impl Runtime {
    pub fn new(config: RuntimeConfig) -> Result<Arc<Self>, ConfigError> {
        let grammars = Arc::new(GrammarCache::new(config.grammar.clone()));
        Self::with_parts(config, grammars, ExternalTable::standard())
    }

    /// Runtime with a custom grammar compiler behind the cache.
    pub fn with_compiler(config: RuntimeConfig, compiler: Arc<dyn GrammarCompiler>) -> Result<Arc<Self>, ConfigError> {
        let grammars = Arc::new(GrammarCache::with_compiler(config.grammar.clone(), compiler));
        Self::with_parts(config, grammars, ExternalTable::standard())
    }

    pub fn with_parts(
        config: RuntimeConfig,
        grammars: Arc<GrammarCache>,
        externals: ExternalTable,
    ) -> Result<Arc<Self>, ConfigError> {
        config.validate()?;
        let terms = config.resolve.terms_regex()?;
        Ok(Arc::new(Self {
            config,
            grammars,
            externals: Arc::new(externals),
            terms,
        }))
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    pub fn grammars(&self) -> &Arc<GrammarCache> {
        &self.grammars
    }

    pub fn externals(&self) -> &Arc<ExternalTable> {
        &self.externals
    }

    /// Whether `path` names a generated terms module.
    pub fn is_terms_path(&self, path: &str) -> bool {
        self.terms.is_match(path)
    }

    /// Grammar path a terms path belongs to.
    pub fn grammar_of_terms(&self, path: &str) -> String {
        self.terms.replace(path, "").into_owned()
    }
}
