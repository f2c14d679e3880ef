//! Registry of managed languages.
//!
//! Each [`LanguageOption`] claims an index module name and optionally a
//! parser and a support module name. A language is created the first time
//! one of its names is requested: its files are fetched once, however many
//! callers ask at the same time, and the initial build is shared the same
//! way.
//!
//! The registry is also an [`ExternalProvider`], so units can import each
//! other by module name. Languages hold it weakly.

use crate::context::Runtime;
use crate::error::RuntimeError;
use crate::externals::{ExternalProvider, ProviderChain};
use crate::language::Language;
use crate::role::Role;
use crate::store::UnitFiles;
use futures::future::{self, BoxFuture, FutureExt};
use loom_engine::Value;
use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use std::fmt;
use std::future::Future;
use std::sync::{Arc, Weak};
use tokio::sync::OnceCell;
use tracing::{debug, info};

/// Fetches the file set of a language.
pub type FileSource = Arc<dyn Fn() -> BoxFuture<'static, Result<UnitFiles, String>> + Send + Sync>;

/// Module names a language answers to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleNames {
    pub index: String,
    pub parser: Option<String>,
    pub support: Option<String>,
}

impl ModuleNames {
    fn iter(&self) -> impl Iterator<Item = (Role, &str)> {
        std::iter::once((Role::Index, self.index.as_str()))
            .chain(self.parser.as_deref().map(|name| (Role::Parser, name)))
            .chain(self.support.as_deref().map(|name| (Role::Support, name)))
    }
}

pub struct LanguageOption {
    pub label: String,
    pub module: ModuleNames,
    pub files: FileSource,
}

impl LanguageOption {
    pub fn new<F, Fut>(label: impl Into<String>, index: impl Into<String>, files: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<UnitFiles, String>> + Send + 'static,
    {
        Self {
            label: label.into(),
            module: ModuleNames {
                index: index.into(),
                parser: None,
                support: None,
            },
            files: Arc::new(move || files().boxed()),
        }
    }

    /// An option whose files are already in memory.
    pub fn from_files(label: impl Into<String>, index: impl Into<String>, files: UnitFiles) -> Self {
        Self::new(label, index, move || future::ready(Ok(files.clone())))
    }

    pub fn parser_module(mut self, name: impl Into<String>) -> Self {
        self.module.parser = Some(name.into());
        self
    }

    pub fn support_module(mut self, name: impl Into<String>) -> Self {
        self.module.support = Some(name.into());
        self
    }
}

impl fmt::Debug for LanguageOption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LanguageOption")
            .field("label", &self.label)
            .field("module", &self.module)
            .finish_non_exhaustive()
    }
}

struct Entry {
    option: Arc<LanguageOption>,
    language: OnceCell<Result<Arc<Language>, RuntimeError>>,
    initial_build: OnceCell<()>,
}

pub struct LanguageRegistry {
    runtime: Arc<Runtime>,
    options: RwLock<Vec<Arc<Entry>>>,
    modules: RwLock<FxHashMap<String, (Role, Arc<Entry>)>>,
    this: Weak<LanguageRegistry>,
}

impl LanguageRegistry {
    pub fn new(runtime: Arc<Runtime>) -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            runtime,
            options: RwLock::new(Vec::new()),
            modules: RwLock::new(FxHashMap::default()),
            this: this.clone(),
        })
    }

    pub fn runtime(&self) -> &Arc<Runtime> {
        &self.runtime
    }

    /// Register a language after the existing ones.
    pub fn push(&self, option: LanguageOption) -> Result<(), RuntimeError> {
        let entry = self.index(option)?;
        self.options.write().push(entry);
        Ok(())
    }

    /// Register a language before the existing ones.
    pub fn unshift(&self, option: LanguageOption) -> Result<(), RuntimeError> {
        let entry = self.index(option)?;
        self.options.write().insert(0, entry);
        Ok(())
    }

    fn index(&self, option: LanguageOption) -> Result<Arc<Entry>, RuntimeError> {
        let mut modules = self.modules.write();
        let mut claimed: Vec<&str> = Vec::new();
        for (role, name) in option.module.iter() {
            if modules.contains_key(name) || claimed.contains(&name) {
                return Err(RuntimeError::DuplicateModule {
                    kind: role.as_str(),
                    name: name.to_string(),
                });
            }
            claimed.push(name);
        }

        let entry = Arc::new(Entry {
            option: Arc::new(option),
            language: OnceCell::new(),
            initial_build: OnceCell::new(),
        });
        for (role, name) in entry.option.module.iter() {
            modules.insert(name.to_string(), (role, entry.clone()));
        }
        debug!(label = %entry.option.label, index = %entry.option.module.index, "language registered");
        Ok(entry)
    }

    /// Registered options, in order.
    pub fn options(&self) -> Vec<Arc<LanguageOption>> {
        self.options.read().iter().map(|entry| entry.option.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.options.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.options.read().is_empty()
    }

    fn entry(&self, name: &str) -> Option<(Role, Arc<Entry>)> {
        self.modules.read().get(name).cloned()
    }

    /// The language whose index module is `name`, created on first use.
    /// With `initial_build`, waits until its first build settled.
    pub async fn get(&self, name: &str, initial_build: bool) -> Result<Option<Arc<Language>>, RuntimeError> {
        match self.entry(name) {
            Some((Role::Index, entry)) => self.language(&entry, initial_build).await.map(Some),
            _ => Ok(None),
        }
    }

    /// Exports behind a module name: the index, parser or support exports
    /// of the language that claimed it, after its initial build.
    pub async fn module(&self, name: &str) -> Result<Option<Value>, RuntimeError> {
        let Some((role, entry)) = self.entry(name) else {
            return Ok(None);
        };
        let language = self.language(&entry, true).await?;
        Ok(language.exports(role))
    }

    async fn language(&self, entry: &Arc<Entry>, initial_build: bool) -> Result<Arc<Language>, RuntimeError> {
        let language = entry
            .language
            .get_or_init(|| self.create(entry.option.clone()))
            .await
            .clone()?;
        if initial_build {
            entry
                .initial_build
                .get_or_init(|| async {
                    language.build().await;
                })
                .await;
        }
        Ok(language)
    }

    async fn create(&self, option: Arc<LanguageOption>) -> Result<Arc<Language>, RuntimeError> {
        let name = option.module.index.clone();
        info!(language = %name, "fetching language files");
        let files = (option.files)().await.map_err(|message| RuntimeError::Files {
            language: name.clone(),
            message,
        })?;

        let registry: Weak<dyn ExternalProvider> = self.this.clone();
        let providers = ProviderChain::new()
            .with_weak(registry)
            .with(self.runtime.externals().clone());
        let language = Language::with_providers(name, self.runtime.clone(), files, Arc::new(providers)).with_option(option);
        Ok(Arc::new(language))
    }
}

impl ExternalProvider for LanguageRegistry {
    fn get(&self, name: &str) -> BoxFuture<'static, Result<Option<Value>, RuntimeError>> {
        let Some(registry) = self.this.upgrade() else {
            return future::ready(Ok(None)).boxed();
        };
        let name = name.to_string();
        async move {
            let exports = registry.module(&name).await?;
            Ok::<_, RuntimeError>(exports.filter(|value| !value.is_nullish()))
        }
        .boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RuntimeConfig;
    use crate::store::SrcFile;

    fn registry() -> Arc<LanguageRegistry> {
        let mut config = RuntimeConfig::default();
        config.grammar.use_worker = false;
        LanguageRegistry::new(Runtime::new(config).unwrap())
    }

    fn option(index: &str) -> LanguageOption {
        LanguageOption::from_files(
            index.to_uppercase(),
            index,
            UnitFiles::new(vec![SrcFile::new("/config.ts", "export const ready = true").entry_of(Role::Index)]),
        )
    }

    #[test]
    fn test_duplicate_names_rejected() {
        let registry = registry();
        registry.push(option("json").parser_module("lezer-json")).unwrap();

        let err = registry.push(option("json")).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Cannot add module.index (\"json\") to registry, it is already defined"
        );
        let err = registry.unshift(option("json5").support_module("lezer-json")).unwrap_err();
        assert!(matches!(err, RuntimeError::DuplicateModule { kind: "support", .. }));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_unshift_orders_first() {
        let registry = registry();
        registry.push(option("b")).unwrap();
        registry.unshift(option("a")).unwrap();
        let labels: Vec<String> = registry.options().iter().map(|o| o.label.clone()).collect();
        assert_eq!(labels, vec!["A", "B"]);
    }

    #[tokio::test]
    async fn test_unknown_and_non_index_names() {
        let registry = registry();
        registry.push(option("css").parser_module("lezer-css")).unwrap();
        assert!(registry.get("nope", true).await.unwrap().is_none());
        assert!(registry.get("lezer-css", true).await.unwrap().is_none());
        assert!(registry.module("nope").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_fetch_failure_reported() {
        let registry = registry();
        registry
            .push(LanguageOption::new("Broken", "broken", || async { Err("offline".to_string()) }))
            .unwrap();
        let err = registry.get("broken", false).await.unwrap_err();
        assert_eq!(err.to_string(), "Failed to fetch files for broken: offline");
    }
}
