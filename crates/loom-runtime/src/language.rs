//! A managed language unit.
//!
//! Owns the unit's files and the latest outcome of each role. Builds are
//! single-flight; editing a file invalidates the in-flight build and drops
//! the prebuilt snapshot, so the next build runs from source.

use crate::context::Runtime;
use crate::coordinator::{InflightSlot, SharedBuild};
use crate::correlator::{Correlator, RoleSink, UnitSources};
use crate::error::RoleError;
use crate::externals::ProviderChain;
use crate::registry::LanguageOption;
use crate::role::{Role, RoleOutput, RoleOutputs};
use crate::store::{FileStore, UnitFiles};
use loom_engine::Value;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::debug;

pub struct Language {
    name: String,
    option: Option<Arc<LanguageOption>>,
    src: Arc<FileStore>,
    prebuilt: RwLock<Option<Arc<FileStore>>>,
    outputs: Arc<RwLock<RoleOutputs>>,
    inflight: InflightSlot,
    correlator: Arc<Correlator>,
}

impl std::fmt::Debug for Language {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Language")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// Writes role outcomes into the language, unless a newer build started.
struct OutputSink {
    outputs: Arc<RwLock<RoleOutputs>>,
    latest: Arc<AtomicU64>,
    generation: u64,
}

impl RoleSink for OutputSink {
    fn emit(&self, role: Role, output: RoleOutput) {
        if self.latest.load(Ordering::SeqCst) != self.generation {
            debug!(role = %role, generation = self.generation, "dropping outcome of superseded build");
            return;
        }
        *self.outputs.write().get_mut(role) = output;
    }
}

impl Language {
    /// A language resolving bare names against the runtime's static
    /// externals only.
    pub fn new(name: impl Into<String>, runtime: Arc<Runtime>, files: UnitFiles) -> Self {
        let providers = Arc::new(ProviderChain::new().with(runtime.externals().clone()));
        Self::with_providers(name, runtime, files, providers)
    }

    pub fn with_providers(
        name: impl Into<String>,
        runtime: Arc<Runtime>,
        files: UnitFiles,
        providers: Arc<ProviderChain>,
    ) -> Self {
        Self {
            name: name.into(),
            option: None,
            src: Arc::new(FileStore::new(files.src)),
            prebuilt: RwLock::new(files.prebuilt.map(|files| Arc::new(FileStore::new(files)))),
            outputs: Arc::new(RwLock::new(RoleOutputs::default())),
            inflight: InflightSlot::new(),
            correlator: Arc::new(Correlator::new(runtime, providers)),
        }
    }

    pub(crate) fn with_option(mut self, option: Arc<LanguageOption>) -> Self {
        self.option = Some(option);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Registry entry this language was created from.
    pub fn option(&self) -> Option<&Arc<LanguageOption>> {
        self.option.as_ref()
    }

    pub fn files(&self) -> &Arc<FileStore> {
        &self.src
    }

    pub fn has_prebuilt(&self) -> bool {
        self.prebuilt.read().is_some()
    }

    // ========================================================================
    // Building
    // ========================================================================

    /// Ensure a build is running or start one. Callers arriving while a
    /// build is in flight share it. Must be called inside a tokio runtime.
    pub fn build(&self) -> SharedBuild {
        self.inflight.get_or_start(|generation| {
            let correlator = self.correlator.clone();
            let name = self.name.clone();
            let sources = UnitSources {
                src: self.src.clone(),
                prebuilt: self.prebuilt.read().clone(),
            };
            let sink = OutputSink {
                outputs: self.outputs.clone(),
                latest: self.inflight.generation_counter(),
                generation,
            };
            async move { correlator.build(&name, &sources, &sink).await }
        })
    }

    /// Replace a source file's text. When the text actually changed, the
    /// in-flight build is forgotten and the prebuilt snapshot dropped.
    pub fn change(&self, path: &str, text: &str) -> bool {
        if !self.src.change(path, text) {
            return false;
        }
        debug!(language = %self.name, path = %path, "source changed");
        self.inflight.invalidate();
        self.prebuilt.write().take();
        true
    }

    pub fn is_building(&self) -> bool {
        self.inflight.is_inflight()
    }

    /// Builds started so far.
    pub fn builds_started(&self) -> u64 {
        self.inflight.generation()
    }

    // ========================================================================
    // Outcomes
    // ========================================================================

    pub fn outputs(&self) -> RoleOutputs {
        self.outputs.read().clone()
    }

    pub fn output(&self, role: Role) -> RoleOutput {
        self.outputs.read().get(role).clone()
    }

    pub fn exports(&self, role: Role) -> Option<Value> {
        self.outputs.read().get(role).exports.clone()
    }

    pub fn error(&self, role: Role) -> Option<RoleError> {
        self.outputs.read().get(role).error.clone()
    }

    /// `parser` export of the index.
    pub fn parser(&self) -> Option<Value> {
        self.index_field("parser")
    }

    /// `support` export of the index.
    pub fn support(&self) -> Option<Value> {
        self.index_field("support")
    }

    fn index_field(&self, key: &str) -> Option<Value> {
        let index = self.exports(Role::Index)?;
        index.get(key).ok().filter(|value| !value.is_nullish())
    }
}
