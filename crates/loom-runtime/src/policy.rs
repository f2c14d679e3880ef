//! How a unit answers the build engine's resolution requests.
//!
//! Checked in order:
//! 1. the parser/support pseudo-paths (index builds only) link to the live
//!    sibling exports, or `null`;
//! 2. grammar files compile through the grammar cache, at most once per
//!    build, and load the generated parser module;
//! 3. terms paths load the terms module of the same compilation;
//! 4. absolute paths load from the file store, exact match first, then
//!    with each source suffix;
//! 5. bare names go through the provider chain.

use crate::context::Runtime;
use crate::externals::ProviderChain;
use crate::role::Role;
use crate::store::FileStore;
use futures::future::{self, BoxFuture, FutureExt};
use loom_engine::{is_internal, LoadedSource, Resolution, ResolveError, ResolvePolicy, SourceKind, Value};
use loom_grammar::GrammarOutput;
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::debug;

type GrammarCell = Arc<OnceCell<Result<GrammarOutput, ResolveError>>>;

/// Grammar compilations of one unit build, keyed by grammar file path.
#[derive(Default)]
pub struct GrammarSession {
    cells: Mutex<FxHashMap<String, GrammarCell>>,
}

impl GrammarSession {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn cell(&self, path: &str) -> GrammarCell {
        self.cells.lock().entry(path.to_string()).or_default().clone()
    }

    /// Grammar files compiled (or compiling) in this build.
    pub fn len(&self) -> usize {
        self.cells.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.lock().is_empty()
    }
}

/// Live exports of the parser and support roles, seen by the index build.
#[derive(Debug, Clone, Default)]
pub struct Siblings {
    pub parser: Option<Value>,
    pub support: Option<Value>,
}

/// [`ResolvePolicy`] over one unit's files for one role build.
pub struct UnitPolicy {
    runtime: Arc<Runtime>,
    store: Arc<FileStore>,
    providers: Arc<ProviderChain>,
    grammars: Arc<GrammarSession>,
    role: Role,
    siblings: Siblings,
}

impl UnitPolicy {
    pub fn new(
        runtime: Arc<Runtime>,
        store: Arc<FileStore>,
        providers: Arc<ProviderChain>,
        grammars: Arc<GrammarSession>,
        role: Role,
    ) -> Self {
        Self {
            runtime,
            store,
            providers,
            grammars,
            role,
            siblings: Siblings::default(),
        }
    }

    /// Bind the pseudo-paths. Only consulted when the role is the index.
    pub fn with_siblings(mut self, siblings: Siblings) -> Self {
        self.siblings = siblings;
        self
    }

    pub fn role(&self) -> Role {
        self.role
    }

    fn sibling(&self, path: &str) -> Option<Value> {
        if self.role != Role::Index {
            return None;
        }
        let resolve = &self.runtime.config().resolve;
        if path == resolve.parser_alias {
            Some(self.siblings.parser.clone().unwrap_or(Value::Null))
        } else if path == resolve.support_alias {
            Some(self.siblings.support.clone().unwrap_or(Value::Null))
        } else {
            None
        }
    }

    /// Compilation of the grammar at `requested`, or of the unit's first
    /// grammar file when no file has that exact path.
    fn grammar(&self, requested: &str) -> BoxFuture<'static, Result<GrammarOutput, ResolveError>> {
        let suffix = &self.runtime.config().resolve.grammar_suffix;
        let file = if self.store.contains(requested) {
            Some(requested.to_string())
        } else {
            self.store.first_with_suffix(suffix)
        };
        let Some(file) = file else {
            return future::ready(Err(ResolveError::not_found(requested))).boxed();
        };

        let cell = self.grammars.cell(&file);
        let store = self.store.clone();
        let runtime = self.runtime.clone();
        async move {
            cell.get_or_init(|| compile_grammar(runtime, store, file))
                .await
                .clone()
        }
        .boxed()
    }
}

async fn compile_grammar(
    runtime: Arc<Runtime>,
    store: Arc<FileStore>,
    file: String,
) -> Result<GrammarOutput, ResolveError> {
    let text = store.read(&file).await?;
    debug!(path = %file, "compiling grammar");
    runtime
        .grammars()
        .compile(&text)
        .await
        .map_err(|err| ResolveError::failed(&file, err))
}

impl ResolvePolicy for UnitPolicy {
    fn resolve(&self, path: &str) -> Resolution {
        if let Some(value) = self.sibling(path) {
            return Resolution::external_value(value);
        }

        let resolve = &self.runtime.config().resolve;
        if path.ends_with(resolve.grammar_suffix.as_str()) {
            let output = self.grammar(path);
            return Resolution::load(async move {
                let output = output.await?;
                Ok::<_, ResolveError>(LoadedSource::new(output.parser, SourceKind::Script))
            });
        }
        if self.runtime.is_terms_path(path) {
            let output = self.grammar(&self.runtime.grammar_of_terms(path));
            return Resolution::load(async move {
                let output = output.await?;
                Ok::<_, ResolveError>(LoadedSource::new(output.terms, SourceKind::Script))
            });
        }

        if is_internal(path) {
            let Some((file, kind)) = self.store.lookup(path, &resolve.source_suffixes) else {
                return Resolution::not_found(path);
            };
            let store = self.store.clone();
            return Resolution::load(async move {
                let text = store.read(&file).await?;
                Ok::<_, ResolveError>(LoadedSource::new(text.as_ref(), kind))
            });
        }

        Resolution::External(self.providers.resolve(path))
    }
}
