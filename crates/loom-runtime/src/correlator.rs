//! Correlated build of a unit's three roles.
//!
//! Parser and support are independent and build concurrently. The index
//! builds after both, with the pseudo-paths bound to whatever they
//! produced; a failed sibling is `null` to the index, not an abort. Every
//! outcome is reported through a [`RoleSink`] as soon as it is known.

use crate::context::Runtime;
use crate::error::RoleError;
use crate::externals::ProviderChain;
use crate::policy::{GrammarSession, Siblings, UnitPolicy};
use crate::role::{Role, RoleOutput};
use crate::store::FileStore;
use loom_engine::{build, Strategy, Value};
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

/// Receives each role's outcome.
pub trait RoleSink: Send + Sync {
    fn emit(&self, role: Role, output: RoleOutput);
}

/// Files one build reads from.
#[derive(Clone)]
pub struct UnitSources {
    pub src: Arc<FileStore>,
    /// Prebuilt snapshot, preferred for every role it has an entry for
    pub prebuilt: Option<Arc<FileStore>>,
}

impl UnitSources {
    pub fn new(src: Arc<FileStore>) -> Self {
        Self { src, prebuilt: None }
    }
}

/// Builds the roles of one unit against one runtime.
pub struct Correlator {
    runtime: Arc<Runtime>,
    providers: Arc<ProviderChain>,
}

impl Correlator {
    pub fn new(runtime: Arc<Runtime>, providers: Arc<ProviderChain>) -> Self {
        Self { runtime, providers }
    }

    /// Build parser and support, then index. Returns the index exports.
    pub async fn build(&self, name: &str, sources: &UnitSources, sink: &dyn RoleSink) -> Option<Value> {
        let started = Instant::now();
        let grammars = GrammarSession::new();
        info!(unit = %name, prebuilt = sources.prebuilt.is_some(), "unit build started");

        let (parser, support) = tokio::join!(
            self.build_role(Role::Parser, sources, &grammars, Siblings::default()),
            self.build_role(Role::Support, sources, &grammars, Siblings::default()),
        );
        let siblings = Siblings {
            parser: parser.as_ref().ok().cloned(),
            support: support.as_ref().ok().cloned(),
        };
        let parser_ok = self.report(name, Role::Parser, parser, sink);
        let support_ok = self.report(name, Role::Support, support, sink);

        let index = self.build_role(Role::Index, sources, &grammars, siblings).await;
        let exports = index.as_ref().ok().cloned();
        let index_ok = self.report(name, Role::Index, index, sink);

        info!(
            unit = %name,
            parser = parser_ok,
            support = support_ok,
            index = index_ok,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "unit build finished"
        );
        exports
    }

    async fn build_role(
        &self,
        role: Role,
        sources: &UnitSources,
        grammars: &Arc<GrammarSession>,
        siblings: Siblings,
    ) -> Result<Value, RoleError> {
        let prebuilt = sources
            .prebuilt
            .as_ref()
            .and_then(|store| store.entry_for(role).map(|entry| (store.clone(), entry)));

        let (store, entry, strategy) = match prebuilt {
            Some((store, entry)) => {
                let strategy = if self.runtime.config().build.fast_prebuilt {
                    Strategy::Fast
                } else {
                    Strategy::Full
                };
                (store, entry, strategy)
            }
            None => {
                let entry = sources.src.entry_for(role).ok_or(RoleError::MissingEntry { role })?;
                (sources.src.clone(), entry, Strategy::Full)
            }
        };

        let policy = UnitPolicy::new(
            self.runtime.clone(),
            store,
            self.providers.clone(),
            grammars.clone(),
            role,
        )
        .with_siblings(siblings);
        Ok(build(&entry, &policy, strategy).await?)
    }

    fn report(&self, name: &str, role: Role, result: Result<Value, RoleError>, sink: &dyn RoleSink) -> bool {
        if let Err(err) = &result {
            warn!(unit = %name, role = %role, error = %err, "role build failed");
        }
        let ok = result.is_ok();
        sink.emit(role, RoleOutput::from(result));
        ok
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RuntimeConfig;
    use crate::store::SrcFile;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct Recorder {
        seen: Mutex<Vec<(Role, RoleOutput)>>,
    }

    impl RoleSink for Recorder {
        fn emit(&self, role: Role, output: RoleOutput) {
            self.seen.lock().push((role, output));
        }
    }

    fn correlator() -> Correlator {
        let mut config = RuntimeConfig::default();
        config.grammar.use_worker = false;
        let runtime = Runtime::new(config).unwrap();
        let providers = Arc::new(ProviderChain::new().with(runtime.externals().clone()));
        Correlator::new(runtime, providers)
    }

    #[tokio::test]
    async fn test_roles_reported_in_order() {
        let src = FileStore::new(vec![
            SrcFile::new("/config.ts", "export { value as parser } from '/parser'\nexport const support = null")
                .entry_of(Role::Index),
            SrcFile::new("/p.ts", "export const value = 1").entry_of(Role::Parser),
            SrcFile::new("/s.ts", "export default 2").entry_of(Role::Support),
        ]);
        let sink = Recorder::default();
        let index = correlator()
            .build("demo", &UnitSources::new(Arc::new(src)), &sink)
            .await
            .unwrap();

        assert_eq!(index.get("parser").unwrap().as_number(), Some(1.0));
        let seen = sink.seen.lock();
        let roles: Vec<Role> = seen.iter().map(|(role, _)| *role).collect();
        assert_eq!(roles, vec![Role::Parser, Role::Support, Role::Index]);
        assert!(seen.iter().all(|(_, output)| output.is_ok()));
    }

    #[tokio::test]
    async fn test_missing_entry_is_per_role() {
        let src = FileStore::new(vec![SrcFile::new("/config.ts", "export const ok = true").entry_of(Role::Index)]);
        let sink = Recorder::default();
        let index = correlator().build("bare", &UnitSources::new(Arc::new(src)), &sink).await;

        assert!(index.is_some());
        let seen = sink.seen.lock();
        assert!(matches!(
            seen[0].1.error,
            Some(RoleError::MissingEntry { role: Role::Parser })
        ));
        assert!(matches!(
            seen[1].1.error,
            Some(RoleError::MissingEntry { role: Role::Support })
        ));
        assert!(seen[2].1.is_ok());
    }
}
