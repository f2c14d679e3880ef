//! Module resolution and bundling.
//!
//! A build turns an entry path plus a [`ResolvePolicy`] into the entry's
//! exports. The full strategy walks the module graph, links it into a
//! bundle and executes it; the fast strategy runs a prebuilt single-file
//! snapshot directly.

pub mod error;
pub mod executor;
pub mod fast;
pub mod graph;
pub mod linker;
pub mod path;
pub mod resolution;

pub use error::{BuildError, LinkError};
pub use graph::{walk, ModuleGraph, ModuleRecord};
pub use linker::{link, Bundle, BundledModule, Link};
pub use path::{is_internal, resolve_path};
pub use resolution::{LoadedSource, Resolution, ResolveError, ResolvePolicy};

use crate::vm::Value;
use tracing::debug;

/// How a build turns its entry into exports.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Strategy {
    /// Walk, link and execute the whole module graph
    #[default]
    Full,
    /// Run a prebuilt snapshot as one script
    Fast,
}

/// Build `entry` and return its exports.
pub async fn build(entry: &str, policy: &dyn ResolvePolicy, strategy: Strategy) -> Result<Value, BuildError> {
    debug!(entry = %entry, ?strategy, "build");
    match strategy {
        Strategy::Full => {
            let graph = walk(entry, policy).await?;
            let bundle = link(graph)?;
            executor::execute(&bundle)
        }
        Strategy::Fast => fast::build_fast(entry, policy).await,
    }
}
