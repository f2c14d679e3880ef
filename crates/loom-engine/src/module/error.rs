//! Build errors

use super::resolution::ResolveError;
use crate::syntax::SyntaxError;
use crate::vm::ExecError;
use thiserror::Error;

/// Static linking failures between modules of one bundle.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum LinkError {
    #[error("'{importer}' imports '{name}' from '{module}', which does not export it")]
    MissingExport {
        module: String,
        name: String,
        importer: String,
    },
}

/// Errors that abort a build.
///
/// Clone, because one failed build is observed by every waiter of the
/// shared handle.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum BuildError {
    #[error("Could not resolve '{path}': {source}")]
    Unresolved {
        path: String,
        #[source]
        source: ResolveError,
    },

    #[error("Entry '{path}' resolved to an external module")]
    ExternalEntry { path: String },

    #[error("Syntax error in {path}: {source}")]
    Syntax {
        path: String,
        #[source]
        source: SyntaxError,
    },

    #[error(transparent)]
    Link(#[from] LinkError),

    #[error("Error executing {path}: {source}")]
    Exec {
        path: String,
        #[source]
        source: ExecError,
    },
}

impl BuildError {
    /// Path of the module the error is about.
    pub fn path(&self) -> &str {
        match self {
            BuildError::Unresolved { path, .. }
            | BuildError::ExternalEntry { path }
            | BuildError::Syntax { path, .. }
            | BuildError::Exec { path, .. } => path,
            BuildError::Link(LinkError::MissingExport { importer, .. }) => importer,
        }
    }
}
