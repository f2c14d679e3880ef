//! The seam between the build engine and whoever owns the sources.
//!
//! For every distinct absolute path or bare name a build meets, the engine
//! asks its [`ResolvePolicy`] once. The answer is either source text to
//! load as a module of the bundle, or a host value to link as an external.

use crate::syntax::SourceKind;
use crate::vm::Value;
use futures::future::{self, BoxFuture, FutureExt};
use std::fmt;
use std::future::Future;
use thiserror::Error;

/// Source text plus how to interpret it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadedSource {
    pub contents: String,
    pub kind: SourceKind,
}

impl LoadedSource {
    pub fn new(contents: impl Into<String>, kind: SourceKind) -> Self {
        Self {
            contents: contents.into(),
            kind,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolveError {
    #[error("Module not found: {path}")]
    NotFound { path: String },

    #[error("Failed to load {path}: {message}")]
    Failed { path: String, message: String },
}

impl ResolveError {
    pub fn not_found(path: impl Into<String>) -> Self {
        ResolveError::NotFound { path: path.into() }
    }

    pub fn failed(path: impl Into<String>, cause: impl fmt::Display) -> Self {
        ResolveError::Failed {
            path: path.into(),
            message: cause.to_string(),
        }
    }

    pub fn path(&self) -> &str {
        match self {
            ResolveError::NotFound { path } | ResolveError::Failed { path, .. } => path,
        }
    }
}

/// Outcome of resolving one path.
pub enum Resolution {
    /// Load as a module of the bundle
    Load(BoxFuture<'static, Result<LoadedSource, ResolveError>>),
    /// Link against a host value
    External(BoxFuture<'static, Result<Value, ResolveError>>),
}

impl Resolution {
    pub fn loaded(contents: impl Into<String>, kind: SourceKind) -> Self {
        Resolution::Load(future::ready(Ok(LoadedSource::new(contents, kind))).boxed())
    }

    pub fn load<F>(fut: F) -> Self
    where
        F: Future<Output = Result<LoadedSource, ResolveError>> + Send + 'static,
    {
        Resolution::Load(fut.boxed())
    }

    pub fn external_value(value: Value) -> Self {
        Resolution::External(future::ready(Ok(value)).boxed())
    }

    pub fn external<F>(fut: F) -> Self
    where
        F: Future<Output = Result<Value, ResolveError>> + Send + 'static,
    {
        Resolution::External(fut.boxed())
    }

    /// A load that fails with [`ResolveError::NotFound`].
    pub fn not_found(path: &str) -> Self {
        Resolution::Load(future::ready(Err(ResolveError::not_found(path))).boxed())
    }

    pub fn is_external(&self) -> bool {
        matches!(self, Resolution::External(_))
    }
}

impl fmt::Debug for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Resolution::Load(_) => write!(f, "Resolution::Load(..)"),
            Resolution::External(_) => write!(f, "Resolution::External(..)"),
        }
    }
}

/// Decides how each path met during a build is satisfied.
pub trait ResolvePolicy: Send + Sync {
    fn resolve(&self, path: &str) -> Resolution;
}

impl<F> ResolvePolicy for F
where
    F: Fn(&str) -> Resolution + Send + Sync,
{
    fn resolve(&self, path: &str) -> Resolution {
        self(path)
    }
}
