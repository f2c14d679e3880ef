//! Loom build engine
//!
//! This crate turns the sources of a language unit into live exports:
//! - **Syntax**: lexer, parser and the type-stripping transform (`syntax` module)
//! - **VM**: value model and tree-walking interpreter (`vm` module)
//! - **Module**: path resolution, the resolution policy seam, graph walk,
//!   linking and execution (`module` module)
//!
//! # Example
//!
//! ```rust,ignore
//! use loom_engine::{build, Resolution, SourceKind, Strategy};
//!
//! let policy = |path: &str| match path {
//!     "/index.js" => Resolution::loaded("export const answer = 42", SourceKind::Script),
//!     _ => Resolution::not_found(path),
//! };
//! let exports = build("/index.js", &policy, Strategy::Full).await?;
//! assert_eq!(exports.get("answer")?.as_number(), Some(42.0));
//! ```

#![warn(rust_2018_idioms)]

// ============================================================================
// Core Modules
// ============================================================================

/// Lexer, parser, AST and the type-stripping transform
pub mod syntax;

/// Values, scopes and the interpreter
pub mod vm;

/// Path resolution, bundling and the build entry point
pub mod module;

// ============================================================================
// Re-exports
// ============================================================================

pub use module::{
    build, is_internal, resolve_path, BuildError, LinkError, LoadedSource, Resolution, ResolveError,
    ResolvePolicy, Strategy,
};
pub use syntax::{parse_source, SourceKind, SyntaxError};
pub use vm::{ExecError, Value};
