//! Loom runtime
//!
//! Manages language units: a unit is a set of virtual source files whose
//! parser, support and index roles are built into live exports.
//! - **Files**: the virtual file store and source assembly (`store`, `sources`)
//! - **Resolution**: the unit resolution policy and external providers
//!   (`policy`, `externals`)
//! - **Builds**: the role correlator and the single-flight slot
//!   (`correlator`, `coordinator`)
//! - **Languages**: managed units and the registry (`language`, `registry`)
//!
//! # Example
//!
//! ```rust,ignore
//! use loom_runtime::{Language, Role, Runtime, RuntimeConfig, SrcFile, UnitFiles};
//!
//! let runtime = Runtime::new(RuntimeConfig::default())?;
//! let files = UnitFiles::new(vec![
//!     SrcFile::new("/config.ts", "export { parser } from '/parser'").entry_of(Role::Index),
//!     SrcFile::new("/parser/index.ts", "export { parser } from './syntax.grammar'").entry_of(Role::Parser),
//!     SrcFile::new("/parser/syntax.grammar", "@top Doc { Word* }\n@tokens { Word { $[a-z]+ } }"),
//! ]);
//! let lang = Language::new("demo", runtime, files);
//! lang.build().await;
//! assert!(lang.parser().is_some());
//! ```

#![warn(rust_2018_idioms)]

// ============================================================================
// Core Modules
// ============================================================================

/// Runtime configuration
pub mod config;

/// Shared runtime state
pub mod context;

/// Error types
pub mod error;

/// Log subscriber setup
pub mod logging;

/// Roles and their outcomes
pub mod role;

/// Virtual file store
pub mod store;

// ============================================================================
// Resolution
// ============================================================================

/// Host values for bare module names
pub mod externals;

/// Unit resolution policy
pub mod policy;

// ============================================================================
// Builds and languages
// ============================================================================

/// Single-flight build slot
pub mod coordinator;

/// Correlated role builds
pub mod correlator;

/// Managed language units
pub mod language;

/// Registry of languages
pub mod registry;

/// Source tree assembly
pub mod sources;

/// Latest-request-wins tracking
pub mod supersede;

// ============================================================================
// Re-exports
// ============================================================================

pub use config::{BuildConfig, ResolveConfig, RuntimeConfig};
pub use context::Runtime;
pub use coordinator::{InflightSlot, SharedBuild};
pub use correlator::{Correlator, RoleSink, UnitSources};
pub use error::{ConfigError, RoleError, RuntimeError};
pub use externals::{ExternalProvider, ExternalTable, ProviderChain};
pub use language::Language;
pub use policy::{GrammarSession, Siblings, UnitPolicy};
pub use registry::{FileSource, LanguageOption, LanguageRegistry, ModuleNames};
pub use role::{Role, RoleOutput, RoleOutputs, RoleSet};
pub use sources::{assemble, mark_entry, SourceTree};
pub use store::{Content, FileStore, SrcFile, UnitFiles};
pub use supersede::{Supersede, Ticket};
