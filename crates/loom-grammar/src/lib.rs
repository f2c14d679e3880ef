//! Loom grammar compilation
//!
//! Turns grammar text into two generated modules (the parser and its
//! terms) and caches the outcome per exact grammar text:
//! - **Compiler**: the [`GrammarCompiler`] seam and the default [`TermCompiler`]
//! - **Worker**: an isolated compile thread spoken to in JSON messages
//! - **Cache**: shared pending results with randomized eviction
//!
//! # Example
//!
//! ```rust,ignore
//! use loom_grammar::{CacheConfig, GrammarCache};
//!
//! let cache = GrammarCache::new(CacheConfig::default());
//! let output = cache.compile("@top Program { \"x\" }").await?;
//! println!("{}", output.terms);
//! ```

#![warn(rust_2018_idioms)]

pub mod cache;
pub mod compiler;
pub mod error;
pub mod term;
pub mod worker;

pub use cache::{CacheConfig, GrammarCache, SharedGrammar};
pub use compiler::{CompileReport, GrammarCompiler, GrammarOutput};
pub use error::GrammarError;
pub use term::{TermCompiler, PARSER_RUNTIME};
pub use worker::Worker;
