//! Grammar compilation errors

use thiserror::Error;

/// Why a grammar did not produce parser and terms modules.
///
/// Clone, because a failed compilation is cached and handed to every
/// request for the same grammar text.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GrammarError {
    /// The compiler rejected the grammar
    #[error("{0}")]
    Compile(String),

    /// The grammar compiled but produced warnings, which count as failure
    #[error("Grammar produced warnings: {}", .0.join("; "))]
    Warnings(Vec<String>),

    /// The worker is gone and the request could not be answered
    #[error("Grammar worker unavailable")]
    WorkerUnavailable,

    /// A malformed message crossed the worker boundary
    #[error("Malformed worker message: {0}")]
    Protocol(String),
}
