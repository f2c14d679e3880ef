//! The grammar compiler seam.

use crate::error::GrammarError;
use serde::{Deserialize, Serialize};

/// Generated module texts for one grammar.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GrammarOutput {
    /// Parser module: imports the parser runtime and exports `parser`
    pub parser: String,
    /// Terms module: one exported constant per named term
    pub terms: String,
}

/// Everything a compiler run produced, warnings included.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CompileReport {
    pub parser: String,
    pub terms: String,
    pub warnings: Vec<String>,
}

impl CompileReport {
    /// Turn the report into output; any warning rejects the grammar.
    pub fn into_output(self) -> Result<GrammarOutput, GrammarError> {
        if !self.warnings.is_empty() {
            return Err(GrammarError::Warnings(self.warnings));
        }
        Ok(GrammarOutput {
            parser: self.parser,
            terms: self.terms,
        })
    }
}

/// Something that turns grammar text into parser and terms modules.
///
/// Implementations run on the worker thread, so they must be shareable.
pub trait GrammarCompiler: Send + Sync {
    fn compile(&self, grammar: &str) -> Result<CompileReport, String>;
}

impl<F> GrammarCompiler for F
where
    F: Fn(&str) -> Result<CompileReport, String> + Send + Sync,
{
    fn compile(&self, grammar: &str) -> Result<CompileReport, String> {
        self(grammar)
    }
}
