//! Runtime errors raised while executing Loom script.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ExecError {
    /// Property read or write on `null`/`undefined`
    #[error("Cannot read property '{property}' of {base}")]
    NullDereference { property: String, base: &'static str },

    #[error("{what} is not a function")]
    NotCallable { what: String },

    #[error("{name} is not defined")]
    UndefinedVariable { name: String },

    #[error("Assignment to constant variable '{name}'")]
    ConstAssignment { name: String },

    #[error("Maximum call depth ({depth}) exceeded")]
    StackOverflow { depth: usize },

    #[error("Invalid array length {length}")]
    InvalidArrayLength { length: f64 },

    #[error("Cannot find module '{specifier}'")]
    UnresolvedImport { specifier: String },

    /// Raised by host functions
    #[error("{0}")]
    Native(String),
}

impl ExecError {
    pub fn native(message: impl Into<String>) -> Self {
        ExecError::Native(message.into())
    }
}
