//! Runtime error types

use crate::role::Role;
use loom_engine::BuildError;
use thiserror::Error;

/// Registry and file-set errors
#[derive(Debug, Clone, Error)]
pub enum RuntimeError {
    /// A module name is already claimed by another registered language
    #[error("Cannot add module.{kind} (\"{name}\") to registry, it is already defined")]
    DuplicateModule { kind: &'static str, name: String },

    /// The language's file source failed
    #[error("Failed to fetch files for {language}: {message}")]
    Files { language: String, message: String },
}

/// Why one role of a unit produced no exports
#[derive(Debug, Clone, Error)]
pub enum RoleError {
    /// No file of the unit is tagged as this role's entry
    #[error("No entry file for role '{role}'")]
    MissingEntry { role: Role },

    #[error(transparent)]
    Build(#[from] BuildError),
}

impl RoleError {
    /// Path of the module the failure is attributed to, if any.
    pub fn path(&self) -> Option<&str> {
        match self {
            RoleError::Build(err) => Some(err.path()),
            _ => None,
        }
    }
}

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid config: {0}")]
    Invalid(String),
}
