//! Roles of a language unit and their build outcomes.

use crate::error::RoleError;
use loom_engine::Value;
use std::fmt;

/// One of the three independently built parts of a unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    /// Grammar-derived parser
    Parser,
    /// Editor integration built on the parser
    Support,
    /// Glue module that sees both siblings
    Index,
}

impl Role {
    pub const ALL: [Role; 3] = [Role::Parser, Role::Support, Role::Index];

    pub fn as_str(self) -> &'static str {
        match self {
            Role::Parser => "parser",
            Role::Support => "support",
            Role::Index => "index",
        }
    }

    fn bit(self) -> u8 {
        match self {
            Role::Parser => 1,
            Role::Support => 2,
            Role::Index => 4,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Roles a file is the entry of.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RoleSet(u8);

impl RoleSet {
    pub const EMPTY: RoleSet = RoleSet(0);

    pub fn of(role: Role) -> Self {
        RoleSet(role.bit())
    }

    pub fn with(mut self, role: Role) -> Self {
        self.insert(role);
        self
    }

    pub fn insert(&mut self, role: Role) {
        self.0 |= role.bit();
    }

    pub fn contains(self, role: Role) -> bool {
        self.0 & role.bit() != 0
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn iter(self) -> impl Iterator<Item = Role> {
        Role::ALL.into_iter().filter(move |role| self.contains(*role))
    }
}

impl FromIterator<Role> for RoleSet {
    fn from_iter<I: IntoIterator<Item = Role>>(iter: I) -> Self {
        iter.into_iter().fold(RoleSet::EMPTY, RoleSet::with)
    }
}

/// Latest outcome of one role. Both fields are `None` until the role has
/// been built once.
#[derive(Debug, Clone, Default)]
pub struct RoleOutput {
    pub exports: Option<Value>,
    pub error: Option<RoleError>,
}

impl RoleOutput {
    pub fn succeeded(exports: Value) -> Self {
        Self {
            exports: Some(exports),
            error: None,
        }
    }

    pub fn failed(error: RoleError) -> Self {
        Self {
            exports: None,
            error: Some(error),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.error.is_none() && self.exports.is_some()
    }
}

impl From<Result<Value, RoleError>> for RoleOutput {
    fn from(result: Result<Value, RoleError>) -> Self {
        match result {
            Ok(exports) => RoleOutput::succeeded(exports),
            Err(error) => RoleOutput::failed(error),
        }
    }
}

/// Per-role outcomes of a unit.
#[derive(Debug, Clone, Default)]
pub struct RoleOutputs {
    pub parser: RoleOutput,
    pub support: RoleOutput,
    pub index: RoleOutput,
}

impl RoleOutputs {
    pub fn get(&self, role: Role) -> &RoleOutput {
        match role {
            Role::Parser => &self.parser,
            Role::Support => &self.support,
            Role::Index => &self.index,
        }
    }

    pub fn get_mut(&mut self, role: Role) -> &mut RoleOutput {
        match role {
            Role::Parser => &mut self.parser,
            Role::Support => &mut self.support,
            Role::Index => &mut self.index,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_set() {
        let set = RoleSet::of(Role::Parser).with(Role::Support);
        assert!(set.contains(Role::Parser));
        assert!(set.contains(Role::Support));
        assert!(!set.contains(Role::Index));
        assert_eq!(set.iter().collect::<Vec<_>>(), vec![Role::Parser, Role::Support]);
        assert!(RoleSet::EMPTY.is_empty());
    }

    #[test]
    fn test_output_from_result() {
        let ok = RoleOutput::from(Ok(Value::Number(1.0)));
        assert!(ok.is_ok());
        let failed = RoleOutput::from(Err(RoleError::MissingEntry { role: Role::Index }));
        assert!(!failed.is_ok());
        assert!(failed.exports.is_none());
    }
}
