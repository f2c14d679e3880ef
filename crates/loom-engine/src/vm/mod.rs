//! Value model and interpreter.

mod builtins;
pub mod error;
pub mod interpreter;
pub mod scope;
pub mod value;

pub use error::ExecError;
pub use interpreter::{Interpreter, MAX_CALL_DEPTH};
pub use scope::{ImportBinding, ImportName, ImportSource, ModuleContext, Scope, ScopeKind};
pub use value::{NativeFn, ObjectMap, Value};
