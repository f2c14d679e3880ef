//! Dynamically typed values.
//!
//! Objects and arrays are shared handles: cloning a [`Value`] clones the
//! reference, never the contents. An exports object handed to a consumer
//! is the same object the producing module keeps writing into.

use super::error::ExecError;
use super::scope::Scope;
use crate::syntax::ast::Function;
use parking_lot::RwLock;
use std::any::Any;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

pub type ObjectMap = BTreeMap<String, Value>;

/// Most holes a single write may open past the end of an array.
pub const MAX_ARRAY_GROWTH: usize = 1 << 16;

/// Host function: receives `this` (the object the function was read from,
/// or `undefined`) and the call arguments.
pub type NativeFn = dyn Fn(&Value, &[Value]) -> Result<Value, ExecError> + Send + Sync;

/// A script function together with its defining scope.
pub struct Closure {
    pub function: Arc<Function>,
    pub env: Arc<Scope>,
}

pub struct NativeFunction {
    pub name: String,
    pub func: Box<NativeFn>,
}

#[derive(Clone, Default)]
pub enum Value {
    #[default]
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    String(Arc<str>),
    Array(Arc<RwLock<Vec<Value>>>),
    Object(Arc<RwLock<ObjectMap>>),
    Function(Arc<Closure>),
    Native(Arc<NativeFunction>),
    /// Host object opaque to scripts
    Opaque(Arc<dyn Any + Send + Sync>),
}

impl Value {
    // ========================================================================
    // Construction
    // ========================================================================

    pub fn string(s: impl AsRef<str>) -> Self {
        Value::String(Arc::from(s.as_ref()))
    }

    pub fn new_object() -> Self {
        Value::Object(Arc::new(RwLock::new(ObjectMap::new())))
    }

    pub fn object<K: Into<String>>(entries: impl IntoIterator<Item = (K, Value)>) -> Self {
        let map = entries.into_iter().map(|(k, v)| (k.into(), v)).collect();
        Value::Object(Arc::new(RwLock::new(map)))
    }

    pub fn array(items: Vec<Value>) -> Self {
        Value::Array(Arc::new(RwLock::new(items)))
    }

    pub fn native<F>(name: impl Into<String>, func: F) -> Self
    where
        F: Fn(&Value, &[Value]) -> Result<Value, ExecError> + Send + Sync + 'static,
    {
        Value::Native(Arc::new(NativeFunction {
            name: name.into(),
            func: Box::new(func),
        }))
    }

    pub fn opaque<T: Any + Send + Sync>(value: T) -> Self {
        Value::Opaque(Arc::new(value))
    }

    // ========================================================================
    // Inspection
    // ========================================================================

    pub fn is_nullish(&self) -> bool {
        matches!(self, Value::Null | Value::Undefined)
    }

    pub fn is_callable(&self) -> bool {
        matches!(self, Value::Function(_) | Value::Native(_))
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        match self {
            Value::Opaque(any) => any.downcast_ref(),
            _ => None,
        }
    }

    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Undefined | Value::Null => false,
            Value::Bool(b) => *b,
            Value::Number(n) => *n != 0.0 && !n.is_nan(),
            Value::String(s) => !s.is_empty(),
            _ => true,
        }
    }

    pub fn type_of(&self) -> &'static str {
        match self {
            Value::Undefined => "undefined",
            Value::Null | Value::Array(_) | Value::Object(_) | Value::Opaque(_) => "object",
            Value::Bool(_) => "boolean",
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::Function(_) | Value::Native(_) => "function",
        }
    }

    /// Identity for shared values, value equality for primitives.
    pub fn strict_equals(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Undefined, Value::Undefined) | (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Array(a), Value::Array(b)) => Arc::ptr_eq(a, b),
            (Value::Object(a), Value::Object(b)) => Arc::ptr_eq(a, b),
            (Value::Function(a), Value::Function(b)) => Arc::ptr_eq(a, b),
            (Value::Native(a), Value::Native(b)) => Arc::ptr_eq(a, b),
            (Value::Opaque(a), Value::Opaque(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }

    pub fn loose_equals(&self, other: &Value) -> bool {
        match (self, other) {
            (a, b) if a.is_nullish() && b.is_nullish() => true,
            (a, b) if a.is_nullish() || b.is_nullish() => false,
            (Value::Number(_), Value::String(_))
            | (Value::String(_), Value::Number(_))
            | (Value::Bool(_), _)
            | (_, Value::Bool(_)) => self.to_number() == other.to_number(),
            _ => self.strict_equals(other),
        }
    }

    pub fn to_number(&self) -> f64 {
        match self {
            Value::Undefined => f64::NAN,
            Value::Null => 0.0,
            Value::Bool(b) => f64::from(u8::from(*b)),
            Value::Number(n) => *n,
            Value::String(s) => {
                let trimmed = s.trim();
                if trimmed.is_empty() {
                    0.0
                } else if let Some(hex) = trimmed.strip_prefix("0x").or_else(|| trimmed.strip_prefix("0X")) {
                    u64::from_str_radix(hex, 16).map(|n| n as f64).unwrap_or(f64::NAN)
                } else {
                    trimmed.parse().unwrap_or(f64::NAN)
                }
            }
            _ => f64::NAN,
        }
    }

    /// String conversion as performed by `+` and property keys.
    pub fn to_display_string(&self) -> String {
        match self {
            Value::Undefined => "undefined".to_string(),
            Value::Null => "null".to_string(),
            Value::Bool(b) => b.to_string(),
            Value::Number(n) => format_number(*n),
            Value::String(s) => s.to_string(),
            Value::Array(items) => items
                .read()
                .iter()
                .map(|v| if v.is_nullish() { String::new() } else { v.to_display_string() })
                .collect::<Vec<_>>()
                .join(","),
            Value::Object(_) | Value::Opaque(_) => "[object Object]".to_string(),
            Value::Function(f) => format!("function {}()", f.function.name.as_deref().unwrap_or("")),
            Value::Native(f) => format!("function {}() {{ [native code] }}", f.name),
        }
    }

    // ========================================================================
    // Properties
    // ========================================================================

    /// Read a property. Reading from `null`/`undefined` is an error; a
    /// missing property is `undefined`.
    pub fn get(&self, key: &str) -> Result<Value, ExecError> {
        Ok(match self {
            Value::Undefined | Value::Null => {
                return Err(ExecError::NullDereference {
                    property: key.to_string(),
                    base: if matches!(self, Value::Null) { "null" } else { "undefined" },
                })
            }
            Value::Object(map) => map.read().get(key).cloned().unwrap_or_default(),
            Value::Array(items) => match key {
                "length" => Value::Number(items.read().len() as f64),
                _ => match key.parse::<usize>() {
                    Ok(index) => items.read().get(index).cloned().unwrap_or_default(),
                    Err(_) => super::builtins::array_method(key).unwrap_or_default(),
                },
            },
            Value::String(s) => match key {
                "length" => Value::Number(s.chars().count() as f64),
                _ => match key.parse::<usize>() {
                    Ok(index) => s
                        .chars()
                        .nth(index)
                        .map(|c| Value::string(c.to_string()))
                        .unwrap_or_default(),
                    Err(_) => super::builtins::string_method(key).unwrap_or_default(),
                },
            },
            Value::Function(f) => match key {
                "name" => Value::string(f.function.name.as_deref().unwrap_or("")),
                _ => Value::Undefined,
            },
            Value::Native(f) => match key {
                "name" => Value::string(&f.name),
                _ => Value::Undefined,
            },
            Value::Bool(_) | Value::Number(_) | Value::Opaque(_) => Value::Undefined,
        })
    }

    /// Write a property. Writes to primitives are ignored.
    pub fn set(&self, key: &str, value: Value) -> Result<(), ExecError> {
        match self {
            Value::Undefined | Value::Null => Err(ExecError::NullDereference {
                property: key.to_string(),
                base: if matches!(self, Value::Null) { "null" } else { "undefined" },
            }),
            Value::Object(map) => {
                map.write().insert(key.to_string(), value);
                Ok(())
            }
            Value::Array(items) => {
                if let Ok(index) = key.parse::<usize>() {
                    let mut items = items.write();
                    if index >= items.len() {
                        let len = grown_length(items.len(), index.checked_add(1))?;
                        items.resize(len, Value::Undefined);
                    }
                    items[index] = value;
                } else if key == "length" {
                    let requested = value.to_number();
                    if !(requested >= 0.0 && requested.fract() == 0.0) {
                        return Err(ExecError::InvalidArrayLength { length: requested });
                    }
                    let mut items = items.write();
                    let len = if requested as usize <= items.len() {
                        requested as usize
                    } else {
                        grown_length(items.len(), Some(requested as usize))?
                    };
                    items.resize(len, Value::Undefined);
                }
                Ok(())
            }
            _ => Ok(()),
        }
    }

    /// Own enumerable keys, as used by spread and `Object.keys`.
    pub fn keys(&self) -> Vec<String> {
        match self {
            Value::Object(map) => map.read().keys().cloned().collect(),
            Value::Array(items) => (0..items.read().len()).map(|i| i.to_string()).collect(),
            Value::String(s) => (0..s.chars().count()).map(|i| i.to_string()).collect(),
            _ => Vec::new(),
        }
    }

    // ========================================================================
    // Snapshots
    // ========================================================================

    /// Structural snapshot. Functions become `"[function name]"`, opaque
    /// host objects `"[opaque]"`, undefined members are skipped.
    pub fn to_json(&self) -> serde_json::Value {
        self.to_json_bounded(0)
    }

    fn to_json_bounded(&self, depth: usize) -> serde_json::Value {
        use serde_json::Value as Json;
        // Cyclic structures are cut off.
        if depth > 64 {
            return Json::String("[cycle]".to_string());
        }
        match self {
            Value::Undefined | Value::Null => Json::Null,
            Value::Bool(b) => Json::Bool(*b),
            Value::Number(n) => serde_json::Number::from_f64(*n)
                .map(Json::Number)
                .unwrap_or(Json::Null),
            Value::String(s) => Json::String(s.to_string()),
            Value::Array(items) => Json::Array(
                items
                    .read()
                    .iter()
                    .map(|v| v.to_json_bounded(depth + 1))
                    .collect(),
            ),
            Value::Object(map) => Json::Object(
                map.read()
                    .iter()
                    .filter(|(_, v)| !matches!(v, Value::Undefined))
                    .map(|(k, v)| (k.clone(), v.to_json_bounded(depth + 1)))
                    .collect(),
            ),
            Value::Function(f) => Json::String(format!(
                "[function {}]",
                f.function.name.as_deref().unwrap_or("")
            )),
            Value::Native(f) => Json::String(format!("[function {}]", f.name)),
            Value::Opaque(_) => Json::String("[opaque]".to_string()),
        }
    }

    /// Convert a JSON document into fresh script values.
    pub fn from_json(json: &serde_json::Value) -> Value {
        use serde_json::Value as Json;
        match json {
            Json::Null => Value::Null,
            Json::Bool(b) => Value::Bool(*b),
            Json::Number(n) => Value::Number(n.as_f64().unwrap_or(f64::NAN)),
            Json::String(s) => Value::string(s),
            Json::Array(items) => Value::array(items.iter().map(Value::from_json).collect()),
            Json::Object(map) => Value::object(map.iter().map(|(k, v)| (k.clone(), Value::from_json(v)))),
        }
    }
}

/// Length an array may grow to for a write needing `wanted` slots.
fn grown_length(current: usize, wanted: Option<usize>) -> Result<usize, ExecError> {
    match wanted {
        Some(len) if len - current <= MAX_ARRAY_GROWTH => Ok(len),
        _ => Err(ExecError::InvalidArrayLength {
            length: wanted.map_or(f64::INFINITY, |len| len as f64),
        }),
    }
}

pub(crate) fn format_number(n: f64) -> String {
    if n.is_nan() {
        "NaN".to_string()
    } else if n.is_infinite() {
        if n > 0.0 { "Infinity" } else { "-Infinity" }.to_string()
    } else if n.fract() == 0.0 && n.abs() < 1e21 {
        format!("{}", n as i64)
    } else {
        n.to_string()
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Undefined => write!(f, "undefined"),
            Value::Null => write!(f, "null"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Number(n) => write!(f, "{}", format_number(*n)),
            Value::String(s) => write!(f, "{:?}", s),
            Value::Opaque(_) => write!(f, "[opaque]"),
            other => write!(f, "{}", other.to_json()),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::string(s)
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(Arc::from(s))
    }
}
