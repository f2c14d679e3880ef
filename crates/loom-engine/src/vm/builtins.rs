//! Host functions available to every script: the global prelude and the
//! methods of arrays and strings.

use super::error::ExecError;
use super::value::Value;
use once_cell::sync::Lazy;
use rustc_hash::FxHashMap;

type Table = FxHashMap<&'static str, Value>;

fn arg(args: &[Value], i: usize) -> Value {
    args.get(i).cloned().unwrap_or_default()
}

fn index_arg(args: &[Value], i: usize, len: usize, default: usize) -> usize {
    match args.get(i) {
        None | Some(Value::Undefined) => default,
        Some(v) => {
            let n = v.to_number();
            if n.is_nan() {
                0
            } else if n < 0.0 {
                len.saturating_sub((-n) as usize)
            } else {
                (n as usize).min(len)
            }
        }
    }
}

fn this_items(this: &Value) -> Result<Vec<Value>, ExecError> {
    match this {
        Value::Array(items) => Ok(items.read().clone()),
        other => Err(ExecError::native(format!("{} is not an array", other.type_of()))),
    }
}

fn this_string(this: &Value) -> String {
    this.to_display_string()
}

static ARRAY_METHODS: Lazy<Table> = Lazy::new(|| {
    let mut t = Table::default();
    t.insert(
        "push",
        Value::native("push", |this, args| match this {
            Value::Array(items) => {
                let mut items = items.write();
                items.extend(args.iter().cloned());
                Ok(Value::Number(items.len() as f64))
            }
            _ => Err(ExecError::native("push called on non-array")),
        }),
    );
    t.insert(
        "concat",
        Value::native("concat", |this, args| {
            let mut items = this_items(this)?;
            for a in args {
                match a {
                    Value::Array(more) => items.extend(more.read().iter().cloned()),
                    other => items.push(other.clone()),
                }
            }
            Ok(Value::array(items))
        }),
    );
    t.insert(
        "join",
        Value::native("join", |this, args| {
            let sep = match args.first() {
                None | Some(Value::Undefined) => ",".to_string(),
                Some(v) => v.to_display_string(),
            };
            let items = this_items(this)?;
            Ok(Value::string(
                items
                    .iter()
                    .map(|v| if v.is_nullish() { String::new() } else { v.to_display_string() })
                    .collect::<Vec<_>>()
                    .join(&sep),
            ))
        }),
    );
    t.insert(
        "slice",
        Value::native("slice", |this, args| {
            let items = this_items(this)?;
            let start = index_arg(args, 0, items.len(), 0);
            let end = index_arg(args, 1, items.len(), items.len());
            Ok(Value::array(items.get(start..end.max(start)).unwrap_or_default().to_vec()))
        }),
    );
    t.insert(
        "indexOf",
        Value::native("indexOf", |this, args| {
            let needle = arg(args, 0);
            let items = this_items(this)?;
            Ok(Value::Number(
                items
                    .iter()
                    .position(|v| v.strict_equals(&needle))
                    .map(|i| i as f64)
                    .unwrap_or(-1.0),
            ))
        }),
    );
    t.insert(
        "includes",
        Value::native("includes", |this, args| {
            let needle = arg(args, 0);
            Ok(Value::Bool(this_items(this)?.iter().any(|v| v.strict_equals(&needle))))
        }),
    );
    t
});

static STRING_METHODS: Lazy<Table> = Lazy::new(|| {
    let mut t = Table::default();
    t.insert(
        "slice",
        Value::native("slice", |this, args| {
            let chars: Vec<char> = this_string(this).chars().collect();
            let start = index_arg(args, 0, chars.len(), 0);
            let end = index_arg(args, 1, chars.len(), chars.len());
            Ok(Value::string(chars.get(start..end.max(start)).unwrap_or_default().iter().collect::<String>()))
        }),
    );
    t.insert(
        "indexOf",
        Value::native("indexOf", |this, args| {
            let s = this_string(this);
            let needle = arg(args, 0).to_display_string();
            Ok(Value::Number(
                s.find(&needle)
                    .map(|b| s[..b].chars().count() as f64)
                    .unwrap_or(-1.0),
            ))
        }),
    );
    t.insert(
        "startsWith",
        Value::native("startsWith", |this, args| {
            Ok(Value::Bool(this_string(this).starts_with(&arg(args, 0).to_display_string())))
        }),
    );
    t.insert(
        "endsWith",
        Value::native("endsWith", |this, args| {
            Ok(Value::Bool(this_string(this).ends_with(&arg(args, 0).to_display_string())))
        }),
    );
    t.insert(
        "includes",
        Value::native("includes", |this, args| {
            Ok(Value::Bool(this_string(this).contains(&arg(args, 0).to_display_string())))
        }),
    );
    t.insert(
        "split",
        Value::native("split", |this, args| {
            let s = this_string(this);
            let parts = match args.first() {
                None | Some(Value::Undefined) => vec![Value::string(&s)],
                Some(sep) => {
                    let sep = sep.to_display_string();
                    if sep.is_empty() {
                        s.chars().map(|c| Value::string(c.to_string())).collect()
                    } else {
                        s.split(sep.as_str()).map(Value::string).collect()
                    }
                }
            };
            Ok(Value::array(parts))
        }),
    );
    t.insert(
        "trim",
        Value::native("trim", |this, _| Ok(Value::string(this_string(this).trim()))),
    );
    t.insert(
        "toUpperCase",
        Value::native("toUpperCase", |this, _| Ok(Value::string(this_string(this).to_uppercase()))),
    );
    t.insert(
        "toLowerCase",
        Value::native("toLowerCase", |this, _| Ok(Value::string(this_string(this).to_lowercase()))),
    );
    t
});

pub(crate) fn array_method(name: &str) -> Option<Value> {
    ARRAY_METHODS.get(name).cloned()
}

pub(crate) fn string_method(name: &str) -> Option<Value> {
    STRING_METHODS.get(name).cloned()
}

/// Global bindings visible from every module scope.
pub(crate) fn globals() -> Vec<(&'static str, Value)> {
    let object = Value::object([
        (
            "assign",
            Value::native("assign", |_, args| {
                let target = arg(args, 0);
                for source in args.iter().skip(1) {
                    for key in source.keys() {
                        target.set(&key, source.get(&key)?)?;
                    }
                }
                Ok(target)
            }),
        ),
        (
            "keys",
            Value::native("keys", |_, args| {
                Ok(Value::array(arg(args, 0).keys().into_iter().map(Value::from).collect()))
            }),
        ),
        (
            "freeze",
            Value::native("freeze", |_, args| Ok(arg(args, 0))),
        ),
    ]);

    let json = Value::object([
        (
            "stringify",
            Value::native("stringify", |_, args| {
                let value = arg(args, 0);
                if matches!(value, Value::Undefined) {
                    return Ok(Value::Undefined);
                }
                serde_json::to_string(&value.to_json())
                    .map(Value::from)
                    .map_err(|e| ExecError::native(e.to_string()))
            }),
        ),
        (
            "parse",
            Value::native("parse", |_, args| {
                let text = arg(args, 0).to_display_string();
                serde_json::from_str::<serde_json::Value>(&text)
                    .map(|json| Value::from_json(&json))
                    .map_err(|e| ExecError::native(format!("JSON.parse: {}", e)))
            }),
        ),
    ]);

    let console = Value::object([
        (
            "log",
            Value::native("log", |_, args| {
                tracing::info!(target: "loom::script", "{}", join_args(args));
                Ok(Value::Undefined)
            }),
        ),
        (
            "warn",
            Value::native("warn", |_, args| {
                tracing::warn!(target: "loom::script", "{}", join_args(args));
                Ok(Value::Undefined)
            }),
        ),
        (
            "error",
            Value::native("error", |_, args| {
                tracing::error!(target: "loom::script", "{}", join_args(args));
                Ok(Value::Undefined)
            }),
        ),
    ]);

    let array = Value::object([(
        "isArray",
        Value::native("isArray", |_, args| {
            Ok(Value::Bool(matches!(arg(args, 0), Value::Array(_))))
        }),
    )]);

    vec![
        ("Object", object),
        ("JSON", json),
        ("console", console),
        ("Array", array),
        (
            "String",
            Value::native("String", |_, args| Ok(Value::string(arg(args, 0).to_display_string()))),
        ),
        (
            "Number",
            Value::native("Number", |_, args| Ok(Value::Number(arg(args, 0).to_number()))),
        ),
    ]
}

fn join_args(args: &[Value]) -> String {
    args.iter()
        .map(|v| match v {
            Value::String(s) => s.to_string(),
            other => format!("{:?}", other),
        })
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn call(f: &Value, this: &Value, args: &[Value]) -> Value {
        match f {
            Value::Native(n) => (n.func)(this, args).unwrap(),
            _ => panic!("not native"),
        }
    }

    #[test]
    fn test_array_push_and_join() {
        let arr = Value::array(vec![Value::Number(1.0)]);
        let push = arr.get("push").unwrap();
        call(&push, &arr, &[Value::Number(2.0)]);
        let joined = call(&arr.get("join").unwrap(), &arr, &[Value::string("-")]);
        assert_eq!(joined.as_str(), Some("1-2"));
    }

    #[test]
    fn test_string_methods() {
        let s = Value::string("a.b.c");
        let parts = call(&s.get("split").unwrap(), &s, &[Value::string(".")]);
        assert_eq!(parts.get("length").unwrap().as_number(), Some(3.0));
        let tail = call(&s.get("slice").unwrap(), &s, &[Value::Number(-1.0)]);
        assert_eq!(tail.as_str(), Some("c"));
    }

    #[test]
    fn test_object_assign() {
        let globals = globals();
        let object = &globals[0].1;
        let target = Value::new_object();
        let source = Value::object([("a", Value::Number(1.0))]);
        call(&object.get("assign").unwrap(), object, &[target.clone(), source]);
        assert_eq!(target.get("a").unwrap().as_number(), Some(1.0));
    }
}
