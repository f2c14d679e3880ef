//! Host values for bare module names.
//!
//! A unit resolves a bare name by asking its [`ProviderChain`]: the
//! registry of languages first (so one unit can import another), then the
//! static [`ExternalTable`]. The first non-null answer wins; with none, the
//! name links to `null`.

use crate::error::RuntimeError;
use futures::future::{self, BoxFuture, FutureExt};
use loom_engine::{ExecError, ResolveError, Value};
use loom_grammar::{GrammarCompiler, TermCompiler};
use rustc_hash::FxHashMap;
use std::sync::{Arc, Weak};
use tracing::debug;

/// Supplies values for bare module names.
pub trait ExternalProvider: Send + Sync {
    /// `Ok(None)` when this provider does not know `name`.
    fn get(&self, name: &str) -> BoxFuture<'static, Result<Option<Value>, RuntimeError>>;
}

// ============================================================================
// Static table
// ============================================================================

/// Fixed map of module names to host values.
#[derive(Debug, Default, Clone)]
pub struct ExternalTable {
    modules: FxHashMap<String, Value>,
}

impl ExternalTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// The parser runtime modules generated parsers and support code use.
    pub fn standard() -> Self {
        let mut table = Self::new();
        table.insert(loom_grammar::PARSER_RUNTIME, lr_module());
        table.insert("@lezer/common", common_module());
        table.insert("@lezer/generator", generator_module());
        table
    }

    pub fn insert(&mut self, name: impl Into<String>, value: Value) {
        self.modules.insert(name.into(), value);
    }

    pub fn lookup(&self, name: &str) -> Option<&Value> {
        self.modules.get(name)
    }
}

impl ExternalProvider for ExternalTable {
    fn get(&self, name: &str) -> BoxFuture<'static, Result<Option<Value>, RuntimeError>> {
        future::ready(Ok(self.lookup(name).cloned())).boxed()
    }
}

fn arg(args: &[Value], index: usize) -> Value {
    args.get(index).cloned().unwrap_or_default()
}

/// Shallow copy of an object's own keys into `target`.
fn copy_into(target: &Value, source: &Value) -> Result<(), ExecError> {
    for key in source.keys() {
        target.set(&key, source.get(&key)?)?;
    }
    Ok(())
}

/// A live parser object: the deserialized tables plus `configure`.
fn parser_object(spec: &Value) -> Result<Value, ExecError> {
    let parser = Value::new_object();
    copy_into(&parser, spec)?;
    parser.set(
        "configure",
        Value::native("configure", |this, args| {
            let merged = Value::new_object();
            copy_into(&merged, this)?;
            let options = arg(args, 0);
            if !options.is_nullish() {
                copy_into(&merged, &options)?;
            }
            parser_object(&merged)
        }),
    )?;
    Ok(parser)
}

fn lr_module() -> Value {
    let lr_parser = Value::object([(
        "deserialize",
        Value::native("deserialize", |_, args| {
            let spec = arg(args, 0);
            if spec.is_nullish() {
                return Err(ExecError::native("LRParser.deserialize expects a parser spec"));
            }
            parser_object(&spec)
        }),
    )]);
    let external_tokenizer = Value::native("ExternalTokenizer", |_, args| {
        let token = arg(args, 0);
        if !token.is_callable() {
            return Err(ExecError::native("ExternalTokenizer expects a token function"));
        }
        let options = match arg(args, 1) {
            v if v.is_nullish() => Value::new_object(),
            v => v,
        };
        Ok(Value::object([
            ("kind", Value::string("ExternalTokenizer")),
            ("token", token),
            ("options", options),
        ]))
    });
    let context_tracker = Value::native("ContextTracker", |_, args| {
        Ok(Value::object([
            ("kind", Value::string("ContextTracker")),
            ("spec", arg(args, 0)),
        ]))
    });
    Value::object([
        ("LRParser", lr_parser),
        ("ExternalTokenizer", external_tokenizer),
        ("ContextTracker", context_tracker),
    ])
}

fn common_module() -> Value {
    let node_prop = Value::native("NodeProp", |_, args| {
        Ok(Value::object([
            ("kind", Value::string("NodeProp")),
            ("config", arg(args, 0)),
            (
                "add",
                Value::native("add", |this, args| {
                    Ok(Value::object([("prop", this.clone()), ("match", arg(args, 0))]))
                }),
            ),
        ]))
    });
    Value::object([("NodeProp", node_prop)])
}

/// `buildParserFile(text)` compiles a grammar in-process and returns
/// `{parser, terms}` source texts.
fn generator_module() -> Value {
    let build = Value::native("buildParserFile", |_, args| {
        let grammar = arg(args, 0);
        let text = grammar
            .as_str()
            .ok_or_else(|| ExecError::native("buildParserFile expects grammar text"))?;
        let output = TermCompiler::new()
            .compile(text)
            .map_err(ExecError::Native)?
            .into_output()
            .map_err(|e| ExecError::native(e.to_string()))?;
        Ok(Value::object([
            ("parser", Value::string(&output.parser)),
            ("terms", Value::string(&output.terms)),
        ]))
    });
    Value::object([("buildParserFile", build)])
}

// ============================================================================
// Chain
// ============================================================================

enum Link {
    Strong(Arc<dyn ExternalProvider>),
    Weak(Weak<dyn ExternalProvider>),
}

/// Providers asked in order for each bare name.
#[derive(Default)]
pub struct ProviderChain {
    links: Vec<Link>,
}

impl ProviderChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, provider: Arc<dyn ExternalProvider>) -> Self {
        self.links.push(Link::Strong(provider));
        self
    }

    /// Add a provider without keeping it alive. Skipped once dropped.
    pub fn with_weak(mut self, provider: Weak<dyn ExternalProvider>) -> Self {
        self.links.push(Link::Weak(provider));
        self
    }

    pub fn len(&self) -> usize {
        self.links.len()
    }

    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }

    /// Value for `name`, or `null` when no provider has one.
    pub fn resolve(&self, name: &str) -> BoxFuture<'static, Result<Value, ResolveError>> {
        let providers: Vec<Arc<dyn ExternalProvider>> = self
            .links
            .iter()
            .filter_map(|link| match link {
                Link::Strong(provider) => Some(provider.clone()),
                Link::Weak(provider) => provider.upgrade(),
            })
            .collect();
        let name = name.to_string();
        async move {
            for provider in providers {
                match provider.get(&name).await {
                    Ok(Some(value)) if !value.is_nullish() => return Ok(value),
                    Ok(_) => continue,
                    Err(err) => return Err(ResolveError::failed(&name, err)),
                }
            }
            debug!(name = %name, "no provider for external");
            Ok(Value::Null)
        }
        .boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn call(func: &Value, this: &Value, args: &[Value]) -> Value {
        match func {
            Value::Native(native) => (native.func)(this, args).unwrap(),
            _ => panic!("not a native function"),
        }
    }

    #[test]
    fn test_deserialize_and_configure() {
        let lr = ExternalTable::standard().lookup("@lezer/lr").cloned().unwrap();
        let lr_parser = lr.get("LRParser").unwrap();
        let spec = Value::object([("version", Value::Number(14.0)), ("maxTerm", Value::Number(3.0))]);
        let parser = call(&lr_parser.get("deserialize").unwrap(), &lr_parser, &[spec]);
        assert_eq!(parser.get("maxTerm").unwrap().as_number(), Some(3.0));

        let configure = parser.get("configure").unwrap();
        let options = Value::object([("dialect", Value::string("ts"))]);
        let configured = call(&configure, &parser, &[options]);
        assert_eq!(configured.get("dialect").unwrap().as_str(), Some("ts"));
        assert_eq!(configured.get("version").unwrap().as_number(), Some(14.0));
        // the original is untouched
        assert!(matches!(parser.get("dialect").unwrap(), Value::Undefined));
    }

    #[test]
    fn test_generator_builds_parser_text() {
        let generator = ExternalTable::standard().lookup("@lezer/generator").cloned().unwrap();
        let build = generator.get("buildParserFile").unwrap();
        let out = call(&build, &Value::Undefined, &[Value::string("@top T { \"a\" }")]);
        assert!(out.get("terms").unwrap().as_str().unwrap().contains("T = 1"));
    }

    #[tokio::test]
    async fn test_chain_order_and_fallback() {
        let mut first = ExternalTable::new();
        first.insert("shared", Value::string("first"));
        first.insert("hole", Value::Null);
        let mut second = ExternalTable::new();
        second.insert("shared", Value::string("second"));
        second.insert("hole", Value::string("filled"));

        let chain = ProviderChain::new().with(Arc::new(first)).with(Arc::new(second));
        assert_eq!(chain.resolve("shared").await.unwrap().as_str(), Some("first"));
        assert_eq!(chain.resolve("hole").await.unwrap().as_str(), Some("filled"));
        assert!(matches!(chain.resolve("nothing").await.unwrap(), Value::Null));
    }

    #[tokio::test]
    async fn test_dropped_weak_provider_is_skipped() {
        let mut table = ExternalTable::new();
        table.insert("x", Value::Number(1.0));
        let provider: Arc<dyn ExternalProvider> = Arc::new(table);
        let chain = ProviderChain::new().with_weak(Arc::downgrade(&provider));
        assert_eq!(chain.resolve("x").await.unwrap().as_number(), Some(1.0));
        drop(provider);
        assert!(matches!(chain.resolve("x").await.unwrap(), Value::Null));
    }
}
