use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;

/// Supplies the content of a schema document given its identifier.
///
/// Returning `None` means the identifier is unknown to this resolver. Whether
/// that is fatal depends on the caller: a static reference dereference fails
/// hard, while a meta-schema lookup done purely for vocabulary discovery may
/// degrade to an all-unknown vocabulary set.
///
/// The resolver is the only place where framing or compiling may block; a
/// caller wanting non-blocking behavior should prefetch into an
/// [`InMemoryResolver`] first.
pub trait SchemaResolver {
    fn resolve(&self, identifier: &str) -> Option<Value>;
}

pub type SchemaResolverCallback = dyn Fn(&str) -> Option<Value> + Send + Sync + 'static;

/// Adapts a plain closure into a [`SchemaResolver`].
#[derive(Clone)]
pub struct CallbackResolver {
    callback: Arc<SchemaResolverCallback>,
}

impl CallbackResolver {
    pub fn new(callback: Arc<SchemaResolverCallback>) -> Self {
        Self { callback }
    }
}

impl SchemaResolver for CallbackResolver {
    fn resolve(&self, identifier: &str) -> Option<Value> {
        (self.callback)(identifier)
    }
}

pub fn resolver_from_callback<F>(callback: F) -> Arc<dyn SchemaResolver + Send + Sync>
where
    F: Fn(&str) -> Option<Value> + Send + Sync + 'static,
{
    Arc::new(CallbackResolver::new(Arc::new(callback)))
}

/// A resolver backed by a plain map from identifier to document.
#[derive(Clone, Debug, Default)]
pub struct InMemoryResolver {
    entries: HashMap<String, Value>,
}

impl InMemoryResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_map(entries: HashMap<String, Value>) -> Self {
        Self { entries }
    }

    pub fn insert(&mut self, identifier: impl Into<String>, document: Value) {
        self.entries.insert(identifier.into(), document);
    }
}

impl SchemaResolver for InMemoryResolver {
    fn resolve(&self, identifier: &str) -> Option<Value> {
        self.entries.get(identifier).cloned()
    }
}

/// A resolver that knows nothing. Useful when every dialect in play is an
/// official one, for which vocabulary discovery never consults the resolver.
#[derive(Clone, Copy, Debug, Default)]
pub struct EmptyResolver;

impl SchemaResolver for EmptyResolver {
    fn resolve(&self, _identifier: &str) -> Option<Value> {
        None
    }
}
