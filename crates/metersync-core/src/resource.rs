//! Resource descriptors and record instantiation.
//!
//! A resource declares where its records live inside a successful response
//! body as dotted paths (e.g. `"products.nodes"`). The instantiation layer
//! extracts the raw records at each path and wraps them with a back-reference
//! to the execution context that produced them.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::Value;

use crate::error::SyncError;

/// Capability flags describing what a resource supports.
///
/// One flat descriptor replaces a hierarchy of resource classes; behavior
/// differences hang off these flags.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResourceCapabilities {
    /// Supports cursor-based incremental sync.
    pub incremental: bool,
    /// Carries metafields that need a second fetch phase.
    pub metafields: bool,
}

/// Declares how records of one resource type are located and synced.
#[derive(Debug, Clone)]
pub struct ResourceDescriptor {
    /// Resource name, used in errors and logs.
    pub name: String,
    /// Dotted paths into the response body where records live.
    pub record_paths: Vec<String>,
    /// What this resource supports.
    pub capabilities: ResourceCapabilities,
}

impl ResourceDescriptor {
    /// Create a descriptor with no paths and default capabilities.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            record_paths: Vec::new(),
            capabilities: ResourceCapabilities::default(),
        }
    }

    /// Add a record path.
    #[must_use]
    pub fn with_record_path(mut self, path: impl Into<String>) -> Self {
        self.record_paths.push(path.into());
        self
    }

    /// Set capability flags.
    #[must_use]
    pub const fn with_capabilities(mut self, capabilities: ResourceCapabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    /// Extract records from a successful response body.
    ///
    /// Missing intermediate segments mean no data at that path; the only
    /// failure is a body that is not object-shaped.
    pub fn instantiate(
        &self,
        body: &Value,
        context: &Arc<ExecutionContext>,
    ) -> Result<Vec<Record>, SyncError> {
        if !body.is_object() {
            return Err(SyncError::Protocol {
                message: format!(
                    "expected object-shaped response body for resource '{}'",
                    self.name
                ),
            });
        }
        let mut records = Vec::new();
        for path in &self.record_paths {
            for raw in extract_at_path(body, path) {
                records.push(Record {
                    raw,
                    context: Arc::clone(context),
                });
            }
        }
        Ok(records)
    }
}

/// Raw records found at a dotted path within a body.
///
/// The leaf may be an array (one record per element) or a singleton (one
/// record). A missing segment or a null leaf yields no records.
#[must_use]
pub fn extract_at_path(body: &Value, path: &str) -> Vec<Value> {
    let mut node = body;
    for segment in path.split('.') {
        match node.get(segment) {
            Some(next) => node = next,
            None => return Vec::new(),
        }
    }
    match node {
        Value::Array(items) => items.clone(),
        Value::Null => Vec::new(),
        other => vec![other.clone()],
    }
}

/// A typed record extracted from a response, carrying a back-reference to
/// the execution context that produced it.
#[derive(Debug, Clone)]
pub struct Record {
    /// Raw record value.
    pub raw: Value,
    /// Context of the invocation that fetched this record.
    pub context: Arc<ExecutionContext>,
}

/// Per-invocation execution state.
///
/// Definition lookups that used to live in static caches are held here
/// explicitly, scoped to one top-level invocation and never shared across
/// concurrent executions.
#[derive(Debug)]
pub struct ExecutionContext {
    service_name: String,
    definitions: Mutex<HashMap<String, Value>>,
}

impl ExecutionContext {
    /// Create a fresh context. Caches start empty.
    #[must_use]
    pub fn new(service_name: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
            definitions: Mutex::new(HashMap::new()),
        }
    }

    /// Service name for error mapping and logs.
    #[must_use]
    pub fn service_name(&self) -> &str {
        &self.service_name
    }

    /// Cached definition for a type key, if one was stored this invocation.
    #[must_use]
    pub fn cached_definition(&self, key: &str) -> Option<Value> {
        self.definitions.lock().get(key).cloned()
    }

    /// Store a definition for a type key.
    pub fn store_definition(&self, key: impl Into<String>, definition: Value) {
        self.definitions.lock().insert(key.into(), definition);
    }

    /// Drop all cached state, as at the start of a top-level invocation.
    pub fn clear(&self) {
        self.definitions.lock().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn body() -> Value {
        serde_json::json!({
            "products": {
                "nodes": [
                    {"id": "p1"},
                    {"id": "p2"},
                ],
            },
            "shop": {"id": "s1"},
            "empty": null,
        })
    }

    #[test]
    fn extracts_array_leaf() {
        let records = extract_at_path(&body(), "products.nodes");
        assert_eq!(records.len(), 2);
        assert_eq!(records[0]["id"], "p1");
    }

    #[test]
    fn extracts_singleton_leaf() {
        let records = extract_at_path(&body(), "shop");
        assert_eq!(records.len(), 1);
        assert_eq!(records[0]["id"], "s1");
    }

    #[test]
    fn missing_segment_yields_nothing() {
        assert!(extract_at_path(&body(), "orders.nodes").is_empty());
        assert!(extract_at_path(&body(), "products.edges.node").is_empty());
    }

    #[test]
    fn null_leaf_yields_nothing() {
        assert!(extract_at_path(&body(), "empty").is_empty());
    }

    #[test]
    fn instantiate_combines_paths() {
        let descriptor = ResourceDescriptor::new("products")
            .with_record_path("products.nodes")
            .with_record_path("shop");
        let context = Arc::new(ExecutionContext::new("test"));
        let records = descriptor
            .instantiate(&body(), &context)
            .expect("instantiate");
        assert_eq!(records.len(), 3);
        assert_eq!(records[2].context.service_name(), "test");
    }

    #[test]
    fn instantiate_rejects_non_object_body() {
        let descriptor = ResourceDescriptor::new("products").with_record_path("products.nodes");
        let context = Arc::new(ExecutionContext::new("test"));
        let err = descriptor
            .instantiate(&serde_json::json!([1, 2]), &context)
            .expect_err("non-object body");
        assert!(matches!(err, SyncError::Protocol { .. }));
    }

    #[test]
    fn definition_cache_stores_and_clears() {
        let context = ExecutionContext::new("test");
        assert_eq!(context.cached_definition("Product"), None);
        context.store_definition("Product", serde_json::json!({"fields": ["id"]}));
        assert!(context.cached_definition("Product").is_some());
        context.clear();
        assert_eq!(context.cached_definition("Product"), None);
    }
}
