//! Shared attribute store: router base path plus per-context attribute namespaces.
//!
//! # Responsibilities
//! - Remember the base path the router is mounted under (first one wins)
//! - Give every security context its own attribute dictionary
//! - Drop a dictionary once its context is gone
//!
//! # Design Decisions
//! - Namespaces keep a `Weak` to their context; the store never extends its lifetime
//! - Reclamation is explicit (`context_destroyed`) or by `sweep` of dead back-references
//! - Concurrent writes to one dictionary are last-write-wins under a mutex

use std::collections::HashMap;
use std::sync::{Arc, Mutex, OnceLock, Weak};

use dashmap::DashMap;
use serde_json::Value;

use crate::context::{context_key, HttpContext};

/// Attribute dictionary for one context.
#[derive(Debug, Default)]
pub struct AttributeMap {
    values: Mutex<HashMap<String, Value>>,
}

impl AttributeMap {
    pub fn get(&self, name: &str) -> Option<Value> {
        self.values
            .lock()
            .expect("attribute map mutex poisoned")
            .get(name)
            .cloned()
    }

    pub fn set(&self, name: &str, value: Value) {
        self.values
            .lock()
            .expect("attribute map mutex poisoned")
            .insert(name.to_string(), value);
    }

    pub fn remove(&self, name: &str) -> Option<Value> {
        self.values
            .lock()
            .expect("attribute map mutex poisoned")
            .remove(name)
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<_> = self
            .values
            .lock()
            .expect("attribute map mutex poisoned")
            .keys()
            .cloned()
            .collect();
        names.sort();
        names
    }
}

struct Namespace {
    owner: Weak<dyn HttpContext>,
    attributes: Arc<AttributeMap>,
}

/// One per router instance.
#[derive(Default)]
pub struct SharedAttributeStore {
    base_path: OnceLock<String>,
    namespaces: DashMap<usize, Namespace>,
}

impl SharedAttributeStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Base path, empty until established.
    pub fn base_path(&self) -> &str {
        self.base_path.get().map(String::as_str).unwrap_or_default()
    }

    /// Record `path` as the base path unless one is already set; returns the effective one.
    pub fn establish_base_path(&self, path: &str) -> &str {
        self.base_path.get_or_init(|| {
            tracing::debug!(base_path = %path, "Router base path established");
            path.trim_end_matches('/').to_string()
        })
    }

    /// Attribute dictionary of `context`, created on first use.
    pub fn attributes(&self, context: &Arc<dyn HttpContext>) -> Arc<AttributeMap> {
        let key = context_key(context);
        let mut entry = self.namespaces.entry(key).or_insert_with(|| Namespace {
            owner: Arc::downgrade(context),
            attributes: Arc::default(),
        });
        // same address, different (reallocated) context
        if entry.owner.upgrade().is_none() {
            *entry = Namespace {
                owner: Arc::downgrade(context),
                attributes: Arc::default(),
            };
        }
        Arc::clone(&entry.attributes)
    }

    /// Teardown notification from the context's owner.
    pub fn context_destroyed(&self, context: &Arc<dyn HttpContext>) -> bool {
        self.namespaces.remove(&context_key(context)).is_some()
    }

    /// Drop namespaces whose context no longer exists. Returns how many were removed.
    pub fn sweep(&self) -> usize {
        let before = self.namespaces.len();
        self.namespaces.retain(|_, ns| ns.owner.strong_count() > 0);
        let removed = before - self.namespaces.len();
        if removed > 0 {
            tracing::debug!(removed, "Reclaimed attribute namespaces");
        }
        removed
    }

    pub fn namespace_count(&self) -> usize {
        self.namespaces.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::{Request, Response};
    use serde_json::json;
    use url::Url;

    struct Nop;

    impl HttpContext for Nop {
        fn handle_security(&self, _: &Request, _: &mut Response) -> bool {
            true
        }
        fn resource(&self, _: &str) -> Option<Url> {
            None
        }
        fn mime_type(&self, _: &str) -> Option<String> {
            None
        }
    }

    fn context() -> Arc<dyn HttpContext> {
        Arc::new(Nop)
    }

    #[test]
    fn test_namespaces_are_isolated() {
        let store = SharedAttributeStore::new();
        let (a, b) = (context(), context());

        store.attributes(&a).set("color", json!("red"));
        store.attributes(&b).set("color", json!("blue"));

        assert_eq!(store.attributes(&a).get("color"), Some(json!("red")));
        assert_eq!(store.attributes(&b).get("color"), Some(json!("blue")));
        assert_eq!(store.namespace_count(), 2);
    }

    #[test]
    fn test_dead_context_is_swept() {
        let store = SharedAttributeStore::new();
        let a = context();
        let b = context();
        store.attributes(&a).set("k", json!(1));
        store.attributes(&b);

        drop(a);
        assert_eq!(store.sweep(), 1);
        assert_eq!(store.namespace_count(), 1);

        assert!(store.context_destroyed(&b));
        assert_eq!(store.namespace_count(), 0);
    }

    #[test]
    fn test_base_path_first_wins() {
        let store = SharedAttributeStore::new();
        assert_eq!(store.base_path(), "");
        assert_eq!(store.establish_base_path("/proxy/"), "/proxy");
        assert_eq!(store.establish_base_path("/other"), "/proxy");
        assert_eq!(store.base_path(), "/proxy");
    }
}
