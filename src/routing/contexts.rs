//! Several dispatch tables mounted under context paths.
//!
//! # Data Flow
//! ```text
//! request URI /shop/cart/add
//!     → candidates "/shop/cart/add", "/shop/cart", "/shop", ""
//!     → contexts mounted at a candidate, lowest rank first
//!     → remainder empty? context root : cascade on remainder
//!     → no match → next context at the same level, then the next level up
//! ```

use std::sync::RwLock;
use std::time::Instant;

use crate::error::{DispatchError, RegistrationError};
use crate::http::{Request, Response};
use crate::observability::metrics;
use crate::routing::alias::ancestors;
use crate::routing::chain::Dispatch;
use crate::routing::table::DispatchTable;

#[derive(Debug, Clone)]
struct MountedContext {
    context_path: String,
    rank: i32,
    table: DispatchTable,
}

/// A match across contexts: which context won, and the referenced dispatch.
#[derive(Debug)]
pub struct ContextMatch {
    pub context_path: String,
    pub table: DispatchTable,
    pub dispatch: Dispatch,
}

#[derive(Debug, Default)]
pub struct ContextRouter {
    /// Sorted by context path, then rank.
    contexts: RwLock<Vec<MountedContext>>,
}

impl ContextRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mount `table` at `context_path` (`/` and the empty string both mean the root).
    ///
    /// Tables sharing a context path are tried in ascending `rank`.
    pub fn mount(
        &self,
        context_path: &str,
        rank: i32,
        table: DispatchTable,
    ) -> Result<(), RegistrationError> {
        let context_path = normalize_context_path(context_path)?;
        let mut contexts = self.contexts.write().expect("context router lock poisoned");
        contexts.push(MountedContext {
            context_path: context_path.clone(),
            rank,
            table,
        });
        // stable, so equal ranks keep mount order
        contexts.sort_by(|a, b| {
            a.context_path
                .cmp(&b.context_path)
                .then(a.rank.cmp(&b.rank))
        });
        tracing::info!(context_path = %context_path, rank, "Context mounted");
        Ok(())
    }

    /// Remove every mount of `context_path`. Returns the removed tables.
    pub fn unmount(&self, context_path: &str) -> Result<Vec<DispatchTable>, RegistrationError> {
        let context_path = normalize_context_path(context_path)?;
        let mut contexts = self.contexts.write().expect("context router lock poisoned");
        let (removed, kept): (Vec<_>, Vec<_>) = contexts
            .drain(..)
            .partition(|c| c.context_path == context_path);
        *contexts = kept;
        if removed.is_empty() {
            return Err(RegistrationError::UnknownAlias(context_path));
        }
        tracing::info!(context_path = %context_path, tables = removed.len(), "Context unmounted");
        Ok(removed.into_iter().map(|c| c.table).collect())
    }

    pub fn context_paths(&self) -> Vec<String> {
        let contexts = self.contexts.read().expect("context router lock poisoned");
        let mut paths: Vec<_> = contexts.iter().map(|c| c.context_path.clone()).collect();
        paths.dedup();
        paths
    }

    fn candidates(&self, context_path: &str) -> Vec<MountedContext> {
        self.contexts
            .read()
            .expect("context router lock poisoned")
            .iter()
            .filter(|c| c.context_path == context_path)
            .cloned()
            .collect()
    }

    /// Find the most specific context that matches `uri` and reference its dispatch.
    pub fn resolve(&self, uri: &str) -> Option<ContextMatch> {
        for level in ancestors(uri) {
            for context in self.candidates(level) {
                let remainder = &uri[level.len()..];
                let dispatch = if remainder.is_empty() {
                    context.table.lookup_context_root()
                } else {
                    context.table.lookup(remainder)
                };
                if let Some(dispatch) = dispatch {
                    return Some(ContextMatch {
                        context_path: context.context_path,
                        table: context.table,
                        dispatch,
                    });
                }
                tracing::trace!(
                    context_path = %context.context_path,
                    rank = context.rank,
                    remainder,
                    "No match in context, falling through"
                );
            }
        }
        None
    }

    pub async fn dispatch(
        &self,
        request: &mut Request,
        response: &mut Response,
    ) -> Result<(), DispatchError> {
        let start = Instant::now();
        let uri = request.path().to_string();
        let Some(found) = self.resolve(&uri) else {
            tracing::debug!(path = %uri, "No context matched");
            metrics::record_dispatch(None, 404, start);
            return Err(DispatchError::NotFound(uri));
        };

        request.set_context_path(found.context_path);
        let kind = found.dispatch.kind();
        let result = found.dispatch.run(request, response).await;
        let status = match &result {
            Ok(()) => response.status().as_u16(),
            Err(e) => e.status().as_u16(),
        };
        metrics::record_dispatch(Some(kind), status, start);
        result
    }
}

fn normalize_context_path(context_path: &str) -> Result<String, RegistrationError> {
    match context_path {
        "" | "/" => Ok(String::new()),
        p if !p.starts_with('/') => Err(RegistrationError::invalid(p, "must start with `/`")),
        p if p.ends_with('/') => Err(RegistrationError::invalid(p, "must not end with `/`")),
        p => Ok(p.to_string()),
    }
}
