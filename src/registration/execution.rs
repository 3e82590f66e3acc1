//! Captured execution context.
//!
//! A registration captures the ambient [`ExecutionContext`] at init time and
//! re-enters it around every call into user code. The context lives in a tokio
//! task-local, so entering it is a scope: the prior value comes back on every
//! exit path, including errors, panics and a dropped (cancelled) future.

use std::any::Any;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

tokio::task_local! {
    static CURRENT: ExecutionContext;
}

/// Opaque environment that must be active while user code runs.
#[derive(Clone)]
pub struct ExecutionContext {
    name: Arc<str>,
    data: Option<Arc<dyn Any + Send + Sync>>,
}

impl ExecutionContext {
    /// Create a named context without payload.
    pub fn new(name: impl Into<Arc<str>>) -> Self {
        Self {
            name: name.into(),
            data: None,
        }
    }

    /// Attach an arbitrary payload (a loader, a tenant handle, ...).
    pub fn with_data<T: Any + Send + Sync>(mut self, data: T) -> Self {
        self.data = Some(Arc::new(data));
        self
    }

    /// The process-wide context used when nothing else is active.
    pub fn root() -> Self {
        Self::new("root")
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn data<T: Any + Send + Sync>(&self) -> Option<&T> {
        self.data.as_deref().and_then(|d| d.downcast_ref::<T>())
    }

    /// The context active on the current task, if any.
    pub fn current() -> Option<Self> {
        CURRENT.try_with(Clone::clone).ok()
    }

    /// Context to bind at registration time.
    pub fn capture() -> Self {
        Self::current().unwrap_or_else(Self::root)
    }

    /// Run `future` with this context active.
    pub async fn scope<F: Future>(self, future: F) -> F::Output {
        CURRENT.scope(self, future).await
    }

    /// Run `f` with this context active.
    pub fn sync_scope<R>(self, f: impl FnOnce() -> R) -> R {
        CURRENT.sync_scope(self, f)
    }
}

impl fmt::Debug for ExecutionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutionContext")
            .field("name", &self.name)
            .field("has_data", &self.data.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_scope_restores_prior_context() {
        assert!(ExecutionContext::current().is_none());

        let outer = ExecutionContext::new("outer");
        outer
            .scope(async {
                assert_eq!(ExecutionContext::current().unwrap().name(), "outer");
                ExecutionContext::new("inner")
                    .scope(async {
                        assert_eq!(ExecutionContext::current().unwrap().name(), "inner");
                    })
                    .await;
                assert_eq!(ExecutionContext::current().unwrap().name(), "outer");
            })
            .await;

        assert!(ExecutionContext::current().is_none());
    }

    #[test]
    fn test_sync_scope_restores_after_panic() {
        let result = std::panic::catch_unwind(|| {
            ExecutionContext::new("doomed").sync_scope(|| panic!("handler blew up"))
        });
        assert!(result.is_err());
        assert!(ExecutionContext::current().is_none());
    }

    #[test]
    fn test_capture_and_data() {
        assert_eq!(ExecutionContext::capture().name(), "root");
        let ctx = ExecutionContext::new("tenant").with_data(42u32);
        assert_eq!(ctx.data::<u32>(), Some(&42));
        assert!(ctx.data::<String>().is_none());
        let captured = ctx.sync_scope(ExecutionContext::capture);
        assert_eq!(captured.name(), "tenant");
    }
}
