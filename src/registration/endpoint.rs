//! Endpoint handlers.

use std::sync::Arc;

use futures_util::future::BoxFuture;

use crate::error::HandlerError;
use crate::http::{Request, Response};
use crate::registration::HandlerConfig;

/// A handler bound to one alias.
///
/// The same instance (by `Arc` identity) can be registered under at most one
/// alias at a time.
pub trait Endpoint: Send + Sync + 'static {
    /// Called once before the alias becomes visible. An error aborts the registration.
    fn init(&self, _config: &HandlerConfig) -> Result<(), HandlerError> {
        Ok(())
    }

    fn service<'a>(
        &'a self,
        request: &'a mut Request,
        response: &'a mut Response,
    ) -> BoxFuture<'a, Result<(), HandlerError>>;

    /// Called once after the alias is removed and in-flight requests have drained.
    fn destroy(&self) {}
}

struct FnEndpoint<F>(F);

impl<F> Endpoint for FnEndpoint<F>
where
    F: Fn(&Request, &mut Response) -> Result<(), HandlerError> + Send + Sync + 'static,
{
    fn service<'a>(
        &'a self,
        request: &'a mut Request,
        response: &'a mut Response,
    ) -> BoxFuture<'a, Result<(), HandlerError>> {
        let result = (self.0)(request, response);
        Box::pin(async move { result })
    }
}

/// Wrap a synchronous closure as an endpoint.
pub fn from_fn<F>(f: F) -> Arc<dyn Endpoint>
where
    F: Fn(&Request, &mut Response) -> Result<(), HandlerError> + Send + Sync + 'static,
{
    Arc::new(FnEndpoint(f))
}
