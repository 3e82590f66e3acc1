//! Middleware registered against an alias prefix.

use futures_util::future::BoxFuture;

use crate::error::{DispatchError, HandlerError};
use crate::http::{Request, Response};
use crate::registration::HandlerConfig;
use crate::routing::chain::Next;

/// Intercepts requests whose dispatch path starts with the middleware alias.
///
/// Call [`Next::run`] to continue the chain, or return without calling it to
/// short-circuit. `Next` is consumed, so a middleware continues at most once.
pub trait Middleware: Send + Sync + 'static {
    fn init(&self, _config: &HandlerConfig) -> Result<(), HandlerError> {
        Ok(())
    }

    fn handle<'a>(
        &'a self,
        request: &'a mut Request,
        response: &'a mut Response,
        next: Next<'a>,
    ) -> BoxFuture<'a, Result<(), DispatchError>>;

    fn destroy(&self) {}
}
