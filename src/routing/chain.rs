//! Per-request middleware chain.

use futures_util::future::BoxFuture;

use crate::error::DispatchError;
use crate::http::{Request, Response, RouteMatch};
use crate::registration::{Registration, RegistrationGuard};
use crate::routing::matcher::MatchKind;

/// A resolved request: the terminal registration, the middleware in front of it,
/// and the path view it was matched with.
///
/// Holds one reference on every registration involved until dropped.
#[derive(Debug)]
pub struct Dispatch {
    terminal: RegistrationGuard,
    middleware: Vec<RegistrationGuard>,
    route: RouteMatch,
    kind: MatchKind,
}

impl Dispatch {
    pub(crate) fn new(
        terminal: RegistrationGuard,
        middleware: Vec<RegistrationGuard>,
        route: RouteMatch,
        kind: MatchKind,
    ) -> Self {
        Self {
            terminal,
            middleware,
            route,
            kind,
        }
    }

    pub fn route(&self) -> &RouteMatch {
        &self.route
    }

    pub fn kind(&self) -> MatchKind {
        self.kind
    }

    pub fn terminal(&self) -> &Registration {
        &self.terminal
    }

    pub fn middleware_aliases(&self) -> Vec<&str> {
        self.middleware.iter().map(|m| m.alias()).collect()
    }

    /// Run middleware then the terminal, with the request viewed through this match.
    pub async fn run(self, request: &mut Request, response: &mut Response) -> Result<(), DispatchError> {
        let previous = request.set_route(self.route.clone());
        let result = Next::new(&self.middleware, &self.terminal)
            .run(request, response)
            .await;
        request.restore_route(previous);
        result
    }

    /// Terminal only, for include and forward.
    pub(crate) async fn invoke_target(
        &self,
        request: &mut Request,
        response: &mut Response,
    ) -> Result<(), DispatchError> {
        self.terminal.invoke(request, response).await
    }
}

/// Continuation handed to a middleware: the remaining middleware plus the terminal.
///
/// Consumed by [`Next::run`], so each stage can continue the chain at most once.
pub struct Next<'a> {
    middleware: &'a [RegistrationGuard],
    terminal: &'a Registration,
}

impl<'a> Next<'a> {
    pub(crate) fn new(middleware: &'a [RegistrationGuard], terminal: &'a Registration) -> Self {
        Self {
            middleware,
            terminal,
        }
    }

    /// Middleware still ahead of the terminal.
    pub fn remaining(&self) -> usize {
        self.middleware.len()
    }

    /// Alias of the registration that ends the chain.
    pub fn terminal_alias(&self) -> &str {
        self.terminal.alias()
    }

    /// Invoke the next middleware, or the terminal once none remain.
    pub fn run<'r>(
        self,
        request: &'r mut Request,
        response: &'r mut Response,
    ) -> BoxFuture<'r, Result<(), DispatchError>>
    where
        'a: 'r,
    {
        Box::pin(async move {
            match self.middleware.split_first() {
                Some((head, rest)) => {
                    head.invoke_middleware(request, response, Next::new(rest, self.terminal))
                        .await
                }
                None => self.terminal.invoke(request, response).await,
            }
        })
    }
}
