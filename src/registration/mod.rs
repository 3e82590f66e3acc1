//! Registration lifecycle and isolation.
//!
//! # Data Flow
//! ```text
//! register:   init (captured execution context) → published by the table
//! request:    table lock { lookup + acquire } → invoke (no lock) → guard drop = release
//! unregister: table lock { remove } → request_removal → destroy on drain
//! ```
//!
//! # Design Decisions
//! - One wrapper for endpoints, middleware and resource mappings
//! - `destroy` runs exactly once, after removal *and* after the last in-flight
//!   reference is released, whichever comes last
//! - User code always runs inside the captured [`ExecutionContext`]

pub mod endpoint;
pub mod execution;
pub mod middleware;
pub mod resource;

use std::collections::HashMap;
use std::fmt;
use std::ops::Deref;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::Notify;

use crate::context::{ContextFacade, HttpContext};
use crate::error::{DispatchError, RegistrationError};
use crate::http::{Request, Response};
use crate::routing::chain::Next;

pub use endpoint::{from_fn, Endpoint};
pub use execution::ExecutionContext;
pub use middleware::Middleware;
pub use resource::ResourceHandler;

/// Caller-supplied settings for a new registration.
#[derive(Debug, Clone, Default)]
pub struct RegistrationConfig {
    /// Display name; defaults to the alias.
    pub name: Option<String>,
    pub init_parameters: HashMap<String, String>,
    /// Context to run user code in; defaults to the one active at registration time.
    pub execution: Option<ExecutionContext>,
    /// Middleware ordering, higher runs first.
    pub priority: i32,
}

impl RegistrationConfig {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Self::default()
        }
    }

    pub fn with_init_parameter(mut self, name: &str, value: &str) -> Self {
        self.init_parameters.insert(name.to_string(), value.to_string());
        self
    }

    pub fn with_execution(mut self, execution: ExecutionContext) -> Self {
        self.execution = Some(execution);
        self
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }
}

/// What a handler sees at init time.
#[derive(Debug, Clone)]
pub struct HandlerConfig {
    name: String,
    init_parameters: HashMap<String, String>,
    context: Arc<ContextFacade>,
}

impl HandlerConfig {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn init_parameter(&self, name: &str) -> Option<&str> {
        self.init_parameters.get(name).map(String::as_str)
    }

    pub fn context(&self) -> &Arc<ContextFacade> {
        &self.context
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistrationKind {
    Endpoint,
    Middleware,
    Resource,
}

pub(crate) enum Target {
    Endpoint(Arc<dyn Endpoint>),
    Middleware(Arc<dyn Middleware>),
    Resource(ResourceHandler),
}

impl Target {
    /// Instance identity used to keep one handler on one alias.
    pub(crate) fn identity(&self) -> Option<usize> {
        match self {
            Target::Endpoint(e) => Some(Arc::as_ptr(e) as *const () as usize),
            Target::Middleware(m) => Some(Arc::as_ptr(m) as *const () as usize),
            Target::Resource(_) => None,
        }
    }

    fn kind(&self) -> RegistrationKind {
        match self {
            Target::Endpoint(_) => RegistrationKind::Endpoint,
            Target::Middleware(_) => RegistrationKind::Middleware,
            Target::Resource(_) => RegistrationKind::Resource,
        }
    }
}

/// One bound handler, middleware or resource mapping.
pub struct Registration {
    alias: String,
    name: String,
    target: Target,
    http_context: Arc<dyn HttpContext>,
    facade: Arc<ContextFacade>,
    execution: ExecutionContext,
    priority: i32,
    sequence: u64,
    reference_count: AtomicUsize,
    removal_requested: AtomicBool,
    destroying: AtomicBool,
    destroyed: AtomicBool,
    drained: Notify,
}

impl Registration {
    /// Run the handler's own init. Nothing is published if this fails.
    pub(crate) fn init(
        alias: &str,
        target: Target,
        http_context: Arc<dyn HttpContext>,
        facade: Arc<ContextFacade>,
        config: RegistrationConfig,
        sequence: u64,
    ) -> Result<Arc<Self>, RegistrationError> {
        let execution = config.execution.unwrap_or_else(ExecutionContext::capture);
        let name = config.name.unwrap_or_else(|| alias.to_string());
        let handler_config = HandlerConfig {
            name: name.clone(),
            init_parameters: config.init_parameters,
            context: Arc::clone(&facade),
        };

        execution
            .clone()
            .sync_scope(|| match &target {
                Target::Endpoint(e) => e.init(&handler_config),
                Target::Middleware(m) => m.init(&handler_config),
                Target::Resource(_) => Ok(()),
            })
            .map_err(|source| RegistrationError::Initialization {
                alias: alias.to_string(),
                source,
            })?;

        Ok(Arc::new(Self {
            alias: alias.to_string(),
            name,
            target,
            http_context,
            facade,
            execution,
            priority: config.priority,
            sequence,
            reference_count: AtomicUsize::new(0),
            removal_requested: AtomicBool::new(false),
            destroying: AtomicBool::new(false),
            destroyed: AtomicBool::new(false),
            drained: Notify::new(),
        }))
    }

    pub fn alias(&self) -> &str {
        &self.alias
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> RegistrationKind {
        self.target.kind()
    }

    pub fn http_context(&self) -> &Arc<dyn HttpContext> {
        &self.http_context
    }

    pub fn context(&self) -> &Arc<ContextFacade> {
        &self.facade
    }

    pub fn execution_context(&self) -> &ExecutionContext {
        &self.execution
    }

    pub(crate) fn priority(&self) -> i32 {
        self.priority
    }

    pub(crate) fn sequence(&self) -> u64 {
        self.sequence
    }

    pub(crate) fn target(&self) -> &Target {
        &self.target
    }

    /// Requests currently executing through this registration.
    pub fn reference_count(&self) -> usize {
        self.reference_count.load(Ordering::SeqCst)
    }

    pub fn is_removed(&self) -> bool {
        self.removal_requested.load(Ordering::SeqCst)
    }

    /// True once `destroy` has completed.
    pub fn is_destroyed(&self) -> bool {
        self.destroyed.load(Ordering::SeqCst)
    }

    /// Take a reference. Callers hold the table lock.
    pub(crate) fn acquire(self: &Arc<Self>) -> RegistrationGuard {
        self.reference_count.fetch_add(1, Ordering::SeqCst);
        RegistrationGuard {
            registration: Arc::clone(self),
        }
    }

    fn release(&self) {
        let previous = self.reference_count.fetch_sub(1, Ordering::SeqCst);
        debug_assert!(previous > 0, "reference count underflow on `{}`", self.alias);
        if previous == 1 && self.removal_requested.load(Ordering::SeqCst) {
            self.destroy();
        }
    }

    /// Mark as removed from its table; destroys now if idle, otherwise on drain.
    pub(crate) fn request_removal(&self) {
        self.removal_requested.store(true, Ordering::SeqCst);
        let in_flight = self.reference_count.load(Ordering::SeqCst);
        if in_flight == 0 {
            self.destroy();
        } else {
            tracing::debug!(alias = %self.alias, in_flight, "Teardown deferred until drained");
        }
    }

    fn destroy(&self) {
        if self.destroying.swap(true, Ordering::SeqCst) {
            return;
        }
        self.execution.clone().sync_scope(|| match &self.target {
            Target::Endpoint(e) => e.destroy(),
            Target::Middleware(m) => m.destroy(),
            Target::Resource(_) => {}
        });
        self.destroyed.store(true, Ordering::SeqCst);
        self.drained.notify_waiters();
        tracing::info!(alias = %self.alias, kind = ?self.kind(), "Registration destroyed");
    }

    /// Resolves once the registration has been destroyed.
    pub async fn drained(&self) {
        loop {
            let notified = self.drained.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.is_destroyed() {
                return;
            }
            notified.await;
        }
    }

    /// Authorize, then run the endpoint or resource handler.
    pub(crate) async fn invoke(
        &self,
        request: &mut Request,
        response: &mut Response,
    ) -> Result<(), DispatchError> {
        let previous = request.swap_context(Some(Arc::clone(&self.facade)));
        let result = self
            .execution
            .clone()
            .scope(async {
                if !self.authorize(request, response) {
                    return Ok(());
                }
                match &self.target {
                    Target::Endpoint(e) => e.service(request, response).await.map_err(DispatchError::Handler),
                    Target::Resource(r) => r.serve(&self.facade, request, response).await,
                    // middleware is never a terminal
                    Target::Middleware(_) => Err(DispatchError::NotFound(self.alias.clone())),
                }
            })
            .await;
        request.swap_context(previous);
        result
    }

    /// Authorize, then hand the request to the middleware with the rest of the chain.
    pub(crate) async fn invoke_middleware(
        &self,
        request: &mut Request,
        response: &mut Response,
        next: Next<'_>,
    ) -> Result<(), DispatchError> {
        let previous = request.swap_context(Some(Arc::clone(&self.facade)));
        let result = self
            .execution
            .clone()
            .scope(async {
                if !self.authorize(request, response) {
                    return Ok(());
                }
                match &self.target {
                    Target::Middleware(m) => m.handle(request, response, next).await,
                    _ => next.run(request, response).await,
                }
            })
            .await;
        request.swap_context(previous);
        result
    }

    fn authorize(&self, request: &Request, response: &mut Response) -> bool {
        let allowed = self.http_context.handle_security(request, response);
        if !allowed {
            tracing::debug!(alias = %self.alias, status = %response.status(), "Request denied by security context");
        }
        allowed
    }
}

impl fmt::Debug for Registration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registration")
            .field("alias", &self.alias)
            .field("kind", &self.kind())
            .field("reference_count", &self.reference_count())
            .field("removed", &self.is_removed())
            .field("destroyed", &self.is_destroyed())
            .finish()
    }
}

/// A RAII guard holding one reference on a registration.
#[derive(Debug)]
pub struct RegistrationGuard {
    registration: Arc<Registration>,
}

impl RegistrationGuard {
    pub fn registration(&self) -> &Arc<Registration> {
        &self.registration
    }
}

impl Deref for RegistrationGuard {
    type Target = Registration;
    fn deref(&self) -> &Self::Target {
        &self.registration
    }
}

impl Drop for RegistrationGuard {
    fn drop(&mut self) {
        self.registration.release();
    }
}
