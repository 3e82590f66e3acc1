//! The mutable alias → registration table.
//!
//! # Responsibilities
//! - Validate and publish registrations (init first, visible after)
//! - Keep aliases and handler instances unique
//! - Resolve a dispatch path and take references in one locked step
//! - Remove registrations and hand them to deferred teardown
//!
//! # Design Decisions
//! - One coarse mutex per table; handler code never runs under it
//! - Aliases being initialized are reserved, so a concurrent duplicate fails
//!   instead of racing the publish
//! - Removal is immediate, destruction happens when the last reference drops
//! - A registration still initializing when the table shuts down is never published

use std::cmp::Reverse;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Instant;

use crate::context::{ContainerContext, ContextFacade, HttpContext, ServerContext, SharedAttributeStore};
use crate::error::{DispatchError, RegistrationError};
use crate::http::{Request, Response, RouteMatch};
use crate::observability::metrics;
use crate::registration::{
    Endpoint, Middleware, Registration, RegistrationConfig, RegistrationKind, ResourceHandler,
    Target,
};
use crate::routing::alias;
use crate::routing::chain::Dispatch;
use crate::routing::matcher::{self, AliasTable, MatchKind, Matcher, PathPrefixMatcher};

#[derive(Default)]
struct State {
    registrations: HashMap<String, Arc<Registration>>,
    /// Ordered by descending priority, then registration order.
    middleware: Vec<(PathPrefixMatcher, Arc<Registration>)>,
    pending: HashSet<String>,
    pending_middleware: HashSet<String>,
    /// Handler instance identity → alias it is bound to.
    bound: HashMap<usize, String>,
    /// Bumped by every shutdown; an init that straddles one is discarded.
    generation: u64,
}

impl State {
    fn has_middleware(&self, alias: &str) -> bool {
        self.pending_middleware.contains(alias)
            || self.middleware.iter().any(|(_, r)| r.alias() == alias)
    }

    fn matching_middleware<'s>(
        &'s self,
        path: &'s str,
    ) -> impl Iterator<Item = &'s Arc<Registration>> + 's {
        self.middleware
            .iter()
            .filter(move |(m, _)| m.matches(path))
            .map(|(_, r)| r)
    }
}

impl AliasTable for HashMap<String, Arc<Registration>> {
    type Entry = Arc<Registration>;

    fn entry(&self, alias: &str) -> Option<Self::Entry> {
        self.get(alias).cloned()
    }

    fn is_endpoint(entry: &Self::Entry) -> bool {
        entry.kind() == RegistrationKind::Endpoint
    }
}

pub(crate) struct Shared {
    state: Mutex<State>,
    store: SharedAttributeStore,
    delegate: Arc<dyn ContainerContext>,
    sequence: AtomicU64,
}

/// Weak reference to a table, held by context facades.
#[derive(Clone)]
pub struct TableHandle(Weak<Shared>);

impl TableHandle {
    pub fn upgrade(&self) -> Option<DispatchTable> {
        self.0.upgrade().map(|shared| DispatchTable { shared })
    }

    #[cfg(test)]
    pub(crate) fn dangling() -> Self {
        Self(Weak::new())
    }
}

/// Dispatch table shared by every request and every registering caller.
#[derive(Clone)]
pub struct DispatchTable {
    shared: Arc<Shared>,
}

impl DispatchTable {
    pub fn new() -> Self {
        Self::with_delegate(Arc::new(ServerContext::default()))
    }

    /// Table whose facades forward unintercepted operations to `delegate`.
    pub fn with_delegate(delegate: Arc<dyn ContainerContext>) -> Self {
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(State::default()),
                store: SharedAttributeStore::new(),
                delegate,
                sequence: AtomicU64::new(0),
            }),
        }
    }

    pub fn downgrade(&self) -> TableHandle {
        TableHandle(Arc::downgrade(&self.shared))
    }

    pub fn attributes(&self) -> &SharedAttributeStore {
        &self.shared.store
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.shared.state.lock().expect("dispatch table mutex poisoned")
    }

    /// Bind `endpoint` to `alias`.
    pub fn register(
        &self,
        alias: &str,
        endpoint: Arc<dyn Endpoint>,
        context: Arc<dyn HttpContext>,
        config: RegistrationConfig,
    ) -> Result<(), RegistrationError> {
        self.publish(alias, Target::Endpoint(endpoint), context, config)
            .map(|_| ())
    }

    /// Serve resources named `name + path-info` under `alias`.
    pub fn register_resources(
        &self,
        alias: &str,
        name: &str,
        context: Arc<dyn HttpContext>,
    ) -> Result<(), RegistrationError> {
        if name != "/" && name.ends_with('/') {
            return Err(RegistrationError::invalid(name, "resource name must not end with `/`"));
        }
        let config = RegistrationConfig::named(name);
        self.publish(alias, Target::Resource(ResourceHandler::new(name)), context, config)
            .map(|_| ())
    }

    /// Run `middleware` for every dispatch path starting with `alias`.
    pub fn register_middleware(
        &self,
        alias: &str,
        middleware: Arc<dyn Middleware>,
        context: Arc<dyn HttpContext>,
        config: RegistrationConfig,
    ) -> Result<(), RegistrationError> {
        self.publish(alias, Target::Middleware(middleware), context, config)
            .map(|_| ())
    }

    fn publish(
        &self,
        alias: &str,
        target: Target,
        context: Arc<dyn HttpContext>,
        config: RegistrationConfig,
    ) -> Result<Arc<Registration>, RegistrationError> {
        let key = alias::normalize(alias)?;
        let is_middleware = matches!(target, Target::Middleware(_));
        let identity = target.identity();

        let generation = {
            let mut state = self.lock();
            let taken = if is_middleware {
                state.has_middleware(&key)
            } else {
                state.registrations.contains_key(&key) || state.pending.contains(&key)
            };
            if taken {
                return Err(RegistrationError::DuplicateAlias(key));
            }
            if let Some(id) = identity {
                if let Some(bound) = state.bound.get(&id) {
                    return Err(RegistrationError::HandlerAlreadyBound(bound.clone()));
                }
                state.bound.insert(id, key.clone());
            }
            if is_middleware {
                state.pending_middleware.insert(key.clone());
            } else {
                state.pending.insert(key.clone());
            }
            state.generation
        };

        let facade = Arc::new(ContextFacade::new(
            Arc::clone(&self.shared.delegate),
            Arc::clone(&context),
            self.shared.store.attributes(&context),
            self.downgrade(),
        ));
        let sequence = self.shared.sequence.fetch_add(1, Ordering::Relaxed);
        let result = Registration::init(&key, target, context, facade, config, sequence);

        let mut state = self.lock();
        if is_middleware {
            state.pending_middleware.remove(&key);
        } else {
            state.pending.remove(&key);
        }
        let registration = match result {
            Ok(r) if state.generation == generation => r,
            Ok(r) => {
                if let Some(id) = identity {
                    state.bound.remove(&id);
                }
                drop(state);
                tracing::warn!(alias = %key, "Table shut down during init, discarding registration");
                r.request_removal();
                drop(r);
                self.shared.store.sweep();
                return Err(RegistrationError::ShutDown(key));
            }
            Err(e) => {
                if let Some(id) = identity {
                    state.bound.remove(&id);
                }
                tracing::warn!(alias = %key, error = %e, "Registration failed");
                return Err(e);
            }
        };

        if is_middleware {
            state
                .middleware
                .push((PathPrefixMatcher::new(key.clone()), Arc::clone(&registration)));
            state
                .middleware
                .sort_by_key(|(_, r)| (Reverse(r.priority()), r.sequence()));
        } else {
            state.registrations.insert(key.clone(), Arc::clone(&registration));
        }
        let total = state.registrations.len() + state.middleware.len();
        drop(state);

        metrics::record_registration("register", registration.kind(), total);
        tracing::info!(alias = %key, kind = ?registration.kind(), name = %registration.name(), "Registered");
        Ok(registration)
    }

    /// Remove `alias`. Teardown runs once in-flight requests have drained.
    pub fn unregister(&self, alias: &str) -> Result<(), RegistrationError> {
        drop(self.remove(alias, false)?);
        self.shared.store.sweep();
        Ok(())
    }

    pub fn unregister_middleware(&self, alias: &str) -> Result<(), RegistrationError> {
        drop(self.remove(alias, true)?);
        self.shared.store.sweep();
        Ok(())
    }

    /// Remove `alias` and wait until its registration has been destroyed.
    pub async fn unregister_and_wait(&self, alias: &str) -> Result<(), RegistrationError> {
        let registration = self.remove(alias, false)?;
        registration.drained().await;
        drop(registration);
        self.shared.store.sweep();
        Ok(())
    }

    fn remove(&self, alias: &str, middleware: bool) -> Result<Arc<Registration>, RegistrationError> {
        let key = alias::normalize(alias)?;
        let (registration, total) = {
            let mut state = self.lock();
            let registration = if middleware {
                let pos = state
                    .middleware
                    .iter()
                    .position(|(_, r)| r.alias() == key)
                    .ok_or_else(|| RegistrationError::UnknownAlias(key.clone()))?;
                state.middleware.remove(pos).1
            } else {
                state
                    .registrations
                    .remove(&key)
                    .ok_or_else(|| RegistrationError::UnknownAlias(key.clone()))?
            };
            if let Some(id) = registration.target().identity() {
                state.bound.remove(&id);
            }
            (registration, state.registrations.len() + state.middleware.len())
        };

        tracing::info!(
            alias = %key,
            in_flight = registration.reference_count(),
            "Unregistered"
        );
        metrics::record_registration("unregister", registration.kind(), total);
        registration.request_removal();
        Ok(registration)
    }

    /// Remove everything (owner shutdown) and return the removed registrations.
    ///
    /// Registrations still initializing are rejected when they try to publish.
    pub fn shutdown(&self) -> Vec<Arc<Registration>> {
        let removed: Vec<_> = {
            let mut state = self.lock();
            state.generation += 1;
            let middleware = std::mem::take(&mut state.middleware);
            let removed: Vec<_> = state
                .registrations
                .drain()
                .map(|(_, r)| r)
                .chain(middleware.into_iter().map(|(_, r)| r))
                .collect();
            for id in removed.iter().filter_map(|r| r.target().identity()) {
                state.bound.remove(&id);
            }
            removed
        };
        for registration in &removed {
            registration.request_removal();
        }
        self.shared.store.sweep();
        tracing::info!(removed = removed.len(), "Dispatch table shut down");
        removed
    }

    /// Current registration for `alias`, if published.
    pub fn get(&self, alias: &str) -> Option<Arc<Registration>> {
        let key = alias::normalize(alias).ok()?;
        self.lock().registrations.get(&key).cloned()
    }

    pub fn aliases(&self) -> Vec<String> {
        let mut aliases: Vec<_> = self.lock().registrations.keys().cloned().collect();
        aliases.sort();
        aliases
    }

    pub fn middleware_aliases(&self) -> Vec<String> {
        self.lock()
            .middleware
            .iter()
            .map(|(_, r)| r.alias().to_string())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.lock().registrations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Resolve `path` and reference the match plus its middleware, atomically.
    pub fn lookup(&self, path: &str) -> Option<Dispatch> {
        let state = self.lock();
        let resolution = matcher::resolve(&state.registrations, path)?;
        let terminal = resolution.entry.acquire();
        let middleware = state.matching_middleware(path).map(|r| r.acquire()).collect();
        Some(Dispatch::new(terminal, middleware, resolution.route, resolution.kind))
    }

    /// The `/` registration viewed as the context root (path-info `/`).
    pub(crate) fn lookup_context_root(&self) -> Option<Dispatch> {
        let state = self.lock();
        let terminal = state.registrations.get("/")?.acquire();
        let middleware = state.matching_middleware("/").map(|r| r.acquire()).collect();
        Some(Dispatch::new(
            terminal,
            middleware,
            RouteMatch::with_path_info("/", "/"),
            MatchKind::ContextRoot,
        ))
    }

    /// Route `request` under the router base path and run the chain.
    pub async fn dispatch(
        &self,
        request: &mut Request,
        response: &mut Response,
    ) -> Result<(), DispatchError> {
        let start = Instant::now();
        let base = self
            .shared
            .store
            .establish_base_path(request.mount_path())
            .to_string();
        let path = match request.path().strip_prefix(base.as_str()) {
            Some("") => "/".to_string(),
            Some(rest) if rest.starts_with('/') => rest.to_string(),
            _ => return Err(DispatchError::NotFound(request.path().to_string())),
        };

        let Some(dispatch) = self.lookup(&path) else {
            tracing::debug!(path = %path, "No registration matched");
            metrics::record_dispatch(None, 404, start);
            return Err(DispatchError::NotFound(path));
        };

        request.set_context_path(base);
        let kind = dispatch.kind();
        let result = dispatch.run(request, response).await;
        let status = match &result {
            Ok(()) => response.status().as_u16(),
            Err(e) => e.status().as_u16(),
        };
        metrics::record_dispatch(Some(kind), status, start);
        result
    }
}

impl Default for DispatchTable {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for DispatchTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DispatchTable")
            .field("aliases", &self.aliases())
            .field("middleware", &self.middleware_aliases())
            .finish()
    }
}
