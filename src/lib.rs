//! Alias dispatch: a hot-swappable HTTP routing core.
//!
//! Endpoints, middleware and static-resource mappings are bound to aliases in a
//! [`DispatchTable`] and resolved per request with a fixed specificity cascade,
//! while other callers register and unregister concurrently.

pub mod config;
pub mod context;
pub mod error;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod registration;
pub mod routing;

pub use config::DispatchConfig;
pub use context::{ContextFacade, DirectoryContext, HttpContext, RequestDispatcher};
pub use error::{DispatchError, HandlerError, RegistrationError};
pub use http::{DispatchServer, Request, Response};
pub use lifecycle::Shutdown;
pub use registration::{Endpoint, ExecutionContext, Middleware, RegistrationConfig};
pub use routing::{ContextRouter, DispatchTable, Next};
