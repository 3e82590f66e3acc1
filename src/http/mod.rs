//! HTTP-facing types and the transport adaptor.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, body buffering, request ID)
//!     → request.rs (routing view: path, attributes, matched alias)
//!     → [dispatch table resolves and runs the chain]
//!     → response.rs (buffered status, headers, body)
//!     → Send to client
//! ```

pub mod date;
pub mod request;
pub mod response;
pub mod server;

pub use request::{Request, RouteMatch};
pub use response::Response;
pub use server::{DispatchServer, X_REQUEST_ID};
