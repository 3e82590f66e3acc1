//! Error taxonomy for registration and dispatch.
//!
//! # Design Decisions
//! - Registration errors are synchronous and returned to the caller mutating the table
//! - Dispatch errors are scoped to one request; references are released before they surface
//! - An authorization denial is not an error: the security context already wrote the response

use axum::http::{Method, StatusCode};
use thiserror::Error;

/// Error raised by user code (endpoint init/service, middleware init).
pub type HandlerError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Failure to add or remove a registration.
#[derive(Debug, Error)]
pub enum RegistrationError {
    #[error("invalid alias `{alias}`: {reason}")]
    InvalidAlias { alias: String, reason: &'static str },

    #[error("alias `{0}` is already registered")]
    DuplicateAlias(String),

    #[error("alias `{0}` is not registered")]
    UnknownAlias(String),

    #[error("handler is already bound to alias `{0}`")]
    HandlerAlreadyBound(String),

    #[error("table shut down while `{0}` was initializing")]
    ShutDown(String),

    #[error("initialization of `{alias}` failed: {source}")]
    Initialization {
        alias: String,
        #[source]
        source: HandlerError,
    },
}

impl RegistrationError {
    pub(crate) fn invalid(alias: &str, reason: &'static str) -> Self {
        Self::InvalidAlias {
            alias: alias.to_string(),
            reason,
        }
    }
}

/// Failure while serving one request.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("no registration matches `{0}`")]
    NotFound(String),

    #[error("method `{0}` is not allowed")]
    MethodNotAllowed(Method),

    #[error("handler failed: {0}")]
    Handler(#[source] HandlerError),

    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

impl DispatchError {
    /// HTTP status the transport should answer with.
    pub fn status(&self) -> StatusCode {
        match self {
            DispatchError::NotFound(_) => StatusCode::NOT_FOUND,
            DispatchError::MethodNotAllowed(_) => StatusCode::METHOD_NOT_ALLOWED,
            DispatchError::Handler(_) | DispatchError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<HandlerError> for DispatchError {
    fn from(e: HandlerError) -> Self {
        DispatchError::Handler(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(DispatchError::NotFound("/x".into()).status(), StatusCode::NOT_FOUND);
        assert_eq!(
            DispatchError::MethodNotAllowed(Method::PUT).status(),
            StatusCode::METHOD_NOT_ALLOWED
        );
        let io = std::io::Error::other("boom");
        assert_eq!(DispatchError::from(io).status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_display() {
        let err = RegistrationError::invalid("a/b", "must start with `/`");
        assert_eq!(err.to_string(), "invalid alias `a/b`: must start with `/`");
        assert_eq!(
            RegistrationError::DuplicateAlias("/a".into()).to_string(),
            "alias `/a` is already registered"
        );
    }
}
