//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate aliases with the same rules the dispatch table applies
//! - Detect two mounts claiming the same alias
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: DispatchConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::collections::HashSet;
use std::net::SocketAddr;

use crate::config::schema::DispatchConfig;
use crate::routing::alias;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{field}: {message}")]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

pub fn validate_config(config: &DispatchConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "listener.bind_address",
            format!("`{}` is not a socket address", config.listener.bind_address),
        ));
    }
    if config.listener.max_body_bytes == 0 {
        errors.push(ValidationError::new("listener.max_body_bytes", "must be > 0"));
    }

    let mount_path = &config.router.mount_path;
    if !mount_path.is_empty() && (!mount_path.starts_with('/') || mount_path.ends_with('/')) {
        errors.push(ValidationError::new(
            "router.mount_path",
            "must be empty or start with `/` and not end with `/`",
        ));
    }

    let mut seen = HashSet::new();
    for (i, mount) in config.mounts.iter().enumerate() {
        match alias::normalize(&mount.alias) {
            Ok(key) => {
                if !seen.insert(key) {
                    errors.push(ValidationError::new(
                        format!("mounts[{i}].alias"),
                        format!("`{}` is mounted more than once", mount.alias),
                    ));
                }
            }
            Err(e) => errors.push(ValidationError::new(format!("mounts[{i}].alias"), e.to_string())),
        }
        if mount.directory.is_empty() {
            errors.push(ValidationError::new(format!("mounts[{i}].directory"), "must not be empty"));
        }
        if mount.prefix != "/" && (!mount.prefix.starts_with('/') || mount.prefix.ends_with('/')) {
            errors.push(ValidationError::new(
                format!("mounts[{i}].prefix"),
                "must be `/` or start with `/` and not end with `/`",
            ));
        }
    }

    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::new(
            "observability.metrics_address",
            "not a socket address",
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
