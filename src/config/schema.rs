//! Configuration schema definitions.
//!
//! All types derive Serde traits for deserialization from config files, and
//! every section has defaults so a minimal file only lists its mounts.

use serde::{Deserialize, Serialize};

/// Root configuration for the dispatch server.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(default)]
pub struct DispatchConfig {
    /// Listener configuration (bind address, body limit).
    pub listener: ListenerConfig,

    /// Where the router is mounted and how it shuts down.
    pub router: RouterConfig,

    /// Static resource registrations.
    pub mounts: Vec<MountConfig>,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,

    /// Largest request body buffered before dispatch.
    pub max_body_bytes: usize,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            max_body_bytes: 1024 * 1024,
        }
    }
}

/// Router placement.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct RouterConfig {
    /// Path prefix the router is mounted under; empty for the server root.
    pub mount_path: String,

    /// How long shutdown waits for in-flight requests to drain.
    pub drain_timeout_secs: u64,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            mount_path: String::new(),
            drain_timeout_secs: 30,
        }
    }
}

/// One directory served under an alias.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct MountConfig {
    /// Alias to register (e.g., "/static", "/*.css").
    pub alias: String,

    /// Directory resources are resolved against.
    pub directory: String,

    /// Resource name prefix prepended to the path-info.
    #[serde(default = "default_prefix")]
    pub prefix: String,
}

fn default_prefix() -> String {
    "/".to_string()
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Emit logs as JSON lines.
    pub json_logs: bool,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json_logs: false,
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_config() {
        let config: DispatchConfig = toml::from_str(
            r#"
            [[mounts]]
            alias = "/static"
            directory = "./public"
            "#,
        )
        .unwrap();
        assert_eq!(config.listener, ListenerConfig::default());
        assert_eq!(config.mounts.len(), 1);
        assert_eq!(config.mounts[0].prefix, "/");
    }

    #[test]
    fn test_full_config() {
        let config: DispatchConfig = toml::from_str(
            r#"
            [listener]
            bind_address = "127.0.0.1:3000"
            max_body_bytes = 4096

            [router]
            mount_path = "/app"

            [[mounts]]
            alias = "/*.css"
            directory = "./css"
            prefix = "/styles"

            [observability]
            log_level = "debug"
            json_logs = true
            "#,
        )
        .unwrap();
        assert_eq!(config.listener.bind_address, "127.0.0.1:3000");
        assert_eq!(config.router.mount_path, "/app");
        assert_eq!(config.router.drain_timeout_secs, 30);
        assert_eq!(config.mounts[0].prefix, "/styles");
        assert!(config.observability.json_logs);
    }
}
