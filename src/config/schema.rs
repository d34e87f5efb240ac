//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for a
//! development session. All types derive Serde traits for deserialization
//! from `devsync.toml`.

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Root configuration for a development session.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct DevConfig {
    /// Backend development server to launch.
    pub server: ServerConfig,

    /// Reload proxy settings.
    pub proxy: ProxyConfig,

    /// Paths watched for browser reloads.
    pub watch: WatchConfig,

    /// Logging and metrics settings.
    pub observability: ObservabilityConfig,
}

/// Backend server launch configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Executable to run (e.g., "flask").
    pub command: String,

    /// Arguments passed to the command.
    pub args: Vec<String>,

    /// Working directory for the child; inherits ours when unset.
    pub working_dir: Option<PathBuf>,

    /// Explicit environment handed to the child at spawn time
    /// (e.g., `FLASK_APP = "main:app"`).
    pub env: BTreeMap<String, String>,

    /// Whether the child also sees this process's environment.
    pub inherit_env: bool,

    /// Readiness handshake performed before the server task completes.
    pub readiness: ReadinessConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            command: "flask".to_string(),
            args: vec!["run".to_string()],
            working_dir: None,
            env: BTreeMap::new(),
            inherit_env: true,
            readiness: ReadinessConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Command line as a single display string.
    pub fn command_line(&self) -> String {
        std::iter::once(self.command.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Readiness probe configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ReadinessConfig {
    /// Wait for the upstream to accept connections before moving on.
    pub enabled: bool,

    /// Give up waiting after this many seconds.
    pub timeout_secs: u64,

    /// Delay between connection attempts in milliseconds.
    pub interval_ms: u64,
}

impl Default for ReadinessConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            timeout_secs: 30,
            interval_ms: 200,
        }
    }
}

/// Reload proxy configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ProxyConfig {
    /// Local bind address (e.g., "127.0.0.1:3000").
    pub bind_address: String,

    /// Backend address requests are forwarded to ("localhost:5000" or
    /// "http://localhost:5000").
    pub upstream: String,

    /// Request timeout in seconds.
    pub request_timeout_secs: u64,

    /// Inject the live-reload client into HTML responses.
    pub inject_client: bool,

    /// Largest HTML body buffered for injection, in bytes.
    pub max_html_bytes: usize,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1:3000".to_string(),
            upstream: "localhost:5000".to_string(),
            request_timeout_secs: 30,
            inject_client: true,
            max_html_bytes: 8 * 1024 * 1024, // 8MB
        }
    }
}

/// File watch configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct WatchConfig {
    /// Directory the patterns are relative to.
    pub root: PathBuf,

    /// Glob patterns; `*` stays within one directory, `**` spans any depth.
    pub patterns: Vec<String>,

    /// Coalescing window in milliseconds. Zero broadcasts once per event.
    pub debounce_ms: u64,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("app"),
            patterns: vec!["templates/*.html".to_string(), "static/**/*.*".to_string()],
            debounce_ms: 0,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable the Prometheus metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: false,
            metrics_address: "127.0.0.1:9090".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_flask_workflow() {
        let config = DevConfig::default();
        assert_eq!(config.server.command_line(), "flask run");
        assert_eq!(config.proxy.upstream, "localhost:5000");
        assert_eq!(config.watch.root, PathBuf::from("app"));
        assert_eq!(
            config.watch.patterns,
            vec!["templates/*.html".to_string(), "static/**/*.*".to_string()]
        );
        assert_eq!(config.watch.debounce_ms, 0);
        assert!(config.server.env.is_empty());
        assert!(config.server.inherit_env);
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config: DevConfig = toml::from_str(
            r#"
            [server]
            command = "python"
            args = ["-m", "flask", "run"]

            [server.env]
            FLASK_APP = "main:app"
            FLASK_ENV = "development"

            [watch]
            debounce_ms = 150
            "#,
        )
        .unwrap();

        assert_eq!(config.server.command_line(), "python -m flask run");
        assert_eq!(config.server.env.get("FLASK_APP").map(String::as_str), Some("main:app"));
        assert!(config.server.readiness.enabled);
        assert_eq!(config.proxy.bind_address, "127.0.0.1:3000");
        assert_eq!(config.watch.debounce_ms, 150);
        assert_eq!(config.watch.patterns.len(), 2);
    }
}
