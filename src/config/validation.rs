//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate addresses, patterns and value ranges
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: DevConfig → Result<(), Vec<ValidationError>>

use std::net::SocketAddr;

use crate::config::schema::DevConfig;
use crate::proxy::upstream::Upstream;

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// A single semantic problem with a configuration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{field}: {message}")]
pub struct ValidationError {
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

/// Check a parsed configuration for values serde cannot reject.
pub fn validate_config(config: &DevConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.server.command.trim().is_empty() {
        errors.push(ValidationError::new("server.command", "must not be empty"));
    }
    if config.server.readiness.enabled && config.server.readiness.interval_ms == 0 {
        errors.push(ValidationError::new(
            "server.readiness.interval_ms",
            "must be greater than zero",
        ));
    }

    if let Err(e) = config.proxy.bind_address.parse::<SocketAddr>() {
        errors.push(ValidationError::new(
            "proxy.bind_address",
            format!("'{}' is not a socket address ({e})", config.proxy.bind_address),
        ));
    }
    if let Err(e) = Upstream::parse(&config.proxy.upstream) {
        errors.push(ValidationError::new("proxy.upstream", e.to_string()));
    }
    if config.proxy.request_timeout_secs == 0 {
        errors.push(ValidationError::new(
            "proxy.request_timeout_secs",
            "must be greater than zero",
        ));
    }

    if config.watch.patterns.is_empty() {
        errors.push(ValidationError::new("watch.patterns", "at least one pattern is required"));
    }
    for pattern in &config.watch.patterns {
        if let Err(e) = glob::Pattern::new(pattern) {
            errors.push(ValidationError::new(
                "watch.patterns",
                format!("'{pattern}' is not a valid glob ({e})"),
            ));
        }
    }

    let level = config.observability.log_level.to_ascii_lowercase();
    if !LOG_LEVELS.contains(&level.as_str()) {
        errors.push(ValidationError::new(
            "observability.log_level",
            format!("'{}' is not one of {}", config.observability.log_level, LOG_LEVELS.join("/")),
        ));
    }
    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::new(
            "observability.metrics_address",
            "must be a socket address when metrics are enabled",
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
