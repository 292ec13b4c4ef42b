//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (timeouts > 0, ports valid)
//! - Check that paired settings are supplied together
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ServerConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;

use crate::config::schema::ServerConfig;

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

/// Validate a configuration, collecting every problem found.
pub fn validate_config(config: &ServerConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.hostname.trim().is_empty() {
        errors.push(ValidationError::new("hostname", "must not be empty"));
    }

    if config.proxy.hostname.trim().is_empty() {
        errors.push(ValidationError::new("proxy.hostname", "must not be empty"));
    }
    if config.proxy.port == 0 {
        errors.push(ValidationError::new("proxy.port", "must be non-zero"));
    }
    if !config.proxy.context_root.starts_with('/') {
        errors.push(ValidationError::new(
            "proxy.context_root",
            format!("'{}' must start with '/'", config.proxy.context_root),
        ));
    }

    let transport = &config.client.transport;
    if transport.cert_path.is_some() != transport.key_path.is_some() {
        errors.push(ValidationError::new(
            "client.transport",
            "cert_path and key_path must be supplied together",
        ));
    }

    if config.relay.connect_timeout_ms == 0 {
        errors.push(ValidationError::new("relay.connect_timeout_ms", "must be non-zero"));
    }
    if config.relay.pending_ttl_secs == 0 {
        errors.push(ValidationError::new("relay.pending_ttl_secs", "must be non-zero"));
    }
    if config.relay.reap_interval_secs == 0 {
        errors.push(ValidationError::new("relay.reap_interval_secs", "must be non-zero"));
    }
    if config.timeouts.request_secs == 0 {
        errors.push(ValidationError::new("timeouts.request_secs", "must be non-zero"));
    }

    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::new(
            "observability.metrics_address",
            format!("'{}' is not a socket address", config.observability.metrics_address),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
