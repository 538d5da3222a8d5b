//! Configuration validation.
//!
//! Serde handles syntax; this module checks value ranges and cross-field
//! rules. Every failure is reported, not just the first.

use thiserror::Error;
use tokio::sync::Semaphore;

use crate::config::schema::EchoConfig;

/// Largest per-session read buffer; every admitted session allocates one.
pub const MAX_BUFFER_SIZE: usize = 16 * 1024 * 1024;

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// A single semantic problem with a configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("listener.buffer_size must be greater than zero")]
    ZeroBufferSize,

    #[error("listener.buffer_size {0} exceeds the maximum {1}")]
    BufferTooLarge(usize, usize),

    #[error("listener.max_connections must be greater than zero")]
    ZeroMaxConnections,

    #[error("listener.max_connections {0} exceeds the supported maximum {1}")]
    TooManyConnections(usize, usize),

    #[error("tls.{0} must not be empty")]
    EmptyPath(&'static str),

    #[error("rate_limit.{0} must be greater than zero when rate limiting is enabled")]
    ZeroRate(&'static str),

    #[error("auth.{0} must not be empty")]
    EmptyCredential(&'static str),

    #[error("observability.metrics_address {0:?} is not a valid socket address")]
    MetricsAddress(String),

    #[error("observability.log_level {0:?} is not one of trace, debug, info, warn, error")]
    LogLevel(String),
}

/// Largest ceiling the admission semaphore and drain can represent.
fn max_supported_connections() -> usize {
    Semaphore::MAX_PERMITS.min(u32::MAX as usize)
}

/// Validate a configuration, collecting every problem.
pub fn validate_config(config: &EchoConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    let listener = &config.listener;
    if listener.buffer_size == 0 {
        errors.push(ValidationError::ZeroBufferSize);
    } else if listener.buffer_size > MAX_BUFFER_SIZE {
        errors.push(ValidationError::BufferTooLarge(
            listener.buffer_size,
            MAX_BUFFER_SIZE,
        ));
    }
    if listener.max_connections == 0 {
        errors.push(ValidationError::ZeroMaxConnections);
    } else if listener.max_connections > max_supported_connections() {
        errors.push(ValidationError::TooManyConnections(
            listener.max_connections,
            max_supported_connections(),
        ));
    }

    if config.tls.cert_path.trim().is_empty() {
        errors.push(ValidationError::EmptyPath("cert_path"));
    }
    if config.tls.key_path.trim().is_empty() {
        errors.push(ValidationError::EmptyPath("key_path"));
    }

    if config.rate_limit.enabled {
        if config.rate_limit.requests_per_second == 0 {
            errors.push(ValidationError::ZeroRate("requests_per_second"));
        }
        if config.rate_limit.burst_size == 0 {
            errors.push(ValidationError::ZeroRate("burst_size"));
        }
    }

    if config.auth.username.is_empty() {
        errors.push(ValidationError::EmptyCredential("username"));
    }
    if config.auth.password.is_empty() {
        errors.push(ValidationError::EmptyCredential("password"));
    }

    let observability = &config.observability;
    if observability.metrics_socket_addr().is_err() {
        errors.push(ValidationError::MetricsAddress(observability.metrics_address.clone()));
    }
    if !LOG_LEVELS.contains(&observability.log_level.to_ascii_lowercase().as_str()) {
        errors.push(ValidationError::LogLevel(observability.log_level.clone()));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
