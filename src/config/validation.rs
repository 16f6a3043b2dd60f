//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Check value ranges (pool sizes, intervals)
//! - Check the backend table is non-empty and free of duplicates
//!
//! # Design Decisions
//! - Returns all validation errors, not just the first
//! - Validation is a pure function: GatewayConfig -> Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::collections::HashSet;

use crate::config::schema::GatewayConfig;

/// A single semantic validation failure.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("auth.secret must not be empty (set it in the config or via TOOLGATE_AUTH_SECRET)")]
    MissingSecret,

    #[error("auth.token_ttl_secs must be greater than zero")]
    ZeroTokenTtl,

    #[error("pool.max_size ({max}) must be >= pool.min_size ({min})")]
    PoolSizeInverted { min: usize, max: usize },

    #[error("pool.max_size must be greater than zero")]
    ZeroPoolSize,

    #[error("pool.refresh_interval_secs must be greater than zero")]
    ZeroRefreshInterval,

    #[error("sessions.reaper_interval_secs must be greater than zero")]
    ZeroReaperInterval,

    #[error("at least one backend must be configured")]
    NoBackends,

    #[error("duplicate backend name: {0}")]
    DuplicateBackend(String),
}

/// Validate a parsed configuration.
pub fn validate_config(config: &GatewayConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.auth.secret.is_empty() {
        errors.push(ValidationError::MissingSecret);
    }
    if config.auth.token_ttl_secs == 0 {
        errors.push(ValidationError::ZeroTokenTtl);
    }

    if config.pool.max_size == 0 {
        errors.push(ValidationError::ZeroPoolSize);
    } else if config.pool.max_size < config.pool.min_size {
        errors.push(ValidationError::PoolSizeInverted {
            min: config.pool.min_size,
            max: config.pool.max_size,
        });
    }
    if config.pool.refresh_interval_secs == 0 {
        errors.push(ValidationError::ZeroRefreshInterval);
    }
    if config.sessions.reaper_interval_secs == 0 {
        errors.push(ValidationError::ZeroReaperInterval);
    }

    if config.backends.is_empty() {
        errors.push(ValidationError::NoBackends);
    }
    let mut seen = HashSet::new();
    for entry in &config.backends {
        if !seen.insert(entry.name.as_str()) {
            errors.push(ValidationError::DuplicateBackend(entry.name.clone()));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
