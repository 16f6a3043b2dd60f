//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the gateway.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

/// Root configuration for the gateway.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct GatewayConfig {
    /// Listener configuration (bind address).
    pub listener: ListenerConfig,

    /// Token issuance and verification settings.
    pub auth: AuthConfig,

    /// Session lifetime settings.
    pub sessions: SessionConfig,

    /// Database connection pool settings.
    pub pool: PoolConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    /// Backends to register at startup.
    pub backends: Vec<BackendEntry>,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8000").
    pub bind_address: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8000".to_string(),
        }
    }
}

/// Token issuance and verification settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AuthConfig {
    /// HMAC secret for signing tokens. Overridden by the
    /// `TOOLGATE_AUTH_SECRET` environment variable when set.
    pub secret: String,

    /// Token lifetime in seconds.
    pub token_ttl_secs: u64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            secret: String::new(),
            token_ttl_secs: 24 * 60 * 60,
        }
    }
}

/// Session lifetime settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Seconds of inactivity before a session is reaped.
    pub idle_timeout_secs: u64,

    /// How often the idle reaper scans the registry, in seconds.
    pub reaper_interval_secs: u64,

    /// Inbound message buffer per session.
    pub channel_capacity: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            idle_timeout_secs: 3600,
            reaper_interval_secs: 300,
            channel_capacity: 32,
        }
    }
}

/// Database connection pool settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Path to the credential map document (a JSON object of
    /// connection identifier -> connection string).
    pub credentials_path: String,

    /// How often the credential map is re-read, in seconds.
    pub refresh_interval_secs: u64,

    /// Minimum connections kept per pool.
    pub min_size: usize,

    /// Maximum connections per pool.
    pub max_size: usize,

    /// Seconds to wait for a free connection before failing.
    pub acquire_timeout_secs: u64,

    /// Seconds to wait when establishing a new connection.
    pub connect_timeout_secs: u64,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            credentials_path: "etc/config/connections.json".to_string(),
            refresh_interval_secs: 60,
            min_size: 2,
            max_size: 4,
            acquire_timeout_secs: 10,
            connect_timeout_secs: 10,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable the metrics endpoint.
    pub metrics_enabled: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: true,
        }
    }
}

/// A backend registration entry.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BackendEntry {
    /// Name the backend is exposed under (first path segment).
    pub name: String,

    /// Constructor to use ("sql", "echo").
    pub kind: String,
}
