//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the gateway.
//! All types derive Serde traits for deserialization from config files.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Root configuration for the dispatch gateway.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct GatewayConfig {
    /// Listener configuration (bind address, body limit).
    pub listener: ListenerConfig,

    /// Timeout configuration for the front door.
    pub timeouts: TimeoutConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    /// Optional service discovery.
    pub discovery: DiscoveryConfig,

    /// Per-service settings keyed by logical service name.
    pub services: HashMap<String, ServiceConfig>,

    /// Front-door route table.
    pub routes: Vec<RouteConfig>,
}

impl GatewayConfig {
    /// Settings for `name`, or all defaults when the service is not listed.
    pub fn service(&self, name: &str) -> ServiceConfig {
        self.services.get(name).cloned().unwrap_or_default()
    }
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,

    /// Maximum accepted request body in bytes.
    pub max_body_size: usize,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            max_body_size: 2 * 1024 * 1024, // 2MB
        }
    }
}

/// Timeout configuration for the front door.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Whole-request timeout in seconds, independent of breaker timeouts.
    pub request_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self { request_secs: 30 }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Log output format.
    pub log_format: LogFormat,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

/// Service discovery configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DiscoveryConfig {
    /// Consult discovery before static addresses.
    pub enabled: bool,

    /// Upper bound on one lookup; on expiry resolution falls back.
    pub timeout_ms: u64,

    /// Records seeded into the in-memory registry (name -> address).
    pub records: HashMap<String, String>,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            timeout_ms: 1000,
            records: HashMap::new(),
        }
    }
}

/// Per-service configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(default, rename_all = "kebab-case")]
pub struct ServiceConfig {
    /// Channel address; defaults to `service.<name>`.
    pub address: Option<String>,

    /// Breaker tuning.
    pub circuit_breaker: CircuitBreakerSettings,

    /// Reply served when `fallback-on-failure` is set and a call fails.
    pub fallback: Option<serde_json::Value>,
}

/// Address used when neither discovery nor config names one.
pub fn default_address(name: &str) -> String {
    format!("service.{name}")
}

/// Circuit breaker block of a service.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default, rename_all = "kebab-case")]
pub struct CircuitBreakerSettings {
    /// Consecutive failures before the circuit opens.
    pub max_failures: u32,

    /// Call timeout in milliseconds.
    pub timeout: u64,

    /// Open → Half-Open cool-down in milliseconds.
    pub reset_timeout: u64,

    /// Serve the configured fallback instead of failing.
    pub fallback_on_failure: bool,
}

impl Default for CircuitBreakerSettings {
    fn default() -> Self {
        Self {
            max_failures: 5,
            timeout: 10_000,
            reset_timeout: 30_000,
            fallback_on_failure: false,
        }
    }
}

/// Front-door route mapping an HTTP method + path to a service.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct RouteConfig {
    /// Route identifier for logging.
    pub name: String,

    /// HTTP method (GET, POST, ...).
    #[serde(default = "default_method")]
    pub method: String,

    /// Path pattern, e.g. "/items/{id}".
    pub path: String,

    /// Logical service name to dispatch to.
    pub service: String,

    /// Action injected into the request envelope.
    #[serde(default)]
    pub action: Option<String>,
}

fn default_method() -> String {
    "GET".to_string()
}
