//! Immutable per-service settings resolved at client creation.

use std::time::Duration;

use serde_json::Value;

use crate::config::{CircuitBreakerSettings, ServiceConfig};
use crate::resilience::BreakerConfig;

/// Everything a [`ServiceClient`](super::ServiceClient) needs to know about
/// its backend.
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceDescriptor {
    pub name: String,
    /// Channel address requests are sent to.
    pub address: String,
    pub breaker: BreakerConfig,
    /// Reply served in place of a failure when the breaker allows it.
    pub fallback: Option<Value>,
}

impl ServiceDescriptor {
    pub fn new(name: impl Into<String>, address: impl Into<String>, breaker: BreakerConfig) -> Self {
        Self {
            name: name.into(),
            address: address.into(),
            breaker,
            fallback: None,
        }
    }

    /// Descriptor for `name` at `address`, tuned by its service config.
    pub fn from_config(name: &str, address: String, service: &ServiceConfig) -> Self {
        Self {
            name: name.to_string(),
            address,
            breaker: BreakerConfig::from(&service.circuit_breaker),
            fallback: service.fallback.clone(),
        }
    }

    pub fn with_fallback(mut self, fallback: Value) -> Self {
        self.fallback = Some(fallback);
        self
    }
}

impl From<&CircuitBreakerSettings> for BreakerConfig {
    fn from(settings: &CircuitBreakerSettings) -> Self {
        Self {
            max_failures: settings.max_failures,
            timeout: Duration::from_millis(settings.timeout),
            reset_timeout: Duration::from_millis(settings.reset_timeout),
            fallback_on_failure: settings.fallback_on_failure,
        }
    }
}
