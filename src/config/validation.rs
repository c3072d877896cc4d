//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (breaker thresholds and timeouts > 0)
//! - Require the front-door timeout to exceed every breaker timeout
//! - Detect conflicting or malformed routes
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: GatewayConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::collections::{BTreeSet, HashSet};
use std::net::SocketAddr;

use thiserror::Error;

use crate::config::schema::GatewayConfig;
use crate::http::server::ADMIN_CIRCUITS_PATH;

/// A single semantic problem in the configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("invalid bind address '{0}'")]
    BindAddress(String),

    #[error("invalid metrics address '{0}'")]
    MetricsAddress(String),

    #[error("timeouts.request_secs must be greater than 0")]
    ZeroRequestTimeout,

    #[error("service '{service}': request timeout of {request_ms}ms must exceed the breaker timeout of {timeout_ms}ms")]
    RequestTimeoutTooShort {
        service: String,
        request_ms: u64,
        timeout_ms: u64,
    },

    #[error("discovery.timeout_ms must be greater than 0")]
    ZeroDiscoveryTimeout,

    #[error("service '{0}': max-failures must be at least 1")]
    ZeroMaxFailures(String),

    #[error("service '{0}': timeout must be greater than 0")]
    ZeroTimeout(String),

    #[error("service '{0}': reset-timeout must be greater than 0")]
    ZeroResetTimeout(String),

    #[error("service '{0}': address must not be empty")]
    EmptyAddress(String),

    #[error("service '{0}': fallback-on-failure requires a fallback value")]
    MissingFallback(String),

    #[error("route '{route}': unsupported method '{method}'")]
    RouteMethod { route: String, method: String },

    #[error("route '{0}': path must start with '/'")]
    RoutePath(String),

    #[error("route '{0}': service name must not be empty")]
    RouteService(String),

    #[error("route '{route}': {method} {path} is already defined")]
    DuplicateRoute {
        route: String,
        method: String,
        path: String,
    },

    #[error("route '{0}': path is reserved for the admin endpoint")]
    ReservedPath(String),
}

/// Methods the front door can route.
pub const SUPPORTED_METHODS: &[&str] = &["GET", "POST", "PUT", "PATCH", "DELETE", "HEAD", "OPTIONS"];

/// Validate a parsed configuration.
pub fn validate_config(config: &GatewayConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::BindAddress(config.listener.bind_address.clone()));
    }
    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::MetricsAddress(
            config.observability.metrics_address.clone(),
        ));
    }

    if config.timeouts.request_secs == 0 {
        errors.push(ValidationError::ZeroRequestTimeout);
    }
    if config.discovery.timeout_ms == 0 {
        errors.push(ValidationError::ZeroDiscoveryTimeout);
    }

    // Sorted for stable error output.
    let mut names: Vec<&String> = config.services.keys().collect();
    names.sort();
    for name in names {
        let service = &config.services[name];
        let breaker = &service.circuit_breaker;
        if breaker.max_failures == 0 {
            errors.push(ValidationError::ZeroMaxFailures(name.clone()));
        }
        if breaker.timeout == 0 {
            errors.push(ValidationError::ZeroTimeout(name.clone()));
        }
        if breaker.reset_timeout == 0 {
            errors.push(ValidationError::ZeroResetTimeout(name.clone()));
        }
        if service.address.as_deref().is_some_and(|a| a.trim().is_empty()) {
            errors.push(ValidationError::EmptyAddress(name.clone()));
        }
        if breaker.fallback_on_failure && service.fallback.is_none() {
            errors.push(ValidationError::MissingFallback(name.clone()));
        }
    }

    // Routed services missing from `services` run with the default breaker.
    let request_ms = config.timeouts.request_secs.saturating_mul(1000);
    if request_ms > 0 {
        let fronted: BTreeSet<&str> = config
            .services
            .keys()
            .map(String::as_str)
            .chain(config.routes.iter().map(|route| route.service.as_str()))
            .filter(|name| !name.trim().is_empty())
            .collect();
        for name in fronted {
            let timeout_ms = config.service(name).circuit_breaker.timeout;
            if request_ms <= timeout_ms {
                errors.push(ValidationError::RequestTimeoutTooShort {
                    service: name.to_string(),
                    request_ms,
                    timeout_ms,
                });
            }
        }
    }

    let mut seen = HashSet::new();
    for route in &config.routes {
        let method = route.method.to_ascii_uppercase();
        if !SUPPORTED_METHODS.contains(&method.as_str()) {
            errors.push(ValidationError::RouteMethod {
                route: route.name.clone(),
                method: route.method.clone(),
            });
        }
        if !route.path.starts_with('/') {
            errors.push(ValidationError::RoutePath(route.name.clone()));
        }
        if route.path == ADMIN_CIRCUITS_PATH {
            errors.push(ValidationError::ReservedPath(route.name.clone()));
        }
        if route.service.trim().is_empty() {
            errors.push(ValidationError::RouteService(route.name.clone()));
        }
        if !seen.insert((method.clone(), route.path.clone())) {
            errors.push(ValidationError::DuplicateRoute {
                route: route.name.clone(),
                method,
                path: route.path.clone(),
            });
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
