//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → GatewayConfig (validated, immutable)
//!     → shared via Arc with the client factory and front door
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; breakers are built from it on first use
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, parse_config, ConfigError};
pub use schema::{
    CircuitBreakerSettings, DiscoveryConfig, GatewayConfig, ListenerConfig, LogFormat,
    ObservabilityConfig, RouteConfig, ServiceConfig, TimeoutConfig,
};
