//! Service discovery subsystem.
//!
//! # Data Flow
//! ```text
//! ClientFactory (cache miss for `name`)
//!     → ServiceDiscovery::lookup(name)
//!     → Ok(address)  → used as the client's channel address
//!     → Err(_)       → static config address, then `service.<name>`
//! ```
//!
//! # Design Decisions
//! - Lookup failures never fail client construction
//! - One address per logical name; no instance selection

pub mod memory;

use async_trait::async_trait;
use thiserror::Error;

pub use memory::InMemoryDiscovery;

/// Discovery lookup failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DiscoveryError {
    #[error("service '{0}' is not registered")]
    NotFound(String),

    #[error("discovery backend unavailable: {0}")]
    Unavailable(String),
}

/// Resolves a logical service name to a channel address.
#[async_trait]
pub trait ServiceDiscovery: Send + Sync {
    async fn lookup(&self, name: &str) -> Result<String, DiscoveryError>;
}
