//! Service client subsystem.
//!
//! # Data Flow
//! ```text
//! Dispatcher
//!     → factory.rs get_client(name) (cache hit, or build once)
//!     → descriptor.rs (address + breaker tuning + fallback)
//!     → service.rs send_request → CircuitBreaker::execute → MessageChannel
//! ```
//!
//! # Design Decisions
//! - One breaker per logical service, owned by its client
//! - The factory is an owned value passed by `Arc`, not a global
//! - Clients never retry; the breaker decides admission

pub mod descriptor;
pub mod factory;
pub mod service;

pub use descriptor::ServiceDescriptor;
pub use factory::ClientFactory;
pub use service::ServiceClient;
