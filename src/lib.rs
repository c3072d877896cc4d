//! Service Dispatch Gateway
//!
//! Routes normalized requests to backend services reachable over a message
//! channel, guarding every service with its own circuit breaker.
//!
//! # Architecture Overview
//!
//! ```text
//!                     ┌──────────────────────────────────────────────────────┐
//!                     │                  SERVICE DISPATCH                    │
//!                     │                                                      │
//!   HTTP Request      │  ┌─────────┐    ┌──────────┐    ┌───────────────┐    │
//!   ──────────────────┼─▶│  http   │───▶│ dispatch │───▶│    client     │    │
//!                     │  │ server  │    │ envelope │    │   factory     │    │
//!                     │  └─────────┘    └──────────┘    └───────┬───────┘    │
//!                     │                                         │            │
//!                     │                                         ▼            │
//!   HTTP Response     │  ┌─────────┐    ┌──────────┐    ┌───────────────┐    │
//!   ◀─────────────────┼──│response │◀───│ dispatch │◀───│ circuit       │◀───┼── channel
//!                     │  │ mapping │    │  error   │    │ breaker       │    │   (bus)
//!                     │  └─────────┘    └──────────┘    └───────────────┘    │
//!                     │                                                      │
//!                     │  config · discovery · observability · lifecycle      │
//!                     └──────────────────────────────────────────────────────┘
//! ```

// Core subsystems
pub mod channel;
pub mod client;
pub mod dispatch;
pub mod resilience;

// Front door
pub mod http;

// Cross-cutting concerns
pub mod config;
pub mod discovery;
pub mod lifecycle;
pub mod observability;

pub use channel::{LocalBus, MessageChannel};
pub use client::{ClientFactory, ServiceClient};
pub use config::GatewayConfig;
pub use dispatch::{DispatchError, Dispatcher, RawRequest, RequestEnvelope, ResponseEnvelope};
pub use http::HttpServer;
pub use lifecycle::Shutdown;
pub use resilience::{CircuitBreaker, CircuitState};
