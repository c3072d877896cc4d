//! Request dispatch subsystem.
//!
//! # Data Flow
//! ```text
//! RawRequest (path params, query, body bytes)
//!     → envelope.rs merges into a RequestEnvelope (BadRequest on bad body)
//!     → transform closure (e.g. inject `action`)
//!     → handler.rs: ClientFactory::get_client(service)
//!     → ServiceClient::send_request through the breaker
//!     → ResponseEnvelope (success payload, or status + message + path)
//! ```
//!
//! # Design Decisions
//! - Dispatch holds no state beyond the shared factory
//! - One parametrized dispatch function instead of per-service handlers
//! - Every failure is recovered into a structured response

pub mod envelope;
pub mod error;
pub mod handler;

pub use envelope::{FailureBody, RawRequest, RequestEnvelope, ResponseEnvelope};
pub use error::{DispatchError, DispatchResult};
pub use handler::Dispatcher;
