//! Message channel to backend services.
//!
//! # Data Flow
//! ```text
//! ServiceClient
//!     → MessageChannel::request(address, payload)
//!     → bus.rs delivers to the consumer registered at `address`
//!     → consumer replies (payload) or fails (code, message)
//!     → exactly one result flows back, or silence until the caller times out
//! ```
//!
//! # Design Decisions
//! - The channel never applies its own timeout; the circuit breaker owns it
//! - A requester that gave up drops its reply slot; late replies are discarded
//! - Connection lifecycle belongs to the transport, not the dispatch core

pub mod bus;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

pub use bus::{Consumer, LocalBus, Message};

/// Failure of a single request over the channel.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChannelError {
    /// Nobody listens at the address.
    #[error("no consumer registered at '{0}'")]
    NoConsumer(String),

    /// The backend explicitly signaled failure.
    #[error("{message}")]
    Failure { code: i32, message: String },

    /// The consumer discarded the request without answering.
    #[error("consumer at '{0}' dropped the request without replying")]
    Dropped(String),
}

/// Request/reply transport addressed by channel endpoint strings.
#[async_trait]
pub trait MessageChannel: Send + Sync {
    /// Send `payload` to `address` and wait for exactly one reply.
    async fn request(&self, address: &str, payload: Value) -> Result<Value, ChannelError>;
}
