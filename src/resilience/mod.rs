//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Call to backend:
//!     → circuit_breaker.rs admission (Closed / Half-Open trial / fail fast)
//!     → timeout bound around the call
//!     → outcome settles the breaker (count failure, trip, recover)
//! ```
//!
//! # Design Decisions
//! - Timeouts are non-negotiable; every backend call has a deadline
//! - No retries: the breaker governs admission, callers own retry policy
//! - Circuit breaker prevents cascading failures

pub mod circuit_breaker;

pub use circuit_breaker::{
    BreakerConfig, BreakerError, BreakerSnapshot, CircuitBreaker, CircuitState, StateChange,
};
