//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Breakers, factory, dispatcher produce:
//!     → logging.rs (structured log events)
//!     → metrics.rs (counters, gauges, histograms)
//!
//! Consumers:
//!     → Log aggregation (stdout, pretty or JSON)
//!     → Metrics endpoint (Prometheus scrape)
//! ```
//!
//! # Design Decisions
//! - Structured logging (JSON) for machine parsing
//! - Request ID flows from the front door into dispatch logs
//! - Metrics are cheap (atomic increments)

pub mod logging;
pub mod metrics;
