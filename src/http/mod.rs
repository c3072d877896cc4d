//! HTTP front door subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, configured route table)
//!     → request.rs (request ID generated or kept)
//!     → path params + query + body → RawRequest
//!     → Dispatcher::dispatch_with(service, raw, inject action)
//!     → response.rs (ResponseEnvelope → status + JSON)
//!     → Send to client
//! ```

pub mod request;
pub mod response;
pub mod server;

pub use request::{MakeRequestUuid, X_REQUEST_ID};
pub use server::{AppState, HttpServer, ADMIN_CIRCUITS_PATH};
