//! Response mapping.
//!
//! # Responsibilities
//! - Turn a `ResponseEnvelope` into an HTTP response
//! - Success → 200 with the backend payload as JSON
//! - Failure → its status with `{status, message, path}`
//!
//! # Design Decisions
//! - Circuit-open and backend failures return 503
//! - Backend timeouts result in 504 Gateway Timeout

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;

use crate::dispatch::envelope::ResponseEnvelope;

impl IntoResponse for ResponseEnvelope {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        match self {
            ResponseEnvelope::Success(value) => (status, Json(value)).into_response(),
            ResponseEnvelope::Failure(body) => (status, Json(body)).into_response(),
        }
    }
}
