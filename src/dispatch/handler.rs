//! Stateless dispatch: normalize, look up the client, call, map.

use std::sync::Arc;
use std::time::Instant;

use serde_json::Value;

use crate::client::ClientFactory;
use crate::dispatch::envelope::{RawRequest, RequestEnvelope, ResponseEnvelope};
use crate::dispatch::error::{DispatchError, DispatchResult};
use crate::observability::metrics;

/// Routes requests to services through the shared client factory.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    factory: Arc<ClientFactory>,
}

impl Dispatcher {
    pub fn new(factory: Arc<ClientFactory>) -> Self {
        Self { factory }
    }

    pub fn factory(&self) -> &Arc<ClientFactory> {
        &self.factory
    }

    /// Dispatch `request` to `service` unchanged.
    pub async fn dispatch(&self, service: &str, request: &RawRequest) -> ResponseEnvelope {
        self.dispatch_with(service, request, |envelope| envelope).await
    }

    /// Normalize `request`, apply `transform`, and call `service`.
    ///
    /// Every outcome becomes a [`ResponseEnvelope`]. Malformed input is
    /// rejected before a client is touched, so it never counts against a
    /// breaker.
    pub async fn dispatch_with<T>(
        &self,
        service: &str,
        request: &RawRequest,
        transform: T,
    ) -> ResponseEnvelope
    where
        T: FnOnce(RequestEnvelope) -> RequestEnvelope,
    {
        let start = Instant::now();

        let result = match request.envelope() {
            Ok(envelope) => self.send(service, &transform(envelope)).await,
            Err(e) => Err(e),
        };

        let response = match result {
            Ok(value) => ResponseEnvelope::Success(value),
            Err(e) => {
                match &e {
                    DispatchError::BadRequest(_) => {
                        tracing::debug!(service = %service, path = %request.path, error = %e, "Rejected malformed request")
                    }
                    _ => {
                        tracing::warn!(
                            service = %service,
                            path = %request.path,
                            counted = e.is_counted(),
                            error = %e,
                            "Dispatch failed"
                        )
                    }
                }
                ResponseEnvelope::failure(&e, &request.path)
            }
        };

        metrics::record_dispatch(service, response.status(), start);
        response
    }

    /// Send an already normalized envelope to `service`.
    pub async fn send(&self, service: &str, envelope: &RequestEnvelope) -> DispatchResult<Value> {
        let client = self.factory.get_client(service).await;
        client.send_request(envelope).await
    }
}
